//! ZIP archive walker
//!
//! ZIP files are read from the end: the end-of-central-directory record
//! sits in the final 22 bytes (plus an optional comment of up to 64 KiB),
//! and points at the central directory, which lists every member. Both are
//! reachable with two or three small range requests, so listing a remote
//! archive costs a few hundred bytes regardless of its size.

use crate::error::{Result, StreamError};
use crate::fetcher::Fetcher;
use crate::interval::ByteInterval;
use crate::stream::RangeStream;
use byteorder::{LittleEndian, ReadBytesExt};
use bytes::Bytes;
use std::io::{Cursor, Read};
use std::sync::Arc;
use tracing::debug;

/// End-of-central-directory signature `PK\x05\x06`
const EOCD_SIG: &[u8; 4] = b"PK\x05\x06";
/// Central-directory file header signature `PK\x01\x02`
const CDFH_SIG: &[u8; 4] = b"PK\x01\x02";
/// Local file header signature `PK\x03\x04`
const LFH_SIG: &[u8; 4] = b"PK\x03\x04";

/// Fixed size of the end-of-central-directory record
const EOCD_SIZE: usize = 22;
/// Fixed size of a local file header
const LFH_SIZE: usize = 30;
/// Maximum ZIP comment length, bounding the backward search
const MAX_COMMENT: u64 = 65535;

/// How a member's bytes are stored
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionMethod {
    Stored,
    Deflated,
    Other(u16),
}

impl CompressionMethod {
    fn from_u16(raw: u16) -> Self {
        match raw {
            0 => CompressionMethod::Stored,
            8 => CompressionMethod::Deflated,
            other => CompressionMethod::Other(other),
        }
    }
}

/// One member of the archive, as listed in the central directory
#[derive(Debug, Clone)]
pub struct ZipEntry {
    pub name: String,
    pub compression: CompressionMethod,
    pub compressed_size: u64,
    pub uncompressed_size: u64,
    pub crc32: u32,
    /// Offset of the member's local file header
    pub header_offset: u64,
    pub is_directory: bool,
}

/// A remote ZIP archive walked over a [`RangeStream`]
pub struct ZipStream {
    stream: RangeStream,
    entries: Vec<ZipEntry>,
}

impl std::fmt::Debug for ZipStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ZipStream")
            .field("entries", &self.entries)
            .finish_non_exhaustive()
    }
}

impl ZipStream {
    /// Open the archive at `url` and scan its central directory
    pub async fn open(url: impl Into<String>, fetcher: Arc<dyn Fetcher>) -> Result<Self> {
        let stream = RangeStream::new(url, fetcher).await?;
        Self::from_stream(stream).await
    }

    /// Scan the central directory of an already-opened stream
    pub async fn from_stream(mut stream: RangeStream) -> Result<Self> {
        let entries = scan_central_directory(&mut stream).await?;
        Ok(ZipStream { stream, entries })
    }

    /// Members in central-directory order
    pub fn entries(&self) -> &[ZipEntry] {
        &self.entries
    }

    pub fn stream(&self) -> &RangeStream {
        &self.stream
    }

    pub fn into_stream(self) -> RangeStream {
        self.stream
    }

    /// Locate a member's data bytes
    ///
    /// The local file header repeats the name and extra field with lengths
    /// that may differ from the central directory's, so one 30-byte header
    /// fetch is needed to find where the data actually starts.
    pub async fn member_data_range(&mut self, entry: &ZipEntry) -> Result<ByteInterval> {
        let header = ByteInterval::new(
            entry.header_offset,
            entry.header_offset + LFH_SIZE as u64,
        )?;
        self.stream.add(header).await?;
        let bytes = self.stream.read(LFH_SIZE).await?;
        if bytes.len() < LFH_SIZE || &bytes[0..4] != LFH_SIG {
            return Err(StreamError::Parse(format!(
                "invalid local file header for {:?}",
                entry.name
            )));
        }
        let mut cursor = Cursor::new(&bytes[26..30]);
        let name_len = cursor.read_u16::<LittleEndian>().map_err(zip_eof)? as u64;
        let extra_len = cursor.read_u16::<LittleEndian>().map_err(zip_eof)? as u64;
        let data_start = entry.header_offset + LFH_SIZE as u64 + name_len + extra_len;
        ByteInterval::new(data_start, data_start + entry.compressed_size)
    }

    /// Fetch a member's raw (still compressed) bytes
    pub async fn read_member(&mut self, entry: &ZipEntry) -> Result<Bytes> {
        let data = self.member_data_range(entry).await?;
        self.stream.add_named(data, &*entry.name).await?;
        self.stream.read_all().await
    }
}

async fn scan_central_directory(stream: &mut RangeStream) -> Result<Vec<ZipEntry>> {
    let total = stream.total_bytes()?;
    if total < EOCD_SIZE as u64 {
        return Err(StreamError::Parse(format!(
            "{} bytes is too short for a ZIP archive",
            total
        )));
    }

    let eocd = locate_eocd(stream, total).await?;
    if eocd.needs_zip64() {
        return Err(StreamError::Parse(
            "zip64 archives are not supported".to_string(),
        ));
    }
    debug!(
        entries = eocd.total_entries,
        cd_offset = eocd.cd_offset,
        cd_size = eocd.cd_size,
        "parsed end of central directory"
    );

    let cd = ByteInterval::new(
        eocd.cd_offset as u64,
        eocd.cd_offset as u64 + eocd.cd_size as u64,
    )?;
    stream.add(cd).await?;
    let cd_bytes = stream.read(eocd.cd_size as usize).await?;
    if cd_bytes.len() < eocd.cd_size as usize {
        return Err(StreamError::Parse(
            "central directory truncated".to_string(),
        ));
    }

    let mut cursor = Cursor::new(cd_bytes.as_ref());
    let mut entries = Vec::with_capacity(eocd.total_entries as usize);
    for _ in 0..eocd.total_entries {
        entries.push(parse_cd_entry(&mut cursor)?);
    }
    Ok(entries)
}

struct Eocd {
    total_entries: u16,
    cd_size: u32,
    cd_offset: u32,
}

impl Eocd {
    fn needs_zip64(&self) -> bool {
        self.total_entries == u16::MAX || self.cd_size == u32::MAX || self.cd_offset == u32::MAX
    }
}

/// Find and parse the end-of-central-directory record
///
/// The comment-free layout puts it in the file's final 22 bytes; archives
/// with a trailing comment need a backward scan over a wider tail window.
async fn locate_eocd(stream: &mut RangeStream, total: u64) -> Result<Eocd> {
    stream.add((-(EOCD_SIZE as i64), None)).await?;
    let tail = stream.read(EOCD_SIZE).await?;
    if tail.len() == EOCD_SIZE && &tail[0..4] == EOCD_SIG && tail[20..22] == [0, 0] {
        return parse_eocd(&tail);
    }

    let window = (MAX_COMMENT + EOCD_SIZE as u64).min(total);
    stream.add((-(window as i64), None)).await?;
    let tail = stream.read(window as usize).await?;
    for i in (0..tail.len().saturating_sub(EOCD_SIZE)).rev() {
        if &tail[i..i + 4] == EOCD_SIG {
            let comment_len = u16::from_le_bytes([tail[i + 20], tail[i + 21]]) as usize;
            if comment_len == tail.len() - i - EOCD_SIZE {
                return parse_eocd(&tail[i..i + EOCD_SIZE]);
            }
        }
    }
    Err(StreamError::Parse(
        "no end-of-central-directory record found".to_string(),
    ))
}

fn parse_eocd(bytes: &[u8]) -> Result<Eocd> {
    let mut cursor = Cursor::new(bytes);
    let mut sig = [0u8; 4];
    cursor.read_exact(&mut sig).map_err(zip_eof)?;
    let _disk_number = cursor.read_u16::<LittleEndian>().map_err(zip_eof)?;
    let _cd_start_disk = cursor.read_u16::<LittleEndian>().map_err(zip_eof)?;
    let _disk_entries = cursor.read_u16::<LittleEndian>().map_err(zip_eof)?;
    let total_entries = cursor.read_u16::<LittleEndian>().map_err(zip_eof)?;
    let cd_size = cursor.read_u32::<LittleEndian>().map_err(zip_eof)?;
    let cd_offset = cursor.read_u32::<LittleEndian>().map_err(zip_eof)?;
    Ok(Eocd {
        total_entries,
        cd_size,
        cd_offset,
    })
}

fn parse_cd_entry(cursor: &mut Cursor<&[u8]>) -> Result<ZipEntry> {
    let mut sig = [0u8; 4];
    cursor.read_exact(&mut sig).map_err(zip_eof)?;
    if &sig != CDFH_SIG {
        return Err(StreamError::Parse(
            "invalid central directory file header".to_string(),
        ));
    }

    let _version_made_by = cursor.read_u16::<LittleEndian>().map_err(zip_eof)?;
    let _version_needed = cursor.read_u16::<LittleEndian>().map_err(zip_eof)?;
    let _flags = cursor.read_u16::<LittleEndian>().map_err(zip_eof)?;
    let compression = cursor.read_u16::<LittleEndian>().map_err(zip_eof)?;
    let _last_mod_time = cursor.read_u16::<LittleEndian>().map_err(zip_eof)?;
    let _last_mod_date = cursor.read_u16::<LittleEndian>().map_err(zip_eof)?;
    let crc32 = cursor.read_u32::<LittleEndian>().map_err(zip_eof)?;
    let compressed_size = cursor.read_u32::<LittleEndian>().map_err(zip_eof)? as u64;
    let uncompressed_size = cursor.read_u32::<LittleEndian>().map_err(zip_eof)? as u64;
    let name_len = cursor.read_u16::<LittleEndian>().map_err(zip_eof)? as usize;
    let extra_len = cursor.read_u16::<LittleEndian>().map_err(zip_eof)? as u64;
    let comment_len = cursor.read_u16::<LittleEndian>().map_err(zip_eof)? as u64;
    let _disk_number_start = cursor.read_u16::<LittleEndian>().map_err(zip_eof)?;
    let _internal_attrs = cursor.read_u16::<LittleEndian>().map_err(zip_eof)?;
    let _external_attrs = cursor.read_u32::<LittleEndian>().map_err(zip_eof)?;
    let header_offset = cursor.read_u32::<LittleEndian>().map_err(zip_eof)? as u64;

    let mut name_bytes = vec![0u8; name_len];
    cursor.read_exact(&mut name_bytes).map_err(zip_eof)?;
    let name = String::from_utf8_lossy(&name_bytes).to_string();
    let is_directory = name.ends_with('/');

    // Skip the extra field and member comment
    cursor.set_position(cursor.position() + extra_len + comment_len);

    Ok(ZipEntry {
        name,
        compression: CompressionMethod::from_u16(compression),
        compressed_size,
        uncompressed_size,
        crc32,
        header_offset,
        is_directory,
    })
}

fn zip_eof(err: std::io::Error) -> StreamError {
    StreamError::Parse(format!("zip structure truncated: {}", err))
}
