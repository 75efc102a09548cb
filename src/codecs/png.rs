//! PNG chunk walker
//!
//! A PNG is an 8-byte signature followed by length-prefixed chunks
//! (4-byte big-endian length, 4-byte type, data, 4-byte CRC). Only the
//! 8-byte preamble of each chunk is needed to enumerate them, so the whole
//! chunk directory of a remote image costs a handful of tiny requests and
//! the image data itself is never touched.

use crate::error::{Result, StreamError};
use crate::fetcher::Fetcher;
use crate::interval::ByteInterval;
use crate::stream::RangeStream;
use byteorder::{BigEndian, ReadBytesExt};
use std::io::Cursor;
use std::sync::Arc;
use tracing::debug;

const PNG_SIGNATURE: &[u8; 8] = b"\x89PNG\r\n\x1a\n";
/// Length + type preamble preceding each chunk's data
const CHUNK_PREAMBLE: u64 = 8;
/// Length + type + CRC overhead around each chunk's data
const CHUNK_OVERHEAD: u64 = 12;
/// The IHDR chunk's 13 data bytes sit at a fixed offset
const IHDR_DATA: ByteInterval = ByteInterval { start: 16, stop: 29 };

/// One chunk of the image
#[derive(Debug, Clone)]
pub struct PngChunkInfo {
    /// Four-letter chunk type, e.g. `IHDR`, `IDAT`, `IEND`
    pub kind: String,
    /// Offset of the chunk's length field
    pub start: u64,
    /// Length of the chunk's data (excluding preamble and CRC)
    pub length: u32,
}

impl PngChunkInfo {
    /// Exclusive end of the chunk, i.e. the next chunk's start
    pub fn end(&self) -> u64 {
        self.start + self.length as u64 + CHUNK_OVERHEAD
    }

    /// Where the chunk's data bytes live
    pub fn data_range(&self) -> ByteInterval {
        ByteInterval {
            start: self.start + CHUNK_PREAMBLE,
            stop: self.end() - 4,
        }
    }
}

/// Image geometry and encoding, from the IHDR chunk
#[derive(Debug, Clone, Copy)]
pub struct IhdrInfo {
    pub width: u32,
    pub height: u32,
    pub bit_depth: u8,
    pub colour_type: u8,
    pub compression: u8,
    pub filter_method: u8,
    pub interlacing: u8,
}

impl IhdrInfo {
    /// Number of channels implied by the colour type (e.g. RGB=3, RGBA=4)
    pub fn channel_count(&self) -> u8 {
        let has_colourmap = self.colour_type & 1 != 0;
        let is_grayscale = self.colour_type & 2 == 0;
        let has_alpha = self.colour_type & 4 != 0;
        let colour_channels = if is_grayscale || has_colourmap { 1 } else { 3 };
        colour_channels + u8::from(has_alpha)
    }
}

/// A remote PNG walked over a [`RangeStream`]
pub struct PngStream {
    stream: RangeStream,
    ihdr: IhdrInfo,
    chunks: Vec<PngChunkInfo>,
}

impl PngStream {
    /// Open the image at `url`, verify its signature, parse IHDR and
    /// enumerate every chunk
    pub async fn open(url: impl Into<String>, fetcher: Arc<dyn Fetcher>) -> Result<Self> {
        let stream = RangeStream::new(url, fetcher).await?;
        Self::from_stream(stream).await
    }

    pub async fn from_stream(mut stream: RangeStream) -> Result<Self> {
        check_signature(&mut stream).await?;
        let ihdr = scan_ihdr(&mut stream).await?;
        let chunks = enumerate_chunks(&mut stream).await?;
        Ok(PngStream {
            stream,
            ihdr,
            chunks,
        })
    }

    pub fn ihdr(&self) -> &IhdrInfo {
        &self.ihdr
    }

    /// Chunks in file order
    pub fn chunks(&self) -> &[PngChunkInfo] {
        &self.chunks
    }

    /// Chunks of one type, e.g. all the `IDAT` segments
    pub fn chunks_of(&self, kind: &str) -> Vec<&PngChunkInfo> {
        self.chunks.iter().filter(|c| c.kind == kind).collect()
    }

    pub fn stream(&self) -> &RangeStream {
        &self.stream
    }

    pub fn into_stream(self) -> RangeStream {
        self.stream
    }

    /// Fetch one chunk's data bytes
    pub async fn read_chunk(&mut self, chunk: &PngChunkInfo) -> Result<bytes::Bytes> {
        self.stream.add_named(chunk.data_range(), &*chunk.kind).await?;
        self.stream.read_all().await
    }
}

async fn check_signature(stream: &mut RangeStream) -> Result<()> {
    stream.add(ByteInterval::new(0, 8)?).await?;
    let signature = stream.read(8).await?;
    if signature.as_ref() != PNG_SIGNATURE {
        return Err(StreamError::Parse(format!(
            "invalid PNG signature: {:?}",
            signature.as_ref()
        )));
    }
    Ok(())
}

async fn scan_ihdr(stream: &mut RangeStream) -> Result<IhdrInfo> {
    stream.add(IHDR_DATA).await?;
    let bytes = stream.read(IHDR_DATA.length() as usize).await?;
    if bytes.len() < IHDR_DATA.length() as usize {
        return Err(StreamError::Parse("IHDR chunk truncated".to_string()));
    }
    let mut cursor = Cursor::new(bytes.as_ref());
    let width = cursor.read_u32::<BigEndian>().map_err(png_eof)?;
    let height = cursor.read_u32::<BigEndian>().map_err(png_eof)?;
    let bit_depth = cursor.read_u8().map_err(png_eof)?;
    let colour_type = cursor.read_u8().map_err(png_eof)?;
    let compression = cursor.read_u8().map_err(png_eof)?;
    let filter_method = cursor.read_u8().map_err(png_eof)?;
    let interlacing = cursor.read_u8().map_err(png_eof)?;
    Ok(IhdrInfo {
        width,
        height,
        bit_depth,
        colour_type,
        compression,
        filter_method,
        interlacing,
    })
}

/// Walk the chunk preambles, skipping over data and CRC bytes
async fn enumerate_chunks(stream: &mut RangeStream) -> Result<Vec<PngChunkInfo>> {
    let total = stream.total_bytes()?;
    let mut chunks = Vec::new();
    let mut pos = 8u64;

    loop {
        if pos + CHUNK_PREAMBLE > total {
            return Err(StreamError::Parse(
                "chunk preamble overruns the file".to_string(),
            ));
        }
        stream
            .add(ByteInterval::new(pos, pos + CHUNK_PREAMBLE)?)
            .await?;
        let preamble = stream.read(CHUNK_PREAMBLE as usize).await?;
        if preamble.len() < CHUNK_PREAMBLE as usize {
            return Err(StreamError::Parse("chunk preamble truncated".to_string()));
        }
        let length = u32::from_be_bytes([preamble[0], preamble[1], preamble[2], preamble[3]]);
        let kind = String::from_utf8_lossy(&preamble[4..8]).to_string();
        debug!(kind, length, pos, "png chunk");
        let chunk = PngChunkInfo {
            kind: kind.clone(),
            start: pos,
            length,
        };
        if chunk.end() > total {
            return Err(StreamError::Parse(format!(
                "chunk {} overruns the file",
                kind
            )));
        }
        pos = chunk.end();
        chunks.push(chunk);
        if kind == "IEND" {
            break;
        }
    }

    Ok(chunks)
}

fn png_eof(err: std::io::Error) -> StreamError {
    StreamError::Parse(format!("png structure truncated: {}", err))
}
