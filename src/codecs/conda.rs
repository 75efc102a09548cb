//! `.conda` package walker
//!
//! A `.conda` package is a ZIP archive with a fixed shape: one
//! `info-<name>.tar.zst`, one `pkg-<name>.tar.zst` and one
//! `metadata.json`. This codec layers that validation and typed accessors
//! over the generic ZIP walker.

use crate::error::{Result, StreamError};
use crate::fetcher::Fetcher;
use crate::stream::RangeStream;
use std::sync::Arc;

use super::zip::{ZipEntry, ZipStream};

/// A remote `.conda` package walked over a [`RangeStream`]
pub struct CondaStream {
    zip: ZipStream,
    info_index: usize,
    metadata_index: usize,
    pkg_index: usize,
}

impl CondaStream {
    /// Open the package at `url`, scan the ZIP central directory, and
    /// validate the member layout
    pub async fn open(url: impl Into<String>, fetcher: Arc<dyn Fetcher>) -> Result<Self> {
        let stream = RangeStream::new(url, fetcher).await?;
        Self::from_stream(stream).await
    }

    pub async fn from_stream(stream: RangeStream) -> Result<Self> {
        let zip = ZipStream::from_stream(stream).await?;
        Self::validate(zip)
    }

    /// Check the three-member `.conda` layout
    ///
    /// Sorting by name makes the members unambiguous: `info-` sorts before
    /// `metadata.json`, which sorts before `pkg-`.
    fn validate(zip: ZipStream) -> Result<Self> {
        if zip.entries().len() != 3 {
            return Err(StreamError::Parse(format!(
                "a .conda archive has exactly 3 members, found {}",
                zip.entries().len()
            )));
        }
        let mut order: Vec<usize> = (0..3).collect();
        order.sort_by(|a, b| zip.entries()[*a].name.cmp(&zip.entries()[*b].name));
        let (info_index, metadata_index, pkg_index) = (order[0], order[1], order[2]);

        let info = &zip.entries()[info_index].name;
        let metadata = &zip.entries()[metadata_index].name;
        let pkg = &zip.entries()[pkg_index].name;
        let well_formed = info.starts_with("info-")
            && info.ends_with(".tar.zst")
            && pkg.starts_with("pkg-")
            && pkg.ends_with(".tar.zst")
            && metadata == "metadata.json";
        if !well_formed {
            return Err(StreamError::Parse(format!(
                "not a .conda member layout: {:?}, {:?}, {:?}",
                info, metadata, pkg
            )));
        }

        Ok(CondaStream {
            zip,
            info_index,
            metadata_index,
            pkg_index,
        })
    }

    /// The `info-<name>.tar.zst` member
    pub fn info_entry(&self) -> &ZipEntry {
        &self.zip.entries()[self.info_index]
    }

    /// The `metadata.json` member
    pub fn metadata_entry(&self) -> &ZipEntry {
        &self.zip.entries()[self.metadata_index]
    }

    /// The `pkg-<name>.tar.zst` member
    pub fn pkg_entry(&self) -> &ZipEntry {
        &self.zip.entries()[self.pkg_index]
    }

    /// Fetch the raw bytes of `metadata.json`
    pub async fn read_metadata(&mut self) -> Result<bytes::Bytes> {
        let entry = self.zip.entries()[self.metadata_index].clone();
        self.zip.read_member(&entry).await
    }

    pub fn zip(&self) -> &ZipStream {
        &self.zip
    }

    pub fn into_zip(self) -> ZipStream {
        self.zip
    }
}
