//! Format-aware walkers built on the public stream surface
//!
//! A codec consumes a [`RangeStream`](crate::RangeStream) the way any
//! client would: construct it with an empty interval, read `total_bytes`
//! to compute end-relative offsets, then `add` and `read` the handful of
//! header ranges its container format needs. Walking structure never
//! downloads payloads; member data is fetched only on request.

pub mod conda;
pub mod png;
pub mod tar;
pub mod zip;

pub use conda::CondaStream;
pub use png::{PngChunkInfo, PngStream};
pub use tar::{TarEntry, TarStream};
pub use zip::{CompressionMethod, ZipEntry, ZipStream};
