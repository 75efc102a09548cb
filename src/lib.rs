//! range-stream
//!
//! Stream a remote file over HTTP Range requests as a single file-like
//! object, fetching only the byte intervals a caller registers.
//!
//! # Overview
//!
//! A [`RangeStream`] holds an ordered map of disjoint byte intervals, each
//! backed by the lazily-consumed body of one `Range` GET. Registering a new
//! interval with [`RangeStream::add`] issues the request, arbitrates any
//! overlap with already-stored intervals, and makes the new range the
//! target of the stream's `read`/`seek`/`tell` cursor. Intervals may be
//! end-relative (negative offsets, open end), which is what makes walking
//! container formats from the tail cheap: a ZIP central directory can be
//! located and parsed without downloading any file payloads.
//!
//! # Features
//!
//! - **Disjoint interval bookkeeping**: every byte position belongs to at
//!   most one live response stream
//! - **Overlap policies**: replant (resize both sides and reuse bytes
//!   already on the wire), burn (drop the old entry), or strict (refuse)
//! - **Tail marks and head offsets**: virtual truncation that preserves
//!   already-buffered bytes and never re-fetches a byte twice
//! - **File-like surface**: `read`/`seek`/`tell` over the active range
//! - **Codecs**: ZIP, `.conda`, TAR and PNG walkers built on end-relative
//!   ranges ([`codecs`])
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use range_stream::{HttpFetcher, RangeStream};
//! use std::sync::Arc;
//!
//! # async fn example() -> range_stream::Result<()> {
//! let fetcher = Arc::new(HttpFetcher::new()?);
//! let mut stream = RangeStream::new("https://example.com/data.bin", fetcher).await?;
//!
//! println!("resource is {} bytes", stream.total_bytes()?);
//!
//! // Fetch and read the final 22 bytes without touching the rest.
//! stream.add((-22, None)).await?;
//! let tail = stream.read(22).await?;
//! println!("got {} bytes", tail.len());
//! # Ok(())
//! # }
//! ```
//!
//! # Architecture
//!
//! - [`ByteInterval`] / [`IntervalSpec`]: half-open interval model and
//!   end-relative resolution
//! - [`Fetcher`] / [`HttpFetcher`]: the transport capability; one `Range`
//!   GET in, headers plus a lazy byte stream out
//! - [`RangeResponse`]: per-request streaming buffer with consumed-head
//!   and tail-mark accounting
//! - [`RangeStore`]: the ordered disjoint interval map
//! - [`RangeStream`]: the public facade tying the above together
//!
//! # Error Handling
//!
//! All fallible operations return [`StreamError`] through the crate-wide
//! [`Result`]. `add` is transactional: when it fails, the interval map is
//! exactly what it was before the call.

pub mod codecs;
pub mod config;
pub mod error;
pub mod fetcher;
pub mod interval;
pub mod overlap;
pub mod response;
pub mod store;
pub mod stream;

pub use config::FetchConfig;
pub use error::{Result, StreamError};
pub use fetcher::{
    range_header_value, BufferedSource, ByteSource, ContentRange, Fetcher, HttpFetcher,
    RangeFetch, ResourceInfo,
};
pub use interval::{ByteInterval, IntervalSpec};
pub use overlap::{classify, OverlapKind, PruningLevel};
pub use response::RangeResponse;
pub use store::RangeStore;
pub use stream::RangeStream;
