//! HTTP Range request transport
//!
//! The core never talks to the network directly: it goes through the
//! [`Fetcher`] capability, which turns a URL and a byte interval into
//! response headers plus a lazily-consumed byte stream. [`HttpFetcher`] is
//! the reqwest-backed implementation; tests substitute in-memory fetchers.

use crate::config::FetchConfig;
use crate::error::{Result, StreamError};
use crate::interval::ByteInterval;
use async_trait::async_trait;
use bytes::Bytes;
use http::HeaderMap;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, warn};

/// A lazily-consumed stream of body bytes
///
/// Implementations yield the bytes of the requested interval in order,
/// in arbitrarily-sized chunks, and `None` once the body is exhausted.
/// Dropping a source releases the underlying connection.
#[async_trait]
pub trait ByteSource: Send {
    /// Pull the next chunk off the wire, or `None` at end of body
    async fn next_chunk(&mut self) -> Result<Option<Bytes>>;
}

/// Headers and body returned by a single range fetch
pub struct RangeFetch {
    /// HTTP status code of the response
    pub status: u16,
    /// Response headers
    pub headers: HeaderMap,
    /// The response body, consumed incrementally
    pub body: Box<dyn ByteSource>,
}

impl std::fmt::Debug for RangeFetch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RangeFetch")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

impl RangeFetch {
    /// Parse the `Content-Range` header, if present
    pub fn content_range(&self) -> Result<ContentRange> {
        let value = self
            .headers
            .get("content-range")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| {
                StreamError::Parse("response is missing the Content-Range header".to_string())
            })?;
        ContentRange::parse(value)
    }

    /// Whether the response advertises `Accept-Ranges: bytes`
    pub fn accepts_ranges(&self) -> bool {
        self.headers
            .get("accept-ranges")
            .and_then(|v| v.to_str().ok())
            .map(|v| v.eq_ignore_ascii_case("bytes"))
            .unwrap_or(false)
    }
}

/// Parsed `Content-Range: bytes first-last/total` header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentRange {
    /// First byte position of the returned range (inclusive)
    pub first: u64,
    /// Last byte position of the returned range (inclusive)
    pub last: u64,
    /// Total size of the resource
    pub total: u64,
}

impl ContentRange {
    /// Parse a header value of the form `bytes first-last/total`
    pub fn parse(value: &str) -> Result<Self> {
        let rest = value
            .trim()
            .strip_prefix("bytes ")
            .ok_or_else(|| bad_content_range(value))?;
        let (range_part, total_part) = rest.split_once('/').ok_or_else(|| bad_content_range(value))?;
        let (first_part, last_part) = range_part
            .split_once('-')
            .ok_or_else(|| bad_content_range(value))?;
        let first = first_part
            .trim()
            .parse::<u64>()
            .map_err(|_| bad_content_range(value))?;
        let last = last_part
            .trim()
            .parse::<u64>()
            .map_err(|_| bad_content_range(value))?;
        let total = total_part
            .trim()
            .parse::<u64>()
            .map_err(|_| bad_content_range(value))?;
        if first > last || last >= total {
            return Err(bad_content_range(value));
        }
        Ok(ContentRange { first, last, total })
    }
}

fn bad_content_range(value: &str) -> StreamError {
    StreamError::Parse(format!("malformed Content-Range header: {:?}", value))
}

/// Format the `Range` header value for an interval
///
/// Non-empty intervals become `bytes=start-(stop-1)`. The empty interval
/// is mapped to the one-byte probe `bytes=0-0`, whose single returned
/// byte the caller discards; the probe exists only to surface the
/// resource's total length via `Content-Range`.
pub fn range_header_value(interval: &ByteInterval) -> String {
    match interval.termini() {
        Ok((first, last)) => format!("bytes={}-{}", first, last),
        Err(_) => "bytes=0-0".to_string(),
    }
}

/// The capability consumed by [`RangeStream`](crate::RangeStream): fetch
/// one byte interval of one URL as a lazy stream
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Issue a `Range` GET for `interval` of `url`
    ///
    /// The returned body must produce exactly `interval.length()` bytes
    /// (one byte for the empty-interval probe). Retry and backoff policy
    /// live behind this call; the core treats any error as fatal for the
    /// `add` that issued it.
    async fn fetch(&self, url: &str, interval: ByteInterval) -> Result<RangeFetch>;
}

/// Metadata learned from a `HEAD` probe of the origin
#[derive(Debug, Clone)]
pub struct ResourceInfo {
    /// Total size of the resource in bytes
    pub total_bytes: u64,
    /// Whether the origin advertises `Accept-Ranges: bytes`
    pub supports_ranges: bool,
}

/// Range fetcher backed by a pooled reqwest client
pub struct HttpFetcher {
    client: Client,
    config: FetchConfig,
}

impl HttpFetcher {
    /// Create a fetcher with the default [`FetchConfig`]
    pub fn new() -> Result<Self> {
        Self::with_config(FetchConfig::default())
    }

    /// Create a fetcher with a custom configuration
    pub fn with_config(config: FetchConfig) -> Result<Self> {
        config.validate()?;
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| StreamError::Config(format!("failed to build HTTP client: {}", e)))?;
        Ok(HttpFetcher { client, config })
    }

    /// Probe the origin with a `HEAD` request, without registering a range
    ///
    /// # Returns
    /// The resource's total size (from `Content-Length`) and whether it
    /// advertises range support.
    pub async fn head_probe(&self, url: &str) -> Result<ResourceInfo> {
        debug!(url, "sending HEAD probe");
        let response = self.client.head(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            warn!(url, %status, "HEAD probe rejected");
            return Err(StreamError::Network(format!(
                "HEAD probe failed with status {}",
                status
            )));
        }
        let total_bytes = response
            .headers()
            .get("content-length")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok())
            .ok_or_else(|| {
                StreamError::Parse("HEAD response missing Content-Length".to_string())
            })?;
        let supports_ranges = response
            .headers()
            .get("accept-ranges")
            .and_then(|v| v.to_str().ok())
            .map(|v| v.eq_ignore_ascii_case("bytes"))
            .unwrap_or(false);
        Ok(ResourceInfo {
            total_bytes,
            supports_ranges,
        })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str, interval: ByteInterval) -> Result<RangeFetch> {
        let range = range_header_value(&interval);
        debug!(url, %interval, range, "issuing range request");
        let response = self.client.get(url).header("Range", &range).send().await?;

        let status = response.status().as_u16();
        if status != 206 {
            warn!(url, status, "expected 206 Partial Content");
            return Err(StreamError::NonPartial { status });
        }

        let headers = response.headers().clone();
        if self.config.require_accept_ranges {
            let accepts = headers
                .get("accept-ranges")
                .and_then(|v| v.to_str().ok())
                .map(|v| v.eq_ignore_ascii_case("bytes"))
                .unwrap_or(false);
            if !accepts {
                return Err(StreamError::UnsupportedRanges);
            }
        }

        Ok(RangeFetch {
            status,
            headers,
            body: Box::new(HttpBody {
                response: Some(response),
            }),
        })
    }
}

/// Body adapter draining a reqwest response chunk by chunk
struct HttpBody {
    response: Option<reqwest::Response>,
}

#[async_trait]
impl ByteSource for HttpBody {
    async fn next_chunk(&mut self) -> Result<Option<Bytes>> {
        let Some(response) = self.response.as_mut() else {
            return Ok(None);
        };
        match response.chunk().await? {
            Some(chunk) => Ok(Some(chunk)),
            None => {
                self.response = None;
                Ok(None)
            }
        }
    }
}

/// In-memory byte source yielding a buffer in fixed-size chunks
///
/// Used by tests and by codec fixtures; also the shape the resolver
/// produces when an interval is satisfied entirely from spliced bytes.
pub struct BufferedSource {
    data: Bytes,
    chunk_size: usize,
    offset: usize,
}

impl BufferedSource {
    pub fn new(data: Bytes, chunk_size: usize) -> Self {
        BufferedSource {
            data,
            chunk_size: chunk_size.max(1),
            offset: 0,
        }
    }
}

#[async_trait]
impl ByteSource for BufferedSource {
    async fn next_chunk(&mut self) -> Result<Option<Bytes>> {
        if self.offset >= self.data.len() {
            return Ok(None);
        }
        let end = (self.offset + self.chunk_size).min(self.data.len());
        let chunk = self.data.slice(self.offset..end);
        self.offset = end;
        Ok(Some(chunk))
    }
}

/// A fetched prefix followed by a spliced tail
///
/// Built by the overlap resolver when part of a new interval's bytes are
/// reassigned from an existing response's buffer instead of being
/// re-requested.
pub(crate) struct ChainedSource {
    head: Option<Box<dyn ByteSource>>,
    tail: Option<Bytes>,
}

impl ChainedSource {
    pub(crate) fn new(head: Option<Box<dyn ByteSource>>, tail: Option<Bytes>) -> Self {
        ChainedSource { head, tail }
    }
}

#[async_trait]
impl ByteSource for ChainedSource {
    async fn next_chunk(&mut self) -> Result<Option<Bytes>> {
        if let Some(head) = self.head.as_mut() {
            if let Some(chunk) = head.next_chunk().await? {
                return Ok(Some(chunk));
            }
            self.head = None;
        }
        Ok(self.tail.take().filter(|tail| !tail.is_empty()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_range_parse() {
        let parsed = ContentRange::parse("bytes 0-10/11").unwrap();
        assert_eq!(parsed.first, 0);
        assert_eq!(parsed.last, 10);
        assert_eq!(parsed.total, 11);
    }

    #[test]
    fn test_content_range_rejects_malformed() {
        for value in [
            "0-10/11",
            "bytes 10-0/11",
            "bytes 0-11/11",
            "bytes 0-10",
            "bytes x-10/11",
        ] {
            assert!(ContentRange::parse(value).is_err(), "accepted {:?}", value);
        }
    }

    #[test]
    fn test_range_header_value() {
        let interval = ByteInterval::new(0, 3).unwrap();
        assert_eq!(range_header_value(&interval), "bytes=0-2");
        assert_eq!(range_header_value(&ByteInterval::EMPTY), "bytes=0-0");
    }

    #[tokio::test]
    async fn test_buffered_source_chunks() {
        let mut source = BufferedSource::new(Bytes::from_static(b"abcdef"), 4);
        assert_eq!(source.next_chunk().await.unwrap().unwrap(), &b"abcd"[..]);
        assert_eq!(source.next_chunk().await.unwrap().unwrap(), &b"ef"[..]);
        assert!(source.next_chunk().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_chained_source_order() {
        let head = BufferedSource::new(Bytes::from_static(b"abc"), 2);
        let mut chained =
            ChainedSource::new(Some(Box::new(head)), Some(Bytes::from_static(b"xyz")));
        let mut collected = Vec::new();
        while let Some(chunk) = chained.next_chunk().await.unwrap() {
            collected.extend_from_slice(&chunk);
        }
        assert_eq!(collected, b"abcxyz");
    }

    #[tokio::test]
    async fn test_chained_source_tail_only() {
        let mut chained = ChainedSource::new(None, Some(Bytes::from_static(b"pq")));
        assert_eq!(chained.next_chunk().await.unwrap().unwrap(), &b"pq"[..]);
        assert!(chained.next_chunk().await.unwrap().is_none());
    }
}
