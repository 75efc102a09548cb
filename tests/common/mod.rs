//! Shared fixtures for the integration tests: an in-memory fetcher with a
//! request log, and a wiremock origin that honours Range requests.

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use http::HeaderMap;
use range_stream::{BufferedSource, ByteInterval, Fetcher, RangeFetch, Result, StreamError};
use std::sync::{Arc, Mutex};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// The 11-byte resource used across the scenario tests
pub const EXAMPLE_DATA: &[u8] = b"PK\x03\x04_0123\x00\x00";

/// In-memory [`Fetcher`] serving slices of a fixed buffer
///
/// Every fetch (probes included) is appended to a log so tests can assert
/// exactly what went "on the wire".
pub struct StaticFetcher {
    data: Bytes,
    chunk_size: usize,
    log: Mutex<Vec<ByteInterval>>,
}

impl StaticFetcher {
    pub fn new(data: impl Into<Bytes>) -> Arc<Self> {
        Self::with_chunk_size(data, 4)
    }

    pub fn with_chunk_size(data: impl Into<Bytes>, chunk_size: usize) -> Arc<Self> {
        Arc::new(StaticFetcher {
            data: data.into(),
            chunk_size,
            log: Mutex::new(Vec::new()),
        })
    }

    /// Intervals fetched so far, in request order
    pub fn fetch_log(&self) -> Vec<ByteInterval> {
        self.log.lock().unwrap().clone()
    }

    /// Number of fetches issued so far
    pub fn fetch_count(&self) -> usize {
        self.log.lock().unwrap().len()
    }

    /// Total payload bytes that crossed the simulated wire
    pub fn bytes_fetched(&self) -> u64 {
        self.log
            .lock()
            .unwrap()
            .iter()
            .map(|interval| interval.length().max(1))
            .sum()
    }
}

#[async_trait]
impl Fetcher for StaticFetcher {
    async fn fetch(&self, _url: &str, interval: ByteInterval) -> Result<RangeFetch> {
        self.log.lock().unwrap().push(interval);
        let total = self.data.len() as u64;
        let (first, last) = match interval.termini() {
            Ok(termini) => termini,
            Err(_) => (0, 0),
        };
        if last >= total {
            return Err(StreamError::Network(format!(
                "range {}-{} not satisfiable for {} bytes",
                first, last, total
            )));
        }

        let mut headers = HeaderMap::new();
        headers.insert(
            "content-range",
            format!("bytes {}-{}/{}", first, last, total)
                .parse()
                .unwrap(),
        );
        headers.insert("accept-ranges", "bytes".parse().unwrap());

        let body = self.data.slice(first as usize..=last as usize);
        Ok(RangeFetch {
            status: 206,
            headers,
            body: Box::new(BufferedSource::new(body, self.chunk_size)),
        })
    }
}

/// Route tracing output through the test harness (idempotent)
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// Spin up a wiremock origin serving `data` at `/data.bin` with real
/// Range request semantics
pub async fn mock_range_origin(data: Vec<u8>) -> MockServer {
    init_tracing();
    let server = MockServer::start().await;
    let total = data.len();

    Mock::given(method("GET"))
        .and(path("/data.bin"))
        .respond_with(move |request: &wiremock::Request| {
            let header = request
                .headers
                .get("range")
                .and_then(|value| value.to_str().ok())
                .unwrap_or("");
            let Some((first, last)) = parse_range_header(header) else {
                return ResponseTemplate::new(200).set_body_bytes(data.clone());
            };
            let last = last.min(total.saturating_sub(1));
            if first > last {
                return ResponseTemplate::new(416);
            }
            ResponseTemplate::new(206)
                .insert_header(
                    "content-range",
                    format!("bytes {}-{}/{}", first, last, total).as_str(),
                )
                .insert_header("accept-ranges", "bytes")
                .set_body_bytes(data[first..=last].to_vec())
        })
        .mount(&server)
        .await;

    Mock::given(method("HEAD"))
        .and(path("/data.bin"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-length", total.to_string().as_str())
                .insert_header("accept-ranges", "bytes"),
        )
        .mount(&server)
        .await;

    server
}

/// Parse `bytes=a-b` into inclusive endpoints
fn parse_range_header(header: &str) -> Option<(usize, usize)> {
    let rest = header.strip_prefix("bytes=")?;
    let (first, last) = rest.split_once('-')?;
    Some((first.parse().ok()?, last.parse().ok()?))
}
