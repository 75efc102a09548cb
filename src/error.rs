//! Error types for the range-stream crate

use thiserror::Error;

/// Result type alias for stream operations
pub type Result<T> = std::result::Result<T, StreamError>;

/// Error types that can occur while building or consuming a range stream
#[derive(Error, Debug)]
pub enum StreamError {
    #[error("total length unknown: no response has been received yet")]
    LengthUnknown,

    #[error("empty interval has no termini")]
    EmptyInterval,

    #[error("invalid interval: {0}")]
    InvalidInterval(String),

    #[error("interval [{start}, {stop}) exceeds total length {total}")]
    OutOfRange { start: i64, stop: i64, total: u64 },

    #[error("interval [{start}, {stop}) overlaps a stored range under the strict pruning policy")]
    OverlapDisallowed { start: u64, stop: u64 },

    #[error("no active range: call add() before read/seek/tell")]
    NoActiveRange,

    #[error("cannot seek to {target}: {consumed} bytes already consumed from the head")]
    SeekBehindConsumed { target: u64, consumed: u64 },

    #[error("tail mark of {requested} bytes would cross the consumed head of a {len}-byte range")]
    TailOverrun { requested: u64, len: u64 },

    #[error("network error: {0}")]
    Network(String),

    #[error("origin returned status {status} instead of 206 Partial Content")]
    NonPartial { status: u16 },

    #[error("origin does not advertise Accept-Ranges: bytes")]
    UnsupportedRanges,

    #[error("configuration error: {0}")]
    Config(String),

    #[error("parse error: {0}")]
    Parse(String),
}

impl From<reqwest::Error> for StreamError {
    fn from(err: reqwest::Error) -> Self {
        StreamError::Network(err.to_string())
    }
}

impl StreamError {
    /// Create an `OutOfRange` error from resolved endpoints
    pub fn out_of_range(start: i64, stop: i64, total: u64) -> Self {
        StreamError::OutOfRange { start, stop, total }
    }

    /// Whether the error originated in the transport rather than the
    /// bookkeeping core. Transport errors leave the store untouched and the
    /// failed `add` may simply be reissued.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            StreamError::Network(_)
                | StreamError::NonPartial { .. }
                | StreamError::UnsupportedRanges
        )
    }
}
