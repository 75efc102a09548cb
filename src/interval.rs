//! Core interval model for byte-addressed ranges
//!
//! All bookkeeping is done on half-open `[start, stop)` intervals over
//! `u64` byte positions. End-relative inputs (negative endpoints, open
//! stop) exist only at the `add` surface and resolve to absolute
//! intervals before anything is stored.

use crate::error::{Result, StreamError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A half-open `[start, stop)` interval of byte positions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ByteInterval {
    /// Starting byte position (inclusive)
    pub start: u64,
    /// Ending byte position (exclusive)
    pub stop: u64,
}

impl fmt::Display for ByteInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.stop)
    }
}

impl ByteInterval {
    /// The empty interval `[0, 0)`
    pub const EMPTY: ByteInterval = ByteInterval { start: 0, stop: 0 };

    /// Create a new interval
    ///
    /// # Returns
    /// * `Ok(ByteInterval)` if `start <= stop`
    /// * `Err(StreamError::InvalidInterval)` otherwise
    pub fn new(start: u64, stop: u64) -> Result<Self> {
        if start > stop {
            return Err(StreamError::InvalidInterval(format!(
                "start ({}) must be <= stop ({})",
                start, stop
            )));
        }
        Ok(ByteInterval { start, stop })
    }

    /// Number of byte positions covered
    pub fn length(&self) -> u64 {
        self.stop - self.start
    }

    /// Whether the interval covers no positions
    pub fn is_empty(&self) -> bool {
        self.start == self.stop
    }

    /// The inclusive `(first, last)` byte positions
    ///
    /// # Returns
    /// * `Err(StreamError::EmptyInterval)` on the empty interval, which has
    ///   no first or last position
    pub fn termini(&self) -> Result<(u64, u64)> {
        if self.is_empty() {
            return Err(StreamError::EmptyInterval);
        }
        Ok((self.start, self.stop - 1))
    }

    /// Whether `pos` lies within the interval
    pub fn contains(&self, pos: u64) -> bool {
        self.start <= pos && pos < self.stop
    }

    /// Whether any byte position lies in both intervals
    pub fn intersects(&self, other: &ByteInterval) -> bool {
        self.start < other.stop && other.start < self.stop
    }

    /// The common sub-interval, or `None` when disjoint
    pub fn intersection(&self, other: &ByteInterval) -> Option<ByteInterval> {
        let start = self.start.max(other.start);
        let stop = self.stop.min(other.stop);
        if start < stop {
            Some(ByteInterval { start, stop })
        } else {
            None
        }
    }

    /// The smallest interval containing both inputs
    pub fn span(&self, other: &ByteInterval) -> ByteInterval {
        ByteInterval {
            start: self.start.min(other.start),
            stop: self.stop.max(other.stop),
        }
    }

    /// Check both endpoints against a known total length
    pub fn check_within(&self, total: u64) -> Result<()> {
        if self.stop > total {
            return Err(StreamError::out_of_range(
                self.start as i64,
                self.stop as i64,
                total,
            ));
        }
        Ok(())
    }
}

/// An interval as accepted by [`RangeStream::add`](crate::RangeStream::add):
/// either endpoint may be negative (counted back from the end of the
/// resource) and the stop may be left open to mean end-of-file.
///
/// Resolution against the resource's total length produces an absolute
/// [`ByteInterval`]; it fails with [`StreamError::LengthUnknown`] if an
/// end-relative form is used before any response has revealed the length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntervalSpec {
    /// Starting position; negative values count back from the end
    pub start: i64,
    /// Ending position; negative counts back from the end, `None` means
    /// the end of the resource
    pub stop: Option<i64>,
}

impl IntervalSpec {
    pub fn new(start: i64, stop: impl Into<Option<i64>>) -> Self {
        IntervalSpec {
            start,
            stop: stop.into(),
        }
    }

    /// Whether resolution requires the total length to be known
    pub fn is_end_relative(&self) -> bool {
        self.start < 0 || self.stop.is_none() || self.stop.is_some_and(|s| s < 0)
    }

    /// Resolve to an absolute interval against an optionally-known total
    /// length
    ///
    /// # Returns
    /// * `Err(StreamError::LengthUnknown)` for an end-relative spec with no
    ///   known length
    /// * `Err(StreamError::OutOfRange)` if a negative endpoint reaches
    ///   before position zero
    /// * `Err(StreamError::InvalidInterval)` if the resolved start exceeds
    ///   the resolved stop
    pub fn resolve(&self, total: Option<u64>) -> Result<ByteInterval> {
        let total = match total {
            Some(total) => total,
            None if self.is_end_relative() => return Err(StreamError::LengthUnknown),
            // Absolute endpoints need no length; bounds are checked later,
            // once the first response reports one.
            None => 0,
        };
        let start = self.resolve_endpoint(self.start, total)?;
        let stop = match self.stop {
            None => total,
            Some(stop) => self.resolve_endpoint(stop, total)?,
        };
        if start > stop {
            return Err(StreamError::InvalidInterval(format!(
                "start ({}) resolves past stop ({})",
                start, stop
            )));
        }
        Ok(ByteInterval { start, stop })
    }

    fn resolve_endpoint(&self, endpoint: i64, total: u64) -> Result<u64> {
        if endpoint >= 0 {
            return Ok(endpoint as u64);
        }
        let back = endpoint.unsigned_abs();
        if back > total {
            return Err(StreamError::out_of_range(
                self.start,
                self.stop.unwrap_or(0),
                total,
            ));
        }
        Ok(total - back)
    }
}

impl From<ByteInterval> for IntervalSpec {
    fn from(interval: ByteInterval) -> Self {
        IntervalSpec {
            start: interval.start as i64,
            stop: Some(interval.stop as i64),
        }
    }
}

impl From<(i64, i64)> for IntervalSpec {
    fn from((start, stop): (i64, i64)) -> Self {
        IntervalSpec {
            start,
            stop: Some(stop),
        }
    }
}

impl From<(i64, Option<i64>)> for IntervalSpec {
    fn from((start, stop): (i64, Option<i64>)) -> Self {
        IntervalSpec { start, stop }
    }
}

impl From<std::ops::Range<u64>> for IntervalSpec {
    fn from(range: std::ops::Range<u64>) -> Self {
        IntervalSpec {
            start: range.start as i64,
            stop: Some(range.end as i64),
        }
    }
}
