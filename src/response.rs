//! Streaming buffer over a single range request
//!
//! A [`RangeResponse`] owns the lazy body of one `Range` GET and exposes a
//! file-like cursor over the portion of the request it still owns. Two
//! monotone offsets shrink that portion as the stream evolves:
//!
//! - the *head offset* counts bytes consumed from the front, either by
//!   reads or by the overlap resolver reassigning a prefix to a newer
//!   range;
//! - the *tail mark* virtually truncates the back without discarding
//!   anything already buffered.
//!
//! The externally visible interval is
//! `[request.start + head_offset, request.stop - tail_mark)`; the interval
//! map guarantees these are pairwise disjoint across live responses.

use crate::error::{Result, StreamError};
use crate::fetcher::ByteSource;
use crate::interval::ByteInterval;
use bytes::{Bytes, BytesMut};
use std::io::SeekFrom;

pub struct RangeResponse {
    /// The interval sent on the wire; never changes after creation
    request_interval: ByteInterval,
    /// Label attached by codecs (e.g. an archive member name)
    name: String,
    body: Box<dyn ByteSource>,
    /// Bytes drained from `body` so far; position `i` of the buffer is
    /// byte `request_interval.start + i` of the resource
    buffered: BytesMut,
    head_offset: u64,
    tail_mark: u64,
    body_done: bool,
}

impl RangeResponse {
    pub fn new(request_interval: ByteInterval, body: Box<dyn ByteSource>) -> Self {
        RangeResponse {
            request_interval,
            name: String::new(),
            body,
            buffered: BytesMut::new(),
            head_offset: 0,
            tail_mark: 0,
            body_done: false,
        }
    }

    pub fn with_name(request_interval: ByteInterval, body: Box<dyn ByteSource>, name: impl Into<String>) -> Self {
        let mut response = Self::new(request_interval, body);
        response.name = name.into();
        response
    }

    /// The interval originally requested on the wire
    pub fn request_interval(&self) -> ByteInterval {
        self.request_interval
    }

    /// The portion of the request still externally visible
    pub fn external(&self) -> ByteInterval {
        ByteInterval {
            start: self.request_interval.start + self.head_offset,
            stop: self.request_interval.stop - self.tail_mark,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn head_offset(&self) -> u64 {
        self.head_offset
    }

    pub fn tail_mark(&self) -> u64 {
        self.tail_mark
    }

    /// Absolute position of the read cursor
    pub fn tell(&self) -> u64 {
        self.request_interval.start + self.head_offset
    }

    /// Whether every externally visible byte has been consumed
    pub fn is_consumed(&self) -> bool {
        self.head_offset + self.tail_mark >= self.request_interval.length()
    }

    /// Virtually truncate the tail by `n` bytes
    ///
    /// # Returns
    /// * `Err(StreamError::TailOverrun)` if the mark would cross the
    ///   consumed head
    pub fn mark_tail(&mut self, n: u64) -> Result<()> {
        let len = self.request_interval.length();
        if self.head_offset + self.tail_mark + n > len {
            return Err(StreamError::TailOverrun { requested: n, len });
        }
        self.tail_mark += n;
        Ok(())
    }

    /// Read up to `n` bytes from the cursor, draining the body as needed
    ///
    /// Stops at the tail-marked end of the range; at end-of-range an empty
    /// buffer is returned. The body is never drained past the tail mark.
    pub async fn read(&mut self, n: usize) -> Result<Bytes> {
        let limit = self.request_interval.length() - self.tail_mark;
        let want = (self.head_offset + n as u64).min(limit);
        if want <= self.head_offset {
            return Ok(Bytes::new());
        }
        self.drain_to(want).await?;
        let avail = want.min(self.buffered.len() as u64);
        if avail <= self.head_offset {
            return Ok(Bytes::new());
        }
        let out = Bytes::copy_from_slice(&self.buffered[self.head_offset as usize..avail as usize]);
        self.head_offset = avail;
        Ok(out)
    }

    /// Read everything up to the tail-marked end of the range
    pub async fn read_all(&mut self) -> Result<Bytes> {
        let remaining = self.external().length();
        self.read(remaining as usize).await
    }

    /// Move the read cursor, in absolute resource coordinates
    ///
    /// `Start` positions are absolute; `Current` is relative to [`tell`];
    /// `End` is relative to the tail-marked end of the range. Forward
    /// seeks discard the skipped bytes (they count as consumed); seeking
    /// below the consumed head fails with
    /// [`StreamError::SeekBehindConsumed`]. Targets past the end of the
    /// range are clamped to it.
    ///
    /// [`tell`]: RangeResponse::tell
    pub fn seek(&mut self, from: SeekFrom) -> Result<u64> {
        let external_stop = self.request_interval.stop - self.tail_mark;
        let target: i128 = match from {
            SeekFrom::Start(pos) => pos as i128,
            SeekFrom::Current(delta) => self.tell() as i128 + delta as i128,
            SeekFrom::End(delta) => external_stop as i128 + delta as i128,
        };
        let floor = self.tell() as i128;
        if target < floor {
            return Err(StreamError::SeekBehindConsumed {
                target: target.max(0) as u64,
                consumed: self.head_offset,
            });
        }
        let target = (target as u64).min(external_stop);
        self.head_offset = target - self.request_interval.start;
        Ok(target)
    }

    /// Advance the consumed head so the external interval starts at `abs`
    ///
    /// Resolver-only: reassigns the prefix `[tell(), abs)` away from this
    /// response without touching its buffer.
    pub(crate) fn advance_head_to(&mut self, abs: u64) {
        debug_assert!(abs >= self.tell());
        debug_assert!(abs <= self.request_interval.stop - self.tail_mark);
        self.head_offset = abs - self.request_interval.start;
    }

    /// Ensure the buffer covers absolute positions up to `abs`
    pub(crate) async fn drain_to_abs(&mut self, abs: u64) -> Result<()> {
        let rel = abs.saturating_sub(self.request_interval.start);
        self.drain_to(rel.min(self.request_interval.length())).await
    }

    /// Copy already-buffered bytes for an absolute sub-interval
    ///
    /// The caller drains first; if the body ended short of the request,
    /// the copy is truncated to what actually arrived.
    pub(crate) fn copy_buffered(&self, interval: ByteInterval) -> Bytes {
        let lo = interval
            .start
            .saturating_sub(self.request_interval.start)
            .min(self.buffered.len() as u64) as usize;
        let hi = interval
            .stop
            .saturating_sub(self.request_interval.start)
            .min(self.buffered.len() as u64) as usize;
        Bytes::copy_from_slice(&self.buffered[lo..hi])
    }

    /// Drain body chunks into the buffer until it covers `rel` bytes of
    /// the request, or the body ends
    async fn drain_to(&mut self, rel: u64) -> Result<()> {
        while !self.body_done && (self.buffered.len() as u64) < rel {
            match self.body.next_chunk().await? {
                Some(chunk) => self.buffered.extend_from_slice(&chunk),
                None => self.body_done = true,
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for RangeResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RangeResponse")
            .field("request_interval", &self.request_interval)
            .field("external", &self.external())
            .field("buffered", &self.buffered.len())
            .field("name", &self.name)
            .finish()
    }
}
