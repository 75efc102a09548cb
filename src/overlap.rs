//! Overlap classification and resolution planning
//!
//! When a new interval is added over existing entries, each intersecting
//! entry is classified by where the newcomer lands on it, and the pruning
//! policy turns those classifications into a staged plan: which entries to
//! burn, which heads to advance, which tails to mark, what (if anything)
//! still has to be fetched, and which already-buffered bytes can be
//! spliced into the newcomer instead of being re-requested.
//!
//! Plans are pure data. The stream applies them only after the network
//! fetch has succeeded, so a failed `add` leaves the map untouched.

use crate::error::{Result, StreamError};
use crate::interval::ByteInterval;
use crate::store::EntryId;

/// Policy governing what happens when a new interval overlaps stored ones
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PruningLevel {
    /// Resize overlapped entries so both survive disjointly (default)
    #[default]
    Replant = 0,
    /// Drop every overlapped entry and fetch the newcomer whole
    Burn = 1,
    /// Refuse to add overlapping intervals
    Strict = 2,
}

/// How a new interval `N` lands on one stored external interval `E`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverlapKind {
    /// `N` covers `E`'s leading bytes only
    Head,
    /// `N` covers `E`'s trailing bytes only
    Tail,
    /// `N` fully contains `E`
    HeadToTail,
    /// `N` lies strictly inside `E`
    MutualSubsumption,
}

/// Classify a non-empty overlap of `new` with `existing`
///
/// Returns `None` when the intervals are disjoint. Equal endpoints follow
/// the inequalities exactly: containment with shared endpoints counts as
/// [`OverlapKind::HeadToTail`].
pub fn classify(new: &ByteInterval, existing: &ByteInterval) -> Option<OverlapKind> {
    if !new.intersects(existing) {
        return None;
    }
    let kind = if new.start <= existing.start && existing.stop <= new.stop {
        OverlapKind::HeadToTail
    } else if new.start <= existing.start {
        OverlapKind::Head
    } else if existing.stop <= new.stop {
        OverlapKind::Tail
    } else {
        OverlapKind::MutualSubsumption
    };
    Some(kind)
}

/// One staged mutation of the store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StagedAction {
    /// Remove the entry (and drop its body)
    Burn { id: EntryId },
    /// Advance the entry's consumed head so its external interval starts
    /// at `to`
    AdvanceHead { id: EntryId, to: u64 },
    /// Grow the entry's tail mark by `by` bytes
    MarkTail { id: EntryId, by: u64 },
}

/// Bytes to copy out of an existing entry's buffer into the newcomer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SplicePlan {
    pub(crate) source: EntryId,
    /// Absolute positions to copy; always a suffix of the new interval
    pub(crate) range: ByteInterval,
}

/// The staged outcome of resolving one `add`
#[derive(Debug)]
pub(crate) struct ResolutionPlan {
    pub(crate) actions: Vec<StagedAction>,
    /// What still has to go on the wire; `None` when splicing covers the
    /// whole interval
    pub(crate) fetch: Option<ByteInterval>,
    pub(crate) splice: Option<SplicePlan>,
}

/// Build the plan for inserting `new` over the given intersecting entries
/// (ascending, externals current) under `policy`
pub(crate) fn plan_resolution(
    intersecting: &[(EntryId, ByteInterval)],
    new: ByteInterval,
    policy: PruningLevel,
) -> Result<ResolutionPlan> {
    if intersecting.is_empty() {
        return Ok(ResolutionPlan {
            actions: Vec::new(),
            fetch: Some(new),
            splice: None,
        });
    }

    match policy {
        PruningLevel::Strict => Err(StreamError::OverlapDisallowed {
            start: new.start,
            stop: new.stop,
        }),
        PruningLevel::Burn => Ok(ResolutionPlan {
            actions: intersecting
                .iter()
                .map(|(id, _)| StagedAction::Burn { id: *id })
                .collect(),
            fetch: Some(new),
            splice: None,
        }),
        PruningLevel::Replant => plan_replant(intersecting, new),
    }
}

/// Replant: walk intersecting entries left to right. Stored intervals are
/// disjoint, so at most the first can be tail-overlapped, at most the
/// last head-overlapped, and a mutually-subsuming entry stands alone.
fn plan_replant(
    intersecting: &[(EntryId, ByteInterval)],
    new: ByteInterval,
) -> Result<ResolutionPlan> {
    let mut actions = Vec::with_capacity(intersecting.len());
    let mut fetch_stop = new.stop;
    let mut splice = None;
    let mut fetch_needed = true;

    for (id, existing) in intersecting {
        let id = *id;
        match classify(&new, existing).expect("intersecting entries must overlap") {
            OverlapKind::HeadToTail => {
                // A fully covered entry cannot be resized into anything
                // non-empty; drop it whole.
                actions.push(StagedAction::Burn { id });
            }
            OverlapKind::Tail => {
                // Truncate the survivor down to [existing.start, new.start).
                let by = existing.stop - new.start;
                if by >= existing.length() {
                    actions.push(StagedAction::Burn { id });
                } else {
                    actions.push(StagedAction::MarkTail { id, by });
                }
            }
            OverlapKind::Head => {
                // The overlapped prefix of the entry is reassigned to the
                // newcomer: the entry's head advances past it, and the
                // newcomer takes those bytes from the entry's stream
                // rather than fetching them again.
                let cut = new.stop.min(existing.stop);
                if cut >= existing.stop {
                    actions.push(StagedAction::Burn { id });
                } else {
                    actions.push(StagedAction::AdvanceHead { id, to: cut });
                }
                splice = Some(SplicePlan {
                    source: id,
                    range: ByteInterval {
                        start: existing.start,
                        stop: cut,
                    },
                });
                fetch_stop = existing.start;
            }
            OverlapKind::MutualSubsumption => {
                // The entry keeps only its prefix before the newcomer; the
                // newcomer's bytes all come out of the entry's stream, and
                // no part of the entry after the newcomer survives.
                let by = existing.stop - new.start;
                if by >= existing.length() {
                    actions.push(StagedAction::Burn { id });
                } else {
                    actions.push(StagedAction::MarkTail { id, by });
                }
                splice = Some(SplicePlan {
                    source: id,
                    range: new,
                });
                fetch_needed = false;
            }
        }
    }

    let fetch = ByteInterval {
        start: new.start,
        stop: fetch_stop,
    };
    Ok(ResolutionPlan {
        actions,
        fetch: (fetch_needed && !fetch.is_empty()).then_some(fetch),
        splice,
    })
}
