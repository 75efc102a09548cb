//! Ordered map of disjoint byte intervals to live responses
//!
//! Keys are the external-interval starts at insertion time. Reads advance
//! a response's head offset without touching its key, so the map accepts
//! momentarily stale keys: every lookup re-checks the *current* external
//! interval, and [`RangeStore::normalize`] re-keys entries (and evicts
//! fully consumed ones) before each mutation of the map.

use crate::interval::ByteInterval;
use crate::response::RangeResponse;
use std::collections::BTreeMap;

/// Stable handle to a stored entry, also its insertion sequence number
pub type EntryId = u64;

pub(crate) struct StoredRange {
    pub(crate) response: RangeResponse,
    pub(crate) seq: EntryId,
}

#[derive(Default)]
pub struct RangeStore {
    /// Backing map, keyed by external start at insertion time
    entries: BTreeMap<u64, StoredRange>,
    next_seq: EntryId,
}

impl RangeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Insert a response whose external interval is disjoint from every
    /// stored entry, returning its stable id
    pub(crate) fn insert(&mut self, response: RangeResponse) -> EntryId {
        let external = response.external();
        debug_assert!(
            !external.is_empty(),
            "refusing to store an empty external interval"
        );
        debug_assert!(
            self.externals().iter().all(|e| !e.intersects(&external)),
            "stored intervals must stay disjoint"
        );
        let seq = self.next_seq;
        self.next_seq += 1;
        self.entries.insert(external.start, StoredRange { response, seq });
        seq
    }

    pub(crate) fn get(&self, id: EntryId) -> Option<&RangeResponse> {
        self.entries
            .values()
            .find(|entry| entry.seq == id)
            .map(|entry| &entry.response)
    }

    pub(crate) fn get_mut(&mut self, id: EntryId) -> Option<&mut RangeResponse> {
        self.entries
            .values_mut()
            .find(|entry| entry.seq == id)
            .map(|entry| &mut entry.response)
    }

    /// Remove an entry by id, dropping nothing: the response (and its
    /// body handle) is handed back to the caller
    pub(crate) fn remove(&mut self, id: EntryId) -> Option<RangeResponse> {
        let key = self
            .entries
            .iter()
            .find(|(_, entry)| entry.seq == id)
            .map(|(key, _)| *key)?;
        self.entries.remove(&key).map(|entry| entry.response)
    }

    /// Whether an entry with the given id is present
    pub(crate) fn contains(&self, id: EntryId) -> bool {
        self.entries.values().any(|entry| entry.seq == id)
    }

    /// Re-key entries whose head offset has advanced and evict entries
    /// whose external interval has emptied
    ///
    /// Must run before any key-based lookup or insertion; external
    /// intervals only ever shrink, so re-keying cannot collide.
    pub(crate) fn normalize(&mut self) {
        let stale: Vec<u64> = self
            .entries
            .iter()
            .filter(|(key, entry)| {
                entry.response.is_consumed() || entry.response.external().start != **key
            })
            .map(|(key, _)| *key)
            .collect();
        if stale.is_empty() {
            return;
        }
        let mut displaced = Vec::with_capacity(stale.len());
        for key in stale {
            if let Some(entry) = self.entries.remove(&key) {
                if !entry.response.is_consumed() {
                    displaced.push(entry);
                }
            }
        }
        for entry in displaced {
            self.entries.insert(entry.response.external().start, entry);
        }
    }

    /// The entry whose external interval equals `external` exactly
    pub(crate) fn find_exact(&self, external: ByteInterval) -> Option<EntryId> {
        self.entries
            .get(&external.start)
            .filter(|entry| entry.response.external() == external)
            .map(|entry| entry.seq)
    }

    /// The entry whose external interval contains `pos`, if any
    ///
    /// Assumes a normalized map.
    pub(crate) fn find_containing(&self, pos: u64) -> Option<EntryId> {
        self.entries
            .range(..=pos)
            .next_back()
            .filter(|(_, entry)| entry.response.external().contains(pos))
            .map(|(_, entry)| entry.seq)
    }

    /// Entries whose external intervals intersect `query`, ascending
    ///
    /// Assumes a normalized map.
    pub(crate) fn intersecting(&self, query: ByteInterval) -> Vec<(EntryId, ByteInterval)> {
        let mut found = Vec::new();
        for (_, entry) in self.entries.range(..query.stop).rev() {
            let external = entry.response.external();
            // Disjoint ascending intervals: once one ends at or before the
            // query, everything further left does too.
            if external.stop <= query.start {
                break;
            }
            found.push((entry.seq, external));
        }
        found.reverse();
        found
    }

    /// External intervals in ascending start order
    pub fn externals(&self) -> Vec<ByteInterval> {
        let mut externals: Vec<ByteInterval> = self
            .entries
            .values()
            .map(|entry| entry.response.external())
            .filter(|external| !external.is_empty())
            .collect();
        externals.sort();
        externals
    }

    /// Smallest interval containing every stored external interval
    pub fn spanning(&self) -> Option<ByteInterval> {
        let externals = self.externals();
        let first = externals.first()?;
        let last = externals.last()?;
        Some(first.span(last))
    }

    /// The most recently inserted entry still present
    pub(crate) fn most_recent(&self) -> Option<EntryId> {
        self.entries.values().map(|entry| entry.seq).max()
    }
}
