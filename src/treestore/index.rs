//! # Versioned Index
//!
//! The in-memory ordered map at the heart of the tree engine: one global
//! structure keyed by `(table-or-index id, encoded key)` mapping to the
//! key's current committed version and payload (or tombstone).
//!
//! ## Snapshots
//!
//! The index is built on [`PMap`](super::pmap::PMap), so `snapshot()` is an
//! O(1) structural-sharing clone. A transaction reads against its snapshot
//! for its whole lifetime; commits replace the live map without touching
//! any snapshot already handed out.
//!
//! ## Tombstones
//!
//! Deletes are recorded as entries with no row. They stay in the index so
//! conflict detection can see the version at which a key died - a key
//! deleted after a transaction's snapshot must still fail that
//! transaction's write at commit. Scans therefore yield tombstones too;
//! the merge layer above filters them.
//!
//! ## Conflict Check
//!
//! For every key a transaction wrote, the commit coordinator asks: does the
//! *current* committed entry for that key carry a version newer than the
//! snapshot the transaction read from? If so the transaction lost the race
//! and must abort. Entries created after the snapshot always have newer
//! versions, so insert-insert races are caught by the same rule.

use super::pmap::{PMap, PRange};
use crate::error::StoreError;
use crate::types::Row;
use eyre::Result;
use std::ops::Bound;

pub use crate::types::SlotId;

/// Composite map key: key space id, then the order-preserving encoded key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct EntryKey {
    pub id: SlotId,
    pub key: Vec<u8>,
}

impl EntryKey {
    pub fn new(id: SlotId, key: Vec<u8>) -> Self {
        Self { id, key }
    }
}

/// A committed version of a key: the commit version that wrote it and the
/// row payload, or `None` for a tombstone.
#[derive(Debug, Clone)]
pub struct VersionedEntry {
    pub version: u64,
    pub row: Option<Row>,
}

#[derive(Clone, Default)]
pub struct VersionedIndex {
    map: PMap<EntryKey, VersionedEntry>,
    version: u64,
}

impl std::fmt::Debug for VersionedIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VersionedIndex")
            .field("version", &self.version)
            .finish_non_exhaustive()
    }
}

impl VersionedIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// The highest committed version this index has seen.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// O(1) copy-on-write snapshot; later mutations of `self` never affect
    /// the returned handle.
    pub fn snapshot(&self) -> VersionedIndex {
        self.clone()
    }

    pub fn get(&self, id: SlotId, key: &[u8]) -> Option<&VersionedEntry> {
        self.map.get(&EntryKey::new(id, key.to_vec()))
    }

    /// Ordered scan of one key space, bounds inclusive, tombstones included
    /// (callers merge and filter).
    pub fn scan(
        &self,
        id: SlotId,
        lo: Option<&[u8]>,
        hi: Option<&[u8]>,
    ) -> PRange<EntryKey, VersionedEntry> {
        let lo_key = EntryKey::new(id, lo.map_or_else(Vec::new, <[u8]>::to_vec));
        let hi_key = match hi {
            Some(hi) => EntryKey::new(id, hi.to_vec()),
            // Key spaces are disjoint in id order, so the first key of the
            // next id bounds an open-ended scan.
            None => EntryKey::new(id + 1, Vec::new()),
        };
        let hi_bound = if hi.is_some() {
            Bound::Included(&hi_key)
        } else {
            Bound::Excluded(&hi_key)
        };
        self.map.range(Bound::Included(&lo_key), hi_bound)
    }

    /// Commit-time validation: every written key must still be at a version
    /// no newer than the writer's snapshot.
    pub fn check_conflict<'a>(
        &self,
        keys: impl IntoIterator<Item = &'a EntryKey>,
        base_version: u64,
    ) -> Result<()> {
        for key in keys {
            if let Some(entry) = self.map.get(key) {
                if entry.version > base_version {
                    return Err(StoreError::Conflict(format!(
                        "key space {} written at version {} after snapshot {}",
                        key.id, entry.version, base_version
                    ))
                    .into());
                }
            }
        }
        Ok(())
    }

    /// Publishes a committed delta at `version`. Deleted keys become
    /// tombstones rather than disappearing.
    pub fn apply(&mut self, version: u64, changes: impl IntoIterator<Item = (EntryKey, Option<Row>)>) {
        for (key, row) in changes {
            self.map.insert(key, VersionedEntry { version, row });
        }
        self.version = version;
    }

    /// Used only by WAL replay, which installs records in file order and
    /// must end up at the highest version seen.
    pub fn set_version(&mut self, version: u64) {
        self.version = version;
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::is_conflict;
    use crate::types::Value;

    fn row(n: i64) -> Row {
        vec![Value::Int(n)]
    }

    fn key(b: u8) -> Vec<u8> {
        vec![b]
    }

    #[test]
    fn apply_and_get() {
        let mut index = VersionedIndex::new();
        index.apply(1, vec![(EntryKey::new(7, key(1)), Some(row(10)))]);

        let entry = index.get(7, &key(1)).unwrap();
        assert_eq!(entry.version, 1);
        assert_eq!(entry.row, Some(row(10)));
        assert!(index.get(8, &key(1)).is_none());
        assert_eq!(index.version(), 1);
    }

    #[test]
    fn tombstones_are_kept_with_their_version() {
        let mut index = VersionedIndex::new();
        index.apply(1, vec![(EntryKey::new(1, key(1)), Some(row(1)))]);
        index.apply(2, vec![(EntryKey::new(1, key(1)), None)]);

        let entry = index.get(1, &key(1)).unwrap();
        assert_eq!(entry.version, 2);
        assert!(entry.row.is_none());
    }

    #[test]
    fn snapshot_is_isolated_from_later_commits() {
        let mut index = VersionedIndex::new();
        index.apply(1, vec![(EntryKey::new(1, key(1)), Some(row(1)))]);

        let snapshot = index.snapshot();
        index.apply(2, vec![(EntryKey::new(1, key(1)), Some(row(2)))]);

        assert_eq!(snapshot.get(1, &key(1)).unwrap().row, Some(row(1)));
        assert_eq!(index.get(1, &key(1)).unwrap().row, Some(row(2)));
        assert_eq!(snapshot.version(), 1);
    }

    #[test]
    fn scan_stays_within_key_space() {
        let mut index = VersionedIndex::new();
        index.apply(
            1,
            vec![
                (EntryKey::new(1, key(9)), Some(row(19))),
                (EntryKey::new(2, key(1)), Some(row(21))),
                (EntryKey::new(2, key(2)), Some(row(22))),
                (EntryKey::new(3, key(0)), Some(row(30))),
            ],
        );

        let seen: Vec<Vec<u8>> = index.scan(2, None, None).map(|(k, _)| k.key).collect();
        assert_eq!(seen, vec![key(1), key(2)]);
    }

    #[test]
    fn scan_bounds_are_inclusive() {
        let mut index = VersionedIndex::new();
        index.apply(
            1,
            (1u8..=5)
                .map(|b| (EntryKey::new(1, key(b)), Some(row(b as i64))))
                .collect::<Vec<_>>(),
        );

        let seen: Vec<Vec<u8>> = index
            .scan(1, Some(&key(2)), Some(&key(4)))
            .map(|(k, _)| k.key)
            .collect();
        assert_eq!(seen, vec![key(2), key(3), key(4)]);
    }

    #[test]
    fn conflict_when_key_newer_than_snapshot() {
        let mut index = VersionedIndex::new();
        index.apply(5, vec![(EntryKey::new(1, key(1)), Some(row(1)))]);

        let touched = [EntryKey::new(1, key(1))];
        assert!(index.check_conflict(&touched, 5).is_ok());
        let err = index.check_conflict(&touched, 4).unwrap_err();
        assert!(is_conflict(&err));
    }

    #[test]
    fn conflict_check_sees_tombstones() {
        let mut index = VersionedIndex::new();
        index.apply(3, vec![(EntryKey::new(1, key(1)), None)]);

        let touched = [EntryKey::new(1, key(1))];
        let err = index.check_conflict(&touched, 2).unwrap_err();
        assert!(is_conflict(&err));
    }

    #[test]
    fn absent_keys_never_conflict() {
        let index = VersionedIndex::new();
        let touched = [EntryKey::new(1, key(1))];
        assert!(index.check_conflict(&touched, 0).is_ok());
    }

}
