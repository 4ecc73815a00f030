//! Per-transaction state for the tree engine: a copy-on-write snapshot
//! pinned at begin, plus an ordered private delta of uncommitted writes.
//!
//! The delta keeps a small per-key chain of `(statement id, row |
//! tombstone)` entries, newest first. Reads resolve to the newest entry
//! from an *earlier* statement, which is what makes a statement blind to
//! its own writes; a chain whose entries are all from the current
//! statement does not shadow the snapshot. Statement rollback peels
//! current-statement entries off the chains and commit publishes each
//! chain's newest entry.

use super::index::{EntryKey, VersionedIndex};
use super::TreeShared;
use crate::store::session::TxCore;
use crate::types::{Row, SlotId};
use eyre::Result;
use smallvec::SmallVec;
use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::Arc;

type Chain = SmallVec<[(u32, Option<Row>); 2]>;

pub(crate) struct TreeTx {
    shared: Arc<TreeShared>,
    snapshot: VersionedIndex,
    base_version: u64,
    sid: u32,
    delta: BTreeMap<EntryKey, Chain>,
    tracked: Vec<EntryKey>,
}

impl TreeTx {
    pub(crate) fn begin(shared: Arc<TreeShared>) -> Self {
        let (snapshot, base_version) = {
            let state = shared.state.lock();
            (state.index.snapshot(), state.index.version())
        };
        Self {
            shared,
            snapshot,
            base_version,
            sid: 0,
            delta: BTreeMap::new(),
            tracked: Vec::new(),
        }
    }

    /// Newest delta entry visible at the current statement, if any.
    fn visible_in_chain(chain: &Chain, sid: u32) -> Option<&Option<Row>> {
        chain.iter().find(|(s, _)| *s < sid).map(|(_, row)| row)
    }
}

impl TxCore for TreeTx {
    fn read(&mut self, id: SlotId, key: &[u8]) -> Result<Option<Row>> {
        let entry_key = EntryKey::new(id, key.to_vec());
        if let Some(chain) = self.delta.get(&entry_key) {
            if let Some(row) = Self::visible_in_chain(chain, self.sid) {
                return Ok(row.clone());
            }
        }
        Ok(self
            .snapshot
            .get(id, key)
            .and_then(|entry| entry.row.clone()))
    }

    fn scan(
        &mut self,
        id: SlotId,
        lo: Option<&[u8]>,
        hi: Option<&[u8]>,
    ) -> Result<Vec<(Vec<u8>, Row)>> {
        let lo_key = EntryKey::new(id, lo.map_or_else(Vec::new, <[u8]>::to_vec));
        let hi_key = match hi {
            Some(hi) => EntryKey::new(id, hi.to_vec()),
            None => EntryKey::new(id + 1, Vec::new()),
        };
        let hi_bound = if hi.is_some() {
            Bound::Included(&hi_key)
        } else {
            Bound::Excluded(&hi_key)
        };

        let sid = self.sid;
        let delta: Vec<(Vec<u8>, Option<Row>)> = self
            .delta
            .range((Bound::Included(&lo_key), hi_bound))
            .filter_map(|(key, chain)| {
                Self::visible_in_chain(chain, sid).map(|row| (key.key.clone(), row.clone()))
            })
            .collect();

        let base = self
            .snapshot
            .scan(id, lo, hi)
            .map(|(key, entry)| (key.key, entry.row));

        Ok(crate::store::session::MergeScan::new(base, delta).collect())
    }

    fn write(&mut self, id: SlotId, key: Vec<u8>, row: Option<Row>) -> Result<()> {
        let chain = self.delta.entry(EntryKey::new(id, key)).or_default();
        chain.insert(0, (self.sid, row));
        Ok(())
    }

    fn pending_in_stmt(&self, id: SlotId, key: &[u8]) -> Option<bool> {
        let chain = self.delta.get(&EntryKey::new(id, key.to_vec()))?;
        match chain.first() {
            Some((s, row)) if *s == self.sid => Some(row.is_some()),
            _ => None,
        }
    }

    fn track_read(&mut self, id: SlotId, key: Vec<u8>) {
        self.tracked.push(EntryKey::new(id, key));
    }

    fn advance_stmt(&mut self) {
        self.sid += 1;
    }

    fn rollback_stmt(&mut self) -> Result<()> {
        let sid = self.sid;
        self.delta.retain(|_, chain| {
            while chain.first().is_some_and(|(s, _)| *s == sid) {
                chain.remove(0);
            }
            !chain.is_empty()
        });
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        let mut state = self.shared.state.lock();

        state
            .index
            .check_conflict(self.delta.keys().chain(self.tracked.iter()), self.base_version)?;

        // Read-only transactions have nothing to log or publish.
        if self.delta.is_empty() {
            return Ok(());
        }

        let version = state.index.version() + 1;
        state.wal.append_commit(
            version,
            self.delta.iter().map(|(key, chain)| {
                (key, chain.first().and_then(|(_, row)| row.as_ref()))
            }),
        )?;

        let changes: Vec<(EntryKey, Option<Row>)> = std::mem::take(&mut self.delta)
            .into_iter()
            .map(|(key, mut chain)| {
                let (_, row) = chain.remove(0);
                (key, row)
            })
            .collect();
        state.index.apply(version, changes);
        Ok(())
    }

    fn rollback(&mut self) -> Result<()> {
        self.delta.clear();
        self.tracked.clear();
        Ok(())
    }
}

impl TreeTx {
    /// The commit version this transaction reads as of. Used by tests.
    #[cfg(test)]
    pub(crate) fn base_version(&self) -> u64 {
        self.base_version
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Store;
    use crate::treestore::TreeStore;
    use crate::types::Value;
    use tempfile::TempDir;

    fn store() -> (TempDir, TreeStore) {
        let dir = TempDir::new().unwrap();
        let store = TreeStore::open(&dir.path().join("wal")).unwrap();
        (dir, store)
    }

    fn row(n: i64) -> Row {
        vec![Value::Int(n)]
    }

    fn tree_tx(store: &TreeStore) -> TreeTx {
        TreeTx::begin(store.shared_for_tests())
    }

    #[test]
    fn same_statement_writes_are_invisible() {
        let (_dir, store) = store();
        let mut tx = tree_tx(&store);

        tx.write(5, vec![1], Some(row(1))).unwrap();
        assert_eq!(tx.read(5, &[1]).unwrap(), None);
        assert_eq!(tx.pending_in_stmt(5, &[1]), Some(true));

        tx.advance_stmt();
        assert_eq!(tx.read(5, &[1]).unwrap(), Some(row(1)));
        assert_eq!(tx.pending_in_stmt(5, &[1]), None);
    }

    #[test]
    fn newest_earlier_statement_wins() {
        let (_dir, store) = store();
        let mut tx = tree_tx(&store);

        tx.write(5, vec![1], Some(row(1))).unwrap();
        tx.advance_stmt();
        tx.write(5, vec![1], Some(row(2))).unwrap();
        tx.advance_stmt();

        assert_eq!(tx.read(5, &[1]).unwrap(), Some(row(2)));
    }

    #[test]
    fn statement_rollback_peels_current_statement_only() {
        let (_dir, store) = store();
        let mut tx = tree_tx(&store);

        tx.write(5, vec![1], Some(row(1))).unwrap();
        tx.advance_stmt();
        tx.write(5, vec![1], Some(row(2))).unwrap();
        tx.write(5, vec![2], Some(row(3))).unwrap();
        tx.rollback_stmt().unwrap();

        assert_eq!(tx.read(5, &[1]).unwrap(), Some(row(1)));
        assert_eq!(tx.pending_in_stmt(5, &[2]), None);
        tx.advance_stmt();
        assert_eq!(tx.read(5, &[2]).unwrap(), None);
    }

    #[test]
    fn scan_merges_delta_over_snapshot() {
        let (_dir, store) = store();

        let mut setup = tree_tx(&store);
        setup.write(5, vec![1], Some(row(1))).unwrap();
        setup.write(5, vec![3], Some(row(3))).unwrap();
        setup.commit().unwrap();

        let mut tx = tree_tx(&store);
        tx.write(5, vec![2], Some(row(2))).unwrap();
        tx.write(5, vec![3], None).unwrap();
        tx.advance_stmt();

        let seen: Vec<(Vec<u8>, Row)> = tx.scan(5, None, None).unwrap();
        assert_eq!(seen, vec![(vec![1], row(1)), (vec![2], row(2))]);
    }

    #[test]
    fn delta_hidden_from_scan_in_same_statement() {
        let (_dir, store) = store();

        let mut setup = tree_tx(&store);
        setup.write(5, vec![1], Some(row(1))).unwrap();
        setup.commit().unwrap();

        let mut tx = tree_tx(&store);
        tx.write(5, vec![1], None).unwrap();
        tx.write(5, vec![2], Some(row(2))).unwrap();

        // current-statement chains do not shadow the snapshot
        let seen: Vec<(Vec<u8>, Row)> = tx.scan(5, None, None).unwrap();
        assert_eq!(seen, vec![(vec![1], row(1))]);
    }

    #[test]
    fn conflicting_commit_fails() {
        let (_dir, store) = store();

        let mut tx1 = tree_tx(&store);
        let mut tx2 = tree_tx(&store);
        assert_eq!(tx1.base_version(), tx2.base_version());

        tx1.write(5, vec![1], Some(row(1))).unwrap();
        tx1.commit().unwrap();

        tx2.write(5, vec![1], Some(row(2))).unwrap();
        let err = tx2.commit().unwrap_err();
        assert!(crate::error::is_conflict(&err));
    }

    #[test]
    fn disjoint_commits_both_succeed() {
        let (_dir, store) = store();

        let mut tx1 = tree_tx(&store);
        let mut tx2 = tree_tx(&store);

        tx1.write(5, vec![1], Some(row(1))).unwrap();
        tx2.write(5, vec![2], Some(row(2))).unwrap();
        tx1.commit().unwrap();
        tx2.commit().unwrap();

        let mut reader = tree_tx(&store);
        assert_eq!(reader.read(5, &[1]).unwrap(), Some(row(1)));
        assert_eq!(reader.read(5, &[2]).unwrap(), Some(row(2)));
    }

    #[test]
    fn tracked_read_conflicts_like_a_write() {
        let (_dir, store) = store();

        let mut tx1 = tree_tx(&store);
        let mut tx2 = tree_tx(&store);

        tx1.write(2, vec![9], Some(row(1))).unwrap();
        tx1.commit().unwrap();

        tx2.track_read(2, vec![9]);
        tx2.write(5, vec![1], Some(row(1))).unwrap();
        let err = tx2.commit().unwrap_err();
        assert!(crate::error::is_conflict(&err));
    }

    #[test]
    fn read_only_commit_never_advances_version() {
        let (_dir, store) = store();

        let mut tx = tree_tx(&store);
        assert_eq!(tx.read(5, &[1]).unwrap(), None);
        tx.commit().unwrap();

        assert_eq!(tree_tx(&store).base_version(), 0);
    }
}
