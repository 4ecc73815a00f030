//! # Key-Value Engine
//!
//! MVCC layered over any ordered key-value store. Where the tree engine
//! owns its index and write-ahead log outright, this engine assumes only
//! the [`backend::KvBackend`] contract: atomic single-slot operations and
//! ordered scans. Multi-version state is spelled out in the key layout
//! (see [`proposal`]): every logical key owns a run of slots holding its
//! pending proposal first, then committed versions newest first.
//!
//! ## Write intent as data
//!
//! A transaction's uncommitted writes live in two places: an in-memory
//! delta (serving the transaction's own reads with statement visibility,
//! exactly like the tree engine) and a persisted proposal slot per key.
//! The proposal is what other transactions observe - writing a key that
//! carries a foreign active proposal is an immediate conflict, so
//! write-write races are caught at write time rather than commit time.
//! Only tracked catalog reads still need commit-time validation.
//!
//! ## Deciding proposals
//!
//! A proposal's fate is its owner's status record: one slot per
//! transaction holding `{state, epoch, commit version}`. Commit persists
//! the bumped version counter and flips the record to committed; the
//! proposal slots themselves are untouched. Readers interpret a committed
//! proposal as a regular version and the next writer of the key collapses
//! it into a durable slot. Readers skip aborted proposals the same way.
//!
//! ## Crash recovery
//!
//! Opening the engine bumps a persisted epoch and force-aborts every
//! status record still active under an older epoch: a crashed process
//! cannot decide its transactions, so its leftover proposals must die.
//! A commit that crashed after flipping its status record is fully
//! decided; one that crashed before is aborted. There is no log and no
//! replay - the backend's contents are the state.

pub mod backend;

mod proposal;

pub use backend::{KvBackend, MemoryBackend};

use crate::error::StoreError;
use crate::store::session::{MergeScan, SessionTx, TxCore};
use crate::store::{SessionId, Store, StoreTransaction};
use crate::types::{Row, SlotId};
use eyre::Result;
use hashbrown::HashMap;
use parking_lot::{Mutex, RwLock};
use proposal::{
    decode_counter, decode_durable, encode_durable, epoch_key, key_run_bounds, parse_slot_key,
    slot_key, space_bounds, txid_of_key, txn_bounds, txn_key, version_key, Proposal, TxnState,
    TxnStatus, PROPOSAL_VERSION,
};
use smallvec::SmallVec;
use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

type DeltaKey = (SlotId, Vec<u8>);
type Chain = SmallVec<[(u32, Option<Row>); 2]>;

pub(crate) struct KvShared {
    backend: Arc<dyn KvBackend>,
    epoch: u64,
    version: AtomicU64,
    next_txid: AtomicU64,
    statuses: RwLock<HashMap<u64, TxnStatus>>,
    /// Serializes commit-point version assignment.
    commit_lock: Mutex<()>,
    /// Serializes read-modify-write of proposal slots.
    slot_lock: Mutex<()>,
}

pub struct KvStore {
    shared: Arc<KvShared>,
}

impl KvStore {
    /// Opens the engine over a backend, recovering from whatever a
    /// previous process left behind.
    pub fn open(backend: Arc<dyn KvBackend>) -> Result<KvStore> {
        let epoch = match backend.get(&epoch_key())? {
            Some(bytes) => decode_counter(&bytes)? + 1,
            None => 1,
        };
        backend.set(&epoch_key(), &epoch.to_be_bytes())?;

        let version = match backend.get(&version_key())? {
            Some(bytes) => decode_counter(&bytes)?,
            None => 0,
        };

        let mut statuses = HashMap::new();
        let mut max_txid = 0u64;
        let (lo, hi) = txn_bounds();
        for (key, value) in backend.scan(&lo, &hi)? {
            let txid = txid_of_key(&key)?;
            let mut status = TxnStatus::decode(&value)?;
            if status.state == TxnState::Active {
                // the owning process is gone and can no longer decide it
                status = TxnStatus {
                    state: TxnState::Aborted,
                    epoch,
                    version: 0,
                };
                backend.set(&key, &status.encode())?;
            }
            max_txid = max_txid.max(txid);
            statuses.insert(txid, status);
        }

        Ok(KvStore {
            shared: Arc::new(KvShared {
                backend,
                epoch,
                version: AtomicU64::new(version),
                next_txid: AtomicU64::new(max_txid + 1),
                statuses: RwLock::new(statuses),
                commit_lock: Mutex::new(()),
                slot_lock: Mutex::new(()),
            }),
        })
    }

    /// Highest committed version.
    pub fn version(&self) -> u64 {
        self.shared.version.load(Ordering::SeqCst)
    }

    #[cfg(test)]
    pub(crate) fn shared_for_tests(&self) -> Arc<KvShared> {
        self.shared.clone()
    }
}

impl Store for KvStore {
    fn begin(&self, session: SessionId) -> Box<dyn StoreTransaction> {
        Box::new(SessionTx::new(session, KvTx::begin(self.shared.clone())))
    }
}

pub(crate) struct KvTx {
    shared: Arc<KvShared>,
    txid: u64,
    base_version: u64,
    sid: u32,
    /// Whether a status record has been persisted for this transaction.
    registered: bool,
    delta: BTreeMap<DeltaKey, Chain>,
    tracked: Vec<DeltaKey>,
}

impl KvTx {
    pub(crate) fn begin(shared: Arc<KvShared>) -> Self {
        let txid = shared.next_txid.fetch_add(1, Ordering::SeqCst);
        let base_version = shared.version.load(Ordering::SeqCst);
        Self {
            shared,
            txid,
            base_version,
            sid: 0,
            registered: false,
            delta: BTreeMap::new(),
            tracked: Vec::new(),
        }
    }

    fn status_of(&self, txid: u64) -> Result<TxnStatus> {
        self.shared
            .statuses
            .read()
            .get(&txid)
            .copied()
            .ok_or_else(|| {
                StoreError::Corrupt(format!("proposal references unknown transaction {txid}"))
                    .into()
            })
    }

    /// Read-only transactions leave no trace; the status record is
    /// persisted lazily on the first write.
    fn ensure_registered(&mut self) -> Result<()> {
        if self.registered {
            return Ok(());
        }
        let status = TxnStatus {
            state: TxnState::Active,
            epoch: self.shared.epoch,
            version: 0,
        };
        self.shared
            .backend
            .set(&txn_key(self.txid), &status.encode())?;
        self.shared.statuses.write().insert(self.txid, status);
        self.registered = true;
        Ok(())
    }

    fn visible_in_chain(chain: &Chain, sid: u32) -> Option<&Option<Row>> {
        chain.iter().find(|(s, _)| *s < sid).map(|(_, row)| row)
    }

    /// Resolves one key's slot run (newest first) to the row visible at
    /// this transaction's snapshot, ignoring its own proposal. A foreign
    /// active proposal is a conflict.
    fn resolve_run<'a>(
        &self,
        run: impl IntoIterator<Item = (&'a [u8], &'a [u8])>,
    ) -> Result<Option<Row>> {
        for (slot, value) in run {
            let (_, _, version) = parse_slot_key(slot)?;
            if version == PROPOSAL_VERSION {
                let proposal = Proposal::decode(value)?;
                if proposal.txid == self.txid {
                    continue;
                }
                let status = self.status_of(proposal.txid)?;
                match status.state {
                    TxnState::Active => {
                        return Err(StoreError::Conflict(format!(
                            "key is being written by concurrent transaction {}",
                            proposal.txid
                        ))
                        .into());
                    }
                    TxnState::Committed if status.version <= self.base_version => {
                        return Ok(proposal.committed_row().cloned());
                    }
                    TxnState::Committed | TxnState::Aborted => continue,
                }
            }
            if version <= self.base_version {
                return decode_durable(value);
            }
        }
        Ok(None)
    }

    /// Newest committed version of a key, proposal or durable, regardless
    /// of this transaction's snapshot. Used to validate tracked reads.
    fn newest_committed_version(&self, id: SlotId, key: &[u8]) -> Result<u64> {
        let (lo, hi) = key_run_bounds(id, key);
        for (slot, value) in self.shared.backend.scan(&lo, &hi)? {
            let (_, _, version) = parse_slot_key(&slot)?;
            if version == PROPOSAL_VERSION {
                let proposal = Proposal::decode(&value)?;
                if proposal.txid == self.txid {
                    continue;
                }
                match self.status_of(proposal.txid)? {
                    TxnStatus {
                        state: TxnState::Committed,
                        version,
                        ..
                    } => return Ok(version),
                    _ => continue,
                }
            }
            return Ok(version);
        }
        Ok(0)
    }

    /// Writes (or extends) this transaction's proposal for a key, failing
    /// fast on any state a commit could not win against.
    fn propose(&mut self, id: SlotId, key: Vec<u8>, row: Option<Row>) -> Result<()> {
        self.ensure_registered()?;
        let _guard = self.shared.slot_lock.lock();

        let (lo, hi) = key_run_bounds(id, &key);
        let run = self.shared.backend.scan(&lo, &hi)?;

        let mut chain: Option<Vec<(u32, Option<Row>)>> = None;
        if let Some((slot, value)) = run.first() {
            let (_, _, version) = parse_slot_key(slot)?;
            if version == PROPOSAL_VERSION {
                let previous = Proposal::decode(value)?;
                if previous.txid == self.txid {
                    chain = Some(previous.entries);
                } else {
                    let status = self.status_of(previous.txid)?;
                    match status.state {
                        TxnState::Active => {
                            return Err(StoreError::Conflict(format!(
                                "key is being written by concurrent transaction {}",
                                previous.txid
                            ))
                            .into());
                        }
                        TxnState::Committed => {
                            if status.version > self.base_version {
                                return Err(StoreError::Conflict(format!(
                                    "key committed at version {} after snapshot {}",
                                    status.version, self.base_version
                                ))
                                .into());
                            }
                            // collapse the decided proposal into a durable
                            // slot before taking its place
                            self.shared.backend.set(
                                &slot_key(id, &key, status.version),
                                &encode_durable(previous.committed_row()),
                            )?;
                        }
                        TxnState::Aborted => {}
                    }
                }
            } else if version > self.base_version {
                return Err(StoreError::Conflict(format!(
                    "key committed at version {version} after snapshot {}",
                    self.base_version
                ))
                .into());
            }
        }

        let mut entries = chain.unwrap_or_default();
        entries.insert(0, (self.sid, row.clone()));
        let encoded = Proposal {
            txid: self.txid,
            entries,
        }
        .encode();
        self.shared
            .backend
            .set(&slot_key(id, &key, PROPOSAL_VERSION), &encoded)?;

        self.delta
            .entry((id, key))
            .or_default()
            .insert(0, (self.sid, row));
        Ok(())
    }

    /// Rewrites a key's proposal slot from its in-memory chain, removing
    /// the slot when the chain is empty.
    fn sync_proposal(&self, id: SlotId, key: &[u8]) -> Result<()> {
        let slot = slot_key(id, key, PROPOSAL_VERSION);
        match self.delta.get(&(id, key.to_vec())) {
            Some(chain) if !chain.is_empty() => self.shared.backend.set(
                &slot,
                &Proposal {
                    txid: self.txid,
                    entries: chain.iter().cloned().collect(),
                }
                .encode(),
            ),
            _ => self.shared.backend.remove(&slot),
        }
    }

    fn finish(&mut self, status: TxnStatus) -> Result<()> {
        self.shared
            .backend
            .set(&txn_key(self.txid), &status.encode())?;
        self.shared.statuses.write().insert(self.txid, status);
        Ok(())
    }

    fn try_commit(&mut self) -> Result<()> {
        let shared = Arc::clone(&self.shared);
        let _guard = shared.commit_lock.lock();

        for (id, key) in &self.tracked {
            let newest = self.newest_committed_version(*id, key)?;
            if newest > self.base_version {
                return Err(StoreError::Conflict(format!(
                    "key space {id} changed at version {newest} after snapshot {}",
                    self.base_version
                ))
                .into());
            }
        }

        if self.delta.is_empty() {
            if self.registered {
                self.finish(TxnStatus {
                    state: TxnState::Committed,
                    epoch: self.shared.epoch,
                    version: self.shared.version.load(Ordering::SeqCst),
                })?;
            }
            return Ok(());
        }

        let version = self.shared.version.load(Ordering::SeqCst) + 1;
        self.shared
            .backend
            .set(&version_key(), &version.to_be_bytes())?;
        self.finish(TxnStatus {
            state: TxnState::Committed,
            epoch: self.shared.epoch,
            version,
        })?;
        self.shared.version.store(version, Ordering::SeqCst);
        Ok(())
    }
}

impl TxCore for KvTx {
    fn read(&mut self, id: SlotId, key: &[u8]) -> Result<Option<Row>> {
        if let Some(chain) = self.delta.get(&(id, key.to_vec())) {
            if let Some(row) = Self::visible_in_chain(chain, self.sid) {
                return Ok(row.clone());
            }
        }
        let (lo, hi) = key_run_bounds(id, key);
        let run = self.shared.backend.scan(&lo, &hi)?;
        self.resolve_run(run.iter().map(|(k, v)| (k.as_slice(), v.as_slice())))
    }

    fn scan(
        &mut self,
        id: SlotId,
        lo: Option<&[u8]>,
        hi: Option<&[u8]>,
    ) -> Result<Vec<(Vec<u8>, Row)>> {
        let (slo, shi) = space_bounds(id, lo);
        let slots = self.shared.backend.scan(&slo, &shi)?;

        // group the slot stream into per-key runs and resolve each one
        let mut base: Vec<(Vec<u8>, Option<Row>)> = Vec::new();
        let mut i = 0;
        while i < slots.len() {
            let (_, key, _) = parse_slot_key(&slots[i].0)?;
            let key = key.to_vec();
            if let Some(hi) = hi {
                if key.as_slice() > hi {
                    break;
                }
            }
            let mut j = i;
            while j < slots.len() {
                let (_, other, _) = parse_slot_key(&slots[j].0)?;
                if other != key {
                    break;
                }
                j += 1;
            }
            let row = self.resolve_run(
                slots[i..j].iter().map(|(k, v)| (k.as_slice(), v.as_slice())),
            )?;
            base.push((key, row));
            i = j;
        }

        let sid = self.sid;
        let lo_key = (id, lo.map_or_else(Vec::new, <[u8]>::to_vec));
        let hi_key = match hi {
            Some(hi) => (id, hi.to_vec()),
            None => (id + 1, Vec::new()),
        };
        let hi_bound = if hi.is_some() {
            Bound::Included(&hi_key)
        } else {
            Bound::Excluded(&hi_key)
        };
        let delta: Vec<(Vec<u8>, Option<Row>)> = self
            .delta
            .range((Bound::Included(&lo_key), hi_bound))
            .filter_map(|((_, key), chain)| {
                Self::visible_in_chain(chain, sid).map(|row| (key.clone(), row.clone()))
            })
            .collect();

        Ok(MergeScan::new(base.into_iter(), delta).collect())
    }

    fn write(&mut self, id: SlotId, key: Vec<u8>, row: Option<Row>) -> Result<()> {
        self.propose(id, key, row)
    }

    fn pending_in_stmt(&self, id: SlotId, key: &[u8]) -> Option<bool> {
        let chain = self.delta.get(&(id, key.to_vec()))?;
        match chain.first() {
            Some((s, row)) if *s == self.sid => Some(row.is_some()),
            _ => None,
        }
    }

    fn track_read(&mut self, id: SlotId, key: Vec<u8>) {
        self.tracked.push((id, key));
    }

    fn advance_stmt(&mut self) {
        self.sid += 1;
    }

    fn rollback_stmt(&mut self) -> Result<()> {
        let sid = self.sid;
        let mut touched: Vec<DeltaKey> = Vec::new();
        self.delta.retain(|key, chain| {
            let before = chain.len();
            while chain.first().is_some_and(|(s, _)| *s == sid) {
                chain.remove(0);
            }
            if chain.len() != before {
                touched.push(key.clone());
            }
            !chain.is_empty()
        });

        let _guard = self.shared.slot_lock.lock();
        for (id, key) in touched {
            self.sync_proposal(id, &key)?;
        }
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        let result = self.try_commit();
        if result.is_err() && self.registered {
            // Best effort: a failed abort write is equivalent to a crash
            // and epoch recovery finishes the job at next open.
            let status = TxnStatus {
                state: TxnState::Aborted,
                epoch: self.shared.epoch,
                version: 0,
            };
            let _ = self.shared.backend.set(&txn_key(self.txid), &status.encode());
            self.shared.statuses.write().insert(self.txid, status);
        }
        result
    }

    fn rollback(&mut self) -> Result<()> {
        if !self.registered {
            return Ok(());
        }
        self.finish(TxnStatus {
            state: TxnState::Aborted,
            epoch: self.shared.epoch,
            version: 0,
        })?;

        // proposals of a decided-aborted transaction are garbage; sweep
        // them now instead of leaving them to future writers
        let _guard = self.shared.slot_lock.lock();
        let keys: Vec<DeltaKey> = self.delta.keys().cloned().collect();
        self.delta.clear();
        for (id, key) in keys {
            self.shared
                .backend
                .remove(&slot_key(id, &key, PROPOSAL_VERSION))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::is_conflict;
    use crate::types::Value;

    fn store() -> (Arc<MemoryBackend>, KvStore) {
        let backend = Arc::new(MemoryBackend::new());
        let store = KvStore::open(backend.clone() as Arc<dyn KvBackend>).unwrap();
        (backend, store)
    }

    fn kv_tx(store: &KvStore) -> KvTx {
        KvTx::begin(store.shared_for_tests())
    }

    fn row(n: i64) -> Row {
        vec![Value::Int(n)]
    }

    #[test]
    fn committed_writes_become_visible_to_later_snapshots() {
        let (_backend, store) = store();

        let mut tx = kv_tx(&store);
        tx.write(5, vec![1], Some(row(1))).unwrap();
        tx.commit().unwrap();

        let mut reader = kv_tx(&store);
        assert_eq!(reader.read(5, &[1]).unwrap(), Some(row(1)));
        assert_eq!(store.version(), 1);
    }

    #[test]
    fn same_statement_writes_are_invisible() {
        let (_backend, store) = store();
        let mut tx = kv_tx(&store);

        tx.write(5, vec![1], Some(row(1))).unwrap();
        assert_eq!(tx.read(5, &[1]).unwrap(), None);
        tx.advance_stmt();
        assert_eq!(tx.read(5, &[1]).unwrap(), Some(row(1)));
    }

    #[test]
    fn snapshot_does_not_see_later_commits() {
        let (_backend, store) = store();

        let mut setup = kv_tx(&store);
        setup.write(5, vec![1], Some(row(1))).unwrap();
        setup.commit().unwrap();

        let mut reader = kv_tx(&store);
        assert_eq!(reader.read(5, &[1]).unwrap(), Some(row(1)));

        let mut writer = kv_tx(&store);
        writer.write(5, vec![1], Some(row(2))).unwrap();
        writer.commit().unwrap();

        // still the old snapshot
        assert_eq!(reader.read(5, &[1]).unwrap(), Some(row(1)));
        assert_eq!(kv_tx(&store).read(5, &[1]).unwrap(), Some(row(2)));
    }

    #[test]
    fn writing_a_key_with_a_foreign_active_proposal_conflicts() {
        let (_backend, store) = store();

        let mut tx1 = kv_tx(&store);
        let mut tx2 = kv_tx(&store);

        tx1.write(5, vec![1], Some(row(1))).unwrap();
        let err = tx2.write(5, vec![1], Some(row(2))).unwrap_err();
        assert!(is_conflict(&err));

        // reads hit the same wall
        let mut tx3 = kv_tx(&store);
        assert!(is_conflict(&tx3.read(5, &[1]).unwrap_err()));
    }

    #[test]
    fn writing_past_a_newer_commit_conflicts() {
        let (_backend, store) = store();

        let mut stale = kv_tx(&store);

        let mut winner = kv_tx(&store);
        winner.write(5, vec![1], Some(row(1))).unwrap();
        winner.commit().unwrap();

        let err = stale.write(5, vec![1], Some(row(2))).unwrap_err();
        assert!(is_conflict(&err));
    }

    #[test]
    fn rolled_back_proposals_are_swept() {
        let (backend, store) = store();

        let mut tx = kv_tx(&store);
        tx.write(5, vec![1], Some(row(1))).unwrap();
        tx.rollback().unwrap();

        assert_eq!(
            backend.get(&slot_key(5, &[1], PROPOSAL_VERSION)).unwrap(),
            None
        );
        assert_eq!(kv_tx(&store).read(5, &[1]).unwrap(), None);

        // the key is free for the next writer
        let mut next = kv_tx(&store);
        next.write(5, vec![1], Some(row(2))).unwrap();
        next.commit().unwrap();
        assert_eq!(kv_tx(&store).read(5, &[1]).unwrap(), Some(row(2)));
    }

    #[test]
    fn next_writer_collapses_a_committed_proposal() {
        let (backend, store) = store();

        let mut tx = kv_tx(&store);
        tx.write(5, vec![1], Some(row(1))).unwrap();
        tx.commit().unwrap();

        // proposal still in place, interpreted as version 1
        assert!(backend
            .get(&slot_key(5, &[1], PROPOSAL_VERSION))
            .unwrap()
            .is_some());

        let mut next = kv_tx(&store);
        next.write(5, vec![1], Some(row(2))).unwrap();

        let durable = backend.get(&slot_key(5, &[1], 1)).unwrap().unwrap();
        assert_eq!(decode_durable(&durable).unwrap(), Some(row(1)));
        next.rollback().unwrap();
    }

    #[test]
    fn statement_rollback_rewrites_proposals() {
        let (backend, store) = store();
        let mut tx = kv_tx(&store);

        tx.write(5, vec![1], Some(row(1))).unwrap();
        tx.advance_stmt();
        tx.write(5, vec![1], Some(row(2))).unwrap();
        tx.write(5, vec![2], Some(row(3))).unwrap();
        tx.rollback_stmt().unwrap();

        assert_eq!(tx.read(5, &[1]).unwrap(), Some(row(1)));
        assert_eq!(
            backend.get(&slot_key(5, &[2], PROPOSAL_VERSION)).unwrap(),
            None
        );
        let raw = backend
            .get(&slot_key(5, &[1], PROPOSAL_VERSION))
            .unwrap()
            .unwrap();
        assert_eq!(Proposal::decode(&raw).unwrap().entries.len(), 1);
    }

    #[test]
    fn scan_merges_committed_and_own_writes() {
        let (_backend, store) = store();

        let mut setup = kv_tx(&store);
        setup.write(5, vec![1], Some(row(1))).unwrap();
        setup.write(5, vec![3], Some(row(3))).unwrap();
        setup.commit().unwrap();

        let mut tx = kv_tx(&store);
        tx.write(5, vec![2], Some(row(2))).unwrap();
        tx.write(5, vec![3], None).unwrap();
        tx.advance_stmt();

        let seen = tx.scan(5, None, None).unwrap();
        assert_eq!(seen, vec![(vec![1], row(1)), (vec![2], row(2))]);
    }

    #[test]
    fn tracked_read_conflicts_with_newer_commit() {
        let (_backend, store) = store();

        let mut tx1 = kv_tx(&store);
        tx1.write(2, vec![9], Some(row(1))).unwrap();
        let mut tx2 = kv_tx(&store);
        tx2.track_read(2, vec![9]);
        tx2.write(5, vec![1], Some(row(1))).unwrap();
        tx1.commit().unwrap();

        let err = tx2.commit().unwrap_err();
        assert!(is_conflict(&err));
    }

    #[test]
    fn restart_aborts_transactions_left_active() {
        let backend = Arc::new(MemoryBackend::new());
        {
            let store = KvStore::open(backend.clone() as Arc<dyn KvBackend>).unwrap();
            let mut tx = kv_tx(&store);
            tx.write(5, vec![1], Some(row(1))).unwrap();
            // neither committed nor rolled back: the process "crashes"
        }

        let store = KvStore::open(backend.clone() as Arc<dyn KvBackend>).unwrap();
        let mut reader = kv_tx(&store);
        assert_eq!(reader.read(5, &[1]).unwrap(), None);

        // and the key is writable again
        let mut writer = kv_tx(&store);
        writer.write(5, vec![1], Some(row(2))).unwrap();
        writer.commit().unwrap();
        assert_eq!(kv_tx(&store).read(5, &[1]).unwrap(), Some(row(2)));
    }

    #[test]
    fn committed_state_survives_reopen() {
        let backend = Arc::new(MemoryBackend::new());
        {
            let store = KvStore::open(backend.clone() as Arc<dyn KvBackend>).unwrap();
            let mut tx = kv_tx(&store);
            tx.write(5, vec![1], Some(row(1))).unwrap();
            tx.commit().unwrap();
        }

        let store = KvStore::open(backend as Arc<dyn KvBackend>).unwrap();
        assert_eq!(store.version(), 1);
        assert_eq!(kv_tx(&store).read(5, &[1]).unwrap(), Some(row(1)));
    }

    #[test]
    fn read_only_commit_never_advances_version() {
        let (_backend, store) = store();
        let mut tx = kv_tx(&store);
        assert_eq!(tx.read(5, &[1]).unwrap(), None);
        tx.commit().unwrap();
        assert_eq!(store.version(), 0);
    }
}
