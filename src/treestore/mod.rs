//! # Tree Engine
//!
//! The reference storage engine: all committed state lives in one
//! copy-on-write ordered index ([`index::VersionedIndex`] over
//! [`pmap::PMap`]), made durable by a write-ahead log ([`wal::Wal`]) that
//! is replayed in full at open.
//!
//! ```text
//!          begin                    commit
//!   tx ----------> snapshot (O(1))    |
//!   tx writes ---> private delta      v
//!                               [commit mutex]
//!                   validate delta + tracked reads
//!                   append one WAL record, fsync
//!                   publish delta at version + 1
//! ```
//!
//! ## Concurrency
//!
//! Readers never block: a transaction works against the snapshot taken at
//! begin. Writers never block each other until commit, where a single
//! mutex serializes validate-log-publish. Validation is first-committer-
//! wins: a key (or tracked catalog read) whose committed version moved
//! past the transaction's snapshot fails the commit with a conflict.
//!
//! ## Durability
//!
//! The WAL is the only persistent artifact. One commit is one contiguous
//! record written with a single write and fsync'd before the in-memory
//! index is updated, so a crash either preserves the whole commit or none
//! of it. The log is never compacted; open time and file size grow with
//! total commit history.

pub mod index;
pub mod pmap;
pub mod wal;

mod transaction;

use crate::store::session::SessionTx;
use crate::store::{SessionId, Store, StoreTransaction};
use eyre::Result;
use index::VersionedIndex;
use parking_lot::Mutex;
use std::path::Path;
use std::sync::Arc;
use transaction::TreeTx;
use wal::Wal;

pub(crate) struct TreeState {
    pub(crate) index: VersionedIndex,
    pub(crate) wal: Wal,
}

pub(crate) struct TreeShared {
    pub(crate) state: Mutex<TreeState>,
}

pub struct TreeStore {
    shared: Arc<TreeShared>,
}

impl std::fmt::Debug for TreeStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TreeStore").finish_non_exhaustive()
    }
}

impl TreeStore {
    /// Opens the engine backed by the write-ahead log at `path`, creating
    /// it if absent and replaying it otherwise.
    pub fn open(path: &Path) -> Result<TreeStore> {
        let (wal, index) = Wal::open(path)?;
        Ok(TreeStore {
            shared: Arc::new(TreeShared {
                state: Mutex::new(TreeState { index, wal }),
            }),
        })
    }

    /// Highest committed version.
    pub fn version(&self) -> u64 {
        self.shared.state.lock().index.version()
    }

    #[cfg(test)]
    pub(crate) fn shared_for_tests(&self) -> Arc<TreeShared> {
        self.shared.clone()
    }
}

impl Store for TreeStore {
    fn begin(&self, session: SessionId) -> Box<dyn StoreTransaction> {
        Box::new(SessionTx::new(session, TreeTx::begin(self.shared.clone())))
    }
}
