//! # Storage Abstraction
//!
//! The seam between the SQL layer and the storage engines. A [`Store`] is a
//! transactional table store; [`StoreTransaction`] is one MVCC transaction
//! against it. Two engines implement the contract:
//!
//! - [`TreeStore`](crate::treestore::TreeStore): copy-on-write in-memory
//!   ordered index with a write-ahead log for durability.
//! - [`KvStore`](crate::kvstore::KvStore): MVCC layered over any ordered
//!   key-value backend via proposal slots.
//!
//! Both share the relational machinery in [`session`]: catalog access, key
//! encoding, constraint checks, and secondary index maintenance live there
//! once, parameterized over a small engine core.
//!
//! ## Transaction contract
//!
//! - Snapshot isolation: a transaction sees the committed state as of its
//!   start, plus its own writes.
//! - Statement visibility: writes made during statement S become visible to
//!   reads only after [`StoreTransaction::next_stmt`], so a statement never
//!   observes its own output (the Halloween problem).
//! - Statement atomicity: a failed operation rolls back every write of the
//!   current statement and leaves the transaction usable.
//! - Optimistic commits: conflicting concurrent writes surface as a
//!   conflict error at commit (or earlier), never as blocking.
//! - A committed or rolled-back transaction rejects further use with
//!   [`StoreError::Completed`](crate::error::StoreError::Completed).

pub mod registry;
pub mod session;

pub use registry::Registry;

use crate::catalog::TableLayout;
use crate::types::{Row, Value};
use eyre::Result;
use std::collections::VecDeque;

/// Identifier of the SQL session a transaction belongs to. The engines do
/// not interpret it; it travels with the transaction for diagnostics.
pub type SessionId = u64;

/// A transactional table store. Implementations are cheap to share behind
/// `Arc` and hand out independent transactions.
pub trait Store: Send + Sync {
    /// Starts a transaction for `session` against the current committed
    /// state.
    fn begin(&self, session: SessionId) -> Box<dyn StoreTransaction>;
}

impl std::fmt::Debug for dyn Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("dyn Store")
    }
}

/// One transaction. All name-based operations resolve through the catalog
/// at call time; the layout observed is re-validated at commit, so schema
/// changes racing with this transaction fail it rather than corrupt it.
pub trait StoreTransaction: Send {
    /// The session this transaction was started for.
    fn session(&self) -> SessionId;

    /// Resolves a table by name. The returned handle pins the layout the
    /// transaction observed.
    fn lookup_table(&mut self, name: &str) -> Result<TableHandle>;

    /// Creates a table with `columns` caller-visible columns. An empty
    /// `primary` key synthesizes a hidden monotonic rowid column.
    fn create_table(
        &mut self,
        name: &str,
        columns: usize,
        primary: Vec<crate::types::ColumnKey>,
    ) -> Result<TableHandle>;

    /// Drops a table, its rows, its indexes, and its rowid sequence.
    fn drop_table(&mut self, name: &str) -> Result<()>;

    /// Creates a secondary index and backfills it from visible rows.
    fn create_index(
        &mut self,
        table: &str,
        name: &str,
        key: Vec<crate::types::ColumnKey>,
        unique: bool,
    ) -> Result<()>;

    /// Drops a secondary index and its entries.
    fn drop_index(&mut self, table: &str, name: &str) -> Result<()>;

    /// Declares a foreign key. `ref_columns` must be the referenced table's
    /// primary key; existing rows are validated immediately, new rows on
    /// insert and update.
    fn add_foreign_key(
        &mut self,
        table: &str,
        name: &str,
        columns: Vec<usize>,
        ref_table: &str,
        ref_columns: Vec<usize>,
    ) -> Result<()>;

    /// Inserts one row (caller-visible columns only).
    fn insert(&mut self, table: &TableHandle, row: Row) -> Result<()>;

    /// Ordered scan over the primary key, bounds inclusive. Bound rows need
    /// values at the primary key column positions.
    fn rows(&mut self, table: &TableHandle, min: Option<&Row>, max: Option<&Row>) -> Result<Rows>;

    /// Ordered scan over a secondary index, yielding primary rows in index
    /// order. Bound rows need values at the index column positions.
    fn index_rows(
        &mut self,
        table: &TableHandle,
        index: &str,
        min: Option<&Row>,
        max: Option<&Row>,
    ) -> Result<Rows>;

    /// Ends the current statement: flushes deferred index maintenance and
    /// makes the statement's writes visible to subsequent reads.
    fn next_stmt(&mut self) -> Result<()>;

    /// Validates and publishes the transaction. Any error ends the
    /// transaction as if rolled back.
    fn commit(&mut self) -> Result<()>;

    /// Discards the transaction.
    fn rollback(&mut self) -> Result<()>;

    /// Positioned delete, reached through [`Rows::delete`].
    fn delete_row(&mut self, table: &TableHandle, key: &[u8], row: &Row) -> Result<()>;

    /// Positioned update, reached through [`Rows::update`]. Returns the new
    /// encoded key and stored row.
    fn update_row(
        &mut self,
        table: &TableHandle,
        key: &[u8],
        row: &Row,
        updates: &[ColumnUpdate],
    ) -> Result<(Vec<u8>, Row)>;
}

/// A resolved table: its name plus the layout observed at resolution time.
#[derive(Debug, Clone)]
pub struct TableHandle {
    pub(crate) name: String,
    pub(crate) layout: TableLayout,
}

impl TableHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Caller-visible column count.
    pub fn columns(&self) -> usize {
        self.layout.columns
    }
}

/// One column assignment for a positioned update.
#[derive(Debug, Clone)]
pub struct ColumnUpdate {
    pub column: usize,
    pub value: Value,
}

impl ColumnUpdate {
    pub fn new(column: usize, value: impl Into<Value>) -> Self {
        Self {
            column,
            value: value.into(),
        }
    }
}

/// A positioned cursor over scan results. `next` advances; `update` and
/// `delete` act on the row `next` last returned and go back through the
/// owning transaction, so cursor writes obey the same statement-visibility
/// and conflict rules as every other write.
#[derive(Debug)]
pub struct Rows {
    table: TableHandle,
    entries: VecDeque<(Vec<u8>, Row)>,
    current: Option<(Vec<u8>, Row)>,
}

impl Rows {
    pub(crate) fn new(table: TableHandle, entries: VecDeque<(Vec<u8>, Row)>) -> Self {
        Self {
            table,
            entries,
            current: None,
        }
    }

    /// Advances to the next row and returns its caller-visible columns.
    pub fn next(&mut self) -> Option<Row> {
        self.current = self.entries.pop_front();
        self.current
            .as_ref()
            .map(|(_, row)| row[..self.table.layout.columns].to_vec())
    }

    /// Deletes the current row. The cursor loses its position.
    pub fn delete(&mut self, tx: &mut dyn StoreTransaction) -> Result<()> {
        let (key, row) = self
            .current
            .take()
            .ok_or(crate::error::StoreError::Precondition(
                "cursor is not positioned on a row".into(),
            ))?;
        tx.delete_row(&self.table, &key, &row)
    }

    /// Updates the current row in place; the cursor stays positioned on the
    /// updated row.
    pub fn update(&mut self, tx: &mut dyn StoreTransaction, updates: &[ColumnUpdate]) -> Result<()> {
        let (key, row) = self
            .current
            .as_ref()
            .ok_or(crate::error::StoreError::Precondition(
                "cursor is not positioned on a row".into(),
            ))?;
        let updated = tx.update_row(&self.table, key, row, updates)?;
        self.current = Some(updated);
        Ok(())
    }
}
