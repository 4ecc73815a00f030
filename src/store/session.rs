//! # Shared Transaction Logic
//!
//! Everything relational about a transaction - catalog access, primary and
//! secondary key encoding, duplicate and foreign key checks, statement
//! visibility bookkeeping, deferred index maintenance - is engine
//! independent. [`SessionTx`] implements it once over the small [`TxCore`]
//! seam; each engine only supplies versioned point reads, merged scans,
//! buffered writes, and commit/rollback.
//!
//! ## Statement discipline
//!
//! Writes carry the statement id they were made under and stay invisible to
//! reads until the statement ends. Secondary index entries are not written
//! eagerly: each row write queues its index maintenance, and the queue is
//! flushed when the statement ends (or at commit). Index scans therefore
//! never see half-maintained entries, and unique-index checks run against
//! the statement's final state. A failed operation rolls back the current
//! statement's writes and clears the queue; the transaction stays usable.
//!
//! ## Sequences
//!
//! Sequence allocations are cached per transaction because a statement
//! cannot read back its own sequence-row writes. Values allocated by a
//! statement that later fails are skipped, which leaves gaps - the usual
//! sequence contract. Two transactions allocating from the same sequence
//! write the same sequence row and conflict at commit; tables with a hidden
//! rowid therefore serialize concurrent inserters.

use super::{ColumnUpdate, Rows, TableHandle};
use crate::catalog::{
    self, IndexLayout, TableLayout, ID_SEQUENCE, LAST_SYSTEM_ID, LAYOUTS_ID, SEQUENCES_ID,
};
use crate::encoding::key::encode_key;
use crate::error::StoreError;
use crate::types::{ColumnKey, Row, SlotId, Value};
use eyre::Result;
use hashbrown::HashMap;
use std::collections::VecDeque;
use std::iter::Peekable;

/// The engine side of a transaction. Implementations provide snapshot
/// reads merged with the transaction's own writes, honoring statement
/// visibility: a write made in the current statement is excluded.
pub(crate) trait TxCore: Send {
    /// Visible point read: own writes from earlier statements shadow the
    /// snapshot; `None` covers both absence and visible tombstones.
    fn read(&mut self, id: SlotId, key: &[u8]) -> Result<Option<Row>>;

    /// Visible ordered scan of one key space, bounds inclusive, own writes
    /// merged in, tombstones elided.
    fn scan(
        &mut self,
        id: SlotId,
        lo: Option<&[u8]>,
        hi: Option<&[u8]>,
    ) -> Result<Vec<(Vec<u8>, Row)>>;

    /// Buffers a write (`None` deletes) under the current statement.
    fn write(&mut self, id: SlotId, key: Vec<u8>, row: Option<Row>) -> Result<()>;

    /// Whether this transaction wrote the key in the current statement, and
    /// if so whether the newest such write is live (`true`) or a delete.
    fn pending_in_stmt(&self, id: SlotId, key: &[u8]) -> Option<bool>;

    /// Adds a key to the commit-time validation set without writing it.
    /// Used for catalog rows, so schema changes conflict with transactions
    /// that relied on the old schema.
    fn track_read(&mut self, id: SlotId, key: Vec<u8>);

    fn advance_stmt(&mut self);

    /// Discards every write made in the current statement.
    fn rollback_stmt(&mut self) -> Result<()>;

    /// Validates against concurrent commits and publishes atomically and
    /// durably. Any error leaves the transaction aborted engine-side.
    fn commit(&mut self) -> Result<()>;

    fn rollback(&mut self) -> Result<()>;
}

/// Queued secondary index maintenance for the current statement.
struct DeferredOp {
    index_id: SlotId,
    index_name: String,
    key: Vec<u8>,
    row: Option<Row>,
    unique: bool,
}

pub(crate) struct SessionTx<C: TxCore> {
    session: super::SessionId,
    core: C,
    completed: bool,
    deferred: Vec<DeferredOp>,
    seq_cache: HashMap<String, i64>,
}

impl<C: TxCore> SessionTx<C> {
    pub(crate) fn new(session: super::SessionId, core: C) -> Self {
        Self {
            session,
            core,
            completed: false,
            deferred: Vec::new(),
            seq_cache: HashMap::new(),
        }
    }

    fn guard(&self) -> Result<()> {
        if self.completed {
            return Err(StoreError::Completed.into());
        }
        Ok(())
    }

    /// Runs a mutating operation with statement-level atomicity: on error
    /// the current statement's writes and queued index maintenance are
    /// discarded and the transaction stays usable.
    fn stmt_atomic<T>(&mut self, op: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        match op(self) {
            Ok(v) => Ok(v),
            Err(err) => {
                self.deferred.clear();
                self.core.rollback_stmt()?;
                Err(err)
            }
        }
    }

    /// Reads and decodes a table layout, recording the read for commit-time
    /// schema validation.
    fn layout_for(&mut self, name: &str) -> Result<TableLayout> {
        let key = catalog::name_key(name);
        self.core.track_read(LAYOUTS_ID, key.clone());
        match self.core.read(LAYOUTS_ID, &key)? {
            Some(row) => catalog::layout_of_row(&row),
            None => Err(StoreError::NotFound(format!("table {name}")).into()),
        }
    }

    fn write_layout(&mut self, name: &str, layout: &TableLayout) -> Result<()> {
        self.core.write(
            LAYOUTS_ID,
            catalog::name_key(name),
            Some(catalog::layout_row(name, layout)),
        )
    }

    /// Whether a visible or same-statement live entry occupies the key.
    fn is_occupied(&mut self, id: SlotId, key: &[u8]) -> Result<bool> {
        match self.core.pending_in_stmt(id, key) {
            Some(live) => Ok(live),
            None => Ok(self.core.read(id, key)?.is_some()),
        }
    }

    /// Allocates the next value of a named sequence. `floor` is the value
    /// an absent sequence is assumed to have last handed out.
    fn next_sequence(&mut self, name: &str, floor: i64) -> Result<i64> {
        let current = match self.seq_cache.get(name) {
            Some(&v) => v,
            None => {
                let key = catalog::name_key(name);
                match self.core.read(SEQUENCES_ID, &key)? {
                    Some(row) => catalog::sequence_value(&row)?,
                    None => floor,
                }
            }
        };
        let next = current + 1;
        self.seq_cache.insert(name.to_string(), next);
        self.core.write(
            SEQUENCES_ID,
            catalog::name_key(name),
            Some(catalog::sequence_row(name, next)),
        )?;
        Ok(next)
    }

    fn next_id(&mut self) -> Result<SlotId> {
        Ok(self.next_sequence(ID_SEQUENCE, LAST_SYSTEM_ID)? as SlotId)
    }

    /// Flushes queued index maintenance: deletes first so a delete/insert
    /// pair on the same unique key within one statement is not a false
    /// duplicate, then inserts with unique checks against the statement's
    /// final state.
    fn flush_deferred(&mut self) -> Result<()> {
        if self.deferred.is_empty() {
            return Ok(());
        }
        let ops = std::mem::take(&mut self.deferred);
        if let Err(err) = self.apply_deferred(ops) {
            self.deferred.clear();
            self.core.rollback_stmt()?;
            return Err(err);
        }
        Ok(())
    }

    fn apply_deferred(&mut self, ops: Vec<DeferredOp>) -> Result<()> {
        for op in ops.iter().filter(|op| op.row.is_none()) {
            self.core.write(op.index_id, op.key.clone(), None)?;
        }
        for op in ops.into_iter().filter(|op| op.row.is_some()) {
            if op.unique && self.is_occupied(op.index_id, &op.key)? {
                return Err(
                    StoreError::Duplicate(format!("unique index {}", op.index_name)).into(),
                );
            }
            self.core.write(op.index_id, op.key, op.row)?;
        }
        Ok(())
    }

    fn queue_index_write(&mut self, index: &IndexLayout, key: Vec<u8>, row: Option<Row>) {
        self.deferred.push(DeferredOp {
            index_id: index.index_id,
            index_name: index.name.clone(),
            key,
            row,
            unique: index.unique,
        });
    }

    /// Rejects NULL in declared primary key columns (the hidden rowid is
    /// always populated by the engine).
    fn check_primary_not_null(&self, layout: &TableLayout, row: &Row) -> Result<()> {
        if layout.hidden_rowid {
            return Ok(());
        }
        for ck in &layout.primary {
            if row[ck.column].is_null() {
                return Err(StoreError::MissingValue(format!(
                    "primary key column {}",
                    ck.column
                ))
                .into());
            }
        }
        Ok(())
    }

    /// Validates every foreign key of `layout` against `row`. A NULL in
    /// any referencing column skips that constraint. The referenced row
    /// must be visible, i.e. committed or written in an earlier statement.
    fn check_foreign_keys(&mut self, layout: &TableLayout, row: &Row) -> Result<()> {
        for fk in &layout.foreign_keys {
            let values: Vec<Value> = fk.columns.iter().map(|&c| row[c].clone()).collect();
            if values.iter().any(Value::is_null) {
                continue;
            }
            let ref_layout = self.layout_for(&fk.ref_table).map_err(|_| {
                StoreError::Precondition(format!(
                    "foreign key {} references missing table {}",
                    fk.name, fk.ref_table
                ))
            })?;
            // ref_columns was validated at creation to be the referenced
            // table's primary key, in order; re-key the projected values
            // through the referenced key specification.
            let mut probe = vec![Value::Null; ref_layout.stored_columns()];
            for (value, ck) in values.into_iter().zip(&ref_layout.primary) {
                probe[ck.column] = value;
            }
            let key = encode_key(&ref_layout.primary, &probe);
            if self.core.read(ref_layout.table_id, &key)?.is_none() {
                return Err(StoreError::Precondition(format!(
                    "foreign key {}: no matching row in {}",
                    fk.name, fk.ref_table
                ))
                .into());
            }
        }
        Ok(())
    }

    /// Inclusive scan bound from a bound row, validated to cover the key's
    /// column positions.
    fn encode_bound(key: &[ColumnKey], row: &Row) -> Result<Vec<u8>> {
        let need = key.iter().map(|ck| ck.column).max().map_or(0, |m| m + 1);
        if row.len() < need {
            return Err(
                StoreError::Precondition("bound row is missing key columns".into()).into(),
            );
        }
        Ok(encode_key(key, row))
    }

    fn insert_inner(&mut self, table: &TableHandle, row: Row) -> Result<()> {
        let layout = &table.layout;
        if row.len() != layout.columns {
            return Err(StoreError::Precondition(format!(
                "table {} expects {} columns, got {}",
                table.name,
                layout.columns,
                row.len()
            ))
            .into());
        }
        self.check_primary_not_null(layout, &row)?;
        self.check_foreign_keys(layout, &row)?;

        let mut stored = row;
        if layout.hidden_rowid {
            let rowid = self.next_sequence(&layout.rowid_sequence(), 0)?;
            stored.push(Value::Int(rowid));
        }

        let pk = layout.primary_key_of(&stored);
        if self.is_occupied(layout.table_id, &pk)? {
            return Err(StoreError::Duplicate(format!("primary key for table {}", table.name)).into());
        }
        self.core.write(layout.table_id, pk, Some(stored.clone()))?;

        for index in &table.layout.indexes {
            let (key, payload) = table.layout.index_entry_of(index, &stored);
            self.queue_index_write(index, key, Some(payload));
        }
        Ok(())
    }

    fn delete_inner(&mut self, table: &TableHandle, key: &[u8], row: &Row) -> Result<()> {
        self.core.write(table.layout.table_id, key.to_vec(), None)?;
        for index in &table.layout.indexes {
            let (ikey, _) = table.layout.index_entry_of(index, row);
            self.queue_index_write(index, ikey, None);
        }
        Ok(())
    }

    fn update_inner(
        &mut self,
        table: &TableHandle,
        key: &[u8],
        row: &Row,
        updates: &[ColumnUpdate],
    ) -> Result<(Vec<u8>, Row)> {
        let layout = &table.layout;
        let mut updated = row.clone();
        for update in updates {
            if update.column >= layout.columns {
                return Err(StoreError::Precondition(format!(
                    "column {} out of range for table {}",
                    update.column, table.name
                ))
                .into());
            }
            updated[update.column] = update.value.clone();
        }
        self.check_primary_not_null(layout, &updated)?;
        self.check_foreign_keys(layout, &updated)?;

        let new_key = layout.primary_key_of(&updated);
        if new_key != key {
            if self.is_occupied(layout.table_id, &new_key)? {
                return Err(
                    StoreError::Duplicate(format!("primary key for table {}", table.name)).into(),
                );
            }
            self.core.write(layout.table_id, key.to_vec(), None)?;
        }
        self.core
            .write(layout.table_id, new_key.clone(), Some(updated.clone()))?;

        for index in &table.layout.indexes {
            let (old_ikey, _) = table.layout.index_entry_of(index, row);
            let (new_ikey, payload) = table.layout.index_entry_of(index, &updated);
            if old_ikey != new_ikey {
                self.queue_index_write(index, old_ikey, None);
            }
            self.queue_index_write(index, new_ikey, Some(payload));
        }
        Ok((new_key, updated))
    }

    fn create_index_inner(
        &mut self,
        table: &str,
        name: &str,
        key: Vec<ColumnKey>,
        unique: bool,
    ) -> Result<()> {
        let mut layout = self.layout_for(table)?;
        if layout.index(name).is_some() {
            return Err(StoreError::Duplicate(format!("index {name}")).into());
        }
        if key.iter().any(|ck| ck.column >= layout.columns) {
            return Err(
                StoreError::Precondition(format!("index {name} references missing columns")).into(),
            );
        }

        let index = IndexLayout {
            index_id: self.next_id()?,
            name: name.to_string(),
            key,
            unique,
        };

        // Backfill from rows visible to this transaction. The entries are
        // written under the current statement, matching the layout row
        // below: the index becomes usable when the statement ends.
        for (_, row) in self.core.scan(layout.table_id, None, None)? {
            let (ikey, payload) = layout.index_entry_of(&index, &row);
            if index.unique && self.is_occupied(index.index_id, &ikey)? {
                return Err(StoreError::Duplicate(format!("unique index {name}")).into());
            }
            self.core.write(index.index_id, ikey, Some(payload))?;
        }

        layout.indexes.push(index);
        layout.schema_version += 1;
        self.write_layout(table, &layout)
    }

    fn drop_index_inner(&mut self, table: &str, name: &str) -> Result<()> {
        let mut layout = self.layout_for(table)?;
        let position = layout
            .indexes
            .iter()
            .position(|ix| ix.name == name)
            .ok_or_else(|| StoreError::NotFound(format!("index {name} on table {table}")))?;
        let index = layout.indexes.remove(position);

        for (key, _) in self.core.scan(index.index_id, None, None)? {
            self.core.write(index.index_id, key, None)?;
        }

        layout.schema_version += 1;
        self.write_layout(table, &layout)
    }

    fn add_foreign_key_inner(
        &mut self,
        table: &str,
        name: &str,
        columns: Vec<usize>,
        ref_table: &str,
        ref_columns: Vec<usize>,
    ) -> Result<()> {
        let mut layout = self.layout_for(table)?;
        if layout.foreign_keys.iter().any(|fk| fk.name == name) {
            return Err(StoreError::Duplicate(format!("foreign key {name}")).into());
        }
        if columns.is_empty() || columns.len() != ref_columns.len() {
            return Err(StoreError::Precondition(format!(
                "foreign key {name}: column lists must be non-empty and of equal length"
            ))
            .into());
        }
        if columns.iter().any(|&c| c >= layout.columns) {
            return Err(StoreError::Precondition(format!(
                "foreign key {name} references missing columns"
            ))
            .into());
        }

        let ref_layout = self.layout_for(ref_table)?;
        let ref_primary: Vec<usize> = ref_layout.primary.iter().map(|ck| ck.column).collect();
        if ref_columns != ref_primary || ref_layout.hidden_rowid {
            return Err(StoreError::Precondition(format!(
                "foreign key {name} must reference the primary key of {ref_table}"
            ))
            .into());
        }

        layout.foreign_keys.push(catalog::ForeignKeyLayout {
            name: name.to_string(),
            columns,
            ref_table: ref_table.to_string(),
            ref_columns,
        });

        // Existing rows must already satisfy the constraint.
        for (_, row) in self.core.scan(layout.table_id, None, None)? {
            self.check_foreign_keys(&layout, &row)?;
        }

        layout.schema_version += 1;
        self.write_layout(table, &layout)
    }

    fn drop_table_inner(&mut self, name: &str) -> Result<()> {
        let layout = self.layout_for(name)?;

        for (key, _) in self.core.scan(layout.table_id, None, None)? {
            self.core.write(layout.table_id, key, None)?;
        }
        for index in &layout.indexes {
            for (key, _) in self.core.scan(index.index_id, None, None)? {
                self.core.write(index.index_id, key, None)?;
            }
        }
        if layout.hidden_rowid {
            let seq = layout.rowid_sequence();
            self.core
                .write(SEQUENCES_ID, catalog::name_key(&seq), None)?;
            self.seq_cache.remove(&seq);
        }
        self.core.write(LAYOUTS_ID, catalog::name_key(name), None)
    }
}

impl<C: TxCore> super::StoreTransaction for SessionTx<C> {
    fn session(&self) -> super::SessionId {
        self.session
    }

    fn lookup_table(&mut self, name: &str) -> Result<TableHandle> {
        self.guard()?;
        let layout = self.layout_for(name)?;
        Ok(TableHandle {
            name: name.to_string(),
            layout,
        })
    }

    fn create_table(
        &mut self,
        name: &str,
        columns: usize,
        primary: Vec<ColumnKey>,
    ) -> Result<TableHandle> {
        self.guard()?;
        if columns == 0 {
            return Err(
                StoreError::Precondition(format!("table {name} must have columns")).into(),
            );
        }
        if primary.iter().any(|ck| ck.column >= columns) {
            return Err(StoreError::Precondition(format!(
                "primary key of table {name} references missing columns"
            ))
            .into());
        }
        if self.is_occupied(LAYOUTS_ID, &catalog::name_key(name))? {
            return Err(StoreError::Duplicate(format!("table {name}")).into());
        }

        self.stmt_atomic(|tx| {
            let hidden_rowid = primary.is_empty();
            let layout = TableLayout {
                table_id: tx.next_id()?,
                columns,
                hidden_rowid,
                primary: if hidden_rowid {
                    vec![ColumnKey::asc(columns)]
                } else {
                    primary
                },
                indexes: Vec::new(),
                foreign_keys: Vec::new(),
                schema_version: 1,
            };
            tx.write_layout(name, &layout)?;
            Ok(TableHandle {
                name: name.to_string(),
                layout,
            })
        })
    }

    fn drop_table(&mut self, name: &str) -> Result<()> {
        self.guard()?;
        self.stmt_atomic(|tx| tx.drop_table_inner(name))
    }

    fn create_index(
        &mut self,
        table: &str,
        name: &str,
        key: Vec<ColumnKey>,
        unique: bool,
    ) -> Result<()> {
        self.guard()?;
        self.stmt_atomic(|tx| tx.create_index_inner(table, name, key, unique))
    }

    fn drop_index(&mut self, table: &str, name: &str) -> Result<()> {
        self.guard()?;
        self.stmt_atomic(|tx| tx.drop_index_inner(table, name))
    }

    fn add_foreign_key(
        &mut self,
        table: &str,
        name: &str,
        columns: Vec<usize>,
        ref_table: &str,
        ref_columns: Vec<usize>,
    ) -> Result<()> {
        self.guard()?;
        self.stmt_atomic(|tx| tx.add_foreign_key_inner(table, name, columns, ref_table, ref_columns))
    }

    fn insert(&mut self, table: &TableHandle, row: Row) -> Result<()> {
        self.guard()?;
        // every use of a layout participates in commit-time schema
        // validation, even when the handle was resolved earlier
        self.core
            .track_read(LAYOUTS_ID, catalog::name_key(&table.name));
        self.stmt_atomic(|tx| tx.insert_inner(table, row))
    }

    fn rows(&mut self, table: &TableHandle, min: Option<&Row>, max: Option<&Row>) -> Result<Rows> {
        self.guard()?;
        self.core
            .track_read(LAYOUTS_ID, catalog::name_key(&table.name));
        let primary = table.layout.primary.clone();
        let lo = min.map(|row| Self::encode_bound(&primary, row)).transpose()?;
        let hi = max.map(|row| Self::encode_bound(&primary, row)).transpose()?;
        let entries: VecDeque<(Vec<u8>, Row)> = self
            .core
            .scan(table.layout.table_id, lo.as_deref(), hi.as_deref())?
            .into();
        Ok(Rows::new(table.clone(), entries))
    }

    fn index_rows(
        &mut self,
        table: &TableHandle,
        index: &str,
        min: Option<&Row>,
        max: Option<&Row>,
    ) -> Result<Rows> {
        self.guard()?;
        self.core
            .track_read(LAYOUTS_ID, catalog::name_key(&table.name));
        let layout = &table.layout;
        let index = layout
            .index(index)
            .ok_or_else(|| {
                StoreError::NotFound(format!("index {} on table {}", index, table.name))
            })?
            .clone();

        let lo = min.map(|row| Self::encode_bound(&index.key, row)).transpose()?;
        let hi = max.map(|row| Self::encode_bound(&index.key, row)).transpose()?;

        // Non-unique entry keys carry a primary key suffix, so the upper
        // bound is a prefix: scan open-ended and stop at the first key past
        // the prefix range.
        let scanned = self
            .core
            .scan(index.index_id, lo.as_deref(), None)?;

        // Entry payloads are the primary key values in key order; re-key
        // them to locate the primary rows.
        let pk_spec: Vec<ColumnKey> = layout
            .primary
            .iter()
            .enumerate()
            .map(|(i, ck)| ColumnKey {
                column: i,
                descending: ck.descending,
            })
            .collect();

        let mut entries = VecDeque::new();
        for (ikey, payload) in scanned {
            if let Some(hi) = hi.as_deref() {
                if ikey.as_slice() > hi && !ikey.starts_with(hi) {
                    break;
                }
            }
            let pk = encode_key(&pk_spec, &payload);
            let row = self
                .core
                .read(layout.table_id, &pk)?
                .ok_or_else(|| {
                    StoreError::Corrupt(format!(
                        "index {} entry without a row in table {}",
                        index.name, table.name
                    ))
                })?;
            entries.push_back((pk, row));
        }
        Ok(Rows::new(table.clone(), entries))
    }

    fn next_stmt(&mut self) -> Result<()> {
        self.guard()?;
        self.flush_deferred()?;
        self.core.advance_stmt();
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        self.guard()?;
        match self.flush_deferred() {
            Ok(()) => {
                self.completed = true;
                self.core.commit()
            }
            Err(err) => {
                self.completed = true;
                self.core.rollback()?;
                Err(err)
            }
        }
    }

    fn rollback(&mut self) -> Result<()> {
        self.guard()?;
        self.completed = true;
        self.deferred.clear();
        self.core.rollback()
    }

    fn delete_row(&mut self, table: &TableHandle, key: &[u8], row: &Row) -> Result<()> {
        self.guard()?;
        self.stmt_atomic(|tx| tx.delete_inner(table, key, row))
    }

    fn update_row(
        &mut self,
        table: &TableHandle,
        key: &[u8],
        row: &Row,
        updates: &[ColumnUpdate],
    ) -> Result<(Vec<u8>, Row)> {
        self.guard()?;
        self.stmt_atomic(|tx| tx.update_inner(table, key, row, updates))
    }
}

/// Merge-by-key walk of a committed-state scan and a transaction's own
/// ordered delta. On a key collision the delta entry wins and the base
/// entry is skipped; tombstones from either side are filtered from the
/// output. Both engine cores build their visible scans with this.
pub struct MergeScan<B>
where
    B: Iterator<Item = (Vec<u8>, Option<Row>)>,
{
    base: Peekable<B>,
    delta: Peekable<std::vec::IntoIter<(Vec<u8>, Option<Row>)>>,
}

impl<B> MergeScan<B>
where
    B: Iterator<Item = (Vec<u8>, Option<Row>)>,
{
    /// `delta` must be sorted by key, one entry per key.
    pub fn new(base: B, delta: Vec<(Vec<u8>, Option<Row>)>) -> Self {
        Self {
            base: base.peekable(),
            delta: delta.into_iter().peekable(),
        }
    }
}

impl<B> Iterator for MergeScan<B>
where
    B: Iterator<Item = (Vec<u8>, Option<Row>)>,
{
    type Item = (Vec<u8>, Row);

    fn next(&mut self) -> Option<(Vec<u8>, Row)> {
        loop {
            let take_delta = match (self.base.peek(), self.delta.peek()) {
                (None, None) => return None,
                (None, Some(_)) => true,
                (Some(_), None) => false,
                (Some((bk, _)), Some((dk, _))) => match dk.cmp(bk) {
                    std::cmp::Ordering::Less => true,
                    std::cmp::Ordering::Greater => false,
                    std::cmp::Ordering::Equal => {
                        // delta shadows the base entry
                        self.base.next();
                        true
                    }
                },
            };

            let (key, row) = if take_delta {
                self.delta.next().expect("peeked delta entry")
            } else {
                self.base.next().expect("peeked base entry")
            };

            if let Some(row) = row {
                return Some((key, row));
            }
        }
    }
}
