//! # Catalog
//!
//! Maps logical table names to physical key-space ids and key
//! specifications. Catalog state is not a separate subsystem: layouts and
//! sequence counters are ordinary rows in two reserved system key spaces,
//! so DDL flows through the same snapshot/commit machinery as data and
//! concurrent DDL is caught by the same conflict check.
//!
//! ```text
//! id 1  sequences  row: [Text name, Int last_value]      key: (name ASC)
//! id 2  layouts    row: [Text name, Blob encoded layout] key: (name ASC)
//! ```
//!
//! Table and index ids are allocated from the `"id"` sequence, itself a row
//! in the sequences table, which makes ids unique across restarts. A table
//! declared without a primary key gets a hidden monotonic rowid column
//! (stored as an extra trailing column, invisible to callers) fed from a
//! per-table sequence.
//!
//! Every schema change (`create_index`, `drop_index`, `add_foreign_key`)
//! bumps the layout's `schema_version`. Statements record the version they
//! observed, and commit re-validates those reads against latest committed
//! state - the DDL analogue of the row-level conflict check.

use crate::encoding::key::encode_key;
use crate::encoding::varint::{get_uvarint, put_uvarint};
use crate::error::StoreError;
use crate::types::{ColumnKey, Row, Value};
use eyre::Result;

use crate::types::SlotId;

/// Key space of the sequences system table.
pub const SEQUENCES_ID: SlotId = 1;
/// Key space of the layouts system table.
pub const LAYOUTS_ID: SlotId = 2;
/// Ids at or below this are reserved for system key spaces.
pub const LAST_SYSTEM_ID: i64 = 2;

/// The sequence that hands out table and index ids.
pub const ID_SEQUENCE: &str = "id";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexLayout {
    pub index_id: SlotId,
    pub name: String,
    pub key: Vec<ColumnKey>,
    pub unique: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKeyLayout {
    pub name: String,
    pub columns: Vec<usize>,
    pub ref_table: String,
    pub ref_columns: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableLayout {
    pub table_id: SlotId,
    /// Number of caller-visible columns.
    pub columns: usize,
    /// True when the primary key is a synthesized trailing rowid column.
    pub hidden_rowid: bool,
    pub primary: Vec<ColumnKey>,
    pub indexes: Vec<IndexLayout>,
    pub foreign_keys: Vec<ForeignKeyLayout>,
    pub schema_version: u64,
}

impl TableLayout {
    /// Column count of rows as stored, hidden rowid included.
    pub fn stored_columns(&self) -> usize {
        self.columns + usize::from(self.hidden_rowid)
    }

    /// The per-table sequence feeding the hidden rowid column.
    pub fn rowid_sequence(&self) -> String {
        format!("rowid.{}", self.table_id)
    }

    pub fn index(&self, name: &str) -> Option<&IndexLayout> {
        self.indexes.iter().find(|ix| ix.name == name)
    }

    /// Encoded primary key of a stored row.
    pub fn primary_key_of(&self, row: &Row) -> Vec<u8> {
        encode_key(&self.primary, row)
    }

    /// Encoded entry key and payload for one secondary index. Non-unique
    /// indexes append the primary key encoding so equal index tuples stay
    /// distinct; the payload is the projection of the primary key columns,
    /// enough to locate the primary row.
    pub fn index_entry_of(&self, index: &IndexLayout, row: &Row) -> (Vec<u8>, Row) {
        let mut key = encode_key(&index.key, row);
        if !index.unique {
            key.extend_from_slice(&self.primary_key_of(row));
        }
        let payload = self.primary.iter().map(|ck| row[ck.column].clone()).collect();
        (key, payload)
    }
}

fn corrupt(msg: impl Into<String>) -> eyre::Report {
    StoreError::Corrupt(msg.into()).into()
}

/// Encoded key of a layout or sequence row (both tables key on the name).
pub fn name_key(name: &str) -> Vec<u8> {
    encode_key(&[ColumnKey::asc(0)], &vec![Value::Text(name.to_string())])
}

pub fn sequence_row(name: &str, last_value: i64) -> Row {
    vec![Value::Text(name.to_string()), Value::Int(last_value)]
}

/// Extracts the counter from a sequence row.
pub fn sequence_value(row: &Row) -> Result<i64> {
    match row.get(1) {
        Some(Value::Int(v)) => Ok(*v),
        _ => Err(corrupt("malformed sequence row")),
    }
}

pub fn layout_row(name: &str, layout: &TableLayout) -> Row {
    vec![
        Value::Text(name.to_string()),
        Value::Blob(encode_layout(layout)),
    ]
}

/// Extracts and decodes the layout blob from a layout row.
pub fn layout_of_row(row: &Row) -> Result<TableLayout> {
    match row.get(1) {
        Some(Value::Blob(blob)) => decode_layout(blob),
        _ => Err(corrupt("malformed layout row")),
    }
}

pub fn encode_layout(layout: &TableLayout) -> Vec<u8> {
    let mut out = Vec::new();
    put_uvarint(&mut out, layout.table_id);
    put_uvarint(&mut out, layout.columns as u64);
    out.push(layout.hidden_rowid as u8);
    put_uvarint(&mut out, layout.schema_version);

    put_key(&mut out, &layout.primary);

    put_uvarint(&mut out, layout.indexes.len() as u64);
    for index in &layout.indexes {
        put_uvarint(&mut out, index.index_id);
        put_str(&mut out, &index.name);
        out.push(index.unique as u8);
        put_key(&mut out, &index.key);
    }

    put_uvarint(&mut out, layout.foreign_keys.len() as u64);
    for fk in &layout.foreign_keys {
        put_str(&mut out, &fk.name);
        put_columns(&mut out, &fk.columns);
        put_str(&mut out, &fk.ref_table);
        put_columns(&mut out, &fk.ref_columns);
    }

    out
}

pub fn decode_layout(bytes: &[u8]) -> Result<TableLayout> {
    let mut cur = Reader { buf: bytes, pos: 0 };

    let table_id = cur.uvarint()?;
    let columns = cur.uvarint()? as usize;
    let hidden_rowid = cur.flag()?;
    let schema_version = cur.uvarint()?;
    let primary = cur.key()?;

    let index_count = cur.uvarint()?;
    let mut indexes = Vec::with_capacity(index_count as usize);
    for _ in 0..index_count {
        let index_id = cur.uvarint()?;
        let name = cur.string()?;
        let unique = cur.flag()?;
        let key = cur.key()?;
        indexes.push(IndexLayout {
            index_id,
            name,
            key,
            unique,
        });
    }

    let fk_count = cur.uvarint()?;
    let mut foreign_keys = Vec::with_capacity(fk_count as usize);
    for _ in 0..fk_count {
        let name = cur.string()?;
        let columns = cur.columns()?;
        let ref_table = cur.string()?;
        let ref_columns = cur.columns()?;
        foreign_keys.push(ForeignKeyLayout {
            name,
            columns,
            ref_table,
            ref_columns,
        });
    }

    if cur.pos != bytes.len() {
        return Err(corrupt("trailing bytes in table layout"));
    }

    Ok(TableLayout {
        table_id,
        columns,
        hidden_rowid,
        primary,
        indexes,
        foreign_keys,
        schema_version,
    })
}

fn put_str(out: &mut Vec<u8>, s: &str) {
    put_uvarint(out, s.len() as u64);
    out.extend_from_slice(s.as_bytes());
}

fn put_key(out: &mut Vec<u8>, key: &[ColumnKey]) {
    put_uvarint(out, key.len() as u64);
    for ck in key {
        put_uvarint(out, ck.column as u64);
        out.push(ck.descending as u8);
    }
}

fn put_columns(out: &mut Vec<u8>, columns: &[usize]) {
    put_uvarint(out, columns.len() as u64);
    for &c in columns {
        put_uvarint(out, c as u64);
    }
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn uvarint(&mut self) -> Result<u64> {
        let (v, n) = get_uvarint(&self.buf[self.pos..])?;
        self.pos += n;
        Ok(v)
    }

    fn flag(&mut self) -> Result<bool> {
        let b = *self
            .buf
            .get(self.pos)
            .ok_or_else(|| corrupt("truncated table layout"))?;
        self.pos += 1;
        match b {
            0 => Ok(false),
            1 => Ok(true),
            _ => Err(corrupt("invalid flag byte in table layout")),
        }
    }

    fn string(&mut self) -> Result<String> {
        let len = self.uvarint()? as usize;
        let end = self
            .pos
            .checked_add(len)
            .ok_or_else(|| corrupt("layout string length overflow"))?;
        let raw = self
            .buf
            .get(self.pos..end)
            .ok_or_else(|| corrupt("truncated layout string"))?;
        self.pos = end;
        String::from_utf8(raw.to_vec()).map_err(|_| corrupt("invalid utf-8 in layout"))
    }

    fn key(&mut self) -> Result<Vec<ColumnKey>> {
        let count = self.uvarint()? as usize;
        let mut key = Vec::with_capacity(count);
        for _ in 0..count {
            let column = self.uvarint()? as usize;
            let descending = self.flag()?;
            key.push(ColumnKey { column, descending });
        }
        Ok(key)
    }

    fn columns(&mut self) -> Result<Vec<usize>> {
        let count = self.uvarint()? as usize;
        let mut cols = Vec::with_capacity(count);
        for _ in 0..count {
            cols.push(self.uvarint()? as usize);
        }
        Ok(cols)
    }
}
