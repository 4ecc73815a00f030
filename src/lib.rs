//! # MahoDB - Pluggable Transactional Table Storage
//!
//! MahoDB is the storage layer of a SQL database: transactional, ordered,
//! multi-version table stores behind one engine-independent interface.
//! The SQL layer above sees tables, rows, indexes, and transactions; the
//! engines below see `(key space id, encoded key) -> row` and nothing
//! else. Everything relational in between - catalog, key encoding,
//! constraints, statement visibility - is shared.
//!
//! ## Quick Start
//!
//! ```ignore
//! use mahodb::store::Registry;
//! use mahodb::types::{ColumnKey, Value};
//!
//! let registry = Registry::with_default_engines();
//! let store = registry.open("tree", "./data/wal".as_ref())?;
//!
//! let mut tx = store.begin(1);
//! let users = tx.create_table("users", 2, vec![ColumnKey::asc(0)])?;
//! tx.next_stmt()?;
//! tx.insert(&users, vec![Value::Int(1), Value::from("alice")])?;
//! tx.commit()?;
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │        SQL Layer (out of this crate)          │
//! ├──────────────────────────────────────────────┤
//! │  store: Store / StoreTransaction / Rows       │
//! │  session: catalog, constraints, indexes,      │
//! │           statement visibility (shared)       │
//! ├──────────────────────┬───────────────────────┤
//! │  treestore            │  kvstore              │
//! │  copy-on-write index  │  MVCC over ordered KV │
//! │  + write-ahead log    │  via proposal slots   │
//! ├──────────────────────┴───────────────────────┤
//! │  encoding: order-preserving keys, row codec   │
//! │  types: SQL value model                       │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! ## Transaction Model
//!
//! Snapshot isolation with optimistic, first-committer-wins conflict
//! handling: transactions never block on each other, and a write-write
//! race surfaces as a conflict error the SQL layer can retry. Within a
//! transaction, writes become visible at statement granularity - a
//! statement never reads its own output - and a failed statement rolls
//! back alone, leaving the transaction usable. Schema reads participate
//! in conflict detection, so DDL races fail like row races instead of
//! corrupting concurrent transactions.
//!
//! ## Module Overview
//!
//! - [`types`]: SQL value model and key specifications
//! - [`encoding`]: order-preserving key codec, row codec, varints
//! - [`store`]: engine interface, shared transaction logic, registry
//! - [`treestore`]: copy-on-write tree engine with a write-ahead log
//! - [`kvstore`]: engine over any ordered key-value backend
//! - [`catalog`]: table layouts and sequences as system rows
//! - [`error`]: error taxonomy and classification helpers

pub mod catalog;
pub mod encoding;
pub mod error;
pub mod kvstore;
pub mod store;
pub mod treestore;
pub mod types;

pub use error::StoreError;
pub use store::{ColumnUpdate, Registry, Rows, SessionId, Store, StoreTransaction, TableHandle};
pub use types::{ColumnKey, Row, SlotId, Value};
