//! # Storage Error Taxonomy
//!
//! Every fallible operation in mahodb returns `eyre::Result`, but callers
//! need to distinguish a handful of outcomes to react correctly:
//!
//! | Kind          | Meaning                                   | Caller reaction        |
//! |---------------|-------------------------------------------|------------------------|
//! | Conflict      | write-write or concurrent DDL clash       | retry the transaction  |
//! | NotFound      | missing table / index / row               | surface to the user    |
//! | Duplicate     | primary key or unique index violation     | surface to the user    |
//! | MissingValue  | required column absent                    | surface to the user    |
//! | Completed     | commit/rollback on a finished transaction | programming error      |
//! | Precondition  | iterator contract violated                | programming error      |
//! | Corrupt       | undecodable bytes, malformed WAL          | stop serving the store |
//! | Io            | disk write/sync failure                   | commit aborted cleanly |
//!
//! The enum is attached to an `eyre::Report` at the point of failure and
//! recovered by downcast, so call sites keep plain `Result<T>` signatures
//! while the SQL layer can still branch on the kind.
//!
//! Conflicts and duplicates are recoverable. `Corrupt` is fatal for the
//! store instance: replay and decode never mask a malformed byte stream
//! with a best-effort partial value.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("duplicate key in {0}")]
    Duplicate(String),

    #[error("missing value for {0}")]
    MissingValue(String),

    #[error("transaction already completed")]
    Completed,

    #[error("precondition violated: {0}")]
    Precondition(String),

    #[error("corrupt store: {0}")]
    Corrupt(String),

    #[error("i/o failure: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict(_))
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, StoreError::Corrupt(_) | StoreError::Precondition(_))
    }
}

/// Classifies an `eyre::Report` produced by this crate.
pub fn kind_of(report: &eyre::Report) -> Option<&StoreError> {
    report.downcast_ref::<StoreError>()
}

pub fn is_conflict(report: &eyre::Report) -> bool {
    kind_of(report).is_some_and(StoreError::is_conflict)
}

pub fn is_duplicate(report: &eyre::Report) -> bool {
    matches!(kind_of(report), Some(StoreError::Duplicate(_)))
}

pub fn is_not_found(report: &eyre::Report) -> bool {
    matches!(kind_of(report), Some(StoreError::NotFound(_)))
}

pub fn is_corrupt(report: &eyre::Report) -> bool {
    matches!(kind_of(report), Some(StoreError::Corrupt(_)))
}
