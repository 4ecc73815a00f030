//! # Write-Ahead Log
//!
//! Append-only durable record of every committed delta, replayed in full at
//! startup to rebuild the versioned index. Replay is the only path that
//! establishes post-crash state: there is no checkpoint or snapshot file,
//! and the log is never compacted or truncated. That unbounded growth is a
//! known limitation of this engine, inherited deliberately.
//!
//! ## File Format
//!
//! ```text
//! Header (16 bytes):
//!   [8-byte signature "mahodbwl"][1-byte format version][7 reserved bytes]
//!
//! Commit record (one per successful commit):
//!   [0x01][u32 BE payload length][u64 BE commit version][payload]
//!
//! Payload: concatenated row records:
//!   [0x02][varint table-or-index id][varint key length][key bytes]
//!         [varint row length][row bytes]
//! ```
//!
//! A row length of zero marks a tombstone (encoded rows are never empty:
//! even a zero-column row encodes its arity byte).
//!
//! ## Durability Boundary
//!
//! A commit record is serialized into one buffer, appended with a single
//! write, and explicitly synced before the commit coordinator may report
//! success. If the write or sync fails the file is wound back to its
//! previous length and the commit is aborted with no visible effect.
//!
//! ## Recovery
//!
//! On open, a file shorter than the header is (re)initialized empty.
//! Otherwise every commit record is replayed in file order; the highest
//! version seen becomes the store's current version. A torn or malformed
//! record is a `Corrupt` error - replay never silently drops bytes.

use super::index::{EntryKey, VersionedIndex};
use crate::encoding::row::{decode_row, encode_row};
use crate::encoding::varint::{get_uvarint, put_uvarint};
use crate::error::StoreError;
use crate::types::Row;
use eyre::{Result, WrapErr};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;
use zerocopy::{FromBytes, Immutable, IntoBytes};

pub const WAL_SIGNATURE: [u8; 8] = *b"mahodbwl";
pub const WAL_FORMAT_VERSION: u8 = 1;
pub const WAL_HEADER_SIZE: usize = 16;

pub const REC_COMMIT: u8 = 1;
pub const REC_ROW: u8 = 2;

#[repr(C)]
#[derive(Debug, Clone, Copy, IntoBytes, FromBytes, Immutable)]
struct WalHeader {
    signature: [u8; 8],
    version: u8,
    _reserved: [u8; 7],
}

impl WalHeader {
    fn current() -> Self {
        Self {
            signature: WAL_SIGNATURE,
            version: WAL_FORMAT_VERSION,
            _reserved: [0; 7],
        }
    }
}

fn corrupt(msg: impl Into<String>) -> eyre::Report {
    StoreError::Corrupt(msg.into()).into()
}

#[derive(Debug)]
pub struct Wal {
    file: File,
    offset: u64,
}

impl Wal {
    /// Opens (or creates) the log at `path` and replays it into a fresh
    /// index. Returns the log positioned for appends and the rebuilt state.
    pub fn open(path: &Path) -> Result<(Wal, VersionedIndex)> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .map_err(StoreError::Io)
            .wrap_err_with(|| format!("failed to open WAL at {:?}", path))?;

        let len = file.metadata().map_err(StoreError::Io)?.len();

        if len < WAL_HEADER_SIZE as u64 {
            // Too short to contain a header: (re)initialize empty.
            file.set_len(0).map_err(StoreError::Io)?;
            file.seek(SeekFrom::Start(0)).map_err(StoreError::Io)?;
            file.write_all(WalHeader::current().as_bytes())
                .map_err(StoreError::Io)?;
            file.sync_data().map_err(StoreError::Io)?;
            return Ok((
                Wal {
                    file,
                    offset: WAL_HEADER_SIZE as u64,
                },
                VersionedIndex::new(),
            ));
        }

        file.seek(SeekFrom::Start(0)).map_err(StoreError::Io)?;
        let mut contents = Vec::with_capacity(len as usize);
        file.read_to_end(&mut contents).map_err(StoreError::Io)?;

        let header = WalHeader::read_from_bytes(&contents[..WAL_HEADER_SIZE])
            .map_err(|_| corrupt("unreadable WAL header"))?;
        if header.signature != WAL_SIGNATURE {
            return Err(corrupt("WAL signature mismatch"));
        }
        if header.version != WAL_FORMAT_VERSION {
            return Err(corrupt(format!(
                "unsupported WAL format version {}",
                header.version
            )));
        }

        let index = replay(&contents[WAL_HEADER_SIZE..])?;

        file.seek(SeekFrom::End(0)).map_err(StoreError::Io)?;
        Ok((Wal { file, offset: len }, index))
    }

    /// Appends one commit record and syncs it - the durability boundary.
    /// On any I/O failure the file is wound back to its previous length so
    /// a half-written record cannot poison later appends.
    pub fn append_commit<'a>(
        &mut self,
        version: u64,
        changes: impl IntoIterator<Item = (&'a EntryKey, Option<&'a Row>)>,
    ) -> Result<()> {
        let mut payload = Vec::new();
        for (key, row) in changes {
            payload.push(REC_ROW);
            put_uvarint(&mut payload, key.id);
            put_uvarint(&mut payload, key.key.len() as u64);
            payload.extend_from_slice(&key.key);
            match row {
                Some(row) => {
                    let encoded = encode_row(row);
                    put_uvarint(&mut payload, encoded.len() as u64);
                    payload.extend_from_slice(&encoded);
                }
                None => put_uvarint(&mut payload, 0),
            }
        }

        let mut record = Vec::with_capacity(13 + payload.len());
        record.push(REC_COMMIT);
        record.extend_from_slice(&(payload.len() as u32).to_be_bytes());
        record.extend_from_slice(&version.to_be_bytes());
        record.extend_from_slice(&payload);

        let write_result = self
            .file
            .write_all(&record)
            .and_then(|_| self.file.sync_data());

        if let Err(err) = write_result {
            // Best effort: discard the torn tail so the log stays replayable.
            let _ = self.file.set_len(self.offset);
            let _ = self.file.seek(SeekFrom::End(0));
            return Err(StoreError::Io(err)).wrap_err("WAL append failed; commit aborted");
        }

        self.offset += record.len() as u64;
        Ok(())
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }
}

/// Replays the record stream after the header into a fresh index.
fn replay(mut stream: &[u8]) -> Result<VersionedIndex> {
    let mut index = VersionedIndex::new();
    let mut max_version = 0u64;

    while !stream.is_empty() {
        if stream.len() < 13 {
            return Err(corrupt("torn WAL commit record header"));
        }
        if stream[0] != REC_COMMIT {
            return Err(corrupt(format!("unexpected WAL record type {}", stream[0])));
        }

        let mut len_raw = [0u8; 4];
        len_raw.copy_from_slice(&stream[1..5]);
        let payload_len = u32::from_be_bytes(len_raw) as usize;

        let mut version_raw = [0u8; 8];
        version_raw.copy_from_slice(&stream[5..13]);
        let version = u64::from_be_bytes(version_raw);

        let end = 13usize
            .checked_add(payload_len)
            .ok_or_else(|| corrupt("WAL record length overflow"))?;
        if stream.len() < end {
            return Err(corrupt("torn WAL commit record payload"));
        }

        let changes = decode_payload(&stream[13..end])?;
        index.apply(version, changes);
        max_version = max_version.max(version);

        stream = &stream[end..];
    }

    index.set_version(max_version);
    Ok(index)
}

fn decode_payload(mut payload: &[u8]) -> Result<Vec<(EntryKey, Option<Row>)>> {
    let mut changes = Vec::new();

    while !payload.is_empty() {
        if payload[0] != REC_ROW {
            return Err(corrupt(format!(
                "unexpected WAL row record type {}",
                payload[0]
            )));
        }
        payload = &payload[1..];

        let (id, n) = get_uvarint(payload)?;
        payload = &payload[n..];

        let (key_len, n) = get_uvarint(payload)?;
        payload = &payload[n..];
        let key_len = usize::try_from(key_len).map_err(|_| corrupt("WAL key length overflow"))?;
        let key = payload
            .get(..key_len)
            .ok_or_else(|| corrupt("torn WAL row record key"))?
            .to_vec();
        payload = &payload[key_len..];

        let (row_len, n) = get_uvarint(payload)?;
        payload = &payload[n..];
        let row_len = usize::try_from(row_len).map_err(|_| corrupt("WAL row length overflow"))?;
        let row = if row_len == 0 {
            None
        } else {
            let raw = payload
                .get(..row_len)
                .ok_or_else(|| corrupt("torn WAL row record payload"))?;
            Some(decode_row(raw)?)
        };
        payload = &payload[row_len..];

        changes.push((EntryKey::new(id, key), row));
    }

    Ok(changes)
}
