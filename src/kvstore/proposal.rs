//! Slot key layout and value codecs of the key-value engine.
//!
//! Every logical key owns a run of adjacent backend slots:
//!
//! ```text
//! [8B BE key-space id][encoded key][8B BE !version]
//! ```
//!
//! The version suffix is bitwise complemented so newer versions sort
//! first. The proposal slot uses version `u64::MAX` (suffix all zero) and
//! therefore leads its key's run; durable slots follow, newest first. A
//! scan of a key's run reads the pending write intent, then committed
//! history, in one pass.
//!
//! Durable slot values are the row payload encoding; an empty value is a
//! tombstone (a real row always encodes to at least one byte). A proposal
//! value carries the writing transaction's id and its per-statement write
//! chain, newest first, so the whole uncommitted state of a key survives a
//! process crash alongside the transaction status record that decides its
//! fate.
//!
//! Key-space id 0 is reserved for engine metadata: the committed version
//! counter, the epoch counter, and one status record per transaction.

use crate::encoding::row::{decode_row, encode_row};
use crate::encoding::varint::{get_uvarint, put_uvarint};
use crate::error::StoreError;
use crate::types::{Row, SlotId};
use eyre::Result;

/// Version of the proposal slot; no committed version can reach it.
pub(crate) const PROPOSAL_VERSION: u64 = u64::MAX;

/// Reserved metadata key space.
pub(crate) const META_ID: SlotId = 0;

fn corrupt(msg: impl Into<String>) -> eyre::Report {
    StoreError::Corrupt(msg.into()).into()
}

pub(crate) fn slot_key(id: SlotId, key: &[u8], version: u64) -> Vec<u8> {
    let mut out = Vec::with_capacity(16 + key.len());
    out.extend_from_slice(&id.to_be_bytes());
    out.extend_from_slice(key);
    out.extend_from_slice(&(!version).to_be_bytes());
    out
}

/// Splits a slot key into `(id, encoded key, version)`.
pub(crate) fn parse_slot_key(slot: &[u8]) -> Result<(SlotId, &[u8], u64)> {
    if slot.len() < 16 {
        return Err(corrupt("slot key too short"));
    }
    let id = u64::from_be_bytes(slot[..8].try_into().expect("8-byte prefix"));
    let suffix: [u8; 8] = slot[slot.len() - 8..].try_into().expect("8-byte suffix");
    let version = !u64::from_be_bytes(suffix);
    Ok((id, &slot[8..slot.len() - 8], version))
}

/// Scan bounds covering every slot of one logical key: the proposal slot
/// through all durable versions. Version 0 is never written, so the
/// half-open upper bound excludes nothing real.
pub(crate) fn key_run_bounds(id: SlotId, key: &[u8]) -> (Vec<u8>, Vec<u8>) {
    (slot_key(id, key, PROPOSAL_VERSION), slot_key(id, key, 0))
}

/// Scan bounds covering a key space from `lo` (or its start) onward.
pub(crate) fn space_bounds(id: SlotId, lo: Option<&[u8]>) -> (Vec<u8>, Vec<u8>) {
    let lo = slot_key(id, lo.unwrap_or_default(), PROPOSAL_VERSION);
    let hi = (id + 1).to_be_bytes().to_vec();
    (lo, hi)
}

pub(crate) fn encode_durable(row: Option<&Row>) -> Vec<u8> {
    row.map(encode_row).unwrap_or_default()
}

pub(crate) fn decode_durable(bytes: &[u8]) -> Result<Option<Row>> {
    if bytes.is_empty() {
        return Ok(None);
    }
    decode_row(bytes).map(Some)
}

/// A pending write intent: the owning transaction and its write chain for
/// one key, `(statement id, row | tombstone)`, newest first.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Proposal {
    pub txid: u64,
    pub entries: Vec<(u32, Option<Row>)>,
}

impl Proposal {
    pub(crate) fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&self.txid.to_be_bytes());
        put_uvarint(&mut out, self.entries.len() as u64);
        for (sid, row) in &self.entries {
            put_uvarint(&mut out, u64::from(*sid));
            let bytes = encode_durable(row.as_ref());
            put_uvarint(&mut out, bytes.len() as u64);
            out.extend_from_slice(&bytes);
        }
        out
    }

    pub(crate) fn decode(bytes: &[u8]) -> Result<Proposal> {
        if bytes.len() < 8 {
            return Err(corrupt("proposal value too short"));
        }
        let txid = u64::from_be_bytes(bytes[..8].try_into().expect("8-byte txid"));
        let mut pos = 8;

        let (count, n) = get_uvarint(&bytes[pos..])?;
        pos += n;

        let mut entries = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let (sid, n) = get_uvarint(&bytes[pos..])?;
            pos += n;
            let sid = u32::try_from(sid).map_err(|_| corrupt("proposal statement id overflow"))?;

            let (len, n) = get_uvarint(&bytes[pos..])?;
            pos += n;
            let end = pos
                .checked_add(len as usize)
                .filter(|&end| end <= bytes.len())
                .ok_or_else(|| corrupt("truncated proposal entry"))?;
            entries.push((sid, decode_durable(&bytes[pos..end])?));
            pos = end;
        }

        if pos != bytes.len() {
            return Err(corrupt("trailing bytes in proposal value"));
        }
        Ok(Proposal { txid, entries })
    }

    /// The value this proposal commits to: the newest entry of the chain.
    pub(crate) fn committed_row(&self) -> Option<&Row> {
        self.entries.first().and_then(|(_, row)| row.as_ref())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TxnState {
    Active,
    Committed,
    Aborted,
}

/// Per-transaction status record, persisted in the metadata key space. The
/// commit version is meaningful only in the `Committed` state; the epoch
/// lets a restart distinguish its own active transactions (none) from a
/// previous process's, which are force-aborted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct TxnStatus {
    pub state: TxnState,
    pub epoch: u64,
    pub version: u64,
}

impl TxnStatus {
    pub(crate) fn encode(&self) -> Vec<u8> {
        let state = match self.state {
            TxnState::Active => 0u8,
            TxnState::Committed => 1,
            TxnState::Aborted => 2,
        };
        let mut out = Vec::with_capacity(17);
        out.push(state);
        out.extend_from_slice(&self.epoch.to_be_bytes());
        out.extend_from_slice(&self.version.to_be_bytes());
        out
    }

    pub(crate) fn decode(bytes: &[u8]) -> Result<TxnStatus> {
        if bytes.len() != 17 {
            return Err(corrupt("transaction status record has wrong length"));
        }
        let state = match bytes[0] {
            0 => TxnState::Active,
            1 => TxnState::Committed,
            2 => TxnState::Aborted,
            other => return Err(corrupt(format!("unknown transaction state {other}"))),
        };
        Ok(TxnStatus {
            state,
            epoch: u64::from_be_bytes(bytes[1..9].try_into().expect("epoch bytes")),
            version: u64::from_be_bytes(bytes[9..17].try_into().expect("version bytes")),
        })
    }
}

pub(crate) fn version_key() -> Vec<u8> {
    meta_key(b"version")
}

pub(crate) fn epoch_key() -> Vec<u8> {
    meta_key(b"epoch")
}

pub(crate) fn txn_key(txid: u64) -> Vec<u8> {
    let mut key = meta_key(b"txn.");
    key.extend_from_slice(&txid.to_be_bytes());
    key
}

/// Bounds covering every transaction status record.
pub(crate) fn txn_bounds() -> (Vec<u8>, Vec<u8>) {
    // '.' + 1 == '/', so this prefix range is exact.
    (meta_key(b"txn."), meta_key(b"txn/"))
}

pub(crate) fn txid_of_key(key: &[u8]) -> Result<u64> {
    let suffix = key
        .len()
        .checked_sub(8)
        .and_then(|at| key.get(at..))
        .ok_or_else(|| corrupt("transaction status key too short"))?;
    Ok(u64::from_be_bytes(suffix.try_into().expect("8-byte txid")))
}

pub(crate) fn decode_counter(bytes: &[u8]) -> Result<u64> {
    let raw: [u8; 8] = bytes
        .try_into()
        .map_err(|_| corrupt("counter value has wrong length"))?;
    Ok(u64::from_be_bytes(raw))
}

fn meta_key(suffix: &[u8]) -> Vec<u8> {
    let mut key = META_ID.to_be_bytes().to_vec();
    key.extend_from_slice(suffix);
    key
}
