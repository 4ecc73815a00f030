//! # Compact Row Encoding
//!
//! Serializes a row into the tagged binary form stored in WAL records and
//! durable slots. Unlike the key encoding this format is not
//! order-preserving; it optimizes for size instead:
//!
//! ```text
//! [varint arity]
//! per non-null column, in ascending column order:
//!   [tag byte][payload]
//! ```
//!
//! The tag byte packs a 3-bit type code in the high bits and the column
//! index in the low 5 bits; index 31 is an escape meaning the real index
//! follows as a varint. NULL columns are omitted entirely - the decoder
//! reconstructs NULL for every column index present in the arity but absent
//! from the stream.
//!
//! | Type code | Payload                      |
//! |-----------|------------------------------|
//! | 1 Bool    | one byte, 0x00 / 0x01        |
//! | 2 Int     | zigzag varint                |
//! | 3 Float   | 8-byte big-endian IEEE754    |
//! | 4 Text    | varint length + UTF-8 bytes  |
//! | 5 Blob    | varint length + bytes        |
//!
//! Decoding either fully succeeds or reports a `Corrupt` error; truncated
//! payloads, out-of-range column indices, and non-ascending column order
//! are never papered over.

use super::varint::{get_uvarint, get_varint, put_uvarint, put_varint};
use crate::error::StoreError;
use crate::types::{Row, Value};
use eyre::Result;

const CODE_BOOL: u8 = 1;
const CODE_INT: u8 = 2;
const CODE_FLOAT: u8 = 3;
const CODE_TEXT: u8 = 4;
const CODE_BLOB: u8 = 5;

const INDEX_ESCAPE: u8 = 31;

fn corrupt(msg: impl Into<String>) -> eyre::Report {
    StoreError::Corrupt(msg.into()).into()
}

pub fn encode_row(row: &Row) -> Vec<u8> {
    let mut out = Vec::with_capacity(8 + row.len() * 4);
    put_uvarint(&mut out, row.len() as u64);

    for (idx, value) in row.iter().enumerate() {
        let code = match value {
            Value::Null => continue,
            Value::Bool(_) => CODE_BOOL,
            Value::Int(_) => CODE_INT,
            Value::Float(_) => CODE_FLOAT,
            Value::Text(_) => CODE_TEXT,
            Value::Blob(_) => CODE_BLOB,
        };

        if idx < INDEX_ESCAPE as usize {
            out.push((code << 5) | idx as u8);
        } else {
            out.push((code << 5) | INDEX_ESCAPE);
            put_uvarint(&mut out, idx as u64);
        }

        match value {
            Value::Null => unreachable!("null columns are skipped"),
            Value::Bool(b) => out.push(*b as u8),
            Value::Int(i) => put_varint(&mut out, *i),
            Value::Float(f) => out.extend_from_slice(&f.to_bits().to_be_bytes()),
            Value::Text(s) => {
                put_uvarint(&mut out, s.len() as u64);
                out.extend_from_slice(s.as_bytes());
            }
            Value::Blob(b) => {
                put_uvarint(&mut out, b.len() as u64);
                out.extend_from_slice(b);
            }
        }
    }

    out
}

pub fn decode_row(bytes: &[u8]) -> Result<Row> {
    let (arity, mut pos) = get_uvarint(bytes)?;
    let arity = usize::try_from(arity).map_err(|_| corrupt("row arity overflows usize"))?;

    let mut row = vec![Value::Null; arity];
    let mut last_index: Option<usize> = None;

    while pos < bytes.len() {
        let tag = bytes[pos];
        pos += 1;

        let code = tag >> 5;
        let mut index = (tag & 0x1F) as usize;
        if index == INDEX_ESCAPE as usize {
            let (full, n) = get_uvarint(&bytes[pos..])?;
            pos += n;
            index = usize::try_from(full).map_err(|_| corrupt("column index overflows usize"))?;
        }

        if index >= arity {
            return Err(corrupt(format!(
                "column index {} out of range for arity {}",
                index, arity
            )));
        }
        if last_index.is_some_and(|last| index <= last) {
            return Err(corrupt("row columns out of order"));
        }
        last_index = Some(index);

        let value = match code {
            CODE_BOOL => {
                let b = *bytes.get(pos).ok_or_else(|| corrupt("truncated bool column"))?;
                pos += 1;
                match b {
                    0 => Value::Bool(false),
                    1 => Value::Bool(true),
                    other => return Err(corrupt(format!("invalid bool payload {}", other))),
                }
            }
            CODE_INT => {
                let (v, n) = get_varint(&bytes[pos..])?;
                pos += n;
                Value::Int(v)
            }
            CODE_FLOAT => {
                let end = pos + 8;
                let raw = bytes
                    .get(pos..end)
                    .ok_or_else(|| corrupt("truncated float column"))?;
                pos = end;
                let mut bits = [0u8; 8];
                bits.copy_from_slice(raw);
                Value::Float(f64::from_bits(u64::from_be_bytes(bits)))
            }
            CODE_TEXT | CODE_BLOB => {
                let (len, n) = get_uvarint(&bytes[pos..])?;
                pos += n;
                let len = usize::try_from(len).map_err(|_| corrupt("column length overflow"))?;
                let end = pos
                    .checked_add(len)
                    .ok_or_else(|| corrupt("column length overflow"))?;
                let raw = bytes
                    .get(pos..end)
                    .ok_or_else(|| corrupt("truncated variable-length column"))?;
                pos = end;
                if code == CODE_TEXT {
                    let s = std::str::from_utf8(raw)
                        .map_err(|_| corrupt("invalid utf-8 in text column"))?;
                    Value::Text(s.to_string())
                } else {
                    Value::Blob(raw.to_vec())
                }
            }
            other => return Err(corrupt(format!("unknown row type code {}", other))),
        };

        row[index] = value;
    }

    Ok(row)
}
