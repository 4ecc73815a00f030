//! # Order-Preserving Key Encoding
//!
//! Encodes a tuple of SQL values into a byte string whose lexicographic
//! order matches the SQL tuple order, so index lookups and range scans
//! compare keys with plain `memcmp` and never consult types.
//!
//! ## Type Tags
//!
//! Every value starts with a one-byte tag; the tags themselves sort in the
//! desired cross-type order (NULL < booleans < integers < floats < text <
//! blobs). The values are part of the on-disk format and must not change:
//!
//! ```text
//! 128  NULL
//! 129  BOOL          payload: 0x00 / 0x01
//! 130  INT_NEG       payload: 8-byte big-endian two's-complement pattern
//! 131  INT_NOT_NEG   payload: 8-byte big-endian
//! 140  FLOAT_NAN     no payload (NaN sorts before all other floats)
//! 141  FLOAT_NEG_INF no payload
//! 142  FLOAT_NEG     payload: complemented IEEE754 bits, big-endian
//! 143  FLOAT_ZERO    no payload (covers both signed zeros)
//! 144  FLOAT_POS     payload: IEEE754 bits, big-endian (+Inf included)
//! 150  TEXT          payload: byte-stuffed, 0x00-terminated
//! 160  BLOB          payload: byte-stuffed, 0x00-terminated
//! ```
//!
//! ## Integer Encoding
//!
//! Negative and non-negative integers get separate tags; within each tag the
//! raw two's-complement pattern written big-endian already compares
//! numerically (-2 = `...FE` < -1 = `...FF`; 1 < 2 trivially).
//!
//! ## Float Encoding
//!
//! Finite negatives store the bitwise complement of their IEEE754 pattern
//! (more negative = larger magnitude bits = smaller complement); finite
//! positives store the raw pattern, which compares numerically when the sign
//! bit is clear. Zero gets a dedicated tag so `-0.0` and `0.0` encode
//! identically, and NaN a dedicated smallest tag so the order is total
//! without trusting IEEE comparison of NaN payloads.
//!
//! ## Text / Blob Encoding
//!
//! Variable-length values are byte-stuffed so that no encoding is a prefix
//! of another and embedded zero bytes survive:
//!
//! ```text
//! 0x00 -> 0x01 0x01
//! 0x01 -> 0x01 0x02
//! terminator: 0x00
//! ```
//!
//! The terminator (0x00) sorts below every stuffed data byte (>= 0x01), so
//! a shorter string sorts before its extensions.
//!
//! ## Descending Columns
//!
//! A descending column complements every byte of that column's complete
//! ascending encoding, tag and terminator included. Complementing a whole
//! self-delimiting segment reverses its order exactly, including NULL
//! placement (NULL first ascending, last descending).
//!
//! ## Failure
//!
//! Decoding malformed or truncated bytes is a `Corrupt` error for the
//! store; no partial tuple is ever returned.

use crate::error::StoreError;
use crate::types::{ColumnKey, Row, Value};
use eyre::Result;

pub const NULL_TAG: u8 = 128;
pub const BOOL_TAG: u8 = 129;
pub const INT_NEG_TAG: u8 = 130;
pub const INT_NOT_NEG_TAG: u8 = 131;
pub const FLOAT_NAN_TAG: u8 = 140;
pub const FLOAT_NEG_INF_TAG: u8 = 141;
pub const FLOAT_NEG_TAG: u8 = 142;
pub const FLOAT_ZERO_TAG: u8 = 143;
pub const FLOAT_POS_TAG: u8 = 144;
pub const TEXT_TAG: u8 = 150;
pub const BLOB_TAG: u8 = 160;

const ESCAPE: u8 = 0x01;
const TERMINATOR: u8 = 0x00;

fn corrupt(msg: impl Into<String>) -> eyre::Report {
    StoreError::Corrupt(msg.into()).into()
}

/// Encodes the key columns of `row` under `key` into a byte-comparable
/// string.
pub fn encode_key(key: &[ColumnKey], row: &Row) -> Vec<u8> {
    let mut out = Vec::with_capacity(key.len() * 10);
    for ck in key {
        let start = out.len();
        encode_value(&mut out, &row[ck.column]);
        if ck.descending {
            for b in &mut out[start..] {
                *b = !*b;
            }
        }
    }
    out
}

fn encode_value(out: &mut Vec<u8>, value: &Value) {
    match value {
        Value::Null => out.push(NULL_TAG),
        Value::Bool(b) => {
            out.push(BOOL_TAG);
            out.push(*b as u8);
        }
        Value::Int(i) => {
            if *i < 0 {
                out.push(INT_NEG_TAG);
            } else {
                out.push(INT_NOT_NEG_TAG);
            }
            out.extend_from_slice(&(*i as u64).to_be_bytes());
        }
        Value::Float(f) => {
            if f.is_nan() {
                out.push(FLOAT_NAN_TAG);
            } else if *f == f64::NEG_INFINITY {
                out.push(FLOAT_NEG_INF_TAG);
            } else if *f == 0.0 {
                out.push(FLOAT_ZERO_TAG);
            } else if *f < 0.0 {
                out.push(FLOAT_NEG_TAG);
                out.extend_from_slice(&(!f.to_bits()).to_be_bytes());
            } else {
                out.push(FLOAT_POS_TAG);
                out.extend_from_slice(&f.to_bits().to_be_bytes());
            }
        }
        Value::Text(s) => {
            out.push(TEXT_TAG);
            stuff_bytes(out, s.as_bytes());
        }
        Value::Blob(b) => {
            out.push(BLOB_TAG);
            stuff_bytes(out, b);
        }
    }
}

fn stuff_bytes(out: &mut Vec<u8>, data: &[u8]) {
    for &b in data {
        match b {
            0x00 => out.extend_from_slice(&[ESCAPE, 0x01]),
            0x01 => out.extend_from_slice(&[ESCAPE, 0x02]),
            _ => out.push(b),
        }
    }
    out.push(TERMINATOR);
}

/// Decodes an encoded key back into the key-column values, in key order.
/// Only the key columns are recoverable; row payloads travel separately.
pub fn decode_key(bytes: &[u8], key: &[ColumnKey]) -> Result<Vec<Value>> {
    let mut cursor = Cursor { buf: bytes, pos: 0 };
    let mut values = Vec::with_capacity(key.len());
    for ck in key {
        values.push(decode_value(&mut cursor, ck.descending)?);
    }
    if cursor.pos != bytes.len() {
        return Err(corrupt(format!(
            "{} trailing bytes after key decode",
            bytes.len() - cursor.pos
        )));
    }
    Ok(values)
}

struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn byte(&mut self, desc: bool) -> Result<u8> {
        let b = *self
            .buf
            .get(self.pos)
            .ok_or_else(|| corrupt("truncated key"))?;
        self.pos += 1;
        Ok(if desc { !b } else { b })
    }

    fn fixed8(&mut self, desc: bool) -> Result<[u8; 8]> {
        let mut out = [0u8; 8];
        for slot in &mut out {
            *slot = self.byte(desc)?;
        }
        Ok(out)
    }
}

fn decode_value(cursor: &mut Cursor<'_>, desc: bool) -> Result<Value> {
    let tag = cursor.byte(desc)?;
    match tag {
        NULL_TAG => Ok(Value::Null),
        BOOL_TAG => match cursor.byte(desc)? {
            0 => Ok(Value::Bool(false)),
            1 => Ok(Value::Bool(true)),
            b => Err(corrupt(format!("invalid bool payload {}", b))),
        },
        INT_NEG_TAG | INT_NOT_NEG_TAG => {
            let raw = i64::from_be_bytes(cursor.fixed8(desc)?);
            if (tag == INT_NEG_TAG) != (raw < 0) {
                return Err(corrupt("integer sign does not match its tag"));
            }
            Ok(Value::Int(raw))
        }
        FLOAT_NAN_TAG => Ok(Value::Float(f64::NAN)),
        FLOAT_NEG_INF_TAG => Ok(Value::Float(f64::NEG_INFINITY)),
        FLOAT_ZERO_TAG => Ok(Value::Float(0.0)),
        FLOAT_NEG_TAG => {
            let bits = !u64::from_be_bytes(cursor.fixed8(desc)?);
            Ok(Value::Float(f64::from_bits(bits)))
        }
        FLOAT_POS_TAG => {
            let bits = u64::from_be_bytes(cursor.fixed8(desc)?);
            Ok(Value::Float(f64::from_bits(bits)))
        }
        TEXT_TAG => {
            let raw = unstuff_bytes(cursor, desc)?;
            let s = String::from_utf8(raw).map_err(|_| corrupt("invalid utf-8 in text key"))?;
            Ok(Value::Text(s))
        }
        BLOB_TAG => Ok(Value::Blob(unstuff_bytes(cursor, desc)?)),
        _ => Err(corrupt(format!("unknown key tag {}", tag))),
    }
}

fn unstuff_bytes(cursor: &mut Cursor<'_>, desc: bool) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    loop {
        match cursor.byte(desc)? {
            TERMINATOR => return Ok(out),
            ESCAPE => match cursor.byte(desc)? {
                0x01 => out.push(0x00),
                0x02 => out.push(0x01),
                b => return Err(corrupt(format!("invalid escape sequence 0x01 {:#04x}", b))),
            },
            b => out.push(b),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::is_corrupt;
    use crate::types::compare_rows;
    use std::cmp::Ordering;

    fn asc(n: usize) -> Vec<ColumnKey> {
        (0..n).map(ColumnKey::asc).collect()
    }

    fn single(v: Value) -> Vec<u8> {
        encode_key(&asc(1), &vec![v])
    }

    #[test]
    fn tags_hold_their_wire_values() {
        assert_eq!(NULL_TAG, 128);
        assert_eq!(BOOL_TAG, 129);
        assert_eq!(INT_NEG_TAG, 130);
        assert_eq!(INT_NOT_NEG_TAG, 131);
        assert_eq!(FLOAT_NAN_TAG, 140);
        assert_eq!(FLOAT_POS_TAG, 144);
        assert_eq!(TEXT_TAG, 150);
        assert_eq!(BLOB_TAG, 160);
    }

    fn interesting_values() -> Vec<Value> {
        vec![
            Value::Null,
            Value::Bool(false),
            Value::Bool(true),
            Value::Int(i64::MIN),
            Value::Int(-1_000_000),
            Value::Int(-1),
            Value::Int(0),
            Value::Int(1),
            Value::Int(1_000_000),
            Value::Int(i64::MAX),
            Value::Float(f64::NAN),
            Value::Float(f64::NEG_INFINITY),
            Value::Float(-1e300),
            Value::Float(-1.5),
            Value::Float(-f64::MIN_POSITIVE),
            Value::Float(-0.0),
            Value::Float(0.0),
            Value::Float(f64::MIN_POSITIVE),
            Value::Float(1.5),
            Value::Float(1e300),
            Value::Float(f64::INFINITY),
            Value::Text("".into()),
            Value::Text("\u{0}".into()),
            Value::Text("\u{0}a".into()),
            Value::Text("\u{1}".into()),
            Value::Text("a".into()),
            Value::Text("a\u{0}".into()),
            Value::Text("aa".into()),
            Value::Text("b".into()),
            Value::Blob(vec![]),
            Value::Blob(vec![0x00]),
            Value::Blob(vec![0x00, 0x00]),
            Value::Blob(vec![0x00, 0x01]),
            Value::Blob(vec![0x01]),
            Value::Blob(vec![0x02]),
            Value::Blob(vec![0xFF]),
        ]
    }

    #[test]
    fn single_column_order_matches_sql_order_ascending() {
        let values = interesting_values();
        let key = asc(1);
        for a in &values {
            for b in &values {
                let ka = encode_key(&key, &vec![a.clone()]);
                let kb = encode_key(&key, &vec![b.clone()]);
                let expected = a.sql_cmp(b);
                assert_eq!(
                    ka.cmp(&kb),
                    expected,
                    "ascending order mismatch: {:?} vs {:?}",
                    a,
                    b
                );
            }
        }
    }

    #[test]
    fn single_column_order_reverses_descending() {
        let values = interesting_values();
        let key = vec![ColumnKey::desc(0)];
        for a in &values {
            for b in &values {
                let ka = encode_key(&key, &vec![a.clone()]);
                let kb = encode_key(&key, &vec![b.clone()]);
                assert_eq!(
                    ka.cmp(&kb),
                    a.sql_cmp(b).reverse(),
                    "descending order mismatch: {:?} vs {:?}",
                    a,
                    b
                );
            }
        }
    }

    #[test]
    fn null_first_ascending_last_descending() {
        let null = single(Value::Null);
        let int = single(Value::Int(0));
        assert!(null < int);

        let key = vec![ColumnKey::desc(0)];
        let null_d = encode_key(&key, &vec![Value::Null]);
        let int_d = encode_key(&key, &vec![Value::Int(0)]);
        assert!(null_d > int_d);
    }

    #[test]
    fn mixed_direction_composite_keys_preserve_order() {
        let key = vec![ColumnKey::asc(0), ColumnKey::desc(1)];
        let rows: Vec<Row> = vec![
            vec![Value::Int(1), Value::Text("z".into())],
            vec![Value::Int(1), Value::Text("a".into())],
            vec![Value::Int(2), Value::Null],
            vec![Value::Int(2), Value::Text("m".into())],
            vec![Value::Int(3), Value::Float(f64::NAN)],
            vec![Value::Int(3), Value::Float(1.0)],
        ];
        for a in &rows {
            for b in &rows {
                let ka = encode_key(&key, a);
                let kb = encode_key(&key, b);
                assert_eq!(
                    ka.cmp(&kb),
                    compare_rows(&key, a, b),
                    "composite mismatch: {:?} vs {:?}",
                    a,
                    b
                );
            }
        }
    }

    #[test]
    fn no_encoding_is_a_prefix_of_another() {
        let values = interesting_values();
        for a in &values {
            for b in &values {
                if a.sql_cmp(b) == Ordering::Equal {
                    continue;
                }
                let ka = single(a.clone());
                let kb = single(b.clone());
                assert!(
                    !kb.starts_with(&ka),
                    "{:?} encoding is a prefix of {:?}",
                    a,
                    b
                );
            }
        }
    }

    #[test]
    fn roundtrip_all_values_both_directions() {
        for desc in [false, true] {
            let key = vec![ColumnKey {
                column: 0,
                descending: desc,
            }];
            for v in interesting_values() {
                let encoded = encode_key(&key, &vec![v.clone()]);
                let decoded = decode_key(&encoded, &key).unwrap();
                assert_eq!(decoded.len(), 1);
                assert_eq!(
                    decoded[0].sql_cmp(&v),
                    Ordering::Equal,
                    "roundtrip mismatch for {:?} desc={}",
                    v,
                    desc
                );
            }
        }
    }

    #[test]
    fn roundtrip_projects_key_columns_only() {
        let row = vec![
            Value::Text("ignored".into()),
            Value::Int(42),
            Value::Bool(true),
        ];
        let key = vec![ColumnKey::desc(2), ColumnKey::asc(1)];
        let encoded = encode_key(&key, &row);
        let decoded = decode_key(&encoded, &key).unwrap();
        assert_eq!(decoded, vec![Value::Bool(true), Value::Int(42)]);
    }

    #[test]
    fn negative_zero_encodes_like_positive_zero() {
        assert_eq!(single(Value::Float(-0.0)), single(Value::Float(0.0)));
    }

    #[test]
    fn truncated_key_is_corrupt() {
        let encoded = single(Value::Int(123456));
        let err = decode_key(&encoded[..5], &asc(1)).unwrap_err();
        assert!(is_corrupt(&err));
    }

    #[test]
    fn unknown_tag_is_corrupt() {
        let err = decode_key(&[200], &asc(1)).unwrap_err();
        assert!(is_corrupt(&err));
    }

    #[test]
    fn trailing_bytes_are_corrupt() {
        let mut encoded = single(Value::Bool(true));
        encoded.push(0);
        let err = decode_key(&encoded, &asc(1)).unwrap_err();
        assert!(is_corrupt(&err));
    }

    #[test]
    fn bad_escape_sequence_is_corrupt() {
        // TEXT tag, escape byte followed by an invalid selector.
        let err = decode_key(&[TEXT_TAG, 0x01, 0x07, 0x00], &asc(1)).unwrap_err();
        assert!(is_corrupt(&err));
    }
}
