//! # Variable-Length Integer Encoding
//!
//! Space-efficient unsigned integer encoding used for row arity, column
//! indices, length prefixes, and WAL row-record fields. A marker byte
//! selects the width, so small values (the overwhelmingly common case for
//! lengths and column counts) cost a single byte:
//!
//! | Value Range           | Bytes | Marker  |
//! |-----------------------|-------|---------|
//! | 0 - 240               | 1     | value   |
//! | 241 - 2287            | 2     | 241-248 |
//! | 2288 - 67823          | 3     | 249     |
//! | 67824 - 16777215      | 4     | 250     |
//! | 16777216 - u32::MAX   | 5     | 251     |
//! | above                 | 9     | 255     |
//!
//! Markers 252-254 are reserved; decoding them is a corruption error, as is
//! any truncated encoding. Signed row values go through the zigzag mapping
//! first so small magnitudes of either sign stay short.
//!
//! All functions are pure and allocation-free apart from the `Vec` append
//! helpers.

use crate::error::StoreError;
use eyre::Result;

/// Appends the varint encoding of `value` to `out`.
pub fn put_uvarint(out: &mut Vec<u8>, value: u64) {
    if value <= 240 {
        out.push(value as u8);
    } else if value <= 2287 {
        let v = value - 240;
        out.push(((v >> 8) + 241) as u8);
        out.push((v & 0xFF) as u8);
    } else if value <= 67823 {
        let v = value - 2288;
        out.push(249);
        out.push((v >> 8) as u8);
        out.push((v & 0xFF) as u8);
    } else if value <= 0xFF_FFFF {
        out.push(250);
        out.push((value >> 16) as u8);
        out.push((value >> 8) as u8);
        out.push(value as u8);
    } else if value <= 0xFFFF_FFFF {
        out.push(251);
        out.push((value >> 24) as u8);
        out.push((value >> 16) as u8);
        out.push((value >> 8) as u8);
        out.push(value as u8);
    } else {
        out.push(255);
        out.extend_from_slice(&value.to_be_bytes());
    }
}

/// Decodes a varint from the front of `buf`, returning the value and the
/// number of bytes consumed. Truncated or reserved-marker input is a
/// `Corrupt` error.
pub fn get_uvarint(buf: &[u8]) -> Result<(u64, usize)> {
    let first = *buf
        .first()
        .ok_or_else(|| StoreError::Corrupt("empty buffer for varint".into()))?;

    let need = |n: usize| -> Result<()> {
        if buf.len() < n {
            Err(StoreError::Corrupt(format!("truncated {}-byte varint", n)).into())
        } else {
            Ok(())
        }
    };

    if first <= 240 {
        Ok((first as u64, 1))
    } else if first <= 248 {
        need(2)?;
        Ok((240 + ((first as u64 - 241) << 8) + buf[1] as u64, 2))
    } else if first == 249 {
        need(3)?;
        Ok((2288 + ((buf[1] as u64) << 8) + buf[2] as u64, 3))
    } else if first == 250 {
        need(4)?;
        let v = ((buf[1] as u64) << 16) + ((buf[2] as u64) << 8) + buf[3] as u64;
        Ok((v, 4))
    } else if first == 251 {
        need(5)?;
        let v = ((buf[1] as u64) << 24)
            + ((buf[2] as u64) << 16)
            + ((buf[3] as u64) << 8)
            + buf[4] as u64;
        Ok((v, 5))
    } else if first == 255 {
        need(9)?;
        let mut raw = [0u8; 8];
        raw.copy_from_slice(&buf[1..9]);
        Ok((u64::from_be_bytes(raw), 9))
    } else {
        Err(StoreError::Corrupt(format!("reserved varint marker {}", first)).into())
    }
}

/// Maps a signed integer onto the unsigned space with small magnitudes of
/// either sign staying small: 0, -1, 1, -2, 2, ...
pub fn zigzag(value: i64) -> u64 {
    ((value << 1) ^ (value >> 63)) as u64
}

pub fn unzigzag(value: u64) -> i64 {
    ((value >> 1) as i64) ^ -((value & 1) as i64)
}

pub fn put_varint(out: &mut Vec<u8>, value: i64) {
    put_uvarint(out, zigzag(value));
}

pub fn get_varint(buf: &[u8]) -> Result<(i64, usize)> {
    let (raw, n) = get_uvarint(buf)?;
    Ok((unzigzag(raw), n))
}
