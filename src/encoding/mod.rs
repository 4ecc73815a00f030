//! # Binary Encodings
//!
//! Two codecs with different contracts:
//!
//! - [`key`]: order-preserving composite key encoding; byte-wise comparison
//!   of encoded keys matches SQL tuple comparison.
//! - [`row`]: compact tagged row payload encoding; size over order.
//!
//! Both build on [`varint`] for length and index fields.

pub mod key;
pub mod row;
pub mod varint;
