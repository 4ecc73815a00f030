//! # Runtime Value Representation
//!
//! `Value` is the closed tagged union carried through the engine: encoding,
//! visibility resolution, and conflict checks all operate on it. Variants
//! mirror the storable SQL types:
//!
//! | Variant | Rust Type | Description            |
//! |---------|-----------|------------------------|
//! | Null    | -         | SQL NULL               |
//! | Bool    | bool      | boolean                |
//! | Int     | i64       | 64-bit signed integer  |
//! | Float   | f64       | 64-bit floating point  |
//! | Text    | String    | UTF-8 string           |
//! | Blob    | Vec<u8>   | binary data            |
//!
//! ## Ordering Semantics
//!
//! `sql_cmp` is the total order the key codec must reproduce byte-wise:
//!
//! - Cross-type: NULL < Bool < Int < Float < Text < Blob
//! - Bool: FALSE < TRUE
//! - Float: NaN < -Inf < negatives < zero (both signs equal) < positives < +Inf
//!
//! NaN is pinned before every other float so the order is total regardless
//! of IEEE comparison semantics; negative and positive zero are equal.

use std::cmp::Ordering;

/// A single SQL value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Blob(Vec<u8>),
}

/// An ordered sequence of values, positionally aligned to a table's columns.
pub type Row = Vec<Value>;

/// One column of a key: which row position, and in which direction it sorts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnKey {
    pub column: usize,
    pub descending: bool,
}

impl ColumnKey {
    pub fn asc(column: usize) -> Self {
        Self {
            column,
            descending: false,
        }
    }

    pub fn desc(column: usize) -> Self {
        Self {
            column,
            descending: true,
        }
    }
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Text(_) => "text",
            Value::Blob(_) => "blob",
        }
    }

    /// Rank used for cross-type comparison; matches the key tag order.
    fn type_rank(&self) -> u8 {
        match self {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Int(_) => 2,
            Value::Float(_) => 3,
            Value::Text(_) => 4,
            Value::Blob(_) => 5,
        }
    }

    /// Total SQL order over values. The key codec's byte order must agree
    /// with this comparison exactly.
    pub fn sql_cmp(&self, other: &Value) -> Ordering {
        match (self, other) {
            (Value::Null, Value::Null) => Ordering::Equal,
            (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
            (Value::Int(a), Value::Int(b)) => a.cmp(b),
            (Value::Float(a), Value::Float(b)) => float_total_cmp(*a, *b),
            (Value::Text(a), Value::Text(b)) => a.cmp(b),
            (Value::Blob(a), Value::Blob(b)) => a.cmp(b),
            _ => self.type_rank().cmp(&other.type_rank()),
        }
    }
}

/// Total order over f64: NaN first, -0 == +0, otherwise numeric.
fn float_total_cmp(a: f64, b: f64) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Blob(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_sorts_before_every_type() {
        let others = [
            Value::Bool(false),
            Value::Int(i64::MIN),
            Value::Float(f64::NEG_INFINITY),
            Value::Text(String::new()),
            Value::Blob(vec![]),
        ];
        for v in &others {
            assert_eq!(Value::Null.sql_cmp(v), Ordering::Less, "null vs {:?}", v);
        }
    }

    #[test]
    fn cross_type_order_matches_tag_order() {
        let ladder = [
            Value::Null,
            Value::Bool(true),
            Value::Int(i64::MAX),
            Value::Float(f64::NEG_INFINITY),
            Value::Text("".into()),
            Value::Blob(vec![0]),
        ];
        for pair in ladder.windows(2) {
            assert_eq!(pair[0].sql_cmp(&pair[1]), Ordering::Less);
        }
    }

    #[test]
    fn nan_sorts_before_all_other_floats() {
        let nan = Value::Float(f64::NAN);
        for v in [
            f64::NEG_INFINITY,
            -1.5,
            -0.0,
            0.0,
            1.5,
            f64::INFINITY,
        ] {
            assert_eq!(nan.sql_cmp(&Value::Float(v)), Ordering::Less);
        }
        assert_eq!(nan.sql_cmp(&Value::Float(f64::NAN)), Ordering::Equal);
    }

    #[test]
    fn zeros_compare_equal() {
        assert_eq!(
            Value::Float(-0.0).sql_cmp(&Value::Float(0.0)),
            Ordering::Equal
        );
    }

    #[test]
    fn bool_false_before_true() {
        assert_eq!(
            Value::Bool(false).sql_cmp(&Value::Bool(true)),
            Ordering::Less
        );
    }

    #[test]
    fn conversions_produce_expected_variants() {
        assert_eq!(Value::from(42i64), Value::Int(42));
        assert_eq!(Value::from("hi"), Value::Text("hi".into()));
        assert_eq!(Value::from(vec![1u8, 2]), Value::Blob(vec![1, 2]));
        assert_eq!(Value::from(true), Value::Bool(true));
    }
}
