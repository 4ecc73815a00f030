//! # SQL Value Model
//!
//! Runtime representation for SQL values and rows. The whole engine speaks
//! one closed sum type; every encode/decode/compare site matches on it
//! exhaustively so a new variant cannot slip past the codecs unnoticed.

mod value;

pub use value::{ColumnKey, Row, Value};

/// Identifier of a table or secondary index key space. Every engine keys
/// physical storage by `(SlotId, encoded key)`.
pub type SlotId = u64;

/// Compares two rows under a key specification with SQL ordering semantics:
/// NULL sorts before every non-null value of a type for ascending columns,
/// after them for descending columns.
pub fn compare_rows(key: &[ColumnKey], a: &Row, b: &Row) -> std::cmp::Ordering {
    use std::cmp::Ordering;

    for ck in key {
        let ord = a[ck.column].sql_cmp(&b[ck.column]);
        let ord = if ck.descending { ord.reverse() } else { ord };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cmp::Ordering;

    #[test]
    fn compare_rows_honors_descending() {
        let a = vec![Value::Int(1)];
        let b = vec![Value::Int(2)];
        let asc = vec![ColumnKey::asc(0)];
        let desc = vec![ColumnKey::desc(0)];
        assert_eq!(compare_rows(&asc, &a, &b), Ordering::Less);
        assert_eq!(compare_rows(&desc, &a, &b), Ordering::Greater);
    }

    #[test]
    fn compare_rows_falls_through_equal_columns() {
        let a = vec![Value::Int(7), Value::Text("a".into())];
        let b = vec![Value::Int(7), Value::Text("b".into())];
        let key = vec![ColumnKey::asc(0), ColumnKey::asc(1)];
        assert_eq!(compare_rows(&key, &a, &b), Ordering::Less);
    }
}
