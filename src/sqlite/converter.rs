// ABOUTME: Conversion between SQLite cell values and JSON-column values
// ABOUTME: Decides which cells the unwrapper sees and how its results are persisted

use crate::unwrap::StoredValue;
use rusqlite::types::Value;
use serde_json::Number;

/// Storage class a column prefers, derived from its declared type
///
/// The output database replays each table's DDL verbatim, so a value written
/// into a column is converted by SQLite according to this affinity. Values
/// are persisted in the form the column would convert them to anyway, which
/// keeps the stored cell equal to what was written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnAffinity {
    Text,
    Numeric,
    Integer,
    Real,
    Blob,
}

impl ColumnAffinity {
    /// Apply SQLite's affinity rules to a declared column type
    ///
    /// The rules are checked in order: `INT`, then `CHAR`/`CLOB`/`TEXT`,
    /// then `BLOB` or no type, then `REAL`/`FLOA`/`DOUB`, otherwise NUMERIC.
    ///
    /// # Examples
    ///
    /// ```
    /// # use sqlite_json_repair::sqlite::converter::ColumnAffinity;
    /// assert_eq!(ColumnAffinity::from_declared_type("TEXT"), ColumnAffinity::Text);
    /// assert_eq!(ColumnAffinity::from_declared_type("VARCHAR(255)"), ColumnAffinity::Text);
    /// assert_eq!(ColumnAffinity::from_declared_type(""), ColumnAffinity::Blob);
    /// assert_eq!(ColumnAffinity::from_declared_type("JSON"), ColumnAffinity::Numeric);
    /// ```
    pub fn from_declared_type(declared: &str) -> Self {
        let declared = declared.to_ascii_uppercase();
        let contains_any = |needles: &[&str]| needles.iter().any(|n| declared.contains(n));

        if declared.contains("INT") {
            ColumnAffinity::Integer
        } else if contains_any(&["CHAR", "CLOB", "TEXT"]) {
            ColumnAffinity::Text
        } else if declared.contains("BLOB") || declared.trim().is_empty() {
            ColumnAffinity::Blob
        } else if contains_any(&["REAL", "FLOA", "DOUB"]) {
            ColumnAffinity::Real
        } else {
            ColumnAffinity::Numeric
        }
    }
}

/// Convert a SQLite cell from a JSON column into a value the unwrapper accepts
///
/// Maps SQLite types:
/// - TEXT → text
/// - INTEGER → number
/// - REAL → number (finite only)
/// - NULL, BLOB, non-finite REAL → `None`, the unwrapper does not apply
///
/// # Examples
///
/// ```
/// # use sqlite_json_repair::sqlite::converter::sqlite_value_to_stored;
/// # use sqlite_json_repair::unwrap::StoredValue;
/// # use rusqlite::types::Value;
/// let stored = sqlite_value_to_stored(&Value::Integer(42));
/// assert_eq!(stored, Some(StoredValue::Number(42.into())));
/// assert_eq!(sqlite_value_to_stored(&Value::Null), None);
/// ```
pub fn sqlite_value_to_stored(value: &Value) -> Option<StoredValue> {
    match value {
        Value::Text(s) => Some(StoredValue::Text(s.clone())),
        Value::Integer(i) => Some(StoredValue::Number((*i).into())),
        Value::Real(f) => Number::from_f64(*f).map(StoredValue::Number),
        Value::Null | Value::Blob(_) => None,
    }
}

/// Convert a normalized value back into a SQLite cell for a column
///
/// - text and structured text → TEXT
/// - booleans → TEXT `true` / `false`, which decodes back to the boolean
/// - numbers depend on the column's affinity:
///   - TEXT: the JSON text of the number (`42`, `0.75`)
///   - INTEGER, NUMERIC: INTEGER when the value has no fractional part, else REAL
///   - REAL: REAL
///   - no affinity: INTEGER for JSON integers, REAL otherwise
///
/// Numbers reaching this point are within the safe-integer range, so the
/// integer and float conversions are exact.
pub fn stored_to_sqlite_value(value: StoredValue, affinity: ColumnAffinity) -> Value {
    match value {
        StoredValue::Text(s) | StoredValue::Structured(s) => Value::Text(s),
        StoredValue::Boolean(b) => Value::Text(b.to_string()),
        StoredValue::Number(n) => number_to_sqlite_value(&n, affinity),
    }
}

fn number_to_sqlite_value(n: &Number, affinity: ColumnAffinity) -> Value {
    let as_real = || n.as_f64().unwrap_or(f64::NAN);

    match affinity {
        ColumnAffinity::Text => Value::Text(n.to_string()),
        ColumnAffinity::Real => Value::Real(as_real()),
        ColumnAffinity::Integer | ColumnAffinity::Numeric => match n.as_i64() {
            Some(i) => Value::Integer(i),
            None => {
                let f = as_real();
                if f.fract() == 0.0 {
                    Value::Integer(f as i64)
                } else {
                    Value::Real(f)
                }
            }
        },
        ColumnAffinity::Blob => match n.as_i64() {
            Some(i) => Value::Integer(i),
            None => Value::Real(as_real()),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn real(f: f64) -> StoredValue {
        StoredValue::Number(Number::from_f64(f).unwrap())
    }

    #[test]
    fn test_convert_text_and_integer() {
        assert_eq!(
            sqlite_value_to_stored(&Value::Text("\"5\"".to_string())),
            Some(StoredValue::Text("\"5\"".to_string()))
        );
        assert_eq!(
            sqlite_value_to_stored(&Value::Integer(-7)),
            Some(StoredValue::Number((-7).into()))
        );
    }

    #[test]
    fn test_convert_real() {
        assert_eq!(sqlite_value_to_stored(&Value::Real(1.5)), Some(real(1.5)));
        // Handled by the caller's magnitude guard, not by the unwrapper
        assert_eq!(sqlite_value_to_stored(&Value::Real(f64::INFINITY)), None);
    }

    #[test]
    fn test_null_and_blob_are_skipped() {
        assert_eq!(sqlite_value_to_stored(&Value::Null), None);
        assert_eq!(sqlite_value_to_stored(&Value::Blob(vec![1, 2, 3])), None);
    }

    #[test]
    fn test_affinity_from_declared_type() {
        let cases = [
            ("INTEGER", ColumnAffinity::Integer),
            ("bigint", ColumnAffinity::Integer),
            ("TEXT", ColumnAffinity::Text),
            ("NVARCHAR(100)", ColumnAffinity::Text),
            ("clob", ColumnAffinity::Text),
            ("BLOB", ColumnAffinity::Blob),
            ("", ColumnAffinity::Blob),
            ("DOUBLE PRECISION", ColumnAffinity::Real),
            ("FLOAT", ColumnAffinity::Real),
            ("NUMERIC", ColumnAffinity::Numeric),
            ("JSON", ColumnAffinity::Numeric),
            // INT wins over later rules
            ("CHARINT", ColumnAffinity::Integer),
        ];
        for (declared, expected) in cases {
            assert_eq!(
                ColumnAffinity::from_declared_type(declared),
                expected,
                "declared: {:?}",
                declared
            );
        }
    }

    #[test]
    fn test_persist_numbers_in_text_column() {
        assert_eq!(
            stored_to_sqlite_value(StoredValue::Number(5.into()), ColumnAffinity::Text),
            Value::Text("5".to_string())
        );
        assert_eq!(
            stored_to_sqlite_value(real(0.75), ColumnAffinity::Text),
            Value::Text("0.75".to_string())
        );
        assert_eq!(
            stored_to_sqlite_value(StoredValue::Number((-12).into()), ColumnAffinity::Text),
            Value::Text("-12".to_string())
        );
    }

    #[test]
    fn test_persist_numbers_in_numeric_columns() {
        assert_eq!(
            stored_to_sqlite_value(StoredValue::Number(5.into()), ColumnAffinity::Integer),
            Value::Integer(5)
        );
        assert_eq!(
            stored_to_sqlite_value(real(2.0), ColumnAffinity::Numeric),
            Value::Integer(2)
        );
        assert_eq!(
            stored_to_sqlite_value(real(0.25), ColumnAffinity::Numeric),
            Value::Real(0.25)
        );
        assert_eq!(
            stored_to_sqlite_value(StoredValue::Number(3.into()), ColumnAffinity::Real),
            Value::Real(3.0)
        );
        assert_eq!(
            stored_to_sqlite_value(StoredValue::Number(5.into()), ColumnAffinity::Blob),
            Value::Integer(5)
        );
        assert_eq!(
            stored_to_sqlite_value(real(2.0), ColumnAffinity::Blob),
            Value::Real(2.0)
        );
    }

    #[test]
    fn test_persist_text_like_values() {
        for affinity in [ColumnAffinity::Text, ColumnAffinity::Integer, ColumnAffinity::Blob] {
            assert_eq!(
                stored_to_sqlite_value(StoredValue::Structured("{\"a\":1}".to_string()), affinity),
                Value::Text("{\"a\":1}".to_string())
            );
            assert_eq!(
                stored_to_sqlite_value(StoredValue::Text("\"hi\"".to_string()), affinity),
                Value::Text("\"hi\"".to_string())
            );
            assert_eq!(
                stored_to_sqlite_value(StoredValue::Boolean(false), affinity),
                Value::Text("false".to_string())
            );
        }
    }
}
