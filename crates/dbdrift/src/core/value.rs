//! Row value variant shared by both adapters.
//!
//! Driver-native values are decoded into [`SqlValue`] at the adapter boundary
//! and carried through the data diff without coercion. The [`std::fmt::Display`]
//! impl defines the deterministic string form used by the primary-key
//! comparator and by literal rendering, so it must stay stable across
//! platforms.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use uuid::Uuid;

/// A scanned row keyed by column name.
pub type Record = HashMap<String, SqlValue>;

/// Owned, dialect-neutral value for one table cell.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    /// SQL NULL. Stringifies as `NULL`, which keeps NULL distinct from the
    /// empty string under the comparison rules.
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Decimal(Decimal),
    Text(String),
    Bytes(Vec<u8>),
    Uuid(Uuid),
    Date(NaiveDate),
    Time(NaiveTime),
    DateTime(NaiveDateTime),
    DateTimeOffset(DateTime<FixedOffset>),
}

impl SqlValue {
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }
}

impl fmt::Display for SqlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlValue::Null => write!(f, "NULL"),
            SqlValue::Bool(v) => write!(f, "{}", v),
            SqlValue::Int(v) => write!(f, "{}", v),
            SqlValue::Float(v) => write!(f, "{}", v),
            SqlValue::Decimal(v) => write!(f, "{}", v),
            SqlValue::Text(v) => write!(f, "{}", v),
            SqlValue::Bytes(v) => write!(f, "{}", String::from_utf8_lossy(v)),
            SqlValue::Uuid(v) => write!(f, "{}", v),
            SqlValue::Date(v) => write!(f, "{}", v),
            SqlValue::Time(v) => write!(f, "{}", v),
            SqlValue::DateTime(v) => write!(f, "{}", v),
            SqlValue::DateTimeOffset(v) => write!(f, "{}", v),
        }
    }
}

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        SqlValue::Bool(v)
    }
}

impl From<i32> for SqlValue {
    fn from(v: i32) -> Self {
        SqlValue::Int(v as i64)
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::Int(v)
    }
}

impl From<f64> for SqlValue {
    fn from(v: f64) -> Self {
        SqlValue::Float(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::Text(v.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::Text(v)
    }
}

impl From<Vec<u8>> for SqlValue {
    fn from(v: Vec<u8>) -> Self {
        SqlValue::Bytes(v)
    }
}

impl From<Uuid> for SqlValue {
    fn from(v: Uuid) -> Self {
        SqlValue::Uuid(v)
    }
}

impl From<Decimal> for SqlValue {
    fn from(v: Decimal) -> Self {
        SqlValue::Decimal(v)
    }
}

impl From<NaiveDate> for SqlValue {
    fn from(v: NaiveDate) -> Self {
        SqlValue::Date(v)
    }
}

impl From<NaiveTime> for SqlValue {
    fn from(v: NaiveTime) -> Self {
        SqlValue::Time(v)
    }
}

impl From<NaiveDateTime> for SqlValue {
    fn from(v: NaiveDateTime) -> Self {
        SqlValue::DateTime(v)
    }
}

impl From<DateTime<FixedOffset>> for SqlValue {
    fn from(v: DateTime<FixedOffset>) -> Self {
        SqlValue::DateTimeOffset(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_distinct_from_empty_string() {
        assert_ne!(SqlValue::Null.to_string(), SqlValue::Text(String::new()).to_string());
    }

    #[test]
    fn test_display_forms() {
        assert_eq!(SqlValue::Int(42).to_string(), "42");
        assert_eq!(SqlValue::Float(1.5).to_string(), "1.5");
        assert_eq!(SqlValue::Bool(true).to_string(), "true");
        assert_eq!(SqlValue::Text("a".into()).to_string(), "a");
        assert_eq!(SqlValue::Null.to_string(), "NULL");
    }

    #[test]
    fn test_float_display_drops_trailing_zero() {
        assert_eq!(SqlValue::Float(1.0).to_string(), "1");
        assert_ne!(SqlValue::Float(1.25).to_string(), SqlValue::Int(1).to_string());
    }

    #[test]
    fn test_date_display() {
        let d = NaiveDate::from_ymd_opt(2024, 3, 9).unwrap();
        assert_eq!(SqlValue::Date(d).to_string(), "2024-03-09");
    }
}
