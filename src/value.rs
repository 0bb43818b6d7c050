//! Value types for InfluxDB Flux query results.

use chrono::{DateTime, FixedOffset};
use ordered_float::OrderedFloat;

/// A single cell value from a Flux query result.
///
/// Covers every data type that can appear in an InfluxDB annotated CSV
/// response. Empty cells without a column default decode to [`Value::Null`].
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    /// String value.
    String(String),

    /// 64-bit floating point value.
    Double(OrderedFloat<f64>),

    /// Boolean value.
    Bool(bool),

    /// Signed 64-bit integer.
    Long(i64),

    /// Unsigned 64-bit integer.
    UnsignedLong(u64),

    /// Duration with nanosecond resolution.
    Duration(chrono::Duration),

    /// Binary data decoded from base64.
    Base64Binary(Vec<u8>),

    /// RFC3339 timestamp with timezone.
    Time(DateTime<FixedOffset>),

    /// Null value.
    Null,
}

impl Value {
    /// Returns the value as a string slice if it is a `String` variant.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the value as an f64 if it is a `Double` variant.
    pub fn as_double(&self) -> Option<f64> {
        match self {
            Value::Double(f) => Some(f.into_inner()),
            _ => None,
        }
    }

    /// Returns the value as a bool if it is a `Bool` variant.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Returns the value as an i64 if it is a `Long` variant.
    pub fn as_long(&self) -> Option<i64> {
        match self {
            Value::Long(i) => Some(*i),
            _ => None,
        }
    }

    /// Returns the value as a u64 if it is an `UnsignedLong` variant.
    pub fn as_unsigned_long(&self) -> Option<u64> {
        match self {
            Value::UnsignedLong(u) => Some(*u),
            _ => None,
        }
    }

    /// Returns the value as a chrono::Duration if it is a `Duration` variant.
    pub fn as_duration(&self) -> Option<&chrono::Duration> {
        match self {
            Value::Duration(d) => Some(d),
            _ => None,
        }
    }

    /// Returns the value as a byte slice if it is a `Base64Binary` variant.
    pub fn as_binary(&self) -> Option<&[u8]> {
        match self {
            Value::Base64Binary(b) => Some(b),
            _ => None,
        }
    }

    /// Returns the value as a DateTime if it is a `Time` variant.
    pub fn as_time(&self) -> Option<&DateTime<FixedOffset>> {
        match self {
            Value::Time(t) => Some(t),
            _ => None,
        }
    }

    /// Returns true if this value is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::String(s) => write!(f, "{}", s),
            Value::Double(d) => write!(f, "{}", d),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Long(i) => write!(f, "{}", i),
            Value::UnsignedLong(u) => write!(f, "{}", u),
            Value::Duration(d) => write!(f, "{}ns", d.num_nanoseconds().unwrap_or(0)),
            Value::Base64Binary(b) => write!(f, "<binary {} bytes>", b.len()),
            Value::Time(t) => write!(f, "{}", t.to_rfc3339()),
            Value::Null => write!(f, "null"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_as_str() {
        let v = Value::String("hello".to_string());
        assert_eq!(v.as_str(), Some("hello"));

        // Wrong type returns None
        assert_eq!(Value::Long(42).as_str(), None);
        assert_eq!(Value::Null.as_str(), None);
    }

    #[test]
    fn test_as_double() {
        let v = Value::Double(OrderedFloat::from(2.72));
        assert_eq!(v.as_double(), Some(2.72));

        // Wrong type returns None
        assert_eq!(Value::Long(42).as_double(), None);
        assert_eq!(Value::String("2.72".to_string()).as_double(), None);
    }

    #[test]
    fn test_as_bool() {
        assert_eq!(Value::Bool(true).as_bool(), Some(true));
        assert_eq!(Value::Bool(false).as_bool(), Some(false));

        // Wrong type returns None
        assert_eq!(Value::Long(1).as_bool(), None);
        assert_eq!(Value::String("true".to_string()).as_bool(), None);
    }

    #[test]
    fn test_as_long() {
        assert_eq!(Value::Long(42).as_long(), Some(42));
        assert_eq!(Value::Long(-100).as_long(), Some(-100));
        assert_eq!(Value::Long(i64::MAX).as_long(), Some(i64::MAX));

        // Wrong type returns None
        assert_eq!(Value::UnsignedLong(42).as_long(), None);
        assert_eq!(Value::Double(OrderedFloat::from(42.0)).as_long(), None);
    }

    #[test]
    fn test_as_unsigned_long() {
        assert_eq!(Value::UnsignedLong(42).as_unsigned_long(), Some(42));
        assert_eq!(
            Value::UnsignedLong(u64::MAX).as_unsigned_long(),
            Some(u64::MAX)
        );

        // Wrong type returns None
        assert_eq!(Value::Long(42).as_unsigned_long(), None);
    }

    #[test]
    fn test_as_duration() {
        let v = Value::Duration(chrono::Duration::nanoseconds(1_000_000_000));
        assert_eq!(v.as_duration().unwrap().num_seconds(), 1);

        // Wrong type returns None
        assert!(Value::Long(1000).as_duration().is_none());
    }

    #[test]
    fn test_as_binary() {
        let v = Value::Base64Binary(vec![1, 2, 3, 4]);
        assert_eq!(v.as_binary(), Some(&[1u8, 2, 3, 4][..]));

        // Wrong type returns None
        assert!(Value::String("data".to_string()).as_binary().is_none());
    }

    #[test]
    fn test_as_time() {
        let dt = DateTime::parse_from_rfc3339("2023-11-14T12:00:00Z").unwrap();
        let v = Value::Time(dt);
        assert!(v.as_time().is_some());

        // Wrong type returns None
        assert!(Value::String("2023-11-14".to_string()).as_time().is_none());
        assert!(Value::Long(1699963200).as_time().is_none());
    }

    #[test]
    fn test_is_null() {
        assert!(Value::Null.is_null());

        // Non-null values
        assert!(!Value::String(String::new()).is_null());
        assert!(!Value::Long(0).is_null());
        assert!(!Value::Bool(false).is_null());
    }

    #[test]
    fn test_display() {
        assert_eq!(Value::String("hello world".to_string()).to_string(), "hello world");
        assert_eq!(Value::Bool(true).to_string(), "true");
        assert_eq!(Value::Long(-100).to_string(), "-100");
        assert_eq!(
            Value::UnsignedLong(u64::MAX).to_string(),
            "18446744073709551615"
        );
        assert_eq!(
            Value::Duration(chrono::Duration::nanoseconds(1_500_000_000)).to_string(),
            "1500000000ns"
        );
        assert_eq!(Value::Base64Binary(vec![1, 2, 3, 4, 5]).to_string(), "<binary 5 bytes>");
        assert_eq!(Value::Null.to_string(), "null");

        let dt = DateTime::parse_from_rfc3339("2023-11-14T12:30:45Z").unwrap();
        let displayed = Value::Time(dt).to_string();
        assert!(displayed.contains("2023-11-14"));
        assert!(displayed.contains("12:30:45"));
    }

    #[test]
    fn test_value_equality() {
        assert_eq!(Value::String("a".to_string()), Value::String("a".to_string()));
        assert_ne!(Value::String("a".to_string()), Value::String("b".to_string()));
        assert_eq!(Value::Long(42), Value::Long(42));
        assert_eq!(Value::Null, Value::Null);

        // Different types are not equal
        assert_ne!(Value::Long(42), Value::UnsignedLong(42));
        assert_ne!(Value::String("42".to_string()), Value::Long(42));
    }
}
