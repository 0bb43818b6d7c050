//! Core types for InfluxDB Flux query results.

use std::collections::BTreeMap;
use std::str::FromStr;

use crate::error::Error;
use crate::value::Value;

/// Data types supported in InfluxDB annotated CSV.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DataType {
    /// String data type.
    String,
    /// 64-bit floating point.
    Double,
    /// Boolean value.
    Bool,
    /// Signed 64-bit integer.
    Long,
    /// Unsigned 64-bit integer.
    UnsignedLong,
    /// Duration in nanoseconds or Go-style notation (e.g. "1h30m").
    Duration,
    /// Base64-encoded binary data.
    Base64Binary,
    /// RFC3339 timestamp (with optional nanosecond precision).
    Time,
}

impl FromStr for DataType {
    type Err = Error;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input {
            "string" => Ok(Self::String),
            "double" => Ok(Self::Double),
            "boolean" => Ok(Self::Bool),
            "long" => Ok(Self::Long),
            "unsignedLong" => Ok(Self::UnsignedLong),
            "duration" => Ok(Self::Duration),
            "base64Binary" => Ok(Self::Base64Binary),
            "dateTime:RFC3339" | "dateTime:RFC3339Nano" => Ok(Self::Time),
            _ => Err(Error::UnknownDataType(input.to_string())),
        }
    }
}

impl std::fmt::Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            DataType::String => "string",
            DataType::Double => "double",
            DataType::Bool => "boolean",
            DataType::Long => "long",
            DataType::UnsignedLong => "unsignedLong",
            DataType::Duration => "duration",
            DataType::Base64Binary => "base64Binary",
            DataType::Time => "dateTime:RFC3339",
        };
        write!(f, "{}", s)
    }
}

/// Metadata for a column in a Flux table.
#[derive(Clone, Debug)]
pub struct FluxColumn {
    /// Column label from the header row.
    pub label: String,
    /// Data type from the `#datatype` annotation.
    pub data_type: DataType,
    /// Whether this column is part of the group key (`#group` annotation).
    pub group: bool,
    /// Default value substituted for empty cells (`#default` annotation).
    pub default_value: String,
}

impl FluxColumn {
    /// Create a new FluxColumn with default values.
    pub fn new() -> Self {
        Self {
            label: String::new(),
            data_type: DataType::String,
            group: false,
            default_value: String::new(),
        }
    }
}

impl Default for FluxColumn {
    fn default() -> Self {
        Self::new()
    }
}

/// Metadata for one logical table in a query result stream.
#[derive(Clone, Debug)]
pub struct FluxTableMetadata {
    /// Table position/index in the query results.
    pub position: i32,
    /// Column definitions for this table.
    pub columns: Vec<FluxColumn>,
}

impl FluxTableMetadata {
    /// Create a new FluxTableMetadata with the given position and column count.
    pub fn new(position: i32, column_count: usize) -> Self {
        let columns = (0..column_count).map(|_| FluxColumn::new()).collect();
        Self { position, columns }
    }

    /// Get a column by label.
    pub fn column(&self, label: &str) -> Option<&FluxColumn> {
        self.columns.iter().find(|c| c.label == label)
    }
}

/// A single record (row) from a Flux query result.
#[derive(Clone, Debug)]
pub struct FluxRecord {
    /// Index of the logical table this record belongs to.
    pub table: i32,
    /// Column label to value mapping.
    pub values: BTreeMap<String, Value>,
}

impl FluxRecord {
    /// Create a new empty FluxRecord.
    pub fn new(table: i32) -> Self {
        Self {
            table,
            values: BTreeMap::new(),
        }
    }

    /// Get a value by column label.
    pub fn get(&self, label: &str) -> Option<&Value> {
        self.values.get(label)
    }

    /// Get a value as an owned string.
    pub fn get_string(&self, label: &str) -> Option<String> {
        self.values
            .get(label)
            .and_then(|v| v.as_str())
            .map(str::to_owned)
    }

    /// Get a value as f64.
    pub fn get_double(&self, label: &str) -> Option<f64> {
        self.values.get(label).and_then(|v| v.as_double())
    }

    /// Get a value as i64.
    pub fn get_long(&self, label: &str) -> Option<i64> {
        self.values.get(label).and_then(|v| v.as_long())
    }

    /// Get a value as bool.
    pub fn get_bool(&self, label: &str) -> Option<bool> {
        self.values.get(label).and_then(|v| v.as_bool())
    }

    /// Timestamp of the record (the `_time` column).
    pub fn time(&self) -> Option<&chrono::DateTime<chrono::FixedOffset>> {
        self.values.get("_time").and_then(|v| v.as_time())
    }

    /// Start of the query range (the `_start` column).
    pub fn start(&self) -> Option<&chrono::DateTime<chrono::FixedOffset>> {
        self.values.get("_start").and_then(|v| v.as_time())
    }

    /// Stop of the query range (the `_stop` column).
    pub fn stop(&self) -> Option<&chrono::DateTime<chrono::FixedOffset>> {
        self.values.get("_stop").and_then(|v| v.as_time())
    }

    /// Measurement name of the record (the `_measurement` column).
    pub fn measurement(&self) -> Option<String> {
        self.get_string("_measurement")
    }

    /// Field name of the record (the `_field` column).
    pub fn field(&self) -> Option<String> {
        self.get_string("_field")
    }

    /// Field value of the record (the `_value` column).
    pub fn value(&self) -> Option<&Value> {
        self.values.get("_value")
    }
}

/// A fully materialized logical table: column metadata plus all its records.
///
/// Produced by [`Client::query_tables`](crate::Client::query_tables). A table
/// may hold zero records when the server announces a result structure with no
/// matching rows.
#[derive(Clone, Debug)]
pub struct FluxTable {
    /// Table position/index in the query results.
    pub position: i32,
    /// Column definitions for this table.
    pub columns: Vec<FluxColumn>,
    /// All records belonging to this table.
    pub records: Vec<FluxRecord>,
}

impl FluxTable {
    /// Create an empty table from its metadata.
    pub fn new(metadata: &FluxTableMetadata) -> Self {
        Self {
            position: metadata.position,
            columns: metadata.columns.clone(),
            records: Vec::new(),
        }
    }

    /// Columns that form the group key, in column order.
    pub fn group_key(&self) -> Vec<&FluxColumn> {
        self.columns.iter().filter(|c| c.group).collect()
    }

    /// Get a column by label.
    pub fn column(&self, label: &str) -> Option<&FluxColumn> {
        self.columns.iter().find(|c| c.label == label)
    }
}

impl<'a> IntoIterator for &'a FluxTable {
    type Item = &'a FluxRecord;
    type IntoIter = std::slice::Iter<'a, FluxRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_type_from_str() {
        assert_eq!("string".parse::<DataType>().unwrap(), DataType::String);
        assert_eq!("double".parse::<DataType>().unwrap(), DataType::Double);
        assert_eq!("boolean".parse::<DataType>().unwrap(), DataType::Bool);
        assert_eq!("long".parse::<DataType>().unwrap(), DataType::Long);
        assert_eq!(
            "unsignedLong".parse::<DataType>().unwrap(),
            DataType::UnsignedLong
        );
        assert_eq!("duration".parse::<DataType>().unwrap(), DataType::Duration);
        assert_eq!(
            "base64Binary".parse::<DataType>().unwrap(),
            DataType::Base64Binary
        );
        assert_eq!(
            "dateTime:RFC3339".parse::<DataType>().unwrap(),
            DataType::Time
        );
        assert_eq!(
            "dateTime:RFC3339Nano".parse::<DataType>().unwrap(),
            DataType::Time
        );

        let err = "decimal".parse::<DataType>().unwrap_err();
        assert!(matches!(err, Error::UnknownDataType(t) if t == "decimal"));
    }

    #[test]
    fn test_record_reserved_column_accessors() {
        let mut record = FluxRecord::new(0);
        record.values.insert(
            "_time".into(),
            Value::Time(
                chrono::DateTime::parse_from_rfc3339("2023-11-14T10:00:00Z").unwrap(),
            ),
        );
        record.values.insert(
            "_start".into(),
            Value::Time(
                chrono::DateTime::parse_from_rfc3339("2023-11-14T00:00:00Z").unwrap(),
            ),
        );
        record.values.insert(
            "_stop".into(),
            Value::Time(
                chrono::DateTime::parse_from_rfc3339("2023-11-15T00:00:00Z").unwrap(),
            ),
        );
        record
            .values
            .insert("_measurement".into(), Value::String("h2o".into()));
        record
            .values
            .insert("_field".into(), Value::String("level".into()));
        record.values.insert(
            "_value".into(),
            Value::Double(ordered_float::OrderedFloat(4.2)),
        );

        assert_eq!(record.measurement().as_deref(), Some("h2o"));
        assert_eq!(record.field().as_deref(), Some("level"));
        assert_eq!(record.value().and_then(Value::as_double), Some(4.2));
        assert!(record.time().is_some());
        assert!(record.start().unwrap() < record.stop().unwrap());
    }

    #[test]
    fn test_table_group_key() {
        let mut metadata = FluxTableMetadata::new(0, 4);
        for (i, (label, group)) in [
            ("result", false),
            ("_measurement", true),
            ("location", true),
            ("_value", false),
        ]
        .iter()
        .enumerate()
        {
            metadata.columns[i].label = label.to_string();
            metadata.columns[i].group = *group;
        }

        let table = FluxTable::new(&metadata);
        let key: Vec<&str> = table.group_key().iter().map(|c| c.label.as_str()).collect();
        assert_eq!(key, vec!["_measurement", "location"]);
        assert!(table.records.is_empty());
        assert!(table.column("location").is_some());
        assert!(table.column("missing").is_none());
    }
}
