//! Async parser for InfluxDB annotated CSV format.
//!
//! This module provides a streaming parser for InfluxDB's annotated CSV
//! format, the response format of the `/api/v2/query` endpoint. The parser
//! reads an async byte stream and yields records one at a time, without
//! loading the entire response into memory.
//!
//! Column definitions come from the `#datatype`, `#group` and `#default`
//! annotation rows and persist across rows. A new logical table starts when
//! a fresh annotation block arrives or when the value of the `table` column
//! changes between data rows.

use std::collections::BTreeMap;
use std::str::FromStr;

use base64::Engine;
use chrono::DateTime;
use csv_async::{AsyncReaderBuilder, StringRecord, Trim};
use futures::StreamExt;
use go_parse_duration::parse_duration;
use ordered_float::OrderedFloat;
use tokio::io::AsyncRead;

use crate::error::{Error, Result};
use crate::types::{DataType, FluxRecord, FluxTableMetadata};
use crate::value::Value;

/// One parsed element of the response stream.
#[derive(Clone, Debug)]
pub enum ParseEvent {
    /// A new logical table began; carries its column metadata. Emitted
    /// before any of the table's records, and also for tables that turn
    /// out to have no records at all.
    TableStart(FluxTableMetadata),
    /// A data row belonging to the most recently started table.
    Record(FluxRecord),
}

/// Internal state of the CSV parser.
#[derive(PartialEq)]
enum ParserState {
    /// Reading data rows.
    Records,
    /// Reading `#`-prefixed annotation rows; the next plain row is a header.
    Annotations,
    /// The stream carries an inline error table instead of results.
    ErrorTable,
}

/// Async streaming parser for InfluxDB annotated CSV.
///
/// # Example
///
/// ```ignore
/// use influxdb2_client::parser::AnnotatedCsvParser;
/// use tokio::io::AsyncRead;
///
/// async fn parse<R: AsyncRead + Unpin + Send>(reader: R) {
///     let mut parser = AnnotatedCsvParser::new(reader);
///     while let Some(record) = parser.next().await.transpose() {
///         match record {
///             Ok(rec) => println!("Got record: {:?}", rec),
///             Err(e) => eprintln!("Parse error: {}", e),
///         }
///     }
/// }
/// ```
pub struct AnnotatedCsvParser<R: AsyncRead + Unpin> {
    csv: csv_async::AsyncReader<R>,
    state: ParserState,
    table: Option<FluxTableMetadata>,
    /// Position assigned to the next logical table.
    next_position: i32,
    /// Index of the column labeled `table` within the current schema.
    table_column: Option<usize>,
    /// Value of the `table` column in the current logical table.
    current_table_id: Option<i64>,
    datatypes_seen: bool,
    /// Event held back when one row produces two events.
    pending: Option<ParseEvent>,
    fail_fast: bool,
    done: bool,
}

impl<R: AsyncRead + Unpin + Send> AnnotatedCsvParser<R> {
    /// Create a new parser from an async reader.
    pub fn new(reader: R) -> Self {
        let csv = AsyncReaderBuilder::new()
            .has_headers(false) // We handle headers/annotations ourselves
            .trim(Trim::Fields)
            .flexible(true)
            .create_reader(reader);

        Self {
            csv,
            state: ParserState::Records,
            table: None,
            next_position: 0,
            table_column: None,
            current_table_id: None,
            datatypes_seen: false,
            pending: None,
            fail_fast: false,
            done: false,
        }
    }

    /// Stop at the first cell that fails type conversion.
    ///
    /// By default a bad cell yields one `Err` and parsing resumes with the
    /// next row. In fail-fast mode the first `Err` ends the stream.
    pub fn with_fail_fast(mut self, fail_fast: bool) -> Self {
        self.fail_fast = fail_fast;
        self
    }

    /// Parse and return the next record, skipping table boundaries.
    ///
    /// Returns:
    /// - `Ok(Some(record))` - Successfully parsed a record
    /// - `Ok(None)` - End of stream (EOF)
    /// - `Err(e)` - Parse error
    pub async fn next(&mut self) -> Result<Option<FluxRecord>> {
        loop {
            match self.next_event().await? {
                Some(ParseEvent::Record(record)) => return Ok(Some(record)),
                Some(ParseEvent::TableStart(_)) => continue,
                None => return Ok(None),
            }
        }
    }

    /// Parse and return the next event: a table boundary or a record.
    pub async fn next_event(&mut self) -> Result<Option<ParseEvent>> {
        if let Some(event) = self.pending.take() {
            return Ok(Some(event));
        }
        if self.done {
            return Ok(None);
        }
        match self.advance().await {
            Ok(event) => Ok(event),
            Err(err) => {
                // Conversion errors are recoverable unless fail-fast is on;
                // structural errors always end the stream.
                if self.fail_fast || !matches!(err, Error::Parse { .. }) {
                    self.done = true;
                }
                Err(err)
            }
        }
    }

    async fn advance(&mut self) -> Result<Option<ParseEvent>> {
        loop {
            // The stream borrows the reader only for this one read; the
            // reader itself keeps the position between calls.
            let row = match self.csv.records().next().await {
                Some(Ok(r)) => r,
                Some(Err(e)) => return Err(csv_error(e)),
                None => return Ok(None), // EOF
            };

            // Stray single-cell rows before the first annotation block are
            // noise; once a table is defined they are truncated data rows
            // and fail the column count check below.
            if row.len() <= 1 && self.table.is_none() {
                continue;
            }

            let line = row_line(&row);

            // A '#'-prefixed row after data rows opens a new annotation block.
            if let Some(first) = row.get(0) {
                if first.starts_with('#') && self.state == ParserState::Records {
                    self.table = Some(FluxTableMetadata::new(self.next_position, row.len() - 1));
                    self.next_position += 1;
                    self.table_column = None;
                    self.current_table_id = None;
                    self.datatypes_seen = false;
                    self.state = ParserState::Annotations;
                }
            }

            let Some(table) = &mut self.table else {
                return Err(Error::MissingAnnotation(format!(
                    "no annotations found before data (line {})",
                    line
                )));
            };

            if row.len() - 1 != table.columns.len() {
                return Err(Error::ColumnMismatch {
                    expected: table.columns.len(),
                    actual: row.len() - 1,
                    line,
                });
            }

            match row.get(0).unwrap_or_default() {
                // Header or data row (first cell is empty).
                "" => match self.state {
                    ParserState::Annotations => {
                        if !self.datatypes_seen {
                            return Err(Error::MissingAnnotation(format!(
                                "#datatype annotation not found (line {})",
                                line
                            )));
                        }
                        if row.get(1).unwrap_or_default() == "error" {
                            self.state = ParserState::ErrorTable;
                            continue;
                        }
                        for i in 1..row.len() {
                            table.columns[i - 1].label =
                                row.get(i).unwrap_or_default().to_string();
                        }
                        self.table_column = table
                            .columns
                            .iter()
                            .position(|c| c.label == "table");
                        self.state = ParserState::Records;
                        return Ok(Some(ParseEvent::TableStart(table.clone())));
                    }
                    ParserState::ErrorTable => {
                        let message = match row.get(1) {
                            Some(m) if !m.is_empty() => m.to_string(),
                            _ => "unknown query error".to_string(),
                        };
                        let reference = row
                            .get(2)
                            .filter(|r| !r.is_empty())
                            .map(str::to_owned);
                        return Err(Error::Query { message, reference });
                    }
                    ParserState::Records => return self.read_record(&row, line),
                },
                // Annotation rows.
                "#datatype" => {
                    self.datatypes_seen = true;
                    for i in 1..row.len() {
                        let dt = DataType::from_str(row.get(i).unwrap_or_default())?;
                        table.columns[i - 1].data_type = dt;
                    }
                }
                "#group" => {
                    for i in 1..row.len() {
                        table.columns[i - 1].group = row.get(i).unwrap_or_default() == "true";
                    }
                }
                "#default" => {
                    for i in 1..row.len() {
                        table.columns[i - 1].default_value =
                            row.get(i).unwrap_or_default().to_string();
                    }
                }
                other => {
                    return Err(Error::Parse {
                        message: format!("unexpected annotation '{}'", other),
                        line,
                    });
                }
            }
        }
    }

    /// Converts a data row into a record, splitting the logical table when
    /// the `table` column value changes.
    fn read_record(&mut self, row: &StringRecord, line: u64) -> Result<Option<ParseEvent>> {
        let Some(table) = &mut self.table else {
            return Err(Error::MissingAnnotation(format!(
                "no annotations found before data (line {})",
                line
            )));
        };

        let mut started_new_table = false;
        if let Some(idx) = self.table_column {
            if let Ok(id) = row.get(idx + 1).unwrap_or_default().parse::<i64>() {
                if self.current_table_id.is_some_and(|prev| prev != id) {
                    table.position = self.next_position;
                    self.next_position += 1;
                    started_new_table = true;
                }
                self.current_table_id = Some(id);
            }
        }

        let mut values = BTreeMap::new();
        for i in 1..row.len() {
            let column = &table.columns[i - 1];
            let mut cell = row.get(i).unwrap_or_default();
            if cell.is_empty() {
                cell = &column.default_value;
            }
            let value = convert_cell(cell, column.data_type, &column.label, line)?;
            values.insert(column.label.clone(), value);
        }
        let record = FluxRecord {
            table: table.position,
            values,
        };

        if started_new_table {
            self.pending = Some(ParseEvent::Record(record));
            Ok(Some(ParseEvent::TableStart(table.clone())))
        } else {
            Ok(Some(ParseEvent::Record(record)))
        }
    }
}

fn row_line(row: &StringRecord) -> u64 {
    row.position().map(|p| p.line()).unwrap_or(0)
}

/// Keeps transport interruptions distinguishable from malformed CSV.
fn csv_error(err: csv_async::Error) -> Error {
    match err.into_kind() {
        csv_async::ErrorKind::Io(io) => Error::Io(io),
        kind => Error::Csv(format!("CSV read error: {:?}", kind)),
    }
}

/// Converts one cell to a typed value.
///
/// Empty cells (after default substitution) decode to null for every data
/// type, matching the server's encoding of absent values.
fn convert_cell(s: &str, data_type: DataType, label: &str, line: u64) -> Result<Value> {
    if s.is_empty() {
        return Ok(Value::Null);
    }

    match data_type {
        DataType::String => Ok(Value::String(s.to_string())),
        DataType::Double => {
            let v = s.parse::<f64>().map_err(|e| Error::Parse {
                message: format!("invalid double '{}' in column '{}': {}", s, label, e),
                line,
            })?;
            Ok(Value::Double(OrderedFloat::from(v)))
        }
        DataType::Bool => Ok(Value::Bool(s == "true")),
        DataType::Long => {
            let v = s.parse::<i64>().map_err(|e| Error::Parse {
                message: format!("invalid long '{}' in column '{}': {}", s, label, e),
                line,
            })?;
            Ok(Value::Long(v))
        }
        DataType::UnsignedLong => {
            let v = s.parse::<u64>().map_err(|e| Error::Parse {
                message: format!("invalid unsignedLong '{}' in column '{}': {}", s, label, e),
                line,
            })?;
            Ok(Value::UnsignedLong(v))
        }
        DataType::Duration => {
            // The server writes integer nanoseconds; Go-style notation
            // ("1h30m") also appears in user-shaped columns.
            let nanos = match s.parse::<i64>() {
                Ok(n) => n,
                Err(_) => parse_duration(s).map_err(|_| Error::Parse {
                    message: format!("invalid duration '{}' in column '{}'", s, label),
                    line,
                })?,
            };
            Ok(Value::Duration(chrono::Duration::nanoseconds(nanos)))
        }
        DataType::Base64Binary => {
            let bytes = base64::engine::general_purpose::STANDARD
                .decode(s)
                .map_err(|e| Error::Parse {
                    message: format!("invalid base64 '{}' in column '{}': {}", s, label, e),
                    line,
                })?;
            Ok(Value::Base64Binary(bytes))
        }
        DataType::Time => {
            let t = DateTime::parse_from_rfc3339(s).map_err(|e| Error::Parse {
                message: format!("invalid RFC3339 timestamp '{}' in column '{}': {}", s, label, e),
                line,
            })?;
            Ok(Value::Time(t))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
#datatype,string,long,dateTime:RFC3339,dateTime:RFC3339,dateTime:RFC3339,double,string,string,string
#group,false,false,true,true,false,false,true,true,true
#default,_result,,,,,,,,
,result,table,_start,_stop,_time,_value,_field,_measurement,location
,,0,2023-11-14T00:00:00Z,2023-11-15T00:00:00Z,2023-11-14T10:00:00Z,4.2,level,h2o,creek
,,0,2023-11-14T00:00:00Z,2023-11-15T00:00:00Z,2023-11-14T11:00:00Z,4.9,level,h2o,creek
,,1,2023-11-14T00:00:00Z,2023-11-15T00:00:00Z,2023-11-14T10:00:00Z,5.1,level,h2o,river
";

    async fn collect_records(csv: &str) -> Vec<FluxRecord> {
        let mut parser = AnnotatedCsvParser::new(csv.as_bytes());
        let mut records = Vec::new();
        while let Some(record) = parser.next().await.unwrap() {
            records.push(record);
        }
        records
    }

    #[tokio::test]
    async fn test_parse_simple_result() {
        let records = collect_records(SAMPLE).await;
        assert_eq!(records.len(), 3);

        let first = &records[0];
        assert_eq!(first.measurement().as_deref(), Some("h2o"));
        assert_eq!(first.field().as_deref(), Some("level"));
        assert_eq!(first.value().and_then(Value::as_double), Some(4.2));
        assert_eq!(first.get_string("location").as_deref(), Some("creek"));
        assert!(first.time().is_some());
        assert!(first.start().is_some());
        assert!(first.stop().is_some());

        // Empty result cells fall back to the #default annotation.
        assert_eq!(first.get_string("result").as_deref(), Some("_result"));
    }

    #[tokio::test]
    async fn test_table_column_change_splits_logical_tables() {
        let records = collect_records(SAMPLE).await;
        let positions: Vec<i32> = records.iter().map(|r| r.table).collect();
        assert_eq!(positions, vec![0, 0, 1]);
    }

    #[tokio::test]
    async fn test_table_start_events() {
        let mut parser = AnnotatedCsvParser::new(SAMPLE.as_bytes());
        let mut kinds = Vec::new();
        while let Some(event) = parser.next_event().await.unwrap() {
            kinds.push(match event {
                ParseEvent::TableStart(meta) => format!("table{}", meta.position),
                ParseEvent::Record(rec) => format!("record{}", rec.table),
            });
        }
        assert_eq!(
            kinds,
            vec!["table0", "record0", "record0", "table1", "record1"]
        );
    }

    #[tokio::test]
    async fn test_header_only_table_has_no_records() {
        let csv = "\
#datatype,string,long
#group,false,false
#default,,
,result,table
";
        let mut parser = AnnotatedCsvParser::new(csv.as_bytes());
        let event = parser.next_event().await.unwrap();
        let Some(ParseEvent::TableStart(meta)) = event else {
            panic!("expected a table boundary");
        };
        assert_eq!(meta.position, 0);
        assert_eq!(meta.columns.len(), 2);
        assert_eq!(meta.columns[0].label, "result");
        assert_eq!(meta.columns[0].data_type, DataType::String);
        assert_eq!(meta.columns[1].label, "table");
        assert_eq!(meta.columns[1].data_type, DataType::Long);
        assert!(parser.next_event().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_single_data_row() {
        let csv = "\
#datatype,string,long
#group,false,false
#default,,
,result,table
,_result,0
";
        let records = collect_records(csv).await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].table, 0);
        assert_eq!(records[0].get_string("result").as_deref(), Some("_result"));
        assert_eq!(records[0].get_long("table"), Some(0));
    }

    #[tokio::test]
    async fn test_error_table_surfaces_query_error() {
        let csv = "\
#datatype,string,string
,error,reference
,failed to parse query: unexpected token,897
";
        let mut parser = AnnotatedCsvParser::new(csv.as_bytes());
        let err = parser.next().await.unwrap_err();
        match err {
            Error::Query { message, reference } => {
                assert_eq!(message, "failed to parse query: unexpected token");
                assert_eq!(reference.as_deref(), Some("897"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        // The stream is poisoned afterwards.
        assert!(parser.next().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_missing_datatype_annotation() {
        let csv = "\
#group,false,false
,result,table
,_result,0
";
        let mut parser = AnnotatedCsvParser::new(csv.as_bytes());
        let err = parser.next().await.unwrap_err();
        assert!(matches!(err, Error::MissingAnnotation(_)));
        assert!(parser.next().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_data_before_annotations() {
        let csv = ",result,table\n,_result,0\n";
        let mut parser = AnnotatedCsvParser::new(csv.as_bytes());
        let err = parser.next().await.unwrap_err();
        assert!(matches!(err, Error::MissingAnnotation(_)));
    }

    #[tokio::test]
    async fn test_column_count_mismatch_reports_line() {
        let csv = "\
#datatype,string,long,double
#group,false,false,false
#default,,,
,result,table,_value
,_result,0
";
        let mut parser = AnnotatedCsvParser::new(csv.as_bytes());
        let err = parser.next().await.unwrap_err();
        match err {
            Error::ColumnMismatch {
                expected,
                actual,
                line,
            } => {
                assert_eq!(expected, 3);
                assert_eq!(actual, 2);
                assert_eq!(line, 5);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(parser.next().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_truncated_row_reports_column_mismatch() {
        let csv = "\
#datatype,string,long
#group,false,false
#default,,
,result,table
,_result,0
_result
";
        let mut parser = AnnotatedCsvParser::new(csv.as_bytes());
        assert!(parser.next().await.unwrap().is_some());
        let err = parser.next().await.unwrap_err();
        match err {
            Error::ColumnMismatch {
                expected,
                actual,
                line,
            } => {
                assert_eq!(expected, 2);
                assert_eq!(actual, 0);
                assert_eq!(line, 6);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(parser.next().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_lenient_mode_resumes_after_bad_cell() {
        let csv = "\
#datatype,string,long,double
#group,false,false,false
#default,,,
,result,table,_value
,_result,0,not-a-number
,_result,0,4.2
";
        let mut parser = AnnotatedCsvParser::new(csv.as_bytes());
        let err = parser.next().await.unwrap_err();
        assert!(matches!(err, Error::Parse { line: 5, .. }));
        let record = parser.next().await.unwrap();
        assert_eq!(
            record.and_then(|r| r.get_double("_value")),
            Some(4.2)
        );
        assert!(parser.next().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_fail_fast_stops_at_first_bad_cell() {
        let csv = "\
#datatype,string,long,double
#group,false,false,false
#default,,,
,result,table,_value
,_result,0,not-a-number
,_result,0,4.2
";
        let mut parser = AnnotatedCsvParser::new(csv.as_bytes()).with_fail_fast(true);
        let err = parser.next().await.unwrap_err();
        assert!(matches!(err, Error::Parse { .. }));
        assert!(parser.next().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_datatype_coercions() {
        let csv = "\
#datatype,string,long,boolean,unsignedLong,duration,base64Binary,dateTime:RFC3339Nano
#group,false,false,false,false,false,false,false
#default,,,,,,,
,result,table,up,count,elapsed,blob,when
,_result,0,true,18446744073709551615,1500000000,aGVsbG8=,2023-11-14T10:00:00.123456789Z
,_result,0,false,0,1m30s,,
";
        let records = collect_records(csv).await;
        assert_eq!(records.len(), 2);

        let first = &records[0];
        assert_eq!(first.get_bool("up"), Some(true));
        assert_eq!(
            first.get("count").and_then(Value::as_unsigned_long),
            Some(u64::MAX)
        );
        assert_eq!(
            first
                .get("elapsed")
                .and_then(Value::as_duration)
                .and_then(|d| d.num_nanoseconds()),
            Some(1_500_000_000)
        );
        assert_eq!(
            first.get("blob").and_then(Value::as_binary),
            Some(&b"hello"[..])
        );
        let when = first.get("when").and_then(Value::as_time).unwrap();
        assert_eq!(when.timestamp_subsec_nanos(), 123_456_789);

        let second = &records[1];
        assert_eq!(second.get_bool("up"), Some(false));
        assert_eq!(
            second
                .get("elapsed")
                .and_then(Value::as_duration)
                .map(|d| d.num_seconds()),
            Some(90)
        );
        assert!(second.get("blob").is_some_and(Value::is_null));
        assert!(second.get("when").is_some_and(Value::is_null));
    }

    #[tokio::test]
    async fn test_new_annotation_block_resets_schema() {
        let csv = "\
#datatype,string,long,double
#group,false,false,false
#default,,,
,result,table,_value
,_result,0,1.5

#datatype,string,long,string
#group,false,false,false
#default,,,
,result,table,name
,_result,0,alpha
";
        let records = collect_records(csv).await;
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].table, 0);
        assert_eq!(records[0].get_double("_value"), Some(1.5));
        assert_eq!(records[1].table, 1);
        assert_eq!(records[1].get_string("name").as_deref(), Some("alpha"));
    }

    #[tokio::test]
    async fn test_transport_interruption_is_io_error() {
        use std::io;
        use std::pin::Pin;
        use std::task::{Context, Poll};

        /// Yields some valid rows, then fails like a dropped connection.
        struct FailingReader {
            data: &'static [u8],
            pos: usize,
        }

        impl AsyncRead for FailingReader {
            fn poll_read(
                mut self: Pin<&mut Self>,
                _cx: &mut Context<'_>,
                buf: &mut tokio::io::ReadBuf<'_>,
            ) -> Poll<io::Result<()>> {
                if self.pos < self.data.len() {
                    let n = buf.remaining().min(self.data.len() - self.pos);
                    buf.put_slice(&self.data[self.pos..self.pos + n]);
                    self.pos += n;
                    Poll::Ready(Ok(()))
                } else {
                    Poll::Ready(Err(io::Error::new(
                        io::ErrorKind::ConnectionReset,
                        "connection reset by peer",
                    )))
                }
            }
        }

        let reader = FailingReader {
            data: b"#datatype,string,long\n#group,false,false\n#default,,\n,result,table\n,_result,0\n",
            pos: 0,
        };
        let mut parser = AnnotatedCsvParser::new(reader);
        assert!(parser.next().await.unwrap().is_some());
        let err = parser.next().await.unwrap_err();
        assert!(matches!(err, Error::Io(_)), "expected Io, got {err:?}");
    }

    #[test]
    fn test_convert_cell_basics() {
        assert_eq!(
            convert_cell("hello", DataType::String, "c", 1).unwrap(),
            Value::String("hello".to_string())
        );
        assert_eq!(
            convert_cell("3.14", DataType::Double, "c", 1).unwrap(),
            Value::Double(OrderedFloat::from(3.14))
        );
        assert_eq!(
            convert_cell("-42", DataType::Long, "c", 1).unwrap(),
            Value::Long(-42)
        );
        assert_eq!(
            convert_cell("true", DataType::Bool, "c", 1).unwrap(),
            Value::Bool(true)
        );
        assert_eq!(
            convert_cell("yes", DataType::Bool, "c", 1).unwrap(),
            Value::Bool(false)
        );
    }

    #[test]
    fn test_convert_cell_empty_is_null_for_all_types() {
        for data_type in [DataType::String, DataType::Long, DataType::Time] {
            assert_eq!(convert_cell("", data_type, "c", 1).unwrap(), Value::Null);
        }
    }

    #[test]
    fn test_convert_cell_error_carries_line() {
        let err = convert_cell("abc", DataType::Double, "c", 17).unwrap_err();
        assert!(matches!(err, Error::Parse { line: 17, .. }));
    }
}
