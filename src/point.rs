//! Line protocol points and their text encoding.
//!
//! A [`Point`] is one time-series sample: a measurement name, optional tags,
//! one or more fields, and an optional timestamp. Points serialize to the
//! InfluxDB line protocol, e.g.
//!
//! ```text
//! weather,location=coyote_creek temperature=71.5,valid=true 1699963200000000000
//! ```

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::error::{Error, Result};

/// Timestamp precision for written points.
///
/// Applies to every point in a write request; the server interprets raw
/// integer timestamps in this unit.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum WritePrecision {
    /// Nanoseconds since the Unix epoch (server default).
    #[default]
    Ns,
    /// Microseconds since the Unix epoch.
    Us,
    /// Milliseconds since the Unix epoch.
    Ms,
    /// Seconds since the Unix epoch.
    S,
}

impl WritePrecision {
    /// Wire name used in the `precision` query parameter.
    pub fn as_str(&self) -> &'static str {
        match self {
            WritePrecision::Ns => "ns",
            WritePrecision::Us => "us",
            WritePrecision::Ms => "ms",
            WritePrecision::S => "s",
        }
    }
}

impl std::fmt::Display for WritePrecision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A field value in a point.
///
/// Line protocol distinguishes four field kinds: floats (bare), integers
/// (`i` suffix), booleans, and quoted strings.
#[derive(Clone, Debug, PartialEq)]
pub enum FieldValue {
    /// 64-bit float, encoded without a suffix.
    Float(f64),
    /// 64-bit signed integer, encoded with an `i` suffix.
    Integer(i64),
    /// Boolean, encoded as `true` or `false`.
    Bool(bool),
    /// String, encoded quoted with `"` and `\` escaped.
    String(String),
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        FieldValue::Float(v)
    }
}

impl From<f32> for FieldValue {
    fn from(v: f32) -> Self {
        FieldValue::Float(v as f64)
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        FieldValue::Integer(v)
    }
}

impl From<i32> for FieldValue {
    fn from(v: i32) -> Self {
        FieldValue::Integer(v as i64)
    }
}

impl From<u32> for FieldValue {
    fn from(v: u32) -> Self {
        FieldValue::Integer(v as i64)
    }
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        FieldValue::Bool(v)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::String(v.to_owned())
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        FieldValue::String(v)
    }
}

#[derive(Clone, Debug, PartialEq)]
enum Timestamp {
    /// Raw integer already expressed in the write precision.
    Raw(i64),
    /// Wall-clock time, converted at encode time.
    Time(DateTime<Utc>),
}

/// A single time-series sample, built incrementally.
///
/// Tags are kept sorted by key so the encoded line is deterministic and
/// friendly to server-side caching. Fields keep their insertion order;
/// setting a field twice overwrites the value in place.
///
/// # Examples
///
/// ```no_run
/// use influxdb2_client::{Point, WritePrecision};
///
/// let point = Point::new("weather")
///     .tag("location", "coyote_creek")
///     .field("temperature", 71.5)
///     .field("valid", true)
///     .timestamp(1_699_963_200_000_000_000);
/// let line = point.to_line_protocol(WritePrecision::Ns).unwrap();
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct Point {
    measurement: String,
    tags: BTreeMap<String, String>,
    fields: Vec<(String, FieldValue)>,
    time: Option<Timestamp>,
}

impl Point {
    /// Create a point for the given measurement.
    pub fn new(measurement: impl Into<String>) -> Self {
        Self {
            measurement: measurement.into(),
            tags: BTreeMap::new(),
            fields: Vec::new(),
            time: None,
        }
    }

    /// Add or replace a tag.
    ///
    /// Tags with an empty key or empty value are dropped at encode time.
    pub fn tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    /// Add or replace a field.
    pub fn field(mut self, key: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        let key = key.into();
        let value = value.into();
        if let Some(slot) = self.fields.iter_mut().find(|(k, _)| *k == key) {
            slot.1 = value;
        } else {
            self.fields.push((key, value));
        }
        self
    }

    /// Set the timestamp from a wall-clock time.
    ///
    /// Converted to the write precision at encode time.
    pub fn time(mut self, time: DateTime<Utc>) -> Self {
        self.time = Some(Timestamp::Time(time));
        self
    }

    /// Set the timestamp from a raw integer already in the write precision.
    pub fn timestamp(mut self, timestamp: i64) -> Self {
        self.time = Some(Timestamp::Raw(timestamp));
        self
    }

    /// Encode this point as one line of line protocol, without a trailing
    /// newline.
    ///
    /// Fails with [`Error::Validation`] when the measurement is empty, a
    /// field key is empty, no encodable field remains (non-finite floats
    /// are silently dropped), or the timestamp cannot be represented.
    pub fn to_line_protocol(&self, precision: WritePrecision) -> Result<String> {
        if self.measurement.is_empty() {
            return Err(Error::Validation("point is missing a measurement".into()));
        }

        let mut fields = String::new();
        for (key, value) in &self.fields {
            if key.is_empty() {
                return Err(Error::Validation(format!(
                    "point '{}' has a field with an empty key",
                    self.measurement
                )));
            }
            if let FieldValue::Float(v) = value {
                if !v.is_finite() {
                    continue;
                }
            }
            if !fields.is_empty() {
                fields.push(',');
            }
            escape_key_into(&mut fields, key);
            fields.push('=');
            match value {
                FieldValue::Float(v) => fields.push_str(&v.to_string()),
                FieldValue::Integer(v) => {
                    fields.push_str(&v.to_string());
                    fields.push('i');
                }
                FieldValue::Bool(b) => fields.push_str(if *b { "true" } else { "false" }),
                FieldValue::String(s) => {
                    fields.push('"');
                    escape_string_into(&mut fields, s);
                    fields.push('"');
                }
            }
        }
        if fields.is_empty() {
            return Err(Error::Validation(format!(
                "point '{}' has no encodable fields",
                self.measurement
            )));
        }

        let mut line = String::with_capacity(self.measurement.len() + fields.len() + 32);
        escape_measurement_into(&mut line, &self.measurement);
        for (key, value) in &self.tags {
            if key.is_empty() || value.is_empty() {
                continue;
            }
            line.push(',');
            escape_key_into(&mut line, key);
            line.push('=');
            escape_tag_value_into(&mut line, value);
        }
        line.push(' ');
        line.push_str(&fields);

        if let Some(time) = &self.time {
            line.push(' ');
            let ts = match time {
                Timestamp::Raw(ts) => *ts,
                Timestamp::Time(dt) => convert_timestamp(dt, precision)?,
            };
            line.push_str(&ts.to_string());
        }

        Ok(line)
    }
}

fn convert_timestamp(dt: &DateTime<Utc>, precision: WritePrecision) -> Result<i64> {
    let nanos = dt.timestamp_nanos_opt().ok_or_else(|| {
        Error::Validation(format!("timestamp {} is out of representable range", dt))
    })?;
    Ok(match precision {
        WritePrecision::Ns => nanos,
        WritePrecision::Us => nanos / 1_000,
        WritePrecision::Ms => nanos / 1_000_000,
        WritePrecision::S => nanos / 1_000_000_000,
    })
}

/// Escapes measurement names: comma, space and embedded line breaks.
fn escape_measurement_into(out: &mut String, s: &str) {
    for c in s.chars() {
        match c {
            ',' | ' ' => {
                out.push('\\');
                out.push(c);
            }
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            _ => out.push(c),
        }
    }
}

/// Escapes tag keys, tag values and field keys: comma, equals, space and
/// embedded line breaks.
fn escape_key_into(out: &mut String, s: &str) {
    for c in s.chars() {
        match c {
            ',' | '=' | ' ' => {
                out.push('\\');
                out.push(c);
            }
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            _ => out.push(c),
        }
    }
}

/// Escapes a tag value like a key, then neutralizes a trailing backslash.
///
/// A value ending in a bare backslash would escape the following separator
/// space; appending a space turns the tail into an escaped space, which the
/// server parses unambiguously.
fn escape_tag_value_into(out: &mut String, s: &str) {
    escape_key_into(out, s);
    if out.ends_with('\\') {
        out.push(' ');
    }
}

/// Escapes string field values: double quote and backslash.
fn escape_string_into(out: &mut String, s: &str) {
    for c in s.chars() {
        match c {
            '"' | '\\' => {
                out.push('\\');
                out.push(c);
            }
            _ => out.push(c),
        }
    }
}
