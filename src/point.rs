//! Time-series points and their InfluxDB line-protocol form.
//!
//! ```text
//! measurement,tag1=val1,tag2=val2 field1=val1,field2=val2 timestamp
//! ```

use crate::record::FieldValue;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Reasons a set of measurement, tags and fields cannot form a point.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum PointError {
    #[error("point has an empty measurement name")]
    EmptyMeasurement,

    #[error("point for measurement {0:?} has no fields")]
    NoFields(String),

    #[error("point has an empty tag key")]
    EmptyTagKey,

    #[error("point has an empty field key")]
    EmptyFieldKey,

    #[error("field {0:?} is not a finite number")]
    NonFiniteField(String),

    #[error("timestamp {0} cannot be expressed in nanoseconds since the epoch")]
    TimestampOutOfRange(DateTime<Utc>),
}

/// One record destined for the store.
#[derive(Debug, Clone, PartialEq)]
pub struct Point {
    measurement: String,
    tags: BTreeMap<String, String>,
    fields: BTreeMap<String, FieldValue>,
    time: DateTime<Utc>,
}

impl Point {
    /// Validate and build a point.
    pub fn new(
        measurement: impl Into<String>,
        tags: BTreeMap<String, String>,
        fields: BTreeMap<String, FieldValue>,
        time: DateTime<Utc>,
    ) -> Result<Self, PointError> {
        let measurement = measurement.into();
        if measurement.is_empty() {
            return Err(PointError::EmptyMeasurement);
        }
        if fields.is_empty() {
            return Err(PointError::NoFields(measurement));
        }
        if tags.keys().any(|k| k.is_empty()) {
            return Err(PointError::EmptyTagKey);
        }
        for (key, value) in &fields {
            if key.is_empty() {
                return Err(PointError::EmptyFieldKey);
            }
            if let FieldValue::Float(v) = value {
                if !v.is_finite() {
                    return Err(PointError::NonFiniteField(key.clone()));
                }
            }
        }
        if time.timestamp_nanos_opt().is_none() {
            return Err(PointError::TimestampOutOfRange(time));
        }

        Ok(Point {
            measurement,
            tags,
            fields,
            time,
        })
    }

    pub fn measurement(&self) -> &str {
        &self.measurement
    }

    pub fn tags(&self) -> &BTreeMap<String, String> {
        &self.tags
    }

    pub fn fields(&self) -> &BTreeMap<String, FieldValue> {
        &self.fields
    }

    pub fn time(&self) -> DateTime<Utc> {
        self.time
    }

    /// Render the point as a single line-protocol line with a timestamp in
    /// the given precision.
    pub fn to_line_protocol(&self, precision: Precision) -> String {
        let mut line = escape_measurement(&self.measurement);

        // BTreeMap iteration keeps tags sorted by key.
        for (key, value) in &self.tags {
            if value.is_empty() {
                continue;
            }
            line.push(',');
            line.push_str(&escape_key(key));
            line.push('=');
            line.push_str(&escape_key(value));
        }

        line.push(' ');
        for (i, (key, value)) in self.fields.iter().enumerate() {
            if i > 0 {
                line.push(',');
            }
            line.push_str(&escape_key(key));
            line.push('=');
            line.push_str(&field_to_line_protocol(value));
        }

        // Range was checked in `Point::new`.
        let nanos = self.time.timestamp_nanos_opt().unwrap_or_default();
        line.push(' ');
        line.push_str(&(nanos / precision.nanos_per_unit()).to_string());
        line
    }
}

/// Unit of the timestamps sent to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Precision {
    #[default]
    Nanoseconds,
    Microseconds,
    Milliseconds,
    Seconds,
    Minutes,
    Hours,
}

impl Precision {
    /// Value of the `precision` parameter on the write endpoint.
    pub fn as_str(&self) -> &'static str {
        match self {
            Precision::Nanoseconds => "ns",
            Precision::Microseconds => "u",
            Precision::Milliseconds => "ms",
            Precision::Seconds => "s",
            Precision::Minutes => "m",
            Precision::Hours => "h",
        }
    }

    fn nanos_per_unit(&self) -> i64 {
        match self {
            Precision::Nanoseconds => 1,
            Precision::Microseconds => 1_000,
            Precision::Milliseconds => 1_000_000,
            Precision::Seconds => 1_000_000_000,
            Precision::Minutes => 60 * 1_000_000_000,
            Precision::Hours => 3_600 * 1_000_000_000,
        }
    }
}

impl fmt::Display for Precision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown timestamp precision: {0:?}")]
pub struct PrecisionError(pub String);

impl FromStr for Precision {
    type Err = PrecisionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ns" | "n" => Ok(Precision::Nanoseconds),
            "us" | "u" => Ok(Precision::Microseconds),
            "ms" => Ok(Precision::Milliseconds),
            "s" => Ok(Precision::Seconds),
            "m" => Ok(Precision::Minutes),
            "h" => Ok(Precision::Hours),
            _ => Err(PrecisionError(s.to_string())),
        }
    }
}

impl<'de> Deserialize<'de> for Precision {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// A set of points handed to the store in one write call.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchPoints {
    pub database: String,
    pub precision: Precision,
    pub points: Vec<Point>,
}

impl BatchPoints {
    /// Newline-separated line-protocol body for the whole batch.
    pub fn to_line_protocol(&self) -> String {
        let mut body = String::new();
        for point in &self.points {
            body.push_str(&point.to_line_protocol(self.precision));
            body.push('\n');
        }
        body
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

fn field_to_line_protocol(value: &FieldValue) -> String {
    match value {
        FieldValue::Str(v) => quote(v),
        FieldValue::Int(v) => format!("{}i", v),
        FieldValue::Byte(v) => format!("{}i", v),
        FieldValue::UInt(v) => {
            if *v <= i64::MAX as u64 {
                format!("{}i", v)
            } else {
                format!("{}u", v)
            }
        }
        FieldValue::Float(v) => format!("{}", v),
        FieldValue::Bool(v) => v.to_string(),
        FieldValue::Display(v) => quote(&v.to_string()),
        FieldValue::Request(v) => quote(&v.to_string()),
    }
}

fn quote(s: &str) -> String {
    let escaped = s.replace('\\', "\\\\").replace('"', "\\\"");
    format!("\"{}\"", escaped)
}

/// Spaces and commas must be escaped in measurement names.
fn escape_measurement(s: &str) -> String {
    s.replace(',', "\\,").replace(' ', "\\ ")
}

/// Tag keys, tag values and field keys escape commas, equals signs and spaces.
fn escape_key(s: &str) -> String {
    s.replace(',', "\\,")
        .replace('=', "\\=")
        .replace(' ', "\\ ")
}
