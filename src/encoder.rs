//! Maps a [`LogEntry`] onto a measurement, a tag set and a field set.

use crate::config::{Settings, SyslogSettings};
use crate::point::{Point, PointError};
use crate::record::{FieldValue, Level, LogEntry};
use std::collections::BTreeMap;

/// Field that overrides the configured measurement for a single entry.
pub const MEASUREMENT_FIELD: &str = "measurement";
/// Field that is always promoted to a tag in plain mode.
pub const LOGGER_FIELD: &str = "logger";
/// Field carrying the entry message. It is never promoted to a tag.
pub const MESSAGE_FIELD: &str = "message";

/// Builds points from log entries according to the hook settings.
///
/// In plain mode a key never appears as both a tag and a field. An
/// allow-listed `message` stays a field, filled from the entry message.
#[derive(Debug, Clone)]
pub struct PointEncoder {
    measurement: String,
    tags: Vec<String>,
    min_level: Option<Level>,
    syslog: Option<SyslogSettings>,
}

impl PointEncoder {
    pub fn new(settings: &Settings) -> Self {
        PointEncoder {
            measurement: settings.measurement.clone(),
            tags: settings.tags.clone(),
            min_level: settings.min_level,
            syslog: settings.syslog.clone(),
        }
    }

    /// Encode one entry.
    ///
    /// **Returns**
    /// - `Ok(Some(point))` for entries at or above the minimum level.
    /// - `Ok(None)` for entries below it; they are skipped, not an error.
    /// - `Err(..)` if the resulting point is malformed.
    pub fn encode(&self, entry: &LogEntry) -> Result<Option<Point>, PointError> {
        if let Some(min) = self.min_level {
            if entry.level < min {
                return Ok(None);
            }
        }

        let measurement = field_tag(&entry.fields, MEASUREMENT_FIELD)
            .unwrap_or_else(|| self.measurement.clone());

        let (tags, fields) = match &self.syslog {
            Some(syslog) => syslog_tags_and_fields(entry, syslog),
            None => self.plain_tags_and_fields(entry),
        };

        Point::new(measurement, tags, fields, entry.timestamp).map(Some)
    }

    fn plain_tags_and_fields(&self, entry: &LogEntry) -> TagsAndFields {
        // Work on a copy so promotion never touches the caller's entry.
        let mut fields = entry.fields.clone();
        let mut tags = BTreeMap::new();

        tags.insert("level".to_string(), entry.level.as_str().to_string());

        if let Some(logger) = field_tag(&entry.fields, LOGGER_FIELD) {
            tags.insert(LOGGER_FIELD.to_string(), logger);
        }
        for name in self.tags.iter().filter(|name| name.as_str() != MESSAGE_FIELD) {
            if let Some(value) = field_tag(&entry.fields, name) {
                tags.insert(name.clone(), value);
            }
        }

        fields.retain(|key, _| !tags.contains_key(key));
        fields.insert(MESSAGE_FIELD.to_string(), FieldValue::Str(entry.message.clone()));

        (tags, fields)
    }
}

type TagsAndFields = (BTreeMap<String, String>, BTreeMap<String, FieldValue>);

fn syslog_tags_and_fields(entry: &LogEntry, syslog: &SyslogSettings) -> TagsAndFields {
    let host = hostname();
    let (severity, severity_code) = syslog_severity(entry.level);

    let mut tags = BTreeMap::new();
    tags.insert("appname".to_string(), syslog.app_name.clone());
    tags.insert("facility".to_string(), syslog.facility.clone());
    tags.insert("host".to_string(), host.clone());
    tags.insert("hostname".to_string(), host);
    tags.insert("severity".to_string(), severity.to_string());

    let mut fields = BTreeMap::new();
    fields.insert("facility_code".to_string(), FieldValue::Int(syslog.facility_code));
    fields.insert("message".to_string(), FieldValue::Str(entry.message.clone()));
    fields.insert(
        "procid".to_string(),
        FieldValue::Str(std::process::id().to_string()),
    );
    fields.insert("severity_code".to_string(), FieldValue::Int(severity_code));
    // Out-of-range times are rejected by `Point::new` right after this.
    fields.insert(
        "timestamp".to_string(),
        FieldValue::Int(entry.timestamp.timestamp_nanos_opt().unwrap_or_default()),
    );
    fields.insert("version".to_string(), FieldValue::Str(syslog.version.clone()));

    (tags, fields)
}

/// Syslog short name and numeric code for a level.
pub fn syslog_severity(level: Level) -> (&'static str, i64) {
    match level {
        Level::Panic => ("panic", 0),
        Level::Fatal => ("crit", 2),
        Level::Error => ("err", 3),
        Level::Warn => ("warning", 4),
        Level::Info => ("info", 6),
        Level::Debug => ("debug", 7),
    }
}

/// Coerce a field value into a tag value.
///
/// Strings, displayable values, bytes and integers coerce (numbers to their
/// decimal form). Anything else is treated as absent.
pub fn tag_value(value: &FieldValue) -> Option<String> {
    match value {
        FieldValue::Str(s) => Some(s.clone()),
        FieldValue::Display(d) => Some(d.to_string()),
        FieldValue::Byte(b) => Some(b.to_string()),
        FieldValue::Int(i) => Some(i.to_string()),
        FieldValue::UInt(u) => Some(u.to_string()),
        FieldValue::Float(_) | FieldValue::Bool(_) | FieldValue::Request(_) => None,
    }
}

fn field_tag(fields: &BTreeMap<String, FieldValue>, key: &str) -> Option<String> {
    fields.get(key).and_then(tag_value)
}

/// Host name of the current machine, or `localhost` if it cannot be found.
pub fn hostname() -> String {
    if let Ok(name) = std::env::var("HOSTNAME") {
        if !name.is_empty() {
            return name;
        }
    }

    for path in ["/proc/sys/kernel/hostname", "/etc/hostname"] {
        if let Ok(contents) = std::fs::read_to_string(path) {
            let name = contents.trim();
            if !name.is_empty() {
                return name.to_string();
            }
        }
    }

    "localhost".to_string()
}
