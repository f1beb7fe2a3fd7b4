//! Hook configuration and its resolved, immutable form.

use crate::env::{env_or, INFLUX_PWD_ENV, INFLUX_USER_ENV};
use crate::point::Precision;
use crate::record::Level;
use serde::Deserialize;
use std::fmt;
use std::time::Duration;

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 8086;
pub const DEFAULT_DATABASE: &str = "logrus";
pub const DEFAULT_MEASUREMENT: &str = "logrus";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(100);
pub const DEFAULT_BATCH_INTERVAL: Duration = Duration::from_secs(5);
pub const DEFAULT_BATCH_COUNT: usize = 200;

/// Hook configuration as supplied by the application.
///
/// Every field may be left at its zero value; [`Config::resolve`] fills in
/// the defaults. The batching knobs are `Option`s because an explicit zero
/// means something different from "unset":
/// - `batch_count: Some(0)` disables batching, every point is written alone.
/// - `batch_interval: Some(Duration::ZERO)` disables the periodic flush.
#[derive(Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    #[serde(rename = "influxdb_host")]
    pub host: String,
    #[serde(rename = "influxdb_port")]
    pub port: u16,
    #[serde(rename = "influxdb_timeout_ms", with = "opt_millis")]
    pub timeout: Option<Duration>,
    #[serde(rename = "influxdb_database")]
    pub database: String,
    #[serde(rename = "influxdb_username")]
    pub username: String,
    #[serde(rename = "influxdb_password")]
    pub password: String,
    #[serde(rename = "influxdb_https")]
    pub use_https: bool,
    #[serde(rename = "influxdb_precision")]
    pub precision: Option<Precision>,

    /// Emit syslog-shaped points (for log viewers that expect them).
    #[serde(rename = "syslog_enabled")]
    pub syslog: bool,
    #[serde(rename = "syslog_facility")]
    pub facility: String,
    #[serde(rename = "syslog_facility_code")]
    pub facility_code: i64,
    #[serde(rename = "syslog_app_name")]
    pub app_name: String,
    #[serde(rename = "syslog_app_version")]
    pub version: String,

    /// Entries less severe than this are not forwarded.
    #[serde(rename = "syslog_min_level")]
    pub min_level: Option<Level>,

    /// Entry fields promoted to tags, in promotion order.
    #[serde(rename = "logrus_tags")]
    pub tags: Vec<String>,

    pub measurement: String,

    #[serde(rename = "batch_interval_ms", with = "opt_millis")]
    pub batch_interval: Option<Duration>,
    pub batch_count: Option<usize>,
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("invalid JSON configuration: {0}")]
    Json(#[from] serde_json::Error),
}

impl Config {
    /// Parse configuration from a JSON document.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_json::from_str(json)?;
        Ok(config)
    }

    /// Apply defaults to every field left at its zero value.
    pub fn resolve(self) -> Settings {
        let syslog = self.syslog.then(|| SyslogSettings {
            facility: self.facility,
            facility_code: self.facility_code,
            app_name: self.app_name,
            version: self.version,
        });

        Settings {
            host: non_empty_or(self.host, DEFAULT_HOST),
            port: if self.port == 0 { DEFAULT_PORT } else { self.port },
            use_https: self.use_https,
            timeout: self
                .timeout
                .filter(|t| !t.is_zero())
                .unwrap_or(DEFAULT_TIMEOUT),
            database: non_empty_or(self.database, DEFAULT_DATABASE),
            username: non_empty_or_else(self.username, || env_or(INFLUX_USER_ENV, "")),
            password: non_empty_or_else(self.password, || env_or(INFLUX_PWD_ENV, "")),
            precision: self.precision.unwrap_or_default(),
            measurement: non_empty_or(self.measurement, DEFAULT_MEASUREMENT),
            tags: self.tags,
            min_level: self.min_level,
            syslog,
            batch_count: self.batch_count.unwrap_or(DEFAULT_BATCH_COUNT),
            batch_interval: self.batch_interval.unwrap_or(DEFAULT_BATCH_INTERVAL),
        }
    }
}

/// Identity reported by points in syslog mode.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyslogSettings {
    pub facility: String,
    pub facility_code: i64,
    pub app_name: String,
    pub version: String,
}

/// Fully resolved configuration, fixed for the lifetime of a hook.
///
/// The `Debug` output masks the password.
#[derive(Clone, PartialEq, Eq)]
pub struct Settings {
    pub host: String,
    pub port: u16,
    pub use_https: bool,
    pub timeout: Duration,
    pub database: String,
    pub username: String,
    pub password: String,
    pub precision: Precision,
    pub measurement: String,
    pub tags: Vec<String>,
    pub min_level: Option<Level>,
    /// `Some` selects syslog encoding, `None` plain encoding.
    pub syslog: Option<SyslogSettings>,
    pub batch_count: usize,
    pub batch_interval: Duration,
}

impl Settings {
    /// Base URL of the store, e.g. `http://localhost:8086`.
    pub fn base_url(&self) -> String {
        let scheme = if self.use_https { "https" } else { "http" };
        format!("{}://{}:{}", scheme, self.host, self.port)
    }

    /// Whether the periodic flush task should run at all.
    pub fn timer_flush_enabled(&self) -> bool {
        self.batch_count > 0 && !self.batch_interval.is_zero()
    }
}

impl Default for Settings {
    fn default() -> Self {
        Config::default().resolve()
    }
}

const REDACTED: &str = "<redacted>";

fn redact(password: &str) -> &str {
    if password.is_empty() {
        ""
    } else {
        REDACTED
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("timeout", &self.timeout)
            .field("database", &self.database)
            .field("username", &self.username)
            .field("password", &redact(&self.password))
            .field("use_https", &self.use_https)
            .field("precision", &self.precision)
            .field("syslog", &self.syslog)
            .field("facility", &self.facility)
            .field("facility_code", &self.facility_code)
            .field("app_name", &self.app_name)
            .field("version", &self.version)
            .field("min_level", &self.min_level)
            .field("tags", &self.tags)
            .field("measurement", &self.measurement)
            .field("batch_interval", &self.batch_interval)
            .field("batch_count", &self.batch_count)
            .finish()
    }
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("use_https", &self.use_https)
            .field("timeout", &self.timeout)
            .field("database", &self.database)
            .field("username", &self.username)
            .field("password", &redact(&self.password))
            .field("precision", &self.precision)
            .field("measurement", &self.measurement)
            .field("tags", &self.tags)
            .field("min_level", &self.min_level)
            .field("syslog", &self.syslog)
            .field("batch_count", &self.batch_count)
            .field("batch_interval", &self.batch_interval)
            .finish()
    }
}

fn non_empty_or(value: String, default: &str) -> String {
    non_empty_or_else(value, || default.to_string())
}

fn non_empty_or_else(value: String, default: impl FnOnce() -> String) -> String {
    if value.is_empty() {
        default()
    } else {
        value
    }
}

mod opt_millis {
    use serde::{Deserialize, Deserializer};
    use std::time::Duration;

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_millis))
    }
}
