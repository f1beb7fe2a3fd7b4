/// Environment variable names used by this crate to fill in credentials
/// that were left empty in [`Config`](crate::config::Config).
///
/// These are purely helpers; the hook itself only reads them while
/// resolving its configuration.

/// InfluxDB user name.
pub const INFLUX_USER_ENV: &str = "INFLUX_USER";

/// InfluxDB password.
pub const INFLUX_PWD_ENV: &str = "INFLUX_PWD";

/// Read an environment variable or fall back to a provided default.
pub fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}
