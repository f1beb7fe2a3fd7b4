pub mod record;
pub mod point;
pub mod client;
pub mod config;
pub mod env;
pub mod encoder;
pub mod batch;
pub mod scheduler;
pub mod hook;
pub mod layer;

#[cfg(feature = "http")]
pub mod http;

pub mod init;
pub mod noop_client;

#[cfg(test)]
mod testing;

pub use config::Config;
pub use hook::{HookError, InfluxHook};
pub use record::{FieldValue, Level, LogEntry};
