use crate::point::BatchPoints;
use async_trait::async_trait;
use serde::Deserialize;
use std::error::Error;
use std::time::Duration;

pub type BoxError = Box<dyn Error + Send + Sync>;

/// One statement result returned by a query.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct QueryResult {
    #[serde(default)]
    pub series: Vec<Series>,
    #[serde(default)]
    pub error: Option<String>,
}

/// A named table of rows inside a [`QueryResult`].
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Series {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub columns: Vec<String>,
    #[serde(default)]
    pub values: Vec<Vec<serde_json::Value>>,
}

/// Remote time-series store the hook delivers points to.
///
/// The hook calls `ping` and `query` once while it is being constructed and
/// `write` every time a batch is flushed. Flushes happen with the batch lock
/// held, so a slow `write` stalls producers until it returns.
#[async_trait]
pub trait InfluxClient: Send + Sync {
    /// Check connectivity.
    ///
    /// **Returns**
    /// - `Ok((latency, version))` if the store answered within `timeout`.
    /// - `Err(..)` if it is unreachable or answered with an error.
    async fn ping(&self, timeout: Duration) -> Result<(Duration, String), BoxError>;

    /// Run a query command against `database`.
    async fn query(&self, command: &str, database: &str) -> Result<Vec<QueryResult>, BoxError>;

    /// Write a whole batch in one call.
    ///
    /// A failed write is not retried; the caller drops the batch.
    async fn write(&self, batch: &BatchPoints) -> Result<(), BoxError>;
}
