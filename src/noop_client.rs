use crate::client::{BoxError, InfluxClient, QueryResult, Series};
use crate::point::BatchPoints;
use async_trait::async_trait;
use std::time::Duration;

/// A client that accepts every write and reports every database as present.
///
/// Useful for measuring the overhead of the hook itself without any
/// network I/O, and for tests that don't care about persistence.
#[derive(Clone, Default)]
pub struct NoopClient;

#[async_trait]
impl InfluxClient for NoopClient {
    async fn ping(&self, _timeout: Duration) -> Result<(Duration, String), BoxError> {
        Ok((Duration::ZERO, "noop".to_string()))
    }

    async fn query(&self, _command: &str, database: &str) -> Result<Vec<QueryResult>, BoxError> {
        Ok(vec![QueryResult {
            series: vec![Series {
                name: "databases".to_string(),
                columns: vec!["name".to_string()],
                values: vec![vec![serde_json::Value::String(database.to_string())]],
            }],
            error: None,
        }])
    }

    async fn write(&self, _batch: &BatchPoints) -> Result<(), BoxError> {
        Ok(())
    }
}
