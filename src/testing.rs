use crate::client::{BoxError, InfluxClient, QueryResult, Series};
use crate::point::BatchPoints;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// In-memory client that records every call.
#[derive(Default)]
pub struct RecordingClient {
    pub databases: Vec<String>,
    pub fail_ping: bool,
    pub fail_query: bool,
    pub fail_writes: AtomicBool,
    pub queries: Mutex<Vec<String>>,
    pub writes: Mutex<Vec<BatchPoints>>,
}

impl RecordingClient {
    pub fn with_database(name: &str) -> Self {
        RecordingClient {
            databases: vec![name.to_string()],
            ..Default::default()
        }
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn write_sizes(&self) -> Vec<usize> {
        self.writes.lock().unwrap().iter().map(|b| b.len()).collect()
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl InfluxClient for RecordingClient {
    async fn ping(&self, _timeout: Duration) -> Result<(Duration, String), BoxError> {
        if self.fail_ping {
            return Err("connection refused".into());
        }
        Ok((Duration::from_millis(1), "1.8.10".to_string()))
    }

    async fn query(&self, command: &str, _database: &str) -> Result<Vec<QueryResult>, BoxError> {
        self.queries.lock().unwrap().push(command.to_string());
        if self.fail_query {
            return Err("query failed".into());
        }
        let values = self
            .databases
            .iter()
            .map(|db| vec![serde_json::Value::String(db.clone())])
            .collect();
        Ok(vec![QueryResult {
            series: vec![Series {
                name: "databases".to_string(),
                columns: vec!["name".to_string()],
                values,
            }],
            error: None,
        }])
    }

    async fn write(&self, batch: &BatchPoints) -> Result<(), BoxError> {
        self.writes.lock().unwrap().push(batch.clone());
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err("write refused".into());
        }
        Ok(())
    }
}
