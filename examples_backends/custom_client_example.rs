use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing_influxdb_hook::client::{BoxError, InfluxClient, QueryResult};
use tracing_influxdb_hook::point::BatchPoints;
use tracing_influxdb_hook::{Config, InfluxHook, Level, LogEntry};

/// Example of plugging in a different transport by implementing the
/// `InfluxClient` trait directly. This one prints the line protocol it
/// would have sent.
struct StdoutClient;

#[async_trait]
impl InfluxClient for StdoutClient {
    async fn ping(&self, _timeout: Duration) -> Result<(Duration, String), BoxError> {
        Ok((Duration::ZERO, "stdout".to_string()))
    }

    async fn query(&self, command: &str, _database: &str) -> Result<Vec<QueryResult>, BoxError> {
        println!("[query] {}", command);
        Ok(Vec::new())
    }

    async fn write(&self, batch: &BatchPoints) -> Result<(), BoxError> {
        print!("[write db={}]\n{}", batch.database, batch.to_line_protocol());
        Ok(())
    }
}

#[tokio::main]
async fn main() {
    let config = Config {
        syslog: true,
        facility: "local0".to_string(),
        facility_code: 16,
        app_name: "custom-client-example".to_string(),
        version: "0.1.0".to_string(),
        batch_count: Some(2),
        ..Default::default()
    };
    let hook = InfluxHook::with_client(config, Arc::new(StdoutClient))
        .await
        .expect("create hook");

    hook.fire(&LogEntry::new(Level::Info, "custom client example started"))
        .await
        .expect("fire");
    hook.fire(&LogEntry::new(Level::Error, "simulated error").with_field("db", "my-custom-db"))
        .await
        .expect("fire");
}
