use std::sync::Arc;
use std::time::Instant;
use tokio::time::Duration;

use tracing_influxdb_hook::noop_client::NoopClient;
use tracing_influxdb_hook::{Config, InfluxHook, Level, LogEntry};

/// Calls `fire` directly from several tasks, bypassing `tracing`, to
/// measure the cost of encoding and batching alone.
#[tokio::main]
async fn main() {
    let config = Config {
        batch_count: Some(1_000),
        batch_interval: Some(Duration::from_millis(200)),
        tags: vec!["worker".to_string()],
        ..Default::default()
    };
    let hook = Arc::new(
        InfluxHook::with_client(config, Arc::new(NoopClient::default()))
            .await
            .expect("create hook"),
    );

    let workers: u64 = 8;
    let per_worker: u64 = 25_000;
    let start = Instant::now();

    let mut handles = Vec::new();
    for w in 0..workers {
        let hook = hook.clone();
        handles.push(tokio::spawn(async move {
            for i in 0..per_worker {
                let entry = LogEntry::new(Level::Error, "custom load test error")
                    .with_field("worker", w)
                    .with_field("iteration", i);
                hook.fire(&entry).await.expect("fire");
            }
        }));
    }
    for handle in handles {
        handle.await.expect("worker");
    }
    hook.shutdown().await.expect("shutdown");

    let n = workers * per_worker;
    let elapsed = start.elapsed();
    println!("custom config: fired {} entries in {:?} (~{:.0} ev/s)",
        n,
        elapsed,
        n as f64 / elapsed.as_secs_f64()
    );
    println!("{:?}", hook.stats());
}
