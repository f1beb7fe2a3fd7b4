use std::sync::Arc;
use std::time::Instant;
use tokio::time::{sleep, Duration};
use tracing::error;

use tracing_influxdb_hook::init::init_tracing;
use tracing_influxdb_hook::noop_client::NoopClient;
use tracing_influxdb_hook::{Config, InfluxHook};

#[tokio::main]
async fn main() {
    let client = Arc::new(NoopClient::default());
    let hook = Arc::new(
        InfluxHook::with_client(Config::default(), client)
            .await
            .expect("create hook"),
    );
    init_tracing(hook.clone()).expect("install subscriber");

    let n: u64 = 100_000;
    let start = Instant::now();

    for i in 0..n {
        error!(iteration = i, "default load test error");
    }

    let elapsed = start.elapsed();
    println!("default config: sent {} events in {:?} (~{:.0} ev/s)",
        n,
        elapsed,
        n as f64 / elapsed.as_secs_f64()
    );

    // Give the fire tasks a little time to drain
    sleep(Duration::from_secs(2)).await;
    println!("{:?}", hook.stats());
}
