use std::sync::Arc;
use tokio::time::{sleep, Duration};
use tracing::{error, info, warn};

use tracing_influxdb_hook::init::{init_tracing_with_config, LayerConfig};
use tracing_influxdb_hook::{Config, InfluxHook, Level};

/// Ships events to a local InfluxDB 1.x at `localhost:8086`.
///
/// Credentials are read from `INFLUX_USER` / `INFLUX_PWD` when set.
#[tokio::main]
async fn main() {
    let config = Config {
        database: "app_logs".to_string(),
        tags: vec!["user_id".to_string()],
        min_level: Some(Level::Info),
        ..Default::default()
    };

    let hook = match InfluxHook::new(config).await {
        Ok(hook) => Arc::new(hook),
        Err(e) => {
            eprintln!("influxdb unavailable, not installing hook: {}", e);
            return;
        }
    };
    init_tracing_with_config(hook.clone(), LayerConfig { enable_stdout: true })
        .expect("install subscriber");

    info!("starting service");
    warn!(user_id = 42, "password expires soon");
    error!(user_id = 42, reason = "invalid password", "authentication failed");

    sleep(Duration::from_millis(100)).await;
    if let Err(e) = hook.shutdown().await {
        eprintln!("final flush failed: {}", e);
    }
}
