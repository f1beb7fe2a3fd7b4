use crate::batch::{BatchBuffer, WriteError};
use crate::client::{BoxError, InfluxClient};
use crate::config::{Config, Settings};
use crate::encoder::PointEncoder;
use crate::point::PointError;
use crate::record::{Level, LogEntry};
use crate::scheduler::spawn_flush_scheduler;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Error type returned by hook construction and by [`InfluxHook::fire`].
#[derive(thiserror::Error, Debug)]
pub enum HookError {
    #[error("failed to create influxdb client: {0}")]
    Client(#[source] BoxError),

    #[error("influxdb is unreachable: {0}")]
    Ping(#[source] BoxError),

    #[error("failed to check whether database {database:?} exists: {source}")]
    DatabaseCheck {
        database: String,
        #[source]
        source: BoxError,
    },

    #[error("failed to create database {database:?}: {source}")]
    DatabaseCreate {
        database: String,
        #[source]
        source: BoxError,
    },

    #[error("failed to build point: {0}")]
    Point(#[from] PointError),

    #[error(transparent)]
    Write(#[from] WriteError),
}

/// Snapshot of the hook's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HookStats {
    /// Entries handed to [`InfluxHook::fire`].
    pub entries: u64,
    /// Entries dropped for being below the minimum level.
    pub skipped: u64,
    pub points_written: u64,
    pub points_dropped: u64,
    pub writes: u64,
    pub failed_writes: u64,
}

/// Delivers log entries to InfluxDB in batches.
///
/// `fire` may be called concurrently from any number of tasks. Points are
/// written when the batch count is reached (inline, on the calling task) and
/// every batch interval (on a background task started at construction).
pub struct InfluxHook {
    settings: Settings,
    encoder: PointEncoder,
    buffer: Arc<BatchBuffer>,
    cancel: CancellationToken,
    entries: AtomicU64,
    skipped: AtomicU64,
}

impl InfluxHook {
    /// Create a hook talking to InfluxDB over HTTP.
    ///
    /// The store is pinged and the target database is created if missing
    /// before this returns; any failure aborts construction.
    #[cfg(feature = "http")]
    pub async fn new(config: Config) -> Result<Self, HookError> {
        let settings = config.resolve();
        let client = crate::http::HttpClient::new(&settings).map_err(HookError::Client)?;
        Self::connect(settings, Arc::new(client)).await
    }

    /// Create a hook using an already initialized client.
    pub async fn with_client(
        config: Config,
        client: Arc<dyn InfluxClient>,
    ) -> Result<Self, HookError> {
        Self::connect(config.resolve(), client).await
    }

    async fn connect(settings: Settings, client: Arc<dyn InfluxClient>) -> Result<Self, HookError> {
        let (latency, version) = client.ping(settings.timeout).await.map_err(|e| {
            error!(error = %e, "influxdb ping failed");
            HookError::Ping(e)
        })?;
        info!(?latency, %version, "connected to influxdb");

        autocreate_database(&*client, &settings.database).await?;

        Ok(Self::start(settings, client))
    }

    fn start(settings: Settings, client: Arc<dyn InfluxClient>) -> Self {
        let buffer = Arc::new(BatchBuffer::new(client, &settings));
        let cancel = CancellationToken::new();

        if settings.timer_flush_enabled() {
            spawn_flush_scheduler(buffer.clone(), settings.batch_interval, cancel.clone());
        }

        InfluxHook {
            encoder: PointEncoder::new(&settings),
            settings,
            buffer,
            cancel,
            entries: AtomicU64::new(0),
            skipped: AtomicU64::new(0),
        }
    }

    /// Handle one log entry.
    ///
    /// **Returns**
    /// - `Ok(())` if the entry was buffered or skipped by the level filter.
    /// - `Err(HookError::Point)` if it could not be turned into a point.
    /// - `Err(HookError::Write)` if it completed a batch whose write failed.
    ///   The batch is dropped; later entries are unaffected.
    pub async fn fire(&self, entry: &LogEntry) -> Result<(), HookError> {
        self.entries.fetch_add(1, Ordering::Relaxed);

        let point = match self.encoder.encode(entry)? {
            Some(point) => point,
            None => {
                self.skipped.fetch_add(1, Ordering::Relaxed);
                return Ok(());
            }
        };

        self.buffer.add(point).await?;
        Ok(())
    }

    /// Levels the hook wants to receive. Filtering happens in `fire`.
    pub fn levels(&self) -> &'static [Level] {
        &Level::ALL
    }

    /// Write everything pending now.
    pub async fn flush(&self) -> Result<(), HookError> {
        self.buffer.flush_now().await?;
        Ok(())
    }

    /// Stop the periodic flush and write whatever is still pending.
    ///
    /// Entries fired afterwards are still buffered and written once the
    /// batch count is reached.
    pub async fn shutdown(&self) -> Result<(), HookError> {
        self.cancel.cancel();
        self.flush().await
    }

    pub async fn pending(&self) -> usize {
        self.buffer.pending().await
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn stats(&self) -> HookStats {
        let flush = self.buffer.stats();
        HookStats {
            entries: self.entries.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            points_written: flush.points_written.load(Ordering::Relaxed),
            points_dropped: flush.points_dropped.load(Ordering::Relaxed),
            writes: flush.writes.load(Ordering::Relaxed),
            failed_writes: flush.failed_writes.load(Ordering::Relaxed),
        }
    }
}

impl Drop for InfluxHook {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Create `database` unless `SHOW DATABASES` already lists it.
async fn autocreate_database(client: &dyn InfluxClient, database: &str) -> Result<(), HookError> {
    let results = client
        .query("SHOW DATABASES", database)
        .await
        .map_err(|source| HookError::DatabaseCheck {
            database: database.to_string(),
            source,
        })?;

    let exists = results
        .first()
        .and_then(|r| r.series.first())
        .map_or(false, |series| {
            series
                .values
                .iter()
                .flatten()
                .any(|v| v.as_str() == Some(database))
        });
    if exists {
        debug!(database, "database exists");
        return Ok(());
    }

    let command = format!("CREATE DATABASE \"{}\"", database.replace('"', "\\\""));
    client
        .query(&command, database)
        .await
        .map_err(|source| HookError::DatabaseCreate {
            database: database.to_string(),
            source,
        })?;
    info!(database, "created database");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingClient;
    use tokio::time::{sleep, Duration};

    fn info_entry(user: &str) -> LogEntry {
        LogEntry::new(Level::Info, "hello").with_field("user", user)
    }

    async fn hook(config: Config, client: &Arc<RecordingClient>) -> InfluxHook {
        InfluxHook::with_client(config, client.clone())
            .await
            .expect("hook")
    }

    #[tokio::test]
    async fn count_trigger_scenario() {
        let client = Arc::new(RecordingClient::with_database("logrus"));
        let hook = hook(
            Config {
                batch_count: Some(2),
                batch_interval: Some(Duration::ZERO),
                ..Default::default()
            },
            &client,
        )
        .await;

        hook.fire(&info_entry("a")).await.unwrap();
        hook.fire(&info_entry("b")).await.unwrap();
        hook.fire(&info_entry("c")).await.unwrap();

        assert_eq!(client.write_sizes(), vec![2]);
        assert_eq!(hook.pending().await, 1);
    }

    #[tokio::test]
    async fn below_min_level_produces_nothing() {
        let client = Arc::new(RecordingClient::with_database("logrus"));
        let hook = hook(
            Config {
                min_level: Some(Level::Error),
                batch_count: Some(0),
                ..Default::default()
            },
            &client,
        )
        .await;

        hook.fire(&LogEntry::new(Level::Warn, "careful")).await.unwrap();

        assert!(client.write_sizes().is_empty());
        assert_eq!(hook.pending().await, 0);
        let stats = hook.stats();
        assert_eq!(stats.entries, 1);
        assert_eq!(stats.skipped, 1);
    }

    #[tokio::test]
    async fn one_point_per_accepted_entry() {
        let client = Arc::new(RecordingClient::with_database("logrus"));
        let hook = hook(Config::default(), &client).await;

        for level in Level::ALL {
            hook.fire(&LogEntry::new(level, "x")).await.unwrap();
        }
        assert_eq!(hook.pending().await, 6);
    }

    #[tokio::test]
    async fn encoding_error_is_returned_and_not_buffered() {
        let client = Arc::new(RecordingClient::with_database("logrus"));
        let hook = hook(Config::default(), &client).await;

        let err = hook
            .fire(&LogEntry::new(Level::Info, "x").with_field("measurement", ""))
            .await
            .unwrap_err();

        assert!(matches!(err, HookError::Point(PointError::EmptyMeasurement)));
        assert_eq!(hook.pending().await, 0);
    }

    #[tokio::test]
    async fn failed_threshold_write_only_affects_that_event() {
        let client = Arc::new(RecordingClient::with_database("logrus"));
        client.fail_writes(true);
        let hook = hook(
            Config {
                batch_count: Some(1),
                ..Default::default()
            },
            &client,
        )
        .await;

        let err = hook.fire(&info_entry("a")).await.unwrap_err();
        assert!(matches!(err, HookError::Write(WriteError { points: 1, .. })));

        client.fail_writes(false);
        hook.fire(&info_entry("b")).await.unwrap();
        assert_eq!(client.write_sizes(), vec![1, 1]);
        let stats = hook.stats();
        assert_eq!(stats.points_written, 1);
        assert_eq!(stats.points_dropped, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn timer_flushes_partial_batches() {
        let client = Arc::new(RecordingClient::with_database("logrus"));
        let hook = hook(
            Config {
                batch_count: Some(100),
                batch_interval: Some(Duration::from_secs(5)),
                ..Default::default()
            },
            &client,
        )
        .await;

        hook.fire(&info_entry("a")).await.unwrap();
        hook.fire(&info_entry("b")).await.unwrap();
        sleep(Duration::from_secs(6)).await;

        assert_eq!(client.write_sizes(), vec![2]);
        assert_eq!(hook.pending().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_drains_and_stops_timer() {
        let client = Arc::new(RecordingClient::with_database("logrus"));
        let hook = hook(Config::default(), &client).await;

        hook.fire(&info_entry("a")).await.unwrap();
        hook.shutdown().await.unwrap();
        assert_eq!(client.write_sizes(), vec![1]);

        hook.fire(&info_entry("b")).await.unwrap();
        sleep(Duration::from_secs(30)).await;
        assert_eq!(client.write_sizes(), vec![1]);
        assert_eq!(hook.pending().await, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn fire_is_safe_from_many_tasks() {
        let client = Arc::new(RecordingClient::with_database("logrus"));
        let hook = Arc::new(
            hook(
                Config {
                    batch_count: Some(10),
                    batch_interval: Some(Duration::ZERO),
                    ..Default::default()
                },
                &client,
            )
            .await,
        );

        let mut handles = Vec::new();
        for t in 0..10 {
            let hook = hook.clone();
            handles.push(tokio::spawn(async move {
                for i in 0..10 {
                    hook.fire(&info_entry(&format!("{t}-{i}"))).await.unwrap();
                }
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        assert_eq!(client.write_sizes(), vec![10; 10]);
        assert_eq!(hook.stats().points_written, 100);
    }

    #[tokio::test]
    async fn levels_cover_all_six_severities() {
        let client = Arc::new(RecordingClient::with_database("logrus"));
        let hook = hook(Config::default(), &client).await;
        assert_eq!(hook.levels().len(), 6);
    }

    #[tokio::test]
    async fn existing_database_is_not_recreated() {
        let client = Arc::new(RecordingClient::with_database("logrus"));
        let _hook = hook(Config::default(), &client).await;
        assert_eq!(client.queries(), vec!["SHOW DATABASES"]);
    }

    #[tokio::test]
    async fn missing_database_is_created() {
        let client = Arc::new(RecordingClient::with_database("_internal"));
        let _hook = hook(
            Config {
                database: "app_logs".to_string(),
                ..Default::default()
            },
            &client,
        )
        .await;
        assert_eq!(
            client.queries(),
            vec!["SHOW DATABASES", "CREATE DATABASE \"app_logs\""]
        );
    }

    #[tokio::test]
    async fn unreachable_store_aborts_construction() {
        let client = Arc::new(RecordingClient {
            fail_ping: true,
            ..Default::default()
        });
        let result = InfluxHook::with_client(Config::default(), client.clone()).await;
        assert!(matches!(result, Err(HookError::Ping(_))));
        assert!(client.queries().is_empty());
    }

    #[tokio::test]
    async fn failed_database_check_aborts_construction() {
        let client = Arc::new(RecordingClient {
            fail_query: true,
            ..Default::default()
        });
        let result = InfluxHook::with_client(Config::default(), client).await;
        assert!(matches!(result, Err(HookError::DatabaseCheck { .. })));
    }
}
