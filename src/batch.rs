//! Lock-protected buffer of points waiting to be written.
//!
//! Points are accumulated until either:
//! - the buffer reaches the batch count (flushed inline by `add`)
//! - the flush scheduler fires (see [`crate::scheduler`])
//!
//! Both paths take the same lock and keep it for the duration of the write.

use crate::client::{BoxError, InfluxClient};
use crate::config::Settings;
use crate::point::{BatchPoints, Point, Precision};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

/// A batch could not be written. Its points have been dropped.
#[derive(thiserror::Error, Debug)]
#[error("failed to write batch of {points} points: {source}")]
pub struct WriteError {
    pub points: usize,
    #[source]
    pub source: BoxError,
}

/// Delivery counters, updated on every flush.
#[derive(Debug, Default)]
pub struct FlushStats {
    pub points_written: AtomicU64,
    /// Points lost because their batch failed to write.
    pub points_dropped: AtomicU64,
    pub writes: AtomicU64,
    pub failed_writes: AtomicU64,
}

#[derive(Default)]
struct BatchState {
    points: Option<Vec<Point>>,
    last_flush: Option<Instant>,
}

pub struct BatchBuffer {
    client: Arc<dyn InfluxClient>,
    database: String,
    precision: Precision,
    batch_count: usize,
    state: Mutex<BatchState>,
    stats: FlushStats,
}

impl BatchBuffer {
    pub fn new(client: Arc<dyn InfluxClient>, settings: &Settings) -> Self {
        BatchBuffer {
            client,
            database: settings.database.clone(),
            precision: settings.precision,
            batch_count: settings.batch_count,
            state: Mutex::new(BatchState::default()),
            stats: FlushStats::default(),
        }
    }

    /// Append a point, flushing inline once the batch count is reached.
    ///
    /// With a batch count of zero every point is written on its own.
    pub async fn add(&self, point: Point) -> Result<(), WriteError> {
        let mut state = self.state.lock().await;
        let batch_count = self.batch_count;
        let points = state
            .points
            .get_or_insert_with(|| Vec::with_capacity(batch_count.min(1024)));
        points.push(point);

        if points.len() >= batch_count {
            self.flush_locked(&mut state).await
        } else {
            Ok(())
        }
    }

    /// Write everything pending. A no-op when nothing is pending.
    pub async fn flush_now(&self) -> Result<(), WriteError> {
        let mut state = self.state.lock().await;
        self.flush_locked(&mut state).await
    }

    /// Number of points waiting for the next flush.
    pub async fn pending(&self) -> usize {
        let state = self.state.lock().await;
        state.points.as_ref().map_or(0, Vec::len)
    }

    /// When the last write attempt finished, successful or not.
    pub async fn last_flush(&self) -> Option<Instant> {
        self.state.lock().await.last_flush
    }

    pub fn stats(&self) -> &FlushStats {
        &self.stats
    }

    async fn flush_locked(&self, state: &mut BatchState) -> Result<(), WriteError> {
        let points = match state.points.take() {
            Some(points) if !points.is_empty() => points,
            _ => return Ok(()),
        };

        let batch = BatchPoints {
            database: self.database.clone(),
            precision: self.precision,
            points,
        };
        let n = batch.len();

        // The batch is gone whatever the outcome; failed writes are not retried.
        let result = self.client.write(&batch).await;
        state.last_flush = Some(Instant::now());
        self.stats.writes.fetch_add(1, Ordering::Relaxed);

        match result {
            Ok(()) => {
                self.stats.points_written.fetch_add(n as u64, Ordering::Relaxed);
                debug!(points = n, database = %self.database, "flushed batch");
                Ok(())
            }
            Err(source) => {
                self.stats.failed_writes.fetch_add(1, Ordering::Relaxed);
                self.stats.points_dropped.fetch_add(n as u64, Ordering::Relaxed);
                Err(WriteError { points: n, source })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::record::FieldValue;
    use crate::testing::RecordingClient;
    use chrono::Utc;
    use std::collections::BTreeMap;

    fn point(n: i64) -> Point {
        let mut fields = BTreeMap::new();
        fields.insert("n".to_string(), FieldValue::Int(n));
        Point::new("logrus", BTreeMap::new(), fields, Utc::now()).unwrap()
    }

    fn buffer(client: &Arc<RecordingClient>, batch_count: usize) -> BatchBuffer {
        let settings = Config {
            batch_count: Some(batch_count),
            ..Default::default()
        }
        .resolve();
        BatchBuffer::new(client.clone(), &settings)
    }

    #[tokio::test]
    async fn flush_on_empty_buffer_does_not_write() {
        let client = Arc::new(RecordingClient::default());
        let buf = buffer(&client, 10);

        buf.flush_now().await.unwrap();
        buf.flush_now().await.unwrap();

        assert!(client.write_sizes().is_empty());
        assert!(buf.last_flush().await.is_none());
    }

    #[tokio::test]
    async fn nth_add_writes_exactly_n_points() {
        let client = Arc::new(RecordingClient::default());
        let buf = buffer(&client, 3);

        buf.add(point(1)).await.unwrap();
        buf.add(point(2)).await.unwrap();
        assert!(client.write_sizes().is_empty());
        assert_eq!(buf.pending().await, 2);

        buf.add(point(3)).await.unwrap();
        assert_eq!(client.write_sizes(), vec![3]);
        assert_eq!(buf.pending().await, 0);

        let writes = client.writes.lock().unwrap();
        let order: Vec<_> = writes[0]
            .points
            .iter()
            .map(|p| p.fields().get("n").cloned())
            .collect();
        assert_eq!(
            order,
            vec![
                Some(FieldValue::Int(1)),
                Some(FieldValue::Int(2)),
                Some(FieldValue::Int(3))
            ]
        );
        assert_eq!(writes[0].database, "logrus");
    }

    #[tokio::test]
    async fn zero_batch_count_writes_every_point_alone() {
        let client = Arc::new(RecordingClient::default());
        let buf = buffer(&client, 0);

        buf.add(point(1)).await.unwrap();
        buf.add(point(2)).await.unwrap();

        assert_eq!(client.write_sizes(), vec![1, 1]);
        assert_eq!(buf.pending().await, 0);
    }

    #[tokio::test]
    async fn failed_write_still_resets_the_buffer() {
        let client = Arc::new(RecordingClient::default());
        client.fail_writes(true);
        let buf = buffer(&client, 10);

        buf.add(point(1)).await.unwrap();
        buf.add(point(2)).await.unwrap();
        let err = buf.flush_now().await.unwrap_err();

        assert_eq!(err.points, 2);
        assert_eq!(buf.pending().await, 0);
        assert!(buf.last_flush().await.is_some());
        assert_eq!(buf.stats().points_dropped.load(Ordering::Relaxed), 2);
        assert_eq!(buf.stats().failed_writes.load(Ordering::Relaxed), 1);

        // Nothing is retried once the client recovers.
        client.fail_writes(false);
        buf.flush_now().await.unwrap();
        assert_eq!(client.write_sizes(), vec![2]);
    }

    #[tokio::test]
    async fn threshold_flush_surfaces_write_error() {
        let client = Arc::new(RecordingClient::default());
        client.fail_writes(true);
        let buf = buffer(&client, 2);

        buf.add(point(1)).await.unwrap();
        assert!(buf.add(point(2)).await.is_err());
        assert_eq!(buf.pending().await, 0);

        client.fail_writes(false);
        buf.add(point(3)).await.unwrap();
        assert_eq!(buf.pending().await, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_adds_lose_nothing() {
        let client = Arc::new(RecordingClient::default());
        let buf = Arc::new(buffer(&client, 7));

        let mut handles = Vec::new();
        for t in 0..8 {
            let buf = buf.clone();
            handles.push(tokio::spawn(async move {
                for i in 0..25 {
                    buf.add(point(t * 100 + i)).await.unwrap();
                }
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        let written: usize = client.write_sizes().iter().sum();
        assert_eq!(written + buf.pending().await, 200);
        assert!(client.write_sizes().iter().all(|&n| n == 7));
    }
}
