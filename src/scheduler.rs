use crate::batch::BatchBuffer;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Duration};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Spawn the periodic flush task.
///
/// Every `interval` the task flushes whatever is pending, regardless of the
/// batch count. Write failures are logged and counted in the buffer stats;
/// nobody is waiting for them. The task runs until `cancel` is triggered.
pub fn spawn_flush_scheduler(
    buffer: Arc<BatchBuffer>,
    interval: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("flush scheduler stopped");
                    return;
                }
                _ = sleep(interval) => {
                    if let Err(e) = buffer.flush_now().await {
                        warn!(points = e.points, error = %e.source, "scheduled flush failed, batch dropped");
                    }
                }
            }
        }
    })
}
