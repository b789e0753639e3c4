//! Store Maintenance Task
//!
//! Background task that periodically removes expired entries and flushes the
//! metadata index to disk.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cache::DiskStore;
use crate::error::{CacheError, Result};

/// Runs one maintenance pass on the blocking pool.
///
/// Returns the number of expired entries removed.
pub async fn run_maintenance(store: Arc<Mutex<DiskStore>>) -> Result<usize> {
    tokio::task::spawn_blocking(move || -> Result<usize> {
        let mut store = store.blocking_lock();
        let removed = store.purge_expired();
        store.persist_index()?;
        Ok(removed)
    })
    .await
    .map_err(|e| CacheError::Internal(format!("maintenance task failed: {e}")))?
}

/// Spawns a background task that periodically maintains the disk store.
///
/// # Arguments
/// * `store` - shared reference to the disk store
/// * `cleanup_interval_secs` - Interval in seconds between runs
///
/// # Returns
/// A JoinHandle for the spawned task, which can be used to abort the task
/// during graceful shutdown.
pub fn spawn_cleanup_task(
    store: Arc<Mutex<DiskStore>>,
    cleanup_interval_secs: u64,
) -> JoinHandle<()> {
    let interval = Duration::from_secs(cleanup_interval_secs.max(1));

    tokio::spawn(async move {
        info!(
            "Starting store maintenance task with interval of {} seconds",
            interval.as_secs()
        );

        loop {
            // Sleep for the configured interval
            tokio::time::sleep(interval).await;

            match run_maintenance(store.clone()).await {
                Ok(0) => debug!("Store maintenance: no expired entries found"),
                Ok(removed) => info!("Store maintenance: removed {} expired entries", removed),
                Err(e) => warn!(error = %e, "Store maintenance failed"),
            }
        }
    })
}
