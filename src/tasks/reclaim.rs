//! Expired Record Reclaimer
//!
//! Bounded work queue that deletes expired persistent records off the
//! request path. A `get` that finds a stale record submits its key and
//! returns immediately; one worker task per backend performs the deletes.
//!
//! Until the worker gets to a key, the record is logically expired but still
//! physically present. Readers treat it as a miss either way.

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::Result;

/// Queue depth used by the persistent backends.
pub const RECLAIM_QUEUE_CAPACITY: usize = 256;

// == Record Deleter ==
/// Store-specific deletion of a single record.
#[async_trait]
pub trait RecordDeleter: Send + Sync + 'static {
    /// Deletes the record stored under the normalized `key`.
    async fn delete_record(&self, key: &str) -> Result<()>;
}

// == Reclaimer ==
/// Handle to a running reclaim worker.
#[derive(Debug)]
pub struct Reclaimer {
    tx: mpsc::Sender<String>,
    handle: JoinHandle<()>,
}

impl Reclaimer {
    /// Spawns the worker on the current runtime.
    ///
    /// Every delete is bounded by `deadline`. Failures are logged and dropped.
    pub fn spawn<D: RecordDeleter>(deleter: D, capacity: usize, deadline: Duration) -> Self {
        let (tx, mut rx) = mpsc::channel::<String>(capacity.max(1));

        let handle = tokio::spawn(async move {
            while let Some(key) = rx.recv().await {
                match tokio::time::timeout(deadline, deleter.delete_record(&key)).await {
                    Ok(Ok(())) => debug!(key = %key, "Reclaimed expired record"),
                    Ok(Err(e)) => warn!(key = %key, error = %e, "Failed to reclaim expired record"),
                    Err(_) => warn!(key = %key, "Timed out reclaiming expired record"),
                }
            }
        });

        Self { tx, handle }
    }

    /// Queues `key` for deletion without waiting.
    ///
    /// Returns `false` when the queue is full or the worker is gone; the
    /// record is then left for a later read or for the store itself.
    pub fn submit(&self, key: String) -> bool {
        match self.tx.try_send(key) {
            Ok(()) => true,
            Err(TrySendError::Full(key)) => {
                debug!(key = %key, "Reclaim queue full, skipping delete");
                false
            }
            Err(TrySendError::Closed(key)) => {
                debug!(key = %key, "Reclaim worker stopped, skipping delete");
                false
            }
        }
    }

    /// Closes the queue and waits for the worker to drain it.
    pub async fn shutdown(self) {
        let Self { tx, handle } = self;
        drop(tx);
        if let Err(e) = handle.await {
            warn!(error = %e, "Reclaim worker did not exit cleanly");
        }
    }
}
