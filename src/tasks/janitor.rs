//! Cache Janitor Task
//!
//! Background task that periodically removes expired entries from a
//! [`LyricsCache`](crate::cache::LyricsCache).

use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::cache::WeakLyricsCache;

/// Spawns the sweep loop for `cache` on `runtime`.
///
/// The first pass runs one `interval` after spawning. Each pass holds the
/// cache's write lock only while purging. The loop exits as soon as `token`
/// is cancelled, or at the first tick after the cache has been dropped.
///
/// # Example
/// ```ignore
/// let token = CancellationToken::new();
/// let handle = spawn_janitor(&Handle::current(), cache.downgrade(), Duration::from_secs(30), token.clone());
/// // Later, during shutdown:
/// token.cancel();
/// handle.await?;
/// ```
pub fn spawn_janitor(
    runtime: &Handle,
    cache: WeakLyricsCache,
    interval: Duration,
    token: CancellationToken,
) -> JoinHandle<()> {
    runtime.spawn(async move {
        info!(
            interval_secs = interval.as_secs(),
            "Starting cache janitor"
        );

        let mut ticker = interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => break,
                _ = ticker.tick() => match cache.purge_expired() {
                    Some(0) => debug!("Janitor found no expired entries"),
                    Some(removed) => info!(removed, "Janitor purged expired entries"),
                    None => {
                        debug!("Cache dropped, janitor exiting");
                        break;
                    }
                },
            }
        }

        info!("Cache janitor stopped");
    })
}
