//! Background Tasks Module
//!
//! Contains background tasks that run alongside the caches.
//!
//! # Tasks
//! - Janitor: periodically purges expired in-memory entries
//! - Reclaimer: deletes expired persistent records found on read

mod janitor;
mod reclaim;

pub use janitor::spawn_janitor;
pub use reclaim::{Reclaimer, RecordDeleter, RECLAIM_QUEUE_CAPACITY};
