//! Lyrics Cache - lyrics lookup service with layered caching
//!
//! Fronts an expensive lyrics lookup with a TTL in-memory cache and an
//! optional persistent cache backed by Redis or Postgres.

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod models;
pub mod persistent;
pub mod source;
pub mod tasks;

pub use api::AppState;
pub use cache::LyricsCache;
pub use config::Config;
pub use persistent::{CacheService, PersistentCache};
