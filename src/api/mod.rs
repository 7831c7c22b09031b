//! API Module
//!
//! HTTP handlers and routing for the lyrics service.
//!
//! # Endpoints
//! - `GET /health` - Health check endpoint
//! - `GET /v1/lyrics?query=` - Cached lyrics lookup
//! - `GET /v1/cache` - Live persistent cache records
//! - `GET /v1/stats` - In-memory cache statistics

pub mod handlers;
pub mod routes;

pub use handlers::*;
pub use routes::create_router;
