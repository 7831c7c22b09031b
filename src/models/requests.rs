//! Request DTOs for the lyrics API
//!
//! Defines the structure of incoming query strings.

use serde::Deserialize;

/// Query string of `GET /v1/lyrics`
///
/// # Fields
/// - `query`: Free-text song lookup, e.g. "artist - title"
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LyricsQuery {
    /// The lookup text
    #[serde(default)]
    pub query: String,
}

impl LyricsQuery {
    /// Validates the request data
    ///
    /// Returns an error message if validation fails, None if valid.
    pub fn validate(&self) -> Option<String> {
        if self.query.trim().is_empty() {
            return Some("query parameter is required".to_string());
        }
        None
    }
}
