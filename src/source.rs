//! Lyrics Source Module
//!
//! The expensive lookup the caches sit in front of.

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::error::ApiError;

/// Deadline for a single upstream lookup
pub const UPSTREAM_TIMEOUT: Duration = Duration::from_secs(30);

// == Lyrics ==
/// Result of a successful lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lyrics {
    /// The lyrics text
    pub text: String,
    /// Where the text was fetched from, when known
    pub source_ref: Option<String>,
}

// == Lyrics Source ==
/// Performs the uncached lookup of lyrics for a free-text query.
#[async_trait]
pub trait LyricsSource: Send + Sync {
    async fn fetch(&self, query: &str) -> Result<Lyrics, ApiError>;
}

// == Upstream Source ==
/// Fetches lyrics from an HTTP endpoint answering `GET <url>?query=<q>` with
/// the lyrics as a plain-text body.
#[derive(Debug, Clone)]
pub struct UpstreamSource {
    client: reqwest::Client,
    url: String,
}

impl UpstreamSource {
    pub fn new(url: impl Into<String>) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .timeout(UPSTREAM_TIMEOUT)
            .build()
            .map_err(|e| ApiError::Internal(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl LyricsSource for UpstreamSource {
    async fn fetch(&self, query: &str) -> Result<Lyrics, ApiError> {
        let response = self
            .client
            .get(&self.url)
            .query(&[("query", query)])
            .send()
            .await
            .map_err(|e| ApiError::Upstream(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::Upstream(format!(
                "no lyrics found for '{query}' (upstream status {status})"
            )));
        }

        let source_ref = response.url().to_string();
        let text = response
            .text()
            .await
            .map_err(|e| ApiError::Upstream(e.to_string()))?;

        if text.trim().is_empty() {
            return Err(ApiError::Upstream(format!("no lyrics found for '{query}'")));
        }

        debug!(query = %query, bytes = text.len(), "Fetched lyrics from upstream");
        Ok(Lyrics {
            text,
            source_ref: Some(source_ref),
        })
    }
}
