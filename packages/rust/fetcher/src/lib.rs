//! Content fetcher boundary: "fetch this URL and return its visible text".
//!
//! This crate provides:
//! - [`ContentFetcher`]: the capability the acquisition pipeline consumes
//! - [`FetchError`]: classified soft failures (timeout, blocked, network)
//! - [`HttpFetcher`]: reqwest-backed implementation with SSRF protection

mod http;

use std::time::Duration;

use async_trait::async_trait;

pub use http::HttpFetcher;

/// Why a fetch produced no usable text.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    /// The page did not finish loading within the allowed time.
    #[error("fetch timed out")]
    Timeout,

    /// The target refused us or served nothing readable.
    #[error("blocked: {reason}")]
    Blocked { reason: String },

    /// Transport failure or an unexpected HTTP status.
    #[error("network error: {0}")]
    Network(String),
}

/// Renders a URL to plain visible text.
#[async_trait]
pub trait ContentFetcher: Send + Sync {
    /// Fetch `url`, giving up after `timeout`. One attempt, no retry.
    async fn fetch(&self, url: &str, timeout: Duration) -> Result<String, FetchError>;
}
