//! HTTP content fetcher.
//!
//! One GET per call, bounded by the client's page-load timeout and by the
//! caller's whole-operation timeout. The body is rendered to visible text with
//! `heirdesk-text`; failures are classified into [`FetchError`] variants.

use std::net::IpAddr;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode, header};
use tracing::{debug, instrument, warn};
use url::Url;

use heirdesk_shared::{FetchConfig, HeirdeskError, HostThrottle, Result};

use crate::{ContentFetcher, FetchError};

/// User-Agent string for fetch requests.
const USER_AGENT: &str = concat!("heirdesk/", env!("CARGO_PKG_VERSION"));

/// Statuses that mean the site is refusing automated access.
const BLOCKING_STATUSES: [StatusCode; 4] = [
    StatusCode::UNAUTHORIZED,
    StatusCode::FORBIDDEN,
    StatusCode::TOO_MANY_REQUESTS,
    StatusCode::UNAVAILABLE_FOR_LEGAL_REASONS,
];

// ---------------------------------------------------------------------------
// HttpFetcher
// ---------------------------------------------------------------------------

/// reqwest-backed [`ContentFetcher`].
pub struct HttpFetcher {
    client: Client,
    throttle: HostThrottle,
    /// Allow localhost/private IPs (for tests against mock servers).
    allow_localhost: bool,
}

impl HttpFetcher {
    /// Create a fetcher from runtime fetch settings.
    pub fn new(config: &FetchConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(5))
            .timeout(config.page_load_timeout)
            .build()
            .map_err(|e| HeirdeskError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            throttle: HostThrottle::new(config.min_host_spacing),
            allow_localhost: false,
        })
    }

    /// Allow fetching localhost/private IPs (for tests).
    #[cfg(test)]
    pub fn allow_localhost(mut self) -> Self {
        self.allow_localhost = true;
        self
    }

    async fn fetch_text(&self, url: &Url) -> std::result::Result<String, FetchError> {
        debug!("fetching page");

        let response = self
            .client
            .get(url.as_str())
            .send()
            .await
            .map_err(|e| classify_transport(url, &e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(classify_status(url, status));
        }

        if let Some(content_type) = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
        {
            if !is_textual(content_type) {
                return Err(FetchError::Blocked {
                    reason: format!("unsupported content type {content_type}"),
                });
            }
        }

        let final_url = response.url().clone();
        let body = response
            .text()
            .await
            .map_err(|e| classify_transport(url, &e))?;

        let page = heirdesk_text::render(&body, Some(&final_url))
            .map_err(|e| FetchError::Network(format!("{url}: {e}")))?;

        // A script shell with no readable content is as good as a refusal.
        if page.is_blank() {
            return Err(FetchError::Blocked {
                reason: "page rendered no visible text".into(),
            });
        }

        debug!(
            body_len = body.len(),
            text_chars = page.text.chars().count(),
            "page fetched"
        );
        Ok(page.text)
    }
}

#[async_trait]
impl ContentFetcher for HttpFetcher {
    #[instrument(skip_all, fields(url = %url))]
    async fn fetch(&self, url: &str, timeout: Duration) -> std::result::Result<String, FetchError> {
        let parsed = Url::parse(url)
            .map_err(|e| FetchError::Network(format!("{url}: invalid URL: {e}")))?;

        if !self.allow_localhost && is_ssrf_target(&parsed) {
            warn!("SSRF protection: blocked");
            return Err(FetchError::Blocked {
                reason: "non-public or non-HTTP target".into(),
            });
        }

        if let Some(host) = parsed.host_str() {
            self.throttle.reserve(host).await;
        }

        match tokio::time::timeout(timeout, self.fetch_text(&parsed)).await {
            Ok(result) => {
                if let Err(e) = &result {
                    warn!(error = %e, "fetch failed");
                }
                result
            }
            Err(_) => {
                warn!(timeout_ms = timeout.as_millis() as u64, "fetch timed out");
                Err(FetchError::Timeout)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Error classification
// ---------------------------------------------------------------------------

fn classify_status(url: &Url, status: StatusCode) -> FetchError {
    if BLOCKING_STATUSES.contains(&status) {
        FetchError::Blocked {
            reason: format!("HTTP {status}"),
        }
    } else {
        FetchError::Network(format!("{url}: HTTP {status}"))
    }
}

fn classify_transport(url: &Url, err: &reqwest::Error) -> FetchError {
    if err.is_timeout() {
        FetchError::Timeout
    } else {
        FetchError::Network(format!("{url}: {err}"))
    }
}

fn is_textual(content_type: &str) -> bool {
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase();
    mime.is_empty() || mime == "text/html" || mime == "application/xhtml+xml" || mime == "text/plain"
}

// ---------------------------------------------------------------------------
// SSRF protection
// ---------------------------------------------------------------------------

/// Check if a URL targets a potentially dangerous resource.
fn is_ssrf_target(url: &Url) -> bool {
    match url.scheme() {
        "http" | "https" => {}
        _ => return true,
    }

    match url.host() {
        Some(url::Host::Ipv4(v4)) => is_private_ip(&IpAddr::V4(v4)),
        Some(url::Host::Ipv6(v6)) => is_private_ip(&IpAddr::V6(v6)),
        Some(url::Host::Domain(host)) => {
            host == "localhost" || host.ends_with(".local") || host.ends_with(".internal")
        }
        None => true,
    }
}

/// Check if an IP is in a private/reserved range.
fn is_private_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_loopback()
                || v4.is_private()
                || v4.is_link_local()
                || v4.is_broadcast()
                || v4.is_unspecified()
                // 100.64.0.0/10 (Carrier-grade NAT)
                || (v4.octets()[0] == 100 && (v4.octets()[1] & 0xC0) == 64)
        }
        IpAddr::V6(v6) => {
            v6.is_loopback()
                || v6.is_unspecified()
                // fc00::/7 unique local
                || (v6.segments()[0] & 0xfe00) == 0xfc00
                // fe80::/10 link local
                || (v6.segments()[0] & 0xffc0) == 0xfe80
        }
    }
}
