//! DuckDuckGo HTML endpoint search provider.
//!
//! Uses the JavaScript-free `/html/` results page and scrapes organic result
//! blocks. Result links point at DuckDuckGo's redirector (`/l/?uddg=<target>`)
//! and are unwrapped to the real target URL.

use async_trait::async_trait;
use reqwest::Client;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, instrument};
use url::Url;

use heirdesk_shared::{HeirdeskError, HostThrottle, Result, SearchConfig};

use crate::{SearchError, SearchProvider, SearchResult};

/// User-Agent string for search requests.
const USER_AGENT: &str = concat!("heirdesk/", env!("CARGO_PKG_VERSION"));

/// [`SearchProvider`] backed by `html.duckduckgo.com`.
///
/// Requests from every caller sharing one instance are spaced by
/// `min_spacing`, so a worker pool cannot burst the search host.
pub struct DuckDuckGoSearch {
    client: Client,
    endpoint: String,
    host: String,
    throttle: HostThrottle,
}

impl DuckDuckGoSearch {
    pub fn new(config: &SearchConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(3))
            .timeout(config.timeout)
            .build()
            .map_err(|e| HeirdeskError::Network(format!("failed to build HTTP client: {e}")))?;

        let endpoint = format!("{}/html/", config.base_url.trim_end_matches('/'));
        let host = Url::parse(&endpoint)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
            .ok_or_else(|| HeirdeskError::config(format!("invalid search base URL: {}", config.base_url)))?;

        Ok(Self {
            client,
            endpoint,
            host,
            throttle: HostThrottle::new(config.min_spacing),
        })
    }
}

#[async_trait]
impl SearchProvider for DuckDuckGoSearch {
    #[instrument(skip_all, fields(query = %query))]
    async fn search(
        &self,
        query: &str,
        max_results: usize,
    ) -> std::result::Result<Vec<SearchResult>, SearchError> {
        self.throttle.reserve(&self.host).await;

        let response = self
            .client
            .get(&self.endpoint)
            .query(&[("q", query)])
            .send()
            .await
            .map_err(|e| SearchError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SearchError::Network(format!("HTTP {status}")));
        }

        let body = response
            .text()
            .await
            .map_err(|e| SearchError::Network(format!("failed to read body: {e}")))?;

        let mut results = parse_results(&body)?;
        results.truncate(max_results);
        debug!(count = results.len(), "search results parsed");
        Ok(results)
    }
}

// ---------------------------------------------------------------------------
// Result page parsing
// ---------------------------------------------------------------------------

fn parse_results(html: &str) -> std::result::Result<Vec<SearchResult>, SearchError> {
    let doc = Html::parse_document(html);
    let block_sel = selector("div.result")?;
    let link_sel = selector("a.result__a")?;
    let snippet_sel = selector(".result__snippet")?;

    let results = doc
        .select(&block_sel)
        .filter(|block| !is_ad(block))
        .filter_map(|block| {
            let link = block.select(&link_sel).next()?;
            let url = resolve_result_url(link.value().attr("href")?)?;
            let title = collapse_text(&link);
            let body = block
                .select(&snippet_sel)
                .next()
                .map(|s| collapse_text(&s))
                .unwrap_or_default();
            Some(SearchResult { url, title, body })
        })
        .collect();

    Ok(results)
}

fn selector(css: &str) -> std::result::Result<Selector, SearchError> {
    Selector::parse(css).map_err(|e| SearchError::Parse(format!("bad selector {css}: {e}")))
}

fn is_ad(block: &ElementRef) -> bool {
    block.value().classes().any(|c| c == "result--ad")
}

fn collapse_text(el: &ElementRef) -> String {
    el.text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Unwrap DuckDuckGo's redirector and keep only http(s) targets.
fn resolve_result_url(href: &str) -> Option<String> {
    let absolute = if href.starts_with("//") {
        format!("https:{href}")
    } else if href.starts_with('/') {
        format!("https://duckduckgo.com{href}")
    } else {
        href.to_string()
    };

    let parsed = Url::parse(&absolute).ok()?;
    let target = if parsed.path() == "/l/" {
        let (_, uddg) = parsed.query_pairs().find(|(k, _)| k == "uddg")?;
        Url::parse(&uddg).ok()?
    } else {
        parsed
    };

    matches!(target.scheme(), "http" | "https").then(|| target.to_string())
}
