//! Web discovery: turn an entity name into a candidate URL plus snippets.
//!
//! Discovery runs one search query (`"<name> <qualifier>"`) through a
//! [`SearchProvider`] and condenses the top results into a [`SearchHit`].
//! Every failure is soft: transport errors and empty result sets both come
//! back as [`DiscoveryResult::NotFound`].

mod duckduckgo;

use async_trait::async_trait;
use tracing::{debug, info, instrument, warn};

use heirdesk_shared::{SearchConfig, SearchHit};

pub use duckduckgo::DuckDuckGoSearch;

// ---------------------------------------------------------------------------
// Search boundary
// ---------------------------------------------------------------------------

/// One organic search result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchResult {
    pub url: String,
    pub title: String,
    pub body: String,
}

/// Search failures. Discovery swallows these; they surface only in logs.
#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error("search request failed: {0}")]
    Network(String),

    #[error("search response unreadable: {0}")]
    Parse(String),
}

/// External web search capability.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Run `query`, returning at most `max_results` results in rank order.
    async fn search(
        &self,
        query: &str,
        max_results: usize,
    ) -> Result<Vec<SearchResult>, SearchError>;
}

// ---------------------------------------------------------------------------
// DiscoveryResult
// ---------------------------------------------------------------------------

/// Outcome of web discovery for one entity name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryResult {
    /// At least one result came back; the top URL and all snippets.
    Found(SearchHit),
    /// Nothing usable; the caller has no source left.
    NotFound,
}

// ---------------------------------------------------------------------------
// Main entry point
// ---------------------------------------------------------------------------

/// Search for `entity_name` qualified by the configured domain phrase.
#[instrument(skip_all, fields(entity = %entity_name))]
pub async fn discover(
    provider: &dyn SearchProvider,
    entity_name: &str,
    config: &SearchConfig,
) -> DiscoveryResult {
    let query = build_query(entity_name, &config.qualifier);
    info!(%query, "searching");

    let results = match provider.search(&query, config.max_results).await {
        Ok(results) => results,
        Err(e) => {
            warn!(error = %e, "search failed");
            return DiscoveryResult::NotFound;
        }
    };

    let results: Vec<SearchResult> = results.into_iter().take(config.max_results).collect();
    let Some(top) = results.first() else {
        debug!("search returned no results");
        return DiscoveryResult::NotFound;
    };

    let hit = SearchHit {
        url: top.url.clone(),
        snippets: results.iter().map(render_snippet).collect(),
    };

    info!(url = %hit.url, results = hit.snippets.len(), "discovered source");
    DiscoveryResult::Found(hit)
}

fn build_query(entity_name: &str, qualifier: &str) -> String {
    format!("{} {}", entity_name.trim(), qualifier.trim())
        .trim()
        .to_string()
}

fn render_snippet(result: &SearchResult) -> String {
    format!("- {}: {}", result.title.trim(), result.body.trim())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Provider that records queries and replays a canned response.
    struct ScriptedSearch {
        response: Mutex<Option<Result<Vec<SearchResult>, SearchError>>>,
        queries: Mutex<Vec<String>>,
    }

    impl ScriptedSearch {
        fn new(response: Result<Vec<SearchResult>, SearchError>) -> Self {
            Self {
                response: Mutex::new(Some(response)),
                queries: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl SearchProvider for ScriptedSearch {
        async fn search(
            &self,
            query: &str,
            _max_results: usize,
        ) -> Result<Vec<SearchResult>, SearchError> {
            self.queries.lock().unwrap().push(query.to_string());
            self.response.lock().unwrap().take().unwrap_or(Ok(Vec::new()))
        }
    }

    fn config() -> SearchConfig {
        SearchConfig {
            base_url: "https://html.duckduckgo.com".into(),
            qualifier: "相続手続き".into(),
            max_results: 3,
            timeout: Duration::from_secs(5),
            min_spacing: Duration::ZERO,
        }
    }

    fn result(n: usize) -> SearchResult {
        SearchResult {
            url: format!("https://acme.example/{n}"),
            title: format!("Title {n}"),
            body: format!("Body {n}"),
        }
    }

    #[tokio::test]
    async fn discover_builds_hit_from_top_results() {
        let provider = ScriptedSearch::new(Ok((1..=5).map(result).collect()));

        let DiscoveryResult::Found(hit) = discover(&provider, "Acme Bank", &config()).await else {
            panic!("expected a hit");
        };

        assert_eq!(hit.url, "https://acme.example/1");
        assert_eq!(
            hit.snippets,
            vec!["- Title 1: Body 1", "- Title 2: Body 2", "- Title 3: Body 3"]
        );
        assert_eq!(
            provider.queries.lock().unwrap().as_slice(),
            ["Acme Bank 相続手続き"]
        );
    }

    #[tokio::test]
    async fn discover_empty_results_is_not_found() {
        let provider = ScriptedSearch::new(Ok(Vec::new()));
        let result = discover(&provider, "Acme Bank", &config()).await;
        assert_eq!(result, DiscoveryResult::NotFound);
    }

    #[tokio::test]
    async fn discover_transport_error_is_not_found() {
        let provider = ScriptedSearch::new(Err(SearchError::Network("connection reset".into())));
        let result = discover(&provider, "Acme Bank", &config()).await;
        assert_eq!(result, DiscoveryResult::NotFound);
    }

    #[test]
    fn query_with_blank_qualifier_has_no_trailing_space() {
        assert_eq!(build_query(" Acme Bank ", ""), "Acme Bank");
    }
}
