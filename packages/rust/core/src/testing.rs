//! Scripted boundary implementations for pipeline tests.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use heirdesk_completion::{CompletionBackend, CompletionError, Credential};
use heirdesk_discovery::{SearchError, SearchProvider, SearchResult};
use heirdesk_fetcher::{ContentFetcher, FetchError};
use tokio_util::sync::CancellationToken;

type ReplyFn = dyn Fn(&str) -> Result<String, CompletionError> + Send + Sync;

/// Completion backend answering every prompt through a closure.
pub(crate) struct ScriptedBackend {
    reply: Box<ReplyFn>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedBackend {
    pub fn with(reply: impl Fn(&str) -> Result<String, CompletionError> + Send + Sync + 'static) -> Self {
        Self {
            reply: Box::new(reply),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn replying(text: &str) -> Self {
        let text = text.to_string();
        Self::with(move |_| Ok(text.clone()))
    }

    pub fn failing() -> Self {
        Self::with(|_| {
            Err(CompletionError::Http {
                status: 503,
                message: "overloaded".into(),
            })
        })
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompletionBackend for ScriptedBackend {
    async fn complete(
        &self,
        _credential: &Credential,
        _model: &str,
        prompt: &str,
    ) -> Result<String, CompletionError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        (self.reply)(prompt)
    }
}

/// Fetcher serving canned results per URL; unknown URLs are network errors.
#[derive(Default)]
pub(crate) struct ScriptedFetcher {
    pages: HashMap<String, Result<String, FetchError>>,
    calls: Mutex<Vec<String>>,
    cancel_after: Option<(usize, CancellationToken)>,
}

impl ScriptedFetcher {
    pub fn page(mut self, url: &str, result: Result<&str, FetchError>) -> Self {
        self.pages
            .insert(url.to_string(), result.map(str::to_string));
        self
    }

    /// Cancel `token` once `calls` fetches have been made.
    pub fn cancel_after(mut self, calls: usize, token: CancellationToken) -> Self {
        self.cancel_after = Some((calls, token));
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ContentFetcher for ScriptedFetcher {
    async fn fetch(&self, url: &str, _timeout: Duration) -> Result<String, FetchError> {
        let made = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(url.to_string());
            calls.len()
        };
        if let Some((limit, token)) = &self.cancel_after {
            if made >= *limit {
                token.cancel();
            }
        }
        self.pages
            .get(url)
            .cloned()
            .unwrap_or_else(|| Err(FetchError::Network(format!("{url}: unscripted"))))
    }
}

/// Search provider answering queries that mention a scripted entity name.
#[derive(Default)]
pub(crate) struct ScriptedSearch {
    results: Vec<(String, Vec<SearchResult>)>,
    queries: Mutex<Vec<String>>,
}

impl ScriptedSearch {
    pub fn hit(mut self, name: &str, url: &str, title: &str, body: &str) -> Self {
        let result = SearchResult {
            url: url.to_string(),
            title: title.to_string(),
            body: body.to_string(),
        };
        match self.results.iter_mut().find(|(n, _)| n == name) {
            Some((_, results)) => results.push(result),
            None => self.results.push((name.to_string(), vec![result])),
        }
        self
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl SearchProvider for ScriptedSearch {
    async fn search(
        &self,
        query: &str,
        max_results: usize,
    ) -> Result<Vec<SearchResult>, SearchError> {
        self.queries.lock().unwrap().push(query.to_string());
        Ok(self
            .results
            .iter()
            .find(|(name, _)| query.contains(name.as_str()))
            .map(|(_, results)| results.iter().take(max_results).cloned().collect())
            .unwrap_or_default())
    }
}
