//! Entity resolution: map a free-text query onto the registry.
//!
//! A registered name is a candidate when it appears verbatim in the raw query,
//! or when the normalized query (stopwords removed, more than one character)
//! is a case-insensitive substring of the name. The resolver never guesses
//! between several candidates.

use heirdesk_shared::Entity;
use tracing::debug;

/// Classification of a query against the registry.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Unique(Entity),
    /// Several names matched; the caller must let the user pick.
    Ambiguous(Vec<Entity>),
    NotFound,
}

/// Resolution plus the query forms it was computed from.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolutionResult {
    /// Trimmed raw query.
    pub query: String,
    /// Query with stopwords removed and whitespace collapsed.
    pub normalized: String,
    pub resolution: Resolution,
}

impl ResolutionResult {
    /// Name to register an unknown query under.
    pub fn prospective_name(&self) -> &str {
        if self.normalized.is_empty() {
            &self.query
        } else {
            &self.normalized
        }
    }
}

/// Resolves queries using a fixed stopword list.
#[derive(Debug, Clone)]
pub struct Resolver {
    /// ASCII-lowercased, longest first.
    stopwords: Vec<String>,
}

impl Resolver {
    pub fn new<I, S>(stopwords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut stopwords: Vec<String> = stopwords
            .into_iter()
            .map(|s| s.as_ref().trim().to_ascii_lowercase())
            .filter(|s| !s.is_empty())
            .collect();
        stopwords.sort_by(|a, b| b.chars().count().cmp(&a.chars().count()).then(a.cmp(b)));
        stopwords.dedup();
        Self { stopwords }
    }

    /// Strip stopwords (ASCII case-insensitive) and collapse whitespace.
    pub fn normalize(&self, query: &str) -> String {
        let mut text = query.to_string();
        for stop in &self.stopwords {
            // ASCII lowercasing keeps byte offsets aligned with `text`.
            while let Some(pos) = text.to_ascii_lowercase().find(stop.as_str()) {
                text.replace_range(pos..pos + stop.len(), "");
            }
        }
        text.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    /// Classify `query` against `entities`.
    pub fn resolve(&self, query: &str, entities: &[Entity]) -> ResolutionResult {
        let query = query.trim().to_string();
        let normalized = self.normalize(&query);

        let resolution = if let Some(exact) = entities.iter().find(|e| e.name == query) {
            Resolution::Unique(exact.clone())
        } else {
            let matches = candidate_indices(&query, &normalized, entities);
            debug!(%query, %normalized, candidates = matches.len(), "resolved query");
            match matches.as_slice() {
                [] => Resolution::NotFound,
                [only] => Resolution::Unique(entities[*only].clone()),
                many => Resolution::Ambiguous(many.iter().map(|&i| entities[i].clone()).collect()),
            }
        };

        ResolutionResult {
            query,
            normalized,
            resolution,
        }
    }
}

/// Registry indices of every candidate, in registry order, without duplicates.
fn candidate_indices(query: &str, normalized: &str, entities: &[Entity]) -> Vec<usize> {
    let mut matches: Vec<usize> = entities
        .iter()
        .enumerate()
        .filter(|(_, e)| !e.name.is_empty() && query.contains(e.name.as_str()))
        .map(|(i, _)| i)
        .collect();

    if normalized.chars().count() > 1 {
        let needle = normalized.to_lowercase();
        for (i, entity) in entities.iter().enumerate() {
            if entity.name.to_lowercase().contains(&needle) && !matches.contains(&i) {
                matches.push(i);
            }
        }
    }

    matches.sort_unstable();
    matches.dedup();
    matches
}
