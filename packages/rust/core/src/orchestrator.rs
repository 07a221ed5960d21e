//! Acquisition orchestrator: resolve, then fetch, fall back, or fail.
//!
//! Acquisition is an explicit state machine stepped in a loop:
//!
//! ```text
//! NeedsFetch ──url──▶ Fetching ──ok──▶ Extracted
//!     │                  │
//!     │ no url           │ fetch or extraction failed
//!     ▼                  ▼
//! Discovering ◀──────────┘ (no hit yet)
//!     │ hit, nothing fetched ─▶ Fetching
//!     │ hit, already fetched  ─▶ SnippetExtracting ──ok──▶ Extracted
//!     ▼                                 │
//! Failed(NoSourceAvailable)             └──▶ Failed(ExtractionFailed)
//! ```
//!
//! Each query makes at most one discovery, one live fetch and two extractions.
//! Soft failures along the way are collected as causes; only the terminal
//! state is reported.

use std::sync::Arc;
use std::time::Duration;

use heirdesk_discovery::{DiscoveryResult, SearchProvider, discover};
use heirdesk_fetcher::{ContentFetcher, FetchError};
use heirdesk_shared::{
    AppConfig, Entity, FetchConfig, LastUpdated, Provenance, Result, SearchConfig, SearchHit,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::extractor::{ExtractError, Extractor, Mode, Record};
use crate::registry::Registry;
use crate::resolver::{Resolution, Resolver};

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// Why an acquisition produced nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ErrorKind {
    #[error("no source available")]
    NoSourceAvailable,
    #[error("extraction failed")]
    ExtractionFailed,
    #[error("cancelled")]
    Cancelled,
}

/// A soft failure that moved the state machine along instead of ending it.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SoftFailure {
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),
    #[error("extraction failed: {0}")]
    Extract(#[from] ExtractError),
    #[error("extraction returned none of the expected keys")]
    EmptyRecord,
    #[error("discovery found no results")]
    NotDiscovered,
}

/// Terminal result of one acquisition.
#[derive(Debug, Clone, PartialEq)]
pub enum AcquisitionOutcome {
    /// Facts are available; `entity` carries them with provenance and time.
    Done {
        entity: Entity,
        provenance: Provenance,
    },
    Failed {
        entity: String,
        error: ErrorKind,
        causes: Vec<SoftFailure>,
    },
}

impl AcquisitionOutcome {
    pub fn entity_name(&self) -> &str {
        match self {
            Self::Done { entity, .. } => &entity.name,
            Self::Failed { entity, .. } => entity,
        }
    }

    pub fn provenance(&self) -> Provenance {
        match self {
            Self::Done { provenance, .. } => *provenance,
            Self::Failed { .. } => Provenance::Failed,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(
            self,
            Self::Failed {
                error: ErrorKind::Cancelled,
                ..
            }
        )
    }
}

/// Result of answering a free-text query.
#[derive(Debug, Clone, PartialEq)]
pub enum Answer {
    /// Several registered names matched; nothing was acquired.
    Ambiguous {
        normalized: String,
        candidates: Vec<Entity>,
    },
    Outcome(AcquisitionOutcome),
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// Settings the pipeline needs beyond its collaborators.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub search: SearchConfig,
    /// Whole-operation bound for one live fetch.
    pub fetch_timeout: Duration,
    pub stopwords: Vec<String>,
}

impl From<&AppConfig> for PipelineConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            search: SearchConfig::from(config),
            fetch_timeout: FetchConfig::from(config).operation_timeout,
            stopwords: config.resolver.stopwords.clone(),
        }
    }
}

#[derive(Debug)]
enum Stage {
    NeedsFetch,
    Fetching { url: String },
    Discovering,
    SnippetExtracting,
    Extracted { record: Record, provenance: Provenance },
    Failed(ErrorKind),
}

impl Stage {
    fn name(&self) -> &'static str {
        match self {
            Self::NeedsFetch => "needs_fetch",
            Self::Fetching { .. } => "fetching",
            Self::Discovering => "discovering",
            Self::SnippetExtracting => "snippet_extracting",
            Self::Extracted { .. } => "extracted",
            Self::Failed(_) => "failed",
        }
    }

    fn is_terminal(&self) -> bool {
        matches!(self, Self::Extracted { .. } | Self::Failed(_))
    }
}

/// Resolution, acquisition and persistence over shared collaborators.
pub struct Pipeline {
    resolver: Resolver,
    fetcher: Arc<dyn ContentFetcher>,
    search: Arc<dyn SearchProvider>,
    extractor: Extractor,
    registry: Arc<Registry>,
    search_config: SearchConfig,
    fetch_timeout: Duration,
}

impl Pipeline {
    pub fn new(
        config: PipelineConfig,
        registry: Arc<Registry>,
        fetcher: Arc<dyn ContentFetcher>,
        search: Arc<dyn SearchProvider>,
        extractor: Extractor,
    ) -> Self {
        Self {
            resolver: Resolver::new(&config.stopwords),
            fetcher,
            search,
            extractor,
            registry,
            search_config: config.search,
            fetch_timeout: config.fetch_timeout,
        }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn resolver(&self) -> &Resolver {
        &self.resolver
    }

    /// Answer a free-text query: resolve it, serve cached facts when the
    /// entity has them, otherwise acquire and persist.
    #[instrument(skip_all, fields(query = %query))]
    pub async fn answer(&self, query: &str, cancel: &CancellationToken) -> Result<Answer> {
        let entities = self.registry.snapshot().await;
        let resolved = self.resolver.resolve(query, &entities);

        let (target, registered) = match resolved.resolution {
            Resolution::Ambiguous(candidates) => {
                info!(candidates = candidates.len(), "query is ambiguous");
                return Ok(Answer::Ambiguous {
                    normalized: resolved.normalized,
                    candidates,
                });
            }
            Resolution::Unique(entity) if entity.has_cached_facts() => {
                info!(entity = %entity.name, "cache hit");
                return Ok(Answer::Outcome(AcquisitionOutcome::Done {
                    entity,
                    provenance: Provenance::Cached,
                }));
            }
            Resolution::Unique(entity) => (entity, true),
            Resolution::NotFound => {
                let name = resolved.prospective_name().to_string();
                info!(entity = %name, "unregistered entity, acquiring");
                (Entity::seeded(name, None), false)
            }
        };

        let outcome = self.acquire(&target, cancel).await;
        if let Some(entity) = entity_to_persist(&target, registered, &outcome) {
            self.registry.commit(entity).await?;
        }
        Ok(Answer::Outcome(outcome))
    }

    /// Acquire fresh facts for `target`, ignoring any cached ones.
    #[instrument(skip_all, fields(entity = %target.name))]
    pub async fn acquire(&self, target: &Entity, cancel: &CancellationToken) -> AcquisitionOutcome {
        let name = target.name.as_str();
        let mut causes: Vec<SoftFailure> = Vec::new();
        let mut hit: Option<SearchHit> = None;
        let mut fetched = false;
        let mut stage = Stage::NeedsFetch;

        loop {
            if !stage.is_terminal() && cancel.is_cancelled() {
                info!(entity = name, stage = stage.name(), "acquisition cancelled");
                stage = Stage::Failed(ErrorKind::Cancelled);
            }
            debug!(entity = name, stage = stage.name(), "stage");

            stage = match stage {
                Stage::NeedsFetch => match &target.source_url {
                    Some(url) => Stage::Fetching { url: url.clone() },
                    None => Stage::Discovering,
                },

                Stage::Fetching { url } => {
                    fetched = true;
                    let primary = match self.fetcher.fetch(&url, self.fetch_timeout).await {
                        Ok(text) => self.extract_usable(&text, Mode::Rich).await,
                        Err(e) => Err(SoftFailure::Fetch(e)),
                    };
                    match primary {
                        Ok(record) => Stage::Extracted {
                            record,
                            provenance: Provenance::Live,
                        },
                        Err(cause) => {
                            warn!(entity = name, %url, cause = %cause, "primary path failed");
                            causes.push(cause);
                            if hit.is_some() {
                                Stage::SnippetExtracting
                            } else {
                                Stage::Discovering
                            }
                        }
                    }
                }

                Stage::Discovering => {
                    match discover(self.search.as_ref(), name, &self.search_config).await {
                        DiscoveryResult::Found(found) => {
                            let next = if fetched {
                                Stage::SnippetExtracting
                            } else {
                                Stage::Fetching {
                                    url: found.url.clone(),
                                }
                            };
                            hit = Some(found);
                            next
                        }
                        DiscoveryResult::NotFound => {
                            causes.push(SoftFailure::NotDiscovered);
                            Stage::Failed(ErrorKind::NoSourceAvailable)
                        }
                    }
                }

                Stage::SnippetExtracting => {
                    let corpus = hit.as_ref().map(SearchHit::corpus).unwrap_or_default();
                    match self.extract_usable(&corpus, Mode::Degraded).await {
                        Ok(record) => Stage::Extracted {
                            record,
                            provenance: Provenance::SnippetFallback,
                        },
                        Err(cause) => {
                            warn!(entity = name, cause = %cause, "snippet fallback failed");
                            causes.push(cause);
                            Stage::Failed(ErrorKind::ExtractionFailed)
                        }
                    }
                }

                Stage::Extracted { record, provenance } => {
                    let discovered_url = hit.map(|h| h.url);
                    let entity = merge_record(target, record, provenance, discovered_url);
                    info!(entity = name, %provenance, "acquisition done");
                    return AcquisitionOutcome::Done { entity, provenance };
                }

                Stage::Failed(error) => {
                    warn!(entity = name, %error, causes = causes.len(), "acquisition failed");
                    return AcquisitionOutcome::Failed {
                        entity: name.to_string(),
                        error,
                        causes,
                    };
                }
            };
        }
    }

    /// Extraction that also rejects records with no recognised keys.
    async fn extract_usable(&self, source: &str, mode: Mode) -> std::result::Result<Record, SoftFailure> {
        let record = self.extractor.extract(source, mode).await?;
        if record.is_empty() {
            return Err(SoftFailure::EmptyRecord);
        }
        Ok(record)
    }
}

/// Build the stored entity from a successful extraction.
///
/// A registered URL is kept; a discovered one is recorded only when none was
/// registered.
fn merge_record(
    target: &Entity,
    record: Record,
    provenance: Provenance,
    discovered_url: Option<String>,
) -> Entity {
    Entity {
        name: target.name.clone(),
        source_url: target.source_url.clone().or(discovered_url),
        fields: record.fields,
        summary: record.summary,
        provenance: Some(provenance),
        last_updated: LastUpdated::now(),
    }
}

/// What, if anything, an outcome writes back to the registry.
///
/// Cancelled runs write nothing. Other failures mark a registered entity as
/// failed and leave its facts alone; unregistered names are not recorded.
pub(crate) fn entity_to_persist(
    target: &Entity,
    registered: bool,
    outcome: &AcquisitionOutcome,
) -> Option<Entity> {
    match outcome {
        AcquisitionOutcome::Done { entity, .. } => Some(entity.clone()),
        AcquisitionOutcome::Failed {
            error: ErrorKind::Cancelled,
            ..
        } => None,
        AcquisitionOutcome::Failed { .. } if registered => {
            let mut failed = target.clone();
            failed.provenance = Some(Provenance::Failed);
            failed.last_updated = LastUpdated::now();
            Some(failed)
        }
        AcquisitionOutcome::Failed { .. } => None,
    }
}
