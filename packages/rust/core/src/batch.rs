//! Batch refresh of every registered entity.
//!
//! A dispatcher hands entities to a bounded pool of spawned tasks, pausing
//! between dispatches. Results are applied to the [`Registry`](crate::registry::Registry) as they land and
//! the table is checkpointed every `checkpoint_every` processed entities and
//! once more at the end, cancelled or not.

use std::sync::Arc;

use heirdesk_shared::{BatchConfig, Provenance, Result};
use tokio::sync::{Mutex, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::orchestrator::{AcquisitionOutcome, Pipeline, entity_to_persist};

/// Counts for one refresh run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefreshReport {
    /// Entities whose acquisition reached a non-cancelled terminal state.
    pub processed: usize,
    pub live: usize,
    pub fallback: usize,
    pub failed: usize,
    /// Saves made, including the final one.
    pub checkpoints: usize,
    pub cancelled: bool,
}

// ---------------------------------------------------------------------------
// Progress trait
// ---------------------------------------------------------------------------

/// Progress callback for batch refresh.
pub trait RefreshProgress: Send + Sync {
    /// Called once with the number of entities to refresh.
    fn started(&self, total: usize);
    /// Called after each entity's outcome has been applied.
    fn entity_done(&self, name: &str, provenance: Provenance, processed: usize, total: usize);
    /// Called after each save.
    fn checkpoint(&self, processed: usize);
}

/// No-op refresh progress.
pub struct SilentRefreshProgress;

impl RefreshProgress for SilentRefreshProgress {
    fn started(&self, _total: usize) {}
    fn entity_done(&self, _name: &str, _provenance: Provenance, _processed: usize, _total: usize) {}
    fn checkpoint(&self, _processed: usize) {}
}

// ---------------------------------------------------------------------------
// Refresh
// ---------------------------------------------------------------------------

/// Re-acquire every registered entity, ignoring cached facts.
///
/// Cancelling `cancel` stops dispatch and abandons in-flight acquisitions at
/// their next stage boundary; whatever finished is still checkpointed.
#[instrument(skip_all, fields(concurrency = config.concurrency))]
pub async fn refresh_all(
    pipeline: Arc<Pipeline>,
    config: &BatchConfig,
    progress: Arc<dyn RefreshProgress>,
    cancel: CancellationToken,
) -> Result<RefreshReport> {
    let targets = pipeline.registry().snapshot().await;
    let total = targets.len();
    let checkpoint_every = config.checkpoint_every.max(1);
    progress.started(total);
    info!(total, pause_ms = config.pause.as_millis() as u64, "starting refresh");

    let semaphore = Arc::new(Semaphore::new(config.concurrency.max(1)));
    let report = Arc::new(Mutex::new(RefreshReport::default()));
    let mut handles = Vec::new();

    for (index, target) in targets.into_iter().enumerate() {
        let permit = tokio::select! {
            _ = cancel.cancelled() => break,
            permit = semaphore.clone().acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => break,
            },
        };

        if index > 0 && !config.pause.is_zero() {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(config.pause) => {}
            }
        }
        if cancel.is_cancelled() {
            break;
        }

        let pipeline = pipeline.clone();
        let progress = progress.clone();
        let report = report.clone();
        let cancel = cancel.clone();

        handles.push(tokio::spawn(async move {
            let _permit = permit;
            let outcome = pipeline.acquire(&target, &cancel).await;
            if outcome.is_cancelled() {
                return Ok(());
            }

            if let Some(entity) = entity_to_persist(&target, true, &outcome) {
                pipeline.registry().apply(entity).await;
            }

            let processed = {
                let mut report = report.lock().await;
                report.processed += 1;
                match &outcome {
                    AcquisitionOutcome::Done {
                        provenance: Provenance::SnippetFallback,
                        ..
                    } => report.fallback += 1,
                    AcquisitionOutcome::Done { .. } => report.live += 1,
                    AcquisitionOutcome::Failed { .. } => report.failed += 1,
                }
                report.processed
            };
            progress.entity_done(&target.name, outcome.provenance(), processed, total);

            if processed % checkpoint_every == 0 {
                pipeline.registry().checkpoint().await?;
                report.lock().await.checkpoints += 1;
                progress.checkpoint(processed);
            }
            Ok(())
        }));
    }

    let mut first_error = None;
    for handle in handles {
        match handle.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                warn!(error = %e, "checkpoint failed");
                first_error.get_or_insert(e);
            }
            Err(e) => warn!(error = %e, "refresh task panicked"),
        }
    }

    pipeline.registry().checkpoint().await?;
    if let Some(e) = first_error {
        return Err(e);
    }

    let mut report = report.lock().await.clone();
    report.checkpoints += 1;
    report.cancelled = cancel.is_cancelled();
    progress.checkpoint(report.processed);

    info!(
        processed = report.processed,
        live = report.live,
        fallback = report.fallback,
        failed = report.failed,
        cancelled = report.cancelled,
        "refresh finished"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractor::Extractor;
    use crate::orchestrator::PipelineConfig;
    use crate::registry::Registry;
    use crate::testing::{ScriptedBackend, ScriptedFetcher, ScriptedSearch};
    use heirdesk_completion::{Credential, Rotator};
    use heirdesk_fetcher::FetchError;
    use heirdesk_shared::{Entity, FieldKey, SearchConfig};
    use heirdesk_storage::MemoryStore;
    use std::time::Duration;

    const REPLY: &str = r#"{"contact_phone": "0120-000-000", "summary": "ok"}"#;

    fn url(i: usize) -> String {
        format!("https://bank{i}.example/inheritance")
    }

    fn entities(n: usize) -> Vec<Entity> {
        (0..n)
            .map(|i| Entity::seeded(format!("Bank {i}"), Some(url(i).as_str())))
            .collect()
    }

    async fn pipeline(
        store: Arc<MemoryStore>,
        fetcher: ScriptedFetcher,
        search: ScriptedSearch,
    ) -> Arc<Pipeline> {
        let registry = Arc::new(Registry::load(store).await.unwrap());
        let rotator = Rotator::new(
            Arc::new(ScriptedBackend::replying(REPLY)),
            Credential::from_keys(["key-a"]),
            vec!["model-1".into()],
        );
        let config = PipelineConfig {
            search: SearchConfig {
                base_url: "https://search.invalid".into(),
                qualifier: "inheritance".into(),
                max_results: 3,
                timeout: Duration::from_secs(1),
                min_spacing: Duration::ZERO,
            },
            fetch_timeout: Duration::from_secs(1),
            stopwords: Vec::new(),
        };
        Arc::new(Pipeline::new(
            config,
            registry,
            Arc::new(fetcher),
            Arc::new(search),
            Extractor::new(rotator, 1_000),
        ))
    }

    fn batch(concurrency: usize, checkpoint_every: usize) -> BatchConfig {
        BatchConfig {
            concurrency,
            pause: Duration::ZERO,
            checkpoint_every,
        }
    }

    #[tokio::test]
    async fn refreshes_every_entity_and_checkpoints() {
        let store = Arc::new(MemoryStore::new(entities(4)));
        let fetcher = ScriptedFetcher::default()
            .page(&url(0), Ok("page 0"))
            .page(&url(1), Err(FetchError::Timeout))
            .page(&url(2), Ok("page 2"))
            .page(&url(3), Err(FetchError::Timeout));
        let search = ScriptedSearch::default().hit("Bank 1", &url(1), "Bank 1", "0120-000-000");
        let pipeline = pipeline(store.clone(), fetcher, search).await;

        let report = refresh_all(
            pipeline,
            &batch(2, 3),
            Arc::new(SilentRefreshProgress),
            CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(
            report,
            RefreshReport {
                processed: 4,
                live: 2,
                fallback: 1,
                failed: 1,
                checkpoints: 2,
                cancelled: false,
            }
        );
        assert_eq!(store.save_count(), 2);

        let stored = store.snapshot().await;
        assert_eq!(stored.len(), 4);
        assert_eq!(stored[0].provenance, Some(Provenance::Live));
        assert_eq!(stored[1].provenance, Some(Provenance::SnippetFallback));
        assert_eq!(stored[2].fields.get(FieldKey::ContactPhone), "0120-000-000");
        assert_eq!(stored[3].provenance, Some(Provenance::Failed));
    }

    #[tokio::test]
    async fn cancel_mid_batch_leaves_store_consistent() {
        let cancel = CancellationToken::new();
        let mut fetcher = ScriptedFetcher::default().cancel_after(2, cancel.clone());
        for i in 0..5 {
            fetcher = fetcher.page(&url(i), Ok("page"));
        }
        let store = Arc::new(MemoryStore::new(entities(5)));
        let pipeline = pipeline(store.clone(), fetcher, ScriptedSearch::default()).await;

        let report = refresh_all(
            pipeline,
            &batch(1, 1),
            Arc::new(SilentRefreshProgress),
            cancel,
        )
        .await
        .unwrap();

        assert!(report.cancelled);
        assert_eq!(report.processed, 2);
        assert_eq!(report.checkpoints, 3);
        assert_eq!(store.save_count(), 3);

        let stored = store.snapshot().await;
        let names: Vec<&str> = stored.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["Bank 0", "Bank 1", "Bank 2", "Bank 3", "Bank 4"]);
        assert!(stored[..2].iter().all(|e| e.provenance == Some(Provenance::Live)));
        assert!(stored[2..].iter().all(|e| e.provenance.is_none()));
    }

    #[tokio::test]
    async fn cancelled_before_start_still_saves_once() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let store = Arc::new(MemoryStore::new(entities(2)));
        let pipeline = pipeline(store.clone(), ScriptedFetcher::default(), ScriptedSearch::default()).await;

        let report = refresh_all(pipeline, &batch(1, 1), Arc::new(SilentRefreshProgress), cancel)
            .await
            .unwrap();

        assert_eq!(report.processed, 0);
        assert_eq!(report.checkpoints, 1);
        assert_eq!(store.snapshot().await, entities(2));
    }
}
