//! Credential/model rotation.
//!
//! For the current credential every model is tried once in priority order. A
//! credential whose models all fail moves the cursor on (wrapping), and the
//! model list is retried with the next credential. Once every credential has
//! had its turn the call fails with [`ExhaustionError`], so a single call makes
//! at most `credentials × models` attempts.
//!
//! The cursor only ever advances. A later call starts from the credential that
//! last succeeded, which keeps a quota-exhausted key from being hit first on
//! every request.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tracing::{debug, info, instrument, warn};

use crate::{CompletionBackend, CompletionError, Credential};

/// Every credential × model combination failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("completion exhausted after {attempts} attempts{}", last_error_suffix(.last_error))]
pub struct ExhaustionError {
    pub attempts: usize,
    pub last_error: Option<CompletionError>,
}

fn last_error_suffix(last_error: &Option<CompletionError>) -> String {
    last_error
        .as_ref()
        .map(|e| format!(" (last: {e})"))
        .unwrap_or_default()
}

/// Owns the rotation cursor for one pipeline instance.
pub struct Rotator {
    backend: Arc<dyn CompletionBackend>,
    credentials: Vec<Credential>,
    models: Vec<String>,
    cursor: AtomicUsize,
}

impl Rotator {
    pub fn new(
        backend: Arc<dyn CompletionBackend>,
        credentials: Vec<Credential>,
        models: Vec<String>,
    ) -> Self {
        Self {
            backend,
            credentials,
            models,
            cursor: AtomicUsize::new(0),
        }
    }

    /// Index of the credential the next call starts with.
    pub fn cursor(&self) -> usize {
        self.cursor.load(Ordering::SeqCst)
    }

    /// Complete `prompt`, rotating through credentials and models on failure.
    #[instrument(skip_all, fields(prompt_chars = prompt.chars().count()))]
    pub async fn complete(&self, prompt: &str) -> Result<String, ExhaustionError> {
        let total = self.credentials.len();
        let mut attempts = 0;
        let mut last_error = None;

        if total == 0 || self.models.is_empty() {
            warn!(
                credentials = total,
                models = self.models.len(),
                "nothing to rotate through"
            );
            return Err(ExhaustionError {
                attempts,
                last_error,
            });
        }

        for _ in 0..total {
            let index = self.cursor.load(Ordering::SeqCst) % total;
            let credential = &self.credentials[index];

            for model in &self.models {
                attempts += 1;
                debug!(credential = index, %model, attempt = attempts, "completion attempt");

                match self.backend.complete(credential, model, prompt).await {
                    Ok(text) => {
                        info!(credential = index, %model, attempts, "completion succeeded");
                        return Ok(text);
                    }
                    Err(e) => {
                        warn!(credential = index, %model, error = %e, "completion attempt failed");
                        last_error = Some(e);
                    }
                }
            }

            let next = (index + 1) % total;
            self.cursor.store(next, Ordering::SeqCst);
            info!(from = index, to = next, "rotating credential");
        }

        warn!(attempts, "all credentials and models exhausted");
        Err(ExhaustionError {
            attempts,
            last_error,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::sync::Mutex;

    /// Backend that succeeds only for listed (credential, model) pairs.
    #[derive(Default)]
    struct ScriptedBackend {
        succeed: HashSet<(String, String)>,
        calls: Mutex<Vec<(String, String)>>,
    }

    impl ScriptedBackend {
        fn succeeding_on(pairs: &[(&str, &str)]) -> Self {
            Self {
                succeed: pairs
                    .iter()
                    .map(|(c, m)| (c.to_string(), m.to_string()))
                    .collect(),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<(String, String)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl CompletionBackend for ScriptedBackend {
        async fn complete(
            &self,
            credential: &Credential,
            model: &str,
            _prompt: &str,
        ) -> Result<String, CompletionError> {
            let key = (credential.expose().to_string(), model.to_string());
            self.calls.lock().unwrap().push(key.clone());
            if self.succeed.contains(&key) {
                Ok(format!("{}@{}", key.0, key.1))
            } else {
                Err(CompletionError::Http {
                    status: 429,
                    message: "quota".into(),
                })
            }
        }
    }

    fn rotator(backend: Arc<ScriptedBackend>, keys: &[&str], models: &[&str]) -> Rotator {
        Rotator::new(
            backend,
            Credential::from_keys(keys.iter().copied()),
            models.iter().map(|m| m.to_string()).collect(),
        )
    }

    #[tokio::test]
    async fn all_failing_makes_exactly_n_times_m_attempts() {
        let backend = Arc::new(ScriptedBackend::default());
        let r = rotator(backend.clone(), &["k0", "k1", "k2"], &["m0", "m1"]);

        let err = r.complete("prompt").await.unwrap_err();
        assert_eq!(err.attempts, 6);
        assert!(matches!(err.last_error, Some(CompletionError::Http { status: 429, .. })));

        let calls = backend.calls();
        assert_eq!(calls.len(), 6);
        assert_eq!(
            calls[..3],
            [
                ("k0".to_string(), "m0".to_string()),
                ("k0".to_string(), "m1".to_string()),
                ("k1".to_string(), "m0".to_string()),
            ]
        );
        // Cursor went all the way round.
        assert_eq!(r.cursor(), 0);
    }

    #[tokio::test]
    async fn empty_credentials_exhaust_without_calls() {
        let backend = Arc::new(ScriptedBackend::default());
        let r = rotator(backend.clone(), &[], &["m0"]);

        let err = r.complete("prompt").await.unwrap_err();
        assert_eq!(err.attempts, 0);
        assert!(err.last_error.is_none());
        assert!(backend.calls().is_empty());
    }

    #[tokio::test]
    async fn model_fallback_keeps_cursor() {
        let backend = Arc::new(ScriptedBackend::succeeding_on(&[("k0", "m1")]));
        let r = rotator(backend.clone(), &["k0", "k1"], &["m0", "m1"]);

        assert_eq!(r.complete("prompt").await.unwrap(), "k0@m1");
        assert_eq!(r.cursor(), 0);
        assert_eq!(backend.calls().len(), 2);
    }

    #[tokio::test]
    async fn credential_rotation_sticks_for_next_call() {
        let backend = Arc::new(ScriptedBackend::succeeding_on(&[("k1", "m0")]));
        let r = rotator(backend.clone(), &["k0", "k1"], &["m0", "m1"]);

        assert_eq!(r.complete("first").await.unwrap(), "k1@m0");
        assert_eq!(r.cursor(), 1);

        // Second call starts on k1 and succeeds immediately.
        assert_eq!(r.complete("second").await.unwrap(), "k1@m0");
        assert_eq!(backend.calls().len(), 4);
    }

    #[tokio::test]
    async fn exhaustion_message_names_last_error() {
        let backend = Arc::new(ScriptedBackend::default());
        let r = rotator(backend, &["k0"], &["m0"]);
        let err = r.complete("prompt").await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "completion exhausted after 1 attempts (last: HTTP 429: quota)"
        );
    }
}
