//! Completion boundary and credential/model rotation.
//!
//! - [`CompletionBackend`]: "given a credential, a model and a prompt, return text"
//! - [`GeminiBackend`]: Generative Language REST implementation
//! - [`Rotator`]: exhausts the credential × model matrix before giving up

mod credential;
mod gemini;
mod rotator;

use async_trait::async_trait;

pub use credential::Credential;
pub use gemini::GeminiBackend;
pub use rotator::{ExhaustionError, Rotator};

/// A single failed completion attempt.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CompletionError {
    /// The API answered with a non-success status (quota, bad model, auth).
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("transport error: {0}")]
    Network(String),

    /// The API answered but produced no text (safety block, empty candidates).
    #[error("empty completion")]
    Empty,

    #[error("malformed response: {0}")]
    Decode(String),
}

/// Text completion capability.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    async fn complete(
        &self,
        credential: &Credential,
        model: &str,
        prompt: &str,
    ) -> Result<String, CompletionError>;
}
