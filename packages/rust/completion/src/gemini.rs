//! Generative Language API (`generateContent`) backend.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use heirdesk_shared::{CompletionConfig, HeirdeskError, Result};

use crate::{CompletionBackend, CompletionError, Credential};

/// User-Agent string for completion requests.
const USER_AGENT: &str = concat!("heirdesk/", env!("CARGO_PKG_VERSION"));

/// Longest error body kept in a [`CompletionError::Http`] message.
const MAX_ERROR_BODY: usize = 300;

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    parts: Vec<RequestPart<'a>>,
}

#[derive(Debug, Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

// ---------------------------------------------------------------------------
// GeminiBackend
// ---------------------------------------------------------------------------

/// [`CompletionBackend`] for `POST /v1beta/{model}:generateContent`.
///
/// The key travels in the `x-goog-api-key` header so it never appears in
/// request URLs or transport error messages.
pub struct GeminiBackend {
    client: Client,
    base_url: String,
}

impl GeminiBackend {
    pub fn new(config: &CompletionConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(config.timeout)
            .build()
            .map_err(|e| HeirdeskError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn endpoint(&self, model: &str) -> String {
        let model = if model.starts_with("models/") {
            model.to_string()
        } else {
            format!("models/{model}")
        };
        format!("{}/v1beta/{model}:generateContent", self.base_url)
    }
}

#[async_trait]
impl CompletionBackend for GeminiBackend {
    #[instrument(skip_all, fields(model = %model, credential = %credential))]
    async fn complete(
        &self,
        credential: &Credential,
        model: &str,
        prompt: &str,
    ) -> std::result::Result<String, CompletionError> {
        let body = GenerateRequest {
            contents: vec![Content {
                parts: vec![RequestPart { text: prompt }],
            }],
        };

        let response = self
            .client
            .post(self.endpoint(model))
            .header("x-goog-api-key", credential.expose())
            .json(&body)
            .send()
            .await
            .map_err(|e| CompletionError::Network(e.without_url().to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            let message: String = message.chars().take(MAX_ERROR_BODY).collect();
            return Err(CompletionError::Http {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|e| CompletionError::Decode(e.without_url().to_string()))?;

        let text = first_candidate_text(parsed).ok_or(CompletionError::Empty)?;
        debug!(chars = text.chars().count(), "completion received");
        Ok(text)
    }
}

fn first_candidate_text(response: GenerateResponse) -> Option<String> {
    let content = response.candidates.into_iter().next()?.content?;
    let text: String = content.parts.into_iter().filter_map(|p| p.text).collect();
    (!text.trim().is_empty()).then_some(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn backend(base_url: String) -> GeminiBackend {
        GeminiBackend::new(&CompletionConfig {
            models: vec!["models/gemini-1.5-flash".into()],
            base_url,
            timeout: Duration::from_secs(5),
            max_source_chars: 30_000,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn complete_joins_candidate_parts() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1beta/models/gemini-1.5-flash:generateContent"))
            .and(header("x-goog-api-key", "test-key-0001"))
            .and(body_partial_json(serde_json::json!({
                "contents": [{ "parts": [{ "text": "hello" }] }]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "candidates": [{
                    "content": { "parts": [{ "text": "{\"contact_phone\":" }, { "text": " \"03-0000\"}" }] }
                }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let text = backend(server.uri())
            .complete(&Credential::new("test-key-0001"), "gemini-1.5-flash", "hello")
            .await
            .unwrap();
        assert_eq!(text, "{\"contact_phone\": \"03-0000\"}");
    }

    #[tokio::test]
    async fn quota_error_carries_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_string("RESOURCE_EXHAUSTED"))
            .mount(&server)
            .await;

        let err = backend(server.uri())
            .complete(&Credential::new("k"), "models/gemini-1.5-flash", "hi")
            .await
            .unwrap_err();
        assert_eq!(
            err,
            CompletionError::Http {
                status: 429,
                message: "RESOURCE_EXHAUSTED".into()
            }
        );
    }

    #[tokio::test]
    async fn no_candidates_is_empty() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "promptFeedback": { "blockReason": "SAFETY" } })),
            )
            .mount(&server)
            .await;

        let err = backend(server.uri())
            .complete(&Credential::new("k"), "models/gemini-1.5-flash", "hi")
            .await
            .unwrap_err();
        assert_eq!(err, CompletionError::Empty);
    }

    #[test]
    fn endpoint_adds_models_prefix() {
        let b = backend("https://generativelanguage.googleapis.com/".into());
        assert_eq!(
            b.endpoint("gemini-2.0-flash-exp"),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.0-flash-exp:generateContent"
        );
    }
}
