use std::time::Duration;

use serde::Deserialize;

use super::{Adapter, Completion, join_url, require_credential, schema_error};
use crate::dispatch::{HttpBody, HttpCall};
use crate::error::RelayError;
use crate::providers::{ProviderId, SecretSource};

const DEFAULT_BASE: &str = "https://generativelanguage.googleapis.com/v1";
const DEFAULT_MODEL: &str = "gemini-1.5-flash";

/// Google `models/{model}:generateContent`.
///
/// The key travels in `x-goog-api-key` rather than the `?key=` query
/// parameter so it never shows up in logged URLs.
pub struct GeminiAdapter {
    base_url: String,
    model: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    usage_metadata: Option<UsageMetadata>,
    model_version: Option<String>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Deserialize)]
struct Part {
    text: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    total_token_count: Option<u64>,
}

impl GeminiAdapter {
    pub fn new(base_url: Option<&str>, model: Option<&str>) -> Self {
        Self {
            base_url: base_url.unwrap_or(DEFAULT_BASE).to_string(),
            model: model.unwrap_or(DEFAULT_MODEL).to_string(),
        }
    }

    pub fn url(&self) -> String {
        join_url(
            &self.base_url,
            &format!("models/{}:generateContent", self.model),
        )
    }
}

impl Adapter for GeminiAdapter {
    fn id(&self) -> ProviderId {
        ProviderId::Gemini
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn build_request(
        &self,
        prompt: &str,
        secrets: &dyn SecretSource,
        timeout: Duration,
    ) -> Result<HttpCall, RelayError> {
        let api_key = require_credential(ProviderId::Gemini, secrets)?;
        let body = serde_json::json!({
            "contents": [{"parts": [{"text": prompt}]}],
            "generationConfig": {"temperature": 0.2},
        });

        Ok(HttpCall {
            url: self.url(),
            headers: vec![("x-goog-api-key".to_string(), api_key)],
            body: HttpBody::Json(body),
            timeout,
        })
    }

    fn parse_response(&self, body: &[u8]) -> Result<Completion, RelayError> {
        let resp: GenerateResponse = serde_json::from_slice(body).map_err(|e| {
            schema_error(ProviderId::Gemini, format!("failed to parse response: {e}"))
        })?;

        // No candidates means the prompt was blocked; surface it as empty text
        // rather than an error so the caller sees what the provider said.
        let text = resp
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .filter_map(|p| p.text)
                    .collect::<Vec<_>>()
                    .join("\n")
            })
            .unwrap_or_default();

        Ok(Completion::new(
            text,
            resp.model_version,
            resp.usage_metadata.and_then(|u| u.total_token_count),
        ))
    }
}
