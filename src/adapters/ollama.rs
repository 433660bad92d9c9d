use std::time::Duration;

use serde::Deserialize;

use super::{Adapter, Completion, join_url, schema_error};
use crate::dispatch::{HttpBody, HttpCall};
use crate::error::RelayError;
use crate::providers::{ProviderId, Requirement, SecretSource};

const DEFAULT_MODEL: &str = "codellama";

/// Self-hosted Ollama `POST {base}/api/generate`, non-streaming, no auth.
///
/// The base URL is resolved per request: `OLLAMA_BASE_URL`, then the
/// configured endpoint, then the local default.
pub struct OllamaAdapter {
    base_url: Option<String>,
    model: String,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: Option<String>,
    model: Option<String>,
    prompt_eval_count: Option<u64>,
    eval_count: Option<u64>,
}

impl OllamaAdapter {
    pub fn new(base_url: Option<&str>, model: Option<&str>) -> Self {
        Self {
            base_url: base_url.map(str::to_string),
            model: model.unwrap_or(DEFAULT_MODEL).to_string(),
        }
    }

    pub fn url(&self, secrets: &dyn SecretSource) -> String {
        let base = ProviderId::Ollama
            .endpoint_from_env(secrets)
            .or_else(|| self.base_url.clone())
            .unwrap_or_else(|| default_base_url().to_string());
        join_url(&base, "api/generate")
    }
}

pub fn default_base_url() -> &'static str {
    match ProviderId::Ollama.requirement() {
        Requirement::LocalEndpoint { default_url, .. } => default_url,
        Requirement::Credential(_) => "http://localhost:11434",
    }
}

impl Adapter for OllamaAdapter {
    fn id(&self) -> ProviderId {
        ProviderId::Ollama
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
        Ok(HttpCall {
            url: self.url(secrets),
            headers: vec![],
            body: HttpBody::Json(serde_json::json!({
                "model": self.model,
                "prompt": prompt,
                "stream": false,
            })),
            timeout,
        })
    }

    fn parse_response(&self, body: &[u8]) -> Result<Completion, RelayError> {
        let resp: GenerateResponse = serde_json::from_slice(body).map_err(|e| {
            schema_error(ProviderId::Ollama, format!("failed to parse response: {e}"))
        })?;

        let text = resp
            .response
            .ok_or_else(|| schema_error(ProviderId::Ollama, "missing 'response' field"))?;

        let reported = match (resp.prompt_eval_count, resp.eval_count) {
            (None, None) => None,
            (p, e) => Some(p.unwrap_or(0) + e.unwrap_or(0)),
        };

        Ok(Completion::new(text, resp.model, reported))
    }
}
