//! Per-provider translation between the uniform `(text, tokens)` contract
//! and each provider's wire format.
//!
//! Adapters only build requests and parse responses. Sending, size limits
//! and retries live in `dispatch`, so an upstream schema change stays inside
//! one adapter file.

pub mod chat_completions;
pub mod gemini;
pub mod huggingface;
pub mod ollama;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::dispatch::HttpCall;
use crate::error::RelayError;
use crate::providers::{ProviderId, SecretSource};

pub use chat_completions::ChatCompletionsAdapter;
pub use gemini::GeminiAdapter;
pub use huggingface::{HuggingFaceTextAdapter, HuggingFaceVisionAdapter};
pub use ollama::OllamaAdapter;

/// Normalized output of one successful provider call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub text: String,
    /// Provider-reported model id, if the envelope carries one.
    pub model: Option<String>,
    pub tokens: u64,
    /// True when `tokens` came from [`estimate_tokens`] rather than the provider.
    pub tokens_estimated: bool,
}

impl Completion {
    /// Build a completion, estimating tokens when the provider reported none.
    pub fn new(text: String, model: Option<String>, reported_tokens: Option<u64>) -> Self {
        match reported_tokens {
            Some(tokens) => Self {
                text,
                model,
                tokens,
                tokens_estimated: false,
            },
            None => Self {
                tokens: estimate_tokens(&text),
                text,
                model,
                tokens_estimated: true,
            },
        }
    }
}

/// Rough token count: characters / 4.
///
/// An accounting signal only. Real tokenizers differ per provider, so these
/// numbers are not comparable across providers.
pub fn estimate_tokens(text: &str) -> u64 {
    (text.chars().count() / 4) as u64
}

/// Text generation capability of one provider.
pub trait Adapter: Send + Sync {
    fn id(&self) -> ProviderId;

    /// Configured model name sent in the request.
    fn model(&self) -> &str;

    /// Build the outbound call. Credentials are read from `secrets` on every
    /// call so a rotated key is picked up without a restart.
    fn build_request(
        &self,
        prompt: &str,
        secrets: &dyn SecretSource,
        timeout: Duration,
    ) -> Result<HttpCall, RelayError>;

    /// Parse a 2xx body into a completion.
    fn parse_response(&self, body: &[u8]) -> Result<Completion, RelayError>;
}

/// One image label with its score.
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub label: String,
    pub score: f64,
}

/// Image classification capability of one provider.
pub trait VisionAdapter: Send + Sync {
    fn id(&self) -> ProviderId;

    fn model(&self) -> &str;

    fn build_request(
        &self,
        image: &[u8],
        secrets: &dyn SecretSource,
        timeout: Duration,
    ) -> Result<HttpCall, RelayError>;

    /// Best-scoring prediction from a 2xx body.
    fn parse_response(&self, body: &[u8]) -> Result<Prediction, RelayError>;
}

pub type AdapterMap = HashMap<ProviderId, Arc<dyn Adapter>>;
pub type VisionAdapterMap = HashMap<ProviderId, Arc<dyn VisionAdapter>>;

/// One text adapter per provider, honouring endpoint and model overrides.
pub fn text_adapters(config: &Config) -> AdapterMap {
    let mut map: AdapterMap = HashMap::new();
    for id in ProviderId::ALL {
        let endpoint = config.endpoint_override(id);
        let model = config.model_override(id);
        let adapter: Arc<dyn Adapter> = match id {
            ProviderId::Gemini => Arc::new(GeminiAdapter::new(endpoint, model)),
            ProviderId::HuggingFace => Arc::new(HuggingFaceTextAdapter::new(endpoint, model)),
            ProviderId::Ollama => Arc::new(OllamaAdapter::new(endpoint, model)),
            _ => match ChatCompletionsAdapter::for_provider(id, endpoint, model) {
                Some(a) => Arc::new(a),
                None => continue,
            },
        };
        map.insert(id, adapter);
    }
    map
}

/// Vision adapters. Only Hugging Face hosts an image classifier today.
pub fn vision_adapters(config: &Config) -> VisionAdapterMap {
    let mut map: VisionAdapterMap = HashMap::new();
    map.insert(
        ProviderId::HuggingFace,
        Arc::new(HuggingFaceVisionAdapter::new(
            config.endpoint_override(ProviderId::HuggingFace),
        )),
    );
    map
}

/// Trim a trailing slash so `{base}/path` joins cleanly.
pub(crate) fn join_url(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}

pub(crate) fn require_credential(
    id: ProviderId,
    secrets: &dyn SecretSource,
) -> Result<String, RelayError> {
    id.credential(secrets)
        .ok_or_else(|| RelayError::MissingCredential {
            provider: id.to_string(),
        })
}

pub(crate) fn schema_error(id: ProviderId, message: impl Into<String>) -> RelayError {
    RelayError::SchemaParse {
        provider: id.to_string(),
        message: message.into(),
    }
}
