use std::time::Duration;

use serde::Deserialize;

use super::{Adapter, Completion, Prediction, VisionAdapter, join_url, require_credential, schema_error};
use crate::dispatch::{HttpBody, HttpCall};
use crate::error::RelayError;
use crate::providers::{ProviderId, SecretSource};

const DEFAULT_BASE: &str = "https://api-inference.huggingface.co/models";
const DEFAULT_TEXT_MODEL: &str = "Qwen/Qwen2.5-7B-Instruct";
const DEFAULT_VISION_MODEL: &str = "google/vit-base-patch16-224";

/// Hugging Face Inference API text generation.
pub struct HuggingFaceTextAdapter {
    base_url: String,
    model: String,
}

/// The API answers either `[{"generated_text": ...}]` or `{"generated_text": ...}`.
#[derive(Deserialize)]
#[serde(untagged)]
enum GenerateResponse {
    List(Vec<Generated>),
    Single(Generated),
}

#[derive(Deserialize)]
struct Generated {
    generated_text: Option<String>,
}

impl HuggingFaceTextAdapter {
    pub fn new(base_url: Option<&str>, model: Option<&str>) -> Self {
        Self {
            base_url: base_url.unwrap_or(DEFAULT_BASE).to_string(),
            model: model.unwrap_or(DEFAULT_TEXT_MODEL).to_string(),
        }
    }

    pub fn url(&self) -> String {
        join_url(&self.base_url, &self.model)
    }
}

impl Adapter for HuggingFaceTextAdapter {
    fn id(&self) -> ProviderId {
        ProviderId::HuggingFace
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
        let api_key = require_credential(ProviderId::HuggingFace, secrets)?;
        Ok(HttpCall {
            url: self.url(),
            headers: vec![("Authorization".to_string(), format!("Bearer {api_key}"))],
            body: HttpBody::Json(serde_json::json!({
                "inputs": prompt,
                "parameters": {"max_new_tokens": 256, "temperature": 0.3},
            })),
            timeout,
        })
    }

    fn parse_response(&self, body: &[u8]) -> Result<Completion, RelayError> {
        let resp: GenerateResponse = serde_json::from_slice(body).map_err(|e| {
            schema_error(ProviderId::HuggingFace, format!("failed to parse response: {e}"))
        })?;

        let text = match resp {
            GenerateResponse::List(items) => items.into_iter().next().and_then(|g| g.generated_text),
            GenerateResponse::Single(g) => g.generated_text,
        }
        .ok_or_else(|| schema_error(ProviderId::HuggingFace, "missing 'generated_text'"))?;

        // The inference API reports no usage; always estimated.
        Ok(Completion::new(text, None, None))
    }
}

/// Hugging Face image classification. The raw image is the request body.
pub struct HuggingFaceVisionAdapter {
    base_url: String,
    model: String,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ClassifyResponse {
    Nested(Vec<Vec<Scored>>),
    Flat(Vec<Scored>),
}

#[derive(Deserialize)]
struct Scored {
    label: Option<String>,
    #[serde(default)]
    score: f64,
}

impl HuggingFaceVisionAdapter {
    pub fn new(base_url: Option<&str>) -> Self {
        Self {
            base_url: base_url.unwrap_or(DEFAULT_BASE).to_string(),
            model: DEFAULT_VISION_MODEL.to_string(),
        }
    }

    pub fn url(&self) -> String {
        join_url(&self.base_url, &self.model)
    }
}

impl VisionAdapter for HuggingFaceVisionAdapter {
    fn id(&self) -> ProviderId {
        ProviderId::HuggingFace
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn build_request(
        &self,
        image: &[u8],
        secrets: &dyn SecretSource,
        timeout: Duration,
    ) -> Result<HttpCall, RelayError> {
        let api_key = require_credential(ProviderId::HuggingFace, secrets)?;
        Ok(HttpCall {
            url: self.url(),
            headers: vec![("Authorization".to_string(), format!("Bearer {api_key}"))],
            body: HttpBody::Bytes {
                content_type: "application/octet-stream",
                data: image.to_vec(),
            },
            timeout,
        })
    }

    fn parse_response(&self, body: &[u8]) -> Result<Prediction, RelayError> {
        let resp: ClassifyResponse = serde_json::from_slice(body).map_err(|e| {
            schema_error(ProviderId::HuggingFace, format!("failed to parse labels: {e}"))
        })?;

        let preds = match resp {
            ClassifyResponse::Nested(outer) => outer.into_iter().next().unwrap_or_default(),
            ClassifyResponse::Flat(list) => list,
        };

        preds
            .into_iter()
            .max_by(|a, b| a.score.total_cmp(&b.score))
            .map(|best| Prediction {
                label: best.label.unwrap_or_else(|| "unknown".to_string()),
                score: best.score,
            })
            .ok_or_else(|| schema_error(ProviderId::HuggingFace, "no predictions returned"))
    }
}
