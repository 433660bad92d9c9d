use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Serialize, Serializer};

use crate::adapters::{self, Adapter, AdapterMap, Completion, Prediction, VisionAdapter, VisionAdapterMap};
use crate::audit::LogRecord;
use crate::config::{Config, RoutingConfig, Timeouts};
use crate::dispatch::{HttpDispatch, RetryPolicy};
use crate::error::RelayError;
use crate::extract::extract_files;
use crate::providers::registry::ProviderRegistry;
use crate::providers::{Availability, ProviderId};
use crate::vision;

/// Synthetic provider/model reported by the offline baseline.
pub const BASELINE_PROVIDER: &str = "local";
pub const BASELINE_MODEL: &str = "baseline";

/// Instruction prepended to structured code-generation prompts.
pub const CODE_INSTRUCTION: &str = "Return ONLY a JSON object mapping relative file paths to \
    complete file contents, with no commentary. Example: {\"main.py\": \"...\"}.";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GenerationKind {
    #[default]
    Text,
    /// JSON file-map generation; uses the structured timeout and the extractor.
    Code,
}

#[derive(Debug, Clone, Default)]
pub struct GenerationRequest {
    pub prompt: String,
    pub kind: GenerationKind,
    /// Providers to try first, in order, before the default order.
    pub preference: Option<Vec<ProviderId>>,
}

impl GenerationRequest {
    pub fn text(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Self::default()
        }
    }

    pub fn code(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            kind: GenerationKind::Code,
            preference: None,
        }
    }

    pub fn prefer(mut self, providers: impl IntoIterator<Item = ProviderId>) -> Self {
        self.preference = Some(providers.into_iter().collect());
        self
    }
}

/// Who produced a result: a real provider or the offline baseline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderLabel {
    Provider(ProviderId),
    Local,
}

impl ProviderLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Provider(id) => id.as_str(),
            Self::Local => BASELINE_PROVIDER,
        }
    }
}

impl fmt::Display for ProviderLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ProviderLabel {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(self.as_str())
    }
}

/// A candidate that was tried and failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttemptRecord {
    pub provider: ProviderId,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct GenerationResult {
    pub text: String,
    /// Parsed file map; only set for `GenerationKind::Code`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub files: Option<BTreeMap<String, String>>,
    pub provider: ProviderLabel,
    pub model: String,
    /// Approximate when `tokens_estimated` is set; see `adapters::estimate_tokens`.
    pub tokens: u64,
    pub tokens_estimated: bool,
    /// True when no provider succeeded. Callers must check this before
    /// treating `text` as model output.
    pub fallback: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub attempts: Vec<AttemptRecord>,
}

impl GenerationResult {
    fn from_completion(id: ProviderId, default_model: &str, c: Completion) -> Self {
        Self {
            text: c.text,
            files: None,
            provider: ProviderLabel::Provider(id),
            model: c.model.unwrap_or_else(|| default_model.to_string()),
            tokens: c.tokens,
            tokens_estimated: c.tokens_estimated,
            fallback: false,
            attempts: vec![],
        }
    }

    /// Deterministic placeholder echoing the prompt.
    pub fn baseline(prompt: &str) -> Self {
        Self {
            text: format!("[baseline] You asked: {prompt}"),
            files: None,
            provider: ProviderLabel::Local,
            model: BASELINE_MODEL.to_string(),
            tokens: 0,
            tokens_estimated: false,
            fallback: true,
            attempts: vec![],
        }
    }

    /// Log entry for one routed call. `stage` names the entry point
    /// (`task` or `code`); the generated text itself is not logged.
    pub fn log_record(&self, stage: &str) -> LogRecord {
        let mut record = LogRecord::new(uuid::Uuid::new_v4().to_string(), stage, true);
        record.provider = Some(self.provider.to_string());
        record.model = Some(self.model.clone());
        record.message = Some(if self.fallback {
            format!("{stage} answered by offline baseline")
        } else {
            format!("{stage} completed")
        });
        record.metadata = serde_json::json!({
            "fallback": self.fallback,
            "tokens": self.tokens,
            "tokens_estimated": self.tokens_estimated,
            "files": self.files.as_ref().map(BTreeMap::len),
            "attempts": self.attempts,
        });
        record
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LabelResult {
    pub label: String,
    pub confidence: f64,
    pub provider: ProviderLabel,
    pub model: String,
    pub fallback: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub attempts: Vec<AttemptRecord>,
}

impl LabelResult {
    pub fn log_record(&self) -> LogRecord {
        let mut record = LogRecord::new(uuid::Uuid::new_v4().to_string(), "predict", true);
        record.provider = Some(self.provider.to_string());
        record.model = Some(self.model.clone());
        record.message = Some("prediction completed".to_string());
        record.metadata = serde_json::json!({
            "label": self.label,
            "confidence": self.confidence,
            "fallback": self.fallback,
            "attempts": self.attempts,
        });
        record
    }
}

/// Candidate order for one routing decision.
///
/// Preferred providers that are available, in preference order, followed by
/// the remaining available providers in `default_order`. No duplicates.
/// Providers absent from both lists are never tried.
pub fn candidate_order(
    preference: Option<&[ProviderId]>,
    availability: &Availability,
    default_order: &[ProviderId],
) -> Vec<ProviderId> {
    let is_up = |id: &ProviderId| availability.get(id).copied().unwrap_or(false);
    let preferred = preference.unwrap_or(&[]);

    let mut order: Vec<ProviderId> = Vec::new();
    for id in preferred.iter().chain(default_order) {
        if is_up(id) && !order.contains(id) {
            order.push(*id);
        }
    }
    order
}

/// Picks a provider, calls it, and falls back through the candidate list.
///
/// Holds no mutable state of its own; availability lives in the shared
/// registry and is read as a snapshot per request.
pub struct InferenceRouter {
    registry: Arc<ProviderRegistry>,
    adapters: AdapterMap,
    vision: VisionAdapterMap,
    http: HttpDispatch,
    routing: RoutingConfig,
    retry: RetryPolicy,
    timeouts: Timeouts,
}

impl InferenceRouter {
    pub fn new(config: &Config, registry: Arc<ProviderRegistry>) -> Self {
        Self {
            registry,
            adapters: adapters::text_adapters(config),
            vision: adapters::vision_adapters(config),
            http: HttpDispatch::new(),
            routing: config.routing.clone(),
            retry: config.retry,
            timeouts: config.timeouts,
        }
    }

    /// Replace the adapter for one provider (custom deployments, proxies).
    pub fn with_adapter(mut self, adapter: Arc<dyn Adapter>) -> Self {
        self.adapters.insert(adapter.id(), adapter);
        self
    }

    pub fn routing(&self) -> &RoutingConfig {
        &self.routing
    }

    pub fn availability(&self) -> Arc<Availability> {
        self.registry.snapshot()
    }

    pub fn is_available(&self, id: ProviderId) -> bool {
        self.registry.is_available(id)
    }

    /// Re-detect providers; in-flight requests keep their snapshot.
    pub async fn refresh_providers(&self) -> Arc<Availability> {
        self.registry.refresh().await
    }

    pub fn default_order(&self, kind: GenerationKind) -> &[ProviderId] {
        match kind {
            GenerationKind::Text => &self.routing.text_order,
            GenerationKind::Code => &self.routing.code_order,
        }
    }

    fn timeout_for(&self, kind: GenerationKind) -> Duration {
        match kind {
            GenerationKind::Text => self.timeouts.generation,
            GenerationKind::Code => self.timeouts.structured,
        }
    }

    /// Route a request. Never fails: exhausting every candidate yields the
    /// baseline result with `fallback = true`.
    pub async fn route(&self, req: &GenerationRequest) -> GenerationResult {
        let snapshot = self.registry.snapshot();
        let candidates = candidate_order(
            req.preference.as_deref(),
            &snapshot,
            self.default_order(req.kind),
        );

        let prompt = match req.kind {
            GenerationKind::Text => req.prompt.clone(),
            GenerationKind::Code => format!("{CODE_INSTRUCTION}\n\n{}", req.prompt),
        };
        let timeout = self.timeout_for(req.kind);

        let mut attempts = Vec::new();
        let mut result = None;
        for id in candidates {
            let Some(adapter) = self.adapters.get(&id) else {
                attempts.push(AttemptRecord {
                    provider: id,
                    reason: "no adapter registered".to_string(),
                });
                continue;
            };
            match self.call_adapter(adapter.as_ref(), &prompt, timeout).await {
                Ok(completion) => {
                    tracing::info!(
                        provider = %id,
                        tokens = completion.tokens,
                        estimated = completion.tokens_estimated,
                        "generation succeeded"
                    );
                    result = Some(GenerationResult::from_completion(
                        id,
                        adapter.model(),
                        completion,
                    ));
                    break;
                }
                Err(e) => {
                    tracing::warn!(provider = %id, "provider failed, trying next: {e}");
                    attempts.push(AttemptRecord {
                        provider: id,
                        reason: e.user_message(),
                    });
                }
            }
        }

        let mut result = result.unwrap_or_else(|| {
            tracing::warn!(tried = attempts.len(), "all providers failed; using offline baseline");
            GenerationResult::baseline(&req.prompt)
        });
        result.attempts = attempts;

        if req.kind == GenerationKind::Code {
            let files = if result.fallback {
                Default::default()
            } else {
                extract_files(&result.text)
            };
            if files.is_empty() {
                tracing::warn!(provider = %result.provider, "code generation produced no files");
            }
            result.files = Some(files);
        }

        result
    }

    /// Structured code generation: file map in `files`, possibly empty.
    pub async fn route_code(
        &self,
        prompt: &str,
        preference: Option<Vec<ProviderId>>,
    ) -> GenerationResult {
        self.route(&GenerationRequest {
            preference,
            ..GenerationRequest::code(prompt)
        })
        .await
    }

    /// Classify an image. Falls back to a brightness heuristic with no
    /// discriminative value; only undecodable input is an error.
    pub async fn route_vision(&self, image: &[u8]) -> Result<LabelResult, RelayError> {
        // Decode up front: bad input is the caller's problem, not a provider failure.
        let brightness = vision::average_brightness(image)?;

        let snapshot = self.registry.snapshot();
        let candidates = candidate_order(None, &snapshot, &self.routing.vision_order);

        let mut attempts = Vec::new();
        for id in candidates {
            let Some(adapter) = self.vision.get(&id) else {
                attempts.push(AttemptRecord {
                    provider: id,
                    reason: "no vision adapter".to_string(),
                });
                continue;
            };
            match self.call_vision(adapter.as_ref(), image).await {
                Ok(Prediction { label, score }) => {
                    return Ok(LabelResult {
                        label,
                        confidence: score,
                        provider: ProviderLabel::Provider(id),
                        model: adapter.model().to_string(),
                        fallback: false,
                        attempts,
                    });
                }
                Err(e) => {
                    tracing::warn!(provider = %id, "vision provider failed: {e}");
                    attempts.push(AttemptRecord {
                        provider: id,
                        reason: e.user_message(),
                    });
                }
            }
        }

        Ok(LabelResult {
            label: vision::brightness_label(brightness).to_string(),
            confidence: vision::HEURISTIC_CONFIDENCE,
            provider: ProviderLabel::Local,
            model: BASELINE_MODEL.to_string(),
            fallback: true,
            attempts,
        })
    }

    async fn call_adapter(
        &self,
        adapter: &dyn Adapter,
        prompt: &str,
        timeout: Duration,
    ) -> Result<Completion, RelayError> {
        let provider = adapter.id().as_str();
        let secrets = self.registry.secrets().clone();
        self.retry
            .run(provider, |_| {
                let secrets = secrets.clone();
                async move {
                    let call = adapter.build_request(prompt, secrets.as_ref(), timeout)?;
                    let body = self.http.send(provider, &call).await?;
                    adapter.parse_response(&body)
                }
            })
            .await
    }

    async fn call_vision(
        &self,
        adapter: &dyn VisionAdapter,
        image: &[u8],
    ) -> Result<Prediction, RelayError> {
        let provider = adapter.id().as_str();
        let secrets = self.registry.secrets().clone();
        let timeout = self.timeouts.generation;
        self.retry
            .run(provider, |_| {
                let secrets = secrets.clone();
                async move {
                    let call = adapter.build_request(image, secrets.as_ref(), timeout)?;
                    let body = self.http.send(provider, &call).await?;
                    adapter.parse_response(&body)
                }
            })
            .await
    }
}
