use std::time::Duration;

use serde::Deserialize;

use super::{Adapter, Completion, join_url, require_credential, schema_error};
use crate::dispatch::{HttpBody, HttpCall};
use crate::error::RelayError;
use crate::providers::{ProviderId, SecretSource};

/// OpenAI-style `POST {base}/chat/completions` with Bearer auth.
///
/// OpenAI, Mistral, Groq, Perplexity and v0 all speak this format; each
/// provider gets its own instance with its own base URL, model and prompt
/// framing.
pub struct ChatCompletionsAdapter {
    id: ProviderId,
    base_url: String,
    model: String,
    system_prompt: Option<&'static str>,
    temperature: Option<f64>,
}

#[derive(Deserialize)]
struct ChatCompletion {
    model: Option<String>,
    choices: Vec<Choice>,
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct Choice {
    message: Message,
}

#[derive(Deserialize)]
struct Message {
    content: Option<String>,
}

#[derive(Deserialize)]
struct Usage {
    total_tokens: Option<u64>,
}

impl ChatCompletionsAdapter {
    /// Adapter for `id`, or `None` if that provider uses another format.
    pub fn for_provider(
        id: ProviderId,
        base_url: Option<&str>,
        model: Option<&str>,
    ) -> Option<Self> {
        let (default_base, default_model, system_prompt, temperature) = match id {
            ProviderId::OpenAi => (
                "https://api.openai.com/v1",
                "gpt-4o-mini",
                Some("You are a helpful coding assistant."),
                Some(0.2),
            ),
            ProviderId::Mistral => (
                "https://api.mistral.ai/v1",
                "mistral-small-latest",
                None,
                Some(0.2),
            ),
            ProviderId::Groq => (
                "https://api.groq.com/openai/v1",
                "llama-3.1-8b-instant",
                None,
                Some(0.2),
            ),
            ProviderId::Perplexity => (
                "https://api.perplexity.ai",
                "sonar-small-chat",
                None,
                Some(0.2),
            ),
            // v0 is tuned for UI generation and takes no sampling knobs
            ProviderId::V0 => ("https://api.v0.dev/v1", "v0-1.5-md", None, None),
            ProviderId::Gemini | ProviderId::HuggingFace | ProviderId::Ollama => return None,
        };

        Some(Self {
            id,
            base_url: base_url.unwrap_or(default_base).to_string(),
            model: model.unwrap_or(default_model).to_string(),
            system_prompt,
            temperature,
        })
    }

    pub fn url(&self) -> String {
        join_url(&self.base_url, "chat/completions")
    }
}

impl Adapter for ChatCompletionsAdapter {
    fn id(&self) -> ProviderId {
        self.id
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
        let api_key = require_credential(self.id, secrets)?;

        let mut messages = Vec::new();
        if let Some(system) = self.system_prompt {
            messages.push(serde_json::json!({"role": "system", "content": system}));
        }
        messages.push(serde_json::json!({"role": "user", "content": prompt}));

        let mut body = serde_json::json!({
            "model": self.model,
            "messages": messages,
        });
        if let Some(t) = self.temperature {
            body["temperature"] = serde_json::json!(t);
        }

        Ok(HttpCall {
            url: self.url(),
            headers: vec![("Authorization".to_string(), format!("Bearer {api_key}"))],
            body: HttpBody::Json(body),
            timeout,
        })
    }

    fn parse_response(&self, body: &[u8]) -> Result<Completion, RelayError> {
        let completion: ChatCompletion = serde_json::from_slice(body)
            .map_err(|e| schema_error(self.id, format!("failed to parse response: {e}")))?;

        let text = completion
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| schema_error(self.id, "empty choices or null content"))?;

        Ok(Completion::new(
            text.trim().to_string(),
            completion.model,
            completion.usage.and_then(|u| u.total_tokens),
        ))
    }
}
