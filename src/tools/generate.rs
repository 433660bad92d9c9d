use schemars::JsonSchema;
use serde::Deserialize;

#[derive(Debug, Deserialize, JsonSchema)]
pub struct GenerateRequest {
    /// The prompt to send. Routed to the first available provider.
    pub prompt: String,
    /// Providers to try first, in order (e.g. ["mistral", "openai"]). Use `providers` for names.
    /// Remaining available providers follow in the configured default order.
    pub preference: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct GenerateCodeRequest {
    /// What to build. The model is asked for a JSON object mapping relative file paths to contents.
    pub prompt: String,
    /// Providers to try first, in order. Use `providers` for names.
    pub preference: Option<Vec<String>>,
}
