use thiserror::Error;

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("timeout after {0}ms")]
    Timeout(u64),

    #[error("rate limited by {provider}")]
    RateLimited { provider: String },

    #[error("upstream error from {provider}: {message}")]
    Upstream {
        provider: String,
        message: String,
        status: Option<u16>,
    },

    #[error("auth failed for {provider}: {message}")]
    AuthFailed { provider: String, message: String },

    #[error("no credential configured for {provider}")]
    MissingCredential { provider: String },

    #[error("schema parse error from {provider}: {message}")]
    SchemaParse { provider: String, message: String },

    #[error("request error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("invalid image: {0}")]
    InvalidImage(String),

    #[error("unknown provider: {0}")]
    UnknownProvider(String),

    #[error("generated path escapes run directory: {0}")]
    UnsafePath(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("log store error: {0}")]
    Store(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

impl RelayError {
    /// Provider name carried by provider-facing variants.
    pub fn provider(&self) -> Option<&str> {
        match self {
            Self::RateLimited { provider } => Some(provider),
            Self::Upstream { provider, .. } => Some(provider),
            Self::AuthFailed { provider, .. } => Some(provider),
            Self::MissingCredential { provider } => Some(provider),
            Self::SchemaParse { provider, .. } => Some(provider),
            _ => None,
        }
    }

    /// Transient failures that the adapter retry policy absorbs.
    ///
    /// Every non-2xx status counts (401/403 included), as does a 2xx body
    /// that does not match the provider's envelope. A missing credential is
    /// detected before any request is sent and never retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout(_) => true,
            Self::RateLimited { .. } => true,
            Self::Upstream { .. } => true,
            Self::AuthFailed { .. } => true,
            Self::SchemaParse { .. } => true,
            Self::Request(_) => true,
            _ => false,
        }
    }

    /// Sanitized message safe to hand back to tool callers. Never includes
    /// upstream bodies or connection details.
    pub fn user_message(&self) -> String {
        match self {
            Self::Timeout(ms) => format!("request timed out after {ms}ms"),
            Self::RateLimited { provider } => format!("rate limited by {provider}"),
            Self::Upstream {
                provider, status, ..
            } => match status {
                Some(s) => format!("upstream error from {provider} (HTTP {s})"),
                None => format!("upstream error from {provider}"),
            },
            Self::AuthFailed { provider, .. } => {
                format!("authentication failed for {provider}")
            }
            Self::MissingCredential { provider } => {
                format!("no credential configured for {provider}")
            }
            Self::SchemaParse { provider, .. } => {
                format!("failed to parse response from {provider}")
            }
            Self::Request(_) => "request to provider failed".to_string(),
            Self::InvalidImage(msg) => format!("invalid image: {msg}"),
            Self::UnknownProvider(name) => format!("unknown provider: {name}"),
            Self::UnsafePath(path) => format!("path escapes run directory: {path}"),
            Self::Io(_) => "filesystem error".to_string(),
            Self::Json(_) => "serialization error".to_string(),
            Self::Store(_) => "log store unavailable".to_string(),
            Self::Config(msg) => format!("config error: {msg}"),
            Self::Other(msg) => msg.clone(),
        }
    }
}
