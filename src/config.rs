use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::dispatch::retry::RetryPolicy;
use crate::error::RelayError;
use crate::providers::{ProviderId, parse_provider_list};

/// Default config file looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "sdlc-relay.toml";

/// Named default priority orders, one per task. Free and cheap providers
/// come before paid ones; operators override these per deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingConfig {
    pub text_order: Vec<ProviderId>,
    pub code_order: Vec<ProviderId>,
    pub vision_order: Vec<ProviderId>,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        use ProviderId::*;
        Self {
            text_order: vec![Gemini, Groq, Mistral, HuggingFace, Ollama, Perplexity, OpenAi],
            code_order: vec![Gemini, Perplexity, HuggingFace, Mistral, Groq, OpenAi, Ollama],
            vision_order: vec![HuggingFace],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    /// Plain text / chat generation.
    pub generation: Duration,
    /// Structured file-map generation (larger outputs).
    pub structured: Duration,
    /// Liveness probes for self-hosted providers.
    pub probe: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            generation: Duration::from_secs(60),
            structured: Duration::from_secs(90),
            probe: Duration::from_millis(1500),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildConfig {
    pub runs_dir: PathBuf,
    /// Run pytest/flake8 inside the run directory after the pipeline.
    pub diagnostics: bool,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            runs_dir: PathBuf::from("runs"),
            diagnostics: false,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditBackend {
    #[default]
    Jsonl,
    Duckdb,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditConfig {
    pub logs_dir: PathBuf,
    pub backend: AuditBackend,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            logs_dir: PathBuf::from("logs"),
            backend: AuditBackend::default(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Config {
    pub routing: RoutingConfig,
    pub retry: RetryPolicy,
    pub timeouts: Timeouts,
    /// Base URL overrides per provider (e.g. a self-hosted Ollama or a proxy).
    pub endpoints: HashMap<ProviderId, String>,
    /// Model overrides per provider.
    pub models: HashMap<ProviderId, String>,
    pub build: BuildConfig,
    pub audit: AuditConfig,
}

// ---------------------------------------------------------------------------
// TOML file shape
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    routing: Option<FileRouting>,
    retry: Option<FileRetry>,
    timeouts: Option<FileTimeouts>,
    endpoints: Option<HashMap<ProviderId, String>>,
    models: Option<HashMap<ProviderId, String>>,
    build: Option<FileBuild>,
    audit: Option<FileAudit>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileRouting {
    text_order: Option<Vec<ProviderId>>,
    code_order: Option<Vec<ProviderId>>,
    vision_order: Option<Vec<ProviderId>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileRetry {
    max_attempts: Option<u32>,
    base_delay_ms: Option<u64>,
    max_delay_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileTimeouts {
    generation_secs: Option<u64>,
    structured_secs: Option<u64>,
    probe_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileBuild {
    runs_dir: Option<PathBuf>,
    diagnostics: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileAudit {
    logs_dir: Option<PathBuf>,
    backend: Option<AuditBackend>,
}

impl Config {
    /// Defaults, then the TOML file (if any), then environment overrides.
    /// A malformed file is reported and skipped rather than aborting startup.
    pub fn load() -> Self {
        let path = env::var("SDLC_RELAY_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_FILE));

        let mut config = if path.exists() {
            match Self::from_file(&path) {
                Ok(c) => {
                    tracing::info!(path = %path.display(), "loaded config file");
                    c
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), "ignoring config file: {e}");
                    Self::default()
                }
            }
        } else {
            Self::default()
        };

        config.apply_env(|key| env::var(key).ok());
        config
    }

    pub fn from_file(path: &Path) -> Result<Self, RelayError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, RelayError> {
        let file: FileConfig =
            toml::from_str(raw).map_err(|e| RelayError::Config(e.to_string()))?;
        let mut config = Self::default();

        if let Some(r) = file.routing {
            if let Some(v) = r.text_order {
                config.routing.text_order = v;
            }
            if let Some(v) = r.code_order {
                config.routing.code_order = v;
            }
            if let Some(v) = r.vision_order {
                config.routing.vision_order = v;
            }
        }

        if let Some(r) = file.retry {
            if let Some(n) = r.max_attempts {
                if n == 0 {
                    return Err(RelayError::Config("retry.max_attempts must be >= 1".into()));
                }
                config.retry.max_attempts = n;
            }
            if let Some(ms) = r.base_delay_ms {
                config.retry.base_delay = Duration::from_millis(ms);
            }
            if let Some(ms) = r.max_delay_ms {
                config.retry.max_delay = Duration::from_millis(ms);
            }
        }

        if let Some(t) = file.timeouts {
            if let Some(s) = t.generation_secs {
                config.timeouts.generation = Duration::from_secs(s);
            }
            if let Some(s) = t.structured_secs {
                config.timeouts.structured = Duration::from_secs(s);
            }
            if let Some(ms) = t.probe_ms {
                config.timeouts.probe = Duration::from_millis(ms);
            }
        }

        if let Some(e) = file.endpoints {
            config.endpoints = e;
        }
        if let Some(m) = file.models {
            config.models = m;
        }

        if let Some(b) = file.build {
            if let Some(dir) = b.runs_dir {
                config.build.runs_dir = dir;
            }
            if let Some(d) = b.diagnostics {
                config.build.diagnostics = d;
            }
        }

        if let Some(a) = file.audit {
            if let Some(dir) = a.logs_dir {
                config.audit.logs_dir = dir;
            }
            if let Some(b) = a.backend {
                config.audit.backend = b;
            }
        }

        Ok(config)
    }

    /// Overlay environment variables. Invalid provider lists are logged and ignored.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let orders: [(&str, &mut Vec<ProviderId>); 3] = [
            ("SDLC_RELAY_TEXT_ORDER", &mut self.routing.text_order),
            ("SDLC_RELAY_CODE_ORDER", &mut self.routing.code_order),
            ("SDLC_RELAY_VISION_ORDER", &mut self.routing.vision_order),
        ];
        for (key, slot) in orders {
            if let Some(raw) = lookup(key) {
                match parse_provider_list(&raw) {
                    Ok(list) => *slot = list,
                    Err(e) => tracing::warn!("{key} ignored: {e}"),
                }
            }
        }

        if let Some(dir) = lookup("SDLC_RELAY_RUNS_DIR").filter(|s| !s.is_empty()) {
            self.build.runs_dir = PathBuf::from(dir);
        }
        if let Some(dir) = lookup("SDLC_RELAY_LOGS_DIR").filter(|s| !s.is_empty()) {
            self.audit.logs_dir = PathBuf::from(dir);
        }
        if let Some(flag) = lookup("SDLC_RELAY_DIAGNOSTICS") {
            self.build.diagnostics = matches!(flag.trim(), "1" | "true" | "yes");
        }
    }

    pub fn endpoint_override(&self, provider: ProviderId) -> Option<&str> {
        self.endpoints.get(&provider).map(String::as_str)
    }

    pub fn model_override(&self, provider: ProviderId) -> Option<&str> {
        self.models.get(&provider).map(String::as_str)
    }
}
