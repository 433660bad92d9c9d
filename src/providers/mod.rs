pub mod registry;

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::RelayError;

/// External generation services the router knows how to call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderId {
    #[serde(rename = "openai")]
    OpenAi,
    Gemini,
    Mistral,
    Groq,
    Perplexity,
    #[serde(rename = "hf")]
    HuggingFace,
    Ollama,
    V0,
}

/// How a provider's availability is decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requirement {
    /// Available iff any of these environment secrets is set.
    Credential(&'static [&'static str]),
    /// Available iff an endpoint override exists or the default endpoint answers a probe.
    LocalEndpoint {
        override_env: &'static str,
        default_url: &'static str,
    },
}

impl ProviderId {
    pub const ALL: [ProviderId; 8] = [
        ProviderId::OpenAi,
        ProviderId::Gemini,
        ProviderId::Mistral,
        ProviderId::Groq,
        ProviderId::Perplexity,
        ProviderId::HuggingFace,
        ProviderId::Ollama,
        ProviderId::V0,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Gemini => "gemini",
            Self::Mistral => "mistral",
            Self::Groq => "groq",
            Self::Perplexity => "perplexity",
            Self::HuggingFace => "hf",
            Self::Ollama => "ollama",
            Self::V0 => "v0",
        }
    }

    pub fn requirement(&self) -> Requirement {
        match self {
            Self::OpenAi => Requirement::Credential(&["OPENAI_API_KEY"]),
            Self::Gemini => Requirement::Credential(&["GEMINI_API_KEY"]),
            Self::Mistral => Requirement::Credential(&["MISTRAL_API_KEY"]),
            Self::Groq => Requirement::Credential(&["GROQ_API_KEY"]),
            Self::Perplexity => Requirement::Credential(&["PERPLEXITY_API_KEY"]),
            Self::HuggingFace => Requirement::Credential(&["HF_API_KEY"]),
            Self::V0 => Requirement::Credential(&["V0_API_KEY", "V0_DEV_API_KEY"]),
            Self::Ollama => Requirement::LocalEndpoint {
                override_env: "OLLAMA_BASE_URL",
                default_url: "http://localhost:11434",
            },
        }
    }

    /// Endpoint named by the provider's override variable, read at call time.
    pub fn endpoint_from_env(&self, secrets: &dyn SecretSource) -> Option<String> {
        match self.requirement() {
            Requirement::LocalEndpoint { override_env, .. } => secrets.get(override_env),
            Requirement::Credential(_) => None,
        }
    }

    /// First configured credential for this provider, if it needs one.
    pub fn credential(&self, secrets: &dyn SecretSource) -> Option<String> {
        match self.requirement() {
            Requirement::Credential(keys) => keys.iter().find_map(|k| secrets.get(k)),
            Requirement::LocalEndpoint { .. } => None,
        }
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderId {
    type Err = RelayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim().to_ascii_lowercase();
        match needle.as_str() {
            "huggingface" => return Ok(Self::HuggingFace),
            "v0.dev" => return Ok(Self::V0),
            _ => {}
        }
        Self::ALL
            .into_iter()
            .find(|p| p.as_str() == needle)
            .ok_or_else(|| RelayError::UnknownProvider(s.to_string()))
    }
}

/// Parse a comma-separated provider list, e.g. `"gemini, mistral,openai"`.
pub fn parse_provider_list(raw: &str) -> Result<Vec<ProviderId>, RelayError> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ProviderId::from_str)
        .collect()
}

/// Which providers can be called right now. Always covers every `ProviderId`.
pub type Availability = BTreeMap<ProviderId, bool>;

/// Availability map with every provider marked unavailable except `available`.
pub fn availability_of(available: &[ProviderId]) -> Availability {
    ProviderId::ALL
        .into_iter()
        .map(|p| (p, available.contains(&p)))
        .collect()
}

/// Read access to credentials. Production reads the process environment;
/// tests hand in a map.
pub trait SecretSource: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
}

pub struct ProcessEnv;

impl SecretSource for ProcessEnv {
    fn get(&self, key: &str) -> Option<String> {
        std::env::var(key).ok().filter(|v| !v.trim().is_empty())
    }
}

impl SecretSource for HashMap<String, String> {
    fn get(&self, key: &str) -> Option<String> {
        HashMap::get(self, key)
            .filter(|v| !v.trim().is_empty())
            .cloned()
    }
}
