use std::sync::{Arc, RwLock};

use crate::adapters::join_url;
use crate::config::Config;
use crate::dispatch::HttpDispatch;
use crate::providers::{Availability, ProviderId, Requirement, SecretSource};

/// Answers "which providers can I call right now".
///
/// The map lives behind `RwLock<Arc<_>>`: readers clone the `Arc` and keep a
/// consistent snapshot for the whole routing decision, while `refresh`
/// computes a new map off-lock and swaps the pointer.
pub struct ProviderRegistry {
    current: RwLock<Arc<Availability>>,
    config: Config,
    secrets: Arc<dyn SecretSource>,
    http: HttpDispatch,
}

impl ProviderRegistry {
    /// Detect availability once and keep it.
    pub async fn detect_new(config: Config, secrets: Arc<dyn SecretSource>) -> Self {
        let http = HttpDispatch::new();
        let initial = detect(&config, secrets.as_ref(), &http).await;
        log_availability(&initial);
        Self {
            current: RwLock::new(Arc::new(initial)),
            config,
            secrets,
            http,
        }
    }

    /// Registry with a fixed starting map. `refresh` still re-detects.
    pub fn with_snapshot(
        config: Config,
        secrets: Arc<dyn SecretSource>,
        availability: Availability,
    ) -> Self {
        Self {
            current: RwLock::new(Arc::new(availability)),
            config,
            secrets,
            http: HttpDispatch::new(),
        }
    }

    pub fn snapshot(&self) -> Arc<Availability> {
        match self.current.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn is_available(&self, id: ProviderId) -> bool {
        self.snapshot().get(&id).copied().unwrap_or(false)
    }

    /// Re-run detection and replace the whole map.
    pub async fn refresh(&self) -> Arc<Availability> {
        let fresh = Arc::new(detect(&self.config, self.secrets.as_ref(), &self.http).await);
        match self.current.write() {
            Ok(mut guard) => *guard = fresh.clone(),
            Err(poisoned) => *poisoned.into_inner() = fresh.clone(),
        }
        log_availability(&fresh);
        fresh
    }

    pub fn secrets(&self) -> &Arc<dyn SecretSource> {
        &self.secrets
    }
}

/// Evaluate every provider. Never fails: a probe error reads as unavailable.
pub async fn detect(
    config: &Config,
    secrets: &dyn SecretSource,
    http: &HttpDispatch,
) -> Availability {
    let mut map = Availability::new();
    for id in ProviderId::ALL {
        let available = match id.requirement() {
            Requirement::Credential(_) => id.credential(secrets).is_some(),
            Requirement::LocalEndpoint { default_url, .. } => {
                if id.endpoint_from_env(secrets).is_some()
                    || config.endpoint_override(id).is_some()
                {
                    true
                } else {
                    http.probe(&join_url(default_url, "api/tags"), config.timeouts.probe)
                        .await
                }
            }
        };
        map.insert(id, available);
    }
    map
}

fn log_availability(map: &Availability) {
    let enabled: Vec<&str> = map
        .iter()
        .filter(|(_, on)| **on)
        .map(|(id, _)| id.as_str())
        .collect();
    if enabled.is_empty() {
        tracing::warn!("no providers available; generation will use the offline baseline");
    } else {
        tracing::info!(providers = %enabled.join(","), "provider availability");
    }
}
