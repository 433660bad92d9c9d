mod common;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use common::{MockServer, fast_config};
use sdlc_relay::dispatch::HttpDispatch;
use sdlc_relay::providers::registry::{ProviderRegistry, detect};
use sdlc_relay::providers::{ProviderId, SecretSource, availability_of};

/// Credentials that can change while the registry is alive.
#[derive(Default)]
struct RotatingSecrets(Mutex<HashMap<String, String>>);

impl RotatingSecrets {
    fn set(&self, key: &str, value: &str) {
        self.0.lock().unwrap().insert(key.to_string(), value.to_string());
    }

    fn clear(&self) {
        self.0.lock().unwrap().clear();
    }
}

impl SecretSource for RotatingSecrets {
    fn get(&self, key: &str) -> Option<String> {
        self.0.lock().unwrap().get(key).cloned()
    }
}

#[tokio::test]
async fn detect_marks_credentialed_providers() {
    let mut config = fast_config();
    config
        .endpoints
        .insert(ProviderId::Ollama, "http://127.0.0.1:9".to_string());

    let secrets: HashMap<String, String> = [
        ("GEMINI_API_KEY", "AIza-x"),
        ("V0_DEV_API_KEY", "v0-x"),
        ("GROQ_API_KEY", "   "),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();

    let map = detect(&config, &secrets, &HttpDispatch::new()).await;

    assert_eq!(map.len(), ProviderId::ALL.len());
    assert!(map[&ProviderId::Gemini]);
    assert!(map[&ProviderId::V0], "alternate v0 credential name");
    assert!(!map[&ProviderId::Groq], "blank credential counts as missing");
    assert!(!map[&ProviderId::OpenAi]);
    assert!(map[&ProviderId::Ollama], "explicit endpoint counts as configured");
}

#[tokio::test]
async fn probe_reports_live_endpoint() {
    let live = MockServer::ok(serde_json::json!({"models": []})).await;
    let http = HttpDispatch::new();

    assert!(http.probe(&format!("{}/api/tags", live.url), Duration::from_secs(2)).await);
    assert_eq!(live.hits(), 1);

    let down = MockServer::start(vec![(500, "{}".to_string())]).await;
    assert!(!http.probe(&down.url, Duration::from_secs(2)).await);

    // nothing listens on the discard port
    assert!(!http.probe("http://127.0.0.1:9/api/tags", Duration::from_millis(200)).await);
}

#[tokio::test]
async fn refresh_swaps_the_snapshot() {
    let mut config = fast_config();
    config
        .endpoints
        .insert(ProviderId::Ollama, "http://127.0.0.1:9".to_string());

    let secrets = Arc::new(RotatingSecrets::default());
    secrets.set("OPENAI_API_KEY", "sk-one");

    let registry = ProviderRegistry::detect_new(config, secrets.clone()).await;
    assert!(registry.is_available(ProviderId::OpenAi));
    assert!(!registry.is_available(ProviderId::Mistral));

    let before = registry.snapshot();

    secrets.clear();
    secrets.set("MISTRAL_API_KEY", "m-key");
    let after = registry.refresh().await;

    assert!(!after[&ProviderId::OpenAi]);
    assert!(after[&ProviderId::Mistral]);
    assert!(registry.is_available(ProviderId::Mistral));

    // a snapshot taken earlier is unaffected by the swap
    assert!(before[&ProviderId::OpenAi]);
    assert!(!before[&ProviderId::Mistral]);
}

#[tokio::test]
async fn refresh_sees_ollama_endpoint_set_after_startup() {
    let secrets = Arc::new(RotatingSecrets::default());
    let registry = ProviderRegistry::with_snapshot(fast_config(), secrets.clone(), availability_of(&[]));
    assert!(!registry.is_available(ProviderId::Ollama));

    secrets.set("OLLAMA_BASE_URL", "http://127.0.0.1:9");
    let fresh = registry.refresh().await;
    assert!(fresh[&ProviderId::Ollama]);
}

#[tokio::test]
async fn fixed_snapshot_is_replaced_by_refresh() {
    let mut config = fast_config();
    config
        .endpoints
        .insert(ProviderId::Ollama, "http://127.0.0.1:9".to_string());

    let secrets: Arc<dyn SecretSource> = Arc::new(HashMap::<String, String>::new());
    let registry =
        ProviderRegistry::with_snapshot(config, secrets, availability_of(&[ProviderId::Gemini]));
    assert!(registry.is_available(ProviderId::Gemini));

    let fresh = registry.refresh().await;
    assert!(!fresh[&ProviderId::Gemini]);
    assert!(fresh[&ProviderId::Ollama]);
}
