mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use common::{MockServer, chat_completion, fast_config, gemini_reply, secrets};
use image::{ImageFormat, Rgb, RgbImage};
use sdlc_relay::adapters::{Adapter, Completion};
use sdlc_relay::config::Config;
use sdlc_relay::dispatch::{HttpBody, HttpCall};
use sdlc_relay::error::RelayError;
use sdlc_relay::providers::registry::ProviderRegistry;
use sdlc_relay::providers::{Availability, ProviderId, SecretSource, availability_of};
use sdlc_relay::router::{
    BASELINE_MODEL, GenerationRequest, InferenceRouter, ProviderLabel, candidate_order,
};

use ProviderId::*;

fn router_with(config: &Config, secrets: Arc<dyn SecretSource>, available: &[ProviderId]) -> InferenceRouter {
    let registry = ProviderRegistry::with_snapshot(config.clone(), secrets, availability_of(available));
    InferenceRouter::new(config, Arc::new(registry))
}

// ---------------------------------------------------------------------------
// Candidate ordering
// ---------------------------------------------------------------------------

#[test]
fn candidate_order_holds_for_every_availability_subset() {
    let default = [Gemini, Groq, Mistral, HuggingFace, Ollama, Perplexity, OpenAi];
    let preferences: [&[ProviderId]; 5] = [
        &[],
        &[OpenAi],
        &[V0, Mistral],
        &[Mistral, Gemini, Mistral],
        &[Ollama, V0, OpenAi, Gemini],
    ];

    for mask in 0u32..(1 << ProviderId::ALL.len()) {
        let available: Vec<ProviderId> = ProviderId::ALL
            .into_iter()
            .enumerate()
            .filter(|(i, _)| mask & (1 << i) != 0)
            .map(|(_, p)| p)
            .collect();
        let a: Availability = availability_of(&available);

        for pref in preferences {
            let order = candidate_order(Some(pref), &a, &default);

            // only available providers, no duplicates
            for (i, p) in order.iter().enumerate() {
                assert!(a[p], "unavailable {p} in {order:?}");
                assert!(!order[i + 1..].contains(p), "duplicate {p} in {order:?}");
            }

            // preferred-and-available come first, in preference order
            let mut expected_head: Vec<ProviderId> = Vec::new();
            for p in pref {
                if a[p] && !expected_head.contains(p) {
                    expected_head.push(*p);
                }
            }
            assert_eq!(&order[..expected_head.len()], expected_head.as_slice());

            // then the rest of the default order
            let expected_tail: Vec<ProviderId> = default
                .iter()
                .copied()
                .filter(|p| a[p] && !expected_head.contains(p))
                .collect();
            assert_eq!(&order[expected_head.len()..], expected_tail.as_slice());
        }
    }
}

#[test]
fn v0_only_reachable_by_preference() {
    let a = availability_of(&ProviderId::ALL);
    let config = Config::default();
    assert!(!candidate_order(None, &a, &config.routing.text_order).contains(&V0));
    assert!(!candidate_order(None, &a, &config.routing.code_order).contains(&V0));
    assert_eq!(candidate_order(Some(&[V0]), &a, &config.routing.code_order)[0], V0);
}

// ---------------------------------------------------------------------------
// Routing against mock providers
// ---------------------------------------------------------------------------

#[tokio::test]
async fn failing_provider_is_retried_then_next_provider_wins() {
    let mistral = MockServer::start(vec![(500, r#"{"error":"boom"}"#.to_string())]).await;
    let openai = MockServer::ok(chat_completion("hello from openai", 42)).await;

    let mut config = fast_config();
    config.routing.text_order = vec![Gemini, Mistral, OpenAi];
    config.endpoints.insert(Mistral, mistral.url.clone());
    config.endpoints.insert(OpenAi, openai.url.clone());

    let router = router_with(
        &config,
        secrets(&[("MISTRAL_API_KEY", "m-key"), ("OPENAI_API_KEY", "o-key")]),
        &[Mistral, OpenAi],
    );

    let result = router.route(&GenerationRequest::text("hi")).await;

    assert!(!result.fallback);
    assert_eq!(result.provider, ProviderLabel::Provider(OpenAi));
    assert_eq!(result.text, "hello from openai");
    assert_eq!(result.model, "mock-model");
    assert_eq!(result.tokens, 42);
    assert!(!result.tokens_estimated);
    assert_eq!(mistral.hits(), 3, "mistral should get max_attempts calls");
    assert_eq!(openai.hits(), 1);
    assert_eq!(result.attempts.len(), 1);
    assert_eq!(result.attempts[0].provider, Mistral);
}

#[tokio::test]
async fn first_success_stops_the_loop() {
    let gemini = MockServer::ok(gemini_reply("from gemini")).await;
    let groq = MockServer::ok(chat_completion("from groq", 1)).await;

    let mut config = fast_config();
    config.routing.text_order = vec![Gemini, Groq];
    config.endpoints.insert(Gemini, gemini.url.clone());
    config.endpoints.insert(Groq, groq.url.clone());

    let router = router_with(
        &config,
        secrets(&[("GEMINI_API_KEY", "g"), ("GROQ_API_KEY", "q")]),
        &[Gemini, Groq],
    );

    let result = router.route(&GenerationRequest::text("hi")).await;
    assert_eq!(result.provider, ProviderLabel::Provider(Gemini));
    assert_eq!(result.text, "from gemini");
    assert_eq!(result.tokens, 12);
    assert_eq!(gemini.hits(), 1);
    assert_eq!(groq.hits(), 0, "later candidates must not be called");
}

#[tokio::test]
async fn preference_overrides_default_order() {
    let gemini = MockServer::ok(gemini_reply("from gemini")).await;
    let groq = MockServer::ok(chat_completion("from groq", 1)).await;

    let mut config = fast_config();
    config.routing.text_order = vec![Gemini, Groq];
    config.endpoints.insert(Gemini, gemini.url.clone());
    config.endpoints.insert(Groq, groq.url.clone());

    let router = router_with(
        &config,
        secrets(&[("GEMINI_API_KEY", "g"), ("GROQ_API_KEY", "q")]),
        &[Gemini, Groq],
    );

    let result = router
        .route(&GenerationRequest::text("hi").prefer([Groq]))
        .await;
    assert_eq!(result.provider, ProviderLabel::Provider(Groq));
    assert_eq!(gemini.hits(), 0);
}

#[tokio::test]
async fn auth_failure_is_retried_like_any_non_2xx() {
    let openai = MockServer::start(vec![(401, r#"{"error":"bad key"}"#.to_string())]).await;

    let mut config = fast_config();
    config.routing.text_order = vec![OpenAi];
    config.endpoints.insert(OpenAi, openai.url.clone());

    let router = router_with(&config, secrets(&[("OPENAI_API_KEY", "bad")]), &[OpenAi]);
    let result = router.route(&GenerationRequest::text("hi")).await;

    assert!(result.fallback);
    assert_eq!(openai.hits(), 3);
    assert_eq!(result.attempts.len(), 1);
    assert!(result.attempts[0].reason.contains("authentication failed"));
}

#[tokio::test]
async fn transient_failure_then_success_on_same_provider() {
    let groq = MockServer::start(vec![
        (503, "{}".to_string()),
        (200, "not json".to_string()),
        (200, chat_completion("third time", 9).to_string()),
    ])
    .await;

    let mut config = fast_config();
    config.routing.text_order = vec![Groq];
    config.endpoints.insert(Groq, groq.url.clone());

    let router = router_with(&config, secrets(&[("GROQ_API_KEY", "k")]), &[Groq]);
    let result = router.route(&GenerationRequest::text("hi")).await;

    assert!(!result.fallback);
    assert_eq!(result.text, "third time");
    assert_eq!(groq.hits(), 3);
    assert!(result.attempts.is_empty());
}

#[tokio::test]
async fn no_available_provider_yields_baseline() {
    let config = fast_config();
    let router = router_with(&config, secrets(&[]), &[]);

    let result = router.route(&GenerationRequest::text("make a todo app")).await;
    assert!(result.fallback);
    assert_eq!(result.provider, ProviderLabel::Local);
    assert_eq!(result.model, BASELINE_MODEL);
    assert_eq!(result.text, "[baseline] You asked: make a todo app");
    assert!(result.attempts.is_empty());

    let code = router.route_code("make a todo app", None).await;
    assert!(code.fallback);
    assert_eq!(code.files, Some(Default::default()));
}

#[tokio::test]
async fn all_providers_failing_yields_baseline_with_attempts() {
    let bad = MockServer::start(vec![(500, "{}".to_string())]).await;

    let mut config = fast_config();
    config.retry.max_attempts = 1;
    config.routing.text_order = vec![Mistral, Groq];
    config.endpoints.insert(Mistral, bad.url.clone());
    config.endpoints.insert(Groq, bad.url.clone());

    let router = router_with(
        &config,
        secrets(&[("MISTRAL_API_KEY", "m"), ("GROQ_API_KEY", "q")]),
        &[Mistral, Groq],
    );
    let result = router.route(&GenerationRequest::text("x")).await;

    assert!(result.fallback);
    let tried: Vec<ProviderId> = result.attempts.iter().map(|a| a.provider).collect();
    assert_eq!(tried, vec![Mistral, Groq]);
    assert_eq!(bad.hits(), 2);
}

#[tokio::test]
async fn route_code_extracts_fenced_file_map() {
    let reply = "Here you go:\n```json\n{\"main.py\": \"print('hi')\", \"README.md\": \"# x\"}\n```\n";
    let perplexity = MockServer::ok(chat_completion(reply, 30)).await;

    let mut config = fast_config();
    config.routing.code_order = vec![Perplexity];
    config.endpoints.insert(Perplexity, perplexity.url.clone());

    let router = router_with(&config, secrets(&[("PERPLEXITY_API_KEY", "p")]), &[Perplexity]);
    let result = router.route_code("a script", None).await;

    let files = result.files.unwrap();
    assert_eq!(files.len(), 2);
    assert_eq!(files["main.py"], "print('hi')");

    // the structured instruction is sent along with the prompt
    let sent = perplexity.request_bodies().join("\n");
    assert!(sent.contains("JSON object mapping relative file paths"));
    assert!(sent.contains("a script"));
}

#[tokio::test]
async fn route_code_prose_reply_gives_empty_map() {
    let mistral = MockServer::ok(chat_completion("Sorry, I can't help with that.", 5)).await;

    let mut config = fast_config();
    config.routing.code_order = vec![Mistral];
    config.endpoints.insert(Mistral, mistral.url.clone());

    let router = router_with(&config, secrets(&[("MISTRAL_API_KEY", "m")]), &[Mistral]);
    let result = router.route_code("x", None).await;

    assert!(!result.fallback);
    assert_eq!(result.provider, ProviderLabel::Provider(Mistral));
    assert!(result.files.unwrap().is_empty());
}

// ---------------------------------------------------------------------------
// Custom adapters
// ---------------------------------------------------------------------------

struct CountingAdapter {
    id: ProviderId,
    url: String,
    calls: Arc<AtomicUsize>,
}

impl Adapter for CountingAdapter {
    fn id(&self) -> ProviderId {
        self.id
    }

    fn model(&self) -> &str {
        "counting-model"
    }

    fn build_request(
        &self,
        prompt: &str,
        _secrets: &dyn SecretSource,
        timeout: Duration,
    ) -> Result<HttpCall, RelayError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(HttpCall {
            url: self.url.clone(),
            headers: vec![],
            body: HttpBody::Json(serde_json::json!({ "prompt": prompt })),
            timeout,
        })
    }

    fn parse_response(&self, body: &[u8]) -> Result<Completion, RelayError> {
        let text = String::from_utf8_lossy(body).into_owned();
        Ok(Completion::new(text, None, None))
    }
}

#[tokio::test]
async fn replaced_adapter_is_used_and_tokens_estimated() {
    let server = MockServer::start(vec![(200, "abcdefgh".to_string())]).await;
    let calls = Arc::new(AtomicUsize::new(0));

    let mut config = fast_config();
    config.routing.text_order = vec![Groq];
    let router = router_with(&config, secrets(&[]), &[Groq]).with_adapter(Arc::new(CountingAdapter {
        id: Groq,
        url: server.url.clone(),
        calls: calls.clone(),
    }));

    let result = router.route(&GenerationRequest::text("hi")).await;
    assert_eq!(result.text, "abcdefgh");
    assert_eq!(result.model, "counting-model");
    assert_eq!(result.tokens, 2);
    assert!(result.tokens_estimated);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

// ---------------------------------------------------------------------------
// Vision
// ---------------------------------------------------------------------------

fn png(color: [u8; 3]) -> Vec<u8> {
    let img = RgbImage::from_pixel(40, 40, Rgb(color));
    let mut buf = std::io::Cursor::new(Vec::new());
    img.write_to(&mut buf, ImageFormat::Png).unwrap();
    buf.into_inner()
}

#[tokio::test]
async fn vision_uses_hf_when_available() {
    let hf = MockServer::ok(serde_json::json!([
        {"label": "tabby cat", "score": 0.91},
        {"label": "tiger", "score": 0.05}
    ]))
    .await;

    let mut config = fast_config();
    config.endpoints.insert(HuggingFace, hf.url.clone());
    let router = router_with(&config, secrets(&[("HF_API_KEY", "hf_x")]), &[HuggingFace]);

    let label = router.route_vision(&png([200, 200, 200])).await.unwrap();
    assert!(!label.fallback);
    assert_eq!(label.label, "tabby cat");
    assert!((label.confidence - 0.91).abs() < 1e-9);
    assert_eq!(label.provider, ProviderLabel::Provider(HuggingFace));
}

#[tokio::test]
async fn vision_falls_back_to_brightness() {
    let router = router_with(&fast_config(), secrets(&[]), &[]);

    let dark = router.route_vision(&png([10, 10, 10])).await.unwrap();
    assert!(dark.fallback);
    assert_eq!(dark.label, "cow");
    assert!((dark.confidence - 0.65).abs() < 1e-9);
    assert_eq!(dark.provider, ProviderLabel::Local);

    let bright = router.route_vision(&png([250, 250, 250])).await.unwrap();
    assert_eq!(bright.label, "cat");
}

#[tokio::test]
async fn vision_rejects_undecodable_bytes() {
    let router = router_with(&fast_config(), secrets(&[]), &[]);
    let err = router.route_vision(b"not an image").await.unwrap_err();
    assert!(matches!(err, RelayError::InvalidImage(_)));
}
