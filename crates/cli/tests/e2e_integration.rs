//! End-to-end tests for a MindRelay chat turn.
//!
//! These drive the real `ChatAgent` (catalog, memory manager, orchestrator
//! and HTTP vendors) against local mock servers, covering the fallback
//! ladder from the aggregator down to the exhaustion placeholder.

use std::sync::Arc;

use mindrelay_agent::{ChatAgent, StreamEvent};
use mindrelay_agent::placeholder::EXHAUSTED_LABEL;
use mindrelay_config::AppConfig;
use mindrelay_core::Vendor;
use mindrelay_core::context::ConversationContext;
use mindrelay_core::message::Role;
use mindrelay_core::model::ModelTier;
use mindrelay_providers::ModelCatalog;
use serde_json::{Value, json};
use tokio::sync::mpsc;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

// ── Helpers ──────────────────────────────────────────────────────────────

fn sse(parts: &[&str]) -> String {
    let mut body = String::new();
    for part in parts {
        body.push_str(&format!(
            "data: {}\n\n",
            json!({"choices": [{"delta": {"content": part}}]})
        ));
    }
    body.push_str("data: [DONE]\n\n");
    body
}

fn completion(text: &str) -> Value {
    json!({"choices": [{"message": {"role": "assistant", "content": text}}]})
}

async fn aggregator(models: Value, chat: ResponseTemplate) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/models"))
        .respond_with(ResponseTemplate::new(200).set_body_json(models))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(chat)
        .mount(&server)
        .await;
    server
}

fn config_for(openrouter: &MockServer) -> AppConfig {
    let mut config = AppConfig::default();
    config.vendors.openrouter.api_key = Some("or-key".into());
    config.vendors.openrouter.api_url = Some(openrouter.uri());
    config
}

async fn agent(config: AppConfig) -> ChatAgent {
    let catalog = Arc::new(ModelCatalog::new(config.base_url(Vendor::OpenRouter)));
    let agent = ChatAgent::new(config, catalog).unwrap();
    agent.initialize().await.unwrap();
    agent
}

async fn chat_models(server: &MockServer) -> Vec<String> {
    let requests: Vec<Request> = server.received_requests().await.unwrap_or_default();
    requests
        .iter()
        .filter(|r| r.url.path().ends_with("/chat/completions"))
        .filter_map(|r| r.body_json::<Value>().ok())
        .filter_map(|b| b["model"].as_str().map(String::from))
        .collect()
}

fn economy_listing() -> Value {
    json!({"data": [
        {"id": "deepseek/deepseek-r1", "name": "R1", "context_length": 64000,
         "pricing": {"prompt": "0.000001", "completion": "0.000002"}},
        {"id": "meta/llama-3-8b", "name": "Llama 3 8B", "context_length": 8192,
         "pricing": {"prompt": "0.0000001", "completion": "0.0000001"}}
    ]})
}

// ── Scenarios ────────────────────────────────────────────────────────────

#[tokio::test]
async fn mock_mode_answers_without_network() {
    let config = AppConfig {
        mock_mode: true,
        ..AppConfig::default()
    };
    let agent = agent(config).await;

    let outcome = agent
        .chat("hello", ConversationContext::default(), None)
        .await
        .unwrap();

    assert!(!outcome.response_text.trim().is_empty());
    assert_eq!(agent.orchestrator_state().active_vendor, Vendor::Mock);
    assert!(agent.catalog().is_empty());
}

#[tokio::test]
async fn missing_credentials_fail_loudly() {
    let catalog = Arc::new(ModelCatalog::openrouter());
    let err = ChatAgent::new(AppConfig::default(), catalog).err().unwrap();
    assert!(matches!(err, mindrelay_core::Error::Config { .. }));
}

#[tokio::test]
async fn streaming_turn_through_aggregator() {
    let server = aggregator(
        economy_listing(),
        ResponseTemplate::new(200)
            .insert_header("content-type", "text/event-stream")
            .set_body_string(sse(&["Hel", "lo, ", "world"])),
    )
    .await;
    let agent = agent(config_for(&server)).await;
    assert_eq!(agent.catalog().len(), 2);

    let (tx, mut rx) = mpsc::unbounded_channel();
    let outcome = agent
        .chat("hi", ConversationContext::default(), Some(&tx))
        .await
        .unwrap();
    drop(tx);

    let mut chunks = Vec::new();
    while let Some(event) = rx.recv().await {
        chunks.push(event);
    }
    assert_eq!(
        chunks,
        vec![
            StreamEvent::delta("Hel"),
            StreamEvent::delta("lo, "),
            StreamEvent::delta("world"),
        ]
    );
    assert_eq!(outcome.response_text, "Hello, world");
    assert_eq!(outcome.updated_history.len(), 2);
    assert_eq!(outcome.updated_history[1].role, Role::Assistant);

    let requests = server.received_requests().await.unwrap();
    let chat = requests
        .iter()
        .find(|r| r.url.path() == "/chat/completions")
        .unwrap();
    assert!(chat.headers.get("x-title").is_some());
    assert!(chat.headers.get("http-referer").is_some());
}

#[tokio::test]
async fn aggregator_outage_falls_back_to_xai() {
    let openrouter = aggregator(economy_listing(), ResponseTemplate::new(500)).await;

    let xai = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/models"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"data": [{"id": "grok-vision"}, {"id": "grok-2"}]})),
        )
        .mount(&xai)
        .await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion("from grok")))
        .mount(&xai)
        .await;

    let mut config = config_for(&openrouter);
    config.vendors.xai.api_key = Some("x-key".into());
    config.vendors.xai.api_url = Some(xai.uri());
    let agent = agent(config).await;

    let outcome = agent
        .chat("hi", ConversationContext::default(), None)
        .await
        .unwrap();
    assert_eq!(outcome.response_text, "from grok");

    assert_eq!(
        chat_models(&openrouter).await,
        vec!["deepseek/deepseek-chat", "deepseek/deepseek-chat", "meta/llama-3-8b"]
    );
    assert_eq!(chat_models(&xai).await, vec!["grok-2"]);

    let state = agent.orchestrator_state();
    assert_eq!(state.active_vendor, Vendor::Xai);
    assert_eq!(state.current_tier, ModelTier::CEmergency);
    assert_eq!(state.consecutive_failures, 0);
}

#[tokio::test]
async fn google_is_the_last_vendor_tried() {
    let openrouter = aggregator(json!({"data": []}), ResponseTemplate::new(502)).await;

    let xai = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&xai)
        .await;

    let google = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/models/gemini-1.5-flash:generateContent"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "candidates": [{"content": {"role": "model", "parts": [{"text": "from gemini"}]}}]
        })))
        .mount(&google)
        .await;

    let mut config = config_for(&openrouter);
    config.vendors.xai.api_key = Some("x-key".into());
    config.vendors.xai.api_url = Some(xai.uri());
    config.vendors.google.api_key = Some("g-key".into());
    config.vendors.google.api_url = Some(google.uri());
    let agent = agent(config).await;

    let outcome = agent
        .chat("hi", ConversationContext::default(), None)
        .await
        .unwrap();
    assert_eq!(outcome.response_text, "from gemini");
    assert_eq!(agent.orchestrator_state().active_vendor, Vendor::Google);

    // The system prompt went to systemInstruction, not into contents.
    let requests = google.received_requests().await.unwrap();
    let body: Value = requests[0].body_json().unwrap();
    assert!(body["systemInstruction"]["parts"][0]["text"]
        .as_str()
        .unwrap()
        .contains("[MEMORY CONTEXT]"));
    assert_eq!(body["contents"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn repeated_failures_end_in_labeled_placeholder() {
    let openrouter = aggregator(economy_listing(), ResponseTemplate::new(500)).await;
    let agent = agent(config_for(&openrouter)).await;

    let outcome = agent
        .chat("hello", ConversationContext::default(), None)
        .await
        .unwrap();

    assert!(outcome.response_text.starts_with(EXHAUSTED_LABEL));
    assert_eq!(chat_models(&openrouter).await.len(), 5);
    assert_eq!(agent.orchestrator_state().consecutive_failures, 5);
    assert_eq!(outcome.updated_history.len(), 2);
}

#[tokio::test]
async fn empty_stream_is_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/models"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/event-stream")
                .set_body_string("data: [DONE]\n\n"),
        )
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/event-stream")
                .set_body_string(sse(&["second try"])),
        )
        .mount(&server)
        .await;

    let agent = agent(config_for(&server)).await;
    let (tx, mut rx) = mpsc::unbounded_channel();
    let outcome = agent
        .chat("hi", ConversationContext::default(), Some(&tx))
        .await
        .unwrap();
    drop(tx);

    assert_eq!(outcome.response_text, "second try");
    // Nothing reached the caller from the empty attempt, so no restart.
    assert_eq!(rx.recv().await, Some(StreamEvent::delta("second try")));
    assert_eq!(rx.recv().await, None);
    assert_eq!(chat_models(&server).await.len(), 2);
}

#[tokio::test]
async fn catalog_outage_does_not_block_chat() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/models"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion("still here")))
        .mount(&server)
        .await;

    let agent = agent(config_for(&server)).await;
    assert!(agent.is_initialized());
    assert!(agent.catalog().is_empty());

    let outcome = agent
        .chat("hi", ConversationContext::default(), None)
        .await
        .unwrap();
    assert_eq!(outcome.response_text, "still here");
}

#[tokio::test]
async fn history_grows_but_requests_stay_windowed() {
    let server = aggregator(json!([]), ResponseTemplate::new(200).set_body_json(completion("ok"))).await;
    let agent = agent(config_for(&server)).await;

    let mut context = ConversationContext::new("persona");
    for i in 0..40 {
        let outcome = agent
            .chat(&format!("turn {i}"), context.clone(), None)
            .await
            .unwrap();
        context.history = outcome.updated_history;
    }
    assert_eq!(context.history.len(), 80);

    let requests = server.received_requests().await.unwrap();
    let last: Value = requests.last().unwrap().body_json().unwrap();
    // system prompt + the 30-message window
    assert_eq!(last["messages"].as_array().unwrap().len(), 31);
}
