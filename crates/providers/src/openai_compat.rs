//! OpenAI-compatible provider implementation.
//!
//! Works with: the OpenRouter aggregator (primary path) and xAI's native
//! endpoint, plus any other `/chat/completions`-compatible API.
//!
//! Supports:
//! - Chat completions (non-streaming and streaming SSE)
//! - Model listing

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use mindrelay_core::error::ProviderError;
use mindrelay_core::message::Message;
use mindrelay_core::provider::*;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::http::{build_client, check_status, network_error};
use crate::sse::{DONE_SENTINEL, LineBuffer, data_payload};

/// An OpenAI-compatible LLM provider.
pub struct OpenAiCompatProvider {
    name: String,
    base_url: String,
    api_key: String,
    extra_headers: Vec<(String, String)>,
    client: reqwest::Client,
}

impl OpenAiCompatProvider {
    /// Create a new OpenAI-compatible provider.
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            extra_headers: Vec::new(),
            client: build_client(),
        }
    }

    /// Create an OpenRouter provider (convenience constructor).
    pub fn openrouter(api_key: impl Into<String>) -> Self {
        Self::new("openrouter", "https://openrouter.ai/api/v1", api_key)
    }

    /// Create an xAI provider (convenience constructor).
    pub fn xai(api_key: impl Into<String>) -> Self {
        Self::new("xai", "https://api.x.ai/v1", api_key)
    }

    /// Attach a header sent with every request (e.g. `X-Title`).
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_headers.push((name.into(), value.into()));
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn body(request: &ChatRequest, stream: bool) -> serde_json::Value {
        serde_json::json!({
            "model": request.model,
            "messages": Self::to_api_messages(&request.messages),
            "stream": stream,
        })
    }

    /// Convert our Message types to OpenAI API format.
    fn to_api_messages(messages: &[Message]) -> Vec<ApiMessage> {
        messages
            .iter()
            .map(|m| ApiMessage {
                role: m.role.as_str().to_string(),
                content: Some(m.content.clone()),
            })
            .collect()
    }

    async fn post(
        &self,
        body: &serde_json::Value,
        accept: Option<&str>,
    ) -> Result<reqwest::Response, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url);
        let mut builder = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json");
        if let Some(accept) = accept {
            builder = builder.header("Accept", accept);
        }
        for (name, value) in &self.extra_headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = builder.json(body).send().await.map_err(network_error)?;
        check_status(&self.name, response).await
    }
}

#[async_trait]
impl mindrelay_core::Provider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, request: ChatRequest) -> Result<ChatResponse, ProviderError> {
        debug!(provider = %self.name, model = %request.model, "Sending completion request");

        let response = self.post(&Self::body(&request, false), None).await?;

        let api_response: ApiResponse =
            response.json().await.map_err(|e| ProviderError::ApiError {
                status_code: 200,
                message: format!("Failed to parse response: {e}"),
            })?;

        let content = api_response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();

        let usage = api_response.usage.map(ApiUsage::into_usage);

        Ok(ChatResponse {
            content,
            usage,
            model: api_response.model.unwrap_or(request.model),
        })
    }

    async fn stream(&self, request: ChatRequest) -> Result<ChunkReceiver, ProviderError> {
        debug!(provider = %self.name, model = %request.model, "Sending streaming request");

        let response = self
            .post(&Self::body(&request, true), Some("text/event-stream"))
            .await?;

        let (tx, rx) = mpsc::channel(64);
        let provider_name = self.name.clone();

        // The task owns the body; it is dropped (and the connection released)
        // as soon as the stream ends or the receiver goes away.
        tokio::spawn(async move {
            decode_chat_stream(response.bytes_stream(), &provider_name, tx).await;
        });

        Ok(rx)
    }

    async fn list_models(&self) -> Result<Vec<String>, ProviderError> {
        let url = format!("{}/models", self.base_url);
        let response = self
            .client
            .get(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .send()
            .await
            .map_err(network_error)?;

        let response = check_status(&self.name, response).await?;

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        let models = body["data"]
            .as_array()
            .map(|arr| {
                arr.iter()
                    .filter_map(|m| m["id"].as_str().map(String::from))
                    .collect()
            })
            .unwrap_or_default();

        Ok(models)
    }
}

/// What one SSE line means for an OpenAI-compatible stream.
#[derive(Debug, PartialEq)]
enum LineEvent {
    Delta(String),
    Usage(Usage),
    Done,
    Skip,
}

fn parse_line(line: &str) -> LineEvent {
    let Some(data) = data_payload(line) else {
        return LineEvent::Skip;
    };

    if data == DONE_SENTINEL {
        return LineEvent::Done;
    }

    match serde_json::from_str::<StreamResponse>(data) {
        Ok(resp) => {
            let delta = resp
                .choices
                .into_iter()
                .next()
                .and_then(|c| c.delta.content)
                .filter(|c| !c.is_empty());
            match (delta, resp.usage) {
                (Some(text), _) => LineEvent::Delta(text),
                (None, Some(usage)) => LineEvent::Usage(usage.into_usage()),
                (None, None) => LineEvent::Skip,
            }
        }
        Err(e) => {
            trace!(data = %data, error = %e, "Ignoring unparseable SSE chunk");
            LineEvent::Skip
        }
    }
}

/// Decode an OpenAI-style `data: {...}` byte stream into chunks on `tx`.
///
/// Always ends with a `done` chunk unless the body errors or the receiver
/// is dropped.
pub(crate) async fn decode_chat_stream<S, B, E>(
    mut body: S,
    provider: &str,
    tx: mpsc::Sender<Result<StreamChunk, ProviderError>>,
) where
    S: Stream<Item = Result<B, E>> + Unpin,
    B: AsRef<[u8]>,
    E: std::fmt::Display,
{
    let mut buffer = LineBuffer::new();
    let mut usage = None;

    while let Some(next) = body.next().await {
        let bytes = match next {
            Ok(b) => b,
            Err(e) => {
                let _ = tx
                    .send(Err(ProviderError::StreamInterrupted(e.to_string())))
                    .await;
                return;
            }
        };

        for line in buffer.push(bytes.as_ref()) {
            match parse_line(&line) {
                LineEvent::Delta(text) => {
                    if tx.send(Ok(StreamChunk::delta(text))).await.is_err() {
                        return; // receiver dropped
                    }
                }
                LineEvent::Usage(u) => usage = Some(u),
                LineEvent::Done => {
                    let _ = tx.send(Ok(finished(usage))).await;
                    return;
                }
                LineEvent::Skip => {}
            }
        }
    }

    // Stream ended without [DONE]; the tail may still hold a full event.
    if let Some(line) = buffer.finish() {
        if let LineEvent::Delta(text) = parse_line(&line) {
            if tx.send(Ok(StreamChunk::delta(text))).await.is_err() {
                return;
            }
        }
    }

    trace!(provider, "Stream closed without terminal sentinel");
    let _ = tx.send(Ok(finished(usage))).await;
}

fn finished(usage: Option<Usage>) -> StreamChunk {
    StreamChunk {
        usage,
        ..StreamChunk::finished()
    }
}

// --- OpenAI API types (internal) ---

#[derive(Debug, Serialize, Deserialize)]
struct ApiMessage {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    choices: Vec<ApiChoice>,
    #[serde(default)]
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiMessage,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

impl ApiUsage {
    fn into_usage(self) -> Usage {
        Usage {
            prompt_tokens: self.prompt_tokens,
            completion_tokens: self.completion_tokens,
            total_tokens: self.total_tokens,
        }
    }
}

// --- Streaming SSE types ---

/// A single SSE `data: {...}` chunk from a streaming response.
#[derive(Debug, Deserialize)]
struct StreamResponse {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    #[serde(default)]
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
}

#[derive(Debug, Default, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}
