//! Native Google Gemini provider.
//!
//! Gemini does not speak the chat-completions dialect:
//! - System messages go in a separate `systemInstruction`
//! - The assistant role is called `model`
//! - Streaming uses `:streamGenerateContent?alt=sse` and simply ends at EOF

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use mindrelay_core::error::ProviderError;
use mindrelay_core::message::{Message, Role};
use mindrelay_core::provider::*;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::http::{build_client, check_status, network_error};
use crate::sse::{LineBuffer, data_payload};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

pub struct GeminiProvider {
    api_key: String,
    base_url: String,
    client: reqwest::Client,
}

impl GeminiProvider {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            client: build_client(),
        }
    }

    /// Override the base URL (for proxies or tests).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Split system messages out and map the rest to Gemini `contents`.
    fn build_body(messages: &[Message]) -> GeminiRequest {
        let system_text: Vec<&str> = messages
            .iter()
            .filter(|m| m.role == Role::System)
            .map(|m| m.content.as_str())
            .collect();

        let system_instruction = (!system_text.is_empty()).then(|| GeminiContent {
            role: None,
            parts: vec![GeminiPart {
                text: Some(system_text.join("\n\n")),
            }],
        });

        let contents = messages
            .iter()
            .filter(|m| m.role != Role::System)
            .map(|m| GeminiContent {
                role: Some(
                    match m.role {
                        Role::Assistant => "model",
                        _ => "user",
                    }
                    .to_string(),
                ),
                parts: vec![GeminiPart {
                    text: Some(m.content.clone()),
                }],
            })
            .collect();

        GeminiRequest {
            system_instruction,
            contents,
        }
    }

    async fn post(
        &self,
        url: String,
        body: &GeminiRequest,
    ) -> Result<reqwest::Response, ProviderError> {
        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(network_error)?;
        check_status("google", response).await
    }
}

#[async_trait]
impl mindrelay_core::Provider for GeminiProvider {
    fn name(&self) -> &str {
        "google"
    }

    async fn complete(&self, request: ChatRequest) -> Result<ChatResponse, ProviderError> {
        debug!(model = %request.model, "Sending Gemini request");

        let url = format!("{}/models/{}:generateContent", self.base_url, request.model);
        let response = self.post(url, &Self::build_body(&request.messages)).await?;

        let api_response: GeminiResponse =
            response.json().await.map_err(|e| ProviderError::ApiError {
                status_code: 200,
                message: format!("Failed to parse Gemini response: {e}"),
            })?;

        Ok(ChatResponse {
            content: api_response.text(),
            usage: api_response.usage_metadata.map(UsageMetadata::into_usage),
            model: request.model,
        })
    }

    async fn stream(&self, request: ChatRequest) -> Result<ChunkReceiver, ProviderError> {
        debug!(model = %request.model, "Sending Gemini streaming request");

        let url = format!(
            "{}/models/{}:streamGenerateContent?alt=sse",
            self.base_url, request.model
        );
        let response = self.post(url, &Self::build_body(&request.messages)).await?;

        let (tx, rx) = mpsc::channel(64);
        tokio::spawn(async move {
            decode_gemini_stream(response.bytes_stream(), tx).await;
        });

        Ok(rx)
    }

    async fn list_models(&self) -> Result<Vec<String>, ProviderError> {
        let url = format!("{}/models", self.base_url);
        let response = self
            .client
            .get(&url)
            .header("x-goog-api-key", &self.api_key)
            .send()
            .await
            .map_err(network_error)?;
        let response = check_status("google", response).await?;

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        let models = body["models"]
            .as_array()
            .map(|arr| {
                arr.iter()
                    .filter_map(|m| m["name"].as_str())
                    .map(|name| name.trim_start_matches("models/").to_string())
                    .collect()
            })
            .unwrap_or_default();

        Ok(models)
    }
}

/// Text carried by one `data:` line, if any.
fn line_text(line: &str) -> Option<String> {
    let data = data_payload(line)?;
    match serde_json::from_str::<GeminiResponse>(data) {
        Ok(resp) => Some(resp.text()).filter(|t| !t.is_empty()),
        Err(e) => {
            trace!(data = %data, error = %e, "Ignoring unparseable Gemini chunk");
            None
        }
    }
}

/// Decode a Gemini SSE body. There is no sentinel; the stream is complete
/// when the body ends.
pub(crate) async fn decode_gemini_stream<S, B, E>(
    mut body: S,
    tx: mpsc::Sender<Result<StreamChunk, ProviderError>>,
) where
    S: Stream<Item = Result<B, E>> + Unpin,
    B: AsRef<[u8]>,
    E: std::fmt::Display,
{
    let mut buffer = LineBuffer::new();

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
            if let Some(text) = line_text(&line) {
                if tx.send(Ok(StreamChunk::delta(text))).await.is_err() {
                    return;
                }
            }
        }
    }

    if let Some(text) = buffer.finish().as_deref().and_then(line_text) {
        if tx.send(Ok(StreamChunk::delta(text))).await.is_err() {
            return;
        }
    }

    let _ = tx.send(Ok(StreamChunk::finished())).await;
}

// --- Gemini API types (internal) ---

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiContent>,
    contents: Vec<GeminiContent>,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiPart {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    #[serde(default)]
    usage_metadata: Option<UsageMetadata>,
}

impl GeminiResponse {
    /// Concatenated text of the first candidate.
    fn text(&self) -> String {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|content| {
                content
                    .parts
                    .iter()
                    .filter_map(|p| p.text.as_deref())
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    #[serde(default)]
    content: Option<GeminiContent>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
    #[serde(default)]
    total_token_count: u32,
}

impl UsageMetadata {
    fn into_usage(self) -> Usage {
        Usage {
            prompt_tokens: self.prompt_token_count,
            completion_tokens: self.candidates_token_count,
            total_tokens: self.total_token_count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mindrelay_core::Provider;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn gemini_line(text: &str) -> String {
        format!(
            "data: {}\r\n\r\n",
            serde_json::json!({"candidates": [{"content": {"role": "model", "parts": [{"text": text}]}}]})
        )
    }

    #[test]
    fn system_messages_become_instruction() {
        let body = GeminiProvider::build_body(&[
            Message::system("persona"),
            Message::user("hi"),
            Message::assistant("hello"),
            Message::user("how are you"),
        ]);
        let json = serde_json::to_value(&body).unwrap();

        assert_eq!(json["systemInstruction"]["parts"][0]["text"], "persona");
        let contents = json["contents"].as_array().unwrap();
        assert_eq!(contents.len(), 3);
        assert_eq!(contents[0]["role"], "user");
        assert_eq!(contents[1]["role"], "model");
        assert_eq!(contents[2]["parts"][0]["text"], "how are you");
    }

    #[test]
    fn no_system_message_omits_instruction() {
        let body = GeminiProvider::build_body(&[Message::user("hi")]);
        let json = serde_json::to_value(&body).unwrap();
        assert!(json.get("systemInstruction").is_none());
    }

    #[test]
    fn response_text_joins_parts() {
        let resp: GeminiResponse = serde_json::from_value(serde_json::json!({
            "candidates": [{"content": {"parts": [{"text": "Hel"}, {"text": "lo"}]}}]
        }))
        .unwrap();
        assert_eq!(resp.text(), "Hello");

        let empty: GeminiResponse = serde_json::from_str("{}").unwrap();
        assert_eq!(empty.text(), "");
    }

    #[tokio::test]
    async fn stream_ends_at_eof() {
        let chunks: Vec<Result<Vec<u8>, std::io::Error>> = vec![
            Ok(gemini_line("Hel").into_bytes()),
            Ok(b"data: {oops\n".to_vec()),
            Ok(gemini_line("lo").into_bytes()),
        ];
        let (tx, mut rx) = mpsc::channel(16);
        decode_gemini_stream(futures::stream::iter(chunks), tx).await;

        let mut text = String::new();
        let mut saw_done = false;
        while let Some(chunk) = rx.recv().await {
            let chunk = chunk.unwrap();
            if let Some(c) = chunk.content {
                text.push_str(&c);
            }
            saw_done |= chunk.done;
        }
        assert_eq!(text, "Hello");
        assert!(saw_done);
    }

    #[tokio::test]
    async fn complete_against_mock_server() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/models/gemini-1.5-flash:generateContent"))
            .and(header("x-goog-api-key", "g-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "candidates": [{"content": {"role": "model", "parts": [{"text": "Hi there"}]}}],
                "usageMetadata": {"promptTokenCount": 4, "candidatesTokenCount": 2, "totalTokenCount": 6}
            })))
            .mount(&server)
            .await;

        let provider = GeminiProvider::new("g-key").with_base_url(server.uri());
        let resp = provider
            .complete(ChatRequest::new("gemini-1.5-flash", vec![Message::user("hi")]))
            .await
            .unwrap();
        assert_eq!(resp.content, "Hi there");
        assert_eq!(resp.usage.unwrap().total_tokens, 6);
    }

    #[tokio::test]
    async fn stream_against_mock_server() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/models/gemini-1.5-flash:streamGenerateContent"))
            .and(query_param("alt", "sse"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string(format!("{}{}", gemini_line("Good "), gemini_line("day"))),
            )
            .mount(&server)
            .await;

        let provider = GeminiProvider::new("g-key").with_base_url(server.uri());
        let mut rx = provider
            .stream(ChatRequest::new("gemini-1.5-flash", vec![Message::user("hi")]).streaming())
            .await
            .unwrap();

        let mut text = String::new();
        while let Some(chunk) = rx.recv().await {
            let chunk = chunk.unwrap();
            if let Some(c) = chunk.content {
                text.push_str(&c);
            }
        }
        assert_eq!(text, "Good day");
    }

    #[tokio::test]
    async fn rate_limit_is_mapped() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "12"))
            .mount(&server)
            .await;

        let provider = GeminiProvider::new("g-key").with_base_url(server.uri());
        let err = provider
            .complete(ChatRequest::new("gemini-1.5-flash", vec![Message::user("hi")]))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::RateLimited { retry_after_secs: 12 }));
    }

    #[tokio::test]
    async fn list_models_strips_prefix() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/models"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "models": [{"name": "models/gemini-1.5-flash"}, {"name": "models/gemini-pro"}]
            })))
            .mount(&server)
            .await;

        let provider = GeminiProvider::new("g-key").with_base_url(server.uri());
        assert_eq!(
            provider.list_models().await.unwrap(),
            vec!["gemini-1.5-flash", "gemini-pro"]
        );
    }
}
