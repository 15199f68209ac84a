//! OpenAI-compatible streaming token source
//!
//! Works with OpenAI, Azure OpenAI, vLLM, Ollama, and other OpenAI-compatible APIs.

use super::*;
use reqwest::Client;
use serde::{Deserialize, Serialize};

/// OpenAI-compatible provider
pub struct OpenAIProvider {
    client: Client,
    config: ProviderConfig,
}

impl OpenAIProvider {
    pub fn new(config: ProviderConfig) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs.unwrap_or(120)))
            .build()
            .map_err(|e| ProviderError::Other(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    fn base_url(&self) -> &str {
        self.config.base_url.as_deref().unwrap_or("https://api.openai.com/v1")
    }

    pub fn default_model(&self) -> &str {
        self.config.default_model.as_deref().unwrap_or("gpt-4")
    }
}

impl TokenSource for OpenAIProvider {
    fn name(&self) -> &str {
        "openai"
    }

    async fn open_stream(&self, request: CompletionRequest) -> Result<StreamReceiver, ProviderError> {
        let model = request.model.as_deref().unwrap_or(self.default_model());

        let api_request = OpenAIRequest {
            model: model.to_string(),
            messages: request.messages.iter().map(OpenAIMessage::from).collect(),
            temperature: request.temperature.or(self.config.temperature),
            max_tokens: request.max_tokens,
            stream: true,
            user: request.user.clone(),
        };

        let mut req = self.client
            .post(format!("{}/chat/completions", self.base_url()))
            .json(&api_request);

        if let Some(api_key) = &self.config.api_key {
            if !api_key.is_empty() {
                req = req.header("Authorization", format!("Bearer {}", api_key));
            }
        }

        for (key, value) in &self.config.headers {
            req = req.header(key, value);
        }

        let response = req.send().await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        let status = response.status().as_u16();
        if !response.status().is_success() {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok());
            let text = response.text().await.unwrap_or_default();

            return Err(match status {
                429 => ProviderError::RateLimited { retry_after },
                401 => ProviderError::AuthenticationFailed,
                _ => ProviderError::Api { status, message: text },
            });
        }

        // Create async stream from SSE response
        let stream = async_stream::stream! {
            use futures_util::StreamExt;

            let mut byte_stream = response.bytes_stream();
            let mut buffer = SseBuffer::default();

            while let Some(chunk_result) = byte_stream.next().await {
                match chunk_result {
                    Ok(bytes) => {
                        buffer.push(&bytes);

                        // Process complete SSE events
                        while let Some(event) = buffer.next_event() {
                            for chunk in parse_sse_event(&event) {
                                let done = matches!(chunk, StreamChunk::Done { .. });
                                yield chunk;
                                if done {
                                    return;
                                }
                            }
                        }
                    }
                    Err(e) => {
                        yield StreamChunk::Error(e.to_string());
                        return;
                    }
                }
            }
        };

        Ok(StreamReceiver::new(stream))
    }
}

/// Raw SSE bytes awaiting a complete event. Events are only decoded once
/// their blank-line terminator has arrived, so a character split across
/// network chunks is decoded whole.
#[derive(Debug, Default)]
struct SseBuffer {
    bytes: Vec<u8>,
}

impl SseBuffer {
    fn push(&mut self, chunk: &[u8]) {
        self.bytes.extend_from_slice(chunk);
    }

    fn next_event(&mut self) -> Option<String> {
        let (end, terminator) = event_boundary(&self.bytes)?;
        let event = String::from_utf8_lossy(&self.bytes[..end]).into_owned();
        self.bytes.drain(..end + terminator);
        Some(event)
    }
}

/// Offset and length of the earliest `\n\n` or `\r\n\r\n`
fn event_boundary(bytes: &[u8]) -> Option<(usize, usize)> {
    let find = |needle: &[u8]| bytes.windows(needle.len()).position(|w| w == needle);
    match (find(b"\n\n"), find(b"\r\n\r\n")) {
        (Some(lf), Some(crlf)) if crlf < lf => Some((crlf, 4)),
        (Some(lf), _) => Some((lf, 2)),
        (None, Some(crlf)) => Some((crlf, 4)),
        (None, None) => None,
    }
}

/// Turn one SSE event block into stream chunks. Unparseable lines are skipped.
fn parse_sse_event(event: &str) -> Vec<StreamChunk> {
    let mut chunks = Vec::new();
    for line in event.lines() {
        let Some(data) = line.strip_prefix("data:") else {
            continue;
        };
        let data = data.trim_start();

        if data == "[DONE]" {
            chunks.push(StreamChunk::Done { finish_reason: FinishReason::Stop });
            return chunks;
        }

        let Ok(chunk) = serde_json::from_str::<OpenAIStreamChunk>(data) else {
            continue;
        };
        let Some(choice) = chunk.choices.first() else {
            continue;
        };

        if let Some(content) = &choice.delta.content {
            if !content.is_empty() {
                chunks.push(StreamChunk::Text(content.clone()));
            }
        }

        if let Some(reason) = &choice.finish_reason {
            let finish_reason = match reason.as_str() {
                "stop" => FinishReason::Stop,
                "length" => FinishReason::Length,
                "content_filter" => FinishReason::ContentFilter,
                _ => FinishReason::Unknown,
            };
            chunks.push(StreamChunk::Done { finish_reason });
            return chunks;
        }
    }
    chunks
}

// ============================================================================
// OpenAI API Types
// ============================================================================

#[derive(Debug, Serialize)]
struct OpenAIRequest {
    model: String,
    messages: Vec<OpenAIMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<usize>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    user: Option<String>,
}

#[derive(Debug, Serialize)]
struct OpenAIMessage {
    role: &'static str,
    content: String,
}

impl From<&ChatMessage> for OpenAIMessage {
    fn from(msg: &ChatMessage) -> Self {
        Self {
            role: msg.role.as_str(),
            content: msg.content.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct OpenAIStreamChunk {
    choices: Vec<OpenAIStreamChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAIStreamChoice {
    delta: OpenAIStreamDelta,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAIStreamDelta {
    content: Option<String>,
}
