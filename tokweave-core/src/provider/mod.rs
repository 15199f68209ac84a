//! # Token Source Interface
//!
//! A trait-based abstraction over streaming completion backends.
//!
//! ## Design
//! - `TokenSource` opens one streaming generation per call
//! - `StreamReceiver` hands fragments back one at a time
//! - Implementations: OpenAI-compatible HTTP, and an in-process scripted source

pub mod openai;
pub mod scripted;

pub use openai::OpenAIProvider;
pub use scripted::{Script, ScriptedSource};

use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::pin::Pin;
use std::time::Duration;

// ============================================================================
// Core Types
// ============================================================================

/// A chat message in the context sent to the token source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// Request parameters for a streaming completion
#[derive(Debug, Clone, Default)]
pub struct CompletionRequest {
    pub messages: Vec<ChatMessage>,
    pub model: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<usize>,
    /// Identity of the agent the request is made for
    pub user: Option<String>,
}

impl CompletionRequest {
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            ..Default::default()
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_temperature(mut self, temp: f32) -> Self {
        self.temperature = Some(temp);
        self
    }

    pub fn with_max_tokens(mut self, max: usize) -> Self {
        self.max_tokens = Some(max);
        self
    }

    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishReason {
    Stop,
    Length,
    ContentFilter,
    Unknown,
}

/// A streaming chunk from the model
#[derive(Debug, Clone)]
pub enum StreamChunk {
    /// Text content delta
    Text(String),
    /// Stream finished
    Done { finish_reason: FinishReason },
    /// Transport failed mid-stream
    Error(String),
}

// ============================================================================
// Token Source Trait
// ============================================================================

/// Error type for token source operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    /// Network/connection error
    Network(String),
    /// API returned an error
    Api { status: u16, message: String },
    /// Failed to parse response
    Parse(String),
    /// Rate limited
    RateLimited { retry_after: Option<u64> },
    /// Authentication failed
    AuthenticationFailed,
    /// No response within the configured limit
    Timeout { after: Duration },
    /// The stream broke after it was opened
    Stream(String),
    /// Other error
    Other(String),
}

impl std::fmt::Display for ProviderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Network(e) => write!(f, "Network error: {}", e),
            Self::Api { status, message } => write!(f, "API error ({}): {}", status, message),
            Self::Parse(e) => write!(f, "Parse error: {}", e),
            Self::RateLimited { retry_after } => {
                write!(f, "Rate limited")?;
                if let Some(secs) = retry_after {
                    write!(f, " (retry after {}s)", secs)?;
                }
                Ok(())
            }
            Self::AuthenticationFailed => write!(f, "Authentication failed"),
            Self::Timeout { after } => write!(f, "Timed out after {:?}", after),
            Self::Stream(e) => write!(f, "Stream error: {}", e),
            Self::Other(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for ProviderError {}

/// Something that turns a conversation context into a stream of text fragments
#[allow(async_fn_in_trait)]
pub trait TokenSource {
    /// Get the source name (e.g., "openai", "scripted")
    fn name(&self) -> &str;

    /// Open a new streaming generation seeded with `request.messages`
    async fn open_stream(&self, request: CompletionRequest) -> Result<StreamReceiver, ProviderError>;
}

impl<T: TokenSource> TokenSource for &T {
    fn name(&self) -> &str {
        (**self).name()
    }

    async fn open_stream(&self, request: CompletionRequest) -> Result<StreamReceiver, ProviderError> {
        (**self).open_stream(request).await
    }
}

/// Receiver for streaming responses
pub struct StreamReceiver {
    inner: Pin<Box<dyn futures_core::Stream<Item = StreamChunk> + Send>>,
    finished: bool,
}

impl StreamReceiver {
    pub fn new<S>(stream: S) -> Self
    where
        S: futures_core::Stream<Item = StreamChunk> + Send + 'static,
    {
        Self {
            inner: Box::pin(stream),
            finished: false,
        }
    }

    /// Next text fragment, or `None` once the stream is exhausted
    pub async fn read_fragment(&mut self) -> Result<Option<String>, ProviderError> {
        if self.finished {
            return Ok(None);
        }
        match self.inner.next().await {
            Some(StreamChunk::Text(text)) => Ok(Some(text)),
            Some(StreamChunk::Done { .. }) | None => {
                self.finished = true;
                Ok(None)
            }
            Some(StreamChunk::Error(e)) => {
                self.finished = true;
                Err(ProviderError::Stream(e))
            }
        }
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Collect all text fragments into a single string
    pub async fn collect_text(mut self) -> Result<String, ProviderError> {
        let mut text = String::new();
        while let Some(fragment) = self.read_fragment().await? {
            text.push_str(&fragment);
        }
        Ok(text)
    }
}

// ============================================================================
// Provider Configuration
// ============================================================================

/// Configuration for the HTTP token source
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub default_model: Option<String>,
    pub temperature: Option<f32>,
    pub headers: HashMap<String, String>,
    pub timeout_secs: Option<u64>,
}

impl ProviderConfig {
    pub fn openai(api_key: impl Into<String>) -> Self {
        Self {
            api_key: Some(api_key.into()),
            base_url: Some("https://api.openai.com/v1".into()),
            default_model: Some("gpt-4".into()),
            temperature: Some(0.7),
            headers: HashMap::new(),
            timeout_secs: Some(120),
        }
    }

    /// Any OpenAI-compatible server (vLLM, Ollama, llama.cpp)
    pub fn local(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: None,
            base_url: Some(base_url.into()),
            default_model: Some(model.into()),
            temperature: Some(0.7),
            headers: HashMap::new(),
            timeout_secs: Some(300),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = Some(model.into());
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }
}

// ============================================================================
// Tests
// ============================================================================
