//! Per-agent stream state
//!
//! An `AgentStream` turns a token source into a sequence of single tokens for
//! one agent. It owns the agent's chunker (mode and carry), the queue of
//! tokens already extracted but not yet emitted, and, for persistent
//! streams, the open receiver.

use crate::chunker::Chunker;
use crate::config::{RunConfig, StreamPolicy};
use crate::marker::MarkerSet;
use crate::message::{Token, View, VisibilityMode};
use crate::provider::{
    ChatMessage, CompletionRequest, ProviderError, StreamReceiver, TokenSource,
};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Token-less fragments one `next_token` call reads before giving up
pub const DEFAULT_MAX_IDLE_FRAGMENTS: usize = 4096;

const IDLE_YIELD_EVERY: usize = 64;

/// Static description of one agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentSpec {
    pub name: String,
    /// Role description placed in the system message
    #[serde(default)]
    pub persona: String,
    /// First user turn, sent only with the agent's first generation
    #[serde(default)]
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

impl AgentSpec {
    pub fn new(name: impl Into<String>, persona: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            persona: persona.into(),
            prompt: prompt.into(),
            model: None,
            temperature: None,
        }
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self::new(name, "", "")
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }
}

/// Run-wide knobs every agent stream reads
#[derive(Debug, Clone)]
pub struct StreamSettings {
    pub policy: StreamPolicy,
    pub call_timeout: Option<Duration>,
    pub max_idle_fragments: usize,
    pub model: String,
    pub temperature: f32,
    pub markers: MarkerSet,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self::from_config(&RunConfig::default())
    }
}

impl StreamSettings {
    pub fn from_config(config: &RunConfig) -> Self {
        Self {
            policy: config.stream_policy,
            call_timeout: config.call_timeout(),
            max_idle_fragments: DEFAULT_MAX_IDLE_FRAGMENTS,
            model: config.model.clone(),
            temperature: config.temperature,
            markers: config.markers.clone(),
        }
    }

    pub fn with_policy(mut self, policy: StreamPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_call_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.call_timeout = timeout;
        self
    }

    pub fn with_max_idle_fragments(mut self, limit: usize) -> Self {
        self.max_idle_fragments = limit.max(1);
        self
    }
}

/// Outcome of asking an agent for its next token
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Next {
    Token(Token),
    /// The source has nothing more for this agent
    End,
}

pub struct AgentStream {
    spec: AgentSpec,
    chunker: Chunker,
    pending: VecDeque<Token>,
    has_generated: bool,
    exhausted: bool,
    receiver: Option<StreamReceiver>,
}

impl std::fmt::Debug for AgentStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentStream")
            .field("name", &self.spec.name)
            .field("mode", &self.chunker.mode())
            .field("pending", &self.pending.len())
            .field("has_generated", &self.has_generated)
            .field("exhausted", &self.exhausted)
            .field("open", &self.receiver.is_some())
            .finish()
    }
}

impl AgentStream {
    pub fn new(spec: AgentSpec, markers: &MarkerSet) -> Self {
        Self {
            spec,
            chunker: Chunker::new(markers),
            pending: VecDeque::new(),
            has_generated: false,
            exhausted: false,
            receiver: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.spec.name
    }

    pub fn spec(&self) -> &AgentSpec {
        &self.spec
    }

    pub fn mode(&self) -> VisibilityMode {
        self.chunker.mode()
    }

    pub fn has_generated(&self) -> bool {
        self.has_generated
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Tokens extracted but not yet emitted, oldest first
    pub fn pending(&self) -> impl Iterator<Item = &Token> {
        self.pending.iter()
    }

    /// Whether the next `next_token` call will open a stream, and so read the view
    pub fn needs_context(&self) -> bool {
        self.pending.is_empty() && self.receiver.is_none() && !self.exhausted
    }

    pub fn pop_pending(&mut self) -> Option<Token> {
        self.pending.pop_front()
    }

    /// Build the context for this agent's next generation from its view.
    pub fn request_for(&self, view: &View, settings: &StreamSettings) -> CompletionRequest {
        let mut messages = Vec::with_capacity(view.len() + 2);
        messages.push(ChatMessage::system(self.system_prompt(&settings.markers)));

        for message in view.messages() {
            if message.producer == self.spec.name {
                messages.push(ChatMessage::assistant(message.content.clone()));
            } else {
                messages.push(ChatMessage::user(format!("[{}]: {}", message.producer, message.content)));
            }
        }

        if !self.has_generated && !self.spec.prompt.is_empty() {
            messages.push(ChatMessage::user(self.spec.prompt.clone()));
        }

        CompletionRequest::new(messages)
            .with_model(self.spec.model.clone().unwrap_or_else(|| settings.model.clone()))
            .with_temperature(self.spec.temperature.unwrap_or(settings.temperature))
            .with_user(self.spec.name.clone())
    }

    fn system_prompt(&self, markers: &MarkerSet) -> String {
        let mut prompt = format!("You are {}.\n", self.spec.name);
        if !self.spec.persona.is_empty() {
            prompt.push_str(&self.spec.persona);
            prompt.push('\n');
        }
        prompt.push_str(&format!(
            "\nYou have access to these tools:\n\
             - {}: Make your tokens visible to all other agents\n\
             - {}: Make your tokens private (only you can see them)\n\
             \nCurrent mode: {}\n",
            markers.broadcast,
            markers.internal,
            self.chunker.mode()
        ));
        prompt
    }

    /// Produce this agent's next token.
    ///
    /// Queued tokens are served first. Otherwise a stream is opened (every
    /// time under `Reopen`, once under `Persistent`) and read until a
    /// fragment completes at least one token. A stream that ends without
    /// producing any marks the agent exhausted. Reading more than
    /// `settings.max_idle_fragments` token-less fragments in one call is a
    /// stream error.
    pub async fn next_token<S: TokenSource>(
        &mut self,
        source: &S,
        view: &View,
        settings: &StreamSettings,
    ) -> Result<Next, ProviderError> {
        if let Some(token) = self.pending.pop_front() {
            return Ok(Next::Token(token));
        }

        let mut idle = 0usize;
        while !self.exhausted {
            let mut receiver = match self.receiver.take() {
                Some(receiver) => receiver,
                None => {
                    let request = self.request_for(view, settings);
                    debug!(agent = %self.spec.name, source = source.name(), messages = request.messages.len(), "opening stream");
                    let receiver = within(settings.call_timeout, source.open_stream(request)).await?;
                    self.chunker.reset();
                    self.has_generated = true;
                    receiver
                }
            };

            loop {
                let Some(fragment) = within(settings.call_timeout, receiver.read_fragment()).await? else {
                    self.chunker.finish();
                    self.exhausted = true;
                    debug!(agent = %self.spec.name, "stream exhausted");
                    break;
                };

                self.pending.extend(self.chunker.feed(&fragment));
                if let Some(token) = self.pending.pop_front() {
                    if settings.policy == StreamPolicy::Persistent {
                        self.receiver = Some(receiver);
                    }
                    return Ok(Next::Token(token));
                }

                idle += 1;
                if idle >= settings.max_idle_fragments {
                    warn!(agent = %self.spec.name, fragments = idle, "no token from stream");
                    return Err(ProviderError::Stream(format!("no token after {} fragments", idle)));
                }
                if idle % IDLE_YIELD_EVERY == 0 {
                    tokio::task::yield_now().await;
                }
            }
        }

        Ok(Next::End)
    }
}

/// Bound a provider call by the configured timeout
async fn within<T, F>(limit: Option<Duration>, call: F) -> Result<T, ProviderError>
where
    F: Future<Output = Result<T, ProviderError>>,
{
    match limit {
        Some(limit) => match tokio::time::timeout(limit, call).await {
            Ok(result) => result,
            Err(_) => Err(ProviderError::Timeout { after: limit }),
        },
        None => call.await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{Role, Script, ScriptedSource};

    fn alice() -> AgentStream {
        AgentStream::new(AgentSpec::new("Alice", "You are curious.", "Say hello."), &MarkerSet::default())
    }

    async fn drain<S: TokenSource>(stream: &mut AgentStream, source: &S, settings: &StreamSettings) -> Vec<Token> {
        let view = View::new(stream.name());
        let mut tokens = Vec::new();
        while let Next::Token(token) = stream.next_token(source, &view, settings).await.unwrap() {
            tokens.push(token);
        }
        tokens
    }

    #[test]
    fn test_request_layout() {
        let stream = alice();
        let mut view = View::new("Alice");
        view.record("Bob", &Token::broadcast("hi"));
        view.record("Alice", &Token::internal("hmm"));

        let request = stream.request_for(&view, &StreamSettings::default());
        let roles: Vec<Role> = request.messages.iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::System, Role::User, Role::Assistant, Role::User]);

        let system = &request.messages[0].content;
        assert!(system.starts_with("You are Alice.\nYou are curious."));
        assert!(system.contains("<broadcast>"));
        assert!(system.contains("Current mode: internal"));
        assert_eq!(request.messages[1].content, "[Bob]: hi");
        assert_eq!(request.messages[2].content, "hmm");
        assert_eq!(request.messages[3].content, "Say hello.");
        assert_eq!(request.user.as_deref(), Some("Alice"));
        assert_eq!(request.model.as_deref(), Some("gpt-4"));
    }

    #[test]
    fn test_agent_overrides_model() {
        let stream = AgentStream::new(AgentSpec::named("Bob").with_model("gpt-4o").with_temperature(0.2), &MarkerSet::default());
        let request = stream.request_for(&View::new("Bob"), &StreamSettings::default());
        assert_eq!(request.model.as_deref(), Some("gpt-4o"));
        assert_eq!(request.temperature, Some(0.2));
        // No prompt configured, so only the system message.
        assert_eq!(request.messages.len(), 1);
    }

    #[tokio::test]
    async fn test_no_duplicate_initial_prompt() {
        let source = ScriptedSource::new().script(Script::words("one two")).repeating();
        let mut stream = alice();
        let view = View::new("Alice");
        let settings = StreamSettings::default();

        for _ in 0..5 {
            stream.next_token(&source, &view, &settings).await.unwrap();
        }

        let requests = source.requests_for("Alice");
        assert!(requests.len() >= 2);
        let with_prompt = requests
            .iter()
            .filter(|r| r.messages.iter().any(|m| m.role == Role::User && m.content == "Say hello."))
            .count();
        assert_eq!(with_prompt, 1);
        assert!(stream.has_generated());
    }

    #[tokio::test]
    async fn test_pending_served_before_opening() {
        let source = ScriptedSource::once(["a b c"]);
        let mut stream = alice();
        let view = View::new("Alice");
        let settings = StreamSettings::default();

        assert!(stream.needs_context());
        assert_eq!(stream.next_token(&source, &view, &settings).await.unwrap(), Next::Token(Token::internal("a")));
        assert_eq!(stream.pending().count(), 2);
        assert!(!stream.needs_context());
        assert_eq!(stream.next_token(&source, &view, &settings).await.unwrap(), Next::Token(Token::internal("b")));
        assert_eq!(stream.pop_pending(), Some(Token::internal("c")));
        assert_eq!(source.open_count(), 1);
    }

    #[tokio::test]
    async fn test_end_after_exhaustion() {
        let source = ScriptedSource::once(["only "]);
        let mut stream = alice();
        let settings = StreamSettings::default();

        assert_eq!(drain(&mut stream, &source, &settings).await, vec![Token::internal("only")]);
        assert!(stream.is_exhausted());

        let view = View::new("Alice");
        assert_eq!(stream.next_token(&source, &view, &settings).await.unwrap(), Next::End);
        // Exhausted agents never open again.
        assert_eq!(source.open_count(), 2);
    }

    #[tokio::test]
    async fn test_persistent_reads_one_stream() {
        let source = ScriptedSource::once(["hello <broad", "cast> every", "one "]);
        let mut stream = alice();
        let settings = StreamSettings::default().with_policy(StreamPolicy::Persistent);

        let tokens = drain(&mut stream, &source, &settings).await;
        assert_eq!(
            tokens,
            vec![Token::internal("hello"), Token::broadcast("every"), Token::broadcast("one")]
        );
        assert_eq!(source.open_count(), 1);
        assert_eq!(stream.mode(), VisibilityMode::Broadcast);
    }

    #[tokio::test]
    async fn test_reopen_opens_when_queue_empty() {
        let source = ScriptedSource::new()
            .script(Script::fragments(["<broadcast> first", " dropped"]))
            .script(Script::fragments(["second "]));
        let mut stream = alice();
        let settings = StreamSettings::default();

        let tokens = drain(&mut stream, &source, &settings).await;
        // The carry is reset on reopen, the mode is not.
        assert_eq!(tokens, vec![Token::broadcast("first"), Token::broadcast("second")]);
        assert_eq!(source.open_count(), 3);
    }

    #[tokio::test]
    async fn test_queued_tokens_keep_extraction_mode() {
        let source = ScriptedSource::once(["a b <broadcast> c"]);
        let mut stream = alice();
        let settings = StreamSettings::default();

        let tokens = drain(&mut stream, &source, &settings).await;
        assert_eq!(tokens, vec![Token::internal("a"), Token::internal("b"), Token::broadcast("c")]);
    }

    #[tokio::test]
    async fn test_marker_only_stream_exhausts() {
        let source = ScriptedSource::once(["<broadcast>", "<internal>", "  "]);
        let mut stream = alice();
        let tokens = drain(&mut stream, &source, &StreamSettings::default()).await;
        assert!(tokens.is_empty());
        assert!(stream.is_exhausted());
    }

    #[tokio::test]
    async fn test_errors_propagate() {
        let source = ScriptedSource::failing(ProviderError::AuthenticationFailed);
        let mut stream = alice();
        let err = stream
            .next_token(&source, &View::new("Alice"), &StreamSettings::default())
            .await
            .unwrap_err();
        assert_eq!(err, ProviderError::AuthenticationFailed);
        assert!(!stream.has_generated());

        let source = ScriptedSource::new().script(Script::Broken(vec![], "reset".into()));
        let err = stream
            .next_token(&source, &View::new("Alice"), &StreamSettings::default())
            .await
            .unwrap_err();
        assert_eq!(err, ProviderError::Stream("reset".into()));
    }

    #[tokio::test]
    async fn test_call_timeout() {
        let source = ScriptedSource::new().script(Script::Stall);
        let mut stream = alice();
        let settings = StreamSettings::default().with_call_timeout(Some(Duration::from_millis(20)));

        let err = stream.next_token(&source, &View::new("Alice"), &settings).await.unwrap_err();
        assert_eq!(err, ProviderError::Timeout { after: Duration::from_millis(20) });
        assert_eq!(err.to_string(), "Timed out after 20ms");
    }

    #[tokio::test]
    async fn test_marker_only_endless_stream_gives_up() {
        let source = ScriptedSource::endless("<broadcast> <internal> ");
        let mut stream = alice();
        let settings = StreamSettings::default().with_max_idle_fragments(100);

        let err = stream.next_token(&source, &View::new("Alice"), &settings).await.unwrap_err();
        assert_eq!(err, ProviderError::Stream("no token after 100 fragments".into()));
        assert_eq!(source.open_count(), 1);
    }

    #[tokio::test]
    async fn test_idle_fragments_counted_per_call() {
        // Each stream's one idle fragment resets with the token that follows it.
        let source = ScriptedSource::new().script(Script::fragments(["<broadcast> ", "x "])).repeating();
        let mut stream = alice();
        let settings = StreamSettings::default().with_max_idle_fragments(2);
        let view = View::new("Alice");

        for _ in 0..5 {
            assert_eq!(stream.next_token(&source, &view, &settings).await.unwrap(), Next::Token(Token::broadcast("x")));
        }
    }
}
