//! Scripted token source
//!
//! Replays pre-recorded fragment scripts instead of calling a model. Each
//! `open_stream` consumes the next script for the requesting agent (keyed by
//! `CompletionRequest::user`), falling back to the shared scripts. Every
//! request is recorded so callers can inspect the context that was sent.

use super::*;
use futures_util::stream;
use std::sync::{Mutex, MutexGuard};

/// What one opened stream does
#[derive(Debug, Clone)]
pub enum Script {
    /// Yield these fragments, then finish
    Fragments(Vec<String>),
    /// Yield this fragment forever
    Endless(String),
    /// Yield these fragments, then break with a stream error
    Broken(Vec<String>, String),
    /// Open, then never yield anything
    Stall,
    /// Fail to open
    Fail(ProviderError),
}

impl Script {
    pub fn fragments<I, S>(fragments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Script::Fragments(fragments.into_iter().map(Into::into).collect())
    }

    /// Split `text` into words, each followed by a space, one fragment per word
    pub fn words(text: &str) -> Self {
        Script::Fragments(text.split_whitespace().map(|w| format!("{} ", w)).collect())
    }

    fn into_receiver(self) -> Result<StreamReceiver, ProviderError> {
        let done = StreamChunk::Done { finish_reason: FinishReason::Stop };
        match self {
            Script::Fragments(fragments) => {
                let chunks = fragments.into_iter().map(StreamChunk::Text).chain(std::iter::once(done));
                Ok(StreamReceiver::new(stream::iter(chunks)))
            }
            Script::Endless(fragment) => Ok(StreamReceiver::new(stream::repeat(StreamChunk::Text(fragment)))),
            Script::Broken(fragments, error) => {
                let chunks = fragments
                    .into_iter()
                    .map(StreamChunk::Text)
                    .chain(std::iter::once(StreamChunk::Error(error)));
                Ok(StreamReceiver::new(stream::iter(chunks)))
            }
            Script::Stall => Ok(StreamReceiver::new(stream::pending())),
            Script::Fail(err) => Err(err),
        }
    }
}

#[derive(Debug, Default)]
struct ScriptState {
    cursors: HashMap<String, usize>,
    requests: Vec<CompletionRequest>,
}

const SHARED: &str = "";

/// In-process token source driven by scripts
#[derive(Debug, Default)]
pub struct ScriptedSource {
    name: String,
    plans: HashMap<String, Vec<Script>>,
    repeat: bool,
    state: Mutex<ScriptState>,
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self {
            name: "scripted".into(),
            ..Default::default()
        }
    }

    /// A source whose single shared script yields `fragments` once
    pub fn once<S: Into<String>>(fragments: impl IntoIterator<Item = S>) -> Self {
        Self::new().script(Script::fragments(fragments))
    }

    /// A source that never signals exhaustion
    pub fn endless(fragment: impl Into<String>) -> Self {
        Self::new().script(Script::Endless(fragment.into())).repeating()
    }

    /// A source whose every open fails with `err`
    pub fn failing(err: ProviderError) -> Self {
        Self::new().script(Script::Fail(err)).repeating()
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Append a script shared by agents without their own plan
    pub fn script(mut self, script: Script) -> Self {
        self.plans.entry(SHARED.to_string()).or_default().push(script);
        self
    }

    /// Append a script for one agent
    pub fn agent_script(mut self, agent: impl Into<String>, script: Script) -> Self {
        self.plans.entry(agent.into()).or_default().push(script);
        self
    }

    /// Start over from the first script once a plan runs out
    pub fn repeating(mut self) -> Self {
        self.repeat = true;
        self
    }

    fn state(&self) -> MutexGuard<'_, ScriptState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Every request received so far, in order
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.state().requests.clone()
    }

    /// Requests made on behalf of `agent`
    pub fn requests_for(&self, agent: &str) -> Vec<CompletionRequest> {
        self.state()
            .requests
            .iter()
            .filter(|r| r.user.as_deref() == Some(agent))
            .cloned()
            .collect()
    }

    pub fn open_count(&self) -> usize {
        self.state().requests.len()
    }

    fn next_script(&self, key: &str) -> Option<Script> {
        let plan = self.plans.get(key).filter(|p| !p.is_empty())?;
        let mut state = self.state();
        let cursor = state.cursors.entry(key.to_string()).or_insert(0);
        let index = *cursor;
        *cursor += 1;

        if index < plan.len() {
            plan.get(index).cloned()
        } else if self.repeat {
            plan.get(index % plan.len()).cloned()
        } else {
            None
        }
    }
}

impl TokenSource for ScriptedSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn open_stream(&self, request: CompletionRequest) -> Result<StreamReceiver, ProviderError> {
        let key = match request.user.as_deref() {
            Some(agent) if self.plans.contains_key(agent) => agent.to_string(),
            _ => SHARED.to_string(),
        };
        self.state().requests.push(request);

        match self.next_script(&key) {
            Some(script) => script.into_receiver(),
            // Out of scripts: an immediately exhausted stream.
            None => Script::Fragments(Vec::new()).into_receiver(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request_for(agent: &str) -> CompletionRequest {
        CompletionRequest::new(vec![ChatMessage::user("go")]).with_user(agent)
    }

    #[tokio::test]
    async fn test_once_then_exhausted() {
        let source = ScriptedSource::once(["hello ", "world"]);

        let rx = source.open_stream(CompletionRequest::default()).await.unwrap();
        assert_eq!(rx.collect_text().await.unwrap(), "hello world");

        let rx = source.open_stream(CompletionRequest::default()).await.unwrap();
        assert_eq!(rx.collect_text().await.unwrap(), "");
        assert_eq!(source.open_count(), 2);
    }

    #[tokio::test]
    async fn test_agent_plans_and_fallback() {
        let source = ScriptedSource::new()
            .script(Script::words("shared text"))
            .agent_script("Alice", Script::words("alice only"));

        let rx = source.open_stream(request_for("Alice")).await.unwrap();
        assert_eq!(rx.collect_text().await.unwrap(), "alice only ");

        let rx = source.open_stream(request_for("Bob")).await.unwrap();
        assert_eq!(rx.collect_text().await.unwrap(), "shared text ");

        assert_eq!(source.requests_for("Alice").len(), 1);
        assert_eq!(source.requests_for("Bob").len(), 1);
    }

    #[tokio::test]
    async fn test_repeating_cycles_scripts() {
        let source = ScriptedSource::new()
            .script(Script::fragments(["a"]))
            .script(Script::fragments(["b"]))
            .repeating();

        let mut seen = Vec::new();
        for _ in 0..4 {
            let rx = source.open_stream(CompletionRequest::default()).await.unwrap();
            seen.push(rx.collect_text().await.unwrap());
        }
        assert_eq!(seen, vec!["a", "b", "a", "b"]);
    }

    #[tokio::test]
    async fn test_endless_never_finishes() {
        let source = ScriptedSource::endless("la ");
        let mut rx = source.open_stream(CompletionRequest::default()).await.unwrap();
        for _ in 0..50 {
            assert_eq!(rx.read_fragment().await.unwrap(), Some("la ".into()));
        }
        assert!(!rx.is_finished());
    }

    #[tokio::test]
    async fn test_failing_and_broken() {
        let source = ScriptedSource::failing(ProviderError::AuthenticationFailed);
        let err = source.open_stream(CompletionRequest::default()).await.err();
        assert_eq!(err, Some(ProviderError::AuthenticationFailed));

        let source = ScriptedSource::new().script(Script::Broken(vec!["partial ".into()], "reset".into()));
        let mut rx = source.open_stream(CompletionRequest::default()).await.unwrap();
        assert_eq!(rx.read_fragment().await, Ok(Some("partial ".into())));
        assert_eq!(rx.read_fragment().await, Err(ProviderError::Stream("reset".into())));
    }
}
