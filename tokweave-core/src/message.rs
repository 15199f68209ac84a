//! Tokens, run-length messages and per-agent views

use serde::{Deserialize, Serialize};
use std::fmt;

/// Who may see a token once it is routed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VisibilityMode {
    /// Visible to every agent
    Broadcast,
    /// Visible to the producer only
    #[default]
    Internal,
}

impl VisibilityMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            VisibilityMode::Broadcast => "broadcast",
            VisibilityMode::Internal => "internal",
        }
    }
}

impl fmt::Display for VisibilityMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One whitespace-delimited word, tagged with the mode active when it was extracted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub text: String,
    pub mode: VisibilityMode,
}

impl Token {
    pub fn new(text: impl Into<String>, mode: VisibilityMode) -> Self {
        Self {
            text: text.into(),
            mode,
        }
    }

    pub fn broadcast(text: impl Into<String>) -> Self {
        Self::new(text, VisibilityMode::Broadcast)
    }

    pub fn internal(text: impl Into<String>) -> Self {
        Self::new(text, VisibilityMode::Internal)
    }

    /// True for empty or whitespace-only text, which is never routed
    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// A run of consecutive tokens from one producer, as recorded in one view.
///
/// The mode is fixed when the message is created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub producer: String,
    pub content: String,
    pub mode: VisibilityMode,
}

impl Message {
    pub fn new(producer: impl Into<String>, content: impl Into<String>, mode: VisibilityMode) -> Self {
        Self {
            producer: producer.into(),
            content: content.into(),
            mode,
        }
    }

    pub fn visible_to(&self, observer: &str) -> bool {
        self.mode == VisibilityMode::Broadcast || self.producer == observer
    }

    /// Append a token, space-joined unless the content is still empty
    pub fn push_token(&mut self, text: &str) {
        if !self.content.is_empty() {
            self.content.push(' ');
        }
        self.content.push_str(text);
    }
}

/// The ordered messages one observer uses as generation context
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct View {
    observer: String,
    messages: Vec<Message>,
}

impl View {
    pub fn new(observer: impl Into<String>) -> Self {
        Self {
            observer: observer.into(),
            messages: Vec::new(),
        }
    }

    pub fn observer(&self) -> &str {
        &self.observer
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Record a token if this observer may see it. Returns whether it was recorded.
    pub(crate) fn record(&mut self, producer: &str, token: &Token) -> bool {
        if token.mode != VisibilityMode::Broadcast && producer != self.observer {
            return false;
        }
        match self.messages.last_mut() {
            Some(last) if last.producer == producer => last.push_token(&token.text),
            _ => self
                .messages
                .push(Message::new(producer, token.text.clone(), token.mode)),
        }
        true
    }

    /// Concatenated content of every message from `producer`
    pub fn transcript_of(&self, producer: &str) -> String {
        self.messages
            .iter()
            .filter(|m| m.producer == producer)
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }
}
