//! Visibility router
//!
//! The ledger keeps one view per agent. Views change only through `route`,
//! which is what keeps an internal token out of every view but its
//! producer's.

use crate::error::{Error, Result};
use crate::message::{Token, View};
use serde::{Deserialize, Serialize};
use tracing::trace;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ledger {
    views: Vec<View>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a view for `name` and return its index
    pub fn register(&mut self, name: &str) -> Result<usize> {
        if self.index_of(name).is_some() {
            return Err(Error::duplicate_agent(name).with_operation("ledger::register"));
        }
        self.views.push(View::new(name));
        Ok(self.views.len() - 1)
    }

    /// Record `token` in every view allowed to see it. Returns how many views took it.
    pub fn route(&mut self, producer: &str, token: &Token) -> usize {
        if token.is_blank() {
            trace!(producer, "ignoring blank token");
            return 0;
        }
        let delivered = self
            .views
            .iter_mut()
            .map(|view| view.record(producer, token))
            .filter(|recorded| *recorded)
            .count();
        trace!(producer, token = %token.text, mode = %token.mode, delivered, "routed");
        delivered
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.views.iter().position(|v| v.observer() == name)
    }

    pub fn view(&self, index: usize) -> Option<&View> {
        self.views.get(index)
    }

    pub fn view_of(&self, name: &str) -> Result<&View> {
        self.views
            .iter()
            .find(|v| v.observer() == name)
            .ok_or_else(|| Error::agent_not_found(name))
    }

    pub fn views(&self) -> &[View] {
        &self.views
    }

    pub fn len(&self) -> usize {
        self.views.len()
    }

    pub fn is_empty(&self) -> bool {
        self.views.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunker::Chunker;
    use crate::marker::MarkerSet;
    use crate::message::VisibilityMode;
    use crate::ErrorKind;

    fn ledger(names: &[&str]) -> Ledger {
        let mut ledger = Ledger::new();
        for name in names {
            ledger.register(name).unwrap();
        }
        ledger
    }

    #[test]
    fn test_register_rejects_duplicates() {
        let mut ledger = ledger(&["Alice"]);
        assert_eq!(ledger.register("Bob").unwrap(), 1);
        let err = ledger.register("Alice").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DuplicateAgent);
        assert_eq!(ledger.len(), 2);
    }

    #[test]
    fn test_view_of_unknown_agent() {
        let ledger = ledger(&["Alice"]);
        assert!(ledger.view_of("Alice").is_ok());
        assert_eq!(ledger.view_of("Zed").unwrap_err().kind(), ErrorKind::AgentNotFound);
        assert!(ledger.view(3).is_none());
    }

    #[test]
    fn test_visibility_invariant() {
        let mut ledger = ledger(&["Alice", "Bob", "Charlie"]);
        let traffic = [
            ("Alice", Token::internal("plan")),
            ("Bob", Token::broadcast("hello")),
            ("Alice", Token::broadcast("hi")),
            ("Charlie", Token::internal("secret")),
            ("Bob", Token::internal("aside")),
            ("Charlie", Token::broadcast("yes")),
        ];
        for (producer, token) in &traffic {
            ledger.route(producer, token);
        }

        for view in ledger.views() {
            for message in view.messages() {
                assert!(
                    message.mode == VisibilityMode::Broadcast || message.producer == view.observer(),
                    "{} sees {:?}",
                    view.observer(),
                    message
                );
            }
        }
        assert!(!ledger.view_of("Bob").unwrap().transcript_of("Alice").contains("plan"));
        assert!(!ledger.view_of("Alice").unwrap().transcript_of("Charlie").contains("secret"));
        assert_eq!(ledger.view_of("Charlie").unwrap().transcript_of("Charlie"), "secret yes");
    }

    #[test]
    fn test_message_coalescing() {
        let mut ledger = ledger(&["A", "B"]);
        ledger.route("A", &Token::broadcast("foo"));
        ledger.route("A", &Token::broadcast("bar"));
        ledger.route("B", &Token::broadcast("baz"));

        let view = ledger.view_of("B").unwrap();
        let contents: Vec<(&str, &str)> = view
            .messages()
            .iter()
            .map(|m| (m.producer.as_str(), m.content.as_str()))
            .collect();
        assert_eq!(contents, vec![("A", "foo bar"), ("B", "baz")]);
    }

    #[test]
    fn test_marker_suppression() {
        let markers = MarkerSet::default();
        let mut chunker = Chunker::new(&markers);
        let mut ledger = ledger(&["A", "B"]);

        for fragment in ["<broadcast>hi <inter", "nal> quiet", " <broadcast> loud<internal>"] {
            for token in chunker.feed(fragment) {
                ledger.route("A", &token);
            }
        }
        chunker.finish();

        for view in ledger.views() {
            for message in view.messages() {
                for marker in markers.all() {
                    assert!(!message.content.contains(marker));
                }
            }
        }
        assert_eq!(ledger.view_of("B").unwrap().transcript_of("A"), "hi loud");
        assert_eq!(ledger.view_of("A").unwrap().transcript_of("A"), "hi quiet loud");
    }

    #[test]
    fn test_blank_tokens_ignored() {
        let mut ledger = ledger(&["A", "B"]);
        assert_eq!(ledger.route("A", &Token::broadcast("  ")), 0);
        assert_eq!(ledger.route("A", &Token::broadcast("x")), 2);
        assert_eq!(ledger.route("A", &Token::internal("y")), 1);
        assert!(ledger.view_of("A").unwrap().len() == 1);
    }
}
