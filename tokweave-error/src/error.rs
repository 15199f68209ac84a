//! The main Error type for tokweave

use crate::{ErrorKind, ErrorStatus};
use std::fmt;

/// The unified error type for all tokweave operations.
///
/// Carries:
/// - `kind`: what type of error occurred
/// - `message`: human-readable description
/// - `status`: whether the error is retryable
/// - `operation`: what operation raised it
/// - `context`: key-value pairs for debugging
/// - `source`: the underlying error, if any
///
/// # Example
///
/// ```rust
/// use tokweave_error::{Error, ErrorKind, ErrorStatus};
///
/// let err = Error::new(ErrorKind::RateLimited, "429 from provider")
///     .with_operation("agent::next_token")
///     .with_context("agent", "Alice")
///     .with_context("model", "gpt-4");
///
/// assert_eq!(err.kind(), ErrorKind::RateLimited);
/// assert_eq!(err.status(), ErrorStatus::Temporary);
/// ```
pub struct Error {
    kind: ErrorKind,
    message: String,
    status: ErrorStatus,
    operation: &'static str,
    context: Vec<(&'static str, String)>,
    source: Option<anyhow::Error>,
}

impl Error {
    /// Create a new error with the given kind and message
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        let status = if kind.is_retryable() {
            ErrorStatus::Temporary
        } else {
            ErrorStatus::Permanent
        };

        Self {
            kind,
            message: message.into(),
            status,
            operation: "",
            context: Vec::new(),
            source: None,
        }
    }

    // =========================================================================
    // Getters
    // =========================================================================

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn status(&self) -> ErrorStatus {
        self.status
    }

    pub fn operation(&self) -> &'static str {
        self.operation
    }

    pub fn context(&self) -> &[(&'static str, String)] {
        &self.context
    }

    /// Look up the first context value stored under `key`
    pub fn context_value(&self, key: &str) -> Option<&str> {
        self.context
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn source_ref(&self) -> Option<&anyhow::Error> {
        self.source.as_ref()
    }

    // =========================================================================
    // Builders (chainable)
    // =========================================================================

    pub fn with_status(mut self, status: ErrorStatus) -> Self {
        self.status = status;
        self
    }

    /// Mark as temporary (retryable)
    pub fn temporary(mut self) -> Self {
        self.status = ErrorStatus::Temporary;
        self
    }

    /// Mark as permanent (not retryable)
    pub fn permanent(mut self) -> Self {
        self.status = ErrorStatus::Permanent;
        self
    }

    /// Set the operation that raised this error.
    ///
    /// An operation that was already set moves into context as "called", so
    /// the call chain survives.
    pub fn with_operation(mut self, operation: &'static str) -> Self {
        if !self.operation.is_empty() {
            self.context.push(("called", self.operation.to_string()));
        }
        self.operation = operation;
        self
    }

    pub fn with_context(mut self, key: &'static str, value: impl Into<String>) -> Self {
        self.context.push((key, value.into()));
        self
    }

    /// Set the source error.
    ///
    /// # Panics (debug only)
    /// Panics in debug mode if source was already set.
    pub fn set_source(mut self, source: impl Into<anyhow::Error>) -> Self {
        debug_assert!(self.source.is_none(), "source error already set");
        self.source = Some(source.into());
        self
    }

    // =========================================================================
    // Status mutations
    // =========================================================================

    /// Mark as persistent after failed retries
    pub fn persist(mut self) -> Self {
        self.status = self.status.persist();
        self
    }

    pub fn is_retryable(&self) -> bool {
        self.status.is_retryable()
    }
}

// =============================================================================
// Display - compact, single-line format for logs
// =============================================================================

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.kind, self.status)?;

        if !self.operation.is_empty() {
            write!(f, " at {}", self.operation)?;
        }

        if !self.context.is_empty() {
            write!(f, ", context {{ ")?;
            for (i, (key, value)) in self.context.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{}: {}", key, value)?;
            }
            write!(f, " }}")?;
        }

        if !self.message.is_empty() {
            write!(f, " => {}", self.message)?;
        }

        Ok(())
    }
}

// =============================================================================
// Debug - verbose, multi-line format for debugging
// =============================================================================

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} ({}) at {}", self.kind, self.status, self.operation)?;

        if !self.message.is_empty() {
            writeln!(f)?;
            writeln!(f, "    Message: {}", self.message)?;
        }

        if !self.context.is_empty() {
            writeln!(f)?;
            writeln!(f, "    Context:")?;
            for (key, value) in &self.context {
                writeln!(f, "        {}: {}", key, value)?;
            }
        }

        if let Some(source) = &self.source {
            writeln!(f)?;
            writeln!(f, "    Source: {:?}", source)?;
        }

        Ok(())
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        let kind = match err.kind() {
            std::io::ErrorKind::NotFound => ErrorKind::FileNotFound,
            std::io::ErrorKind::PermissionDenied => ErrorKind::PermissionDenied,
            _ => ErrorKind::IoFailed,
        };
        Error::new(kind, err.to_string())
            .with_operation("io")
            .set_source(err)
    }
}

// =============================================================================
// Convenience constructors
// =============================================================================

impl Error {
    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unexpected, message)
    }

    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unsupported, message)
    }

    pub fn config_invalid(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ConfigInvalid, message)
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidArgument, message)
    }

    /// Create an AgentNotFound error
    pub fn agent_not_found(name: impl Into<String>) -> Self {
        let name = name.into();
        Self::new(ErrorKind::AgentNotFound, format!("agent '{}' is not registered", name))
            .with_context("agent", name)
    }

    /// Create a DuplicateAgent error
    pub fn duplicate_agent(name: impl Into<String>) -> Self {
        let name = name.into();
        Self::new(ErrorKind::DuplicateAgent, format!("agent '{}' is already registered", name))
            .with_context("agent", name)
    }

    /// Create a ProviderTimeout error
    pub fn provider_timeout(secs: u64) -> Self {
        Self::new(ErrorKind::ProviderTimeout, format!("provider call exceeded {}s", secs))
            .with_context("timeout_secs", secs.to_string())
    }

    pub fn parse_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ParseFailed, message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = Error::new(ErrorKind::ConfigInvalid, "no agents configured");
        assert_eq!(err.kind(), ErrorKind::ConfigInvalid);
        assert_eq!(err.message(), "no agents configured");
        assert_eq!(err.status(), ErrorStatus::Permanent);
    }

    #[test]
    fn test_error_with_context() {
        let err = Error::new(ErrorKind::NetworkFailed, "connection reset")
            .with_operation("agent::next_token")
            .with_context("agent", "Bob")
            .with_context("round", "3");

        assert_eq!(err.operation(), "agent::next_token");
        assert_eq!(err.context().len(), 2);
        assert_eq!(err.context()[0], ("agent", "Bob".to_string()));
        assert_eq!(err.context_value("round"), Some("3"));
        assert_eq!(err.context_value("missing"), None);
    }

    #[test]
    fn test_operation_chaining() {
        let err = Error::new(ErrorKind::RateLimited, "slow down")
            .with_operation("agent::next_token")
            .with_operation("interleaver::run");

        assert_eq!(err.operation(), "interleaver::run");
        assert_eq!(err.context().len(), 1);
        assert_eq!(err.context()[0], ("called", "agent::next_token".to_string()));
    }

    #[test]
    fn test_temporary_status() {
        let err = Error::new(ErrorKind::RateLimited, "429");
        assert!(err.is_retryable());

        let err = Error::new(ErrorKind::DuplicateAgent, "Alice twice");
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_persist() {
        let err = Error::new(ErrorKind::NetworkFailed, "connection refused").temporary();
        assert!(err.is_retryable());

        let err = err.persist();
        assert!(!err.is_retryable());
        assert_eq!(err.status(), ErrorStatus::Persistent);
    }

    #[test]
    fn test_display() {
        let err = Error::new(ErrorKind::ProviderTimeout, "no fragment within 30s")
            .with_operation("agent::next_token")
            .with_context("agent", "Charlie");

        let display = format!("{}", err);
        assert!(display.contains("ProviderTimeout"));
        assert!(display.contains("temporary"));
        assert!(display.contains("agent::next_token"));
        assert!(display.contains("agent: Charlie"));
        assert!(display.ends_with("=> no fragment within 30s"));
    }

    #[test]
    fn test_display_without_operation() {
        let err = Error::config_invalid("empty marker");
        assert_eq!(err.to_string(), "ConfigInvalid (permanent) => empty marker");
    }

    #[test]
    fn test_convenience_constructors() {
        let err = Error::agent_not_found("Dave");
        assert_eq!(err.kind(), ErrorKind::AgentNotFound);
        assert!(err.message().contains("Dave"));

        let err = Error::duplicate_agent("Alice");
        assert_eq!(err.context_value("agent"), Some("Alice"));

        let err = Error::provider_timeout(30);
        assert!(err.is_retryable());
    }

    #[test]
    fn test_io_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "agents.json");
        let err: Error = io_err.into();

        assert_eq!(err.kind(), ErrorKind::FileNotFound);
        assert_eq!(err.operation(), "io");
        assert!(err.source_ref().is_some());
    }
}
