//! Error kinds for tokweave operations

use std::fmt;

/// The kind of error that occurred.
///
/// Callers match on `ErrorKind` to decide how to react, for example to retire
/// a single agent on `RateLimited` but abort on `ConfigInvalid`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    // =========================================================================
    // General errors
    // =========================================================================
    /// An unexpected error occurred - catch-all for unhandled cases
    Unexpected,

    /// The requested feature or operation is not supported
    Unsupported,

    /// Invalid configuration (markers, budgets, agent roster)
    ConfigInvalid,

    /// Invalid argument passed to a function
    InvalidArgument,

    // =========================================================================
    // Agent roster errors
    // =========================================================================
    /// No agent with the given name is registered
    AgentNotFound,

    /// An agent with the same name is already registered
    DuplicateAgent,

    // =========================================================================
    // Token source errors
    // =========================================================================
    /// The token source is not reachable
    ProviderUnavailable,

    /// The token source returned an error response
    ProviderFailed,

    /// Network error while talking to the token source
    NetworkFailed,

    /// Rate limit exceeded
    RateLimited,

    /// Credentials were rejected
    AuthenticationFailed,

    /// A provider call did not complete in time
    ProviderTimeout,

    // =========================================================================
    // IO errors
    // =========================================================================
    /// File not found
    FileNotFound,

    /// Permission denied
    PermissionDenied,

    /// IO operation failed
    IoFailed,

    // =========================================================================
    // Parse errors
    // =========================================================================
    /// Failed to parse input
    ParseFailed,

    /// Serialization/deserialization failed
    SerializationFailed,
}

impl ErrorKind {
    /// Returns the error kind as a static string
    pub fn as_str(&self) -> &'static str {
        match self {
            // General
            ErrorKind::Unexpected => "Unexpected",
            ErrorKind::Unsupported => "Unsupported",
            ErrorKind::ConfigInvalid => "ConfigInvalid",
            ErrorKind::InvalidArgument => "InvalidArgument",

            // Roster
            ErrorKind::AgentNotFound => "AgentNotFound",
            ErrorKind::DuplicateAgent => "DuplicateAgent",

            // Token source
            ErrorKind::ProviderUnavailable => "ProviderUnavailable",
            ErrorKind::ProviderFailed => "ProviderFailed",
            ErrorKind::NetworkFailed => "NetworkFailed",
            ErrorKind::RateLimited => "RateLimited",
            ErrorKind::AuthenticationFailed => "AuthenticationFailed",
            ErrorKind::ProviderTimeout => "ProviderTimeout",

            // IO
            ErrorKind::FileNotFound => "FileNotFound",
            ErrorKind::PermissionDenied => "PermissionDenied",
            ErrorKind::IoFailed => "IoFailed",

            // Parse
            ErrorKind::ParseFailed => "ParseFailed",
            ErrorKind::SerializationFailed => "SerializationFailed",
        }
    }

    /// Check if this error kind is retryable by default
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorKind::NetworkFailed
                | ErrorKind::RateLimited
                | ErrorKind::ProviderTimeout
                | ErrorKind::ProviderUnavailable
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind_display() {
        assert_eq!(ErrorKind::ConfigInvalid.to_string(), "ConfigInvalid");
        assert_eq!(ErrorKind::ProviderTimeout.to_string(), "ProviderTimeout");
    }

    #[test]
    fn test_is_retryable() {
        assert!(ErrorKind::NetworkFailed.is_retryable());
        assert!(ErrorKind::RateLimited.is_retryable());
        assert!(!ErrorKind::AuthenticationFailed.is_retryable());
        assert!(!ErrorKind::DuplicateAgent.is_retryable());
    }
}
