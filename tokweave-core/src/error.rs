//! Error types for the interleaving core
//!
//! Re-exports tokweave-error and maps token source failures onto it.

pub use tokweave_error::{Error, ErrorKind, ErrorStatus, Result};

use crate::provider::ProviderError;

impl From<ProviderError> for Error {
    fn from(err: ProviderError) -> Self {
        let kind = match &err {
            ProviderError::Network(_) => ErrorKind::NetworkFailed,
            ProviderError::Api { .. } => ErrorKind::ProviderFailed,
            ProviderError::Parse(_) => ErrorKind::ParseFailed,
            ProviderError::RateLimited { .. } => ErrorKind::RateLimited,
            ProviderError::AuthenticationFailed => ErrorKind::AuthenticationFailed,
            ProviderError::Timeout { .. } => ErrorKind::ProviderTimeout,
            ProviderError::Stream(_) => ErrorKind::NetworkFailed,
            ProviderError::Other(_) => ErrorKind::ProviderFailed,
        };
        let mut error = Error::new(kind, err.to_string()).with_operation("provider");
        if let ProviderError::Api { status, .. } = &err {
            error = error.with_context("status", status.to_string());
        }
        if let ProviderError::RateLimited { retry_after: Some(secs) } = &err {
            error = error.with_context("retry_after", secs.to_string());
        }
        error.set_source(err)
    }
}

/// Create a ConfigInvalid error naming the offending field
pub fn config_invalid(field: &'static str, reason: impl Into<String>) -> Error {
    Error::config_invalid(reason).with_context("field", field)
}

/// Wrap a provider failure with the agent it belongs to
pub fn agent_failed(agent: &str, err: ProviderError) -> Error {
    Error::from(err)
        .with_operation("agent::next_token")
        .with_context("agent", agent)
}
