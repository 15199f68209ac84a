//! Error status - whether an operation is worth retrying

use std::fmt;

/// How the caller should treat an error.
///
/// `Temporary` errors may succeed on retry. Once retries are exhausted the
/// error becomes `Persistent`. `Permanent` errors never succeed on retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorStatus {
    /// Retrying will not help
    Permanent,
    /// Retrying may help
    Temporary,
    /// Was temporary, but retries have been exhausted
    Persistent,
}

impl ErrorStatus {
    /// Whether the error is worth retrying
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorStatus::Temporary)
    }

    /// Mark a temporary status as persistent; other statuses are unchanged
    pub fn persist(self) -> Self {
        match self {
            ErrorStatus::Temporary => ErrorStatus::Persistent,
            other => other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorStatus::Permanent => "permanent",
            ErrorStatus::Temporary => "temporary",
            ErrorStatus::Persistent => "persistent",
        }
    }
}

impl fmt::Display for ErrorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
