//! # tokweave-error
//!
//! Unified error handling for tokweave.
//!
//! ## Design
//!
//! - **ErrorKind**: what went wrong (e.g. ConfigInvalid, RateLimited)
//! - **ErrorStatus**: whether a retry can help (Permanent, Temporary, Persistent)
//! - **Context**: key-value pairs that locate the failure (agent, marker, path)
//! - **Source**: the wrapped underlying error, never leaked as a raw type
//!
//! ## Usage
//!
//! ```rust
//! use tokweave_error::{Error, ErrorKind};
//!
//! fn example() -> Result<(), Error> {
//!     Err(Error::new(ErrorKind::AgentNotFound, "agent 'Dave' is not registered")
//!         .with_operation("ledger::route")
//!         .with_context("agent", "Dave"))
//! }
//! ```
//!
//! ## Principles
//!
//! - Fallible functions return `Result<T, tokweave_error::Error>`
//! - External errors are wrapped with `set_source(err)`
//! - An error is handled once; callers further up only append context

mod error;
mod kind;
mod status;

pub use error::Error;
pub use kind::ErrorKind;
pub use status::ErrorStatus;

/// Result type alias using the tokweave Error
pub type Result<T> = std::result::Result<T, Error>;
