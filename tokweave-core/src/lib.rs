//! # tokweave
//!
//! Token-level interleaving of several streaming LLM agents.
//!
//! ## Core Concepts
//! - **Token source**: trait-based streaming completion (OpenAI-compatible, scripted)
//! - **Chunker**: turns raw fragments into whitespace tokens, spotting mode markers
//! - **Agent stream**: one agent's pending queue, mode and context building
//! - **Ledger**: per-agent views, written only through the visibility router
//! - **Interleaver**: round-robin (or first-completed) driver over all agents
//! - **Reward loop**: scores competing token streams against a target phrase

pub mod agent;
pub mod chunker;
pub mod config;
pub mod error;
pub mod marker;
pub mod message;
pub mod provider;
pub mod reward;
pub mod router;
pub mod scheduler;

pub use agent::{AgentSpec, AgentStream, Next, StreamSettings};
pub use chunker::Chunker;
pub use config::{FailurePolicy, RunConfig, StreamPolicy};
pub use error::{Error, ErrorKind, ErrorStatus, Result};
pub use marker::MarkerSet;
pub use message::{Message, Token, View, VisibilityMode};
pub use provider::{
    ChatMessage, CompletionRequest, FinishReason, OpenAIProvider, ProviderConfig, ProviderError,
    Role, ScriptedSource, StreamChunk, StreamReceiver, TokenSource,
};
pub use reward::{compete, run_cycle, Contestant, CycleOutcome, Learner, PhraseEnv};
pub use router::Ledger;
pub use scheduler::{
    AgentState, AgentSummary, ConcurrentInterleaver, Interleaver, RetireReason, RunEvent, RunReport,
};
