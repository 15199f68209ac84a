//! # Schedulers
//!
//! Two drivers decide whose token goes next:
//! - `Interleaver`: strict round-robin in registration order
//! - `ConcurrentInterleaver`: whichever agent's token arrives first
//!
//! Both share the bookkeeping in `Roster`: per-agent budgets, retirement,
//! routing into the ledger and observer events.

mod concurrent;
mod round_robin;

pub use concurrent::ConcurrentInterleaver;
pub use round_robin::Interleaver;

pub(crate) use concurrent::pull;

use crate::agent::{AgentStream, Next};
use crate::config::{FailurePolicy, RunConfig};
use crate::error::{agent_failed, Error, Result};
use crate::message::{Token, View};
use crate::provider::ProviderError;
use crate::router::Ledger;
use std::fmt;
use tracing::{info, warn};

/// Why an agent stopped producing
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetireReason {
    /// The source had nothing more
    Exhausted,
    /// The agent hit `max_tokens_per_agent`
    Budget,
    /// A provider error under `FailurePolicy::RetireAgent`, or the error that aborted the run
    Failed(String),
}

impl fmt::Display for RetireReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetireReason::Exhausted => write!(f, "stream complete"),
            RetireReason::Budget => write!(f, "max tokens reached"),
            RetireReason::Failed(e) => write!(f, "failed: {}", e),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentState {
    Active,
    Retired(RetireReason),
}

impl AgentState {
    pub fn is_active(&self) -> bool {
        matches!(self, AgentState::Active)
    }
}

/// Progress notifications handed to an observer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunEvent {
    Started { agents: Vec<String> },
    /// A token was emitted and routed; `pending` is what the agent still has queued
    Token { agent: String, token: Token, pending: Vec<String> },
    Retired { agent: String, reason: RetireReason },
    RoundFinished { round: usize, active: usize },
}

pub type Observer = Box<dyn FnMut(&RunEvent)>;

/// Final per-agent tally
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentSummary {
    pub name: String,
    pub emitted: usize,
    pub state: AgentState,
}

#[derive(Debug, Clone)]
pub struct RunReport {
    /// Completed rounds; zero for the first-completed scheduler
    pub rounds: usize,
    pub agents: Vec<AgentSummary>,
    pub ledger: Ledger,
}

impl RunReport {
    pub fn agent(&self, name: &str) -> Option<&AgentSummary> {
        self.agents.iter().find(|a| a.name == name)
    }

    pub fn emitted(&self, name: &str) -> usize {
        self.agent(name).map_or(0, |a| a.emitted)
    }

    pub fn total_emitted(&self) -> usize {
        self.agents.iter().map(|a| a.emitted).sum()
    }
}

struct Slot {
    /// `None` while a first-completed pull owns the stream
    stream: Option<AgentStream>,
    name: String,
    emitted: usize,
    state: AgentState,
}

/// Shared state of a run
pub(crate) struct Roster {
    slots: Vec<Slot>,
    ledger: Ledger,
    max_tokens: usize,
    failure_policy: FailurePolicy,
    observer: Option<Observer>,
}

impl Roster {
    pub(crate) fn new(config: &RunConfig) -> Result<Self> {
        config.validate()?;
        let mut ledger = Ledger::new();
        let mut slots = Vec::with_capacity(config.agents.len());
        for spec in &config.agents {
            ledger.register(&spec.name)?;
            slots.push(Slot {
                stream: Some(AgentStream::new(spec.clone(), &config.markers)),
                name: spec.name.clone(),
                emitted: 0,
                state: AgentState::Active,
            });
        }
        Ok(Self {
            slots,
            ledger,
            max_tokens: config.max_tokens_per_agent,
            failure_policy: config.failure_policy,
            observer: None,
        })
    }

    pub(crate) fn set_observer(&mut self, observer: Observer) {
        self.observer = Some(observer);
    }

    pub(crate) fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub(crate) fn len(&self) -> usize {
        self.slots.len()
    }

    pub(crate) fn is_active(&self, index: usize) -> bool {
        self.slots.get(index).is_some_and(|s| s.state.is_active())
    }

    pub(crate) fn active_count(&self) -> usize {
        self.slots.iter().filter(|s| s.state.is_active()).count()
    }

    pub(crate) fn states(&self) -> Vec<(&str, &AgentState)> {
        self.slots.iter().map(|s| (s.name.as_str(), &s.state)).collect()
    }

    pub(crate) fn emit(&mut self, event: RunEvent) {
        if let Some(observer) = self.observer.as_mut() {
            observer(&event);
        }
    }

    pub(crate) fn start(&mut self) {
        let agents = self.slots.iter().map(|s| s.name.clone()).collect();
        self.emit(RunEvent::Started { agents });
    }

    /// Borrow an agent's stream together with its current view
    pub(crate) fn stream_and_view(&mut self, index: usize) -> Result<(&mut AgentStream, &View)> {
        let view = self
            .ledger
            .view(index)
            .ok_or_else(|| Error::unexpected(format!("no view for agent #{}", index)))?;
        let stream = self
            .slots
            .get_mut(index)
            .and_then(|s| s.stream.as_mut())
            .ok_or_else(|| Error::unexpected(format!("agent #{} has no stream", index)))?;
        Ok((stream, view))
    }

    /// Hand the stream to an in-flight pull. The view is snapshotted only
    /// when the pull will open a stream; otherwise it gets an empty one.
    pub(crate) fn take_stream(&mut self, index: usize) -> Result<(AgentStream, View)> {
        if self.ledger.view(index).is_none() {
            return Err(Error::unexpected(format!("no view for agent #{}", index)));
        }
        let stream = self
            .slots
            .get_mut(index)
            .and_then(|s| s.stream.take())
            .ok_or_else(|| Error::unexpected(format!("agent #{} is already in flight", index)))?;
        let view = match self.ledger.view(index) {
            Some(view) if stream.needs_context() => view.clone(),
            _ => View::new(stream.name()),
        };
        Ok((stream, view))
    }

    pub(crate) fn return_stream(&mut self, index: usize, stream: AgentStream) {
        if let Some(slot) = self.slots.get_mut(index) {
            slot.stream = Some(stream);
        }
    }

    /// Apply one `next_token` outcome: route, count, retire, or abort.
    pub(crate) fn apply(&mut self, index: usize, outcome: std::result::Result<Next, ProviderError>) -> Result<()> {
        let Some(slot) = self.slots.get_mut(index) else {
            return Err(Error::unexpected(format!("no agent #{}", index)));
        };
        let name = slot.name.clone();

        match outcome {
            Ok(Next::Token(token)) => {
                slot.emitted += 1;
                let over_budget = slot.emitted >= self.max_tokens;
                let pending = slot
                    .stream
                    .as_ref()
                    .map(|s| s.pending().map(|t| t.text.clone()).collect())
                    .unwrap_or_default();

                self.ledger.route(&name, &token);
                self.emit(RunEvent::Token { agent: name, token, pending });
                if over_budget {
                    self.retire(index, RetireReason::Budget);
                }
                Ok(())
            }
            Ok(Next::End) => {
                self.retire(index, RetireReason::Exhausted);
                Ok(())
            }
            Err(err) => {
                let reason = RetireReason::Failed(err.to_string());
                match self.failure_policy {
                    FailurePolicy::Abort => {
                        self.retire(index, reason);
                        Err(agent_failed(&name, err))
                    }
                    FailurePolicy::RetireAgent => {
                        warn!(agent = %name, error = %err, "provider failed, retiring agent");
                        self.retire(index, reason);
                        Ok(())
                    }
                }
            }
        }
    }

    fn retire(&mut self, index: usize, reason: RetireReason) {
        let Some(slot) = self.slots.get_mut(index) else {
            return;
        };
        if !slot.state.is_active() {
            return;
        }
        info!(agent = %slot.name, emitted = slot.emitted, %reason, "agent retired");
        slot.state = AgentState::Retired(reason.clone());
        let agent = slot.name.clone();
        self.emit(RunEvent::Retired { agent, reason });
    }

    pub(crate) fn report(&self, rounds: usize) -> RunReport {
        RunReport {
            rounds,
            agents: self
                .slots
                .iter()
                .map(|s| AgentSummary {
                    name: s.name.clone(),
                    emitted: s.emitted,
                    state: s.state.clone(),
                })
                .collect(),
            ledger: self.ledger.clone(),
        }
    }
}
