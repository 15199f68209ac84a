//! Round-robin interleaving
//!
//! Each round visits every active agent once, in registration order. A token
//! is routed before the next agent is asked, so later agents in a round
//! already see it in their context.

use super::{AgentState, Observer, Roster, RunEvent, RunReport};
use crate::agent::StreamSettings;
use crate::config::RunConfig;
use crate::error::Result;
use crate::provider::TokenSource;
use crate::router::Ledger;
use tracing::info;

pub struct Interleaver<S> {
    source: S,
    settings: StreamSettings,
    roster: Roster,
    rounds: usize,
}

impl<S: TokenSource> Interleaver<S> {
    pub fn new(config: &RunConfig, source: S) -> Result<Self> {
        Ok(Self {
            source,
            settings: StreamSettings::from_config(config),
            roster: Roster::new(config)?,
            rounds: 0,
        })
    }

    pub fn with_observer(mut self, observer: impl FnMut(&RunEvent) + 'static) -> Self {
        self.roster.set_observer(Box::new(observer) as Observer);
        self
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Views as routed so far, also after an aborted run
    pub fn ledger(&self) -> &Ledger {
        self.roster.ledger()
    }

    pub fn states(&self) -> Vec<(&str, &AgentState)> {
        self.roster.states()
    }

    pub fn rounds(&self) -> usize {
        self.rounds
    }

    /// Run rounds until every agent has retired.
    pub async fn run(&mut self) -> Result<RunReport> {
        self.roster.start();

        while self.roster.active_count() > 0 {
            self.rounds += 1;
            for index in 0..self.roster.len() {
                if !self.roster.is_active(index) {
                    continue;
                }
                let (stream, view) = self.roster.stream_and_view(index)?;
                let outcome = stream.next_token(&self.source, view, &self.settings).await;
                self.roster
                    .apply(index, outcome)
                    .map_err(|e| e.with_operation("interleaver::run").with_context("round", self.rounds.to_string()))?;
            }
            let active = self.roster.active_count();
            self.roster.emit(RunEvent::RoundFinished { round: self.rounds, active });
        }

        info!(rounds = self.rounds, source = self.source.name(), "interleaving complete");
        Ok(self.roster.report(self.rounds))
    }
}
