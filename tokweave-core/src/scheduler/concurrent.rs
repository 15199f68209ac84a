//! First-completed interleaving
//!
//! Every active agent has one pull in flight. Whichever pull finishes first
//! is applied by the single coordinator loop: routed, counted, and replaced
//! by a new pull that builds its context from the view as it is now.

use super::{AgentState, Observer, Roster, RunEvent, RunReport};
use crate::agent::{AgentStream, Next, StreamSettings};
use crate::config::RunConfig;
use crate::error::Result;
use crate::message::View;
use crate::provider::{ProviderError, TokenSource};
use crate::router::Ledger;
use futures_util::stream::{FuturesUnordered, StreamExt};
use tracing::info;

/// One `next_token` call that owns its stream until it completes
pub(crate) async fn pull<S: TokenSource>(
    index: usize,
    mut stream: AgentStream,
    view: View,
    source: &S,
    settings: &StreamSettings,
) -> (usize, AgentStream, std::result::Result<Next, ProviderError>) {
    let outcome = stream.next_token(source, &view, settings).await;
    (index, stream, outcome)
}

pub struct ConcurrentInterleaver<S> {
    source: S,
    settings: StreamSettings,
    roster: Roster,
}

impl<S: TokenSource> ConcurrentInterleaver<S> {
    pub fn new(config: &RunConfig, source: S) -> Result<Self> {
        Ok(Self {
            source,
            settings: StreamSettings::from_config(config),
            roster: Roster::new(config)?,
        })
    }

    pub fn with_observer(mut self, observer: impl FnMut(&RunEvent) + 'static) -> Self {
        self.roster.set_observer(Box::new(observer) as Observer);
        self
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn ledger(&self) -> &Ledger {
        self.roster.ledger()
    }

    pub fn states(&self) -> Vec<(&str, &AgentState)> {
        self.roster.states()
    }

    pub async fn run(&mut self) -> Result<RunReport> {
        let source = &self.source;
        let settings = &self.settings;
        let roster = &mut self.roster;
        roster.start();

        let mut in_flight = FuturesUnordered::new();
        for index in 0..roster.len() {
            let (stream, view) = roster.take_stream(index)?;
            in_flight.push(pull(index, stream, view, source, settings));
        }

        while let Some((index, stream, outcome)) = in_flight.next().await {
            roster.return_stream(index, stream);
            roster
                .apply(index, outcome)
                .map_err(|e| e.with_operation("concurrent::run"))?;

            if roster.is_active(index) {
                let (stream, view) = roster.take_stream(index)?;
                in_flight.push(pull(index, stream, view, source, settings));
            }
        }

        info!(source = source.name(), "concurrent interleaving complete");
        Ok(roster.report(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::AgentSpec;
    use crate::config::FailurePolicy;
    use crate::provider::{Script, ScriptedSource};
    use crate::scheduler::RetireReason;
    use std::time::Duration;

    fn config(names: &[&str], budget: usize) -> RunConfig {
        RunConfig::new(names.iter().map(|n| AgentSpec::named(*n)).collect()).with_max_tokens(budget)
    }

    #[tokio::test]
    async fn test_all_agents_reach_budget() {
        let source = ScriptedSource::endless("<broadcast> la ");
        let mut interleaver = ConcurrentInterleaver::new(&config(&["A", "B", "C"], 4), &source).unwrap();

        let report = interleaver.run().await.unwrap();
        assert_eq!(report.total_emitted(), 12);
        for agent in &report.agents {
            assert_eq!(agent.state, AgentState::Retired(RetireReason::Budget));
        }
        // Every broadcast reaches every view.
        for view in report.ledger.views() {
            let words: usize = view.messages().iter().map(|m| m.content.split_whitespace().count()).sum();
            assert_eq!(words, 12);
        }
    }

    #[tokio::test]
    async fn test_retiring_one_agent_leaves_others_running() {
        let source = ScriptedSource::new()
            .agent_script("A", Script::fragments(["a1 a2 a3 "]))
            .agent_script("B", Script::Broken(vec![], "connection reset".into()));
        let config = config(&["A", "B"], 10).with_failure_policy(FailurePolicy::RetireAgent);
        let mut interleaver = ConcurrentInterleaver::new(&config, &source).unwrap();

        let report = interleaver.run().await.unwrap();
        assert_eq!(report.emitted("A"), 3);
        assert_eq!(report.agent("A").unwrap().state, AgentState::Retired(RetireReason::Exhausted));
        assert!(matches!(report.agent("B").unwrap().state, AgentState::Retired(RetireReason::Failed(_))));
    }

    #[tokio::test]
    async fn test_stalled_agent_times_out() {
        let source = ScriptedSource::new()
            .agent_script("A", Script::fragments(["fine "]))
            .agent_script("B", Script::Stall);
        let config = config(&["A", "B"], 10).with_failure_policy(FailurePolicy::RetireAgent);
        let mut interleaver = ConcurrentInterleaver::new(&config, &source).unwrap();
        interleaver.settings.call_timeout = Some(Duration::from_millis(20));

        let report = interleaver.run().await.unwrap();
        assert_eq!(report.emitted("A"), 1);
        assert_eq!(
            report.agent("B").unwrap().state,
            AgentState::Retired(RetireReason::Failed("Timed out after 20ms".to_string()))
        );
    }

    #[tokio::test]
    async fn test_marker_only_agent_does_not_starve_others() {
        let source = ScriptedSource::new()
            .agent_script("A", Script::Endless("<broadcast> ".into()))
            .agent_script("B", Script::fragments(["b1 b2 "]));
        let config = config(&["A", "B"], 10).with_failure_policy(FailurePolicy::RetireAgent);
        let mut interleaver = ConcurrentInterleaver::new(&config, &source).unwrap();
        interleaver.settings.max_idle_fragments = 500;

        let report = interleaver.run().await.unwrap();
        assert_eq!(report.emitted("B"), 2);
        assert_eq!(report.emitted("A"), 0);
        assert!(matches!(report.agent("A").unwrap().state, AgentState::Retired(RetireReason::Failed(_))));
    }

    #[tokio::test]
    async fn test_abort_stops_run() {
        let source = ScriptedSource::failing(ProviderError::AuthenticationFailed);
        let mut interleaver = ConcurrentInterleaver::new(&config(&["A", "B"], 3), &source).unwrap();
        let err = interleaver.run().await.unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::AuthenticationFailed);
        assert_eq!(err.operation(), "concurrent::run");
    }
}
