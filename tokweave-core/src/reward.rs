//! Reward loop
//!
//! Several contestants stream tokens at the same time. Each stream is
//! scored against a target phrase, and every learner is then trained on
//! the winning sequence.

use crate::agent::{AgentSpec, AgentStream, Next, StreamSettings};
use crate::error::{agent_failed, Error, Result};
use crate::message::View;
use crate::provider::{Script, ScriptedSource, TokenSource};
use crate::scheduler::pull;
use futures_util::stream::{FuturesUnordered, StreamExt};
use tracing::{debug, info};

pub const DEFAULT_CHUNK_SIZE: usize = 3;

/// Guess-the-phrase environment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhraseEnv {
    target: String,
    target_tokens: Vec<String>,
}

impl PhraseEnv {
    pub fn new(target: impl Into<String>) -> Self {
        Self::with_chunk_size(target, DEFAULT_CHUNK_SIZE)
    }

    /// Split `target` into pieces of `chunk` characters; the last may be shorter
    pub fn with_chunk_size(target: impl Into<String>, chunk: usize) -> Self {
        let target = target.into();
        let chars: Vec<char> = target.chars().collect();
        let target_tokens = chars
            .chunks(chunk.max(1))
            .map(|piece| piece.iter().collect())
            .collect();
        Self { target, target_tokens }
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn target_tokens(&self) -> &[String] {
        &self.target_tokens
    }

    /// Positions where `tokens` matches the target; extra tokens on either side don't count
    pub fn score<T: AsRef<str>>(&self, tokens: &[T]) -> usize {
        tokens
            .iter()
            .zip(&self.target_tokens)
            .filter(|(got, want)| got.as_ref() == want.as_str())
            .count()
    }
}

/// A memorising policy: it replays whatever it was last trained on
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Learner {
    pub name: String,
    pub system_message: String,
    memory: Vec<String>,
}

impl Learner {
    pub fn new(name: impl Into<String>, system_message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            system_message: system_message.into(),
            memory: Vec::new(),
        }
    }

    /// Start from an initial guess instead of silence
    pub fn with_guess<S: Into<String>>(mut self, guess: impl IntoIterator<Item = S>) -> Self {
        self.memory = guess.into_iter().map(Into::into).collect();
        self
    }

    pub fn train(&mut self, winner: &[String]) {
        self.memory = winner.to_vec();
    }

    pub fn generate(&self) -> Vec<String> {
        self.memory.clone()
    }

    /// The memorised tokens as a single-fragment stream
    pub fn as_source(&self) -> ScriptedSource {
        let mut text = self.memory.join(" ");
        if !text.is_empty() {
            text.push(' ');
        }
        ScriptedSource::new().named(self.name.clone()).script(Script::fragments([text]))
    }

    pub fn contestant(&self, target: &str) -> Contestant<ScriptedSource> {
        Contestant {
            spec: AgentSpec::new(self.name.clone(), self.system_message.clone(), target),
            source: self.as_source(),
        }
    }
}

/// One competitor: who it is and where its tokens come from
pub struct Contestant<S> {
    pub spec: AgentSpec,
    pub source: S,
}

impl<S> Contestant<S> {
    pub fn new(spec: AgentSpec, source: S) -> Self {
        Self { spec, source }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleOutcome {
    pub names: Vec<String>,
    pub tokens: Vec<Vec<String>>,
    pub scores: Vec<usize>,
    /// Index of the first contestant with the best score
    pub winner: usize,
}

impl CycleOutcome {
    pub fn winner_name(&self) -> &str {
        self.names.get(self.winner).map_or("", String::as_str)
    }

    pub fn winner_tokens(&self) -> &[String] {
        self.tokens.get(self.winner).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn best_score(&self) -> usize {
        self.scores.get(self.winner).copied().unwrap_or(0)
    }
}

/// Stream every contestant concurrently and score the results.
///
/// A contestant stops once it has produced as many tokens as the target
/// has pieces, since later tokens cannot score.
pub async fn compete<S: TokenSource>(
    env: &PhraseEnv,
    contestants: &[Contestant<S>],
    settings: &StreamSettings,
) -> Result<CycleOutcome> {
    if contestants.is_empty() {
        return Err(Error::invalid_argument("a cycle needs at least one contestant").with_operation("reward::compete"));
    }
    let limit = env.target_tokens().len();
    let mut tokens: Vec<Vec<String>> = vec![Vec::new(); contestants.len()];

    let mut in_flight = FuturesUnordered::new();
    for (index, contestant) in contestants.iter().enumerate() {
        if limit == 0 {
            break;
        }
        let stream = AgentStream::new(contestant.spec.clone(), &settings.markers);
        let view = View::new(contestant.spec.name.clone());
        in_flight.push(pull(index, stream, view, &contestant.source, settings));
    }

    while let Some((index, stream, outcome)) = in_flight.next().await {
        let name = &contestants[index].spec.name;
        match outcome {
            Ok(Next::Token(token)) => {
                debug!(contestant = %name, token = %token.text, "contest token");
                tokens[index].push(token.text);
                if tokens[index].len() < limit {
                    let view = View::new(name.clone());
                    in_flight.push(pull(index, stream, view, &contestants[index].source, settings));
                }
            }
            Ok(Next::End) => {}
            Err(err) => return Err(agent_failed(name, err).with_operation("reward::compete")),
        }
    }

    let scores: Vec<usize> = tokens.iter().map(|t| env.score(t)).collect();
    let best = scores.iter().copied().max().unwrap_or(0);
    let winner = scores.iter().position(|s| *s == best).unwrap_or(0);

    Ok(CycleOutcome {
        names: contestants.iter().map(|c| c.spec.name.clone()).collect(),
        tokens,
        scores,
        winner,
    })
}

/// One generation: compete, pick the winner, train every learner on it
pub async fn run_cycle(env: &PhraseEnv, learners: &mut [Learner], settings: &StreamSettings) -> Result<CycleOutcome> {
    let contestants: Vec<_> = learners.iter().map(|l| l.contestant(env.target())).collect();
    let outcome = compete(env, &contestants, settings).await?;

    info!(winner = outcome.winner_name(), score = outcome.best_score(), "cycle finished");
    let winning = outcome.winner_tokens().to_vec();
    for learner in learners.iter_mut() {
        learner.train(&winning);
    }
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_environment_score() {
        let env = PhraseEnv::new("hello");
        assert_eq!(env.target_tokens(), ["hel", "lo"]);
        assert_eq!(env.score(&["hel", "lo"]), 2);
        assert_eq!(env.score(&["hel", "la"]), 1);
        assert_eq!(env.score::<&str>(&[]), 0);
        assert_eq!(env.score(&["hel", "lo", "extra"]), 2);
    }

    #[test]
    fn test_chunking_is_char_safe() {
        let env = PhraseEnv::with_chunk_size("héllo wörld", 4);
        assert_eq!(env.target_tokens(), ["héll", "o wö", "rld"]);
        assert!(PhraseEnv::new("").target_tokens().is_empty());
    }

    #[test]
    fn test_train_and_generate() {
        let mut learner = Learner::new("a", "");
        learner.train(&["hel".to_string(), "lo".to_string()]);
        assert_eq!(learner.generate()[..2], ["hel", "lo"]);
    }

    #[tokio::test]
    async fn test_learner_source_replays_memory() {
        let learner = Learner::new("a", "").with_guess(["hel", "lo"]);
        let source = learner.as_source();
        let rx = source.open_stream(Default::default()).await.unwrap();
        assert_eq!(rx.collect_text().await.unwrap(), "hel lo ");
        assert_eq!(source.name(), "a");
    }

    #[tokio::test]
    async fn test_cycle_picks_best_and_trains_all() {
        let env = PhraseEnv::new("hello");
        let mut learners = vec![
            Learner::new("a", "").with_guess(["hel", "la"]),
            Learner::new("b", "").with_guess(["hel", "lo"]),
            Learner::new("c", ""),
        ];

        let outcome = run_cycle(&env, &mut learners, &StreamSettings::default()).await.unwrap();
        assert_eq!(outcome.scores, vec![1, 2, 0]);
        assert_eq!(outcome.winner_name(), "b");
        assert_eq!(outcome.best_score(), 2);
        for learner in &learners {
            assert_eq!(learner.generate(), vec!["hel", "lo"]);
        }

        let again = run_cycle(&env, &mut learners, &StreamSettings::default()).await.unwrap();
        assert_eq!(again.scores, vec![2, 2, 2]);
        assert_eq!(again.winner, 0);
    }

    #[tokio::test]
    async fn test_contestants_stop_at_target_length() {
        let env = PhraseEnv::new("hello");
        let contestants = vec![Contestant::new(AgentSpec::named("loud"), ScriptedSource::endless("hel "))];
        let outcome = compete(&env, &contestants, &StreamSettings::default()).await.unwrap();
        assert_eq!(outcome.tokens[0], vec!["hel", "hel"]);
        assert_eq!(outcome.scores, vec![1]);
    }

    #[tokio::test]
    async fn test_empty_contest_rejected() {
        let env = PhraseEnv::new("hello");
        let none: Vec<Contestant<ScriptedSource>> = Vec::new();
        assert!(compete(&env, &none, &StreamSettings::default()).await.is_err());
    }
}
