//! Run configuration
//!
//! A run is described by a JSON document: the agents, the per-agent token
//! budget, the marker strings and the scheduling policies. Every field except
//! `agents` has a default.

use crate::agent::AgentSpec;
use crate::error::{config_invalid, Error, Result};
use crate::marker::MarkerSet;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

/// When an agent's generation stream is (re)opened
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamPolicy {
    /// Open a fresh stream, seeded with the current view, whenever the
    /// pending queue is empty
    #[default]
    Reopen,
    /// Open one stream on first use and read it to the end
    Persistent,
}

/// What a provider error does to the run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Stop the run and surface the error
    #[default]
    Abort,
    /// Retire the failing agent and keep going
    RetireAgent,
}

fn default_max_tokens() -> usize {
    200
}

fn default_call_timeout() -> Option<u64> {
    Some(60)
}

fn default_model() -> String {
    "gpt-4".to_string()
}

fn default_temperature() -> f32 {
    0.7
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    pub agents: Vec<AgentSpec>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens_per_agent: usize,
    #[serde(default)]
    pub markers: MarkerSet,
    #[serde(default)]
    pub stream_policy: StreamPolicy,
    #[serde(default)]
    pub failure_policy: FailurePolicy,
    /// Limit on each provider call, `null` for none
    #[serde(default = "default_call_timeout")]
    pub call_timeout_secs: Option<u64>,
    /// Model used by agents that don't name one
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            agents: Vec::new(),
            max_tokens_per_agent: default_max_tokens(),
            markers: MarkerSet::default(),
            stream_policy: StreamPolicy::default(),
            failure_policy: FailurePolicy::default(),
            call_timeout_secs: default_call_timeout(),
            model: default_model(),
            temperature: default_temperature(),
        }
    }
}

impl RunConfig {
    pub fn new(agents: Vec<AgentSpec>) -> Self {
        Self {
            agents,
            ..Default::default()
        }
    }

    /// Load and validate a config file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            Error::from(e)
                .with_operation("config::from_file")
                .with_context("path", path.display().to_string())
        })?;
        let config = Self::from_json(&json)
            .map_err(|e| e.with_context("path", path.display().to_string()))?;
        Ok(config)
    }

    /// Parse and validate a JSON config
    pub fn from_json(json: &str) -> Result<Self> {
        let config: RunConfig = serde_json::from_str(json).map_err(|e| {
            Error::parse_failed(format!("invalid config: {}", e))
                .with_operation("config::from_json")
                .set_source(e)
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.agents.is_empty() {
            return Err(config_invalid("agents", "at least one agent is required"));
        }
        let mut seen = HashSet::new();
        for agent in &self.agents {
            if agent.name.trim().is_empty() {
                return Err(config_invalid("agents.name", "agent name must not be empty"));
            }
            if !seen.insert(agent.name.as_str()) {
                return Err(config_invalid("agents.name", format!("agent '{}' appears twice", agent.name))
                    .with_context("agent", agent.name.clone()));
            }
        }
        if self.max_tokens_per_agent == 0 {
            return Err(config_invalid("max_tokens_per_agent", "budget must be at least 1"));
        }
        self.markers.validate()
    }

    pub fn call_timeout(&self) -> Option<Duration> {
        self.call_timeout_secs.map(Duration::from_secs)
    }

    pub fn with_max_tokens(mut self, max: usize) -> Self {
        self.max_tokens_per_agent = max;
        self
    }

    pub fn with_stream_policy(mut self, policy: StreamPolicy) -> Self {
        self.stream_policy = policy;
        self
    }

    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    pub fn with_call_timeout(mut self, secs: Option<u64>) -> Self {
        self.call_timeout_secs = secs;
        self
    }

    /// Three agents talking about AI ethics
    pub fn demo() -> Self {
        Self::new(vec![
            AgentSpec::new(
                "Alice",
                "You are a creative AI interested in philosophy.",
                "Introduce yourself in 1 short sentence and suggest discussing AI ethics.",
            ),
            AgentSpec::new(
                "Bob",
                "You are a logical AI interested in science.",
                "Respond briefly to the conversation.",
            ),
            AgentSpec::new(
                "Charlie",
                "You are a practical AI interested in real-world applications.",
                "Add your perspective briefly.",
            ),
        ])
        .with_max_tokens(100)
    }
}
