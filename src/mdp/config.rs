use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Outcome of taking one action in one state
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    /// Token id of the next state
    pub next: usize,
    /// Reward for taking the transition
    pub reward: f32,
}

impl Transition {
    pub const fn new(next: usize, reward: f32) -> Self {
        Self { next, reward }
    }
}

/// Configuration of the tabular MDP
///
/// `transitions[s][a]` is the outcome of action `a` in state `s`. Rows for
/// terminal states are ignored by the engine: terminal states are absorbing
/// and pay nothing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MdpConfig {
    /// Number of states, which is also the one-hot state dimension
    pub num_states: usize,
    /// Number of discrete actions
    pub num_actions: usize,
    /// Transition table indexed by `[state][action]`
    pub transitions: Vec<Vec<Transition>>,
    /// Token ids that end an episode
    pub terminal_states: Vec<usize>,
    /// Token ids episodes may start from (sampled uniformly)
    pub start_states: Vec<usize>,
    /// Seed for start-state sampling; entropy-seeded when absent
    #[serde(default)]
    pub seed: Option<u64>,
}

impl Default for MdpConfig {
    /// Six states, two actions, terminals at tokens 1, 2 and 4.
    ///
    /// ```text
    /// 0 --a0--> 3        0 --a1--> 5
    /// 3 --a0--> 1 (-1)   3 --a1--> 5 (+0.25)
    /// 5 --a0--> 2 (+1)   5 --a1--> 4 (-0.5)
    /// ```
    fn default() -> Self {
        let absorbing = |s: usize| vec![Transition::new(s, 0.0), Transition::new(s, 0.0)];
        Self {
            num_states: 6,
            num_actions: 2,
            transitions: vec![
                vec![Transition::new(3, 0.0), Transition::new(5, 0.0)],
                absorbing(1),
                absorbing(2),
                vec![Transition::new(1, -1.0), Transition::new(5, 0.25)],
                absorbing(4),
                vec![Transition::new(2, 1.0), Transition::new(4, -0.5)],
            ],
            terminal_states: vec![1, 2, 4],
            start_states: vec![0, 3, 5],
            seed: None,
        }
    }
}

impl MdpConfig {
    /// Load a configuration from a JSON file and validate it
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read MDP config from {:?}", path))?;
        let config: MdpConfig =
            serde_json::from_str(&json).context("Failed to deserialize MDP config")?;
        config
            .validate()
            .map_err(|e| anyhow!("Invalid MDP config {:?}: {}", path, e))?;
        Ok(config)
    }

    /// Same configuration with a fixed sampling seed
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn is_terminal(&self, token: usize) -> bool {
        self.terminal_states.contains(&token)
    }

    /// Validate table shape and token ranges
    pub fn validate(&self) -> Result<(), String> {
        if self.num_states == 0 {
            return Err("num_states must be at least 1".to_string());
        }

        if self.num_actions == 0 {
            return Err("num_actions must be at least 1".to_string());
        }

        if self.transitions.len() != self.num_states {
            return Err(format!(
                "transition table has {} rows, expected {}",
                self.transitions.len(),
                self.num_states
            ));
        }

        for (state, row) in self.transitions.iter().enumerate() {
            if row.len() != self.num_actions {
                return Err(format!(
                    "state {} has {} transitions, expected {}",
                    state,
                    row.len(),
                    self.num_actions
                ));
            }
            for (action, t) in row.iter().enumerate() {
                if t.next >= self.num_states {
                    return Err(format!(
                        "transition ({}, {}) leads to unknown state {}",
                        state, action, t.next
                    ));
                }
                if !t.reward.is_finite() {
                    return Err(format!(
                        "transition ({}, {}) has non-finite reward",
                        state, action
                    ));
                }
            }
        }

        if let Some(&bad) = self.terminal_states.iter().find(|&&s| s >= self.num_states) {
            return Err(format!("terminal state {} out of range", bad));
        }

        if self.start_states.is_empty() {
            return Err("start_states must not be empty".to_string());
        }

        for &s in &self.start_states {
            if s >= self.num_states {
                return Err(format!("start state {} out of range", s));
            }
            if self.is_terminal(s) {
                return Err(format!("start state {} is terminal", s));
            }
        }

        Ok(())
    }
}
