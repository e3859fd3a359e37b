use super::config::MdpConfig;
use anyhow::{Result, anyhow, ensure};
use rand::{SeedableRng, rngs::StdRng, seq::SliceRandom};

/// Result of a single-state step
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepResult {
    /// Token id of the next state
    pub next: usize,
    /// Reward for this step
    pub reward: f32,
    /// Whether the next state is terminal
    pub terminated: bool,
}

/// The MDP engine: transition lookup plus start-state sampling
pub struct MdpEngine {
    config: MdpConfig,
    terminal: Vec<bool>,
    rng: StdRng,
}

impl MdpEngine {
    /// Create a new engine, validating the configuration
    pub fn new(config: MdpConfig) -> Result<Self> {
        config
            .validate()
            .map_err(|e| anyhow!("Invalid MDP configuration: {}", e))?;

        let mut terminal = vec![false; config.num_states];
        for &s in &config.terminal_states {
            terminal[s] = true;
        }

        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Ok(Self {
            config,
            terminal,
            rng,
        })
    }

    /// Sample a start token
    pub fn reset(&mut self) -> usize {
        // validate() guarantees a non-empty start set
        *self
            .config
            .start_states
            .choose(&mut self.rng)
            .unwrap_or(&0)
    }

    /// Execute one step from `token` with `action`
    ///
    /// Terminal states are absorbing: stepping from one returns the same
    /// token, zero reward, and `terminated = true`.
    pub fn step(&self, token: usize, action: usize) -> Result<StepResult> {
        ensure!(
            token < self.config.num_states,
            "state token {} out of range (num_states = {})",
            token,
            self.config.num_states
        );
        ensure!(
            action < self.config.num_actions,
            "action {} out of range (num_actions = {})",
            action,
            self.config.num_actions
        );

        if self.is_terminal(token) {
            return Ok(StepResult {
                next: token,
                reward: 0.0,
                terminated: true,
            });
        }

        let t = self.config.transitions[token][action];
        Ok(StepResult {
            next: t.next,
            reward: t.reward,
            terminated: self.is_terminal(t.next),
        })
    }

    /// Whether `token` is a terminal state; out-of-range tokens are not
    pub fn is_terminal(&self, token: usize) -> bool {
        self.terminal.get(token).copied().unwrap_or(false)
    }

    pub fn config(&self) -> &MdpConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> MdpEngine {
        MdpEngine::new(MdpConfig::default().with_seed(3)).unwrap()
    }

    #[test]
    fn test_reset_samples_start_states() {
        let mut engine = engine();
        for _ in 0..50 {
            let token = engine.reset();
            assert!([0, 3, 5].contains(&token));
        }
    }

    #[test]
    fn test_seeded_reset_is_reproducible() {
        let mut a = engine();
        let mut b = engine();
        let xs: Vec<usize> = (0..20).map(|_| a.reset()).collect();
        let ys: Vec<usize> = (0..20).map(|_| b.reset()).collect();
        assert_eq!(xs, ys);
    }

    #[test]
    fn test_basic_transitions() {
        let engine = engine();

        let r = engine.step(0, 0).unwrap();
        assert_eq!(r, StepResult { next: 3, reward: 0.0, terminated: false });

        let r = engine.step(5, 0).unwrap();
        assert_eq!(r.next, 2);
        assert_eq!(r.reward, 1.0);
        assert!(r.terminated);

        let r = engine.step(3, 0).unwrap();
        assert_eq!(r.next, 1);
        assert!(r.terminated);
    }

    #[test]
    fn test_terminal_states_are_absorbing() {
        let engine = engine();
        for token in [1, 2, 4] {
            for action in 0..2 {
                let r = engine.step(token, action).unwrap();
                assert_eq!(r.next, token);
                assert_eq!(r.reward, 0.0);
                assert!(r.terminated);
            }
        }
    }

    #[test]
    fn test_out_of_range_inputs_fail() {
        let engine = engine();
        assert!(engine.step(6, 0).is_err());
        assert!(engine.step(0, 2).is_err());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = MdpConfig::default();
        config.start_states.clear();
        assert!(MdpEngine::new(config).is_err());
    }
}
