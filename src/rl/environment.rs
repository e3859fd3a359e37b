use crate::mdp::{MdpConfig, MdpEngine, StateBatch};
use anyhow::{Result, ensure};

/// Outcome of stepping a whole batch
#[derive(Debug, Clone, PartialEq)]
pub struct BatchStep {
    /// Next state per row
    pub next: StateBatch,
    /// Reward per row
    pub reward: Vec<f32>,
    /// Whether each row's next state is terminal
    pub done: Vec<bool>,
}

/// Batched environment interface seen by the rollout generator
///
/// `step` must behave as a pure function of its inputs (any randomness is
/// owned by the environment itself and only used by `start`).
pub trait Environment {
    /// Dimension of a state vector
    fn state_dim(&self) -> usize;

    /// Size of the discrete action space
    fn num_actions(&self) -> usize;

    /// Start states for `batch_size` rows
    fn start(&mut self, batch_size: usize) -> StateBatch;

    /// Advance every row by one action
    fn step(&mut self, states: &StateBatch, actions: &[usize]) -> Result<BatchStep>;
}

/// Batched adapter over the tabular MDP engine
///
/// States are one-hot vectors of dimension `num_states`; a row's token is
/// the arg-max of its vector.
pub struct MdpEnvironment {
    engine: MdpEngine,
}

impl MdpEnvironment {
    /// Create a new environment from an MDP configuration
    pub fn new(config: MdpConfig) -> Result<Self> {
        Ok(Self {
            engine: MdpEngine::new(config)?,
        })
    }

    /// Terminal token ids, for the EOS masker
    pub fn terminal_tokens(&self) -> &[usize] {
        &self.engine.config().terminal_states
    }
}

impl Environment for MdpEnvironment {
    fn state_dim(&self) -> usize {
        self.engine.config().num_states
    }

    fn num_actions(&self) -> usize {
        self.engine.config().num_actions
    }

    fn start(&mut self, batch_size: usize) -> StateBatch {
        let tokens: Vec<usize> = (0..batch_size).map(|_| self.engine.reset()).collect();
        StateBatch::from_tokens(&tokens, self.state_dim())
    }

    fn step(&mut self, states: &StateBatch, actions: &[usize]) -> Result<BatchStep> {
        ensure!(
            states.dim() == self.state_dim(),
            "state dimension {} does not match environment dimension {}",
            states.dim(),
            self.state_dim()
        );
        ensure!(
            states.rows() == actions.len(),
            "got {} states but {} actions",
            states.rows(),
            actions.len()
        );

        let rows = states.rows();
        let mut next = Vec::with_capacity(rows);
        let mut reward = Vec::with_capacity(rows);
        let mut done = Vec::with_capacity(rows);

        for (token, &action) in states.tokens().into_iter().zip(actions) {
            let result = self.engine.step(token, action)?;
            next.push(result.next);
            reward.push(result.reward);
            done.push(result.terminated);
        }

        Ok(BatchStep {
            next: StateBatch::from_tokens(&next, self.state_dim()),
            reward,
            done,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env() -> MdpEnvironment {
        MdpEnvironment::new(MdpConfig::default().with_seed(11)).unwrap()
    }

    #[test]
    fn test_start_returns_one_hot_rows() {
        let mut env = env();
        let states = env.start(16);

        assert_eq!(states.rows(), 16);
        assert_eq!(states.dim(), 6);
        for row in 0..states.rows() {
            let sum: f32 = states.row(row).iter().sum();
            assert_eq!(sum, 1.0);
        }
        assert!(states.tokens().iter().all(|t| [0, 3, 5].contains(t)));
    }

    #[test]
    fn test_batched_step() {
        let mut env = env();
        let states = StateBatch::from_tokens(&[0, 3, 5, 2], 6);

        let step = env.step(&states, &[1, 0, 0, 1]).unwrap();

        assert_eq!(step.next.tokens(), vec![5, 1, 2, 2]);
        assert_eq!(step.reward, vec![0.0, -1.0, 1.0, 0.0]);
        assert_eq!(step.done, vec![false, true, true, true]);
    }

    #[test]
    fn test_step_accepts_soft_states() {
        let mut env = env();
        let soft = StateBatch::new(6, vec![0.1, 0.0, 0.0, 0.0, 0.2, 0.7]).unwrap();

        let step = env.step(&soft, &[0]).unwrap();
        assert_eq!(step.next.tokens(), vec![2]);
    }

    #[test]
    fn test_action_count_mismatch_fails() {
        let mut env = env();
        let states = StateBatch::from_tokens(&[0, 3], 6);
        assert!(env.step(&states, &[0]).is_err());
    }

    #[test]
    fn test_dimension_mismatch_fails() {
        let mut env = env();
        let states = StateBatch::from_tokens(&[0], 4);
        assert!(env.step(&states, &[0]).is_err());
    }

    #[test]
    fn test_terminal_tokens() {
        let env = env();
        assert_eq!(env.terminal_tokens(), &[1, 2, 4]);
        assert_eq!(env.num_actions(), 2);
    }
}
