//! Autoregressive rollout generation
//!
//! The generator decodes a fixed number of steps. At each step it asks the
//! policy for action distributions given the source and everything generated
//! so far, takes the arg-max action of the newest step, and advances the
//! environment from the most recent state (the source on the first step).

use super::environment::Environment;
use super::network::{History, PolicyNetwork};
use super::trajectory::Trajectory;
use crate::mdp::StateBatch;
use anyhow::{Result, ensure};
use burn::tensor::{Tensor, TensorData, backend::Backend};

/// Number of decoding steps in every rollout
pub const HORIZON: usize = 5;

/// Where a rollout is in its decoding
enum RolloutState {
    /// Nothing generated yet; the environment steps from the source
    NoHistory,
    /// At least one state generated; the environment steps from `latest`
    Accumulating {
        earlier: Vec<StateBatch>,
        latest: StateBatch,
    },
}

impl RolloutState {
    fn current<'a>(&'a self, source: &'a StateBatch) -> &'a StateBatch {
        match self {
            RolloutState::NoHistory => source,
            RolloutState::Accumulating { latest, .. } => latest,
        }
    }

    fn history<B: Backend>(&self, device: &B::Device) -> History<B> {
        match self {
            RolloutState::NoHistory => History::Empty,
            RolloutState::Accumulating { earlier, latest } => {
                let (rows, dim) = (latest.rows(), latest.dim());
                let steps = earlier.len() + 1;
                let mut data = Vec::with_capacity(rows * steps * dim);
                for row in 0..rows {
                    for states in earlier.iter().chain(std::iter::once(latest)) {
                        data.extend_from_slice(states.row(row));
                    }
                }
                History::Generated(Tensor::from_data(
                    TensorData::new(data, [rows, steps, dim]),
                    device,
                ))
            }
        }
    }

    fn advance(self, next: StateBatch) -> Self {
        match self {
            RolloutState::NoHistory => RolloutState::Accumulating {
                earlier: Vec::new(),
                latest: next,
            },
            RolloutState::Accumulating { mut earlier, latest } => {
                earlier.push(latest);
                RolloutState::Accumulating {
                    earlier,
                    latest: next,
                }
            }
        }
    }

    fn into_states(self) -> Vec<StateBatch> {
        match self {
            RolloutState::NoHistory => Vec::new(),
            RolloutState::Accumulating {
                mut earlier,
                latest,
            } => {
                earlier.push(latest);
                earlier
            }
        }
    }
}

/// Drives fixed-horizon decoding between a policy and an environment
///
/// # Example
///
/// ```rust
/// use seq_ppo::mdp::MdpConfig;
/// use seq_ppo::rl::{MdpEnvironment, PolicyConfig, RolloutGenerator, HORIZON};
/// use burn::backend::NdArray;
/// use burn::backend::ndarray::NdArrayDevice;
///
/// let device = NdArrayDevice::default();
/// let policy = PolicyConfig::default().init::<NdArray<f32>>(&device);
/// let mut env = MdpEnvironment::new(MdpConfig::default()).unwrap();
///
/// let generator = RolloutGenerator::<NdArray<f32>>::new(device);
/// let trajectory = generator.generate(&policy, &mut env, 8).unwrap();
/// assert_eq!(trajectory.horizon(), HORIZON);
/// ```
pub struct RolloutGenerator<B: Backend> {
    horizon: usize,
    device: B::Device,
}

impl<B: Backend> RolloutGenerator<B> {
    /// Create a generator for the fixed [`HORIZON`]
    ///
    /// # Arguments
    ///
    /// * `device` - Device the policy inputs are built on
    pub fn new(device: B::Device) -> Self {
        Self {
            horizon: HORIZON,
            device,
        }
    }

    /// Generate one batched rollout
    ///
    /// Actions are chosen by arg-max over the policy distribution; no
    /// sampling is involved, so a rollout is deterministic given the start
    /// states.
    ///
    /// # Errors
    ///
    /// Fails if the policy output or an environment step does not match the
    /// batch size, step count, or action space.
    pub fn generate<E: Environment + ?Sized>(
        &self,
        policy: &PolicyNetwork<B>,
        env: &mut E,
        batch_size: usize,
    ) -> Result<Trajectory> {
        ensure!(batch_size > 0, "batch_size must be at least 1");
        ensure!(
            policy.max_len() >= self.horizon,
            "policy max_len {} is shorter than the rollout horizon {}",
            policy.max_len(),
            self.horizon
        );

        ensure!(
            policy.state_dim() == env.state_dim() && policy.num_actions() == env.num_actions(),
            "policy expects {} states and {} actions, environment has {} and {}",
            policy.state_dim(),
            policy.num_actions(),
            env.state_dim(),
            env.num_actions()
        );

        let source = env.start(batch_size);
        ensure!(
            source.rows() == batch_size && source.dim() == policy.state_dim(),
            "environment returned {} start states of dimension {} for batch size {}",
            source.rows(),
            source.dim(),
            batch_size
        );
        let source_tensor: Tensor<B, 3> = Tensor::from_data(
            TensorData::new(source.as_slice().to_vec(), [batch_size, 1, source.dim()]),
            &self.device,
        );

        let mut state = RolloutState::NoHistory;
        let mut actions = Vec::with_capacity(self.horizon);
        let mut step_rewards = Vec::with_capacity(self.horizon);
        let mut dones = Vec::with_capacity(self.horizon);
        let mut reward = vec![0.0f32; batch_size];

        for step in 0..self.horizon {
            let probs = policy.forward(source_tensor.clone(), &state.history(&self.device));
            let [rows, steps, num_actions] = probs.dims();
            ensure!(
                rows == batch_size && steps == step + 1 && num_actions == env.num_actions(),
                "policy output shape [{}, {}, {}] does not match [{}, {}, {}]",
                rows,
                steps,
                num_actions,
                batch_size,
                step + 1,
                env.num_actions()
            );

            let step_actions: Vec<usize> = probs
                .slice([0..rows, step..step + 1, 0..num_actions])
                .argmax(2)
                .into_data()
                .iter::<i64>()
                .map(|a| a as usize)
                .collect();

            let result = env.step(state.current(&source), &step_actions)?;
            ensure!(
                result.next.rows() == batch_size
                    && result.reward.len() == batch_size
                    && result.done.len() == batch_size,
                "environment step returned a batch of the wrong size at step {}",
                step
            );

            for (total, r) in reward.iter_mut().zip(&result.reward) {
                *total += r;
            }

            actions.push(step_actions);
            step_rewards.push(result.reward);
            dones.push(result.done);
            state = state.advance(result.next);
        }

        let trajectory = Trajectory {
            source,
            generated: state.into_states(),
            actions,
            step_rewards,
            dones,
            reward,
        };

        log::debug!(
            "rollout: {} rows, average reward {:.4}, terminated {:.2}",
            batch_size,
            trajectory.average_reward(),
            trajectory.terminated_fraction()
        );

        Ok(trajectory)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mdp::{MdpConfig, Transition};
    use crate::rl::environment::{BatchStep, MdpEnvironment};
    use crate::rl::network::PolicyConfig;
    use burn::backend::ndarray::{NdArray, NdArrayDevice};

    type TestBackend = NdArray<f32>;

    /// Wraps the MDP environment and records every call
    struct RecordingEnv {
        inner: MdpEnvironment,
        calls: Vec<(StateBatch, Vec<usize>, BatchStep)>,
    }

    impl RecordingEnv {
        fn new() -> Self {
            Self {
                inner: MdpEnvironment::new(MdpConfig::default().with_seed(5)).unwrap(),
                calls: Vec::new(),
            }
        }
    }

    impl Environment for RecordingEnv {
        fn state_dim(&self) -> usize {
            self.inner.state_dim()
        }

        fn num_actions(&self) -> usize {
            self.inner.num_actions()
        }

        fn start(&mut self, batch_size: usize) -> StateBatch {
            self.inner.start(batch_size)
        }

        fn step(&mut self, states: &StateBatch, actions: &[usize]) -> Result<BatchStep> {
            let result = self.inner.step(states, actions)?;
            self.calls
                .push((states.clone(), actions.to_vec(), result.clone()));
            Ok(result)
        }
    }

    fn setup() -> (RolloutGenerator<TestBackend>, PolicyNetwork<TestBackend>) {
        let device = NdArrayDevice::default();
        let policy = PolicyConfig::default().init::<TestBackend>(&device);
        (RolloutGenerator::new(device), policy)
    }

    #[test]
    fn test_shapes_for_several_batch_sizes() {
        let (generator, policy) = setup();
        let device = NdArrayDevice::default();

        for batch_size in [1, 3, 17] {
            let mut env = RecordingEnv::new();
            let traj = generator.generate(&policy, &mut env, batch_size).unwrap();

            assert_eq!(traj.batch_size(), batch_size);
            assert_eq!(traj.horizon(), HORIZON);
            assert_eq!(
                traj.generated_tensor::<TestBackend>(&device).dims(),
                [batch_size, HORIZON, 6]
            );
            assert_eq!(
                traj.actions_tensor::<TestBackend>(&device).dims(),
                [batch_size, HORIZON]
            );
            assert_eq!(env.calls.len(), HORIZON);
        }
    }

    #[test]
    fn test_reward_is_sum_of_step_rewards() {
        let (generator, policy) = setup();
        let mut env = RecordingEnv::new();
        let traj = generator.generate(&policy, &mut env, 9).unwrap();

        for row in 0..9 {
            let expected: f32 = env.calls.iter().map(|(_, _, r)| r.reward[row]).sum();
            assert!((traj.reward()[row] - expected).abs() < 1e-6);
            assert_eq!(traj.step_rewards(row).len(), HORIZON);
        }
    }

    #[test]
    fn test_environment_steps_from_source_then_latest_state() {
        let (generator, policy) = setup();
        let mut env = RecordingEnv::new();
        let traj = generator.generate(&policy, &mut env, 4).unwrap();

        assert_eq!(&env.calls[0].0, traj.source());
        for step in 1..HORIZON {
            assert_eq!(&env.calls[step].0, traj.generated_step(step - 1));
        }
        for (step, (_, _, result)) in env.calls.iter().enumerate() {
            assert_eq!(&result.next, traj.generated_step(step));
        }
    }

    #[test]
    fn test_actions_are_argmax_of_policy() {
        let (generator, policy) = setup();
        let device = NdArrayDevice::default();
        let mut env = RecordingEnv::new();
        let traj = generator.generate(&policy, &mut env, 6).unwrap();

        let source = traj.source_tensor::<TestBackend>(&device);
        let probs = policy.forward(source, &traj.history(HORIZON - 1, &device));
        let greedy: Vec<i64> = probs.argmax(2).into_data().iter::<i64>().collect();

        for row in 0..6 {
            let expected: Vec<usize> = greedy[row * HORIZON..(row + 1) * HORIZON]
                .iter()
                .map(|&a| a as usize)
                .collect();
            assert_eq!(traj.actions(row), expected);
        }
    }

    #[test]
    fn test_action_space_mismatch_is_an_error() {
        let device = NdArrayDevice::default();
        let policy = PolicyConfig {
            num_actions: 3,
            ..Default::default()
        }
        .init::<TestBackend>(&device);
        let generator = RolloutGenerator::<TestBackend>::new(device);
        let mut env = RecordingEnv::new();

        assert!(generator.generate(&policy, &mut env, 2).is_err());
    }

    #[test]
    fn test_state_dim_mismatch_is_an_error() {
        let (generator, policy) = setup();
        let mut config = MdpConfig::default();
        config.num_states = 2;
        config.transitions = vec![
            vec![Transition::new(1, 0.0), Transition::new(0, 1.0)],
            vec![Transition::new(1, 0.0), Transition::new(1, 0.0)],
        ];
        config.terminal_states = vec![1];
        config.start_states = vec![0];
        let mut env = MdpEnvironment::new(config).unwrap();

        let result = generator.generate(&policy, &mut env, 2);
        assert!(result.is_err());
    }

    #[test]
    fn test_short_policy_is_rejected() {
        let device = NdArrayDevice::default();
        let policy = PolicyConfig {
            max_len: 3,
            ..Default::default()
        }
        .init::<TestBackend>(&device);
        let generator = RolloutGenerator::<TestBackend>::new(device);
        let mut env = RecordingEnv::new();

        assert!(generator.generate(&policy, &mut env, 2).is_err());
    }

    #[test]
    fn test_zero_batch_is_rejected() {
        let (generator, policy) = setup();
        let mut env = RecordingEnv::new();
        assert!(generator.generate(&policy, &mut env, 0).is_err());
    }
}
