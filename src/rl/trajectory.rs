//! Rollout trajectory storage
//!
//! A [`Trajectory`] holds one fixed-horizon rollout for a whole batch on the
//! host. Tensors for any backend are built on demand, so the same rollout can
//! be replayed against the autodiff policy and the frozen snapshot.

use super::network::History;
use crate::mdp::StateBatch;
use burn::tensor::{Int, Tensor, TensorData, backend::Backend};

/// One batched rollout of `horizon` decoding steps
///
/// Per-step data is stored step-major (`generated[step]` is a batch); the
/// tensor builders return row-major `[batch, horizon, ...]` layouts.
#[derive(Debug, Clone)]
pub struct Trajectory {
    pub(crate) source: StateBatch,
    pub(crate) generated: Vec<StateBatch>,
    pub(crate) actions: Vec<Vec<usize>>,
    pub(crate) step_rewards: Vec<Vec<f32>>,
    pub(crate) dones: Vec<Vec<bool>>,
    /// Undiscounted reward accumulated per row
    pub(crate) reward: Vec<f32>,
}

impl Trajectory {
    pub fn batch_size(&self) -> usize {
        self.source.rows()
    }

    pub fn horizon(&self) -> usize {
        self.generated.len()
    }

    pub fn state_dim(&self) -> usize {
        self.source.dim()
    }

    pub fn source(&self) -> &StateBatch {
        &self.source
    }

    /// Generated states of every row at `step`
    #[cfg(test)]
    pub(crate) fn generated_step(&self, step: usize) -> &StateBatch {
        &self.generated[step]
    }

    /// Token ids generated for one row, in step order
    pub fn generated_tokens(&self, row: usize) -> Vec<usize> {
        self.generated
            .iter()
            .map(|states| crate::mdp::token_of(states.row(row)))
            .collect()
    }

    /// Actions taken for one row, in step order
    pub fn actions(&self, row: usize) -> Vec<usize> {
        self.actions.iter().map(|step| step[row]).collect()
    }

    /// Per-step rewards for one row
    pub fn step_rewards(&self, row: usize) -> Vec<f32> {
        self.step_rewards.iter().map(|step| step[row]).collect()
    }

    /// Accumulated reward per row
    pub fn reward(&self) -> &[f32] {
        &self.reward
    }

    /// Accumulated reward summed over rows, divided by batch size
    pub fn average_reward(&self) -> f32 {
        if self.reward.is_empty() {
            return 0.0;
        }
        self.reward.iter().sum::<f32>() / self.reward.len() as f32
    }

    /// Fraction of rows that reached a terminal state within the horizon
    pub fn terminated_fraction(&self) -> f32 {
        let rows = self.batch_size();
        if rows == 0 {
            return 0.0;
        }
        let terminated = (0..rows)
            .filter(|&row| self.dones.iter().any(|step| step[row]))
            .count();
        terminated as f32 / rows as f32
    }

    /// Source states as `[batch, 1, state_dim]`
    pub fn source_tensor<B: Backend>(&self, device: &B::Device) -> Tensor<B, 3> {
        let data = TensorData::new(
            self.source.as_slice().to_vec(),
            [self.batch_size(), 1, self.state_dim()],
        );
        Tensor::from_data(data, device)
    }

    /// The first `steps` generated states as policy history
    pub fn history<B: Backend>(&self, steps: usize, device: &B::Device) -> History<B> {
        if steps == 0 {
            return History::Empty;
        }
        History::Generated(self.generated_prefix(steps, device))
    }

    /// All generated states as `[batch, horizon, state_dim]`
    #[cfg(test)]
    pub(crate) fn generated_tensor<B: Backend>(&self, device: &B::Device) -> Tensor<B, 3> {
        self.generated_prefix(self.horizon(), device)
    }

    /// Actions as `[batch, horizon]`
    pub fn actions_tensor<B: Backend>(&self, device: &B::Device) -> Tensor<B, 2, Int> {
        let (rows, horizon) = (self.batch_size(), self.horizon());
        let mut data = Vec::with_capacity(rows * horizon);
        for row in 0..rows {
            data.extend(self.actions.iter().map(|step| step[row] as i64));
        }
        Tensor::from_data(TensorData::new(data, [rows, horizon]), device)
    }

    /// Accumulated reward as `[batch]`
    pub fn reward_tensor<B: Backend>(&self, device: &B::Device) -> Tensor<B, 1> {
        let data = TensorData::new(self.reward.clone(), [self.batch_size()]);
        Tensor::from_data(data, device)
    }

    fn generated_prefix<B: Backend>(&self, steps: usize, device: &B::Device) -> Tensor<B, 3> {
        let (rows, dim) = (self.batch_size(), self.state_dim());
        let mut data = Vec::with_capacity(rows * steps * dim);
        for row in 0..rows {
            for states in &self.generated[..steps] {
                data.extend_from_slice(states.row(row));
            }
        }
        Tensor::from_data(TensorData::new(data, [rows, steps, dim]), device)
    }
}
