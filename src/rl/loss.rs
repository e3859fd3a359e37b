//! Clipped surrogate objective
//!
//! Implements
//!
//! ```text
//! L = -mean_masked[ min(r * A, clip(r, 1-ε, 1+ε) * A) ] + c1 * aux
//! r = π_current(a) / π_old(a)
//! ```
//!
//! where `A` is a row's accumulated rollout reward broadcast over its steps
//! (no baseline) and the mean runs over the steps the EOS mask keeps. The
//! auxiliary term is pluggable through [`AuxiliaryTerm`].

use super::config::{AuxiliaryKind, PPOConfig};
use super::eos::EosMask;
use super::network::{History, PolicyNetwork};
use super::trajectory::Trajectory;
use anyhow::{Result, ensure};
use burn::tensor::{
    Int, Tensor,
    activation::{log_softmax, softmax},
    backend::{AutodiffBackend, Backend},
};

/// Extra scalar term combined into the loss as `c1 * term`
pub trait AuxiliaryTerm<B: Backend> {
    /// # Arguments
    ///
    /// * `logits` - current-policy logits `[rows, horizon, actions]`
    /// * `mask` - EOS weights `[rows, horizon]`
    /// * `included` - number of included cells in `mask`
    fn evaluate(&self, logits: Tensor<B, 3>, mask: Tensor<B, 2>, included: usize) -> Tensor<B, 1>;
}

/// Contributes nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct NoAuxiliary;

impl<B: Backend> AuxiliaryTerm<B> for NoAuxiliary {
    fn evaluate(&self, logits: Tensor<B, 3>, _mask: Tensor<B, 2>, _included: usize) -> Tensor<B, 1> {
        Tensor::zeros([1], &logits.device())
    }
}

/// Negative masked mean entropy of the current policy
#[derive(Debug, Clone, Copy, Default)]
pub struct EntropyBonus;

impl<B: Backend> AuxiliaryTerm<B> for EntropyBonus {
    fn evaluate(&self, logits: Tensor<B, 3>, mask: Tensor<B, 2>, included: usize) -> Tensor<B, 1> {
        let [rows, horizon, _] = logits.dims();
        let entropy = (softmax(logits.clone(), 2) * log_softmax(logits, 2))
            .sum_dim(2)
            .neg()
            .reshape([rows, horizon]);
        masked_mean(entropy, mask, included).neg()
    }
}

impl AuxiliaryKind {
    pub fn build<B: Backend>(self) -> Box<dyn AuxiliaryTerm<B>> {
        match self {
            AuxiliaryKind::None => Box::new(NoAuxiliary),
            AuxiliaryKind::Entropy => Box::new(EntropyBonus),
        }
    }
}

/// Log-probability of the taken action at every step, `[rows, horizon]`
pub fn taken_log_probs<B: Backend>(logits: Tensor<B, 3>, actions: Tensor<B, 2, Int>) -> Tensor<B, 2> {
    let [rows, horizon, _] = logits.dims();
    log_softmax(logits, 2)
        .gather(2, actions.reshape([rows, horizon, 1]))
        .reshape([rows, horizon])
}

/// Element-wise `min(r * A, clip(r, 1-ε, 1+ε) * A)`
pub fn clipped_surrogate<B: Backend>(
    ratio: Tensor<B, 2>,
    advantage: Tensor<B, 2>,
    clip_epsilon: f32,
) -> Tensor<B, 2> {
    let unclipped = ratio.clone() * advantage.clone();
    let clipped = ratio.clamp(1.0 - clip_epsilon, 1.0 + clip_epsilon) * advantage;
    unclipped.min_pair(clipped)
}

/// Mean of `values` over the cells where `mask` is 1
pub fn masked_mean<B: Backend>(values: Tensor<B, 2>, mask: Tensor<B, 2>, included: usize) -> Tensor<B, 1> {
    (values * mask).sum().div_scalar(included.max(1) as f32)
}

/// Tensors of one rollout, built once and reused by every sub-epoch
///
/// Holds the inputs twice: on the autodiff backend for the current policy and
/// on the inner backend for the frozen snapshot.
pub struct ObjectiveBatch<B: AutodiffBackend> {
    source: Tensor<B, 3>,
    history: History<B>,
    actions: Tensor<B, 2, Int>,
    old_source: Tensor<B::InnerBackend, 3>,
    old_history: History<B::InnerBackend>,
    old_actions: Tensor<B::InnerBackend, 2, Int>,
    reward: Tensor<B, 1>,
    mask: Tensor<B, 2>,
    included: usize,
    rows: usize,
    horizon: usize,
}

impl<B: AutodiffBackend> ObjectiveBatch<B> {
    /// Prepare a trajectory and its EOS mask
    ///
    /// The policy is scored with the first `horizon - 1` generated states as
    /// history, which yields one distribution per generated step.
    pub fn new(trajectory: &Trajectory, mask: &EosMask, device: &B::Device) -> Result<Self> {
        let rows = trajectory.batch_size();
        let horizon = trajectory.horizon();
        ensure!(horizon > 0, "trajectory has no generated steps");
        ensure!(
            mask.rows() == rows && mask.horizon() == horizon,
            "EOS mask shape [{}, {}] does not match trajectory [{}, {}]",
            mask.rows(),
            mask.horizon(),
            rows,
            horizon
        );

        Ok(Self {
            source: trajectory.source_tensor(device),
            history: trajectory.history(horizon - 1, device),
            actions: trajectory.actions_tensor(device),
            old_source: trajectory.source_tensor(device),
            old_history: trajectory.history(horizon - 1, device),
            old_actions: trajectory.actions_tensor(device),
            reward: trajectory.reward_tensor(device),
            mask: mask.to_tensor(device),
            included: mask.included(),
            rows,
            horizon,
        })
    }

    pub fn included(&self) -> usize {
        self.included
    }
}

/// The PPO clipped objective with a pluggable auxiliary term
pub struct ClippedObjective<B: Backend> {
    clip_epsilon: f32,
    aux_coef: f32,
    auxiliary: Box<dyn AuxiliaryTerm<B>>,
}

impl<B: AutodiffBackend> ClippedObjective<B> {
    pub fn new(clip_epsilon: f32, aux_coef: f32, auxiliary: Box<dyn AuxiliaryTerm<B>>) -> Self {
        Self {
            clip_epsilon,
            aux_coef,
            auxiliary,
        }
    }

    pub fn from_config(config: &PPOConfig) -> Self {
        Self::new(
            config.clip_epsilon,
            config.aux_coef,
            config.auxiliary.build(),
        )
    }

    /// Scalar training loss (`[1]`) for one sub-epoch
    ///
    /// Gradients flow only through `current`; the old policy lives on the
    /// inner backend and is evaluated without autodiff.
    pub fn loss(
        &self,
        current: &PolicyNetwork<B>,
        old: &PolicyNetwork<B::InnerBackend>,
        batch: &ObjectiveBatch<B>,
    ) -> Tensor<B, 1> {
        let logits = current.forward_logits(batch.source.clone(), &batch.history);
        let log_probs = taken_log_probs(logits.clone(), batch.actions.clone());

        let old_logits = old.forward_logits(batch.old_source.clone(), &batch.old_history);
        let old_log_probs =
            Tensor::<B, 2>::from_inner(taken_log_probs(old_logits, batch.old_actions.clone()));

        let ratio = (log_probs - old_log_probs).exp();
        let advantage = batch
            .reward
            .clone()
            .reshape([batch.rows, 1])
            .expand([batch.rows, batch.horizon]);

        let surrogate = clipped_surrogate(ratio, advantage, self.clip_epsilon);
        let objective = masked_mean(surrogate, batch.mask.clone(), batch.included);
        let auxiliary = self
            .auxiliary
            .evaluate(logits, batch.mask.clone(), batch.included);

        objective.neg() + auxiliary.mul_scalar(self.aux_coef)
    }
}
