//! PPO training loop
//!
//! Each epoch runs ROLLOUT -> SNAPSHOT -> SUBEPOCH-LOOP -> ADVANCE:
//!
//! 1. generate a fresh rollout with the current policy and mask it
//! 2. copy the current parameters; this copy becomes the *next* epoch's old policy
//! 3. take `sub_epochs` gradient steps on the clipped objective, all against
//!    the same rollout and the old policy captured one epoch earlier
//! 4. record the epoch's average loss and reward, then install the copy from step 2
//!
//! The old policy therefore lags the current one by exactly one epoch.

use super::config::PPOConfig;
use super::environment::Environment;
use super::eos::eos_mask;
use super::loss::{ClippedObjective, ObjectiveBatch};
use super::network::PolicyNetwork;
use super::rollout::RolloutGenerator;
use crate::metrics::{EpochRecord, TrainingHistory};
use anyhow::{Context, Result, anyhow, bail};
use burn::{
    module::AutodiffModule,
    optim::{Adam, AdamConfig, GradientsParams, Optimizer, adaptor::OptimizerAdaptor},
    tensor::{ElementConversion, backend::AutodiffBackend},
};

/// PPO trainer for the sequence policy
///
/// # Type Parameters
///
/// * `B` - Autodiff backend for the current policy; the old policy lives on
///   `B::InnerBackend`
///
/// # Example
///
/// ```rust,ignore
/// use seq_ppo::mdp::MdpConfig;
/// use seq_ppo::rl::{MdpEnvironment, PPOConfig, PPOTrainer, PolicyConfig, TrainingBackend, default_device};
///
/// let device = default_device();
/// let policy = PolicyConfig::default().init::<TrainingBackend>(&device);
/// let mut env = MdpEnvironment::new(MdpConfig::default())?;
/// let mut trainer = PPOTrainer::new(policy, PPOConfig::default(), vec![1, 2, 4], device)?;
/// let history = trainer.train(&mut env)?;
/// ```
pub struct PPOTrainer<B: AutodiffBackend> {
    /// Current policy, updated every sub-epoch
    policy: PolicyNetwork<B>,

    /// Frozen policy used for the probability ratio during an epoch
    old_policy: PolicyNetwork<B::InnerBackend>,

    /// Adam optimizer for the current policy's parameters
    optim: OptimizerAdaptor<Adam, PolicyNetwork<B>, B>,

    objective: ClippedObjective<B>,

    generator: RolloutGenerator<B::InnerBackend>,

    config: PPOConfig,

    /// Token ids that end an episode
    terminal_tokens: Vec<usize>,

    /// Epochs completed by this trainer
    epochs_trained: usize,

    device: B::Device,
}

impl<B: AutodiffBackend> PPOTrainer<B> {
    /// Create a new trainer
    ///
    /// The initial old policy is a copy of `policy`.
    pub fn new(
        policy: PolicyNetwork<B>,
        config: PPOConfig,
        terminal_tokens: Vec<usize>,
        device: B::Device,
    ) -> Result<Self> {
        config
            .validate()
            .map_err(|e| anyhow!("Invalid PPO configuration: {}", e))?;

        let old_policy = policy.valid();
        let optim = AdamConfig::new().init();
        let objective = ClippedObjective::from_config(&config);
        let generator = RolloutGenerator::new(device.clone());

        Ok(Self {
            policy,
            old_policy,
            optim,
            objective,
            generator,
            config,
            terminal_tokens,
            epochs_trained: 0,
            device,
        })
    }

    /// Continue epoch numbering from a previous run
    pub fn with_epochs_trained(mut self, epochs_trained: usize) -> Self {
        self.epochs_trained = epochs_trained;
        self
    }

    /// Run one epoch and return its record
    ///
    /// # Errors
    ///
    /// Any rollout shape mismatch or a non-finite loss aborts the epoch. The
    /// current policy may already have been updated by earlier sub-epochs.
    pub fn run_epoch<E: Environment + ?Sized>(&mut self, env: &mut E) -> Result<EpochRecord> {
        // ROLLOUT
        let frozen = self.policy.valid();
        let trajectory = self
            .generator
            .generate(&frozen, env, self.config.batch_size)?;
        let mask = eos_mask(&trajectory, &self.terminal_tokens);

        // SNAPSHOT: parameters as they were for this rollout
        let snapshot = frozen;

        // SUBEPOCH-LOOP
        let batch = ObjectiveBatch::<B>::new(&trajectory, &mask, &self.device)?;
        let epoch = self.epochs_trained + 1;
        let mut total_loss = 0.0;
        for sub_epoch in 0..self.config.sub_epochs {
            let value = self.update(&batch).with_context(|| {
                format!("epoch {}, sub-epoch {}", epoch, sub_epoch + 1)
            })?;
            log::debug!("sub-epoch {}: loss {:.6}", sub_epoch + 1, value);
            total_loss += value;
        }

        // ADVANCE
        self.old_policy = snapshot;
        self.epochs_trained += 1;

        Ok(EpochRecord {
            epoch: self.epochs_trained,
            average_loss: total_loss / self.config.sub_epochs as f32,
            average_reward: trajectory.average_reward(),
            included_fraction: mask.included_fraction(),
            terminated_fraction: trajectory.terminated_fraction(),
        })
    }

    /// One gradient step of the current policy against the old policy
    ///
    /// # Returns
    ///
    /// The loss value before the step
    fn update(&mut self, batch: &ObjectiveBatch<B>) -> Result<f32> {
        let loss = self.objective.loss(&self.policy, &self.old_policy, batch);
        let value = loss.clone().into_scalar().elem::<f32>();
        if !value.is_finite() {
            bail!("non-finite loss {}", value);
        }

        // Backward pass and Adam step
        let grads = loss.backward();
        let grads = GradientsParams::from_grads(grads, &self.policy);
        self.policy = self
            .optim
            .step(self.config.learning_rate, self.policy.clone(), grads);

        Ok(value)
    }

    /// Run `config.epochs` epochs, logging each one
    pub fn train<E: Environment + ?Sized>(&mut self, env: &mut E) -> Result<TrainingHistory> {
        let mut history = TrainingHistory::new();
        let last_epoch = self.epochs_trained + self.config.epochs;
        for _ in 0..self.config.epochs {
            let record = self.run_epoch(env)?;
            log::info!(
                "epoch {}/{}: average loss {:.6}, average reward {:.4}",
                record.epoch,
                last_epoch,
                record.average_loss,
                record.average_reward
            );
            history.record(record);
        }
        Ok(history)
    }

    /// Get a reference to the current policy
    pub fn policy(&self) -> &PolicyNetwork<B> {
        &self.policy
    }

    /// Get a reference to the frozen old policy
    pub fn old_policy(&self) -> &PolicyNetwork<B::InnerBackend> {
        &self.old_policy
    }

    /// Get the training configuration
    pub fn config(&self) -> &PPOConfig {
        &self.config
    }

    /// Get the number of completed epochs, including resumed ones
    pub fn epochs_trained(&self) -> usize {
        self.epochs_trained
    }
}
