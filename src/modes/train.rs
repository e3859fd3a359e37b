//! Training mode
//!
//! Builds the MDP environment, the policy (fresh or resumed from a saved
//! model) and the trainer, runs the configured number of epochs, then saves
//! the model and the metrics report.
//!
//! # Example
//!
//! ```rust,ignore
//! use seq_ppo::modes::{TrainConfig, TrainMode};
//! use seq_ppo::rl::{TrainingBackend, default_device};
//! use std::path::PathBuf;
//!
//! let config = TrainConfig::new(PathBuf::from("models/policy.mpk"));
//! let mut train_mode = TrainMode::<TrainingBackend>::new(config, default_device())?;
//! train_mode.run()?;
//! ```

use anyhow::{Context, Result, anyhow, ensure};
use burn::tensor::backend::AutodiffBackend;
use std::path::PathBuf;

use crate::mdp::MdpConfig;
use crate::metrics::TrainingHistory;
use crate::rl::{
    Environment, MdpEnvironment, PPOConfig, PPOTrainer, PolicyConfig, load_policy, save_policy,
};

/// Epochs averaged in the closing reward summary
const SUMMARY_WINDOW: usize = 10;

/// Configuration for training mode
#[derive(Debug, Clone)]
pub struct TrainConfig {
    /// Path to save the trained model
    pub save_path: PathBuf,

    /// Path for the JSON metrics report
    pub metrics_path: Option<PathBuf>,

    /// Saved model to continue training from
    pub resume_from: Option<PathBuf>,

    pub mdp_config: MdpConfig,

    /// PPO hyperparameters (epoch count included)
    pub ppo_config: PPOConfig,

    /// Network shape; ignored when resuming
    pub policy_config: PolicyConfig,
}

impl TrainConfig {
    /// Defaults for the built-in MDP
    pub fn new(save_path: PathBuf) -> Self {
        Self::with_mdp(save_path, MdpConfig::default())
    }

    /// Defaults with the policy sized to `mdp_config`
    pub fn with_mdp(save_path: PathBuf, mdp_config: MdpConfig) -> Self {
        let policy_config = PolicyConfig::new(mdp_config.num_states, mdp_config.num_actions);
        Self {
            save_path,
            metrics_path: None,
            resume_from: None,
            mdp_config,
            ppo_config: PPOConfig::default(),
            policy_config,
        }
    }
}

/// Training mode for the sequence policy
pub struct TrainMode<B: AutodiffBackend> {
    trainer: PPOTrainer<B>,
    env: MdpEnvironment,
    history: TrainingHistory,
    config: TrainConfig,
}

impl<B: AutodiffBackend> TrainMode<B> {
    /// Create a new training mode
    ///
    /// When `resume_from` is set the policy and its shape come from the saved
    /// model and epoch numbering continues from its metadata. Only the current
    /// policy is saved, so a resumed run starts with the old policy equal to
    /// the loaded one: the first resumed epoch has a ratio of 1 on its first
    /// sub-epoch, exactly like epoch 1 of a fresh run.
    ///
    /// # Arguments
    ///
    /// * `config` - Training configuration
    /// * `device` - Device for the policy and its snapshots
    pub fn new(mut config: TrainConfig, device: B::Device) -> Result<Self> {
        config
            .ppo_config
            .validate()
            .map_err(|e| anyhow!("Invalid PPO configuration: {}", e))?;

        let env = MdpEnvironment::new(config.mdp_config.clone())?;

        let (policy, epochs_trained) = match &config.resume_from {
            Some(path) => {
                let (policy, metadata) = load_policy::<B>(path, &device)
                    .with_context(|| format!("Failed to resume from {:?}", path))?;
                log::info!(
                    "resuming from {:?} after {} epochs",
                    path,
                    metadata.epochs_trained
                );
                config.policy_config = metadata.policy_config;
                (policy, metadata.epochs_trained)
            }
            None => (config.policy_config.init::<B>(&device), 0),
        };

        ensure!(
            config.policy_config.state_dim == env.state_dim()
                && config.policy_config.num_actions == env.num_actions(),
            "policy expects {} states and {} actions, MDP has {} and {}",
            config.policy_config.state_dim,
            config.policy_config.num_actions,
            env.state_dim(),
            env.num_actions()
        );

        let trainer = PPOTrainer::new(
            policy,
            config.ppo_config.clone(),
            env.terminal_tokens().to_vec(),
            device,
        )?
        .with_epochs_trained(epochs_trained);

        Ok(Self {
            trainer,
            env,
            history: TrainingHistory::new(),
            config,
        })
    }

    /// Run the training loop, then save the model and metrics
    pub fn run(&mut self) -> Result<&TrainingHistory> {
        self.log_header();

        let history = self.trainer.train(&mut self.env)?;
        self.history.extend(history);

        save_policy(&self.trainer, &self.config.policy_config, &self.config.save_path)
            .with_context(|| format!("Failed to save final model to {:?}", self.config.save_path))?;

        if let Some(path) = &self.config.metrics_path {
            self.history.save_json(path)?;
            log::info!("metrics written to {:?}", path);
        }

        log::info!("training complete: {}", self.history.format_summary());
        log::info!(
            "mean reward over the last {} epochs: {:.4}",
            SUMMARY_WINDOW.min(self.history.len()),
            self.history.recent_mean_reward(SUMMARY_WINDOW)
        );
        Ok(&self.history)
    }

    pub fn trainer(&self) -> &PPOTrainer<B> {
        &self.trainer
    }

    fn log_header(&self) {
        let ppo = &self.config.ppo_config;
        log::info!("{}", "=".repeat(70));
        log::info!("PPO training - sequence policy");
        log::info!("{}", "=".repeat(70));
        log::info!(
            "MDP: {} states, {} actions, terminals {:?}",
            self.config.mdp_config.num_states,
            self.config.mdp_config.num_actions,
            self.config.mdp_config.terminal_states
        );
        log::info!("Epochs: {} x {} sub-epochs", ppo.epochs, ppo.sub_epochs);
        log::info!("  Learning rate: {}", ppo.learning_rate);
        log::info!("  Clip epsilon: {}", ppo.clip_epsilon);
        log::info!("  Auxiliary: {:?} (coef {})", ppo.auxiliary, ppo.aux_coef);
        log::info!("  Batch size: {}", ppo.batch_size);
        log::info!("Save path: {:?}", self.config.save_path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mdp::Transition;
    use crate::rl::{TrainingBackend, default_device};
    use burn::module::AutodiffModule;
    use tempfile::TempDir;

    fn quick_config(dir: &TempDir) -> TrainConfig {
        let mut config = TrainConfig::new(dir.path().join("model.mpk"));
        config.metrics_path = Some(dir.path().join("metrics.json"));
        config.mdp_config = config.mdp_config.with_seed(3);
        config.ppo_config.epochs = 2;
        config.ppo_config.sub_epochs = 2;
        config.ppo_config.batch_size = 8;
        config
    }

    #[test]
    fn test_train_config_defaults() {
        let config = TrainConfig::new(PathBuf::from("test.mpk"));
        assert_eq!(config.save_path, PathBuf::from("test.mpk"));
        assert_eq!(config.policy_config.state_dim, 6);
        assert_eq!(config.policy_config.num_actions, 2);
        assert!(config.resume_from.is_none());
    }

    #[test]
    fn test_run_saves_model_and_metrics() {
        let dir = TempDir::new().unwrap();
        let config = quick_config(&dir);
        let mut mode = TrainMode::<TrainingBackend>::new(config, default_device()).unwrap();

        let history = mode.run().unwrap();
        assert_eq!(history.len(), 2);

        assert!(dir.path().join("model.mpk").exists());
        assert!(dir.path().join("model.meta.json").exists());
        let metrics = std::fs::read_to_string(dir.path().join("metrics.json")).unwrap();
        assert!(metrics.contains("\"losses\""));
    }

    #[test]
    fn test_resume_continues_epochs() {
        let dir = TempDir::new().unwrap();
        let mut first = TrainMode::<TrainingBackend>::new(quick_config(&dir), default_device())
            .unwrap();
        first.run().unwrap();

        let mut config = quick_config(&dir);
        config.resume_from = Some(dir.path().join("model.mpk"));
        let mut second = TrainMode::<TrainingBackend>::new(config, default_device()).unwrap();
        let history = second.run().unwrap();

        let epochs: Vec<usize> = history.records().iter().map(|r| r.epoch).collect();
        assert_eq!(epochs, vec![3, 4]);
        assert_eq!(second.trainer().epochs_trained(), 4);
    }

    #[test]
    fn test_resumed_old_policy_starts_as_loaded_policy() {
        let dir = TempDir::new().unwrap();
        let mut first = TrainMode::<TrainingBackend>::new(quick_config(&dir), default_device())
            .unwrap();
        first.run().unwrap();
        let saved = first.trainer().policy().valid().parameter_values();

        let mut config = quick_config(&dir);
        config.resume_from = Some(dir.path().join("model.mpk"));
        let resumed = TrainMode::<TrainingBackend>::new(config, default_device()).unwrap();

        assert_eq!(resumed.trainer().policy().valid().parameter_values(), saved);
        assert_eq!(resumed.trainer().old_policy().parameter_values(), saved);
    }

    #[test]
    fn test_mismatched_policy_is_rejected() {
        let dir = TempDir::new().unwrap();
        let mut config = quick_config(&dir);
        config.mdp_config.num_states = 2;
        config.mdp_config.transitions = vec![
            vec![Transition::new(1, 0.0), Transition::new(1, 0.0)],
            vec![Transition::new(1, 0.0), Transition::new(1, 0.0)],
        ];
        config.mdp_config.terminal_states = vec![1];
        config.mdp_config.start_states = vec![0];

        assert!(TrainMode::<TrainingBackend>::new(config, default_device()).is_err());
    }

    #[test]
    fn test_invalid_ppo_config_is_rejected() {
        let dir = TempDir::new().unwrap();
        let mut config = quick_config(&dir);
        config.ppo_config.clip_epsilon = -1.0;
        assert!(TrainMode::<TrainingBackend>::new(config, default_device()).is_err());
    }
}
