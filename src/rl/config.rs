//! PPO hyperparameter configuration

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Which auxiliary term is added to the clipped objective with weight `aux_coef`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum AuxiliaryKind {
    /// No auxiliary term; `aux_coef` has no effect
    #[default]
    None,
    /// Negative masked policy entropy (an entropy bonus)
    Entropy,
}

/// Configuration for the PPO training loop
///
/// Defaults follow the reference training run: 100 epochs of 64 sub-epoch
/// updates on rollouts of 256 rows, `eps = 0.2`, `c1 = 1`, Adam at 1e-3.
///
/// # Example
///
/// ```rust
/// use seq_ppo::rl::PPOConfig;
///
/// let config = PPOConfig {
///     epochs: 10,
///     ..Default::default()
/// };
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PPOConfig {
    /// Learning rate for the Adam optimizer
    ///
    /// Default: 1e-3
    pub learning_rate: f64,

    /// PPO clipping parameter (epsilon)
    ///
    /// The probability ratio is clipped to `[1 - eps, 1 + eps]`.
    ///
    /// Default: 0.2
    pub clip_epsilon: f32,

    /// Coefficient `c1` of the auxiliary term
    ///
    /// Default: 1.0
    pub aux_coef: f32,

    /// Auxiliary term combined into the loss
    ///
    /// Default: none
    #[serde(default)]
    pub auxiliary: AuxiliaryKind,

    /// Number of epochs (rollout + update cycles)
    ///
    /// Default: 100
    pub epochs: usize,

    /// Gradient steps taken on each rollout
    ///
    /// Default: 64
    pub sub_epochs: usize,

    /// Rows per rollout
    ///
    /// Default: 256
    pub batch_size: usize,
}

impl PPOConfig {
    /// Validate configuration parameters
    ///
    /// # Returns
    ///
    /// `Ok(())` if all parameters are valid, `Err(String)` with an error message otherwise.
    pub fn validate(&self) -> Result<(), String> {
        if self.learning_rate.is_nan() || self.learning_rate <= 0.0 {
            return Err(format!(
                "learning_rate must be positive, got {}",
                self.learning_rate
            ));
        }

        if self.clip_epsilon.is_nan() || self.clip_epsilon <= 0.0 || self.clip_epsilon > 1.0 {
            return Err(format!(
                "clip_epsilon must be in (0, 1], got {}",
                self.clip_epsilon
            ));
        }

        if !self.aux_coef.is_finite() || self.aux_coef < 0.0 {
            return Err(format!(
                "aux_coef must be non-negative, got {}",
                self.aux_coef
            ));
        }

        if self.epochs == 0 {
            return Err("epochs must be at least 1".to_string());
        }

        if self.sub_epochs == 0 {
            return Err("sub_epochs must be at least 1".to_string());
        }

        if self.batch_size == 0 {
            return Err("batch_size must be at least 1".to_string());
        }

        Ok(())
    }
}

impl Default for PPOConfig {
    fn default() -> Self {
        Self {
            learning_rate: 1e-3,
            clip_epsilon: 0.2,
            aux_coef: 1.0,
            auxiliary: AuxiliaryKind::None,
            epochs: 100,
            sub_epochs: 64,
            batch_size: 256,
        }
    }
}
