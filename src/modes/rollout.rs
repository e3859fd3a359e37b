//! Rollout mode
//!
//! Generates a single batch with a saved (or freshly initialized) policy and
//! logs every row: the source token, generated tokens, actions, step rewards
//! and the EOS mask. Useful for eyeballing what a trained policy does.

use anyhow::{Context, Result, ensure};
use burn::tensor::backend::Backend;
use std::path::PathBuf;

use crate::mdp::{MdpConfig, token_of};
use crate::rl::{
    EosMask, Environment, MdpEnvironment, PolicyConfig, PolicyNetwork, RolloutGenerator, Trajectory,
    eos_mask, load_policy,
};

/// Configuration for rollout mode
#[derive(Debug, Clone)]
pub struct RolloutConfig {
    /// Saved model to load; a fresh policy is used when absent
    pub model_path: Option<PathBuf>,

    pub mdp_config: MdpConfig,

    /// Rows to generate
    pub batch_size: usize,
}

impl RolloutConfig {
    pub fn new(mdp_config: MdpConfig) -> Self {
        Self {
            model_path: None,
            mdp_config,
            batch_size: 4,
        }
    }
}

/// Generates and logs one rollout
pub struct RolloutMode<B: Backend> {
    policy: PolicyNetwork<B>,
    env: MdpEnvironment,
    generator: RolloutGenerator<B>,
    batch_size: usize,
}

impl<B: Backend> RolloutMode<B> {
    pub fn new(config: RolloutConfig, device: B::Device) -> Result<Self> {
        let env = MdpEnvironment::new(config.mdp_config)?;

        let policy = match &config.model_path {
            Some(path) => {
                let (policy, metadata) = load_policy::<B>(path, &device)
                    .with_context(|| format!("Failed to load policy from {:?}", path))?;
                log::info!(
                    "loaded policy from {:?} ({} epochs trained)",
                    path,
                    metadata.epochs_trained
                );
                policy
            }
            None => {
                log::info!("no model given, using an untrained policy");
                PolicyConfig::new(env.state_dim(), env.num_actions()).init::<B>(&device)
            }
        };

        Ok(Self {
            policy,
            env,
            generator: RolloutGenerator::new(device),
            batch_size: config.batch_size,
        })
    }

    /// Generate one rollout and log it row by row
    pub fn run(&mut self) -> Result<Trajectory> {
        ensure!(self.batch_size > 0, "batch_size must be at least 1");

        let trajectory = self
            .generator
            .generate(&self.policy, &mut self.env, self.batch_size)?;
        let mask = eos_mask(&trajectory, self.env.terminal_tokens());

        for line in describe(&trajectory, &mask) {
            log::info!("{}", line);
        }
        log::info!(
            "average reward {:.4}, included {:.2}, terminated {:.2}",
            trajectory.average_reward(),
            mask.included_fraction(),
            trajectory.terminated_fraction()
        );

        Ok(trajectory)
    }
}

/// One line per row, with masked-out steps in brackets
fn describe(trajectory: &Trajectory, mask: &EosMask) -> Vec<String> {
    (0..trajectory.batch_size())
        .map(|row| {
            let steps: Vec<String> = trajectory
                .generated_tokens(row)
                .iter()
                .zip(trajectory.actions(row))
                .zip(trajectory.step_rewards(row))
                .zip(mask.row(row))
                .map(|(((token, action), reward), &kept)| {
                    let step = format!("a{}->{} ({:+.2})", action, token, reward);
                    if kept { step } else { format!("[{}]", step) }
                })
                .collect();
            format!(
                "row {}: start {} | {} | reward {:.2}",
                row,
                token_of(trajectory.source().row(row)),
                steps.join(" "),
                trajectory.reward()[row]
            )
        })
        .collect()
}
