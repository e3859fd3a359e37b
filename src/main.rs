use anyhow::Result;
use clap::{Parser, ValueEnum};
use seq_ppo::mdp::MdpConfig;
use seq_ppo::modes::{RolloutConfig, RolloutMode, TrainConfig, TrainMode};
use seq_ppo::rl::{AuxiliaryKind, InferenceBackend, TrainingBackend, default_device};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "seq_ppo")]
#[command(version, about = "Clipped-surrogate policy training for sequence generation")]
struct Cli {
    /// What to run
    #[arg(long, default_value = "train")]
    mode: Mode,

    /// JSON file describing the MDP (built-in six-state MDP if omitted)
    #[arg(long)]
    mdp_config: Option<PathBuf>,

    /// Where the trained model is saved
    #[arg(long, default_value = "models/policy.mpk")]
    save_path: PathBuf,

    /// Where the JSON metrics report is written
    #[arg(long)]
    metrics_path: Option<PathBuf>,

    /// Saved model to continue training from (train) or to load (rollout)
    #[arg(long)]
    resume: Option<PathBuf>,

    /// Seed for start-state sampling
    #[arg(long)]
    seed: Option<u64>,

    /// Number of epochs
    #[arg(long)]
    epochs: Option<usize>,

    /// Gradient steps per epoch
    #[arg(long)]
    sub_epochs: Option<usize>,

    /// Rollout rows per epoch (rows to show in rollout mode)
    #[arg(long)]
    batch_size: Option<usize>,

    #[arg(long)]
    learning_rate: Option<f64>,

    #[arg(long)]
    clip_epsilon: Option<f32>,

    /// Weight of the auxiliary term
    #[arg(long)]
    aux_coef: Option<f32>,

    #[arg(long)]
    auxiliary: Option<AuxiliaryKind>,
}

#[derive(Clone, ValueEnum)]
enum Mode {
    /// Train the policy and save it
    Train,
    /// Generate and print one batch with a saved or fresh policy
    Rollout,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    let mut mdp_config = match &cli.mdp_config {
        Some(path) => MdpConfig::from_json_file(path)?,
        None => MdpConfig::default(),
    };
    if let Some(seed) = cli.seed {
        mdp_config = mdp_config.with_seed(seed);
    }

    let device = default_device();

    match cli.mode {
        Mode::Train => {
            let mut config = TrainConfig::with_mdp(cli.save_path, mdp_config);
            config.metrics_path = cli.metrics_path;
            config.resume_from = cli.resume;

            let ppo = &mut config.ppo_config;
            if let Some(epochs) = cli.epochs {
                ppo.epochs = epochs;
            }
            if let Some(sub_epochs) = cli.sub_epochs {
                ppo.sub_epochs = sub_epochs;
            }
            if let Some(batch_size) = cli.batch_size {
                ppo.batch_size = batch_size;
            }
            if let Some(lr) = cli.learning_rate {
                ppo.learning_rate = lr;
            }
            if let Some(eps) = cli.clip_epsilon {
                ppo.clip_epsilon = eps;
            }
            if let Some(coef) = cli.aux_coef {
                ppo.aux_coef = coef;
            }
            if let Some(auxiliary) = cli.auxiliary {
                ppo.auxiliary = auxiliary;
            }

            let mut train_mode = TrainMode::<TrainingBackend>::new(config, device)?;
            train_mode.run()?;
        }
        Mode::Rollout => {
            let mut config = RolloutConfig::new(mdp_config);
            config.model_path = cli.resume;
            if let Some(batch_size) = cli.batch_size {
                config.batch_size = batch_size;
            }

            let mut rollout_mode = RolloutMode::<InferenceBackend>::new(config, device)?;
            rollout_mode.run()?;
        }
    }

    Ok(())
}
