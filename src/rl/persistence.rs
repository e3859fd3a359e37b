//! Model persistence for saving and loading trained policies
//!
//! The network weights are written with Burn's record system; the
//! configurations needed to rebuild the network go in a JSON sidecar.

use super::{PPOConfig, PPOTrainer, PolicyConfig, PolicyNetwork};
use anyhow::{Context, Result};
use burn::{
    module::Module,
    record::{FullPrecisionSettings, NamedMpkFileRecorder, Recorder},
    tensor::backend::{AutodiffBackend, Backend},
};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Metadata saved with the model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelMetadata {
    /// PPO configuration used during training
    pub ppo_config: PPOConfig,

    /// Shape of the saved network
    pub policy_config: PolicyConfig,

    /// Epochs completed when the model was saved
    pub epochs_trained: usize,

    /// Version identifier for compatibility checking
    pub version: String,
}

impl ModelMetadata {
    pub fn new(ppo_config: PPOConfig, policy_config: PolicyConfig, epochs_trained: usize) -> Self {
        Self {
            ppo_config,
            policy_config,
            epochs_trained,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Save a trainer's current policy
///
/// The model is saved in two files:
/// - `<path>` - Network weights (Burn record format)
/// - `<path>.meta.json` - Metadata as JSON
///
/// Parent directories are created if they don't exist.
pub fn save_policy<B: AutodiffBackend>(
    trainer: &PPOTrainer<B>,
    policy_config: &PolicyConfig,
    path: &Path,
) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {:?}", parent))?;
    }

    let record = trainer.policy().clone().into_record();
    let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();
    recorder
        .record(record, path.to_path_buf())
        .context("Failed to save network weights")?;

    let metadata = ModelMetadata::new(
        trainer.config().clone(),
        policy_config.clone(),
        trainer.epochs_trained(),
    );
    let meta_path = path.with_extension("meta.json");
    let meta_json =
        serde_json::to_string_pretty(&metadata).context("Failed to serialize metadata")?;
    std::fs::write(&meta_path, meta_json)
        .with_context(|| format!("Failed to write metadata to {:?}", meta_path))?;

    log::info!("saved policy to {:?}", path);
    Ok(())
}

/// Load a saved policy onto any backend
///
/// `path` is the weights file, without the `.meta.json` extension.
pub fn load_policy<B: Backend>(
    path: &Path,
    device: &B::Device,
) -> Result<(PolicyNetwork<B>, ModelMetadata)> {
    let meta_path = path.with_extension("meta.json");
    let meta_json = std::fs::read_to_string(&meta_path)
        .with_context(|| format!("Failed to read metadata from {:?}", meta_path))?;
    let metadata: ModelMetadata =
        serde_json::from_str(&meta_json).context("Failed to deserialize metadata")?;

    let network = metadata.policy_config.init::<B>(device);
    let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();
    let record = recorder
        .load(path.to_path_buf(), device)
        .with_context(|| format!("Failed to load network weights from {:?}", path))?;

    Ok((network.load_record(record), metadata))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rl::{InferenceBackend, TrainingBackend, default_device};
    use burn::module::AutodiffModule;
    use tempfile::TempDir;

    #[test]
    fn test_metadata_serialization() {
        let metadata = ModelMetadata::new(PPOConfig::default(), PolicyConfig::new(4, 3), 12);

        let json = serde_json::to_string(&metadata).unwrap();
        let deserialized: ModelMetadata = serde_json::from_str(&json).unwrap();

        assert_eq!(deserialized.policy_config, PolicyConfig::new(4, 3));
        assert_eq!(deserialized.epochs_trained, 12);
        assert_eq!(deserialized.version, env!("CARGO_PKG_VERSION"));
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("models").join("policy.mpk");
        let device = default_device();

        let policy_config = PolicyConfig::default();
        let policy = policy_config.init::<TrainingBackend>(&device);
        let trainer =
            PPOTrainer::new(policy, PPOConfig::default(), vec![1, 2, 4], device).unwrap();
        save_policy(&trainer, &policy_config, &path).unwrap();

        assert!(path.with_extension("meta.json").exists());

        let (loaded, metadata) = load_policy::<InferenceBackend>(&path, &device).unwrap();
        assert_eq!(metadata.epochs_trained, 0);
        assert_eq!(metadata.policy_config, policy_config);
        assert_eq!(
            loaded.parameter_values(),
            trainer.policy().valid().parameter_values()
        );
    }

    #[test]
    fn test_load_missing_model_fails() {
        let dir = TempDir::new().unwrap();
        let result = load_policy::<InferenceBackend>(&dir.path().join("absent"), &default_device());
        assert!(result.is_err());
    }
}
