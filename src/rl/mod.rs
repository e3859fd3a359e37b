//! Clipped-surrogate policy optimization for sequence generation
//!
//! Provides:
//! - A causal sequence policy over one-hot states
//! - The environment interface and an MDP-backed implementation
//! - Fixed-horizon arg-max rollouts and end-of-sequence masking
//! - The clipped objective with a pluggable auxiliary term
//! - The epoch trainer and model persistence

pub mod backend;
pub mod config;
pub mod environment;
pub mod eos;
pub mod loss;
pub mod network;
pub mod persistence;
pub mod ppo;
pub mod rollout;
pub mod trajectory;

pub use backend::{InferenceBackend, TrainingBackend, default_device};
pub use config::{AuxiliaryKind, PPOConfig};
pub use environment::{BatchStep, Environment, MdpEnvironment};
pub use eos::{EosMask, eos_mask};
pub use loss::{AuxiliaryTerm, ClippedObjective, EntropyBonus, NoAuxiliary, ObjectiveBatch};
pub use network::{History, PolicyConfig, PolicyNetwork};
pub use persistence::{ModelMetadata, load_policy, save_policy};
pub use ppo::PPOTrainer;
pub use rollout::{HORIZON, RolloutGenerator};
pub use trajectory::Trajectory;
