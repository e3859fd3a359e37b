//! seq_ppo - clipped-surrogate policy training for sequence generation
//!
//! This library provides:
//! - A tabular MDP that generated tokens walk through (mdp module)
//! - Rollouts, EOS masking, the clipped objective and the trainer (rl module)
//! - Per-epoch training history and the metrics report (metrics module)
//! - Train and rollout execution modes (modes module)

pub mod mdp;
pub mod metrics;
pub mod modes;
pub mod rl;
