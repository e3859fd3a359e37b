//! Tabular MDP over one-hot token states
//!
//! This module contains the environment logic without any tensor dependencies.
//! States are token ids in the engine and one-hot vectors at the batch level;
//! the RL side only ever sees [`StateBatch`] values.

pub mod config;
pub mod engine;
pub mod state;

pub use config::{MdpConfig, Transition};
pub use engine::{MdpEngine, StepResult};
pub use state::{StateBatch, one_hot, token_of};
