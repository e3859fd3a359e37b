//! Backend type aliases and device selection
//!
//! - **TrainingBackend**: autodiff-enabled NdArray backend (CPU) for the
//!   current policy and the clipped objective
//! - **InferenceBackend**: plain NdArray backend for rollouts and the frozen
//!   old-policy snapshot
//!
//! The device is never a global: callers obtain one here (or build their own)
//! and pass it to every constructor that allocates tensors.

use burn::backend::{
    Autodiff,
    ndarray::{NdArray, NdArrayDevice},
};

/// Backend for training (with autodiff)
pub type TrainingBackend = Autodiff<NdArray<f32>>;

/// Backend for rollouts and frozen snapshots
pub type InferenceBackend = NdArray<f32>;

/// Get the default compute device (CPU)
pub fn default_device() -> NdArrayDevice {
    NdArrayDevice::default()
}
