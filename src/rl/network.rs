//! Causal sequence policy network
//!
//! The policy reads a source state and the states generated so far and
//! produces one action distribution per decoding step. Step `i` sees the
//! source plus `generated[..i]` only, so a single forward pass over a full
//! history scores every step of a trajectory.
//!
//! # Architecture
//!
//! ```text
//! source:    [batch, 1, state_dim]  -> Linear -> [batch, 1, d_model] (broadcast over steps)
//! generated: [batch, k, state_dim]  -> Linear -> prefix means [batch, k+1, d_model]
//! positions: learned [max_len, d_model]
//!   sum -> ReLU -> Linear(d_model -> hidden) -> ReLU -> Linear(hidden -> num_actions)
//! output:    [batch, k+1, num_actions]
//! ```
//!
//! # Example
//!
//! ```rust
//! use seq_ppo::rl::{History, PolicyConfig};
//! use burn::backend::NdArray;
//! use burn::backend::ndarray::NdArrayDevice;
//! use burn::tensor::Tensor;
//!
//! type Backend = NdArray<f32>;
//!
//! let device = NdArrayDevice::default();
//! let policy = PolicyConfig::default().init::<Backend>(&device);
//!
//! let source = Tensor::zeros([4, 1, 6], &device);
//! let probs = policy.forward(source, &History::Empty);
//! assert_eq!(probs.dims(), [4, 1, 2]);
//! ```

use burn::{
    module::{Module, Param},
    nn::{Linear, LinearConfig},
    tensor::{
        Distribution, Tensor,
        activation::{relu, softmax},
        backend::Backend,
    },
};
use serde::{Deserialize, Serialize};

/// States generated so far in a rollout
///
/// The first decoding step has no history at all. That case is its own
/// variant rather than a zero-filled tensor, which the policy would read as
/// a real observation.
#[derive(Debug, Clone)]
pub enum History<B: Backend> {
    /// Nothing generated yet
    Empty,
    /// Generated states, `[batch, k, state_dim]` with `k >= 1`
    Generated(Tensor<B, 3>),
}

impl<B: Backend> History<B> {
    /// Number of generated steps
    pub fn len(&self) -> usize {
        match self {
            History::Empty => 0,
            History::Generated(states) => states.dims()[1],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Configuration for the policy network
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Dimension of a state vector
    pub state_dim: usize,

    /// Size of the discrete action space
    pub num_actions: usize,

    /// Maximum number of decoding steps per forward pass
    pub max_len: usize,

    /// Embedding width
    pub d_model: usize,

    /// Width of the hidden layer before the action head
    pub hidden_dim: usize,
}

impl PolicyConfig {
    /// Configuration sized for a given state and action space
    pub fn new(state_dim: usize, num_actions: usize) -> Self {
        Self {
            state_dim,
            num_actions,
            ..Default::default()
        }
    }

    /// Initialize the policy network on `device`
    pub fn init<B: Backend>(&self, device: &B::Device) -> PolicyNetwork<B> {
        let positions = Tensor::<B, 2>::random(
            [self.max_len, self.d_model],
            Distribution::Normal(0.0, 0.02),
            device,
        );

        PolicyNetwork {
            source_embed: LinearConfig::new(self.state_dim, self.d_model).init(device),
            state_embed: LinearConfig::new(self.state_dim, self.d_model).init(device),
            positions: Param::from_tensor(positions),
            hidden: LinearConfig::new(self.d_model, self.hidden_dim).init(device),
            action_head: LinearConfig::new(self.hidden_dim, self.num_actions).init(device),
        }
    }
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            state_dim: 6,
            num_actions: 2,
            max_len: 6,
            d_model: 16,
            hidden_dim: 32,
        }
    }
}

/// Sequence policy over one-hot MDP states
///
/// # Type Parameters
///
/// * `B` - The Burn backend (`NdArray<f32>` for rollouts, `Autodiff<NdArray<f32>>` for training)
#[derive(Module, Debug)]
pub struct PolicyNetwork<B: Backend> {
    /// Projects the source state
    source_embed: Linear<B>,
    /// Projects each generated state
    state_embed: Linear<B>,
    /// Learned per-step position embedding [max_len, d_model]
    positions: Param<Tensor<B, 2>>,
    hidden: Linear<B>,
    /// Outputs action logits
    action_head: Linear<B>,
}

impl<B: Backend> PolicyNetwork<B> {
    /// Action logits for every decoding step
    ///
    /// # Arguments
    ///
    /// * `source` - `[batch, 1, state_dim]`
    /// * `history` - generated states so far (`k` steps)
    ///
    /// # Returns
    ///
    /// `[batch, k + 1, num_actions]`
    ///
    /// # Panics
    ///
    /// If `k + 1` exceeds `max_len` or the history batch differs from the source batch.
    pub fn forward_logits(&self, source: Tensor<B, 3>, history: &History<B>) -> Tensor<B, 3> {
        let [batch, _, _] = source.dims();
        let [max_len, d_model] = self.positions.val().dims();
        let steps = history.len() + 1;
        assert!(
            steps <= max_len,
            "history of {} steps exceeds policy max_len {}",
            history.len(),
            max_len
        );

        let device = source.device();
        let source = self
            .source_embed
            .forward(source)
            .expand([batch, steps, d_model]);

        // Step i attends to the mean embedding of generated[..i]
        let context = match history {
            History::Empty => Tensor::zeros([batch, 1, d_model], &device),
            History::Generated(generated) => {
                assert_eq!(
                    generated.dims()[0],
                    batch,
                    "history batch does not match source batch"
                );
                let embedded = self.state_embed.forward(generated.clone());
                let mut prefixes = Vec::with_capacity(steps);
                prefixes.push(Tensor::zeros([batch, 1, d_model], &device));
                for i in 1..steps {
                    prefixes.push(
                        embedded
                            .clone()
                            .slice([0..batch, 0..i, 0..d_model])
                            .mean_dim(1),
                    );
                }
                Tensor::cat(prefixes, 1)
            }
        };

        let positions = self
            .positions
            .val()
            .slice([0..steps, 0..d_model])
            .unsqueeze::<3>()
            .expand([batch, steps, d_model]);

        let x = relu(source + context + positions);
        let x = relu(self.hidden.forward(x));
        self.action_head.forward(x)
    }

    /// Action probabilities for every decoding step, `[batch, k + 1, num_actions]`
    pub fn forward(&self, source: Tensor<B, 3>, history: &History<B>) -> Tensor<B, 3> {
        softmax(self.forward_logits(source, history), 2)
    }

    /// Longest history + 1 this network accepts
    pub fn max_len(&self) -> usize {
        self.positions.val().dims()[0]
    }

    /// Dimension of the state vectors this network expects
    pub fn state_dim(&self) -> usize {
        self.source_embed.weight.val().dims()[0]
    }

    /// Number of actions the network scores
    pub fn num_actions(&self) -> usize {
        self.action_head.weight.val().dims()[1]
    }

    /// Every parameter value, flattened in a fixed order
    #[cfg(test)]
    pub(crate) fn parameter_values(&self) -> Vec<f32> {
        let mut values = Vec::new();
        for linear in [
            &self.source_embed,
            &self.state_embed,
            &self.hidden,
            &self.action_head,
        ] {
            values.extend(linear.weight.val().into_data().iter::<f32>());
            if let Some(bias) = &linear.bias {
                values.extend(bias.val().into_data().iter::<f32>());
            }
        }
        values.extend(self.positions.val().into_data().iter::<f32>());
        values
    }

    #[cfg(test)]
    pub(crate) fn action_head_weight(&self) -> Tensor<B, 2> {
        self.action_head.weight.val()
    }
}
