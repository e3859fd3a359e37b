use anyhow::{Result, ensure};

/// One-hot encode a token id
pub fn one_hot(token: usize, dim: usize) -> Vec<f32> {
    let mut state = vec![0.0; dim];
    if token < dim {
        state[token] = 1.0;
    }
    state
}

/// Token id of a state vector: index of the first maximum
pub fn token_of(state: &[f32]) -> usize {
    let mut best = 0;
    for (i, &v) in state.iter().enumerate().skip(1) {
        if v > state[best] {
            best = i;
        }
    }
    best
}

/// A batch of fixed-dimension state vectors, row-major
#[derive(Debug, Clone, PartialEq)]
pub struct StateBatch {
    dim: usize,
    data: Vec<f32>,
}

impl StateBatch {
    /// Wrap row-major state data
    ///
    /// # Arguments
    ///
    /// * `dim` - Length of one state vector
    /// * `data` - `rows * dim` values, one state after another
    ///
    /// # Returns
    ///
    /// An error if `dim` is zero or does not divide the data length
    pub fn new(dim: usize, data: Vec<f32>) -> Result<Self> {
        ensure!(dim > 0, "state dimension must be positive");
        ensure!(
            data.len() % dim == 0,
            "state data of length {} is not a multiple of dimension {}",
            data.len(),
            dim
        );
        Ok(Self { dim, data })
    }

    /// Build a batch of one-hot states
    pub fn from_tokens(tokens: &[usize], dim: usize) -> Self {
        let data = tokens.iter().flat_map(|&t| one_hot(t, dim)).collect();
        Self { dim, data }
    }

    /// Number of states in the batch
    pub fn rows(&self) -> usize {
        self.data.len() / self.dim
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn row(&self, index: usize) -> &[f32] {
        &self.data[index * self.dim..(index + 1) * self.dim]
    }

    /// Token id of every row
    pub fn tokens(&self) -> Vec<usize> {
        self.data.chunks(self.dim).map(token_of).collect()
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }
}
