//! End-of-sequence masking
//!
//! Rollouts always run the full horizon, but an episode may end earlier by
//! generating a terminal token. The mask keeps every step up to and including
//! the first terminal step of a row and drops everything after it.

use super::trajectory::Trajectory;
use burn::tensor::{Tensor, TensorData, backend::Backend};

/// Per-row, per-step inclusion mask (`true` = contributes to the loss)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EosMask {
    rows: usize,
    horizon: usize,
    values: Vec<bool>,
}

impl EosMask {
    /// Build a mask from per-row token sequences
    ///
    /// Every row must have the same length.
    pub fn from_tokens(tokens: &[Vec<usize>], terminal: &[usize]) -> Self {
        let horizon = tokens.first().map_or(0, |row| row.len());
        let mut values = Vec::with_capacity(tokens.len() * horizon);

        for row in tokens {
            debug_assert_eq!(row.len(), horizon);
            let first_terminal = row.iter().position(|t| terminal.contains(t));
            values.extend((0..horizon).map(|step| match first_terminal {
                Some(end) => step <= end,
                None => true,
            }));
        }

        Self {
            rows: tokens.len(),
            horizon,
            values,
        }
    }

    /// Number of rows (batch size)
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Steps per row
    pub fn horizon(&self) -> usize {
        self.horizon
    }

    /// The mask of one row, in step order
    pub fn row(&self, row: usize) -> &[bool] {
        &self.values[row * self.horizon..(row + 1) * self.horizon]
    }

    /// Number of included (row, step) cells
    pub fn included(&self) -> usize {
        self.values.iter().filter(|&&v| v).count()
    }

    /// Included cells as a fraction of all cells
    pub fn included_fraction(&self) -> f32 {
        if self.values.is_empty() {
            return 0.0;
        }
        self.included() as f32 / self.values.len() as f32
    }

    /// Mask as `[rows, horizon]` weights of 1.0 (included) and 0.0 (excluded)
    pub fn to_tensor<B: Backend>(&self, device: &B::Device) -> Tensor<B, 2> {
        let data: Vec<f32> = self
            .values
            .iter()
            .map(|&v| if v { 1.0 } else { 0.0 })
            .collect();
        Tensor::from_data(TensorData::new(data, [self.rows, self.horizon]), device)
    }
}

/// Mask a trajectory's generated states against a set of terminal token ids
///
/// A generated state's token is its arg-max index.
pub fn eos_mask(trajectory: &Trajectory, terminal: &[usize]) -> EosMask {
    let tokens: Vec<Vec<usize>> = (0..trajectory.batch_size())
        .map(|row| trajectory.generated_tokens(row))
        .collect();
    EosMask::from_tokens(&tokens, terminal)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rl::trajectory::tests::trajectory_from_tokens;
    use burn::backend::ndarray::{NdArray, NdArrayDevice};

    type TestBackend = NdArray<f32>;

    const TERMINAL: [usize; 3] = [1, 2, 4];

    #[test]
    fn test_terminal_at_step_two() {
        let mask = EosMask::from_tokens(&[vec![3, 5, 2, 2, 2]], &TERMINAL);
        assert_eq!(mask.row(0), &[true, true, true, false, false]);
    }

    #[test]
    fn test_no_terminal_is_all_true() {
        let mask = EosMask::from_tokens(&[vec![0, 3, 5, 3, 5]], &TERMINAL);
        assert_eq!(mask.row(0), &[true; 5]);
        assert_eq!(mask.included(), 5);
    }

    #[test]
    fn test_terminal_at_first_step() {
        let mask = EosMask::from_tokens(&[vec![1, 1, 1, 1, 1]], &TERMINAL);
        assert_eq!(mask.row(0), &[true, false, false, false, false]);
    }

    #[test]
    fn test_later_terminals_stay_masked() {
        // A non-terminal token after the first terminal must not re-enable the row
        let mask = EosMask::from_tokens(&[vec![3, 2, 0, 4, 5]], &TERMINAL);
        assert_eq!(mask.row(0), &[true, true, false, false, false]);
    }

    #[test]
    fn test_mask_is_monotonic_per_row() {
        let rows: Vec<Vec<usize>> = (0..6usize.pow(4))
            .map(|mut n| {
                (0..4)
                    .map(|_| {
                        let t = n % 6;
                        n /= 6;
                        t
                    })
                    .collect()
            })
            .collect();
        let mask = EosMask::from_tokens(&rows, &TERMINAL);

        for (r, tokens) in rows.iter().enumerate() {
            let row = mask.row(r);
            for step in 1..row.len() {
                assert!(row[step - 1] || !row[step], "mask re-opened in row {:?}", tokens);
            }
            if let Some(end) = tokens.iter().position(|t| TERMINAL.contains(t)) {
                assert!(row[..=end].iter().all(|&v| v));
            }
        }
    }

    #[test]
    fn test_mask_from_trajectory_and_tensor() {
        let device = NdArrayDevice::default();
        let traj = trajectory_from_tokens(
            &[0, 3],
            &[vec![3, 5, 2, 2, 2], vec![5, 3, 5, 3, 5]],
            &[vec![0.0; 5], vec![0.0; 5]],
            6,
        );

        let mask = eos_mask(&traj, &TERMINAL);
        assert_eq!(mask.rows(), 2);
        assert_eq!(mask.horizon(), 5);
        assert!(!mask.row(0)[3]);
        assert!(mask.row(1)[4]);
        assert!((mask.included_fraction() - 0.8).abs() < 1e-6);

        let weights: Vec<f32> = mask
            .to_tensor::<TestBackend>(&device)
            .into_data()
            .iter::<f32>()
            .collect();
        assert_eq!(
            weights,
            vec![1.0, 1.0, 1.0, 0.0, 0.0, 1.0, 1.0, 1.0, 1.0, 1.0]
        );
    }
}
