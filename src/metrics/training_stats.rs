//! Training history tracking
//!
//! Keeps one [`EpochRecord`] per trained epoch and writes the loss and reward
//! series as a JSON report for plotting.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Summary of a single training epoch
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EpochRecord {
    /// 1-based epoch number
    pub epoch: usize,

    /// Mean loss over the epoch's sub-epochs
    pub average_loss: f32,

    /// Accumulated rollout reward averaged over the batch
    pub average_reward: f32,

    /// Fraction of (row, step) cells kept by the EOS mask
    pub included_fraction: f32,

    /// Fraction of rows that reached a terminal state
    pub terminated_fraction: f32,
}

/// Report written for the plotting collaborator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsReport {
    pub losses: Vec<f32>,
    pub rewards: Vec<f32>,
    pub epochs: Vec<EpochRecord>,
}

/// Per-epoch training history
///
/// # Example
///
/// ```rust
/// use seq_ppo::metrics::{EpochRecord, TrainingHistory};
///
/// let mut history = TrainingHistory::new();
/// history.record(EpochRecord {
///     epoch: 1,
///     average_loss: -0.4,
///     average_reward: 0.75,
///     included_fraction: 0.6,
///     terminated_fraction: 1.0,
/// });
///
/// assert_eq!(history.losses(), vec![-0.4]);
/// println!("{}", history.format_summary());
/// ```
#[derive(Debug, Clone, Default)]
pub struct TrainingHistory {
    records: Vec<EpochRecord>,
}

impl TrainingHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, record: EpochRecord) {
        self.records.push(record);
    }

    /// Append every record of `other`
    pub fn extend(&mut self, other: TrainingHistory) {
        self.records.extend(other.records);
    }

    pub fn records(&self) -> &[EpochRecord] {
        &self.records
    }

    pub fn last(&self) -> Option<&EpochRecord> {
        self.records.last()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Average loss of every epoch, in order
    pub fn losses(&self) -> Vec<f32> {
        self.records.iter().map(|r| r.average_loss).collect()
    }

    /// Average reward of every epoch, in order
    pub fn rewards(&self) -> Vec<f32> {
        self.records.iter().map(|r| r.average_reward).collect()
    }

    /// Mean reward over the last `window` epochs
    ///
    /// Returns 0.0 if nothing has been recorded.
    pub fn recent_mean_reward(&self, window: usize) -> f32 {
        let start = self.records.len().saturating_sub(window);
        let recent = &self.records[start..];
        if recent.is_empty() {
            return 0.0;
        }
        recent.iter().map(|r| r.average_reward).sum::<f32>() / recent.len() as f32
    }

    /// Format a summary of the most recent epoch
    pub fn format_summary(&self) -> String {
        match self.last() {
            Some(r) => format!(
                "Epoch: {} | Loss: {:.4} | Reward: {:.4} | Included: {:.2} | Terminated: {:.2}",
                r.epoch, r.average_loss, r.average_reward, r.included_fraction, r.terminated_fraction
            ),
            None => "Epoch: 0".to_string(),
        }
    }

    pub fn report(&self) -> MetricsReport {
        MetricsReport {
            losses: self.losses(),
            rewards: self.rewards(),
            epochs: self.records.clone(),
        }
    }

    /// Write the metrics report as JSON, creating parent directories
    pub fn save_json(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {:?}", parent))?;
        }
        let json =
            serde_json::to_string_pretty(&self.report()).context("Failed to serialize metrics")?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write metrics to {:?}", path))?;
        Ok(())
    }
}
