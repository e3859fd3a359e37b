pub mod training_stats;

pub use training_stats::{EpochRecord, MetricsReport, TrainingHistory};
