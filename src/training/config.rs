//! Training configuration

use std::path::PathBuf;

/// Settings applied to every training request
#[derive(Debug, Clone)]
pub struct TrainingConfig {
    /// Root directory for uploaded datasets and saved model binaries
    pub media_root: PathBuf,

    /// Smallest accepted time budget in seconds
    pub min_runtime_secs: u64,

    /// Largest accepted time budget in seconds
    pub max_runtime_secs: u64,

    /// Leaderboard metric used when a request does not name one
    pub sort_metric: String,

    /// Fraction of rows the engine trains on; the rest ranks the leaderboard
    pub split_ratio: f64,

    /// Seed forwarded to the engine for reproducible runs
    pub seed: Option<i64>,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            media_root: PathBuf::from("./media"),
            min_runtime_secs: 10,
            max_runtime_secs: 3600,
            sort_metric: "AUC".to_string(),
            split_ratio: 0.7,
            seed: None,
        }
    }
}

impl TrainingConfig {
    pub fn datasets_dir(&self) -> PathBuf {
        self.media_root.join("datasets")
    }

    pub fn models_dir(&self) -> PathBuf {
        self.media_root.join("models")
    }
}
