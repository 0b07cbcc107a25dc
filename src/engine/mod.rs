//! AutoML engine interface
//!
//! Model search, ranking, model serialization and scoring all happen inside
//! an external engine. [`AutoMlEngine`] is the seam the train and predict
//! flows call through; [`H2oEngine`] talks to an H2O-3 cluster.

mod h2o;

pub use h2o::{H2oConfig, H2oEngine};

use std::collections::BTreeMap;
use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Quality metrics reported for one leaderboard row.
///
/// Metrics the engine does not report for a model stay `None`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelMetrics {
    pub auc: Option<f64>,
    pub logloss: Option<f64>,
    pub aucpr: Option<f64>,
    pub mean_per_class_error: Option<f64>,
    pub rmse: Option<f64>,
    pub mse: Option<f64>,
}

/// A ranked model produced by a training run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LeaderboardEntry {
    pub model_id: String,
    pub metrics: ModelMetrics,
    /// Where the engine wrote the serialized model
    pub artifact_path: Option<String>,
}

/// One scored row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub predict: String,
    /// Class probability columns, e.g. `p0`/`p1` for a binary target
    pub probabilities: BTreeMap<String, f64>,
}

/// Inputs of a single AutoML run
#[derive(Debug, Clone)]
pub struct TrainingJob {
    /// Raw CSV upload, semicolon separated
    pub dataset: Vec<u8>,
    pub target_column: String,
    pub max_runtime_secs: u64,
    pub sort_metric: String,
    /// Fraction of rows used for training; the rest ranks the leaderboard
    pub split_ratio: f64,
    pub seed: Option<i64>,
    /// Directory that receives the serialized leaderboard models
    pub artifact_dir: PathBuf,
}

/// Engine reachability report
#[derive(Debug, Clone, Serialize)]
pub struct EngineHealth {
    pub engine: String,
    pub version: String,
    pub healthy: bool,
    pub nodes: u32,
}

#[async_trait]
pub trait AutoMlEngine: Send + Sync {
    /// Check that the engine is up
    async fn health(&self) -> Result<EngineHealth>;

    /// Run AutoML and return the leaderboard, best model first
    async fn train(&self, job: &TrainingJob) -> Result<Vec<LeaderboardEntry>>;

    /// Score a semicolon separated CSV with the model saved at `artifact_path`
    async fn predict(&self, artifact_path: &str, dataset: &[u8]) -> Result<Vec<Prediction>>;
}
