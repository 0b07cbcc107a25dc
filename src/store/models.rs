//! Database model types.

use serde::Serialize;
use sqlx::types::chrono::{DateTime, Utc};

use crate::dataset::FeatureSchema;
use crate::engine::ModelMetrics;

/// A training run: one uploaded dataset and the AutoML search over it.
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct TrainingRun {
    pub id: i64,
    pub created_at: DateTime<Utc>,
    pub dataset_path: String,
    pub target_column: String,
    /// Comma-joined independent variables, set once training has read the file
    pub feature_columns: Option<String>,
    pub max_runtime_secs: i64,
}

impl TrainingRun {
    pub fn feature_schema(&self) -> Option<FeatureSchema> {
        self.feature_columns.as_deref().map(FeatureSchema::parse)
    }
}

/// A leaderboard row persisted for a training run.
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct TrainedModel {
    pub id: i64,
    pub training_run_id: i64,
    /// Position in the leaderboard, 0 is best
    pub rank: i64,
    pub model_id: String,
    pub auc: Option<f64>,
    pub logloss: Option<f64>,
    pub aucpr: Option<f64>,
    pub mean_per_class_error: Option<f64>,
    pub rmse: Option<f64>,
    pub mse: Option<f64>,
    pub binary_path: Option<String>,
}

impl TrainedModel {
    pub fn metrics(&self) -> ModelMetrics {
        ModelMetrics {
            auc: self.auc,
            logloss: self.logloss,
            aucpr: self.aucpr,
            mean_per_class_error: self.mean_per_class_error,
            rmse: self.rmse,
            mse: self.mse,
        }
    }
}

/// Input for creating a new training run record.
#[derive(Debug, Clone)]
pub struct CreateTrainingRun {
    pub dataset_path: String,
    pub target_column: String,
    pub max_runtime_secs: i64,
}

/// A run together with its leaderboard, best model first.
#[derive(Debug, Clone, Serialize)]
pub struct TrainingRunDetail {
    #[serde(flatten)]
    pub run: TrainingRun,
    pub leaderboard: Vec<TrainedModel>,
}
