//! Query functions for training runs and trained models.

use sqlx::types::chrono::Utc;

use super::models::{CreateTrainingRun, TrainedModel, TrainingRun, TrainingRunDetail};
use super::Store;
use crate::dataset::FeatureSchema;
use crate::engine::LeaderboardEntry;
use crate::error::{AutoMlError, Result};

const RUN_COLUMNS: &str =
    "id, created_at, dataset_path, target_column, feature_columns, max_runtime_secs";

const MODEL_COLUMNS: &str = "id, training_run_id, rank, model_id, auc, logloss, aucpr, \
                             mean_per_class_error, rmse, mse, binary_path";

impl Store {
    /// Creates a new training run record.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub async fn create_run(&self, input: CreateTrainingRun) -> Result<TrainingRun> {
        let sql = format!(
            "INSERT INTO training_runs (created_at, dataset_path, target_column, max_runtime_secs) \
             VALUES (?, ?, ?, ?) RETURNING {}",
            RUN_COLUMNS
        );
        let run = sqlx::query_as::<_, TrainingRun>(&sql)
            .bind(Utc::now())
            .bind(&input.dataset_path)
            .bind(&input.target_column)
            .bind(input.max_runtime_secs)
            .fetch_one(self.pool())
            .await?;
        Ok(run)
    }

    /// Records the independent variables read from the run's dataset.
    ///
    /// # Errors
    ///
    /// Returns [`AutoMlError::NotFound`] when the run does not exist.
    pub async fn set_feature_columns(&self, run_id: i64, features: &FeatureSchema) -> Result<TrainingRun> {
        let sql = format!(
            "UPDATE training_runs SET feature_columns = ? WHERE id = ? RETURNING {}",
            RUN_COLUMNS
        );
        sqlx::query_as::<_, TrainingRun>(&sql)
            .bind(features.to_stored())
            .bind(run_id)
            .fetch_optional(self.pool())
            .await?
            .ok_or_else(|| AutoMlError::NotFound(format!("Training run {}", run_id)))
    }

    /// Persists a leaderboard in one transaction, ranking rows in the given order.
    ///
    /// # Errors
    ///
    /// Returns an error if any insert fails; nothing is written in that case.
    pub async fn insert_leaderboard(&self, run_id: i64, entries: &[LeaderboardEntry]) -> Result<Vec<TrainedModel>> {
        let sql = format!(
            "INSERT INTO trained_models (training_run_id, rank, model_id, auc, logloss, aucpr, \
             mean_per_class_error, rmse, mse, binary_path) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?) RETURNING {}",
            MODEL_COLUMNS
        );

        let mut tx = self.pool().begin().await?;
        let mut models = Vec::with_capacity(entries.len());
        for (rank, entry) in entries.iter().enumerate() {
            let model = sqlx::query_as::<_, TrainedModel>(&sql)
                .bind(run_id)
                .bind(rank as i64)
                .bind(&entry.model_id)
                .bind(entry.metrics.auc)
                .bind(entry.metrics.logloss)
                .bind(entry.metrics.aucpr)
                .bind(entry.metrics.mean_per_class_error)
                .bind(entry.metrics.rmse)
                .bind(entry.metrics.mse)
                .bind(&entry.artifact_path)
                .fetch_one(&mut *tx)
                .await?;
            models.push(model);
        }
        tx.commit().await?;

        Ok(models)
    }

    /// Finds a training run by its ID.
    pub async fn find_run(&self, run_id: i64) -> Result<Option<TrainingRun>> {
        let sql = format!("SELECT {} FROM training_runs WHERE id = ?", RUN_COLUMNS);
        let run = sqlx::query_as::<_, TrainingRun>(&sql)
            .bind(run_id)
            .fetch_optional(self.pool())
            .await?;
        Ok(run)
    }

    /// The most recently created training run.
    pub async fn latest_run(&self) -> Result<Option<TrainingRun>> {
        let sql = format!("SELECT {} FROM training_runs ORDER BY id DESC LIMIT 1", RUN_COLUMNS);
        let run = sqlx::query_as::<_, TrainingRun>(&sql)
            .fetch_optional(self.pool())
            .await?;
        Ok(run)
    }

    /// Lists training runs, newest first.
    pub async fn list_runs(&self, limit: i64) -> Result<Vec<TrainingRun>> {
        let sql = format!("SELECT {} FROM training_runs ORDER BY id DESC LIMIT ?", RUN_COLUMNS);
        let runs = sqlx::query_as::<_, TrainingRun>(&sql)
            .bind(limit)
            .fetch_all(self.pool())
            .await?;
        Ok(runs)
    }

    /// Leaderboard of a run in rank order.
    pub async fn models_for_run(&self, run_id: i64) -> Result<Vec<TrainedModel>> {
        let sql = format!(
            "SELECT {} FROM trained_models WHERE training_run_id = ? ORDER BY rank ASC",
            MODEL_COLUMNS
        );
        let models = sqlx::query_as::<_, TrainedModel>(&sql)
            .bind(run_id)
            .fetch_all(self.pool())
            .await?;
        Ok(models)
    }

    /// Top-ranked model of a run.
    pub async fn best_model(&self, run_id: i64) -> Result<Option<TrainedModel>> {
        let sql = format!(
            "SELECT {} FROM trained_models WHERE training_run_id = ? ORDER BY rank ASC LIMIT 1",
            MODEL_COLUMNS
        );
        let model = sqlx::query_as::<_, TrainedModel>(&sql)
            .bind(run_id)
            .fetch_optional(self.pool())
            .await?;
        Ok(model)
    }

    /// Finds a trained model by its engine identifier; the newest row wins.
    pub async fn find_model(&self, model_id: &str) -> Result<Option<TrainedModel>> {
        let sql = format!(
            "SELECT {} FROM trained_models WHERE model_id = ? ORDER BY id DESC LIMIT 1",
            MODEL_COLUMNS
        );
        let model = sqlx::query_as::<_, TrainedModel>(&sql)
            .bind(model_id)
            .fetch_optional(self.pool())
            .await?;
        Ok(model)
    }

    /// A run with its leaderboard.
    pub async fn run_detail(&self, run_id: i64) -> Result<Option<TrainingRunDetail>> {
        let Some(run) = self.find_run(run_id).await? else {
            return Ok(None);
        };
        let leaderboard = self.models_for_run(run.id).await?;
        Ok(Some(TrainingRunDetail { run, leaderboard }))
    }
}
