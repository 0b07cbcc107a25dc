//! Train flow
//!
//! Validates an upload, stores the CSV, records a training run, hands the
//! data to the AutoML engine and persists the resulting leaderboard.

mod config;

pub use config::TrainingConfig;

use std::path::PathBuf;

use tracing::{info, warn};
use uuid::Uuid;

use crate::dataset::CsvDataset;
use crate::engine::{AutoMlEngine, TrainingJob};
use crate::error::{AutoMlError, Result};
use crate::store::{CreateTrainingRun, Store, TrainingRunDetail};

/// Longest accepted target column name
pub const MAX_TARGET_COLUMN_LEN: usize = 30;

/// A training request as received from a client
#[derive(Debug, Clone)]
pub struct TrainRequest {
    /// Client-side file name of the upload
    pub file_name: String,
    pub dataset: Vec<u8>,
    pub target_column: String,
    pub max_runtime_secs: u64,
    pub sort_metric: Option<String>,
}

/// Reject requests that must not create a run.
pub fn validate_request(request: &TrainRequest, config: &TrainingConfig) -> Result<CsvDataset> {
    let target = request.target_column.as_str();
    if target.trim().is_empty() {
        return Err(AutoMlError::Validation("target_column is required".to_string()));
    }
    if target.chars().count() > MAX_TARGET_COLUMN_LEN {
        return Err(AutoMlError::Validation(format!(
            "target_column must be at most {} characters",
            MAX_TARGET_COLUMN_LEN
        )));
    }

    if request.max_runtime_secs < config.min_runtime_secs
        || request.max_runtime_secs > config.max_runtime_secs
    {
        return Err(AutoMlError::Validation(format!(
            "max_runtime_secs must be between {} and {}",
            config.min_runtime_secs, config.max_runtime_secs
        )));
    }

    let dataset = CsvDataset::from_upload(&request.dataset)?;
    if dataset.rows() == 0 {
        return Err(AutoMlError::Validation("Dataset has no rows".to_string()));
    }
    // Fails early on a missing target, before anything is written.
    dataset.feature_columns(target)?;

    Ok(dataset)
}

/// Run the whole train flow and return the persisted run with its leaderboard.
pub async fn train(
    store: &Store,
    engine: &dyn AutoMlEngine,
    config: &TrainingConfig,
    request: TrainRequest,
) -> Result<TrainingRunDetail> {
    let dataset = validate_request(&request, config)?;

    let dataset_path = save_upload(config, &request.file_name, &request.dataset).await?;
    let run = store
        .create_run(CreateTrainingRun {
            dataset_path: dataset_path.to_string_lossy().to_string(),
            target_column: request.target_column.clone(),
            max_runtime_secs: request.max_runtime_secs as i64,
        })
        .await?;
    info!(run_id = run.id, dataset = %run.dataset_path, rows = dataset.rows(), "Training run created");

    let features = dataset.feature_columns(&request.target_column)?;
    let run = store.set_feature_columns(run.id, &features).await?;

    let job = TrainingJob {
        dataset: request.dataset,
        target_column: request.target_column,
        max_runtime_secs: request.max_runtime_secs,
        sort_metric: request
            .sort_metric
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| config.sort_metric.clone()),
        split_ratio: config.split_ratio,
        seed: config.seed,
        artifact_dir: config.models_dir(),
    };

    let entries = engine.train(&job).await.map_err(|e| {
        warn!(run_id = run.id, error = %e, "AutoML run failed");
        e
    })?;
    let leaderboard = store.insert_leaderboard(run.id, &entries).await?;

    info!(
        run_id = run.id,
        models = leaderboard.len(),
        best = leaderboard.first().map(|m| m.model_id.as_str()).unwrap_or("-"),
        "Training run completed"
    );

    Ok(TrainingRunDetail { run, leaderboard })
}

/// Write the uploaded CSV under the datasets directory with a unique name.
async fn save_upload(config: &TrainingConfig, file_name: &str, bytes: &[u8]) -> Result<PathBuf> {
    let dir = config.datasets_dir();
    tokio::fs::create_dir_all(&dir).await?;

    let path = dir.join(format!("{}_{}", Uuid::new_v4().simple(), sanitize_file_name(file_name)));
    tokio::fs::write(&path, bytes).await?;
    Ok(path)
}

fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default();
    let mut clean: String = base
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') { c } else { '_' })
        .collect();
    if clean.trim_matches('.').is_empty() {
        clean = "dataset".to_string();
    }
    if !clean.to_ascii_lowercase().ends_with(".csv") {
        clean.push_str(".csv");
    }
    clean
}
