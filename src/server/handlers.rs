//! HTTP request handlers

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{multipart::MultipartRejection, Multipart, Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info};

use crate::inference::{self, PredictRequest, PredictionOutcome};
use crate::store::{TrainedModel, TrainingRun, TrainingRunDetail};
use crate::training::{self, TrainRequest};

use super::error::{Result, ServerError};
use super::state::AppState;

/// Multipart field carrying the CSV file
const DATASET_FIELD: &str = "dataset";

/// Reported instead of storage or engine failure details
const PREDICTION_FAILED: &str = "Prediction failed. Check server logs for details.";

const DEFAULT_RUN_LIMIT: i64 = 50;
const MAX_RUN_LIMIT: i64 = 500;

/// A parsed multipart form: the uploaded file plus the plain text fields
#[derive(Debug, Default)]
struct UploadForm {
    file: Option<(String, Vec<u8>)>,
    fields: HashMap<String, String>,
}

impl UploadForm {
    fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    fn required(&self, name: &str) -> Result<&str> {
        self.field(name)
            .ok_or_else(|| ServerError::BadRequest(format!("Missing form field: {}", name)))
    }
}

async fn read_form(mut multipart: Multipart) -> Result<UploadForm> {
    let mut form = UploadForm::default();

    while let Some(field) = multipart.next_field().await.map_err(|e| ServerError::BadRequest(e.to_string()))? {
        let name = field.name().unwrap_or_default().to_string();

        if name == DATASET_FIELD {
            let file_name = field.file_name().unwrap_or("dataset.csv").to_string();
            let data = field.bytes().await.map_err(|e| ServerError::BadRequest(e.to_string()))?;
            info!("Received file: {} ({} bytes)", file_name, data.len());
            form.file = Some((file_name, data.to_vec()));
        } else {
            let value = field.text().await.map_err(|e| ServerError::BadRequest(e.to_string()))?;
            form.fields.insert(name, value);
        }
    }

    Ok(form)
}

// ============================================================================
// Training
// ============================================================================

/// Upload a dataset and run AutoML on it; responds once the leaderboard is stored
pub async fn train_model(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<(StatusCode, Json<TrainingRunDetail>)> {
    let mut form = read_form(multipart).await?;

    let (file_name, dataset) = form
        .file
        .take()
        .ok_or_else(|| ServerError::BadRequest(format!("Missing file field: {}", DATASET_FIELD)))?;
    let target_column = form.required("target_column")?.to_string();
    let max_runtime_secs = form
        .required("max_runtime_secs")?
        .trim()
        .parse::<u64>()
        .map_err(|e| ServerError::BadRequest(format!("max_runtime_secs must be a positive integer: {}", e)))?;

    let request = TrainRequest {
        file_name,
        dataset,
        target_column,
        max_runtime_secs,
        sort_metric: form.field("sort_metric").map(str::to_string),
    };

    let detail = training::train(&state.store, state.engine.as_ref(), &state.config.training, request)
        .await
        .map_err(ServerError::from_training)?;

    Ok((StatusCode::CREATED, Json(detail)))
}

// ============================================================================
// Inference
// ============================================================================

async fn run_prediction(
    state: &AppState,
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> Result<PredictionOutcome> {
    let multipart = multipart.map_err(|e| ServerError::BadRequest(e.body_text()))?;
    let mut form = read_form(multipart).await?;
    let (_, dataset) = form
        .file
        .take()
        .ok_or_else(|| ServerError::BadRequest(format!("Missing file field: {}", DATASET_FIELD)))?;

    let request = PredictRequest {
        model_id: form.field("model_id").map(str::to_string),
        dataset,
    };
    let outcome = inference::predict(&state.store, state.engine.as_ref(), request).await?;
    Ok(outcome)
}

/// Score a CSV; every failure is answered with 401.
///
/// Input problems keep their message, storage and engine failures are masked.
pub async fn predict(
    State(state): State<Arc<AppState>>,
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> Result<(StatusCode, Json<serde_json::Value>)> {
    let outcome = run_prediction(&state, multipart).await.map_err(|e| match e {
        ServerError::Prediction(msg) | ServerError::BadRequest(msg) | ServerError::NotFound(msg) => {
            ServerError::Prediction(msg)
        }
        ServerError::Internal(msg) | ServerError::Training(msg) => {
            error!(detail = %msg, "Prediction failed");
            ServerError::Prediction(PREDICTION_FAILED.to_string())
        }
    })?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "training_run_id": outcome.run.id,
            "model_id": outcome.model.model_id,
            "predictions": outcome.predictions,
        })),
    ))
}

// ============================================================================
// Runs and models
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ListRunsQuery {
    pub limit: Option<i64>,
}

/// Training runs, newest first
pub async fn list_runs(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListRunsQuery>,
) -> Result<Json<Vec<TrainingRun>>> {
    let limit = query.limit.unwrap_or(DEFAULT_RUN_LIMIT).clamp(1, MAX_RUN_LIMIT);
    let runs = state.store.list_runs(limit).await?;
    Ok(Json(runs))
}

pub async fn get_run(
    State(state): State<Arc<AppState>>,
    Path(run_id): Path<i64>,
) -> Result<Json<TrainingRunDetail>> {
    state
        .store
        .run_detail(run_id)
        .await?
        .map(Json)
        .ok_or_else(|| ServerError::NotFound(format!("Training run {}", run_id)))
}

pub async fn get_model(
    State(state): State<Arc<AppState>>,
    Path(model_id): Path<String>,
) -> Result<Json<TrainedModel>> {
    state
        .store
        .find_model(&model_id)
        .await?
        .map(Json)
        .ok_or_else(|| ServerError::NotFound(format!("Model {}", model_id)))
}

// ============================================================================
// System
// ============================================================================

pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let engine = match state.engine.health().await {
        Ok(health) => json!({
            "reachable": true,
            "name": health.engine,
            "version": health.version,
            "healthy": health.healthy,
            "nodes": health.nodes,
        }),
        Err(e) => json!({
            "reachable": false,
            "error": e.to_string(),
        }),
    };

    Json(json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_secs": state.uptime_secs(),
        "engine": engine,
    }))
}
