//! Predict flow
//!
//! Resolves the model to score with (an explicit identifier, or the best
//! model of the newest run), checks the upload against the columns that
//! model was trained on, and delegates scoring to the engine.

use tracing::info;

use crate::dataset::CsvDataset;
use crate::engine::{AutoMlEngine, Prediction};
use crate::error::{AutoMlError, Result};
use crate::store::{Store, TrainedModel, TrainingRun};

/// A prediction request as received from a client
#[derive(Debug, Clone)]
pub struct PredictRequest {
    /// Engine model identifier; `None` or blank selects the latest best model
    pub model_id: Option<String>,
    pub dataset: Vec<u8>,
}

/// Predictions along with the model that produced them
#[derive(Debug, Clone)]
pub struct PredictionOutcome {
    pub run: TrainingRun,
    pub model: TrainedModel,
    pub predictions: Vec<Prediction>,
}

/// Pick the trained model and its owning run for a request.
pub async fn resolve_model(store: &Store, model_id: Option<&str>) -> Result<(TrainingRun, TrainedModel)> {
    match model_id.map(str::trim).filter(|id| !id.is_empty()) {
        Some(id) => {
            let model = store
                .find_model(id)
                .await?
                .ok_or_else(|| AutoMlError::NotFound(format!("Model {}", id)))?;
            let run = store
                .find_run(model.training_run_id)
                .await?
                .ok_or_else(|| AutoMlError::NotFound(format!("Training run {}", model.training_run_id)))?;
            Ok((run, model))
        }
        None => {
            let run = store
                .latest_run()
                .await?
                .ok_or_else(|| AutoMlError::NotFound("No training runs available".to_string()))?;
            let model = store.best_model(run.id).await?.ok_or_else(|| {
                AutoMlError::NotFound(format!("Training run {} has no trained models", run.id))
            })?;
            Ok((run, model))
        }
    }
}

/// Run the whole predict flow.
pub async fn predict(store: &Store, engine: &dyn AutoMlEngine, request: PredictRequest) -> Result<PredictionOutcome> {
    if request.dataset.is_empty() {
        return Err(AutoMlError::Validation("The submitted file is empty".to_string()));
    }

    let (run, model) = resolve_model(store, request.model_id.as_deref()).await?;

    let schema = run.feature_schema().ok_or_else(|| {
        AutoMlError::Validation(format!("Training run {} has no recorded feature columns", run.id))
    })?;
    let dataset = CsvDataset::from_upload(&request.dataset)?;
    schema.check(&dataset.columns())?;

    let artifact = model
        .binary_path
        .as_deref()
        .ok_or_else(|| AutoMlError::NotFound(format!("Model {} has no saved binary", model.model_id)))?;

    let predictions = engine.predict(artifact, &request.dataset).await?;
    info!(
        run_id = run.id,
        model_id = %model.model_id,
        rows = predictions.len(),
        "Predictions produced"
    );

    Ok(PredictionOutcome {
        run,
        model,
        predictions,
    })
}
