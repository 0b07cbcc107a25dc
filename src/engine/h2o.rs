//! H2O-3 REST client
//!
//! Every call is a plain HTTP request against the cluster's `/3` and `/99`
//! endpoints. Long-running steps (parse, AutoML) return a job key that is
//! polled until it reaches a terminal state. Frames created for a request
//! are removed afterwards; saved model binaries stay on disk.

use std::time::Duration;

use async_trait::async_trait;
use polars::prelude::*;
use reqwest::{multipart, Client, Response, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{AutoMlEngine, EngineHealth, LeaderboardEntry, ModelMetrics, Prediction, TrainingJob};
use crate::dataset::{CsvDataset, UPLOAD_SEPARATOR};
use crate::error::{AutoMlError, Result};

/// Column H2O writes the predicted label into
const PREDICT_COLUMN: &str = "predict";

/// Connection settings for an H2O cluster
#[derive(Debug, Clone)]
pub struct H2oConfig {
    pub base_url: String,
    pub poll_interval: Duration,
    pub request_timeout: Duration,
}

impl Default for H2oConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:54321".to_string(),
            poll_interval: Duration::from_millis(500),
            request_timeout: Duration::from_secs(300),
        }
    }
}

pub struct H2oEngine {
    client: Client,
    config: H2oConfig,
}

// ----------------------------------------------------------------------------
// Wire types
// ----------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct KeyRef {
    name: String,
}

#[derive(Debug, Deserialize)]
struct JobRef {
    key: KeyRef,
}

#[derive(Debug, Deserialize)]
struct JobEnvelope {
    job: JobRef,
}

#[derive(Debug, Deserialize)]
struct JobsResponse {
    jobs: Vec<JobStatus>,
}

#[derive(Debug, Deserialize)]
struct JobStatus {
    status: String,
    #[serde(default)]
    progress: f64,
    #[serde(default)]
    progress_msg: Option<String>,
    #[serde(default)]
    exception: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PostFileResponse {
    destination_frame: String,
}

#[derive(Debug, Deserialize)]
struct ParseSetupResponse {
    parse_type: String,
    separator: i64,
    number_columns: usize,
    single_quotes: bool,
    column_names: Option<Vec<String>>,
    column_types: Vec<String>,
    check_header: i64,
    chunk_size: i64,
}

#[derive(Debug, Deserialize)]
struct SplitFrameResponse {
    key: KeyRef,
}

#[derive(Debug, Deserialize)]
struct LeaderboardResponse {
    #[serde(default)]
    models: Vec<KeyRef>,
    table: Option<TwoDimTable>,
}

/// H2O tables are column-major: `data[i]` holds every row of `columns[i]`.
#[derive(Debug, Deserialize)]
struct TwoDimTable {
    columns: Vec<ColumnSpec>,
    data: Vec<Vec<Value>>,
}

#[derive(Debug, Deserialize)]
struct ColumnSpec {
    name: String,
}

#[derive(Debug, Deserialize)]
struct ModelExportResponse {
    dir: String,
}

#[derive(Debug, Deserialize)]
struct ModelImportResponse {
    models: Vec<ModelRef>,
}

#[derive(Debug, Deserialize)]
struct ModelRef {
    model_id: KeyRef,
}

#[derive(Debug, Deserialize)]
struct PredictionsResponse {
    predictions_frame: KeyRef,
}

#[derive(Debug, Deserialize)]
struct CloudResponse {
    version: String,
    #[serde(default)]
    cloud_healthy: bool,
    #[serde(default)]
    cloud_size: u32,
}

// ----------------------------------------------------------------------------
// Client
// ----------------------------------------------------------------------------

impl H2oEngine {
    pub fn new(config: H2oConfig) -> Result<Self> {
        let client = Client::builder().timeout(config.request_timeout).build()?;
        endpoint(&config.base_url, &[])?;
        Ok(Self { client, config })
    }

    fn url(&self, segments: &[&str]) -> Result<Url> {
        endpoint(&self.config.base_url, segments)
    }

    async fn wait_job(&self, job_key: &str) -> Result<()> {
        let url = self.url(&["3", "Jobs", job_key])?;
        loop {
            let response: JobsResponse = read_json(self.client.get(url.clone()).send().await?).await?;
            let status = response.jobs.into_iter().next().ok_or_else(|| {
                AutoMlError::Engine(format!("Job {} not reported by the engine", job_key))
            })?;

            if let Some(outcome) = job_outcome(job_key, &status) {
                return outcome;
            }

            debug!(
                job = %job_key,
                progress = status.progress,
                message = status.progress_msg.as_deref().unwrap_or(""),
                "Engine job running"
            );
            tokio::time::sleep(self.config.poll_interval).await;
        }
    }

    async fn upload_frame(&self, csv: &[u8], key: &str) -> Result<String> {
        let mut url = self.url(&["3", "PostFile"])?;
        url.query_pairs_mut().append_pair("destination_frame", key);

        let part = multipart::Part::bytes(csv.to_vec()).file_name(key.to_string());
        let form = multipart::Form::new().part("file", part);

        let response: PostFileResponse =
            read_json(self.client.post(url).multipart(form).send().await?).await?;
        debug!(frame = %response.destination_frame, bytes = csv.len(), "Uploaded raw frame");
        Ok(response.destination_frame)
    }

    /// Parse an uploaded raw frame; `categorical` is forced to an enum column.
    async fn parse_frame(&self, raw_key: &str, destination: &str, categorical: Option<&str>) -> Result<()> {
        let source_frames = serde_json::to_string(&[raw_key])?;

        let setup: ParseSetupResponse = read_json(
            self.client
                .post(self.url(&["3", "ParseSetup"])?)
                .form(&[
                    ("source_frames", source_frames.clone()),
                    ("check_header", "1".to_string()),
                    ("separator", UPLOAD_SEPARATOR.to_string()),
                ])
                .send()
                .await?,
        )
        .await?;

        let column_names = setup.column_names.ok_or_else(|| {
            AutoMlError::Engine("Engine could not detect a header row".to_string())
        })?;
        let mut column_types = setup.column_types;

        if let Some(target) = categorical {
            let idx = column_names.iter().position(|c| c == target).ok_or_else(|| {
                AutoMlError::Validation(format!("Target column \"{}\" not found by the engine", target))
            })?;
            if let Some(kind) = column_types.get_mut(idx) {
                *kind = "Enum".to_string();
            }
        }

        let envelope: JobEnvelope = read_json(
            self.client
                .post(self.url(&["3", "Parse"])?)
                .form(&[
                    ("destination_frame", destination.to_string()),
                    ("source_frames", source_frames),
                    ("parse_type", setup.parse_type),
                    ("separator", setup.separator.to_string()),
                    ("number_columns", setup.number_columns.to_string()),
                    ("single_quotes", setup.single_quotes.to_string()),
                    ("column_names", serde_json::to_string(&column_names)?),
                    ("column_types", serde_json::to_string(&column_types)?),
                    ("check_header", setup.check_header.to_string()),
                    ("delete_on_done", "true".to_string()),
                    ("chunk_size", setup.chunk_size.to_string()),
                    ("blocking", "false".to_string()),
                ])
                .send()
                .await?,
        )
        .await?;

        self.wait_job(&envelope.job.key.name).await?;
        debug!(frame = %destination, columns = column_names.len(), "Parsed frame");
        Ok(())
    }

    async fn split_frame(&self, key: &str, ratio: f64, tag: &str) -> Result<(String, String)> {
        let train = format!("train_{}.hex", tag);
        let holdout = format!("holdout_{}.hex", tag);

        let response: SplitFrameResponse = read_json(
            self.client
                .post(self.url(&["3", "SplitFrame"])?)
                .form(&[
                    ("dataset", key.to_string()),
                    ("ratios", format!("[{}]", ratio)),
                    ("destination_frames", serde_json::to_string(&[&train, &holdout])?),
                ])
                .send()
                .await?,
        )
        .await?;

        self.wait_job(&response.key.name).await?;
        Ok((train, holdout))
    }

    async fn run_automl(&self, job: &TrainingJob, train: &str, holdout: &str, project: &str) -> Result<()> {
        let mut stopping = json!({ "max_runtime_secs": job.max_runtime_secs });
        if let Some(seed) = job.seed {
            stopping["seed"] = json!(seed);
        }

        let body = json!({
            "build_control": {
                "project_name": project,
                "stopping_criteria": stopping,
            },
            "input_spec": {
                "training_frame": train,
                "leaderboard_frame": holdout,
                "response_column": job.target_column,
                "sort_metric": job.sort_metric,
            },
            "build_models": {},
        });

        let envelope: JobEnvelope = read_json(
            self.client
                .post(self.url(&["99", "AutoMLBuilder"])?)
                .json(&body)
                .send()
                .await?,
        )
        .await?;

        info!(project = %project, job = %envelope.job.key.name, "AutoML build started");
        self.wait_job(&envelope.job.key.name).await
    }

    async fn leaderboard(&self, project: &str) -> Result<Vec<(String, ModelMetrics)>> {
        let response: LeaderboardResponse =
            read_json(self.client.get(self.url(&["99", "Leaderboards", project])?).send().await?).await?;
        leaderboard_rows(response)
    }

    async fn save_model(&self, model_id: &str, dir: &str) -> Result<String> {
        let mut url = self.url(&["99", "Models.bin", model_id])?;
        url.query_pairs_mut()
            .append_pair("dir", dir)
            .append_pair("force", "true");

        let response: ModelExportResponse = read_json(self.client.get(url).send().await?).await?;
        Ok(response.dir)
    }

    async fn load_model(&self, path: &str) -> Result<String> {
        let response: ModelImportResponse = read_json(
            self.client
                .post(self.url(&["99", "Models.bin", ""])?)
                .form(&[("dir", path)])
                .send()
                .await?,
        )
        .await?;

        response
            .models
            .into_iter()
            .next()
            .map(|m| m.model_id.name)
            .ok_or_else(|| AutoMlError::Engine(format!("No model loaded from {}", path)))
    }

    async fn score(&self, model_key: &str, frame: &str, destination: &str) -> Result<String> {
        let response: PredictionsResponse = read_json(
            self.client
                .post(self.url(&["3", "Predictions", "models", model_key, "frames", frame])?)
                .form(&[("predictions_frame", destination)])
                .send()
                .await?,
        )
        .await?;
        Ok(response.predictions_frame.name)
    }

    async fn download_frame(&self, key: &str) -> Result<Vec<u8>> {
        let mut url = self.url(&["3", "DownloadDataset"])?;
        url.query_pairs_mut()
            .append_pair("frame_id", key)
            .append_pair("hex_string", "false");

        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await?;
            return Err(AutoMlError::Engine(format!(
                "{} downloading {}: {}",
                status,
                key,
                error_message(&body)
            )));
        }
        Ok(response.bytes().await?.to_vec())
    }

    async fn delete_frames(&self, keys: &[&str]) {
        for key in keys {
            let result = match self.url(&["3", "Frames", key]) {
                Ok(url) => self.client.delete(url).send().await.map(|_| ()).map_err(AutoMlError::from),
                Err(e) => Err(e),
            };
            if let Err(e) = result {
                debug!(frame = %key, error = %e, "Frame cleanup failed");
            }
        }
    }

    async fn build_leaderboard(&self, job: &TrainingJob, tag: &str, raw: &str, data: &str) -> Result<Vec<LeaderboardEntry>> {
        self.upload_frame(&job.dataset, raw).await?;
        self.parse_frame(raw, data, Some(&job.target_column)).await?;

        let (train, holdout) = self.split_frame(data, job.split_ratio, tag).await?;
        let project = format!("automl_{}", tag);
        let built = self.run_automl(job, &train, &holdout, &project).await;
        self.delete_frames(&[train.as_str(), holdout.as_str()]).await;
        built?;

        let rows = self.leaderboard(&project).await?;
        info!(project = %project, models = rows.len(), "Leaderboard ready");

        let dir = job.artifact_dir.to_string_lossy().to_string();
        let mut entries = Vec::with_capacity(rows.len());
        for (model_id, metrics) in rows {
            let path = self.save_model(&model_id, &dir).await?;
            debug!(model_id = %model_id, path = %path, "Saved model binary");
            entries.push(LeaderboardEntry {
                model_id,
                metrics,
                artifact_path: Some(path),
            });
        }
        Ok(entries)
    }

    async fn score_upload(&self, model_key: &str, dataset: &[u8], raw: &str, frame: &str, out: &str) -> Result<Vec<Prediction>> {
        self.upload_frame(dataset, raw).await?;
        self.parse_frame(raw, frame, None).await?;
        let predictions_key = self.score(model_key, frame, out).await?;
        let csv = self.download_frame(&predictions_key).await?;
        parse_predictions(&csv)
    }
}

#[async_trait]
impl AutoMlEngine for H2oEngine {
    async fn health(&self) -> Result<EngineHealth> {
        let cloud: CloudResponse = read_json(self.client.get(self.url(&["3", "Cloud"])?).send().await?).await?;
        Ok(EngineHealth {
            engine: "h2o".to_string(),
            version: cloud.version,
            healthy: cloud.cloud_healthy,
            nodes: cloud.cloud_size,
        })
    }

    async fn train(&self, job: &TrainingJob) -> Result<Vec<LeaderboardEntry>> {
        let tag = Uuid::new_v4().simple().to_string();
        let raw = format!("upload_{}.csv", tag);
        let data = format!("data_{}.hex", tag);

        info!(
            target_column = %job.target_column,
            max_runtime_secs = job.max_runtime_secs,
            sort_metric = %job.sort_metric,
            "Starting AutoML run"
        );

        tokio::fs::create_dir_all(&job.artifact_dir).await?;
        let result = self.build_leaderboard(job, &tag, &raw, &data).await;
        self.delete_frames(&[raw.as_str(), data.as_str()]).await;
        result
    }

    async fn predict(&self, artifact_path: &str, dataset: &[u8]) -> Result<Vec<Prediction>> {
        let model_key = self.load_model(artifact_path).await?;

        let tag = Uuid::new_v4().simple().to_string();
        let raw = format!("score_upload_{}.csv", tag);
        let frame = format!("score_{}.hex", tag);
        let out = format!("predictions_{}", tag);

        let result = self.score_upload(&model_key, dataset, &raw, &frame, &out).await;
        self.delete_frames(&[raw.as_str(), frame.as_str(), out.as_str()]).await;
        if let Err(ref e) = result {
            warn!(model = %model_key, error = %e, "Scoring failed");
        }
        result
    }
}

// ----------------------------------------------------------------------------
// Helpers
// ----------------------------------------------------------------------------

fn endpoint(base_url: &str, segments: &[&str]) -> Result<Url> {
    let mut url = Url::parse(base_url)
        .map_err(|e| AutoMlError::Engine(format!("Invalid engine URL {}: {}", base_url, e)))?;
    url.path_segments_mut()
        .map_err(|_| AutoMlError::Engine(format!("Engine URL cannot be a base: {}", base_url)))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T> {
    let status = response.status();
    let path = response.url().path().to_string();
    let body = response.text().await?;

    if !status.is_success() {
        return Err(AutoMlError::Engine(format!(
            "{} {}: {}",
            status,
            path,
            error_message(&body)
        )));
    }
    Ok(serde_json::from_str(&body)?)
}

/// Pull the human readable message out of an H2O error body.
fn error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| {
            v.get("exception_msg")
                .or_else(|| v.get("msg"))
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.chars().take(500).collect())
}

fn job_outcome(job_key: &str, job: &JobStatus) -> Option<Result<()>> {
    match job.status.as_str() {
        "DONE" => Some(Ok(())),
        "FAILED" | "CANCELLED" => Some(Err(AutoMlError::EngineJob {
            job: job_key.to_string(),
            status: job.status.clone(),
            message: job
                .exception
                .clone()
                .unwrap_or_else(|| "no details reported".to_string()),
        })),
        _ => None,
    }
}

fn table_column<'a>(table: &'a TwoDimTable, name: &str) -> Option<&'a [Value]> {
    table
        .columns
        .iter()
        .position(|c| c.name == name)
        .and_then(|idx| table.data.get(idx))
        .map(Vec::as_slice)
}

fn metric_value(value: &Value) -> Option<f64> {
    let x = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse::<f64>().ok(),
        _ => None,
    }?;
    x.is_finite().then_some(x)
}

fn leaderboard_rows(response: LeaderboardResponse) -> Result<Vec<(String, ModelMetrics)>> {
    let Some(table) = response.table else {
        return Ok(response
            .models
            .into_iter()
            .map(|m| (m.name, ModelMetrics::default()))
            .collect());
    };

    let ids = table_column(&table, "model_id").ok_or_else(|| {
        AutoMlError::Engine("Leaderboard table has no model_id column".to_string())
    })?;
    let metric = |name: &str, row: usize| {
        table_column(&table, name)
            .and_then(|col| col.get(row))
            .and_then(metric_value)
    };

    ids.iter()
        .enumerate()
        .map(|(row, id)| {
            let model_id = id
                .as_str()
                .ok_or_else(|| AutoMlError::Engine(format!("Leaderboard row {} has no model id", row)))?
                .to_string();
            Ok((
                model_id,
                ModelMetrics {
                    auc: metric("auc", row),
                    logloss: metric("logloss", row),
                    aucpr: metric("aucpr", row),
                    mean_per_class_error: metric("mean_per_class_error", row),
                    rmse: metric("rmse", row),
                    mse: metric("mse", row),
                },
            ))
        })
        .collect()
}

/// Turn a downloaded predictions frame into one record per row.
fn parse_predictions(csv: &[u8]) -> Result<Vec<Prediction>> {
    let dataset = CsvDataset::from_bytes(csv, b',')?;
    let frame = dataset.frame();

    let labels = frame
        .column(PREDICT_COLUMN)?
        .as_materialized_series()
        .cast(&DataType::String)?;
    let labels = labels.str()?;

    let probabilities = dataset
        .columns()
        .into_iter()
        .filter(|c| c != PREDICT_COLUMN)
        .map(|name| -> Result<(String, Float64Chunked)> {
            let values = frame
                .column(&name)?
                .as_materialized_series()
                .cast(&DataType::Float64)?;
            Ok((name, values.f64()?.clone()))
        })
        .collect::<Result<Vec<_>>>()?;

    Ok((0..frame.height())
        .map(|row| Prediction {
            predict: labels.get(row).unwrap_or_default().to_string(),
            probabilities: probabilities
                .iter()
                .filter_map(|(name, values)| values.get(row).map(|p| (name.clone(), p)))
                .collect(),
        })
        .collect())
}
