//! Shared fixtures: an in-process AutoML engine and multipart helpers

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use automl_rest::dataset::CsvDataset;
use automl_rest::engine::{AutoMlEngine, EngineHealth, H2oConfig, LeaderboardEntry, ModelMetrics, Prediction, TrainingJob};
use automl_rest::error::{AutoMlError, Result};
use automl_rest::server::{create_router, AppState, ServerConfig};
use automl_rest::store::Store;
use automl_rest::training::TrainingConfig;
use axum::body::Body;
use axum::http::{Request, Response};
use tempfile::TempDir;
use tokio::sync::Mutex;

pub const TRAIN_CSV: &str = "x1;x2;classe\n1.0;2.0;0\n3.0;4.0;1\n5.0;6.0;1\n";
pub const PREDICT_CSV: &str = "x1;x2\n1.5;2.5\n4.0;5.0\n";

const BOUNDARY: &str = "automl-rest-test-boundary";

/// Engine stand-in that returns a fixed leaderboard and scores every row alike
#[derive(Default)]
pub struct FakeEngine {
    pub model_ids: Vec<String>,
    pub fail_training: bool,
    pub fail_scoring: bool,
    pub trained: Mutex<Vec<TrainingJob>>,
    pub scored_with: Mutex<Vec<String>>,
}

impl FakeEngine {
    pub fn with_models(ids: &[&str]) -> Self {
        Self {
            model_ids: ids.iter().map(|id| id.to_string()).collect(),
            ..Default::default()
        }
    }

    pub fn failing_scoring(ids: &[&str]) -> Self {
        Self {
            fail_scoring: true,
            ..Self::with_models(ids)
        }
    }

    pub fn failing() -> Self {
        Self {
            fail_training: true,
            ..Default::default()
        }
    }
}

#[async_trait]
impl AutoMlEngine for FakeEngine {
    async fn health(&self) -> Result<EngineHealth> {
        Ok(EngineHealth {
            engine: "fake".to_string(),
            version: "0.0.0".to_string(),
            healthy: true,
            nodes: 1,
        })
    }

    async fn train(&self, job: &TrainingJob) -> Result<Vec<LeaderboardEntry>> {
        self.trained.lock().await.push(job.clone());
        if self.fail_training {
            return Err(AutoMlError::Engine("cluster unavailable".to_string()));
        }

        Ok(self
            .model_ids
            .iter()
            .enumerate()
            .map(|(i, id)| LeaderboardEntry {
                model_id: id.clone(),
                metrics: ModelMetrics {
                    auc: Some(0.95 - i as f64 * 0.05),
                    logloss: Some(0.2 + i as f64 * 0.05),
                    ..Default::default()
                },
                artifact_path: Some(job.artifact_dir.join(id).to_string_lossy().to_string()),
            })
            .collect())
    }

    async fn predict(&self, artifact_path: &str, dataset: &[u8]) -> Result<Vec<Prediction>> {
        self.scored_with.lock().await.push(artifact_path.to_string());
        if self.fail_scoring {
            return Err(AutoMlError::Engine("node 10.0.0.7 lost frame score_1.hex".to_string()));
        }
        let rows = CsvDataset::from_upload(dataset)?.rows();

        Ok((0..rows)
            .map(|_| Prediction {
                predict: "1".to_string(),
                probabilities: BTreeMap::from([("p0".to_string(), 0.25), ("p1".to_string(), 0.75)]),
            })
            .collect())
    }
}

pub fn test_config(media: &TempDir) -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        database_url: "sqlite::memory:".to_string(),
        max_upload_size: 10 * 1024 * 1024,
        cors_origin: None,
        training: TrainingConfig {
            media_root: media.path().to_path_buf(),
            ..Default::default()
        },
        engine: H2oConfig::default(),
    }
}

pub async fn test_app(engine: Arc<FakeEngine>) -> (axum::Router, Arc<AppState>, TempDir) {
    let media = TempDir::new().unwrap();
    let config = test_config(&media);
    app_with_config(engine, config, media).await
}

pub async fn app_with_config(
    engine: Arc<FakeEngine>,
    config: ServerConfig,
    media: TempDir,
) -> (axum::Router, Arc<AppState>, TempDir) {
    let store = Store::in_memory().await.unwrap();
    let state = Arc::new(AppState::new(config.clone(), store, engine));
    (create_router(state.clone(), &config), state, media)
}

/// Build a multipart/form-data request
pub fn multipart_request(uri: &str, fields: &[(&str, &str)], file: Option<(&str, &str)>) -> Request<Body> {
    let mut body = String::new();
    for (name, value) in fields {
        body.push_str(&format!(
            "--{}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
            BOUNDARY, name, value
        ));
    }
    if let Some((file_name, content)) = file {
        body.push_str(&format!(
            "--{}\r\nContent-Disposition: form-data; name=\"dataset\"; filename=\"{}\"\r\nContent-Type: text/csv\r\n\r\n{}\r\n",
            BOUNDARY, file_name, content
        ));
    }
    body.push_str(&format!("--{}--\r\n", BOUNDARY));

    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", format!("multipart/form-data; boundary={}", BOUNDARY))
        .body(Body::from(body))
        .unwrap()
}

pub fn get_request(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

pub async fn json_body(response: Response<Body>) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}
