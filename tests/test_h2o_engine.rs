//! Integration test: H2O REST call sequence against an in-process cluster stand-in

mod common;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use automl_rest::engine::{AutoMlEngine, H2oConfig, H2oEngine, TrainingJob};
use automl_rest::error::AutoMlError;
use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::routing::{delete, get, post};
use axum::{Form, Json, Router};
use serde_json::{json, Value};
use tempfile::TempDir;

use common::{PREDICT_CSV, TRAIN_CSV};

/// What the stand-in cluster saw, in arrival order
#[derive(Default)]
struct Cluster {
    fail_automl: bool,
    calls: Vec<&'static str>,
    parse_forms: Vec<HashMap<String, String>>,
    automl_bodies: Vec<Value>,
    polls: HashMap<String, usize>,
    loaded: Vec<String>,
    deleted: Vec<String>,
}

type Shared = Arc<Mutex<Cluster>>;

fn record(state: &Shared, call: &'static str) {
    state.lock().unwrap().calls.push(call);
}

async fn post_file(State(state): State<Shared>, Query(query): Query<HashMap<String, String>>, _body: Bytes) -> Json<Value> {
    record(&state, "POST /3/PostFile");
    Json(json!({ "destination_frame": query["destination_frame"] }))
}

async fn parse_setup(State(state): State<Shared>, Form(_form): Form<HashMap<String, String>>) -> Json<Value> {
    record(&state, "POST /3/ParseSetup");
    Json(json!({
        "parse_type": "CSV",
        "separator": 59,
        "number_columns": 3,
        "single_quotes": false,
        "column_names": ["x1", "x2", "classe"],
        "column_types": ["Numeric", "Numeric", "Numeric"],
        "check_header": 1,
        "chunk_size": 4194304,
    }))
}

async fn parse(State(state): State<Shared>, Form(form): Form<HashMap<String, String>>) -> Json<Value> {
    let mut cluster = state.lock().unwrap();
    cluster.calls.push("POST /3/Parse");
    cluster.parse_forms.push(form);
    Json(json!({ "job": { "key": { "name": "parse_job" } } }))
}

async fn split_frame(State(state): State<Shared>, Form(_form): Form<HashMap<String, String>>) -> Json<Value> {
    record(&state, "POST /3/SplitFrame");
    Json(json!({ "key": { "name": "split_job" } }))
}

async fn automl_builder(State(state): State<Shared>, Json(body): Json<Value>) -> Json<Value> {
    let mut cluster = state.lock().unwrap();
    cluster.calls.push("POST /99/AutoMLBuilder");
    cluster.automl_bodies.push(body);
    Json(json!({ "job": { "key": { "name": "automl_job" } } }))
}

/// Every job reports RUNNING on its first poll and DONE afterwards
async fn jobs(State(state): State<Shared>, Path(key): Path<String>) -> Json<Value> {
    let mut cluster = state.lock().unwrap();
    let polls = {
        let count = cluster.polls.entry(key.clone()).or_insert(0);
        *count += 1;
        *count
    };

    let job = if key == "automl_job" && cluster.fail_automl {
        json!({ "status": "FAILED", "progress": 0.3, "exception": "No models were trained" })
    } else if polls == 1 {
        json!({ "status": "RUNNING", "progress": 0.5, "progress_msg": "working" })
    } else {
        json!({ "status": "DONE", "progress": 1.0 })
    };
    Json(json!({ "jobs": [job] }))
}

async fn leaderboard(State(state): State<Shared>, Path(_project): Path<String>) -> Json<Value> {
    record(&state, "GET /99/Leaderboards");
    Json(json!({
        "models": [{ "name": "GBM_1" }, { "name": "GLM_1" }],
        "table": {
            "columns": [{ "name": "model_id" }, { "name": "auc" }, { "name": "logloss" }],
            "data": [["GBM_1", "GLM_1"], [0.91, 0.85], [0.30, 0.41]],
        },
    }))
}

async fn save_model(
    State(state): State<Shared>,
    Path(model_id): Path<String>,
    Query(query): Query<HashMap<String, String>>,
) -> Json<Value> {
    record(&state, "GET /99/Models.bin");
    Json(json!({ "dir": format!("{}/{}", query["dir"], model_id) }))
}

async fn load_model(State(state): State<Shared>, Form(form): Form<HashMap<String, String>>) -> Json<Value> {
    let mut cluster = state.lock().unwrap();
    cluster.calls.push("POST /99/Models.bin");
    cluster.loaded.push(form["dir"].clone());
    Json(json!({ "models": [{ "model_id": { "name": "GBM_1" } }] }))
}

async fn predictions(
    State(state): State<Shared>,
    Path((_model, _frame)): Path<(String, String)>,
    Form(form): Form<HashMap<String, String>>,
) -> Json<Value> {
    record(&state, "POST /3/Predictions");
    Json(json!({ "predictions_frame": { "name": form["predictions_frame"] } }))
}

async fn download(State(state): State<Shared>, Query(_query): Query<HashMap<String, String>>) -> &'static str {
    record(&state, "GET /3/DownloadDataset");
    "predict,p0,p1\n1,0.25,0.75\n0,0.9,0.1\n"
}

async fn delete_frame(State(state): State<Shared>, Path(key): Path<String>) -> Json<Value> {
    state.lock().unwrap().deleted.push(key);
    Json(json!({}))
}

async fn cloud() -> Json<Value> {
    Json(json!({ "version": "3.46.0.1", "cloud_healthy": true, "cloud_size": 3 }))
}

async fn start_cluster(fail_automl: bool) -> (H2oEngine, Shared) {
    let state: Shared = Arc::new(Mutex::new(Cluster {
        fail_automl,
        ..Default::default()
    }));

    let app = Router::new()
        .route("/3/Cloud", get(cloud))
        .route("/3/PostFile", post(post_file))
        .route("/3/ParseSetup", post(parse_setup))
        .route("/3/Parse", post(parse))
        .route("/3/SplitFrame", post(split_frame))
        .route("/3/Jobs/:key", get(jobs))
        .route("/3/Frames/:key", delete(delete_frame))
        .route("/3/Predictions/models/:model/frames/:frame", post(predictions))
        .route("/3/DownloadDataset", get(download))
        .route("/99/AutoMLBuilder", post(automl_builder))
        .route("/99/Leaderboards/:project", get(leaderboard))
        .route("/99/Models.bin/", post(load_model))
        .route("/99/Models.bin/:model_id", get(save_model))
        .with_state(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let engine = H2oEngine::new(H2oConfig {
        base_url: format!("http://{}", addr),
        poll_interval: Duration::from_millis(5),
        request_timeout: Duration::from_secs(10),
    })
    .unwrap();
    (engine, state)
}

fn training_job(artifacts: &TempDir) -> TrainingJob {
    TrainingJob {
        dataset: TRAIN_CSV.as_bytes().to_vec(),
        target_column: "classe".to_string(),
        max_runtime_secs: 30,
        sort_metric: "AUC".to_string(),
        split_ratio: 0.7,
        seed: Some(42),
        artifact_dir: artifacts.path().to_path_buf(),
    }
}

#[tokio::test]
async fn test_train_runs_full_call_sequence() {
    let (engine, state) = start_cluster(false).await;
    let artifacts = TempDir::new().unwrap();
    let dir = artifacts.path().to_string_lossy().to_string();

    let entries = engine.train(&training_job(&artifacts)).await.unwrap();

    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].model_id, "GBM_1");
    assert_eq!(entries[0].metrics.auc, Some(0.91));
    assert_eq!(entries[1].metrics.logloss, Some(0.41));
    assert_eq!(entries[0].artifact_path.as_deref(), Some(format!("{}/GBM_1", dir).as_str()));
    assert_eq!(entries[1].artifact_path.as_deref(), Some(format!("{}/GLM_1", dir).as_str()));

    let cluster = state.lock().unwrap();
    assert_eq!(
        cluster.calls,
        vec![
            "POST /3/PostFile",
            "POST /3/ParseSetup",
            "POST /3/Parse",
            "POST /3/SplitFrame",
            "POST /99/AutoMLBuilder",
            "GET /99/Leaderboards",
            "GET /99/Models.bin",
            "GET /99/Models.bin",
        ]
    );

    // Parse receives the setup guess with the target forced to a categorical
    let form = &cluster.parse_forms[0];
    assert_eq!(form["column_types"], r#"["Numeric","Numeric","Enum"]"#);
    assert_eq!(form["column_names"], r#"["x1","x2","classe"]"#);
    assert_eq!(form["separator"], "59");
    assert_eq!(form["chunk_size"], "4194304");

    let body = &cluster.automl_bodies[0];
    assert_eq!(body["input_spec"]["response_column"], "classe");
    assert_eq!(body["input_spec"]["sort_metric"], "AUC");
    assert!(body["input_spec"]["training_frame"].as_str().unwrap().starts_with("train_"));
    assert!(body["input_spec"]["leaderboard_frame"].as_str().unwrap().starts_with("holdout_"));
    assert_eq!(body["build_control"]["stopping_criteria"]["max_runtime_secs"], 30);
    assert_eq!(body["build_control"]["stopping_criteria"]["seed"], 42);

    // Jobs are polled past RUNNING until DONE
    assert_eq!(cluster.polls["parse_job"], 2);
    assert_eq!(cluster.polls["split_job"], 2);
    assert_eq!(cluster.polls["automl_job"], 2);

    assert_eq!(cluster.deleted.len(), 4);
    for prefix in ["train_", "holdout_", "upload_", "data_"] {
        assert!(cluster.deleted.iter().any(|k| k.starts_with(prefix)), "{} not deleted", prefix);
    }
}

#[tokio::test]
async fn test_failed_automl_job_surfaces_and_cleans_up() {
    let (engine, state) = start_cluster(true).await;
    let artifacts = TempDir::new().unwrap();

    let err = engine.train(&training_job(&artifacts)).await.unwrap_err();
    match err {
        AutoMlError::EngineJob { job, status, message } => {
            assert_eq!(job, "automl_job");
            assert_eq!(status, "FAILED");
            assert_eq!(message, "No models were trained");
        }
        other => panic!("expected engine job error, got {:?}", other),
    }

    let cluster = state.lock().unwrap();
    assert_eq!(cluster.polls["automl_job"], 1);
    assert!(!cluster.calls.contains(&"GET /99/Leaderboards"));
    assert!(!cluster.calls.contains(&"GET /99/Models.bin"));
    assert_eq!(cluster.deleted.len(), 4);
}

#[tokio::test]
async fn test_predict_loads_model_and_scores_upload() {
    let (engine, state) = start_cluster(false).await;

    let predictions = engine.predict("/srv/media/models/GBM_1", PREDICT_CSV.as_bytes()).await.unwrap();

    assert_eq!(predictions.len(), 2);
    assert_eq!(predictions[0].predict, "1");
    assert_eq!(predictions[0].probabilities["p1"], 0.75);
    assert_eq!(predictions[1].predict, "0");
    assert_eq!(predictions[1].probabilities["p0"], 0.9);

    let cluster = state.lock().unwrap();
    assert_eq!(cluster.loaded, vec!["/srv/media/models/GBM_1".to_string()]);
    assert_eq!(
        cluster.calls,
        vec![
            "POST /99/Models.bin",
            "POST /3/PostFile",
            "POST /3/ParseSetup",
            "POST /3/Parse",
            "POST /3/Predictions",
            "GET /3/DownloadDataset",
        ]
    );
    assert!(!cluster.parse_forms[0]["column_types"].contains("Enum"));

    assert_eq!(cluster.deleted.len(), 3);
    assert!(cluster.deleted.iter().any(|k| k.starts_with("predictions_")));
}

#[tokio::test]
async fn test_health_reads_cloud_status() {
    let (engine, _) = start_cluster(false).await;

    let health = engine.health().await.unwrap();
    assert_eq!(health.engine, "h2o");
    assert_eq!(health.version, "3.46.0.1");
    assert!(health.healthy);
    assert_eq!(health.nodes, 3);
}
