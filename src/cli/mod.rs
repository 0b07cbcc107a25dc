//! Command-line interface
//!
//! `serve` starts the REST server; `train`, `predict` and `runs` run the same
//! flows directly against the database and the engine, without HTTP.

use clap::{Args, Parser, Subcommand};
use colored::*;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use crate::engine::{AutoMlEngine, H2oEngine};
use crate::inference::{self, PredictRequest};
use crate::server::{run_server, ServerConfig};
use crate::store::{Store, TrainedModel};
use crate::training::{self, TrainRequest};

// ─── Styling helpers ───────────────────────────────────────────────────────────

fn dim(s: &str) -> ColoredString   { s.truecolor(100, 100, 100) }
fn accent(s: &str) -> ColoredString { s.truecolor(120, 170, 255) }
fn muted(s: &str) -> ColoredString  { s.truecolor(140, 140, 140) }
fn ok(s: &str) -> ColoredString     { s.truecolor(100, 210, 120) }

fn kv(key: &str, val: &str) {
    println!("  {:<18} {}", muted(key), val.white());
}

fn step_run(msg: &str) {
    print!("  {} {}... ", accent("›"), msg);
}

fn step_done(detail: &str) {
    println!("{} {}", ok("done"), dim(detail));
}

fn section(title: &str) {
    println!();
    println!("  {}", title.white().bold());
    println!("  {}", dim(&"─".repeat(56)));
}

fn metric(value: Option<f64>) -> String {
    value.map(|v| format!("{:.6}", v)).unwrap_or_else(|| "-".to_string())
}

fn print_leaderboard(models: &[TrainedModel]) {
    println!(
        "  {:>4}  {:<48} {:>10} {:>10} {:>10}",
        muted("rank"),
        muted("model_id"),
        muted("auc"),
        muted("logloss"),
        muted("rmse")
    );
    for model in models {
        println!(
            "  {:>4}  {:<48} {:>10} {:>10} {:>10}",
            model.rank,
            model.model_id,
            metric(model.auc),
            metric(model.logloss),
            metric(model.rmse)
        );
    }
}

// ─── CLI definition ────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "automl-rest")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Train AutoML leaderboards on CSV uploads and serve predictions")]
#[command(long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Where runs are stored and which engine executes them
#[derive(Args, Debug, Clone)]
pub struct Backend {
    /// Database URL
    #[arg(long, env = "DATABASE_URL", default_value = "sqlite://automl.db")]
    pub database_url: String,

    /// H2O cluster URL
    #[arg(long, env = "H2O_URL", default_value = "http://localhost:54321")]
    pub engine_url: String,

    /// Directory for uploaded datasets and saved model binaries
    #[arg(long, env = "MEDIA_ROOT", default_value = "./media")]
    pub media_root: PathBuf,
}

impl Backend {
    /// Environment-derived configuration with the command line applied on top
    pub fn config(&self) -> ServerConfig {
        let mut config = ServerConfig::default();
        config.database_url = self.database_url.clone();
        config.engine.base_url = self.engine_url.clone();
        config.training.media_root = self.media_root.clone();
        config
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the REST server
    Serve {
        /// Server port
        #[arg(short, long, default_value = "8080")]
        port: u16,

        /// Server host
        #[arg(long, default_value = "0.0.0.0")]
        host: String,

        /// Allowed CORS origin; unset or "*" allows any
        #[arg(long, env = "CORS_ORIGIN")]
        cors_origin: Option<String>,

        #[command(flatten)]
        backend: Backend,
    },

    /// Run AutoML on a semicolon separated CSV and store the leaderboard
    Train {
        /// Input CSV file
        #[arg(short, long)]
        data: PathBuf,

        /// Target (dependent) column name
        #[arg(short, long)]
        target: String,

        /// Time budget in seconds
        #[arg(long, default_value = "60")]
        max_runtime_secs: u64,

        /// Leaderboard sort metric (defaults to the configured one)
        #[arg(long)]
        sort_metric: Option<String>,

        #[command(flatten)]
        backend: Backend,
    },

    /// Predict with a stored model (latest best model by default)
    Predict {
        /// Input CSV file
        #[arg(short, long)]
        data: PathBuf,

        /// Engine model identifier
        #[arg(short, long)]
        model_id: Option<String>,

        /// Write predictions as JSON to this file
        #[arg(short, long)]
        output: Option<PathBuf>,

        #[command(flatten)]
        backend: Backend,
    },

    /// List training runs, or show one run's leaderboard
    Runs {
        /// Show the leaderboard of this run
        #[arg(long)]
        run: Option<i64>,

        /// Maximum number of runs to list
        #[arg(long, default_value = "20")]
        limit: i64,

        #[command(flatten)]
        backend: Backend,
    },
}

// ─── Commands ──────────────────────────────────────────────────────────────────

async fn open_backend(config: &ServerConfig) -> anyhow::Result<(Store, Arc<dyn AutoMlEngine>)> {
    let store = Store::connect(&config.database_url).await?;
    let engine: Arc<dyn AutoMlEngine> = Arc::new(H2oEngine::new(config.engine.clone())?);
    Ok((store, engine))
}

pub async fn cmd_train(
    data_path: &PathBuf,
    target: &str,
    max_runtime_secs: u64,
    sort_metric: Option<String>,
    backend: &Backend,
) -> anyhow::Result<()> {
    section("Train");
    let config = backend.config();

    step_run("Reading data");
    let dataset = tokio::fs::read(data_path).await?;
    step_done(&format!("{} bytes", dataset.len()));

    let (store, engine) = open_backend(&config).await?;

    step_run(&format!("Running AutoML for up to {}s", max_runtime_secs.to_string().cyan()));
    let start = Instant::now();
    let request = TrainRequest {
        file_name: data_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "dataset.csv".to_string()),
        dataset,
        target_column: target.to_string(),
        max_runtime_secs,
        sort_metric,
    };
    let detail = training::train(&store, engine.as_ref(), &config.training, request).await?;
    step_done(&format!("{:?}", start.elapsed()));

    println!();
    kv("Run", &detail.run.id.to_string());
    kv("Target", &detail.run.target_column);
    kv("Features", detail.run.feature_columns.as_deref().unwrap_or("-"));
    println!();
    print_leaderboard(&detail.leaderboard);
    println!();

    Ok(())
}

pub async fn cmd_predict(
    data_path: &PathBuf,
    model_id: Option<String>,
    output: Option<&std::path::Path>,
    backend: &Backend,
) -> anyhow::Result<()> {
    section("Predict");
    let config = backend.config();

    let dataset = tokio::fs::read(data_path).await?;
    let (store, engine) = open_backend(&config).await?;

    step_run("Scoring");
    let start = Instant::now();
    let outcome = inference::predict(&store, engine.as_ref(), PredictRequest { model_id, dataset }).await?;
    step_done(&format!("{} rows in {:?}", outcome.predictions.len(), start.elapsed()));

    println!();
    kv("Model", &outcome.model.model_id);
    kv("Run", &outcome.run.id.to_string());
    println!();

    for prediction in outcome.predictions.iter().take(10) {
        let probs: Vec<String> = prediction
            .probabilities
            .iter()
            .map(|(class, p)| format!("{}={:.4}", class, p))
            .collect();
        println!("  {:<12} {}", prediction.predict.white().bold(), dim(&probs.join("  ")));
    }
    if outcome.predictions.len() > 10 {
        println!("  {}", dim(&format!("… {} more", outcome.predictions.len() - 10)));
    }

    if let Some(path) = output {
        let file = std::fs::File::create(path)?;
        serde_json::to_writer_pretty(file, &outcome.predictions)?;
        println!();
        println!("  {} {}", ok("✓"), format!("Saved → {}", path.display()));
    }
    println!();

    Ok(())
}

pub async fn cmd_runs(run_id: Option<i64>, limit: i64, backend: &Backend) -> anyhow::Result<()> {
    let config = backend.config();
    let store = Store::connect(&config.database_url).await?;

    if let Some(id) = run_id {
        let detail = store
            .run_detail(id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Training run {} not found", id))?;
        section(&format!("Run {}", detail.run.id));
        kv("Created", &detail.run.created_at.to_rfc3339());
        kv("Dataset", &detail.run.dataset_path);
        kv("Target", &detail.run.target_column);
        kv("Features", detail.run.feature_columns.as_deref().unwrap_or("-"));
        kv("Time budget", &format!("{}s", detail.run.max_runtime_secs));
        println!();
        print_leaderboard(&detail.leaderboard);
        println!();
        return Ok(());
    }

    section("Training runs");
    let runs = store.list_runs(limit.max(1)).await?;
    if runs.is_empty() {
        println!("  {}", dim("no runs yet"));
    }
    for run in runs {
        println!(
            "  {:>5}  {}  {:<30} {}",
            run.id.to_string().white().bold(),
            dim(&run.created_at.format("%Y-%m-%d %H:%M:%S").to_string()),
            run.target_column,
            muted(run.feature_columns.as_deref().unwrap_or("-"))
        );
    }
    println!();
    Ok(())
}

pub async fn cmd_serve(host: &str, port: u16, cors_origin: Option<String>, backend: &Backend) -> anyhow::Result<()> {
    let mut config = backend.config();
    config.host = host.to_string();
    config.port = port;
    if cors_origin.is_some() {
        config.cors_origin = cors_origin;
    }

    section(&format!("AutoML REST v{}", env!("CARGO_PKG_VERSION")));
    kv("API", &format!("http://{}:{}/api", host, port));
    kv("Health", &format!("http://{}:{}/api/health", host, port));
    kv("Engine", &config.engine.base_url);
    kv("Database", &config.database_url);
    println!("  {}", dim("ctrl+c to stop"));
    println!();

    run_server(config).await
}
