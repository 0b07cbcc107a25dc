//! AutoML REST server
//!
//! Two primary endpoints sit in front of the AutoML engine: `POST /api/train`
//! uploads a labeled CSV and runs a search synchronously, `POST /api/predict`
//! scores a new CSV with a stored model. Runs and leaderboards can be read
//! back through `GET /api/runs` and `GET /api/models/:model_id`.

mod api;
mod error;
mod handlers;
mod state;

pub use api::create_router;
pub use error::ServerError;
pub use state::AppState;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::engine::{AutoMlEngine, H2oConfig, H2oEngine};
use crate::store::Store;
use crate::training::TrainingConfig;

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub max_upload_size: usize,
    /// Allowed CORS origin; `None` or `"*"` allows any
    pub cors_origin: Option<String>,
    pub training: TrainingConfig,
    pub engine: H2oConfig,
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Default for ServerConfig {
    fn default() -> Self {
        let training = TrainingConfig::default();
        let engine = H2oConfig::default();

        Self {
            host: std::env::var("API_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env_or("API_PORT", 8080),
            database_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite://automl.db".to_string()),
            max_upload_size: env_or("MAX_UPLOAD_SIZE", 100 * 1024 * 1024), // 100MB
            cors_origin: std::env::var("CORS_ORIGIN").ok().filter(|o| !o.is_empty()),
            training: TrainingConfig {
                media_root: std::env::var("MEDIA_ROOT")
                    .map(PathBuf::from)
                    .unwrap_or(training.media_root),
                min_runtime_secs: env_or("MIN_RUNTIME_SECS", training.min_runtime_secs),
                max_runtime_secs: env_or("MAX_RUNTIME_SECS", training.max_runtime_secs),
                sort_metric: std::env::var("H2O_SORT_METRIC").unwrap_or(training.sort_metric),
                split_ratio: env_or("H2O_SPLIT_RATIO", training.split_ratio),
                seed: std::env::var("H2O_SEED").ok().and_then(|s| s.parse().ok()),
            },
            engine: H2oConfig {
                base_url: std::env::var("H2O_URL").unwrap_or(engine.base_url),
                poll_interval: std::env::var("H2O_POLL_INTERVAL_MS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .map(Duration::from_millis)
                    .unwrap_or(engine.poll_interval),
                request_timeout: engine.request_timeout,
            },
        }
    }
}

/// Start the server with the given configuration
pub async fn run_server(config: ServerConfig) -> anyhow::Result<()> {
    let start_time = chrono::Utc::now();
    info!(
        media_root = %config.training.media_root.display(),
        database_url = %config.database_url,
        started_at = %start_time.to_rfc3339(),
        "Initializing server storage"
    );

    std::fs::create_dir_all(config.training.datasets_dir())?;
    std::fs::create_dir_all(config.training.models_dir())?;

    let store = Store::connect(&config.database_url).await?;
    let engine = H2oEngine::new(config.engine.clone())?;

    match engine.health().await {
        Ok(health) => info!(
            engine_url = %config.engine.base_url,
            version = %health.version,
            nodes = health.nodes,
            healthy = health.healthy,
            "AutoML engine reachable"
        ),
        Err(e) => warn!(
            engine_url = %config.engine.base_url,
            error = %e,
            "AutoML engine not reachable yet, train and predict will fail until it is"
        ),
    }

    let state = Arc::new(AppState::new(config.clone(), store, Arc::new(engine)));
    let app = create_router(state, &config);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!(
        host = %config.host,
        port = config.port,
        address = %addr,
        max_upload_size_mb = config.max_upload_size / 1024 / 1024,
        min_runtime_secs = config.training.min_runtime_secs,
        max_runtime_secs = config.training.max_runtime_secs,
        "AutoML REST server starting"
    );
    info!(url = %format!("http://{}/api", addr), "REST API available");
    info!(url = %format!("http://{}/api/health", addr), "Health endpoint available");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(address = %addr, pid = std::process::id(), "Server listening and ready to accept connections");

    let shutdown_signal = async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for ctrl+c, shutdown signal disabled");
            std::future::pending::<()>().await;
        }
        let stop_time = chrono::Utc::now();
        let uptime = stop_time.signed_duration_since(start_time);
        info!(
            stopped_at = %stop_time.to_rfc3339(),
            uptime_secs = uptime.num_seconds(),
            "Shutdown signal received, stopping server gracefully"
        );
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await?;

    info!("Server shut down cleanly");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert!(config.training.min_runtime_secs <= config.training.max_runtime_secs);
        assert!(config.training.split_ratio > 0.0 && config.training.split_ratio < 1.0);
        assert!(config.training.models_dir().starts_with(&config.training.media_root));
    }

    #[test]
    fn test_env_or_falls_back_on_unparsable_value() {
        std::env::set_var("AUTOML_REST_TEST_PORT", "not-a-port");
        assert_eq!(env_or("AUTOML_REST_TEST_PORT", 8080u16), 8080);
        std::env::set_var("AUTOML_REST_TEST_PORT", "9090");
        assert_eq!(env_or("AUTOML_REST_TEST_PORT", 8080u16), 9090);
    }
}
