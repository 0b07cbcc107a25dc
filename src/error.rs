//! Error types shared by the dataset, engine, store and flow modules

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AutoMlError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] polars::prelude::PolarsError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Engine request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Engine error: {0}")]
    Engine(String),

    #[error("Engine job {job} ended with status {status}: {message}")]
    EngineJob {
        job: String,
        status: String,
        message: String,
    },

    #[error(
        "Prediction file layout mismatch: this model requires the columns \"{}\", but the file has the columns \"{}\"",
        expected.join(","),
        received.join(",")
    )]
    SchemaMismatch {
        expected: Vec<String>,
        received: Vec<String>,
    },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    Validation(String),
}

impl AutoMlError {
    /// True for errors caused by the caller's input rather than the engine or storage.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            AutoMlError::Validation(_)
                | AutoMlError::SchemaMismatch { .. }
                | AutoMlError::NotFound(_)
                | AutoMlError::Csv(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, AutoMlError>;
