//! Relational persistence for training runs and their leaderboards

mod models;
mod repositories;

pub use models::{CreateTrainingRun, TrainedModel, TrainingRun, TrainingRunDetail};

use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use tracing::info;

use crate::error::Result;

/// Handle to the SQLite connection pool
#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Opens a connection pool and runs all pending migrations.
    ///
    /// File databases are created when missing. An in-memory URL gets a
    /// single connection that is never recycled, since every SQLite memory
    /// connection is its own database.
    ///
    /// # Errors
    ///
    /// Returns an error if connecting or migrating fails.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = if database_url.contains(":memory:") {
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect_with(options)
                .await?
        } else {
            SqlitePoolOptions::new()
                .max_connections(5)
                .connect_with(options)
                .await?
        };

        sqlx::migrate!("./migrations").run(&pool).await?;
        info!(database_url = %database_url, "Database ready");

        Ok(Self { pool })
    }

    /// Fresh in-memory database, used by tests and dry runs.
    pub async fn in_memory() -> Result<Self> {
        Self::connect("sqlite::memory:").await
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}
