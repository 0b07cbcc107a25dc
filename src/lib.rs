//! AutoML REST - train AutoML leaderboards on uploaded CSV files and serve predictions
//!
//! Model search, ranking and scoring are delegated to an external AutoML
//! engine; this crate handles uploads, bookkeeping and the HTTP surface.
//!
//! # Modules
//!
//! - [`dataset`] - CSV parsing and feature-column schemas
//! - [`engine`] - AutoML engine interface and the H2O REST client
//! - [`store`] - Persistence of training runs and leaderboards
//! - [`training`] - Train flow
//! - [`inference`] - Predict flow
//! - [`server`] - HTTP server with REST API
//! - [`cli`] - Command-line interface

// Core error handling
pub mod error;

// Data and engine
pub mod dataset;
pub mod engine;
pub mod store;

// Flows
pub mod training;
pub mod inference;

// Services
pub mod server;
pub mod cli;

pub use error::{AutoMlError, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::dataset::{CsvDataset, FeatureSchema};
    pub use crate::engine::{AutoMlEngine, H2oConfig, H2oEngine, LeaderboardEntry, ModelMetrics, Prediction, TrainingJob};
    pub use crate::error::{AutoMlError, Result};
    pub use crate::inference::{PredictRequest, PredictionOutcome};
    pub use crate::store::{Store, TrainedModel, TrainingRun, TrainingRunDetail};
    pub use crate::training::{TrainRequest, TrainingConfig};
}
