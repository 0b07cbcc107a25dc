//! Application state management

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::engine::AutoMlEngine;
use crate::store::Store;

use super::ServerConfig;

/// Application state shared across handlers
pub struct AppState {
    pub config: ServerConfig,
    pub store: Store,
    pub engine: Arc<dyn AutoMlEngine>,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(config: ServerConfig, store: Store, engine: Arc<dyn AutoMlEngine>) -> Self {
        Self {
            config,
            store,
            engine,
            started_at: Utc::now(),
        }
    }

    pub fn uptime_secs(&self) -> i64 {
        Utc::now().signed_duration_since(self.started_at).num_seconds()
    }
}
