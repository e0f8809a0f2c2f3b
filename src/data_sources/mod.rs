//! Data providers feeding the health engine.
//!
//! The engine only reads. A provider answers four independent questions about
//! one water body; each call may fail on its own without affecting the others.
//!
//! # Implementations
//!
//! - [`crate::storage::Storage`]: local SQLite database
//! - [`rest`]: hosted backend exposing a PostgREST-style HTTP API

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::model::{AlertRecord, LivestockRecord, MaintenanceTaskRecord, WaterTestRecord};

pub mod rest;

pub use rest::RestProvider;

/// Failure of a single provider call.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("backend returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("malformed record: {0}")]
    Decode(String),
}

/// Read-side contract between the engine and wherever records live.
#[async_trait]
pub trait DataProvider: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Most recent tests taken at or after `since`, at most `limit` of them.
    async fn fetch_recent_tests(
        &self,
        water_body_id: &str,
        since: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<WaterTestRecord>, ProviderError>;

    /// Current livestock roster.
    async fn fetch_livestock(
        &self,
        water_body_id: &str,
    ) -> Result<Vec<LivestockRecord>, ProviderError>;

    /// Maintenance tasks created at or after `since`.
    async fn fetch_tasks_since(
        &self,
        water_body_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<MaintenanceTaskRecord>, ProviderError>;

    /// Alerts that have not been dismissed.
    async fn fetch_active_alerts(
        &self,
        water_body_id: &str,
    ) -> Result<Vec<AlertRecord>, ProviderError>;
}
