//! Hosted backend client.
//!
//! Talks to a PostgREST-style HTTP API where every table is exposed as
//! `GET /<table>?column=op.value&select=...`. Rows are decoded one at a time:
//! a cell of the wrong shape falls back to its neutral default, and only a row
//! that cannot be placed at all (no usable timestamp) is skipped. A backend
//! that adds columns or invents new status strings does not break scoring.
//!
//! # Tables Used
//!
//! - `water_tests` with an embedded `test_parameters` relation
//! - `livestock`
//! - `maintenance_tasks`
//! - `alerts`

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use super::{DataProvider, ProviderError};
use crate::model::{
    AlertRecord, LivestockRecord, MaintenanceTaskRecord, ParameterReading, WaterTestRecord,
};
use crate::status::{LivestockStatus, TaskStatus, lenient};

/// Client for the hosted records backend.
#[derive(Clone)]
pub struct RestProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl RestProvider {
    /// Create a client for the backend at `base_url`.
    ///
    /// When `api_key` is set it is sent both as the `apikey` header and as a
    /// bearer token.
    pub fn new(base_url: &str, api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        }
    }

    async fn get_rows<T: DeserializeOwned>(&self, path: &str) -> Result<Vec<T>, ProviderError> {
        let url = format!("{}/{}", self.base_url, path);
        debug!(url = %url, "Querying backend");

        let mut request = self.client.get(&url);
        if let Some(key) = &self.api_key {
            request = request.header("apikey", key).bearer_auth(key);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let rows: Vec<serde_json::Value> = response.json().await?;
        Ok(rows
            .into_iter()
            .filter_map(|row| match serde_json::from_value::<T>(row) {
                Ok(row) => Some(row),
                Err(e) => {
                    warn!(url = %url, error = %e, "Skipping malformed row");
                    None
                }
            })
            .collect())
    }
}

fn encode_time(time: DateTime<Utc>) -> String {
    urlencoding::encode(&time.to_rfc3339_opts(SecondsFormat::Secs, true)).into_owned()
}

#[derive(Debug, Deserialize)]
struct LivestockRow {
    #[serde(default, deserialize_with = "lenient")]
    health_status: LivestockStatus,
    #[serde(default, deserialize_with = "lenient")]
    quantity: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct TaskRow {
    #[serde(default, deserialize_with = "lenient")]
    status: TaskStatus,
    #[serde(default, deserialize_with = "lenient")]
    due_date: Option<String>,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct TestRow {
    test_date: DateTime<Utc>,
    #[serde(default, deserialize_with = "lenient")]
    parameters: Option<Vec<ParameterReading>>,
}

#[async_trait]
impl DataProvider for RestProvider {
    fn name(&self) -> &str {
        "rest"
    }

    async fn fetch_recent_tests(
        &self,
        water_body_id: &str,
        since: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<WaterTestRecord>, ProviderError> {
        let path = format!(
            "water_tests?select=test_date,parameters:test_parameters(parameter,status)\
             &water_body_id=eq.{}&test_date=gte.{}&order=test_date.desc&limit={}",
            urlencoding::encode(water_body_id),
            encode_time(since),
            limit
        );

        let rows: Vec<TestRow> = self.get_rows(&path).await?;
        Ok(rows
            .into_iter()
            .map(|row| WaterTestRecord {
                test_date: row.test_date,
                parameters: row.parameters.unwrap_or_default(),
            })
            .collect())
    }

    async fn fetch_livestock(
        &self,
        water_body_id: &str,
    ) -> Result<Vec<LivestockRecord>, ProviderError> {
        let path = format!(
            "livestock?select=health_status,quantity&water_body_id=eq.{}",
            urlencoding::encode(water_body_id)
        );

        let rows: Vec<LivestockRow> = self.get_rows(&path).await?;
        Ok(rows
            .into_iter()
            .map(|row| LivestockRecord::from_row(row.health_status, row.quantity))
            .collect())
    }

    async fn fetch_tasks_since(
        &self,
        water_body_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<MaintenanceTaskRecord>, ProviderError> {
        let path = format!(
            "maintenance_tasks?select=status,due_date,created_at\
             &water_body_id=eq.{}&created_at=gte.{}",
            urlencoding::encode(water_body_id),
            encode_time(since)
        );

        let rows: Vec<TaskRow> = self.get_rows(&path).await?;
        Ok(rows
            .into_iter()
            .map(|row| MaintenanceTaskRecord {
                status: row.status,
                due_date: row
                    .due_date
                    .as_deref()
                    .and_then(MaintenanceTaskRecord::parse_due_date),
                created_at: row.created_at,
            })
            .collect())
    }

    async fn fetch_active_alerts(
        &self,
        water_body_id: &str,
    ) -> Result<Vec<AlertRecord>, ProviderError> {
        let path = format!(
            "alerts?select=is_dismissed&water_body_id=eq.{}&is_dismissed=eq.false",
            urlencoding::encode(water_body_id)
        );

        self.get_rows(&path).await
    }
}
