//! SQLite storage layer for Aquahealth.
//!
//! Serves as the local [`DataProvider`]. Status columns are free text and are
//! normalized on the way out, and a cell holding a value of the wrong type is
//! read as missing, so rows written by older clients (or by hand) still score.
//! A row whose timestamp cannot be read is skipped. Timestamps are stored as
//! Unix seconds, due dates as `YYYY-MM-DD` text.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use sqlx::sqlite::{Sqlite, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{Decode, Row, Type};
use tracing::warn;

use crate::data_sources::{DataProvider, ProviderError};
use crate::model::{
    AlertRecord, LivestockRecord, MaintenanceTaskRecord, ParameterReading, WaterTestRecord,
};
use crate::status::{LivestockStatus, Normalize, ParameterStatus, TaskStatus};

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct Storage {
    pool: SqlitePool,
}

/// Read a nullable column, treating a value of the wrong type as missing.
fn loose<'r, T>(row: &'r SqliteRow, column: &str) -> Option<T>
where
    T: Decode<'r, Sqlite> + Type<Sqlite>,
{
    match row.try_get::<Option<T>, _>(column) {
        Ok(value) => value,
        Err(e) => {
            warn!(column, error = %e, "Ignoring malformed column value");
            None
        }
    }
}

/// Read a Unix-seconds column. `None` means the row cannot be placed in time.
fn loose_time(row: &SqliteRow, column: &str) -> Option<DateTime<Utc>> {
    let ts: i64 = loose(row, column)?;
    let time = Utc.timestamp_opt(ts, 0).single();
    if time.is_none() {
        warn!(column, ts, "Ignoring out-of-range timestamp");
    }
    time
}

impl Storage {
    /// Create a new storage instance and initialize the schema.
    ///
    /// # Arguments
    ///
    /// * `database_url` - SQLite connection string (e.g., "sqlite:aquahealth.db" or "sqlite::memory:")
    pub async fn new(database_url: &str) -> anyhow::Result<Self> {
        // Every connection to an in-memory database sees its own empty
        // database, so those are pinned to one connection that never expires.
        let options = if database_url.contains(":memory:") {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(5)
        };
        let pool = options.connect(database_url).await?;

        let storage = Self { pool };
        storage.initialize_schema().await?;

        Ok(storage)
    }

    /// Create the database schema if it doesn't exist.
    async fn initialize_schema(&self) -> anyhow::Result<()> {
        let statements = [
            r#"
            CREATE TABLE IF NOT EXISTS water_tests (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                water_body_id TEXT NOT NULL,
                test_date INTEGER NOT NULL
            )
            "#,
            r#"
            CREATE INDEX IF NOT EXISTS idx_water_tests_body_date
            ON water_tests(water_body_id, test_date)
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS test_parameters (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                test_id INTEGER NOT NULL REFERENCES water_tests(id),
                parameter TEXT,
                status TEXT
            )
            "#,
            r#"
            CREATE INDEX IF NOT EXISTS idx_test_parameters_test
            ON test_parameters(test_id)
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS livestock (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                water_body_id TEXT NOT NULL,
                health_status TEXT,
                quantity INTEGER
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS maintenance_tasks (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                water_body_id TEXT NOT NULL,
                status TEXT,
                due_date TEXT,
                created_at INTEGER NOT NULL
            )
            "#,
            r#"
            CREATE INDEX IF NOT EXISTS idx_maintenance_tasks_body_created
            ON maintenance_tasks(water_body_id, created_at)
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS alerts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                water_body_id TEXT NOT NULL,
                is_dismissed INTEGER NOT NULL DEFAULT 0
            )
            "#,
        ];

        for statement in statements {
            sqlx::query(statement).execute(&self.pool).await?;
        }

        Ok(())
    }

    /// Record a water test with its parameter readings.
    ///
    /// # Returns
    ///
    /// The id of the new test row.
    pub async fn insert_water_test(
        &self,
        water_body_id: &str,
        test: &WaterTestRecord,
    ) -> anyhow::Result<i64> {
        let mut tx = self.pool.begin().await?;

        let test_id = sqlx::query(
            r#"
            INSERT INTO water_tests (water_body_id, test_date)
            VALUES (?, ?)
            "#,
        )
        .bind(water_body_id)
        .bind(test.test_date.timestamp())
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();

        for reading in &test.parameters {
            sqlx::query(
                r#"
                INSERT INTO test_parameters (test_id, parameter, status)
                VALUES (?, ?, ?)
                "#,
            )
            .bind(test_id)
            .bind(reading.parameter.as_deref())
            .bind(reading.status.as_str())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(test_id)
    }

    /// Add a livestock entry.
    pub async fn insert_livestock(
        &self,
        water_body_id: &str,
        record: &LivestockRecord,
    ) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO livestock (water_body_id, health_status, quantity)
            VALUES (?, ?, ?)
            "#,
        )
        .bind(water_body_id)
        .bind(record.health_status.as_str())
        .bind(i64::from(record.quantity))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Add a maintenance task.
    pub async fn insert_task(
        &self,
        water_body_id: &str,
        task: &MaintenanceTaskRecord,
    ) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO maintenance_tasks (water_body_id, status, due_date, created_at)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(water_body_id)
        .bind(task.status.as_str())
        .bind(task.due_date.map(|d| d.format("%Y-%m-%d").to_string()))
        .bind(task.created_at.timestamp())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Add an alert.
    pub async fn insert_alert(
        &self,
        water_body_id: &str,
        alert: &AlertRecord,
    ) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO alerts (water_body_id, is_dismissed)
            VALUES (?, ?)
            "#,
        )
        .bind(water_body_id)
        .bind(alert.is_dismissed)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn fetch_parameters(&self, test_id: i64) -> Result<Vec<ParameterReading>, ProviderError> {
        let rows = sqlx::query(
            r#"
            SELECT parameter, status
            FROM test_parameters
            WHERE test_id = ?
            ORDER BY id
            "#,
        )
        .bind(test_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|r| {
                let status: Option<String> = loose(r, "status");
                ParameterReading {
                    parameter: loose(r, "parameter"),
                    status: ParameterStatus::normalize(status.as_deref()),
                }
            })
            .collect())
    }
}

#[async_trait]
impl DataProvider for Storage {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn fetch_recent_tests(
        &self,
        water_body_id: &str,
        since: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<WaterTestRecord>, ProviderError> {
        let rows = sqlx::query(
            r#"
            SELECT id, test_date
            FROM water_tests
            WHERE water_body_id = ? AND test_date >= ?
            ORDER BY test_date DESC
            LIMIT ?
            "#,
        )
        .bind(water_body_id)
        .bind(since.timestamp())
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;

        let mut tests = Vec::with_capacity(rows.len());
        for row in rows {
            let test_id: i64 = row.try_get("id")?;
            let Some(test_date) = loose_time(&row, "test_date") else {
                warn!(test_id, "Skipping water test without a usable date");
                continue;
            };
            tests.push(WaterTestRecord {
                test_date,
                parameters: self.fetch_parameters(test_id).await?,
            });
        }

        Ok(tests)
    }

    async fn fetch_livestock(
        &self,
        water_body_id: &str,
    ) -> Result<Vec<LivestockRecord>, ProviderError> {
        let rows = sqlx::query(
            r#"
            SELECT health_status, quantity
            FROM livestock
            WHERE water_body_id = ?
            "#,
        )
        .bind(water_body_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|r| {
                let status: Option<String> = loose(r, "health_status");
                LivestockRecord::from_row(
                    LivestockStatus::normalize(status.as_deref()),
                    loose(r, "quantity"),
                )
            })
            .collect())
    }

    async fn fetch_tasks_since(
        &self,
        water_body_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<MaintenanceTaskRecord>, ProviderError> {
        let rows = sqlx::query(
            r#"
            SELECT status, due_date, created_at
            FROM maintenance_tasks
            WHERE water_body_id = ? AND created_at >= ?
            "#,
        )
        .bind(water_body_id)
        .bind(since.timestamp())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .filter_map(|r| {
                let Some(created_at) = loose_time(r, "created_at") else {
                    warn!(water_body_id, "Skipping task without a usable creation time");
                    return None;
                };
                let status: Option<String> = loose(r, "status");
                let due_date: Option<String> = loose(r, "due_date");
                Some(MaintenanceTaskRecord {
                    status: TaskStatus::normalize(status.as_deref()),
                    due_date: due_date
                        .as_deref()
                        .and_then(MaintenanceTaskRecord::parse_due_date),
                    created_at,
                })
            })
            .collect())
    }

    async fn fetch_active_alerts(
        &self,
        water_body_id: &str,
    ) -> Result<Vec<AlertRecord>, ProviderError> {
        let rows = sqlx::query(
            r#"
            SELECT is_dismissed
            FROM alerts
            WHERE water_body_id = ? AND is_dismissed = 0
            "#,
        )
        .bind(water_body_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|r| AlertRecord {
                is_dismissed: loose(r, "is_dismissed").unwrap_or(false),
            })
            .collect())
    }
}
