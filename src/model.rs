//! Data models for Aquahealth.
//!
//! Source records are scoped to one water body and read-only from the engine's
//! point of view. Status fields are already normalized (see [`crate::status`]),
//! so a record that made it into one of these types can always be scored.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::status::{LivestockStatus, ParameterStatus, TaskStatus, lenient};

/// A logged water test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaterTestRecord {
    /// When the test was taken (UTC).
    pub test_date: DateTime<Utc>,

    /// Individual parameter results. May be empty when only the fact of
    /// testing was recorded.
    #[serde(default)]
    pub parameters: Vec<ParameterReading>,
}

/// One parameter result inside a water test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterReading {
    /// Parameter name such as "ammonia" or "ph". Informational only; every
    /// parameter carries the same weight.
    #[serde(default, deserialize_with = "lenient")]
    pub parameter: Option<String>,

    #[serde(default, deserialize_with = "lenient")]
    pub status: ParameterStatus,
}

impl ParameterReading {
    pub fn new(status: ParameterStatus) -> Self {
        Self {
            parameter: None,
            status,
        }
    }
}

/// A livestock entry: one animal or a group of the same species.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LivestockRecord {
    #[serde(default, deserialize_with = "lenient")]
    pub health_status: LivestockStatus,

    /// Number of animals this record represents.
    #[serde(default = "default_quantity")]
    pub quantity: u32,
}

fn default_quantity() -> u32 {
    1
}

impl LivestockRecord {
    /// Build a record from a loosely typed provider row.
    ///
    /// A missing quantity counts as one animal; a negative one is a data
    /// defect and is treated as zero.
    pub fn from_row(health_status: LivestockStatus, quantity: Option<i64>) -> Self {
        let quantity = match quantity {
            None => default_quantity(),
            Some(q) if q < 0 => {
                warn!(quantity = q, "Negative livestock quantity, treating as zero");
                0
            }
            Some(q) => u32::try_from(q).unwrap_or(u32::MAX),
        };

        Self {
            health_status,
            quantity,
        }
    }
}

/// A scheduled maintenance task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaintenanceTaskRecord {
    #[serde(default)]
    pub status: TaskStatus,

    /// Calendar day the task is due, if it has one.
    #[serde(default)]
    pub due_date: Option<NaiveDate>,

    pub created_at: DateTime<Utc>,
}

impl MaintenanceTaskRecord {
    /// Parse a due date stored either as `YYYY-MM-DD` or as a full RFC 3339
    /// timestamp. Anything else is logged and dropped.
    pub fn parse_due_date(raw: &str) -> Option<NaiveDate> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }

        NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .ok()
            .or_else(|| {
                DateTime::parse_from_rfc3339(raw)
                    .ok()
                    .map(|dt| dt.with_timezone(&Utc).date_naive())
            })
            .or_else(|| {
                warn!(due_date = %raw, "Unparseable task due date, ignoring");
                None
            })
    }

    /// A pending task whose due date lies before the evaluation day.
    ///
    /// Shared by the maintenance scorer and the overdue counter so both use
    /// the same predicate.
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.status == TaskStatus::Pending
            && self
                .due_date
                .is_some_and(|due| due < now.date_naive())
    }
}

/// A user-facing alert. Only whether it was dismissed matters here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRecord {
    #[serde(default, deserialize_with = "lenient")]
    pub is_dismissed: bool,
}

/// The four raw slices gathered for one water body.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HealthInputs {
    pub tests: Vec<WaterTestRecord>,
    pub livestock: Vec<LivestockRecord>,
    pub tasks: Vec<MaintenanceTaskRecord>,
    pub alerts: Vec<AlertRecord>,
}

/// Per-component scores shown next to the overall score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthBreakdown {
    pub water_tests: u8,
    pub livestock_health: u8,
    pub maintenance: u8,
    pub care_consistency: u8,
}

/// Qualitative label for an overall score.
///
/// `Loading` and `Unavailable` are not derived from a score; they mark results
/// that must not be read as a real measurement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HealthLabel {
    Excellent,
    Good,
    Fair,
    #[serde(rename = "Needs Attention")]
    NeedsAttention,
    Critical,
    Loading,
    Unavailable,
}

impl HealthLabel {
    /// Map a 0-100 score onto its label. Lower bounds are inclusive.
    pub fn from_score(score: u8) -> Self {
        match score {
            90.. => HealthLabel::Excellent,
            75..=89 => HealthLabel::Good,
            50..=74 => HealthLabel::Fair,
            25..=49 => HealthLabel::NeedsAttention,
            _ => HealthLabel::Critical,
        }
    }

    /// Severity band used for coloring and notification decisions.
    pub fn severity(self) -> Option<Severity> {
        match self {
            HealthLabel::Excellent | HealthLabel::Good => Some(Severity::Healthy),
            HealthLabel::Fair => Some(Severity::Watch),
            HealthLabel::NeedsAttention => Some(Severity::Warning),
            HealthLabel::Critical => Some(Severity::Critical),
            HealthLabel::Loading | HealthLabel::Unavailable => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            HealthLabel::Excellent => "Excellent",
            HealthLabel::Good => "Good",
            HealthLabel::Fair => "Fair",
            HealthLabel::NeedsAttention => "Needs Attention",
            HealthLabel::Critical => "Critical",
            HealthLabel::Loading => "Loading",
            HealthLabel::Unavailable => "Unavailable",
        }
    }
}

/// Severity bands, ordered from best to worst.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Healthy,
    Watch,
    Warning,
    Critical,
}

/// Direction of the short-term water-test trend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    Up,
    Down,
    Stable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trend {
    pub direction: TrendDirection,

    /// Size of the move in score points. Zero when stable.
    pub change: u8,
}

impl Trend {
    pub fn stable() -> Self {
        Self {
            direction: TrendDirection::Stable,
            change: 0,
        }
    }
}

/// The engine's output for one water body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResult {
    pub score: u8,
    pub label: HealthLabel,
    pub severity: Option<Severity>,

    /// Always present on computed results; `None` only for loading/unavailable.
    pub breakdown: Option<HealthBreakdown>,
    pub trend: Trend,

    /// Non-dismissed alerts.
    pub alerts: usize,
    pub overdue_tasks: usize,

    /// Timestamp of the newest test in the window.
    pub last_water_test: Option<DateTime<Utc>>,
}

impl HealthResult {
    /// Placeholder emitted while data is still being fetched.
    pub fn loading() -> Self {
        Self::placeholder(HealthLabel::Loading)
    }

    /// Result for a water body whose data could not be fetched at all.
    pub fn unavailable() -> Self {
        Self::placeholder(HealthLabel::Unavailable)
    }

    fn placeholder(label: HealthLabel) -> Self {
        Self {
            score: 0,
            label,
            severity: None,
            breakdown: None,
            trend: Trend::stable(),
            alerts: 0,
            overdue_tasks: 0,
            last_water_test: None,
        }
    }

    /// Whether the score reflects fetched data. Callers must not present a
    /// non-authoritative result as "score 0 / Critical".
    pub fn is_authoritative(&self) -> bool {
        !matches!(self.label, HealthLabel::Loading | HealthLabel::Unavailable)
    }
}

/// Response for the health endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub water_body_id: String,

    /// Evaluation time the result was computed at. `None` for a loading placeholder.
    pub computed_at: Option<DateTime<Utc>>,

    /// Whether the result came from the cache.
    pub cached: bool,

    pub health: HealthResult,
}
