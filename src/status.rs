//! Status normalization at the ingestion boundary.
//!
//! Providers hand us free-form status strings (or nothing at all). Every record
//! type stores one of the closed enums below instead, so the scorers never have
//! to deal with raw text. Unknown values map to an `Unrecognized` variant that
//! carries a neutral weight of 70: slightly better than "acceptable", never
//! confused with a confirmed-good reading.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use tracing::warn;

/// Weight given to any status value we could not recognize.
pub const UNRECOGNIZED_WEIGHT: u32 = 70;

/// Conversion from a raw provider status into a closed internal enumeration.
///
/// Implementations must be total: every input, including `None`, yields a value.
pub trait Normalize: Sized {
    fn normalize(raw: Option<&str>) -> Self;
}

/// Lowercases and trims a raw status, treating blank strings as missing.
fn clean(raw: Option<&str>) -> Option<String> {
    raw.map(|s| s.trim().to_ascii_lowercase())
        .filter(|s| !s.is_empty())
}

/// Deserialize a field, falling back to its default when the value has the
/// wrong shape.
///
/// Use with `#[serde(default, deserialize_with = "lenient")]` on loosely typed
/// provider rows, so one bad cell never drops the record around it.
pub fn lenient<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(T::deserialize(value).unwrap_or_else(|e| {
        warn!(error = %e, "Ignoring malformed field value");
        T::default()
    }))
}

/// Classification of a single water-test parameter reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", from = "Option<String>")]
pub enum ParameterStatus {
    Optimal,
    Acceptable,
    Warning,
    Danger,
    Critical,
    #[default]
    Unrecognized,
}

impl ParameterStatus {
    /// Contribution of this reading to the parameter score (0-100).
    pub fn weight(self) -> u32 {
        match self {
            ParameterStatus::Optimal => 100,
            ParameterStatus::Acceptable => 80,
            ParameterStatus::Warning => 50,
            ParameterStatus::Danger => 20,
            ParameterStatus::Critical => 0,
            ParameterStatus::Unrecognized => UNRECOGNIZED_WEIGHT,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ParameterStatus::Optimal => "optimal",
            ParameterStatus::Acceptable => "acceptable",
            ParameterStatus::Warning => "warning",
            ParameterStatus::Danger => "danger",
            ParameterStatus::Critical => "critical",
            ParameterStatus::Unrecognized => "unrecognized",
        }
    }
}

impl Normalize for ParameterStatus {
    fn normalize(raw: Option<&str>) -> Self {
        match clean(raw).as_deref() {
            Some("optimal") => ParameterStatus::Optimal,
            Some("acceptable") => ParameterStatus::Acceptable,
            Some("warning") => ParameterStatus::Warning,
            Some("danger") => ParameterStatus::Danger,
            Some("critical") => ParameterStatus::Critical,
            _ => ParameterStatus::Unrecognized,
        }
    }
}

impl From<Option<String>> for ParameterStatus {
    fn from(raw: Option<String>) -> Self {
        Self::normalize(raw.as_deref())
    }
}

/// Health of a livestock record (an individual or a group).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", from = "Option<String>")]
pub enum LivestockStatus {
    Healthy,
    Quarantine,
    Stressed,
    Sick,
    Deceased,
    #[default]
    Unrecognized,
}

impl LivestockStatus {
    /// Contribution of one animal in this state to the livestock score (0-100).
    pub fn weight(self) -> u32 {
        match self {
            LivestockStatus::Healthy => 100,
            LivestockStatus::Quarantine => 70,
            LivestockStatus::Stressed => 50,
            LivestockStatus::Sick => 25,
            LivestockStatus::Deceased => 0,
            LivestockStatus::Unrecognized => UNRECOGNIZED_WEIGHT,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LivestockStatus::Healthy => "healthy",
            LivestockStatus::Quarantine => "quarantine",
            LivestockStatus::Stressed => "stressed",
            LivestockStatus::Sick => "sick",
            LivestockStatus::Deceased => "deceased",
            LivestockStatus::Unrecognized => "unrecognized",
        }
    }
}

impl Normalize for LivestockStatus {
    fn normalize(raw: Option<&str>) -> Self {
        match clean(raw).as_deref() {
            Some("healthy") => LivestockStatus::Healthy,
            Some("quarantine") | Some("quarantined") => LivestockStatus::Quarantine,
            Some("stressed") => LivestockStatus::Stressed,
            Some("sick") => LivestockStatus::Sick,
            Some("deceased") | Some("dead") => LivestockStatus::Deceased,
            _ => LivestockStatus::Unrecognized,
        }
    }
}

impl From<Option<String>> for LivestockStatus {
    fn from(raw: Option<String>) -> Self {
        Self::normalize(raw.as_deref())
    }
}

/// Lifecycle state of a maintenance task.
///
/// Only `Pending` and `Completed` affect scoring; everything else (skipped,
/// in progress, cancelled...) counts toward the task total and nothing more.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", from = "Option<String>")]
pub enum TaskStatus {
    Pending,
    Completed,
    #[default]
    Other,
}

impl TaskStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Completed => "completed",
            TaskStatus::Other => "other",
        }
    }
}

impl Normalize for TaskStatus {
    fn normalize(raw: Option<&str>) -> Self {
        match clean(raw).as_deref() {
            Some("pending") => TaskStatus::Pending,
            Some("completed") | Some("complete") | Some("done") => TaskStatus::Completed,
            _ => TaskStatus::Other,
        }
    }
}

impl From<Option<String>> for TaskStatus {
    fn from(raw: Option<String>) -> Self {
        Self::normalize(raw.as_deref())
    }
}
