//! Aggregation of component scores into a single health result.
//!
//! The aggregator is the last pure step: it receives the four raw slices for
//! one water body, runs the component scorers and the trend estimator, and
//! assembles the [`HealthResult`] shown to the user.

use chrono::{DateTime, Utc};
use tracing::error;

use crate::model::{HealthBreakdown, HealthInputs, HealthLabel, HealthResult};
use crate::scoring::{
    consistency_score, count_overdue, estimate_trend, livestock_score, maintenance_score,
    sort_newest_first, water_test_score,
};

/// Component weights in percent. They sum to 100.
pub const WATER_TESTS_WEIGHT: u32 = 40;
pub const LIVESTOCK_WEIGHT: u32 = 25;
pub const MAINTENANCE_WEIGHT: u32 = 20;
pub const CONSISTENCY_WEIGHT: u32 = 15;

/// Score every component from its slice.
///
/// `inputs.tests` must be sorted newest-first; [`aggregate`] takes care of that.
pub fn compute_breakdown(inputs: &HealthInputs, now: DateTime<Utc>) -> HealthBreakdown {
    HealthBreakdown {
        water_tests: water_test_score(&inputs.tests, now),
        livestock_health: livestock_score(&inputs.livestock),
        maintenance: maintenance_score(&inputs.tasks, now),
        care_consistency: consistency_score(&inputs.tests, &inputs.tasks),
    }
}

/// Weighted sum of the breakdown, rounded half-up.
pub fn weighted_score(breakdown: &HealthBreakdown) -> u8 {
    let sum = WATER_TESTS_WEIGHT * u32::from(breakdown.water_tests)
        + LIVESTOCK_WEIGHT * u32::from(breakdown.livestock_health)
        + MAINTENANCE_WEIGHT * u32::from(breakdown.maintenance)
        + CONSISTENCY_WEIGHT * u32::from(breakdown.care_consistency);

    let score = (sum + 50) / 100;

    // Components are bounded, so this only fires on a scoring defect
    if score > 100 {
        error!(
            score,
            ?breakdown,
            "Weighted health score out of range, clamping"
        );
        return 100;
    }

    score as u8
}

/// Compute the full health result for one water body.
///
/// # Arguments
///
/// * `inputs` - The four slices. Tests may arrive in any order.
/// * `now` - Evaluation time, used for recency and overdue checks
pub fn aggregate(mut inputs: HealthInputs, now: DateTime<Utc>) -> HealthResult {
    sort_newest_first(&mut inputs.tests);

    let breakdown = compute_breakdown(&inputs, now);
    let score = weighted_score(&breakdown);
    let label = HealthLabel::from_score(score);

    HealthResult {
        score,
        label,
        severity: label.severity(),
        breakdown: Some(breakdown),
        trend: estimate_trend(&inputs.tests, now),
        alerts: inputs.alerts.iter().filter(|a| !a.is_dismissed).count(),
        overdue_tasks: count_overdue(&inputs.tasks, now),
        last_water_test: inputs.tests.first().map(|t| t.test_date),
    }
}
