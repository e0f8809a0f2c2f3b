//! Component scorers and the trend estimator.
//!
//! Every function here is pure: it sees one slice of records and the
//! evaluation time, and returns an integer in `[0, 100]`. All blends use
//! integer arithmetic with half-up rounding so scores are exact and stable
//! across platforms.

use chrono::{DateTime, Utc};
use tracing::error;

use crate::model::{
    LivestockRecord, MaintenanceTaskRecord, Trend, TrendDirection, WaterTestRecord,
};
use crate::status::TaskStatus;

/// Water-test score when nothing was tested in the window.
pub const NO_TESTS_SCORE: u8 = 30;

/// Livestock score for an empty (or zero-quantity) roster.
pub const NO_LIVESTOCK_SCORE: u8 = 100;

/// Maintenance score when no tasks were created in the window.
pub const NO_TASKS_SCORE: u8 = 80;

/// Points lost per overdue task.
pub const OVERDUE_TASK_PENALTY: u32 = 15;

/// Upper bound on the total overdue penalty.
pub const MAX_OVERDUE_PENALTY: u32 = 60;

/// Minimum number of tests before a trend is reported.
pub const MIN_TESTS_FOR_TREND: usize = 3;

/// Score difference (exclusive) below which the trend is stable.
pub const TREND_THRESHOLD: i32 = 5;

/// `round(num / den)` with halves rounded up. `den` must be non-zero.
fn round_ratio(num: u64, den: u64) -> u64 {
    (2 * num + den) / (2 * den)
}

/// Narrow a component score to `[0, 100]`. Every formula already stays in
/// range, so a clamp that fires is a defect and gets logged.
fn to_score(value: u64) -> u8 {
    if value > 100 {
        error!(value, "Component score out of range, clamping to 100");
        return 100;
    }
    value as u8
}

/// Sort tests newest-first. Provider ordering is never trusted.
pub fn sort_newest_first(tests: &mut [WaterTestRecord]) {
    tests.sort_by(|a, b| b.test_date.cmp(&a.test_date));
}

/// Step function on whole days since the last test.
///
/// Boundaries are inclusive: exactly 3 days is still 100, exactly 7 is 90,
/// exactly 14 is 75.
pub fn recency_score(days_since_test: i64) -> u32 {
    if days_since_test > 14 {
        50
    } else if days_since_test > 7 {
        75
    } else if days_since_test > 3 {
        90
    } else {
        100
    }
}

/// Score the water-test slice.
///
/// Blends the recency of the newest test (40%) with the mean status weight of
/// its parameters (60%). Parameters are weighted equally.
pub fn water_test_score(tests: &[WaterTestRecord], now: DateTime<Utc>) -> u8 {
    let Some(latest) = tests.iter().max_by_key(|t| t.test_date) else {
        return NO_TESTS_SCORE;
    };

    let days = (now - latest.test_date).num_days();
    let recency = u64::from(recency_score(days));

    if latest.parameters.is_empty() {
        // Recency-only data is worth 70% of its recency
        return to_score(round_ratio(recency * 70, 100));
    }

    let count = latest.parameters.len() as u64;
    let weight_sum: u64 = latest
        .parameters
        .iter()
        .map(|p| u64::from(p.status.weight()))
        .sum();

    // recency * 0.4 + (weight_sum / count) * 0.6
    let numerator = 40 * recency * count + 60 * weight_sum;
    to_score(round_ratio(numerator, 100 * count))
}

/// Quantity-weighted mean of livestock health.
pub fn livestock_score(livestock: &[LivestockRecord]) -> u8 {
    let total_quantity: u64 = livestock.iter().map(|l| u64::from(l.quantity)).sum();
    if total_quantity == 0 {
        return NO_LIVESTOCK_SCORE;
    }

    let weighted: u64 = livestock
        .iter()
        .map(|l| u64::from(l.health_status.weight()) * u64::from(l.quantity))
        .sum();

    to_score(round_ratio(weighted, total_quantity))
}

/// Penalty for a number of overdue tasks, capped.
pub fn overdue_penalty(overdue: usize) -> u32 {
    let overdue = u32::try_from(overdue).unwrap_or(u32::MAX);
    overdue
        .saturating_mul(OVERDUE_TASK_PENALTY)
        .min(MAX_OVERDUE_PENALTY)
}

/// Number of overdue tasks in a slice.
pub fn count_overdue(tasks: &[MaintenanceTaskRecord], now: DateTime<Utc>) -> usize {
    tasks.iter().filter(|t| t.is_overdue(now)).count()
}

fn count_completed(tasks: &[MaintenanceTaskRecord]) -> usize {
    tasks
        .iter()
        .filter(|t| t.status == TaskStatus::Completed)
        .count()
}

/// Completion rate minus the overdue penalty.
pub fn maintenance_score(tasks: &[MaintenanceTaskRecord], now: DateTime<Utc>) -> u8 {
    if tasks.is_empty() {
        return NO_TASKS_SCORE;
    }

    let total = tasks.len() as i64;
    let completed = count_completed(tasks) as i64;
    let penalty = i64::from(overdue_penalty(count_overdue(tasks, now)));

    // 100 * completed / total - penalty, kept over a common denominator
    let numerator = 100 * completed - penalty * total;
    if numerator <= 0 {
        return 0;
    }

    to_score(round_ratio(numerator as u64, total as u64))
}

/// Sub-score for how often water was tested in the window.
pub fn testing_frequency_score(test_count: usize) -> u32 {
    match test_count {
        8.. => 100,
        4..=7 => 85,
        2..=3 => 70,
        1 => 55,
        0 => 50,
    }
}

/// Sub-score for completed maintenance.
pub fn task_completion_score(completed: usize) -> u32 {
    let completed = u32::try_from(completed).unwrap_or(u32::MAX);
    completed.saturating_mul(10).saturating_add(50).min(100)
}

/// Care consistency: testing frequency (60%) and completed tasks (40%).
pub fn consistency_score(tests: &[WaterTestRecord], tasks: &[MaintenanceTaskRecord]) -> u8 {
    let testing = u64::from(testing_frequency_score(tests.len()));
    let completion = u64::from(task_completion_score(count_completed(tasks)));

    to_score(round_ratio(testing * 60 + completion * 40, 100))
}

/// Compare the water-test score of the two newest tests with the next two.
///
/// `tests` must already be sorted newest-first.
pub fn estimate_trend(tests: &[WaterTestRecord], now: DateTime<Utc>) -> Trend {
    if tests.len() < MIN_TESTS_FOR_TREND {
        return Trend::stable();
    }

    let recent = i32::from(water_test_score(&tests[..2], now));
    let older = i32::from(water_test_score(&tests[2..tests.len().min(4)], now));
    let delta = recent - older;

    if delta > TREND_THRESHOLD {
        Trend {
            direction: TrendDirection::Up,
            change: delta.unsigned_abs() as u8,
        }
    } else if delta < -TREND_THRESHOLD {
        Trend {
            direction: TrendDirection::Down,
            change: delta.unsigned_abs() as u8,
        }
    } else {
        Trend::stable()
    }
}
