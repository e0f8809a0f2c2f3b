//! Fetch orchestration and result caching.
//!
//! For one water body the engine issues the four provider queries
//! concurrently, waits for all of them under a single timeout, and hands the
//! slices to the aggregator. A slice whose query failed is scored as empty; if
//! every query failed (or the join timed out) the result is `Unavailable`
//! rather than a misleading low score.
//!
//! # Usage
//!
//! ```ignore
//! let engine = HealthEngine::new(Arc::new(storage), Arc::new(SystemClock), EngineConfig::default());
//! let evaluation = engine.compute_health("tank-1").await;
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use tracing::{debug, error, info, instrument, warn};

use crate::aggregation::aggregate;
use crate::clock::Clock;
use crate::config::EngineConfig;
use crate::data_sources::{DataProvider, ProviderError};
use crate::model::{HealthInputs, HealthResult};
use crate::scoring::sort_newest_first;

/// A health result together with where it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub result: HealthResult,

    /// Evaluation instant the result was computed at. `None` for placeholders.
    pub computed_at: Option<DateTime<Utc>>,

    /// Whether the result was served from the cache.
    pub cached: bool,
}

#[derive(Debug, Clone)]
struct CachedResult {
    result: HealthResult,
    computed_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct ResultCache {
    /// Fresh results only. Stale entries are evicted when looked up and
    /// swept on every store, so the map never outgrows one TTL of traffic.
    entries: HashMap<String, CachedResult>,

    /// Bumped on every invalidation of any water body. A computation only
    /// stores its result if the generation it started under is still current.
    generation: u64,
}

/// Computes and caches health results per water body.
#[derive(Clone)]
pub struct HealthEngine {
    provider: Arc<dyn DataProvider>,
    clock: Arc<dyn Clock>,
    config: Arc<EngineConfig>,
    cache: Arc<Mutex<ResultCache>>,
}

impl HealthEngine {
    pub fn new(
        provider: Arc<dyn DataProvider>,
        clock: Arc<dyn Clock>,
        config: EngineConfig,
    ) -> Self {
        Self {
            provider,
            clock,
            config: Arc::new(config),
            cache: Arc::new(Mutex::new(ResultCache::default())),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Return the health of a water body, from cache when still fresh.
    #[instrument(skip(self))]
    pub async fn compute_health(&self, water_body_id: &str) -> Evaluation {
        let now = self.clock.now();
        if let Some(cached) = self.fresh_cached(water_body_id, now) {
            debug!(water_body_id, "Health cache hit");
            return cached;
        }

        debug!(water_body_id, "Health cache miss");
        self.refresh(water_body_id).await
    }

    /// Recompute unconditionally, re-fetching all four slices.
    pub async fn refresh(&self, water_body_id: &str) -> Evaluation {
        let generation = self.cache.lock().generation;
        let now = self.clock.now();

        let Some(inputs) = self.fetch_inputs(water_body_id, now).await else {
            return Evaluation {
                result: HealthResult::unavailable(),
                computed_at: Some(now),
                cached: false,
            };
        };

        let result = aggregate(inputs, now);
        info!(
            water_body_id,
            score = result.score,
            label = result.label.label(),
            alerts = result.alerts,
            overdue_tasks = result.overdue_tasks,
            "Health computed"
        );

        self.store(water_body_id, generation, &result, now);

        Evaluation {
            result,
            computed_at: Some(now),
            cached: false,
        }
    }

    /// The fresh cached result, or the loading placeholder. Never fetches.
    pub fn peek(&self, water_body_id: &str) -> Evaluation {
        let now = self.clock.now();
        self.fresh_cached(water_body_id, now)
            .unwrap_or_else(|| Evaluation {
                result: HealthResult::loading(),
                computed_at: None,
                cached: false,
            })
    }

    /// Drop the cached result for a water body, e.g. after a new test was
    /// logged. Computations already in flight will not repopulate the cache.
    pub fn invalidate(&self, water_body_id: &str) {
        let mut cache = self.cache.lock();
        cache.entries.remove(water_body_id);
        cache.generation += 1;
        debug!(water_body_id, generation = cache.generation, "Health cache invalidated");
    }

    fn is_fresh(&self, computed_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        (now - computed_at)
            .to_std()
            .is_ok_and(|age| age < self.config.cache_ttl)
    }

    fn fresh_cached(&self, water_body_id: &str, now: DateTime<Utc>) -> Option<Evaluation> {
        let mut cache = self.cache.lock();
        let cached = cache.entries.get(water_body_id)?;

        if !self.is_fresh(cached.computed_at, now) {
            cache.entries.remove(water_body_id);
            return None;
        }

        Some(Evaluation {
            result: cached.result.clone(),
            computed_at: Some(cached.computed_at),
            cached: true,
        })
    }

    fn store(
        &self,
        water_body_id: &str,
        generation: u64,
        result: &HealthResult,
        computed_at: DateTime<Utc>,
    ) {
        let mut cache = self.cache.lock();

        if cache.generation != generation {
            debug!(water_body_id, "Discarding result computed before invalidation");
            return;
        }

        cache
            .entries
            .retain(|_, cached| self.is_fresh(cached.computed_at, computed_at));

        let newer = cache
            .entries
            .get(water_body_id)
            .is_none_or(|existing| existing.computed_at <= computed_at);
        if newer {
            cache.entries.insert(
                water_body_id.to_string(),
                CachedResult {
                    result: result.clone(),
                    computed_at,
                },
            );
        }
    }

    /// Fan out the four queries and collect whatever succeeded.
    ///
    /// Returns `None` when nothing could be fetched.
    async fn fetch_inputs(&self, water_body_id: &str, now: DateTime<Utc>) -> Option<HealthInputs> {
        let since = now - Duration::days(self.config.window_days);
        let provider = self.provider.as_ref();

        let joined = tokio::time::timeout(self.config.fetch_timeout, async {
            tokio::join!(
                provider.fetch_recent_tests(water_body_id, since, self.config.max_tests),
                provider.fetch_livestock(water_body_id),
                provider.fetch_tasks_since(water_body_id, since),
                provider.fetch_active_alerts(water_body_id),
            )
        })
        .await;

        let Ok((tests_result, livestock_result, tasks_result, alerts_result)) = joined else {
            error!(
                water_body_id,
                provider = provider.name(),
                timeout_ms = self.config.fetch_timeout.as_millis() as u64,
                "Health data fetch timed out"
            );
            return None;
        };

        let mut failures = 0;
        let mut inputs = HealthInputs {
            tests: self.slice_or_empty(water_body_id, "tests", tests_result, &mut failures),
            livestock: self.slice_or_empty(water_body_id, "livestock", livestock_result, &mut failures),
            tasks: self.slice_or_empty(water_body_id, "tasks", tasks_result, &mut failures),
            alerts: self.slice_or_empty(water_body_id, "alerts", alerts_result, &mut failures),
        };

        if failures == 4 {
            error!(
                water_body_id,
                provider = provider.name(),
                "All health data sources failed"
            );
            return None;
        }

        // Providers are not trusted to honor the window, order or limit
        inputs.tests.retain(|t| t.test_date >= since);
        sort_newest_first(&mut inputs.tests);
        inputs.tests.truncate(self.config.max_tests);
        inputs.tasks.retain(|t| t.created_at >= since);
        inputs.alerts.retain(|a| !a.is_dismissed);

        Some(inputs)
    }

    fn slice_or_empty<T>(
        &self,
        water_body_id: &str,
        slice: &'static str,
        result: Result<Vec<T>, ProviderError>,
        failures: &mut usize,
    ) -> Vec<T> {
        match result {
            Ok(records) => records,
            Err(e) => {
                *failures += 1;
                warn!(
                    water_body_id,
                    slice,
                    provider = self.provider.name(),
                    error = %e,
                    "Failed to fetch health data, scoring slice as empty"
                );
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::model::{
        AlertRecord, HealthLabel, LivestockRecord, MaintenanceTaskRecord, ParameterReading,
        TrendDirection, WaterTestRecord,
    };
    use crate::status::{LivestockStatus, ParameterStatus, TaskStatus};
    use async_trait::async_trait;
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 15, 12, 0, 0).unwrap()
    }

    #[derive(Default)]
    struct StubProvider {
        inputs: HealthInputs,
        failing: Vec<&'static str>,
        delay: Option<std::time::Duration>,
        test_fetches: AtomicUsize,
    }

    impl StubProvider {
        fn with_inputs(inputs: HealthInputs) -> Self {
            Self {
                inputs,
                ..Default::default()
            }
        }

        async fn answer<T: Clone>(
            &self,
            slice: &str,
            records: &[T],
        ) -> Result<Vec<T>, ProviderError> {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if self.failing.iter().any(|failing| *failing == slice) {
                return Err(ProviderError::Decode(format!("{slice} unavailable")));
            }
            Ok(records.to_vec())
        }
    }

    #[async_trait]
    impl DataProvider for StubProvider {
        fn name(&self) -> &str {
            "stub"
        }

        async fn fetch_recent_tests(
            &self,
            _water_body_id: &str,
            _since: DateTime<Utc>,
            _limit: usize,
        ) -> Result<Vec<WaterTestRecord>, ProviderError> {
            self.test_fetches.fetch_add(1, Ordering::SeqCst);
            self.answer("tests", &self.inputs.tests).await
        }

        async fn fetch_livestock(
            &self,
            _water_body_id: &str,
        ) -> Result<Vec<LivestockRecord>, ProviderError> {
            self.answer("livestock", &self.inputs.livestock).await
        }

        async fn fetch_tasks_since(
            &self,
            _water_body_id: &str,
            _since: DateTime<Utc>,
        ) -> Result<Vec<MaintenanceTaskRecord>, ProviderError> {
            self.answer("tasks", &self.inputs.tasks).await
        }

        async fn fetch_active_alerts(
            &self,
            _water_body_id: &str,
        ) -> Result<Vec<AlertRecord>, ProviderError> {
            self.answer("alerts", &self.inputs.alerts).await
        }
    }

    fn engine_with(provider: StubProvider) -> (HealthEngine, Arc<StubProvider>, Arc<ManualClock>) {
        let provider = Arc::new(provider);
        let clock = Arc::new(ManualClock::new(start()));
        let engine = HealthEngine::new(provider.clone(), clock.clone(), EngineConfig::default());
        (engine, provider, clock)
    }

    fn water_test(days_ago: i64, statuses: &[ParameterStatus]) -> WaterTestRecord {
        WaterTestRecord {
            test_date: start() - Duration::days(days_ago),
            parameters: statuses.iter().copied().map(ParameterReading::new).collect(),
        }
    }

    #[tokio::test]
    async fn test_new_water_body() {
        let (engine, _, _) = engine_with(StubProvider::default());

        let evaluation = engine.compute_health("tank-1").await;

        assert!(!evaluation.cached);
        assert_eq!(evaluation.computed_at, Some(start()));
        assert_eq!(evaluation.result.score, 61);
        assert_eq!(evaluation.result.label, HealthLabel::Fair);
        assert!(evaluation.result.last_water_test.is_none());
    }

    #[tokio::test]
    async fn test_trend_from_three_tests() {
        let inputs = HealthInputs {
            tests: vec![
                water_test(10, &[ParameterStatus::Warning]),
                water_test(
                    0,
                    &[
                        ParameterStatus::Optimal,
                        ParameterStatus::Warning,
                        ParameterStatus::Warning,
                    ],
                ),
                water_test(5, &[ParameterStatus::Danger]),
            ],
            ..Default::default()
        };
        let (engine, _, _) = engine_with(StubProvider::with_inputs(inputs));

        let result = engine.compute_health("tank-1").await.result;

        assert_eq!(result.trend.direction, TrendDirection::Up);
        assert_eq!(result.trend.change, 20);
        assert_eq!(result.last_water_test, Some(start()));
    }

    #[tokio::test]
    async fn test_result_is_cached_until_stale() {
        let (engine, provider, clock) = engine_with(StubProvider::default());

        let first = engine.compute_health("tank-1").await;
        clock.advance(Duration::seconds(59));
        let second = engine.compute_health("tank-1").await;

        assert!(second.cached);
        assert_eq!(second.result, first.result);
        assert_eq!(second.computed_at, first.computed_at);
        assert_eq!(provider.test_fetches.load(Ordering::SeqCst), 1);

        clock.advance(Duration::seconds(1));
        let third = engine.compute_health("tank-1").await;

        assert!(!third.cached);
        assert_eq!(third.computed_at, Some(start() + Duration::seconds(60)));
        assert_eq!(provider.test_fetches.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_cache_is_per_water_body() {
        let (engine, provider, _) = engine_with(StubProvider::default());

        engine.compute_health("tank-1").await;
        let other = engine.compute_health("tank-2").await;

        assert!(!other.cached);
        assert_eq!(provider.test_fetches.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_invalidate_forces_recompute() {
        let (engine, provider, _) = engine_with(StubProvider::default());

        engine.compute_health("tank-1").await;
        engine.invalidate("tank-1");
        let evaluation = engine.compute_health("tank-1").await;

        assert!(!evaluation.cached);
        assert_eq!(provider.test_fetches.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_repeated_computation_is_identical() {
        let inputs = HealthInputs {
            tests: vec![water_test(2, &[ParameterStatus::Acceptable])],
            livestock: vec![LivestockRecord {
                health_status: LivestockStatus::Quarantine,
                quantity: 3,
            }],
            ..Default::default()
        };
        let (engine, _, _) = engine_with(StubProvider::with_inputs(inputs));

        let first = engine.refresh("tank-1").await;
        let second = engine.refresh("tank-1").await;

        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_failed_slice_is_scored_as_empty() {
        let inputs = HealthInputs {
            tests: vec![water_test(0, &[ParameterStatus::Optimal])],
            livestock: vec![LivestockRecord {
                health_status: LivestockStatus::Sick,
                quantity: 2,
            }],
            ..Default::default()
        };
        let (engine, _, _) = engine_with(StubProvider {
            failing: vec!["tests"],
            ..StubProvider::with_inputs(inputs)
        });

        let result = engine.compute_health("tank-1").await.result;
        let breakdown = result.breakdown.unwrap();

        assert!(result.is_authoritative());
        assert_eq!(breakdown.water_tests, 30);
        assert_eq!(breakdown.livestock_health, 25);
        assert!(result.last_water_test.is_none());
    }

    #[tokio::test]
    async fn test_total_failure_is_unavailable_and_not_cached() {
        let (engine, provider, _) = engine_with(StubProvider {
            failing: vec!["tests", "livestock", "tasks", "alerts"],
            ..Default::default()
        });

        let evaluation = engine.compute_health("tank-1").await;

        assert_eq!(evaluation.result.label, HealthLabel::Unavailable);
        assert!(!evaluation.result.is_authoritative());
        assert_eq!(engine.peek("tank-1").result.label, HealthLabel::Loading);

        engine.compute_health("tank-1").await;
        assert_eq!(provider.test_fetches.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_join_timeout_is_unavailable() {
        let provider = Arc::new(StubProvider {
            delay: Some(std::time::Duration::from_secs(5)),
            ..Default::default()
        });
        let config = EngineConfig {
            fetch_timeout: std::time::Duration::from_millis(50),
            ..Default::default()
        };
        let engine = HealthEngine::new(provider, Arc::new(ManualClock::new(start())), config);

        let evaluation = engine.compute_health("tank-1").await;

        assert_eq!(evaluation.result.label, HealthLabel::Unavailable);
    }

    #[tokio::test]
    async fn test_provider_output_is_windowed() {
        let mut tests: Vec<_> = (0..12)
            .map(|d| water_test(d, &[ParameterStatus::Optimal]))
            .collect();
        tests.push(water_test(45, &[ParameterStatus::Critical]));
        tests.reverse();

        let inputs = HealthInputs {
            tests,
            tasks: vec![MaintenanceTaskRecord {
                status: TaskStatus::Pending,
                due_date: Some((start() - Duration::days(40)).date_naive()),
                created_at: start() - Duration::days(50),
            }],
            alerts: vec![
                AlertRecord { is_dismissed: true },
                AlertRecord {
                    is_dismissed: false,
                },
            ],
            ..Default::default()
        };
        let (engine, _, _) = engine_with(StubProvider::with_inputs(inputs));

        let result = engine.compute_health("tank-1").await.result;
        let breakdown = result.breakdown.unwrap();

        assert_eq!(result.last_water_test, Some(start()));
        assert_eq!(result.overdue_tasks, 0);
        assert_eq!(result.alerts, 1);
        assert_eq!(breakdown.maintenance, 80);
        // Ten tests kept: frequency 100, no completed tasks 50
        assert_eq!(breakdown.care_consistency, 80);
    }

    #[tokio::test]
    async fn test_peek_never_fetches() {
        let (engine, provider, _) = engine_with(StubProvider::default());

        let placeholder = engine.peek("tank-1");
        assert_eq!(placeholder.result, HealthResult::loading());
        assert!(placeholder.computed_at.is_none());
        assert_eq!(provider.test_fetches.load(Ordering::SeqCst), 0);

        let computed = engine.compute_health("tank-1").await;
        let peeked = engine.peek("tank-1");
        assert!(peeked.cached);
        assert_eq!(peeked.result, computed.result);
    }

    #[tokio::test]
    async fn test_invalidation_during_fetch_discards_result() {
        let (engine, _, _) = engine_with(StubProvider {
            delay: Some(std::time::Duration::from_millis(200)),
            ..Default::default()
        });

        let background = engine.clone();
        let handle = tokio::spawn(async move { background.compute_health("tank-1").await });

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        engine.invalidate("tank-1");

        let evaluation = handle.await.unwrap();
        assert!(evaluation.result.is_authoritative());
        assert_eq!(engine.peek("tank-1").result.label, HealthLabel::Loading);
    }

    #[tokio::test]
    async fn test_cache_only_holds_fresh_results() {
        let (engine, _, clock) = engine_with(StubProvider::default());

        for i in 0..50 {
            engine.compute_health(&format!("tank-{i}")).await;
        }
        for i in 0..50 {
            engine.invalidate(&format!("unseen-{i}"));
        }
        assert_eq!(engine.cache.lock().entries.len(), 50);

        clock.advance(Duration::days(1));

        assert_eq!(engine.peek("tank-0").result.label, HealthLabel::Loading);
        assert_eq!(engine.cache.lock().entries.len(), 49);

        engine.compute_health("tank-new").await;
        let cache = engine.cache.lock();
        assert_eq!(cache.entries.len(), 1);
        assert!(cache.entries.contains_key("tank-new"));
    }

    #[tokio::test]
    async fn test_cancelled_computation_caches_nothing() {
        let (engine, _, _) = engine_with(StubProvider {
            delay: Some(std::time::Duration::from_millis(200)),
            ..Default::default()
        });

        let abandoned = tokio::time::timeout(
            std::time::Duration::from_millis(10),
            engine.compute_health("tank-1"),
        )
        .await;

        assert!(abandoned.is_err());
        assert_eq!(engine.peek("tank-1").result.label, HealthLabel::Loading);
    }
}
