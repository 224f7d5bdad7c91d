//! Named metrics collectors.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dashmap::DashMap;

use crate::clock::{SharedClock, SystemClock};
use crate::config::ApiKind;
use crate::metrics::{MetricsCollector, MonitoringReport};

/// Name of the collector that sees every call.
pub const GLOBAL_COLLECTOR: &str = "global";

/// Registry of named [`MetricsCollector`]s.
///
/// The `"global"`, `"rest"` and `"graphql"` collectors always exist. Every
/// collector shares the registry's enabled switch, so
/// [`disable`](Self::disable) silences all of them at once without
/// discarding what they have already counted.
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
/// use shopify_pipeline::metrics::MetricsRegistry;
///
/// let registry = MetricsRegistry::new();
/// registry.get_or_create("bulk").record_success(Duration::from_millis(5));
///
/// let report = registry.report();
/// assert_eq!(report.custom["bulk"].successful_requests, 1);
/// ```
#[derive(Debug)]
pub struct MetricsRegistry {
    collectors: DashMap<String, Arc<MetricsCollector>>,
    enabled: Arc<AtomicBool>,
    clock: SharedClock,
}

impl MetricsRegistry {
    /// Creates an enabled registry driven by real time.
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(SystemClock::shared())
    }

    /// Creates an enabled registry driven by `clock`.
    #[must_use]
    pub fn with_clock(clock: SharedClock) -> Self {
        let registry = Self {
            collectors: DashMap::new(),
            enabled: Arc::new(AtomicBool::new(true)),
            clock,
        };
        for name in [GLOBAL_COLLECTOR, ApiKind::Rest.name(), ApiKind::GraphQL.name()] {
            registry.get_or_create(name);
        }
        registry
    }

    /// Returns the collector named `name`, creating it if needed.
    pub fn get_or_create(&self, name: &str) -> Arc<MetricsCollector> {
        if let Some(existing) = self.collectors.get(name) {
            return Arc::clone(existing.value());
        }
        let collector = self
            .collectors
            .entry(name.to_string())
            .or_insert_with(|| {
                Arc::new(MetricsCollector::with_switch(
                    name,
                    Arc::clone(&self.clock),
                    Arc::clone(&self.enabled),
                ))
            });
        Arc::clone(collector.value())
    }

    /// Returns the collector named `name`, if it exists.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<MetricsCollector>> {
        self.collectors.get(name).map(|entry| Arc::clone(entry.value()))
    }

    /// Returns the collector that sees every call.
    #[must_use]
    pub fn global(&self) -> Arc<MetricsCollector> {
        self.get_or_create(GLOBAL_COLLECTOR)
    }

    /// Returns the collector for `api`.
    #[must_use]
    pub fn for_api(&self, api: ApiKind) -> Arc<MetricsCollector> {
        self.get_or_create(api.name())
    }

    /// Resets the collector named `name`.
    ///
    /// Returns `false` if no such collector exists. Other collectors are
    /// untouched.
    pub fn reset(&self, name: &str) -> bool {
        let Some(collector) = self.get(name) else {
            return false;
        };
        collector.reset();
        tracing::debug!(collector = name, "Reset metrics collector");
        true
    }

    /// Resets every collector.
    pub fn reset_all(&self) {
        for entry in &self.collectors {
            entry.value().reset();
        }
        tracing::info!(count = self.collectors.len(), "Reset all metrics collectors");
    }

    /// Resumes recording.
    pub fn enable(&self) {
        self.enabled.store(true, Ordering::Relaxed);
    }

    /// Stops recording. Existing counts are kept.
    pub fn disable(&self) {
        self.enabled.store(false, Ordering::Relaxed);
    }

    /// Whether recording is enabled.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    /// Snapshots every collector.
    #[must_use]
    pub fn report(&self) -> MonitoringReport {
        let builtin = [GLOBAL_COLLECTOR, ApiKind::Rest.name(), ApiKind::GraphQL.name()];
        let custom: BTreeMap<_, _> = self
            .collectors
            .iter()
            .filter(|entry| !builtin.contains(&entry.key().as_str()))
            .map(|entry| (entry.key().clone(), entry.value().snapshot()))
            .collect();

        MonitoringReport {
            timestamp: self.clock.now(),
            enabled: self.is_enabled(),
            global: self.global().snapshot(),
            rest: self.for_api(ApiKind::Rest).snapshot(),
            graphql: self.for_api(ApiKind::GraphQL).snapshot(),
            custom,
        }
    }

    /// Logs a one-line summary per collector that has seen traffic.
    pub fn log_summary(&self) {
        let report = self.report();
        let snapshots = [&report.global, &report.rest, &report.graphql]
            .into_iter()
            .chain(report.custom.values());

        for snapshot in snapshots.filter(|s| s.total_attempts > 0) {
            tracing::info!(
                collector = %snapshot.name,
                requests = snapshot.total_requests,
                success_rate = snapshot.success_rate,
                retries = snapshot.total_retries,
                rate_limit_waits = snapshot.rate_limit_waits,
                average_latency_ms = snapshot.average_latency.as_millis(),
                "Call metrics"
            );
            if snapshot.has_high_failure_rate() {
                tracing::warn!(
                    collector = %snapshot.name,
                    failure_rate = snapshot.failure_rate,
                    "High failure rate"
                );
            }
        }
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// Verify MetricsRegistry is Send + Sync at compile time
const _: fn() = || {
    const fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<MetricsRegistry>();
};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use std::time::Duration;

    fn registry() -> MetricsRegistry {
        MetricsRegistry::with_clock(Arc::new(ManualClock::new()))
    }

    #[test]
    fn test_builtin_collectors_exist() {
        let registry = registry();
        assert!(registry.get("global").is_some());
        assert!(registry.get("rest").is_some());
        assert!(registry.get("graphql").is_some());
        assert!(registry.get("bulk").is_none());
    }

    #[test]
    fn test_get_or_create_returns_same_collector() {
        let registry = registry();
        let first = registry.get_or_create("bulk");
        let second = registry.get_or_create("bulk");
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_reset_is_isolated() {
        let registry = registry();
        registry.for_api(ApiKind::Rest).record_attempt();
        registry.for_api(ApiKind::GraphQL).record_attempt();

        assert!(registry.reset("rest"));
        assert!(!registry.reset("missing"));

        assert_eq!(registry.for_api(ApiKind::Rest).snapshot().total_attempts, 0);
        assert_eq!(registry.for_api(ApiKind::GraphQL).snapshot().total_attempts, 1);
    }

    #[test]
    fn test_disable_applies_to_every_collector() {
        let registry = registry();
        let custom = registry.get_or_create("bulk");
        registry.disable();

        custom.record_attempt();
        registry.global().record_success(Duration::from_millis(3));
        assert!(!registry.is_enabled());
        assert_eq!(custom.snapshot().total_attempts, 0);
        assert_eq!(registry.global().snapshot().total_requests, 0);

        registry.enable();
        custom.record_attempt();
        assert_eq!(custom.snapshot().total_attempts, 1);
    }

    #[test]
    fn test_report_separates_custom_collectors() {
        let registry = registry();
        registry.get_or_create("bulk");
        let report = registry.report();

        assert!(report.enabled);
        assert_eq!(report.global.name, "global");
        assert_eq!(report.custom.keys().collect::<Vec<_>>(), vec!["bulk"]);
        assert!(!report.is_degraded());
    }
}
