//! Cache metrics for observability

use prometheus::{CounterVec, Opts, Registry};
use std::sync::OnceLock;

static METRICS: OnceLock<CacheMetricsInner> = OnceLock::new();

struct CacheMetricsInner {
    hits: CounterVec,
    misses: CounterVec,
    dedup_waits: CounterVec,
    writes: CounterVec,
    invalidations: CounterVec,
    errors: CounterVec,
}

fn counter(name: &str, help: &str, labels: &[&str]) -> CounterVec {
    CounterVec::new(Opts::new(name, help), labels).expect("valid metric definition")
}

impl CacheMetricsInner {
    fn new() -> Self {
        Self {
            hits: counter("snapgram_query_cache_hits_total", "Fresh cache reads", &["scope"]),
            misses: counter(
                "snapgram_query_cache_misses_total",
                "Reads that went to the backend",
                &["scope"],
            ),
            dedup_waits: counter(
                "snapgram_query_cache_dedup_waits_total",
                "Reads served by another caller's in-flight fetch",
                &["scope"],
            ),
            writes: counter("snapgram_query_cache_writes_total", "Entries stored", &["scope"]),
            invalidations: counter(
                "snapgram_query_cache_invalidations_total",
                "Entries marked stale",
                &["scope"],
            ),
            errors: counter(
                "snapgram_query_cache_errors_total",
                "Failed fetches and corrupt entries",
                &["scope", "error_type"],
            ),
        }
    }

    fn register(&self, registry: &Registry) -> Result<(), prometheus::Error> {
        registry.register(Box::new(self.hits.clone()))?;
        registry.register(Box::new(self.misses.clone()))?;
        registry.register(Box::new(self.dedup_waits.clone()))?;
        registry.register(Box::new(self.writes.clone()))?;
        registry.register(Box::new(self.invalidations.clone()))?;
        registry.register(Box::new(self.errors.clone()))?;
        Ok(())
    }
}

fn get_metrics() -> &'static CacheMetricsInner {
    METRICS.get_or_init(CacheMetricsInner::new)
}

/// Cache metrics wrapper, labelled by query scope
#[derive(Clone, Default)]
pub struct CacheMetrics;

impl CacheMetrics {
    pub fn new() -> Self {
        Self
    }

    /// Register metrics with a Prometheus registry
    pub fn register(registry: &Registry) -> Result<(), prometheus::Error> {
        get_metrics().register(registry)
    }

    pub fn record_hit(&self, scope: &str) {
        get_metrics().hits.with_label_values(&[scope]).inc();
    }

    pub fn record_miss(&self, scope: &str) {
        get_metrics().misses.with_label_values(&[scope]).inc();
    }

    pub fn record_dedup_wait(&self, scope: &str) {
        get_metrics().dedup_waits.with_label_values(&[scope]).inc();
    }

    pub fn record_write(&self, scope: &str) {
        get_metrics().writes.with_label_values(&[scope]).inc();
    }

    pub fn record_invalidation(&self, scope: &str) {
        get_metrics().invalidations.with_label_values(&[scope]).inc();
    }

    pub fn record_error(&self, scope: &str, error_type: &str) {
        get_metrics()
            .errors
            .with_label_values(&[scope, error_type])
            .inc();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_once() {
        let registry = Registry::new();
        CacheMetrics::register(&registry).unwrap();
        CacheMetrics::new().record_hit("getPostById");
        let families = registry.gather();
        assert!(families
            .iter()
            .any(|f| f.get_name() == "snapgram_query_cache_hits_total"));
        // A second registration on the same registry is rejected
        assert!(CacheMetrics::register(&registry).is_err());
    }
}
