//! Delivery statistics for the invalidation channel

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Latency samples kept for percentile estimates
const LATENCY_WINDOW: usize = 512;

/// Point-in-time view of the channel counters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InvalidationStats {
    pub messages_published: u64,
    pub messages_received: u64,
    pub errors: u64,
    pub latency_p50_ms: f64,
    pub latency_p99_ms: f64,
}

#[derive(Default)]
struct Counters {
    published: AtomicU64,
    received: AtomicU64,
    errors: AtomicU64,
    latencies: Mutex<VecDeque<f64>>,
}

/// Shared between a publisher and every subscriber it hands out
#[derive(Clone, Default)]
pub struct StatsCollector {
    inner: Arc<Counters>,
}

impl StatsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_publish(&self) {
        self.inner.published.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_receive(&self) {
        self.inner.received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.inner.errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Record publish-to-receive latency in milliseconds
    pub fn record_latency(&self, latency_ms: f64) {
        if let Ok(mut samples) = self.inner.latencies.lock() {
            if samples.len() == LATENCY_WINDOW {
                samples.pop_front();
            }
            samples.push_back(latency_ms);
        }
    }

    pub fn snapshot(&self) -> InvalidationStats {
        let (latency_p50_ms, latency_p99_ms) = match self.inner.latencies.lock() {
            Ok(samples) => {
                let mut sorted: Vec<f64> = samples.iter().copied().collect();
                sorted.sort_by(|a, b| a.total_cmp(b));
                (percentile(&sorted, 0.50), percentile(&sorted, 0.99))
            }
            Err(_) => (0.0, 0.0),
        };

        InvalidationStats {
            messages_published: self.inner.published.load(Ordering::Relaxed),
            messages_received: self.inner.received.load(Ordering::Relaxed),
            errors: self.inner.errors.load(Ordering::Relaxed),
            latency_p50_ms,
            latency_p99_ms,
        }
    }

    pub fn reset(&self) {
        self.inner.published.store(0, Ordering::Relaxed);
        self.inner.received.store(0, Ordering::Relaxed);
        self.inner.errors.store(0, Ordering::Relaxed);
        if let Ok(mut samples) = self.inner.latencies.lock() {
            samples.clear();
        }
    }
}

fn percentile(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let idx = (sorted.len() as f64 * q) as usize;
    sorted[idx.min(sorted.len() - 1)]
}
