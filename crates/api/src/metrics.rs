use dashmap::DashMap;
use extract::AnalysisResult;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Instant;

pub struct Metrics {
    // Counters
    total_requests: AtomicUsize,
    successful_requests: AtomicUsize,
    partial_requests: AtomicUsize,
    failed_requests: AtomicUsize,
    rejected_requests: AtomicUsize,

    // Timing (in microseconds)
    total_analyze_time_us: AtomicU64,

    // Counts
    total_attributes_extracted: AtomicUsize,
    total_sources_reconciled: AtomicUsize,
    strategies: DashMap<&'static str, usize>,
}

impl Metrics {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            total_requests: AtomicUsize::new(0),
            successful_requests: AtomicUsize::new(0),
            partial_requests: AtomicUsize::new(0),
            failed_requests: AtomicUsize::new(0),
            rejected_requests: AtomicUsize::new(0),
            total_analyze_time_us: AtomicU64::new(0),
            total_attributes_extracted: AtomicUsize::new(0),
            total_sources_reconciled: AtomicUsize::new(0),
            strategies: DashMap::new(),
        })
    }

    /// Record a completed analysis. "Partial" means an error was reported alongside
    /// whatever attributes or sources were recovered.
    pub fn record_analysis(&self, result: &AnalysisResult, duration: std::time::Duration) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        if result.error.is_none() {
            self.successful_requests.fetch_add(1, Ordering::Relaxed);
        } else if !result.attributes.is_empty() || !result.sources.is_empty() {
            self.partial_requests.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failed_requests.fetch_add(1, Ordering::Relaxed);
        }

        self.total_analyze_time_us
            .fetch_add(duration.as_micros() as u64, Ordering::Relaxed);
        self.total_attributes_extracted
            .fetch_add(result.attributes.len(), Ordering::Relaxed);
        self.total_sources_reconciled
            .fetch_add(result.sources.len(), Ordering::Relaxed);
        *self.strategies.entry(result.strategy.as_str()).or_insert(0) += 1;
    }

    /// An analysis that could not run at all (bad input, internal error).
    pub fn record_rejected(&self) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        self.rejected_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let analyses = self.successful_requests.load(Ordering::Relaxed)
            + self.partial_requests.load(Ordering::Relaxed)
            + self.failed_requests.load(Ordering::Relaxed);

        MetricsSnapshot {
            total_requests: self.total_requests.load(Ordering::Relaxed),
            successful_requests: self.successful_requests.load(Ordering::Relaxed),
            partial_requests: self.partial_requests.load(Ordering::Relaxed),
            failed_requests: self.failed_requests.load(Ordering::Relaxed),
            rejected_requests: self.rejected_requests.load(Ordering::Relaxed),
            avg_analyze_time_ms: avg_time_ms(&self.total_analyze_time_us, analyses),
            total_attributes_extracted: self.total_attributes_extracted.load(Ordering::Relaxed),
            total_sources_reconciled: self.total_sources_reconciled.load(Ordering::Relaxed),
            strategies: self
                .strategies
                .iter()
                .map(|entry| (entry.key().to_string(), *entry.value()))
                .collect(),
        }
    }
}

fn avg_time_ms(total_us: &AtomicU64, count: usize) -> f64 {
    let total = total_us.load(Ordering::Relaxed) as f64;
    if count > 0 {
        total / count as f64 / 1000.0 // Convert to ms
    } else {
        0.0
    }
}

#[derive(Debug, Serialize)]
pub struct MetricsSnapshot {
    pub total_requests: usize,
    pub successful_requests: usize,
    pub partial_requests: usize,
    pub failed_requests: usize,
    pub rejected_requests: usize,
    pub avg_analyze_time_ms: f64,
    pub total_attributes_extracted: usize,
    pub total_sources_reconciled: usize,
    pub strategies: BTreeMap<String, usize>,
}

pub struct TimedOperation {
    start: Instant,
}

impl TimedOperation {
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> std::time::Duration {
        self.start.elapsed()
    }
}
