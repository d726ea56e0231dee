//! # Runtime Metrics
//!
//! Counters and timings for connectivity computations:
//!
//! - **Counters**: computations run, trials estimated, cached trials reused,
//!   failures
//! - **Gauges**: shape of the most recent computation
//! - **Histograms**: end-to-end compute latency
//!
//! ## Example
//!
//! ```rust
//! use phaselag_core::observe::Metrics;
//!
//! let metrics = Metrics::new();
//! metrics.computations.inc();
//! metrics.trials_estimated.inc_by(40);
//! metrics.compute_latency_us.observe(850.0);
//!
//! let snapshot = metrics.snapshot();
//! assert_eq!(snapshot.trials_estimated, 40);
//! ```

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::{OnceLock, RwLock};

/// Monotonic atomic counter.
#[derive(Debug, Default)]
pub struct Counter {
    value: AtomicU64,
}

impl Counter {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn inc(&self) {
        self.inc_by(1);
    }

    #[inline]
    pub fn inc_by(&self, n: u64) {
        self.value.fetch_add(n, Ordering::Relaxed);
    }

    #[inline]
    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn reset(&self) {
        self.value.store(0, Ordering::Relaxed);
    }
}

/// Atomic value that can be set freely.
#[derive(Debug, Default)]
pub struct Gauge {
    value: AtomicI64,
}

impl Gauge {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn set(&self, v: i64) {
        self.value.store(v, Ordering::Relaxed);
    }

    #[inline]
    pub fn get(&self) -> i64 {
        self.value.load(Ordering::Relaxed)
    }
}

/// Fixed-bucket histogram.
///
/// Buckets are upper-exclusive; the last bucket catches everything above
/// the final boundary.
#[derive(Debug)]
pub struct Histogram {
    boundaries: Vec<f64>,
    buckets: Vec<AtomicU64>,
    // f64 bits, updated with compare-exchange
    sum_bits: AtomicU64,
    count: AtomicU64,
}

impl Default for Histogram {
    fn default() -> Self {
        Self::latency_us()
    }
}

impl Histogram {
    pub fn new(boundaries: Vec<f64>) -> Self {
        let buckets = (0..=boundaries.len()).map(|_| AtomicU64::new(0)).collect();
        Self {
            boundaries,
            buckets,
            sum_bits: AtomicU64::new(0f64.to_bits()),
            count: AtomicU64::new(0),
        }
    }

    /// Buckets spanning 100 µs to 10 s.
    pub fn latency_us() -> Self {
        Self::new(vec![
            100.0, 500.0, 1_000.0, 5_000.0, 10_000.0, 50_000.0, 100_000.0, 500_000.0, 1_000_000.0,
            10_000_000.0,
        ])
    }

    pub fn observe(&self, value: f64) {
        let idx = self
            .boundaries
            .iter()
            .position(|&b| value < b)
            .unwrap_or(self.boundaries.len());
        self.buckets[idx].fetch_add(1, Ordering::Relaxed);

        let mut current = self.sum_bits.load(Ordering::Relaxed);
        loop {
            let next = (f64::from_bits(current) + value).to_bits();
            match self
                .sum_bits
                .compare_exchange_weak(current, next, Ordering::Relaxed, Ordering::Relaxed)
            {
                Ok(_) => break,
                Err(actual) => current = actual,
            }
        }
        self.count.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn sum(&self) -> f64 {
        f64::from_bits(self.sum_bits.load(Ordering::Relaxed))
    }

    pub fn bucket_counts(&self) -> Vec<u64> {
        self.buckets.iter().map(|b| b.load(Ordering::Relaxed)).collect()
    }

    pub fn boundaries(&self) -> &[f64] {
        &self.boundaries
    }

    fn reset(&self) {
        for b in &self.buckets {
            b.store(0, Ordering::Relaxed);
        }
        self.sum_bits.store(0f64.to_bits(), Ordering::Relaxed);
        self.count.store(0, Ordering::Relaxed);
    }
}

/// Metrics for connectivity computations.
#[derive(Debug, Default)]
pub struct Metrics {
    /// Completed computations
    pub computations: Counter,
    /// Computations that returned an error
    pub computation_failures: Counter,
    /// Trials run through the spectral estimator
    pub trials_estimated: Counter,
    /// Trials served from the incremental cache
    pub cached_trials_reused: Counter,

    /// Channel count of the last successful computation
    pub last_num_channels: Gauge,
    /// Trial count of the last successful computation
    pub last_num_trials: Gauge,
    /// Edge count of the last successful computation
    pub last_num_edges: Gauge,

    /// End-to-end compute latency in microseconds
    pub compute_latency_us: Histogram,

    /// Name of the most recently run metric
    pub last_metric: RwLock<String>,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_metric(&self, name: &str) {
        if let Ok(mut m) = self.last_metric.write() {
            *m = name.to_string();
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            computations: self.computations.get(),
            computation_failures: self.computation_failures.get(),
            trials_estimated: self.trials_estimated.get(),
            cached_trials_reused: self.cached_trials_reused.get(),
            last_num_channels: self.last_num_channels.get(),
            last_num_trials: self.last_num_trials.get(),
            last_num_edges: self.last_num_edges.get(),
            compute_latency_count: self.compute_latency_us.count(),
            compute_latency_sum_us: self.compute_latency_us.sum(),
            last_metric: self
                .last_metric
                .read()
                .map(|m| m.clone())
                .unwrap_or_default(),
        }
    }

    /// Zero counters and the latency histogram. Gauges keep their values.
    pub fn reset(&self) {
        self.computations.reset();
        self.computation_failures.reset();
        self.trials_estimated.reset();
        self.cached_trials_reused.reset();
        self.compute_latency_us.reset();
    }

    /// Export in Prometheus text format.
    pub fn to_prometheus(&self) -> String {
        let s = self.snapshot();
        let mut output = String::new();
        let mut emit = |name: &str, kind: &str, help: &str, value: String| {
            output.push_str(&format!("# HELP phaselag_{} {}\n", name, help));
            output.push_str(&format!("# TYPE phaselag_{} {}\n", name, kind));
            output.push_str(&format!("phaselag_{} {}\n", name, value));
        };

        emit("computations_total", "counter", "Completed computations", s.computations.to_string());
        emit(
            "computation_failures_total",
            "counter",
            "Failed computations",
            s.computation_failures.to_string(),
        );
        emit(
            "trials_estimated_total",
            "counter",
            "Trials run through the spectral estimator",
            s.trials_estimated.to_string(),
        );
        emit(
            "cached_trials_reused_total",
            "counter",
            "Trials served from the incremental cache",
            s.cached_trials_reused.to_string(),
        );
        emit("last_num_channels", "gauge", "Channels in the last computation", s.last_num_channels.to_string());
        emit("last_num_edges", "gauge", "Edges in the last network", s.last_num_edges.to_string());
        emit(
            "compute_latency_us_avg",
            "gauge",
            "Mean compute latency in microseconds",
            s.avg_latency_us().to_string(),
        );
        output
    }
}

/// Point-in-time copy of [`Metrics`].
#[derive(Debug, Clone, PartialEq)]
pub struct MetricsSnapshot {
    pub computations: u64,
    pub computation_failures: u64,
    pub trials_estimated: u64,
    pub cached_trials_reused: u64,
    pub last_num_channels: i64,
    pub last_num_trials: i64,
    pub last_num_edges: i64,
    pub compute_latency_count: u64,
    pub compute_latency_sum_us: f64,
    pub last_metric: String,
}

impl MetricsSnapshot {
    pub fn avg_latency_us(&self) -> f64 {
        if self.compute_latency_count == 0 {
            0.0
        } else {
            self.compute_latency_sum_us / self.compute_latency_count as f64
        }
    }

    /// Fraction of computations that succeeded, 1.0 before any ran.
    pub fn success_rate(&self) -> f64 {
        let total = self.computations + self.computation_failures;
        if total == 0 {
            1.0
        } else {
            self.computations as f64 / total as f64
        }
    }
}

/// Process-wide metrics shared by every computation.
pub fn global_metrics() -> &'static Metrics {
    static GLOBAL: OnceLock<Metrics> = OnceLock::new();
    GLOBAL.get_or_init(Metrics::new)
}
