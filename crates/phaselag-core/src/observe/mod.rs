//! # Observability
//!
//! - **Logging**: `tracing` subscriber setup ([`init_logging`])
//! - **Metrics**: atomic counters and latency histograms, with a
//!   process-wide instance updated by every metric computation
//!   ([`global_metrics`])
//!
//! ```rust,no_run
//! use phaselag_core::observe::{global_metrics, init_logging, LogConfig};
//!
//! init_logging(&LogConfig::production()).unwrap();
//! // ... run computations ...
//! println!("{}", global_metrics().to_prometheus());
//! ```

pub mod logging;
pub mod metrics;

pub use logging::{build_filter, init_logging, LogConfig, LogFormat, LogLevel};
pub use metrics::{global_metrics, Counter, Gauge, Histogram, Metrics, MetricsSnapshot};
