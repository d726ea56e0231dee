//! Connectivity metrics
//!
//! Every metric turns a [`ConnectivitySettings`] into a [`Network`]. Metrics
//! are looked up by name through [`MetricFactory`], and [`Connectivity`]
//! runs several of them over the same settings.
//!
//! ```rust
//! use phaselag_core::metric::{Connectivity, MetricFactory};
//! use phaselag_core::settings::{ConnectivitySettings, Trial};
//!
//! assert!(MetricFactory::create("phase-lag-index").is_some());
//!
//! let mut settings = ConnectivitySettings::new(8.0).with_nfft(8);
//! for k in 0..4 {
//!     let a: Vec<f64> = (0..8).map(|t| ((t + k) as f64).sin()).collect();
//!     let b: Vec<f64> = (0..8).map(|t| ((t + k) as f64 + 0.5).sin()).collect();
//!     settings.append(Trial::from_channels(vec![a, b]).unwrap());
//! }
//! let networks = Connectivity::calculate(&mut settings, &["PLI"]).unwrap();
//! assert_eq!(networks[0].num_edges(), 1);
//! ```

pub mod pli;

pub use pli::PhaseLagIndex;

use std::fmt::Debug;

use tracing::info;

use crate::network::Network;
use crate::settings::ConnectivitySettings;
use crate::types::{ConnError, ConnResult};

/// A pairwise connectivity measure.
pub trait ConnectivityMetric: Debug + Send + Sync {
    /// Short name recorded on produced networks
    fn name(&self) -> &'static str;

    /// One-line human readable description
    fn description(&self) -> &'static str;

    /// Compute the metric over every trial in `settings`.
    ///
    /// Takes the settings mutably so a metric can maintain incremental
    /// state between calls.
    fn calculate(&self, settings: &mut ConnectivitySettings) -> ConnResult<Network>;
}

/// Metric lookup by name.
pub struct MetricFactory;

impl MetricFactory {
    /// Names of all available metrics.
    pub fn list() -> Vec<&'static str> {
        vec!["PLI"]
    }

    /// Create a metric by name, ignoring case, `-` and `_`.
    pub fn create(name: &str) -> Option<Box<dyn ConnectivityMetric>> {
        match name.to_uppercase().replace('-', "").replace('_', "").as_str() {
            "PLI" | "PHASELAGINDEX" => Some(Box::new(PhaseLagIndex::new())),
            _ => None,
        }
    }
}

/// Runs named metrics over shared settings.
pub struct Connectivity;

impl Connectivity {
    /// One network per requested metric, in request order.
    ///
    /// Every name is resolved before any computation starts.
    pub fn calculate(settings: &mut ConnectivitySettings, metric_names: &[&str]) -> ConnResult<Vec<Network>> {
        let metrics = metric_names
            .iter()
            .map(|name| {
                MetricFactory::create(name).ok_or_else(|| {
                    ConnError::InvalidConfig(format!(
                        "unknown connectivity metric '{}', available: {}",
                        name,
                        MetricFactory::list().join(", ")
                    ))
                })
            })
            .collect::<ConnResult<Vec<_>>>()?;

        info!(metrics = ?metric_names, trials = settings.len(), "calculating connectivity");
        metrics.iter().map(|m| m.calculate(settings)).collect()
    }
}
