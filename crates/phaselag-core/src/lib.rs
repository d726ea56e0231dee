//! # Phase Lag Index Connectivity
//!
//! This crate computes pairwise functional connectivity between multichannel
//! recordings (EEG/MEG sensors) across repeated trials, using the Phase Lag
//! Index on tapered cross-spectra.
//!
//! ## Overview
//!
//! - **Tapers**: classic windows or DPSS multitapers, built once per run
//! - **Spectral estimation**: per-trial cross-spectral density matrices
//! - **Accumulation**: a parallel, order-independent reduction over trials
//! - **Reduction**: per-pair, per-bin PLI written into a weighted graph
//! - **Incremental mode**: cached trial spectra for sliding trial windows
//!
//! ## Signal Flow
//!
//! ```text
//! Trials → × taper → FFT → CSD per trial ─(parallel)─► Σ CSD, Σ sign(Im CSD) → PLI → Network
//! ```
//!
//! ## Example
//!
//! ```rust
//! use phaselag_core::prelude::*;
//!
//! let mut settings = ConnectivitySettings::new(250.0)
//!     .with_taper(TaperConfig::Multitaper {
//!         bandwidth_hz: 8.0,
//!         num_tapers: None,
//!         low_bias: true,
//!     })
//!     .with_frequency_band(FrequencyBand::new(8.0, 12.0));
//!
//! for k in 0..8 {
//!     let a: Vec<f64> = (0..250).map(|t| (0.25 * t as f64 + k as f64).sin()).collect();
//!     let b: Vec<f64> = (0..250).map(|t| (0.25 * t as f64 + k as f64 - 0.6).sin()).collect();
//!     settings.append(Trial::from_channels(vec![a, b]).unwrap());
//! }
//!
//! let network = PhaseLagIndex::new().calculate(&mut settings).unwrap();
//! let weight = network.edge_between(0, 1).unwrap().weight();
//! assert!((0.0..=1.0).contains(&weight));
//! ```

pub mod accumulator;
pub mod config;
pub mod matrix;
pub mod metric;
pub mod network;
pub mod observe;
pub mod parallel;
pub mod reducer;
pub mod settings;
pub mod spectral;
pub mod taper;
pub mod types;

// Re-export main types
pub use accumulator::{CsdAccumulator, SharedCsdAccumulator, TrialContribution};
pub use config::{AnalysisConfig, ConfigError, ConnectivityConfig};
pub use matrix::{ComplexMatrix, Matrix, RealMatrix};
pub use metric::{Connectivity, ConnectivityMetric, MetricFactory, PhaseLagIndex};
pub use network::{Network, NetworkEdge, NetworkNode};
pub use reducer::PliReducer;
pub use settings::{ConnectivitySettings, Trial};
pub use spectral::TrialSpectralEstimator;
pub use taper::{TaperConfig, TaperSet, WindowKind};
pub use types::{AccumulationStrategy, Complex, ConnError, ConnResult, FrequencyBand, Sample, WeightMode};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::metric::{Connectivity, ConnectivityMetric, MetricFactory, PhaseLagIndex};
    pub use crate::network::Network;
    pub use crate::settings::{ConnectivitySettings, Trial};
    pub use crate::taper::{TaperConfig, WindowKind};
    pub use crate::types::{AccumulationStrategy, ConnError, ConnResult, FrequencyBand, WeightMode};
}
