//! Taper sets for spectral estimation
//!
//! A [`TaperSet`] is an ordered list of (window, eigenvalue) pairs built
//! once per computation and then shared read-only by every trial task.
//!
//! ```rust
//! use phaselag_core::taper::{TaperConfig, TaperSet, WindowKind};
//!
//! // Single Hann taper
//! let hann = TaperSet::new(&TaperConfig::default(), 256, 250.0).unwrap();
//! assert_eq!(hann.len(), 1);
//!
//! // Multitaper with 4 Hz total bandwidth over one second at 256 Hz
//! let config = TaperConfig::Multitaper {
//!     bandwidth_hz: 4.0,
//!     num_tapers: None,
//!     low_bias: true,
//! };
//! let mt = TaperSet::new(&config, 256, 256.0).unwrap();
//! assert!(mt.len() >= 2);
//! ```

pub mod dpss;
pub mod windows;

pub use windows::WindowKind;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::types::{ConnError, ConnResult};

/// Minimum concentration kept when `low_bias` is requested.
pub const LOW_BIAS_CONCENTRATION: f64 = 0.9;

/// How the taper set of a computation is generated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TaperConfig {
    /// One classic window with unit weight
    Window { window: WindowKind },
    /// DPSS family with concentration-ratio weights
    Multitaper {
        /// Full spectral bandwidth in Hz (2W · fs)
        bandwidth_hz: f64,
        /// Number of tapers, `None` for ⌊2NW⌋
        #[serde(default)]
        num_tapers: Option<usize>,
        /// Drop tapers whose concentration is below 0.9
        #[serde(default = "default_low_bias")]
        low_bias: bool,
    },
}

fn default_low_bias() -> bool {
    true
}

impl Default for TaperConfig {
    fn default() -> Self {
        TaperConfig::Window {
            window: WindowKind::Hann,
        }
    }
}

/// Ordered tapers with their normalization weights.
#[derive(Debug, Clone, PartialEq)]
pub struct TaperSet {
    windows: Vec<Vec<f64>>,
    eigenvalues: Vec<f64>,
    num_samples: usize,
}

impl TaperSet {
    /// Build the taper set described by `config` for trials of `num_samples`.
    pub fn new(config: &TaperConfig, num_samples: usize, sampling_frequency: f64) -> ConnResult<Self> {
        if num_samples == 0 {
            return Err(ConnError::DegenerateInput(
                "cannot build tapers for zero samples".to_string(),
            ));
        }
        match config {
            TaperConfig::Window { window } => Ok(Self::single(*window, num_samples)),
            TaperConfig::Multitaper {
                bandwidth_hz,
                num_tapers,
                low_bias,
            } => Self::multitaper(
                num_samples,
                sampling_frequency,
                *bandwidth_hz,
                *num_tapers,
                *low_bias,
            ),
        }
    }

    /// A single window with eigenvalue 1.
    pub fn single(kind: WindowKind, num_samples: usize) -> Self {
        Self {
            windows: vec![kind.generate(num_samples)],
            eigenvalues: vec![1.0],
            num_samples,
        }
    }

    /// DPSS tapers for a full bandwidth of `bandwidth_hz`.
    pub fn multitaper(
        num_samples: usize,
        sampling_frequency: f64,
        bandwidth_hz: f64,
        num_tapers: Option<usize>,
        low_bias: bool,
    ) -> ConnResult<Self> {
        if !(sampling_frequency > 0.0 && sampling_frequency.is_finite()) {
            return Err(ConnError::InvalidConfig(format!(
                "sampling frequency {} must be positive",
                sampling_frequency
            )));
        }
        let half_bandwidth = bandwidth_hz / (2.0 * sampling_frequency);
        let count = num_tapers
            .unwrap_or_else(|| (2.0 * num_samples as f64 * half_bandwidth).floor() as usize)
            .max(1)
            .min(num_samples);

        let family = dpss::dpss_windows(num_samples, half_bandwidth, count)?;

        let mut windows = Vec::with_capacity(count);
        let mut eigenvalues = Vec::with_capacity(count);
        for (i, (window, lambda)) in family
            .windows
            .into_iter()
            .zip(family.concentrations)
            .enumerate()
        {
            // The best-concentrated taper always survives
            if low_bias && i > 0 && lambda <= LOW_BIAS_CONCENTRATION {
                continue;
            }
            windows.push(window);
            eigenvalues.push(lambda);
        }

        debug!(
            num_samples,
            half_bandwidth,
            requested = count,
            kept = windows.len(),
            "generated DPSS tapers"
        );

        Self::from_parts(windows, eigenvalues)
    }

    /// Wrap externally generated tapers.
    pub fn from_parts(windows: Vec<Vec<f64>>, eigenvalues: Vec<f64>) -> ConnResult<Self> {
        if windows.is_empty() {
            return Err(ConnError::InvalidConfig("taper set is empty".to_string()));
        }
        if windows.len() != eigenvalues.len() {
            return Err(ConnError::InvalidConfig(format!(
                "{} tapers but {} eigenvalues",
                windows.len(),
                eigenvalues.len()
            )));
        }
        let num_samples = windows[0].len();
        if windows.iter().any(|w| w.len() != num_samples) {
            return Err(ConnError::InvalidConfig(
                "tapers must all have the same length".to_string(),
            ));
        }
        if eigenvalues.iter().any(|l| !l.is_finite() || *l < 0.0) {
            return Err(ConnError::InvalidConfig(
                "taper eigenvalues must be finite and non-negative".to_string(),
            ));
        }
        if eigenvalues.iter().sum::<f64>() <= 0.0 {
            return Err(ConnError::InvalidConfig(
                "taper eigenvalues sum to zero".to_string(),
            ));
        }
        Ok(Self {
            windows,
            eigenvalues,
            num_samples,
        })
    }

    /// Number of tapers.
    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }

    /// Length of every taper, which must equal the trial length.
    pub fn num_samples(&self) -> usize {
        self.num_samples
    }

    pub fn window(&self, k: usize) -> &[f64] {
        &self.windows[k]
    }

    pub fn eigenvalue(&self, k: usize) -> f64 {
        self.eigenvalues[k]
    }

    pub fn eigenvalues(&self) -> &[f64] {
        &self.eigenvalues
    }

    /// Sum of eigenvalues, the normalizer of the weighted taper average.
    pub fn weight_sum(&self) -> f64 {
        self.eigenvalues.iter().sum()
    }

    /// Iterate over `(window, eigenvalue)` pairs in order.
    pub fn iter(&self) -> impl Iterator<Item = (&[f64], f64)> + '_ {
        self.windows
            .iter()
            .map(Vec::as_slice)
            .zip(self.eigenvalues.iter().copied())
    }
}
