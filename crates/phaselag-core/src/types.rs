//! Core types for phase lag connectivity
//!
//! This module defines the value types shared by every stage of the PLI
//! pipeline: complex spectral samples, the error type, and the small
//! configuration enums that decide how results are laid out on the graph.
//!
//! ## Frequency Bins
//!
//! Trials are real-valued, so only the non-negative half of the spectrum is
//! kept. For an FFT length `nfft` there are `nfft / 2 + 1` bins and bin `k`
//! sits at `k * fs / nfft` Hz:
//!
//! ```text
//!   bin:    0      1      2     ...    nfft/2
//!   freq:   0    fs/n   2fs/n   ...    fs/2 (Nyquist)
//! ```

use num_complex::Complex64;
use serde::{Deserialize, Serialize};

/// Type alias for complex spectral values using f64 precision
pub type Complex = Complex64;

/// A real-valued time-domain sample
pub type Sample = f64;

/// Result type for connectivity operations
pub type ConnResult<T> = Result<T, ConnError>;

/// Errors that can occur while computing connectivity
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConnError {
    #[error(
        "Invalid trial shape: trial {trial} is {channels}x{samples}, expected {expected_channels}x{expected_samples}"
    )]
    InvalidTrialShape {
        trial: usize,
        expected_channels: usize,
        expected_samples: usize,
        channels: usize,
        samples: usize,
    },

    #[error("Degenerate input: {0}")]
    DegenerateInput(String),

    #[error("Internal invariant violated: {0}")]
    InternalInvariantViolation(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Number of one-sided frequency bins produced by an FFT of length `nfft`.
pub fn num_freq_bins(nfft: usize) -> usize {
    nfft / 2 + 1
}

/// A closed frequency interval in Hz.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FrequencyBand {
    /// Lower edge in Hz (inclusive)
    pub low_hz: f64,
    /// Upper edge in Hz (inclusive)
    pub high_hz: f64,
}

impl FrequencyBand {
    pub fn new(low_hz: f64, high_hz: f64) -> Self {
        Self { low_hz, high_hz }
    }

    /// Check the band is ordered, non-negative and below Nyquist.
    pub fn validate(&self, sampling_frequency: f64) -> ConnResult<()> {
        if !self.low_hz.is_finite() || !self.high_hz.is_finite() {
            return Err(ConnError::InvalidConfig(
                "frequency band edges must be finite".to_string(),
            ));
        }
        if self.low_hz < 0.0 || self.low_hz > self.high_hz {
            return Err(ConnError::InvalidConfig(format!(
                "frequency band [{}, {}] Hz is not ordered",
                self.low_hz, self.high_hz
            )));
        }
        let nyquist = sampling_frequency / 2.0;
        if self.low_hz > nyquist {
            return Err(ConnError::InvalidConfig(format!(
                "frequency band starts at {} Hz, above Nyquist ({} Hz)",
                self.low_hz, nyquist
            )));
        }
        Ok(())
    }

    /// Map the band onto an inclusive bin range.
    ///
    /// A bin belongs to the band when its centre frequency lies inside it.
    /// The upper edge is clamped to the last bin.
    pub fn to_bins(&self, sampling_frequency: f64, nfft: usize) -> ConnResult<(usize, usize)> {
        self.validate(sampling_frequency)?;
        let resolution = sampling_frequency / nfft as f64;
        let last = num_freq_bins(nfft) - 1;

        // Tolerate rounding so that band edges placed exactly on a bin keep it
        let lo = ((self.low_hz / resolution) - 1e-9).ceil().max(0.0) as usize;
        let hi = (((self.high_hz / resolution) + 1e-9).floor() as usize).min(last);

        if lo > hi {
            return Err(ConnError::InvalidConfig(format!(
                "frequency band [{}, {}] Hz contains no bins at {:.4} Hz resolution",
                self.low_hz, self.high_hz, resolution
            )));
        }
        Ok((lo, hi))
    }
}

/// How PLI values are stored on network edges.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum WeightMode {
    /// Keep one weight per frequency bin
    PerBin,
    /// Collapse to the arithmetic mean over the band's bins
    BandAverage(FrequencyBand),
}

impl Default for WeightMode {
    fn default() -> Self {
        WeightMode::PerBin
    }
}

/// How per-trial cross-spectra are merged across worker threads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccumulationStrategy {
    /// Per-worker accumulators merged in a final fold
    FoldReduce,
    /// One mutex-guarded accumulator updated once per trial
    Locked,
}

impl Default for AccumulationStrategy {
    fn default() -> Self {
        AccumulationStrategy::FoldReduce
    }
}

/// Sign of `x` with an exact zero mapped to zero.
#[inline]
pub fn signum_or_zero(x: f64) -> f64 {
    if x > 0.0 {
        1.0
    } else if x < 0.0 {
        -1.0
    } else {
        0.0
    }
}
