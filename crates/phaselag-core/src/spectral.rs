//! Tapered spectral estimation for single trials
//!
//! Every trial goes through the same steps:
//!
//! ```text
//!  channel c ──► × taper k ──► zero-pad / truncate to nfft ──► FFT ──► bins 0..=nfft/2
//!                                                                     │
//!  X[k][c][f] ◄───────────────────────────────────────────────────────┘
//!
//!  C[f](i, j) = Σk λk · X[k][i][f] · conj(X[k][j][f]) / Σk λk
//! ```
//!
//! The result of one trial is its stack of dense Hermitian CSD matrices and
//! the matching sign(Im) matrices, ready for the accumulator. Nothing here
//! touches shared mutable state, so trials can be estimated concurrently
//! from one [`TrialSpectralEstimator`].
//!
//! ## Why only the imaginary sign matters
//!
//! For PLI only the sign of Im(C) survives the reduction. A cross-spectrum
//! whose imaginary part is within rounding error of zero (relative to its
//! magnitude) counts as zero-lag and contributes 0 rather than a random ±1.

use rustfft::{num_complex::Complex64, Fft, FftPlanner};
use std::fmt;
use std::sync::Arc;

use crate::accumulator::TrialContribution;
use crate::matrix::{ComplexMatrix, RealMatrix};
use crate::settings::Trial;
use crate::taper::TaperSet;
use crate::types::{num_freq_bins, signum_or_zero, Complex, ConnError, ConnResult};

/// Relative size below which Im(C) is treated as exactly zero.
pub const IMAG_SIGN_TOLERANCE: f64 = 1e-12;

/// Forward FFT plan that can be shared across worker threads.
#[derive(Clone)]
pub struct FftProcessor {
    size: usize,
    fft_forward: Arc<dyn Fft<f64>>,
}

impl fmt::Debug for FftProcessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FftProcessor")
            .field("size", &self.size)
            .finish()
    }
}

impl FftProcessor {
    /// Plan a forward FFT of the given size.
    pub fn new(size: usize) -> Self {
        let mut planner = FftPlanner::new();
        let fft_forward = planner.plan_fft_forward(size);
        Self { size, fft_forward }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Scratch length required by [`FftProcessor::process`].
    pub fn scratch_len(&self) -> usize {
        self.fft_forward.get_inplace_scratch_len()
    }

    /// Forward FFT in place.
    pub fn process(&self, buffer: &mut [Complex64], scratch: &mut [Complex64]) {
        assert_eq!(buffer.len(), self.size);
        self.fft_forward.process_with_scratch(buffer, scratch);
    }

    /// One-sided spectrum of `signal · window`, zero-padded or truncated to
    /// the FFT size. Writes the first `out.len()` bins into `out`.
    pub fn windowed_half_spectrum(
        &self,
        signal: &[f64],
        window: &[f64],
        buffer: &mut [Complex64],
        scratch: &mut [Complex64],
        out: &mut [Complex64],
    ) {
        let used = signal.len().min(window.len()).min(self.size);
        for (t, slot) in buffer.iter_mut().enumerate() {
            *slot = if t < used {
                Complex64::new(signal[t] * window[t], 0.0)
            } else {
                Complex64::new(0.0, 0.0)
            };
        }
        self.process(buffer, scratch);
        let bins = out.len().min(self.size);
        out[..bins].copy_from_slice(&buffer[..bins]);
    }
}

/// Centre frequency in Hz of every one-sided bin.
pub fn bin_frequencies(nfft: usize, sampling_frequency: f64) -> Vec<f64> {
    let resolution = sampling_frequency / nfft as f64;
    (0..num_freq_bins(nfft))
        .map(|k| k as f64 * resolution)
        .collect()
}

/// Sign of Im(c), zero when Im(c) is negligible relative to |c|.
#[inline]
pub fn imag_sign(c: Complex) -> f64 {
    if c.im.abs() <= IMAG_SIGN_TOLERANCE * c.norm() {
        0.0
    } else {
        signum_or_zero(c.im)
    }
}

/// Per-taper, per-channel one-sided spectra of one trial.
///
/// Layout is `[taper][channel][bin]`.
#[derive(Debug, Clone)]
pub struct TaperedSpectra {
    num_tapers: usize,
    num_channels: usize,
    num_freqs: usize,
    data: Vec<Complex>,
}

impl TaperedSpectra {
    fn offset(&self, taper: usize, channel: usize) -> usize {
        (taper * self.num_channels + channel) * self.num_freqs
    }

    pub fn num_tapers(&self) -> usize {
        self.num_tapers
    }

    pub fn num_channels(&self) -> usize {
        self.num_channels
    }

    pub fn num_freqs(&self) -> usize {
        self.num_freqs
    }

    pub fn get(&self, taper: usize, channel: usize, bin: usize) -> Complex {
        self.data[self.offset(taper, channel) + bin]
    }

    pub fn spectrum(&self, taper: usize, channel: usize) -> &[Complex] {
        let start = self.offset(taper, channel);
        &self.data[start..start + self.num_freqs]
    }
}

/// Estimates per-trial cross-spectra with a fixed taper set and FFT length.
#[derive(Debug, Clone)]
pub struct TrialSpectralEstimator {
    tapers: Arc<TaperSet>,
    fft: FftProcessor,
    weights: Vec<f64>,
    num_channels: usize,
    num_freqs: usize,
}

impl TrialSpectralEstimator {
    /// Create an estimator for trials of `num_channels` × `tapers.num_samples()`.
    pub fn new(tapers: Arc<TaperSet>, nfft: usize, num_channels: usize) -> ConnResult<Self> {
        if nfft == 0 {
            return Err(ConnError::InvalidConfig("nfft must be at least 1".to_string()));
        }
        if num_channels == 0 {
            return Err(ConnError::DegenerateInput("zero channels".to_string()));
        }
        let total = tapers.weight_sum();
        let weights = tapers.eigenvalues().iter().map(|l| l / total).collect();

        Ok(Self {
            tapers,
            fft: FftProcessor::new(nfft),
            weights,
            num_channels,
            num_freqs: num_freq_bins(nfft),
        })
    }

    pub fn nfft(&self) -> usize {
        self.fft.size()
    }

    pub fn num_freqs(&self) -> usize {
        self.num_freqs
    }

    pub fn num_channels(&self) -> usize {
        self.num_channels
    }

    pub fn num_samples(&self) -> usize {
        self.tapers.num_samples()
    }

    pub fn tapers(&self) -> &TaperSet {
        &self.tapers
    }

    /// Reject a trial whose dimensions disagree with the run configuration.
    pub fn check_shape(&self, trial_index: usize, trial: &Trial) -> ConnResult<()> {
        if trial.num_channels() != self.num_channels || trial.num_samples() != self.num_samples() {
            return Err(ConnError::InvalidTrialShape {
                trial: trial_index,
                expected_channels: self.num_channels,
                expected_samples: self.num_samples(),
                channels: trial.num_channels(),
                samples: trial.num_samples(),
            });
        }
        Ok(())
    }

    /// Spectrum of every channel under every taper.
    pub fn tapered_spectra(&self, trial_index: usize, trial: &Trial) -> ConnResult<TaperedSpectra> {
        self.check_shape(trial_index, trial)?;

        let num_tapers = self.tapers.len();
        let mut data = vec![Complex::new(0.0, 0.0); num_tapers * self.num_channels * self.num_freqs];
        let mut buffer = vec![Complex::new(0.0, 0.0); self.nfft()];
        let mut scratch = vec![Complex::new(0.0, 0.0); self.fft.scratch_len()];

        for (k, (window, _)) in self.tapers.iter().enumerate() {
            for c in 0..self.num_channels {
                let start = (k * self.num_channels + c) * self.num_freqs;
                self.fft.windowed_half_spectrum(
                    trial.channel(c),
                    window,
                    &mut buffer,
                    &mut scratch,
                    &mut data[start..start + self.num_freqs],
                );
            }
        }

        Ok(TaperedSpectra {
            num_tapers,
            num_channels: self.num_channels,
            num_freqs: self.num_freqs,
            data,
        })
    }

    /// The trial's taper-averaged CSD and sign(Im) matrices, one per bin.
    pub fn trial_contribution(&self, trial_index: usize, trial: &Trial) -> ConnResult<TrialContribution> {
        let spectra = self.tapered_spectra(trial_index, trial)?;
        let n = self.num_channels;

        let mut csd = Vec::with_capacity(self.num_freqs);
        let mut imag_sign_matrices = Vec::with_capacity(self.num_freqs);

        for bin in 0..self.num_freqs {
            let mut cross = ComplexMatrix::new(n, n);
            let mut signs = RealMatrix::new(n, n);

            for i in 0..n {
                let power: f64 = self
                    .weights
                    .iter()
                    .enumerate()
                    .map(|(k, w)| w * spectra.get(k, i, bin).norm_sqr())
                    .sum();
                cross.set(i, i, Complex::new(power, 0.0));

                for j in (i + 1)..n {
                    let mut c = Complex::new(0.0, 0.0);
                    for (k, &w) in self.weights.iter().enumerate() {
                        c += spectra.get(k, i, bin) * spectra.get(k, j, bin).conj() * w;
                    }
                    cross.set(i, j, c);
                    cross.set(j, i, c.conj());

                    let s = imag_sign(c);
                    signs.set(i, j, s);
                    signs.set(j, i, -s);
                }
            }

            csd.push(cross);
            imag_sign_matrices.push(signs);
        }

        TrialContribution::new(n, csd, imag_sign_matrices)
    }
}
