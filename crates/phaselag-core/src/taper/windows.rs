//! Single-window tapers
//!
//! Classic window functions used when a computation runs with one taper
//! instead of a DPSS family. All windows are the symmetric form
//! (denominator `N - 1`), matching what spectral toolboxes use for
//! trial-based estimation.
//!
//! | Window      | Sidelobe Level | Typical Use                      |
//! |-------------|----------------|----------------------------------|
//! | Rectangular | -13 dB         | Synthetic data, exact bin tests  |
//! | Hann        | -32 dB         | Default for single-taper PLI     |
//! | Hamming     | -43 dB         | General purpose                  |
//! | Blackman    | -58 dB         | High dynamic range               |
//! | Kaiser(β)   | Adjustable     | Tunable leakage trade-off        |

use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Window function used as a single taper
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowKind {
    /// No windowing
    Rectangular,
    /// 0.5*(1 - cos(2πn/(N-1)))
    Hann,
    /// 0.54 - 0.46*cos(2πn/(N-1))
    Hamming,
    /// 0.42 - 0.5*cos(2πn/(N-1)) + 0.08*cos(4πn/(N-1))
    Blackman,
    /// 4-term Blackman-Harris (-92 dB sidelobes)
    BlackmanHarris,
    /// Kaiser window with shape parameter β
    Kaiser(f64),
}

impl Default for WindowKind {
    fn default() -> Self {
        WindowKind::Hann
    }
}

impl WindowKind {
    /// Generate window coefficients for the given length.
    pub fn generate(&self, length: usize) -> Vec<f64> {
        match self {
            WindowKind::Rectangular => vec![1.0; length],
            WindowKind::Hann => cosine_sum(length, &[0.5, 0.5]),
            WindowKind::Hamming => cosine_sum(length, &[0.54, 0.46]),
            WindowKind::Blackman => cosine_sum(length, &[0.42, 0.5, 0.08]),
            WindowKind::BlackmanHarris => {
                cosine_sum(length, &[0.35875, 0.48829, 0.14128, 0.01168])
            }
            WindowKind::Kaiser(beta) => kaiser_window(length, *beta),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            WindowKind::Rectangular => "rectangular",
            WindowKind::Hann => "hann",
            WindowKind::Hamming => "hamming",
            WindowKind::Blackman => "blackman",
            WindowKind::BlackmanHarris => "blackman_harris",
            WindowKind::Kaiser(_) => "kaiser",
        }
    }
}

/// Generalized cosine-sum window:
/// w[n] = a0 - a1*cos(x) + a2*cos(2x) - a3*cos(3x) ..., x = 2πn/(N-1)
fn cosine_sum(length: usize, coeffs: &[f64]) -> Vec<f64> {
    if length == 0 {
        return vec![];
    }
    if length == 1 {
        return vec![1.0];
    }

    let n_minus_1 = (length - 1) as f64;
    (0..length)
        .map(|n| {
            let x = 2.0 * PI * n as f64 / n_minus_1;
            coeffs
                .iter()
                .enumerate()
                .map(|(k, &a)| {
                    let sign = if k % 2 == 0 { 1.0 } else { -1.0 };
                    sign * a * (k as f64 * x).cos()
                })
                .sum()
        })
        .collect()
}

/// Kaiser window with shape parameter β.
///
/// β = 0 is rectangular, β ≈ 6 resembles Hann, β ≈ 8.6 resembles Blackman.
pub fn kaiser_window(length: usize, beta: f64) -> Vec<f64> {
    if length == 0 {
        return vec![];
    }
    if length == 1 {
        return vec![1.0];
    }

    let i0_beta = bessel_i0(beta);
    let n_minus_1 = (length - 1) as f64;
    (0..length)
        .map(|n| {
            let ratio = 2.0 * n as f64 / n_minus_1 - 1.0;
            bessel_i0(beta * (1.0 - ratio * ratio).max(0.0).sqrt()) / i0_beta
        })
        .collect()
}

/// Zeroth-order modified Bessel function of the first kind (series form).
fn bessel_i0(x: f64) -> f64 {
    let half_x = x / 2.0;
    let mut sum = 1.0;
    let mut term = 1.0;
    let mut k = 0.0;
    // Terms grow until k passes x/2, so the loop runs past that point
    loop {
        k += 1.0;
        term *= (half_x / k) * (half_x / k);
        sum += term;
        if (k > half_x.abs() && term < 1e-16 * sum) || !sum.is_finite() {
            break;
        }
    }
    sum
}
