//! PLI finalization
//!
//! Turns the accumulated sums into a [`Network`]. Runs on one thread after
//! every trial has been folded in:
//!
//! ```text
//! PLI(i, j, f) = | ImagSignSum[f](i, j) / numTrials |
//! ```
//!
//! The CSD sums only serve as a sanity check on the input. An all-zero
//! spectrum or any non-finite entry means there was nothing meaningful to
//! measure.

use tracing::debug;

use crate::matrix::{ComplexMatrix, RealMatrix};
use crate::network::Network;
use crate::types::{ConnError, ConnResult, WeightMode};

/// Name recorded on networks produced by this reducer.
pub const PLI_METHOD: &str = "PLI";

/// Sequential reduction of accumulated sums into PLI edge weights.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PliReducer {
    weight_mode: WeightMode,
    sampling_frequency: f64,
    nfft: usize,
}

impl PliReducer {
    pub fn new(weight_mode: WeightMode, sampling_frequency: f64, nfft: usize) -> Self {
        Self {
            weight_mode,
            sampling_frequency,
            nfft,
        }
    }

    /// Build the network from per-bin sums over `num_trials` trials.
    ///
    /// `positions`, when given, must hold one entry per channel.
    pub fn reduce(
        &self,
        csd_sum: &[ComplexMatrix],
        imag_sign_sum: &[RealMatrix],
        num_trials: usize,
        positions: Option<&[[f64; 3]]>,
    ) -> ConnResult<Network> {
        if num_trials == 0 {
            return Err(ConnError::DegenerateInput("no trials to reduce".to_string()));
        }
        if csd_sum.len() != imag_sign_sum.len() {
            return Err(ConnError::InternalInvariantViolation(format!(
                "{} CSD bins but {} sign bins",
                csd_sum.len(),
                imag_sign_sum.len()
            )));
        }
        let num_bins = csd_sum.len();
        if num_bins == 0 {
            return Err(ConnError::InternalInvariantViolation(
                "no frequency bins to reduce".to_string(),
            ));
        }

        let n = csd_sum[0].rows();
        let all_square = csd_sum
            .iter()
            .all(|m| m.rows() == n && m.cols() == n)
            && imag_sign_sum.iter().all(|m| m.rows() == n && m.cols() == n);
        if !all_square {
            return Err(ConnError::InternalInvariantViolation(format!(
                "sum matrices are not all {}x{}",
                n, n
            )));
        }
        if let Some(p) = positions {
            if p.len() != n {
                return Err(ConnError::InvalidConfig(format!(
                    "{} node positions for {} channels",
                    p.len(),
                    n
                )));
            }
        }

        self.check_spectrum(csd_sum, imag_sign_sum)?;

        let trials = num_trials as f64;
        let pairs: Vec<(usize, usize)> = (0..n)
            .flat_map(|i| ((i + 1)..n).map(move |j| (i, j)))
            .collect();

        // Bins ascending, each pair written once per bin
        let mut per_pair = vec![Vec::with_capacity(num_bins); pairs.len()];
        for signs in imag_sign_sum {
            for (weights, &(i, j)) in per_pair.iter_mut().zip(&pairs) {
                weights.push((signs.get(i, j) / trials).abs());
            }
        }

        let per_pair = match self.weight_mode {
            WeightMode::PerBin => per_pair,
            WeightMode::BandAverage(band) => {
                let (lo, hi) = band.to_bins(self.sampling_frequency, self.nfft)?;
                if hi >= num_bins {
                    return Err(ConnError::InternalInvariantViolation(format!(
                        "band ends at bin {} but only {} bins were accumulated",
                        hi, num_bins
                    )));
                }
                let width = (hi - lo + 1) as f64;
                per_pair
                    .into_iter()
                    .map(|w| vec![w[lo..=hi].iter().sum::<f64>() / width])
                    .collect()
            }
        };

        let mut network = Network::new(PLI_METHOD, self.sampling_frequency, self.nfft, num_trials);
        for c in 0..n {
            network.add_node(positions.map(|p| p[c]));
        }
        for (&(i, j), weights) in pairs.iter().zip(per_pair) {
            network.add_edge(i, j, weights)?;
        }

        debug!(
            channels = n,
            bins = num_bins,
            edges = network.num_edges(),
            num_trials,
            "reduced PLI network"
        );
        Ok(network)
    }

    fn check_spectrum(&self, csd_sum: &[ComplexMatrix], imag_sign_sum: &[RealMatrix]) -> ConnResult<()> {
        if csd_sum.iter().any(|m| !m.is_finite()) || imag_sign_sum.iter().any(|m| !m.is_finite()) {
            return Err(ConnError::DegenerateInput(
                "accumulated spectra contain non-finite values".to_string(),
            ));
        }
        let total_power: f64 = csd_sum.iter().map(|m| m.trace().re).sum();
        if total_power <= 0.0 {
            return Err(ConnError::DegenerateInput(
                "all channels have zero power".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Complex, FrequencyBand};
    use approx::assert_relative_eq;

    fn sums(n: usize, bins: usize, sign_sum: f64) -> (Vec<ComplexMatrix>, Vec<RealMatrix>) {
        let mut csd = Vec::new();
        let mut signs = Vec::new();
        for bin in 0..bins {
            let mut c = ComplexMatrix::new(n, n);
            let mut s = RealMatrix::new(n, n);
            for i in 0..n {
                c.set(i, i, Complex::new(1.0, 0.0));
                for j in (i + 1)..n {
                    let v = if bin % 2 == 0 { sign_sum } else { -sign_sum / 2.0 };
                    s.set(i, j, v);
                    s.set(j, i, -v);
                }
            }
            csd.push(c);
            signs.push(s);
        }
        (csd, signs)
    }

    #[test]
    fn test_pli_values_and_symmetry() {
        let (csd, signs) = sums(3, 5, 4.0);
        let reducer = PliReducer::new(WeightMode::PerBin, 8.0, 8);
        let net = reducer.reduce(&csd, &signs, 8, None).unwrap();

        assert_eq!(net.method(), PLI_METHOD);
        assert_eq!(net.num_trials(), 8);
        assert_eq!(net.num_nodes(), 3);
        assert_eq!(net.num_edges(), 3);
        for edge in net.edges() {
            assert!(edge.start() < edge.end());
            assert_eq!(edge.weights(), &[0.5, 0.25, 0.5, 0.25, 0.5]);
            assert!(edge.weights().iter().all(|w| (0.0..=1.0).contains(w)));
        }
        let m = net.full_connectivity_matrix();
        assert_eq!(m.get(0, 2), m.get(2, 0));
    }

    #[test]
    fn test_band_average_collapses_to_mean() {
        let (csd, signs) = sums(2, 5, 4.0);
        let band = FrequencyBand::new(1.0, 2.0);
        let reducer = PliReducer::new(WeightMode::BandAverage(band), 8.0, 8);
        let net = reducer.reduce(&csd, &signs, 8, None).unwrap();
        let edge = &net.edges()[0];
        assert_eq!(edge.weights().len(), 1);
        assert_relative_eq!(edge.weight(), 0.375, epsilon = 1e-12);
    }

    #[test]
    fn test_zero_trials_is_degenerate() {
        let (csd, signs) = sums(2, 5, 0.0);
        let reducer = PliReducer::new(WeightMode::PerBin, 8.0, 8);
        assert!(matches!(
            reducer.reduce(&csd, &signs, 0, None),
            Err(ConnError::DegenerateInput(_))
        ));
    }

    #[test]
    fn test_zero_power_is_degenerate() {
        let csd = vec![ComplexMatrix::new(2, 2); 5];
        let signs = vec![RealMatrix::new(2, 2); 5];
        let reducer = PliReducer::new(WeightMode::PerBin, 8.0, 8);
        assert!(matches!(
            reducer.reduce(&csd, &signs, 3, None),
            Err(ConnError::DegenerateInput(_))
        ));
    }

    #[test]
    fn test_non_finite_is_degenerate() {
        let (mut csd, signs) = sums(2, 5, 1.0);
        csd[3].set(0, 1, Complex::new(f64::NAN, 0.0));
        let reducer = PliReducer::new(WeightMode::PerBin, 8.0, 8);
        assert!(matches!(
            reducer.reduce(&csd, &signs, 3, None),
            Err(ConnError::DegenerateInput(_))
        ));
    }

    #[test]
    fn test_bin_mismatch_is_internal_error() {
        let (csd, mut signs) = sums(2, 5, 1.0);
        signs.pop();
        let reducer = PliReducer::new(WeightMode::PerBin, 8.0, 8);
        assert!(matches!(
            reducer.reduce(&csd, &signs, 3, None),
            Err(ConnError::InternalInvariantViolation(_))
        ));
    }

    #[test]
    fn test_positions_are_attached() {
        let (csd, signs) = sums(2, 5, 1.0);
        let positions = [[0.0, 0.0, 1.0], [1.0, 0.0, 0.0]];
        let reducer = PliReducer::new(WeightMode::PerBin, 8.0, 8);
        let net = reducer.reduce(&csd, &signs, 1, Some(&positions)).unwrap();
        assert_eq!(net.nodes()[1].position(), Some([1.0, 0.0, 0.0]));
        assert!(reducer.reduce(&csd, &signs, 1, Some(&positions[..1])).is_err());
    }
}
