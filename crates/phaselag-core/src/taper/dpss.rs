//! Discrete prolate spheroidal sequences (Slepian tapers).
//!
//! The DPSS of length `N` and normalized half-bandwidth `W` are the
//! eigenvectors of the symmetric tridiagonal matrix
//!
//! ```text
//! diag[i]    = ((N - 1 - 2i) / 2)^2 · cos(2πW)      i = 0..N-1
//! off[i]     = i · (N - i) / 2                      i = 1..N-1
//! ```
//!
//! ordered by decreasing eigenvalue. The largest eigenvalues are located by
//! Sturm-sequence bisection, and the matching eigenvectors are recovered by
//! inverse iteration on a pivoted tridiagonal LU factorization. Only `std`
//! is needed.
//!
//! Each taper is returned with its spectral concentration ratio λ (the
//! fraction of its energy inside `[-W, W]`), which is what multitaper
//! estimators use as the taper weight.

use std::f64::consts::PI;

use crate::types::{ConnError, ConnResult};

const BISECTION_MAX_ITER: usize = 200;
const INVERSE_ITERATIONS: usize = 4;
const PIVOT_FLOOR: f64 = 1e-300;

/// A family of Slepian tapers with their concentration ratios.
#[derive(Debug, Clone)]
pub struct Dpss {
    /// Unit-energy tapers, each of length `N`
    pub windows: Vec<Vec<f64>>,
    /// Concentration ratio of each taper, in (0, 1]
    pub concentrations: Vec<f64>,
}

/// Compute the first `num_tapers` DPSS of length `n`.
///
/// `half_bandwidth` is normalized to the sampling rate (cycles per sample)
/// and must lie in (0, 0.5).
pub fn dpss_windows(n: usize, half_bandwidth: f64, num_tapers: usize) -> ConnResult<Dpss> {
    if n == 0 {
        return Err(ConnError::InvalidConfig(
            "DPSS length must be at least 1".to_string(),
        ));
    }
    if !(half_bandwidth > 0.0 && half_bandwidth < 0.5) {
        return Err(ConnError::InvalidConfig(format!(
            "normalized half-bandwidth {} outside (0, 0.5)",
            half_bandwidth
        )));
    }
    if num_tapers == 0 || num_tapers > n {
        return Err(ConnError::InvalidConfig(format!(
            "number of tapers {} must be in 1..={}",
            num_tapers, n
        )));
    }

    let cos_w = (2.0 * PI * half_bandwidth).cos();
    let diag: Vec<f64> = (0..n)
        .map(|i| {
            let h = (n as f64 - 1.0 - 2.0 * i as f64) / 2.0;
            h * h * cos_w
        })
        .collect();
    // off[0] is unused so that off[i] couples rows i-1 and i
    let off: Vec<f64> = (0..n)
        .map(|i| if i == 0 { 0.0 } else { i as f64 * (n - i) as f64 / 2.0 })
        .collect();

    let mut windows: Vec<Vec<f64>> = Vec::with_capacity(num_tapers);
    for k in 0..num_tapers {
        // k-th largest eigenvalue has ascending index n-1-k
        let eigenvalue = kth_eigenvalue(&diag, &off, n - 1 - k);
        let mut v = inverse_iteration(&diag, &off, eigenvalue, k);

        for prev in &windows {
            let proj = dot(&v, prev);
            for (x, p) in v.iter_mut().zip(prev.iter()) {
                *x -= proj * p;
            }
        }
        normalize(&mut v);
        apply_sign_convention(&mut v, k);
        windows.push(v);
    }

    let concentrations = windows
        .iter()
        .map(|w| concentration_ratio(w, half_bandwidth))
        .collect();

    Ok(Dpss {
        windows,
        concentrations,
    })
}

/// Number of eigenvalues strictly below `x` (Sturm sequence count).
fn count_below(diag: &[f64], off: &[f64], x: f64) -> usize {
    let mut count = 0;
    let mut q = diag[0] - x;
    if q < 0.0 {
        count += 1;
    }
    for i in 1..diag.len() {
        let prev = if q.abs() < PIVOT_FLOOR { PIVOT_FLOOR } else { q };
        q = diag[i] - x - off[i] * off[i] / prev;
        if q < 0.0 {
            count += 1;
        }
    }
    count
}

/// Eigenvalue with ascending index `index` via bisection on Gershgorin bounds.
fn kth_eigenvalue(diag: &[f64], off: &[f64], index: usize) -> f64 {
    let n = diag.len();
    let mut lo = f64::INFINITY;
    let mut hi = f64::NEG_INFINITY;
    for i in 0..n {
        let radius = off[i].abs() + if i + 1 < n { off[i + 1].abs() } else { 0.0 };
        lo = lo.min(diag[i] - radius);
        hi = hi.max(diag[i] + radius);
    }

    for _ in 0..BISECTION_MAX_ITER {
        let mid = 0.5 * (lo + hi);
        if mid <= lo || mid >= hi {
            break;
        }
        if count_below(diag, off, mid) > index {
            hi = mid;
        } else {
            lo = mid;
        }
    }
    0.5 * (lo + hi)
}

/// Pivoted LU factorization of a shifted symmetric tridiagonal matrix.
struct TridiagonalLu {
    dl: Vec<f64>,
    d: Vec<f64>,
    du: Vec<f64>,
    du2: Vec<f64>,
    pivot: Vec<usize>,
}

impl TridiagonalLu {
    fn factor(diag: &[f64], off: &[f64], shift: f64) -> Self {
        let n = diag.len();
        let mut d: Vec<f64> = diag.iter().map(|&v| v - shift).collect();
        let mut dl: Vec<f64> = (1..n).map(|i| off[i]).collect();
        let mut du: Vec<f64> = dl.clone();
        let mut du2 = vec![0.0; n.saturating_sub(2)];
        let mut pivot: Vec<usize> = (0..n).collect();

        for i in 0..n.saturating_sub(1) {
            if d[i].abs() >= dl[i].abs() {
                if d[i] != 0.0 {
                    let fact = dl[i] / d[i];
                    dl[i] = fact;
                    d[i + 1] -= fact * du[i];
                }
            } else {
                // Swap rows i and i+1
                let fact = d[i] / dl[i];
                d[i] = dl[i];
                dl[i] = fact;
                let temp = du[i];
                du[i] = d[i + 1];
                d[i + 1] = temp - fact * d[i + 1];
                if i + 2 < n {
                    du2[i] = du[i + 1];
                    du[i + 1] = -fact * du[i + 1];
                }
                pivot[i] = i + 1;
            }
        }

        let scale = diag
            .iter()
            .chain(off.iter())
            .fold(0.0_f64, |m, x| m.max(x.abs()));
        let floor = (f64::EPSILON * scale).max(PIVOT_FLOOR);
        for v in d.iter_mut() {
            if v.abs() < floor {
                *v = floor.copysign(*v);
            }
        }

        Self {
            dl,
            d,
            du,
            du2,
            pivot,
        }
    }

    fn solve(&self, b: &mut [f64]) {
        let n = b.len();
        for i in 0..n.saturating_sub(1) {
            let ip = self.pivot[i];
            let other = if ip == i { b[i + 1] } else { b[i] };
            let temp = other - self.dl[i] * b[ip];
            b[i] = b[ip];
            b[i + 1] = temp;
        }

        b[n - 1] /= self.d[n - 1];
        if n > 1 {
            b[n - 2] = (b[n - 2] - self.du[n - 2] * b[n - 1]) / self.d[n - 2];
        }
        for i in (0..n.saturating_sub(2)).rev() {
            b[i] = (b[i] - self.du[i] * b[i + 1] - self.du2[i] * b[i + 2]) / self.d[i];
        }
    }
}

fn inverse_iteration(diag: &[f64], off: &[f64], eigenvalue: f64, seed: usize) -> Vec<f64> {
    let n = diag.len();
    let lu = TridiagonalLu::factor(diag, off, eigenvalue);

    // Start vector must have both symmetric and antisymmetric components
    let mut v: Vec<f64> = (0..n)
        .map(|i| 1.0 + 0.5 * ((i + seed + 1) as f64).sin())
        .collect();
    normalize(&mut v);

    for _ in 0..INVERSE_ITERATIONS {
        lu.solve(&mut v);
        normalize(&mut v);
    }
    v
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

fn normalize(v: &mut [f64]) {
    // Rescale first so the squared norm cannot overflow after a near-singular solve
    let peak = v.iter().fold(0.0_f64, |m, x| m.max(x.abs()));
    if !(peak > 0.0 && peak.is_finite()) {
        return;
    }
    for x in v.iter_mut() {
        *x /= peak;
    }
    let norm = dot(v, v).sqrt();
    for x in v.iter_mut() {
        *x /= norm;
    }
}

/// Even tapers get a positive sum, odd tapers a positive first lobe.
fn apply_sign_convention(v: &mut [f64], k: usize) {
    let flip = if k % 2 == 0 {
        v.iter().sum::<f64>() < 0.0
    } else {
        let thresh = (1.0 / v.len() as f64).max(1e-7);
        v.iter()
            .find(|x| x.abs() > thresh)
            .map_or(false, |&x| x < 0.0)
    };
    if flip {
        for x in v.iter_mut() {
            *x = -*x;
        }
    }
}

/// Fraction of a unit-energy taper's energy inside `[-W, W]`.
fn concentration_ratio(window: &[f64], half_bandwidth: f64) -> f64 {
    let n = window.len();
    let mut ratio = 2.0 * half_bandwidth * dot(window, window);
    for lag in 1..n {
        let rxx: f64 = window[..n - lag]
            .iter()
            .zip(window[lag..].iter())
            .map(|(a, b)| a * b)
            .sum();
        ratio += 2.0 * rxx * (2.0 * PI * half_bandwidth * lag as f64).sin() / (PI * lag as f64);
    }
    ratio.min(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_tapers_are_orthonormal() {
        let dpss = dpss_windows(128, 4.0 / 128.0, 7).unwrap();
        assert_eq!(dpss.windows.len(), 7);
        for i in 0..7 {
            for j in 0..7 {
                let expected = if i == j { 1.0 } else { 0.0 };
                assert_relative_eq!(
                    dot(&dpss.windows[i], &dpss.windows[j]),
                    expected,
                    epsilon = 1e-8
                );
            }
        }
    }

    #[test]
    fn test_concentrations_decrease_and_are_high() {
        // NW = 4: the first 2NW - 1 = 7 tapers are well concentrated
        let dpss = dpss_windows(256, 4.0 / 256.0, 8).unwrap();
        for w in dpss.concentrations.windows(2) {
            assert!(w[0] >= w[1] - 1e-9, "concentrations not sorted: {:?}", w);
        }
        assert!(dpss.concentrations[0] > 0.999);
        assert!(dpss.concentrations[5] > 0.9);
        for &c in &dpss.concentrations {
            assert!(c > 0.0 && c <= 1.0 + 1e-9);
        }
    }

    #[test]
    fn test_concentrations_never_exceed_one() {
        let dpss = dpss_windows(2048, 8.0 / 2048.0, 15).unwrap();
        assert!(dpss.concentrations.iter().all(|&c| c > 0.0 && c <= 1.0));
    }

    #[test]
    fn test_symmetry_and_sign_convention() {
        let n = 64;
        let dpss = dpss_windows(n, 3.0 / n as f64, 4).unwrap();
        let even = &dpss.windows[0];
        let odd = &dpss.windows[1];
        for i in 0..n {
            assert_relative_eq!(even[i], even[n - 1 - i], epsilon = 1e-8);
            assert_relative_eq!(odd[i], -odd[n - 1 - i], epsilon = 1e-8);
        }
        assert!(even.iter().sum::<f64>() > 0.0);
        let first_lobe = odd.iter().find(|x| x.abs() > 1.0 / n as f64).unwrap();
        assert!(*first_lobe > 0.0);
    }

    #[test]
    fn test_first_taper_is_bell_shaped() {
        let dpss = dpss_windows(33, 2.0 / 33.0, 1).unwrap();
        let w = &dpss.windows[0];
        assert!(w[16] > w[0]);
        assert!(w[16] > w[32]);
        assert!(w.iter().all(|&x| x > 0.0));
    }

    #[test]
    fn test_sturm_count_matches_small_matrix() {
        // [[2, 1], [1, 2]] has eigenvalues 1 and 3
        let diag = [2.0, 2.0];
        let off = [0.0, 1.0];
        assert_eq!(count_below(&diag, &off, 0.5), 0);
        assert_eq!(count_below(&diag, &off, 2.0), 1);
        assert_eq!(count_below(&diag, &off, 3.5), 2);
        assert_relative_eq!(kth_eigenvalue(&diag, &off, 1), 3.0, epsilon = 1e-10);
        assert_relative_eq!(kth_eigenvalue(&diag, &off, 0), 1.0, epsilon = 1e-10);
    }

    #[test]
    fn test_length_one() {
        let dpss = dpss_windows(1, 0.25, 1).unwrap();
        assert_eq!(dpss.windows[0], vec![1.0]);
        assert_relative_eq!(dpss.concentrations[0], 0.5, epsilon = 1e-12);
    }

    #[test]
    fn test_invalid_parameters() {
        assert!(dpss_windows(0, 0.1, 1).is_err());
        assert!(dpss_windows(64, 0.0, 1).is_err());
        assert!(dpss_windows(64, 0.5, 1).is_err());
        assert!(dpss_windows(64, 0.1, 0).is_err());
        assert!(dpss_windows(4, 0.1, 5).is_err());
    }
}
