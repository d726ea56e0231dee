//! Dense row-major matrices for trial data and cross-spectra.
//!
//! A single generic [`Matrix`] backs both the real channel × sample trial
//! data and the complex channel × channel cross-spectral density matrices.
//! Shape mismatches in arithmetic are reported as
//! [`ConnError::InternalInvariantViolation`]: every caller inside the crate
//! builds operands with matching shapes, so a mismatch is a bug.
//!
//! ## Example
//!
//! ```rust
//! use phaselag_core::matrix::RealMatrix;
//!
//! let mut a = RealMatrix::from_data(2, 2, vec![1.0, 2.0, 3.0, 4.0]).unwrap();
//! let b = RealMatrix::from_data(2, 2, vec![1.0, 1.0, 1.0, 1.0]).unwrap();
//! a.add_assign_checked(&b).unwrap();
//! assert_eq!(a.get(1, 0), 4.0);
//! ```

use std::ops::{AddAssign, SubAssign};

use crate::types::{Complex, ConnError, ConnResult};

/// Row-major dense matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct Matrix<T> {
    rows: usize,
    cols: usize,
    data: Vec<T>,
}

/// Real-valued matrix (trial data, sign sums).
pub type RealMatrix = Matrix<f64>;

/// Complex-valued matrix (cross-spectral density).
pub type ComplexMatrix = Matrix<Complex>;

impl<T: Copy + Default> Matrix<T> {
    /// Create a matrix filled with `T::default()` (zero for numeric types).
    pub fn new(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            data: vec![T::default(); rows * cols],
        }
    }

    /// Create a matrix from row-major data.
    pub fn from_data(rows: usize, cols: usize, data: Vec<T>) -> ConnResult<Self> {
        if data.len() != rows * cols {
            return Err(ConnError::InvalidConfig(format!(
                "matrix data length {} does not match {}x{}",
                data.len(),
                rows,
                cols
            )));
        }
        Ok(Self { rows, cols, data })
    }

    /// Create a matrix from a list of equally long rows.
    pub fn from_rows(rows: Vec<Vec<T>>) -> ConnResult<Self> {
        let num_rows = rows.len();
        let num_cols = rows.first().map_or(0, Vec::len);
        let mut data = Vec::with_capacity(num_rows * num_cols);
        for (r, row) in rows.into_iter().enumerate() {
            if row.len() != num_cols {
                return Err(ConnError::InvalidConfig(format!(
                    "row {} has {} columns, expected {}",
                    r,
                    row.len(),
                    num_cols
                )));
            }
            data.extend(row);
        }
        Ok(Self {
            rows: num_rows,
            cols: num_cols,
            data,
        })
    }

    #[inline]
    pub fn rows(&self) -> usize {
        self.rows
    }

    #[inline]
    pub fn cols(&self) -> usize {
        self.cols
    }

    #[inline]
    pub fn get(&self, r: usize, c: usize) -> T {
        self.data[r * self.cols + c]
    }

    #[inline]
    pub fn set(&mut self, r: usize, c: usize, val: T) {
        self.data[r * self.cols + c] = val;
    }

    /// Borrow one row as a slice.
    #[inline]
    pub fn row(&self, r: usize) -> &[T] {
        &self.data[r * self.cols..(r + 1) * self.cols]
    }

    /// All elements in row-major order.
    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    pub fn same_shape<U>(&self, other: &Matrix<U>) -> bool {
        self.rows == other.rows && self.cols == other.cols
    }

    fn check_shape(&self, other: &Self, op: &str) -> ConnResult<()> {
        if !self.same_shape(other) {
            return Err(ConnError::InternalInvariantViolation(format!(
                "cannot {} {}x{} matrix with {}x{} matrix",
                op, self.rows, self.cols, other.rows, other.cols
            )));
        }
        Ok(())
    }
}

impl<T: Copy + Default + AddAssign> Matrix<T> {
    /// Element-wise `self += other`.
    pub fn add_assign_checked(&mut self, other: &Self) -> ConnResult<()> {
        self.check_shape(other, "add")?;
        for (a, &b) in self.data.iter_mut().zip(other.data.iter()) {
            *a += b;
        }
        Ok(())
    }
}

impl<T: Copy + Default + SubAssign> Matrix<T> {
    /// Element-wise `self -= other`.
    pub fn sub_assign_checked(&mut self, other: &Self) -> ConnResult<()> {
        self.check_shape(other, "subtract")?;
        for (a, &b) in self.data.iter_mut().zip(other.data.iter()) {
            *a -= b;
        }
        Ok(())
    }
}

impl RealMatrix {
    /// True when every element is finite.
    pub fn is_finite(&self) -> bool {
        self.data.iter().all(|v| v.is_finite())
    }
}

impl ComplexMatrix {
    /// True when every element has finite real and imaginary parts.
    pub fn is_finite(&self) -> bool {
        self.data.iter().all(|c| c.re.is_finite() && c.im.is_finite())
    }

    /// Sum of the diagonal. For a CSD matrix the real part is the total
    /// auto-spectral power at that bin.
    pub fn trace(&self) -> Complex {
        let n = self.rows.min(self.cols);
        (0..n).map(|i| self.get(i, i)).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_construction_and_get_set() {
        let mut m = RealMatrix::new(2, 3);
        assert_eq!(m.rows(), 2);
        assert_eq!(m.cols(), 3);
        assert_eq!(m.get(1, 2), 0.0);

        m.set(1, 2, 7.5);
        assert_eq!(m.get(1, 2), 7.5);
        assert_eq!(m.row(1), &[0.0, 0.0, 7.5]);
    }

    #[test]
    fn test_from_data_rejects_bad_length() {
        assert!(RealMatrix::from_data(2, 2, vec![1.0, 2.0, 3.0]).is_err());
    }

    #[test]
    fn test_from_rows() {
        let m = RealMatrix::from_rows(vec![vec![1.0, 2.0], vec![3.0, 4.0]]).unwrap();
        assert_eq!(m.get(1, 0), 3.0);

        let ragged = RealMatrix::from_rows(vec![vec![1.0, 2.0], vec![3.0]]);
        assert!(matches!(ragged, Err(ConnError::InvalidConfig(_))));

        let empty = RealMatrix::from_rows(Vec::new()).unwrap();
        assert_eq!(empty.rows(), 0);
        assert_eq!(empty.cols(), 0);
    }

    #[test]
    fn test_add_and_sub() {
        let mut a = ComplexMatrix::new(2, 2);
        let mut b = ComplexMatrix::new(2, 2);
        b.set(0, 1, Complex::new(1.0, -2.0));

        a.add_assign_checked(&b).unwrap();
        a.add_assign_checked(&b).unwrap();
        assert_eq!(a.get(0, 1), Complex::new(2.0, -4.0));

        a.sub_assign_checked(&b).unwrap();
        assert_eq!(a.get(0, 1), Complex::new(1.0, -2.0));
    }

    #[test]
    fn test_shape_mismatch_is_invariant_violation() {
        let mut a = RealMatrix::new(2, 2);
        let b = RealMatrix::new(3, 3);
        assert!(matches!(
            a.add_assign_checked(&b),
            Err(ConnError::InternalInvariantViolation(_))
        ));
    }

    #[test]
    fn test_trace_and_finite() {
        let mut m = ComplexMatrix::new(2, 2);
        m.set(0, 0, Complex::new(2.0, 0.0));
        m.set(1, 1, Complex::new(3.0, 0.0));
        assert_eq!(m.trace(), Complex::new(5.0, 0.0));
        assert!(m.is_finite());

        m.set(0, 1, Complex::new(f64::NAN, 0.0));
        assert!(!m.is_finite());
    }
}
