//! Cross-spectral accumulation across trials.
//!
//! Each trial yields a [`TrialContribution`]: one CSD matrix and one
//! sign(Im(CSD)) matrix per frequency bin. The [`CsdAccumulator`] keeps the
//! running sums of both, keyed by bin.
//!
//! Addition is commutative, so the order in which trials arrive does not
//! matter. What does matter is that a trial's contribution lands whole: every
//! update validates all bins before touching the sums, so a rejected
//! contribution leaves the accumulator unchanged.
//!
//! Two ways of sharing an accumulator across workers are provided:
//!
//! - [`CsdAccumulator::merge`] for per-worker accumulators folded at the end
//! - [`SharedCsdAccumulator`] for a single mutex-guarded accumulator with one
//!   short critical section per trial

use std::sync::Mutex;

use tracing::trace;

use crate::matrix::{ComplexMatrix, RealMatrix};
use crate::types::{ConnError, ConnResult};

/// The CSD and sign(Im) matrices produced by one trial.
#[derive(Debug, Clone, PartialEq)]
pub struct TrialContribution {
    num_channels: usize,
    csd: Vec<ComplexMatrix>,
    imag_sign: Vec<RealMatrix>,
}

impl TrialContribution {
    /// Bundle per-bin matrices, checking that every matrix is
    /// `num_channels` square and both lists cover the same bins.
    pub fn new(num_channels: usize, csd: Vec<ComplexMatrix>, imag_sign: Vec<RealMatrix>) -> ConnResult<Self> {
        if csd.len() != imag_sign.len() {
            return Err(ConnError::InternalInvariantViolation(format!(
                "contribution has {} CSD bins but {} sign bins",
                csd.len(),
                imag_sign.len()
            )));
        }
        let square = |rows: usize, cols: usize| rows == num_channels && cols == num_channels;
        if !csd.iter().all(|m| square(m.rows(), m.cols()))
            || !imag_sign.iter().all(|m| square(m.rows(), m.cols()))
        {
            return Err(ConnError::InternalInvariantViolation(format!(
                "contribution matrices are not {}x{}",
                num_channels, num_channels
            )));
        }
        Ok(Self {
            num_channels,
            csd,
            imag_sign,
        })
    }

    pub fn num_channels(&self) -> usize {
        self.num_channels
    }

    pub fn num_bins(&self) -> usize {
        self.csd.len()
    }

    pub fn csd(&self) -> &[ComplexMatrix] {
        &self.csd
    }

    pub fn imag_sign(&self) -> &[RealMatrix] {
        &self.imag_sign
    }
}

/// Running per-bin sums of CSD and sign(Im(CSD)) matrices.
#[derive(Debug, Clone, PartialEq)]
pub struct CsdAccumulator {
    num_channels: usize,
    csd_sum: Vec<ComplexMatrix>,
    imag_sign_sum: Vec<RealMatrix>,
    num_trials: usize,
}

impl CsdAccumulator {
    /// Empty sums for `num_bins` bins of `num_channels` × `num_channels`.
    pub fn new(num_channels: usize, num_bins: usize) -> Self {
        Self {
            num_channels,
            csd_sum: (0..num_bins)
                .map(|_| ComplexMatrix::new(num_channels, num_channels))
                .collect(),
            imag_sign_sum: (0..num_bins)
                .map(|_| RealMatrix::new(num_channels, num_channels))
                .collect(),
            num_trials: 0,
        }
    }

    pub fn num_channels(&self) -> usize {
        self.num_channels
    }

    pub fn num_bins(&self) -> usize {
        self.csd_sum.len()
    }

    /// Number of trials currently folded into the sums.
    pub fn num_trials(&self) -> usize {
        self.num_trials
    }

    pub fn csd_sum(&self) -> &[ComplexMatrix] {
        &self.csd_sum
    }

    pub fn imag_sign_sum(&self) -> &[RealMatrix] {
        &self.imag_sign_sum
    }

    fn check_compatible(&self, contribution: &TrialContribution, trial_index: usize) -> ConnResult<()> {
        if contribution.num_bins() != self.num_bins() {
            return Err(ConnError::InternalInvariantViolation(format!(
                "trial {} has {} bins, accumulator expects {}",
                trial_index,
                contribution.num_bins(),
                self.num_bins()
            )));
        }
        if contribution.num_channels() != self.num_channels {
            return Err(ConnError::InternalInvariantViolation(format!(
                "trial {} has {} channels, accumulator expects {}",
                trial_index,
                contribution.num_channels(),
                self.num_channels
            )));
        }
        Ok(())
    }

    /// Add one trial's matrices into the sums.
    pub fn accumulate(&mut self, trial_index: usize, contribution: &TrialContribution) -> ConnResult<()> {
        self.check_compatible(contribution, trial_index)?;
        for (sum, m) in self.csd_sum.iter_mut().zip(contribution.csd()) {
            sum.add_assign_checked(m)?;
        }
        for (sum, m) in self.imag_sign_sum.iter_mut().zip(contribution.imag_sign()) {
            sum.add_assign_checked(m)?;
        }
        self.num_trials += 1;
        trace!(trial_index, total = self.num_trials, "accumulated trial");
        Ok(())
    }

    /// Remove a previously accumulated trial from the sums.
    pub fn subtract(&mut self, trial_index: usize, contribution: &TrialContribution) -> ConnResult<()> {
        if self.num_trials == 0 {
            return Err(ConnError::InternalInvariantViolation(format!(
                "cannot remove trial {} from an empty accumulator",
                trial_index
            )));
        }
        self.check_compatible(contribution, trial_index)?;
        for (sum, m) in self.csd_sum.iter_mut().zip(contribution.csd()) {
            sum.sub_assign_checked(m)?;
        }
        for (sum, m) in self.imag_sign_sum.iter_mut().zip(contribution.imag_sign()) {
            sum.sub_assign_checked(m)?;
        }
        self.num_trials -= 1;
        trace!(trial_index, total = self.num_trials, "removed trial");
        Ok(())
    }

    /// Fold another accumulator's sums into this one.
    pub fn merge(mut self, other: CsdAccumulator) -> ConnResult<Self> {
        if other.num_trials == 0 {
            return Ok(self);
        }
        if self.num_trials == 0 {
            return Ok(other);
        }
        if other.num_bins() != self.num_bins() || other.num_channels != self.num_channels {
            return Err(ConnError::InternalInvariantViolation(format!(
                "cannot merge {} bins x {} channels into {} bins x {} channels",
                other.num_bins(),
                other.num_channels,
                self.num_bins(),
                self.num_channels
            )));
        }
        for (sum, m) in self.csd_sum.iter_mut().zip(other.csd_sum.iter()) {
            sum.add_assign_checked(m)?;
        }
        for (sum, m) in self.imag_sign_sum.iter_mut().zip(other.imag_sign_sum.iter()) {
            sum.add_assign_checked(m)?;
        }
        self.num_trials += other.num_trials;
        Ok(self)
    }
}

/// A [`CsdAccumulator`] behind a mutex, for concurrent `accumulate` calls.
#[derive(Debug)]
pub struct SharedCsdAccumulator {
    inner: Mutex<CsdAccumulator>,
}

impl SharedCsdAccumulator {
    pub fn new(num_channels: usize, num_bins: usize) -> Self {
        Self {
            inner: Mutex::new(CsdAccumulator::new(num_channels, num_bins)),
        }
    }

    /// Add one trial's matrices while holding the lock for the whole update.
    pub fn accumulate(&self, trial_index: usize, contribution: &TrialContribution) -> ConnResult<()> {
        let mut guard = self.inner.lock().map_err(|_| {
            ConnError::InternalInvariantViolation("accumulator lock poisoned".to_string())
        })?;
        guard.accumulate(trial_index, contribution)
    }

    pub fn num_trials(&self) -> ConnResult<usize> {
        self.inner
            .lock()
            .map(|guard| guard.num_trials())
            .map_err(|_| ConnError::InternalInvariantViolation("accumulator lock poisoned".to_string()))
    }

    /// Release the sums once every worker has finished.
    pub fn into_inner(self) -> ConnResult<CsdAccumulator> {
        self.inner
            .into_inner()
            .map_err(|_| ConnError::InternalInvariantViolation("accumulator lock poisoned".to_string()))
    }
}
