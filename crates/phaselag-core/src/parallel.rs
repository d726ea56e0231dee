//! Parallel trial processing
//!
//! One task per trial on a rayon pool. Each task builds its trial's
//! contribution locally and only then hands it to an accumulator, so a
//! failing trial never leaves half of its bins in the sums.
//!
//! ## Strategies
//!
//! - [`AccumulationStrategy::FoldReduce`]: every worker folds into its own
//!   [`CsdAccumulator`]; the partial sums are merged pairwise at the end.
//!   No locking.
//! - [`AccumulationStrategy::Locked`]: every worker adds into one
//!   [`SharedCsdAccumulator`], holding the lock for a single trial update.
//!
//! With `num_threads == 0` work runs on the global rayon pool.

use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use tracing::debug;

use crate::accumulator::{CsdAccumulator, SharedCsdAccumulator, TrialContribution};
use crate::settings::Trial;
use crate::spectral::TrialSpectralEstimator;
use crate::types::{AccumulationStrategy, ConnError, ConnResult};

/// Runs a [`TrialSpectralEstimator`] over many trials concurrently.
#[derive(Debug)]
pub struct ParallelTrialProcessor {
    estimator: TrialSpectralEstimator,
    pool: Option<ThreadPool>,
}

impl ParallelTrialProcessor {
    /// Create a processor with a dedicated pool of `num_threads` workers,
    /// or the global pool when `num_threads` is 0.
    pub fn new(estimator: TrialSpectralEstimator, num_threads: usize) -> ConnResult<Self> {
        let pool = if num_threads > 0 {
            let pool = ThreadPoolBuilder::new()
                .num_threads(num_threads)
                .thread_name(|i| format!("phaselag-worker-{}", i))
                .build()
                .map_err(|e| ConnError::InvalidConfig(format!("cannot build worker pool: {}", e)))?;
            Some(pool)
        } else {
            None
        };
        Ok(Self { estimator, pool })
    }

    pub fn estimator(&self) -> &TrialSpectralEstimator {
        &self.estimator
    }

    /// Number of worker threads that will run trial tasks.
    pub fn num_threads(&self) -> usize {
        self.pool
            .as_ref()
            .map_or_else(rayon::current_num_threads, ThreadPool::current_num_threads)
    }

    fn install<R, F>(&self, op: F) -> R
    where
        R: Send,
        F: FnOnce() -> R + Send,
    {
        match &self.pool {
            Some(pool) => pool.install(op),
            None => op(),
        }
    }

    /// Sum the contributions of `trials` using the given strategy.
    pub fn accumulate(
        &self,
        trials: &[(usize, &Trial)],
        strategy: AccumulationStrategy,
    ) -> ConnResult<CsdAccumulator> {
        debug!(trials = trials.len(), ?strategy, threads = self.num_threads(), "accumulating trials");
        match strategy {
            AccumulationStrategy::FoldReduce => self.accumulate_fold_reduce(trials),
            AccumulationStrategy::Locked => self.accumulate_locked(trials),
        }
    }

    /// Per-worker accumulators merged in a final reduction.
    pub fn accumulate_fold_reduce(&self, trials: &[(usize, &Trial)]) -> ConnResult<CsdAccumulator> {
        let estimator = &self.estimator;
        let channels = estimator.num_channels();
        let bins = estimator.num_freqs();

        self.install(|| {
            trials
                .par_iter()
                .try_fold(
                    || CsdAccumulator::new(channels, bins),
                    |mut acc, &(index, trial)| {
                        let contribution = estimator.trial_contribution(index, trial)?;
                        acc.accumulate(index, &contribution)?;
                        Ok(acc)
                    },
                )
                .try_reduce(|| CsdAccumulator::new(channels, bins), CsdAccumulator::merge)
        })
    }

    /// One shared accumulator behind a mutex.
    pub fn accumulate_locked(&self, trials: &[(usize, &Trial)]) -> ConnResult<CsdAccumulator> {
        let estimator = &self.estimator;
        let shared = SharedCsdAccumulator::new(estimator.num_channels(), estimator.num_freqs());

        self.install(|| {
            trials.par_iter().try_for_each(|&(index, trial)| {
                let contribution = estimator.trial_contribution(index, trial)?;
                shared.accumulate(index, &contribution)
            })
        })?;
        shared.into_inner()
    }

    /// Contributions of `trials`, kept individually for the trial cache.
    ///
    /// Either every trial succeeds or the first error is returned.
    pub fn contributions(&self, trials: &[(usize, &Trial)]) -> ConnResult<Vec<(usize, TrialContribution)>> {
        let estimator = &self.estimator;
        self.install(|| {
            trials
                .par_iter()
                .map(|&(index, trial)| {
                    estimator
                        .trial_contribution(index, trial)
                        .map(|contribution| (index, contribution))
                })
                .collect()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::taper::{TaperSet, WindowKind};
    use approx::assert_relative_eq;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::sync::Arc;

    fn random_trials(count: usize, channels: usize, samples: usize, seed: u64) -> Vec<Trial> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..count)
            .map(|_| {
                let data = (0..channels)
                    .map(|_| (0..samples).map(|_| rng.gen_range(-1.0..1.0)).collect())
                    .collect();
                Trial::from_channels(data).unwrap()
            })
            .collect()
    }

    fn processor(samples: usize, channels: usize, threads: usize) -> ParallelTrialProcessor {
        let tapers = Arc::new(TaperSet::single(WindowKind::Hann, samples));
        let estimator = TrialSpectralEstimator::new(tapers, samples, channels).unwrap();
        ParallelTrialProcessor::new(estimator, threads).unwrap()
    }

    fn indexed(trials: &[Trial]) -> Vec<(usize, &Trial)> {
        trials.iter().enumerate().collect()
    }

    #[test]
    fn test_strategies_agree() {
        let trials = random_trials(24, 3, 32, 7);
        let runner = processor(32, 3, 4);
        let folded = runner.accumulate_fold_reduce(&indexed(&trials)).unwrap();
        let locked = runner.accumulate_locked(&indexed(&trials)).unwrap();

        assert_eq!(folded.num_trials(), 24);
        assert_eq!(locked.num_trials(), 24);
        assert_eq!(folded.imag_sign_sum(), locked.imag_sign_sum());
        for (a, b) in folded.csd_sum().iter().zip(locked.csd_sum()) {
            for (x, y) in a.as_slice().iter().zip(b.as_slice()) {
                assert_relative_eq!(x.re, y.re, epsilon = 1e-9, max_relative = 1e-12);
                assert_relative_eq!(x.im, y.im, epsilon = 1e-9, max_relative = 1e-12);
            }
        }
    }

    #[test]
    fn test_matches_sequential_sum() {
        let trials = random_trials(10, 2, 16, 3);
        let runner = processor(16, 2, 2);

        let mut sequential = CsdAccumulator::new(2, runner.estimator().num_freqs());
        for (i, t) in trials.iter().enumerate() {
            let c = runner.estimator().trial_contribution(i, t).unwrap();
            sequential.accumulate(i, &c).unwrap();
        }
        let parallel = runner.accumulate(&indexed(&trials), AccumulationStrategy::FoldReduce).unwrap();
        assert_eq!(parallel.imag_sign_sum(), sequential.imag_sign_sum());
    }

    #[test]
    fn test_contributions_keep_indices() {
        let trials = random_trials(6, 2, 16, 11);
        let runner = processor(16, 2, 0);
        let selected: Vec<(usize, &Trial)> = indexed(&trials).into_iter().skip(2).collect();
        let contributions = runner.contributions(&selected).unwrap();
        let indices: Vec<usize> = contributions.iter().map(|(i, _)| *i).collect();
        assert_eq!(indices, vec![2, 3, 4, 5]);
    }

    #[test]
    fn test_bad_trial_aborts_every_strategy() {
        let mut trials = random_trials(5, 2, 16, 5);
        trials.push(Trial::from_channels(vec![vec![0.0; 15]; 2]).unwrap());
        let runner = processor(16, 2, 2);
        let all = indexed(&trials);

        for strategy in [AccumulationStrategy::FoldReduce, AccumulationStrategy::Locked] {
            assert!(matches!(
                runner.accumulate(&all, strategy),
                Err(ConnError::InvalidTrialShape { trial: 5, .. })
            ));
        }
        assert!(runner.contributions(&all).is_err());
    }

    #[test]
    fn test_dedicated_pool_size() {
        assert_eq!(processor(8, 1, 3).num_threads(), 3);
    }
}
