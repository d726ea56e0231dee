//! Phase Lag Index
//!
//! PLI measures how consistently one channel leads or lags another across
//! trials, ignoring zero-lag coupling:
//!
//! ```text
//! PLI(i, j, f) = | (1/N) Σ_trials sign(Im(C_ij(f))) |
//! ```
//!
//! 0 means the lag sign is random (or the phase difference is exactly 0 or
//! π, as volume conduction produces); 1 means one channel always leads.
//!
//! ## Pipeline
//!
//! ```text
//! validate ─► tapers ─► per-trial CSD (parallel) ─► sums ─► PliReducer ─► Network
//!                             ▲                       │
//!                             └── trial cache ◄───────┘   (incremental mode)
//! ```

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info_span, warn};

use crate::accumulator::{CsdAccumulator, TrialContribution};
use crate::metric::ConnectivityMetric;
use crate::network::Network;
use crate::observe::global_metrics;
use crate::parallel::ParallelTrialProcessor;
use crate::reducer::{PliReducer, PLI_METHOD};
use crate::settings::{ConnectivitySettings, Trial};
use crate::spectral::TrialSpectralEstimator;
use crate::taper::TaperSet;
use crate::types::{ConnError, ConnResult, WeightMode};

/// Phase Lag Index over all trials of a [`ConnectivitySettings`].
#[derive(Debug, Clone, Copy, Default)]
pub struct PhaseLagIndex;

impl PhaseLagIndex {
    pub fn new() -> Self {
        Self
    }

    /// Compute PLI for every channel pair and frequency bin.
    ///
    /// With `cache_trial_spectra` enabled only trials appended since the
    /// previous call are estimated. Nothing in `settings` changes when an
    /// error is returned.
    pub fn calculate(&self, settings: &mut ConnectivitySettings) -> ConnResult<Network> {
        let span = info_span!("pli", trials = settings.len());
        let _enter = span.enter();
        let metrics = global_metrics();
        metrics.set_metric(PLI_METHOD);
        let started = Instant::now();

        match self.compute(settings) {
            Ok(network) => {
                metrics.computations.inc();
                metrics.last_num_channels.set(network.num_nodes() as i64);
                metrics.last_num_trials.set(network.num_trials() as i64);
                metrics.last_num_edges.set(network.num_edges() as i64);
                metrics
                    .compute_latency_us
                    .observe(started.elapsed().as_secs_f64() * 1e6);
                Ok(network)
            }
            Err(e) => {
                metrics.computation_failures.inc();
                warn!(error = %e, "PLI computation failed");
                Err(e)
            }
        }
    }

    fn compute(&self, settings: &mut ConnectivitySettings) -> ConnResult<Network> {
        settings.validate()?;

        let channels = settings
            .num_channels()
            .ok_or_else(|| ConnError::DegenerateInput("no trials".to_string()))?;
        let samples = settings
            .num_samples()
            .ok_or_else(|| ConnError::DegenerateInput("no trials".to_string()))?;
        let fs = settings.sampling_frequency();
        let nfft = settings.nfft();

        let tapers = Arc::new(TaperSet::new(settings.taper(), samples, fs)?);
        debug!(channels, samples, nfft, tapers = tapers.len(), "spectral setup");
        let estimator = TrialSpectralEstimator::new(tapers, nfft, channels)?;
        let processor = ParallelTrialProcessor::new(estimator, settings.num_threads())?;

        let (sums, fresh) = if settings.cache_trial_spectra() {
            let (sums, contributions) = Self::accumulate_cached(&processor, settings)?;
            (sums, Some(contributions))
        } else {
            let trials: Vec<(usize, &Trial)> = settings.trials().enumerate().collect();
            global_metrics().trials_estimated.inc_by(trials.len() as u64);
            (processor.accumulate(&trials, settings.accumulation())?, None)
        };

        if sums.num_trials() != settings.len() {
            return Err(ConnError::InternalInvariantViolation(format!(
                "{} trials accumulated but {} present",
                sums.num_trials(),
                settings.len()
            )));
        }

        let reducer = PliReducer::new(settings.weight_mode(), fs, nfft);
        let mut network = reducer.reduce(
            sums.csd_sum(),
            sums.imag_sign_sum(),
            sums.num_trials(),
            settings.node_positions(),
        )?;

        if let (Some(band), WeightMode::PerBin) = (settings.frequency_band(), settings.weight_mode()) {
            network.set_frequency_range(band.low_hz, band.high_hz)?;
        }

        if let Some(contributions) = fresh {
            settings.commit_cache(sums, contributions);
        }
        Ok(network)
    }

    /// Estimate only uncached trials and fold them into the cached sums.
    ///
    /// The returned sums and contributions are committed by the caller once
    /// the network has been built.
    fn accumulate_cached(
        processor: &ParallelTrialProcessor,
        settings: &ConnectivitySettings,
    ) -> ConnResult<(CsdAccumulator, Vec<(usize, TrialContribution)>)> {
        let estimator = processor.estimator();
        let pending = settings.pending_trials();
        let reused = settings.len() - pending.len();
        let contributions = processor.contributions(&pending)?;

        let mut sums = match settings.cached_sums() {
            Some(cached)
                if cached.num_channels() == estimator.num_channels()
                    && cached.num_bins() == estimator.num_freqs() =>
            {
                cached.clone()
            }
            _ => CsdAccumulator::new(estimator.num_channels(), estimator.num_freqs()),
        };
        for (index, contribution) in &contributions {
            sums.accumulate(*index, contribution)?;
        }

        debug!(estimated = contributions.len(), reused, "updated trial cache");
        let metrics = global_metrics();
        metrics.trials_estimated.inc_by(contributions.len() as u64);
        metrics.cached_trials_reused.inc_by(reused as u64);

        Ok((sums, contributions))
    }
}

impl ConnectivityMetric for PhaseLagIndex {
    fn name(&self) -> &'static str {
        PLI_METHOD
    }

    fn description(&self) -> &'static str {
        "Phase Lag Index: consistency of the sign of the cross-spectral phase"
    }

    fn calculate(&self, settings: &mut ConnectivitySettings) -> ConnResult<Network> {
        PhaseLagIndex::calculate(self, settings)
    }
}
