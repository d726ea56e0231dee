//! Connectivity settings and trial storage
//!
//! [`ConnectivitySettings`] owns the trials of a run together with the
//! run-wide spectral parameters. A metric borrows it for the duration of one
//! computation.
//!
//! ## Incremental Mode
//!
//! With `cache_trial_spectra` enabled the settings also keep, per trial, the
//! CSD contribution computed the first time the trial was seen, plus the
//! running sums over all cached trials. This is what lets a sliding window
//! of trials be recomputed cheaply:
//!
//! ```text
//! append(t5)        → only t5 is estimated on the next calculate()
//! remove_first(1)   → t1's contribution is subtracted from the running sums
//! set_nfft(..)      → every cached contribution is dropped
//! ```
//!
//! ## Example
//!
//! ```rust
//! use phaselag_core::settings::{ConnectivitySettings, Trial};
//!
//! let mut settings = ConnectivitySettings::new(250.0).with_nfft(64);
//! settings.append(Trial::from_channels(vec![vec![0.0; 64], vec![1.0; 64]]).unwrap());
//! assert_eq!(settings.len(), 1);
//! assert_eq!(settings.num_channels(), Some(2));
//! assert_eq!(settings.num_freqs(), 33);
//! ```

use std::sync::Arc;

use tracing::{debug, warn};

use crate::accumulator::{CsdAccumulator, TrialContribution};
use crate::matrix::RealMatrix;
use crate::taper::TaperConfig;
use crate::types::{
    num_freq_bins, AccumulationStrategy, ConnError, ConnResult, FrequencyBand, WeightMode,
};

/// One epoch of simultaneous samples, channels × samples.
#[derive(Debug, Clone, PartialEq)]
pub struct Trial {
    data: RealMatrix,
}

impl Trial {
    pub fn new(data: RealMatrix) -> Self {
        Self { data }
    }

    /// Build a trial from one sample vector per channel.
    pub fn from_channels(channels: Vec<Vec<f64>>) -> ConnResult<Self> {
        Ok(Self {
            data: RealMatrix::from_rows(channels)?,
        })
    }

    pub fn num_channels(&self) -> usize {
        self.data.rows()
    }

    pub fn num_samples(&self) -> usize {
        self.data.cols()
    }

    /// Samples of one channel.
    pub fn channel(&self, c: usize) -> &[f64] {
        self.data.row(c)
    }

    pub fn data(&self) -> &RealMatrix {
        &self.data
    }

    pub fn is_finite(&self) -> bool {
        self.data.is_finite()
    }
}

#[derive(Debug, Clone)]
struct TrialSlot {
    trial: Trial,
    contribution: Option<Arc<TrialContribution>>,
}

/// Trials plus run-wide parameters for one connectivity computation.
#[derive(Debug, Clone)]
pub struct ConnectivitySettings {
    sampling_frequency: f64,
    nfft: Option<usize>,
    taper: TaperConfig,
    weight_mode: WeightMode,
    frequency_band: Option<FrequencyBand>,
    accumulation: AccumulationStrategy,
    cache_trial_spectra: bool,
    num_threads: usize,
    node_positions: Option<Vec<[f64; 3]>>,
    trials: Vec<TrialSlot>,
    cached_sums: Option<CsdAccumulator>,
}

impl ConnectivitySettings {
    /// Empty settings with default spectral parameters.
    pub fn new(sampling_frequency: f64) -> Self {
        Self {
            sampling_frequency,
            nfft: None,
            taper: TaperConfig::default(),
            weight_mode: WeightMode::default(),
            frequency_band: None,
            accumulation: AccumulationStrategy::default(),
            cache_trial_spectra: false,
            num_threads: 0,
            node_positions: None,
            trials: Vec::new(),
            cached_sums: None,
        }
    }

    pub fn with_nfft(mut self, nfft: usize) -> Self {
        self.set_nfft(nfft);
        self
    }

    pub fn with_taper(mut self, taper: TaperConfig) -> Self {
        self.set_taper(taper);
        self
    }

    pub fn with_weight_mode(mut self, mode: WeightMode) -> Self {
        self.weight_mode = mode;
        self
    }

    /// Band used for the edge weight view on the resulting network.
    pub fn with_frequency_band(mut self, band: FrequencyBand) -> Self {
        self.frequency_band = Some(band);
        self
    }

    pub fn with_accumulation(mut self, strategy: AccumulationStrategy) -> Self {
        self.accumulation = strategy;
        self
    }

    pub fn with_trial_cache(mut self, enabled: bool) -> Self {
        self.cache_trial_spectra = enabled;
        if !enabled {
            self.invalidate_cache();
        }
        self
    }

    /// Worker pool size, 0 for the rayon default.
    pub fn with_num_threads(mut self, num_threads: usize) -> Self {
        self.num_threads = num_threads;
        self
    }

    /// Sensor positions, one per channel, copied onto network nodes.
    pub fn with_node_positions(mut self, positions: Vec<[f64; 3]>) -> Self {
        self.node_positions = Some(positions);
        self
    }

    pub fn set_nfft(&mut self, nfft: usize) {
        if self.nfft != Some(nfft) {
            self.nfft = Some(nfft);
            self.invalidate_cache();
        }
    }

    pub fn set_taper(&mut self, taper: TaperConfig) {
        if self.taper != taper {
            self.taper = taper;
            self.invalidate_cache();
        }
    }

    pub fn set_sampling_frequency(&mut self, sampling_frequency: f64) {
        if self.sampling_frequency != sampling_frequency {
            self.sampling_frequency = sampling_frequency;
            self.invalidate_cache();
        }
    }

    pub fn set_weight_mode(&mut self, mode: WeightMode) {
        self.weight_mode = mode;
    }

    pub fn set_frequency_band(&mut self, band: Option<FrequencyBand>) {
        self.frequency_band = band;
    }

    pub fn sampling_frequency(&self) -> f64 {
        self.sampling_frequency
    }

    /// FFT length: the explicit value, or the next power of two covering a
    /// trial. Zero when neither is known.
    pub fn nfft(&self) -> usize {
        match self.nfft {
            Some(n) => n,
            None => self.num_samples().map_or(0, usize::next_power_of_two),
        }
    }

    pub fn num_freqs(&self) -> usize {
        match self.nfft() {
            0 => 0,
            n => num_freq_bins(n),
        }
    }

    pub fn taper(&self) -> &TaperConfig {
        &self.taper
    }

    pub fn weight_mode(&self) -> WeightMode {
        self.weight_mode
    }

    pub fn frequency_band(&self) -> Option<FrequencyBand> {
        self.frequency_band
    }

    pub fn accumulation(&self) -> AccumulationStrategy {
        self.accumulation
    }

    pub fn cache_trial_spectra(&self) -> bool {
        self.cache_trial_spectra
    }

    pub fn num_threads(&self) -> usize {
        self.num_threads
    }

    pub fn node_positions(&self) -> Option<&[[f64; 3]]> {
        self.node_positions.as_deref()
    }

    // Trials

    pub fn append(&mut self, trial: Trial) {
        self.trials.push(TrialSlot {
            trial,
            contribution: None,
        });
    }

    pub fn append_many<I: IntoIterator<Item = Trial>>(&mut self, trials: I) {
        for trial in trials {
            self.append(trial);
        }
    }

    /// Drop the oldest `n` trials, subtracting any cached contributions.
    pub fn remove_first(&mut self, n: usize) -> ConnResult<()> {
        let n = n.min(self.trials.len());
        let removed: Vec<TrialSlot> = self.trials.drain(..n).collect();

        if self.trials.is_empty() {
            self.invalidate_cache();
            return Ok(());
        }

        let result = match self.cached_sums.as_mut() {
            Some(sums) => removed
                .iter()
                .enumerate()
                .filter_map(|(i, slot)| slot.contribution.as_ref().map(|c| (i, c)))
                .try_for_each(|(i, contribution)| sums.subtract(i, contribution)),
            None => Ok(()),
        };
        if let Err(e) = result {
            warn!(error = %e, "dropping trial cache after failed removal");
            self.invalidate_cache();
            return Err(e);
        }
        debug!(removed = n, remaining = self.trials.len(), "removed oldest trials");
        Ok(())
    }

    pub fn clear(&mut self) {
        self.trials.clear();
        self.invalidate_cache();
    }

    pub fn len(&self) -> usize {
        self.trials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trials.is_empty()
    }

    pub fn trial(&self, index: usize) -> Option<&Trial> {
        self.trials.get(index).map(|slot| &slot.trial)
    }

    pub fn trials(&self) -> impl Iterator<Item = &Trial> + '_ {
        self.trials.iter().map(|slot| &slot.trial)
    }

    /// Channel count of the first trial.
    pub fn num_channels(&self) -> Option<usize> {
        self.trials.first().map(|slot| slot.trial.num_channels())
    }

    /// Sample count of the first trial.
    pub fn num_samples(&self) -> Option<usize> {
        self.trials.first().map(|slot| slot.trial.num_samples())
    }

    // Cache

    /// Forget every cached contribution and running sum.
    pub fn invalidate_cache(&mut self) {
        for slot in &mut self.trials {
            slot.contribution = None;
        }
        self.cached_sums = None;
    }

    /// Number of trials whose contribution is already in the running sums.
    pub fn num_cached_trials(&self) -> usize {
        self.trials
            .iter()
            .filter(|slot| slot.contribution.is_some())
            .count()
    }

    pub(crate) fn cached_sums(&self) -> Option<&CsdAccumulator> {
        self.cached_sums.as_ref()
    }

    /// Trials not yet folded into the running sums, with their indices.
    pub(crate) fn pending_trials(&self) -> Vec<(usize, &Trial)> {
        self.trials
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.contribution.is_none())
            .map(|(i, slot)| (i, &slot.trial))
            .collect()
    }

    /// Store new running sums together with the contributions they include.
    pub(crate) fn commit_cache(&mut self, sums: CsdAccumulator, contributions: Vec<(usize, TrialContribution)>) {
        for (index, contribution) in contributions {
            if let Some(slot) = self.trials.get_mut(index) {
                slot.contribution = Some(Arc::new(contribution));
            }
        }
        self.cached_sums = Some(sums);
    }

    // Validation

    /// Check run-wide parameters and that all trials share one shape.
    pub fn validate(&self) -> ConnResult<()> {
        if !(self.sampling_frequency > 0.0 && self.sampling_frequency.is_finite()) {
            return Err(ConnError::InvalidConfig(format!(
                "sampling frequency {} must be positive",
                self.sampling_frequency
            )));
        }
        if self.nfft == Some(0) {
            return Err(ConnError::InvalidConfig("nfft must be at least 1".to_string()));
        }

        let first = self
            .trials
            .first()
            .ok_or_else(|| ConnError::DegenerateInput("no trials".to_string()))?;
        let channels = first.trial.num_channels();
        let samples = first.trial.num_samples();
        if channels == 0 {
            return Err(ConnError::DegenerateInput("zero channels".to_string()));
        }
        if samples == 0 {
            return Err(ConnError::DegenerateInput("zero samples per trial".to_string()));
        }

        for (index, slot) in self.trials.iter().enumerate() {
            let trial = &slot.trial;
            if trial.num_channels() != channels || trial.num_samples() != samples {
                return Err(ConnError::InvalidTrialShape {
                    trial: index,
                    expected_channels: channels,
                    expected_samples: samples,
                    channels: trial.num_channels(),
                    samples: trial.num_samples(),
                });
            }
            if !trial.is_finite() {
                return Err(ConnError::DegenerateInput(format!(
                    "trial {} contains non-finite samples",
                    index
                )));
            }
        }

        if let Some(positions) = &self.node_positions {
            if positions.len() != channels {
                return Err(ConnError::InvalidConfig(format!(
                    "{} node positions for {} channels",
                    positions.len(),
                    channels
                )));
            }
        }

        let nfft = self.nfft();
        if let Some(band) = &self.frequency_band {
            band.to_bins(self.sampling_frequency, nfft)?;
        }
        if let WeightMode::BandAverage(band) = &self.weight_mode {
            band.to_bins(self.sampling_frequency, nfft)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::ComplexMatrix;
    use crate::taper::WindowKind;

    fn trial(channels: usize, samples: usize) -> Trial {
        Trial::from_channels(vec![vec![0.5; samples]; channels]).unwrap()
    }

    fn dummy_contribution(channels: usize, bins: usize) -> TrialContribution {
        TrialContribution::new(
            channels,
            (0..bins).map(|_| ComplexMatrix::new(channels, channels)).collect(),
            (0..bins).map(|_| RealMatrix::new(channels, channels)).collect(),
        )
        .unwrap()
    }

    #[test]
    fn test_trial_accessors() {
        let t = Trial::from_channels(vec![vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]]).unwrap();
        assert_eq!(t.num_channels(), 2);
        assert_eq!(t.num_samples(), 3);
        assert_eq!(t.channel(1), &[4.0, 5.0, 6.0]);
    }

    #[test]
    fn test_default_nfft_is_next_power_of_two() {
        let mut settings = ConnectivitySettings::new(100.0);
        assert_eq!(settings.nfft(), 0);
        assert_eq!(settings.num_freqs(), 0);
        settings.append(trial(2, 100));
        assert_eq!(settings.nfft(), 128);
        assert_eq!(settings.num_freqs(), 65);
        settings.set_nfft(100);
        assert_eq!(settings.nfft(), 100);
    }

    #[test]
    fn test_validate_rejects_empty_and_bad_shapes() {
        let settings = ConnectivitySettings::new(100.0);
        assert!(matches!(settings.validate(), Err(ConnError::DegenerateInput(_))));

        let mut settings = ConnectivitySettings::new(100.0);
        settings.append(trial(2, 16));
        settings.append(trial(2, 16));
        settings.append(trial(3, 16));
        match settings.validate() {
            Err(ConnError::InvalidTrialShape { trial, channels, .. }) => {
                assert_eq!(trial, 2);
                assert_eq!(channels, 3);
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_validate_rejects_zero_channels_and_nan() {
        let mut settings = ConnectivitySettings::new(100.0);
        settings.append(Trial::new(RealMatrix::new(0, 16)));
        assert!(matches!(settings.validate(), Err(ConnError::DegenerateInput(_))));

        let mut settings = ConnectivitySettings::new(100.0);
        settings.append(Trial::from_channels(vec![vec![0.0, f64::NAN], vec![1.0, 1.0]]).unwrap());
        assert!(matches!(settings.validate(), Err(ConnError::DegenerateInput(_))));
    }

    #[test]
    fn test_validate_parameters() {
        let mut settings = ConnectivitySettings::new(0.0);
        settings.append(trial(2, 16));
        assert!(matches!(settings.validate(), Err(ConnError::InvalidConfig(_))));

        let settings_bad_nfft = ConnectivitySettings::new(100.0).with_nfft(0);
        assert!(matches!(settings_bad_nfft.validate(), Err(ConnError::InvalidConfig(_))));

        let mut settings = ConnectivitySettings::new(100.0).with_node_positions(vec![[0.0; 3]]);
        settings.append(trial(2, 16));
        assert!(matches!(settings.validate(), Err(ConnError::InvalidConfig(_))));

        let mut settings = ConnectivitySettings::new(100.0)
            .with_weight_mode(WeightMode::BandAverage(FrequencyBand::new(60.0, 70.0)));
        settings.append(trial(2, 16));
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_remove_first_and_clear() {
        let mut settings = ConnectivitySettings::new(100.0);
        settings.append_many((0..5).map(|_| trial(2, 8)));
        settings.remove_first(2).unwrap();
        assert_eq!(settings.len(), 3);
        settings.remove_first(10).unwrap();
        assert!(settings.is_empty());

        settings.append(trial(2, 8));
        settings.clear();
        assert!(settings.is_empty());
    }

    #[test]
    fn test_cache_commit_and_invalidate() {
        let mut settings = ConnectivitySettings::new(8.0).with_nfft(8).with_trial_cache(true);
        settings.append_many((0..3).map(|_| trial(2, 8)));
        assert_eq!(settings.pending_trials().len(), 3);

        let mut sums = CsdAccumulator::new(2, 5);
        let mut contributions = Vec::new();
        for i in 0..3 {
            let c = dummy_contribution(2, 5);
            sums.accumulate(i, &c).unwrap();
            contributions.push((i, c));
        }
        settings.commit_cache(sums, contributions);
        assert_eq!(settings.num_cached_trials(), 3);
        assert!(settings.pending_trials().is_empty());

        settings.remove_first(1).unwrap();
        assert_eq!(settings.cached_sums().unwrap().num_trials(), 2);

        settings.append(trial(2, 8));
        assert_eq!(settings.pending_trials(), vec![(2, settings.trial(2).unwrap())]);

        // Spectral parameter change drops the cache
        settings.set_taper(TaperConfig::Window {
            window: WindowKind::Rectangular,
        });
        assert_eq!(settings.num_cached_trials(), 0);
        assert!(settings.cached_sums().is_none());
    }

    #[test]
    fn test_setting_same_value_keeps_cache() {
        let mut settings = ConnectivitySettings::new(8.0).with_nfft(8);
        settings.append(trial(2, 8));
        let c = dummy_contribution(2, 5);
        let mut sums = CsdAccumulator::new(2, 5);
        sums.accumulate(0, &c).unwrap();
        settings.commit_cache(sums, vec![(0, c)]);

        settings.set_nfft(8);
        settings.set_sampling_frequency(8.0);
        assert_eq!(settings.num_cached_trials(), 1);
    }
}
