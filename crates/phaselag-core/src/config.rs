//! # Configuration
//!
//! YAML configuration for analysis runs: which metrics to compute, the
//! spectral parameters, worker pool size and logging.
//!
//! ## Search Path
//!
//! [`AnalysisConfig::load`] reads the first file found:
//! 1. Path in the `PHASELAG_CONFIG` environment variable
//! 2. `./phaselag.yaml`
//! 3. `<user config dir>/phaselag/config.yaml`
//! 4. `/etc/phaselag/config.yaml`
//!
//! Defaults are used when none exists.
//!
//! ## Example Configuration
//!
//! ```yaml
//! connectivity:
//!   metrics: ["PLI"]
//!   sampling_frequency: 1000.0
//!   nfft: 512
//!   taper:
//!     kind: multitaper
//!     bandwidth_hz: 4.0
//!   frequency_band:
//!     low_hz: 8.0
//!     high_hz: 12.0
//!   accumulation: fold_reduce
//!   num_threads: 8
//!
//! logging:
//!   level: debug
//!   format: json
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::metric::MetricFactory;
use crate::observe::LogConfig;
use crate::settings::ConnectivitySettings;
use crate::taper::TaperConfig;
use crate::types::{AccumulationStrategy, ConnError, FrequencyBand, WeightMode};

/// Environment variable naming an explicit configuration file.
pub const CONFIG_ENV_VAR: &str = "PHASELAG_CONFIG";

/// Errors from loading or checking a configuration.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("config not found: {0}")]
    NotFound(String),
    #[error("failed to read config: {0}")]
    ReadError(String),
    #[error("failed to parse config: {0}")]
    ParseError(String),
    #[error("invalid config: {0}")]
    ValidationError(String),
}

impl From<ConfigError> for ConnError {
    fn from(e: ConfigError) -> Self {
        ConnError::InvalidConfig(e.to_string())
    }
}

/// Parameters of a connectivity run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectivityConfig {
    /// Metric names, resolved through [`MetricFactory`]
    pub metrics: Vec<String>,
    /// Sampling frequency in Hz
    pub sampling_frequency: f64,
    /// FFT length, next power of two above the trial length when unset
    pub nfft: Option<usize>,
    pub taper: TaperConfig,
    /// Band the resulting edge weights are averaged over
    pub frequency_band: Option<FrequencyBand>,
    pub weight_mode: WeightMode,
    pub accumulation: AccumulationStrategy,
    /// Keep per-trial spectra for incremental recomputation
    pub cache_trial_spectra: bool,
    /// Worker threads, 0 for one per core
    pub num_threads: usize,
}

impl Default for ConnectivityConfig {
    fn default() -> Self {
        Self {
            metrics: vec!["PLI".to_string()],
            sampling_frequency: 1000.0,
            nfft: None,
            taper: TaperConfig::default(),
            frequency_band: None,
            weight_mode: WeightMode::default(),
            accumulation: AccumulationStrategy::default(),
            cache_trial_spectra: false,
            num_threads: 0,
        }
    }
}

impl ConnectivityConfig {
    /// Empty settings carrying these parameters.
    pub fn settings(&self) -> ConnectivitySettings {
        let mut settings = ConnectivitySettings::new(self.sampling_frequency)
            .with_taper(self.taper.clone())
            .with_weight_mode(self.weight_mode)
            .with_accumulation(self.accumulation)
            .with_trial_cache(self.cache_trial_spectra)
            .with_num_threads(self.num_threads);
        if let Some(nfft) = self.nfft {
            settings.set_nfft(nfft);
        }
        if let Some(band) = self.frequency_band {
            settings.set_frequency_band(Some(band));
        }
        settings
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.sampling_frequency > 0.0 && self.sampling_frequency.is_finite()) {
            return Err(ConfigError::ValidationError(
                "sampling_frequency must be positive".to_string(),
            ));
        }
        if self.nfft == Some(0) {
            return Err(ConfigError::ValidationError("nfft must be > 0".to_string()));
        }
        if self.metrics.is_empty() {
            return Err(ConfigError::ValidationError(
                "at least one metric is required".to_string(),
            ));
        }
        if let Some(unknown) = self.metrics.iter().find(|m| MetricFactory::create(m).is_none()) {
            return Err(ConfigError::ValidationError(format!(
                "unknown metric '{}', available: {}",
                unknown,
                MetricFactory::list().join(", ")
            )));
        }
        if let TaperConfig::Multitaper {
            bandwidth_hz,
            num_tapers,
            ..
        } = &self.taper
        {
            if !(*bandwidth_hz > 0.0 && bandwidth_hz.is_finite()) {
                return Err(ConfigError::ValidationError(
                    "taper bandwidth_hz must be positive".to_string(),
                ));
            }
            if *num_tapers == Some(0) {
                return Err(ConfigError::ValidationError(
                    "num_tapers must be > 0".to_string(),
                ));
            }
        }
        let bands = self.frequency_band.iter().chain(match &self.weight_mode {
            WeightMode::BandAverage(band) => Some(band),
            WeightMode::PerBin => None,
        });
        for band in bands {
            band.validate(self.sampling_frequency)
                .map_err(|e| ConfigError::ValidationError(e.to_string()))?;
        }
        Ok(())
    }
}

/// Complete configuration file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub version: String,
    pub connectivity: ConnectivityConfig,
    pub logging: LogConfig,
    /// Named alternatives to `connectivity`, e.g. one per frequency band
    pub profiles: HashMap<String, ConnectivityConfig>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            connectivity: ConnectivityConfig::default(),
            logging: LogConfig::default(),
            profiles: HashMap::new(),
        }
    }
}

impl AnalysisConfig {
    /// Load from the default search path, falling back to defaults.
    ///
    /// A `PHASELAG_CONFIG` pointing at a missing file is an error.
    pub fn load() -> Result<Self, ConfigError> {
        let explicit = std::env::var_os(CONFIG_ENV_VAR).map(PathBuf::from);
        Self::load_first(explicit.as_deref(), &Self::config_search_paths())
    }

    fn load_first(explicit: Option<&Path>, candidates: &[PathBuf]) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            if !path.exists() {
                return Err(ConfigError::NotFound(format!(
                    "{} (from {})",
                    path.display(),
                    CONFIG_ENV_VAR
                )));
            }
            return Self::load_from(path);
        }
        match candidates.iter().find(|p| p.exists()) {
            Some(path) => Self::load_from(path),
            None => Ok(Self::default()),
        }
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadError(format!("{}: {}", path.display(), e)))?;
        Self::parse(&content)
    }

    /// Parse and validate YAML.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(yaml).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = serde_yaml::to_string(self).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        std::fs::write(path, content)
            .map_err(|e| ConfigError::ReadError(format!("{}: {}", path.display(), e)))
    }

    /// Copy with the named profile as the active connectivity section.
    pub fn with_profile(&self, name: &str) -> Result<Self, ConfigError> {
        let profile = self
            .profiles
            .get(name)
            .ok_or_else(|| ConfigError::NotFound(format!("profile '{}' not found", name)))?;
        let mut config = self.clone();
        config.connectivity = profile.clone();
        Ok(config)
    }

    pub fn config_search_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from("./phaselag.yaml")];
        if let Some(dirs) = directories::ProjectDirs::from("", "", "phaselag") {
            paths.push(dirs.config_dir().join("config.yaml"));
        }
        paths.push(PathBuf::from("/etc/phaselag/config.yaml"));
        paths
    }

    /// Check the active section and every profile.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.connectivity.validate()?;
        for (name, profile) in &self.profiles {
            profile
                .validate()
                .map_err(|e| ConfigError::ValidationError(format!("profile '{}': {}", name, e)))?;
        }
        Ok(())
    }

    /// Annotated sample configuration with two band profiles.
    pub fn example_yaml() -> String {
        let band_profile = |low_hz: f64, high_hz: f64| ConnectivityConfig {
            taper: TaperConfig::Multitaper {
                bandwidth_hz: 2.0,
                num_tapers: None,
                low_bias: true,
            },
            frequency_band: Some(FrequencyBand::new(low_hz, high_hz)),
            ..Default::default()
        };
        let mut profiles = HashMap::new();
        profiles.insert("alpha".to_string(), band_profile(8.0, 12.0));
        profiles.insert("beta".to_string(), band_profile(13.0, 30.0));

        let config = Self {
            profiles,
            ..Default::default()
        };
        serde_yaml::to_string(&config).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::taper::WindowKind;
    use std::fs;

    #[test]
    fn test_default_config_is_valid() {
        let config = AnalysisConfig::default();
        assert_eq!(config.version, "1.0");
        assert_eq!(config.connectivity.metrics, vec!["PLI".to_string()]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_yaml() {
        let yaml = r#"
connectivity:
  metrics: ["pli"]
  sampling_frequency: 250.0
  nfft: 128
  taper:
    kind: window
    window: hamming
  weight_mode:
    mode: band_average
    low_hz: 8.0
    high_hz: 12.0
  accumulation: locked
  cache_trial_spectra: true
  num_threads: 2
logging:
  level: debug
"#;
        let config = AnalysisConfig::parse(yaml).unwrap();
        let c = &config.connectivity;
        assert_eq!(c.sampling_frequency, 250.0);
        assert_eq!(c.nfft, Some(128));
        assert_eq!(c.taper, TaperConfig::Window { window: WindowKind::Hamming });
        assert_eq!(c.weight_mode, WeightMode::BandAverage(FrequencyBand::new(8.0, 12.0)));
        assert_eq!(c.accumulation, AccumulationStrategy::Locked);
        assert!(c.cache_trial_spectra);

        let settings = c.settings();
        assert_eq!(settings.nfft(), 128);
        assert_eq!(settings.num_threads(), 2);
        assert!(settings.cache_trial_spectra());
    }

    #[test]
    fn test_parse_partial_yaml() {
        let config = AnalysisConfig::parse("connectivity:\n  sampling_frequency: 500.0\n").unwrap();
        assert_eq!(config.connectivity.sampling_frequency, 500.0);
        assert_eq!(config.connectivity.taper, TaperConfig::default());
        assert!(config.connectivity.nfft.is_none());
    }

    #[test]
    fn test_validation_errors() {
        let bad = |edit: fn(&mut ConnectivityConfig)| {
            let mut c = ConnectivityConfig::default();
            edit(&mut c);
            c.validate()
        };
        assert!(bad(|c| c.sampling_frequency = 0.0).is_err());
        assert!(bad(|c| c.nfft = Some(0)).is_err());
        assert!(bad(|c| c.metrics.clear()).is_err());
        assert!(bad(|c| c.metrics = vec!["coherence".to_string()]).is_err());
        assert!(bad(|c| c.frequency_band = Some(FrequencyBand::new(900.0, 950.0))).is_err());
        assert!(bad(|c| {
            c.taper = TaperConfig::Multitaper {
                bandwidth_hz: -1.0,
                num_tapers: None,
                low_bias: true,
            }
        })
        .is_err());

        let err = AnalysisConfig::parse("connectivity:\n  metrics: [wpli]\n").unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
        assert!(matches!(ConnError::from(err), ConnError::InvalidConfig(_)));
    }

    #[test]
    fn test_parse_error() {
        let err = AnalysisConfig::parse("connectivity: [not, a, map]").unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }

    #[test]
    fn test_profiles() {
        let config = AnalysisConfig::parse(&AnalysisConfig::example_yaml()).unwrap();
        let alpha = config.with_profile("alpha").unwrap();
        assert_eq!(
            alpha.connectivity.frequency_band,
            Some(FrequencyBand::new(8.0, 12.0))
        );
        assert!(matches!(
            config.with_profile("gamma"),
            Err(ConfigError::NotFound(_))
        ));
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("phaselag.yaml");
        let mut config = AnalysisConfig::default();
        config.connectivity.num_threads = 3;
        config.save(&path).unwrap();

        let loaded = AnalysisConfig::load_from(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_search_order() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("first.yaml");
        let second = dir.path().join("second.yaml");
        fs::write(&second, "connectivity:\n  num_threads: 2\n").unwrap();

        let candidates = vec![first.clone(), second.clone()];
        let loaded = AnalysisConfig::load_first(None, &candidates).unwrap();
        assert_eq!(loaded.connectivity.num_threads, 2);

        fs::write(&first, "connectivity:\n  num_threads: 1\n").unwrap();
        let loaded = AnalysisConfig::load_first(None, &candidates).unwrap();
        assert_eq!(loaded.connectivity.num_threads, 1);

        // An explicit path overrides the search path
        let loaded = AnalysisConfig::load_first(Some(&second), &candidates).unwrap();
        assert_eq!(loaded.connectivity.num_threads, 2);

        let missing = dir.path().join("missing.yaml");
        assert!(matches!(
            AnalysisConfig::load_first(Some(&missing), &candidates),
            Err(ConfigError::NotFound(_))
        ));

        let none = AnalysisConfig::load_first(None, &[missing]).unwrap();
        assert_eq!(none, AnalysisConfig::default());
    }

    #[test]
    fn test_config_search_paths() {
        let paths = AnalysisConfig::config_search_paths();
        assert_eq!(paths.first(), Some(&PathBuf::from("./phaselag.yaml")));
        assert_eq!(paths.last(), Some(&PathBuf::from("/etc/phaselag/config.yaml")));
    }
}
