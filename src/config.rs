//! Configuration file support
//!
//! Settings come from, in increasing priority:
//!
//! 1. Built-in defaults
//! 2. `./rl-deblur.toml` or `<config dir>/rl-deblur/config.toml`
//! 3. Command-line arguments
//!
//! ```toml
//! iterations = 15
//! psf_size = 9
//! psf_sigma = 2.5
//! gpu = "no"
//! threads = 4
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::deconv::psf::{DEFAULT_PSF_SIGMA, DEFAULT_PSF_SIZE};
use crate::deconv::richardson_lucy::{
    DEFAULT_CLIP_HIGH, DEFAULT_CLIP_LOW, DEFAULT_EPS, DEFAULT_ITERATIONS, DEFAULT_SMOOTH_SIGMA,
};
use crate::deconv::{generate_psf, BackendPreference, DeconvError, DeconvOptions, Psf};

/// Local config file name
pub const LOCAL_CONFIG_FILE: &str = "rl-deblur.toml";

/// Config directory name under the user config dir
pub const CONFIG_DIR_NAME: &str = "rl-deblur";

/// Config error types
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

// ============================================================
// File config
// ============================================================

/// Settings as read from a TOML file; unset keys keep their defaults
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub iterations: Option<i64>,
    pub psf_size: Option<usize>,
    pub psf_sigma: Option<f32>,
    pub eps: Option<f32>,
    pub clip_low: Option<f32>,
    pub clip_high: Option<f32>,
    pub smooth_sigma: Option<f32>,
    pub gpu: Option<BackendPreference>,
    pub threads: Option<usize>,
    pub parallel_channels: Option<bool>,
}

impl Config {
    /// Load from the first existing default location, or defaults.
    ///
    /// A file that exists but does not parse is an error, not a fallback.
    pub fn load() -> Result<Self> {
        match Self::find() {
            Some(path) => Self::load_from_path(&path),
            None => Ok(Self::default()),
        }
    }

    /// First existing file among [`Config::search_paths`]
    pub fn find() -> Option<PathBuf> {
        let found = Self::search_paths().into_iter().find(|path| path.is_file());
        if let Some(path) = &found {
            tracing::debug!("Loading config from {}", path.display());
        }
        found
    }

    /// Load from an explicit file
    pub fn load_from_path(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse TOML text
    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Default locations, in priority order
    pub fn search_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from(LOCAL_CONFIG_FILE)];
        if let Some(dir) = dirs::config_dir() {
            paths.push(dir.join(CONFIG_DIR_NAME).join("config.toml"));
        }
        paths
    }

    /// Apply command-line overrides on top of this file config
    pub fn merge_with_cli(&self, cli: &CliOverrides) -> RunConfig {
        let defaults = RunConfig::default();
        RunConfig {
            iterations: cli
                .iterations
                .or(self.iterations)
                .unwrap_or(defaults.iterations),
            psf_size: cli.psf_size.or(self.psf_size).unwrap_or(defaults.psf_size),
            psf_sigma: cli.psf_sigma.or(self.psf_sigma).unwrap_or(defaults.psf_sigma),
            eps: self.eps.unwrap_or(defaults.eps),
            clip_low: self.clip_low.unwrap_or(defaults.clip_low),
            clip_high: self.clip_high.unwrap_or(defaults.clip_high),
            smooth_sigma: self.smooth_sigma.unwrap_or(defaults.smooth_sigma),
            gpu: cli.gpu.or(self.gpu).unwrap_or(defaults.gpu),
            threads: cli.threads.or(self.threads),
            parallel_channels: cli
                .parallel_channels
                .or(self.parallel_channels)
                .unwrap_or(defaults.parallel_channels),
        }
    }
}

/// Values explicitly given on the command line
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub iterations: Option<i64>,
    pub psf_size: Option<usize>,
    pub psf_sigma: Option<f32>,
    pub gpu: Option<BackendPreference>,
    pub threads: Option<usize>,
    pub parallel_channels: Option<bool>,
}

impl CliOverrides {
    pub fn new() -> Self {
        Self::default()
    }
}

// ============================================================
// Effective config
// ============================================================

/// Fully resolved settings for one run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunConfig {
    pub iterations: i64,
    pub psf_size: usize,
    pub psf_sigma: f32,
    pub eps: f32,
    pub clip_low: f32,
    pub clip_high: f32,
    pub smooth_sigma: f32,
    pub gpu: BackendPreference,
    pub threads: Option<usize>,
    pub parallel_channels: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            iterations: DEFAULT_ITERATIONS as i64,
            psf_size: DEFAULT_PSF_SIZE,
            psf_sigma: DEFAULT_PSF_SIGMA,
            eps: DEFAULT_EPS,
            clip_low: DEFAULT_CLIP_LOW,
            clip_high: DEFAULT_CLIP_HIGH,
            smooth_sigma: DEFAULT_SMOOTH_SIGMA,
            gpu: BackendPreference::Auto,
            threads: None,
            parallel_channels: false,
        }
    }
}

impl RunConfig {
    /// Deconvolution options; a negative iteration count is rejected.
    pub fn deconv_options(&self) -> crate::deconv::Result<DeconvOptions> {
        let iterations = usize::try_from(self.iterations).map_err(|_| {
            DeconvError::InvalidParameter(format!(
                "iterations must be non-negative, got {}",
                self.iterations
            ))
        })?;

        let options = DeconvOptions::builder()
            .iterations(iterations)
            .eps(self.eps)
            .clip(self.clip_low, self.clip_high)
            .smooth_sigma(self.smooth_sigma)
            .build();
        options.validate()?;
        Ok(options)
    }

    /// PSF for this run
    pub fn psf(&self) -> crate::deconv::Result<Psf> {
        generate_psf(self.psf_size, self.psf_sigma)
    }

    /// Pretty JSON for plans and logs
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_run_config() {
        let cfg = Config::default().merge_with_cli(&CliOverrides::new());
        assert_eq!(cfg, RunConfig::default());
        assert_eq!(cfg.iterations, 10);
        assert_eq!(cfg.psf_size, 7);
        assert_eq!(cfg.psf_sigma, 2.0);
        assert_eq!(cfg.gpu, BackendPreference::Auto);
    }

    #[test]
    fn test_parse_toml() {
        let cfg = Config::from_toml(
            r#"
            iterations = 15
            psf_size = 9
            psf_sigma = 2.5
            gpu = "no"
            clip_low = 0.8
            "#,
        )
        .unwrap();
        assert_eq!(cfg.iterations, Some(15));
        assert_eq!(cfg.psf_size, Some(9));
        assert_eq!(cfg.gpu, Some(BackendPreference::No));
        assert_eq!(cfg.clip_low, Some(0.8));
        assert!(cfg.threads.is_none());
    }

    #[test]
    fn test_parse_rejects_unknown_key() {
        assert!(matches!(
            Config::from_toml("iteratons = 3"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_cli_takes_precedence() {
        let file = Config {
            iterations: Some(20),
            psf_size: Some(5),
            gpu: Some(BackendPreference::Yes),
            threads: Some(2),
            ..Default::default()
        };
        let cli = CliOverrides {
            iterations: Some(3),
            gpu: Some(BackendPreference::No),
            ..Default::default()
        };

        let merged = file.merge_with_cli(&cli);
        assert_eq!(merged.iterations, 3);
        assert_eq!(merged.psf_size, 5);
        assert_eq!(merged.gpu, BackendPreference::No);
        assert_eq!(merged.threads, Some(2));
    }

    #[test]
    fn test_load_from_path() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "iterations = 4\nparallel_channels = true").unwrap();

        let cfg = Config::load_from_path(file.path()).unwrap();
        assert_eq!(cfg.iterations, Some(4));
        assert_eq!(cfg.parallel_channels, Some(true));
    }

    #[test]
    fn test_load_from_path_malformed() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "iteratoins = 4").unwrap();

        assert!(matches!(
            Config::load_from_path(file.path()),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_load_missing_path() {
        let result = Config::load_from_path(Path::new("/nonexistent/rl-deblur.toml"));
        assert!(matches!(result, Err(ConfigError::NotFound(_))));
    }

    #[test]
    fn test_negative_iterations_rejected() {
        let cfg = RunConfig {
            iterations: -1,
            ..Default::default()
        };
        assert!(matches!(
            cfg.deconv_options(),
            Err(DeconvError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_deconv_options_from_config() {
        let cfg = RunConfig {
            iterations: 0,
            clip_low: 0.9,
            clip_high: 1.1,
            ..Default::default()
        };
        let opts = cfg.deconv_options().unwrap();
        assert_eq!(opts.iterations, 0);
        assert_eq!((opts.clip_low, opts.clip_high), (0.9, 1.1));
    }

    #[test]
    fn test_invalid_psf_from_config() {
        let cfg = RunConfig {
            psf_size: 6,
            ..Default::default()
        };
        assert!(cfg.psf().is_err());
        assert!(RunConfig::default().psf().is_ok());
    }

    #[test]
    fn test_to_json() {
        let json = RunConfig::default().to_json().unwrap();
        assert!(json.contains("\"iterations\": 10"));
        assert!(json.contains("\"gpu\": \"auto\""));
    }

    #[test]
    fn test_search_paths_start_local() {
        let paths = Config::search_paths();
        assert_eq!(paths[0], PathBuf::from(LOCAL_CONFIG_FILE));
    }
}
