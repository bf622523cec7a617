//! Backend selection
//!
//! The filtering backend is resolved once per run from the user's preference
//! and the compiled-in capabilities, then passed down explicitly.
//!
//! The frequency backend runs on the CPU and wraps around at image borders,
//! so it is only used when asked for (`--gpu yes`). `auto` stays on the
//! spatial path, which is what a machine without an accelerator runs.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::filter::{FilterStrategy, SpatialFilter};

/// Whether the frequency path was compiled in
pub const FREQUENCY_AVAILABLE: bool = cfg!(feature = "fft");

/// Filtering backend for one run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Direct spatial correlation on the CPU
    #[default]
    Spatial,
    /// FFT-based filtering
    Frequency,
}

impl Backend {
    /// Instantiate the filtering strategy for this backend.
    ///
    /// Asking for `Frequency` without the `fft` feature yields the spatial
    /// strategy; [`BackendPreference::resolve`] never produces that pairing.
    pub fn strategy(self) -> Box<dyn FilterStrategy> {
        match self {
            Backend::Spatial => Box::new(SpatialFilter),
            #[cfg(feature = "fft")]
            Backend::Frequency => Box::new(super::filter::FrequencyFilter::new()),
            #[cfg(not(feature = "fft"))]
            Backend::Frequency => Box::new(SpatialFilter),
        }
    }

    /// Backend name
    pub fn name(&self) -> &'static str {
        match self {
            Backend::Spatial => "spatial",
            Backend::Frequency => "frequency",
        }
    }

    /// Backends compiled into this build
    pub fn available() -> Vec<Backend> {
        let mut backends = vec![Backend::Spatial];
        if FREQUENCY_AVAILABLE {
            backends.push(Backend::Frequency);
        }
        backends
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Requested use of the FFT backend (`--gpu yes|no|auto`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum BackendPreference {
    Yes,
    No,
    #[default]
    Auto,
}

impl BackendPreference {
    /// Resolve against the compiled-in capabilities.
    pub fn resolve(self) -> Backend {
        self.resolve_with(FREQUENCY_AVAILABLE)
    }

    /// Resolve against an explicit availability flag.
    pub fn resolve_with(self, frequency_available: bool) -> Backend {
        match self {
            BackendPreference::No | BackendPreference::Auto => Backend::Spatial,
            BackendPreference::Yes if frequency_available => Backend::Frequency,
            BackendPreference::Yes => {
                tracing::warn!(
                    "Accelerated backend requested but not available. Falling back to spatial."
                );
                Backend::Spatial
            }
        }
    }
}

impl FromStr for BackendPreference {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "yes" => Ok(BackendPreference::Yes),
            "no" => Ok(BackendPreference::No),
            "auto" => Ok(BackendPreference::Auto),
            other => Err(format!("expected yes, no or auto, got '{}'", other)),
        }
    }
}
