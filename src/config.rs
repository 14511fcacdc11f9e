//! Run configuration.
//!
//! Defaults come from [`RunConfig::new`]; any subset of fields can be
//! overridden from a TOML file:
//!
//! ```toml
//! backend = "rayon"
//! threads = 8
//! accumulator_workers = 4
//! normalization = "emitter_area"
//! log_file = "output.log"
//! ```

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::sim::backend::{ComputeBackend, RayonBackend, SerialBackend};

/// How the summed pair contributions are turned into the reported value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Normalization {
    /// Report the raw sum over all emitter/receiver pairs.
    #[default]
    None,
    /// Divide the sum by the total emitter area (`VF = Σ dF / A_emitter`).
    EmitterArea,
}

impl Normalization {
    /// Applies the normalization to a raw pair sum. A zero emitter area yields 0.
    pub fn apply(self, sum: f64, emitter_area: f64) -> f64 {
        match self {
            Normalization::None => sum,
            Normalization::EmitterArea if emitter_area > 0.0 => sum / emitter_area,
            Normalization::EmitterArea => 0.0,
        }
    }
}

/// Which compute backend executes kernel dispatches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Data-parallel receiver loop on a dedicated rayon thread pool.
    #[default]
    Rayon,
    /// Single-threaded reference backend.
    Serial,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunConfig {
    pub backend: BackendKind,
    /// Rayon pool size; 0 lets rayon pick from the available parallelism.
    pub threads: usize,
    /// Worker threads summing result rows.
    pub accumulator_workers: usize,
    pub normalization: Normalization,
    /// Append every progress event to this file when set.
    pub log_file: Option<PathBuf>,
}

impl RunConfig {
    pub fn new() -> Self {
        Self {
            backend: BackendKind::Rayon,
            threads: 0,
            accumulator_workers: 4,
            normalization: Normalization::None,
            log_file: None,
        }
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text).context("Failed to parse run configuration")?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?;
        Self::from_toml_str(&text).with_context(|| format!("Invalid config: {}", path.display()))
    }

    pub fn validate(&self) -> Result<()> {
        if self.accumulator_workers == 0 {
            return Err(anyhow!("accumulator_workers must be at least 1"));
        }
        Ok(())
    }

    /// Creates the configured compute backend (not yet prepared).
    pub fn make_backend(&self) -> Box<dyn ComputeBackend> {
        match self.backend {
            BackendKind::Rayon => Box::new(RayonBackend::new(self.threads)),
            BackendKind::Serial => Box::new(SerialBackend),
        }
    }
}

impl Default for RunConfig {
    fn default() -> Self {
        Self::new()
    }
}
