//! Diffuser configuration.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::{Error, Result};

/// Default spatial dimension
pub const DEFAULT_DIM: usize = 3;

/// Default starting value of the variance schedule
pub const DEFAULT_MIN_B: f64 = 0.1;

/// Default ending value of the variance schedule
pub const DEFAULT_MAX_B: f64 = 20.0;

/// Default coordinate scaling (Angstroms to nanometres)
pub const DEFAULT_SCALING: f64 = 0.1;

/// Immutable parameters of a VP-SDE diffuser.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DiffuserConfig {
    /// Spatial dimension of each point
    pub dim: usize,
    /// Noise rate at t = 0
    pub min_b: f64,
    /// Noise rate at t = 1
    pub max_b: f64,
    /// Factor applied to physical coordinates before any SDE arithmetic
    pub scaling: f64,
}

impl Default for DiffuserConfig {
    fn default() -> Self {
        Self {
            dim: DEFAULT_DIM,
            min_b: DEFAULT_MIN_B,
            max_b: DEFAULT_MAX_B,
            scaling: DEFAULT_SCALING,
        }
    }
}

impl DiffuserConfig {
    /// Create a configuration, validating it.
    pub fn new(dim: usize, min_b: f64, max_b: f64, scaling: f64) -> Result<Self> {
        let config = Self {
            dim,
            min_b,
            max_b,
            scaling,
        };
        config.validate()?;
        Ok(config)
    }

    /// Check the schedule bounds and scale.
    pub fn validate(&self) -> Result<()> {
        if self.dim == 0 {
            return Err(Error::ConfigError("dim must be at least 1".to_string()));
        }
        if !self.min_b.is_finite() || !self.max_b.is_finite() {
            return Err(Error::ConfigError(format!(
                "schedule bounds must be finite, got min_b={}, max_b={}",
                self.min_b, self.max_b
            )));
        }
        if self.min_b <= 0.0 || self.min_b >= self.max_b {
            return Err(Error::ConfigError(format!(
                "expected 0 < min_b < max_b, got min_b={}, max_b={}",
                self.min_b, self.max_b
            )));
        }
        if !self.scaling.is_finite() || self.scaling <= 0.0 {
            return Err(Error::ConfigError(format!(
                "scaling must be positive and finite, got {}",
                self.scaling
            )));
        }
        Ok(())
    }

    /// Load configuration from a JSON file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: DiffuserConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a JSON file.
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }
}
