//! Error types for the R3 diffusion library

use thiserror::Error;

/// Result type alias for this crate
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the library
#[derive(Error, Debug)]
pub enum Error {
    /// Diffusion time outside of [0, 1]
    #[error("Invalid diffusion time {t}: expected a value in [0, 1]")]
    InvalidTime { t: f64 },

    /// Reverse step size outside of [0, 1]
    #[error("Invalid step size {dt}: expected a value in [0, 1]")]
    InvalidStepSize { dt: f64 },

    /// Discrete forward transition cannot be formed
    #[error("Invalid discretization: {0}")]
    InvalidDiscretization(String),

    /// Conditional variance is zero, so the score is undefined
    #[error("Conditional variance vanishes at t = {t}")]
    ZeroVariance { t: f64 },

    /// Centering requested for a batch element with no active points
    #[error("Mask selects no points for batch element {index}")]
    DegenerateMask { index: usize },

    /// Incompatible array shapes
    #[error("Shape mismatch: expected {expected:?}, got {found:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        found: Vec<usize>,
    },

    /// Array is not laid out as [..., n, dim]
    #[error("Expected a point cloud of shape [..., n, dim], got {ndim} axes")]
    InvalidRank { ndim: usize },

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    /// Reshape or dimensionality conversion failed
    #[error("Shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl Error {
    /// Check if the error was caused by an out-of-domain argument
    pub fn is_domain_error(&self) -> bool {
        matches!(
            self,
            Error::InvalidTime { .. }
                | Error::InvalidStepSize { .. }
                | Error::InvalidDiscretization(_)
                | Error::ZeroVariance { .. }
                | Error::DegenerateMask { .. }
        )
    }

    pub(crate) fn shape_mismatch(expected: &[usize], found: &[usize]) -> Self {
        Error::ShapeMismatch {
            expected: expected.to_vec(),
            found: found.to_vec(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_domain_classification() {
        assert!(Error::InvalidTime { t: 1.5 }.is_domain_error());
        assert!(Error::DegenerateMask { index: 0 }.is_domain_error());
        assert!(!Error::ConfigError("bad".into()).is_domain_error());
        assert!(!Error::shape_mismatch(&[3, 3], &[3, 2]).is_domain_error());
    }

    #[test]
    fn test_display() {
        let err = Error::InvalidTime { t: -0.1 };
        assert_eq!(
            err.to_string(),
            "Invalid diffusion time -0.1: expected a value in [0, 1]"
        );

        let err = Error::shape_mismatch(&[3, 3], &[3, 2]);
        assert_eq!(err.to_string(), "Shape mismatch: expected [3, 3], got [3, 2]");
    }
}
