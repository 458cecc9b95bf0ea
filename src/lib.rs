//! # R3 Diffusion
//!
//! A variance-preserving SDE (VP-SDE) over 3D point clouds such as molecular
//! coordinates, used as the noising process of a score-based generative model.
//!
//! This library provides:
//! - A linear noise schedule β(t) with its closed-form integral
//! - Closed-form sampling of the forward marginal p(x_t | x_0) and its score
//! - Discrete forward transitions matching an `num_t`-step sampler
//! - A reverse-time Euler–Maruyama step with masking and recentering
//! - Prior sampling for initializing reverse trajectories
//!
//! The caller owns the time-stepping loop and the random generator; the
//! diffuser itself is an immutable value that is safe to share across threads.
//!
//! ## Example
//!
//! ```rust
//! use ndarray::array;
//! use r3_diffusion::{DiffuserConfig, R3Diffuser, ReverseOptions};
//!
//! # fn main() -> r3_diffusion::Result<()> {
//! let diffuser = R3Diffuser::new(DiffuserConfig::default())?;
//! let mut rng = rand::thread_rng();
//!
//! let x_0 = array![[0.0, 0.0, 0.0], [0.0, 1.0, 0.0], [1.0, 0.0, 0.0]];
//! let (x_t, score_t) = diffuser.forward_marginal(&x_0, &array![0.5], &mut rng)?;
//!
//! let x_prev = diffuser.reverse(
//!     &x_t,
//!     &score_t,
//!     0.5,
//!     0.01,
//!     None,
//!     ReverseOptions::default(),
//!     &mut rng,
//! )?;
//! assert_eq!(x_prev.shape(), &[3, 3]);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod sde;

pub use config::DiffuserConfig;
pub use error::{Error, Result};
pub use sde::{LinearSchedule, R3Diffuser, ReverseOptions, TransitionDistribution};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::DiffuserConfig;
    pub use crate::error::{Error, Result};
    pub use crate::sde::{
        center, masked_centroid, LinearSchedule, R3Diffuser, ReverseOptions,
        TransitionDistribution,
    };
}
