//! # VP-SDE Module
//!
//! Variance-preserving diffusion over point clouds.
//!
//! This module provides:
//! - The linear noise schedule and its closed-form integral
//! - Forward marginal sampling and its analytic score
//! - Reverse-time Euler–Maruyama steps with masking and recentering
//! - Centroid helpers for masked point sets

mod centering;
mod r3;
mod schedule;

pub use centering::{center, masked_centroid};
pub use r3::{R3Diffuser, ReverseOptions, TransitionDistribution};
pub use schedule::{check_time, LinearSchedule};
