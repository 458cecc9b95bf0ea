//! # VP-SDE Diffuser for Point Clouds
//!
//! Forward noising, analytic score and reverse-time Euler–Maruyama steps for
//! batched point clouds laid out as `[..., n, dim]`.
//!
//! ## Units
//!
//! - Positions going in and coming out are in physical units (e.g. Angstroms).
//! - Internally every position is multiplied by `scaling` before any SDE
//!   arithmetic and divided by it again on the way out.
//! - Scores are gradients with respect to the *scaled* positions. They are
//!   never converted back, so a score from [`R3Diffuser::forward_marginal`]
//!   can be handed straight to [`R3Diffuser::reverse`].
//! - [`R3Diffuser::sample_ref`] draws from the prior in scaled units.

use ndarray::{Array, Array1, Array2, ArrayBase, ArrayD, ArrayViewD, Axis, Data, Dimension, IxDyn};
use ndarray_rand::RandomExt;
use rand::Rng;
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use super::centering;
use super::schedule::{check_time, LinearSchedule};
use crate::config::DiffuserConfig;
use crate::error::{Error, Result};

/// Options for a single reverse step.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReverseOptions {
    /// Subtract `sum(x) / sum(mask)` from every point after the update
    pub center: bool,
    /// Multiplier on the injected Gaussian noise; 0 makes the step deterministic
    pub noise_scale: f64,
}

impl Default for ReverseOptions {
    fn default() -> Self {
        Self {
            center: true,
            noise_scale: 1.0,
        }
    }
}

/// Isotropic Gaussian of one reverse step, in scaled units.
#[derive(Debug, Clone, PartialEq)]
pub struct TransitionDistribution<D: Dimension> {
    /// Mean position, zero on inactive points
    pub mean: Array<f64, D>,
    /// Standard deviation g(t) √dt shared by every coordinate
    pub std: f64,
}

/// Variance-preserving diffuser over Rⁿ point clouds.
///
/// Holds only the immutable schedule parameters; every method is a pure
/// function of its arguments and the supplied random generator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct R3Diffuser {
    config: DiffuserConfig,
    schedule: LinearSchedule,
}

impl R3Diffuser {
    /// Create a diffuser from a configuration.
    pub fn new(config: DiffuserConfig) -> Result<Self> {
        config.validate()?;
        let schedule = LinearSchedule::from_config(&config)?;

        debug!(
            dim = config.dim,
            min_b = config.min_b,
            max_b = config.max_b,
            scaling = config.scaling,
            "Created R3 diffuser"
        );

        Ok(Self { config, schedule })
    }

    pub fn config(&self) -> &DiffuserConfig {
        &self.config
    }

    pub fn schedule(&self) -> &LinearSchedule {
        &self.schedule
    }

    pub fn dim(&self) -> usize {
        self.config.dim
    }

    /// Physical to scaled units.
    pub fn scale<S, D>(&self, x: &ArrayBase<S, D>) -> Array<f64, D>
    where
        S: Data<Elem = f64>,
        D: Dimension,
    {
        x * self.config.scaling
    }

    /// Scaled to physical units.
    pub fn unscale<S, D>(&self, x: &ArrayBase<S, D>) -> Array<f64, D>
    where
        S: Data<Elem = f64>,
        D: Dimension,
    {
        x / self.config.scaling
    }

    /// Per-batch conditional variance Var[x_t | x_0] (scaled units).
    pub fn conditional_var(&self, t: &Array1<f64>) -> Result<Array1<f64>> {
        self.per_batch(t, |t| self.schedule.conditional_var(t))
    }

    /// Per-batch score-matching loss weight 1/√Var[x_t | x_0].
    pub fn score_scaling(&self, t: &Array1<f64>) -> Result<Array1<f64>> {
        self.per_batch(t, |t| self.schedule.score_scaling(t))
    }

    /// Sample x_t ~ p(x_t | x_0) in closed form.
    ///
    /// `x_0` is `[..., n, dim]` in physical units; `t` holds one time per
    /// leading batch element, or a single time shared by all of them.
    ///
    /// Returns `(x_t, score_t)` with `x_t` in physical units and `score_t`
    /// in scaled units.
    pub fn forward_marginal<D, R>(
        &self,
        x_0: &Array<f64, D>,
        t: &Array1<f64>,
        rng: &mut R,
    ) -> Result<(Array<f64, D>, Array<f64, D>)>
    where
        D: Dimension,
        R: Rng + ?Sized,
    {
        self.check_points(x_0.shape())?;
        let x_0 = self.scale(&x_0.view().into_dyn());
        let shape = x_0.shape().to_vec();

        let mean_coeff =
            self.broadcast_time(self.per_batch(t, |t| self.schedule.mean_coeff(t))?, &shape)?;
        let std = self.broadcast_time(
            self.per_batch(t, |t| Ok(self.schedule.nonzero_conditional_var(t)?.sqrt()))?,
            &shape,
        )?;

        let noise: ArrayD<f64> = Array::random_using(IxDyn(&shape), StandardNormal, rng);
        let x_t = &mean_coeff * &x_0 + &std * &noise;

        let score_t = self.score_scaled(&x_t.view(), &x_0.view(), t)?;
        let x_t = self.unscale(&x_t);

        trace!(shape = ?shape, t = ?t.as_slice(), "Sampled forward marginal");

        Ok((
            x_t.into_dimensionality::<D>()?,
            score_t.into_dimensionality::<D>()?,
        ))
    }

    /// One discrete forward transition p(x_t | x_{t−1}) for a sampler with
    /// `num_t` steps.
    ///
    /// With b = B(t)/num_t the update is x_t = √(1 − b) x_{t−1} + √b z.
    /// Input and output are in physical units.
    pub fn forward<D, R>(
        &self,
        x_prev: &Array<f64, D>,
        t: f64,
        num_t: usize,
        rng: &mut R,
    ) -> Result<Array<f64, D>>
    where
        D: Dimension,
        R: Rng + ?Sized,
    {
        self.check_points(x_prev.shape())?;
        if num_t == 0 {
            return Err(Error::InvalidDiscretization(
                "num_t must be at least 1".to_string(),
            ));
        }

        let b = self.schedule.marginal_b_t(t)? / num_t as f64;
        if b > 1.0 {
            return Err(Error::InvalidDiscretization(format!(
                "per-step variance {} exceeds 1 at t={} with num_t={}",
                b, t, num_t
            )));
        }

        let x_prev = self.scale(x_prev);
        let noise: Array<f64, D> = Array::random_using(x_prev.raw_dim(), StandardNormal, rng);
        let x_t = x_prev * (1.0 - b).sqrt() + noise * b.sqrt();

        Ok(self.unscale(&x_t))
    }

    /// Score ∇ log p(x_t | x_0) of the forward kernel, in scaled units.
    ///
    /// With `prescale` the inputs are taken as physical positions and scaled
    /// first; otherwise they must already be scaled.
    pub fn score<D>(
        &self,
        x_t: &Array<f64, D>,
        x_0: &Array<f64, D>,
        t: &Array1<f64>,
        prescale: bool,
    ) -> Result<Array<f64, D>>
    where
        D: Dimension,
    {
        self.check_points(x_t.shape())?;
        check_same_shape(x_t.shape(), x_0.shape())?;

        let score = if prescale {
            let x_t = self.scale(&x_t.view().into_dyn());
            let x_0 = self.scale(&x_0.view().into_dyn());
            self.score_scaled(&x_t.view(), &x_0.view(), t)?
        } else {
            self.score_scaled(&x_t.view().into_dyn(), &x_0.view().into_dyn(), t)?
        };

        Ok(score.into_dimensionality::<D>()?)
    }

    /// Estimate of the clean positions implied by a score.
    ///
    /// Inverts the forward kernel: x̂_0 = (score · Var + x_t) / exp(−½ B(t)).
    /// `x_t` and the result are physical, `score_t` is scaled.
    pub fn predict_x0<D>(
        &self,
        score_t: &Array<f64, D>,
        x_t: &Array<f64, D>,
        t: &Array1<f64>,
    ) -> Result<Array<f64, D>>
    where
        D: Dimension,
    {
        self.check_points(x_t.shape())?;
        check_same_shape(x_t.shape(), score_t.shape())?;

        let x = self.scale(&x_t.view().into_dyn());
        let score = score_t.view().into_dyn();
        let shape = x.shape().to_vec();

        let var =
            self.broadcast_time(self.per_batch(t, |t| self.schedule.conditional_var(t))?, &shape)?;
        let mean_coeff =
            self.broadcast_time(self.per_batch(t, |t| self.schedule.mean_coeff(t))?, &shape)?;

        let x_0 = (&score * &var + &x) / &mean_coeff;
        Ok(self.unscale(&x_0).into_dimensionality::<D>()?)
    }

    /// Mean and standard deviation of the reverse transition, without sampling.
    ///
    /// `x_t` is physical, `score_t` scaled. The mean x_t − (f − g² s) dt and
    /// the std g √dt are both returned in *scaled* units; pass the mean
    /// through [`R3Diffuser::unscale`] for physical positions. With a mask
    /// the mean is zeroed on inactive points.
    pub fn distribution<D>(
        &self,
        x_t: &Array<f64, D>,
        score_t: &Array<f64, D>,
        t: f64,
        dt: f64,
        mask: Option<&Array<f64, D::Smaller>>,
    ) -> Result<TransitionDistribution<D>>
    where
        D: Dimension,
    {
        self.check_step(x_t.shape(), score_t.shape(), t, dt)?;
        let mask = mask.map(|m| m.view().into_dyn());

        let x = self.scale(&x_t.view().into_dyn());
        let update = self.drift_update(&x, &score_t.view().into_dyn(), t, dt)?;
        let mut mean = x - update;
        apply_mask(&mut mean, mask.as_ref())?;

        let mean = mean.into_dimensionality::<D>()?;
        let std = self.schedule.diffusion_coef(t)? * dt.sqrt();

        Ok(TransitionDistribution { mean, std })
    }

    /// Simulate the reverse SDE for one Euler–Maruyama step of size `dt`.
    ///
    /// `x_t` is physical, `score_t` scaled. The perturbation
    /// (f − g² s) dt + g √dt z is applied only where `mask` is non-zero, and
    /// with `options.center` the offset `sum(x) / sum(mask)` is removed afterwards.
    /// Returns x_{t−dt} in physical units.
    pub fn reverse<D, R>(
        &self,
        x_t: &Array<f64, D>,
        score_t: &Array<f64, D>,
        t: f64,
        dt: f64,
        mask: Option<&Array<f64, D::Smaller>>,
        options: ReverseOptions,
        rng: &mut R,
    ) -> Result<Array<f64, D>>
    where
        D: Dimension,
        R: Rng + ?Sized,
    {
        self.check_step(x_t.shape(), score_t.shape(), t, dt)?;
        let mask = mask.map(|m| m.view().into_dyn());

        let x = self.scale(&x_t.view().into_dyn());
        let mut perturb = self.drift_update(&x, &score_t.view().into_dyn(), t, dt)?;

        if options.noise_scale != 0.0 {
            let g = self.schedule.diffusion_coef(t)?;
            let z: ArrayD<f64> = Array::random_using(x.raw_dim(), StandardNormal, rng);
            perturb = perturb + z * (options.noise_scale * g * dt.sqrt());
        }
        apply_mask(&mut perturb, mask.as_ref())?;

        let mut x_next = x - perturb;
        if options.center {
            centering::center(&mut x_next, mask.as_ref())?;
        }

        trace!(t, dt, shape = ?x_next.shape(), "Reverse step");

        Ok(self.unscale(&x_next).into_dimensionality::<D>()?)
    }

    /// Draw `n_samples` points from the N(0, I) prior, in scaled units.
    pub fn sample_ref<R>(&self, n_samples: usize, rng: &mut R) -> Array2<f64>
    where
        R: Rng + ?Sized,
    {
        Array2::random_using((n_samples, self.config.dim), StandardNormal, rng)
    }

    fn score_scaled(
        &self,
        x_t: &ArrayViewD<'_, f64>,
        x_0: &ArrayViewD<'_, f64>,
        t: &Array1<f64>,
    ) -> Result<ArrayD<f64>> {
        let shape = x_t.shape();
        let mean_coeff =
            self.broadcast_time(self.per_batch(t, |t| self.schedule.mean_coeff(t))?, shape)?;
        let var = self.broadcast_time(
            self.per_batch(t, |t| self.schedule.nonzero_conditional_var(t))?,
            shape,
        )?;

        Ok(-(x_t - &(&mean_coeff * x_0)) / &var)
    }

    /// (f − g² s) dt on scaled positions.
    fn drift_update(
        &self,
        x: &ArrayD<f64>,
        score: &ArrayViewD<'_, f64>,
        t: f64,
        dt: f64,
    ) -> Result<ArrayD<f64>> {
        let g = self.schedule.diffusion_coef(t)?;
        let f = self.schedule.drift_coef(x, t)?;
        Ok((f - &(score * (g * g))) * dt)
    }

    fn per_batch<F>(&self, t: &Array1<f64>, f: F) -> Result<Array1<f64>>
    where
        F: Fn(f64) -> Result<f64>,
    {
        t.iter()
            .map(|&t| f(t))
            .collect::<Result<Vec<_>>>()
            .map(Array1::from)
    }

    /// Broadcast per-batch values over `[batch, ..., n, dim]`.
    ///
    /// Unbatched `[n, dim]` clouds accept a single value only.
    fn broadcast_time(&self, values: Array1<f64>, shape: &[usize]) -> Result<ArrayD<f64>> {
        let batch = if shape.len() > 2 { shape[0] } else { 1 };
        if values.len() != 1 && values.len() != batch {
            return Err(Error::shape_mismatch(&[batch], &[values.len()]));
        }

        let mut cast = vec![1; shape.len()];
        cast[0] = values.len();
        let values = values.into_shape(IxDyn(&cast))?;

        let broadcast = values.broadcast(IxDyn(shape)).map(|v| v.to_owned());
        broadcast.ok_or_else(|| Error::shape_mismatch(shape, &cast))
    }

    fn check_points(&self, shape: &[usize]) -> Result<()> {
        let Some(&last) = shape.last() else {
            return Err(Error::InvalidRank { ndim: 0 });
        };
        if shape.len() < 2 {
            return Err(Error::InvalidRank { ndim: shape.len() });
        }
        if last != self.config.dim {
            let mut expected = shape.to_vec();
            expected[shape.len() - 1] = self.config.dim;
            return Err(Error::shape_mismatch(&expected, shape));
        }
        Ok(())
    }

    fn check_step(&self, x_shape: &[usize], score_shape: &[usize], t: f64, dt: f64) -> Result<()> {
        check_time(t)?;
        check_step_size(dt)?;
        self.check_points(x_shape)?;
        check_same_shape(x_shape, score_shape)
    }
}

fn check_step_size(dt: f64) -> Result<f64> {
    if (0.0..=1.0).contains(&dt) {
        Ok(dt)
    } else {
        Err(Error::InvalidStepSize { dt })
    }
}

fn check_same_shape(expected: &[usize], found: &[usize]) -> Result<()> {
    if expected == found {
        Ok(())
    } else {
        Err(Error::shape_mismatch(expected, found))
    }
}

/// Zero the rows of `values` whose mask entry is zero.
fn apply_mask(values: &mut ArrayD<f64>, mask: Option<&ArrayViewD<'_, f64>>) -> Result<()> {
    let Some(mask) = mask else {
        return Ok(());
    };

    let expected = &values.shape()[..values.ndim() - 1];
    if mask.shape() != expected {
        return Err(Error::shape_mismatch(expected, mask.shape()));
    }

    let weights = mask.view().insert_axis(Axis(mask.ndim()));
    let weights = weights
        .broadcast(values.raw_dim())
        .ok_or_else(|| Error::shape_mismatch(values.shape(), mask.shape()))?;
    *values *= &weights;
    Ok(())
}
