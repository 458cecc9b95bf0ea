//! Centroid removal for batched point clouds.
//!
//! Point clouds are laid out as `[..., n, dim]`. Masks are `[..., n]` with
//! 1.0 for active points and 0.0 for inactive ones.

use ndarray::{ArrayD, ArrayViewD, Axis};

use crate::error::{Error, Result};

fn point_axis(x: &ArrayViewD<'_, f64>) -> Result<Axis> {
    if x.ndim() < 2 {
        return Err(Error::InvalidRank { ndim: x.ndim() });
    }
    Ok(Axis(x.ndim() - 2))
}

/// Mask-weighted centroid of each point set, shape `[..., dim]`.
///
/// Without a mask every point counts. A batch element whose mask sums to
/// zero has no centroid and is reported as [`Error::DegenerateMask`] with
/// its flat index.
pub fn masked_centroid(
    x: &ArrayViewD<'_, f64>,
    mask: Option<&ArrayViewD<'_, f64>>,
) -> Result<ArrayD<f64>> {
    let axis = point_axis(x)?;

    let Some(mask) = mask else {
        let n = x.len_of(axis);
        if n == 0 {
            return Err(Error::DegenerateMask { index: 0 });
        }
        return Ok(x.sum_axis(axis) / n as f64);
    };

    let expected = &x.shape()[..x.ndim() - 1];
    if mask.shape() != expected {
        return Err(Error::shape_mismatch(expected, mask.shape()));
    }

    let counts = mask.sum_axis(Axis(mask.ndim() - 1));
    if let Some(index) = counts.iter().position(|&c| c <= 0.0) {
        return Err(Error::DegenerateMask { index });
    }

    let weights = mask.view().insert_axis(Axis(mask.ndim()));
    let weights = weights
        .broadcast(x.raw_dim())
        .ok_or_else(|| Error::shape_mismatch(x.shape(), mask.shape()))?;
    let sums = (x * &weights).sum_axis(axis);

    let count_axis = Axis(counts.ndim());
    let counts = counts.insert_axis(count_axis);
    let counts = counts
        .broadcast(sums.raw_dim())
        .ok_or_else(|| Error::shape_mismatch(sums.shape(), counts.shape()))?;

    Ok(sums / &counts)
}

/// Per-element offset removed by [`center`], shape `[..., dim]`.
///
/// The position sum runs over every point, active or not, and is divided by
/// the number of active points. With a full mask (or none) this is the plain
/// centroid.
fn recentering_offset(
    x: &ArrayViewD<'_, f64>,
    mask: Option<&ArrayViewD<'_, f64>>,
) -> Result<ArrayD<f64>> {
    let Some(mask) = mask else {
        return masked_centroid(x, None);
    };
    let axis = point_axis(x)?;

    let expected = &x.shape()[..x.ndim() - 1];
    if mask.shape() != expected {
        return Err(Error::shape_mismatch(expected, mask.shape()));
    }

    let counts = mask.sum_axis(Axis(mask.ndim() - 1));
    if let Some(index) = counts.iter().position(|&c| c <= 0.0) {
        return Err(Error::DegenerateMask { index });
    }

    let sums = x.sum_axis(axis);
    let count_axis = Axis(counts.ndim());
    let counts = counts.insert_axis(count_axis);
    let counts = counts
        .broadcast(sums.raw_dim())
        .ok_or_else(|| Error::shape_mismatch(sums.shape(), counts.shape()))?;

    Ok(sums / &counts)
}

/// Remove global translation from every point set, in place.
///
/// Subtracts `sum(x) / sum(mask)` from every point, inactive ones included,
/// so the whole structure moves rigidly. Inactive points still contribute
/// to the sum.
pub fn center(x: &mut ArrayD<f64>, mask: Option<&ArrayViewD<'_, f64>>) -> Result<()> {
    let offset = {
        let view = x.view();
        let axis = point_axis(&view)?;
        recentering_offset(&view, mask)?.insert_axis(axis)
    };
    let offset = offset
        .broadcast(x.raw_dim())
        .ok_or_else(|| Error::shape_mismatch(x.shape(), offset.shape()))?;
    *x -= &offset;
    Ok(())
}
