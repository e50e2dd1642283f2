//! Row-wise operations on decoded node arrays: unit scaling, magnitudes,
//! and the spherical region-of-interest mask.
//!
//! All three are pure per-row passes with no cross-row dependency.

use bitvec::prelude::*;
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, ArrayViewMut2, Axis};

use super::constants::FIELD_SCALE;

/// Scale field components to V/m, in place.
///
/// Mutates the caller's buffer. Scaling is linear, not idempotent; calling
/// this twice multiplies by `FIELD_SCALE^2`.
pub fn scale_fields(mut fields: ArrayViewMut2<'_, f32>) {
    fields.mapv_inplace(|v| v * FIELD_SCALE);
}

/// Euclidean magnitude of each row's 3-vector, freshly allocated.
pub fn field_magnitudes(fields: ArrayView2<'_, f32>) -> Array1<f32> {
    fields.map_axis(Axis(1), |row| {
        (row[0] * row[0] + row[1] * row[1] + row[2] * row[2]).sqrt()
    })
}

/// Mark the nodes within `radius` of `target`, boundary inclusive.
///
/// Compares squared distances against the squared radius so no square roots
/// are taken over the node array.
pub fn radius_mask(positions: ArrayView2<'_, f32>, target: [f32; 3], radius: f32) -> BitVec {
    let radius_sq = radius * radius;
    let mut mask = BitVec::with_capacity(positions.nrows());
    for row in positions.rows() {
        let dx = row[0] - target[0];
        let dy = row[1] - target[1];
        let dz = row[2] - target[2];
        mask.push(dx * dx + dy * dy + dz * dz <= radius_sq);
    }
    mask
}

/// Rows of a 2-D array where the mask bit is set.
pub fn select_masked(data: ArrayView2<'_, f32>, mask: &BitSlice) -> Array2<f32> {
    let indices: Vec<usize> = mask.iter_ones().collect();
    data.select(Axis(0), &indices)
}

/// Elements of a 1-D array where the mask bit is set.
pub fn select_masked_1d(data: ArrayView1<'_, f32>, mask: &BitSlice) -> Array1<f32> {
    let indices: Vec<usize> = mask.iter_ones().collect();
    data.select(Axis(0), &indices)
}
