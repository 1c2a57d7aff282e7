//! Analytic signed-distance fields shared by the unit tests.

use crate::grid::{Grid, SignedDistanceField};
use std::f64::consts::FRAC_1_SQRT_2;

/// Planar surfaces with a known outward normal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Surface {
    /// Normal along the last axis.
    Horizontal,
    /// Normal along the first axis.
    Vertical,
    /// Normal `(-1, .., 1) / sqrt(2)` in the first/last axis plane.
    Diagonal,
    /// Normal `(1, .., 1) / sqrt(2)` in the first/last axis plane.
    DiagonalMirror,
}

impl Surface {
    pub(crate) const ALL: [Surface; 4] = [
        Surface::Horizontal,
        Surface::Vertical,
        Surface::Diagonal,
        Surface::DiagonalMirror,
    ];
}

/// `n` points per axis with uniform spacing `h`. Axis-aligned surfaces sit
/// halfway between two grid lines; diagonal ones are shifted by a quarter
/// cell so no point lands exactly on the boundary threshold.
pub(crate) fn planar_sdf(surface: Surface, ndim: usize, n: usize, h: f64) -> SignedDistanceField {
    let grid = Grid::with_spacing(&vec![n; ndim], &vec![h; ndim]).expect("test grid should build");
    let last = ndim - 1;
    let middle = ((n / 2) as f64 + 0.5) * h;
    let corner = (n - 1) as f64 * h + 0.25 * h;
    SignedDistanceField::from_fn(grid, |x| match surface {
        Surface::Horizontal => x[last] - middle,
        Surface::Vertical => x[0] - middle,
        Surface::Diagonal => (x[last] - x[0] - 0.25 * h) * FRAC_1_SQRT_2,
        Surface::DiagonalMirror => (x[0] + x[last] - corner) * FRAC_1_SQRT_2,
    })
    .expect("test sdf should build")
}

/// Horizontal surface at fractional row `surface` of the last axis.
pub(crate) fn horizontal_sdf(shape: &[usize], h: f64, surface: f64) -> SignedDistanceField {
    let grid = Grid::with_spacing(shape, &vec![h; shape.len()]).expect("test grid should build");
    let last = shape.len() - 1;
    SignedDistanceField::from_fn(grid, |x| x[last] - surface * h).expect("test sdf should build")
}

/// Domain outside a circle (2D) or sphere (3D) of `radius` around the
/// physical point `centre`.
pub(crate) fn hole_sdf(shape: &[usize], h: f64, centre: &[f64], radius: f64) -> SignedDistanceField {
    let grid = Grid::with_spacing(shape, &vec![h; shape.len()]).expect("test grid should build");
    SignedDistanceField::from_fn(grid, |x| {
        let r = x
            .iter()
            .zip(centre)
            .map(|(a, c)| (a - c) * (a - c))
            .sum::<f64>()
            .sqrt();
        radius - r
    })
    .expect("test sdf should build")
}

/// Least-squares slope of `log(error)` against `log(refinement)`.
pub(crate) fn log_log_slope(refinement: &[f64], errors: &[f64]) -> f64 {
    let xs: Vec<f64> = refinement.iter().map(|r| r.ln()).collect();
    let ys: Vec<f64> = errors.iter().map(|e| e.ln()).collect();
    let n = xs.len() as f64;
    let mean_x = xs.iter().sum::<f64>() / n;
    let mean_y = ys.iter().sum::<f64>() / n;
    let covariance: f64 = xs.iter().zip(&ys).map(|(x, y)| (x - mean_x) * (y - mean_y)).sum();
    let variance: f64 = xs.iter().map(|x| (x - mean_x).powi(2)).sum();
    covariance / variance
}
