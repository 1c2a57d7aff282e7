//! Structured grids and grid-shaped data.
//!
//! Data is stored flat with the first axis varying fastest, so the linear
//! index of `(i, j, k)` is `i + nx * (j + ny * k)`.

use crate::error::{Result, SchismError};
use serde::{Deserialize, Serialize};
use std::ops::{Index, IndexMut};

/// Axis names used when printing derivatives (`f.dx2dy`).
pub const AXIS_NAMES: [char; 3] = ['x', 'y', 'z'];

/// An equally spaced structured lattice in two or three dimensions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Grid {
    shape: Vec<usize>,
    spacing: Vec<f64>,
}

impl Grid {
    /// Builds a grid from the number of points and the physical extent along
    /// each axis. The spacing is `extent / (points - 1)`.
    pub fn new(shape: &[usize], extent: &[f64]) -> Result<Self> {
        if shape.len() != extent.len() {
            return Err(SchismError::InvalidGrid(format!(
                "shape has {} axes but extent has {}",
                shape.len(),
                extent.len()
            )));
        }
        if shape.iter().any(|&n| n < 2) {
            return Err(SchismError::InvalidGrid(
                "every axis needs at least 2 points".to_string(),
            ));
        }
        let spacing: Vec<f64> = shape
            .iter()
            .zip(extent)
            .map(|(&n, &e)| e / (n - 1) as f64)
            .collect();
        Self::with_spacing(shape, &spacing)
    }

    /// Builds a grid from the number of points and spacing along each axis.
    pub fn with_spacing(shape: &[usize], spacing: &[f64]) -> Result<Self> {
        if !(2..=3).contains(&shape.len()) {
            return Err(SchismError::InvalidGrid(format!(
                "grids must be 2D or 3D, got {} axes",
                shape.len()
            )));
        }
        if spacing.len() != shape.len() {
            return Err(SchismError::InvalidGrid(format!(
                "shape has {} axes but spacing has {}",
                shape.len(),
                spacing.len()
            )));
        }
        if shape.iter().any(|&n| n < 2) {
            return Err(SchismError::InvalidGrid(
                "every axis needs at least 2 points".to_string(),
            ));
        }
        if spacing.iter().any(|h| !h.is_finite() || *h <= 0.0) {
            return Err(SchismError::InvalidGrid(
                "spacing must be finite and positive".to_string(),
            ));
        }
        Ok(Self {
            shape: shape.to_vec(),
            spacing: spacing.to_vec(),
        })
    }

    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn spacing(&self) -> &[f64] {
        &self.spacing
    }

    /// Total number of grid points.
    pub fn size(&self) -> usize {
        self.shape.iter().product()
    }

    /// Half the length of a cell diagonal, `sqrt(sum((h_i / 2)^2))`.
    pub fn half_diagonal(&self) -> f64 {
        self.spacing
            .iter()
            .map(|h| (0.5 * h) * (0.5 * h))
            .sum::<f64>()
            .sqrt()
    }

    /// True if a (possibly negative) index lies in `[0, extent)` on every axis.
    pub fn contains(&self, index: &[isize]) -> bool {
        index.len() == self.ndim()
            && index
                .iter()
                .zip(&self.shape)
                .all(|(&i, &n)| i >= 0 && (i as usize) < n)
    }

    pub fn linear_index(&self, index: &[usize]) -> usize {
        let mut linear = 0;
        let mut stride = 1;
        for (&i, &n) in index.iter().zip(&self.shape) {
            linear += i * stride;
            stride *= n;
        }
        linear
    }

    pub fn unravel(&self, mut linear: usize) -> Vec<usize> {
        let mut index = Vec::with_capacity(self.ndim());
        for &n in &self.shape {
            index.push(linear % n);
            linear /= n;
        }
        index
    }

    /// Iterates over every index of the grid in storage order.
    pub fn indices(&self) -> impl Iterator<Item = Vec<usize>> + '_ {
        (0..self.size()).map(move |linear| self.unravel(linear))
    }

    /// Checks that a field of dimensionality `ndim` can live on this grid.
    pub fn check_ndim(&self, name: &str, ndim: usize) -> Result<()> {
        if ndim != self.ndim() {
            return Err(SchismError::mismatch(format!(
                "`{name}` is {ndim}D but the grid is {}D",
                self.ndim()
            )));
        }
        Ok(())
    }
}

/// Values attached to every point of a grid.
#[derive(Debug, Clone, PartialEq)]
pub struct GridArray<T> {
    shape: Vec<usize>,
    data: Vec<T>,
}

impl<T: Clone> GridArray<T> {
    pub fn filled(grid: &Grid, value: T) -> Self {
        Self {
            shape: grid.shape().to_vec(),
            data: vec![value; grid.size()],
        }
    }

    /// Evaluates `f` at every index of the grid.
    pub fn from_fn(grid: &Grid, mut f: impl FnMut(&[usize]) -> T) -> Self {
        let data = grid.indices().map(|index| f(&index)).collect();
        Self {
            shape: grid.shape().to_vec(),
            data,
        }
    }
}

impl<T> GridArray<T> {
    /// Wraps flat data laid out in storage order (first axis fastest).
    pub fn from_vec(grid: &Grid, data: Vec<T>) -> Result<Self> {
        if data.len() != grid.size() {
            return Err(SchismError::mismatch(format!(
                "data holds {} values but the grid has {} points",
                data.len(),
                grid.size()
            )));
        }
        Ok(Self {
            shape: grid.shape().to_vec(),
            data,
        })
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    pub fn get(&self, index: &[usize]) -> Option<&T> {
        if index.len() != self.shape.len() || index.iter().zip(&self.shape).any(|(i, n)| i >= n) {
            return None;
        }
        self.data.get(self.linear(index))
    }

    fn linear(&self, index: &[usize]) -> usize {
        let mut linear = 0;
        let mut stride = 1;
        for (&i, &n) in index.iter().zip(&self.shape) {
            linear += i * stride;
            stride *= n;
        }
        linear
    }
}

impl<T> Index<&[usize]> for GridArray<T> {
    type Output = T;

    fn index(&self, index: &[usize]) -> &T {
        &self.data[self.linear(index)]
    }
}

impl<T> IndexMut<&[usize]> for GridArray<T> {
    fn index_mut(&mut self, index: &[usize]) -> &mut T {
        let linear = self.linear(index);
        &mut self.data[linear]
    }
}

/// A signed-distance function sampled on a grid.
///
/// Values are negative inside the domain where the solution lives and
/// positive outside; the magnitude approximates the physical distance to the
/// immersed surface.
#[derive(Debug, Clone)]
pub struct SignedDistanceField {
    grid: Grid,
    values: GridArray<f64>,
}

impl SignedDistanceField {
    pub fn new(grid: Grid, values: GridArray<f64>) -> Result<Self> {
        if values.shape() != grid.shape() {
            return Err(SchismError::mismatch(format!(
                "signed distance data has shape {:?} but the grid is {:?}",
                values.shape(),
                grid.shape()
            )));
        }
        if values.as_slice().iter().any(|v| !v.is_finite()) {
            return Err(SchismError::mismatch(
                "signed distance data contains non-finite values".to_string(),
            ));
        }
        Ok(Self { grid, values })
    }

    /// Samples an analytic distance function at every grid point, with
    /// coordinates measured from the grid origin.
    pub fn from_fn(grid: Grid, f: impl Fn(&[f64]) -> f64) -> Result<Self> {
        let spacing = grid.spacing().to_vec();
        let values = GridArray::from_fn(&grid, |index| {
            let position: Vec<f64> = index
                .iter()
                .zip(&spacing)
                .map(|(&i, &h)| i as f64 * h)
                .collect();
            f(&position)
        });
        Self::new(grid, values)
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    pub fn values(&self) -> &GridArray<f64> {
        &self.values
    }

    pub fn value(&self, index: &[usize]) -> f64 {
        self.values[index]
    }
}

#[cfg(test)]
mod tests {
    use super::{Grid, GridArray, SignedDistanceField};
    use crate::error::SchismError;
    use approx::assert_relative_eq;

    #[test]
    fn grid_spacing_follows_extent() {
        let grid = Grid::new(&[11, 21], &[10.0, 10.0]).expect("grid should build");
        assert_relative_eq!(grid.spacing()[0], 1.0);
        assert_relative_eq!(grid.spacing()[1], 0.5);
        assert_relative_eq!(grid.half_diagonal(), (0.25f64 + 0.0625).sqrt());
    }

    #[test]
    fn grid_rejects_unsupported_dimensionality() {
        let err = Grid::with_spacing(&[5], &[1.0]).expect_err("1D grid should fail");
        assert!(matches!(err, SchismError::InvalidGrid(_)), "unexpected error: {err}");
        assert!(Grid::with_spacing(&[5, 5], &[1.0, 0.0]).is_err());
        assert!(Grid::with_spacing(&[5, 1], &[1.0, 1.0]).is_err());
    }

    #[test]
    fn linear_index_round_trips_through_unravel() {
        let grid = Grid::with_spacing(&[3, 4, 5], &[1.0, 1.0, 1.0]).expect("grid should build");
        assert_eq!(grid.linear_index(&[1, 0, 0]), 1);
        assert_eq!(grid.linear_index(&[0, 1, 0]), 3);
        assert_eq!(grid.linear_index(&[0, 0, 1]), 12);
        assert_eq!(grid.unravel(grid.linear_index(&[2, 3, 4])), vec![2, 3, 4]);
    }

    #[test]
    fn contains_uses_half_open_bounds() {
        let grid = Grid::with_spacing(&[4, 4], &[1.0, 1.0]).expect("grid should build");
        assert!(grid.contains(&[0, 3]));
        assert!(!grid.contains(&[-1, 0]));
        assert!(!grid.contains(&[0, 4]));
    }

    #[test]
    fn signed_distance_rejects_mismatched_data() {
        let grid = Grid::with_spacing(&[4, 4], &[1.0, 1.0]).expect("grid should build");
        let other = Grid::with_spacing(&[4, 5], &[1.0, 1.0]).expect("grid should build");
        let values = GridArray::filled(&other, 0.0);
        let err = SignedDistanceField::new(grid.clone(), values).expect_err("shape mismatch");
        assert!(matches!(err, SchismError::ConfigurationMismatch(_)));
        assert!(GridArray::from_vec(&grid, vec![0.0; 3]).is_err());
    }

    #[test]
    fn from_fn_uses_physical_coordinates() {
        let grid = Grid::with_spacing(&[3, 3], &[0.5, 2.0]).expect("grid should build");
        let sdf = SignedDistanceField::from_fn(grid, |x| x[0] + x[1]).expect("sdf should build");
        assert_relative_eq!(sdf.value(&[2, 1]), 3.0);
    }
}
