//! Boundary geometry extracted from a signed-distance field.

use crate::error::Result;
use crate::field::Field;
use crate::grid::{Grid, GridArray, SignedDistanceField};
use rayon::prelude::*;

/// Interior/boundary classification and outward unit normals of an immersed
/// surface.
///
/// A point is interior when its signed distance is negative. A point is on
/// the boundary when it lies within half a cell diagonal of the surface.
#[derive(Debug, Clone)]
pub struct BoundaryGeometry {
    sdf: SignedDistanceField,
    interior_mask: GridArray<bool>,
    boundary_mask: GridArray<bool>,
    boundary_points: Vec<Vec<usize>>,
    normals: Vec<GridArray<f64>>,
}

impl BoundaryGeometry {
    pub fn new(sdf: SignedDistanceField) -> Self {
        let grid = sdf.grid().clone();
        let threshold = grid.half_diagonal();

        let interior_mask = GridArray::from_fn(&grid, |index| sdf.value(index) < 0.0);
        let boundary_mask =
            GridArray::from_fn(&grid, |index| sdf.value(index).abs() <= threshold);
        let boundary_points: Vec<Vec<usize>> = grid
            .indices()
            .filter(|index| boundary_mask[index.as_slice()])
            .collect();

        let normals = unit_normals(&sdf);

        log::debug!(
            "Boundary geometry on {:?} grid: {} boundary points",
            grid.shape(),
            boundary_points.len()
        );

        Self {
            sdf,
            interior_mask,
            boundary_mask,
            boundary_points,
            normals,
        }
    }

    pub fn grid(&self) -> &Grid {
        self.sdf.grid()
    }

    pub fn sdf(&self) -> &SignedDistanceField {
        &self.sdf
    }

    pub fn interior_mask(&self) -> &GridArray<bool> {
        &self.interior_mask
    }

    pub fn boundary_mask(&self) -> &GridArray<bool> {
        &self.boundary_mask
    }

    /// Indices of every boundary point, in storage order.
    pub fn boundary_points(&self) -> &[Vec<usize>] {
        &self.boundary_points
    }

    /// Unit normal components, one array per axis.
    pub fn n(&self) -> &[GridArray<f64>] {
        &self.normals
    }

    pub fn normal(&self, index: &[usize]) -> Vec<f64> {
        self.normals.iter().map(|component| component[index]).collect()
    }

    pub fn is_interior(&self, index: &[usize]) -> bool {
        self.interior_mask.get(index).copied().unwrap_or(false)
    }

    /// Position of the closest surface point to a grid point, in fractional
    /// grid indices.
    pub fn surface_position(&self, index: &[usize]) -> Vec<f64> {
        let distance = self.sdf.value(index);
        index
            .iter()
            .zip(self.grid().spacing())
            .zip(&self.normals)
            .map(|((&i, &h), n)| i as f64 - distance * n[index] / h)
            .collect()
    }

    /// Fails if `field` cannot be discretized on this geometry's grid.
    pub fn check_field(&self, field: &Field) -> Result<()> {
        self.grid().check_ndim(field.name(), field.ndim())
    }
}

/// Normalized gradient of the signed distance; second-order central
/// differences inside, second-order one-sided differences on the edges.
fn unit_normals(sdf: &SignedDistanceField) -> Vec<GridArray<f64>> {
    let grid = sdf.grid();
    let ndim = grid.ndim();

    let gradients: Vec<Vec<f64>> = (0..grid.size())
        .into_par_iter()
        .map(|linear| {
            let index = grid.unravel(linear);
            let mut gradient: Vec<f64> = (0..ndim).map(|axis| partial(sdf, &index, axis)).collect();
            let norm = gradient.iter().map(|g| g * g).sum::<f64>().sqrt();
            if norm > 0.0 {
                for g in &mut gradient {
                    *g /= norm;
                }
            }
            gradient
        })
        .collect();

    (0..ndim)
        .map(|axis| GridArray::from_fn(grid, |index| gradients[grid.linear_index(index)][axis]))
        .collect()
}

fn partial(sdf: &SignedDistanceField, index: &[usize], axis: usize) -> f64 {
    let grid = sdf.grid();
    let n = grid.shape()[axis];
    let h = grid.spacing()[axis];
    let i = index[axis];
    let at = |offset: usize| {
        let mut neighbour = index.to_vec();
        neighbour[axis] = offset;
        sdf.value(&neighbour)
    };

    if n == 2 {
        (at(1) - at(0)) / h
    } else if i == 0 {
        (-3.0 * at(0) + 4.0 * at(1) - at(2)) / (2.0 * h)
    } else if i == n - 1 {
        (3.0 * at(n - 1) - 4.0 * at(n - 2) + at(n - 3)) / (2.0 * h)
    } else {
        (at(i + 1) - at(i - 1)) / (2.0 * h)
    }
}

#[cfg(test)]
mod tests {
    use super::BoundaryGeometry;
    use crate::error::SchismError;
    use crate::field::Field;
    use crate::grid::{Grid, SignedDistanceField};
    use crate::testing::{planar_sdf, Surface};
    use approx::assert_abs_diff_eq;

    const R2O2: f64 = std::f64::consts::FRAC_1_SQRT_2;

    fn trimmed(index: &[usize], shape: &[usize], margin: usize) -> bool {
        index
            .iter()
            .zip(shape)
            .all(|(&i, &n)| i >= margin && i + margin < n)
    }

    #[test]
    fn interior_and_boundary_masks_are_consistent() {
        for surface in Surface::ALL {
            for ndim in [2, 3] {
                let geometry = BoundaryGeometry::new(planar_sdf(surface, ndim, 13, 0.5));
                let grid = geometry.grid().clone();
                let threshold = grid.half_diagonal();
                assert_eq!(geometry.boundary_mask().shape(), grid.shape());
                for index in grid.indices() {
                    let phi = geometry.sdf().value(&index);
                    assert_eq!(geometry.is_interior(&index), phi < 0.0);
                    if geometry.boundary_mask()[index.as_slice()] {
                        assert!(phi.abs() <= threshold, "{surface:?} {ndim}D: {index:?}");
                    }
                }
                assert!(!geometry.boundary_points().is_empty());
            }
        }
    }

    #[test]
    fn unit_normals_have_unit_magnitude_near_surface() {
        for surface in Surface::ALL {
            for ndim in [2, 3] {
                let geometry = BoundaryGeometry::new(planar_sdf(surface, ndim, 13, 0.5));
                let grid = geometry.grid();
                let max_dist = grid.half_diagonal();
                for index in grid.indices() {
                    if !trimmed(&index, grid.shape(), 1)
                        || geometry.sdf().value(&index).abs() > max_dist
                    {
                        continue;
                    }
                    let n = geometry.normal(&index);
                    let magnitude = n.iter().map(|v| v * v).sum::<f64>().sqrt();
                    assert!((magnitude - 1.0).abs() <= 0.1, "{surface:?} {ndim}D: |n| = {magnitude}");
                }
            }
        }
    }

    #[test]
    fn unit_normals_point_outward() {
        let cases: [(Surface, usize, &[f64]); 8] = [
            (Surface::Diagonal, 2, &[-R2O2, R2O2]),
            (Surface::Diagonal, 3, &[-R2O2, 0.0, R2O2]),
            (Surface::DiagonalMirror, 2, &[R2O2, R2O2]),
            (Surface::DiagonalMirror, 3, &[R2O2, 0.0, R2O2]),
            (Surface::Horizontal, 2, &[0.0, 1.0]),
            (Surface::Horizontal, 3, &[0.0, 0.0, 1.0]),
            (Surface::Vertical, 2, &[1.0, 0.0]),
            (Surface::Vertical, 3, &[1.0, 0.0, 0.0]),
        ];
        for (surface, ndim, answer) in cases {
            let geometry = BoundaryGeometry::new(planar_sdf(surface, ndim, 13, 0.5));
            for index in geometry.boundary_points() {
                if !trimmed(index, geometry.grid().shape(), 1) {
                    continue;
                }
                let n = geometry.normal(index);
                for (component, expected) in n.iter().zip(answer) {
                    assert_abs_diff_eq!(*component, *expected, epsilon = 0.1 * expected.abs().max(1e-9));
                }
            }
        }
    }

    #[test]
    fn boundary_mask_matches_expected_rows() {
        let geometry = BoundaryGeometry::new(planar_sdf(Surface::Horizontal, 2, 13, 0.5));
        let rows: std::collections::BTreeSet<usize> =
            geometry.boundary_points().iter().map(|p| p[1]).collect();
        assert_eq!(rows.into_iter().collect::<Vec<_>>(), vec![6, 7]);

        let geometry = BoundaryGeometry::new(planar_sdf(Surface::Diagonal, 3, 13, 0.5));
        for index in geometry.grid().indices() {
            let offset = index[2] as isize - index[0] as isize;
            let expected = offset == 0 || offset == 1;
            assert_eq!(geometry.boundary_mask()[index.as_slice()], expected, "{index:?}");
        }
    }

    #[test]
    fn circle_normals_are_radial() {
        let grid = Grid::with_spacing(&[41, 41], &[0.05, 0.05]).expect("grid should build");
        let (cx, cy, radius) = (1.0, 1.0, 0.6);
        // Interior outside the circle, so the outward normal points at the centre.
        let sdf = SignedDistanceField::from_fn(grid, |x| {
            radius - ((x[0] - cx).powi(2) + (x[1] - cy).powi(2)).sqrt()
        })
        .expect("sdf should build");
        let geometry = BoundaryGeometry::new(sdf);
        assert!(!geometry.boundary_points().is_empty());
        for index in geometry.boundary_points() {
            let x = index[0] as f64 * 0.05 - cx;
            let y = index[1] as f64 * 0.05 - cy;
            let r = (x * x + y * y).sqrt();
            let n = geometry.normal(index);
            assert_abs_diff_eq!(n[0], -x / r, epsilon = 0.05);
            assert_abs_diff_eq!(n[1], -y / r, epsilon = 0.05);

            let surface = geometry.surface_position(index);
            let sx = surface[0] * 0.05 - cx;
            let sy = surface[1] * 0.05 - cy;
            assert_abs_diff_eq!((sx * sx + sy * sy).sqrt(), radius, epsilon = 1e-3);
        }
    }

    #[test]
    fn normal_arrays_follow_storage_order() {
        let grid = Grid::with_spacing(&[7, 11], &[0.5, 0.25]).expect("grid should build");
        let sdf = SignedDistanceField::from_fn(grid, |x| 0.5 * x[0] - x[1] + 0.1).expect("sdf should build");
        let geometry = BoundaryGeometry::new(sdf);
        let expected = [0.5 / 1.25f64.sqrt(), -1.0 / 1.25f64.sqrt()];
        for component in geometry.n() {
            assert_eq!(component.shape(), geometry.grid().shape());
        }
        for index in geometry.grid().indices() {
            for (axis, want) in expected.iter().enumerate() {
                assert_abs_diff_eq!(geometry.n()[axis][index.as_slice()], *want, epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn check_field_rejects_wrong_dimensionality() {
        let geometry = BoundaryGeometry::new(planar_sdf(Surface::Horizontal, 2, 9, 1.0));
        assert!(geometry.check_field(&Field::time_dependent("f", 2, 2)).is_ok());
        let err = geometry
            .check_field(&Field::time_dependent("g", 3, 2))
            .expect_err("3D field on 2D grid");
        assert!(matches!(err, SchismError::ConfigurationMismatch(_)));
    }
}
