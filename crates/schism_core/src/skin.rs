//! Stencil footprints and the skin of points whose stencils must change.

use crate::error::{Result, SchismError};
use crate::field::Derivative;
use crate::geometry::BoundaryGeometry;
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Integer offsets of a stencil, one column per point and one row per axis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Footprint {
    offsets: DMatrix<isize>,
}

impl Footprint {
    /// Every offset of the box `-radius[i]..=radius[i]`, first axis fastest.
    pub fn boxed(radius: &[usize]) -> Self {
        let spans: Vec<Vec<isize>> = radius
            .iter()
            .map(|&r| (-(r as isize)..=r as isize).collect())
            .collect();
        let count: usize = spans.iter().map(Vec::len).product();
        let offsets = DMatrix::from_fn(radius.len(), count, |axis, column| {
            let stride: usize = spans[..axis].iter().map(Vec::len).product();
            spans[axis][(column / stride) % spans[axis].len()]
        });
        Self { offsets }
    }

    pub fn offsets(&self) -> &DMatrix<isize> {
        &self.offsets
    }

    pub fn ndim(&self) -> usize {
        self.offsets.nrows()
    }

    pub fn len(&self) -> usize {
        self.offsets.ncols()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn offset(&self, k: usize) -> Vec<isize> {
        self.offsets.column(k).iter().copied().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = Vec<isize>> + '_ {
        (0..self.len()).map(move |k| self.offset(k))
    }
}

/// Half-width of the standard stencil for a field discretized at
/// `space_order`.
pub fn stencil_radius(space_order: usize) -> usize {
    (space_order / 2).max(1)
}

/// Offsets touched by the standard central stencil of `derivative`: a span
/// along each differentiated axis and zero along the others.
pub fn stencil_footprint(derivative: &Derivative) -> Footprint {
    let r = stencil_radius(derivative.field().space_order());
    let radius: Vec<usize> = derivative
        .orders()
        .iter()
        .map(|&order| if order > 0 { r } else { 0 })
        .collect();
    Footprint::boxed(&radius)
}

/// Interior points whose standard stencil for a derivative reaches a
/// boundary point.
#[derive(Debug, Clone)]
pub struct ModifiedSkin<'g> {
    derivative: Derivative,
    geometry: &'g BoundaryGeometry,
    points: DMatrix<usize>,
    linear: Vec<usize>,
}

impl<'g> ModifiedSkin<'g> {
    pub fn new(derivative: Derivative, geometry: &'g BoundaryGeometry) -> Result<Self> {
        geometry.check_field(derivative.field())?;
        let grid = geometry.grid();
        let footprint = stencil_footprint(&derivative);

        let mut linear = BTreeSet::new();
        for point in geometry.boundary_points() {
            for offset in footprint.iter() {
                let shifted: Vec<isize> = point
                    .iter()
                    .zip(&offset)
                    .map(|(&p, &o)| p as isize + o)
                    .collect();
                if !grid.contains(&shifted) {
                    continue;
                }
                let index: Vec<usize> = shifted.iter().map(|&i| i as usize).collect();
                if geometry.is_interior(&index) {
                    linear.insert(grid.linear_index(&index));
                }
            }
        }

        let ndim = grid.ndim();
        let linear: Vec<usize> = linear.into_iter().collect();
        let indices: Vec<Vec<usize>> = linear.iter().map(|&l| grid.unravel(l)).collect();
        let points = DMatrix::from_fn(ndim, indices.len(), |axis, i| indices[i][axis]);

        log::debug!("Skin for {derivative}: {} modified points", points.ncols());

        Ok(Self {
            derivative,
            geometry,
            points,
            linear,
        })
    }

    pub fn derivative(&self) -> &Derivative {
        &self.derivative
    }

    pub fn geometry(&self) -> &'g BoundaryGeometry {
        self.geometry
    }

    /// Modified points, one column per point, sorted by storage order.
    pub fn points(&self) -> &DMatrix<usize> {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.ncols()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn point(&self, i: usize) -> Vec<usize> {
        self.points.column(i).iter().copied().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = Vec<usize>> + '_ {
        (0..self.len()).map(move |i| self.point(i))
    }

    /// Column of `index` in [`points`](Self::points), if it is a skin point.
    pub fn position(&self, index: &[usize]) -> Option<usize> {
        let grid = self.geometry.grid();
        let signed: Vec<isize> = index.iter().map(|&i| i as isize).collect();
        if !grid.contains(&signed) {
            return None;
        }
        self.linear.binary_search(&grid.linear_index(index)).ok()
    }

    pub fn contains(&self, index: &[usize]) -> bool {
        self.position(index).is_some()
    }
}

/// Fails unless `index` is an interior point of `geometry`.
pub(crate) fn check_interior(geometry: &BoundaryGeometry, index: &[usize]) -> Result<()> {
    let signed: Vec<isize> = index.iter().map(|&i| i as isize).collect();
    if !geometry.grid().contains(&signed) {
        return Err(SchismError::mismatch(format!(
            "point {index:?} is outside the {:?} grid",
            geometry.grid().shape()
        )));
    }
    if !geometry.is_interior(index) {
        return Err(SchismError::mismatch(format!(
            "point {index:?} is not an interior point"
        )));
    }
    Ok(())
}
