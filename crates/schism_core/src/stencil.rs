//! Modified stencils from a boundary-constrained local reconstruction.
//!
//! Around a skin point the group's fields are expanded in their bases and
//! fitted to nearby interior samples. The group's boundary conditions hold
//! exactly at the surface projection of the nearest boundary point and are
//! eliminated through the null space of those constraint rows. At the other
//! boundary points in the sampling box the conditions join the least-squares
//! fit as rows with a zero right-hand side. Reading off the target derivative
//! gives one weight per sample.

use crate::basis::Basis;
use crate::error::{Result, SchismError};
use crate::field::{Derivative, Field};
use crate::geometry::BoundaryGeometry;
use crate::projection::{basis_for, Projection};
use crate::skin::{check_interior, stencil_radius, Footprint};
use nalgebra::{DMatrix, RowDVector, SVD};
use serde::{Deserialize, Serialize};

/// Tolerances and limits of the constrained stencil fit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StencilSettings {
    /// Singular values at or below `rank_tolerance * sigma_max` count as zero.
    pub rank_tolerance: f64,
    /// How many times the sampling box may grow when the fit is rank deficient.
    pub max_support_growth: usize,
    /// Weights below this fraction of the largest weight are dropped.
    pub weight_cutoff: f64,
}

impl Default for StencilSettings {
    fn default() -> Self {
        Self {
            rank_tolerance: 1e-8,
            max_support_growth: 2,
            weight_cutoff: 1e-13,
        }
    }
}

/// One sampled value of a modified stencil.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StencilWeight {
    pub field: Field,
    pub offset: Vec<isize>,
    pub weight: f64,
}

/// Replacement stencil for one derivative at one grid point, in physical
/// units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModifiedStencil {
    point: Vec<usize>,
    derivative: Derivative,
    support_radius: usize,
    weights: Vec<StencilWeight>,
}

impl ModifiedStencil {
    pub fn point(&self) -> &[usize] {
        &self.point
    }

    pub fn derivative(&self) -> &Derivative {
        &self.derivative
    }

    /// Half-width of the sampling box the weights were fitted on.
    pub fn support_radius(&self) -> usize {
        self.support_radius
    }

    pub fn weights(&self) -> &[StencilWeight] {
        &self.weights
    }

    /// Applies the stencil to values supplied by `sample(field, index)`.
    pub fn apply(&self, sample: impl Fn(&Field, &[usize]) -> f64) -> f64 {
        self.weights
            .iter()
            .map(|w| {
                let index: Vec<usize> = self
                    .point
                    .iter()
                    .zip(&w.offset)
                    .map(|(&p, &o)| (p as isize + o) as usize)
                    .collect();
                w.weight * sample(&w.field, &index)
            })
            .sum()
    }
}

/// A group field and the columns its basis occupies.
struct Block<'a> {
    field: &'a Field,
    basis: &'a Basis,
    start: usize,
}

/// `coefficient * d^orders` of one block, in grid units.
struct ConstraintTerm {
    block: usize,
    orders: Vec<usize>,
    coefficient: f64,
}

struct Fit {
    samples: Vec<(usize, Vec<isize>)>,
    weights: RowDVector<f64>,
    full_rank: bool,
}

impl Projection<'_> {
    /// Fits the boundary-aware stencil for this projection's derivative at
    /// `point`.
    pub fn modified_stencil(
        &self,
        geometry: &BoundaryGeometry,
        point: &[usize],
        settings: &StencilSettings,
    ) -> Result<ModifiedStencil> {
        let derivative = self.derivative();
        let target = derivative.field();
        geometry.check_field(target)?;
        check_interior(geometry, point)?;

        let blocks = self.blocks()?;
        let columns: usize = blocks.iter().map(|b| b.basis.len()).sum();
        let constraints = self.constraint_terms(&blocks, geometry.grid().spacing())?;

        let target_block = blocks
            .iter()
            .position(|b| b.field == target)
            .ok_or_else(|| SchismError::mismatch(format!("`{target}` has no basis block")))?;
        let term = blocks[target_block]
            .basis
            .position(derivative.orders())
            .ok_or_else(|| {
                SchismError::derivative(format!(
                    "a basis of order {} cannot represent {derivative}",
                    blocks[target_block].basis.order()
                ))
            })?;
        let target_column = blocks[target_block].start + term;

        let base = stencil_radius(target.space_order());
        let mut radius = base;
        let fit = loop {
            let fit = fit_weights(
                geometry,
                point,
                radius,
                &blocks,
                columns,
                &constraints,
                target_column,
                settings,
            )?;
            if fit.full_rank {
                break fit;
            }
            if radius >= base + settings.max_support_growth {
                log::warn!(
                    "Rank-deficient reconstruction for {derivative} at {point:?}; using minimum-norm weights"
                );
                break fit;
            }
            radius += 1;
        };

        let scale: f64 = derivative
            .orders()
            .iter()
            .zip(geometry.grid().spacing())
            .map(|(&order, &h)| h.powi(-(order as i32)))
            .product();
        let largest = fit.weights.amax() * scale;
        let weights = fit
            .samples
            .into_iter()
            .zip(fit.weights.iter())
            .map(|((block, offset), &w)| StencilWeight {
                field: blocks[block].field.clone(),
                offset,
                weight: w * scale,
            })
            .filter(|w| w.weight.abs() > settings.weight_cutoff * largest)
            .collect();

        Ok(ModifiedStencil {
            point: point.to_vec(),
            derivative: derivative.clone(),
            support_radius: radius,
            weights,
        })
    }

    fn blocks(&self) -> Result<Vec<Block<'_>>> {
        let mut start = 0;
        let mut blocks = Vec::new();
        for field in self.group().fields() {
            let basis = basis_for(self.basis_map(), field)?;
            blocks.push(Block {
                field,
                basis,
                start,
            });
            start += basis.len();
        }
        Ok(blocks)
    }

    /// Linear terms of every condition in the group, scaled to grid units.
    fn constraint_terms(
        &self,
        blocks: &[Block<'_>],
        spacing: &[f64],
    ) -> Result<Vec<Vec<ConstraintTerm>>> {
        self.group()
            .conditions()
            .iter()
            .map(|condition| -> Result<Vec<ConstraintTerm>> {
                condition
                    .linear_terms()?
                    .into_iter()
                    .map(|term| -> Result<ConstraintTerm> {
                        let block = blocks
                            .iter()
                            .position(|b| *b.field == term.field)
                            .ok_or_else(|| {
                                SchismError::equation(format!(
                                    "{condition} has a term in `{}`, which is not a boundary field",
                                    term.field
                                ))
                            })?;
                        let scale: f64 = term
                            .orders
                            .iter()
                            .zip(spacing)
                            .map(|(&order, &h)| h.powi(-(order as i32)))
                            .product();
                        Ok(ConstraintTerm {
                            block,
                            orders: term.orders,
                            coefficient: term.coefficient * scale,
                        })
                    })
                    .collect::<Result<Vec<_>>>()
            })
            .collect()
    }
}

#[allow(clippy::too_many_arguments)]
fn fit_weights(
    geometry: &BoundaryGeometry,
    point: &[usize],
    radius: usize,
    blocks: &[Block<'_>],
    columns: usize,
    constraints: &[Vec<ConstraintTerm>],
    target_column: usize,
    settings: &StencilSettings,
) -> Result<Fit> {
    let grid = geometry.grid();
    let ndim = grid.ndim();
    let support = Footprint::boxed(&vec![radius; ndim]);

    let mut samples = Vec::new();
    let mut sample_rows = Vec::new();
    for (b, block) in blocks.iter().enumerate() {
        for offset in support.iter() {
            let Some(index) = shifted(geometry, point, &offset) else {
                continue;
            };
            if !geometry.is_interior(&index) {
                continue;
            }
            let x: Vec<f64> = offset.iter().map(|&o| o as f64).collect();
            let mut row = RowDVector::<f64>::zeros(columns);
            for (j, value) in block.basis.evaluate(&x).iter().enumerate() {
                row[block.start + j] = *value;
            }
            sample_rows.push(row);
            samples.push((b, offset));
        }
    }

    // Surface projections of the boundary points in the box, nearest first.
    let mut anchors = Vec::new();
    for offset in support.iter() {
        let Some(index) = shifted(geometry, point, &offset) else {
            continue;
        };
        if !geometry.boundary_mask()[index.as_slice()] {
            continue;
        }
        let x: Vec<f64> = geometry
            .surface_position(&index)
            .iter()
            .zip(point)
            .map(|(&s, &p)| s - p as f64)
            .collect();
        let distance: f64 = x.iter().map(|v| v * v).sum();
        anchors.push((distance, grid.linear_index(&index), x));
    }
    anchors.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));

    let mut anchor_rows = anchors
        .iter()
        .map(|(_, _, x)| condition_rows(blocks, columns, constraints, x));
    let constraint_rows = anchor_rows.next().unwrap_or_default();
    let fitted_rows: Vec<RowDVector<f64>> = anchor_rows.flatten().collect();

    let null = null_space(&stack(&constraint_rows, columns), columns, settings.rank_tolerance)?;
    if null.ncols() == 0 {
        return Err(SchismError::LinearAlgebra(format!(
            "boundary conditions fix every coefficient around {point:?}"
        )));
    }

    let rows: Vec<RowDVector<f64>> = sample_rows.into_iter().chain(fitted_rows).collect();
    let reduced = stack(&rows, columns) * &null;
    let svd = reduced.svd(true, true);
    let eps = settings.rank_tolerance * svd.singular_values.max();
    let rank = svd.singular_values.iter().filter(|&&s| s > eps).count();
    let pseudo_inverse = svd
        .pseudo_inverse(eps)
        .map_err(|e| SchismError::LinearAlgebra(e.to_string()))?;
    // Condition rows carry no data, so only the sample columns give weights.
    let weights = (null.row(target_column) * pseudo_inverse)
        .columns(0, samples.len())
        .into_owned();

    log::trace!(
        "Fit at {point:?}: radius {radius}, {} samples, {} boundary points, rank {rank}/{}",
        samples.len(),
        anchors.len(),
        null.ncols()
    );

    Ok(Fit {
        samples,
        weights,
        full_rank: rank == null.ncols(),
    })
}

/// `point + offset`, if it lies on the grid.
fn shifted(geometry: &BoundaryGeometry, point: &[usize], offset: &[isize]) -> Option<Vec<usize>> {
    let index: Vec<isize> = point
        .iter()
        .zip(offset)
        .map(|(&p, &o)| p as isize + o)
        .collect();
    geometry
        .grid()
        .contains(&index)
        .then(|| index.iter().map(|&i| i as usize).collect())
}

/// One unit-norm row per condition, evaluated at `x` (grid units, relative
/// to the stencil point).
fn condition_rows(
    blocks: &[Block<'_>],
    columns: usize,
    constraints: &[Vec<ConstraintTerm>],
    x: &[f64],
) -> Vec<RowDVector<f64>> {
    let mut rows = Vec::with_capacity(constraints.len());
    for condition in constraints {
        let mut row = RowDVector::<f64>::zeros(columns);
        for term in condition {
            let block = &blocks[term.block];
            let values = block.basis.evaluate_orders(&term.orders, x);
            for (j, value) in values.iter().enumerate() {
                row[block.start + j] += term.coefficient * value;
            }
        }
        let norm = row.norm();
        if norm > 0.0 {
            rows.push(row / norm);
        }
    }
    rows
}

fn stack(rows: &[RowDVector<f64>], columns: usize) -> DMatrix<f64> {
    DMatrix::from_fn(rows.len(), columns, |i, j| rows[i][j])
}

/// Orthonormal basis of the null space of `constraints`, one column per
/// vector.
fn null_space(constraints: &DMatrix<f64>, columns: usize, tolerance: f64) -> Result<DMatrix<f64>> {
    if constraints.nrows() == 0 {
        return Ok(DMatrix::identity(columns, columns));
    }
    // Pad to at least square so `v_t` spans every column.
    let mut padded = DMatrix::zeros(constraints.nrows().max(columns), columns);
    padded
        .rows_mut(0, constraints.nrows())
        .copy_from(constraints);
    let svd = SVD::new(padded, false, true);
    let v_t = svd
        .v_t
        .ok_or_else(|| SchismError::LinearAlgebra("constraint SVD has no V^T".to_string()))?;
    let cutoff = tolerance * svd.singular_values.max();
    let free: Vec<usize> = (0..columns)
        .filter(|&i| svd.singular_values[i] <= cutoff)
        .collect();
    let mut null = DMatrix::zeros(columns, free.len());
    for (c, &i) in free.iter().enumerate() {
        null.set_column(c, &v_t.row(i).transpose());
    }
    Ok(null)
}
