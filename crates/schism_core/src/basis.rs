//! Truncated Taylor bases for local polynomial reconstruction.

use crate::field::Field;
use nalgebra::RowDVector;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Basis to use for each field of a condition group.
pub type BasisMap = BTreeMap<Field, Basis>;

/// Taylor terms `prod_i x_i^a_i / a_i!` of total degree up to `order`.
///
/// Terms are sorted by total degree, then by descending exponent of the
/// first axis, so in 2D the order-2 basis is
/// `1, x, y, x^2/2, xy, y^2/2`. With this scaling the coefficient of a term
/// is the matching derivative of the field at the expansion point, in grid
/// units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Basis {
    name: String,
    ndim: usize,
    order: usize,
    terms: Vec<Vec<usize>>,
}

impl Basis {
    pub fn new(name: impl Into<String>, ndim: usize, order: usize) -> Self {
        let mut terms = Vec::new();
        for degree in 0..=order {
            let mut prefix = Vec::with_capacity(ndim);
            exponents(ndim, degree, &mut prefix, &mut terms);
        }
        Self {
            name: name.into(),
            ndim,
            order,
            terms,
        }
    }

    /// Basis matched to a field's dimensionality and space order.
    pub fn for_field(field: &Field) -> Self {
        Self::new(field.name(), field.ndim(), field.space_order())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ndim(&self) -> usize {
        self.ndim
    }

    pub fn order(&self) -> usize {
        self.order
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Exponent vector of every term, in column order.
    pub fn terms(&self) -> &[Vec<usize>] {
        &self.terms
    }

    /// Column of the term whose exponents equal `orders`.
    pub fn position(&self, orders: &[usize]) -> Option<usize> {
        self.terms.iter().position(|term| term == orders)
    }

    /// Every term evaluated at `offset`.
    pub fn evaluate(&self, offset: &[f64]) -> RowDVector<f64> {
        self.evaluate_orders(&vec![0; self.ndim], offset)
    }

    /// Every term differentiated once along each listed axis (repeats allowed),
    /// evaluated at `offset`.
    pub fn evaluate_derivative(&self, axes: &[usize], offset: &[f64]) -> RowDVector<f64> {
        let mut orders = vec![0; self.ndim];
        for &axis in axes {
            if let Some(order) = orders.get_mut(axis) {
                *order += 1;
            }
        }
        self.evaluate_orders(&orders, offset)
    }

    pub(crate) fn evaluate_orders(&self, orders: &[usize], offset: &[f64]) -> RowDVector<f64> {
        RowDVector::from_iterator(
            self.terms.len(),
            self.terms.iter().map(|term| {
                term.iter()
                    .zip(orders)
                    .zip(offset)
                    .map(|((&a, &b), &x)| {
                        if a < b {
                            0.0
                        } else {
                            let power = a - b;
                            x.powi(power as i32) / factorial(power)
                        }
                    })
                    .product::<f64>()
            }),
        )
    }
}

/// Appends every exponent vector of total `degree` over the remaining axes,
/// largest leading exponent first.
fn exponents(ndim: usize, degree: usize, prefix: &mut Vec<usize>, out: &mut Vec<Vec<usize>>) {
    if prefix.len() == ndim {
        if degree == 0 {
            out.push(prefix.clone());
        }
        return;
    }
    for a in (0..=degree).rev() {
        prefix.push(a);
        exponents(ndim, degree - a, prefix, out);
        prefix.pop();
    }
}

fn factorial(n: usize) -> f64 {
    (1..=n).map(|k| k as f64).product()
}
