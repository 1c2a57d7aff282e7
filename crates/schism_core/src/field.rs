//! Fields and derivative descriptors.

use crate::error::{Result, SchismError};
use crate::grid::AXIS_NAMES;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A scalar unknown (or coefficient) discretized on the grid.
///
/// Fields compare and order by name first, so sets of fields iterate
/// alphabetically.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Field {
    name: String,
    ndim: usize,
    space_order: usize,
    time_dependent: bool,
}

impl Field {
    /// A field that evolves with the solution.
    pub fn time_dependent(name: impl Into<String>, ndim: usize, space_order: usize) -> Self {
        Self {
            name: name.into(),
            ndim,
            space_order,
            time_dependent: true,
        }
    }

    /// A static field, typically a material coefficient.
    pub fn coefficient(name: impl Into<String>, ndim: usize, space_order: usize) -> Self {
        Self {
            name: name.into(),
            ndim,
            space_order,
            time_dependent: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ndim(&self) -> usize {
        self.ndim
    }

    pub fn space_order(&self) -> usize {
        self.space_order
    }

    pub fn is_time_dependent(&self) -> bool {
        self.time_dependent
    }

    /// Derivative of this field with the given order along each axis.
    pub fn derivative(&self, orders: &[usize]) -> Result<Derivative> {
        Derivative::new(self.clone(), orders.to_vec())
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// One scalar component per spatial axis, named `<name>_x`, `<name>_y`, ...
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VectorField {
    name: String,
    components: Vec<Field>,
}

impl VectorField {
    pub fn time_dependent(name: impl Into<String>, ndim: usize, space_order: usize) -> Self {
        let name = name.into();
        let components = AXIS_NAMES[..ndim.min(AXIS_NAMES.len())]
            .iter()
            .map(|axis| Field::time_dependent(format!("{name}_{axis}"), ndim, space_order))
            .collect();
        Self { name, components }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn components(&self) -> &[Field] {
        &self.components
    }
}

/// Anything that expands into scalar fields when building a field whitelist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldBundle {
    Scalar(Field),
    Vector(VectorField),
}

impl FieldBundle {
    pub fn flat(&self) -> Vec<Field> {
        match self {
            FieldBundle::Scalar(field) => vec![field.clone()],
            FieldBundle::Vector(vector) => vector.components().to_vec(),
        }
    }
}

impl From<Field> for FieldBundle {
    fn from(field: Field) -> Self {
        FieldBundle::Scalar(field)
    }
}

impl From<VectorField> for FieldBundle {
    fn from(vector: VectorField) -> Self {
        FieldBundle::Vector(vector)
    }
}

/// A partial derivative of a single field.
///
/// `orders[axis]` is the number of times the field is differentiated along
/// `axis`; the vector always has one entry per field dimension.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Derivative {
    field: Field,
    orders: Vec<usize>,
}

impl Derivative {
    pub fn new(field: Field, orders: Vec<usize>) -> Result<Self> {
        if orders.len() != field.ndim() {
            return Err(SchismError::derivative(format!(
                "derivative of `{}` needs {} axis orders, got {}",
                field.name(),
                field.ndim(),
                orders.len()
            )));
        }
        if orders.iter().all(|&o| o == 0) {
            return Err(SchismError::derivative(format!(
                "derivative of `{}` must differentiate along at least one axis",
                field.name()
            )));
        }
        Ok(Self { field, orders })
    }

    /// Field being differentiated.
    pub fn field(&self) -> &Field {
        &self.field
    }

    pub fn orders(&self) -> &[usize] {
        &self.orders
    }

    /// Axes with a non-zero derivative order.
    pub fn axes(&self) -> Vec<usize> {
        axes_of(&self.orders)
    }

    pub fn total_order(&self) -> usize {
        self.orders.iter().sum()
    }

    /// Ordered list of axes, one entry per differentiation (`dx2dy` -> `[0, 0, 1]`).
    pub fn axis_sequence(&self) -> Vec<usize> {
        self.orders
            .iter()
            .enumerate()
            .flat_map(|(axis, &order)| std::iter::repeat(axis).take(order))
            .collect()
    }
}

impl fmt::Display for Derivative {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.field.name(), suffix(&self.orders))
    }
}

pub(crate) fn axes_of(orders: &[usize]) -> Vec<usize> {
    orders
        .iter()
        .enumerate()
        .filter(|(_, order)| **order > 0)
        .map(|(axis, _)| axis)
        .collect()
}

/// Devito-style derivative suffix, e.g. `dx2dy`.
pub(crate) fn suffix(orders: &[usize]) -> String {
    let mut out = String::new();
    for (axis, &order) in orders.iter().enumerate() {
        if order == 0 {
            continue;
        }
        out.push('d');
        out.push(AXIS_NAMES.get(axis).copied().unwrap_or('?'));
        if order > 1 {
            out.push_str(&order.to_string());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::{Field, FieldBundle, VectorField};

    #[test]
    fn derivative_reports_axes_and_sequence() {
        let f = Field::time_dependent("f", 3, 4);
        let d = f.derivative(&[2, 0, 1]).expect("derivative should build");
        assert_eq!(d.axes(), vec![0, 2]);
        assert_eq!(d.axis_sequence(), vec![0, 0, 2]);
        assert_eq!(d.total_order(), 3);
        assert_eq!(d.to_string(), "f.dx2dz");
    }

    #[test]
    fn derivative_rejects_bad_orders() {
        let f = Field::time_dependent("f", 2, 2);
        assert!(f.derivative(&[1]).is_err());
        assert!(f.derivative(&[0, 0]).is_err());
    }

    #[test]
    fn vector_field_flattens_to_components() {
        let v = VectorField::time_dependent("v", 3, 2);
        let names: Vec<String> = FieldBundle::from(v)
            .flat()
            .iter()
            .map(|f| f.name().to_string())
            .collect();
        assert_eq!(names, vec!["v_x", "v_y", "v_z"]);
    }
}
