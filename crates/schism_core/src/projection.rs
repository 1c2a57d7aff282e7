//! Least-squares reconstruction systems around a modified point.

use crate::basis::{Basis, BasisMap};
use crate::conditions::ConditionGroup;
use crate::error::{Result, SchismError};
use crate::field::{Derivative, Field};
use crate::skin::{stencil_footprint, Footprint};
use nalgebra::DMatrix;

/// The reconstruction of a derivative's target field from its standard
/// stencil footprint.
///
/// `project_matrix` has one row per footprint offset and one column per basis
/// term, so `project_matrix * c` gives the field values at the footprint for
/// basis coefficients `c`.
#[derive(Debug, Clone)]
pub struct Projection<'a> {
    derivative: Derivative,
    group: &'a ConditionGroup,
    basis_map: &'a BasisMap,
    footprint: Footprint,
    project_matrix: DMatrix<f64>,
}

impl<'a> Projection<'a> {
    pub fn new(
        derivative: Derivative,
        group: &'a ConditionGroup,
        basis_map: &'a BasisMap,
    ) -> Result<Self> {
        let field = derivative.field();
        if !group.contains(field) {
            return Err(SchismError::mismatch(format!(
                "`{field}` is not one of the group fields {group}"
            )));
        }
        for member in group.fields() {
            basis_for(basis_map, member)?;
        }
        let basis = basis_for(basis_map, field)?;

        let footprint = stencil_footprint(&derivative);
        let mut project_matrix = DMatrix::zeros(footprint.len(), basis.len());
        for (k, offset) in footprint.iter().enumerate() {
            let x: Vec<f64> = offset.iter().map(|&o| o as f64).collect();
            project_matrix.set_row(k, &basis.evaluate(&x));
        }

        Ok(Self {
            derivative,
            group,
            basis_map,
            footprint,
            project_matrix,
        })
    }

    pub fn derivative(&self) -> &Derivative {
        &self.derivative
    }

    pub fn group(&self) -> &'a ConditionGroup {
        self.group
    }

    pub fn basis_map(&self) -> &'a BasisMap {
        self.basis_map
    }

    pub fn footprint(&self) -> &Footprint {
        &self.footprint
    }

    pub fn project_matrix(&self) -> &DMatrix<f64> {
        &self.project_matrix
    }

    /// Basis of the derivative's target field.
    pub fn basis(&self) -> Result<&'a Basis> {
        basis_for(self.basis_map, self.derivative.field())
    }
}

/// Looks up a field's basis, checking that its dimensionality matches.
pub(crate) fn basis_for<'m>(basis_map: &'m BasisMap, field: &Field) -> Result<&'m Basis> {
    let basis = basis_map
        .get(field)
        .ok_or_else(|| SchismError::MissingBasis(field.name().to_string()))?;
    if basis.ndim() != field.ndim() {
        return Err(SchismError::mismatch(format!(
            "basis `{}` is {}D but `{field}` is {}D",
            basis.name(),
            basis.ndim(),
            field.ndim()
        )));
    }
    Ok(basis)
}

#[cfg(test)]
mod tests {
    use super::Projection;
    use crate::basis::{Basis, BasisMap};
    use crate::conditions::ConditionGroup;
    use crate::error::SchismError;
    use crate::field::{Derivative, Field};
    use approx::assert_relative_eq;

    fn setup(derivative: &Derivative) -> (ConditionGroup, BasisMap) {
        let field = derivative.field().clone();
        let group = ConditionGroup::unconstrained(&field);
        let basis_map = BasisMap::from([(field.clone(), Basis::for_field(&field))]);
        (group, basis_map)
    }

    fn canonical() -> Vec<Derivative> {
        let f = Field::time_dependent("f", 2, 2);
        let g = Field::time_dependent("g", 3, 2);
        [
            (&f, vec![1, 0]),
            (&f, vec![0, 1]),
            (&f, vec![2, 0]),
            (&f, vec![1, 1]),
            (&g, vec![1, 0, 0]),
            (&g, vec![0, 0, 2]),
            (&g, vec![1, 1, 0]),
        ]
        .into_iter()
        .map(|(field, orders)| field.derivative(&orders).expect("derivative should build"))
        .collect()
    }

    #[test]
    fn project_matrix_shape_matches_footprint_and_basis() {
        for derivative in canonical() {
            let (group, basis_map) = setup(&derivative);
            let projection =
                Projection::new(derivative.clone(), &group, &basis_map).expect("projection should build");
            let basis = projection.basis().expect("basis should exist");
            let expected_points = 3usize.pow(derivative.axes().len() as u32);
            assert_eq!(projection.footprint().len(), expected_points, "{derivative}");
            assert_eq!(
                projection.project_matrix().shape(),
                (expected_points, basis.len()),
                "{derivative}"
            );
        }
    }

    #[test]
    fn project_matrix_is_reproducible() {
        for derivative in canonical() {
            let (group, basis_map) = setup(&derivative);
            let first = Projection::new(derivative.clone(), &group, &basis_map)
                .expect("projection should build");
            let second = Projection::new(derivative.clone(), &group, &basis_map)
                .expect("projection should build");
            assert_eq!(first.project_matrix(), second.project_matrix(), "{derivative}");
            assert_eq!(first.footprint(), second.footprint(), "{derivative}");
        }
    }

    #[test]
    fn project_matrix_rows_are_basis_evaluations() {
        let f = Field::time_dependent("f", 2, 2);
        let dx = f.derivative(&[1, 0]).expect("derivative should build");
        let (group, basis_map) = setup(&dx);
        let projection = Projection::new(dx, &group, &basis_map).expect("projection should build");
        let expected = [
            [1.0, -1.0, 0.0, 0.5, 0.0, 0.0],
            [1.0, 0.0, 0.0, 0.0, 0.0, 0.0],
            [1.0, 1.0, 0.0, 0.5, 0.0, 0.0],
        ];
        for (k, row) in expected.iter().enumerate() {
            for (t, want) in row.iter().enumerate() {
                assert_relative_eq!(projection.project_matrix()[(k, t)], *want);
            }
        }
    }

    #[test]
    fn rejects_field_outside_group() {
        let f = Field::time_dependent("f", 2, 2);
        let g = Field::time_dependent("g", 2, 2);
        let group = ConditionGroup::unconstrained(&g);
        let basis_map = BasisMap::from([(f.clone(), Basis::for_field(&f))]);
        let dx = f.derivative(&[1, 0]).expect("derivative should build");
        let err = Projection::new(dx, &group, &basis_map).expect_err("f is not in the group");
        assert!(matches!(err, SchismError::ConfigurationMismatch(_)), "unexpected error: {err}");
    }

    #[test]
    fn rejects_missing_basis() {
        let f = Field::time_dependent("f", 2, 2);
        let group = ConditionGroup::unconstrained(&f);
        let basis_map = BasisMap::new();
        let dx = f.derivative(&[1, 0]).expect("derivative should build");
        let err = Projection::new(dx, &group, &basis_map).expect_err("basis is missing");
        assert_eq!(err, SchismError::MissingBasis("f".to_string()));
    }
}
