//! Boundary-aware substitutions for the derivatives of a solver.

use crate::basis::{Basis, BasisMap};
use crate::conditions::{BoundaryConditions, ConditionGroup};
use crate::error::Result;
use crate::field::{Derivative, Field};
use crate::geometry::BoundaryGeometry;
use crate::projection::Projection;
use crate::skin::ModifiedSkin;
use crate::stencil::{ModifiedStencil, StencilSettings};
use rayon::prelude::*;

/// Boundary conditions imposed on an immersed surface.
#[derive(Debug, Clone)]
pub struct Boundary<'g> {
    conditions: BoundaryConditions,
    geometry: &'g BoundaryGeometry,
    settings: StencilSettings,
    bases: BasisMap,
}

impl<'g> Boundary<'g> {
    pub fn new(
        conditions: BoundaryConditions,
        geometry: &'g BoundaryGeometry,
        settings: StencilSettings,
    ) -> Result<Self> {
        for field in conditions.field_map().keys() {
            geometry.check_field(field)?;
        }
        if let Some(whitelist) = conditions.fields() {
            for field in whitelist {
                geometry.check_field(field)?;
            }
        }
        Ok(Self {
            conditions,
            geometry,
            settings,
            bases: BasisMap::new(),
        })
    }

    /// Replaces the default basis (a Taylor basis of the field's space order)
    /// for one field.
    pub fn with_basis(mut self, field: Field, basis: Basis) -> Self {
        self.bases.insert(field, basis);
        self
    }

    pub fn conditions(&self) -> &BoundaryConditions {
        &self.conditions
    }

    pub fn geometry(&self) -> &'g BoundaryGeometry {
        self.geometry
    }

    pub fn settings(&self) -> &StencilSettings {
        &self.settings
    }

    /// Modified stencils for every skin point of every derivative.
    pub fn substitutions(&self, derivatives: &[Derivative]) -> Result<Vec<Substitution<'g>>> {
        derivatives
            .par_iter()
            .map(|derivative| self.substitution(derivative))
            .collect()
    }

    pub fn substitution(&self, derivative: &Derivative) -> Result<Substitution<'g>> {
        let field = derivative.field();
        self.geometry.check_field(field)?;

        let unconstrained;
        let group = match self.conditions.group_for(field) {
            Some(group) => group,
            None => {
                unconstrained = ConditionGroup::unconstrained(field);
                &unconstrained
            }
        };
        let basis_map = self.basis_map(group);

        let projection = Projection::new(derivative.clone(), group, &basis_map)?;
        let skin = ModifiedSkin::new(derivative.clone(), self.geometry)?;
        let stencils = (0..skin.len())
            .into_par_iter()
            .map(|i| projection.modified_stencil(self.geometry, &skin.point(i), &self.settings))
            .collect::<Result<Vec<_>>>()?;

        log::debug!(
            "Substitution for {derivative} in {group}: {} stencils",
            stencils.len()
        );
        Ok(Substitution { skin, stencils })
    }

    fn basis_map(&self, group: &ConditionGroup) -> BasisMap {
        group
            .fields()
            .iter()
            .map(|field| {
                let basis = self
                    .bases
                    .get(field)
                    .cloned()
                    .unwrap_or_else(|| Basis::for_field(field));
                (field.clone(), basis)
            })
            .collect()
    }
}

/// Modified stencils of one derivative, one per skin point.
#[derive(Debug, Clone)]
pub struct Substitution<'g> {
    skin: ModifiedSkin<'g>,
    stencils: Vec<ModifiedStencil>,
}

impl<'g> Substitution<'g> {
    pub fn derivative(&self) -> &Derivative {
        self.skin.derivative()
    }

    pub fn skin(&self) -> &ModifiedSkin<'g> {
        &self.skin
    }

    /// Stencils in skin order.
    pub fn stencils(&self) -> &[ModifiedStencil] {
        &self.stencils
    }

    pub fn stencil_at(&self, point: &[usize]) -> Option<&ModifiedStencil> {
        self.skin.position(point).map(|i| &self.stencils[i])
    }

    /// The derivative at every skin point, given sampled field values.
    pub fn evaluate(&self, sample: impl Fn(&Field, &[usize]) -> f64 + Sync) -> Vec<f64> {
        self.stencils
            .par_iter()
            .map(|stencil| stencil.apply(&sample))
            .collect()
    }
}
