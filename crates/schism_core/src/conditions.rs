//! Boundary conditions and their grouping by shared fields.

use crate::equation::{Equation, VectorEquation};
use crate::error::{Result, SchismError};
use crate::expression::{Expr, LinearTerm};
use crate::field::{axes_of, Field, FieldBundle};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// A single homogeneous equation imposed on the immersed surface.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundaryCondition {
    equation: Equation,
    fields: BTreeSet<Field>,
    dimensions: Option<BTreeSet<usize>>,
}

impl BoundaryCondition {
    /// Builds a condition from `lhs = 0`.
    ///
    /// With no whitelist, every time-dependent field of the left-hand side is
    /// selected; otherwise the selection is the intersection with `whitelist`.
    pub fn new(equation: Equation, whitelist: Option<&BTreeSet<Field>>) -> Result<Self> {
        if !equation.rhs.is_zero() {
            return Err(SchismError::equation(format!(
                "nonzero right-hand side in `{equation}` is unsupported"
            )));
        }

        let lhs_fields = equation.lhs.fields();
        let fields: BTreeSet<Field> = match whitelist {
            None => lhs_fields
                .into_iter()
                .filter(Field::is_time_dependent)
                .collect(),
            Some(allowed) => lhs_fields.intersection(allowed).cloned().collect(),
        };
        if fields.is_empty() {
            return Err(SchismError::equation(format!(
                "`{equation}` references none of the boundary fields"
            )));
        }

        let mut dims = BTreeSet::new();
        for (expr, orders) in equation.lhs.derivatives() {
            match expr {
                Expr::Field(field) if fields.contains(field) => dims.extend(axes_of(orders)),
                Expr::Field(field) => {
                    return Err(SchismError::derivative(format!(
                        "derivative of coefficient field `{}` in `{equation}`",
                        field.name()
                    )))
                }
                other => {
                    return Err(SchismError::derivative(format!(
                        "derivative of non-field expression `{other}` in `{equation}`; \
                         collapse chains such as f.dx.dy into f.dxdy"
                    )))
                }
            }
        }
        let dimensions = if dims.is_empty() { None } else { Some(dims) };

        Ok(Self {
            equation,
            fields,
            dimensions,
        })
    }

    pub fn equation(&self) -> &Equation {
        &self.equation
    }

    pub fn lhs(&self) -> &Expr {
        &self.equation.lhs
    }

    /// Fields on which this condition is imposed.
    pub fn fields(&self) -> &BTreeSet<Field> {
        &self.fields
    }

    /// Axes along which the left-hand side differentiates, `None` without derivatives.
    pub fn dimensions(&self) -> Option<&BTreeSet<usize>> {
        self.dimensions.as_ref()
    }

    /// The left-hand side as a sum of scaled field derivatives.
    pub fn linear_terms(&self) -> Result<Vec<LinearTerm>> {
        self.equation.lhs.linear_terms()
    }
}

impl fmt::Display for BoundaryCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BoundaryCondition({})", self.equation)
    }
}

/// Boundary conditions connected through the fields they share.
#[derive(Debug, Clone, PartialEq)]
pub struct ConditionGroup {
    conditions: Vec<BoundaryCondition>,
    fields: BTreeSet<Field>,
}

impl ConditionGroup {
    pub fn new(conditions: Vec<BoundaryCondition>, fields: BTreeSet<Field>) -> Self {
        Self { conditions, fields }
    }

    /// A group with a single field and nothing imposed on it.
    pub fn unconstrained(field: &Field) -> Self {
        Self {
            conditions: Vec::new(),
            fields: BTreeSet::from([field.clone()]),
        }
    }

    pub fn conditions(&self) -> &[BoundaryCondition] {
        &self.conditions
    }

    pub fn fields(&self) -> &BTreeSet<Field> {
        &self.fields
    }

    pub fn contains(&self, field: &Field) -> bool {
        self.fields.contains(field)
    }
}

impl fmt::Display for ConditionGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.fields.iter().map(Field::name).collect();
        write!(f, "ConditionGroup({})", names.join(", "))
    }
}

/// The full set of conditions imposed on a surface, grouped by shared fields.
#[derive(Debug, Clone)]
pub struct BoundaryConditions {
    equations: Vec<Equation>,
    conditions: Vec<BoundaryCondition>,
    groups: Vec<ConditionGroup>,
    fields: Option<BTreeSet<Field>>,
    field_map: BTreeMap<Field, usize>,
}

impl BoundaryConditions {
    /// Flattens and deduplicates `equations`, builds one condition per scalar
    /// equation and groups them.
    ///
    /// Equations are kept in canonical (textual) order, so the result does not
    /// depend on the order in which they were supplied.
    pub fn new<I, E>(equations: I, fields: Option<&[FieldBundle]>) -> Result<Self>
    where
        I: IntoIterator<Item = E>,
        E: Into<VectorEquation>,
    {
        let fields: Option<BTreeSet<Field>> =
            fields.map(|bundles| bundles.iter().flat_map(FieldBundle::flat).collect());

        let mut unique = BTreeMap::new();
        for equation in equations {
            for scalar in equation.into().flatten()? {
                unique.entry(scalar.to_string()).or_insert(scalar);
            }
        }
        let equations: Vec<Equation> = unique.into_values().collect();

        let conditions = equations
            .iter()
            .map(|eq| BoundaryCondition::new(eq.clone(), fields.as_ref()))
            .collect::<Result<Vec<_>>>()?;

        let (groups, field_map) = group_conditions(&conditions);
        log::debug!(
            "Grouped {} boundary conditions into {} groups",
            conditions.len(),
            groups.len()
        );

        Ok(Self {
            equations,
            conditions,
            groups,
            fields,
            field_map,
        })
    }

    /// Deduplicated scalar equations.
    pub fn equations(&self) -> &[Equation] {
        &self.equations
    }

    pub fn conditions(&self) -> &[BoundaryCondition] {
        &self.conditions
    }

    pub fn groups(&self) -> &[ConditionGroup] {
        &self.groups
    }

    /// The caller-supplied whitelist, flattened; `None` if none was given.
    pub fn fields(&self) -> Option<&BTreeSet<Field>> {
        self.fields.as_ref()
    }

    /// Index into `groups()` for every field appearing in any condition.
    pub fn field_map(&self) -> &BTreeMap<Field, usize> {
        &self.field_map
    }

    pub fn group_for(&self, field: &Field) -> Option<&ConditionGroup> {
        self.field_map.get(field).map(|&idx| &self.groups[idx])
    }
}

/// Connected components of the field co-occurrence graph.
fn group_conditions(
    conditions: &[BoundaryCondition],
) -> (Vec<ConditionGroup>, BTreeMap<Field, usize>) {
    let all_fields: Vec<Field> = conditions
        .iter()
        .flat_map(|bc| bc.fields().iter().cloned())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let position = |field: &Field| all_fields.binary_search(field).unwrap_or_default();

    let mut sets = DisjointSet::new(all_fields.len());
    for bc in conditions {
        let mut members = bc.fields().iter().map(position);
        if let Some(first) = members.next() {
            for other in members {
                sets.union(first, other);
            }
        }
    }

    // Fields are visited in sorted order, so groups come out ordered by their
    // smallest field.
    let mut root_to_group: BTreeMap<usize, usize> = BTreeMap::new();
    let mut group_fields: Vec<BTreeSet<Field>> = Vec::new();
    let mut field_map = BTreeMap::new();
    for (idx, field) in all_fields.iter().enumerate() {
        let root = sets.find(idx);
        let group = *root_to_group.entry(root).or_insert_with(|| {
            group_fields.push(BTreeSet::new());
            group_fields.len() - 1
        });
        group_fields[group].insert(field.clone());
        field_map.insert(field.clone(), group);
    }

    let mut group_conditions: Vec<Vec<BoundaryCondition>> = vec![Vec::new(); group_fields.len()];
    for bc in conditions {
        if let Some(group) = bc.fields().iter().next().and_then(|f| field_map.get(f)) {
            group_conditions[*group].push(bc.clone());
        }
    }

    let groups = group_conditions
        .into_iter()
        .zip(group_fields)
        .map(|(conds, fields)| ConditionGroup::new(conds, fields))
        .collect();
    (groups, field_map)
}

struct DisjointSet {
    parent: Vec<usize>,
    rank: Vec<u8>,
}

impl DisjointSet {
    fn new(size: usize) -> Self {
        Self {
            parent: (0..size).collect(),
            rank: vec![0; size],
        }
    }

    fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }

    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra == rb {
            return;
        }
        match self.rank[ra].cmp(&self.rank[rb]) {
            std::cmp::Ordering::Less => self.parent[ra] = rb,
            std::cmp::Ordering::Greater => self.parent[rb] = ra,
            std::cmp::Ordering::Equal => {
                self.parent[rb] = ra;
                self.rank[ra] += 1;
            }
        }
    }
}
