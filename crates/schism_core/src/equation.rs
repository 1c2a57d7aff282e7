use crate::error::{Result, SchismError};
use crate::expression::{parse, Expr};
use crate::field::{Field, VectorField};
use std::fmt;

/// A scalar equality `lhs = rhs`.
#[derive(Debug, Clone, PartialEq)]
pub struct Equation {
    pub lhs: Expr,
    pub rhs: Expr,
}

impl Equation {
    pub fn new(lhs: impl Into<Expr>, rhs: impl Into<Expr>) -> Self {
        Self {
            lhs: lhs.into(),
            rhs: rhs.into(),
        }
    }

    /// Parses `lhs = rhs`, resolving identifiers against `fields`.
    pub fn parse(input: &str, fields: &[Field]) -> Result<Self> {
        let mut sides = input.split('=');
        let (Some(lhs), Some(rhs), None) = (sides.next(), sides.next(), sides.next()) else {
            return Err(SchismError::Parse(format!(
                "expected exactly one `=` in `{input}`"
            )));
        };
        Ok(Self {
            lhs: parse(lhs, fields)?,
            rhs: parse(rhs, fields)?,
        })
    }
}

impl fmt::Display for Equation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} = {}", self.lhs, self.rhs)
    }
}

/// A componentwise equality between two lists of expressions.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorEquation {
    pub lhs: Vec<Expr>,
    pub rhs: Vec<Expr>,
}

impl VectorEquation {
    pub fn new(lhs: Vec<Expr>, rhs: Vec<Expr>) -> Self {
        Self { lhs, rhs }
    }

    /// `v = 0` for every component of a vector field.
    pub fn zero(field: &VectorField) -> Self {
        Self {
            lhs: field.components().iter().map(Expr::field).collect(),
            rhs: vec![Expr::number(0.0)],
        }
    }

    /// Splits into scalar equations. A single right-hand component is
    /// broadcast against every left-hand component.
    pub fn flatten(&self) -> Result<Vec<Equation>> {
        if self.lhs.is_empty() {
            return Err(SchismError::equation("equation has no components"));
        }
        if self.rhs.len() == 1 {
            return Ok(self
                .lhs
                .iter()
                .map(|lhs| Equation::new(lhs.clone(), self.rhs[0].clone()))
                .collect());
        }
        if self.lhs.len() != self.rhs.len() {
            return Err(SchismError::equation(format!(
                "left-hand side has {} components but right-hand side has {}",
                self.lhs.len(),
                self.rhs.len()
            )));
        }
        Ok(self
            .lhs
            .iter()
            .zip(&self.rhs)
            .map(|(lhs, rhs)| Equation::new(lhs.clone(), rhs.clone()))
            .collect())
    }
}

impl From<Equation> for VectorEquation {
    fn from(equation: Equation) -> Self {
        Self {
            lhs: vec![equation.lhs],
            rhs: vec![equation.rhs],
        }
    }
}
