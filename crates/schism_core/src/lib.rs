//! The `schism_core` crate modifies finite-difference stencils next to immersed
//! boundaries, surfaces that cut through a structured grid rather than
//! following it. Boundary conditions on the surface are enforced by fitting a
//! local polynomial reconstruction that satisfies them exactly.
//!
//! Key components:
//! - **Geometry**: interior/boundary masks and unit normals from a signed-distance field.
//! - **Conditions**: boundary-condition equations grouped by the fields they share.
//! - **Skin**: stencil footprints and the grid points whose stencils must change.
//! - **Basis / Projection**: Taylor bases and the reconstruction matrix around a point.
//! - **Stencil**: the constrained least-squares fit that yields modified stencil weights.
//! - **Boundary**: per-derivative substitutions assembled in parallel.
pub mod basis;
pub mod boundary;
pub mod conditions;
pub mod equation;
pub mod error;
pub mod expression;
pub mod field;
pub mod geometry;
pub mod grid;
pub mod projection;
pub mod skin;
pub mod stencil;

#[cfg(test)]
mod testing;

pub use boundary::{Boundary, Substitution};
pub use error::{Result, SchismError};
