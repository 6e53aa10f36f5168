pub mod bc;
pub mod coefficients;
pub mod galerkin;

use nalgebra::DVector;

use crate::discretization::space::{Function, FunctionSpace};
use crate::error::PdeError;
use crate::numerics::matrix::AssembledSystem;
use coefficients::CoefficientRegistry;

/// Contract for the finite-element layer: given a function space, the named
/// coefficients and the current iterate, produce the linearized system.
pub trait AssemblyProvider {
    /// Number of solution components the weak form couples.
    fn components(&self) -> usize;

    /// Coefficient names that must be registered before assembly.
    fn required_coefficients(&self) -> &[&'static str];

    /// Source names that must be registered before assembly.
    fn required_sources(&self) -> &[&'static str];

    /// Evaluate the Jacobian and the Newton right-hand side `b = -F(u)` at
    /// the current iterate. The matrix is square of dimension
    /// `space.dof_count()`; the vector has the same length.
    fn assemble_system(
        &self,
        space: &FunctionSpace,
        coefficients: &CoefficientRegistry,
        u: &Function,
    ) -> Result<AssembledSystem, PdeError>;

    /// Evaluate only the right-hand side, for residual monitoring.
    fn assemble_residual(
        &self,
        space: &FunctionSpace,
        coefficients: &CoefficientRegistry,
        u: &Function,
    ) -> Result<DVector<f64>, PdeError>;
}
