pub mod bridge;
pub mod engine;
pub mod matrix;
pub mod newton;
pub mod timing;

/// Vector norm used for residual monitoring.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Norm {
    L2,
    Max,
}

/// Preconditioning applied before handing the system to the iterative
/// solver. `Jacobi` scales each row by its diagonal entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Preconditioner {
    None,
    Jacobi,
}

/// Parameters forwarded to the external iterative linear solver.
#[derive(Clone, Copy, Debug)]
pub struct SolverParams {
    /// Floor for the inner Krylov tolerance. The effective tolerance adapts
    /// to the current Newton residual but never drops below this.
    pub tolerance: f64,
    /// Iteration cap of the inner Krylov iteration.
    pub max_iterations: usize,
    pub preconditioner: Preconditioner,
}

impl Default for SolverParams {
    fn default() -> Self {
        Self {
            tolerance: 1e-10,
            max_iterations: 2000,
            preconditioner: Preconditioner::Jacobi,
        }
    }
}
