use thiserror::Error;

/// Failure modes of the solve core.
///
/// Reaching the Newton iteration cap is not an error; it is reported as a
/// terminal [`crate::numerics::newton::NewtonState`].
#[derive(Debug, Error)]
pub enum PdeError {
    #[error("unknown coefficient `{0}`")]
    UnknownCoefficient(String),

    #[error("assembly failed: {0}")]
    Assembly(String),

    #[error("boundary component index {component} out of range for {count} solution components")]
    ConstraintIndex { component: usize, count: usize },

    #[error("matrix conversion failed: expected dimension {expected}, found {found}")]
    MatrixConversion { expected: usize, found: usize },

    #[error("linear solve failed: {0}")]
    LinearSolve(String),
}
