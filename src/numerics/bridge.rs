use nalgebra::DVector;

use crate::error::PdeError;
use crate::numerics::matrix::AssembledMatrix;

/// Index convention of the consuming solver. Fortran-style solvers number
/// rows and columns from one.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IndexBase {
    Zero,
    One,
}

impl IndexBase {
    fn offset(self) -> usize {
        match self {
            IndexBase::Zero => 0,
            IndexBase::One => 1,
        }
    }
}

/// Compressed sparse row triplet handed to the external solver.
#[derive(Clone, Debug)]
pub struct SparseRows {
    pub row_ptr: Vec<usize>,
    pub col_idx: Vec<usize>,
    pub values: Vec<f64>,
    pub base: IndexBase,
}

impl SparseRows {
    pub fn nnz(&self) -> usize {
        self.values.len()
    }

    /// Re-index into the requested base. Both `row_ptr` and `col_idx` shift.
    pub fn with_base(mut self, base: IndexBase) -> Self {
        if base != self.base {
            let from = self.base.offset() as i64;
            let to = base.offset() as i64;
            for p in &mut self.row_ptr {
                *p = (*p as i64 - from + to) as usize;
            }
            for c in &mut self.col_idx {
                *c = (*c as i64 - from + to) as usize;
            }
            self.base = base;
        }
        self
    }
}

/// Converts assembled systems into the solver's compressed-row format and
/// solver output back into solution-space vectors.
///
/// The scratch buffers are retained between conversions: the sparsity
/// pattern is fixed by the mesh and function space, so after the first
/// Newton iteration no further growth occurs.
#[derive(Default)]
pub struct SparseBridge {
    row_ptr: Vec<usize>,
    col_idx: Vec<usize>,
    values: Vec<f64>,
}

impl SparseBridge {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compress an assembled matrix into row-pointer form.
    ///
    /// Column indices come out strictly increasing within each row and every
    /// stored entry survives with its exact value.
    pub fn to_sparse_rows(
        &mut self,
        matrix: &AssembledMatrix,
        expected_rows: usize,
        base: IndexBase,
    ) -> Result<SparseRows, PdeError> {
        if matrix.dim() != expected_rows {
            return Err(PdeError::MatrixConversion {
                expected: expected_rows,
                found: matrix.dim(),
            });
        }

        self.row_ptr.clear();
        self.col_idx.clear();
        self.values.clear();

        self.row_ptr.push(0);
        for i in 0..matrix.dim() {
            for (j, v) in matrix.row(i) {
                self.col_idx.push(j);
                self.values.push(v);
            }
            self.row_ptr.push(self.col_idx.len());
        }

        let rows = SparseRows {
            row_ptr: self.row_ptr.clone(),
            col_idx: self.col_idx.clone(),
            values: self.values.clone(),
            base: IndexBase::Zero,
        };
        Ok(rows.with_base(base))
    }

    /// Flatten an assembled vector for the external solver.
    pub fn to_dense(&self, vector: &DVector<f64>) -> Vec<f64> {
        vector.as_slice().to_vec()
    }

    /// Lift a solver output array back into a solution-space vector.
    pub fn from_dense(&self, values: &[f64], expected_len: usize) -> Result<DVector<f64>, PdeError> {
        if values.len() != expected_len {
            return Err(PdeError::MatrixConversion {
                expected: expected_len,
                found: values.len(),
            });
        }
        Ok(DVector::from_column_slice(values))
    }

    /// Drop the cached pattern, e.g. after a mesh update.
    pub fn reset(&mut self) {
        self.row_ptr = Vec::new();
        self.col_idx = Vec::new();
        self.values = Vec::new();
    }
}
