use std::collections::BTreeMap;

use nalgebra::{DMatrix, DVector};

/// Square sparse matrix produced by the assembly layer.
///
/// One sorted column map per row: element scatter accumulates entries in any
/// order, and rows stream out with strictly increasing column indices.
pub struct AssembledMatrix {
    n: usize,
    rows: Vec<BTreeMap<usize, f64>>,
}

impl AssembledMatrix {
    pub fn new(n: usize) -> Self {
        Self {
            n,
            rows: vec![BTreeMap::new(); n],
        }
    }

    pub fn dim(&self) -> usize {
        self.n
    }

    /// Accumulate `value` into entry `(i, j)`.
    #[inline]
    pub fn add(&mut self, i: usize, j: usize, value: f64) {
        *self.rows[i].entry(j).or_insert(0.0) += value;
    }

    pub fn nnz(&self) -> usize {
        self.rows.iter().map(BTreeMap::len).sum()
    }

    /// Sorted `(column, value)` entries of row `i`.
    pub fn row(&self, i: usize) -> impl Iterator<Item = (usize, f64)> + '_ {
        self.rows[i].iter().map(|(&j, &v)| (j, v))
    }

    /// Replace row `i` by the identity row: zero everywhere, one on the
    /// diagonal. Used for constrained degree-of-freedom elimination.
    pub fn set_identity_row(&mut self, i: usize) {
        self.rows[i].clear();
        self.rows[i].insert(i, 1.0);
    }

    /// Dense reconstruction, for tests and small diagnostics only.
    pub fn to_dense(&self) -> DMatrix<f64> {
        let mut dense = DMatrix::zeros(self.n, self.n);
        for (i, row) in self.rows.iter().enumerate() {
            for (&j, &v) in row {
                dense[(i, j)] = v;
            }
        }
        dense
    }
}

/// Transient matrix/vector pair produced by one assembly pass and consumed
/// by the next linear solve.
pub struct AssembledSystem {
    pub matrix: AssembledMatrix,
    pub rhs: DVector<f64>,
}
