//! Simplicial LDL' factor storage.
//!
//! The factor holds `A = L * D * L'` with `L` unit lower triangular and `D`
//! diagonal. Storage is column-compressed: column `j` occupies
//! `row_idx[col_ptr[j] .. col_ptr[j] + col_nnz[j]]` and the matching slice
//! of `values`. The first slot of each column is the diagonal position
//! `(j, j)` and carries `D(j,j)` — the unit diagonal of `L` itself is not
//! stored. Remaining slots are the strictly subdiagonal entries of `L`,
//! rows ascending. Column capacity (`col_ptr[j+1] - col_ptr[j]`) may exceed
//! `col_nnz[j]`; the slack is never touched.
//!
//! For every non-root column, the first off-diagonal row index is the
//! column's parent in the elimination tree. The update/downdate kernels
//! walk parent pointers and rely on this invariant.

use std::fmt;

/// Error for structurally invalid factor data.
#[derive(Debug, Clone)]
pub struct FactorShapeError {
    pub reason: String,
}

impl fmt::Display for FactorShapeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid LDL' factor: {}", self.reason)
    }
}

impl std::error::Error for FactorShapeError {}

/// Column-compressed LDL' factor with the diagonal of `D` stored in the
/// first slot of each column of `L`.
#[derive(Debug, Clone)]
pub struct LdlFactor {
    pub(crate) n: usize,
    /// Column offsets, length `n + 1`.
    pub(crate) col_ptr: Vec<usize>,
    /// Live entries per column (>= 1; the diagonal is always present).
    pub(crate) col_nnz: Vec<usize>,
    /// Row indices, diagonal first, then strictly ascending subdiagonals.
    pub(crate) row_idx: Vec<usize>,
    /// Numerical values, `values[col_ptr[j]]` is `D(j,j)`.
    pub(crate) values: Vec<f64>,
}

impl LdlFactor {
    /// Assemble a factor from raw column-compressed arrays, validating the
    /// layout invariants (diagonal first, ascending rows, bounds).
    pub fn new(
        n: usize,
        col_ptr: Vec<usize>,
        col_nnz: Vec<usize>,
        row_idx: Vec<usize>,
        values: Vec<f64>,
    ) -> Result<Self, FactorShapeError> {
        let f = Self {
            n,
            col_ptr,
            col_nnz,
            row_idx,
            values,
        };
        f.validate()?;
        Ok(f)
    }

    fn validate(&self) -> Result<(), FactorShapeError> {
        let fail = |reason: String| Err(FactorShapeError { reason });
        if self.col_ptr.len() != self.n + 1 {
            return fail(format!(
                "col_ptr length {} != n + 1 = {}",
                self.col_ptr.len(),
                self.n + 1
            ));
        }
        if self.col_nnz.len() != self.n {
            return fail(format!("col_nnz length {} != n = {}", self.col_nnz.len(), self.n));
        }
        if self.row_idx.len() != self.values.len() {
            return fail(format!(
                "row_idx length {} != values length {}",
                self.row_idx.len(),
                self.values.len()
            ));
        }
        for j in 0..self.n {
            let start = self.col_ptr[j];
            let nnz = self.col_nnz[j];
            if nnz == 0 {
                return fail(format!("column {} has no diagonal entry", j));
            }
            if start + nnz > self.col_ptr[j + 1] || start + nnz > self.row_idx.len() {
                return fail(format!("column {} overruns its storage", j));
            }
            if self.row_idx[start] != j {
                return fail(format!(
                    "column {} does not start with its diagonal (found row {})",
                    j, self.row_idx[start]
                ));
            }
            let mut prev = j;
            for p in start + 1..start + nnz {
                let i = self.row_idx[p];
                if i >= self.n {
                    return fail(format!("row index {} out of bounds in column {}", i, j));
                }
                if i <= prev {
                    return fail(format!("row indices not ascending in column {}", j));
                }
                prev = i;
            }
        }
        Ok(())
    }

    pub fn n(&self) -> usize {
        self.n
    }

    pub fn col_ptr(&self) -> &[usize] {
        &self.col_ptr
    }

    pub fn col_nnz(&self) -> &[usize] {
        &self.col_nnz
    }

    pub fn row_indices(&self) -> &[usize] {
        &self.row_idx
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// `D(j,j)`.
    pub fn diag(&self, j: usize) -> f64 {
        self.values[self.col_ptr[j]]
    }

    /// All diagonal entries of `D`, in order.
    pub fn diag_values(&self) -> Vec<f64> {
        (0..self.n).map(|j| self.diag(j)).collect()
    }

    /// Elimination-tree parent of column `j`: the first off-diagonal row
    /// index, or `None` when the column has no subdiagonal entries.
    pub fn parent(&self, j: usize) -> Option<usize> {
        if self.col_nnz[j] > 1 {
            Some(self.row_idx[self.col_ptr[j] + 1])
        } else {
            None
        }
    }
}
