//! Compressed Sparse Column (CSC) matrix storage.
//!
//! This is the input format for update matrices and for the symmetric
//! matrices handed to the initial factorization. Columns may be *packed*
//! (column `j` spans `col_ptr[j] .. col_ptr[j+1]`) or *unpacked* (column
//! `j` spans `col_ptr[j] .. col_ptr[j] + col_nnz[j]`, leaving slack at the
//! end of each column). Row indices are sorted ascending within a column.

use std::fmt;

/// Error for structurally invalid CSC inputs.
#[derive(Debug, Clone)]
pub struct MatrixError {
    pub reason: String,
}

impl fmt::Display for MatrixError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid sparse matrix: {}", self.reason)
    }
}

impl std::error::Error for MatrixError {}

fn invalid(reason: String) -> MatrixError {
    MatrixError { reason }
}

/// Sparse matrix in compressed-column form.
#[derive(Debug, Clone)]
pub struct SparseMatrix {
    nrow: usize,
    ncol: usize,
    /// Column offsets, length `ncol + 1`.
    col_ptr: Vec<usize>,
    /// Per-column entry counts for the unpacked form. `None` means packed.
    col_nnz: Option<Vec<usize>>,
    /// Row indices, ascending within each column.
    row_idx: Vec<usize>,
    values: Vec<f64>,
}

impl SparseMatrix {
    /// Build a packed CSC matrix, validating the structure.
    pub fn new(
        nrow: usize,
        ncol: usize,
        col_ptr: Vec<usize>,
        row_idx: Vec<usize>,
        values: Vec<f64>,
    ) -> Result<Self, MatrixError> {
        let m = Self {
            nrow,
            ncol,
            col_ptr,
            col_nnz: None,
            row_idx,
            values,
        };
        m.validate()?;
        Ok(m)
    }

    /// Build an unpacked CSC matrix (per-column counts, slack allowed).
    pub fn new_unpacked(
        nrow: usize,
        ncol: usize,
        col_ptr: Vec<usize>,
        col_nnz: Vec<usize>,
        row_idx: Vec<usize>,
        values: Vec<f64>,
    ) -> Result<Self, MatrixError> {
        if col_nnz.len() != ncol {
            return Err(invalid(format!(
                "col_nnz length {} != ncol {}",
                col_nnz.len(),
                ncol
            )));
        }
        let m = Self {
            nrow,
            ncol,
            col_ptr,
            col_nnz: Some(col_nnz),
            row_idx,
            values,
        };
        m.validate()?;
        Ok(m)
    }

    /// Build from (row, col, value) triplets. Duplicate entries are summed.
    pub fn from_triplets(
        nrow: usize,
        ncol: usize,
        triplets: &[(usize, usize, f64)],
    ) -> Result<Self, MatrixError> {
        for &(r, c, _) in triplets {
            if r >= nrow || c >= ncol {
                return Err(invalid(format!(
                    "triplet ({}, {}) out of bounds for {}x{}",
                    r, c, nrow, ncol
                )));
            }
        }
        let mut sorted: Vec<(usize, usize, f64)> = triplets.to_vec();
        sorted.sort_by_key(|&(r, c, _)| (c, r));

        let mut col_ptr = vec![0usize; ncol + 1];
        let mut row_idx: Vec<usize> = Vec::with_capacity(sorted.len());
        let mut values: Vec<f64> = Vec::with_capacity(sorted.len());
        for &(r, c, v) in &sorted {
            // accumulate a duplicate of the entry just pushed for this column
            let dup = !values.is_empty()
                && col_ptr[c + 1] == values.len()
                && row_idx[values.len() - 1] == r;
            if dup {
                let last = values.len() - 1;
                values[last] += v;
            } else {
                row_idx.push(r);
                values.push(v);
                col_ptr[c + 1] = values.len();
            }
        }
        // make the offsets cumulative over empty columns too
        for c in 0..ncol {
            if col_ptr[c + 1] < col_ptr[c] {
                col_ptr[c + 1] = col_ptr[c];
            }
        }
        Self::new(nrow, ncol, col_ptr, row_idx, values)
    }

    fn validate(&self) -> Result<(), MatrixError> {
        if self.col_ptr.len() != self.ncol + 1 {
            return Err(invalid(format!(
                "col_ptr length {} != ncol + 1 = {}",
                self.col_ptr.len(),
                self.ncol + 1
            )));
        }
        if self.row_idx.len() != self.values.len() {
            return Err(invalid(format!(
                "row_idx length {} != values length {}",
                self.row_idx.len(),
                self.values.len()
            )));
        }
        for j in 0..self.ncol {
            if self.col_ptr[j] > self.col_ptr[j + 1] {
                return Err(invalid(format!("col_ptr not monotone at column {}", j)));
            }
            let (start, end) = self.col_range(j);
            if end > self.col_ptr[j + 1] || end > self.row_idx.len() {
                return Err(invalid(format!("column {} overruns its storage", j)));
            }
            let mut prev = None;
            for p in start..end {
                let i = self.row_idx[p];
                if i >= self.nrow {
                    return Err(invalid(format!(
                        "row index {} out of bounds in column {}",
                        i, j
                    )));
                }
                if let Some(q) = prev {
                    if i <= q {
                        return Err(invalid(format!(
                            "row indices not strictly ascending in column {}",
                            j
                        )));
                    }
                }
                prev = Some(i);
            }
        }
        Ok(())
    }

    pub fn nrow(&self) -> usize {
        self.nrow
    }

    pub fn ncol(&self) -> usize {
        self.ncol
    }

    /// Index range of column `j` in `row_indices()` / `values()`,
    /// honoring the unpacked per-column counts when present.
    pub fn col_range(&self, j: usize) -> (usize, usize) {
        let start = self.col_ptr[j];
        let end = match &self.col_nnz {
            Some(nnz) => start + nnz[j],
            None => self.col_ptr[j + 1],
        };
        (start, end)
    }

    pub fn row_indices(&self) -> &[usize] {
        &self.row_idx
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// First (smallest) row index of column `j`, or `None` for an empty column.
    pub fn first_row(&self, j: usize) -> Option<usize> {
        let (start, end) = self.col_range(j);
        if start < end {
            Some(self.row_idx[start])
        } else {
            None
        }
    }

    /// True when the two matrices have identical dimensions and an
    /// identical nonzero pattern, column by column.
    pub fn pattern_eq(&self, other: &SparseMatrix) -> bool {
        if self.nrow != other.nrow || self.ncol != other.ncol {
            return false;
        }
        for j in 0..self.ncol {
            let (s0, e0) = self.col_range(j);
            let (s1, e1) = other.col_range(j);
            if e0 - s0 != e1 - s1 {
                return false;
            }
            if self.row_idx[s0..e0] != other.row_idx[s1..e1] {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_triplets_basic() {
        // [ 2 0 ]
        // [ 1 3 ]
        let m = SparseMatrix::from_triplets(2, 2, &[(0, 0, 2.0), (1, 0, 1.0), (1, 1, 3.0)]).unwrap();
        assert_eq!(m.col_range(0), (0, 2));
        assert_eq!(m.col_range(1), (2, 3));
        assert_eq!(m.row_indices(), &[0, 1, 1]);
        assert_eq!(m.values(), &[2.0, 1.0, 3.0]);
    }

    #[test]
    fn test_from_triplets_duplicates_sum() {
        let m = SparseMatrix::from_triplets(2, 1, &[(0, 0, 2.0), (0, 0, 3.0)]).unwrap();
        assert_eq!(m.row_indices(), &[0]);
        assert_eq!(m.values(), &[5.0]);
    }

    #[test]
    fn test_from_triplets_empty_column() {
        let m = SparseMatrix::from_triplets(3, 3, &[(0, 0, 1.0), (2, 2, 1.0)]).unwrap();
        assert_eq!(m.col_range(1), (1, 1));
        assert_eq!(m.first_row(1), None);
        assert_eq!(m.first_row(2), Some(2));
    }

    #[test]
    fn test_reject_unsorted_rows() {
        let r = SparseMatrix::new(3, 1, vec![0, 2], vec![2, 1], vec![1.0, 1.0]);
        assert!(r.is_err());
    }

    #[test]
    fn test_reject_out_of_bounds_row() {
        let r = SparseMatrix::new(2, 1, vec![0, 1], vec![5], vec![1.0]);
        assert!(r.is_err());
    }

    #[test]
    fn test_unpacked_column_slack() {
        // column 0 has capacity 3 but only 2 live entries
        let m = SparseMatrix::new_unpacked(
            4,
            2,
            vec![0, 3, 5],
            vec![2, 2],
            vec![0, 2, 0, 1, 3],
            vec![1.0, 2.0, 0.0, 4.0, 5.0],
        )
        .unwrap();
        assert_eq!(m.col_range(0), (0, 2));
        assert_eq!(m.col_range(1), (3, 5));
    }

    #[test]
    fn test_pattern_eq() {
        let a = SparseMatrix::from_triplets(3, 2, &[(0, 0, 1.0), (2, 0, 2.0), (1, 1, 3.0)]).unwrap();
        let b = SparseMatrix::from_triplets(3, 2, &[(0, 0, 9.0), (2, 0, 8.0), (1, 1, 7.0)]).unwrap();
        let c = SparseMatrix::from_triplets(3, 2, &[(0, 0, 1.0), (1, 0, 2.0), (1, 1, 3.0)]).unwrap();
        assert!(a.pattern_eq(&b));
        assert!(!a.pattern_eq(&c));
    }
}
