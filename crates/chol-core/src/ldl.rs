//! Initial simplicial LDL' factorization and triangular solves.
//!
//! # Algorithm
//!
//! Two phases over the upper triangle of a symmetric matrix in CSC form:
//!
//! 1. **Symbolic**: one pass over the columns computes the elimination
//!    tree (parent of `i` = first column `j > i` whose factor column
//!    touches `i`) and the exact subdiagonal count of every column of L.
//! 2. **Numeric**: up-looking factorization. For each column `k`, the
//!    sparse triangular solve `y = L(0:k-1, 0:k-1) \ A(0:k-1, k)` yields
//!    row `k` of L; the reach of the right-hand side is discovered by
//!    climbing the elimination tree. `D(k,k)` falls out of the same sweep.
//!
//! The factor is emitted directly in the engine's column layout: the
//! diagonal slot of each column holds `D(j,j)`, subdiagonal entries follow
//! in ascending row order, and the first off-diagonal row index of each
//! column is its elimination-tree parent.
//!
//! # References
//!
//! - Davis, T.A. "Direct Methods for Sparse Linear Systems"
//!   SIAM, Philadelphia, 2006, Chapter 4: Cholesky factorization.
//!
//! - Davis, T.A. "Algorithm 849: A concise sparse Cholesky factorization
//!   package" ACM Trans. Math. Softw., Vol. 31, No. 4, 2005.

use crate::factor::LdlFactor;
use crate::sparse::SparseMatrix;
use std::fmt;

/// Errors from the initial factorization.
#[derive(Debug, Clone)]
pub enum FactorError {
    /// The input matrix is not square.
    NotSquare { nrow: usize, ncol: usize },
    /// The input has dimension zero.
    EmptyMatrix,
    /// An entry lies strictly below the diagonal (the factorization
    /// consumes the upper triangle only).
    NotUpperTriangular { row: usize, col: usize },
    /// A column has no diagonal entry.
    MissingDiagonal { col: usize },
    /// `D(col,col)` came out exactly zero; the matrix cannot be factored.
    ZeroPivot { col: usize },
}

impl fmt::Display for FactorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FactorError::NotSquare { nrow, ncol } => {
                write!(f, "matrix is not square: {} x {}", nrow, ncol)
            }
            FactorError::EmptyMatrix => write!(f, "matrix has dimension zero"),
            FactorError::NotUpperTriangular { row, col } => {
                write!(f, "entry ({}, {}) lies below the diagonal", row, col)
            }
            FactorError::MissingDiagonal { col } => {
                write!(f, "column {} has no diagonal entry", col)
            }
            FactorError::ZeroPivot { col } => {
                write!(f, "zero pivot at column {}", col)
            }
        }
    }
}

impl std::error::Error for FactorError {}

const NO_PARENT: usize = usize::MAX;

/// Compute the elimination tree and per-column subdiagonal counts of L
/// for the upper-triangular CSC matrix `a`.
///
/// Returns `(parent, sub_nnz)` where `parent[i] == usize::MAX` marks a
/// root and `sub_nnz[j]` is the number of strictly subdiagonal entries
/// column `j` of L will have.
pub fn etree(a: &SparseMatrix) -> Result<(Vec<usize>, Vec<usize>), FactorError> {
    let n = check_structure(a)?;
    let mut parent = vec![NO_PARENT; n];
    let mut sub_nnz = vec![0usize; n];
    let mut visited = vec![0usize; n];
    // stamp with j+1 so the zero-initialized state is "unvisited"
    for j in 0..n {
        let stamp = j + 1;
        visited[j] = stamp;
        let (start, end) = a.col_range(j);
        for p in start..end {
            let mut i = a.row_indices()[p];
            while visited[i] != stamp {
                if parent[i] == NO_PARENT {
                    parent[i] = j;
                }
                sub_nnz[i] += 1;
                visited[i] = stamp;
                i = parent[i];
            }
        }
    }
    Ok((parent, sub_nnz))
}

fn check_structure(a: &SparseMatrix) -> Result<usize, FactorError> {
    let n = a.nrow();
    if n != a.ncol() {
        return Err(FactorError::NotSquare {
            nrow: n,
            ncol: a.ncol(),
        });
    }
    if n == 0 {
        return Err(FactorError::EmptyMatrix);
    }
    for j in 0..n {
        let (start, end) = a.col_range(j);
        if start == end || a.row_indices()[end - 1] != j {
            // rows are sorted ascending, so a present diagonal is last
            if let Some(&i) = a.row_indices()[start..end].iter().find(|&&i| i > j) {
                return Err(FactorError::NotUpperTriangular { row: i, col: j });
            }
            return Err(FactorError::MissingDiagonal { col: j });
        }
    }
    Ok(n)
}

/// Factor the upper-triangular CSC matrix `a` into `L * D * L'`.
///
/// The returned factor is exact-fit: every column's capacity equals its
/// live entry count. A structurally zero `D(k,k)` aborts with
/// [`FactorError::ZeroPivot`]; no regularization is applied here (the
/// update engine's `dbound` clamp is a separate concern).
pub fn factorize(a: &SparseMatrix) -> Result<LdlFactor, FactorError> {
    let (parent, sub_nnz) = etree(a)?;
    let n = a.nrow();

    // column offsets: diagonal slot plus the subdiagonal entries
    let mut col_ptr = vec![0usize; n + 1];
    for j in 0..n {
        col_ptr[j + 1] = col_ptr[j] + 1 + sub_nnz[j];
    }
    let nnz_total = col_ptr[n];
    let mut row_idx = vec![0usize; nnz_total];
    let mut values = vec![0.0f64; nnz_total];
    let col_nnz: Vec<usize> = sub_nnz.iter().map(|&s| s + 1).collect();

    // prefill diagonal row indices
    for j in 0..n {
        row_idx[col_ptr[j]] = j;
    }

    // next free subdiagonal slot of each column
    let mut next_slot: Vec<usize> = (0..n).map(|j| col_ptr[j] + 1).collect();

    // workspaces for the sparse right-hand side of each row solve
    let mut y_val = vec![0.0f64; n];
    let mut y_seen = vec![false; n];
    let mut reach = vec![0usize; n];
    let mut chain = vec![0usize; n];

    let a_rows = a.row_indices();
    let a_vals = a.values();

    // first pivot
    {
        let (start, end) = a.col_range(0);
        debug_assert_eq!(end - start, 1);
        values[col_ptr[0]] = a_vals[start];
        if values[col_ptr[0]] == 0.0 {
            return Err(FactorError::ZeroPivot { col: 0 });
        }
    }

    for k in 1..n {
        // scatter A(0:k, k): off-diagonal entries seed the solve,
        // the diagonal entry seeds D(k,k)
        let mut nreach = 0usize;
        let (start, end) = a.col_range(k);
        for p in start..end {
            let i = a_rows[p];
            if i == k {
                values[col_ptr[k]] = a_vals[p];
                continue;
            }
            y_val[i] = a_vals[p];
            if y_seen[i] {
                continue;
            }
            // climb the elimination tree to collect the reach of this entry
            y_seen[i] = true;
            chain[0] = i;
            let mut len = 1usize;
            let mut up = parent[i];
            while up != NO_PARENT && up < k && !y_seen[up] {
                y_seen[up] = true;
                chain[len] = up;
                len += 1;
                up = parent[up];
            }
            // deepest ancestors first
            while len > 0 {
                len -= 1;
                reach[nreach] = chain[len];
                nreach += 1;
            }
        }

        // eliminate along the reach, newest ancestors last
        for r in (0..nreach).rev() {
            let c = reach[r];
            let yc = y_val[c];
            let head = col_ptr[c];
            let tail = next_slot[c];
            for p in head + 1..tail {
                y_val[row_idx[p]] -= values[p] * yc;
            }
            let l_kc = yc / values[head];
            values[tail] = l_kc;
            row_idx[tail] = k;
            next_slot[c] = tail + 1;
            values[col_ptr[k]] -= yc * l_kc;
            y_val[c] = 0.0;
            y_seen[c] = false;
        }

        if values[col_ptr[k]] == 0.0 {
            return Err(FactorError::ZeroPivot { col: k });
        }
    }

    debug_assert!((0..n).all(|j| next_slot[j] == col_ptr[j] + col_nnz[j]));

    Ok(LdlFactor {
        n,
        col_ptr,
        col_nnz,
        row_idx,
        values,
    })
}

/// Solve `L * D * L' * x = b` in place.
pub fn solve_in_place(l: &LdlFactor, x: &mut [f64]) {
    let n = l.n();
    assert_eq!(x.len(), n, "right-hand side length mismatch");
    let col_ptr = l.col_ptr();
    let col_nnz = l.col_nnz();
    let rows = l.row_indices();
    let vals = l.values();

    // forward: (L + I) y = b
    for j in 0..n {
        let xj = x[j];
        let head = col_ptr[j];
        for p in head + 1..head + col_nnz[j] {
            x[rows[p]] -= vals[p] * xj;
        }
    }
    // diagonal: D z = y
    for j in 0..n {
        x[j] /= vals[col_ptr[j]];
    }
    // backward: (L + I)' x = z
    for j in (0..n).rev() {
        let head = col_ptr[j];
        let mut s = 0.0;
        for p in head + 1..head + col_nnz[j] {
            s += vals[p] * x[rows[p]];
        }
        x[j] -= s;
    }
}
