//! Tests for the initial LDL' factorization and solver.

use approx::assert_abs_diff_eq;
use chol_core::{ldl, LdlFactor, SparseMatrix};

fn tridiagonal_upper(n: usize, d: f64, e: f64) -> SparseMatrix {
    let mut t = Vec::new();
    for j in 0..n {
        if j > 0 {
            t.push((j - 1, j, e));
        }
        t.push((j, j, d));
    }
    SparseMatrix::from_triplets(n, n, &t).unwrap()
}

/// Dense column-major `L * D * L'` reconstruction of a factor.
fn ldl_product(l: &LdlFactor) -> Vec<f64> {
    let n = l.n();
    let mut ldense = vec![0.0f64; n * n];
    let mut d = vec![0.0f64; n];
    for j in 0..n {
        ldense[j + j * n] = 1.0;
        let head = l.col_ptr()[j];
        d[j] = l.values()[head];
        for p in head + 1..head + l.col_nnz()[j] {
            ldense[l.row_indices()[p] + j * n] = l.values()[p];
        }
    }
    let mut a = vec![0.0f64; n * n];
    for k in 0..n {
        for j in 0..n {
            let ljk = ldense[j + k * n];
            if ljk == 0.0 {
                continue;
            }
            for i in 0..n {
                a[i + j * n] += d[k] * ldense[i + k * n] * ljk;
            }
        }
    }
    a
}

fn dense_from_upper(a: &SparseMatrix) -> Vec<f64> {
    let n = a.nrow();
    let mut out = vec![0.0f64; n * n];
    for j in 0..n {
        let (start, end) = a.col_range(j);
        for p in start..end {
            let i = a.row_indices()[p];
            let v = a.values()[p];
            out[i + j * n] = v;
            out[j + i * n] = v;
        }
    }
    out
}

#[test]
fn test_factorize_reconstructs_tridiagonal() {
    let n = 8;
    let a = tridiagonal_upper(n, 4.0, -1.0);
    let l = ldl::factorize(&a).unwrap();
    let got = ldl_product(&l);
    let expect = dense_from_upper(&a);
    for (g, e) in got.iter().zip(&expect) {
        assert_abs_diff_eq!(*g, *e, epsilon = 1e-13);
    }
}

#[test]
fn test_factorize_reconstructs_arrow() {
    // arrow matrix: dense last row/column, diagonal otherwise
    let n = 6;
    let mut t = Vec::new();
    for j in 0..n - 1 {
        t.push((j, j, 5.0));
        t.push((j, n - 1, 1.0));
    }
    t.push((n - 1, n - 1, 10.0));
    let a = SparseMatrix::from_triplets(n, n, &t).unwrap();

    let l = ldl::factorize(&a).unwrap();
    // every leading column's only subdiagonal entry is row n-1
    for j in 0..n - 1 {
        assert_eq!(l.col_nnz()[j], 2);
        assert_eq!(l.parent(j), Some(n - 1));
    }
    let got = ldl_product(&l);
    let expect = dense_from_upper(&a);
    for (g, e) in got.iter().zip(&expect) {
        assert_abs_diff_eq!(*g, *e, epsilon = 1e-13);
    }
}

#[test]
fn test_factorize_known_2x2() {
    let a = SparseMatrix::from_triplets(2, 2, &[(0, 0, 4.0), (0, 1, 2.0), (1, 1, 5.0)]).unwrap();
    let l = ldl::factorize(&a).unwrap();
    // L(1,0) = 2/4, D = [4, 5 - 4*(1/2)^2]
    assert_abs_diff_eq!(l.diag(0), 4.0, epsilon = 1e-15);
    assert_abs_diff_eq!(l.diag(1), 4.0, epsilon = 1e-15);
    assert_abs_diff_eq!(l.values()[l.col_ptr()[0] + 1], 0.5, epsilon = 1e-15);
}

#[test]
fn test_solve_recovers_known_solution() {
    let n = 10;
    let a = tridiagonal_upper(n, 4.0, -1.0);
    let l = ldl::factorize(&a).unwrap();

    // b = A * x for x = [1, 2, ..., n]
    let x_true: Vec<f64> = (1..=n).map(|v| v as f64).collect();
    let dense = dense_from_upper(&a);
    let mut b = vec![0.0f64; n];
    for j in 0..n {
        for i in 0..n {
            b[i] += dense[i + j * n] * x_true[j];
        }
    }

    ldl::solve_in_place(&l, &mut b);
    for (got, want) in b.iter().zip(&x_true) {
        assert_abs_diff_eq!(*got, *want, epsilon = 1e-11);
    }
}

#[test]
fn test_zero_pivot_detected() {
    // second pivot becomes exactly zero: [[1, 1], [1, 1]]
    let a = SparseMatrix::from_triplets(2, 2, &[(0, 0, 1.0), (0, 1, 1.0), (1, 1, 1.0)]).unwrap();
    match ldl::factorize(&a) {
        Err(ldl::FactorError::ZeroPivot { col: 1 }) => {}
        other => panic!("expected ZeroPivot, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn test_indefinite_factors_with_negative_pivot() {
    // LDL' handles indefinite diagonals as long as no pivot hits zero
    let a = SparseMatrix::from_triplets(2, 2, &[(0, 0, 1.0), (0, 1, 2.0), (1, 1, 1.0)]).unwrap();
    let l = ldl::factorize(&a).unwrap();
    assert!(l.diag(1) < 0.0);
}

#[test]
fn test_etree_arrow_is_a_star() {
    let n = 5;
    let mut t = Vec::new();
    for j in 0..n - 1 {
        t.push((j, j, 2.0));
        t.push((j, n - 1, 1.0));
    }
    t.push((n - 1, n - 1, 8.0));
    let a = SparseMatrix::from_triplets(n, n, &t).unwrap();
    let (parent, sub_nnz) = ldl::etree(&a).unwrap();
    for j in 0..n - 1 {
        assert_eq!(parent[j], n - 1);
        assert_eq!(sub_nnz[j], 1);
    }
    assert_eq!(parent[n - 1], usize::MAX);
    assert_eq!(sub_nnz[n - 1], 0);
}
