//! chol-core: sparse LDL' factorization update/downdate engine.
//!
//! Pure Rust implementation of multiple-rank modification of a sparse
//! LDL' factorization. Given the factor of a symmetric positive-definite
//! matrix A and a sparse n-by-r matrix C, the engine rewrites the factor
//! in place to represent
//!
//! ```text
//! A + C*C'            (update)
//! A - C*C'            (downdate)
//! A + C*C' - D*D'     (combined, one sweep)
//! ```
//!
//! at a cost proportional to the part of the factor that actually
//! changes, rather than the cost of factorizing from scratch.
//!
//! # Algorithm
//!
//! 1. **Symbolic**: each update column touches one path in the
//!    elimination tree; the r paths are partitioned into disjoint
//!    subpaths sharing workspace columns ([`path`]).
//! 2. **Numeric**: each subpath is swept by a kernel specialized for the
//!    (workspace width, rank) pair, applying the Davis–Hager method C1
//!    recurrence at every diagonal and fusing adjacent columns with
//!    matching patterns into dual or quad mini-supernode steps
//!    ([`updown`]).
//!
//! An initial factorization and triangular solver are included ([`ldl`])
//! so the engine is usable stand-alone.
//!
//! # Usage
//!
//! ```ignore
//! use chol_core::{ldl, SparseMatrix, UpdownEngine};
//!
//! let a = SparseMatrix::from_triplets(n, n, &upper_triangle)?;
//! let mut factor = ldl::factorize(&a)?;
//!
//! let c = SparseMatrix::from_triplets(n, 2, &update_cols)?;
//! let mut engine = UpdownEngine::new(n);
//! engine.update(&c, &mut factor)?;        // factor now holds A + C*C'
//! engine.downdate(&c, &mut factor)?;      // ... and back to A
//! ```
//!
//! # References
//!
//! - Davis, T.A., Hager, W.W. "Modifying a sparse Cholesky factorization"
//!   SIAM J. Matrix Anal. Appl., Vol. 20, No. 3, pp. 606-627, 1999.
//!
//! - Davis, T.A., Hager, W.W. "Multiple-rank modifications of a sparse
//!   Cholesky factorization" SIAM J. Matrix Anal. Appl., Vol. 22, No. 4,
//!   pp. 997-1013, 2001.

pub mod factor;
mod kernel;
pub mod ldl;
pub mod path;
pub mod sparse;
pub mod updown;

pub use factor::LdlFactor;
pub use path::{PathPlan, PathRec};
pub use sparse::SparseMatrix;
pub use updown::{RowMask, UpdownEngine, UpdownError, UpdownOptions, UpdownStats};
