//! Multiple-rank update/downdate of a sparse LDL' factorization.
//!
//! Given the factor of a symmetric positive-definite matrix and a sparse
//! n-by-r update matrix C, the engine rewrites the factor in place so that
//! it represents `A + C*C'` (update), `A - C*C'` (downdate), or
//! `A + C*C' - D*D'` (combined), without refactorizing. The sparsity
//! pattern of the factor is never changed; the engine requires that the
//! pattern of the perturbation is already subsumed by the factor's
//! pattern — arranging that is the caller's (symbolic) problem.
//!
//! A pass handles up to eight update columns at a time; wider inputs are
//! processed in blocks of eight. Each pass builds a [`PathPlan`],
//! scatters the update columns into a dense row-major workspace, and
//! sweeps the plan's subpaths with the kernel specialized for (workspace
//! width, path rank). The workspace is owned by the engine, reused
//! across calls, and kept all-zero between calls by the kernels'
//! self-cleaning sweep.
//!
//! Numerical trouble (a pivot driven non-positive or non-finite) never
//! aborts a sweep: the engine finishes rewriting the factor, counts the
//! event, and reports it through the return value so the caller can
//! decide whether the factor is still usable.

use crate::factor::LdlFactor;
use crate::kernel::{sweep_dispatch, sweep_dispatch_pair, SweepCounters};
use crate::path::PathPlan;
use crate::sparse::SparseMatrix;
use std::fmt;
use std::ops::Range;

/// Widest update processed in a single pass.
pub const MAX_RANK: usize = 8;

/// Error types for update/downdate operations.
#[derive(Debug, Clone)]
pub enum UpdownError {
    /// The update matrix row count does not match the factor dimension.
    DimensionMismatch { expected: usize, got: usize },
    /// An update column has no entries.
    EmptyColumn { col: usize },
    /// The combined variant requires C and D to share one sparsity pattern.
    PatternMismatch,
    /// The mask length does not match the factor dimension.
    MaskLengthMismatch { expected: usize, got: usize },
    /// At least one diagonal entry was driven non-positive (or
    /// non-finite). The factor has still been fully rewritten.
    NotPositiveDefinite { events: u64 },
}

impl fmt::Display for UpdownError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpdownError::DimensionMismatch { expected, got } => {
                write!(f, "dimension mismatch: expected {}, got {}", expected, got)
            }
            UpdownError::EmptyColumn { col } => {
                write!(f, "update column {} is empty", col)
            }
            UpdownError::PatternMismatch => {
                write!(f, "combined update requires C and D with identical patterns")
            }
            UpdownError::MaskLengthMismatch { expected, got } => {
                write!(f, "mask length mismatch: expected {}, got {}", expected, got)
            }
            UpdownError::NotPositiveDefinite { events } => {
                write!(
                    f,
                    "{} diagonal entr{} driven non-positive during the sweep",
                    events,
                    if *events == 1 { "y was" } else { "ies were" }
                )
            }
        }
    }
}

impl std::error::Error for UpdownError {}

/// Configuration for the update engine.
#[derive(Debug, Clone)]
pub struct UpdownOptions {
    /// Positive floor clamped onto every rewritten diagonal entry.
    /// Zero (the default) disables the clamp.
    pub dbound: f64,
    /// Fuse adjacent path columns with matching patterns into dual/quad
    /// sweeps. Disable to force the single-column codepath (the results
    /// agree to rounding; the fused sweeps are faster).
    pub fuse_columns: bool,
}

impl Default for UpdownOptions {
    fn default() -> Self {
        Self {
            dbound: 0.0,
            fuse_columns: true,
        }
    }
}

/// Statistics accumulated across engine calls.
#[derive(Debug, Clone, Default)]
pub struct UpdownStats {
    /// Completed update calls.
    pub update_count: usize,
    /// Completed downdate calls.
    pub downdate_count: usize,
    /// Completed combined update+downdate calls.
    pub combined_count: usize,
    /// Passes (blocks of at most eight columns) executed.
    pub passes: usize,
    /// Subpaths handed to a kernel.
    pub paths_swept: usize,
    /// Diagonal entries driven non-positive or non-finite.
    pub npd_events: u64,
    /// Diagonal entries raised to the dbound floor.
    pub clamped_pivots: u64,
}

/// Row filter for partial application of an update.
///
/// A row `i` of the update matrix is scattered only when
/// `mask[i] < maskmark`; all other rows are suppressed, as if those
/// entries of C were zero.
#[derive(Debug, Clone, Copy)]
pub struct RowMask<'a> {
    pub mask: &'a [i64],
    pub maskmark: i64,
}

/// Update/downdate engine: owns the dense workspaces and applies
/// low-rank perturbations to an [`LdlFactor`] in place.
pub struct UpdownEngine {
    n: usize,
    options: UpdownOptions,
    /// Row-major n-by-wdim workspace for C; all zero between calls.
    w: Vec<f64>,
    /// Second workspace for the combined variant's D term.
    wd: Vec<f64>,
    alpha: [f64; MAX_RANK],
    alpha_d: [f64; MAX_RANK],
    stats: UpdownStats,
}

impl UpdownEngine {
    /// Create an engine for factors of dimension `n`.
    pub fn new(n: usize) -> Self {
        Self::with_options(n, UpdownOptions::default())
    }

    /// Create an engine with explicit options.
    pub fn with_options(n: usize, options: UpdownOptions) -> Self {
        Self {
            n,
            options,
            w: Vec::new(),
            wd: Vec::new(),
            alpha: [0.0; MAX_RANK],
            alpha_d: [0.0; MAX_RANK],
            stats: UpdownStats::default(),
        }
    }

    /// Prepare the engine for factors of a different dimension.
    pub fn prepare(&mut self, n: usize) {
        if n != self.n {
            self.n = n;
            self.w.clear();
            self.wd.clear();
        }
    }

    /// Set the diagonal floor (0 disables).
    pub fn set_dbound(&mut self, dbound: f64) {
        self.options.dbound = dbound;
    }

    pub fn options(&self) -> &UpdownOptions {
        &self.options
    }

    pub fn stats(&self) -> &UpdownStats {
        &self.stats
    }

    /// Rewrite `l` to the factor of `A + C*C'`.
    pub fn update(&mut self, c: &SparseMatrix, l: &mut LdlFactor) -> Result<(), UpdownError> {
        self.update_masked(c, l, None)
    }

    /// Rewrite `l` to the factor of `A - C*C'`.
    pub fn downdate(&mut self, c: &SparseMatrix, l: &mut LdlFactor) -> Result<(), UpdownError> {
        self.downdate_masked(c, l, None)
    }

    /// `A + C*C'` with an optional row filter applied at scatter time.
    pub fn update_masked(
        &mut self,
        c: &SparseMatrix,
        l: &mut LdlFactor,
        mask: Option<RowMask<'_>>,
    ) -> Result<(), UpdownError> {
        let events = self.run_single::<true>(c, l, mask)?;
        self.stats.update_count += 1;
        finish(events)
    }

    /// `A - C*C'` with an optional row filter applied at scatter time.
    pub fn downdate_masked(
        &mut self,
        c: &SparseMatrix,
        l: &mut LdlFactor,
        mask: Option<RowMask<'_>>,
    ) -> Result<(), UpdownError> {
        let events = self.run_single::<false>(c, l, mask)?;
        self.stats.downdate_count += 1;
        finish(events)
    }

    /// Rewrite `l` to the factor of `A + C*C' - D*D'` in one sweep.
    ///
    /// C and D must share a sparsity pattern; the perturbations are woven
    /// together column by column, which is cheaper and numerically
    /// different (to rounding) from an update followed by a downdate.
    pub fn update_downdate(
        &mut self,
        c: &SparseMatrix,
        d: &SparseMatrix,
        l: &mut LdlFactor,
    ) -> Result<(), UpdownError> {
        self.check_dims(c, l)?;
        self.check_columns(c)?;
        if !c.pattern_eq(d) {
            return Err(UpdownError::PatternMismatch);
        }
        let mut events = 0u64;
        let ncol = c.ncol();
        let mut first = 0usize;
        while first < ncol {
            let last = (first + MAX_RANK).min(ncol);
            events += self.pass_pair(c, d, first..last, l)?;
            first = last;
        }
        self.stats.combined_count += 1;
        finish(events)
    }

    fn check_dims(&self, c: &SparseMatrix, l: &LdlFactor) -> Result<(), UpdownError> {
        if l.n() != self.n {
            return Err(UpdownError::DimensionMismatch {
                expected: self.n,
                got: l.n(),
            });
        }
        if c.nrow() != self.n {
            return Err(UpdownError::DimensionMismatch {
                expected: self.n,
                got: c.nrow(),
            });
        }
        Ok(())
    }

    /// Reject empty update columns before any pass runs, so a malformed
    /// trailing chunk cannot leave the factor partially rewritten.
    fn check_columns(&self, c: &SparseMatrix) -> Result<(), UpdownError> {
        for col in 0..c.ncol() {
            if c.first_row(col).is_none() {
                return Err(UpdownError::EmptyColumn { col });
            }
        }
        Ok(())
    }

    fn check_mask(&self, mask: Option<RowMask<'_>>) -> Result<(), UpdownError> {
        if let Some(m) = mask {
            if m.mask.len() != self.n {
                return Err(UpdownError::MaskLengthMismatch {
                    expected: self.n,
                    got: m.mask.len(),
                });
            }
        }
        Ok(())
    }

    fn run_single<const UPDATE: bool>(
        &mut self,
        c: &SparseMatrix,
        l: &mut LdlFactor,
        mask: Option<RowMask<'_>>,
    ) -> Result<u64, UpdownError> {
        self.check_dims(c, l)?;
        self.check_columns(c)?;
        self.check_mask(mask)?;
        let mut events = 0u64;
        let ncol = c.ncol();
        let mut first = 0usize;
        while first < ncol {
            let last = (first + MAX_RANK).min(ncol);
            events += self.pass_single::<UPDATE>(c, first..last, l, mask)?;
            first = last;
        }
        Ok(events)
    }

    /// One pass: at most eight columns of C, one path plan, one sweep.
    fn pass_single<const UPDATE: bool>(
        &mut self,
        c: &SparseMatrix,
        cols: Range<usize>,
        l: &mut LdlFactor,
        mask: Option<RowMask<'_>>,
    ) -> Result<u64, UpdownError> {
        let plan = PathPlan::build(c, cols, l)?;
        let wdim = plan.wdim();
        grow_workspace(&mut self.w, wdim * self.n);

        scatter(&plan, c, mask, wdim, &mut self.w, &mut self.alpha);

        let mut counters = SweepCounters::default();
        for seg in plan.segments() {
            sweep_dispatch::<UPDATE>(
                wdim,
                seg.rank,
                seg.start,
                seg.end,
                &mut self.alpha[seg.wfirst..],
                &mut self.w[seg.wfirst..],
                l,
                self.options.dbound,
                self.options.fuse_columns,
                &mut counters,
            );
            self.stats.paths_swept += 1;
        }
        self.stats.passes += 1;
        self.stats.npd_events += counters.npd;
        self.stats.clamped_pivots += counters.clamped;
        Ok(counters.npd)
    }

    fn pass_pair(
        &mut self,
        c: &SparseMatrix,
        d: &SparseMatrix,
        cols: Range<usize>,
        l: &mut LdlFactor,
    ) -> Result<u64, UpdownError> {
        let plan = PathPlan::build(c, cols, l)?;
        let wdim = plan.wdim();
        grow_workspace(&mut self.w, wdim * self.n);
        grow_workspace(&mut self.wd, wdim * self.n);

        scatter(&plan, c, None, wdim, &mut self.w, &mut self.alpha);
        scatter(&plan, d, None, wdim, &mut self.wd, &mut self.alpha_d);

        let mut counters = SweepCounters::default();
        for seg in plan.segments() {
            sweep_dispatch_pair(
                wdim,
                seg.rank,
                seg.start,
                seg.end,
                &mut self.alpha[seg.wfirst..],
                &mut self.alpha_d[seg.wfirst..],
                &mut self.w[seg.wfirst..],
                &mut self.wd[seg.wfirst..],
                l,
                self.options.dbound,
                self.options.fuse_columns,
                &mut counters,
            );
            self.stats.paths_swept += 1;
        }
        self.stats.passes += 1;
        self.stats.npd_events += counters.npd;
        self.stats.clamped_pivots += counters.clamped;
        Ok(counters.npd)
    }
}

fn finish(events: u64) -> Result<(), UpdownError> {
    if events == 0 {
        Ok(())
    } else {
        Err(UpdownError::NotPositiveDefinite { events })
    }
}

/// Grow a workspace to `len` slots. New slots are zero, and existing
/// slots are already zero by the self-cleaning contract, so the whole
/// buffer is clean regardless of the previous width.
fn grow_workspace(w: &mut Vec<f64>, len: usize) {
    if w.len() < len {
        w.resize(len, 0.0);
    }
}

/// Scatter stage: load each plan leaf's source column of `c` into its
/// workspace column and reset the running alpha scalars.
fn scatter(
    plan: &PathPlan,
    c: &SparseMatrix,
    mask: Option<RowMask<'_>>,
    wdim: usize,
    w: &mut [f64],
    alpha: &mut [f64; MAX_RANK],
) {
    let rows = c.row_indices();
    let vals = c.values();
    for (wcol, ccol) in plan.scatter_columns() {
        let (start, end) = c.col_range(ccol);
        for p in start..end {
            let i = rows[p];
            debug_assert!(
                plan.covers(i),
                "update row {} is outside the factor pattern of its path",
                i
            );
            let keep = match mask {
                Some(m) => m.mask[i] < m.maskmark,
                None => true,
            };
            if keep {
                w[wdim * i + wcol] = vals[p];
            }
        }
        alpha[wcol] = 1.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ldl;

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

    #[test]
    fn test_workspace_clean_after_update() {
        let n = 7;
        let a = tridiagonal_upper(n, 4.0, -1.0);
        let mut l = ldl::factorize(&a).unwrap();
        let c = SparseMatrix::from_triplets(n, 2, &[(1, 0, 0.7), (2, 0, 0.3), (3, 1, 0.5)]).unwrap();

        let mut engine = UpdownEngine::new(n);
        engine.update(&c, &mut l).unwrap();

        assert!(
            engine.w.iter().all(|&x| x == 0.0),
            "workspace left dirty: {:?}",
            engine.w
        );
    }

    #[test]
    fn test_workspace_clean_after_combined() {
        let n = 5;
        let a = tridiagonal_upper(n, 4.0, -1.0);
        let mut l = ldl::factorize(&a).unwrap();
        let c = SparseMatrix::from_triplets(n, 1, &[(0, 0, 0.5), (1, 0, 0.25)]).unwrap();
        let d = SparseMatrix::from_triplets(n, 1, &[(0, 0, 0.3), (1, 0, 0.1)]).unwrap();

        let mut engine = UpdownEngine::new(n);
        engine.update_downdate(&c, &d, &mut l).unwrap();

        assert!(engine.w.iter().all(|&x| x == 0.0));
        assert!(engine.wd.iter().all(|&x| x == 0.0));
    }

    #[test]
    fn test_workspace_width_growth() {
        let n = 6;
        let a = tridiagonal_upper(n, 4.0, -1.0);
        let mut l = ldl::factorize(&a).unwrap();
        let mut engine = UpdownEngine::new(n);

        // rank 1 -> width 1
        let c1 = SparseMatrix::from_triplets(n, 1, &[(0, 0, 0.5)]).unwrap();
        engine.update(&c1, &mut l).unwrap();
        assert_eq!(engine.w.len(), n);

        // rank 3 -> width 4
        let c3 = SparseMatrix::from_triplets(
            n,
            3,
            &[(0, 0, 0.2), (1, 1, 0.2), (2, 2, 0.2)],
        )
        .unwrap();
        engine.update(&c3, &mut l).unwrap();
        assert_eq!(engine.w.len(), 4 * n);
    }

    #[test]
    fn test_dimension_mismatch_rejected() {
        let a = tridiagonal_upper(4, 4.0, -1.0);
        let mut l = ldl::factorize(&a).unwrap();
        let c = SparseMatrix::from_triplets(3, 1, &[(0, 0, 1.0)]).unwrap();
        let mut engine = UpdownEngine::new(4);
        match engine.update(&c, &mut l) {
            Err(UpdownError::DimensionMismatch { expected: 4, got: 3 }) => {}
            other => panic!("expected DimensionMismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_stats_accumulate() {
        let n = 5;
        let a = tridiagonal_upper(n, 4.0, -1.0);
        let mut l = ldl::factorize(&a).unwrap();
        let c = SparseMatrix::from_triplets(n, 1, &[(0, 0, 0.5)]).unwrap();

        let mut engine = UpdownEngine::new(n);
        engine.update(&c, &mut l).unwrap();
        engine.downdate(&c, &mut l).unwrap();

        assert_eq!(engine.stats().update_count, 1);
        assert_eq!(engine.stats().downdate_count, 1);
        assert_eq!(engine.stats().passes, 2);
        assert!(engine.stats().paths_swept >= 2);
        assert_eq!(engine.stats().npd_events, 0);
    }
}
