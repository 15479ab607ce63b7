//! Numeric update/downdate kernels: one elimination-tree path at a time.
//!
//! # Overview
//!
//! A kernel call walks a single path of columns `start ..= end` (linked by
//! first off-diagonal row indices) and rewrites, in place, the diagonal
//! entries of D and the subdiagonal entries of L touched by a rank-k
//! perturbation held in the dense workspace W. Kernels are monomorphized
//! over `(WDIM, RANK)` — the workspace row stride and the live rank — so
//! the per-rank inner loops unroll completely, and over the sign of the
//! perturbation, so no flag is tested anywhere in a loop.
//!
//! # Algorithm
//!
//! At each column `j`, the Davis–Hager method C1 recurrence folds row `j`
//! of W into `D(j,j)`, producing per-rank coefficients gamma and updating
//! the running alpha scalars. The off-diagonal sweep then rewrites each
//! `L(i,j)` while pushing the perturbation down into row `i` of W:
//!
//! ```text
//! W(i,k) -= z[k] * L(i,j)
//! L(i,j) -= gamma[k] * W(i,k)
//! ```
//!
//! The two reads of `L(i,j)` around the W write are serially dependent;
//! that ordering is the recurrence and must not be reassociated.
//!
//! Adjacent path columns whose subdiagonal patterns coincide (shifted by
//! one) are fused dynamically: two columns when `j`'s parent matches,
//! four when the next three all match. Fused columns share every W row
//! load across the column sweep. A single call may interleave single,
//! dual and quad steps along one path.
//!
//! The combined kernel applies `+C*C'` and `-D*D'` in one sweep, holding
//! both polarities' workspaces; within each rank index the update half
//! precedes the downdate half, both in the recurrence and in the sweep.
//! The quad inner loop processes one row across all four columns per
//! iteration.
//!
//! # References
//!
//! - Davis, T.A., Hager, W.W. "Modifying a sparse Cholesky factorization"
//!   SIAM J. Matrix Anal. Appl., Vol. 20, No. 3, pp. 606-627, 1999.
//!
//! - Davis, T.A., Hager, W.W. "Multiple-rank modifications of a sparse
//!   Cholesky factorization" SIAM J. Matrix Anal. Appl., Vol. 22, No. 4,
//!   pp. 997-1013, 2001.

use crate::factor::LdlFactor;

/// Sentinel for "no next column on the path".
const PATH_END: usize = usize::MAX;

/// Per-sweep event counters, accumulated into the engine statistics.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct SweepCounters {
    /// Columns whose recurrence produced a non-positive or non-finite
    /// pivot (the sweep still completes).
    pub npd: u64,
    /// Pivots raised to the dbound floor.
    pub clamped: u64,
}

/// Method C1 recurrence at one diagonal, single polarity.
///
/// Consumes the captured W row `z`, updates the running `alpha` scalars
/// in place and fills `gamma` for the off-diagonal sweep. The new
/// `D(j,j)` is written back through `d_slot` after the optional dbound
/// clamp.
#[inline(always)]
fn alpha_gamma<const RANK: usize, const UPDATE: bool>(
    d_slot: &mut f64,
    alpha: &mut [f64],
    gamma: &mut [f64; RANK],
    z: &[f64; RANK],
    dbound: f64,
    counters: &mut SweepCounters,
) {
    let mut dj = *d_slot;
    let mut bad = false;
    for k in 0..RANK {
        let zk = z[k];
        let prev = alpha[k];
        let a = if UPDATE {
            prev + (zk * zk) / dj
        } else {
            prev - (zk * zk) / dj
        };
        dj *= a;
        alpha[k] = a;
        gamma[k] = if UPDATE { -zk / dj } else { zk / dj };
        dj /= prev;
        bad |= a <= 0.0;
    }
    if bad || !(dj > 0.0) || !dj.is_finite() {
        counters.npd += 1;
    }
    if dbound > 0.0 && !(dj >= dbound) {
        dj = dbound;
        counters.clamped += 1;
    }
    *d_slot = dj;
}

/// Method C1 recurrence at one diagonal, combined `+C*C' - D*D'`.
/// The update half precedes the downdate half within each rank index.
#[inline(always)]
#[allow(clippy::too_many_arguments)]
fn alpha_gamma_pair<const RANK: usize>(
    d_slot: &mut f64,
    alpha_c: &mut [f64],
    alpha_d: &mut [f64],
    gc: &mut [f64; RANK],
    gd: &mut [f64; RANK],
    zc: &[f64; RANK],
    zd: &[f64; RANK],
    dbound: f64,
    counters: &mut SweepCounters,
) {
    let mut dj = *d_slot;
    let mut bad = false;
    for k in 0..RANK {
        let c = zc[k];
        let prev_c = alpha_c[k];
        let ac = prev_c + (c * c) / dj;
        dj *= ac;
        alpha_c[k] = ac;
        gc[k] = -c / dj;
        dj /= prev_c;
        bad |= ac <= 0.0;

        let d = zd[k];
        let prev_d = alpha_d[k];
        let ad = prev_d - (d * d) / dj;
        dj *= ad;
        alpha_d[k] = ad;
        gd[k] = d / dj;
        dj /= prev_d;
        bad |= ad <= 0.0;
    }
    if bad || !(dj > 0.0) || !dj.is_finite() {
        counters.npd += 1;
    }
    if dbound > 0.0 && !(dj >= dbound) {
        dj = dbound;
        counters.clamped += 1;
    }
    *d_slot = dj;
}

/// Capture row offset `r` of W into a register block and zero it in W.
#[inline(always)]
fn take_row<const RANK: usize>(w: &mut [f64], r: usize) -> [f64; RANK] {
    let mut z = [0.0f64; RANK];
    for k in 0..RANK {
        z[k] = w[r + k];
        w[r + k] = 0.0;
    }
    z
}

/// Rank-k single-polarity sweep along one path.
///
/// `w` and `alpha` are the slices starting at the path's first workspace
/// column; `w` is row-major with stride `WDIM`. `end` is inclusive.
pub(crate) fn sweep_path<const WDIM: usize, const RANK: usize, const UPDATE: bool>(
    start: usize,
    end: usize,
    alpha: &mut [f64],
    w: &mut [f64],
    l: &mut LdlFactor,
    dbound: f64,
    fuse: bool,
    counters: &mut SweepCounters,
) {
    let col_ptr = &l.col_ptr;
    let col_nnz = &l.col_nnz;
    let rows = &l.row_idx;
    let lx = &mut l.values;

    let mut j = start;
    while j <= end {
        let head = col_ptr[j];
        let lnz = col_nnz[j];
        let pend = head + lnz;
        debug_assert!(rows[head] == j, "column {} lost its diagonal", j);

        let z0 = take_row::<RANK>(w, WDIM * j);
        let mut g0 = [0.0f64; RANK];
        alpha_gamma::<RANK, UPDATE>(&mut lx[head], alpha, &mut g0, &z0, dbound, counters);
        let mut p0 = head + 1;

        let next_j;
        let parent = if lnz > 1 { rows[p0] } else { PATH_END };

        if fuse && parent <= end && lnz == col_nnz[parent] + 1 {
            // column j and its parent share the pattern below the junction
            let j1 = parent;
            let j2 = if lnz > 2 { rows[p0 + 1] } else { PATH_END };
            let j3 = if lnz > 3 { rows[p0 + 2] } else { PATH_END };
            let mut p1 = col_ptr[j1];
            let mut z1 = take_row::<RANK>(w, WDIM * j1);

            // L(j1, j)
            {
                let mut v = lx[p0];
                for k in 0..RANK {
                    z1[k] -= z0[k] * v;
                    v -= g0[k] * z1[k];
                }
                lx[p0] = v;
                p0 += 1;
            }

            let mut g1 = [0.0f64; RANK];
            alpha_gamma::<RANK, UPDATE>(&mut lx[p1], alpha, &mut g1, &z1, dbound, counters);
            p1 += 1;

            if j2 <= end && j3 <= end && lnz == col_nnz[j2] + 2 && lnz == col_nnz[j3] + 3 {
                // quad: four columns advance in lockstep
                next_j = if lnz > 4 { rows[p0 + 2] } else { PATH_END };
                let mut p2 = col_ptr[j2];
                let mut p3 = col_ptr[j3];
                let mut z2 = take_row::<RANK>(w, WDIM * j2);
                let mut z3 = take_row::<RANK>(w, WDIM * j3);

                // L(j2, j) and L(j2, j1)
                {
                    let mut v0 = lx[p0];
                    let mut v1 = lx[p1];
                    for k in 0..RANK {
                        z2[k] -= z0[k] * v0;
                        v0 -= g0[k] * z2[k];
                        z2[k] -= z1[k] * v1;
                        v1 -= g1[k] * z2[k];
                    }
                    lx[p0] = v0;
                    lx[p1] = v1;
                    p0 += 1;
                    p1 += 1;
                }

                let mut g2 = [0.0f64; RANK];
                alpha_gamma::<RANK, UPDATE>(&mut lx[p2], alpha, &mut g2, &z2, dbound, counters);
                p2 += 1;

                // L(j3, j), L(j3, j1), L(j3, j2)
                {
                    let mut v0 = lx[p0];
                    let mut v1 = lx[p1];
                    let mut v2 = lx[p2];
                    for k in 0..RANK {
                        z3[k] -= z0[k] * v0;
                        v0 -= g0[k] * z3[k];
                        z3[k] -= z1[k] * v1;
                        v1 -= g1[k] * z3[k];
                        z3[k] -= z2[k] * v2;
                        v2 -= g2[k] * z3[k];
                    }
                    lx[p0] = v0;
                    lx[p1] = v1;
                    lx[p2] = v2;
                    p0 += 1;
                    p1 += 1;
                    p2 += 1;
                }

                let mut g3 = [0.0f64; RANK];
                alpha_gamma::<RANK, UPDATE>(&mut lx[p3], alpha, &mut g3, &z3, dbound, counters);
                p3 += 1;

                // one row across L(i, [j j1 j2 j3]) per iteration
                while p0 < pend {
                    let mut v0 = lx[p0];
                    let mut v1 = lx[p1];
                    let mut v2 = lx[p2];
                    let mut v3 = lx[p3];
                    let r = WDIM * rows[p0];
                    for k in 0..RANK {
                        w[r + k] -= z0[k] * v0;
                        v0 -= g0[k] * w[r + k];
                        w[r + k] -= z1[k] * v1;
                        v1 -= g1[k] * w[r + k];
                        w[r + k] -= z2[k] * v2;
                        v2 -= g2[k] * w[r + k];
                        w[r + k] -= z3[k] * v3;
                        v3 -= g3[k] * w[r + k];
                    }
                    lx[p0] = v0;
                    lx[p1] = v1;
                    lx[p2] = v2;
                    lx[p3] = v3;
                    p0 += 1;
                    p1 += 1;
                    p2 += 1;
                    p3 += 1;
                }
            } else {
                // dual: two columns, two rows per iteration
                next_j = j2;

                if (lnz - 2) % 2 == 1 {
                    // odd length: one cleanup row
                    let mut v0 = lx[p0];
                    let mut v1 = lx[p1];
                    let r = WDIM * rows[p0];
                    for k in 0..RANK {
                        w[r + k] -= z0[k] * v0;
                        v0 -= g0[k] * w[r + k];
                        w[r + k] -= z1[k] * v1;
                        v1 -= g1[k] * w[r + k];
                    }
                    lx[p0] = v0;
                    lx[p1] = v1;
                    p0 += 1;
                    p1 += 1;
                }

                while p0 < pend {
                    let mut v00 = lx[p0];
                    let mut v10 = lx[p0 + 1];
                    let mut v01 = lx[p1];
                    let mut v11 = lx[p1 + 1];
                    let ra = WDIM * rows[p0];
                    let rb = WDIM * rows[p0 + 1];
                    for k in 0..RANK {
                        let mut ta = w[ra + k] - z0[k] * v00;
                        let mut tb = w[rb + k] - z0[k] * v10;
                        v00 -= g0[k] * ta;
                        v10 -= g0[k] * tb;
                        ta -= z1[k] * v01;
                        w[ra + k] = ta;
                        tb -= z1[k] * v11;
                        w[rb + k] = tb;
                        v01 -= g1[k] * ta;
                        v11 -= g1[k] * tb;
                    }
                    lx[p0] = v00;
                    lx[p0 + 1] = v10;
                    lx[p1] = v01;
                    lx[p1 + 1] = v11;
                    p0 += 2;
                    p1 += 2;
                }
            }
        } else {
            // single column, four rows per iteration
            next_j = parent;

            match (lnz - 1) % 4 {
                1 => {
                    let mut v = lx[p0];
                    let r = WDIM * rows[p0];
                    for k in 0..RANK {
                        w[r + k] -= z0[k] * v;
                        v -= g0[k] * w[r + k];
                    }
                    lx[p0] = v;
                    p0 += 1;
                }
                2 => {
                    let mut v0 = lx[p0];
                    let mut v1 = lx[p0 + 1];
                    let r0 = WDIM * rows[p0];
                    let r1 = WDIM * rows[p0 + 1];
                    for k in 0..RANK {
                        w[r0 + k] -= z0[k] * v0;
                        w[r1 + k] -= z0[k] * v1;
                        v0 -= g0[k] * w[r0 + k];
                        v1 -= g0[k] * w[r1 + k];
                    }
                    lx[p0] = v0;
                    lx[p0 + 1] = v1;
                    p0 += 2;
                }
                3 => {
                    let mut v0 = lx[p0];
                    let mut v1 = lx[p0 + 1];
                    let mut v2 = lx[p0 + 2];
                    let r0 = WDIM * rows[p0];
                    let r1 = WDIM * rows[p0 + 1];
                    let r2 = WDIM * rows[p0 + 2];
                    for k in 0..RANK {
                        w[r0 + k] -= z0[k] * v0;
                        w[r1 + k] -= z0[k] * v1;
                        w[r2 + k] -= z0[k] * v2;
                        v0 -= g0[k] * w[r0 + k];
                        v1 -= g0[k] * w[r1 + k];
                        v2 -= g0[k] * w[r2 + k];
                    }
                    lx[p0] = v0;
                    lx[p0 + 1] = v1;
                    lx[p0 + 2] = v2;
                    p0 += 3;
                }
                _ => {}
            }

            while p0 < pend {
                let mut v0 = lx[p0];
                let mut v1 = lx[p0 + 1];
                let mut v2 = lx[p0 + 2];
                let mut v3 = lx[p0 + 3];
                let r0 = WDIM * rows[p0];
                let r1 = WDIM * rows[p0 + 1];
                let r2 = WDIM * rows[p0 + 2];
                let r3 = WDIM * rows[p0 + 3];
                for k in 0..RANK {
                    w[r0 + k] -= z0[k] * v0;
                    w[r1 + k] -= z0[k] * v1;
                    w[r2 + k] -= z0[k] * v2;
                    w[r3 + k] -= z0[k] * v3;
                    v0 -= g0[k] * w[r0 + k];
                    v1 -= g0[k] * w[r1 + k];
                    v2 -= g0[k] * w[r2 + k];
                    v3 -= g0[k] * w[r3 + k];
                }
                lx[p0] = v0;
                lx[p0 + 1] = v1;
                lx[p0 + 2] = v2;
                lx[p0 + 3] = v3;
                p0 += 4;
            }
        }

        j = next_j;
    }
}

/// Rank-k combined update+downdate sweep along one path: applies
/// `+C*C'` (workspace `wc`, scalars `alpha_c`) and `-D*D'` (workspace
/// `wd`, scalars `alpha_d`) in a single pass. Within each rank index the
/// update half runs first; the interleaving order is fixed.
#[allow(clippy::too_many_arguments)]
pub(crate) fn sweep_path_pair<const WDIM: usize, const RANK: usize>(
    start: usize,
    end: usize,
    alpha_c: &mut [f64],
    alpha_d: &mut [f64],
    wc: &mut [f64],
    wd: &mut [f64],
    l: &mut LdlFactor,
    dbound: f64,
    fuse: bool,
    counters: &mut SweepCounters,
) {
    let col_ptr = &l.col_ptr;
    let col_nnz = &l.col_nnz;
    let rows = &l.row_idx;
    let lx = &mut l.values;

    let mut j = start;
    while j <= end {
        let head = col_ptr[j];
        let lnz = col_nnz[j];
        let pend = head + lnz;
        debug_assert!(rows[head] == j, "column {} lost its diagonal", j);

        let zc0 = take_row::<RANK>(wc, WDIM * j);
        let zd0 = take_row::<RANK>(wd, WDIM * j);
        let mut gc0 = [0.0f64; RANK];
        let mut gd0 = [0.0f64; RANK];
        alpha_gamma_pair::<RANK>(
            &mut lx[head],
            alpha_c,
            alpha_d,
            &mut gc0,
            &mut gd0,
            &zc0,
            &zd0,
            dbound,
            counters,
        );
        let mut p0 = head + 1;

        let next_j;
        let parent = if lnz > 1 { rows[p0] } else { PATH_END };

        if fuse && parent <= end && lnz == col_nnz[parent] + 1 {
            let j1 = parent;
            let j2 = if lnz > 2 { rows[p0 + 1] } else { PATH_END };
            let j3 = if lnz > 3 { rows[p0 + 2] } else { PATH_END };
            let mut p1 = col_ptr[j1];
            let mut zc1 = take_row::<RANK>(wc, WDIM * j1);
            let mut zd1 = take_row::<RANK>(wd, WDIM * j1);

            // L(j1, j)
            {
                let mut v = lx[p0];
                for k in 0..RANK {
                    zc1[k] -= zc0[k] * v;
                    v -= gc0[k] * zc1[k];
                    zd1[k] -= zd0[k] * v;
                    v -= gd0[k] * zd1[k];
                }
                lx[p0] = v;
                p0 += 1;
            }

            let mut gc1 = [0.0f64; RANK];
            let mut gd1 = [0.0f64; RANK];
            alpha_gamma_pair::<RANK>(
                &mut lx[p1],
                alpha_c,
                alpha_d,
                &mut gc1,
                &mut gd1,
                &zc1,
                &zd1,
                dbound,
                counters,
            );
            p1 += 1;

            if j2 <= end && j3 <= end && lnz == col_nnz[j2] + 2 && lnz == col_nnz[j3] + 3 {
                // quad
                next_j = if lnz > 4 { rows[p0 + 2] } else { PATH_END };
                let mut p2 = col_ptr[j2];
                let mut p3 = col_ptr[j3];
                let mut zc2 = take_row::<RANK>(wc, WDIM * j2);
                let mut zd2 = take_row::<RANK>(wd, WDIM * j2);
                let mut zc3 = take_row::<RANK>(wc, WDIM * j3);
                let mut zd3 = take_row::<RANK>(wd, WDIM * j3);

                // L(j2, j) and L(j2, j1)
                {
                    let mut v0 = lx[p0];
                    let mut v1 = lx[p1];
                    for k in 0..RANK {
                        zc2[k] -= zc0[k] * v0;
                        v0 -= gc0[k] * zc2[k];
                        zc2[k] -= zc1[k] * v1;
                        v1 -= gc1[k] * zc2[k];
                        zd2[k] -= zd0[k] * v0;
                        v0 -= gd0[k] * zd2[k];
                        zd2[k] -= zd1[k] * v1;
                        v1 -= gd1[k] * zd2[k];
                    }
                    lx[p0] = v0;
                    lx[p1] = v1;
                    p0 += 1;
                    p1 += 1;
                }

                let mut gc2 = [0.0f64; RANK];
                let mut gd2 = [0.0f64; RANK];
                alpha_gamma_pair::<RANK>(
                    &mut lx[p2],
                    alpha_c,
                    alpha_d,
                    &mut gc2,
                    &mut gd2,
                    &zc2,
                    &zd2,
                    dbound,
                    counters,
                );
                p2 += 1;

                // L(j3, j), L(j3, j1), L(j3, j2)
                {
                    let mut v0 = lx[p0];
                    let mut v1 = lx[p1];
                    let mut v2 = lx[p2];
                    for k in 0..RANK {
                        zc3[k] -= zc0[k] * v0;
                        v0 -= gc0[k] * zc3[k];
                        zc3[k] -= zc1[k] * v1;
                        v1 -= gc1[k] * zc3[k];
                        zc3[k] -= zc2[k] * v2;
                        v2 -= gc2[k] * zc3[k];
                        zd3[k] -= zd0[k] * v0;
                        v0 -= gd0[k] * zd3[k];
                        zd3[k] -= zd1[k] * v1;
                        v1 -= gd1[k] * zd3[k];
                        zd3[k] -= zd2[k] * v2;
                        v2 -= gd2[k] * zd3[k];
                    }
                    lx[p0] = v0;
                    lx[p1] = v1;
                    lx[p2] = v2;
                    p0 += 1;
                    p1 += 1;
                    p2 += 1;
                }

                let mut gc3 = [0.0f64; RANK];
                let mut gd3 = [0.0f64; RANK];
                alpha_gamma_pair::<RANK>(
                    &mut lx[p3],
                    alpha_c,
                    alpha_d,
                    &mut gc3,
                    &mut gd3,
                    &zc3,
                    &zd3,
                    dbound,
                    counters,
                );
                p3 += 1;

                while p0 < pend {
                    let mut v0 = lx[p0];
                    let mut v1 = lx[p1];
                    let mut v2 = lx[p2];
                    let mut v3 = lx[p3];
                    let r = WDIM * rows[p0];
                    for k in 0..RANK {
                        wc[r + k] -= zc0[k] * v0;
                        v0 -= gc0[k] * wc[r + k];
                        wc[r + k] -= zc1[k] * v1;
                        v1 -= gc1[k] * wc[r + k];
                        wc[r + k] -= zc2[k] * v2;
                        v2 -= gc2[k] * wc[r + k];
                        wc[r + k] -= zc3[k] * v3;
                        v3 -= gc3[k] * wc[r + k];
                        wd[r + k] -= zd0[k] * v0;
                        v0 -= gd0[k] * wd[r + k];
                        wd[r + k] -= zd1[k] * v1;
                        v1 -= gd1[k] * wd[r + k];
                        wd[r + k] -= zd2[k] * v2;
                        v2 -= gd2[k] * wd[r + k];
                        wd[r + k] -= zd3[k] * v3;
                        v3 -= gd3[k] * wd[r + k];
                    }
                    lx[p0] = v0;
                    lx[p1] = v1;
                    lx[p2] = v2;
                    lx[p3] = v3;
                    p0 += 1;
                    p1 += 1;
                    p2 += 1;
                    p3 += 1;
                }
            } else {
                // dual
                next_j = j2;

                if (lnz - 2) % 2 == 1 {
                    let mut v0 = lx[p0];
                    let mut v1 = lx[p1];
                    let r = WDIM * rows[p0];
                    for k in 0..RANK {
                        wc[r + k] -= zc0[k] * v0;
                        v0 -= gc0[k] * wc[r + k];
                        wc[r + k] -= zc1[k] * v1;
                        v1 -= gc1[k] * wc[r + k];
                        wd[r + k] -= zd0[k] * v0;
                        v0 -= gd0[k] * wd[r + k];
                        wd[r + k] -= zd1[k] * v1;
                        v1 -= gd1[k] * wd[r + k];
                    }
                    lx[p0] = v0;
                    lx[p1] = v1;
                    p0 += 1;
                    p1 += 1;
                }

                while p0 < pend {
                    let mut v00 = lx[p0];
                    let mut v10 = lx[p0 + 1];
                    let mut v01 = lx[p1];
                    let mut v11 = lx[p1 + 1];
                    let ra = WDIM * rows[p0];
                    let rb = WDIM * rows[p0 + 1];
                    for k in 0..RANK {
                        let mut ca = wc[ra + k] - zc0[k] * v00;
                        let mut cb = wc[rb + k] - zc0[k] * v10;
                        v00 -= gc0[k] * ca;
                        v10 -= gc0[k] * cb;
                        ca -= zc1[k] * v01;
                        wc[ra + k] = ca;
                        cb -= zc1[k] * v11;
                        wc[rb + k] = cb;
                        v01 -= gc1[k] * ca;
                        v11 -= gc1[k] * cb;

                        let mut da = wd[ra + k] - zd0[k] * v00;
                        let mut db = wd[rb + k] - zd0[k] * v10;
                        v00 -= gd0[k] * da;
                        v10 -= gd0[k] * db;
                        da -= zd1[k] * v01;
                        wd[ra + k] = da;
                        db -= zd1[k] * v11;
                        wd[rb + k] = db;
                        v01 -= gd1[k] * da;
                        v11 -= gd1[k] * db;
                    }
                    lx[p0] = v00;
                    lx[p0 + 1] = v10;
                    lx[p1] = v01;
                    lx[p1 + 1] = v11;
                    p0 += 2;
                    p1 += 2;
                }
            }
        } else {
            // single column
            next_j = parent;

            match (lnz - 1) % 4 {
                1 => {
                    let mut v = lx[p0];
                    let r = WDIM * rows[p0];
                    for k in 0..RANK {
                        wc[r + k] -= zc0[k] * v;
                        v -= gc0[k] * wc[r + k];
                        wd[r + k] -= zd0[k] * v;
                        v -= gd0[k] * wd[r + k];
                    }
                    lx[p0] = v;
                    p0 += 1;
                }
                2 => {
                    let mut v0 = lx[p0];
                    let mut v1 = lx[p0 + 1];
                    let r0 = WDIM * rows[p0];
                    let r1 = WDIM * rows[p0 + 1];
                    for k in 0..RANK {
                        wc[r0 + k] -= zc0[k] * v0;
                        wc[r1 + k] -= zc0[k] * v1;
                        v0 -= gc0[k] * wc[r0 + k];
                        v1 -= gc0[k] * wc[r1 + k];
                        wd[r0 + k] -= zd0[k] * v0;
                        wd[r1 + k] -= zd0[k] * v1;
                        v0 -= gd0[k] * wd[r0 + k];
                        v1 -= gd0[k] * wd[r1 + k];
                    }
                    lx[p0] = v0;
                    lx[p0 + 1] = v1;
                    p0 += 2;
                }
                3 => {
                    let mut v0 = lx[p0];
                    let mut v1 = lx[p0 + 1];
                    let mut v2 = lx[p0 + 2];
                    let r0 = WDIM * rows[p0];
                    let r1 = WDIM * rows[p0 + 1];
                    let r2 = WDIM * rows[p0 + 2];
                    for k in 0..RANK {
                        wc[r0 + k] -= zc0[k] * v0;
                        wc[r1 + k] -= zc0[k] * v1;
                        wc[r2 + k] -= zc0[k] * v2;
                        v0 -= gc0[k] * wc[r0 + k];
                        v1 -= gc0[k] * wc[r1 + k];
                        v2 -= gc0[k] * wc[r2 + k];
                        wd[r0 + k] -= zd0[k] * v0;
                        wd[r1 + k] -= zd0[k] * v1;
                        wd[r2 + k] -= zd0[k] * v2;
                        v0 -= gd0[k] * wd[r0 + k];
                        v1 -= gd0[k] * wd[r1 + k];
                        v2 -= gd0[k] * wd[r2 + k];
                    }
                    lx[p0] = v0;
                    lx[p0 + 1] = v1;
                    lx[p0 + 2] = v2;
                    p0 += 3;
                }
                _ => {}
            }

            while p0 < pend {
                let mut v0 = lx[p0];
                let mut v1 = lx[p0 + 1];
                let mut v2 = lx[p0 + 2];
                let mut v3 = lx[p0 + 3];
                let r0 = WDIM * rows[p0];
                let r1 = WDIM * rows[p0 + 1];
                let r2 = WDIM * rows[p0 + 2];
                let r3 = WDIM * rows[p0 + 3];
                for k in 0..RANK {
                    wc[r0 + k] -= zc0[k] * v0;
                    wc[r1 + k] -= zc0[k] * v1;
                    wc[r2 + k] -= zc0[k] * v2;
                    wc[r3 + k] -= zc0[k] * v3;
                    v0 -= gc0[k] * wc[r0 + k];
                    v1 -= gc0[k] * wc[r1 + k];
                    v2 -= gc0[k] * wc[r2 + k];
                    v3 -= gc0[k] * wc[r3 + k];
                    wd[r0 + k] -= zd0[k] * v0;
                    wd[r1 + k] -= zd0[k] * v1;
                    wd[r2 + k] -= zd0[k] * v2;
                    wd[r3 + k] -= zd0[k] * v3;
                    v0 -= gd0[k] * wd[r0 + k];
                    v1 -= gd0[k] * wd[r1 + k];
                    v2 -= gd0[k] * wd[r2 + k];
                    v3 -= gd0[k] * wd[r3 + k];
                }
                lx[p0] = v0;
                lx[p0 + 1] = v1;
                lx[p0 + 2] = v2;
                lx[p0 + 3] = v3;
                p0 += 4;
            }
        }

        j = next_j;
    }
}

/// Dispatch table for the single-polarity family. `wdim` is the
/// workspace stride chosen for the whole call; `rank` is the live rank
/// of this path.
#[allow(clippy::too_many_arguments)]
pub(crate) fn sweep_dispatch<const UPDATE: bool>(
    wdim: usize,
    rank: usize,
    start: usize,
    end: usize,
    alpha: &mut [f64],
    w: &mut [f64],
    l: &mut LdlFactor,
    dbound: f64,
    fuse: bool,
    counters: &mut SweepCounters,
) {
    match (wdim, rank) {
        (1, 1) => sweep_path::<1, 1, UPDATE>(start, end, alpha, w, l, dbound, fuse, counters),
        (2, 1) => sweep_path::<2, 1, UPDATE>(start, end, alpha, w, l, dbound, fuse, counters),
        (2, 2) => sweep_path::<2, 2, UPDATE>(start, end, alpha, w, l, dbound, fuse, counters),
        (4, 1) => sweep_path::<4, 1, UPDATE>(start, end, alpha, w, l, dbound, fuse, counters),
        (4, 2) => sweep_path::<4, 2, UPDATE>(start, end, alpha, w, l, dbound, fuse, counters),
        (4, 3) => sweep_path::<4, 3, UPDATE>(start, end, alpha, w, l, dbound, fuse, counters),
        (4, 4) => sweep_path::<4, 4, UPDATE>(start, end, alpha, w, l, dbound, fuse, counters),
        (8, 1) => sweep_path::<8, 1, UPDATE>(start, end, alpha, w, l, dbound, fuse, counters),
        (8, 2) => sweep_path::<8, 2, UPDATE>(start, end, alpha, w, l, dbound, fuse, counters),
        (8, 3) => sweep_path::<8, 3, UPDATE>(start, end, alpha, w, l, dbound, fuse, counters),
        (8, 4) => sweep_path::<8, 4, UPDATE>(start, end, alpha, w, l, dbound, fuse, counters),
        (8, 5) => sweep_path::<8, 5, UPDATE>(start, end, alpha, w, l, dbound, fuse, counters),
        (8, 6) => sweep_path::<8, 6, UPDATE>(start, end, alpha, w, l, dbound, fuse, counters),
        (8, 7) => sweep_path::<8, 7, UPDATE>(start, end, alpha, w, l, dbound, fuse, counters),
        (8, 8) => sweep_path::<8, 8, UPDATE>(start, end, alpha, w, l, dbound, fuse, counters),
        _ => unreachable!("no kernel for wdim {} rank {}", wdim, rank),
    }
}

/// Dispatch table for the combined update+downdate family.
#[allow(clippy::too_many_arguments)]
pub(crate) fn sweep_dispatch_pair(
    wdim: usize,
    rank: usize,
    start: usize,
    end: usize,
    alpha_c: &mut [f64],
    alpha_d: &mut [f64],
    wc: &mut [f64],
    wd: &mut [f64],
    l: &mut LdlFactor,
    dbound: f64,
    fuse: bool,
    counters: &mut SweepCounters,
) {
    macro_rules! go {
        ($w:literal, $r:literal) => {
            sweep_path_pair::<$w, $r>(
                start, end, alpha_c, alpha_d, wc, wd, l, dbound, fuse, counters,
            )
        };
    }
    match (wdim, rank) {
        (1, 1) => go!(1, 1),
        (2, 1) => go!(2, 1),
        (2, 2) => go!(2, 2),
        (4, 1) => go!(4, 1),
        (4, 2) => go!(4, 2),
        (4, 3) => go!(4, 3),
        (4, 4) => go!(4, 4),
        (8, 1) => go!(8, 1),
        (8, 2) => go!(8, 2),
        (8, 3) => go!(8, 3),
        (8, 4) => go!(8, 4),
        (8, 5) => go!(8, 5),
        (8, 6) => go!(8, 6),
        (8, 7) => go!(8, 7),
        (8, 8) => go!(8, 8),
        _ => unreachable!("no kernel for wdim {} rank {}", wdim, rank),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alpha_gamma_rank1_update() {
        // d = 1, z = 1: alpha 1 -> 2, d -> 2, gamma = -1/2
        let mut d = 1.0;
        let mut alpha = [1.0];
        let mut gamma = [0.0];
        let mut counters = SweepCounters::default();
        alpha_gamma::<1, true>(&mut d, &mut alpha, &mut gamma, &[1.0], 0.0, &mut counters);
        assert!((d - 2.0).abs() < 1e-15);
        assert!((alpha[0] - 2.0).abs() < 1e-15);
        assert!((gamma[0] + 0.5).abs() < 1e-15);
        assert_eq!(counters.npd, 0);
    }

    #[test]
    fn test_alpha_gamma_rank1_downdate_inverts_update() {
        let mut d = 1.0;
        let mut alpha = [1.0];
        let mut gamma = [0.0];
        let mut counters = SweepCounters::default();
        alpha_gamma::<1, true>(&mut d, &mut alpha, &mut gamma, &[0.75], 0.0, &mut counters);
        let d_up = d;
        let mut alpha2 = [1.0];
        alpha_gamma::<1, false>(&mut d, &mut alpha2, &mut gamma, &[0.75], 0.0, &mut counters);
        assert!((d - 1.0).abs() < 1e-14, "downdate failed to invert: {}", d);
        assert!(d_up > 1.0);
        assert_eq!(counters.npd, 0);
    }

    #[test]
    fn test_alpha_gamma_flags_nonpositive() {
        // downdating by more mass than the pivot holds
        let mut d = 1.0;
        let mut alpha = [1.0];
        let mut gamma = [0.0];
        let mut counters = SweepCounters::default();
        alpha_gamma::<1, false>(&mut d, &mut alpha, &mut gamma, &[2.0], 0.0, &mut counters);
        assert_eq!(counters.npd, 1);
    }

    #[test]
    fn test_alpha_gamma_dbound_floor() {
        let mut d = 1.0;
        let mut alpha = [1.0];
        let mut gamma = [0.0];
        let mut counters = SweepCounters::default();
        // downdate leaving a tiny but positive pivot
        let z = (1.0f64 - 1e-13).sqrt();
        alpha_gamma::<1, false>(&mut d, &mut alpha, &mut gamma, &[z], 1e-8, &mut counters);
        assert_eq!(d, 1e-8);
        assert_eq!(counters.clamped, 1);
    }

    #[test]
    fn test_alpha_gamma_pair_matches_sequential_halves() {
        // combined recurrence with zd = 0 must equal the pure update
        let mut d1 = 3.0;
        let mut ac = [1.0];
        let mut ad = [1.0];
        let mut gc = [0.0];
        let mut gd = [0.0];
        let mut counters = SweepCounters::default();
        alpha_gamma_pair::<1>(
            &mut d1, &mut ac, &mut ad, &mut gc, &mut gd, &[0.5], &[0.0], 0.0, &mut counters,
        );

        let mut d2 = 3.0;
        let mut a = [1.0];
        let mut g = [0.0];
        alpha_gamma::<1, true>(&mut d2, &mut a, &mut g, &[0.5], 0.0, &mut counters);
        assert!((d1 - d2).abs() < 1e-15);
        assert!((gc[0] - g[0]).abs() < 1e-15);
        assert_eq!(counters.npd, 0);
    }
}
