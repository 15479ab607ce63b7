//! Symbolic analysis for the update/downdate sweep: path plans.
//!
//! # Overview
//!
//! A rank-1 update with vector `c` touches exactly the columns of L on the
//! elimination-tree path from the first nonzero row of `c` up to the root
//! of its subtree. A rank-r update touches the union of r such paths.
//! Where paths share a suffix, the shared columns should be swept once
//! with a multi-column kernel rather than r times with rank-1 kernels.
//!
//! This module partitions the union of the r paths into disjoint
//! *segments*: maximal runs of columns touched by the same set of update
//! columns. Segments form a tree (a child's sweep feeds the junction
//! column where its parent segment begins). The plan lists
//!
//! - one *leaf* descriptor per update column (scatter bookkeeping: which
//!   column of C lands in which column of the workspace W), then
//! - the segments in postorder, children before ancestors, each with the
//!   contiguous block of W columns (`wfirst`, `rank`) it consumes.
//!
//! Leaf descriptors are ordered by a depth-first walk of the segment
//! tree, which is what makes every segment's W block contiguous.
//!
//! # Algorithm
//!
//! For each update column, walk parent pointers (`row_idx[col_ptr[j]+1]`)
//! from its first row. The first walk claims every column it visits.
//! A later walk stops the moment it reaches a claimed column: that column
//! is a junction, and the claiming segment is split there if the junction
//! falls in its interior. Total work is linear in the number of distinct
//! columns walked, plus the splits (at most one per update column).

use crate::factor::LdlFactor;
use crate::sparse::SparseMatrix;
use crate::updown::UpdownError;
use std::ops::Range;

const UNCLAIMED: usize = usize::MAX;

/// One path descriptor. Entries `[0, rank)` of a plan are leaf
/// descriptors carrying `ccol`; the rest are swept segments.
#[derive(Debug, Clone)]
pub struct PathRec {
    /// First column of the subpath.
    pub start: usize,
    /// Last column (inclusive, an ancestor of `start`).
    pub end: usize,
    /// First workspace column this subpath consumes.
    pub wfirst: usize,
    /// Number of workspace columns this subpath consumes.
    pub rank: usize,
    /// Source column of C, set on leaf descriptors only.
    pub ccol: Option<usize>,
}

/// Segment under construction.
#[derive(Debug)]
struct Segment {
    /// Columns covered, ascending along the path.
    cols: Vec<usize>,
    parent: Option<usize>,
    /// Update columns whose paths begin in this segment.
    leaves: Vec<usize>,
}

/// Partition of a rank-r update into disjoint elimination-tree subpaths.
#[derive(Debug)]
pub struct PathPlan {
    rank: usize,
    wdim: usize,
    paths: Vec<PathRec>,
    covered: Vec<bool>,
}

impl PathPlan {
    /// Build the plan for the update columns `cols` of `c` against the
    /// factor `l`. Empty update columns are rejected.
    pub fn build(
        c: &SparseMatrix,
        cols: Range<usize>,
        l: &LdlFactor,
    ) -> Result<PathPlan, UpdownError> {
        let n = l.n();
        let rank = cols.len();
        debug_assert!(rank >= 1 && rank <= crate::updown::MAX_RANK);

        let mut claimed = vec![UNCLAIMED; n];
        let mut segs: Vec<Segment> = Vec::new();

        for ccol in cols.clone() {
            let start = match c.first_row(ccol) {
                Some(i) => i,
                None => return Err(UpdownError::EmptyColumn { col: ccol }),
            };
            if claimed[start] != UNCLAIMED {
                // this path begins on ground another walk already covered
                let sid = split_at(&mut segs, &mut claimed, start);
                segs[sid].leaves.push(ccol);
                continue;
            }
            let sid = segs.len();
            segs.push(Segment {
                cols: Vec::new(),
                parent: None,
                leaves: vec![ccol],
            });
            let mut j = start;
            loop {
                claimed[j] = sid;
                segs[sid].cols.push(j);
                match l.parent(j) {
                    None => break,
                    Some(up) => {
                        if claimed[up] != UNCLAIMED {
                            let t = split_at(&mut segs, &mut claimed, up);
                            segs[sid].parent = Some(t);
                            break;
                        }
                        j = up;
                    }
                }
            }
        }

        // assemble the segment tree
        let m = segs.len();
        let mut children: Vec<Vec<usize>> = vec![Vec::new(); m];
        let mut roots: Vec<usize> = Vec::new();
        for (i, s) in segs.iter().enumerate() {
            match s.parent {
                Some(p) => children[p].push(i),
                None => roots.push(i),
            }
        }
        roots.sort_by_key(|&i| segs[i].cols[0]);
        for ch in &mut children {
            ch.sort_by_key(|&i| segs[i].cols[0]);
        }

        // depth-first walk: leaves get workspace columns in visitation
        // order, segments are emitted postorder (children first)
        let mut leaf_paths: Vec<PathRec> = Vec::with_capacity(rank);
        let mut seg_paths: Vec<PathRec> = Vec::with_capacity(m);
        let mut next_leaf = 0usize;
        for &r in &roots {
            emit(r, &segs, &children, c, &mut next_leaf, &mut leaf_paths, &mut seg_paths);
        }
        debug_assert_eq!(leaf_paths.len(), rank);

        let mut paths = leaf_paths;
        paths.append(&mut seg_paths);

        let covered = claimed.iter().map(|&s| s != UNCLAIMED).collect();
        Ok(PathPlan {
            rank,
            wdim: rank.next_power_of_two(),
            paths,
            covered,
        })
    }

    /// Number of update columns (leaf descriptors).
    pub fn rank(&self) -> usize {
        self.rank
    }

    /// Workspace width: smallest power of two >= rank.
    pub fn wdim(&self) -> usize {
        self.wdim
    }

    /// All descriptors: leaves `[0, rank)`, then segments in postorder.
    pub fn paths(&self) -> &[PathRec] {
        &self.paths
    }

    /// `(workspace column, C column)` pairs for the scatter stage.
    pub fn scatter_columns(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.paths[..self.rank]
            .iter()
            .filter_map(|r| r.ccol.map(|c| (r.wfirst, c)))
    }

    /// The swept segments, in dependency order.
    pub fn segments(&self) -> &[PathRec] {
        &self.paths[self.rank..]
    }

    /// Whether column `j` is swept by some segment of this plan.
    pub fn covers(&self, j: usize) -> bool {
        self.covered[j]
    }
}

/// Return the id of a segment starting exactly at column `j`, splitting
/// the segment that currently covers `j` when `j` is interior to it.
fn split_at(segs: &mut Vec<Segment>, claimed: &mut [usize], j: usize) -> usize {
    let t = claimed[j];
    if segs[t].cols[0] == j {
        return t;
    }
    let pos = match segs[t].cols.binary_search(&j) {
        Ok(p) => p,
        Err(_) => unreachable!("claimed column missing from its segment"),
    };
    let hi_cols = segs[t].cols.split_off(pos);
    let hid = segs.len();
    let hi_parent = segs[t].parent;
    for &col in &hi_cols {
        claimed[col] = hid;
    }
    segs.push(Segment {
        cols: hi_cols,
        parent: hi_parent,
        leaves: Vec::new(),
    });
    segs[t].parent = Some(hid);
    hid
}

/// Postorder emission; returns nothing, accumulates into the two lists.
fn emit(
    sid: usize,
    segs: &[Segment],
    children: &[Vec<usize>],
    c: &SparseMatrix,
    next_leaf: &mut usize,
    leaf_paths: &mut Vec<PathRec>,
    seg_paths: &mut Vec<PathRec>,
) -> (usize, usize) {
    let mut wfirst = usize::MAX;
    let mut rank = 0usize;
    for &ccol in &segs[sid].leaves {
        let pos = *next_leaf;
        *next_leaf += 1;
        let start = c.first_row(ccol).unwrap_or(0);
        leaf_paths.push(PathRec {
            start,
            end: start,
            wfirst: pos,
            rank: 1,
            ccol: Some(ccol),
        });
        wfirst = wfirst.min(pos);
        rank += 1;
    }
    for &ch in &children[sid] {
        let (wf, rk) = emit(ch, segs, children, c, next_leaf, leaf_paths, seg_paths);
        wfirst = wfirst.min(wf);
        rank += rk;
    }
    let cols = &segs[sid].cols;
    seg_paths.push(PathRec {
        start: cols[0],
        end: cols[cols.len() - 1],
        wfirst,
        rank,
        ccol: None,
    });
    (wfirst, rank)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ldl;

    /// Factor of the n-by-n tridiagonal (2, -1) matrix: the elimination
    /// tree is the chain 0 -> 1 -> ... -> n-1.
    fn chain_factor(n: usize) -> LdlFactor {
        let mut t = Vec::new();
        for j in 0..n {
            if j > 0 {
                t.push((j - 1, j, -1.0));
            }
            t.push((j, j, 2.0));
        }
        ldl::factorize(&SparseMatrix::from_triplets(n, n, &t).unwrap()).unwrap()
    }

    #[test]
    fn test_single_column_single_segment() {
        let l = chain_factor(5);
        let c = SparseMatrix::from_triplets(5, 1, &[(1, 0, 1.0), (2, 0, 0.5)]).unwrap();
        let plan = PathPlan::build(&c, 0..1, &l).unwrap();
        assert_eq!(plan.rank(), 1);
        assert_eq!(plan.wdim(), 1);
        assert_eq!(plan.segments().len(), 1);
        let seg = &plan.segments()[0];
        assert_eq!((seg.start, seg.end, seg.wfirst, seg.rank), (1, 4, 0, 1));
        assert!(!plan.covers(0));
        assert!((1..5).all(|j| plan.covers(j)));
    }

    #[test]
    fn test_two_columns_merge_at_junction() {
        // paths start at 0 and 2 on a chain: segments [0,1], [2..4] merged
        let l = chain_factor(5);
        let c =
            SparseMatrix::from_triplets(5, 2, &[(0, 0, 1.0), (2, 1, 1.0)]).unwrap();
        let plan = PathPlan::build(&c, 0..2, &l).unwrap();
        assert_eq!(plan.rank(), 2);
        assert_eq!(plan.wdim(), 2);
        // low segment of the first walk, then the shared tail
        let segs = plan.segments();
        assert_eq!(segs.len(), 2);
        assert_eq!((segs[0].start, segs[0].end, segs[0].rank), (0, 1, 1));
        assert_eq!((segs[1].start, segs[1].end, segs[1].rank), (2, 4, 2));
        // the merged segment consumes both workspace columns from 0
        assert_eq!(segs[1].wfirst, 0);
        // child emitted before its ancestor
        assert!(segs[0].end < segs[1].start);
    }

    #[test]
    fn test_same_start_shares_one_segment() {
        let l = chain_factor(4);
        let c =
            SparseMatrix::from_triplets(4, 2, &[(1, 0, 1.0), (1, 1, 2.0)]).unwrap();
        let plan = PathPlan::build(&c, 0..2, &l).unwrap();
        let segs = plan.segments();
        assert_eq!(segs.len(), 1);
        assert_eq!((segs[0].start, segs[0].end, segs[0].wfirst, segs[0].rank), (1, 3, 0, 2));
    }

    #[test]
    fn test_contiguous_workspace_blocks() {
        // three starts on a chain: 0, 1, 3 — nested merges
        let l = chain_factor(6);
        let c = SparseMatrix::from_triplets(
            6,
            3,
            &[(0, 0, 1.0), (1, 1, 1.0), (3, 2, 1.0)],
        )
        .unwrap();
        let plan = PathPlan::build(&c, 0..3, &l).unwrap();
        assert_eq!(plan.wdim(), 4);
        for seg in plan.segments() {
            assert!(seg.wfirst + seg.rank <= plan.rank());
        }
        // the top segment consumes all three workspace columns
        let top = plan.segments().last().unwrap();
        assert_eq!((top.wfirst, top.rank), (0, 3));
        assert_eq!((top.start, top.end), (3, 5));
    }

    #[test]
    fn test_empty_column_rejected() {
        let l = chain_factor(3);
        let c = SparseMatrix::from_triplets(3, 1, &[]).unwrap();
        match PathPlan::build(&c, 0..1, &l) {
            Err(UpdownError::EmptyColumn { col: 0 }) => {}
            other => panic!("expected EmptyColumn, got {:?}", other),
        }
    }
}
