// Copyright (c) the JPEG XL Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! Partitions candidates into spatial cells and drives visitor passes over
//! them. Candidates live in a flat arena owned by the grid; cells hold
//! rating-sorted index lists into that arena. A candidate marked `Bad` is
//! simply skipped by every later pass -- since cells are sorted once at
//! construction, "move on to the next-best candidate" falls out of
//! filtering on `status` rather than needing separate bookkeeping.

use crate::candidate::{CandidateStatus, KernelCandidate};
use crate::error::Result;
use crate::visitor::CandidateVisitor;

pub struct CellGrid {
    candidates: Vec<KernelCandidate>,
    /// Per-cell candidate indices, sorted by descending rating.
    cells: Vec<Vec<usize>>,
}

impl CellGrid {
    /// Distribute `candidates` into a `cell_cols x cell_rows` grid over an
    /// `image_size` field, by their center position.
    pub fn new(
        candidates: Vec<KernelCandidate>,
        image_size: (usize, usize),
        cell_cols: usize,
        cell_rows: usize,
    ) -> Self {
        let n_cells = cell_cols * cell_rows;
        let mut cells: Vec<Vec<usize>> = vec![Vec::new(); n_cells.max(1)];
        let cell_w = image_size.0 as f64 / cell_cols.max(1) as f64;
        let cell_h = image_size.1 as f64 / cell_rows.max(1) as f64;

        for (idx, c) in candidates.iter().enumerate() {
            let cx = ((c.center.0 / cell_w) as usize).min(cell_cols.saturating_sub(1));
            let cy = ((c.center.1 / cell_h) as usize).min(cell_rows.saturating_sub(1));
            let cell_idx = (cy * cell_cols + cx).min(cells.len() - 1);
            cells[cell_idx].push(idx);
        }
        for cell in &mut cells {
            cell.sort_by(|&a, &b| {
                candidates[b]
                    .rating
                    .partial_cmp(&candidates[a].rating)
                    .unwrap()
            });
        }

        CellGrid { candidates, cells }
    }

    pub fn candidates(&self) -> &[KernelCandidate] {
        &self.candidates
    }

    pub fn candidates_mut(&mut self) -> &mut [KernelCandidate] {
        &mut self.candidates
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    /// Run `visitor` over up to `max_per_cell` currently-considered
    /// (non-`Bad`) candidates in each cell, highest rating first. Returns
    /// the number of candidates visited.
    pub fn visit_candidates(
        &mut self,
        visitor: &mut dyn CandidateVisitor,
        max_per_cell: usize,
    ) -> Result<usize> {
        visitor.reset();
        let mut visited = 0;
        for cell in &self.cells {
            let mut taken = 0;
            for &idx in cell {
                if taken >= max_per_cell {
                    break;
                }
                if self.candidates[idx].status == CandidateStatus::Bad {
                    continue;
                }
                visitor.process_candidate(&mut self.candidates[idx])?;
                taken += 1;
                visited += 1;
            }
        }
        Ok(visited)
    }

    pub fn count_status(&self, status: CandidateStatus) -> usize {
        self.candidates.iter().filter(|c| c.status == status).count()
    }

    /// Fits up to `max_per_cell` currently-considered candidates per cell
    /// against `basis`, same selection and acceptance rule as driving
    /// [`crate::visitors::BuildSingleKernelVisitor`] through
    /// [`Self::visit_candidates`], but fans the independent per-candidate
    /// solves out across a `rayon` thread pool. Each candidate's normal
    /// equations and linear solve touch only its own stamp, so the fits
    /// have no cross-candidate dependency to serialize on. Returns the
    /// number of candidates rejected this pass.
    #[cfg(feature = "parallel")]
    pub fn build_singles_parallel(
        &mut self,
        basis: &std::sync::Arc<Vec<crate::image::Image<f64>>>,
        config: &crate::config::Config,
        regularization: Option<&diffim_linalg::RegularizationMatrix>,
        skip_built: bool,
        set_candidate_kernel: bool,
        max_per_cell: usize,
    ) -> Result<usize> {
        use rayon::prelude::*;

        let mut targets: std::collections::HashSet<usize> = std::collections::HashSet::new();
        for cell in &self.cells {
            let mut taken = 0;
            for &idx in cell {
                if taken >= max_per_cell {
                    break;
                }
                if self.candidates[idx].status == CandidateStatus::Bad {
                    continue;
                }
                targets.insert(idx);
                taken += 1;
            }
        }

        let mut selected: Vec<&mut KernelCandidate> = self
            .candidates
            .iter_mut()
            .enumerate()
            .filter(|(i, _)| targets.contains(i))
            .map(|(_, c)| c)
            .collect();

        let mut fit_results: Vec<Result<bool>> = Vec::new();
        selected
            .par_iter_mut()
            .map(|candidate| {
                crate::visitors::build_single::fit_and_classify(
                    candidate,
                    basis,
                    config,
                    regularization,
                    skip_built,
                    set_candidate_kernel,
                )
            })
            .collect_into_vec(&mut fit_results);

        let mut rejected = 0;
        for result in fit_results {
            if result? {
                rejected += 1;
            }
        }
        Ok(rejected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::Image;

    fn dummy_candidate(x: f64, y: f64, rating: f64) -> KernelCandidate {
        KernelCandidate::new(
            (x, y),
            rating,
            Image::<f64>::new(5, 5).unwrap(),
            Image::<f64>::new(5, 5).unwrap(),
            Image::<f64>::filled(5, 5, 1.0).unwrap(),
        )
    }

    struct CountingVisitor(usize);
    impl CandidateVisitor for CountingVisitor {
        fn process_candidate(&mut self, _candidate: &mut KernelCandidate) -> Result<()> {
            self.0 += 1;
            Ok(())
        }
    }

    #[test]
    fn distributes_candidates_by_position() {
        let candidates = vec![
            dummy_candidate(1.0, 1.0, 10.0),
            dummy_candidate(99.0, 1.0, 20.0),
        ];
        let grid = CellGrid::new(candidates, (100, 100), 2, 1);
        assert_eq!(grid.cells[0].len(), 1);
        assert_eq!(grid.cells[1].len(), 1);
    }

    #[test]
    fn visit_skips_bad_candidates() {
        let candidates = vec![
            dummy_candidate(1.0, 1.0, 10.0),
            dummy_candidate(2.0, 2.0, 5.0),
        ];
        let mut grid = CellGrid::new(candidates, (10, 10), 1, 1);
        grid.candidates_mut()[0].status = CandidateStatus::Bad;
        let mut visitor = CountingVisitor(0);
        let visited = grid.visit_candidates(&mut visitor, 10).unwrap();
        assert_eq!(visited, 1);
        assert_eq!(visitor.0, 1);
    }

    #[test]
    fn max_per_cell_limits_visits() {
        let candidates = vec![
            dummy_candidate(1.0, 1.0, 10.0),
            dummy_candidate(1.0, 1.0, 20.0),
            dummy_candidate(1.0, 1.0, 30.0),
        ];
        let mut grid = CellGrid::new(candidates, (10, 10), 1, 1);
        let mut visitor = CountingVisitor(0);
        let visited = grid.visit_candidates(&mut visitor, 2).unwrap();
        assert_eq!(visited, 2);
    }
}
