// Copyright (c) the JPEG XL Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

use crate::candidate::{CandidateStatus, KernelCandidate};
use crate::error::Result;
use crate::spatial::{GlobalAssembly, SpatialFunction};
use crate::visitor::CandidateVisitor;

/// Accumulates every `Good` candidate's `(M, B)` into a [`GlobalAssembly`],
/// weighted by the spatial-function outer products at its position.
pub struct BuildSpatialKernelVisitor<'a> {
    pub assembly: GlobalAssembly,
    kernel_fn: &'a dyn SpatialFunction,
    bg_fn: &'a dyn SpatialFunction,
    pub n_folded: usize,
}

impl<'a> BuildSpatialKernelVisitor<'a> {
    pub fn new(
        n_b: usize,
        n_kt: usize,
        n_bt: usize,
        constant_first_term: bool,
        kernel_fn: &'a dyn SpatialFunction,
        bg_fn: &'a dyn SpatialFunction,
    ) -> Self {
        BuildSpatialKernelVisitor {
            assembly: GlobalAssembly::new(n_b, n_kt, n_bt, constant_first_term),
            kernel_fn,
            bg_fn,
            n_folded: 0,
        }
    }
}

impl<'a> CandidateVisitor for BuildSpatialKernelVisitor<'a> {
    fn process_candidate(&mut self, candidate: &mut KernelCandidate) -> Result<()> {
        if candidate.status != CandidateStatus::Good {
            return Ok(());
        }
        let Some(solution) = candidate.solution_for_spatial() else {
            return Ok(());
        };
        self.assembly
            .accumulate(solution, candidate.center, self.kernel_fn, self.bg_fn);
        self.n_folded += 1;
        Ok(())
    }
}
