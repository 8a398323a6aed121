// Copyright (c) the JPEG XL Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

use crate::candidate::{CandidateStatus, KernelCandidate};
use crate::config::Config;
use crate::error::Result;
use crate::kernel::Kernel;
use crate::spatial::{SpatialBackground, SpatialLinearCombinationKernel};
use crate::visitor::CandidateVisitor;

/// Evaluates the spatial kernel and background at each candidate's
/// position, renders the implied fixed kernel, forms the difference image,
/// and marks the candidate `Good`/`Bad` by the same residual limits as
/// [`super::BuildSingleKernelVisitor`].
pub struct AssessSpatialKernelVisitor<'a> {
    pub kernel: &'a SpatialLinearCombinationKernel,
    pub background: &'a SpatialBackground,
    pub config: &'a Config,
    pub n_good: usize,
    pub n_rejected: usize,
}

impl<'a> AssessSpatialKernelVisitor<'a> {
    pub fn new(
        kernel: &'a SpatialLinearCombinationKernel,
        background: &'a SpatialBackground,
        config: &'a Config,
    ) -> Self {
        AssessSpatialKernelVisitor {
            kernel,
            background,
            config,
            n_good: 0,
            n_rejected: 0,
        }
    }
}

impl<'a> CandidateVisitor for AssessSpatialKernelVisitor<'a> {
    fn reset(&mut self) {
        self.n_good = 0;
        self.n_rejected = 0;
    }

    fn process_candidate(&mut self, candidate: &mut KernelCandidate) -> Result<()> {
        let (x, y) = candidate.center;
        let background = self.background.eval(x, y);
        let diffim = candidate.difference_image(self.kernel, background)?;

        let n = diffim.data().len() as f64;
        let mean: f64 = diffim.data().iter().sum::<f64>() / n;
        let variance: f64 = diffim.data().iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
        let rms = variance.sqrt();

        let within_limits = mean.is_finite()
            && rms.is_finite()
            && (!self.config.spatial_kernel_clipping
                || (mean.abs() <= self.config.candidate_residual_mean_max
                    && rms <= self.config.candidate_residual_std_max));

        if within_limits {
            candidate.status = CandidateStatus::Good;
            self.n_good += 1;
        } else {
            candidate.status = CandidateStatus::Bad;
            self.n_rejected += 1;
        }
        Ok(())
    }
}
