// Copyright (c) the JPEG XL Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

use crate::candidate::{CandidateStatus, KernelCandidate};
use crate::error::Result;
use crate::kernel::Kernel;
use crate::pca::ImagePca;
use crate::visitor::CandidateVisitor;

/// Collects every `Good` candidate's kernel image, normalized to unit sum,
/// into an [`ImagePca`] with equal weight.
pub struct KernelPcaVisitor {
    pub pca: ImagePca,
}

impl KernelPcaVisitor {
    pub fn new() -> Self {
        KernelPcaVisitor { pca: ImagePca::new() }
    }
}

impl Default for KernelPcaVisitor {
    fn default() -> Self {
        Self::new()
    }
}

impl CandidateVisitor for KernelPcaVisitor {
    fn reset(&mut self) {
        self.pca = ImagePca::new();
    }

    fn process_candidate(&mut self, candidate: &mut KernelCandidate) -> Result<()> {
        if candidate.status != CandidateStatus::Good {
            return Ok(());
        }
        let Some(solution) = candidate.solution.as_ref() else {
            return Ok(());
        };
        let kernel = solution.kernel()?;
        let mut image = kernel.render(0.0, 0.0)?;
        let sum: f64 = image.data().iter().sum();
        if sum != 0.0 {
            for v in image.data_mut() {
                *v /= sum;
            }
        }
        self.pca.add(image, 1.0);
        Ok(())
    }
}
