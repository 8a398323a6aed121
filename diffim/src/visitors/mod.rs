// Copyright (c) the JPEG XL Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! Concrete [`crate::visitor::CandidateVisitor`] implementations: the
//! control plane the pipeline driver composes into passes over the cell
//! grid.

mod assess_spatial;
pub(crate) mod build_single;
mod build_spatial;
mod kernel_pca;
mod kernel_sum;

pub use assess_spatial::AssessSpatialKernelVisitor;
pub use build_single::BuildSingleKernelVisitor;
pub use build_spatial::BuildSpatialKernelVisitor;
pub use kernel_pca::KernelPcaVisitor;
pub use kernel_sum::{KernelSumMode, KernelSumVisitor};
