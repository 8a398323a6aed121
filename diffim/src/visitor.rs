// Copyright (c) the JPEG XL Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! The minimal capability a cell-grid pass needs from whatever is driving
//! it: visit one candidate at a time, with an optional reset before the
//! pass starts. Kept intentionally small -- each concrete visitor in
//! [`crate::visitors`] only implements what it actually uses.

use crate::candidate::KernelCandidate;
use crate::error::Result;

pub trait CandidateVisitor {
    fn process_candidate(&mut self, candidate: &mut KernelCandidate) -> Result<()>;

    /// Called once before a pass begins. Default: no-op.
    fn reset(&mut self) {}
}
