// Copyright (c) the JPEG XL Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! Small, self-contained numerics shared by the PSF-matching solver: a
//! cascading linear solve for the per-stamp and per-field normal equations,
//! and the finite-difference regularization matrices that stabilize them.
//!
//! This crate knows nothing about images or kernels; it operates purely on
//! [`nalgebra`] matrices and vectors so it can be exercised (and benchmarked)
//! independently of the image-domain types in `diffim`.

pub mod regularization;
pub mod solver;

pub use regularization::{Boundary, Order, RegularizationMatrix, Stencil};
pub use solver::{solve_cascading, SolverError, SolverTier};
