// Copyright (c) the JPEG XL Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

use std::collections::TryReserveError;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    // --- Configuration ---
    #[error("Alard-Lupton basis sigma list length {0} does not match degree list length {1}")]
    MismatchedAlardLuptonLists(usize, usize),
    #[error("unknown spatial function family: {0}")]
    UnknownSpatialFunctionFamily(String),
    #[error("spatial order {order} needs at least {needed} candidates, found {found}")]
    InsufficientCandidatesForSpatialOrder {
        order: usize,
        needed: usize,
        found: usize,
    },

    // --- Domain / dimensions ---
    #[error("kernel half-width must be >= 1, got {0}")]
    DegenerateHalfWidth(i64),
    #[error("regularization matrix construction failed: {0}")]
    RegularizationFailure(#[from] diffim_linalg::RegularizationError),
    #[error("kernel basis must contain at least one kernel")]
    EmptyBasis,
    #[error("basis kernels have mismatched dimensions: {0}x{1} vs {2}x{3}")]
    MismatchedBasisDimensions(usize, usize, usize, usize),
    #[error("rect out of bounds: {w}x{h}+{x}+{y} rect in {view_w}x{view_h} view")]
    RectOutOfBounds {
        w: usize,
        h: usize,
        x: usize,
        y: usize,
        view_w: usize,
        view_h: usize,
    },
    #[error("image size too large: {0}x{1}")]
    ImageSizeTooLarge(usize, usize),

    // --- Solving ---
    #[error("linear solve failed for {stage}: {source}")]
    SolveFailure {
        stage: &'static str,
        #[source]
        source: diffim_linalg::SolverError,
    },
    #[error("non-finite value encountered in {0}")]
    NumericalInvalid(&'static str),
    #[error("uncertainty covariance has a negative or non-finite diagonal entry at index {0}")]
    InvalidUncertainty(usize),

    // --- Stamp extraction ---
    #[error("no clean footprints remained after extraction (tried thresholds down to {0})")]
    NoCandidates(f64),
    #[error("footprint at ({0},{1}) size {2}x{3} extends past the image boundary")]
    FootprintOutOfBounds(i64, i64, usize, usize),

    // --- External collaborators ---
    #[error("detector implementation failed: {0}")]
    ExternalFailure(String),

    // --- I/O (CLI / debug tooling) ---
    #[error("failed to write output file")]
    OutputWriteFailure,
    #[error("out of memory: {0}")]
    OutOfMemory(#[from] TryReserveError),
}

pub type Result<T> = std::result::Result<T, Error>;
