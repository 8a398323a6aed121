// Copyright (c) the JPEG XL Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! PSF-matching kernel solver for astronomical difference imaging.
//!
//! Given a template and a science image of the same field, this crate
//! fits a spatially varying convolution kernel `K(x, y)` and differential
//! background `b(x, y)` such that
//!
//! ```text
//! D(x, y) = S(x, y) - (K(x, y) * T)(x, y) - b(x, y)
//! ```
//!
//! is statistically consistent with noise. The fit proceeds per detected
//! source stamp first (`solver`, `candidate`), then across the whole field
//! (`spatial`), with rejection and PCA basis reduction passes tying the two
//! together (`visitors`, `pipeline`).

#![forbid(unsafe_code)]

pub mod basis;
pub mod candidate;
pub mod cell_grid;
pub mod config;
pub mod convolve;
pub mod error;
pub mod image;
pub mod kernel;
pub mod pca;
pub mod pipeline;
pub mod solver;
pub mod spatial;
pub mod stamp;
pub mod util;
pub mod visitor;
pub mod visitors;

pub use config::Config;
pub use error::{Error, Result};
pub use pipeline::{run_pipeline, PipelineResult};
