// Copyright (c) the JPEG XL Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! Output encoders for the difference image and (behind `debug_tools`)
//! per-candidate debug dumps: PGM, PNG, and NumPy `.npy`.

pub mod numpy;
pub mod png;
pub mod pnm;

use std::path::Path;

use color_eyre::eyre::{eyre, Result};
use diffim::image::Image;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Pgm,
    Png,
    Npy,
}

impl OutputFormat {
    pub fn from_output_filename(path: &str) -> Result<Self> {
        let lower = path.to_lowercase();
        if lower.ends_with(".pgm") {
            Ok(OutputFormat::Pgm)
        } else if lower.ends_with(".png") {
            Ok(OutputFormat::Png)
        } else if lower.ends_with(".npy") {
            Ok(OutputFormat::Npy)
        } else {
            Err(eyre!(
                "unrecognized output extension in {:?}, expected .pgm, .png, or .npy",
                path
            ))
        }
    }

    /// Writes `image` (an arbitrary-range floating-point difference image)
    /// to `path`, normalizing to the pixel range the chosen format needs.
    pub fn save_image(&self, image: &Image<f64>, path: &Path) -> Result<()> {
        let mut file = std::fs::File::create(path)?;
        match self {
            OutputFormat::Pgm => pnm::write_pgm(image, &mut file),
            OutputFormat::Png => png::write_png(image, &mut file),
            OutputFormat::Npy => numpy::write_npy(image, &mut file),
        }
    }
}
