// Copyright (c) the JPEG XL Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

use std::io::Write;

use color_eyre::eyre::Result;
use diffim::image::Image;

/// Linear min/max range of a float image's pixels; `(0.0, 1.0)` for an
/// all-constant or empty image so callers never divide by zero.
pub(crate) fn data_range(image: &Image<f64>) -> (f64, f64) {
    let mut lo = f64::INFINITY;
    let mut hi = f64::NEG_INFINITY;
    for &v in image.data() {
        if v.is_finite() {
            lo = lo.min(v);
            hi = hi.max(v);
        }
    }
    if !lo.is_finite() || !hi.is_finite() || hi <= lo {
        (0.0, 1.0)
    } else {
        (lo, hi)
    }
}

/// Writes `image` as an 8-bit binary PGM (`P5`), linearly rescaled from its
/// own min/max to `[0, 255]`.
pub fn write_pgm<Writer: Write>(image: &Image<f64>, writer: &mut Writer) -> Result<()> {
    let (cols, rows) = image.size();
    let (lo, hi) = data_range(image);
    write!(writer, "P5\n{cols} {rows}\n255\n")?;
    let scale = 255.0 / (hi - lo);
    let data: Vec<u8> = image
        .data()
        .iter()
        .map(|&v| (((v - lo) * scale).clamp(0.0, 255.0) + 0.5) as u8)
        .collect();
    writer.write_all(&data)?;
    Ok(())
}
