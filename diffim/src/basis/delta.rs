// Copyright (c) the JPEG XL Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

use crate::error::{Error, Result};
use crate::image::Image;

use super::KernelBasis;

/// One delta-function kernel per pixel of a `cols x rows` grid, enumerated
/// row-major.
pub fn build_delta_function_basis(cols: usize, rows: usize) -> Result<KernelBasis> {
    if cols < 1 || rows < 1 {
        return Err(Error::DegenerateHalfWidth(0));
    }
    let mut images = Vec::with_capacity(cols * rows);
    for row in 0..rows {
        for col in 0..cols {
            let mut img = Image::<f64>::new(cols, rows)?;
            img.set(col, row, 1.0);
            images.push(img);
        }
    }
    KernelBasis::new(images, false)
}
