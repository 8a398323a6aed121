// Copyright (c) the JPEG XL Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! Convolution and residual arithmetic.
//!
//! Pixel `(i, j)` of `K ⊛ T` is `sum_{u,v} K(u,v) * T(i + u - ctrX, j + v - ctrY)`.
//! The hot path inside the single-stamp solver (`crate::solver`) only ever
//! evaluates this at interior pixels that are guaranteed in-bounds for `T`,
//! so it never needs a boundary policy. The handful of full-frame
//! convolutions used outside that hot path (difference-image assessment,
//! debug dumps) mirror across the edge instead of reading out of bounds.

use crate::image::Image;
use crate::kernel::Kernel;
use crate::util::mirror::mirror_index;

/// Convolve `kernel` over the full extent of `image`, mirroring at the
/// boundary. If `normalize` is set, divide the kernel by its own sum before
/// convolving (a no-op for already-normalized kernels, but convenient for
/// raw PCA eigen-images).
pub fn convolve(image: &Image<f64>, kernel: &Image<f64>, normalize: bool) -> Image<f64> {
    let (icols, irows) = image.size();
    let (kcols, krows) = kernel.size();
    let (ctr_x, ctr_y) = (kcols / 2, krows / 2);

    let scale = if normalize {
        let s: f64 = kernel.data().iter().sum();
        if s != 0.0 {
            1.0 / s
        } else {
            1.0
        }
    } else {
        1.0
    };

    let mut out = Image::<f64>::new(icols, irows).unwrap();
    for j in 0..irows {
        for i in 0..icols {
            let mut acc = 0.0;
            for v in 0..krows {
                for u in 0..kcols {
                    let kv = kernel.get(u, v) * scale;
                    if kv == 0.0 {
                        continue;
                    }
                    let src_x = i as i64 + u as i64 - ctr_x as i64;
                    let src_y = j as i64 + v as i64 - ctr_y as i64;
                    let sx = mirror_index(src_x, icols);
                    let sy = mirror_index(src_y, irows);
                    acc += kv * image.get(sx, sy);
                }
            }
            out.set(i, j, acc);
        }
    }
    out
}

/// `D = S - (K ⊛ T + b)`, a full-frame difference image using the
/// mirror-boundary convolution above. `position` is the image coordinate at
/// which to render `kernel`: irrelevant for a fixed kernel, but the point a
/// spatially varying kernel (`crate::spatial::SpatialLinearCombinationKernel`)
/// must be evaluated at -- almost always the candidate's own center.
pub fn difference_image(
    science: &Image<f64>,
    template: &Image<f64>,
    kernel: &dyn Kernel,
    background: f64,
    position: (f64, f64),
) -> crate::error::Result<Image<f64>> {
    let k_img = kernel.render(position.0, position.1)?;
    let conv = convolve(template, &k_img, false);
    let mut out = science.clone();
    for (o, c) in out.data_mut().iter_mut().zip(conv.data().iter()) {
        *o -= c + background;
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delta_kernel_is_identity_convolution() {
        let mut image = Image::<f64>::new(5, 5).unwrap();
        for (i, v) in image.data_mut().iter_mut().enumerate() {
            *v = i as f64;
        }
        let mut k = Image::<f64>::new(3, 3).unwrap();
        k.set(1, 1, 1.0);
        let out = convolve(&image, &k, false);
        for y in 0..5 {
            for x in 0..5 {
                assert_eq!(out.get(x, y), image.get(x, y));
            }
        }
    }

    #[test]
    fn uniform_kernel_is_a_box_blur() {
        let mut image = Image::<f64>::new(4, 4).unwrap();
        image.set(2, 2, 8.0);
        let mut k = Image::<f64>::new(3, 3).unwrap();
        for v in k.data_mut() {
            *v = 1.0;
        }
        let out = convolve(&image, &k, true);
        // Normalized box blur preserves total flux exactly only away from
        // mirrored edges; check the center pixel distributes the spike.
        assert!(out.get(2, 2) > 0.0);
        assert!(out.get(1, 2) > 0.0);
    }
}
