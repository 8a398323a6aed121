// Copyright (c) the JPEG XL Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! Synthetic image generators for the end-to-end scenario tests: noise-free
//! source fields, additive Gaussian pixel noise, and linear spatial
//! gradients, plus the [`assert_almost_eq!`] macro shared across the
//! workspace's test suites.

use diffim::image::Image;
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;

/// A flat field of square point sources on an otherwise-zero background, one
/// source every `spacing` pixels in both directions, each `flux` counts
/// spread over a single pixel (the stamp extractor's own detector then finds
/// them as 1-pixel-plus-halo footprints once convolved).
pub fn point_source_field(cols: usize, rows: usize, spacing: usize, flux: f64) -> Image<f64> {
    let mut image = Image::<f64>::new(cols, rows).unwrap();
    let margin = spacing / 2;
    let mut y = margin;
    while y < rows {
        let mut x = margin;
        while x < cols {
            image.set(x, y, flux);
            x += spacing;
        }
        y += spacing;
    }
    image
}

/// `image` with independent zero-mean Gaussian noise of standard deviation
/// `sigma` added to every pixel, seeded deterministically from `seed` so
/// scenario tests are reproducible.
pub fn add_gaussian_noise(image: &Image<f64>, sigma: f64, seed: u64) -> Image<f64> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let (cols, rows) = image.size();
    let mut out = Image::<f64>::new(cols, rows).unwrap();
    for (dst, &src) in out.data_mut().iter_mut().zip(image.data().iter()) {
        // Box-Muller: turns a pair of uniforms into one standard-normal
        // sample, good enough for synthetic test noise.
        let u1: f64 = rng.random_range(1e-12..1.0);
        let u2: f64 = rng.random_range(0.0..1.0);
        let z = (-2.0 * u1.ln()).sqrt() * (std::f64::consts::TAU * u2).cos();
        *dst = src + z * sigma;
    }
    out
}

/// A flat field whose value ramps linearly from `lo` at `x=0` to `hi` at
/// `x=cols-1`, for exercising spatially-varying fits.
pub fn linear_gradient_field(cols: usize, rows: usize, lo: f64, hi: f64) -> Image<f64> {
    let mut image = Image::<f64>::new(cols, rows).unwrap();
    for y in 0..rows {
        for x in 0..cols {
            let t = if cols > 1 { x as f64 / (cols - 1) as f64 } else { 0.0 };
            image.set(x, y, lo + t * (hi - lo));
        }
    }
    image
}

#[macro_export]
macro_rules! assert_almost_eq {
    ($left:expr, $right:expr, $max_error:expr $(,)?) => {
        match (&$left, &$right) {
            (left_val, right_val) => {
                let diff = if *left_val > *right_val {
                    *left_val - *right_val
                } else {
                    *right_val - *left_val
                };
                if !(diff <= $max_error) {
                    panic!(
                        "assertion failed: `(left ≈ right)`\n  left: `{:?}`,\n right: `{:?}`,\n max_error: `{:?}`",
                        left_val, right_val, $max_error
                    );
                }
            }
        }
    };
}
