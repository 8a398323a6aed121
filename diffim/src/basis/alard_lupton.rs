// Copyright (c) the JPEG XL Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

use crate::error::{Error, Result};
use crate::image::Image;

use super::{renormalize, KernelBasis};

/// Build an Alard-Lupton basis: for each Gaussian width `sigma_g`, every
/// monomial `x^j y^k` with `j + k <= degree_g` modulating that Gaussian,
/// sampled on a `(2*half_width+1)^2` grid with `x, y` in `[-1, 1]` across
/// the grid. The list is then renormalized (`sum(B0)=1`, `sum(Bi)=0`,
/// `<Bi,Bi>=1` for i>0).
pub fn build_alard_lupton_basis(
    half_width: i64,
    sigmas: &[f64],
    degrees: &[usize],
) -> Result<KernelBasis> {
    if half_width < 1 {
        return Err(Error::DegenerateHalfWidth(half_width));
    }
    if sigmas.len() != degrees.len() {
        return Err(Error::MismatchedAlardLuptonLists(
            sigmas.len(),
            degrees.len(),
        ));
    }
    let h = half_width as usize;
    let side = 2 * h + 1;

    let mut images = Vec::new();
    for (&sigma, &degree) in sigmas.iter().zip(degrees.iter()) {
        for total in 0..=degree {
            for j in 0..=total {
                let k = total - j;
                images.push(sample_gaussian_monomial(side, h, sigma, j, k));
            }
        }
    }

    renormalize(&mut images)?;
    KernelBasis::new(images, true)
}

fn sample_gaussian_monomial(side: usize, half_width: usize, sigma: f64, j: usize, k: usize) -> Image<f64> {
    let mut img = Image::<f64>::new(side, side).unwrap();
    let hw = half_width as f64;
    for row in 0..side {
        for col in 0..side {
            // Pixel offsets relative to the kernel center, mapped to [-1, 1].
            let px = col as f64 - hw;
            let py = row as f64 - hw;
            let x = px / hw.max(1.0);
            let y = py / hw.max(1.0);
            let gauss = (-0.5 * (px * px + py * py) / (sigma * sigma)).exp();
            let value = gauss * x.powi(j as i32) * y.powi(k as i32);
            img.set(col, row, value);
        }
    }
    img
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renormalized_basis_satisfies_sum_and_orthogonality_invariants() {
        let basis = build_alard_lupton_basis(4, &[2.0, 4.0], &[2, 1]).unwrap();
        let images = basis.images();
        let sum0: f64 = images[0].data().iter().sum();
        assert!((sum0 - 1.0).abs() < 1e-8, "sum(B0) = {sum0}");

        for img in &images[1..] {
            let sum: f64 = img.data().iter().sum();
            assert!(sum.abs() < 1e-6, "sum(Bi) = {sum}");
            let norm_sq: f64 = img.data().iter().map(|v| v * v).sum();
            assert!((norm_sq - 1.0).abs() < 1e-6, "<Bi,Bi> = {norm_sq}");
        }
    }

    #[test]
    fn mismatched_lists_rejected() {
        assert!(build_alard_lupton_basis(3, &[1.0, 2.0], &[1]).is_err());
    }

    #[test]
    fn zero_half_width_rejected() {
        assert!(build_alard_lupton_basis(0, &[1.0], &[1]).is_err());
    }

    #[test]
    fn basis_dims_match_requested_half_width() {
        let basis = build_alard_lupton_basis(5, &[3.0], &[0]).unwrap();
        assert_eq!(basis.dims(), (11, 11));
    }
}
