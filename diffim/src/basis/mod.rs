// Copyright (c) the JPEG XL Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! Kernel basis construction: ordered sets of same-sized kernel images that
//! every fitted kernel is expressed as a linear combination of.

mod alard_lupton;
mod delta;

pub use alard_lupton::build_alard_lupton_basis;
pub use delta::build_delta_function_basis;

use crate::error::{Error, Result};
use crate::image::Image;

/// An ordered, validated kernel basis. All member images share dimensions.
#[derive(Clone)]
pub struct KernelBasis {
    images: Vec<Image<f64>>,
    /// True when the basis carries its entire kernel-sum in the first
    /// member (Alard-Lupton, PCA), so a spatial fit can hold that term's
    /// spatial coefficient constant. False for delta-function bases.
    pub constant_first_term: bool,
}

impl KernelBasis {
    pub fn new(images: Vec<Image<f64>>, constant_first_term: bool) -> Result<Self> {
        if images.is_empty() {
            return Err(Error::EmptyBasis);
        }
        let dims = images[0].size();
        for img in &images[1..] {
            if img.size() != dims {
                return Err(Error::MismatchedBasisDimensions(
                    dims.0,
                    dims.1,
                    img.size().0,
                    img.size().1,
                ));
            }
        }
        Ok(KernelBasis {
            images,
            constant_first_term,
        })
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    pub fn dims(&self) -> (usize, usize) {
        self.images[0].size()
    }

    pub fn images(&self) -> &[Image<f64>] {
        &self.images
    }

    pub fn into_images(self) -> Vec<Image<f64>> {
        self.images
    }
}

/// Renormalize a raw list of basis images in place so that `sum(B0) = 1`,
/// `sum(Bi) = 0` and `<Bi,Bi> = 1` for `i > 0`. Each `Bi` (i>0) is first
/// normalized to unit sum, then `B0` (already unit-sum) is subtracted off
/// before rescaling to unit norm -- this is the shared final step of both
/// the Alard-Lupton construction and the PCA basis reduction.
pub fn renormalize(images: &mut [Image<f64>]) -> Result<()> {
    if images.is_empty() {
        return Err(Error::EmptyBasis);
    }
    let (first, rest) = images.split_at_mut(1);
    let sum0: f64 = first[0].data().iter().sum();
    if sum0 == 0.0 || !sum0.is_finite() {
        return Err(Error::NumericalInvalid("basis renormalization: B0 sum"));
    }
    for v in first[0].data_mut() {
        *v /= sum0;
    }
    let b0 = first[0].clone();

    for img in rest.iter_mut() {
        let sum: f64 = img.data().iter().sum();
        if sum.is_finite() && sum != 0.0 {
            for v in img.data_mut() {
                *v /= sum;
            }
        }
        for (v, b0v) in img.data_mut().iter_mut().zip(b0.data().iter()) {
            *v -= b0v;
        }
        let norm_sq: f64 = img.data().iter().map(|v| v * v).sum();
        if norm_sq == 0.0 || !norm_sq.is_finite() {
            return Err(Error::NumericalInvalid("basis renormalization: Bi norm"));
        }
        let scale = 1.0 / norm_sq.sqrt();
        for v in img.data_mut() {
            *v *= scale;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mismatched_dims_rejected() {
        let a = Image::<f64>::new(3, 3).unwrap();
        let b = Image::<f64>::new(4, 4).unwrap();
        assert!(KernelBasis::new(vec![a, b], false).is_err());
    }

    #[test]
    fn empty_basis_rejected() {
        assert!(KernelBasis::new(vec![], false).is_err());
    }
}
