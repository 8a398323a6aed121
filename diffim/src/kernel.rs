// Copyright (c) the JPEG XL Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! Kernel types: anything that can be rendered to a fixed image at a given
//! image position. [`LinearCombinationKernel`] is the workhorse -- every
//! fitted kernel (single-stamp or spatial) is expressed as a weighted sum
//! over a shared [`super::basis`].

use std::sync::Arc;

use crate::error::Result;
use crate::image::Image;

/// Something that can be rendered to a `cols x rows` kernel image at a
/// given position `(x, y)` in the parent image's coordinate system.
/// Non-spatial kernels ignore `(x, y)`.
pub trait Kernel {
    fn dims(&self) -> (usize, usize);
    fn center(&self) -> (usize, usize);
    fn render(&self, x: f64, y: f64) -> Result<Image<f64>>;
}

/// A kernel that never changes regardless of image position.
#[derive(Clone)]
pub struct FixedKernel {
    image: Image<f64>,
    center: (usize, usize),
}

impl FixedKernel {
    pub fn new(image: Image<f64>) -> Self {
        let (cols, rows) = image.size();
        FixedKernel {
            image,
            center: (cols / 2, rows / 2),
        }
    }

    pub fn image(&self) -> &Image<f64> {
        &self.image
    }
}

impl Kernel for FixedKernel {
    fn dims(&self) -> (usize, usize) {
        self.image.size()
    }

    fn center(&self) -> (usize, usize) {
        self.center
    }

    fn render(&self, _x: f64, _y: f64) -> Result<Image<f64>> {
        Ok(self.image.clone())
    }
}

/// An analytic, elliptical Gaussian kernel, sampled onto a `cols x rows`
/// grid centered at `(cols/2, rows/2)`.
#[derive(Clone, Copy, Debug)]
pub struct GaussianKernel {
    pub cols: usize,
    pub rows: usize,
    pub sigma_x: f64,
    pub sigma_y: f64,
}

impl Kernel for GaussianKernel {
    fn dims(&self) -> (usize, usize) {
        (self.cols, self.rows)
    }

    fn center(&self) -> (usize, usize) {
        (self.cols / 2, self.rows / 2)
    }

    fn render(&self, _x: f64, _y: f64) -> Result<Image<f64>> {
        let (cx, cy) = (self.center().0 as f64, self.center().1 as f64);
        let mut img = Image::<f64>::new(self.cols, self.rows)?;
        let mut sum = 0.0;
        for row in 0..self.rows {
            for col in 0..self.cols {
                let dx = col as f64 - cx;
                let dy = row as f64 - cy;
                let v = (-0.5 * (dx * dx) / (self.sigma_x * self.sigma_x)
                    - 0.5 * (dy * dy) / (self.sigma_y * self.sigma_y))
                    .exp();
                img.set(col, row, v);
                sum += v;
            }
        }
        if sum > 0.0 {
            for v in img.data_mut() {
                *v /= sum;
            }
        }
        Ok(img)
    }
}

/// A single nonzero pixel at `(i, j)`.
#[derive(Clone, Copy, Debug)]
pub struct DeltaFunctionKernel {
    pub cols: usize,
    pub rows: usize,
    pub i: usize,
    pub j: usize,
}

impl Kernel for DeltaFunctionKernel {
    fn dims(&self) -> (usize, usize) {
        (self.cols, self.rows)
    }

    fn center(&self) -> (usize, usize) {
        (self.cols / 2, self.rows / 2)
    }

    fn render(&self, _x: f64, _y: f64) -> Result<Image<f64>> {
        let mut img = Image::<f64>::new(self.cols, self.rows)?;
        img.set(self.i, self.j, 1.0);
        Ok(img)
    }
}

/// `K = sum_i coeffs[i] * basis[i]`, a fixed, non-spatial combination of a
/// shared [`super::basis`]. The basis is reference-counted: candidates
/// built against the same basis all point at the same underlying images.
#[derive(Clone)]
pub struct LinearCombinationKernel {
    basis: Arc<Vec<Image<f64>>>,
    coeffs: Vec<f64>,
    center: (usize, usize),
}

impl LinearCombinationKernel {
    pub fn new(basis: Arc<Vec<Image<f64>>>, coeffs: Vec<f64>) -> Result<Self> {
        debug_assert_eq!(basis.len(), coeffs.len());
        let (cols, rows) = basis[0].size();
        Ok(LinearCombinationKernel {
            basis,
            coeffs,
            center: (cols / 2, rows / 2),
        })
    }

    pub fn coeffs(&self) -> &[f64] {
        &self.coeffs
    }

    pub fn basis(&self) -> &[Image<f64>] {
        &self.basis
    }
}

impl Kernel for LinearCombinationKernel {
    fn dims(&self) -> (usize, usize) {
        self.basis[0].size()
    }

    fn center(&self) -> (usize, usize) {
        self.center
    }

    fn render(&self, _x: f64, _y: f64) -> Result<Image<f64>> {
        let (cols, rows) = self.dims();
        let mut out = Image::<f64>::new(cols, rows)?;
        for (b, &c) in self.basis.iter().zip(self.coeffs.iter()) {
            if c == 0.0 {
                continue;
            }
            for (dst, src) in out.data_mut().iter_mut().zip(b.data().iter()) {
                *dst += c * src;
            }
        }
        Ok(out)
    }
}

/// Sum of a kernel image's pixels.
pub fn kernel_sum(image: &Image<f64>) -> f64 {
    image.data().iter().sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delta_function_render_has_single_nonzero_pixel() {
        let k = DeltaFunctionKernel {
            cols: 5,
            rows: 5,
            i: 2,
            j: 3,
        };
        let img = k.render(0.0, 0.0).unwrap();
        assert_eq!(kernel_sum(&img), 1.0);
        assert_eq!(img.get(2, 3), 1.0);
    }

    #[test]
    fn gaussian_kernel_sums_to_one() {
        let k = GaussianKernel {
            cols: 11,
            rows: 11,
            sigma_x: 2.0,
            sigma_y: 2.0,
        };
        let img = k.render(0.0, 0.0).unwrap();
        assert!((kernel_sum(&img) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn linear_combination_recombines_basis() {
        let b0 = {
            let mut i = Image::<f64>::new(3, 3).unwrap();
            i.set(1, 1, 1.0);
            i
        };
        let b1 = {
            let mut i = Image::<f64>::new(3, 3).unwrap();
            i.set(0, 0, 1.0);
            i
        };
        let lck = LinearCombinationKernel::new(Arc::new(vec![b0, b1]), vec![2.0, 3.0]).unwrap();
        let img = lck.render(0.0, 0.0).unwrap();
        assert_eq!(img.get(1, 1), 2.0);
        assert_eq!(img.get(0, 0), 3.0);
    }
}
