// Copyright (c) the JPEG XL Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! Principal-component reduction of a population of kernel images.
//!
//! Without mean-subtraction the first eigenvector is essentially the mean
//! and crowds out the true spatial-variation signal, so [`ImagePca`] always
//! subtracts the (weighted) mean before decomposing.

use nalgebra::{DMatrix, SymmetricEigen};

use crate::error::{Error, Result};
use crate::image::Image;

pub struct ImagePca {
    images: Vec<Image<f64>>,
    weights: Vec<f64>,
}

impl ImagePca {
    pub fn new() -> Self {
        ImagePca {
            images: Vec::new(),
            weights: Vec::new(),
        }
    }

    pub fn add(&mut self, image: Image<f64>, weight: f64) {
        self.images.push(image);
        self.weights.push(weight);
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    /// Compute the weighted mean image and the leading `n_components`
    /// eigen-images of the mean-subtracted covariance (`<=0` keeps all
    /// available components). Eigen-images are rescaled so their largest
    /// magnitude pixel is exactly `+-1`.
    pub fn analyze(&self, n_components: i64) -> Result<(Image<f64>, Vec<Image<f64>>, Vec<f64>)> {
        if self.images.is_empty() {
            return Err(Error::EmptyBasis);
        }
        let dims = self.images[0].size();
        let n_pix = dims.0 * dims.1;
        let total_weight: f64 = self.weights.iter().sum();
        if total_weight <= 0.0 {
            return Err(Error::NumericalInvalid("ImagePca total weight"));
        }

        let mut mean = vec![0.0f64; n_pix];
        for (img, &w) in self.images.iter().zip(self.weights.iter()) {
            for (m, &v) in mean.iter_mut().zip(img.data().iter()) {
                *m += w * v / total_weight;
            }
        }

        let n_samples = self.images.len();
        let mut centered = DMatrix::<f64>::zeros(n_samples, n_pix);
        for (row, (img, &w)) in self.images.iter().zip(self.weights.iter()).enumerate() {
            let sqrt_w = w.max(0.0).sqrt();
            for (col, &v) in img.data().iter().enumerate() {
                centered[(row, col)] = sqrt_w * (v - mean[col]);
            }
        }

        // "Snapshot method": decompose the n_samples x n_samples Gram matrix
        // instead of the n_pix x n_pix covariance, cheaper whenever there
        // are fewer candidates than kernel pixels (the common case here).
        let gram = &centered * centered.transpose();
        let eig = SymmetricEigen::new(gram);

        let mut order: Vec<usize> = (0..n_samples).collect();
        order.sort_by(|&a, &b| eig.eigenvalues[b].partial_cmp(&eig.eigenvalues[a]).unwrap());

        let keep = if n_components <= 0 {
            n_samples
        } else {
            (n_components as usize).min(n_samples)
        };

        let mut eigen_images = Vec::with_capacity(keep);
        let mut eigenvalues = Vec::with_capacity(keep);
        for &idx in order.iter().take(keep) {
            let lambda = eig.eigenvalues[idx].max(0.0);
            let v = eig.eigenvectors.column(idx);
            // Map the sample-space eigenvector back to pixel space:
            // e = X^T v / ||X^T v||.
            let pixel_vec = centered.transpose() * v;
            let norm = pixel_vec.norm();
            if norm == 0.0 {
                continue;
            }
            let mut data = vec![0.0f64; n_pix];
            for (d, &p) in data.iter_mut().zip(pixel_vec.iter()) {
                *d = p / norm;
            }
            let max_abs = data.iter().fold(0.0f64, |acc, v| acc.max(v.abs()));
            if max_abs > 0.0 {
                for d in data.iter_mut() {
                    *d /= max_abs;
                }
            }
            eigen_images.push(Image::from_data(dims.0, dims.1, data)?);
            eigenvalues.push(lambda);
        }

        let mean_image = Image::from_data(dims.0, dims.1, mean)?;
        Ok((mean_image, eigen_images, eigenvalues))
    }
}

impl Default for ImagePca {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_population_has_zero_variance_components() {
        let mut pca = ImagePca::new();
        let mut img = Image::<f64>::new(3, 3).unwrap();
        img.set(1, 1, 1.0);
        for _ in 0..5 {
            pca.add(img.clone(), 1.0);
        }
        let (mean, eigen_images, eigenvalues) = pca.analyze(-1).unwrap();
        assert_eq!(mean.get(1, 1), 1.0);
        // All samples equal the mean, so every eigenvalue is ~0.
        for ev in eigenvalues {
            assert!(ev.abs() < 1e-9);
        }
        let _ = eigen_images;
    }

    #[test]
    fn n_components_limits_output() {
        let mut pca = ImagePca::new();
        for i in 0..4 {
            let mut img = Image::<f64>::new(2, 2).unwrap();
            img.set(0, 0, i as f64);
            pca.add(img, 1.0);
        }
        let (_, eigen_images, eigenvalues) = pca.analyze(2).unwrap();
        assert!(eigen_images.len() <= 2);
        assert!(eigenvalues.len() <= 2);
    }

    #[test]
    fn empty_population_is_an_error() {
        let pca = ImagePca::new();
        assert!(pca.analyze(-1).is_err());
    }
}
