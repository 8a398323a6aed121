// Copyright (c) the JPEG XL Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! A single candidate source: its stamp pair, its position, and whatever
//! fit products the current pass has produced for it.

use std::sync::Arc;

use crate::config::Config;
use crate::convolve::difference_image;
use crate::error::Result;
use crate::image::Image;
use crate::kernel::Kernel;
use crate::solver::{solve_single_kernel, StaticKernelSolution};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateStatus {
    Unknown,
    Good,
    Bad,
}

pub struct KernelCandidate {
    pub center: (f64, f64),
    pub rating: f64,
    pub template: Image<f64>,
    pub science: Image<f64>,
    pub variance: Image<f64>,
    pub status: CandidateStatus,
    pub solution: Option<StaticKernelSolution>,
    /// The `(M, B)`-bearing solution a [`crate::visitors::BuildSpatialKernelVisitor`]
    /// folds into the global assembly. Always refreshed on `build`, even when
    /// `set_candidate_kernel = false` leaves `solution` (the "current kernel"
    /// used for kernel-sum rejection and debug rendering) untouched -- see
    /// Design Note 4.G.2.
    pub spatial_solution: Option<StaticKernelSolution>,
    pub chi2: Option<f64>,
}

impl KernelCandidate {
    pub fn new(
        center: (f64, f64),
        rating: f64,
        template: Image<f64>,
        science: Image<f64>,
        variance: Image<f64>,
    ) -> Self {
        KernelCandidate {
            center,
            rating,
            template,
            science,
            variance,
            status: CandidateStatus::Unknown,
            solution: None,
            spatial_solution: None,
            chi2: None,
        }
    }

    /// Rebuild this candidate's fit on `basis`. On success, updates `chi2`
    /// and `spatial_solution` unconditionally, and updates `solution` (the
    /// kernel used for kernel-sum rejection and debug rendering) only when
    /// `set_candidate_kernel` is true -- see Design Note 4.G.2: a PCA-basis
    /// refit ahead of the spatial assembly updates the normal equations
    /// without replacing the candidate's displayed kernel. Leaves `status`
    /// for the caller (typically a [`crate::visitors::BuildSingleKernelVisitor`])
    /// to set once it has checked residual limits.
    pub fn build(
        &mut self,
        basis: &Arc<Vec<Image<f64>>>,
        config: &Config,
        regularization: Option<&diffim_linalg::RegularizationMatrix>,
        set_candidate_kernel: bool,
    ) -> Result<()> {
        let solution = solve_single_kernel(
            &self.template,
            &self.science,
            &self.variance,
            basis,
            config,
            regularization,
        )?;
        let kernel = solution.kernel()?;
        let background = solution.background();
        let diffim = self.difference_image(&kernel, background)?;
        self.chi2 = Some(variance_of(&diffim));
        self.spatial_solution = Some(solution.clone());
        if set_candidate_kernel || self.solution.is_none() {
            self.solution = Some(solution);
        }
        Ok(())
    }

    /// Renders `kernel` at this candidate's own position and forms
    /// `S - (K*T + b)` over the stamp -- the position argument matters only
    /// for a spatially varying kernel; a fixed per-stamp kernel ignores it.
    pub fn difference_image(&self, kernel: &dyn Kernel, background: f64) -> Result<Image<f64>> {
        difference_image(&self.science, &self.template, kernel, background, self.center)
    }

    pub fn kernel_sum(&self) -> Option<f64> {
        self.solution.as_ref().map(|s| s.kernel_sum())
    }

    /// The solution a spatial assembly pass should fold in: the most
    /// recently built `(M, B)`, regardless of whether it was taken as the
    /// candidate's displayed kernel.
    pub fn solution_for_spatial(&self) -> Option<&StaticKernelSolution> {
        self.spatial_solution.as_ref().or(self.solution.as_ref())
    }
}

/// Pixel-wise `(science - template)^2`, the "straight difference" variance
/// proxy Design Note 4.G.2 uses as the `BuildSingleKernelVisitor`'s initial
/// weight when `constant_variance_weighting` is off and the stamp's own
/// variance plane isn't trusted yet.
pub fn straight_difference_variance(template: &Image<f64>, science: &Image<f64>) -> Image<f64> {
    let (cols, rows) = template.size();
    let data: Vec<f64> = template
        .data()
        .iter()
        .zip(science.data().iter())
        .map(|(&t, &s)| (s - t).powi(2))
        .collect();
    Image::from_data(cols, rows, data).expect("same dims as template")
}

/// Pixel-wise `image^2`, used to turn a first-pass difference image into the
/// re-fit weight for `iterate_single_kernel` (Design Note 4.G.2).
pub fn squared_image(image: &Image<f64>) -> Image<f64> {
    let (cols, rows) = image.size();
    let data: Vec<f64> = image.data().iter().map(|&v| v * v).collect();
    Image::from_data(cols, rows, data).expect("same dims as source")
}

fn variance_of(image: &Image<f64>) -> f64 {
    let data = image.data();
    let n = data.len() as f64;
    if n == 0.0 {
        return 0.0;
    }
    let mean: f64 = data.iter().sum::<f64>() / n;
    data.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::basis::build_delta_function_basis;

    #[test]
    fn build_marks_chi2_and_solution_on_success() {
        let basis = Arc::new(build_delta_function_basis(3, 3).unwrap().into_images());
        let mut template = Image::<f64>::new(9, 9).unwrap();
        for (i, v) in template.data_mut().iter_mut().enumerate() {
            *v = (i % 5) as f64 + 1.0;
        }
        let science = template.clone();
        let variance = Image::<f64>::filled(9, 9, 1.0).unwrap();
        let mut candidate = KernelCandidate::new((4.0, 4.0), 100.0, template, science, variance);
        let config = Config {
            constant_variance_weighting: true,
            use_regularization: false,
            ..Config::default()
        };
        candidate.build(&basis, &config, None, true).unwrap();
        assert!(candidate.solution.is_some());
        assert!(candidate.chi2.unwrap() < 1e-6);
    }
}
