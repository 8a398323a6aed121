// Copyright (c) the JPEG XL Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

use std::sync::Arc;

use diffim_linalg::RegularizationMatrix;

use crate::candidate::{
    squared_image, straight_difference_variance, CandidateStatus, KernelCandidate,
};
use crate::config::Config;
use crate::error::Result;
use crate::image::Image;

/// Builds (or rebuilds) each visited candidate's single-stamp fit and marks
/// it `Good` or `Bad` by residual limits.
///
/// `set_candidate_kernel = false` updates a candidate's `M`/`B`/solution
/// without being taken as ground truth by later `KernelSumVisitor` passes
/// that expect the *original* basis's kernel sum -- used when re-fitting on
/// a PCA-reduced basis ahead of the spatial assembly.
pub struct BuildSingleKernelVisitor<'a> {
    pub basis: Arc<Vec<Image<f64>>>,
    pub config: &'a Config,
    pub regularization: Option<&'a RegularizationMatrix>,
    pub skip_built: bool,
    pub set_candidate_kernel: bool,
    pub n_rejected: usize,
}

impl<'a> BuildSingleKernelVisitor<'a> {
    pub fn new(basis: Arc<Vec<Image<f64>>>, config: &'a Config) -> Self {
        BuildSingleKernelVisitor {
            basis,
            config,
            regularization: None,
            skip_built: false,
            set_candidate_kernel: true,
            n_rejected: 0,
        }
    }
}

impl<'a> crate::visitor::CandidateVisitor for BuildSingleKernelVisitor<'a> {
    fn reset(&mut self) {
        self.n_rejected = 0;
    }

    fn process_candidate(&mut self, candidate: &mut KernelCandidate) -> Result<()> {
        if fit_and_classify(
            candidate,
            &self.basis,
            self.config,
            self.regularization,
            self.skip_built,
            self.set_candidate_kernel,
        )? {
            self.n_rejected += 1;
        }
        Ok(())
    }
}

/// Fits `candidate` against `basis` (unless `skip_built` and already solved)
/// and marks it `Good`/`Bad` by the residual limits in `config`. Returns
/// `true` if the candidate was rejected. Shared between the sequential
/// [`CandidateVisitor`] path above and [`crate::cell_grid::CellGrid`]'s
/// `rayon`-parallel fit pass, so both apply the exact same acceptance rule.
pub(crate) fn fit_and_classify(
    candidate: &mut KernelCandidate,
    basis: &Arc<Vec<Image<f64>>>,
    config: &Config,
    regularization: Option<&RegularizationMatrix>,
    skip_built: bool,
    set_candidate_kernel: bool,
) -> Result<bool> {
    if skip_built && candidate.spatial_solution.is_some() {
        return Ok(false);
    }

    // Design Note 4.G.2: unless weighting by a constant, the first pass
    // weights by the straight (unfit) difference of the two stamps rather
    // than trusting whatever variance plane the stamp carries in.
    if !config.constant_variance_weighting {
        candidate.variance = straight_difference_variance(&candidate.template, &candidate.science);
    }

    match candidate.build(basis, config, regularization, set_candidate_kernel) {
        Ok(()) => {
            if config.iterate_single_kernel && !config.constant_variance_weighting {
                let solution = candidate.spatial_solution.as_ref().unwrap();
                let kernel = solution.kernel()?;
                let background = solution.background();
                let diffim = candidate.difference_image(&kernel, background)?;
                candidate.variance = squared_image(&diffim);
                candidate.build(basis, config, regularization, set_candidate_kernel)?;
            }

            let chi2 = candidate.chi2.unwrap_or(f64::NAN);
            let diffim_mean = {
                let solution = candidate.spatial_solution.as_ref().unwrap();
                let kernel = solution.kernel()?;
                let background = solution.background();
                let diffim = candidate.difference_image(&kernel, background)?;
                let n = diffim.data().len() as f64;
                diffim.data().iter().sum::<f64>() / n
            };
            let rms = chi2.sqrt();
            if !chi2.is_finite()
                || (config.single_kernel_clipping
                    && (diffim_mean.abs() > config.candidate_residual_mean_max
                        || rms > config.candidate_residual_std_max))
            {
                candidate.status = CandidateStatus::Bad;
                Ok(true)
            } else {
                candidate.status = CandidateStatus::Good;
                Ok(false)
            }
        }
        Err(_) => {
            candidate.status = CandidateStatus::Bad;
            Ok(true)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::basis::build_delta_function_basis;
    use crate::cell_grid::CellGrid;
    use crate::visitor::CandidateVisitor;

    fn good_candidate() -> KernelCandidate {
        let mut template = Image::<f64>::new(9, 9).unwrap();
        for (i, v) in template.data_mut().iter_mut().enumerate() {
            *v = (i % 5) as f64 + 1.0;
        }
        let science = template.clone();
        let variance = Image::<f64>::filled(9, 9, 1.0).unwrap();
        KernelCandidate::new((0.0, 0.0), 1.0, template, science, variance)
    }

    #[test]
    fn good_fit_marks_candidate_good() {
        let basis = Arc::new(build_delta_function_basis(3, 3).unwrap().into_images());
        let config = Config {
            constant_variance_weighting: true,
            use_regularization: false,
            single_kernel_clipping: true,
            candidate_residual_mean_max: 1.0,
            candidate_residual_std_max: 10.0,
            ..Config::default()
        };
        let mut visitor = BuildSingleKernelVisitor::new(basis, &config);
        let mut grid = CellGrid::new(vec![good_candidate()], (10, 10), 1, 1);
        grid.visit_candidates(&mut visitor, 10).unwrap();
        assert_eq!(grid.candidates()[0].status, CandidateStatus::Good);
        assert_eq!(visitor.n_rejected, 0);
    }

    #[test]
    fn skip_built_does_not_rebuild() {
        let basis = Arc::new(build_delta_function_basis(3, 3).unwrap().into_images());
        let config = Config {
            constant_variance_weighting: true,
            use_regularization: false,
            ..Config::default()
        };
        let mut grid = CellGrid::new(vec![good_candidate()], (10, 10), 1, 1);
        {
            let mut visitor = BuildSingleKernelVisitor::new(basis.clone(), &config);
            grid.visit_candidates(&mut visitor, 10).unwrap();
        }
        let first_x = grid.candidates()[0].solution.as_ref().unwrap().x.clone();
        {
            let mut visitor = BuildSingleKernelVisitor::new(basis, &config);
            visitor.skip_built = true;
            grid.visit_candidates(&mut visitor, 10).unwrap();
        }
        let second_x = grid.candidates()[0].solution.as_ref().unwrap().x.clone();
        assert_eq!(first_x, second_x);
    }

    #[test]
    fn non_constant_weighting_uses_straight_difference_variance() {
        // science != template pixel-wise, so the straight-difference variance
        // proxy is non-zero everywhere and the fit is well-posed without
        // `constant_variance_weighting`.
        let basis = Arc::new(build_delta_function_basis(3, 3).unwrap().into_images());
        let mut template = Image::<f64>::new(9, 9).unwrap();
        for (i, v) in template.data_mut().iter_mut().enumerate() {
            *v = (i % 5) as f64 + 5.0;
        }
        let mut science = template.clone();
        for v in science.data_mut() {
            *v = *v * 1.2 + 3.0;
        }
        let variance = Image::<f64>::filled(9, 9, 1.0).unwrap();
        let candidate = KernelCandidate::new((0.0, 0.0), 1.0, template, science, variance);
        let config = Config {
            constant_variance_weighting: false,
            iterate_single_kernel: true,
            use_regularization: false,
            single_kernel_clipping: false,
            ..Config::default()
        };
        let mut visitor = BuildSingleKernelVisitor::new(basis, &config);
        let mut grid = CellGrid::new(vec![candidate], (10, 10), 1, 1);
        grid.visit_candidates(&mut visitor, 10).unwrap();
        assert_eq!(grid.candidates()[0].status, CandidateStatus::Good);
        assert!((grid.candidates()[0].solution.as_ref().unwrap().background() - 3.0).abs() < 1.0);
    }
}
