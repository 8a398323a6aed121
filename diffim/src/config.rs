// Copyright (c) the JPEG XL Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! Pipeline configuration. A single plain struct; cross-key consistency
//! (e.g. Alard-Lupton sigma/degree list lengths) is validated where the
//! relevant value is actually consumed (basis construction, spatial setup),
//! not here, since many constraints only make sense for one basis choice.

use diffim_linalg::{Boundary, Order, Stencil};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelBasisSet {
    DeltaFunction,
    AlardLupton,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpatialFunctionFamily {
    Polynomial,
    Chebyshev1,
}

/// How `det_threshold` is interpreted by the stamp extractor's detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetThresholdType {
    /// `det_threshold` is an absolute pixel value.
    Value,
    /// `det_threshold` is a multiple of the template's pixel stddev, added
    /// to the mean.
    Stdev,
    /// `det_threshold` is a multiple of the square root of the template's
    /// mean variance-plane value.
    Variance,
}

#[derive(Debug, Clone)]
pub struct Config {
    // --- Kernel basis ---
    pub kernel_cols: usize,
    pub kernel_rows: usize,
    pub kernel_basis_set: KernelBasisSet,
    /// Gaussian sigmas for the Alard-Lupton basis, one per Gaussian.
    pub alard_lupton_sigmas: Vec<f64>,
    /// Polynomial degree of the modulating monomials for each Gaussian; same
    /// length as `alard_lupton_sigmas`.
    pub alard_lupton_degrees: Vec<usize>,

    // --- PCA reduction ---
    pub use_pca_for_spatial_kernel: bool,
    /// <= 0 means keep all available components.
    pub n_eigen_components: i64,

    // --- Spatial model ---
    pub spatial_kernel_order: usize,
    pub spatial_bg_order: usize,
    pub spatial_kernel_type: SpatialFunctionFamily,
    pub spatial_bg_type: SpatialFunctionFamily,
    pub fit_for_background: bool,

    // --- Weighting / iteration ---
    pub constant_variance_weighting: bool,
    pub iterate_single_kernel: bool,

    // --- Outlier rejection ---
    pub single_kernel_clipping: bool,
    pub spatial_kernel_clipping: bool,
    pub kernel_sum_clipping: bool,
    pub candidate_residual_mean_max: f64,
    pub candidate_residual_std_max: f64,
    pub max_ksum_sigma: f64,

    // --- Regularization ---
    pub use_regularization: bool,
    pub regularization_order: Order,
    pub regularization_stencil: Stencil,
    pub regularization_boundary: Boundary,
    pub regularization_scaling: f64,

    // --- Stamp extraction ---
    pub fp_npix_min: usize,
    pub fp_npix_max: usize,
    pub fp_grow_ksize: f64,
    pub det_threshold: f64,
    pub det_threshold_scaling: f64,
    pub det_threshold_min: f64,
    pub det_threshold_type: DetThresholdType,
    pub min_clean_fp: usize,

    // --- Driver ---
    pub max_spatial_iterations: usize,
    pub n_star_per_cell: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            kernel_cols: 19,
            kernel_rows: 19,
            kernel_basis_set: KernelBasisSet::AlardLupton,
            alard_lupton_sigmas: vec![2.0, 5.0, 8.0],
            alard_lupton_degrees: vec![6, 4, 2],

            use_pca_for_spatial_kernel: true,
            n_eigen_components: -1,

            spatial_kernel_order: 2,
            spatial_bg_order: 1,
            spatial_kernel_type: SpatialFunctionFamily::Polynomial,
            spatial_bg_type: SpatialFunctionFamily::Polynomial,
            fit_for_background: true,

            constant_variance_weighting: false,
            iterate_single_kernel: false,

            single_kernel_clipping: true,
            spatial_kernel_clipping: true,
            kernel_sum_clipping: true,
            candidate_residual_mean_max: 0.25,
            candidate_residual_std_max: 1.0,
            max_ksum_sigma: 3.0,

            use_regularization: false,
            regularization_order: Order::Second,
            regularization_stencil: Stencil::Central,
            regularization_boundary: Boundary::Unwrapped,
            regularization_scaling: 1e-4,

            fp_npix_min: 5,
            fp_npix_max: 500,
            fp_grow_ksize: 1.0,
            det_threshold: 10.0,
            det_threshold_scaling: 0.5,
            det_threshold_min: 1.0,
            det_threshold_type: DetThresholdType::Value,
            min_clean_fp: 3,

            max_spatial_iterations: 3,
            n_star_per_cell: 3,
        }
    }
}

impl Config {
    /// Effective background spatial term count: when `fit_for_background`
    /// is false, `spatial_bg_order` is never consulted -- there is a single,
    /// permanently-zero background coefficient rather than a separate code
    /// path for "no background".
    pub fn effective_spatial_bg_order(&self) -> usize {
        if self.fit_for_background {
            self.spatial_bg_order
        } else {
            0
        }
    }
}
