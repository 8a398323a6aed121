// Copyright (c) the JPEG XL Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! The driver that ties the single-kernel fit, PCA reduction, spatial
//! assembly, and assessment into the iteration described in Design Note
//! 4.J: build singles, optionally swap to a PCA basis and rebuild, fit the
//! spatial model, assess, and repeat until nothing more is rejected.

use std::sync::Arc;

use diffim_linalg::RegularizationMatrix;

use crate::basis::{build_alard_lupton_basis, build_delta_function_basis, KernelBasis};
use crate::candidate::KernelCandidate;
use crate::cell_grid::CellGrid;
use crate::config::{Config, KernelBasisSet};
use crate::error::{Error, Result};
use crate::spatial::{build_spatial_function, SpatialBackground};
#[cfg(not(feature = "parallel"))]
use crate::visitors::BuildSingleKernelVisitor;
use crate::visitors::{
    AssessSpatialKernelVisitor, BuildSpatialKernelVisitor, KernelPcaVisitor, KernelSumMode,
    KernelSumVisitor,
};

pub struct PipelineResult {
    pub kernel: crate::spatial::SpatialLinearCombinationKernel,
    pub background: SpatialBackground,
    pub n_good: usize,
    pub n_bad: usize,
    pub iterations_run: usize,
    /// Per-candidate rendered kernel and difference image for every `Good`
    /// candidate from the final pass, for `debug_tools` consumers (e.g. the
    /// CLI driver's per-candidate dumps, §2.P). Empty unless the
    /// `debug_tools` feature is enabled.
    #[cfg(feature = "debug_tools")]
    pub debug_dumps: Vec<CandidateDump>,
}

/// A candidate's rendered kernel and difference image at the final fit, for
/// debug dumping (gated behind the `debug_tools` feature, §2.P).
#[cfg(feature = "debug_tools")]
pub struct CandidateDump {
    pub center: (f64, f64),
    pub kernel_image: crate::image::Image<f64>,
    pub diffim: crate::image::Image<f64>,
}

#[cfg(feature = "debug_tools")]
fn collect_debug_dumps(
    grid: &CellGrid,
    kernel: &crate::spatial::SpatialLinearCombinationKernel,
    background: &SpatialBackground,
) -> Result<Vec<CandidateDump>> {
    use crate::candidate::CandidateStatus;
    use crate::kernel::Kernel;

    let mut dumps = Vec::new();
    for candidate in grid.candidates() {
        if candidate.status != CandidateStatus::Good {
            continue;
        }
        let (x, y) = candidate.center;
        let bg = background.eval(x, y);
        let kernel_image = kernel.render(x, y)?;
        let diffim = candidate.difference_image(kernel, bg)?;
        dumps.push(CandidateDump {
            center: candidate.center,
            kernel_image,
            diffim,
        });
    }
    Ok(dumps)
}

fn initial_basis(config: &Config) -> Result<KernelBasis> {
    match config.kernel_basis_set {
        KernelBasisSet::DeltaFunction => {
            build_delta_function_basis(config.kernel_cols, config.kernel_rows)
        }
        KernelBasisSet::AlardLupton => {
            let half_width = (config.kernel_cols.max(config.kernel_rows) / 2) as i64;
            build_alard_lupton_basis(
                half_width,
                &config.alard_lupton_sigmas,
                &config.alard_lupton_degrees,
            )
        }
    }
}

fn build_regularization(config: &Config, dims: (usize, usize)) -> Result<Option<RegularizationMatrix>> {
    if !config.use_regularization {
        return Ok(None);
    }
    Ok(Some(RegularizationMatrix::build(
        dims.0,
        dims.1,
        config.regularization_order,
        config.regularization_stencil,
        config.regularization_boundary,
    )?))
}


/// Repeat a single-kernel build pass until it stops rejecting candidates.
/// Fits each cell's candidates against `basis` independently, so with the
/// `parallel` feature the per-candidate solves run on a `rayon` thread pool;
/// otherwise they run through the sequential `BuildSingleKernelVisitor`.
#[allow(clippy::too_many_arguments)]
fn build_singles_until_stable(
    grid: &mut CellGrid,
    basis: &Arc<Vec<crate::image::Image<f64>>>,
    config: &Config,
    regularization: Option<&RegularizationMatrix>,
    skip_built: bool,
    set_candidate_kernel: bool,
    n_per_cell: usize,
) -> Result<()> {
    loop {
        #[cfg(feature = "parallel")]
        let n_rejected = grid.build_singles_parallel(
            basis,
            config,
            regularization,
            skip_built,
            set_candidate_kernel,
            n_per_cell,
        )?;
        #[cfg(not(feature = "parallel"))]
        let n_rejected = {
            let mut visitor = BuildSingleKernelVisitor::new(basis.clone(), config);
            visitor.regularization = regularization;
            visitor.skip_built = skip_built;
            visitor.set_candidate_kernel = set_candidate_kernel;
            grid.visit_candidates(&mut visitor, n_per_cell)?;
            visitor.n_rejected
        };
        if n_rejected == 0 {
            break;
        }
    }
    Ok(())
}

pub fn run_pipeline(
    candidates: Vec<KernelCandidate>,
    image_size: (usize, usize),
    cell_cols: usize,
    cell_rows: usize,
    config: &Config,
) -> Result<PipelineResult> {
    if candidates.is_empty() {
        return Err(Error::NoCandidates(config.det_threshold));
    }

    let mut basis = initial_basis(config)?;
    let mut grid = CellGrid::new(candidates, image_size, cell_cols, cell_rows);

    let bbox = (0.0, image_size.0 as f64, 0.0, image_size.1 as f64);
    let kernel_fn = build_spatial_function(config.spatial_kernel_type, config.spatial_kernel_order, bbox);
    let bg_fn = build_spatial_function(
        config.spatial_bg_type,
        config.effective_spatial_bg_order(),
        bbox,
    );

    let mut iterations_run = 0;
    let mut last_result: Option<PipelineResult> = None;

    for _ in 0..config.max_spatial_iterations.max(1) {
        iterations_run += 1;
        #[cfg(feature = "tracing")]
        tracing::debug!(iteration = iterations_run, n_candidates = grid.len(), "starting spatial pass");
        let regularization = build_regularization(config, basis.dims())?;
        let mut basis_images = Arc::new(basis.images().to_vec());

        build_singles_until_stable(
            &mut grid,
            &basis_images,
            config,
            regularization.as_ref(),
            false,
            true,
            config.n_star_per_cell,
        )?;

        let mut sum_visitor = KernelSumVisitor::new(config.max_ksum_sigma, config.kernel_sum_clipping);
        grid.visit_candidates(&mut sum_visitor, config.n_star_per_cell)?;
        sum_visitor.finish_aggregation();
        sum_visitor.mode = KernelSumMode::Reject;
        grid.visit_candidates(&mut sum_visitor, config.n_star_per_cell)?;

        if config.use_pca_for_spatial_kernel {
            let mut pca_visitor = KernelPcaVisitor::new();
            grid.visit_candidates(&mut pca_visitor, config.n_star_per_cell)?;
            if !pca_visitor.pca.is_empty() {
                let (mean, eigen_images, _eigenvalues) =
                    pca_visitor.pca.analyze(config.n_eigen_components)?;
                let mut images = vec![mean];
                images.extend(eigen_images);
                basis = KernelBasis::new(images, true)?;
                basis_images = Arc::new(basis.images().to_vec());

                build_singles_until_stable(
                    &mut grid,
                    &basis_images,
                    config,
                    regularization.as_ref(),
                    false,
                    false,
                    config.n_star_per_cell,
                )?;
            }
        }

        let n_kt = kernel_fn.n_terms();
        let n_bt = bg_fn.n_terms();
        let mut spatial_visitor = BuildSpatialKernelVisitor::new(
            basis_images.len(),
            n_kt,
            n_bt,
            basis.constant_first_term,
            kernel_fn.as_ref(),
            bg_fn.as_ref(),
        );
        grid.visit_candidates(&mut spatial_visitor, config.n_star_per_cell)?;
        if spatial_visitor.n_folded == 0 {
            return Err(Error::NoCandidates(config.det_threshold));
        }
        let spatial_solution = spatial_visitor.assembly.solve()?;

        let bg_coeffs = spatial_solution.background_coeffs();
        let bg_fn_arc: Arc<dyn crate::spatial::SpatialFunction> =
            build_spatial_function(config.spatial_bg_type, config.effective_spatial_bg_order(), bbox)
                .into();
        let background = SpatialBackground {
            coeffs: bg_coeffs,
            bg_fn: bg_fn_arc,
        };
        let kernel_fn_arc: Arc<dyn crate::spatial::SpatialFunction> =
            build_spatial_function(config.spatial_kernel_type, config.spatial_kernel_order, bbox)
                .into();
        let spatial_kernel = spatial_solution.into_kernel(basis_images.clone(), kernel_fn_arc);

        let mut assess_visitor = AssessSpatialKernelVisitor::new(&spatial_kernel, &background, config);
        grid.visit_candidates(&mut assess_visitor, config.n_star_per_cell)?;

        let n_good = assess_visitor.n_good;
        let n_rejected = assess_visitor.n_rejected;
        #[cfg(feature = "tracing")]
        tracing::debug!(iteration = iterations_run, n_good, n_rejected, "spatial pass assessed");
        #[cfg(feature = "debug_tools")]
        let debug_dumps = collect_debug_dumps(&grid, &spatial_kernel, &background)?;
        last_result = Some(PipelineResult {
            kernel: spatial_kernel,
            background,
            n_good,
            n_bad: n_rejected,
            iterations_run,
            #[cfg(feature = "debug_tools")]
            debug_dumps,
        });

        if n_rejected == 0 {
            break;
        }
    }

    last_result.ok_or(Error::NoCandidates(config.det_threshold))
}
