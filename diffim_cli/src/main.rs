// Copyright (c) the JPEG XL Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use color_eyre::eyre::{Result, WrapErr};
use diffim::config::{Config, DetThresholdType, KernelBasisSet, SpatialFunctionFamily};
use diffim_cli::enc::OutputFormat;
#[cfg(feature = "debug_tools")]
use diffim_cli::dump_candidates;
use diffim_cli::{dec, fit, render_difference_image};
use diffim_linalg::{Boundary, Order, Stencil};

#[derive(ValueEnum, Clone, Copy, Debug)]
enum CliBasis {
    Delta,
    AlardLupton,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum CliSpatialFamily {
    Polynomial,
    Chebyshev1,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum CliDetThresholdType {
    Value,
    Stdev,
    Variance,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum CliRegOrder {
    Zeroth,
    First,
    Second,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum CliRegStencil {
    Forward,
    Central,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum CliRegBoundary {
    Unwrapped,
    Wrapped,
    OrderTapered,
}

/// Fits a spatially varying PSF-matching kernel and background between a
/// template and science image, and writes the resulting difference image.
#[derive(Parser)]
#[command(version)]
struct Opt {
    /// Template (reference) image, binary PGM (P5).
    template: PathBuf,

    /// Science (new) image, binary PGM (P5), same size as the template.
    science: PathBuf,

    /// Output difference image. Format is chosen by extension: .pgm, .png, .npy.
    output: PathBuf,

    /// Kernel basis half-width in pixels (kernel size = 2*half_width + 1).
    #[clap(long, default_value_t = 9)]
    kernel_half_width: usize,

    /// Kernel basis family.
    #[clap(long, value_enum, default_value_t = CliBasis::AlardLupton)]
    basis: CliBasis,

    /// Reduce the single-kernel basis via PCA before the spatial fit.
    #[clap(long, default_value_t = true)]
    use_pca: bool,

    /// Spatial order of the kernel coefficient functions.
    #[clap(long, default_value_t = 2)]
    spatial_kernel_order: usize,

    /// Spatial order of the background function.
    #[clap(long, default_value_t = 1)]
    spatial_bg_order: usize,

    /// Spatial function family for both kernel and background.
    #[clap(long, value_enum, default_value_t = CliSpatialFamily::Polynomial)]
    spatial_family: CliSpatialFamily,

    /// Fit a spatially varying background instead of holding it at zero.
    #[clap(long, default_value_t = true)]
    fit_for_background: bool,

    /// Source detection threshold, interpreted per `--det-threshold-type`.
    #[clap(long, default_value_t = 10.0)]
    det_threshold: f64,

    /// How `--det-threshold` is interpreted.
    #[clap(long, value_enum, default_value_t = CliDetThresholdType::Value)]
    det_threshold_type: CliDetThresholdType,

    /// Minimum number of clean footprints required before fitting proceeds.
    #[clap(long, default_value_t = 3)]
    min_clean_fp: usize,

    /// Enable Tikhonov regularization of the per-stamp kernel fit.
    #[clap(long, default_value_t = false)]
    use_regularization: bool,

    /// Regularization finite-difference order.
    #[clap(long, value_enum, default_value_t = CliRegOrder::Second)]
    regularization_order: CliRegOrder,

    /// Regularization finite-difference stencil.
    #[clap(long, value_enum, default_value_t = CliRegStencil::Central)]
    regularization_stencil: CliRegStencil,

    /// Regularization boundary handling.
    #[clap(long, value_enum, default_value_t = CliRegBoundary::Unwrapped)]
    regularization_boundary: CliRegBoundary,

    /// Number of spatial grid cells across the image, in each dimension.
    #[clap(long, default_value_t = 4)]
    cell_cols: usize,
    #[clap(long, default_value_t = 4)]
    cell_rows: usize,

    /// Maximum build/assess/reject iterations of the spatial driver.
    #[clap(long, default_value_t = 3)]
    max_spatial_iterations: usize,

    /// Directory to write per-candidate debug dumps into (requires the
    /// `debug_tools` feature).
    #[clap(long)]
    debug_dir: Option<PathBuf>,
}

fn build_config(opt: &Opt) -> Config {
    let kernel_size = 2 * opt.kernel_half_width + 1;
    Config {
        kernel_cols: kernel_size,
        kernel_rows: kernel_size,
        kernel_basis_set: match opt.basis {
            CliBasis::Delta => KernelBasisSet::DeltaFunction,
            CliBasis::AlardLupton => KernelBasisSet::AlardLupton,
        },
        use_pca_for_spatial_kernel: opt.use_pca,
        spatial_kernel_order: opt.spatial_kernel_order,
        spatial_bg_order: opt.spatial_bg_order,
        spatial_kernel_type: match opt.spatial_family {
            CliSpatialFamily::Polynomial => SpatialFunctionFamily::Polynomial,
            CliSpatialFamily::Chebyshev1 => SpatialFunctionFamily::Chebyshev1,
        },
        spatial_bg_type: match opt.spatial_family {
            CliSpatialFamily::Polynomial => SpatialFunctionFamily::Polynomial,
            CliSpatialFamily::Chebyshev1 => SpatialFunctionFamily::Chebyshev1,
        },
        fit_for_background: opt.fit_for_background,
        det_threshold: opt.det_threshold,
        det_threshold_type: match opt.det_threshold_type {
            CliDetThresholdType::Value => DetThresholdType::Value,
            CliDetThresholdType::Stdev => DetThresholdType::Stdev,
            CliDetThresholdType::Variance => DetThresholdType::Variance,
        },
        min_clean_fp: opt.min_clean_fp,
        use_regularization: opt.use_regularization,
        regularization_order: match opt.regularization_order {
            CliRegOrder::Zeroth => Order::Zeroth,
            CliRegOrder::First => Order::First,
            CliRegOrder::Second => Order::Second,
        },
        regularization_stencil: match opt.regularization_stencil {
            CliRegStencil::Forward => Stencil::Forward,
            CliRegStencil::Central => Stencil::Central,
        },
        regularization_boundary: match opt.regularization_boundary {
            CliRegBoundary::Unwrapped => Boundary::Unwrapped,
            CliRegBoundary::Wrapped => Boundary::Wrapped,
            CliRegBoundary::OrderTapered => Boundary::OrderTapered,
        },
        max_spatial_iterations: opt.max_spatial_iterations,
        ..Config::default()
    }
}

fn main() -> Result<()> {
    color_eyre::install()?;
    #[cfg(feature = "tracing-subscriber")]
    {
        use tracing_subscriber::{fmt, prelude::*, EnvFilter};
        tracing_subscriber::registry()
            .with(fmt::layer())
            .with(EnvFilter::from_default_env())
            .init();
    }

    let opt = Opt::parse();
    let config = build_config(&opt);

    let mut template = dec::read_pgm(&opt.template)?;
    let mut science = dec::read_pgm(&opt.science)?;
    if template.size() != science.size() {
        return Err(color_eyre::eyre::eyre!(
            "template size {:?} does not match science size {:?}",
            template.size(),
            science.size()
        ));
    }

    let result = fit(&mut template, &mut science, opt.cell_cols, opt.cell_rows, &config)
        .wrap_err("PSF-matching fit failed")?;
    println!(
        "fit converged after {} iteration(s): {} good, {} rejected",
        result.iterations_run, result.n_good, result.n_bad
    );

    let template_f64 = {
        let (cols, rows) = template.size();
        let data = template.intensity.data().iter().map(|&v| v as f64).collect();
        diffim::image::Image::from_data(cols, rows, data)?
    };
    let science_f64 = {
        let (cols, rows) = science.intensity.size();
        let data = science.intensity.data().iter().map(|&v| v as f64).collect();
        diffim::image::Image::from_data(cols, rows, data)?
    };
    let diff = render_difference_image(&result, &template_f64, &science_f64, opt.cell_cols, opt.cell_rows)?;

    let output_format = OutputFormat::from_output_filename(&opt.output.to_string_lossy())?;
    output_format.save_image(&diff, &opt.output)?;
    println!("wrote difference image to {:?}", opt.output);

    if let Some(dir) = &opt.debug_dir {
        #[cfg(not(feature = "debug_tools"))]
        {
            let _ = dir;
            eprintln!("warning: --debug-dir given but the debug_tools feature is not enabled; ignoring");
        }
        #[cfg(feature = "debug_tools")]
        {
            dump_candidates(&result, dir)?;
            println!("wrote per-candidate debug dumps to {:?}", dir);
        }
    }

    Ok(())
}
