// Copyright (c) the JPEG XL Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! The single-stamp kernel fit: build the weighted normal equations `(M, B)`
//! for one template/science stamp pair on a fixed basis, optionally
//! Tikhonov-regularize them, and solve with the cascading linear solver.

use std::sync::Arc;

use diffim_linalg::{solve_cascading, RegularizationMatrix, SolverTier};
use nalgebra::{DMatrix, DVector};

use crate::basis::KernelBasis;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::image::Image;
use crate::kernel::LinearCombinationKernel;

/// The interior pixel range over which a basis kernel can be convolved with
/// a stamp without reading outside the stamp: `[lo, hi)` along each axis.
fn interior_range(stamp_len: usize, kernel_len: usize, center: usize) -> Option<(usize, usize)> {
    let lo = center;
    let trailing = kernel_len.checked_sub(center + 1)?;
    let hi = stamp_len.checked_sub(trailing)?;
    if hi <= lo {
        None
    } else {
        Some((lo, hi))
    }
}

/// `C_i(i,j) = sum_{u,v} B_i(u,v) * T(i+u-ctrX, j+v-ctrY)`, evaluated only
/// over `(x0..x1, y0..y1)`, flattened row-major into a vector of length
/// `(x1-x0)*(y1-y0)`.
fn convolve_interior(
    template: &Image<f64>,
    basis_image: &Image<f64>,
    center: (usize, usize),
    range: (usize, usize, usize, usize),
) -> DVector<f64> {
    let (kcols, krows) = basis_image.size();
    let (cx, cy) = center;
    let (x0, x1, y0, y1) = range;
    let n = (x1 - x0) * (y1 - y0);
    let mut out = DVector::<f64>::zeros(n);
    let mut idx = 0;
    for j in y0..y1 {
        for i in x0..x1 {
            let mut acc = 0.0;
            for v in 0..krows {
                for u in 0..kcols {
                    let bv = basis_image.get(u, v);
                    if bv == 0.0 {
                        continue;
                    }
                    let sx = (i + u) - cx;
                    let sy = (j + v) - cy;
                    acc += bv * template.get(sx, sy);
                }
            }
            out[idx] = acc;
            idx += 1;
        }
    }
    out
}

fn flatten_interior(image: &Image<f64>, range: (usize, usize, usize, usize)) -> DVector<f64> {
    let (x0, x1, y0, y1) = range;
    let n = (x1 - x0) * (y1 - y0);
    let mut out = DVector::<f64>::zeros(n);
    let mut idx = 0;
    for j in y0..y1 {
        for i in x0..x1 {
            out[idx] = image.get(i, j);
            idx += 1;
        }
    }
    out
}

/// Result of fitting one stamp pair on one basis: the solution vector, the
/// derived kernel and background, and the normal-equation matrices needed
/// to contribute to a later spatial assembly (`crate::spatial`).
#[derive(Clone)]
pub struct StaticKernelSolution {
    pub m: DMatrix<f64>,
    pub b: DVector<f64>,
    pub x: DVector<f64>,
    pub tier: SolverTier,
    basis: Arc<Vec<Image<f64>>>,
}

impl StaticKernelSolution {
    pub fn n_basis(&self) -> usize {
        self.basis.len()
    }

    pub fn background(&self) -> f64 {
        self.x[self.x.len() - 1]
    }

    pub fn kernel(&self) -> Result<LinearCombinationKernel> {
        let coeffs = self.x.rows(0, self.n_basis()).iter().copied().collect();
        LinearCombinationKernel::new(self.basis.clone(), coeffs)
    }

    pub fn kernel_sum(&self) -> f64 {
        let k = self.kernel().expect("basis already validated");
        crate::kernel::kernel_sum(&k.render(0.0, 0.0).expect("fixed render never fails"))
    }

    /// Per-parameter standard deviations derived from `Cov = M^T M`.
    pub fn uncertainties(&self) -> Result<DVector<f64>> {
        let cov = self.m.transpose() * &self.m;
        let chol = cov
            .clone()
            .cholesky()
            .ok_or(Error::InvalidUncertainty(0))?;
        let l_inv = chol
            .l()
            .try_inverse()
            .ok_or(Error::InvalidUncertainty(0))?;
        let e2 = l_inv.transpose() * &l_inv;
        let mut out = DVector::<f64>::zeros(e2.nrows());
        for i in 0..e2.nrows() {
            let d = e2[(i, i)];
            if !d.is_finite() || d < 0.0 {
                return Err(Error::InvalidUncertainty(i));
            }
            out[i] = d.sqrt();
        }
        Ok(out)
    }
}

/// Fit `K = sum c_i B_i`, `b` to minimize `sum w (S - K*T - b)^2` over the
/// interior of the stamp, optionally Tikhonov-regularized by `H`.
pub fn solve_single_kernel(
    template: &Image<f64>,
    science: &Image<f64>,
    variance: &Image<f64>,
    basis: &Arc<Vec<Image<f64>>>,
    config: &Config,
    regularization: Option<&RegularizationMatrix>,
) -> Result<StaticKernelSolution> {
    let (kcols, krows) = basis[0].size();
    let center = (kcols / 2, krows / 2);
    let (tcols, trows) = template.size();

    let (x0, x1) =
        interior_range(tcols, kcols, center.0).ok_or(Error::DegenerateHalfWidth(kcols as i64))?;
    let (y0, y1) =
        interior_range(trows, krows, center.1).ok_or(Error::DegenerateHalfWidth(krows as i64))?;
    let range = (x0, x1, y0, y1);
    let n = (x1 - x0) * (y1 - y0);

    let n_b = basis.len();
    let mut columns: Vec<DVector<f64>> = Vec::with_capacity(n_b + 1);
    for b_i in basis.iter() {
        columns.push(convolve_interior(template, b_i, center, range));
    }
    columns.push(DVector::<f64>::from_element(n, 1.0));

    let s = flatten_interior(science, range);
    let v = flatten_interior(variance, range);
    let w: DVector<f64> = if config.constant_variance_weighting {
        DVector::<f64>::from_element(n, 1.0)
    } else {
        v.map(|x| if x > 0.0 { 1.0 / x } else { 0.0 })
    };

    let mut c = DMatrix::<f64>::zeros(n, n_b + 1);
    for (col_idx, col) in columns.iter().enumerate() {
        c.set_column(col_idx, col);
    }

    let wc = DMatrix::<f64>::from_fn(n, n_b + 1, |r, col| w[r] * c[(r, col)]);
    let mut m = c.transpose() * &wc;
    let mut b = c.transpose() * DVector::<f64>::from_fn(n, |r, _| w[r] * s[r]);

    if config.use_regularization {
        if let Some(reg) = regularization {
            let trace_m = m.trace();
            let trace_h = reg.h.trace();
            if trace_h.abs() > 0.0 {
                let lambda = trace_m / trace_h * config.regularization_scaling;
                let mt_m = m.transpose() * &m;
                b = m.transpose() * &b;
                m = mt_m + &reg.h * lambda;
            }
        }
    }

    let (x, tier) =
        solve_cascading(&m, &b).map_err(|source| Error::SolveFailure {
            stage: "single_kernel",
            source,
        })?;

    if x.iter().any(|v| !v.is_finite()) {
        return Err(Error::NumericalInvalid("single_kernel solution"));
    }

    Ok(StaticKernelSolution {
        m,
        b,
        x,
        tier,
        basis: basis.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::basis::build_delta_function_basis;

    fn delta_basis_images(cols: usize, rows: usize) -> Arc<Vec<Image<f64>>> {
        Arc::new(build_delta_function_basis(cols, rows).unwrap().into_images())
    }

    #[test]
    fn identical_images_recover_identity_kernel_and_zero_background() {
        let basis = delta_basis_images(3, 3);
        let mut template = Image::<f64>::new(9, 9).unwrap();
        for (i, v) in template.data_mut().iter_mut().enumerate() {
            *v = (i % 7) as f64 + 1.0;
        }
        let science = template.clone();
        let variance = Image::<f64>::filled(9, 9, 1.0).unwrap();
        let config = Config {
            constant_variance_weighting: true,
            use_regularization: false,
            ..Config::default()
        };
        let solution =
            solve_single_kernel(&template, &science, &variance, &basis, &config, None).unwrap();
        let kernel = solution.kernel().unwrap();
        let img = kernel.render(0.0, 0.0).unwrap();
        // The center delta basis function should dominate.
        let (cx, cy) = (1, 1);
        assert!(img.get(cx, cy) > 0.9);
        assert!(solution.background().abs() < 0.2);
    }

    #[test]
    fn constant_offset_is_absorbed_into_background() {
        let basis = delta_basis_images(3, 3);
        let mut template = Image::<f64>::new(9, 9).unwrap();
        for (i, v) in template.data_mut().iter_mut().enumerate() {
            *v = (i % 5) as f64 + 1.0;
        }
        let mut science = template.clone();
        for v in science.data_mut() {
            *v += 10.0;
        }
        let variance = Image::<f64>::filled(9, 9, 1.0).unwrap();
        let config = Config {
            constant_variance_weighting: true,
            use_regularization: false,
            ..Config::default()
        };
        let solution =
            solve_single_kernel(&template, &science, &variance, &basis, &config, None).unwrap();
        assert!((solution.background() - 10.0).abs() < 1e-6);
    }
}
