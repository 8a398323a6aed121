// Copyright (c) the JPEG XL Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! Spatial functions, the global normal-equation assembly that turns many
//! per-candidate `(M, B)` pairs into a single spatially varying kernel and
//! background, and the resulting [`SpatialLinearCombinationKernel`].

use std::sync::Arc;

use diffim_linalg::solve_cascading;
use nalgebra::{DMatrix, DVector};

use crate::config::SpatialFunctionFamily;
use crate::error::{Error, Result};
use crate::image::Image;
use crate::kernel::Kernel;
use crate::solver::StaticKernelSolution;

/// A 2-D scalar basis evaluated at an image position, used to interpolate
/// one fit coefficient (a kernel basis weight, or the background) across
/// the field.
pub trait SpatialFunction: Send + Sync {
    fn n_terms(&self) -> usize;
    /// The `n_terms`-long vector of basis term values at `(x, y)`.
    fn basis_terms(&self, x: f64, y: f64) -> DVector<f64>;
}

fn normalize(v: f64, lo: f64, hi: f64) -> f64 {
    if hi > lo {
        2.0 * (v - lo) / (hi - lo) - 1.0
    } else {
        0.0
    }
}

/// Monomials `x^j y^k` with `j + k <= order`, enumerated by total degree
/// then by `j`, matching the enumeration the Alard-Lupton basis uses for
/// its own per-Gaussian modulations.
pub struct Polynomial2D {
    pub order: usize,
    pub bbox: (f64, f64, f64, f64),
}

impl SpatialFunction for Polynomial2D {
    fn n_terms(&self) -> usize {
        (self.order + 1) * (self.order + 2) / 2
    }

    fn basis_terms(&self, x: f64, y: f64) -> DVector<f64> {
        let (x0, x1, y0, y1) = self.bbox;
        let nx = normalize(x, x0, x1);
        let ny = normalize(y, y0, y1);
        let mut terms = DVector::<f64>::zeros(self.n_terms());
        let mut idx = 0;
        for total in 0..=self.order {
            for j in 0..=total {
                let k = total - j;
                terms[idx] = nx.powi(j as i32) * ny.powi(k as i32);
                idx += 1;
            }
        }
        terms
    }
}

/// Chebyshev polynomials of the first kind, `T_j(x) T_k(y)` with
/// `j + k <= order`, same term enumeration as [`Polynomial2D`].
pub struct Chebyshev2D {
    pub order: usize,
    pub bbox: (f64, f64, f64, f64),
}

fn chebyshev_values(x: f64, order: usize) -> Vec<f64> {
    let mut t = vec![0.0; order + 1];
    t[0] = 1.0;
    if order >= 1 {
        t[1] = x;
    }
    for n in 2..=order {
        t[n] = 2.0 * x * t[n - 1] - t[n - 2];
    }
    t
}

impl SpatialFunction for Chebyshev2D {
    fn n_terms(&self) -> usize {
        (self.order + 1) * (self.order + 2) / 2
    }

    fn basis_terms(&self, x: f64, y: f64) -> DVector<f64> {
        let (x0, x1, y0, y1) = self.bbox;
        let nx = normalize(x, x0, x1);
        let ny = normalize(y, y0, y1);
        let tx = chebyshev_values(nx, self.order);
        let ty = chebyshev_values(ny, self.order);
        let mut terms = DVector::<f64>::zeros(self.n_terms());
        let mut idx = 0;
        for total in 0..=self.order {
            for j in 0..=total {
                let k = total - j;
                terms[idx] = tx[j] * ty[k];
                idx += 1;
            }
        }
        terms
    }
}

pub fn build_spatial_function(
    family: SpatialFunctionFamily,
    order: usize,
    bbox: (f64, f64, f64, f64),
) -> Box<dyn SpatialFunction> {
    match family {
        SpatialFunctionFamily::Polynomial => Box::new(Polynomial2D { order, bbox }),
        SpatialFunctionFamily::Chebyshev1 => Box::new(Chebyshev2D { order, bbox }),
    }
}

/// Where, in the flattened global parameter vector, each logical quantity
/// lives. See Design Note 4.I: when `constant_first_term` holds, the first
/// basis carries a single scalar spatial coefficient instead of a full
/// `n_kt`-term block.
struct Layout {
    n_b: usize,
    n_kt: usize,
    n_bt: usize,
    constant_first_term: bool,
}

impl Layout {
    fn total(&self) -> usize {
        let kernel_terms = if self.constant_first_term {
            1 + (self.n_b - 1) * self.n_kt
        } else {
            self.n_b * self.n_kt
        };
        kernel_terms + self.n_bt
    }

    /// Index range `[start, end)` in the global vector for kernel basis `i`'s
    /// spatial coefficients.
    fn kernel_block(&self, i: usize) -> (usize, usize) {
        if self.constant_first_term {
            if i == 0 {
                (0, 1)
            } else {
                let start = 1 + (i - 1) * self.n_kt;
                (start, start + self.n_kt)
            }
        } else {
            let start = i * self.n_kt;
            (start, start + self.n_kt)
        }
    }

    fn background_block(&self) -> (usize, usize) {
        let kernel_terms = if self.constant_first_term {
            1 + (self.n_b - 1) * self.n_kt
        } else {
            self.n_b * self.n_kt
        };
        (kernel_terms, kernel_terms + self.n_bt)
    }
}

/// Accumulates the global normal equations across candidates. See Design
/// Note 4.I for the per-candidate contribution formulas.
pub struct GlobalAssembly {
    layout: Layout,
    m: DMatrix<f64>,
    b: DVector<f64>,
}

impl GlobalAssembly {
    pub fn new(n_b: usize, n_kt: usize, n_bt: usize, constant_first_term: bool) -> Self {
        let layout = Layout {
            n_b,
            n_kt,
            n_bt,
            constant_first_term,
        };
        let total = layout.total();
        GlobalAssembly {
            layout,
            m: DMatrix::<f64>::zeros(total, total),
            b: DVector::<f64>::zeros(total),
        }
    }

    /// Fold one candidate's `(Q, W)` normal equations, weighted by the
    /// spatial-function outer products at `(x, y)`, into the global system.
    pub fn accumulate(
        &mut self,
        solution: &StaticKernelSolution,
        position: (f64, f64),
        kernel_fn: &dyn SpatialFunction,
        bg_fn: &dyn SpatialFunction,
    ) {
        let n_b = solution.n_basis();
        let pk = kernel_fn.basis_terms(position.0, position.1);
        let pb = bg_fn.basis_terms(position.0, position.1);

        let q = &solution.m;
        let w = &solution.b;

        for i in 0..n_b {
            let (i0, i1) = self.layout.kernel_block(i);
            let pi = if self.layout.constant_first_term && i == 0 {
                DVector::from_element(1, 1.0)
            } else {
                pk.clone()
            };
            for j in 0..n_b {
                let (j0, j1) = self.layout.kernel_block(j);
                let pj = if self.layout.constant_first_term && j == 0 {
                    DVector::from_element(1, 1.0)
                } else {
                    pk.clone()
                };
                let block = &pi * q[(i, j)] * pj.transpose();
                add_block(&mut self.m, i0, j0, &block);
            }
            let (bg0, _) = self.layout.background_block();
            let cross = &pi * q[(i, n_b)] * pb.transpose();
            add_block(&mut self.m, i0, bg0, &cross);
            add_block(&mut self.m, bg0, i0, &cross.transpose());

            add_vec_block(&mut self.b, i0, &(w[i] * &pi));
        }

        let (bg0, bg1) = self.layout.background_block();
        let bgbg = &pb * q[(n_b, n_b)] * pb.transpose();
        add_block(&mut self.m, bg0, bg0, &bgbg);
        let _ = bg1;
        add_vec_block(&mut self.b, bg0, &(w[n_b] * &pb));
    }

    pub fn solve(self) -> Result<SpatialKernelSolution> {
        // Symmetrize: cross-block fills can leave tiny asymmetries from
        // floating point order of operations.
        let mut m = self.m.clone();
        for i in 0..m.nrows() {
            for j in (i + 1)..m.ncols() {
                let avg = 0.5 * (m[(i, j)] + m[(j, i)]);
                m[(i, j)] = avg;
                m[(j, i)] = avg;
            }
        }
        let (x, tier) =
            solve_cascading(&m, &self.b).map_err(|source| Error::SolveFailure {
                stage: "spatial",
                source,
            })?;
        if x.iter().any(|v| !v.is_finite()) {
            return Err(Error::NumericalInvalid("spatial solution"));
        }
        Ok(SpatialKernelSolution {
            layout_n_b: self.layout.n_b,
            layout_n_kt: self.layout.n_kt,
            layout_n_bt: self.layout.n_bt,
            constant_first_term: self.layout.constant_first_term,
            x,
            tier,
        })
    }
}

fn add_block(m: &mut DMatrix<f64>, row0: usize, col0: usize, block: &DMatrix<f64>) {
    for r in 0..block.nrows() {
        for c in 0..block.ncols() {
            m[(row0 + r, col0 + c)] += block[(r, c)];
        }
    }
}

fn add_vec_block(v: &mut DVector<f64>, row0: usize, block: &DVector<f64>) {
    for r in 0..block.nrows() {
        v[row0 + r] += block[r];
    }
}

#[derive(Clone)]
pub struct SpatialKernelSolution {
    layout_n_b: usize,
    layout_n_kt: usize,
    layout_n_bt: usize,
    constant_first_term: bool,
    x: DVector<f64>,
    pub tier: diffim_linalg::SolverTier,
}

impl SpatialKernelSolution {
    fn layout(&self) -> Layout {
        Layout {
            n_b: self.layout_n_b,
            n_kt: self.layout_n_kt,
            n_bt: self.layout_n_bt,
            constant_first_term: self.constant_first_term,
        }
    }

    pub fn kernel_coeffs(&self, i: usize) -> DVector<f64> {
        let layout = self.layout();
        let (i0, i1) = layout.kernel_block(i);
        self.x.rows(i0, i1 - i0).clone_owned()
    }

    pub fn background_coeffs(&self) -> DVector<f64> {
        let layout = self.layout();
        let (b0, b1) = layout.background_block();
        self.x.rows(b0, b1 - b0).clone_owned()
    }

    pub fn into_kernel(
        self,
        basis: Arc<Vec<Image<f64>>>,
        kernel_fn: Arc<dyn SpatialFunction>,
    ) -> SpatialLinearCombinationKernel {
        let n_b = self.layout_n_b;
        let coeffs: Vec<DVector<f64>> = (0..n_b).map(|i| self.kernel_coeffs(i)).collect();
        SpatialLinearCombinationKernel {
            basis,
            coeffs,
            constant_first_term: self.constant_first_term,
            kernel_fn,
        }
    }
}

/// A spatially varying background: `b(x, y) = P_B(x, y) . coeffs`.
pub struct SpatialBackground {
    pub coeffs: DVector<f64>,
    pub bg_fn: Arc<dyn SpatialFunction>,
}

impl SpatialBackground {
    pub fn eval(&self, x: f64, y: f64) -> f64 {
        self.bg_fn.basis_terms(x, y).dot(&self.coeffs)
    }
}

/// `K(x,y) = sum_i c_i(x,y) B_i`, where `c_0` is a constant scalar when
/// `constant_first_term` holds and every other `c_i(x,y) = P_K(x,y) . coeffs_i`.
pub struct SpatialLinearCombinationKernel {
    basis: Arc<Vec<Image<f64>>>,
    coeffs: Vec<DVector<f64>>,
    constant_first_term: bool,
    kernel_fn: Arc<dyn SpatialFunction>,
}

impl Kernel for SpatialLinearCombinationKernel {
    fn dims(&self) -> (usize, usize) {
        self.basis[0].size()
    }

    fn center(&self) -> (usize, usize) {
        let (cols, rows) = self.dims();
        (cols / 2, rows / 2)
    }

    fn render(&self, x: f64, y: f64) -> Result<Image<f64>> {
        let (cols, rows) = self.dims();
        let pk = self.kernel_fn.basis_terms(x, y);
        let mut out = Image::<f64>::new(cols, rows)?;
        for (i, (b, c)) in self.basis.iter().zip(self.coeffs.iter()).enumerate() {
            let weight = if self.constant_first_term && i == 0 {
                c[0]
            } else {
                c.dot(&pk)
            };
            if weight == 0.0 {
                continue;
            }
            for (dst, src) in out.data_mut().iter_mut().zip(b.data().iter()) {
                *dst += weight * src;
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn polynomial_order0_is_constant_one() {
        let p = Polynomial2D {
            order: 0,
            bbox: (0.0, 100.0, 0.0, 100.0),
        };
        assert_eq!(p.n_terms(), 1);
        assert_eq!(p.basis_terms(50.0, 50.0)[0], 1.0);
    }

    #[test]
    fn chebyshev_order1_matches_normalized_coordinates() {
        let c = Chebyshev2D {
            order: 1,
            bbox: (0.0, 10.0, 0.0, 10.0),
        };
        let terms = c.basis_terms(10.0, 0.0);
        // Term enumeration for order 1: [T0*T0, T0*T1, T1*T0].
        assert_eq!(c.n_terms(), 3);
        assert!((terms[2] - 1.0).abs() < 1e-9);
    }

    #[test]
    fn layout_total_matches_constant_first_term_formula() {
        let layout = Layout {
            n_b: 4,
            n_kt: 3,
            n_bt: 2,
            constant_first_term: true,
        };
        assert_eq!(layout.total(), 1 + 3 * 3 + 2);
        let layout2 = Layout {
            n_b: 4,
            n_kt: 3,
            n_bt: 2,
            constant_first_term: false,
        };
        assert_eq!(layout2.total(), 4 * 3 + 2);
    }
}
