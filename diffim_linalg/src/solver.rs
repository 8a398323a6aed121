// Copyright (c) the JPEG XL Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! Cascading linear solve for symmetric normal-equation systems `M x = B`.
//!
//! `M` arises from a weighted least-squares fit and is symmetric positive
//! semi-definite in exact arithmetic, but stamp-to-stamp conditioning varies
//! wildly: collinear basis kernels or low-signal stamps can make it singular
//! or nearly so in floating point. Rather than pick one factorization and
//! propagate its failure, try progressively more expensive (and more
//! tolerant) methods until one succeeds.

use nalgebra::{DMatrix, DVector, SymmetricEigen};
use thiserror::Error;

/// Which tier of the cascade produced a solution. Useful for diagnostics:
/// a run that leans on [`SolverTier::Eig`] for most candidates is a sign the
/// basis or the stamps are poorly conditioned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolverTier {
    /// `LDL^T` (Bunch-Kaufman-free, symmetric indefinite-safe) Cholesky variant.
    Ldlt,
    /// Classic Cholesky `LL^T`, valid only for strictly positive definite `M`.
    Llt,
    /// General LU decomposition with partial pivoting.
    Lu,
    /// Symmetric eigendecomposition pseudo-inverse (Moore-Penrose).
    Eig,
}

#[derive(Debug, Error)]
pub enum SolverError {
    #[error("normal-equation matrix is not square: {rows}x{cols}")]
    NotSquare { rows: usize, cols: usize },
    #[error("normal-equation matrix size {msize} does not match right-hand side length {bsize}")]
    DimensionMismatch { msize: usize, bsize: usize },
    #[error("all solver tiers failed (matrix trace {trace:e})")]
    AllTiersFailed { trace: f64 },
    #[error("symmetric eigendecomposition produced a non-finite eigenvalue")]
    NonFiniteEigenvalue,
}

/// Tolerance, relative to the largest eigenvalue, below which an eigenvalue
/// is treated as zero in the Moore-Penrose pseudo-inverse fallback.
const EIGENVALUE_RELATIVE_TOLERANCE: f64 = 1e-12;

/// Solve `M x = B` via, in order: `LDL^T`, `LL^T`, LU, symmetric
/// eigendecomposition pseudo-inverse. Returns the first solution that the
/// chosen factorization reports as valid, along with which tier produced it.
///
/// `M` must be square and symmetric (only its lower triangle is read by the
/// Cholesky and eigendecomposition tiers, per `nalgebra`'s convention, so an
/// `M` that is only upper-triangle-filled must be symmetrized by the caller
/// first).
pub fn solve_cascading(
    m: &DMatrix<f64>,
    b: &DVector<f64>,
) -> Result<(DVector<f64>, SolverTier), SolverError> {
    if m.nrows() != m.ncols() {
        return Err(SolverError::NotSquare {
            rows: m.nrows(),
            cols: m.ncols(),
        });
    }
    if m.nrows() != b.nrows() {
        return Err(SolverError::DimensionMismatch {
            msize: m.nrows(),
            bsize: b.nrows(),
        });
    }

    if let Some(x) = solve_ldlt(m, b) {
        return Ok((x, SolverTier::Ldlt));
    }
    if let Some(chol) = m.clone().cholesky() {
        return Ok((chol.solve(b), SolverTier::Llt));
    }
    if let Some(lu) = m.clone().lu().try_inverse() {
        return Ok((&lu * b, SolverTier::Lu));
    }
    match solve_eigen_pseudo_inverse(m, b) {
        Ok(x) => Ok((x, SolverTier::Eig)),
        Err(SolverError::NonFiniteEigenvalue) => Err(SolverError::NonFiniteEigenvalue),
        Err(_) => Err(SolverError::AllTiersFailed { trace: m.trace() }),
    }
}

/// `LDL^T` solve for a symmetric matrix, valid even when `M` is indefinite
/// (unlike `LL^T`, which requires strict positive definiteness). nalgebra's
/// `SymmetricEigen`-free direct solve is not exposed for `LDL^T` on
/// arbitrary `DMatrix`, so this is implemented directly over the lower
/// triangle: the classic in-place `L D L^T` factorization, falling back to
/// `None` the moment a pivot is (numerically) zero.
fn solve_ldlt(m: &DMatrix<f64>, b: &DVector<f64>) -> Option<DVector<f64>> {
    let n = m.nrows();
    let mut l = DMatrix::<f64>::identity(n, n);
    let mut d = vec![0.0f64; n];

    for j in 0..n {
        let mut sum = m[(j, j)];
        for k in 0..j {
            sum -= l[(j, k)] * l[(j, k)] * d[k];
        }
        if sum.abs() < 1e-300 || !sum.is_finite() {
            return None;
        }
        d[j] = sum;
        for i in (j + 1)..n {
            let mut sum = m[(i, j)];
            for k in 0..j {
                sum -= l[(i, k)] * l[(j, k)] * d[k];
            }
            l[(i, j)] = sum / d[j];
        }
    }

    // Solve L y = b
    let mut y = DVector::<f64>::zeros(n);
    for i in 0..n {
        let mut sum = b[i];
        for k in 0..i {
            sum -= l[(i, k)] * y[k];
        }
        y[i] = sum;
    }
    // Solve D z = y
    let mut z = DVector::<f64>::zeros(n);
    for i in 0..n {
        if !d[i].is_finite() || d[i] == 0.0 {
            return None;
        }
        z[i] = y[i] / d[i];
    }
    // Solve L^T x = z
    let mut x = DVector::<f64>::zeros(n);
    for i in (0..n).rev() {
        let mut sum = z[i];
        for k in (i + 1)..n {
            sum -= l[(k, i)] * x[k];
        }
        x[i] = sum;
    }

    if x.iter().all(|v| v.is_finite()) {
        Some(x)
    } else {
        None
    }
}

fn solve_eigen_pseudo_inverse(
    m: &DMatrix<f64>,
    b: &DVector<f64>,
) -> Result<DVector<f64>, SolverError> {
    let eig = SymmetricEigen::new(m.clone());
    let max_abs = eig
        .eigenvalues
        .iter()
        .fold(0.0f64, |acc, v| acc.max(v.abs()));
    let threshold = max_abs * EIGENVALUE_RELATIVE_TOLERANCE;

    let n = eig.eigenvalues.nrows();
    let mut inv_diag = DVector::<f64>::zeros(n);
    for i in 0..n {
        let lambda = eig.eigenvalues[i];
        if !lambda.is_finite() {
            return Err(SolverError::NonFiniteEigenvalue);
        }
        inv_diag[i] = if lambda.abs() > threshold {
            1.0 / lambda
        } else {
            0.0
        };
    }

    let r = &eig.eigenvectors;
    let rt_b = r.transpose() * b;
    let scaled = rt_b.component_mul(&inv_diag);
    Ok(r * scaled)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(a: &DVector<f64>, b: &DVector<f64>, tol: f64) {
        assert_eq!(a.nrows(), b.nrows());
        for i in 0..a.nrows() {
            assert!(
                (a[i] - b[i]).abs() <= tol,
                "component {i}: {} vs {} (tol {tol})",
                a[i],
                b[i]
            );
        }
    }

    #[test]
    fn well_conditioned_system_matches_direct_solve() {
        let m = DMatrix::from_row_slice(3, 3, &[4.0, 1.0, 0.0, 1.0, 3.0, 1.0, 0.0, 1.0, 2.0]);
        let b = DVector::from_row_slice(&[1.0, 2.0, 3.0]);
        let (x, tier) = solve_cascading(&m, &b).unwrap();
        assert_eq!(tier, SolverTier::Ldlt);
        let residual = &m * &x - &b;
        assert!(residual.norm() < 1e-8);
    }

    #[test]
    fn singular_matrix_falls_back_to_eigen_pseudo_inverse() {
        // Two identical rows/columns: rank-deficient by construction.
        let m = DMatrix::from_row_slice(2, 2, &[1.0, 1.0, 1.0, 1.0]);
        let b = DVector::from_row_slice(&[2.0, 2.0]);
        let (x, tier) = solve_cascading(&m, &b).unwrap();
        assert_eq!(tier, SolverTier::Eig);
        // Minimum-norm solution to x0 + x1 = 2 is (1, 1).
        assert_close(&x, &DVector::from_row_slice(&[1.0, 1.0]), 1e-6);
    }

    #[test]
    fn all_tiers_agree_on_the_same_system() {
        let m = DMatrix::from_row_slice(2, 2, &[5.0, 2.0, 2.0, 3.0]);
        let b = DVector::from_row_slice(&[1.0, 1.0]);
        let x_ldlt = solve_ldlt(&m, &b).unwrap();
        let x_eig = solve_eigen_pseudo_inverse(&m, &b).unwrap();
        assert_close(&x_ldlt, &x_eig, 1e-8);
    }

    #[test]
    fn dimension_mismatch_is_reported() {
        let m = DMatrix::from_row_slice(2, 2, &[1.0, 0.0, 0.0, 1.0]);
        let b = DVector::from_row_slice(&[1.0, 2.0, 3.0]);
        assert!(matches!(
            solve_cascading(&m, &b),
            Err(SolverError::DimensionMismatch { .. })
        ));
    }
}
