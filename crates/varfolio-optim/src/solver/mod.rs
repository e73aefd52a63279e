//! Convex quadratic programming
//!
//! The optimizer models every objective as a [`QuadraticProgram`]
//!
//! ```text
//! minimize    ½ xᵀ P x + qᵀ x
//! subject to  l ≤ A x ≤ u
//! ```
//!
//! and hands it to a [`ConvexSolver`]. Equality rows have `l = u` and
//! one-sided rows use an infinite bound. [`AdmmSolver`] is the built-in
//! backend; any other implementation of the trait can be swapped in without
//! touching the objective or constraint modelling.

pub mod admm;
mod linalg;

pub use admm::{AdmmSolver, SolverSettings};

use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors reported by a convex solver
#[derive(Debug, Error)]
pub enum SolverError {
    /// No point satisfies the constraints
    #[error("Problem is primal infeasible (detected after {iterations} iterations)")]
    PrimalInfeasible {
        /// Iterations run before the certificate was found
        iterations: usize,
    },

    /// The objective is unbounded below on the feasible set
    #[error("Problem is dual infeasible (detected after {iterations} iterations)")]
    DualInfeasible {
        /// Iterations run before the certificate was found
        iterations: usize,
    },

    /// Residuals did not reach the tolerances in time
    #[error(
        "Solver did not converge in {iterations} iterations (primal residual {primal_residual:.3e}, dual residual {dual_residual:.3e})"
    )]
    MaxIterations {
        /// Iterations run
        iterations: usize,
        /// Final primal residual
        primal_residual: f64,
        /// Final dual residual
        dual_residual: f64,
    },

    /// Factorization hit a non-positive pivot
    #[error("KKT matrix is not positive definite (pivot {pivot})")]
    NotPositiveDefinite {
        /// Index of the failing pivot
        pivot: usize,
    },

    /// Problem data have inconsistent shapes or bounds
    #[error("Dimension mismatch: {0}")]
    DimensionMismatch(String),

    /// Invalid solver settings
    #[error("Invalid solver settings: {0}")]
    InvalidSettings(String),
}

/// Quadratic program `min ½xᵀPx + qᵀx  s.t.  l ≤ Ax ≤ u`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuadraticProgram {
    p: Array2<f64>,
    q: Array1<f64>,
    a: Array2<f64>,
    l: Array1<f64>,
    u: Array1<f64>,
}

impl QuadraticProgram {
    /// Validate shapes and bounds.
    ///
    /// `p` must be symmetric positive semidefinite; only its shape and
    /// finiteness are checked here, definiteness surfaces at factorization.
    pub fn new(
        p: Array2<f64>,
        q: Array1<f64>,
        a: Array2<f64>,
        l: Array1<f64>,
        u: Array1<f64>,
    ) -> Result<Self, SolverError> {
        let n = q.len();
        let m = a.nrows();
        if p.dim() != (n, n) {
            return Err(SolverError::DimensionMismatch(format!(
                "P is {:?}, expected ({n}, {n})",
                p.dim()
            )));
        }
        if a.ncols() != n {
            return Err(SolverError::DimensionMismatch(format!(
                "A has {} columns, expected {n}",
                a.ncols()
            )));
        }
        if l.len() != m || u.len() != m {
            return Err(SolverError::DimensionMismatch(format!(
                "bounds have lengths {} and {}, expected {m}",
                l.len(),
                u.len()
            )));
        }
        if p.iter().chain(q.iter()).chain(a.iter()).any(|v| !v.is_finite()) {
            return Err(SolverError::DimensionMismatch(
                "P, q and A must be finite".to_string(),
            ));
        }
        for (i, (lo, hi)) in l.iter().zip(u.iter()).enumerate() {
            if lo.is_nan() || hi.is_nan() || *lo == f64::INFINITY || *hi == f64::NEG_INFINITY {
                return Err(SolverError::DimensionMismatch(format!(
                    "row {i} has invalid bounds [{lo}, {hi}]"
                )));
            }
            if lo > hi {
                return Err(SolverError::PrimalInfeasible { iterations: 0 });
            }
        }
        Ok(Self { p, q, a, l, u })
    }

    /// Quadratic cost matrix `P`.
    pub const fn p(&self) -> &Array2<f64> {
        &self.p
    }

    /// Linear cost `q`.
    pub const fn q(&self) -> &Array1<f64> {
        &self.q
    }

    /// Constraint matrix `A`.
    pub const fn a(&self) -> &Array2<f64> {
        &self.a
    }

    /// Lower row bounds.
    pub const fn lower(&self) -> &Array1<f64> {
        &self.l
    }

    /// Upper row bounds.
    pub const fn upper(&self) -> &Array1<f64> {
        &self.u
    }

    /// Number of decision variables.
    pub fn n_variables(&self) -> usize {
        self.q.len()
    }

    /// Number of constraint rows.
    pub fn n_constraints(&self) -> usize {
        self.a.nrows()
    }

    /// Objective value at `x`.
    pub fn objective(&self, x: &Array1<f64>) -> f64 {
        0.5 * x.dot(&self.p.dot(x)) + self.q.dot(x)
    }
}

/// A converged solution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QpSolution {
    /// Primal solution
    pub x: Array1<f64>,
    /// Constraint multipliers
    pub y: Array1<f64>,
    /// Objective value at `x`
    pub objective: f64,
    /// Iterations used
    pub iterations: usize,
    /// Final `‖Ax − z‖∞`
    pub primal_residual: f64,
    /// Final `‖Px + q + Aᵀy‖∞`
    pub dual_residual: f64,
}

/// A backend able to solve convex quadratic programs.
pub trait ConvexSolver {
    /// Solve `qp`, or explain why no solution is returned.
    fn solve(&self, qp: &QuadraticProgram) -> Result<QpSolution, SolverError>;
}
