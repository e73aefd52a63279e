//! Operator-splitting QP backend
//!
//! Solves the program by ADMM on the splitting `z = Ax`, in the form used by
//! OSQP: each iteration solves one linear system with the fixed matrix
//! `P + σI + Aᵀ diag(ρ) A`, over-relaxes the result, projects `z` onto the
//! box `[l, u]` and takes a dual step. Equality rows carry a stiffer `ρ`.
//! The step size is rescaled from the ratio of the normalized residuals, and
//! the iteration stops on convergence or on a primal or dual infeasibility
//! certificate built from successive iterate differences.

use super::linalg::{Cholesky, inf_norm};
use super::{ConvexSolver, QpSolution, QuadraticProgram, SolverError};
use ndarray::{Array1, Array2, Axis, Zip};
use serde::{Deserialize, Serialize};

const RHO_MIN: f64 = 1e-6;
const RHO_MAX: f64 = 1e6;
const RHO_EQUALITY_SCALE: f64 = 1e3;
const EQUALITY_TOLERANCE: f64 = 1e-9;
const DIVISION_GUARD: f64 = 1e-30;
const CERTIFICATE_FLOOR: f64 = 1e-12;

/// ADMM solver settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverSettings {
    /// Iteration cap (default: 100000)
    pub max_iterations: usize,
    /// Absolute convergence tolerance (default: 1e-8)
    pub eps_abs: f64,
    /// Relative convergence tolerance (default: 1e-8)
    pub eps_rel: f64,
    /// Tolerance of the infeasibility certificates (default: 1e-6)
    pub eps_infeasible: f64,
    /// Initial step size ρ (default: 0.1)
    pub rho: f64,
    /// Proximal regularization σ (default: 1e-6)
    pub sigma: f64,
    /// Over-relaxation α in (0, 2) (default: 1.6)
    pub alpha: f64,
    /// Iterations between step-size updates, zero disables them (default: 25)
    pub adaptive_rho_interval: usize,
}

impl Default for SolverSettings {
    fn default() -> Self {
        Self {
            max_iterations: 100_000,
            eps_abs: 1e-8,
            eps_rel: 1e-8,
            eps_infeasible: 1e-6,
            rho: 0.1,
            sigma: 1e-6,
            alpha: 1.6,
            adaptive_rho_interval: 25,
        }
    }
}

impl SolverSettings {
    fn validate(&self) -> Result<(), SolverError> {
        if self.max_iterations == 0 {
            return Err(SolverError::InvalidSettings(
                "max_iterations must be positive".to_string(),
            ));
        }
        if !(self.rho > 0.0 && self.rho.is_finite()) {
            return Err(SolverError::InvalidSettings(format!(
                "rho must be positive, got {}",
                self.rho
            )));
        }
        if !(self.sigma > 0.0 && self.sigma.is_finite()) {
            return Err(SolverError::InvalidSettings(format!(
                "sigma must be positive, got {}",
                self.sigma
            )));
        }
        if !(self.alpha > 0.0 && self.alpha < 2.0) {
            return Err(SolverError::InvalidSettings(format!(
                "alpha must lie in (0, 2), got {}",
                self.alpha
            )));
        }
        for (name, eps) in [
            ("eps_abs", self.eps_abs),
            ("eps_rel", self.eps_rel),
            ("eps_infeasible", self.eps_infeasible),
        ] {
            if !(eps >= 0.0 && eps.is_finite()) {
                return Err(SolverError::InvalidSettings(format!(
                    "{name} must be non-negative, got {eps}"
                )));
            }
        }
        Ok(())
    }
}

/// ADMM backend for [`ConvexSolver`].
#[derive(Debug, Clone, Default)]
pub struct AdmmSolver {
    settings: SolverSettings,
}

impl AdmmSolver {
    /// Create a solver, rejecting invalid settings.
    pub fn new(settings: SolverSettings) -> Result<Self, SolverError> {
        settings.validate()?;
        Ok(Self { settings })
    }

    /// Active settings.
    pub const fn settings(&self) -> &SolverSettings {
        &self.settings
    }

    /// Per-row step sizes.
    fn row_rho(&self, qp: &QuadraticProgram, rho: f64) -> Array1<f64> {
        Zip::from(qp.lower())
            .and(qp.upper())
            .map_collect(|&lo, &hi| {
                if lo == f64::NEG_INFINITY && hi == f64::INFINITY {
                    RHO_MIN
                } else if hi - lo < EQUALITY_TOLERANCE {
                    RHO_EQUALITY_SCALE * rho
                } else {
                    rho
                }
            })
    }

    /// Factor `P + σI + Aᵀ diag(ρ) A`.
    fn factor(&self, qp: &QuadraticProgram, rho: &Array1<f64>) -> Result<Cholesky, SolverError> {
        let a = qp.a();
        let scaled = a * &rho.view().insert_axis(Axis(1));
        let mut kkt: Array2<f64> = qp.p() + &a.t().dot(&scaled);
        kkt.diag_mut().mapv_inplace(|v| v + self.settings.sigma);
        Cholesky::factor(&kkt)
    }

    /// `Aᵀδy ≈ 0` with `u·δy⁺ + l·δy⁻ < 0` proves the rows cannot all hold.
    fn primal_infeasible(&self, qp: &QuadraticProgram, delta_y: &Array1<f64>) -> bool {
        let norm = inf_norm(delta_y);
        if norm <= CERTIFICATE_FLOOR {
            return false;
        }
        let eps = self.settings.eps_infeasible * norm;

        let mut support = 0.0;
        for ((&dy, &lo), &hi) in delta_y.iter().zip(qp.lower()).zip(qp.upper()) {
            if dy > 0.0 {
                if hi == f64::INFINITY {
                    return false;
                }
                support += hi * dy;
            } else if dy < 0.0 {
                if lo == f64::NEG_INFINITY {
                    return false;
                }
                support += lo * dy;
            }
        }
        support <= -eps && inf_norm(&qp.a().t().dot(delta_y)) <= eps
    }

    /// A feasible descent direction `δx` with `Pδx ≈ 0` and `qᵀδx < 0`.
    fn dual_infeasible(&self, qp: &QuadraticProgram, delta_x: &Array1<f64>) -> bool {
        let norm = inf_norm(delta_x);
        if norm <= CERTIFICATE_FLOOR {
            return false;
        }
        let eps = self.settings.eps_infeasible * norm;
        if inf_norm(&qp.p().dot(delta_x)) > eps || qp.q().dot(delta_x) > -eps {
            return false;
        }
        let a_dx = qp.a().dot(delta_x);
        a_dx.iter()
            .zip(qp.lower())
            .zip(qp.upper())
            .all(|((&v, &lo), &hi)| {
                let above = lo == f64::NEG_INFINITY || v >= -eps;
                let below = hi == f64::INFINITY || v <= eps;
                above && below
            })
    }
}

impl ConvexSolver for AdmmSolver {
    fn solve(&self, qp: &QuadraticProgram) -> Result<QpSolution, SolverError> {
        let settings = &self.settings;
        let n = qp.n_variables();
        let m = qp.n_constraints();
        let (a, p, q) = (qp.a(), qp.p(), qp.q());
        let alpha = settings.alpha;
        let q_norm = inf_norm(q);

        let mut rho = settings.rho;
        let mut rho_rows = self.row_rho(qp, rho);
        let mut chol = self.factor(qp, &rho_rows)?;

        let mut x = Array1::<f64>::zeros(n);
        let mut z = Array1::<f64>::zeros(m);
        let mut y = Array1::<f64>::zeros(m);
        let mut primal_residual = f64::INFINITY;
        let mut dual_residual = f64::INFINITY;

        for iteration in 1..=settings.max_iterations {
            let rhs = &x * settings.sigma - q + a.t().dot(&(&rho_rows * &z - &y));
            let x_tilde = chol.solve(&rhs);
            let z_tilde = a.dot(&x_tilde);

            let x_next = &x_tilde * alpha + &x * (1.0 - alpha);
            let z_relaxed = &z_tilde * alpha + &z * (1.0 - alpha);
            let z_next = Zip::from(&z_relaxed)
                .and(&y)
                .and(&rho_rows)
                .and(qp.lower())
                .and(qp.upper())
                .map_collect(|&zr, &yi, &r, &lo, &hi| (zr + yi / r).max(lo).min(hi));
            let y_next = &y + &(&rho_rows * &(&z_relaxed - &z_next));

            let delta_x = &x_next - &x;
            let delta_y = &y_next - &y;
            x = x_next;
            z = z_next;
            y = y_next;

            let ax = a.dot(&x);
            let px = p.dot(&x);
            let aty = a.t().dot(&y);
            primal_residual = inf_norm(&(&ax - &z));
            dual_residual = inf_norm(&(&px + q + &aty));

            let primal_scale = inf_norm(&ax).max(inf_norm(&z));
            let dual_scale = inf_norm(&px).max(inf_norm(&aty)).max(q_norm);
            let eps_primal = settings.eps_abs + settings.eps_rel * primal_scale;
            let eps_dual = settings.eps_abs + settings.eps_rel * dual_scale;

            if primal_residual <= eps_primal && dual_residual <= eps_dual {
                tracing::debug!(
                    iterations = iteration,
                    primal_residual,
                    dual_residual,
                    rho,
                    "ADMM converged"
                );
                return Ok(QpSolution {
                    objective: qp.objective(&x),
                    x,
                    y,
                    iterations: iteration,
                    primal_residual,
                    dual_residual,
                });
            }

            if self.primal_infeasible(qp, &delta_y) {
                tracing::debug!(iterations = iteration, "primal infeasibility certificate");
                return Err(SolverError::PrimalInfeasible {
                    iterations: iteration,
                });
            }
            if self.dual_infeasible(qp, &delta_x) {
                tracing::debug!(iterations = iteration, "dual infeasibility certificate");
                return Err(SolverError::DualInfeasible {
                    iterations: iteration,
                });
            }

            if settings.adaptive_rho_interval > 0 && iteration % settings.adaptive_rho_interval == 0 {
                let primal_ratio = primal_residual / (primal_scale + DIVISION_GUARD);
                let dual_ratio = dual_residual / (dual_scale + DIVISION_GUARD);
                let candidate = (rho * (primal_ratio / (dual_ratio + DIVISION_GUARD)).sqrt())
                    .clamp(RHO_MIN, RHO_MAX);
                if candidate > 5.0 * rho || candidate < 0.2 * rho {
                    tracing::trace!(iteration, from = rho, to = candidate, "updating rho");
                    rho = candidate;
                    rho_rows = self.row_rho(qp, rho);
                    chol = self.factor(qp, &rho_rows)?;
                }
            }
        }

        tracing::warn!(
            iterations = settings.max_iterations,
            primal_residual,
            dual_residual,
            "ADMM hit the iteration limit"
        );
        Err(SolverError::MaxIterations {
            iterations: settings.max_iterations,
            primal_residual,
            dual_residual,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;
    use rstest::rstest;

    fn qp(
        p: Array2<f64>,
        q: Array1<f64>,
        a: Array2<f64>,
        l: Array1<f64>,
        u: Array1<f64>,
    ) -> QuadraticProgram {
        QuadraticProgram::new(p, q, a, l, u).unwrap()
    }

    #[test]
    fn test_unconstrained_minimum() {
        // min (x - 1)² + (y + 2)²
        let problem = qp(
            Array2::eye(2) * 2.0,
            array![-2.0, 4.0],
            Array2::zeros((0, 2)),
            Array1::zeros(0),
            Array1::zeros(0),
        );
        let sol = AdmmSolver::default().solve(&problem).unwrap();
        assert_abs_diff_eq!(sol.x[0], 1.0, epsilon = 1e-6);
        assert_abs_diff_eq!(sol.x[1], -2.0, epsilon = 1e-6);
        assert_abs_diff_eq!(sol.objective, -5.0, epsilon = 1e-6);
    }

    #[test]
    fn test_equality_and_box() {
        // min x² + y² s.t. x + y = 1, 0.7 ≤ x ≤ 1
        let problem = qp(
            Array2::eye(2) * 2.0,
            array![0.0, 0.0],
            array![[1.0, 1.0], [1.0, 0.0]],
            array![1.0, 0.7],
            array![1.0, 1.0],
        );
        let sol = AdmmSolver::default().solve(&problem).unwrap();
        assert_abs_diff_eq!(sol.x[0], 0.7, epsilon = 1e-6);
        assert_abs_diff_eq!(sol.x[1], 0.3, epsilon = 1e-6);
        assert!(sol.iterations > 0);
        assert!(sol.primal_residual < 1e-6);
    }

    #[test]
    fn test_detects_primal_infeasibility() {
        // x + y = 1 with both variables in [0, 0.4]
        let problem = qp(
            Array2::eye(2),
            array![0.0, 0.0],
            array![[1.0, 1.0], [1.0, 0.0], [0.0, 1.0]],
            array![1.0, 0.0, 0.0],
            array![1.0, 0.4, 0.4],
        );
        assert!(matches!(
            AdmmSolver::default().solve(&problem),
            Err(SolverError::PrimalInfeasible { .. })
        ));
    }

    #[test]
    fn test_detects_dual_infeasibility() {
        // min -x s.t. x ≥ 0 is unbounded
        let problem = qp(
            Array2::zeros((1, 1)),
            array![-1.0],
            array![[1.0]],
            array![0.0],
            array![f64::INFINITY],
        );
        assert!(matches!(
            AdmmSolver::default().solve(&problem),
            Err(SolverError::DualInfeasible { .. })
        ));
    }

    #[test]
    fn test_iteration_limit() {
        let settings = SolverSettings {
            max_iterations: 2,
            ..Default::default()
        };
        let problem = qp(
            array![[4.0, 1.0], [1.0, 2.0]],
            array![1.0, 1.0],
            array![[1.0, 1.0], [1.0, 0.0], [0.0, 1.0]],
            array![1.0, 0.0, 0.0],
            array![1.0, 0.7, 0.7],
        );
        assert!(matches!(
            AdmmSolver::new(settings).unwrap().solve(&problem),
            Err(SolverError::MaxIterations { iterations: 2, .. })
        ));
    }

    #[rstest]
    #[case::zero_rho(SolverSettings { rho: 0.0, ..Default::default() })]
    #[case::negative_sigma(SolverSettings { sigma: -1.0, ..Default::default() })]
    #[case::alpha_two(SolverSettings { alpha: 2.0, ..Default::default() })]
    #[case::no_iterations(SolverSettings { max_iterations: 0, ..Default::default() })]
    #[case::nan_tolerance(SolverSettings { eps_abs: f64::NAN, ..Default::default() })]
    fn test_rejects_invalid_settings(#[case] settings: SolverSettings) {
        assert!(matches!(
            AdmmSolver::new(settings),
            Err(SolverError::InvalidSettings(_))
        ));
    }

    #[test]
    fn test_markowitz_with_return_floor() {
        // Four-asset frontier point: minimum variance with μᵀw ≥ 0.09.
        let sigma = array![
            [0.04, 0.01, 0.00, -0.01],
            [0.01, 0.03, 0.00, 0.00],
            [0.00, 0.00, 0.02, 0.00],
            [-0.01, 0.00, 0.00, 0.01]
        ];
        let mu = array![0.12, 0.10, 0.07, 0.05];
        let mut a = Array2::zeros((6, 4));
        a.row_mut(0).fill(1.0);
        a.row_mut(1).assign(&mu);
        for i in 0..4 {
            a[[i + 2, i]] = 1.0;
        }
        let l = array![1.0, 0.09, 0.0, 0.0, 0.0, 0.0];
        let u = array![1.0, f64::INFINITY, 1.0, 1.0, 1.0, 1.0];
        let problem = qp(&sigma * 2.0, Array1::zeros(4), a, l, u);
        let sol = AdmmSolver::default().solve(&problem).unwrap();

        assert_abs_diff_eq!(sol.x.sum(), 1.0, epsilon = 1e-6);
        assert!(mu.dot(&sol.x) >= 0.09 - 1e-6);
        assert!(sol.x.iter().all(|&w| w >= -1e-6));
    }
}
