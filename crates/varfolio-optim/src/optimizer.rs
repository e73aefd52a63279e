//! Mean-variance portfolio optimizer
//!
//! A [`PortfolioOptimizer`] is configured with expected returns, a covariance
//! matrix and any number of constraints, then consumed by exactly one
//! objective. The objective returns an [`OptimizationResult`] whose weights
//! can be cleaned into a [`PortfolioWeights`].
//!
//! Every objective is posed as a convex quadratic program over the weights:
//!
//! - minimum volatility: `min wᵀ(Σ + γI)w` with `Σw = 1`, bounds and constraints
//! - efficient return: the same with the extra row `μᵀw ≥ target`
//! - efficient risk: the frontier family `min wᵀ(Σ + γI)w − tμᵀw`, bisected on
//!   the risk aversion `t` until the volatility meets the target
//! - maximum Sharpe: homogenized variables `y = κw` with `(μ − r_f)ᵀy = 1`,
//!   `Σy = κ`, and every constraint scaled by `κ`, so the ratio becomes a
//!   variance minimization

use crate::constraints::{Bounds, ConstraintRow, LinearConstraint, SectorConstraints};
use crate::error::{OptimizerError, Result};
use crate::solver::{AdmmSolver, ConvexSolver, QuadraticProgram, SolverError};
use crate::weights::{CleanConfig, PortfolioWeights};
use ndarray::{Array1, Array2, s};
use serde::{Deserialize, Serialize};
use varfolio_risk::{CovarianceMatrix, ExpectedReturnVector};

const FEASIBILITY_TOLERANCE: f64 = 1e-9;
const SYMMETRY_TOLERANCE: f64 = 1e-10;
const PSD_TOLERANCE: f64 = 1e-8;
const MIN_SHARPE_VOLATILITY: f64 = 1e-6;
const RISK_TOLERANCE: f64 = 1e-7;
const RISK_AVERSION_START: f64 = 0.01;
const RISK_AVERSION_MAX: f64 = 1e4;
const SATURATION_TOLERANCE: f64 = 1e-7;
const BISECTION_STEPS: usize = 100;
const CONSTRAINT_SLACK: f64 = 1e-6;
const RETURN_TOLERANCE: f64 = 1e-6;

/// The objective a result was solved for
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Objective {
    /// Global minimum volatility
    MinVolatility,
    /// Tangency portfolio
    MaxSharpe {
        /// Annual risk-free rate
        risk_free_rate: f64,
    },
    /// Highest return at a volatility ceiling
    EfficientRisk {
        /// Annual volatility ceiling
        target_volatility: f64,
    },
    /// Lowest volatility at a return floor
    EfficientReturn {
        /// Annual return floor
        target_return: f64,
    },
}

/// Expected return, volatility and Sharpe ratio of a weight vector
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Performance {
    /// Annual expected return `wᵀμ`
    pub expected_return: f64,
    /// Annual volatility `√(wᵀΣw)`
    pub volatility: f64,
    /// `(wᵀμ − r_f) / σ`, zero when the volatility is zero
    pub sharpe_ratio: f64,
}

impl Performance {
    fn compute(
        expected_returns: &Array1<f64>,
        covariance: &Array2<f64>,
        weights: &Array1<f64>,
        risk_free_rate: f64,
    ) -> Self {
        let expected_return = weights.dot(expected_returns);
        let volatility = weights.dot(&covariance.dot(weights)).max(0.0).sqrt();
        let sharpe_ratio = if volatility > 0.0 {
            (expected_return - risk_free_rate) / volatility
        } else {
            0.0
        };
        Self {
            expected_return,
            volatility,
            sharpe_ratio,
        }
    }
}

/// Solved portfolio together with the inputs it was solved on
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationResult {
    objective: Objective,
    weights: PortfolioWeights,
    expected_returns: ExpectedReturnVector,
    covariance: CovarianceMatrix,
    iterations: usize,
}

impl OptimizationResult {
    /// Objective that produced the weights.
    pub const fn objective(&self) -> Objective {
        self.objective
    }

    /// Raw solver weights.
    pub const fn weights(&self) -> &PortfolioWeights {
        &self.weights
    }

    /// Consume into the raw weights.
    pub fn into_weights(self) -> PortfolioWeights {
        self.weights
    }

    /// Total solver iterations across every solve the objective needed.
    pub const fn iterations(&self) -> usize {
        self.iterations
    }

    /// Zero out tiny positions and renormalize.
    pub fn clean_weights(&self, config: &CleanConfig) -> Result<PortfolioWeights> {
        self.weights.clean(config)
    }

    /// Performance of the raw weights.
    pub fn performance(&self, risk_free_rate: f64) -> Performance {
        Performance::compute(
            self.expected_returns.values(),
            self.covariance.values(),
            self.weights.values(),
            risk_free_rate,
        )
    }

    /// Performance of other weights over the same assets, e.g. cleaned ones.
    pub fn evaluate(&self, weights: &PortfolioWeights, risk_free_rate: f64) -> Result<Performance> {
        if weights.assets() != self.weights.assets() {
            return Err(OptimizerError::DimensionMismatch(
                "weights must follow the optimizer's asset order".to_string(),
            ));
        }
        Ok(Performance::compute(
            self.expected_returns.values(),
            self.covariance.values(),
            weights.values(),
            risk_free_rate,
        ))
    }
}

/// Constraint rows and bounds of a quadratic program under construction.
#[derive(Debug, Default)]
struct RowSet {
    coefficients: Vec<Array1<f64>>,
    lower: Vec<f64>,
    upper: Vec<f64>,
}

impl RowSet {
    fn push(&mut self, coefficients: Array1<f64>, lower: f64, upper: f64) {
        self.coefficients.push(coefficients);
        self.lower.push(lower);
        self.upper.push(upper);
    }

    fn unit(n: usize, index: usize) -> Array1<f64> {
        let mut row = Array1::zeros(n);
        row[index] = 1.0;
        row
    }

    fn into_program(
        self,
        p: Array2<f64>,
        q: Array1<f64>,
    ) -> std::result::Result<QuadraticProgram, SolverError> {
        let n = q.len();
        let mut a = Array2::zeros((self.coefficients.len(), n));
        for (mut row, coefficients) in a.rows_mut().into_iter().zip(&self.coefficients) {
            row.assign(coefficients);
        }
        QuadraticProgram::new(p, q, a, Array1::from(self.lower), Array1::from(self.upper))
    }
}

/// Constrained mean-variance optimizer over a fixed asset universe
#[derive(Debug, Clone)]
pub struct PortfolioOptimizer<S = AdmmSolver> {
    expected_returns: ExpectedReturnVector,
    covariance: CovarianceMatrix,
    bounds: Vec<Bounds>,
    rows: Vec<ConstraintRow>,
    l2_gamma: f64,
    solver: S,
}

impl PortfolioOptimizer<AdmmSolver> {
    /// Create an optimizer with long-only `[0, 1]` bounds and the ADMM backend.
    ///
    /// The covariance is reordered to the expected-return asset order. It
    /// must cover the same assets, be symmetric and positive semidefinite.
    pub fn new(
        expected_returns: ExpectedReturnVector,
        covariance: CovarianceMatrix,
    ) -> Result<Self> {
        if expected_returns.is_empty() {
            return Err(OptimizerError::InvalidParameter(
                "at least one asset is required".to_string(),
            ));
        }
        if expected_returns.len() != covariance.n_assets() {
            return Err(OptimizerError::DimensionMismatch(format!(
                "{} expected returns but a {}x{} covariance matrix",
                expected_returns.len(),
                covariance.n_assets(),
                covariance.n_assets()
            )));
        }
        if let Some(missing) = expected_returns
            .assets()
            .iter()
            .find(|a| covariance.index_of(a).is_none())
        {
            return Err(OptimizerError::DimensionMismatch(format!(
                "asset {missing} has an expected return but no covariance"
            )));
        }
        if expected_returns.values().iter().any(|v| !v.is_finite()) {
            return Err(OptimizerError::InvalidParameter(
                "expected returns must be finite".to_string(),
            ));
        }

        let covariance = covariance.reorder(expected_returns.assets())?;
        validate_covariance(&covariance)?;

        let n = expected_returns.len();
        Ok(Self {
            expected_returns,
            covariance,
            bounds: vec![Bounds::default(); n],
            rows: Vec::new(),
            l2_gamma: 0.0,
            solver: AdmmSolver::default(),
        })
    }
}

fn validate_covariance(covariance: &CovarianceMatrix) -> Result<()> {
    let scale = covariance
        .values()
        .iter()
        .fold(0.0_f64, |acc, v| acc.max(v.abs()));
    if !covariance.is_symmetric(SYMMETRY_TOLERANCE * scale.max(1.0)) {
        return Err(OptimizerError::SingularCovariance(
            "covariance matrix is not symmetric".to_string(),
        ));
    }
    if !covariance.is_positive_semidefinite(PSD_TOLERANCE) {
        return Err(OptimizerError::SingularCovariance(
            "covariance matrix is not positive semidefinite".to_string(),
        ));
    }
    Ok(())
}

impl<S: ConvexSolver> PortfolioOptimizer<S> {
    /// Asset labels in solve order.
    pub fn assets(&self) -> &[String] {
        self.expected_returns.assets()
    }

    /// Expected returns.
    pub const fn expected_returns(&self) -> &ExpectedReturnVector {
        &self.expected_returns
    }

    /// Covariance, reordered to the asset order.
    pub const fn covariance(&self) -> &CovarianceMatrix {
        &self.covariance
    }

    /// Per-asset bounds in asset order.
    pub fn bounds(&self) -> &[Bounds] {
        &self.bounds
    }

    /// Apply the same bounds to every asset.
    pub fn with_bounds(mut self, bounds: Bounds) -> Self {
        self.bounds.fill(bounds);
        self
    }

    /// Override the bounds of one asset.
    pub fn with_asset_bounds(mut self, asset: &str, bounds: Bounds) -> Result<Self> {
        let idx = self
            .covariance
            .index_of(asset)
            .ok_or_else(|| OptimizerError::UnknownAsset(asset.to_string()))?;
        self.bounds[idx] = bounds;
        Ok(self)
    }

    /// Add sector exposure limits.
    pub fn add_sector_constraints(mut self, sectors: &SectorConstraints) -> Result<Self> {
        let unmapped = sectors
            .mapper
            .keys()
            .filter(|a| self.covariance.index_of(a).is_none())
            .count();
        if unmapped > 0 {
            tracing::debug!(unmapped, "sector map lists assets outside the universe");
        }
        let rows = sectors.rows(self.expected_returns.assets())?;
        self.rows.extend(rows);
        Ok(self)
    }

    /// Add a linear constraint on the weights.
    pub fn add_constraint(mut self, constraint: &LinearConstraint) -> Result<Self> {
        let row = constraint.row(self.expected_returns.assets())?;
        self.rows.push(row);
        Ok(self)
    }

    /// Add `γ‖w‖²` to the objective. Zero disables it.
    pub fn with_l2_regularization(mut self, gamma: f64) -> Result<Self> {
        if !(gamma >= 0.0 && gamma.is_finite()) {
            return Err(OptimizerError::InvalidParameter(format!(
                "L2 regularization must be non-negative, got {gamma}"
            )));
        }
        self.l2_gamma = gamma;
        Ok(self)
    }

    /// Swap the solver backend.
    pub fn with_solver<T: ConvexSolver>(self, solver: T) -> PortfolioOptimizer<T> {
        PortfolioOptimizer {
            expected_returns: self.expected_returns,
            covariance: self.covariance,
            bounds: self.bounds,
            rows: self.rows,
            l2_gamma: self.l2_gamma,
            solver,
        }
    }

    /// Solve for any objective.
    pub fn optimize(self, objective: Objective) -> Result<OptimizationResult> {
        match objective {
            Objective::MinVolatility => self.min_volatility(),
            Objective::MaxSharpe { risk_free_rate } => self.max_sharpe(risk_free_rate),
            Objective::EfficientRisk { target_volatility } => self.efficient_risk(target_volatility),
            Objective::EfficientReturn { target_return } => self.efficient_return(target_return),
        }
    }

    /// Minimize portfolio volatility.
    pub fn min_volatility(self) -> Result<OptimizationResult> {
        self.check_feasibility()?;
        let (weights, iterations) = self
            .solve_weights(None, 0.0)
            .map_err(OptimizerError::from_solver)?;
        self.finish(Objective::MinVolatility, weights, iterations)
    }

    /// Minimize volatility subject to `μᵀw ≥ target_return`.
    pub fn efficient_return(self, target_return: f64) -> Result<OptimizationResult> {
        if !target_return.is_finite() {
            return Err(OptimizerError::InvalidParameter(format!(
                "target return must be finite, got {target_return}"
            )));
        }
        let objective = Objective::EfficientReturn { target_return };
        self.check_feasibility()?;

        let (base, base_iterations) = self
            .solve_weights(None, 0.0)
            .map_err(OptimizerError::from_solver)?;
        if base.dot(self.expected_returns.values()) >= target_return {
            return self.finish(objective, base, base_iterations);
        }

        let above_top = || {
            OptimizerError::InfeasibleTarget(format!(
                "target return {target_return} exceeds the highest return reachable under the constraints"
            ))
        };
        match self.solve_weights(Some(target_return), 0.0) {
            Ok((weights, iterations)) => self.finish(objective, weights, base_iterations + iterations),
            Err(SolverError::PrimalInfeasible { .. }) => Err(above_top()),
            Err(err) => {
                // A floor at the frontier's top stalls the solver instead of
                // certifying infeasibility.
                let top = self
                    .max_return_weights()
                    .map_err(OptimizerError::from_solver)?;
                let max_return = top.dot(self.expected_returns.values());
                if target_return >= max_return - RETURN_TOLERANCE {
                    tracing::debug!(target_return, max_return, "return floor at the frontier top");
                    Err(above_top())
                } else {
                    Err(OptimizerError::from_solver(err))
                }
            }
        }
    }

    /// Maximize expected return subject to `√(wᵀΣw) ≤ target_volatility`.
    pub fn efficient_risk(self, target_volatility: f64) -> Result<OptimizationResult> {
        if !(target_volatility > 0.0 && target_volatility.is_finite()) {
            return Err(OptimizerError::InvalidParameter(format!(
                "target volatility must be positive, got {target_volatility}"
            )));
        }
        let objective = Objective::EfficientRisk { target_volatility };
        self.check_feasibility()?;

        let (min_vol_weights, mut iterations) = self
            .solve_weights(None, 0.0)
            .map_err(OptimizerError::from_solver)?;
        let min_vol = self.volatility(&min_vol_weights);
        if min_vol > target_volatility + RISK_TOLERANCE {
            return Err(OptimizerError::InfeasibleTarget(format!(
                "target volatility {target_volatility} is below the minimum volatility {min_vol:.6}"
            )));
        }
        if min_vol >= target_volatility - RISK_TOLERANCE {
            return self.finish(objective, min_vol_weights, iterations);
        }

        // Grow the risk aversion until the frontier crosses the target.
        let mut low = (0.0, min_vol_weights);
        let mut aversion = RISK_AVERSION_START;
        let high = loop {
            let (weights, used) = self
                .solve_weights(None, aversion)
                .map_err(OptimizerError::from_solver)?;
            iterations += used;
            if self.volatility(&weights) > target_volatility {
                break aversion;
            }
            let saturated = max_abs_diff(&weights, &low.1) <= SATURATION_TOLERANCE;
            low = (aversion, weights);
            if saturated || aversion >= RISK_AVERSION_MAX {
                tracing::debug!(
                    aversion,
                    "target volatility is above the highest-return frontier portfolio"
                );
                return self.finish(objective, low.1, iterations);
            }
            aversion *= 2.0;
        };

        let (mut low_aversion, mut low_weights) = low;
        let mut high_aversion = high;
        for step in 0..BISECTION_STEPS {
            let mid = 0.5 * (low_aversion + high_aversion);
            let (weights, used) = self
                .solve_weights(None, mid)
                .map_err(OptimizerError::from_solver)?;
            iterations += used;
            let vol = self.volatility(&weights);
            tracing::trace!(step, aversion = mid, volatility = vol, "efficient risk bisection");
            if (vol - target_volatility).abs() <= RISK_TOLERANCE {
                return self.finish(objective, weights, iterations);
            }
            if vol > target_volatility {
                high_aversion = mid;
            } else {
                low_aversion = mid;
                low_weights = weights;
            }
            if high_aversion - low_aversion <= f64::EPSILON * high_aversion {
                break;
            }
        }
        self.finish(objective, low_weights, iterations)
    }

    /// Maximize the Sharpe ratio `(μᵀw − r_f) / √(wᵀΣw)`.
    pub fn max_sharpe(self, risk_free_rate: f64) -> Result<OptimizationResult> {
        if !risk_free_rate.is_finite() {
            return Err(OptimizerError::InvalidParameter(format!(
                "risk-free rate must be finite, got {risk_free_rate}"
            )));
        }
        self.check_feasibility()?;
        if !self
            .expected_returns
            .values()
            .iter()
            .any(|&m| m > risk_free_rate)
        {
            return Err(OptimizerError::InfeasibleTarget(format!(
                "no asset has an expected return above the risk-free rate {risk_free_rate}"
            )));
        }

        let n = self.expected_returns.len();
        let program = self.sharpe_program(risk_free_rate)?;
        let solution = match self.solver.solve(&program) {
            Ok(solution) => solution,
            Err(SolverError::PrimalInfeasible { .. }) => {
                // Separate infeasible constraints from a set with no excess return.
                return Err(match self.solve_weights(None, 0.0) {
                    Ok(_) => OptimizerError::InfeasibleTarget(format!(
                        "no feasible portfolio earns more than the risk-free rate {risk_free_rate}"
                    )),
                    Err(err) => OptimizerError::from_solver(err),
                });
            }
            Err(err) => return Err(OptimizerError::from_solver(err)),
        };

        let scaled = solution.x.slice(s![..n]).to_owned();
        let kappa = scaled.sum();
        if !(kappa > 0.0 && kappa.is_finite()) {
            return Err(OptimizerError::SingularCovariance(
                "Sharpe reformulation returned a degenerate scale".to_string(),
            ));
        }
        let weights = self.clamp_to_bounds(scaled / kappa);
        if self.volatility(&weights) < MIN_SHARPE_VOLATILITY {
            return Err(OptimizerError::SingularCovariance(
                "a riskless portfolio beats the risk-free rate, the Sharpe ratio is unbounded"
                    .to_string(),
            ));
        }
        self.finish(
            Objective::MaxSharpe { risk_free_rate },
            weights,
            solution.iterations,
        )
    }

    /// Reject constraint sets that no weight vector can satisfy.
    fn check_feasibility(&self) -> Result<()> {
        let tol = FEASIBILITY_TOLERANCE;
        for (asset, b) in self.assets().iter().zip(&self.bounds) {
            if b.lower > b.upper + tol {
                return Err(OptimizerError::InfeasibleConstraint(format!(
                    "bounds of {asset} are crossed: [{}, {}]",
                    b.lower, b.upper
                )));
            }
        }
        let lower_sum: f64 = self.bounds.iter().map(|b| b.lower).sum();
        let upper_sum: f64 = self.bounds.iter().map(|b| b.upper).sum();
        if lower_sum > 1.0 + tol {
            return Err(OptimizerError::InfeasibleConstraint(format!(
                "lower bounds sum to {lower_sum}, above 1"
            )));
        }
        if upper_sum < 1.0 - tol {
            return Err(OptimizerError::InfeasibleConstraint(format!(
                "upper bounds sum to {upper_sum}, below 1"
            )));
        }
        for row in &self.rows {
            let (reach_low, reach_high) = row.reachable(&self.bounds);
            if row.lower > row.upper + tol
                || row.lower > reach_high + tol
                || row.upper < reach_low - tol
            {
                return Err(OptimizerError::InfeasibleConstraint(format!(
                    "{} requires [{}, {}] but the bounds allow [{reach_low}, {reach_high}]",
                    row.label, row.lower, row.upper
                )));
            }
        }
        Ok(())
    }

    /// `2(Σ + γI)` over the weights.
    fn risk_matrix(&self) -> Array2<f64> {
        let mut p = self.covariance.values() * 2.0;
        p.diag_mut().mapv_inplace(|v| v + 2.0 * self.l2_gamma);
        p
    }

    /// Program over the weights: budget, bounds, constraint rows and an
    /// optional return floor, with linear term `−tμ`.
    fn weight_program(
        &self,
        return_floor: Option<f64>,
        risk_aversion: f64,
    ) -> std::result::Result<QuadraticProgram, SolverError> {
        let n = self.expected_returns.len();
        let mut rows = RowSet::default();
        rows.push(Array1::ones(n), 1.0, 1.0);
        for (i, b) in self.bounds.iter().enumerate() {
            rows.push(RowSet::unit(n, i), b.lower, b.upper);
        }
        for row in &self.rows {
            rows.push(row.coefficients.clone(), row.lower, row.upper);
        }
        if let Some(floor) = return_floor {
            rows.push(self.expected_returns.values().clone(), floor, f64::INFINITY);
        }
        let q = self.expected_returns.values() * -risk_aversion;
        rows.into_program(self.risk_matrix(), q)
    }

    /// Homogenized program over `(y, κ)` with `y = κw`.
    fn sharpe_program(&self, risk_free_rate: f64) -> Result<QuadraticProgram> {
        let n = self.expected_returns.len();
        let dim = n + 1;
        let extend = |coefficients: &Array1<f64>, kappa: f64| {
            let mut row = Array1::zeros(dim);
            row.slice_mut(s![..n]).assign(coefficients);
            row[n] = kappa;
            row
        };

        let mut rows = RowSet::default();
        let excess = self.expected_returns.values() - risk_free_rate;
        rows.push(extend(&excess, 0.0), 1.0, 1.0);
        rows.push(extend(&Array1::ones(n), -1.0), 0.0, 0.0);
        for (i, b) in self.bounds.iter().enumerate() {
            let unit = RowSet::unit(n, i);
            if b.lower.is_finite() {
                rows.push(extend(&unit, -b.lower), 0.0, f64::INFINITY);
            }
            if b.upper.is_finite() {
                rows.push(extend(&unit, -b.upper), f64::NEG_INFINITY, 0.0);
            }
        }
        rows.push(RowSet::unit(dim, n), 0.0, f64::INFINITY);
        for row in &self.rows {
            if row.lower.is_finite() {
                rows.push(extend(&row.coefficients, -row.lower), 0.0, f64::INFINITY);
            }
            if row.upper.is_finite() {
                rows.push(extend(&row.coefficients, -row.upper), f64::NEG_INFINITY, 0.0);
            }
        }

        let mut p = Array2::zeros((dim, dim));
        p.slice_mut(s![..n, ..n]).assign(&self.risk_matrix());
        Ok(rows.into_program(p, Array1::zeros(dim))?)
    }

    fn solve_weights(
        &self,
        return_floor: Option<f64>,
        risk_aversion: f64,
    ) -> std::result::Result<(Array1<f64>, usize), SolverError> {
        let program = self.weight_program(return_floor, risk_aversion)?;
        let solution = self.solver.solve(&program)?;
        Ok((self.clamp_to_bounds(solution.x), solution.iterations))
    }

    /// Highest-return frontier portfolio, found by growing the risk aversion
    /// until the weights stop moving.
    fn max_return_weights(&self) -> std::result::Result<Array1<f64>, SolverError> {
        let mut aversion = RISK_AVERSION_START;
        let (mut weights, _) = self.solve_weights(None, aversion)?;
        while aversion < RISK_AVERSION_MAX {
            aversion *= 2.0;
            let (next, _) = self.solve_weights(None, aversion)?;
            let saturated = max_abs_diff(&next, &weights) <= SATURATION_TOLERANCE;
            weights = next;
            if saturated {
                break;
            }
        }
        Ok(weights)
    }

    fn clamp_to_bounds(&self, mut weights: Array1<f64>) -> Array1<f64> {
        for (w, b) in weights.iter_mut().zip(&self.bounds) {
            *w = b.clamp(*w);
        }
        weights
    }

    fn volatility(&self, weights: &Array1<f64>) -> f64 {
        weights
            .dot(&self.covariance.values().dot(weights))
            .max(0.0)
            .sqrt()
    }

    fn finish(
        self,
        objective: Objective,
        weights: Array1<f64>,
        iterations: usize,
    ) -> Result<OptimizationResult> {
        if let Some(row) = self
            .rows
            .iter()
            .find(|r| !r.is_satisfied(&weights, CONSTRAINT_SLACK))
        {
            let value = row.coefficients.dot(&weights);
            tracing::warn!(constraint = %row.label, value, "solved weights violate a constraint");
            return Err(OptimizerError::InfeasibleConstraint(format!(
                "solved weights put {} at {value}, outside [{}, {}]",
                row.label, row.lower, row.upper
            )));
        }
        let weights = PortfolioWeights::new(self.expected_returns.assets().to_vec(), weights)?;
        tracing::debug!(
            ?objective,
            iterations,
            holdings = weights.n_holdings(),
            "portfolio optimized"
        );
        Ok(OptimizationResult {
            objective,
            weights,
            expected_returns: self.expected_returns,
            covariance: self.covariance,
            iterations,
        })
    }
}

fn max_abs_diff(a: &Array1<f64>, b: &Array1<f64>) -> f64 {
    a.iter()
        .zip(b.iter())
        .fold(0.0_f64, |acc, (x, y)| acc.max((x - y).abs()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solver::QpSolution;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    fn two_assets() -> PortfolioOptimizer {
        let mu = ExpectedReturnVector::from_pairs([("LOW", 0.10), ("HIGH", 0.15)]).unwrap();
        let cov = CovarianceMatrix::new(
            vec!["LOW".to_string(), "HIGH".to_string()],
            array![[0.04, 0.01], [0.01, 0.09]],
        )
        .unwrap();
        PortfolioOptimizer::new(mu, cov).unwrap()
    }

    fn assert_budget(result: &OptimizationResult) {
        assert_abs_diff_eq!(result.weights().sum(), 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_min_volatility_two_assets() {
        let result = two_assets().min_volatility().unwrap();
        assert_budget(&result);
        let w = result.weights();
        // w_low = (σ₂² − σ₁₂) / (σ₁² + σ₂² − 2σ₁₂) = 0.08 / 0.11
        assert_abs_diff_eq!(w.get("LOW").unwrap(), 8.0 / 11.0, epsilon = 1e-5);
        assert_abs_diff_eq!(w.get("HIGH").unwrap(), 3.0 / 11.0, epsilon = 1e-5);
        assert_eq!(result.objective(), Objective::MinVolatility);
        assert!(result.iterations() > 0);
    }

    #[test]
    fn test_optimize_dispatches_objective() {
        let objective = Objective::EfficientReturn {
            target_return: 0.14,
        };
        let result = two_assets().optimize(objective).unwrap();
        assert_eq!(result.objective(), objective);
        assert_abs_diff_eq!(result.weights().values()[0], 0.2, epsilon = 1e-5);
    }

    #[test]
    fn test_max_sharpe_two_assets() {
        let result = two_assets().max_sharpe(0.02).unwrap();
        assert_budget(&result);
        // Σ⁻¹(μ − r_f) ∝ (0.0059, 0.0044)
        assert_abs_diff_eq!(result.weights().values()[0], 0.0059 / 0.0103, epsilon = 1e-4);
        let perf = result.performance(0.02);
        let min_vol = two_assets().min_volatility().unwrap().performance(0.02);
        assert!(perf.sharpe_ratio > min_vol.sharpe_ratio);
    }

    #[test]
    fn test_efficient_return_two_assets() {
        let result = two_assets().efficient_return(0.14).unwrap();
        assert_budget(&result);
        assert_abs_diff_eq!(result.weights().values()[0], 0.2, epsilon = 1e-5);
        assert_abs_diff_eq!(result.performance(0.0).expected_return, 0.14, epsilon = 1e-6);
    }

    #[test]
    fn test_efficient_return_below_min_vol_return() {
        let result = two_assets().efficient_return(0.05).unwrap();
        assert_abs_diff_eq!(result.weights().values()[0], 8.0 / 11.0, epsilon = 1e-5);
    }

    #[test]
    fn test_efficient_return_unreachable() {
        assert!(matches!(
            two_assets().efficient_return(0.2),
            Err(OptimizerError::InfeasibleTarget(_))
        ));
    }

    #[test]
    fn test_efficient_return_just_above_maximum() {
        assert!(matches!(
            two_assets().efficient_return(0.15 + 1e-7),
            Err(OptimizerError::InfeasibleTarget(_))
        ));
        let top = two_assets().efficient_return(0.15).unwrap();
        assert_abs_diff_eq!(top.weights().values()[1], 1.0, epsilon = 1e-5);
    }

    #[test]
    fn test_efficient_risk_two_assets() {
        let result = two_assets().efficient_risk(0.25).unwrap();
        assert_budget(&result);
        // 0.11w² − 0.16w + 0.09 = 0.0625 on the efficient branch
        let expected = (0.16 - (0.16f64 * 0.16 - 4.0 * 0.11 * 0.0275).sqrt()) / 0.22;
        assert_abs_diff_eq!(result.weights().values()[0], expected, epsilon = 1e-4);
        assert!(result.performance(0.0).volatility <= 0.25 + 1e-6);
    }

    #[test]
    fn test_efficient_risk_above_riskiest_asset() {
        let result = two_assets().efficient_risk(0.5).unwrap();
        assert_abs_diff_eq!(result.weights().values()[1], 1.0, epsilon = 1e-5);
    }

    #[test]
    fn test_efficient_risk_below_minimum() {
        assert!(matches!(
            two_assets().efficient_risk(0.15),
            Err(OptimizerError::InfeasibleTarget(_))
        ));
    }

    #[test]
    fn test_max_sharpe_without_excess_return() {
        assert!(matches!(
            two_assets().max_sharpe(0.2),
            Err(OptimizerError::InfeasibleTarget(_))
        ));
    }

    #[test]
    fn test_asset_bounds_respected() {
        let result = two_assets()
            .with_asset_bounds("LOW", Bounds::new(0.0, 0.5).unwrap())
            .unwrap()
            .min_volatility()
            .unwrap();
        assert_budget(&result);
        assert!(result.weights().values()[0] <= 0.5);
        assert_abs_diff_eq!(result.weights().values()[0], 0.5, epsilon = 1e-5);
    }

    #[test]
    fn test_crossed_bounds_rejected() {
        let err = two_assets()
            .with_bounds(Bounds {
                lower: 0.6,
                upper: 0.4,
            })
            .min_volatility();
        assert!(matches!(err, Err(OptimizerError::InfeasibleConstraint(_))));
    }

    #[test]
    fn test_linear_constraint_cap() {
        let result = two_assets()
            .add_constraint(&LinearConstraint::asset_at_most("LOW", 0.3))
            .unwrap()
            .min_volatility()
            .unwrap();
        assert_abs_diff_eq!(result.weights().get("LOW").unwrap(), 0.3, epsilon = 1e-5);
    }

    #[test]
    fn test_unknown_asset_rejected() {
        assert!(matches!(
            two_assets().with_asset_bounds("NOPE", Bounds::default()),
            Err(OptimizerError::UnknownAsset(_))
        ));
    }

    #[test]
    fn test_l2_regularization_spreads_weights() {
        let plain = two_assets().min_volatility().unwrap();
        let ridge = two_assets()
            .with_l2_regularization(1.0)
            .unwrap()
            .min_volatility()
            .unwrap();
        assert_budget(&ridge);
        let spread = |r: &OptimizationResult| (r.weights().values()[0] - 0.5).abs();
        assert!(spread(&ridge) < spread(&plain));
        assert!(two_assets().with_l2_regularization(-1.0).is_err());
    }

    #[test]
    fn test_mismatched_assets() {
        let mu = ExpectedReturnVector::from_pairs([("A", 0.1), ("B", 0.2)]).unwrap();
        let cov =
            CovarianceMatrix::new(vec!["A".to_string(), "C".to_string()], Array2::eye(2)).unwrap();
        assert!(matches!(
            PortfolioOptimizer::new(mu, cov),
            Err(OptimizerError::DimensionMismatch(_))
        ));
    }

    #[test]
    fn test_covariance_is_reordered() {
        let mu = ExpectedReturnVector::from_pairs([("HIGH", 0.15), ("LOW", 0.10)]).unwrap();
        let cov = CovarianceMatrix::new(
            vec!["LOW".to_string(), "HIGH".to_string()],
            array![[0.04, 0.01], [0.01, 0.09]],
        )
        .unwrap();
        let result = PortfolioOptimizer::new(mu, cov)
            .unwrap()
            .min_volatility()
            .unwrap();
        assert_eq!(result.weights().assets()[0], "HIGH");
        assert_abs_diff_eq!(result.weights().get("LOW").unwrap(), 8.0 / 11.0, epsilon = 1e-5);
    }

    #[test]
    fn test_rejects_indefinite_covariance() {
        let mu = ExpectedReturnVector::from_pairs([("A", 0.1), ("B", 0.2)]).unwrap();
        let cov = CovarianceMatrix::new(
            vec!["A".to_string(), "B".to_string()],
            array![[0.01, 0.05], [0.05, 0.01]],
        )
        .unwrap();
        assert!(matches!(
            PortfolioOptimizer::new(mu, cov),
            Err(OptimizerError::SingularCovariance(_))
        ));
    }

    #[test]
    fn test_riskless_asset_makes_sharpe_unbounded() {
        let mu = ExpectedReturnVector::from_pairs([("CASH", 0.05), ("RISKY", 0.10)]).unwrap();
        let cov = CovarianceMatrix::new(
            vec!["CASH".to_string(), "RISKY".to_string()],
            array![[0.0, 0.0], [0.0, 0.04]],
        )
        .unwrap();
        assert!(matches!(
            PortfolioOptimizer::new(mu, cov).unwrap().max_sharpe(0.02),
            Err(OptimizerError::SingularCovariance(_))
        ));
    }

    #[derive(Debug)]
    struct StalledSolver;

    impl ConvexSolver for StalledSolver {
        fn solve(&self, _qp: &QuadraticProgram) -> std::result::Result<QpSolution, SolverError> {
            Err(SolverError::MaxIterations {
                iterations: 7,
                primal_residual: 1.0,
                dual_residual: 1.0,
            })
        }
    }

    #[test]
    fn test_custom_solver_backend() {
        let err = two_assets().with_solver(StalledSolver).min_volatility();
        assert!(matches!(err, Err(OptimizerError::NotConverged { iterations: 7 })));
    }

    /// Returns equal weights whatever the program asks for.
    #[derive(Debug)]
    struct EqualWeightSolver;

    impl ConvexSolver for EqualWeightSolver {
        fn solve(&self, qp: &QuadraticProgram) -> std::result::Result<QpSolution, SolverError> {
            let n = qp.q().len();
            Ok(QpSolution {
                x: Array1::from_elem(n, 1.0 / n as f64),
                y: Array1::zeros(qp.a().nrows()),
                objective: 0.0,
                iterations: 1,
                primal_residual: 0.0,
                dual_residual: 0.0,
            })
        }
    }

    #[test]
    fn test_constraint_violation_is_an_error() {
        let err = two_assets()
            .add_constraint(&LinearConstraint::asset_at_most("LOW", 0.3))
            .unwrap()
            .with_solver(EqualWeightSolver)
            .min_volatility();
        assert!(matches!(err, Err(OptimizerError::InfeasibleConstraint(_))));

        let within = two_assets()
            .add_constraint(&LinearConstraint::asset_at_most("LOW", 0.6))
            .unwrap()
            .with_solver(EqualWeightSolver)
            .min_volatility()
            .unwrap();
        assert_abs_diff_eq!(within.weights().values()[0], 0.5);
    }

    #[test]
    fn test_evaluate_cleaned_weights() {
        let result = two_assets().min_volatility().unwrap();
        let clean = result.clean_weights(&CleanConfig::default()).unwrap();
        let perf = result.evaluate(&clean, 0.0).unwrap();
        assert_abs_diff_eq!(perf.volatility, result.performance(0.0).volatility, epsilon = 1e-6);
    }
}
