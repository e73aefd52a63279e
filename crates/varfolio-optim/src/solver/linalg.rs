//! Dense linear algebra used by the ADMM backend.

use super::SolverError;
use ndarray::{Array1, Array2};

/// Lower-triangular Cholesky factor `L` with `K = L Lᵀ`.
#[derive(Debug, Clone)]
pub(crate) struct Cholesky {
    lower: Array2<f64>,
}

impl Cholesky {
    /// Factor a symmetric positive definite matrix.
    pub(crate) fn factor(matrix: &Array2<f64>) -> Result<Self, SolverError> {
        let n = matrix.nrows();
        if matrix.ncols() != n {
            return Err(SolverError::DimensionMismatch(format!(
                "cannot factor a {}x{} matrix",
                n,
                matrix.ncols()
            )));
        }

        let mut lower = Array2::<f64>::zeros((n, n));
        for i in 0..n {
            for j in 0..=i {
                let mut sum = matrix[[i, j]];
                for k in 0..j {
                    sum -= lower[[i, k]] * lower[[j, k]];
                }
                if i == j {
                    if !sum.is_finite() || sum <= 0.0 {
                        return Err(SolverError::NotPositiveDefinite { pivot: i });
                    }
                    lower[[i, i]] = sum.sqrt();
                } else {
                    lower[[i, j]] = sum / lower[[j, j]];
                }
            }
        }
        Ok(Self { lower })
    }

    /// Solve `K x = rhs` by forward then backward substitution.
    pub(crate) fn solve(&self, rhs: &Array1<f64>) -> Array1<f64> {
        let n = self.lower.nrows();
        let mut y = Array1::<f64>::zeros(n);
        for i in 0..n {
            let mut sum = rhs[i];
            for k in 0..i {
                sum -= self.lower[[i, k]] * y[k];
            }
            y[i] = sum / self.lower[[i, i]];
        }

        let mut x = Array1::<f64>::zeros(n);
        for i in (0..n).rev() {
            let mut sum = y[i];
            for k in i + 1..n {
                sum -= self.lower[[k, i]] * x[k];
            }
            x[i] = sum / self.lower[[i, i]];
        }
        x
    }
}

/// Largest absolute entry, zero for an empty vector.
pub(crate) fn inf_norm(values: &Array1<f64>) -> f64 {
    values.iter().fold(0.0_f64, |acc, v| acc.max(v.abs()))
}
