//! Utilities for covariance matrix manipulation
//!
//! Symmetric eigendecomposition (cyclic-by-largest-element Jacobi), PSD checks,
//! eigenvalue clipping and condition numbers. Asset counts in portfolio
//! construction are small, so a dense Jacobi sweep is adequate.

use super::CovarianceError;
use ndarray::{Array1, Array2};

/// Result of eigenvalue decomposition
#[derive(Debug, Clone)]
pub struct EigenDecomposition {
    /// Eigenvalues (sorted in descending order)
    pub eigenvalues: Array1<f64>,
    /// Eigenvectors (columns are eigenvectors)
    pub eigenvectors: Array2<f64>,
}

const JACOBI_TOLERANCE: f64 = 1e-14;

fn default_iterations(n: usize) -> usize {
    50 * n * n + 100
}

/// Jacobi eigenvalue decomposition for symmetric matrices
///
/// # Arguments
/// * `matrix` - Symmetric matrix to decompose
/// * `max_iterations` - Maximum number of rotations
/// * `tolerance` - Convergence tolerance for off-diagonal elements, relative
///   to the largest entry magnitude
///
/// # Returns
/// * Eigenvalues and eigenvectors
pub fn jacobi_eigendecomp(
    matrix: &Array2<f64>,
    max_iterations: usize,
    tolerance: f64,
) -> Result<EigenDecomposition, CovarianceError> {
    let n = matrix.nrows();
    if n != matrix.ncols() {
        return Err(CovarianceError::DimensionMismatch {
            expected: n,
            actual: matrix.ncols(),
        });
    }
    if matrix.iter().any(|v| !v.is_finite()) {
        return Err(CovarianceError::NonFinite);
    }

    let mut a = matrix.clone();
    let mut v = Array2::<f64>::eye(n);
    let scale = matrix
        .iter()
        .fold(0.0_f64, |acc, x| acc.max(x.abs()))
        .max(f64::MIN_POSITIVE);

    for _ in 0..max_iterations {
        let Some((p, q, max_val)) = find_largest_off_diagonal(&a) else {
            break;
        };
        if max_val.abs() <= tolerance * scale {
            break;
        }
        let (cos_theta, sin_theta) = compute_rotation(a[[p, p]], a[[q, q]], a[[p, q]]);
        apply_jacobi_rotation(&mut a, &mut v, p, q, cos_theta, sin_theta);
    }

    let eigenvalues: Array1<f64> = a.diag().to_owned();

    let mut indices: Vec<usize> = (0..n).collect();
    indices.sort_by(|&i, &j| eigenvalues[j].total_cmp(&eigenvalues[i]));

    let sorted_eigenvalues = indices.iter().map(|&i| eigenvalues[i]).collect();
    let mut sorted_eigenvectors = Array2::<f64>::zeros((n, n));
    for (new_idx, &old_idx) in indices.iter().enumerate() {
        sorted_eigenvectors
            .column_mut(new_idx)
            .assign(&v.column(old_idx));
    }

    Ok(EigenDecomposition {
        eigenvalues: sorted_eigenvalues,
        eigenvectors: sorted_eigenvectors,
    })
}

fn decompose(matrix: &Array2<f64>) -> Result<EigenDecomposition, CovarianceError> {
    jacobi_eigendecomp(matrix, default_iterations(matrix.nrows()), JACOBI_TOLERANCE)
}

/// Largest off-diagonal element, `None` for matrices smaller than 2x2
fn find_largest_off_diagonal(matrix: &Array2<f64>) -> Option<(usize, usize, f64)> {
    let n = matrix.nrows();
    if n < 2 {
        return None;
    }
    let mut max_val = 0.0;
    let mut p = 0;
    let mut q = 1;

    for i in 0..n {
        for j in (i + 1)..n {
            let val = matrix[[i, j]].abs();
            if val > max_val {
                max_val = val;
                p = i;
                q = j;
            }
        }
    }

    Some((p, q, matrix[[p, q]]))
}

/// Returns (cos_theta, sin_theta) annihilating `apq`
fn compute_rotation(app: f64, aqq: f64, apq: f64) -> (f64, f64) {
    if apq == 0.0 {
        return (1.0, 0.0);
    }

    let tau = (aqq - app) / (2.0 * apq);
    let t = if tau >= 0.0 {
        1.0 / (tau + (1.0 + tau * tau).sqrt())
    } else {
        -1.0 / (-tau + (1.0 + tau * tau).sqrt())
    };

    let cos_theta = 1.0 / (1.0 + t * t).sqrt();
    let sin_theta = t * cos_theta;

    (cos_theta, sin_theta)
}

fn apply_jacobi_rotation(
    a: &mut Array2<f64>,
    v: &mut Array2<f64>,
    p: usize,
    q: usize,
    cos_theta: f64,
    sin_theta: f64,
) {
    let n = a.nrows();

    let app = a[[p, p]];
    let aqq = a[[q, q]];
    let apq = a[[p, q]];

    a[[p, p]] = cos_theta * cos_theta * app - 2.0 * cos_theta * sin_theta * apq
        + sin_theta * sin_theta * aqq;
    a[[q, q]] = sin_theta * sin_theta * app
        + 2.0 * cos_theta * sin_theta * apq
        + cos_theta * cos_theta * aqq;
    a[[p, q]] = 0.0;
    a[[q, p]] = 0.0;

    for i in 0..n {
        if i != p && i != q {
            let aip = a[[i, p]];
            let aiq = a[[i, q]];

            a[[i, p]] = cos_theta * aip - sin_theta * aiq;
            a[[p, i]] = a[[i, p]];

            a[[i, q]] = sin_theta * aip + cos_theta * aiq;
            a[[q, i]] = a[[i, q]];
        }
    }

    for i in 0..n {
        let vip = v[[i, p]];
        let viq = v[[i, q]];

        v[[i, p]] = cos_theta * vip - sin_theta * viq;
        v[[i, q]] = sin_theta * vip + cos_theta * viq;
    }
}

/// Computes `V Λ Vᵀ`
fn reconstruct_from_eigen(eigenvalues: &Array1<f64>, eigenvectors: &Array2<f64>) -> Array2<f64> {
    let v_lambda = eigenvectors * &eigenvalues.view().insert_axis(ndarray::Axis(0));
    v_lambda.dot(&eigenvectors.t())
}

/// Smallest eigenvalue of a symmetric matrix
pub fn min_eigenvalue(matrix: &Array2<f64>) -> Result<f64, CovarianceError> {
    let decomp = decompose(matrix)?;
    Ok(decomp
        .eigenvalues
        .iter()
        .copied()
        .fold(f64::INFINITY, f64::min))
}

/// Check if a symmetric matrix is positive semidefinite
///
/// `tolerance` is relative to the largest eigenvalue magnitude, so scale does
/// not matter. Non-square or non-finite matrices are never PSD.
pub fn is_positive_semidefinite(matrix: &Array2<f64>, tolerance: f64) -> bool {
    match decompose(matrix) {
        Ok(decomp) => {
            let largest = decomp
                .eigenvalues
                .iter()
                .fold(0.0_f64, |acc, v| acc.max(v.abs()));
            decomp
                .eigenvalues
                .iter()
                .all(|&v| v >= -tolerance * largest)
        }
        Err(_) => false,
    }
}

/// Compute the condition number of a symmetric matrix
///
/// The condition number is the ratio of the largest to smallest eigenvalue.
/// Returns infinity for singular or indefinite matrices.
pub fn condition_number(matrix: &Array2<f64>) -> f64 {
    match decompose(matrix) {
        Ok(decomp) => {
            let max_eig = decomp
                .eigenvalues
                .iter()
                .copied()
                .fold(f64::NEG_INFINITY, f64::max);
            let min_eig = decomp
                .eigenvalues
                .iter()
                .copied()
                .fold(f64::INFINITY, f64::min);

            if min_eig <= max_eig.abs() * 1e-15 {
                f64::INFINITY
            } else {
                max_eig / min_eig
            }
        }
        Err(_) => f64::INFINITY,
    }
}

/// Raise every eigenvalue below `floor` to `floor` and rebuild the matrix.
pub fn clip_eigenvalues(matrix: &Array2<f64>, floor: f64) -> Result<Array2<f64>, CovarianceError> {
    let decomp = decompose(matrix)?;
    let clipped = decomp.eigenvalues.mapv(|v| v.max(floor));
    Ok(reconstruct_from_eigen(&clipped, &decomp.eigenvectors))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn test_jacobi_eigendecomp_diagonal() {
        let matrix = Array2::from_diag(&array![1.0, 4.0, 2.0]);
        let decomp = jacobi_eigendecomp(&matrix, 100, 1e-12).unwrap();

        assert_abs_diff_eq!(decomp.eigenvalues[0], 4.0, epsilon = 1e-12);
        assert_abs_diff_eq!(decomp.eigenvalues[1], 2.0, epsilon = 1e-12);
        assert_abs_diff_eq!(decomp.eigenvalues[2], 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_jacobi_reconstructs_input() {
        let matrix = array![[2.0, 1.0, 1.0], [1.0, 2.0, 1.0], [1.0, 1.0, 2.0]];
        let decomp = decompose(&matrix).unwrap();

        assert_abs_diff_eq!(decomp.eigenvalues[0], 4.0, epsilon = 1e-10);
        assert_abs_diff_eq!(decomp.eigenvalues[2], 1.0, epsilon = 1e-10);
        let rebuilt = reconstruct_from_eigen(&decomp.eigenvalues, &decomp.eigenvectors);
        for (a, b) in matrix.iter().zip(rebuilt.iter()) {
            assert_abs_diff_eq!(*a, *b, epsilon = 1e-10);
        }
    }

    #[test]
    fn test_jacobi_rejects_non_square() {
        assert!(jacobi_eigendecomp(&Array2::zeros((2, 3)), 10, 1e-12).is_err());
    }

    #[test]
    fn test_is_positive_semidefinite() {
        let singular = array![[1.0, 0.5], [0.5, 0.25]];
        assert!(is_positive_semidefinite(&singular, 1e-12));

        let indefinite = array![[1.0, 0.0], [0.0, -1.0]];
        assert!(!is_positive_semidefinite(&indefinite, 1e-12));
        assert_abs_diff_eq!(min_eigenvalue(&indefinite).unwrap(), -1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_psd_check_is_scale_free() {
        let tiny = array![[4e-6, 1e-6], [1e-6, 9e-6]];
        assert!(is_positive_semidefinite(&tiny, 1e-12));
        let tiny_bad = array![[1e-6, 2e-6], [2e-6, 1e-6]];
        assert!(!is_positive_semidefinite(&tiny_bad, 1e-12));
    }

    #[test]
    fn test_condition_number() {
        assert_abs_diff_eq!(condition_number(&Array2::eye(3)), 1.0, epsilon = 1e-12);
        let ill = Array2::from_diag(&array![1000.0, 1.0, 0.001]);
        assert_abs_diff_eq!(condition_number(&ill), 1e6, epsilon = 1e-3);
        assert!(condition_number(&array![[1.0, 1.0], [1.0, 1.0]]).is_infinite());
    }

    #[test]
    fn test_clip_eigenvalues() {
        let matrix = array![[1.0, 2.0], [2.0, 1.0]];
        let clipped = clip_eigenvalues(&matrix, 0.0).unwrap();
        assert!(is_positive_semidefinite(&clipped, 1e-10));
        assert_abs_diff_eq!(clipped[[0, 0]], 1.5, epsilon = 1e-10);
        assert_abs_diff_eq!(clipped[[1, 0]], 1.5, epsilon = 1e-10);
    }
}
