//! Classical MDS primitives: squared distance matrices, double centering,
//! sorted eigendecomposition and the Nyström out-of-sample formula

use nalgebra::{DMatrix, DVector, SymmetricEigen};
use tracing::debug;

use crate::distance::DistanceMetric;
use crate::error::{LmdsError, Result};

/// Relative tolerance below which an eigenvalue is not counted as positive.
const EIGENVALUE_TOLERANCE: f64 = 1e-9;

/// Squared pairwise distance matrix of `points` under `metric`.
///
/// # Panics
///
/// If the points differ in length.
pub fn squared_distances<P: AsRef<[f32]>>(points: &[P], metric: DistanceMetric) -> DMatrix<f64> {
    let n = points.len();
    let mut delta = DMatrix::zeros(n, n);
    for i in 0..n {
        for j in (i + 1)..n {
            let d = metric.squared_distance(points[i].as_ref(), points[j].as_ref());
            delta[(i, j)] = d;
            delta[(j, i)] = d;
        }
    }
    delta
}

/// Squared pairwise distance matrix of the rows of `layout`.
pub fn squared_layout_distances(layout: &DMatrix<f64>, metric: DistanceMetric) -> DMatrix<f64> {
    let n = layout.nrows();
    let rows: Vec<Vec<f64>> = layout.row_iter().map(|r| r.iter().copied().collect()).collect();
    let mut delta = DMatrix::zeros(n, n);
    for i in 0..n {
        for j in (i + 1)..n {
            let d = metric.squared_distance_f64(&rows[i], &rows[j]);
            delta[(i, j)] = d;
            delta[(j, i)] = d;
        }
    }
    delta
}

/// `B = -½ · H · Δ · H` with `H = I - J/L`.
pub fn double_center(delta: &DMatrix<f64>) -> DMatrix<f64> {
    let n = delta.nrows();
    let mut h = DMatrix::from_element(n, n, -1.0 / n as f64);
    for i in 0..n {
        h[(i, i)] = 1.0 - 1.0 / n as f64;
    }
    let b = (&h * delta * &h) * -0.5;
    // symmetrize away rounding so the solver sees an exactly symmetric matrix
    (&b + b.transpose()) * 0.5
}

/// Leading eigenpairs of a double-centered landmark matrix.
#[derive(Debug, Clone)]
pub struct Eigenbasis {
    /// All eigenvalues, descending
    pub eigenvalues: Vec<f64>,
    /// Eigenvectors of the first `dimension` eigenvalues, one per column
    pub eigenvectors: DMatrix<f64>,
}

impl Eigenbasis {
    /// Decompose `delta` and keep the `dimension` leading eigenpairs.
    ///
    /// Fails with [`LmdsError::InsufficientRank`] when fewer than `dimension`
    /// eigenvalues are positive.
    pub fn decompose(delta: &DMatrix<f64>, dimension: usize) -> Result<Self> {
        let b = double_center(delta);
        let eigen = SymmetricEigen::new(b);

        let mut order: Vec<usize> = (0..eigen.eigenvalues.len()).collect();
        order.sort_by(|&a, &b| eigen.eigenvalues[b].total_cmp(&eigen.eigenvalues[a]));
        let eigenvalues: Vec<f64> = order.iter().map(|&i| eigen.eigenvalues[i]).collect();

        let largest = eigenvalues.first().copied().unwrap_or(0.0);
        let threshold = EIGENVALUE_TOLERANCE * largest.abs().max(1.0);
        let positive = eigenvalues.iter().filter(|&&v| v > threshold).count();
        debug!(
            landmarks = delta.nrows(),
            positive,
            leading = ?&eigenvalues[..eigenvalues.len().min(dimension + 1)],
            "Decomposed landmark matrix"
        );
        if positive < dimension {
            return Err(LmdsError::InsufficientRank {
                positive,
                required: dimension,
            });
        }

        let eigenvectors = DMatrix::from_fn(delta.nrows(), dimension, |r, c| {
            eigen.eigenvectors[(r, order[c])]
        });
        Ok(Self {
            eigenvalues,
            eigenvectors,
        })
    }

    pub fn dimension(&self) -> usize {
        self.eigenvectors.ncols()
    }

    /// Landmark coordinates `L[:, k] = v_k · √λ_k`, one row per landmark.
    pub fn landmark_positions(&self) -> DMatrix<f64> {
        let mut positions = self.eigenvectors.clone();
        for (k, mut column) in positions.column_iter_mut().enumerate() {
            column *= self.eigenvalues[k].sqrt();
        }
        positions
    }

    /// Pseudo-inverse `L#[k, :] = v_kᵀ / √λ_k`.
    pub fn pseudo_inverse(&self) -> DMatrix<f64> {
        let mut inverse = self.eigenvectors.transpose();
        for (k, mut row) in inverse.row_iter_mut().enumerate() {
            row /= self.eigenvalues[k].sqrt();
        }
        inverse
    }
}

/// Rigid motion (orthogonal map plus translation) taking one landmark layout
/// onto another.
///
/// Fitted by orthogonal Procrustes: with both layouts centered, the map is
/// `R = U·Vᵀ` from the SVD of `Aᵀ·B`. Reflections are allowed, which also
/// absorbs the sign ambiguity of eigenvectors.
#[derive(Debug, Clone)]
pub struct Alignment {
    rotation: DMatrix<f64>,
    source_mean: DVector<f64>,
    target_mean: DVector<f64>,
}

impl Alignment {
    /// Least-squares fit taking the rows of `source` onto the rows of
    /// `target`. Both hold one row per landmark in the same order.
    pub fn fit(source: &DMatrix<f64>, target: &DMatrix<f64>) -> Self {
        let source_mean = row_mean(source);
        let target_mean = row_mean(target);
        let cross = centered(source, &source_mean).transpose() * centered(target, &target_mean);

        let dimension = source.ncols();
        let svd = cross.svd(true, true);
        let rotation = match (svd.u, svd.v_t) {
            (Some(u), Some(v_t)) => u * v_t,
            _ => DMatrix::identity(dimension, dimension),
        };
        Self {
            rotation,
            source_mean,
            target_mean,
        }
    }

    /// Map a source-frame position into the target frame.
    pub fn apply(&self, point: &DVector<f64>) -> DVector<f64> {
        self.rotation.tr_mul(&(point - &self.source_mean)) + &self.target_mean
    }
}

fn row_mean(matrix: &DMatrix<f64>) -> DVector<f64> {
    let n = matrix.nrows().max(1) as f64;
    DVector::from_iterator(matrix.ncols(), matrix.column_iter().map(|c| c.sum() / n))
}

fn centered(matrix: &DMatrix<f64>, mean: &DVector<f64>) -> DMatrix<f64> {
    DMatrix::from_fn(matrix.nrows(), matrix.ncols(), |r, c| matrix[(r, c)] - mean[c])
}

/// Column means of a distance matrix.
pub fn column_means(delta: &DMatrix<f64>) -> DVector<f64> {
    let n = delta.nrows().max(1) as f64;
    DVector::from_iterator(
        delta.ncols(),
        delta.column_iter().map(|c| c.sum() / n),
    )
}

/// Place a point from its squared distances to the landmarks:
/// `-½ · L# · (d² - mean)`.
pub fn extend_point(
    pseudo_inverse: &DMatrix<f64>,
    mean: &DVector<f64>,
    squared_to_landmarks: &DVector<f64>,
) -> DVector<f64> {
    (pseudo_inverse * (squared_to_landmarks - mean)) * -0.5
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn square_corners() -> Vec<[f32; 2]> {
        vec![[0.0, 0.0], [4.0, 0.0], [4.0, 3.0], [0.0, 3.0]]
    }

    #[test]
    fn double_centered_rows_sum_to_zero() {
        let delta = squared_distances(&square_corners(), DistanceMetric::Euclidean);
        let b = double_center(&delta);
        for row in b.row_iter() {
            assert!(row.sum().abs() < 1e-9);
        }
    }

    #[test]
    fn eigenvalues_are_sorted_descending() {
        let delta = squared_distances(&square_corners(), DistanceMetric::Euclidean);
        let basis = Eigenbasis::decompose(&delta, 2).unwrap();
        assert!(basis.eigenvalues.windows(2).all(|w| w[0] >= w[1]));
        // centered rectangle: variances along x and y times the point count
        assert!((basis.eigenvalues[0] - 16.0).abs() < 1e-9);
        assert!((basis.eigenvalues[1] - 9.0).abs() < 1e-9);
    }

    #[test]
    fn landmark_positions_preserve_distances() {
        let points = square_corners();
        let delta = squared_distances(&points, DistanceMetric::Euclidean);
        let positions = Eigenbasis::decompose(&delta, 2).unwrap().landmark_positions();
        let recovered = squared_layout_distances(&positions, DistanceMetric::Euclidean);
        for i in 0..4 {
            for j in 0..4 {
                assert!((recovered[(i, j)] - delta[(i, j)]).abs() < 1e-9);
            }
        }
    }

    #[test]
    fn extension_places_landmarks_on_themselves() {
        let delta = squared_distances(&square_corners(), DistanceMetric::Euclidean);
        let basis = Eigenbasis::decompose(&delta, 2).unwrap();
        let positions = basis.landmark_positions();
        let inverse = basis.pseudo_inverse();
        let mean = column_means(&delta);

        for i in 0..4 {
            let placed = extend_point(&inverse, &mean, &delta.column(i).into_owned());
            assert!((placed[0] - positions[(i, 0)]).abs() < 1e-9);
            assert!((placed[1] - positions[(i, 1)]).abs() < 1e-9);
        }
    }

    #[test]
    fn alignment_recovers_a_rigid_motion() {
        let delta = squared_distances(&square_corners(), DistanceMetric::Euclidean);
        let source = Eigenbasis::decompose(&delta, 2).unwrap().landmark_positions();

        // rotate by 30 degrees, mirror the y axis, then shift
        let (sin, cos) = 30f64.to_radians().sin_cos();
        let motion = DMatrix::from_row_slice(2, 2, &[cos, sin, sin, -cos]);
        let shift = DVector::from_vec(vec![7.0, -2.5]);
        let target = DMatrix::from_fn(4, 2, |r, c| {
            (0..2).map(|k| source[(r, k)] * motion[(k, c)]).sum::<f64>() + shift[c]
        });

        let alignment = Alignment::fit(&source, &target);
        for i in 0..4 {
            let mapped = alignment.apply(&source.row(i).transpose());
            assert!((mapped[0] - target[(i, 0)]).abs() < 1e-9);
            assert!((mapped[1] - target[(i, 1)]).abs() < 1e-9);
        }

        let midpoint = DVector::from_vec(vec![
            (source[(0, 0)] + source[(2, 0)]) / 2.0,
            (source[(0, 1)] + source[(2, 1)]) / 2.0,
        ]);
        let mapped = alignment.apply(&midpoint);
        assert!((mapped[0] - (target[(0, 0)] + target[(2, 0)]) / 2.0).abs() < 1e-9);
        assert!((mapped[1] - (target[(0, 1)] + target[(2, 1)]) / 2.0).abs() < 1e-9);
    }

    #[test]
    fn identical_layouts_align_to_the_identity() {
        let delta = squared_distances(&square_corners(), DistanceMetric::Euclidean);
        let layout = Eigenbasis::decompose(&delta, 2).unwrap().landmark_positions();
        let alignment = Alignment::fit(&layout, &layout);

        let point = DVector::from_vec(vec![1.25, -0.5]);
        let mapped = alignment.apply(&point);
        assert!((mapped[0] - 1.25).abs() < 1e-9);
        assert!((mapped[1] + 0.5).abs() < 1e-9);
    }

    #[test]
    fn collinear_points_lack_a_second_dimension() {
        let points: Vec<[f32; 2]> = (0..10).map(|i| [i as f32, 2.0 * i as f32]).collect();
        let delta = squared_distances(&points, DistanceMetric::Euclidean);
        let err = Eigenbasis::decompose(&delta, 2).unwrap_err();
        assert!(matches!(
            err,
            LmdsError::InsufficientRank {
                positive: 1,
                required: 2
            }
        ));
        assert_eq!(Eigenbasis::decompose(&delta, 1).unwrap().dimension(), 1);
    }
}
