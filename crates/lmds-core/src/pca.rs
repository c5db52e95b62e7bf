//! Re-centering PCA over a finished layout
//!
//! Moves the layout's centroid to the origin and rotates it onto its
//! principal axes. The transform is rigid, so pairwise distances are kept.

use nalgebra::{DMatrix, SymmetricEigen};

/// Recenter `layout` (one row per point) and project it onto the
/// eigenvectors of its covariance, largest variance first.
pub fn recenter(layout: &DMatrix<f64>) -> DMatrix<f64> {
    let n = layout.nrows();
    if n == 0 {
        return layout.clone();
    }

    let mut centered = layout.clone();
    for mut column in centered.column_iter_mut() {
        let mean = column.sum() / n as f64;
        column.add_scalar_mut(-mean);
    }

    let covariance = (centered.transpose() * &centered) / n.saturating_sub(1).max(1) as f64;
    let eigen = SymmetricEigen::new(covariance);
    let mut order: Vec<usize> = (0..eigen.eigenvalues.len()).collect();
    order.sort_by(|&a, &b| eigen.eigenvalues[b].total_cmp(&eigen.eigenvalues[a]));

    let dims = layout.ncols();
    let basis = DMatrix::from_fn(dims, dims, |r, c| eigen.eigenvectors[(r, order[c])]);
    centered * basis
}

#[cfg(test)]
mod tests {
    use super::*;

    fn distance(m: &DMatrix<f64>, i: usize, j: usize) -> f64 {
        (m.row(i) - m.row(j)).norm()
    }

    #[test]
    fn preserves_distances_and_centers() {
        let layout = DMatrix::from_row_slice(
            4,
            2,
            &[10.0, 10.0, 12.0, 11.0, 14.0, 12.0, 11.0, 13.0],
        );
        let recentered = recenter(&layout);

        for column in recentered.column_iter() {
            assert!(column.sum().abs() < 1e-9);
        }
        for i in 0..4 {
            for j in 0..4 {
                assert!((distance(&layout, i, j) - distance(&recentered, i, j)).abs() < 1e-9);
            }
        }
    }

    #[test]
    fn aligns_major_axis_with_first_dimension() {
        // points along the diagonal y = x
        let layout = DMatrix::from_row_slice(3, 2, &[0.0, 0.0, 1.0, 1.0, 2.0, 2.0]);
        let recentered = recenter(&layout);
        for i in 0..3 {
            assert!(recentered[(i, 1)].abs() < 1e-9);
        }
        assert!((recentered[(2, 0)].abs() - 2f64.sqrt()).abs() < 1e-9);
    }
}
