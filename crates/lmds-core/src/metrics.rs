//! Projection quality metrics
//!
//! Scores a 2D layout against the fixed high-D neighbor structure of the
//! dataset. The measures follow "Toward a Quantitative Survey of Dimension
//! Reduction Techniques" (Espadoto et al., DOI 10.1109/TVCG.2019.2944182).
//!
//! Every call builds a throwaway low-D neighbor index from the layout and
//! pairs it with the shared high-D index. The most recent layout scored at
//! each k is memoized; scoring a different layout at that k replaces it.

use ahash::AHasher;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::hash::Hasher;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::distance::DistanceMetric;
use crate::error::{LmdsError, Result};
use crate::neighbors::{ComputedNeighbors, InProcessCompute, Neighbor, NeighborCompute, NeighborIndex};

/// Scores of one layout at one neighborhood size.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSet {
    pub k: usize,
    pub trustworthiness: f64,
    pub continuity: f64,
    pub normalized_stress: f64,
    pub neighborhood_hit: f64,
    pub average_local_error: f64,
    /// Per-point local error, in dataset order
    pub local_errors: Vec<f64>,
    pub shepard_goodness: f64,
    /// (high-D, low-D) distance pairs of every point's k-NN arrays
    pub shepard_diagram: Vec<(f32, f32)>,
}

/// Metrics engine bound to one dataset's high-D neighbor index.
pub struct Metrics {
    high: Arc<dyn NeighborIndex + Send + Sync>,
    labels: Vec<Option<String>>,
    compute: Box<dyn NeighborCompute + Send + Sync>,
    /// Latest layout scored at each k, keyed by k
    cache: RwLock<HashMap<usize, (u64, MetricSet)>>,
}

impl Metrics {
    /// `labels` must hold one entry per point of `high`.
    pub fn new(high: Arc<dyn NeighborIndex + Send + Sync>, labels: Vec<Option<String>>) -> Result<Self> {
        if labels.len() != high.len() {
            return Err(LmdsError::InvalidDataset(format!(
                "{} labels for {} indexed points",
                labels.len(),
                high.len()
            )));
        }
        Ok(Self {
            high,
            labels,
            compute: Box::new(InProcessCompute),
            cache: RwLock::new(HashMap::new()),
        })
    }

    /// Build low-D indices with `compute` instead of in process.
    pub fn with_compute(mut self, compute: impl NeighborCompute + Send + Sync + 'static) -> Self {
        self.compute = Box::new(compute);
        self
    }

    pub fn metric(&self) -> DistanceMetric {
        self.high.metric()
    }

    pub fn len(&self) -> usize {
        self.high.len()
    }

    pub fn is_empty(&self) -> bool {
        self.high.is_empty()
    }

    /// Score `positions` (one 2D position per point, dataset order) using
    /// neighborhoods of size `k`.
    pub fn calculate_all_metrics<P: AsRef<[f64]>>(&self, positions: &[P], k: usize) -> Result<MetricSet> {
        let n = self.high.len();
        if positions.len() != n {
            return Err(LmdsError::InvalidDataset(format!(
                "{} positions for {} indexed points",
                positions.len(),
                n
            )));
        }
        check_neighbor_count(k, n)?;

        let layout = fingerprint(positions);
        if let Some((_, cached)) = self.cache.read().get(&k).filter(|(f, _)| *f == layout) {
            debug!(k, "Metrics cache hit");
            return Ok(cached.clone());
        }

        let start = Instant::now();
        let low = ComputedNeighbors::from_layout(positions, self.high.metric(), self.compute.as_ref())?;
        let metrics = self.score(&low, k)?;
        info!(
            k,
            points = n,
            trustworthiness = metrics.trustworthiness,
            continuity = metrics.continuity,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Computed projection metrics"
        );

        self.cache.write().insert(k, (layout, metrics.clone()));
        Ok(metrics)
    }

    fn score(&self, low: &ComputedNeighbors, k: usize) -> Result<MetricSet> {
        let high = self.high.as_ref();
        let n = high.len();

        let mut high_ranks = high.get_ranks();
        let mut low_ranks = low.get_ranks();

        let mut trust_sum = 0u64;
        let mut cont_sum = 0u64;
        let mut stress_num = 0.0f64;
        let mut stress_den = 0.0f64;
        let mut hits = 0.0f64;
        let mut local_errors = Vec::with_capacity(n);
        let mut shepard_diagram = Vec::with_capacity(n * k);

        for i in 0..n {
            let high_knn: Vec<Neighbor> = high.get_k_neighbors(i, k)?.collect();
            let low_knn: Vec<Neighbor> = low.get_k_neighbors(i, k)?.collect();
            let (high_rank, low_rank) = match (high_ranks.next(), low_ranks.next()) {
                (Some(h), Some(l)) => (h, l),
                _ => {
                    return Err(LmdsError::CorruptNeighborStore(format!(
                        "rank table ends before point {}",
                        i
                    )))
                }
            };

            let high_set: HashSet<usize> = high_knn.iter().map(|nb| nb.index).collect();
            let low_set: HashSet<usize> = low_knn.iter().map(|nb| nb.index).collect();

            // ranks of surprise members, each taken in the space it is missing from
            for &j in low_set.difference(&high_set) {
                trust_sum += u64::from(rank_of(&high_rank, i, j)?).saturating_sub(k as u64);
            }
            for &j in high_set.difference(&low_set) {
                cont_sum += u64::from(rank_of(&low_rank, i, j)?).saturating_sub(k as u64);
            }

            for (h, l) in high_knn.iter().zip(&low_knn) {
                let (hd, ld) = (f64::from(h.distance), f64::from(l.distance));
                stress_num += (hd - ld) * (hd - ld);
                stress_den += hd * hd;
                shepard_diagram.push((h.distance, l.distance));
            }

            if let Some(label) = self.labels.get(i).and_then(|l| l.as_deref()) {
                let same = low_knn
                    .iter()
                    .filter(|nb| self.labels.get(nb.index).and_then(|l| l.as_deref()) == Some(label))
                    .count();
                hits += same as f64 / k as f64;
            }

            local_errors.push(local_error(&high_knn, &low_knn));
        }

        let (n_f, k_f) = (n as f64, k as f64);
        let factor = 2.0 / (n_f * k_f * (2.0 * n_f - 3.0 * k_f - 1.0));
        let (high_distances, low_distances): (Vec<f64>, Vec<f64>) = shepard_diagram
            .iter()
            .map(|&(h, l)| (f64::from(h), f64::from(l)))
            .unzip();

        Ok(MetricSet {
            k,
            trustworthiness: 1.0 - factor * trust_sum as f64,
            continuity: 1.0 - factor * cont_sum as f64,
            normalized_stress: if stress_den == 0.0 {
                0.0
            } else {
                stress_num / stress_den
            },
            neighborhood_hit: hits / n_f,
            average_local_error: local_errors.iter().sum::<f64>() / n_f,
            local_errors,
            shepard_goodness: spearman(&high_distances, &low_distances),
            shepard_diagram,
        })
    }
}

/// Rank of `j` in the rank vector of point `i`.
fn rank_of(ranks: &[u16], i: usize, j: usize) -> Result<u16> {
    ranks.get(j).copied().ok_or_else(|| {
        LmdsError::CorruptNeighborStore(format!(
            "neighbor {} of point {} is outside the {} ranked points",
            j,
            i,
            ranks.len()
        ))
    })
}

/// `k` must leave the trustworthiness normalization positive.
fn check_neighbor_count(k: usize, points: usize) -> Result<()> {
    let valid = k >= 1 && k < points && 2 * points > 3 * k + 1;
    if !valid {
        return Err(LmdsError::InvalidNeighborCount { k, points });
    }
    Ok(())
}

fn fingerprint<P: AsRef<[f64]>>(positions: &[P]) -> u64 {
    let mut hasher = AHasher::default();
    for position in positions {
        let position = position.as_ref();
        hasher.write_usize(position.len());
        for value in position {
            hasher.write_u64(value.to_bits());
        }
    }
    hasher.finish()
}

/// Mean absolute difference of the two k-NN distance arrays, each scaled by
/// its own largest distance.
fn local_error(high: &[Neighbor], low: &[Neighbor]) -> f64 {
    if high.is_empty() {
        return 0.0;
    }
    let scale = |nbs: &[Neighbor]| {
        let max = nbs.iter().map(|nb| f64::from(nb.distance)).fold(0.0, f64::max);
        if max > 0.0 {
            max
        } else {
            1.0
        }
    };
    let (high_max, low_max) = (scale(high), scale(low));
    high.iter()
        .zip(low)
        .map(|(h, l)| (f64::from(h.distance) / high_max - f64::from(l.distance) / low_max).abs())
        .sum::<f64>()
        / high.len() as f64
}

/// Spearman rank correlation using average ranks for ties.
///
/// Returns 0 when either input has no variance.
pub fn spearman(x: &[f64], y: &[f64]) -> f64 {
    let (rx, ry) = (average_ranks(x), average_ranks(y));
    let n = rx.len().min(ry.len());
    if n == 0 {
        return 0.0;
    }
    let mean_x = rx.iter().sum::<f64>() / n as f64;
    let mean_y = ry.iter().sum::<f64>() / n as f64;

    let mut cov = 0.0;
    let mut var_x = 0.0;
    let mut var_y = 0.0;
    for (a, b) in rx.iter().zip(&ry) {
        let (dx, dy) = (a - mean_x, b - mean_y);
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }

    if var_x == 0.0 || var_y == 0.0 {
        warn!(samples = n, "Rank correlation of a constant sequence, reporting 0");
        return 0.0;
    }
    cov / (var_x.sqrt() * var_y.sqrt())
}

fn average_ranks(values: &[f64]) -> Vec<f64> {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&a, &b| values[a].total_cmp(&values[b]));

    let mut ranks = vec![0.0; values.len()];
    let mut start = 0;
    while start < order.len() {
        let mut end = start + 1;
        while end < order.len() && values[order[end]] == values[order[start]] {
            end += 1;
        }
        // 1-based ranks start+1..=end share their mean
        let rank = (start + end + 1) as f64 / 2.0;
        for &i in &order[start..end] {
            ranks[i] = rank;
        }
        start = end;
    }
    ranks
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn line(xs: &[f64]) -> Vec<[f64; 2]> {
        xs.iter().map(|&x| [x, 0.0]).collect()
    }

    fn metrics_over(high: &[[f64; 2]], labels: &[&str]) -> Metrics {
        let index = ComputedNeighbors::from_layout(high, DistanceMetric::Euclidean, &InProcessCompute).unwrap();
        Metrics::new(
            Arc::new(index),
            labels.iter().map(|l| Some(l.to_string())).collect(),
        )
        .unwrap()
    }

    #[test]
    fn scores_a_scrambled_line() {
        let metrics = metrics_over(&line(&[0.0, 1.0, 3.0, 7.0]), &["a", "a", "b", "b"]);
        let set = metrics
            .calculate_all_metrics(&line(&[0.0, 5.0, 1.0, 2.0]), 1)
            .unwrap();

        assert!((set.trustworthiness - 0.5).abs() < 1e-12);
        assert!((set.continuity - 0.25).abs() < 1e-12);
        assert!((set.normalized_stress - 14.0 / 22.0).abs() < 1e-9);
        assert!((set.neighborhood_hit - 0.25).abs() < 1e-12);
        assert_eq!(set.shepard_diagram, vec![(1.0, 1.0), (1.0, 3.0), (2.0, 1.0), (4.0, 1.0)]);
        assert!((set.shepard_goodness + 2.0 / 13.5f64.sqrt()).abs() < 1e-9);
        assert_eq!(set.local_errors, vec![0.0; 4]);
    }

    #[test]
    fn identical_layouts_score_perfectly() {
        let layout: Vec<[f64; 2]> = (0..12)
            .map(|i| [(i % 4) as f64 * 1.5 + i as f64 * 0.01, (i / 4) as f64 * 2.0])
            .collect();
        let labels: Vec<&str> = (0..12).map(|i| if i % 4 < 2 { "x" } else { "y" }).collect();
        let metrics = metrics_over(&layout, &labels);

        for k in 1..=3 {
            let set = metrics.calculate_all_metrics(&layout, k).unwrap();
            assert_eq!(set.trustworthiness, 1.0);
            assert_eq!(set.continuity, 1.0);
            assert_eq!(set.normalized_stress, 0.0);
            assert_eq!(set.average_local_error, 0.0);
            assert!((set.shepard_goodness - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn repeated_requests_hit_the_cache() {
        let layout = line(&[0.0, 1.0, 3.0, 7.0, 15.0, 31.0]);
        let metrics = metrics_over(&layout, &["a"; 6]);
        let first = metrics.calculate_all_metrics(&layout, 2).unwrap();
        let second = metrics.calculate_all_metrics(&layout, 2).unwrap();
        assert_eq!(first, second);
        assert_eq!(metrics.cache.read().len(), 1);

        metrics.calculate_all_metrics(&layout, 1).unwrap();
        assert_eq!(metrics.cache.read().len(), 2);
    }

    #[test]
    fn cache_keeps_one_layout_per_neighbor_count() {
        let layout = line(&[0.0, 1.0, 3.0, 7.0, 15.0, 31.0]);
        let metrics = metrics_over(&layout, &["a"; 6]);

        for shift in 0..20 {
            let dragged = line(&[0.0, 1.0, 3.0, 7.0, 15.0, 31.0 - shift as f64 * 0.5]);
            metrics.calculate_all_metrics(&dragged, 2).unwrap();
        }
        assert_eq!(metrics.cache.read().len(), 1);

        let latest = line(&[0.0, 1.0, 3.0, 7.0, 15.0, 21.5]);
        let hit = metrics.calculate_all_metrics(&latest, 2).unwrap();
        let fresh = metrics_over(&layout, &["a"; 6]).calculate_all_metrics(&latest, 2).unwrap();
        assert_eq!(hit, fresh);

        let first = metrics.calculate_all_metrics(&layout, 2).unwrap();
        assert_eq!(metrics.cache.read().len(), 1);
        assert_eq!(first.trustworthiness, 1.0);
    }

    #[test]
    fn out_of_range_ranks_are_reported() {
        assert_eq!(rank_of(&[0, 2, 1], 0, 2).unwrap(), 1);
        assert!(matches!(
            rank_of(&[0, 2, 1], 0, 60000),
            Err(LmdsError::CorruptNeighborStore(_))
        ));
    }

    #[test]
    fn unlabeled_points_never_hit() {
        let layout = line(&[0.0, 1.0, 2.5, 4.5]);
        let index = ComputedNeighbors::from_layout(&layout, DistanceMetric::Euclidean, &InProcessCompute).unwrap();
        let metrics = Metrics::new(Arc::new(index), vec![None; 4]).unwrap();
        let set = metrics.calculate_all_metrics(&layout, 1).unwrap();
        assert_eq!(set.neighborhood_hit, 0.0);
    }

    #[test]
    fn rejects_invalid_neighbor_counts() {
        let layout = line(&[0.0, 1.0, 3.0, 7.0]);
        let metrics = metrics_over(&layout, &["a"; 4]);
        for k in [0, 3, 4] {
            assert!(matches!(
                metrics.calculate_all_metrics(&layout, k),
                Err(LmdsError::InvalidNeighborCount { points: 4, .. })
            ));
        }
    }

    #[test]
    fn rejects_mismatched_inputs() {
        let layout = line(&[0.0, 1.0, 3.0]);
        let index = ComputedNeighbors::from_layout(&layout, DistanceMetric::Euclidean, &InProcessCompute).unwrap();
        assert!(matches!(
            Metrics::new(Arc::new(index), vec![None; 2]),
            Err(LmdsError::InvalidDataset(_))
        ));

        let metrics = metrics_over(&layout, &["a"; 3]);
        assert!(matches!(
            metrics.calculate_all_metrics(&line(&[0.0, 1.0]), 1),
            Err(LmdsError::InvalidDataset(_))
        ));
    }

    #[test]
    fn spearman_handles_ties_and_constants() {
        assert!((spearman(&[1.0, 2.0, 3.0], &[10.0, 20.0, 30.0]) - 1.0).abs() < 1e-12);
        assert!((spearman(&[1.0, 2.0, 3.0], &[3.0, 2.0, 1.0]) + 1.0).abs() < 1e-12);
        assert_eq!(spearman(&[1.0, 1.0, 1.0], &[1.0, 2.0, 3.0]), 0.0);
        assert_eq!(average_ranks(&[5.0, 1.0, 5.0, 2.0]), vec![3.5, 1.0, 3.5, 2.0]);
    }
}
