//! Landmark selection heuristics
//!
//! Selection is reproducible: the same heuristic, seed and dataset always
//! yield the same ordered landmark indices.

use rand::seq::{index, SliceRandom};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use tracing::debug;

use crate::dataset::Dataset;
use crate::error::{LmdsError, Result};

/// Default seed used by the API layer when none is given.
pub const DEFAULT_SEED: u64 = 42;

/// Landmark selection heuristic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Heuristic {
    /// Round-robin over label partitions, guaranteeing label diversity
    Balanced,
    /// Uniform sample without replacement
    Random,
    /// First rows of the dataset
    First,
}

impl Heuristic {
    pub const ALL: [Heuristic; 3] = [Heuristic::Balanced, Heuristic::Random, Heuristic::First];

    pub fn name(&self) -> &'static str {
        match self {
            Heuristic::Balanced => "balanced",
            Heuristic::Random => "random",
            Heuristic::First => "first",
        }
    }

    /// Select `count` distinct landmark indices from `dataset`.
    pub fn select(&self, dataset: &Dataset, count: usize, seed: u64) -> Result<Vec<usize>> {
        if count == 0 {
            return Err(LmdsError::InvalidLandmarkCount(count));
        }
        if count > dataset.len() {
            return Err(LmdsError::InsufficientData {
                requested: count,
                available: dataset.len(),
            });
        }

        let indices = match self {
            Heuristic::Random => random(dataset.len(), count, seed),
            Heuristic::First => (0..count).collect(),
            Heuristic::Balanced => balanced(dataset, count, seed),
        };

        debug!(
            heuristic = self.name(),
            seed,
            count = indices.len(),
            "Selected landmarks"
        );
        Ok(indices)
    }
}

impl fmt::Display for Heuristic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Heuristic {
    type Err = LmdsError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "balanced" => Ok(Heuristic::Balanced),
            "random" => Ok(Heuristic::Random),
            "first" => Ok(Heuristic::First),
            _ => Err(LmdsError::InvalidHeuristic(s.to_string())),
        }
    }
}

fn random(len: usize, count: usize, seed: u64) -> Vec<usize> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    index::sample(&mut rng, len, count).into_vec()
}

/// Shuffle rows, partition them by label, shuffle the partition order, then
/// take one row per partition in turn until `count` rows are collected.
fn balanced(dataset: &Dataset, count: usize, seed: u64) -> Vec<usize> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);

    let mut order: Vec<usize> = (0..dataset.len()).collect();
    order.shuffle(&mut rng);

    let mut slots: HashMap<Option<&str>, usize> = HashMap::new();
    let mut partitions: Vec<Vec<usize>> = Vec::new();
    for &i in &order {
        let slot = *slots.entry(dataset.label(i)).or_insert_with(|| {
            partitions.push(Vec::new());
            partitions.len() - 1
        });
        partitions[slot].push(i);
    }
    partitions.shuffle(&mut rng);

    let mut cursors = vec![0usize; partitions.len()];
    let mut selected = Vec::with_capacity(count);
    while selected.len() < count {
        for (partition, cursor) in partitions.iter().zip(cursors.iter_mut()) {
            if selected.len() == count {
                break;
            }
            if let Some(&i) = partition.get(*cursor) {
                selected.push(i);
                *cursor += 1;
            }
        }
    }
    selected
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::DataPoint;
    use pretty_assertions::assert_eq;
    use std::collections::HashSet;

    fn labeled(labels: &[&str]) -> Dataset {
        let points = labels
            .iter()
            .enumerate()
            .map(|(i, l)| DataPoint::new(vec![i as f32, 0.0]).with_label(*l))
            .collect();
        Dataset::new("labeled", points).unwrap()
    }

    fn assert_distinct_in_range(indices: &[usize], count: usize, len: usize) {
        assert_eq!(indices.len(), count);
        let unique: HashSet<_> = indices.iter().collect();
        assert_eq!(unique.len(), count, "duplicate landmark in {:?}", indices);
        assert!(indices.iter().all(|&i| i < len));
    }

    #[test]
    fn every_heuristic_returns_distinct_indices() {
        let labels: Vec<&str> = (0..50).map(|i| if i % 7 == 0 { "rare" } else { "common" }).collect();
        let dataset = labeled(&labels);
        for heuristic in Heuristic::ALL {
            for seed in [0, 42, 642465, 87575675] {
                let indices = heuristic.select(&dataset, 20, seed).unwrap();
                assert_distinct_in_range(&indices, 20, 50);
            }
        }
    }

    #[test]
    fn selection_is_reproducible() {
        let dataset = labeled(&["a", "b", "c", "a", "b", "c", "a", "a", "a", "a", "b", "c"]);
        for heuristic in Heuristic::ALL {
            let first = heuristic.select(&dataset, 6, 7).unwrap();
            let second = heuristic.select(&dataset, 6, 7).unwrap();
            assert_eq!(first, second);
        }
    }

    #[test]
    fn first_takes_leading_rows() {
        let dataset = labeled(&["a"; 10]);
        assert_eq!(
            Heuristic::First.select(&dataset, 4, 99).unwrap(),
            vec![0, 1, 2, 3]
        );
    }

    #[test]
    fn balanced_covers_every_label_when_skewed() {
        let mut labels = vec!["majority"; 40];
        labels.extend(["minority_a", "minority_b", "minority_c"]);
        let dataset = labeled(&labels);

        let indices = Heuristic::Balanced.select(&dataset, 10, 42).unwrap();
        assert_distinct_in_range(&indices, 10, dataset.len());

        let chosen: HashSet<_> = indices.iter().map(|&i| dataset.label(i)).collect();
        assert_eq!(chosen.len(), 4, "all labels should be represented");
    }

    #[test]
    fn balanced_can_exhaust_small_partitions() {
        let dataset = labeled(&["a", "b", "b", "b", "b"]);
        let indices = Heuristic::Balanced.select(&dataset, 5, 1).unwrap();
        assert_distinct_in_range(&indices, 5, 5);
    }

    #[test]
    fn rejects_too_many_landmarks() {
        let dataset = labeled(&["a", "b", "c"]);
        assert!(matches!(
            Heuristic::Random.select(&dataset, 4, 0),
            Err(LmdsError::InsufficientData {
                requested: 4,
                available: 3
            })
        ));
        assert!(matches!(
            Heuristic::First.select(&dataset, 0, 0),
            Err(LmdsError::InvalidLandmarkCount(0))
        ));
    }

    #[test]
    fn unknown_heuristic_is_rejected() {
        assert!(matches!(
            "farthest".parse::<Heuristic>(),
            Err(LmdsError::InvalidHeuristic(_))
        ));
        assert_eq!("Balanced".parse::<Heuristic>().unwrap(), Heuristic::Balanced);
    }
}
