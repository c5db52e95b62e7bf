//! Distance metrics shared by the projection engine and the neighbor index

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::LmdsError;

/// Distance metric over embedding or layout vectors.
///
/// The byte code is what the binary neighbor store records in its header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMetric {
    Euclidean,
    Cosine,
}

impl DistanceMetric {
    pub const ALL: [DistanceMetric; 2] = [DistanceMetric::Euclidean, DistanceMetric::Cosine];

    pub fn name(&self) -> &'static str {
        match self {
            DistanceMetric::Euclidean => "euclidean",
            DistanceMetric::Cosine => "cosine",
        }
    }

    /// Header byte for the binary neighbor store.
    pub fn code(&self) -> u8 {
        match self {
            DistanceMetric::Euclidean => b'e',
            DistanceMetric::Cosine => b'c',
        }
    }

    pub fn from_code(code: u8) -> Result<Self, LmdsError> {
        match code {
            b'e' => Ok(DistanceMetric::Euclidean),
            b'c' => Ok(DistanceMetric::Cosine),
            other => Err(LmdsError::UnknownDistanceMetric(format!(
                "code 0x{:02x}",
                other
            ))),
        }
    }

    /// Distance between two vectors, as stored in the neighbor index.
    ///
    /// # Panics
    ///
    /// If the slices differ in length.
    pub fn distance(&self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            DistanceMetric::Euclidean => euclidean_distance(a, b),
            DistanceMetric::Cosine => 1.0 - cosine_similarity(a, b),
        }
    }

    /// Squared distance accumulated in f64, as used for MDS distance matrices.
    ///
    /// # Panics
    ///
    /// If the slices differ in length.
    pub fn squared_distance(&self, a: &[f32], b: &[f32]) -> f64 {
        match self {
            DistanceMetric::Euclidean => squared_euclidean(a, b),
            DistanceMetric::Cosine => {
                let d = 1.0 - cosine_similarity_f64(a, b);
                d * d
            }
        }
    }

    /// Squared distance between two f64 vectors (layout positions).
    ///
    /// # Panics
    ///
    /// If the slices differ in length.
    pub fn squared_distance_f64(&self, a: &[f64], b: &[f64]) -> f64 {
        check_dimensions(a.len(), b.len());
        match self {
            DistanceMetric::Euclidean => a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum(),
            DistanceMetric::Cosine => {
                let mut dot = 0.0;
                let mut norm_a = 0.0;
                let mut norm_b = 0.0;
                for (x, y) in a.iter().zip(b) {
                    dot += x * y;
                    norm_a += x * x;
                    norm_b += y * y;
                }
                let denom = norm_a.sqrt() * norm_b.sqrt();
                let d = if denom == 0.0 { 1.0 } else { 1.0 - dot / denom };
                d * d
            }
        }
    }
}

impl fmt::Display for DistanceMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DistanceMetric {
    type Err = LmdsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "euclidean" => Ok(DistanceMetric::Euclidean),
            "cosine" => Ok(DistanceMetric::Cosine),
            _ => Err(LmdsError::UnknownDistanceMetric(s.to_string())),
        }
    }
}

fn check_dimensions(a: usize, b: usize) {
    assert_eq!(a, b, "vector dimension mismatch: {} vs {}", a, b);
}

/// Euclidean distance between two f32 slices.
///
/// # Panics
///
/// If the slices differ in length.
pub fn euclidean_distance(a: &[f32], b: &[f32]) -> f32 {
    squared_euclidean(a, b).sqrt() as f32
}

fn squared_euclidean(a: &[f32], b: &[f32]) -> f64 {
    check_dimensions(a.len(), b.len());

    let mut sum = 0.0f64;
    for i in 0..a.len() {
        let d = a[i] as f64 - b[i] as f64;
        sum += d * d;
    }
    sum
}

/// Cosine similarity between two f32 slices.
///
/// Returns 0.0 if either vector has zero magnitude.
///
/// # Panics
///
/// If the slices differ in length.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    cosine_similarity_f64(a, b) as f32
}

fn cosine_similarity_f64(a: &[f32], b: &[f32]) -> f64 {
    check_dimensions(a.len(), b.len());

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;

    for i in 0..a.len() {
        let (x, y) = (a[i] as f64, b[i] as f64);
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom == 0.0 {
        return 0.0;
    }

    dot / denom
}
