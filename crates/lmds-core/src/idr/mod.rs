//! Inverse dimensionality reduction
//!
//! Estimates the landmarks' high-D squared distance matrix from their current
//! low-D layout, so that user edits to landmark positions can be pushed back
//! through the extension step.
//!
//! | algorithm | estimate                                            |
//! |-----------|-----------------------------------------------------|
//! | `none`    | the matrix computed during reduction, unchanged      |
//! | `trivial` | the low-D squared distances themselves               |
//! | `nn_*`    | a trained [`Predictor`] loaded from the model directory |

mod predictor;

pub use predictor::{Activation, ModelKind, Predictor};

use nalgebra::DMatrix;
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

use crate::config::LmdsConfig;
use crate::distance::DistanceMetric;
use crate::error::{LmdsError, Result};

const NEURAL_PREFIX: &str = "nn_";

/// Inverse-DR algorithm selected by name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum InverseDrAlgorithm {
    None,
    Trivial,
    /// Trained predictor, e.g. `nn_imdb`
    NeuralNetwork(String),
}

impl InverseDrAlgorithm {
    pub fn name(&self) -> &str {
        match self {
            InverseDrAlgorithm::None => "none",
            InverseDrAlgorithm::Trivial => "trivial",
            InverseDrAlgorithm::NeuralNetwork(name) => name,
        }
    }
}

impl fmt::Display for InverseDrAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for InverseDrAlgorithm {
    type Err = LmdsError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "none" => Ok(InverseDrAlgorithm::None),
            "trivial" => Ok(InverseDrAlgorithm::Trivial),
            name if name.len() > NEURAL_PREFIX.len() && name.starts_with(NEURAL_PREFIX) => {
                Ok(InverseDrAlgorithm::NeuralNetwork(name.to_string()))
            }
            other => Err(LmdsError::UnsupportedModelKind(other.to_string())),
        }
    }
}

impl TryFrom<String> for InverseDrAlgorithm {
    type Error = LmdsError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<InverseDrAlgorithm> for String {
    fn from(value: InverseDrAlgorithm) -> Self {
        value.name().to_string()
    }
}

/// A resolved inverse-DR step, with its predictor loaded when neural.
#[derive(Debug, Clone)]
pub struct InverseDr {
    algorithm: InverseDrAlgorithm,
    predictor: Option<Predictor>,
}

impl InverseDr {
    pub fn none() -> Self {
        Self {
            algorithm: InverseDrAlgorithm::None,
            predictor: None,
        }
    }

    pub fn trivial() -> Self {
        Self {
            algorithm: InverseDrAlgorithm::Trivial,
            predictor: None,
        }
    }

    /// Resolve an algorithm name, loading the predictor trained for `metric`
    /// from the model directory when the name is neural.
    pub fn resolve(name: &str, config: &LmdsConfig, metric: DistanceMetric) -> Result<Self> {
        match name.parse::<InverseDrAlgorithm>()? {
            InverseDrAlgorithm::None => Ok(Self::none()),
            InverseDrAlgorithm::Trivial => Ok(Self::trivial()),
            InverseDrAlgorithm::NeuralNetwork(model) => {
                let predictor = Predictor::load(config.model_path(&model, metric))?;
                Ok(Self {
                    algorithm: InverseDrAlgorithm::NeuralNetwork(model),
                    predictor: Some(predictor),
                })
            }
        }
    }

    pub fn algorithm(&self) -> &InverseDrAlgorithm {
        &self.algorithm
    }

    /// Estimate the landmarks' high-D squared distances.
    ///
    /// `low_squared` holds the squared distances of the current landmark
    /// layout, `reduced` the matrix computed during reduction.
    pub fn estimate(
        &self,
        low_squared: &DMatrix<f64>,
        reduced: &DMatrix<f64>,
    ) -> Result<DMatrix<f64>> {
        debug!(algorithm = %self.algorithm, "Estimating landmark distances");
        match (&self.algorithm, &self.predictor) {
            (InverseDrAlgorithm::None, _) => Ok(reduced.clone()),
            (InverseDrAlgorithm::Trivial, _) => Ok(low_squared.clone()),
            (InverseDrAlgorithm::NeuralNetwork(_), Some(predictor)) => {
                let n = low_squared.nrows();
                let input = Array2::from_shape_fn((n, low_squared.ncols()), |(i, j)| {
                    low_squared[(i, j)]
                });
                let predicted = predictor.predict(&input)?;
                Ok(DMatrix::from_fn(n, n, |i, j| predicted[[i, j]]))
            }
            (InverseDrAlgorithm::NeuralNetwork(name), None) => Err(LmdsError::ModelLoadError(
                format!("predictor for '{}' not loaded", name),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::predictor::tests::write_identity_model;
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_algorithm_names() {
        assert_eq!("none".parse::<InverseDrAlgorithm>().unwrap(), InverseDrAlgorithm::None);
        assert_eq!(
            "trivial".parse::<InverseDrAlgorithm>().unwrap(),
            InverseDrAlgorithm::Trivial
        );
        assert_eq!(
            "nn_imdb".parse::<InverseDrAlgorithm>().unwrap(),
            InverseDrAlgorithm::NeuralNetwork("nn_imdb".to_string())
        );
        for bad in ["nn_", "linear", "NONE"] {
            assert!(matches!(
                bad.parse::<InverseDrAlgorithm>(),
                Err(LmdsError::UnsupportedModelKind(_))
            ));
        }
    }

    #[test]
    fn serializes_as_name() {
        let algorithm: InverseDrAlgorithm = serde_json::from_str("\"nn_imdb\"").unwrap();
        assert_eq!(serde_json::to_string(&algorithm).unwrap(), "\"nn_imdb\"");
        assert!(serde_json::from_str::<InverseDrAlgorithm>("\"tsne\"").is_err());
    }

    #[test]
    fn none_and_trivial_pick_their_matrix() {
        let low = DMatrix::from_row_slice(2, 2, &[0.0, 1.0, 1.0, 0.0]);
        let reduced = DMatrix::from_row_slice(2, 2, &[0.0, 7.0, 7.0, 0.0]);
        assert_eq!(InverseDr::none().estimate(&low, &reduced).unwrap(), reduced);
        assert_eq!(InverseDr::trivial().estimate(&low, &reduced).unwrap(), low);
    }

    #[test]
    fn resolves_neural_predictor_per_metric() {
        let dir = tempfile::tempdir().unwrap();
        let config = LmdsConfig {
            model_dir: dir.path().to_path_buf(),
            ..Default::default()
        };
        write_identity_model(
            &config.model_path("nn_toy", DistanceMetric::Cosine),
            "OneLayerModel",
            3,
        );

        let idr = InverseDr::resolve("nn_toy", &config, DistanceMetric::Cosine).unwrap();
        let low = DMatrix::from_row_slice(2, 2, &[0.0, 4.0, 4.0, 0.0]);
        let estimate = idr.estimate(&low, &DMatrix::zeros(2, 2)).unwrap();
        assert!((estimate[(0, 1)] - 4.0).abs() < 1e-12);

        assert!(matches!(
            InverseDr::resolve("nn_toy", &config, DistanceMetric::Euclidean),
            Err(LmdsError::ModelLoadError(_))
        ));
    }
}
