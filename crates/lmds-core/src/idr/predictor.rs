//! Feed-forward distance predictor loaded from a model directory
//!
//! A model directory holds two JSON files:
//!
//! - `params.json`: `model_name` (`OneLayerModel` or `TwoLayerModel`),
//!   `max_landmarks`, `model_params` (hidden widths), `inner_activation` and
//!   `end_activation` (`relu`, `tanh`, `sigmoid` or `identity`)
//! - `weights.json`: one `{"weight": [[..]], "bias": [..]}` object per linear
//!   layer, weights stored output-major

use ndarray::{Array1, Array2};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use tracing::{debug, info};

use crate::error::{LmdsError, Result};

const PARAMS_FILE: &str = "params.json";
const WEIGHTS_FILE: &str = "weights.json";

/// Value used for padded matrix entries.
const PADDING: f64 = -1.0;

/// Network architecture named in `params.json`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelKind {
    OneLayer,
    TwoLayer,
}

impl ModelKind {
    fn parse(name: &str) -> Result<Self> {
        match name {
            "OneLayerModel" => Ok(ModelKind::OneLayer),
            "TwoLayerModel" => Ok(ModelKind::TwoLayer),
            other => Err(LmdsError::UnsupportedModelKind(other.to_string())),
        }
    }

    fn hidden_layers(&self) -> usize {
        match self {
            ModelKind::OneLayer => 1,
            ModelKind::TwoLayer => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activation {
    Relu,
    Tanh,
    Sigmoid,
    Identity,
}

impl Activation {
    fn parse(name: &str) -> Result<Self> {
        match name {
            "relu" => Ok(Activation::Relu),
            "tanh" => Ok(Activation::Tanh),
            "sigmoid" => Ok(Activation::Sigmoid),
            "identity" => Ok(Activation::Identity),
            other => Err(LmdsError::ModelLoadError(format!(
                "unknown activation '{}'",
                other
            ))),
        }
    }

    fn apply(&self, x: Array1<f64>) -> Array1<f64> {
        match self {
            Activation::Relu => x.mapv(|v| v.max(0.0)),
            Activation::Tanh => x.mapv(f64::tanh),
            Activation::Sigmoid => x.mapv(|v| 1.0 / (1.0 + (-v).exp())),
            Activation::Identity => x,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawParams {
    model_name: String,
    max_landmarks: usize,
    model_params: Vec<usize>,
    #[serde(default = "default_activation")]
    inner_activation: String,
    #[serde(default = "default_activation")]
    end_activation: String,
}

fn default_activation() -> String {
    "relu".to_string()
}

#[derive(Debug, Deserialize)]
struct RawLayer {
    weight: Vec<Vec<f64>>,
    bias: Vec<f64>,
}

#[derive(Debug, Clone)]
struct Dense {
    weight: Array2<f64>,
    bias: Array1<f64>,
}

impl Dense {
    fn from_raw(index: usize, raw: RawLayer) -> Result<Self> {
        let rows = raw.weight.len();
        let cols = raw.weight.first().map(Vec::len).unwrap_or(0);
        if rows == 0 || cols == 0 || raw.weight.iter().any(|r| r.len() != cols) {
            return Err(LmdsError::ModelLoadError(format!(
                "layer {} weight is not a non-empty rectangular matrix",
                index
            )));
        }
        if raw.bias.len() != rows {
            return Err(LmdsError::ModelLoadError(format!(
                "layer {} has {} outputs but {} biases",
                index,
                rows,
                raw.bias.len()
            )));
        }
        let weight = Array2::from_shape_vec((rows, cols), raw.weight.into_iter().flatten().collect())
            .map_err(|e| LmdsError::ModelLoadError(format!("layer {}: {}", index, e)))?;
        Ok(Self {
            weight,
            bias: Array1::from(raw.bias),
        })
    }

    fn inputs(&self) -> usize {
        self.weight.ncols()
    }

    fn outputs(&self) -> usize {
        self.weight.nrows()
    }

    fn forward(&self, x: &Array1<f64>) -> Array1<f64> {
        self.weight.dot(x) + &self.bias
    }
}

/// Loaded distance predictor.
#[derive(Debug, Clone)]
pub struct Predictor {
    kind: ModelKind,
    max_landmarks: usize,
    layers: Vec<Dense>,
    inner_activation: Activation,
    end_activation: Activation,
}

impl Predictor {
    /// Load a predictor from a model directory.
    pub fn load(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        info!("Loading iDR predictor from {}", dir.display());

        let params: RawParams = read_json(&dir.join(PARAMS_FILE))?;
        let raw_layers: Vec<RawLayer> = read_json(&dir.join(WEIGHTS_FILE))?;

        let kind = ModelKind::parse(&params.model_name)?;
        if params.max_landmarks < 2 {
            return Err(LmdsError::ModelLoadError(format!(
                "max_landmarks must be at least 2, got {}",
                params.max_landmarks
            )));
        }
        if params.model_params.len() != kind.hidden_layers() {
            return Err(LmdsError::ModelLoadError(format!(
                "{} expects {} hidden widths, got {}",
                params.model_name,
                kind.hidden_layers(),
                params.model_params.len()
            )));
        }

        let layers = raw_layers
            .into_iter()
            .enumerate()
            .map(|(i, raw)| Dense::from_raw(i, raw))
            .collect::<Result<Vec<_>>>()?;

        let features = triangle_len(params.max_landmarks);
        let mut widths = vec![features];
        widths.extend(&params.model_params);
        widths.push(features);
        if layers.len() != widths.len() - 1 {
            return Err(LmdsError::ModelLoadError(format!(
                "{} expects {} layers, weights hold {}",
                params.model_name,
                widths.len() - 1,
                layers.len()
            )));
        }
        for (i, (layer, pair)) in layers.iter().zip(widths.windows(2)).enumerate() {
            if layer.inputs() != pair[0] || layer.outputs() != pair[1] {
                return Err(LmdsError::ModelLoadError(format!(
                    "layer {} is {}x{}, expected {}x{}",
                    i,
                    layer.outputs(),
                    layer.inputs(),
                    pair[1],
                    pair[0]
                )));
            }
        }

        let predictor = Self {
            kind,
            max_landmarks: params.max_landmarks,
            layers,
            inner_activation: Activation::parse(&params.inner_activation)?,
            end_activation: Activation::parse(&params.end_activation)?,
        };
        info!(
            kind = ?predictor.kind,
            max_landmarks = predictor.max_landmarks,
            "iDR predictor loaded"
        );
        Ok(predictor)
    }

    pub fn kind(&self) -> ModelKind {
        self.kind
    }

    pub fn max_landmarks(&self) -> usize {
        self.max_landmarks
    }

    /// Predict high-D squared distances from a low-D squared distance matrix.
    ///
    /// The network works on plain distances: the input is square-rooted,
    /// padded with `-1` to `max_landmarks`, flattened to its strict upper
    /// triangle, run through the layers and rebuilt into a symmetric matrix
    /// cropped back to the input size, then squared.
    pub fn predict(&self, squared: &Array2<f64>) -> Result<Array2<f64>> {
        let n = squared.nrows();
        if n != squared.ncols() {
            return Err(LmdsError::InvalidDataset(format!(
                "distance matrix must be square, got {}x{}",
                n,
                squared.ncols()
            )));
        }
        if n > self.max_landmarks {
            return Err(LmdsError::UnsupportedDimensionality {
                found: n,
                expected: format!("at most {} landmarks", self.max_landmarks),
            });
        }

        let m = self.max_landmarks;
        let mut padded = Array2::from_elem((m, m), PADDING);
        for i in 0..n {
            for j in 0..n {
                padded[[i, j]] = squared[[i, j]].max(0.0).sqrt();
            }
        }

        let mut features = Vec::with_capacity(triangle_len(m));
        for i in 0..m {
            for j in (i + 1)..m {
                features.push(padded[[i, j]]);
            }
        }

        let output = self.forward(Array1::from(features));
        debug!(landmarks = n, features = output.len(), "iDR forward pass");

        let mut predicted = Array2::zeros((n, n));
        let mut k = 0;
        for i in 0..m {
            for j in (i + 1)..m {
                if i < n && j < n {
                    let d = output[k] * output[k];
                    predicted[[i, j]] = d;
                    predicted[[j, i]] = d;
                }
                k += 1;
            }
        }
        Ok(predicted)
    }

    fn forward(&self, input: Array1<f64>) -> Array1<f64> {
        let last = self.layers.len() - 1;
        self.layers
            .iter()
            .enumerate()
            .fold(input, |x, (i, layer)| {
                let activation = if i == last {
                    self.end_activation
                } else {
                    self.inner_activation
                };
                activation.apply(layer.forward(&x))
            })
    }
}

fn triangle_len(m: usize) -> usize {
    m * (m - 1) / 2
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    if !path.exists() {
        return Err(LmdsError::ModelLoadError(format!(
            "file not found: {}",
            path.display()
        )));
    }
    let contents = fs::read_to_string(path)?;
    serde_json::from_str(&contents)
        .map_err(|e| LmdsError::ModelLoadError(format!("{}: {}", path.display(), e)))
}
