//! Runtime configuration: data/model locations and projection parameters

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::distance::DistanceMetric;
use crate::landmarks::Heuristic;

/// Recommended landmark count range for interactive use.
pub const LANDMARK_AMOUNT_RANGE: (usize, usize) = (10, 30);

/// Default output dimensionality of the projection.
pub const DEFAULT_DIMENSION: usize = 2;

const DOCKER_DATA_DIR: &str = "/server/data";
const LOCAL_DATA_DIR: &str = "./volumes/data";
const DOCKER_MODEL_DIR: &str = "/server/models";
const LOCAL_MODEL_DIR: &str = "./volumes/models";

/// Suffix substituted for `{small_suffix}` when the reduced-size variant is used.
pub const SMALL_SUFFIX: &str = "_small";

/// Default neighbor store filename template.
pub const DEFAULT_NEIGHBORS_TEMPLATE: &str =
    "{dataset}_{distance_metric}_neighbors{small_suffix}.bin";

/// Locations of persistent artifacts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LmdsConfig {
    /// Directory holding datasets and cached neighbor stores
    pub data_dir: PathBuf,
    /// Directory holding serialized inverse-DR predictors
    pub model_dir: PathBuf,
    /// Neighbor store filename template
    pub neighbors_template: String,
    /// Path to the external neighbor computation executable
    pub neighbors_executable: PathBuf,
    /// Use the reduced-size dataset variant
    pub use_small: bool,
}

impl Default for LmdsConfig {
    fn default() -> Self {
        Self::for_environment(false)
    }
}

impl LmdsConfig {
    fn for_environment(inside_docker: bool) -> Self {
        let (data_dir, model_dir) = if inside_docker {
            (DOCKER_DATA_DIR, DOCKER_MODEL_DIR)
        } else {
            (LOCAL_DATA_DIR, LOCAL_MODEL_DIR)
        };
        Self {
            data_dir: PathBuf::from(data_dir),
            model_dir: PathBuf::from(model_dir),
            neighbors_template: DEFAULT_NEIGHBORS_TEMPLATE.to_string(),
            neighbors_executable: PathBuf::from("lmds-neighbors"),
            use_small: false,
        }
    }

    /// Build configuration from environment variables.
    ///
    /// - `LMDS_INSIDE_DOCKER` (or `INSIDE_DOCKER`): switch default
    ///   directories to `/server/...`
    /// - `LMDS_DATA_DIR`, `LMDS_MODEL_DIR`: explicit directory overrides
    /// - `LMDS_NEIGHBORS_BIN`: path to the neighbor computation executable
    /// - `LMDS_USE_SMALL`: use the reduced-size dataset variant
    pub fn from_env() -> Self {
        let inside_docker = env_flag("LMDS_INSIDE_DOCKER") || env_flag("INSIDE_DOCKER");
        let mut config = Self::for_environment(inside_docker);

        if let Ok(dir) = std::env::var("LMDS_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }
        if let Ok(dir) = std::env::var("LMDS_MODEL_DIR") {
            config.model_dir = PathBuf::from(dir);
        }
        if let Ok(path) = std::env::var("LMDS_NEIGHBORS_BIN") {
            config.neighbors_executable = PathBuf::from(path);
        }
        config.use_small = env_flag("LMDS_USE_SMALL");
        config
    }

    /// Path of the cached neighbor store for a dataset and metric.
    pub fn neighbors_path(&self, dataset: &str, metric: DistanceMetric, small: bool) -> PathBuf {
        let filename = self
            .neighbors_template
            .replace("{dataset}", dataset)
            .replace("{distance_metric}", metric.name())
            .replace("{small_suffix}", if small { SMALL_SUFFIX } else { "" });
        self.data_dir.join(filename)
    }

    /// Directory of a neural inverse-DR predictor trained for a metric.
    pub fn model_path(&self, model_name: &str, metric: DistanceMetric) -> PathBuf {
        self.model_dir
            .join(format!("{}_mds_{}", model_name, metric.name()))
    }
}

fn env_flag(name: &str) -> bool {
    std::env::var(name)
        .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(false)
}

/// Parameters of one projection session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectionConfig {
    pub heuristic: Heuristic,
    pub distance_metric: DistanceMetric,
    pub num_landmarks: usize,
    #[serde(default = "default_dimension")]
    pub dimension: usize,
}

fn default_dimension() -> usize {
    DEFAULT_DIMENSION
}

impl ProjectionConfig {
    pub fn new(heuristic: Heuristic, distance_metric: DistanceMetric, num_landmarks: usize) -> Self {
        Self {
            heuristic,
            distance_metric,
            num_landmarks,
            dimension: DEFAULT_DIMENSION,
        }
    }

    pub fn with_dimension(mut self, dimension: usize) -> Self {
        self.dimension = dimension;
        self
    }

    /// Whether the landmark count lies in the recommended interactive range.
    pub fn is_recommended_landmark_count(&self) -> bool {
        (LANDMARK_AMOUNT_RANGE.0..=LANDMARK_AMOUNT_RANGE.1).contains(&self.num_landmarks)
    }
}
