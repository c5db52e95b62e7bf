//! LMDS Core Engine
//!
//! Interactive exploration of high-dimensional embedding sets: a small set of
//! landmarks is placed in 2D by classical MDS, every other point follows by
//! Nyström extension, and the layout is scored against the dataset's
//! precomputed high-D neighbor structure.
//!
//! # Components
//!
//! - [`neighbors`] - binary neighbor store, ranked k-NN queries, computed and
//!   memory-mapped back-ends
//! - [`projection`] - landmark selection, reduction and extension state machine
//! - [`idr`] - inverse-DR estimates of landmark distances after layout edits
//! - [`metrics`] - trustworthiness, continuity, stress, neighborhood hit,
//!   local error and Shepard goodness
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use lmds_core::{
//!     DataPoint, Dataset, DistanceMetric, Heuristic, InverseDr, ProjectionConfig,
//!     ProjectionEngine,
//! };
//!
//! let points = (0..20)
//!     .map(|i| {
//!         let (x, y) = ((i % 5) as f32, (i / 5) as f32);
//!         DataPoint::new(vec![x, y, x + y])
//!     })
//!     .collect();
//! let dataset = Arc::new(Dataset::new("plane", points).unwrap());
//!
//! let config = ProjectionConfig::new(Heuristic::First, DistanceMetric::Euclidean, 10);
//! let mut engine = ProjectionEngine::new(dataset, config).unwrap();
//! engine.select_landmarks(42).unwrap();
//! engine.reduce_landmarks().unwrap();
//! let layout = engine.calculate(&InverseDr::none()).unwrap();
//! assert_eq!(layout.len(), 20);
//! ```

pub mod config;
pub mod dataset;
pub mod distance;
pub mod error;
pub mod idr;
pub mod landmarks;
pub mod mds;
pub mod metrics;
pub mod neighbors;
pub mod pca;
pub mod projection;

// Re-export main types at crate root
pub use config::{LmdsConfig, ProjectionConfig, DEFAULT_DIMENSION, LANDMARK_AMOUNT_RANGE};
pub use dataset::{DataPoint, Dataset};
pub use distance::DistanceMetric;
pub use error::{ErrorKind, LmdsError, Result};
pub use idr::{InverseDr, InverseDrAlgorithm, Predictor};
pub use landmarks::{Heuristic, DEFAULT_SEED};
pub use metrics::{MetricSet, Metrics};
#[cfg(unix)]
pub use neighbors::ExternalProcessCompute;
pub use neighbors::{
    CachedNeighbors, ComputedNeighbors, InProcessCompute, Neighbor, NeighborCompute, NeighborIndex,
};
pub use projection::{Landmark, ProjectionEngine, ProjectionState, ProjectionSummary};
