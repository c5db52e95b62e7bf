//! Landmark projection engine
//!
//! One engine is one user session over a shared, read-only [`Dataset`]. It
//! walks a fixed state machine:
//!
//! ```text
//! Unselected --select_landmarks--> Selected --reduce_landmarks--> Reduced --calculate--> Extended
//!                                                                    ^                      |
//!                                                                    +--set_landmark_position
//! ```
//!
//! Calls out of order fail with the state errors ([`LmdsError::NotSelected`],
//! [`LmdsError::NotReduced`], [`LmdsError::NotExtended`]) instead of returning
//! partial positions.

use nalgebra::{DMatrix, DVector};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::config::ProjectionConfig;
use crate::dataset::Dataset;
use crate::error::{LmdsError, Result};
use crate::idr::{InverseDr, InverseDrAlgorithm};
use crate::mds::{self, Alignment, Eigenbasis};
use crate::metrics::{MetricSet, Metrics};
use crate::pca;

/// Position of an engine in its state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectionState {
    Unselected,
    Selected,
    Reduced,
    Extended,
}

/// A landmark as exposed for editing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Landmark {
    /// Dataset index of the landmark
    pub index: usize,
    pub position: Vec<f64>,
    pub label: Option<String>,
}

/// Serializable overview of an engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectionSummary {
    pub heuristic: String,
    pub distance_metric: String,
    pub num_landmarks: usize,
    pub dimension: usize,
    pub landmarks_selected: bool,
    pub landmarks_reduced: bool,
    pub points_calculated: bool,
    pub labels: Vec<String>,
    pub last_inverse_dr: Option<String>,
}

/// Landmark MDS with Nyström extension over one dataset.
#[derive(Debug, Clone)]
pub struct ProjectionEngine {
    dataset: Arc<Dataset>,
    config: ProjectionConfig,
    state: ProjectionState,
    landmarks: Vec<usize>,
    /// Squared landmark distances computed during reduction
    reduced_delta: Option<DMatrix<f64>>,
    basis: Option<Eigenbasis>,
    /// One row per landmark, in selection order
    landmark_layout: Option<DMatrix<f64>>,
    /// One row per dataset point
    layout: Option<DMatrix<f64>>,
    last_inverse_dr: Option<InverseDrAlgorithm>,
}

impl ProjectionEngine {
    /// Create an engine, rejecting landmark counts the dataset cannot satisfy.
    pub fn new(dataset: Arc<Dataset>, config: ProjectionConfig) -> Result<Self> {
        if config.num_landmarks == 0 {
            return Err(LmdsError::InvalidLandmarkCount(0));
        }
        if config.num_landmarks > dataset.len() {
            return Err(LmdsError::InsufficientData {
                requested: config.num_landmarks,
                available: dataset.len(),
            });
        }
        if !config.is_recommended_landmark_count() {
            warn!(
                num_landmarks = config.num_landmarks,
                "Landmark count outside the recommended range"
            );
        }

        Ok(Self {
            dataset,
            config,
            state: ProjectionState::Unselected,
            landmarks: Vec::new(),
            reduced_delta: None,
            basis: None,
            landmark_layout: None,
            layout: None,
            last_inverse_dr: None,
        })
    }

    pub fn state(&self) -> ProjectionState {
        self.state
    }

    pub fn config(&self) -> &ProjectionConfig {
        &self.config
    }

    pub fn dataset(&self) -> &Arc<Dataset> {
        &self.dataset
    }

    /// Dataset indices of the selected landmarks, in selection order.
    pub fn landmarks(&self) -> &[usize] {
        &self.landmarks
    }

    pub fn is_landmark(&self, index: usize) -> bool {
        self.landmarks.contains(&index)
    }

    /// Eigenvalues of the most recent decomposition, descending.
    pub fn eigenvalues(&self) -> Option<&[f64]> {
        self.basis.as_ref().map(|b| b.eigenvalues.as_slice())
    }

    /// Choose landmarks with the configured heuristic. Discards any earlier
    /// reduction or extension.
    pub fn select_landmarks(&mut self, seed: u64) -> Result<&[usize]> {
        let landmarks =
            self.config
                .heuristic
                .select(&self.dataset, self.config.num_landmarks, seed)?;

        self.landmarks = landmarks;
        self.clear_derived();
        self.state = ProjectionState::Selected;
        info!(
            dataset = self.dataset.name(),
            heuristic = %self.config.heuristic,
            count = self.landmarks.len(),
            "Landmarks selected"
        );
        Ok(&self.landmarks)
    }

    /// Place the landmarks by classical MDS of their squared distances.
    ///
    /// On [`LmdsError::InsufficientRank`] the engine is left in
    /// [`ProjectionState::Selected`].
    pub fn reduce_landmarks(&mut self) -> Result<Vec<Vec<f64>>> {
        if self.state == ProjectionState::Unselected {
            return Err(LmdsError::NotSelected);
        }

        let embeddings: Vec<&[f32]> = self
            .landmarks
            .iter()
            .map(|&i| self.dataset.embedding(i))
            .collect();
        let delta = mds::squared_distances(&embeddings, self.config.distance_metric);

        let basis = match Eigenbasis::decompose(&delta, self.config.dimension) {
            Ok(basis) => basis,
            Err(e) => {
                self.clear_derived();
                self.state = ProjectionState::Selected;
                warn!(error = %e, "Landmark reduction failed");
                return Err(e);
            }
        };

        let positions = basis.landmark_positions();
        self.reduced_delta = Some(delta);
        self.basis = Some(basis);
        self.landmark_layout = Some(positions.clone());
        self.layout = None;
        self.state = ProjectionState::Reduced;
        info!(
            landmarks = self.landmarks.len(),
            dimension = self.config.dimension,
            "Landmarks reduced"
        );
        Ok(matrix_rows(&positions))
    }

    /// Position every point: landmarks keep their current positions, all
    /// other points are placed by Nyström extension against the landmark
    /// distances estimated by `idr`, then moved rigidly into the frame of the
    /// current landmark layout (which may have been recentered or edited).
    ///
    /// Returns the layout in dataset order.
    pub fn calculate(&mut self, idr: &InverseDr) -> Result<Vec<Vec<f64>>> {
        let start = Instant::now();
        let (landmark_layout, reduced) = match (&self.state, &self.landmark_layout, &self.reduced_delta) {
            (ProjectionState::Reduced | ProjectionState::Extended, Some(layout), Some(delta)) => {
                (layout, delta)
            }
            _ => return Err(LmdsError::NotReduced),
        };
        let metric = self.config.distance_metric;

        let low = mds::squared_layout_distances(landmark_layout, metric);
        let delta = idr.estimate(&low, reduced)?;
        let basis = Eigenbasis::decompose(&delta, self.config.dimension)?;
        // the extension lands in the eigenbasis frame; carry it into the
        // frame the landmarks currently live in
        let alignment = Alignment::fit(&basis.landmark_positions(), landmark_layout);
        let inverse = basis.pseudo_inverse();
        let mean = mds::column_means(&delta);

        let slots: HashMap<usize, usize> = self
            .landmarks
            .iter()
            .enumerate()
            .map(|(slot, &index)| (index, slot))
            .collect();
        let dataset = &self.dataset;
        let landmarks = &self.landmarks;

        let rows: Vec<Vec<f64>> = (0..dataset.len())
            .into_par_iter()
            .map(|p| match slots.get(&p) {
                Some(&slot) => landmark_layout.row(slot).iter().copied().collect(),
                None => {
                    let embedding = dataset.embedding(p);
                    let squared = DVector::from_iterator(
                        landmarks.len(),
                        landmarks
                            .iter()
                            .map(|&l| metric.squared_distance(embedding, dataset.embedding(l))),
                    );
                    alignment
                        .apply(&mds::extend_point(&inverse, &mean, &squared))
                        .iter()
                        .copied()
                        .collect()
                }
            })
            .collect();

        let layout = DMatrix::from_fn(rows.len(), self.config.dimension, |r, c| rows[r][c]);
        self.layout = Some(layout);
        self.basis = Some(basis);
        self.last_inverse_dr = Some(idr.algorithm().clone());
        self.state = ProjectionState::Extended;
        info!(
            points = rows.len(),
            inverse_dr = %idr.algorithm(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Points extended"
        );
        Ok(rows)
    }

    /// Landmarks with their current positions and labels.
    pub fn landmark_positions(&self) -> Result<Vec<Landmark>> {
        let layout = self.reduced_landmark_layout()?;
        Ok(self
            .landmarks
            .iter()
            .zip(layout.row_iter())
            .map(|(&index, row)| Landmark {
                index,
                position: row.iter().copied().collect(),
                label: self.dataset.label(index).map(str::to_string),
            })
            .collect())
    }

    /// Move the landmark in selection slot `slot`. An extended layout becomes
    /// stale and the engine returns to [`ProjectionState::Reduced`].
    pub fn set_landmark_position(&mut self, slot: usize, position: &[f64]) -> Result<()> {
        self.reduced_landmark_layout()?;
        let dimension = self.config.dimension;
        let count = self.landmarks.len();
        if slot >= count {
            return Err(LmdsError::IndexOutOfRange {
                index: slot,
                len: count,
            });
        }
        if position.len() != dimension {
            return Err(LmdsError::InvalidDataset(format!(
                "landmark position has {} components, expected {}",
                position.len(),
                dimension
            )));
        }

        if let Some(layout) = self.landmark_layout.as_mut() {
            for (c, &value) in position.iter().enumerate() {
                layout[(slot, c)] = value;
            }
        }
        if self.state == ProjectionState::Extended {
            self.layout = None;
            self.state = ProjectionState::Reduced;
        }
        debug!(slot, index = self.landmarks[slot], "Landmark moved");
        Ok(())
    }

    /// Full layout in dataset order.
    pub fn layout(&self) -> Result<Vec<Vec<f64>>> {
        Ok(matrix_rows(self.extended_layout()?))
    }

    /// Recenter the extended layout on its centroid and rotate it onto its
    /// principal axes. Never run implicitly.
    pub fn recenter_pca(&mut self) -> Result<Vec<Vec<f64>>> {
        let recentered = pca::recenter(self.extended_layout()?);
        let landmark_layout = DMatrix::from_fn(self.landmarks.len(), recentered.ncols(), |r, c| {
            recentered[(self.landmarks[r], c)]
        });
        let rows = matrix_rows(&recentered);
        self.landmark_layout = Some(landmark_layout);
        self.layout = Some(recentered);
        debug!(points = rows.len(), "Layout recentered");
        Ok(rows)
    }

    /// Score the current layout against the high-D neighbor index held by
    /// `metrics`.
    pub fn compute_metrics(&self, metrics: &Metrics, k: usize) -> Result<MetricSet> {
        metrics.calculate_all_metrics(&self.layout()?, k)
    }

    pub fn summary(&self) -> ProjectionSummary {
        ProjectionSummary {
            heuristic: self.config.heuristic.to_string(),
            distance_metric: self.config.distance_metric.to_string(),
            num_landmarks: self.config.num_landmarks,
            dimension: self.config.dimension,
            landmarks_selected: self.state >= ProjectionState::Selected,
            landmarks_reduced: self.state >= ProjectionState::Reduced,
            points_calculated: self.state == ProjectionState::Extended,
            labels: self.dataset.labels(),
            last_inverse_dr: self.last_inverse_dr.as_ref().map(|a| a.to_string()),
        }
    }

    fn reduced_landmark_layout(&self) -> Result<&DMatrix<f64>> {
        match self.state {
            ProjectionState::Unselected => Err(LmdsError::NotSelected),
            ProjectionState::Selected => Err(LmdsError::NotReduced),
            _ => self.landmark_layout.as_ref().ok_or(LmdsError::NotReduced),
        }
    }

    fn extended_layout(&self) -> Result<&DMatrix<f64>> {
        match (self.state, self.layout.as_ref()) {
            (ProjectionState::Extended, Some(layout)) => Ok(layout),
            _ => Err(LmdsError::NotExtended),
        }
    }

    fn clear_derived(&mut self) {
        self.reduced_delta = None;
        self.basis = None;
        self.landmark_layout = None;
        self.layout = None;
        self.last_inverse_dr = None;
    }
}

fn matrix_rows(matrix: &DMatrix<f64>) -> Vec<Vec<f64>> {
    matrix
        .row_iter()
        .map(|row| row.iter().copied().collect())
        .collect()
}
