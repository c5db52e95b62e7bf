//! Immutable dataset of embedded points
//!
//! Points are keyed by their dense index `0..N`. The dataset is loaded once
//! and shared read-only between projection sessions.

use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use crate::error::{LmdsError, Result};

/// One embedded point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataPoint {
    /// High-dimensional embedding vector
    pub embedding: Vec<f32>,
    /// Optional categorical label
    #[serde(default)]
    pub label: Option<String>,
    /// Source text the embedding was computed from
    #[serde(default)]
    pub text: String,
    /// Free-form metadata
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl DataPoint {
    pub fn new(embedding: Vec<f32>) -> Self {
        Self {
            embedding,
            label: None,
            text: String::new(),
            metadata: serde_json::Map::new(),
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }
}

/// Read-only collection of points with a fixed embedding dimensionality.
#[derive(Debug, Clone)]
pub struct Dataset {
    name: String,
    points: Vec<DataPoint>,
    dimensions: usize,
}

impl Dataset {
    /// Create a dataset, validating that every embedding has the same length.
    pub fn new(name: impl Into<String>, points: Vec<DataPoint>) -> Result<Self> {
        let dimensions = points.first().map(|p| p.embedding.len()).unwrap_or(0);
        if dimensions == 0 && !points.is_empty() {
            return Err(LmdsError::InvalidDataset(
                "embeddings must not be empty".to_string(),
            ));
        }
        if let Some((i, p)) = points
            .iter()
            .enumerate()
            .find(|(_, p)| p.embedding.len() != dimensions)
        {
            return Err(LmdsError::InvalidDataset(format!(
                "point {} has {} dimensions, expected {}",
                i,
                p.embedding.len(),
                dimensions
            )));
        }

        Ok(Self {
            name: name.into(),
            points,
            dimensions,
        })
    }

    /// Load a JSON array of points.
    pub fn load_json(name: impl Into<String>, path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        let points: Vec<DataPoint> = serde_json::from_reader(BufReader::new(file))?;
        Self::new(name, points)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Embedding dimensionality (0 for an empty dataset).
    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn points(&self) -> &[DataPoint] {
        &self.points
    }

    pub fn get(&self, index: usize) -> Option<&DataPoint> {
        self.points.get(index)
    }

    pub fn embedding(&self, index: usize) -> &[f32] {
        &self.points[index].embedding
    }

    pub fn label(&self, index: usize) -> Option<&str> {
        self.points[index].label.as_deref()
    }

    /// Per-point labels in index order.
    pub fn label_vec(&self) -> Vec<Option<String>> {
        self.points.iter().map(|p| p.label.clone()).collect()
    }

    /// Distinct labels in first-seen order.
    pub fn labels(&self) -> Vec<String> {
        let mut seen = Vec::new();
        for label in self.points.iter().filter_map(|p| p.label.as_ref()) {
            if !seen.contains(label) {
                seen.push(label.clone());
            }
        }
        seen
    }
}
