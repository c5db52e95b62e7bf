use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use tracing::info;

use super::{NeighborCompute, NeighborIndex, StoreHeader, StoreView};
use crate::dataset::Dataset;
use crate::distance::DistanceMetric;
use crate::error::{LmdsError, Result};

/// Neighbor index built from positions, owning its store bytes.
#[derive(Debug, Clone)]
pub struct ComputedNeighbors {
    header: StoreHeader,
    buffer: Vec<u8>,
}

impl ComputedNeighbors {
    /// Build a store from `positions`, each of which must have `dimensions`
    /// components.
    pub fn compute<P: AsRef<[f32]>>(
        metric: DistanceMetric,
        dimensions: usize,
        positions: &[P],
        backend: &dyn NeighborCompute,
    ) -> Result<Self> {
        if positions.is_empty() {
            return Err(LmdsError::InvalidDataset(
                "cannot index an empty point set".to_string(),
            ));
        }
        if let Some((i, p)) = positions
            .iter()
            .enumerate()
            .find(|(_, p)| p.as_ref().len() != dimensions)
        {
            return Err(LmdsError::InvalidDataset(format!(
                "position {} has {} components, expected {}",
                i,
                p.as_ref().len(),
                dimensions
            )));
        }

        let header = StoreHeader::new(metric, positions.len(), dimensions)?;
        let mut buffer = header.serialize_input(positions);
        backend.compute(&mut buffer)?;

        info!(
            metric = %metric,
            points = header.point_count,
            dimensions,
            "Built neighbor index"
        );
        Ok(Self { header, buffer })
    }

    /// Build a store over a dataset's embeddings.
    pub fn from_dataset(
        dataset: &Dataset,
        metric: DistanceMetric,
        backend: &dyn NeighborCompute,
    ) -> Result<Self> {
        let embeddings: Vec<&[f32]> = dataset.points().iter().map(|p| p.embedding.as_slice()).collect();
        Self::compute(metric, dataset.dimensions(), &embeddings, backend)
    }

    /// Build a store over a 2D layout.
    pub fn from_layout<P: AsRef<[f64]>>(
        layout: &[P],
        metric: DistanceMetric,
        backend: &dyn NeighborCompute,
    ) -> Result<Self> {
        let positions: Vec<Vec<f32>> = layout
            .iter()
            .map(|p| p.as_ref().iter().map(|&v| v as f32).collect())
            .collect();
        Self::compute(metric, super::DIMENSIONS_2D, &positions, backend)
    }

    /// Write the store to `path` in the binary layout [`super::CachedNeighbors`] reads.
    pub fn dump(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let mut writer = BufWriter::new(File::create(path)?);
        writer.write_all(&self.buffer)?;
        writer.flush()?;
        info!(path = %path.display(), bytes = self.buffer.len(), "Wrote neighbor store");
        Ok(())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }
}

impl NeighborIndex for ComputedNeighbors {
    fn view(&self) -> StoreView<'_> {
        StoreView {
            header: self.header,
            bytes: &self.buffer[..],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::DataPoint;
    use crate::neighbors::InProcessCompute;
    use pretty_assertions::assert_eq;

    #[test]
    fn rejects_mismatched_positions() {
        let positions = vec![vec![0.0f32, 1.0], vec![1.0]];
        assert!(matches!(
            ComputedNeighbors::compute(DistanceMetric::Euclidean, 2, &positions, &InProcessCompute),
            Err(LmdsError::InvalidDataset(_))
        ));
    }

    #[test]
    fn rejects_empty_positions() {
        let positions: Vec<[f32; 2]> = Vec::new();
        assert!(matches!(
            ComputedNeighbors::compute(DistanceMetric::Euclidean, 2, &positions, &InProcessCompute),
            Err(LmdsError::InvalidDataset(_))
        ));
    }

    #[test]
    fn rejects_unsupported_dataset_dimensionality() {
        let dataset = Dataset::new(
            "tiny",
            vec![
                DataPoint::new(vec![0.0, 0.0, 1.0]),
                DataPoint::new(vec![1.0, 0.0, 1.0]),
            ],
        )
        .unwrap();
        assert!(matches!(
            ComputedNeighbors::from_dataset(&dataset, DistanceMetric::Cosine, &InProcessCompute),
            Err(LmdsError::UnsupportedDimensionality { found: 3, .. })
        ));
    }

    #[test]
    fn indexes_768d_embeddings() {
        let points = (0..4)
            .map(|i| {
                let mut embedding = vec![0.0f32; 768];
                embedding[i] = 1.0;
                embedding[767] = i as f32;
                DataPoint::new(embedding)
            })
            .collect();
        let dataset = Dataset::new("onehot", points).unwrap();
        let index =
            ComputedNeighbors::from_dataset(&dataset, DistanceMetric::Euclidean, &InProcessCompute)
                .unwrap();

        assert_eq!(index.dimensions(), 768);
        assert_eq!(index.get_position(2).unwrap(), dataset.embedding(2).to_vec());
        let nearest = index.get_k_neighbors(0, 1).unwrap().next().unwrap();
        assert_eq!(nearest.index, 1);
    }

    #[test]
    fn out_of_range_queries_fail() {
        let index = ComputedNeighbors::from_layout(
            &[[0.0, 0.0], [1.0, 1.0]],
            DistanceMetric::Euclidean,
            &InProcessCompute,
        )
        .unwrap();
        assert!(matches!(
            index.get_neighbors(2),
            Err(LmdsError::IndexOutOfRange { index: 2, len: 2 })
        ));
        assert!(matches!(
            index.get_position(5),
            Err(LmdsError::IndexOutOfRange { index: 5, len: 2 })
        ));
    }
}
