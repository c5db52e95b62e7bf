//! Binary neighbor store and ranked k-NN queries
//!
//! A store holds, for one (distance metric, point set) pair, every point's
//! position, its full neighbor list sorted by ascending distance (the point
//! itself first at distance 0) and a rank table. The layout is fixed and
//! packed, in native byte order:
//!
//! | block     | contents                                                   |
//! |-----------|------------------------------------------------------------|
//! | header    | metric code `u8` (`'e'`/`'c'`), point count `u16`, dimensions `u16` |
//! | positions | `N` vectors of `dimensions` × `f32`                         |
//! | neighbors | `N` rows of `N` × (index `u16`, distance `f32`)             |
//! | ranks     | `N` rows of `N` × `u16`; `ranks[i][j]` is `j`'s position in `i`'s row |
//!
//! Two back-ends produce the same bytes:
//!
//! - [`ComputedNeighbors`] fills the blocks through a [`NeighborCompute`]
//!   strategy (in-process or an external executable over shared memory)
//! - [`CachedNeighbors`] memory-maps a store previously written with
//!   [`ComputedNeighbors::dump`]
//!
//! # Example
//!
//! ```rust
//! use lmds_core::neighbors::{ComputedNeighbors, InProcessCompute, NeighborIndex};
//! use lmds_core::DistanceMetric;
//!
//! let positions = vec![[0.0f32, 0.0], [1.0, 0.0], [5.0, 5.0]];
//! let index = ComputedNeighbors::compute(
//!     DistanceMetric::Euclidean,
//!     2,
//!     &positions,
//!     &InProcessCompute,
//! )
//! .unwrap();
//!
//! let nearest = index.get_k_neighbors(0, 1).unwrap().next().unwrap();
//! assert_eq!(nearest.index, 1);
//! ```

mod cached;
mod compute;
mod computed;
mod kernel;
#[cfg(unix)]
pub mod shm;

pub use cached::CachedNeighbors;
#[cfg(unix)]
pub use compute::ExternalProcessCompute;
pub use compute::{InProcessCompute, NeighborCompute};
pub use computed::ComputedNeighbors;
pub use kernel::fill_neighbor_blocks;

use std::iter::Take;

use crate::distance::DistanceMetric;
use crate::error::{LmdsError, Result};

/// Dimensionality of layout positions.
pub const DIMENSIONS_2D: usize = 2;
/// Dimensionality of the high-D embedding set.
pub const DIMENSIONS_768D: usize = 768;
/// Dimensionalities a store may hold.
pub const SUPPORTED_DIMENSIONS: [usize; 2] = [DIMENSIONS_2D, DIMENSIONS_768D];

/// Packed header: metric `u8`, point count `u16`, dimensions `u16`.
pub const HEADER_SIZE: usize = 5;
/// Packed (index `u16`, distance `f32`) pair.
pub const PAIR_SIZE: usize = 6;
/// One `u16` rank.
pub const RANK_SIZE: usize = 2;
const FLOAT_SIZE: usize = 4;

/// Largest point count the `u16` header field can describe.
pub const MAX_POINTS: usize = u16::MAX as usize;

/// Store parameters and the block offsets derived from them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreHeader {
    pub metric: DistanceMetric,
    pub point_count: usize,
    pub dimensions: usize,
}

impl StoreHeader {
    pub fn new(metric: DistanceMetric, point_count: usize, dimensions: usize) -> Result<Self> {
        if !SUPPORTED_DIMENSIONS.contains(&dimensions) {
            return Err(LmdsError::UnsupportedDimensionality {
                found: dimensions,
                expected: format!("{} or {}", DIMENSIONS_2D, DIMENSIONS_768D),
            });
        }
        if point_count == 0 || point_count > MAX_POINTS {
            return Err(LmdsError::InvalidDataset(format!(
                "point count {} outside 1..={}",
                point_count, MAX_POINTS
            )));
        }
        Ok(Self {
            metric,
            point_count,
            dimensions,
        })
    }

    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut bytes = [0u8; HEADER_SIZE];
        bytes[0] = self.metric.code();
        bytes[1..3].copy_from_slice(&(self.point_count as u16).to_ne_bytes());
        bytes[3..5].copy_from_slice(&(self.dimensions as u16).to_ne_bytes());
        bytes
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(LmdsError::CorruptNeighborStore(format!(
                "header needs {} bytes, got {}",
                HEADER_SIZE,
                bytes.len()
            )));
        }
        let metric = DistanceMetric::from_code(bytes[0])?;
        let point_count = read_u16(&bytes[1..3]) as usize;
        let dimensions = read_u16(&bytes[3..5]) as usize;
        if point_count == 0 {
            return Err(LmdsError::CorruptNeighborStore(
                "header declares zero points".to_string(),
            ));
        }
        Self::new(metric, point_count, dimensions)
    }

    pub fn position_size(&self) -> usize {
        self.dimensions * FLOAT_SIZE
    }

    pub fn positions_offset(&self) -> usize {
        HEADER_SIZE
    }

    pub fn neighbors_offset(&self) -> usize {
        HEADER_SIZE + self.position_size() * self.point_count
    }

    pub fn ranks_offset(&self) -> usize {
        self.neighbors_offset() + PAIR_SIZE * self.point_count * self.point_count
    }

    /// Bytes the caller writes before computation: header and positions.
    pub fn input_size(&self) -> usize {
        self.neighbors_offset()
    }

    /// Bytes of the whole store.
    pub fn total_size(&self) -> usize {
        self.ranks_offset() + RANK_SIZE * self.point_count * self.point_count
    }

    /// Allocate a zeroed store buffer with header and positions filled in.
    pub(crate) fn serialize_input<P: AsRef<[f32]>>(&self, positions: &[P]) -> Vec<u8> {
        let mut buffer = vec![0u8; self.total_size()];
        buffer[..HEADER_SIZE].copy_from_slice(&self.encode());
        let mut offset = self.positions_offset();
        for position in positions {
            for value in position.as_ref() {
                buffer[offset..offset + FLOAT_SIZE].copy_from_slice(&value.to_ne_bytes());
                offset += FLOAT_SIZE;
            }
        }
        buffer
    }
}

/// One entry of a neighbor list.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    pub index: usize,
    pub distance: f32,
}

/// Borrowed, bounds-checked view over store bytes.
#[derive(Debug, Clone, Copy)]
pub struct StoreView<'a> {
    header: StoreHeader,
    bytes: &'a [u8],
}

impl<'a> StoreView<'a> {
    pub fn header(&self) -> StoreHeader {
        self.header
    }

    fn check_index(&self, index: usize) -> Result<()> {
        if index >= self.header.point_count {
            return Err(LmdsError::IndexOutOfRange {
                index,
                len: self.header.point_count,
            });
        }
        Ok(())
    }

    pub fn position(&self, index: usize) -> Result<Vec<f32>> {
        self.check_index(index)?;
        let start = self.header.positions_offset() + self.header.position_size() * index;
        let end = start + self.header.position_size();
        Ok(self.bytes[start..end]
            .chunks_exact(FLOAT_SIZE)
            .map(read_f32)
            .collect())
    }

    fn pair_row(&self, index: usize) -> &'a [u8] {
        let row = PAIR_SIZE * self.header.point_count;
        let start = self.header.neighbors_offset() + row * index;
        &self.bytes[start..start + row]
    }

    fn rank_row(&self, index: usize) -> &'a [u8] {
        let row = RANK_SIZE * self.header.point_count;
        let start = self.header.ranks_offset() + row * index;
        &self.bytes[start..start + row]
    }

    /// Neighbors of `index` nearest first, excluding the point itself.
    pub fn neighbors(&self, index: usize) -> Result<Neighbors<'a>> {
        self.check_index(index)?;
        Ok(Neighbors {
            row: self.pair_row(index),
            next: 1,
            end: self.header.point_count,
        })
    }

    /// Rank vector of every point, in index order.
    pub fn ranks(&self) -> Ranks<'a> {
        Ranks {
            view: *self,
            next: 0,
        }
    }

    /// Check that the neighbor and rank blocks are structurally sound: every
    /// row starts with its own point at distance 0 and every stored index or
    /// rank names a point of the store.
    pub(crate) fn validate(&self) -> Result<()> {
        let n = self.header.point_count;
        if self.bytes.len() < self.header.total_size() {
            return Err(LmdsError::CorruptNeighborStore(format!(
                "{} bytes cannot hold a store of {} points",
                self.bytes.len(),
                n
            )));
        }

        for i in 0..n {
            let pairs = self.pair_row(i);
            let first = read_u16(&pairs[0..2]) as usize;
            if first != i || read_f32(&pairs[2..6]) != 0.0 {
                return Err(LmdsError::CorruptNeighborStore(format!(
                    "neighbor row {} does not start with its own point",
                    i
                )));
            }
            if let Some(j) = pairs
                .chunks_exact(PAIR_SIZE)
                .map(|pair| read_u16(&pair[0..2]) as usize)
                .find(|&j| j >= n)
            {
                return Err(LmdsError::CorruptNeighborStore(format!(
                    "neighbor row {} names point {} of {}",
                    i, j, n
                )));
            }

            let ranks = self.rank_row(i);
            if read_u16(&ranks[i * RANK_SIZE..(i + 1) * RANK_SIZE]) != 0 {
                return Err(LmdsError::CorruptNeighborStore(format!(
                    "rank row {} does not rank its own point first",
                    i
                )));
            }
            if let Some(rank) = ranks
                .chunks_exact(RANK_SIZE)
                .map(|r| read_u16(r) as usize)
                .find(|&r| r >= n)
            {
                return Err(LmdsError::CorruptNeighborStore(format!(
                    "rank row {} holds rank {} of {}",
                    i, rank, n
                )));
            }
        }
        Ok(())
    }
}

/// Lazy iterator over one point's sorted neighbor row.
#[derive(Debug, Clone)]
pub struct Neighbors<'a> {
    row: &'a [u8],
    next: usize,
    end: usize,
}

impl Iterator for Neighbors<'_> {
    type Item = Neighbor;

    fn next(&mut self) -> Option<Neighbor> {
        if self.next >= self.end {
            return None;
        }
        let start = self.next * PAIR_SIZE;
        let pair = &self.row[start..start + PAIR_SIZE];
        self.next += 1;
        Some(Neighbor {
            index: read_u16(&pair[0..2]) as usize,
            distance: read_f32(&pair[2..6]),
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.end.saturating_sub(self.next);
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Neighbors<'_> {}

/// Single-pass iterator over rank vectors, one per point in index order.
#[derive(Debug, Clone)]
pub struct Ranks<'a> {
    view: StoreView<'a>,
    next: usize,
}

impl Iterator for Ranks<'_> {
    type Item = Vec<u16>;

    fn next(&mut self) -> Option<Vec<u16>> {
        if self.next >= self.view.header.point_count {
            return None;
        }
        let row = self.view.rank_row(self.next);
        self.next += 1;
        Some(row.chunks_exact(RANK_SIZE).map(read_u16).collect())
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.view.header.point_count.saturating_sub(self.next);
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Ranks<'_> {}

/// Ranked k-NN queries over a binary neighbor store.
pub trait NeighborIndex {
    /// View over the store bytes; valid as long as the index is alive.
    fn view(&self) -> StoreView<'_>;

    fn header(&self) -> StoreHeader {
        self.view().header()
    }

    fn metric(&self) -> DistanceMetric {
        self.header().metric
    }

    fn len(&self) -> usize {
        self.header().point_count
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn dimensions(&self) -> usize {
        self.header().dimensions
    }

    fn get_position(&self, index: usize) -> Result<Vec<f32>> {
        self.view().position(index)
    }

    /// All `N - 1` other points, nearest first.
    fn get_neighbors(&self, index: usize) -> Result<Neighbors<'_>> {
        self.view().neighbors(index)
    }

    /// The first `k` entries of [`NeighborIndex::get_neighbors`].
    fn get_k_neighbors(&self, index: usize, k: usize) -> Result<Take<Neighbors<'_>>> {
        Ok(self.view().neighbors(index)?.take(k))
    }

    /// Rank vectors consumed in index order; `0` marks the point itself.
    fn get_ranks(&self) -> Ranks<'_> {
        self.view().ranks()
    }
}

pub(crate) fn read_u16(bytes: &[u8]) -> u16 {
    u16::from_ne_bytes([bytes[0], bytes[1]])
}

pub(crate) fn read_f32(bytes: &[u8]) -> f32 {
    f32::from_ne_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}
