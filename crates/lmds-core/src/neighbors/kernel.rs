//! All-pairs neighbor and rank computation over a store buffer

use rayon::prelude::*;
use std::cmp::Ordering;

use super::{read_f32, StoreHeader, FLOAT_SIZE, HEADER_SIZE, PAIR_SIZE, RANK_SIZE};
use crate::error::{LmdsError, Result};

/// Fill the neighbor and rank blocks of `segment` from its header and
/// position block.
///
/// Each row is sorted by ascending distance with the point itself forced
/// first at distance 0; ties are broken by index. Rows are computed in
/// parallel.
pub fn fill_neighbor_blocks(segment: &mut [u8]) -> Result<StoreHeader> {
    let header = StoreHeader::decode(segment)?;
    if segment.len() < header.total_size() {
        return Err(LmdsError::CorruptNeighborStore(format!(
            "segment of {} bytes cannot hold {} points of {} dimensions ({} bytes)",
            segment.len(),
            header.point_count,
            header.dimensions,
            header.total_size()
        )));
    }

    let n = header.point_count;
    let dims = header.dimensions;
    let metric = header.metric;

    let (input, output) = segment.split_at_mut(header.neighbors_offset());
    let positions: Vec<f32> = input[HEADER_SIZE..].chunks_exact(FLOAT_SIZE).map(read_f32).collect();
    let (pairs, rest) = output.split_at_mut(n * n * PAIR_SIZE);
    let ranks = &mut rest[..n * n * RANK_SIZE];

    pairs
        .par_chunks_mut(n * PAIR_SIZE)
        .zip(ranks.par_chunks_mut(n * RANK_SIZE))
        .enumerate()
        .for_each(|(i, (pair_row, rank_row))| {
            let origin = &positions[i * dims..(i + 1) * dims];
            let mut row: Vec<(usize, f32)> = (0..n)
                .map(|j| {
                    if j == i {
                        (j, 0.0)
                    } else {
                        (j, metric.distance(origin, &positions[j * dims..(j + 1) * dims]))
                    }
                })
                .collect();
            row.sort_by(|a, b| by_distance_self_first(i, a, b));

            for (rank, &(j, distance)) in row.iter().enumerate() {
                let pair = &mut pair_row[rank * PAIR_SIZE..(rank + 1) * PAIR_SIZE];
                pair[0..2].copy_from_slice(&(j as u16).to_ne_bytes());
                pair[2..6].copy_from_slice(&distance.to_ne_bytes());
                rank_row[j * RANK_SIZE..(j + 1) * RANK_SIZE]
                    .copy_from_slice(&(rank as u16).to_ne_bytes());
            }
        });

    Ok(header)
}

fn by_distance_self_first(origin: usize, a: &(usize, f32), b: &(usize, f32)) -> Ordering {
    (a.0 != origin)
        .cmp(&(b.0 != origin))
        .then(a.1.total_cmp(&b.1))
        .then(a.0.cmp(&b.0))
}
