//! Neighbor store tests across the computed and cached back-ends

use lmds_core::{
    CachedNeighbors, ComputedNeighbors, DistanceMetric, InProcessCompute, Neighbor, NeighborIndex,
};
use pretty_assertions::assert_eq;

fn seven_points() -> Vec<Vec<f32>> {
    vec![
        vec![0.1, 0.9],
        vec![1.0, 0.0],
        vec![0.0, 1.0],
        vec![1.0, 1.0],
        vec![2.0, 2.0],
        vec![3.0, 3.0],
        vec![4.0, 4.0],
    ]
}

fn euclidean(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum::<f32>().sqrt()
}

fn build(metric: DistanceMetric) -> ComputedNeighbors {
    ComputedNeighbors::compute(metric, 2, &seven_points(), &InProcessCompute).unwrap()
}

#[test]
fn test_k_neighbors_are_nearest_first() {
    let points = seven_points();
    let index = build(DistanceMetric::Euclidean);

    let nearest: Vec<Neighbor> = index.get_k_neighbors(0, 2).unwrap().collect();
    let indices: Vec<usize> = nearest.iter().map(|n| n.index).collect();
    assert_eq!(indices, vec![2, 3]);

    for n in &nearest {
        let expected = euclidean(&points[0], &points[n.index]);
        assert!((n.distance - expected).abs() < 1e-6, "{:?} vs {}", n, expected);
    }
}

#[test]
fn test_full_rows_cover_every_other_point() {
    let index = build(DistanceMetric::Euclidean);

    for i in 0..index.len() {
        let row: Vec<Neighbor> = index.get_neighbors(i).unwrap().collect();
        assert_eq!(row.len(), index.len() - 1);
        assert!(row.iter().all(|n| n.index != i));
        assert!(row.windows(2).all(|w| w[0].distance <= w[1].distance));

        let mut seen: Vec<usize> = row.iter().map(|n| n.index).collect();
        seen.sort_unstable();
        let expected: Vec<usize> = (0..index.len()).filter(|&j| j != i).collect();
        assert_eq!(seen, expected);
    }
}

#[test]
fn test_ranks_agree_with_neighbor_rows() {
    let index = build(DistanceMetric::Euclidean);
    let ranks: Vec<Vec<u16>> = index.get_ranks().collect();
    assert_eq!(ranks.len(), index.len());

    for (i, rank) in ranks.iter().enumerate() {
        assert_eq!(rank[i], 0);

        let mut sorted = rank.clone();
        sorted.sort_unstable();
        let expected: Vec<u16> = (0..index.len() as u16).collect();
        assert_eq!(sorted, expected);

        for (position, n) in index.get_neighbors(i).unwrap().enumerate() {
            assert_eq!(rank[n.index] as usize, position + 1);
        }
    }
}

#[test]
fn test_dumped_store_reopens_identically() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("seven_euclidean.bin");

    let computed = build(DistanceMetric::Euclidean);
    computed.dump(&path).unwrap();
    let cached = CachedNeighbors::open(&path).unwrap();

    assert_eq!(cached.header(), computed.header());
    assert_eq!(cached.metric(), DistanceMetric::Euclidean);
    assert_eq!(cached.dimensions(), 2);
    for i in 0..computed.len() {
        assert_eq!(cached.get_position(i).unwrap(), computed.get_position(i).unwrap());
        let from_cache: Vec<Neighbor> = cached.get_neighbors(i).unwrap().collect();
        let from_memory: Vec<Neighbor> = computed.get_neighbors(i).unwrap().collect();
        assert_eq!(from_cache, from_memory);
    }
    assert_eq!(
        cached.get_ranks().collect::<Vec<_>>(),
        computed.get_ranks().collect::<Vec<_>>()
    );
    cached.close();
}

#[test]
fn test_cosine_store_records_its_metric() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("seven_cosine.bin");

    build(DistanceMetric::Cosine).dump(&path).unwrap();
    let cached = CachedNeighbors::open(&path).unwrap();
    assert_eq!(cached.metric(), DistanceMetric::Cosine);

    // (2,2), (3,3) and (4,4) share a direction with (1,1)
    let mut nearest: Vec<usize> = cached
        .get_k_neighbors(3, 3)
        .unwrap()
        .map(|n| n.index)
        .collect();
    nearest.sort_unstable();
    assert_eq!(nearest, vec![4, 5, 6]);
}

#[test]
fn test_out_of_range_queries_fail() {
    let index = build(DistanceMetric::Euclidean);
    assert!(index.get_position(7).is_err());
    assert!(index.get_neighbors(7).is_err());
}
