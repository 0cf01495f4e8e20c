//! Density-based clustering (DBSCAN) over great-circle distance.

use serde::{Deserialize, Serialize};

use crate::geo::Coordinate;

/// Cluster label per point; `None` is noise.
pub type Labels = Vec<Option<usize>>;

/// Indices of all points within `eps_m` of `points[i]`, including `i`.
fn region_query(points: &[Coordinate], i: usize, eps_m: f64) -> Vec<usize> {
    points
        .iter()
        .enumerate()
        .filter(|(_, p)| points[i].distance_m(p) <= eps_m)
        .map(|(j, _)| j)
        .collect()
}

/// DBSCAN. `min_points` counts the point itself.
///
/// Border points are assigned to the first cluster that reaches them, so the
/// labelling depends on input order only for points on the border of two
/// clusters. Cluster ids are dense and start at 0.
pub fn dbscan(points: &[Coordinate], eps_m: f64, min_points: usize) -> Labels {
    let n = points.len();
    let mut labels: Labels = vec![None; n];
    let mut visited = vec![false; n];
    let mut next_cluster = 0;

    for i in 0..n {
        if visited[i] {
            continue;
        }
        visited[i] = true;
        let seeds = region_query(points, i, eps_m);
        if seeds.len() < min_points {
            continue;
        }

        let cluster = next_cluster;
        next_cluster += 1;
        labels[i] = Some(cluster);

        let mut queue = seeds;
        let mut head = 0;
        while head < queue.len() {
            let j = queue[head];
            head += 1;
            if labels[j].is_none() {
                labels[j] = Some(cluster);
            }
            if visited[j] {
                continue;
            }
            visited[j] = true;
            let reach = region_query(points, j, eps_m);
            if reach.len() >= min_points {
                queue.extend(reach);
            }
        }
    }
    labels
}

// ---------------------------------------------------------------------------
// Summary
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterInfo {
    pub label: usize,
    pub size: usize,
    pub centroid: Coordinate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterSummary {
    pub n_clusters: usize,
    pub n_noise: usize,
    /// Largest cluster first.
    pub clusters: Vec<ClusterInfo>,
}

/// Cluster a point set and summarise the result.
pub fn analyze_clusters(points: &[Coordinate], eps_m: f64, min_points: usize) -> ClusterSummary {
    let labels = dbscan(points, eps_m, min_points);
    let n_clusters = labels.iter().flatten().max().map_or(0, |m| m + 1);
    let mut sums = vec![(0usize, 0.0f64, 0.0f64); n_clusters];
    let mut n_noise = 0;
    for (p, label) in points.iter().zip(&labels) {
        match label {
            Some(c) => {
                sums[*c].0 += 1;
                sums[*c].1 += p.lat;
                sums[*c].2 += p.lon;
            }
            None => n_noise += 1,
        }
    }

    let mut clusters: Vec<ClusterInfo> = sums
        .into_iter()
        .enumerate()
        .map(|(label, (size, lat, lon))| ClusterInfo {
            label,
            size,
            centroid: Coordinate::new(lat / size as f64, lon / size as f64),
        })
        .collect();
    clusters.sort_by(|a, b| b.size.cmp(&a.size).then(a.label.cmp(&b.label)));

    ClusterSummary {
        n_clusters,
        n_noise,
        clusters,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::meters_to_lat_degrees;

    const ORIGIN: Coordinate = Coordinate {
        lat: 20.4625,
        lon: 85.8830,
    };

    /// Point `north_m` meters north of the origin.
    fn north(north_m: f64) -> Coordinate {
        Coordinate::new(ORIGIN.lat + meters_to_lat_degrees(north_m), ORIGIN.lon)
    }

    #[test]
    fn test_empty_input() {
        assert!(dbscan(&[], 1000.0, 3).is_empty());
        let summary = analyze_clusters(&[], 1000.0, 3);
        assert_eq!(summary.n_clusters, 0);
        assert_eq!(summary.n_noise, 0);
    }

    #[test]
    fn test_tight_group_forms_one_cluster() {
        let points: Vec<Coordinate> = (0..5).map(|i| north(i as f64 * 100.0)).collect();
        let labels = dbscan(&points, 1000.0, 3);
        assert!(labels.iter().all(|l| *l == Some(0)));
    }

    #[test]
    fn test_isolated_point_is_noise() {
        let mut points: Vec<Coordinate> = (0..4).map(|i| north(i as f64 * 100.0)).collect();
        points.push(north(10_000.0));
        let labels = dbscan(&points, 1000.0, 3);
        assert_eq!(labels[4], None);
        assert_eq!(labels[0], Some(0));
    }

    #[test]
    fn test_pair_below_min_points_is_noise() {
        let points = vec![north(0.0), north(200.0)];
        let labels = dbscan(&points, 1000.0, 3);
        assert_eq!(labels, vec![None, None]);
    }

    #[test]
    fn test_chain_is_density_connected() {
        // 800 m spacing: each point reaches only its direct neighbours, but
        // the chain is one cluster.
        let points: Vec<Coordinate> = (0..6).map(|i| north(i as f64 * 800.0)).collect();
        let labels = dbscan(&points, 1000.0, 3);
        assert!(labels.iter().all(|l| *l == Some(0)), "got {labels:?}");
    }

    #[test]
    fn test_border_point_joins_cluster() {
        // Point 3 sees only point 2 and itself, below min_points, but it is
        // reachable from core point 2.
        let points = vec![north(0.0), north(300.0), north(600.0), north(1500.0)];
        let labels = dbscan(&points, 1000.0, 3);
        assert_eq!(labels[3], Some(0));
    }

    #[test]
    fn test_two_separate_clusters() {
        let mut points: Vec<Coordinate> = (0..3).map(|i| north(i as f64 * 100.0)).collect();
        points.extend((0..4).map(|i| north(20_000.0 + i as f64 * 100.0)));
        let summary = analyze_clusters(&points, 1000.0, 3);
        assert_eq!(summary.n_clusters, 2);
        assert_eq!(summary.n_noise, 0);
        assert_eq!(summary.clusters[0].size, 4, "largest first");
        assert_eq!(summary.clusters[1].size, 3);
    }

    #[test]
    fn test_centroid_is_mean_position() {
        let points = vec![north(0.0), north(200.0), north(400.0)];
        let summary = analyze_clusters(&points, 1000.0, 3);
        let c = summary.clusters[0].centroid;
        assert!((c.lat - north(200.0).lat).abs() < 1e-9);
        assert!((c.lon - ORIGIN.lon).abs() < 1e-12);
    }
}
