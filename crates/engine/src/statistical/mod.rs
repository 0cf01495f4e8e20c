//! Statistical consistency layer (L2).
//!
//! Three sub-scores over the report's neighbour set (same radius and time
//! window for all of them):
//!
//! | sub-score | evidence                                         | weight |
//! |-----------|--------------------------------------------------|--------|
//! | spatial   | DBSCAN cluster of corroborating flood claims     | 0.5    |
//! | temporal  | 24 h rainfall at the location                    | 0.3    |
//! | outlier   | z-score of the depth among neighbour depths      | 0.2    |
//!
//! Missing evidence (no neighbours, no rain gauge) yields the neutral 0.5
//! rather than a penalty.

pub mod clustering;

use serde::{Deserialize, Serialize};

use crate::config::StatisticalParams;
use crate::geo::Coordinate;
use crate::neighbors::Neighbor;

pub use clustering::{analyze_clusters, dbscan, ClusterInfo, ClusterSummary};

/// L2 result with its breakdown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatisticalScore {
    pub score: f64,
    pub spatial_sub: f64,
    pub temporal_sub: f64,
    pub outlier_sub: f64,
    /// Corroborating neighbours considered by the spatial check.
    pub corroborating: usize,
    /// Other reports in the target's cluster, `None` when the target is noise
    /// or there was nothing to cluster.
    pub cluster_peers: Option<usize>,
    /// Coarse neighbour-count consensus, reported for audit only.
    pub count_consensus: f64,
    pub z_score: Option<f64>,
}

/// Neighbours that can vouch for the target's flood claim.
pub fn corroborating(neighbors: &[Neighbor]) -> impl Iterator<Item = &Neighbor> {
    neighbors
        .iter()
        .filter(|n| n.depth_m > 0.0 && n.status.corroborates())
}

/// Spatial sub-score from density clustering of the target plus corroborating
/// neighbours. Returns the score and the number of cluster peers.
pub fn spatial_score(
    target: Coordinate,
    neighbors: &[Neighbor],
    p: &StatisticalParams,
) -> (f64, Option<usize>) {
    let mut points = vec![target];
    points.extend(corroborating(neighbors).map(|n| n.location));
    if points.len() == 1 {
        return (p.neutral_score, None);
    }

    let labels = clustering::dbscan(&points, p.cluster_eps_m, p.cluster_min_points);
    let Some(cluster) = labels[0] else {
        return (0.0, None);
    };
    let peers = labels[1..].iter().filter(|l| **l == Some(cluster)).count();
    let score = (peers as f64 / p.cluster_saturation as f64).min(1.0);
    (score, Some(peers))
}

/// Cluster layout of the corroborating flood claims in `reports`.
pub fn claim_clusters(reports: &[Neighbor], p: &StatisticalParams) -> ClusterSummary {
    let points: Vec<Coordinate> = corroborating(reports).map(|n| n.location).collect();
    analyze_clusters(&points, p.cluster_eps_m, p.cluster_min_points)
}

/// Coarse consensus from the raw corroborating count.
pub fn count_consensus(corroborating: usize) -> f64 {
    match corroborating {
        n if n >= 5 => 1.0,
        n if n >= 3 => 0.8,
        n if n >= 1 => 0.6,
        _ => 0.4,
    }
}

/// Temporal sub-score from accumulated 24 h rainfall in mm.
pub fn temporal_score(rainfall_24h: Option<f64>, p: &StatisticalParams) -> f64 {
    match rainfall_24h {
        None => p.neutral_score,
        Some(mm) if mm > p.rain_extreme_mm => 1.0,
        Some(mm) if mm > p.rain_heavy_mm => 0.8,
        Some(mm) if mm > p.rain_moderate_mm => 0.6,
        Some(mm) if mm > p.rain_light_mm => 0.4,
        Some(_) => 0.2,
    }
}

/// Depth outlier sub-score against the neighbours' depths (sample std).
pub fn outlier_score(depth_m: f64, neighbor_depths: &[f64], p: &StatisticalParams) -> (f64, Option<f64>) {
    let n = neighbor_depths.len();
    if n < 2 {
        return (p.neutral_score, None);
    }
    let mean = neighbor_depths.iter().sum::<f64>() / n as f64;
    let var = neighbor_depths
        .iter()
        .map(|d| (d - mean).powi(2))
        .sum::<f64>()
        / (n - 1) as f64;
    let std = var.sqrt();
    let deviation = (depth_m - mean).abs();

    if std == 0.0 {
        let score = if deviation < p.zero_std_tolerance_m { 1.0 } else { 0.2 };
        return (score, None);
    }

    let z = deviation / std;
    let score = if z < p.z_consistent {
        1.0
    } else if z < p.z_suspicious {
        0.7
    } else {
        0.2
    };
    (score, Some(z))
}

/// Compute L2 for a target report.
///
/// `neighbors` must already exclude the target itself. Rejected, archived and
/// dry neighbours are ignored by the spatial and outlier sub-scores.
pub fn score_statistical(
    location: Coordinate,
    depth_m: f64,
    neighbors: &[Neighbor],
    rainfall_24h: Option<f64>,
    p: &StatisticalParams,
) -> StatisticalScore {
    let (spatial_sub, cluster_peers) = spatial_score(location, neighbors, p);
    let temporal_sub = temporal_score(rainfall_24h, p);

    let depths: Vec<f64> = corroborating(neighbors).map(|n| n.depth_m).collect();
    let (outlier_sub, z_score) = outlier_score(depth_m, &depths, p);

    let corroborating = corroborating(neighbors).count();
    let score = (p.spatial_weight * spatial_sub
        + p.temporal_weight * temporal_sub
        + p.outlier_weight * outlier_sub)
        .clamp(0.0, 1.0);

    StatisticalScore {
        score,
        spatial_sub,
        temporal_sub,
        outlier_sub,
        corroborating,
        cluster_peers,
        count_consensus: count_consensus(corroborating),
        z_score,
    }
}
