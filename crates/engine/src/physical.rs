//! Physical plausibility layer (L1).
//!
//! Scores whether standing water at the reported point is consistent with the
//! terrain: low height above drainage, a local depression rather than a peak,
//! and a gentle slope all make a flood report plausible.
//!
//! ```text
//!   HAND (m)      0 ── 1 ────────── 5 ───── 10 ─────▶
//!   sub-score     1.0  1.0 ╲ linear  0.4     0.4  0.1
//! ```

use serde::{Deserialize, Serialize};

use crate::config::PhysicalParams;
use crate::terrain::TerrainSample;

/// L1 result with its breakdown.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PhysicalScore {
    pub score: f64,
    pub hand_sub: f64,
    pub elevation_sub: f64,
    pub slope_sub: f64,
    /// No terrain sample was available; the report must be reviewed.
    pub terrain_missing: bool,
}

/// HAND sub-score. Non-increasing in `hand_m`.
pub fn hand_score(hand_m: f64, p: &PhysicalParams) -> f64 {
    if hand_m < p.hand_full_m {
        p.hand_full_score
    } else if hand_m <= p.hand_suspicious_m {
        let t = (hand_m - p.hand_full_m) / (p.hand_suspicious_m - p.hand_full_m);
        p.hand_full_score + t * (p.hand_suspicious_score - p.hand_full_score)
    } else if hand_m <= p.hand_max_m {
        p.hand_suspicious_score
    } else {
        p.hand_max_score
    }
}

/// Elevation-context sub-score from `elevation - neighbourhood mean`.
pub fn elevation_score(diff_m: f64, p: &PhysicalParams) -> f64 {
    if diff_m >= p.peak_diff_m {
        p.peak_score
    } else if diff_m <= p.depression_diff_m {
        p.depression_score
    } else {
        p.neutral_elevation_score
    }
}

pub fn slope_score(slope_deg: f64, p: &PhysicalParams) -> f64 {
    if slope_deg > p.max_slope_deg {
        0.0
    } else if slope_deg > p.steep_slope_deg {
        p.steep_slope_score
    } else {
        (1.0 - p.slope_decay_per_deg * slope_deg).clamp(0.0, 1.0)
    }
}

/// Compute L1. `terrain == None` means the point is not covered; a sample
/// with non-finite fields is treated the same way.
pub fn score_physical(terrain: Option<&TerrainSample>, p: &PhysicalParams) -> PhysicalScore {
    let Some(t) = terrain.filter(|t| t.is_finite()) else {
        return PhysicalScore {
            score: p.missing_terrain_score,
            hand_sub: p.missing_terrain_score,
            elevation_sub: p.missing_terrain_score,
            slope_sub: p.missing_terrain_score,
            terrain_missing: true,
        };
    };

    let hand_sub = hand_score(t.hand, p);
    let elevation_sub = elevation_score(t.elevation_diff(), p);
    let slope_sub = slope_score(t.slope_deg, p);
    let score = (p.hand_weight * hand_sub
        + p.elevation_weight * elevation_sub
        + p.slope_weight * slope_sub)
        .clamp(0.0, 1.0);

    PhysicalScore {
        score,
        hand_sub,
        elevation_sub,
        slope_sub,
        terrain_missing: false,
    }
}
