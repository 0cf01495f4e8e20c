//! Aggregation and decision.
//!
//! `score_report` is pure: given the report, the fetched evidence and a trust
//! snapshot, it returns the three layer breakdowns, the weighted final score
//! and the resulting status. `commit_decision` is the one place trust is
//! written.
//!
//! Decision rule (two-tier):
//!   final >= validate_threshold and no review flag  -> validated
//!   otherwise                                        -> flagged
//! `rejected` is only reachable through a reviewer override.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::{DecisionParams, EngineConfig, LayerWeights};
use crate::error::{EngineError, TrustStoreError};
use crate::neighbors::Neighbor;
use crate::physical::{score_physical, PhysicalScore};
use crate::report::{LayerScores, Report, ReportStatus, UserId};
use crate::reputation::{score_reputation, DecisionOrigin, TrustSnapshot, TrustStore, TrustUpdate};
use crate::statistical::{score_statistical, StatisticalScore};
use crate::terrain::TerrainSample;

/// Everything `score_report` derives for one report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreOutcome {
    pub physical: PhysicalScore,
    pub statistical: StatisticalScore,
    pub reputation: f64,
    /// Version of the trust snapshot the reputation score came from.
    pub trust_version: u64,
    pub final_score: f64,
    pub status: ReportStatus,
    pub review_required: bool,
}

impl ScoreOutcome {
    pub fn layer_scores(&self) -> LayerScores {
        LayerScores {
            physical: self.physical.score,
            statistical: self.statistical.score,
            reputation: self.reputation,
        }
    }
}

/// Weighted sum of the layer scores, clamped to [0, 1].
pub fn final_score(scores: &LayerScores, w: &LayerWeights) -> f64 {
    (w.physical * scores.physical + w.statistical * scores.statistical + w.reputation * scores.reputation)
        .clamp(0.0, 1.0)
}

pub fn decide(final_score: f64, review_required: bool, p: &DecisionParams) -> ReportStatus {
    if !review_required && final_score >= p.validate_threshold {
        ReportStatus::Validated
    } else {
        ReportStatus::Flagged
    }
}

/// Score a report. Never touches trust or the report itself.
///
/// `terrain == None` means the point is not covered. Neighbours with the
/// report's own id are ignored.
pub fn score_report(
    report: &Report,
    terrain: Option<&TerrainSample>,
    neighbors: &[Neighbor],
    rainfall_24h: Option<f64>,
    trust: &TrustSnapshot,
    config: &EngineConfig,
) -> ScoreOutcome {
    let others: Vec<Neighbor> = neighbors
        .iter()
        .filter(|n| n.id != report.id)
        .cloned()
        .collect();

    let (physical, (statistical, reputation)) = rayon::join(
        || score_physical(terrain, &config.physical),
        || {
            rayon::join(
                || {
                    score_statistical(
                        report.location,
                        report.depth_m,
                        &others,
                        rainfall_24h,
                        &config.statistical,
                    )
                },
                || score_reputation(trust),
            )
        },
    );

    let scores = LayerScores {
        physical: physical.score,
        statistical: statistical.score,
        reputation,
    };
    let final_score = final_score(&scores, &config.weights);
    let review_required = physical.terrain_missing;
    let status = decide(final_score, review_required, &config.decision);

    ScoreOutcome {
        physical,
        statistical,
        reputation,
        trust_version: trust.version,
        final_score,
        status,
        review_required,
    }
}

/// Recompute (final score, status) from a report's stored layer scores.
///
/// Returns `None` for a report that was never scored. Reports forced to
/// `flagged` carry `review_required`, so they recompute to `flagged` too.
pub fn recompute(report: &Report, config: &EngineConfig) -> Option<(f64, ReportStatus)> {
    let scores = report.scores?;
    let f = final_score(&scores, &config.weights);
    Some((f, decide(f, report.review_required, &config.decision)))
}

/// Apply a decision to the submitter's trust record.
///
/// Reads the current snapshot and writes with compare-and-update, retrying
/// on conflict up to `reputation.update_retries` times. On exhaustion the
/// update is not applied and `TrustContention` is returned.
pub fn commit_decision(
    store: &dyn TrustStore,
    user: UserId,
    status: ReportStatus,
    origin: DecisionOrigin,
    now: DateTime<Utc>,
    config: &EngineConfig,
) -> Result<TrustSnapshot, EngineError> {
    let update = TrustUpdate::for_decision(status, origin, now, &config.reputation)
        .ok_or(EngineError::NotADecision(status))?;

    let attempts = config.reputation.update_retries;
    for attempt in 1..=attempts {
        let snapshot = store.read(user)?;
        match store.compare_and_update(user, snapshot.version, &update) {
            Ok(updated) => return Ok(updated),
            Err(TrustStoreError::Conflict { expected, found }) => {
                debug!(
                    user = user.0,
                    attempt, expected, found, "trust update conflicted, retrying"
                );
                std::thread::yield_now();
            }
            Err(e) => return Err(e.into()),
        }
    }
    warn!(user = user.0, attempts, "trust update gave up after repeated conflicts");
    Err(EngineError::TrustContention { user, attempts })
}
