//! Validation pipeline.
//!
//! One validation attempt:
//!   1. input checks, `pending -> validating` (under the ledger lock)
//!   2. fetch terrain, neighbours and rainfall through the provider pool
//!   3. read a trust snapshot
//!   4. `score_report` (pure)
//!   5. `commit_decision` for the submitter
//!   6. write scores and status back to the ledger
//!
//! A transient failure in 2, 3 or 5 discards everything computed so far and
//! reverts the report to `pending` (or parks it in `flagged` once attempts
//! are exhausted). Nothing partial is ever written. A report is only parked
//! in `flagged` once the submitter's trust counters have taken the flag; if
//! that commit fails too the report stays `pending` and the error is returned.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::aggregator::{commit_decision, score_report, ScoreOutcome};
use crate::config::EngineConfig;
use crate::error::{EngineError, ProviderError};
use crate::lifecycle::{self, FailureOutcome};
use crate::neighbors::{Neighbor, NeighborQuery, ReportLedger, TimeWindow};
use crate::pool::ProviderPool;
use crate::rainfall::RainfallQuery;
use crate::report::{check_input, Report, ReportId, ReportStatus};
use crate::reputation::{DecisionOrigin, TrustSnapshot, TrustStore};
use crate::statistical::{self, ClusterSummary};
use crate::terrain::{TerrainError, TerrainLookup, TerrainSample};

/// Result of one validation attempt.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum ValidationResult {
    /// Scored and decided; trust updated.
    Decided {
        id: ReportId,
        outcome: ScoreOutcome,
        trust: TrustSnapshot,
    },
    /// Transient failure; the report is back in `pending`.
    Retry {
        id: ReportId,
        attempts: u32,
        error: String,
    },
    /// Transient failure with attempts exhausted; the report is `flagged`
    /// and needs review.
    ForcedFlag {
        id: ReportId,
        attempts: u32,
        error: String,
    },
}

impl ValidationResult {
    pub fn id(&self) -> ReportId {
        match self {
            ValidationResult::Decided { id, .. }
            | ValidationResult::Retry { id, .. }
            | ValidationResult::ForcedFlag { id, .. } => *id,
        }
    }

    /// Report status after the attempt.
    pub fn status(&self) -> ReportStatus {
        match self {
            ValidationResult::Decided { outcome, .. } => outcome.status,
            ValidationResult::Retry { .. } => ReportStatus::Pending,
            ValidationResult::ForcedFlag { .. } => ReportStatus::Flagged,
        }
    }
}

/// Evidence fetched for one report.
#[derive(Debug, Clone)]
struct Evidence {
    terrain: Option<TerrainSample>,
    neighbors: Vec<Neighbor>,
    rainfall: Option<f64>,
}

pub struct ValidationPipeline {
    config: Arc<EngineConfig>,
    ledger: Arc<ReportLedger>,
    trust: Arc<dyn TrustStore>,
    terrain: Arc<dyn TerrainLookup>,
    neighbors: Arc<dyn NeighborQuery>,
    rainfall: Arc<dyn RainfallQuery>,
    pool: ProviderPool,
}

impl ValidationPipeline {
    /// Build a pipeline whose neighbour queries go to `ledger`.
    pub fn new(
        config: Arc<EngineConfig>,
        ledger: Arc<ReportLedger>,
        trust: Arc<dyn TrustStore>,
        terrain: Arc<dyn TerrainLookup>,
        rainfall: Arc<dyn RainfallQuery>,
    ) -> Result<Self, EngineError> {
        config.validate()?;
        let pool = ProviderPool::new(&config.providers);
        let neighbors: Arc<dyn NeighborQuery> = ledger.clone();
        Ok(Self {
            config,
            ledger,
            trust,
            terrain,
            neighbors,
            rainfall,
            pool,
        })
    }

    /// Use a different neighbour provider.
    pub fn with_neighbor_query(mut self, neighbors: Arc<dyn NeighborQuery>) -> Self {
        self.neighbors = neighbors;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn ledger(&self) -> &Arc<ReportLedger> {
        &self.ledger
    }

    pub fn trust_store(&self) -> &Arc<dyn TrustStore> {
        &self.trust
    }

    /// Cluster layout of the flood claims currently in the ledger.
    pub fn cluster_summary(&self) -> ClusterSummary {
        let claims: Vec<Neighbor> = self
            .ledger
            .all()
            .iter()
            .map(Neighbor::from_report)
            .collect();
        statistical::claim_clusters(&claims, &self.config.statistical)
    }

    // -----------------------------------------------------------------------
    // Intake
    // -----------------------------------------------------------------------

    /// Check and store a new report in `pending`.
    pub fn submit(&self, report: Report) -> Result<ReportId, EngineError> {
        check_input(&report, &self.config)?;
        if self.ledger.get(report.id).is_some() {
            return Err(EngineError::DuplicateReport(report.id));
        }
        let id = report.id;
        let fresh = Report {
            scores: None,
            final_score: None,
            status: ReportStatus::Pending,
            validated_at: None,
            attempts: 0,
            review_required: false,
            ..report
        };
        self.ledger.insert(fresh);
        debug!(report = id.0, "report submitted");
        Ok(id)
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    /// Run one validation attempt on a pending report.
    pub fn validate(&self, id: ReportId, now: DateTime<Utc>) -> Result<ValidationResult, EngineError> {
        let report = self.ledger.update(id, |r| {
            check_input(r, &self.config)?;
            lifecycle::begin_validation(r)?;
            Ok(r.clone())
        })?;

        let evidence = match self.gather(&report) {
            Ok(e) => e,
            Err(e) => return self.fail_attempt(&report, e, now),
        };
        let snapshot = match self.trust.read(report.user) {
            Ok(s) => s,
            Err(e) => return self.fail_attempt(&report, e.into(), now),
        };

        let outcome = score_report(
            &report,
            evidence.terrain.as_ref(),
            &evidence.neighbors,
            evidence.rainfall,
            &snapshot,
            &self.config,
        );

        let trust = match commit_decision(
            self.trust.as_ref(),
            report.user,
            outcome.status,
            DecisionOrigin::Automatic,
            now,
            &self.config,
        ) {
            Ok(t) => t,
            Err(e) if e.is_transient() => return self.fail_attempt(&report, e, now),
            // Contention and the like still count as a failed attempt, but
            // the caller gets the error itself.
            Err(e) => {
                self.fail_attempt(&report, e.clone(), now)?;
                return Err(e);
            }
        };

        if let Err(e) = self
            .ledger
            .update(id, |r| lifecycle::apply_outcome(r, &outcome, now))
        {
            // Only reachable when another writer moved the report out of
            // `validating`. The trust commit already landed and is not undone.
            error!(
                report = id.0,
                user = report.user.0,
                status = %outcome.status,
                trust_version = trust.version,
                error = %e,
                "trust committed but report write-back failed"
            );
            return Err(e);
        }

        info!(
            report = id.0,
            user = report.user.0,
            l1 = outcome.physical.score,
            l2 = outcome.statistical.score,
            l3 = outcome.reputation,
            final_score = outcome.final_score,
            status = %outcome.status,
            review_required = outcome.review_required,
            "report decided"
        );
        Ok(ValidationResult::Decided {
            id,
            outcome,
            trust,
        })
    }

    /// Validate many reports in parallel. Results keep the input order.
    pub fn validate_batch(
        &self,
        ids: &[ReportId],
        now: DateTime<Utc>,
    ) -> Vec<(ReportId, Result<ValidationResult, EngineError>)> {
        ids.par_iter()
            .map(|id| (*id, self.validate(*id, now)))
            .collect()
    }

    /// Validate every report currently in `pending`.
    pub fn validate_pending(
        &self,
        now: DateTime<Utc>,
    ) -> Vec<(ReportId, Result<ValidationResult, EngineError>)> {
        let ids = self.ledger.ids_with_status(ReportStatus::Pending);
        self.validate_batch(&ids, now)
    }

    fn gather(&self, report: &Report) -> Result<Evidence, EngineError> {
        let coord = report.location;
        let s = &self.config.statistical;
        let radius = s.neighbor_radius_m;
        let window = TimeWindow::trailing(report.timestamp, s.time_window_hours);

        let terrain = Arc::clone(&self.terrain);
        let neighbors = Arc::clone(&self.neighbors);
        let rainfall = Arc::clone(&self.rainfall);

        let (terrain, (neighbors, rainfall)) = rayon::join(
            || {
                self.pool.fetch("terrain", move || match terrain.sample(coord) {
                    Ok(sample) if sample.is_finite() => Ok(Some(sample)),
                    Ok(_) => {
                        debug!(lat = coord.lat, lon = coord.lon, "terrain sample has non-finite values");
                        Ok(None)
                    }
                    Err(TerrainError::NotCovered) => Ok(None),
                    Err(TerrainError::Unavailable(msg)) => Err(ProviderError::Unavailable(msg)),
                    Err(e @ TerrainError::GridMismatch) => {
                        Err(ProviderError::Malformed(e.to_string()))
                    }
                })
            },
            || {
                rayon::join(
                    || {
                        self.pool.fetch("neighbors", move || {
                            let found = neighbors.find(coord, radius, window)?;
                            if found.iter().any(|n| !n.depth_m.is_finite()) {
                                return Err(ProviderError::Malformed(
                                    "neighbour with non-finite depth".into(),
                                ));
                            }
                            Ok(found)
                        })
                    },
                    || self.pool.fetch("rainfall", move || rainfall.rainfall_24h(coord)),
                )
            },
        );

        Ok(Evidence {
            terrain: terrain?,
            neighbors: neighbors?,
            rainfall: rainfall?,
        })
    }

    /// Record a failed attempt and report what happened to the report.
    fn fail_attempt(
        &self,
        report: &Report,
        error: EngineError,
        now: DateTime<Utc>,
    ) -> Result<ValidationResult, EngineError> {
        let failure = self
            .ledger
            .update(report.id, |r| lifecycle::record_failure(r, &self.config.lifecycle, now))?;
        match failure {
            FailureOutcome::Retry { attempts } => {
                warn!(report = report.id.0, attempts, %error, "validation attempt failed, back to pending");
                Ok(ValidationResult::Retry {
                    id: report.id,
                    attempts,
                    error: error.to_string(),
                })
            }
            FailureOutcome::ForcedFlag { attempts } => {
                warn!(report = report.id.0, attempts, %error, "validation attempts exhausted, flagged for review");
                if let Err(e) = commit_decision(
                    self.trust.as_ref(),
                    report.user,
                    ReportStatus::Flagged,
                    DecisionOrigin::Automatic,
                    now,
                    &self.config,
                ) {
                    // A flag the trust counters never saw would be lost: back
                    // to `pending` so the next attempt retries the commit.
                    error!(report = report.id.0, user = report.user.0, error = %e, "could not record forced flag, back to pending");
                    self.ledger.update(report.id, |r| {
                        r.status = ReportStatus::Pending;
                        r.review_required = report.review_required;
                        r.validated_at = report.validated_at;
                        Ok(())
                    })?;
                    return Err(e);
                }
                Ok(ValidationResult::ForcedFlag {
                    id: report.id,
                    attempts,
                    error: error.to_string(),
                })
            }
        }
    }

    // -----------------------------------------------------------------------
    // Review and retention
    // -----------------------------------------------------------------------

    /// Reviewer decision on a flagged report (`validated` or `rejected`).
    ///
    /// The report changes status first (so a concurrent override fails the
    /// transition check); if the trust commit then fails the report is put
    /// back exactly as it was.
    pub fn override_decision(
        &self,
        id: ReportId,
        to: ReportStatus,
        now: DateTime<Utc>,
    ) -> Result<TrustSnapshot, EngineError> {
        let before = self.ledger.update(id, |r| {
            let before = r.clone();
            lifecycle::apply_override(r, to, now)?;
            Ok(before)
        })?;

        match commit_decision(
            self.trust.as_ref(),
            before.user,
            to,
            DecisionOrigin::Override,
            now,
            &self.config,
        ) {
            Ok(trust) => {
                info!(report = id.0, user = before.user.0, status = %to, "decision overridden");
                Ok(trust)
            }
            Err(e) => {
                self.ledger.update(id, |r| {
                    *r = before;
                    Ok(())
                })?;
                Err(e)
            }
        }
    }

    /// Move decided reports older than the retention window to `archived`.
    pub fn archive_expired(&self, now: DateTime<Utc>) -> Result<Vec<ReportId>, EngineError> {
        let mut archived = Vec::new();
        for status in [ReportStatus::Validated, ReportStatus::Flagged, ReportStatus::Rejected] {
            for id in self.ledger.ids_with_status(status) {
                let moved = self.ledger.update(id, |r| {
                    lifecycle::archive_if_expired(r, now, &self.config.lifecycle)
                })?;
                if moved {
                    archived.push(id);
                }
            }
        }
        archived.sort();
        if !archived.is_empty() {
            info!(count = archived.len(), "reports archived");
        }
        Ok(archived)
    }
}
