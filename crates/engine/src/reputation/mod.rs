//! Reputation layer (L3): Beta-distribution submitter trust.
//!
//! Each submitter holds a pseudo-count pair (α, β). Validated reports add to
//! α, rejected reports add to β, and the trust score is the Beta mean
//! α / (α + β). A new submitter starts at (1, 1) → 0.5.
//!
//! Scoring reads a [`TrustSnapshot`] and never writes. The only mutation path
//! is [`crate::aggregator::commit_decision`], which turns a decision into a
//! [`TrustUpdate`] and applies it with compare-and-update on the store.
//!
//! Confidence decay: when a submitter comes back after whole inactivity
//! windows, α and β are both scaled by `decay_factor^k` before the increment.
//! The mean is unchanged; the history just weighs less against new evidence.

pub mod store;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::ReputationParams;
use crate::report::{ReportStatus, UserId};

pub use store::{InMemoryTrustStore, TrustStore};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrustState {
    pub alpha: f64,
    pub beta: f64,
    pub total_reports: u64,
    pub validated_reports: u64,
    pub rejected_reports: u64,
    pub last_active: Option<DateTime<Utc>>,
}

impl TrustState {
    pub fn initial(p: &ReputationParams) -> Self {
        Self {
            alpha: p.initial_alpha,
            beta: p.initial_beta,
            total_reports: 0,
            validated_reports: 0,
            rejected_reports: 0,
            last_active: None,
        }
    }

    /// Beta mean α / (α + β).
    pub fn trust(&self) -> f64 {
        let total = self.alpha + self.beta;
        if total > 0.0 {
            (self.alpha / total).clamp(0.0, 1.0)
        } else {
            0.5
        }
    }

    /// Apply one committed decision.
    pub fn apply(&mut self, update: &TrustUpdate) {
        if let Some(last) = self.last_active {
            let k = decay_windows(last, update.at, update.inactivity_window_days);
            if k > 0 && update.decay_factor < 1.0 {
                let scale = update.decay_factor.powi(k as i32);
                self.alpha *= scale;
                self.beta *= scale;
            }
        }

        self.alpha += update.delta_alpha;
        self.beta += update.delta_beta;
        if update.new_report {
            self.total_reports += 1;
        }
        match update.outcome {
            ReportStatus::Validated => self.validated_reports += 1,
            ReportStatus::Rejected => self.rejected_reports += 1,
            _ => {}
        }
        self.last_active = Some(match self.last_active {
            Some(prev) if prev > update.at => prev,
            _ => update.at,
        });
    }
}

/// Whole inactivity windows between `last` and `now`. Zero when `now` is not
/// after `last`.
pub fn decay_windows(last: DateTime<Utc>, now: DateTime<Utc>, window_days: i64) -> u32 {
    if window_days <= 0 || now <= last {
        return 0;
    }
    let days = (now - last).num_days();
    u32::try_from(days / window_days).unwrap_or(u32::MAX)
}

/// A point-in-time read of one submitter's trust.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrustSnapshot {
    pub user: UserId,
    pub state: TrustState,
    /// Bumped by every successful update; 0 for a submitter never written.
    pub version: u64,
}

impl TrustSnapshot {
    pub fn new_submitter(user: UserId, p: &ReputationParams) -> Self {
        Self {
            user,
            state: TrustState::initial(p),
            version: 0,
        }
    }

    pub fn trust(&self) -> f64 {
        self.state.trust()
    }
}

/// Where a decision came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecisionOrigin {
    /// First decision reached by the pipeline for a report.
    Automatic,
    /// A reviewer revising a flagged report.
    Override,
}

/// The change a committed decision makes to a trust record.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrustUpdate {
    pub outcome: ReportStatus,
    pub delta_alpha: f64,
    pub delta_beta: f64,
    /// Counts toward `total_reports` (false for overrides of an already
    /// counted report).
    pub new_report: bool,
    pub at: DateTime<Utc>,
    pub decay_factor: f64,
    pub inactivity_window_days: i64,
}

impl TrustUpdate {
    /// Update for a decision, or `None` when `outcome` is not a decision.
    pub fn for_decision(
        outcome: ReportStatus,
        origin: DecisionOrigin,
        at: DateTime<Utc>,
        p: &ReputationParams,
    ) -> Option<Self> {
        let (delta_alpha, delta_beta) = match outcome {
            ReportStatus::Validated => (p.validated_increment, 0.0),
            ReportStatus::Rejected => (0.0, p.rejected_increment),
            ReportStatus::Flagged => (0.0, 0.0),
            _ => return None,
        };
        Some(Self {
            outcome,
            delta_alpha,
            delta_beta,
            new_report: origin == DecisionOrigin::Automatic,
            at,
            decay_factor: p.decay_factor,
            inactivity_window_days: p.inactivity_window_days,
        })
    }
}

/// L3 score from a snapshot.
pub fn score_reputation(snapshot: &TrustSnapshot) -> f64 {
    snapshot.trust()
}
