//! Report lifecycle state machine.
//!
//! ```text
//!   pending ──▶ validating ──▶ validated ──┐
//!      ▲            │  │                   ├──▶ archived
//!      └── failure ─┘  └────▶ flagged ─────┤
//!                              │   ▲       │
//!                 override ────┘   │       │
//!                 (validated | rejected) ──┘
//! ```
//!
//! Every status change goes through [`transition`], which rejects anything
//! outside the table below. A failed validation attempt reverts to `pending`;
//! after `max_attempts` failures the report is parked in `flagged` with
//! `review_required` so a person looks at it.

use chrono::{DateTime, Duration, Utc};

use crate::aggregator::ScoreOutcome;
use crate::config::LifecycleParams;
use crate::error::EngineError;
use crate::report::{Report, ReportStatus};

use ReportStatus::*;

/// Whether `from -> to` is an allowed transition.
pub fn can_transition(from: ReportStatus, to: ReportStatus) -> bool {
    matches!(
        (from, to),
        (Pending, Validating)
            | (Validating, Validated)
            | (Validating, Flagged)
            | (Validating, Pending)
            | (Validated, Archived)
            | (Flagged, Archived)
            | (Rejected, Archived)
            | (Flagged, Validated)
            | (Flagged, Rejected)
    )
}

pub fn transition(report: &mut Report, to: ReportStatus) -> Result<(), EngineError> {
    if !can_transition(report.status, to) {
        return Err(EngineError::InvalidTransition {
            from: report.status,
            to,
        });
    }
    report.status = to;
    Ok(())
}

/// `pending -> validating`.
pub fn begin_validation(report: &mut Report) -> Result<(), EngineError> {
    transition(report, Validating)
}

/// Record a scoring outcome on a report in `validating`.
pub fn apply_outcome(
    report: &mut Report,
    outcome: &ScoreOutcome,
    now: DateTime<Utc>,
) -> Result<(), EngineError> {
    if report.status != Validating {
        return Err(EngineError::InvalidTransition {
            from: report.status,
            to: outcome.status,
        });
    }
    transition(report, outcome.status)?;
    report.scores = Some(outcome.layer_scores());
    report.final_score = Some(outcome.final_score);
    report.review_required = outcome.review_required;
    report.validated_at = Some(now);
    Ok(())
}

/// What happened to a report after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureOutcome {
    /// Back in `pending`, eligible for another attempt.
    Retry { attempts: u32 },
    /// Attempts exhausted: now `flagged` with `review_required`.
    ForcedFlag { attempts: u32 },
}

/// Record a failed attempt on a report in `validating`.
///
/// Any partial scores are left untouched (they were never written).
pub fn record_failure(
    report: &mut Report,
    p: &LifecycleParams,
    now: DateTime<Utc>,
) -> Result<FailureOutcome, EngineError> {
    if report.status != Validating {
        return Err(EngineError::InvalidTransition {
            from: report.status,
            to: Pending,
        });
    }
    report.attempts += 1;
    if report.attempts >= p.max_attempts {
        transition(report, Flagged)?;
        report.review_required = true;
        report.validated_at = Some(now);
        Ok(FailureOutcome::ForcedFlag {
            attempts: report.attempts,
        })
    } else {
        transition(report, Pending)?;
        Ok(FailureOutcome::Retry {
            attempts: report.attempts,
        })
    }
}

/// Reviewer decision on a flagged report: `validated` or `rejected`.
pub fn apply_override(
    report: &mut Report,
    to: ReportStatus,
    now: DateTime<Utc>,
) -> Result<(), EngineError> {
    if report.status != Flagged || !matches!(to, Validated | Rejected) {
        return Err(EngineError::InvalidTransition {
            from: report.status,
            to,
        });
    }
    transition(report, to)?;
    report.review_required = false;
    report.validated_at = Some(now);
    Ok(())
}

/// Whether a decided report has outlived the retention window.
pub fn is_expired(report: &Report, now: DateTime<Utc>, p: &LifecycleParams) -> bool {
    if !report.status.is_decided() {
        return false;
    }
    let decided_at = report.validated_at.unwrap_or(report.timestamp);
    now - decided_at >= Duration::days(p.retention_days)
}

/// Archive a report if it is expired. Returns whether it was archived.
pub fn archive_if_expired(
    report: &mut Report,
    now: DateTime<Utc>,
    p: &LifecycleParams,
) -> Result<bool, EngineError> {
    if !is_expired(report, now, p) {
        return Ok(false);
    }
    transition(report, Archived)?;
    Ok(true)
}
