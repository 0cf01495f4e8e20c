//! Flood report records.
//!
//! A [`Report`] has immutable submission fields (who, where, how deep, when)
//! and engine-owned fields (layer scores, final score, status, attempt count)
//! that only the validation pipeline writes.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::error::InputError;
use crate::geo::Coordinate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReportId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub u64);

/// Lifecycle status of a report. See [`crate::lifecycle`] for the allowed
/// transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportStatus {
    Pending,
    Validating,
    Validated,
    Flagged,
    Rejected,
    Archived,
}

impl ReportStatus {
    pub const ALL: [ReportStatus; 6] = [
        ReportStatus::Pending,
        ReportStatus::Validating,
        ReportStatus::Validated,
        ReportStatus::Flagged,
        ReportStatus::Rejected,
        ReportStatus::Archived,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ReportStatus::Pending => "pending",
            ReportStatus::Validating => "validating",
            ReportStatus::Validated => "validated",
            ReportStatus::Flagged => "flagged",
            ReportStatus::Rejected => "rejected",
            ReportStatus::Archived => "archived",
        }
    }

    /// A decision has been reached (automatically or by a reviewer).
    pub fn is_decided(self) -> bool {
        matches!(
            self,
            ReportStatus::Validated | ReportStatus::Flagged | ReportStatus::Rejected
        )
    }

    /// Whether a report in this status can corroborate a neighbour's claim.
    pub fn corroborates(self) -> bool {
        !matches!(self, ReportStatus::Rejected | ReportStatus::Archived)
    }
}

impl fmt::Display for ReportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-layer scores recorded for audit. Each value is in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LayerScores {
    pub physical: f64,
    pub statistical: f64,
    pub reputation: f64,
}

/// A citizen flood report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub id: ReportId,
    pub user: UserId,
    pub location: Coordinate,
    /// Reported water depth in meters.
    pub depth_m: f64,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub scores: Option<LayerScores>,
    #[serde(default)]
    pub final_score: Option<f64>,
    #[serde(default = "default_status")]
    pub status: ReportStatus,
    #[serde(default)]
    pub validated_at: Option<DateTime<Utc>>,
    /// Failed validation attempts so far.
    #[serde(default)]
    pub attempts: u32,
    /// Set when the report must be looked at by a human regardless of score.
    #[serde(default)]
    pub review_required: bool,
}

fn default_status() -> ReportStatus {
    ReportStatus::Pending
}

impl Report {
    /// A freshly submitted report in `pending`.
    pub fn new(
        id: ReportId,
        user: UserId,
        location: Coordinate,
        depth_m: f64,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            user,
            location,
            depth_m,
            timestamp,
            description: None,
            scores: None,
            final_score: None,
            status: ReportStatus::Pending,
            validated_at: None,
            attempts: 0,
            review_required: false,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// The reporter claims standing water at the location.
    pub fn claims_flood(&self) -> bool {
        self.depth_m > 0.0
    }
}

/// Reject malformed reports before any scoring happens.
pub fn check_input(report: &Report, config: &EngineConfig) -> Result<(), InputError> {
    if !report.location.is_finite() {
        return Err(InputError::NonFiniteCoordinate);
    }
    if !config.study_bounds.contains(&report.location) {
        return Err(InputError::OutOfBounds {
            lat: report.location.lat,
            lon: report.location.lon,
        });
    }
    if !report.depth_m.is_finite() {
        return Err(InputError::NonFiniteDepth);
    }
    if report.depth_m < 0.0 {
        return Err(InputError::NegativeDepth(report.depth_m));
    }
    if report.depth_m > config.max_depth_m {
        return Err(InputError::DepthTooLarge {
            depth: report.depth_m,
            max: config.max_depth_m,
        });
    }
    Ok(())
}
