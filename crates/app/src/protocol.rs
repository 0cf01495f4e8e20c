//! Newline-delimited JSON protocol spoken by `floodtrust serve`.
//!
//! Each stdin line is one [`Command`] with a `"cmd"` discriminator. Each
//! stdout line is a [`Response`] carrying `"protocol_version"` and a `"type"`.

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use engine::statistical::ClusterSummary;
use engine::{
    Coordinate, Report, ReportId, ReportStatus, TrustSnapshot, UserId, ValidationResult,
};

// ---------------------------------------------------------------------------
// Commands (stdin -> engine)
// ---------------------------------------------------------------------------

/// A report as a client submits it. Derived fields start empty.
#[derive(Debug, Clone, Deserialize)]
pub struct Submission {
    pub id: u64,
    pub user: u64,
    pub lat: f64,
    pub lon: f64,
    pub depth_m: f64,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub description: Option<String>,
}

impl Submission {
    pub fn into_report(self) -> Report {
        let mut report = Report::new(
            ReportId(self.id),
            UserId(self.user),
            Coordinate::new(self.lat, self.lon),
            self.depth_m,
            self.timestamp,
        );
        report.description = self.description;
        report
    }
}

/// Commands that take a `now` fall back to the wall clock when it is omitted.
#[derive(Debug, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum Command {
    Submit {
        report: Submission,
    },
    Validate {
        id: u64,
        #[serde(default)]
        now: Option<DateTime<Utc>>,
    },
    /// Validate every pending report in parallel.
    ValidatePending {
        #[serde(default)]
        now: Option<DateTime<Utc>>,
    },
    /// Reviewer decision on a flagged report.
    Override {
        id: u64,
        status: ReportStatus,
        #[serde(default)]
        now: Option<DateTime<Utc>>,
    },
    Archive {
        #[serde(default)]
        now: Option<DateTime<Utc>>,
    },
    Report {
        id: u64,
    },
    Trust {
        user: u64,
    },
    /// Record or replace a rain gauge reading.
    Rainfall {
        station: String,
        lat: f64,
        lon: f64,
        rainfall_24h_mm: f64,
    },
    Stats,
    Save {
        #[serde(default)]
        path: Option<PathBuf>,
    },
    Load {
        #[serde(default)]
        path: Option<PathBuf>,
    },
    Quit,
}

// ---------------------------------------------------------------------------
// Responses (engine -> stdout)
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct Response {
    pub protocol_version: u32,
    #[serde(flatten)]
    pub payload: Payload,
}

/// Outcome of one report inside a batch.
#[derive(Debug, Serialize)]
pub struct BatchEntry {
    pub id: ReportId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<ValidationResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Payload {
    Ready,
    Submitted {
        id: ReportId,
    },
    Validation {
        result: ValidationResult,
    },
    Batch {
        results: Vec<BatchEntry>,
    },
    Overridden {
        id: ReportId,
        trust: TrustSnapshot,
    },
    Archived {
        ids: Vec<ReportId>,
    },
    Report {
        report: Report,
    },
    Trust {
        snapshot: TrustSnapshot,
        trust: f64,
    },
    Stats {
        reports: BTreeMap<String, usize>,
        users: usize,
        gauges: usize,
        clusters: ClusterSummary,
    },
    Saved {
        path: PathBuf,
        bytes: usize,
    },
    Loaded {
        path: PathBuf,
        reports: usize,
        users: usize,
        requeued: usize,
    },
    Ok,
    Error {
        message: String,
    },
    Goodbye,
}

/// Bump when the command/response schema changes.
pub const PROTOCOL_VERSION: u32 = 1;

pub fn make_response(payload: Payload) -> Response {
    Response {
        protocol_version: PROTOCOL_VERSION,
        payload,
    }
}

pub fn error_response(message: impl Into<String>) -> Response {
    make_response(Payload::Error {
        message: message.into(),
    })
}
