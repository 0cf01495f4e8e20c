//! Snapshot of the report ledger and submitter trust records.
//!
//! Records are flat, bitcode-friendly mirrors of the engine types. Timestamps
//! are stored as Unix milliseconds, so sub-millisecond precision is dropped.

use std::path::Path;

use bitcode::{Decode, Encode};
use chrono::{DateTime, TimeZone, Utc};
use tracing::{info, warn};

use engine::{
    Coordinate, InMemoryTrustStore, LayerScores, Report, ReportId, ReportLedger, ReportStatus,
    TrustSnapshot, TrustState, UserId,
};

use crate::atomic_write::atomic_write;
use crate::file_header::{decode_payload, unwrap_header, wrap_with_header};
use crate::store_error::StoreError;

/// Schema version of the encoded `Snapshot`.
pub const CURRENT_SNAPSHOT_VERSION: u32 = 1;

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Encode, Decode)]
pub struct TrustRecord {
    pub user: u64,
    pub alpha: f64,
    pub beta: f64,
    pub total_reports: u64,
    pub validated_reports: u64,
    pub rejected_reports: u64,
    pub last_active_ms: Option<i64>,
    pub version: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Encode, Decode)]
pub struct ScoreRecord {
    pub physical: f64,
    pub statistical: f64,
    pub reputation: f64,
}

#[derive(Debug, Clone, PartialEq, Encode, Decode)]
pub struct ReportRecord {
    pub id: u64,
    pub user: u64,
    pub lat: f64,
    pub lon: f64,
    pub depth_m: f64,
    pub timestamp_ms: i64,
    pub description: Option<String>,
    pub scores: Option<ScoreRecord>,
    pub final_score: Option<f64>,
    pub status: u8,
    pub validated_at_ms: Option<i64>,
    pub attempts: u32,
    pub review_required: bool,
}

fn status_tag(status: ReportStatus) -> u8 {
    match status {
        ReportStatus::Pending => 0,
        ReportStatus::Validating => 1,
        ReportStatus::Validated => 2,
        ReportStatus::Flagged => 3,
        ReportStatus::Rejected => 4,
        ReportStatus::Archived => 5,
    }
}

fn status_from_tag(tag: u8) -> Result<ReportStatus, StoreError> {
    ReportStatus::ALL
        .get(tag as usize)
        .copied()
        .ok_or_else(|| StoreError::Decode(format!("unknown report status tag {tag}")))
}

fn from_millis(ms: i64, field: &str) -> Result<DateTime<Utc>, StoreError> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .ok_or_else(|| StoreError::Decode(format!("{field} out of range: {ms}")))
}

impl From<&TrustSnapshot> for TrustRecord {
    fn from(s: &TrustSnapshot) -> Self {
        Self {
            user: s.user.0,
            alpha: s.state.alpha,
            beta: s.state.beta,
            total_reports: s.state.total_reports,
            validated_reports: s.state.validated_reports,
            rejected_reports: s.state.rejected_reports,
            last_active_ms: s.state.last_active.map(|t| t.timestamp_millis()),
            version: s.version,
        }
    }
}

impl TryFrom<&TrustRecord> for TrustSnapshot {
    type Error = StoreError;

    fn try_from(r: &TrustRecord) -> Result<Self, StoreError> {
        if !(r.alpha > 0.0 && r.beta > 0.0) {
            return Err(StoreError::Decode(format!(
                "user {} has non-positive pseudo-counts ({}, {})",
                r.user, r.alpha, r.beta
            )));
        }
        let last_active = r
            .last_active_ms
            .map(|ms| from_millis(ms, "last_active"))
            .transpose()?;
        Ok(TrustSnapshot {
            user: UserId(r.user),
            state: TrustState {
                alpha: r.alpha,
                beta: r.beta,
                total_reports: r.total_reports,
                validated_reports: r.validated_reports,
                rejected_reports: r.rejected_reports,
                last_active,
            },
            version: r.version,
        })
    }
}

impl From<&Report> for ReportRecord {
    fn from(r: &Report) -> Self {
        Self {
            id: r.id.0,
            user: r.user.0,
            lat: r.location.lat,
            lon: r.location.lon,
            depth_m: r.depth_m,
            timestamp_ms: r.timestamp.timestamp_millis(),
            description: r.description.clone(),
            scores: r.scores.map(|s| ScoreRecord {
                physical: s.physical,
                statistical: s.statistical,
                reputation: s.reputation,
            }),
            final_score: r.final_score,
            status: status_tag(r.status),
            validated_at_ms: r.validated_at.map(|t| t.timestamp_millis()),
            attempts: r.attempts,
            review_required: r.review_required,
        }
    }
}

impl TryFrom<&ReportRecord> for Report {
    type Error = StoreError;

    fn try_from(r: &ReportRecord) -> Result<Self, StoreError> {
        let mut report = Report::new(
            ReportId(r.id),
            UserId(r.user),
            Coordinate::new(r.lat, r.lon),
            r.depth_m,
            from_millis(r.timestamp_ms, "timestamp")?,
        );
        report.description = r.description.clone();
        report.scores = r.scores.map(|s| LayerScores {
            physical: s.physical,
            statistical: s.statistical,
            reputation: s.reputation,
        });
        report.final_score = r.final_score;
        report.status = status_from_tag(r.status)?;
        report.validated_at = r
            .validated_at_ms
            .map(|ms| from_millis(ms, "validated_at"))
            .transpose()?;
        report.attempts = r.attempts;
        report.review_required = r.review_required;
        Ok(report)
    }
}

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Encode, Decode)]
pub struct Snapshot {
    pub version: u32,
    pub trust: Vec<TrustRecord>,
    pub reports: Vec<ReportRecord>,
}

/// What `Snapshot::restore` put back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RestoreSummary {
    pub trust_records: usize,
    pub reports: usize,
    /// Reports captured mid-validation and returned to `pending`.
    pub requeued: usize,
}

impl Snapshot {
    /// Copy the current contents of a trust store and a ledger.
    pub fn capture(trust: &InMemoryTrustStore, ledger: &ReportLedger) -> Self {
        Self {
            version: CURRENT_SNAPSHOT_VERSION,
            trust: trust.export().iter().map(TrustRecord::from).collect(),
            reports: ledger.all().iter().map(ReportRecord::from).collect(),
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        bitcode::encode(self)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, bitcode::Error> {
        bitcode::decode(bytes)
    }

    /// Load the records into `trust` and `ledger`, replacing entries that
    /// share a user or report id.
    ///
    /// Every record is converted before anything is written, so a bad record
    /// leaves both targets untouched. A report captured in `validating` had
    /// its attempt cut short and comes back as `pending`.
    pub fn restore(
        &self,
        trust: &InMemoryTrustStore,
        ledger: &ReportLedger,
    ) -> Result<RestoreSummary, StoreError> {
        let snapshots = self
            .trust
            .iter()
            .map(TrustSnapshot::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        let mut reports = self
            .reports
            .iter()
            .map(Report::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        let mut requeued = 0;
        for report in &mut reports {
            if report.status == ReportStatus::Validating {
                report.status = ReportStatus::Pending;
                requeued += 1;
            }
        }
        if requeued > 0 {
            warn!("{requeued} report(s) were mid-validation at capture; requeued as pending");
        }

        let summary = RestoreSummary {
            trust_records: snapshots.len(),
            reports: reports.len(),
            requeued,
        };
        trust.import(snapshots);
        for report in reports {
            ledger.insert(report);
        }
        Ok(summary)
    }

    /// Frame the snapshot for storage.
    pub fn to_bytes(&self, compress: bool) -> Result<Vec<u8>, StoreError> {
        wrap_with_header(&self.encode(), compress)
    }

    /// Parse a framed snapshot, checking header, checksum and schema version.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, StoreError> {
        let (header, payload) = unwrap_header(bytes)?;
        let raw = decode_payload(&header, payload)?;
        let snapshot = Self::decode(&raw)?;
        if snapshot.version > CURRENT_SNAPSHOT_VERSION {
            return Err(StoreError::VersionMismatch {
                expected_max: CURRENT_SNAPSHOT_VERSION,
                found: snapshot.version,
            });
        }
        Ok(snapshot)
    }
}

// ---------------------------------------------------------------------------
// File I/O
// ---------------------------------------------------------------------------

/// Write a snapshot to `path` atomically. Returns the file size in bytes.
pub fn save_snapshot(path: &Path, snapshot: &Snapshot, compress: bool) -> Result<usize, StoreError> {
    let bytes = snapshot.to_bytes(compress)?;
    atomic_write(path, &bytes)?;
    info!(
        path = %path.display(),
        users = snapshot.trust.len(),
        reports = snapshot.reports.len(),
        bytes = bytes.len(),
        compress,
        "snapshot saved"
    );
    Ok(bytes.len())
}

pub fn load_snapshot(path: &Path) -> Result<Snapshot, StoreError> {
    let bytes = std::fs::read(path)?;
    let snapshot = Snapshot::from_bytes(&bytes)?;
    info!(
        path = %path.display(),
        users = snapshot.trust.len(),
        reports = snapshot.reports.len(),
        "snapshot loaded"
    );
    Ok(snapshot)
}
