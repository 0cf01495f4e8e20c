//! `floodtrust serve`: a blocking loop that reads JSON commands from stdin
//! and writes one JSON response per line to stdout.
//!
//! Logs go to stderr so they never interleave with the protocol.

use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context};
use chrono::Utc;
use tracing::{debug, info, warn};

use engine::rainfall::GaugeReading;
use engine::{
    Coordinate, EngineConfig, EngineError, InMemoryTrustStore, RainfallTable, ReportId,
    ReportLedger, TerrainLookup, TrustStore, UserId, ValidationPipeline, ValidationResult,
};
use store::{load_snapshot, save_snapshot, Snapshot};

use crate::protocol::{error_response, make_response, BatchEntry, Command, Payload, Response};

/// Engine state behind one protocol session.
pub struct Session {
    pipeline: ValidationPipeline,
    ledger: Arc<ReportLedger>,
    trust: Arc<InMemoryTrustStore>,
    rainfall: Arc<RainfallTable>,
    snapshot_path: Option<PathBuf>,
    compress: bool,
}

impl Session {
    pub fn new(
        config: Arc<EngineConfig>,
        terrain: Arc<dyn TerrainLookup>,
        snapshot_path: Option<PathBuf>,
        compress: bool,
    ) -> Result<Self, EngineError> {
        let ledger = Arc::new(ReportLedger::default());
        let trust = Arc::new(InMemoryTrustStore::new(config.reputation.clone()));
        let rainfall = Arc::new(RainfallTable::default());
        let pipeline = ValidationPipeline::new(
            config,
            Arc::clone(&ledger),
            trust.clone(),
            terrain,
            rainfall.clone(),
        )?;
        Ok(Self {
            pipeline,
            ledger,
            trust,
            rainfall,
            snapshot_path,
            compress,
        })
    }

    /// Restore the default snapshot if one exists on disk.
    pub fn resume(&self) -> anyhow::Result<()> {
        if let Some(path) = self.snapshot_path.as_deref() {
            if path.exists() {
                let summary = self.restore_from(path)?;
                info!(
                    path = %path.display(),
                    reports = summary.reports,
                    users = summary.trust_records,
                    "resumed from snapshot"
                );
            }
        }
        Ok(())
    }

    fn restore_from(&self, path: &Path) -> anyhow::Result<store::RestoreSummary> {
        let snapshot = load_snapshot(path)
            .with_context(|| format!("failed loading snapshot {}", path.display()))?;
        Ok(snapshot.restore(&self.trust, &self.ledger)?)
    }

    fn target_path(&self, explicit: Option<PathBuf>) -> anyhow::Result<PathBuf> {
        explicit
            .or_else(|| self.snapshot_path.clone())
            .ok_or_else(|| anyhow!("no snapshot path given and no --snapshot configured"))
    }

    pub fn handle(&self, cmd: Command) -> Response {
        match self.dispatch(cmd) {
            Ok(payload) => make_response(payload),
            Err(e) => error_response(e.to_string()),
        }
    }

    fn dispatch(&self, cmd: Command) -> anyhow::Result<Payload> {
        let payload = match cmd {
            Command::Submit { report } => {
                let id = self.pipeline.submit(report.into_report())?;
                Payload::Submitted { id }
            }

            Command::Validate { id, now } => {
                let result = self
                    .pipeline
                    .validate(ReportId(id), now.unwrap_or_else(Utc::now))?;
                Payload::Validation { result }
            }

            Command::ValidatePending { now } => {
                let results = self
                    .pipeline
                    .validate_pending(now.unwrap_or_else(Utc::now))
                    .into_iter()
                    .map(|(id, r)| batch_entry(id, r))
                    .collect();
                Payload::Batch { results }
            }

            Command::Override { id, status, now } => {
                let trust = self.pipeline.override_decision(
                    ReportId(id),
                    status,
                    now.unwrap_or_else(Utc::now),
                )?;
                Payload::Overridden {
                    id: ReportId(id),
                    trust,
                }
            }

            Command::Archive { now } => {
                let ids = self.pipeline.archive_expired(now.unwrap_or_else(Utc::now))?;
                Payload::Archived { ids }
            }

            Command::Report { id } => {
                let report = self
                    .ledger
                    .get(ReportId(id))
                    .ok_or(EngineError::UnknownReport(ReportId(id)))?;
                Payload::Report { report }
            }

            Command::Trust { user } => {
                let snapshot = self.trust.read(UserId(user))?;
                Payload::Trust {
                    trust: snapshot.trust(),
                    snapshot,
                }
            }

            Command::Rainfall {
                station,
                lat,
                lon,
                rainfall_24h_mm,
            } => {
                if !(rainfall_24h_mm.is_finite() && rainfall_24h_mm >= 0.0) {
                    return Err(anyhow!("rainfall must be a non-negative number of mm"));
                }
                self.rainfall.record(GaugeReading {
                    station,
                    location: Coordinate::new(lat, lon),
                    rainfall_24h_mm,
                });
                Payload::Ok
            }

            Command::Stats => Payload::Stats {
                reports: self
                    .ledger
                    .count_by_status()
                    .into_iter()
                    .map(|(status, n)| (status.as_str().to_string(), n))
                    .collect(),
                users: self.trust.len(),
                gauges: self.rainfall.len(),
                clusters: self.pipeline.cluster_summary(),
            },

            Command::Save { path } => {
                let path = self.target_path(path)?;
                let snapshot = Snapshot::capture(&self.trust, &self.ledger);
                let bytes = save_snapshot(&path, &snapshot, self.compress)?;
                Payload::Saved { path, bytes }
            }

            Command::Load { path } => {
                let path = self.target_path(path)?;
                let summary = self.restore_from(&path)?;
                Payload::Loaded {
                    path,
                    reports: summary.reports,
                    users: summary.trust_records,
                    requeued: summary.requeued,
                }
            }

            Command::Quit => Payload::Goodbye,
        };
        Ok(payload)
    }
}

fn batch_entry(id: ReportId, result: Result<ValidationResult, EngineError>) -> BatchEntry {
    match result {
        Ok(result) => BatchEntry {
            id,
            result: Some(result),
            error: None,
        },
        Err(e) => BatchEntry {
            id,
            result: None,
            error: Some(e.to_string()),
        },
    }
}

fn write_line<W: Write>(out: &mut W, response: &Response) -> std::io::Result<()> {
    serde_json::to_writer(&mut *out, response)?;
    out.write_all(b"\n")?;
    out.flush()
}

/// Run the protocol until `quit` or end of input.
pub fn run<R: BufRead, W: Write>(session: &Session, input: R, mut output: W) -> std::io::Result<()> {
    write_line(&mut output, &make_response(Payload::Ready))?;

    for line in input.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }

        let cmd: Command = match serde_json::from_str(&line) {
            Ok(c) => c,
            Err(e) => {
                warn!("unparseable command: {e}");
                write_line(&mut output, &error_response(format!("Parse error: {e}")))?;
                continue;
            }
        };
        debug!(?cmd, "command");

        let response = session.handle(cmd);
        let is_goodbye = matches!(response.payload, Payload::Goodbye);
        write_line(&mut output, &response)?;
        if is_goodbye {
            break;
        }
    }

    info!("serve session closed");
    Ok(())
}
