//! Snapshot files across restarts and damaged writes.

use std::fs;
use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};

use engine::{
    Coordinate, EngineConfig, InMemoryTrustStore, RainfallTable, Report, ReportId, ReportLedger,
    ReportStatus, TerrainError, TerrainLookup, TerrainSample, TrustStore, UserId,
    ValidationPipeline,
};
use store::{load_snapshot, save_snapshot, Snapshot, StoreError};

struct Lowland;

impl TerrainLookup for Lowland {
    fn sample(&self, _at: Coordinate) -> Result<TerrainSample, TerrainError> {
        Ok(TerrainSample {
            elevation: 7.0,
            hand: 0.8,
            slope_deg: 1.5,
            neighborhood_mean: 9.0,
            neighborhood_std: 1.2,
        })
    }
}

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2019, 5, 3, 12, 0, 0).unwrap()
}

fn report(id: u64, user: u64, at: DateTime<Utc>) -> Report {
    Report::new(
        ReportId(id),
        UserId(user),
        Coordinate::new(20.4625 + id as f64 * 0.001, 85.8830),
        1.2,
        at,
    )
}

struct World {
    pipeline: ValidationPipeline,
    ledger: Arc<ReportLedger>,
    trust: Arc<InMemoryTrustStore>,
}

fn world() -> World {
    let config = EngineConfig::default();
    let ledger = Arc::new(ReportLedger::default());
    let trust = Arc::new(InMemoryTrustStore::new(config.reputation.clone()));
    let pipeline = ValidationPipeline::new(
        Arc::new(config),
        Arc::clone(&ledger),
        trust.clone(),
        Arc::new(Lowland),
        Arc::new(RainfallTable::default()),
    )
    .unwrap();
    World {
        pipeline,
        ledger,
        trust,
    }
}

#[test]
fn test_restart_resumes_from_saved_state() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.snap");

    let before = world();
    for id in 1..=4 {
        before.pipeline.submit(report(id, id % 2, t0())).unwrap();
    }
    before.pipeline.validate(ReportId(1), t0()).unwrap();
    before.pipeline.validate(ReportId(2), t0()).unwrap();

    let snapshot = Snapshot::capture(&before.trust, &before.ledger);
    save_snapshot(&path, &snapshot, true).unwrap();

    let after = world();
    let summary = load_snapshot(&path)
        .unwrap()
        .restore(&after.trust, &after.ledger)
        .unwrap();
    assert_eq!(summary.reports, 4);
    assert_eq!(summary.trust_records, before.trust.len());
    assert_eq!(summary.requeued, 0);

    assert_eq!(after.ledger.all(), before.ledger.all());
    assert_eq!(after.trust.export(), before.trust.export());

    // Pending work carries on where it stopped.
    let pending = after.pipeline.validate_pending(t0() + Duration::minutes(5));
    assert_eq!(pending.len(), 2);
    for (_, result) in pending {
        assert!(result.unwrap().status().is_decided());
    }
    let trust = after.trust.read(UserId(1)).unwrap();
    assert_eq!(trust.state.total_reports, 2);
}

#[test]
fn test_uncompressed_and_compressed_files_load_alike() {
    let dir = tempfile::tempdir().unwrap();
    let w = world();
    for id in 1..=20 {
        w.pipeline.submit(report(id, 1, t0())).unwrap();
    }
    let snapshot = Snapshot::capture(&w.trust, &w.ledger);

    let plain = dir.path().join("plain.snap");
    let packed = dir.path().join("packed.snap");
    save_snapshot(&plain, &snapshot, false).unwrap();
    save_snapshot(&packed, &snapshot, true).unwrap();

    assert_eq!(load_snapshot(&plain).unwrap(), snapshot);
    assert_eq!(load_snapshot(&packed).unwrap(), snapshot);
}

#[test]
fn test_damaged_file_is_refused_and_targets_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.snap");

    let w = world();
    w.pipeline.submit(report(1, 1, t0())).unwrap();
    w.pipeline.validate(ReportId(1), t0()).unwrap();
    save_snapshot(&path, &Snapshot::capture(&w.trust, &w.ledger), false).unwrap();

    let mut bytes = fs::read(&path).unwrap();
    let mid = bytes.len() / 2 + 14;
    bytes[mid] ^= 0x5A;
    fs::write(&path, &bytes).unwrap();

    let err = load_snapshot(&path).unwrap_err();
    assert!(matches!(err, StoreError::Corrupted { .. }), "got: {err}");

    let fresh = world();
    assert!(fresh.ledger.is_empty());
    assert!(fresh.trust.is_empty());
}

#[test]
fn test_missing_file_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = load_snapshot(&dir.path().join("absent.snap")).unwrap_err();
    assert!(matches!(err, StoreError::Io(_)));
}

#[test]
fn test_report_caught_mid_validation_is_requeued() {
    let w = world();
    w.pipeline.submit(report(1, 1, t0())).unwrap();
    w.ledger
        .update(ReportId(1), |r| {
            r.status = ReportStatus::Validating;
            Ok(())
        })
        .unwrap();

    let snapshot = Snapshot::capture(&w.trust, &w.ledger);
    let restored = world();
    let summary = snapshot.restore(&restored.trust, &restored.ledger).unwrap();
    assert_eq!(summary.requeued, 1);
    assert_eq!(
        restored.ledger.get(ReportId(1)).unwrap().status,
        ReportStatus::Pending
    );
}

#[test]
fn test_bad_record_aborts_whole_restore() {
    let w = world();
    w.pipeline.submit(report(1, 1, t0())).unwrap();
    w.pipeline.submit(report(2, 2, t0())).unwrap();
    let mut snapshot = Snapshot::capture(&w.trust, &w.ledger);
    snapshot.reports[1].status = 42;

    let target = world();
    assert!(snapshot.restore(&target.trust, &target.ledger).is_err());
    assert!(target.ledger.is_empty());
}
