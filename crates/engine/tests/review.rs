//! Reviewer overrides and retention.

mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;

use chrono::Duration;

use common::*;
use engine::{EngineError, ReportId, ReportStatus, TrustStore, UserId, ValidationResult};

#[test]
fn test_override_flagged_to_validated() {
    let (h, store) = simple_harness(Some(hilltop()));
    h.pipeline.submit(report_at(1, 1, 0.0, 1.5, t0())).unwrap();
    assert_eq!(
        h.pipeline.validate(ReportId(1), t0()).unwrap().status(),
        ReportStatus::Flagged
    );

    let later = t0() + Duration::hours(3);
    let trust = h
        .pipeline
        .override_decision(ReportId(1), ReportStatus::Validated, later)
        .unwrap();
    assert_eq!((trust.state.alpha, trust.state.beta), (2.0, 1.0));
    // The report was already counted when it was flagged.
    assert_eq!(trust.state.total_reports, 1);
    assert_eq!(trust.state.validated_reports, 1);

    let r = h.ledger.get(ReportId(1)).unwrap();
    assert_eq!(r.status, ReportStatus::Validated);
    assert_eq!(r.validated_at, Some(later));
    assert_eq!(store.read(UserId(1)).unwrap(), trust);
}

#[test]
fn test_override_flagged_to_rejected_lowers_trust() {
    let (h, _) = simple_harness(Some(hilltop()));
    h.pipeline.submit(report_at(1, 1, 0.0, 1.5, t0())).unwrap();
    h.pipeline.validate(ReportId(1), t0()).unwrap();

    let trust = h
        .pipeline
        .override_decision(ReportId(1), ReportStatus::Rejected, t0())
        .unwrap();
    assert_eq!((trust.state.alpha, trust.state.beta), (1.0, 2.0));
    assert!((trust.trust() - 1.0 / 3.0).abs() < 1e-12);
    assert_eq!(h.ledger.get(ReportId(1)).unwrap().status, ReportStatus::Rejected);
}

#[test]
fn test_override_requires_flagged_report() {
    let (h, store) = simple_harness(Some(lowland()));
    h.pipeline.submit(report_at(1, 1, 0.0, 1.5, t0())).unwrap();
    h.pipeline.validate(ReportId(1), t0()).unwrap();
    let before = store.read(UserId(1)).unwrap();

    let err = h
        .pipeline
        .override_decision(ReportId(1), ReportStatus::Rejected, t0())
        .unwrap_err();
    assert_eq!(
        err,
        EngineError::InvalidTransition {
            from: ReportStatus::Validated,
            to: ReportStatus::Rejected,
        }
    );
    assert_eq!(store.read(UserId(1)).unwrap(), before);

    let missing = h
        .pipeline
        .override_decision(ReportId(42), ReportStatus::Validated, t0())
        .unwrap_err();
    assert_eq!(missing, EngineError::UnknownReport(ReportId(42)));
}

#[test]
fn test_override_rolls_back_when_trust_commit_fails() {
    let config = test_config();
    let store = Arc::new(ConflictingStore::new(&config, false));
    let h = harness(config, store.clone(), Arc::new(FixedTerrain(Some(hilltop()))));
    h.pipeline.submit(report_at(1, 1, 0.0, 1.5, t0())).unwrap();
    h.pipeline.validate(ReportId(1), t0()).unwrap();
    let before = h.ledger.get(ReportId(1)).unwrap();
    assert_eq!(before.status, ReportStatus::Flagged);

    store.conflict.store(true, Ordering::SeqCst);
    let err = h
        .pipeline
        .override_decision(ReportId(1), ReportStatus::Validated, t0() + Duration::hours(1))
        .unwrap_err();
    assert!(matches!(err, EngineError::TrustContention { .. }));
    assert_eq!(h.ledger.get(ReportId(1)).unwrap(), before);
}

#[test]
fn test_forced_flag_can_be_reviewed() {
    let config = test_config();
    let store = Arc::new(engine::InMemoryTrustStore::new(config.reputation.clone()));
    let h = harness(config, store.clone(), Arc::new(DownTerrain::default()));
    h.pipeline.submit(report_at(1, 1, 0.0, 1.5, t0())).unwrap();
    let mut last = None;
    for _ in 0..3 {
        last = Some(h.pipeline.validate(ReportId(1), t0()).unwrap());
    }
    assert!(matches!(last, Some(ValidationResult::ForcedFlag { .. })));

    let trust = h
        .pipeline
        .override_decision(ReportId(1), ReportStatus::Validated, t0())
        .unwrap();
    assert_eq!(trust.state.alpha, 2.0);
    assert_eq!(trust.state.total_reports, 1);
    assert!(!h.ledger.get(ReportId(1)).unwrap().review_required);
}

#[test]
fn test_archive_after_retention_window() {
    let (h, _) = simple_harness(Some(lowland()));
    h.pipeline.submit(report_at(1, 1, 0.0, 1.5, t0())).unwrap();
    h.pipeline.submit(report_at(2, 2, 200.0, 1.5, t0())).unwrap();
    h.pipeline.validate(ReportId(1), t0()).unwrap();

    assert!(h.pipeline.archive_expired(t0() + Duration::days(29)).unwrap().is_empty());
    let archived = h.pipeline.archive_expired(t0() + Duration::days(30)).unwrap();
    assert_eq!(archived, vec![ReportId(1)]);
    assert_eq!(h.ledger.get(ReportId(1)).unwrap().status, ReportStatus::Archived);
    // Never decided, so never archived.
    assert_eq!(h.ledger.get(ReportId(2)).unwrap().status, ReportStatus::Pending);

    // Archiving twice is a no-op.
    assert!(h.pipeline.archive_expired(t0() + Duration::days(60)).unwrap().is_empty());
}

#[test]
fn test_archived_reports_do_not_corroborate() {
    let (h, _) = simple_harness(Some(lowland()));
    h.pipeline.submit(report_at(1, 1, 0.0, 1.5, t0())).unwrap();
    h.pipeline.validate(ReportId(1), t0()).unwrap();
    h.pipeline.archive_expired(t0() + Duration::days(30)).unwrap();

    // Same timestamp window as the archived report.
    h.pipeline
        .submit(report_at(2, 2, 100.0, 1.5, t0() + Duration::hours(1)))
        .unwrap();
    match h.pipeline.validate(ReportId(2), t0() + Duration::days(30)).unwrap() {
        ValidationResult::Decided { outcome, .. } => {
            assert_eq!(outcome.statistical.corroborating, 0);
        }
        other => panic!("expected a decision, got {other:?}"),
    }
}
