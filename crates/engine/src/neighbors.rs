//! Report ledger and spatiotemporal neighbour queries.
//!
//! [`ReportLedger`] is the in-process report store. Besides id lookup it keeps
//! a lat/lon bucket grid so the neighbour query only scans buckets that overlap
//! the search radius. Exact distances are then checked with haversine.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, ProviderError};
use crate::geo::{meters_to_lat_degrees, meters_to_lon_degrees, Coordinate};
use crate::report::{Report, ReportId, ReportStatus, UserId};

/// Bucket edge in degrees (~1.1 km of latitude).
pub const DEFAULT_BUCKET_DEG: f64 = 0.01;

/// A nearby report, as seen by the statistical layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Neighbor {
    pub id: ReportId,
    pub user: UserId,
    pub location: Coordinate,
    pub depth_m: f64,
    pub status: ReportStatus,
    pub timestamp: DateTime<Utc>,
}

impl Neighbor {
    pub fn from_report(report: &Report) -> Self {
        Self {
            id: report.id,
            user: report.user,
            location: report.location,
            depth_m: report.depth_m,
            status: report.status,
            timestamp: report.timestamp,
        }
    }
}

/// Inclusive time range of a neighbour query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    /// The `hours` leading up to and including `at`.
    pub fn trailing(at: DateTime<Utc>, hours: i64) -> Self {
        Self {
            start: at - chrono::Duration::hours(hours),
            end: at,
        }
    }

    pub fn contains(&self, t: DateTime<Utc>) -> bool {
        t >= self.start && t <= self.end
    }
}

/// External neighbour collaborator.
pub trait NeighborQuery: Send + Sync {
    /// Reports within `radius_m` of `center` whose timestamp is in `window`.
    fn find(
        &self,
        center: Coordinate,
        radius_m: f64,
        window: TimeWindow,
    ) -> Result<Vec<Neighbor>, ProviderError>;
}

// ---------------------------------------------------------------------------
// ReportLedger
// ---------------------------------------------------------------------------

#[derive(Default)]
struct LedgerInner {
    reports: HashMap<ReportId, Report>,
    buckets: HashMap<(i64, i64), Vec<ReportId>>,
}

pub struct ReportLedger {
    bucket_deg: f64,
    inner: RwLock<LedgerInner>,
}

impl Default for ReportLedger {
    fn default() -> Self {
        Self::new(DEFAULT_BUCKET_DEG)
    }
}

impl ReportLedger {
    pub fn new(bucket_deg: f64) -> Self {
        Self {
            bucket_deg,
            inner: RwLock::new(LedgerInner::default()),
        }
    }

    fn bucket_of(&self, coord: &Coordinate) -> (i64, i64) {
        (
            (coord.lat / self.bucket_deg).floor() as i64,
            (coord.lon / self.bucket_deg).floor() as i64,
        )
    }

    /// Store a report, replacing any previous report with the same id.
    pub fn insert(&self, report: Report) -> Option<Report> {
        let id = report.id;
        let bucket = self.bucket_of(&report.location);
        let mut inner = self.inner.write();
        let previous = inner.reports.insert(id, report);
        if let Some(prev) = &previous {
            let old_bucket = self.bucket_of(&prev.location);
            if let Some(ids) = inner.buckets.get_mut(&old_bucket) {
                ids.retain(|other| *other != id);
            }
        }
        inner.buckets.entry(bucket).or_default().push(id);
        previous
    }

    pub fn get(&self, id: ReportId) -> Option<Report> {
        self.inner.read().reports.get(&id).cloned()
    }

    /// Apply `f` to a report under the ledger's write lock.
    ///
    /// `f` sees and mutates the current record, so check-then-set sequences
    /// (lifecycle transitions) cannot interleave with another writer.
    pub fn update<T>(
        &self,
        id: ReportId,
        f: impl FnOnce(&mut Report) -> Result<T, EngineError>,
    ) -> Result<T, EngineError> {
        let mut inner = self.inner.write();
        let report = inner
            .reports
            .get_mut(&id)
            .ok_or(EngineError::UnknownReport(id))?;
        f(report)
    }

    pub fn len(&self) -> usize {
        self.inner.read().reports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All reports sorted by id.
    pub fn all(&self) -> Vec<Report> {
        let mut reports: Vec<Report> = self.inner.read().reports.values().cloned().collect();
        reports.sort_by_key(|r| r.id);
        reports
    }

    pub fn ids_with_status(&self, status: ReportStatus) -> Vec<ReportId> {
        let mut ids: Vec<ReportId> = self
            .inner
            .read()
            .reports
            .values()
            .filter(|r| r.status == status)
            .map(|r| r.id)
            .collect();
        ids.sort();
        ids
    }

    pub fn count_by_status(&self) -> HashMap<ReportStatus, usize> {
        let mut counts = HashMap::new();
        for r in self.inner.read().reports.values() {
            *counts.entry(r.status).or_insert(0) += 1;
        }
        counts
    }
}

impl NeighborQuery for ReportLedger {
    fn find(
        &self,
        center: Coordinate,
        radius_m: f64,
        window: TimeWindow,
    ) -> Result<Vec<Neighbor>, ProviderError> {
        if !center.is_finite() || !radius_m.is_finite() {
            return Err(ProviderError::Malformed(
                "neighbour query with non-finite center or radius".into(),
            ));
        }
        let dlat = meters_to_lat_degrees(radius_m);
        let dlon = meters_to_lon_degrees(radius_m, center.lat);
        let (min_bl, min_bo) = self.bucket_of(&Coordinate::new(center.lat - dlat, center.lon - dlon));
        let (max_bl, max_bo) = self.bucket_of(&Coordinate::new(center.lat + dlat, center.lon + dlon));

        let inner = self.inner.read();
        let mut found = Vec::new();
        for bl in min_bl..=max_bl {
            for bo in min_bo..=max_bo {
                let Some(ids) = inner.buckets.get(&(bl, bo)) else {
                    continue;
                };
                for id in ids {
                    let Some(r) = inner.reports.get(id) else {
                        continue;
                    };
                    if window.contains(r.timestamp) && center.distance_m(&r.location) <= radius_m {
                        found.push(Neighbor::from_report(r));
                    }
                }
            }
        }
        found.sort_by_key(|n| n.id);
        Ok(found)
    }
}
