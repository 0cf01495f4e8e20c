//! Shared fixtures for the engine integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};

use engine::config::ProviderParams;
use engine::geo::meters_to_lat_degrees;
use engine::rainfall::GaugeReading;
use engine::reputation::TrustUpdate;
use engine::{
    Coordinate, EngineConfig, InMemoryTrustStore, RainfallTable, Report, ReportId,
    ReportLedger, TerrainError, TerrainLookup, TerrainSample, TrustSnapshot, TrustStore,
    TrustStoreError, UserId, ValidationPipeline,
};

pub const CUTTACK: Coordinate = Coordinate {
    lat: 20.4625,
    lon: 85.8830,
};

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2019, 5, 3, 12, 0, 0).unwrap()
}

/// Fast provider limits so failure tests stay quick.
pub fn test_config() -> EngineConfig {
    EngineConfig {
        providers: ProviderParams {
            pool_size: 8,
            timeout_ms: 500,
            fetch_retries: 0,
            backoff_base_ms: 1,
        },
        ..EngineConfig::default()
    }
}

/// HAND 0.5 m, slope 2°, 3 m below the surroundings: L1 ≈ 0.9816.
pub fn lowland() -> TerrainSample {
    TerrainSample {
        elevation: 7.0,
        hand: 0.5,
        slope_deg: 2.0,
        neighborhood_mean: 10.0,
        neighborhood_std: 1.5,
    }
}

/// HAND 12 m, slope 35°, 6 m above the surroundings: L1 = 0.12.
pub fn hilltop() -> TerrainSample {
    TerrainSample {
        elevation: 66.0,
        hand: 12.0,
        slope_deg: 35.0,
        neighborhood_mean: 60.0,
        neighborhood_std: 3.0,
    }
}

/// Same answer for every coordinate.
pub struct FixedTerrain(pub Option<TerrainSample>);

impl TerrainLookup for FixedTerrain {
    fn sample(&self, _coord: Coordinate) -> Result<TerrainSample, TerrainError> {
        self.0.ok_or(TerrainError::NotCovered)
    }
}

/// Always fails with a connection error and counts the calls.
#[derive(Default)]
pub struct DownTerrain {
    pub calls: AtomicU32,
}

impl TerrainLookup for DownTerrain {
    fn sample(&self, _coord: Coordinate) -> Result<TerrainSample, TerrainError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(TerrainError::Unavailable("connection refused".into()))
    }
}

/// Answers, but only after `delay`.
pub struct SlowTerrain {
    pub delay: Duration,
}

impl TerrainLookup for SlowTerrain {
    fn sample(&self, _coord: Coordinate) -> Result<TerrainSample, TerrainError> {
        std::thread::sleep(self.delay);
        Ok(lowland())
    }
}

/// Trust store that reports a version conflict on every write while `conflict`
/// is set.
pub struct ConflictingStore {
    pub inner: InMemoryTrustStore,
    pub conflict: AtomicBool,
    pub writes_attempted: AtomicU32,
}

impl ConflictingStore {
    pub fn new(config: &EngineConfig, conflict: bool) -> Self {
        Self {
            inner: InMemoryTrustStore::new(config.reputation.clone()),
            conflict: AtomicBool::new(conflict),
            writes_attempted: AtomicU32::new(0),
        }
    }
}

impl TrustStore for ConflictingStore {
    fn read(&self, user: UserId) -> Result<TrustSnapshot, TrustStoreError> {
        self.inner.read(user)
    }

    fn compare_and_update(
        &self,
        user: UserId,
        expected_version: u64,
        update: &TrustUpdate,
    ) -> Result<TrustSnapshot, TrustStoreError> {
        self.writes_attempted.fetch_add(1, Ordering::SeqCst);
        if self.conflict.load(Ordering::SeqCst) {
            return Err(TrustStoreError::Conflict {
                expected: expected_version,
                found: expected_version + 1,
            });
        }
        self.inner.compare_and_update(user, expected_version, update)
    }
}

/// Trust store whose backend rejects every write while `down` is set.
pub struct OfflineStore {
    pub inner: InMemoryTrustStore,
    pub down: AtomicBool,
}

impl OfflineStore {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            inner: InMemoryTrustStore::new(config.reputation.clone()),
            down: AtomicBool::new(true),
        }
    }
}

impl TrustStore for OfflineStore {
    fn read(&self, user: UserId) -> Result<TrustSnapshot, TrustStoreError> {
        self.inner.read(user)
    }

    fn compare_and_update(
        &self,
        user: UserId,
        expected_version: u64,
        update: &TrustUpdate,
    ) -> Result<TrustSnapshot, TrustStoreError> {
        if self.down.load(Ordering::SeqCst) {
            return Err(TrustStoreError::Backend("db down".into()));
        }
        self.inner.compare_and_update(user, expected_version, update)
    }
}

/// Gauge on Cuttack reporting an extreme 24 h total.
pub fn wet_rainfall() -> RainfallTable {
    RainfallTable::with_readings(
        25_000.0,
        vec![GaugeReading {
            station: "cuttack".into(),
            location: CUTTACK,
            rainfall_24h_mm: 180.0,
        }],
    )
}

pub struct Harness {
    pub pipeline: ValidationPipeline,
    pub ledger: Arc<ReportLedger>,
}

pub fn harness(
    config: EngineConfig,
    trust: Arc<dyn TrustStore>,
    terrain: Arc<dyn TerrainLookup>,
) -> Harness {
    let ledger = Arc::new(ReportLedger::default());
    let pipeline = ValidationPipeline::new(
        Arc::new(config),
        Arc::clone(&ledger),
        trust,
        terrain,
        Arc::new(wet_rainfall()),
    )
    .unwrap();
    Harness { pipeline, ledger }
}

/// Pipeline over fixed terrain with a plain in-memory trust store.
pub fn simple_harness(terrain: Option<TerrainSample>) -> (Harness, Arc<InMemoryTrustStore>) {
    let config = test_config();
    let store = Arc::new(InMemoryTrustStore::new(config.reputation.clone()));
    let h = harness(config, store.clone(), Arc::new(FixedTerrain(terrain)));
    (h, store)
}

/// A report `north_m` meters north of Cuttack.
pub fn report_at(id: u64, user: u64, north_m: f64, depth: f64, at: DateTime<Utc>) -> Report {
    Report::new(
        ReportId(id),
        UserId(user),
        Coordinate::new(CUTTACK.lat + meters_to_lat_degrees(north_m), CUTTACK.lon),
        depth,
        at,
    )
}
