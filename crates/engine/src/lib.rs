//! Trust scoring for crowdsourced flood reports.
//!
//! Each report is scored by three layers (terrain plausibility, agreement with
//! nearby reports, submitter reputation), combined into a weighted final score
//! and moved through a small lifecycle. Submitter trust is a Beta(α, β) record
//! updated only after a decision, one compare-and-update per decision.

pub mod aggregator;
pub mod config;
pub mod error;
pub mod evaluation;
pub mod geo;
pub mod lifecycle;
pub mod neighbors;
pub mod physical;
pub mod pipeline;
pub mod pool;
pub mod rainfall;
pub mod report;
pub mod reputation;
pub mod statistical;
pub mod terrain;

pub use aggregator::{commit_decision, recompute, score_report, ScoreOutcome};
pub use config::{ConfigError, EngineConfig};
pub use error::{EngineError, InputError, ProviderError, TrustStoreError};
pub use geo::Coordinate;
pub use neighbors::{Neighbor, NeighborQuery, ReportLedger, TimeWindow};
pub use pipeline::{ValidationPipeline, ValidationResult};
pub use rainfall::{RainfallQuery, RainfallTable};
pub use report::{LayerScores, Report, ReportId, ReportStatus, UserId};
pub use reputation::{
    DecisionOrigin, InMemoryTrustStore, TrustSnapshot, TrustState, TrustStore, TrustUpdate,
};
pub use terrain::{RasterTerrain, TerrainError, TerrainLookup, TerrainSample};
