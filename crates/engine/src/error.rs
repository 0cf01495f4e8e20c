// ---------------------------------------------------------------------------
// Error taxonomy for the scoring engine
// ---------------------------------------------------------------------------
//
//   InputError       malformed report, rejected before scoring (stays pending)
//   ProviderError    transient infrastructure failure (retried, then escalated)
//   TrustStoreError  compare-and-update conflict or backend failure
//   EngineError      everything a pipeline caller can observe
//
// Data-unavailable conditions (terrain not covered, no rainfall, no neighbours)
// are not errors: the layers substitute neutral defaults.

use std::fmt;

use crate::config::ConfigError;
use crate::report::{ReportId, ReportStatus, UserId};

/// A report failed input validation and was not scored.
#[derive(Debug, Clone, PartialEq)]
pub enum InputError {
    /// Latitude or longitude is NaN or infinite.
    NonFiniteCoordinate,
    /// Coordinate lies outside the configured study area.
    OutOfBounds { lat: f64, lon: f64 },
    /// Reported depth is NaN or infinite.
    NonFiniteDepth,
    /// Reported depth is below zero.
    NegativeDepth(f64),
    /// Reported depth exceeds the configured maximum.
    DepthTooLarge { depth: f64, max: f64 },
}

impl fmt::Display for InputError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InputError::NonFiniteCoordinate => write!(f, "coordinate is not finite"),
            InputError::OutOfBounds { lat, lon } => {
                write!(f, "coordinate ({lat}, {lon}) is outside the study area")
            }
            InputError::NonFiniteDepth => write!(f, "reported depth is not finite"),
            InputError::NegativeDepth(d) => write!(f, "reported depth {d} m is negative"),
            InputError::DepthTooLarge { depth, max } => {
                write!(f, "reported depth {depth} m exceeds maximum of {max} m")
            }
        }
    }
}

impl std::error::Error for InputError {}

/// Failure talking to an external collaborator (terrain, neighbours, rainfall).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    /// The call did not return within the configured timeout.
    Timeout { provider: &'static str, after_ms: u64 },
    /// The provider reported a connection or backend failure.
    Unavailable(String),
    /// No pool permit became free within the timeout.
    PoolExhausted { provider: &'static str },
    /// The provider returned data that could not be used (e.g. NaN depths).
    Malformed(String),
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderError::Timeout { provider, after_ms } => {
                write!(f, "{provider} query timed out after {after_ms} ms")
            }
            ProviderError::Unavailable(msg) => write!(f, "provider unavailable: {msg}"),
            ProviderError::PoolExhausted { provider } => {
                write!(f, "no {provider} connection available")
            }
            ProviderError::Malformed(msg) => write!(f, "malformed provider data: {msg}"),
        }
    }
}

impl std::error::Error for ProviderError {}

/// Trust store failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrustStoreError {
    /// The record changed between read and write.
    Conflict { expected: u64, found: u64 },
    /// The backing store could not be reached.
    Backend(String),
}

impl fmt::Display for TrustStoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrustStoreError::Conflict { expected, found } => write!(
                f,
                "trust record version conflict (expected v{expected}, found v{found})"
            ),
            TrustStoreError::Backend(msg) => write!(f, "trust store error: {msg}"),
        }
    }
}

impl std::error::Error for TrustStoreError {}

/// Any error surfaced by the engine to its callers.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineError {
    Config(ConfigError),
    Input(InputError),
    Provider(ProviderError),
    TrustStore(TrustStoreError),
    /// Compare-and-update kept conflicting; the update was NOT applied.
    TrustContention { user: UserId, attempts: u32 },
    /// A lifecycle transition outside the allowed set was requested.
    InvalidTransition { from: ReportStatus, to: ReportStatus },
    /// No report with this id exists in the ledger.
    UnknownReport(ReportId),
    /// A report with this id was already submitted.
    DuplicateReport(ReportId),
    /// Only validated, flagged and rejected can be committed to trust.
    NotADecision(ReportStatus),
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::Config(e) => write!(f, "invalid configuration: {e}"),
            EngineError::Input(e) => write!(f, "invalid report: {e}"),
            EngineError::Provider(e) => write!(f, "{e}"),
            EngineError::TrustStore(e) => write!(f, "{e}"),
            EngineError::TrustContention { user, attempts } => write!(
                f,
                "trust update for user {} still conflicting after {attempts} attempts",
                user.0
            ),
            EngineError::InvalidTransition { from, to } => {
                write!(f, "invalid status transition {from} -> {to}")
            }
            EngineError::UnknownReport(id) => write!(f, "unknown report {}", id.0),
            EngineError::DuplicateReport(id) => write!(f, "report {} already submitted", id.0),
            EngineError::NotADecision(status) => {
                write!(f, "status {status} is not a decision")
            }
        }
    }
}

impl std::error::Error for EngineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            EngineError::Config(e) => Some(e),
            EngineError::Input(e) => Some(e),
            EngineError::Provider(e) => Some(e),
            EngineError::TrustStore(e) => Some(e),
            _ => None,
        }
    }
}

impl EngineError {
    /// Whether the failure is worth another validation attempt.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            EngineError::Provider(_) | EngineError::TrustStore(TrustStoreError::Backend(_))
        )
    }
}

impl From<ConfigError> for EngineError {
    fn from(e: ConfigError) -> Self {
        EngineError::Config(e)
    }
}

impl From<InputError> for EngineError {
    fn from(e: InputError) -> Self {
        EngineError::Input(e)
    }
}

impl From<ProviderError> for EngineError {
    fn from(e: ProviderError) -> Self {
        EngineError::Provider(e)
    }
}

impl From<TrustStoreError> for EngineError {
    fn from(e: TrustStoreError) -> Self {
        EngineError::TrustStore(e)
    }
}
