//! Engine configuration.
//!
//! All tunables of the three evidence layers, the aggregator, the trust model,
//! the lifecycle and the provider pool live in one [`EngineConfig`]. It is
//! loaded once (JSON or defaults), checked by [`EngineConfig::validate`], and
//! then shared read-only behind an `Arc`, so concurrent validations can never
//! observe a half-applied change.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::geo::StudyBounds;

/// Allowed deviation of a weight group from 1.0.
pub const WEIGHT_SUM_TOLERANCE: f64 = 1e-9;

// ---------------------------------------------------------------------------
// ConfigError
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// A weight group does not sum to 1.0.
    WeightsDoNotSumToOne { group: &'static str, sum: f64 },
    /// A single parameter lies outside its valid range.
    OutOfRange { field: &'static str, value: f64 },
    /// Breakpoints that must be strictly increasing are not.
    NonMonotonic { field: &'static str },
    /// The JSON document could not be parsed.
    Parse(String),
    /// The config file could not be read.
    Io(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::WeightsDoNotSumToOne { group, sum } => {
                write!(f, "{group} weights sum to {sum}, expected 1.0")
            }
            ConfigError::OutOfRange { field, value } => {
                write!(f, "{field} = {value} is out of range")
            }
            ConfigError::NonMonotonic { field } => {
                write!(f, "{field} breakpoints must be strictly increasing")
            }
            ConfigError::Parse(msg) => write!(f, "could not parse config: {msg}"),
            ConfigError::Io(msg) => write!(f, "could not read config: {msg}"),
        }
    }
}

impl std::error::Error for ConfigError {}

// ---------------------------------------------------------------------------
// Layer weights
// ---------------------------------------------------------------------------

/// Aggregation weights for the final score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LayerWeights {
    pub physical: f64,
    pub statistical: f64,
    pub reputation: f64,
}

impl Default for LayerWeights {
    fn default() -> Self {
        Self {
            physical: 0.4,
            statistical: 0.4,
            reputation: 0.2,
        }
    }
}

impl LayerWeights {
    pub fn sum(&self) -> f64 {
        self.physical + self.statistical + self.reputation
    }
}

// ---------------------------------------------------------------------------
// Physical layer (L1)
// ---------------------------------------------------------------------------

/// Terrain breakpoints for the physical plausibility layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PhysicalParams {
    /// HAND below this (m) scores `hand_full_score`.
    pub hand_full_m: f64,
    /// HAND above this (m) is suspicious.
    pub hand_suspicious_m: f64,
    /// HAND above this (m) is very unlikely to flood.
    pub hand_max_m: f64,
    pub hand_full_score: f64,
    pub hand_suspicious_score: f64,
    pub hand_max_score: f64,

    /// Slopes above this (degrees) rarely retain standing water.
    pub steep_slope_deg: f64,
    /// Slopes above this (degrees) cannot retain standing water.
    pub max_slope_deg: f64,
    /// Linear score loss per degree below `steep_slope_deg`.
    pub slope_decay_per_deg: f64,
    pub steep_slope_score: f64,

    /// Elevation above the neighbourhood mean (m) that marks a local peak.
    pub peak_diff_m: f64,
    /// Elevation below the neighbourhood mean (m, negative) that marks a depression.
    pub depression_diff_m: f64,
    pub peak_score: f64,
    pub depression_score: f64,
    pub neutral_elevation_score: f64,

    pub hand_weight: f64,
    pub elevation_weight: f64,
    pub slope_weight: f64,

    /// L1 substituted when no terrain sample is available.
    pub missing_terrain_score: f64,
}

impl Default for PhysicalParams {
    fn default() -> Self {
        Self {
            hand_full_m: 1.0,
            hand_suspicious_m: 5.0,
            hand_max_m: 10.0,
            hand_full_score: 1.0,
            hand_suspicious_score: 0.4,
            hand_max_score: 0.1,
            steep_slope_deg: 15.0,
            max_slope_deg: 30.0,
            slope_decay_per_deg: 0.046,
            steep_slope_score: 0.3,
            peak_diff_m: 5.0,
            depression_diff_m: -2.0,
            peak_score: 0.2,
            depression_score: 1.0,
            neutral_elevation_score: 0.8,
            hand_weight: 0.4,
            elevation_weight: 0.4,
            slope_weight: 0.2,
            missing_terrain_score: 0.5,
        }
    }
}

// ---------------------------------------------------------------------------
// Statistical layer (L2)
// ---------------------------------------------------------------------------

/// Clustering, rainfall and outlier parameters for the statistical layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StatisticalParams {
    /// DBSCAN neighbourhood radius in meters (great-circle).
    pub cluster_eps_m: f64,
    /// DBSCAN minimum points for a core point, counting the point itself.
    pub cluster_min_points: usize,
    /// Corroborating cluster size at which the spatial sub-score saturates.
    pub cluster_saturation: usize,

    /// Radius of the neighbour query in meters.
    pub neighbor_radius_m: f64,
    /// Look-back window of the neighbour query in hours.
    pub time_window_hours: i64,

    /// Rainfall thresholds in mm over 24 h, strictly increasing.
    pub rain_light_mm: f64,
    pub rain_moderate_mm: f64,
    pub rain_heavy_mm: f64,
    pub rain_extreme_mm: f64,

    /// z-score below which a depth is consistent.
    pub z_consistent: f64,
    /// z-score below which a depth is merely unusual.
    pub z_suspicious: f64,
    /// |depth - mean| tolerated when all neighbours report the same depth.
    pub zero_std_tolerance_m: f64,

    pub spatial_weight: f64,
    pub temporal_weight: f64,
    pub outlier_weight: f64,

    /// Sub-score substituted when the evidence is unavailable.
    pub neutral_score: f64,
}

impl Default for StatisticalParams {
    fn default() -> Self {
        Self {
            cluster_eps_m: 1000.0,
            cluster_min_points: 3,
            cluster_saturation: 10,
            neighbor_radius_m: 5000.0,
            time_window_hours: 24,
            rain_light_mm: 0.0,
            rain_moderate_mm: 10.0,
            rain_heavy_mm: 50.0,
            rain_extreme_mm: 100.0,
            z_consistent: 1.0,
            z_suspicious: 2.0,
            zero_std_tolerance_m: 0.5,
            spatial_weight: 0.5,
            temporal_weight: 0.3,
            outlier_weight: 0.2,
            neutral_score: 0.5,
        }
    }
}

// ---------------------------------------------------------------------------
// Decision, reputation, lifecycle, providers
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DecisionParams {
    /// Final score at or above which a report is validated.
    pub validate_threshold: f64,
}

impl Default for DecisionParams {
    fn default() -> Self {
        Self {
            validate_threshold: 0.7,
        }
    }
}

/// Beta-distribution trust model parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReputationParams {
    pub initial_alpha: f64,
    pub initial_beta: f64,
    /// Added to alpha when a report is validated.
    pub validated_increment: f64,
    /// Added to beta when a report is rejected.
    pub rejected_increment: f64,
    /// Multiplier applied to alpha and beta per inactive window; 1.0 disables decay.
    pub decay_factor: f64,
    /// Length of one inactivity window in days.
    pub inactivity_window_days: i64,
    /// Compare-and-update attempts before giving up with a contention error.
    pub update_retries: u32,
}

impl Default for ReputationParams {
    fn default() -> Self {
        Self {
            initial_alpha: 1.0,
            initial_beta: 1.0,
            validated_increment: 1.0,
            rejected_increment: 1.0,
            decay_factor: 0.95,
            inactivity_window_days: 90,
            update_retries: 16,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LifecycleParams {
    /// Failed validation attempts before a report is forced to `flagged`.
    pub max_attempts: u32,
    /// Days after which decided reports are archived.
    pub retention_days: i64,
}

impl Default for LifecycleParams {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retention_days: 30,
        }
    }
}

/// Limits for calls into external collaborators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProviderParams {
    /// Concurrent in-flight provider calls.
    pub pool_size: usize,
    /// Per-call timeout in milliseconds.
    pub timeout_ms: u64,
    /// Retries of a failed call within one validation attempt.
    pub fetch_retries: u32,
    /// First backoff delay; doubles on each retry.
    pub backoff_base_ms: u64,
}

impl Default for ProviderParams {
    fn default() -> Self {
        Self {
            pool_size: 8,
            timeout_ms: 2_000,
            fetch_retries: 2,
            backoff_base_ms: 50,
        }
    }
}

// ---------------------------------------------------------------------------
// EngineConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    pub weights: LayerWeights,
    pub physical: PhysicalParams,
    pub statistical: StatisticalParams,
    pub decision: DecisionParams,
    pub reputation: ReputationParams,
    pub lifecycle: LifecycleParams,
    pub providers: ProviderParams,
    pub study_bounds: StudyBounds,
    /// Deepest plausible reported flood depth in meters.
    pub max_depth_m: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            weights: LayerWeights::default(),
            physical: PhysicalParams::default(),
            statistical: StatisticalParams::default(),
            decision: DecisionParams::default(),
            reputation: ReputationParams::default(),
            lifecycle: LifecycleParams::default(),
            providers: ProviderParams::default(),
            study_bounds: StudyBounds::default(),
            max_depth_m: 20.0,
        }
    }
}

impl EngineConfig {
    /// Parse and validate a JSON document. Missing fields take defaults.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig =
            serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw =
            std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Io(e.to_string()))?;
        Self::from_json_str(&raw)
    }

    /// Check every invariant the engine relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_weight_group("layer", &[
            self.weights.physical,
            self.weights.statistical,
            self.weights.reputation,
        ])?;

        let p = &self.physical;
        check_weight_group("physical", &[p.hand_weight, p.elevation_weight, p.slope_weight])?;
        check_increasing("hand", &[p.hand_full_m, p.hand_suspicious_m, p.hand_max_m])?;
        check_increasing("slope", &[p.steep_slope_deg, p.max_slope_deg])?;
        if p.depression_diff_m >= p.peak_diff_m {
            return Err(ConfigError::NonMonotonic { field: "elevation" });
        }
        for (field, value) in [
            ("physical.hand_full_score", p.hand_full_score),
            ("physical.hand_suspicious_score", p.hand_suspicious_score),
            ("physical.hand_max_score", p.hand_max_score),
            ("physical.steep_slope_score", p.steep_slope_score),
            ("physical.peak_score", p.peak_score),
            ("physical.depression_score", p.depression_score),
            ("physical.neutral_elevation_score", p.neutral_elevation_score),
            ("physical.missing_terrain_score", p.missing_terrain_score),
        ] {
            check_unit(field, value)?;
        }
        check_non_negative("physical.slope_decay_per_deg", p.slope_decay_per_deg)?;

        let s = &self.statistical;
        check_weight_group("statistical", &[
            s.spatial_weight,
            s.temporal_weight,
            s.outlier_weight,
        ])?;
        check_positive("statistical.cluster_eps_m", s.cluster_eps_m)?;
        check_positive("statistical.neighbor_radius_m", s.neighbor_radius_m)?;
        if s.cluster_min_points < 2 {
            return Err(ConfigError::OutOfRange {
                field: "statistical.cluster_min_points",
                value: s.cluster_min_points as f64,
            });
        }
        if s.cluster_saturation == 0 {
            return Err(ConfigError::OutOfRange {
                field: "statistical.cluster_saturation",
                value: 0.0,
            });
        }
        if s.time_window_hours <= 0 {
            return Err(ConfigError::OutOfRange {
                field: "statistical.time_window_hours",
                value: s.time_window_hours as f64,
            });
        }
        check_non_negative("statistical.rain_light_mm", s.rain_light_mm)?;
        check_increasing("rainfall", &[
            s.rain_light_mm,
            s.rain_moderate_mm,
            s.rain_heavy_mm,
            s.rain_extreme_mm,
        ])?;
        check_increasing("z-score", &[0.0, s.z_consistent, s.z_suspicious])?;
        check_non_negative("statistical.zero_std_tolerance_m", s.zero_std_tolerance_m)?;
        check_unit("statistical.neutral_score", s.neutral_score)?;

        check_unit("decision.validate_threshold", self.decision.validate_threshold)?;

        let r = &self.reputation;
        check_positive("reputation.initial_alpha", r.initial_alpha)?;
        check_positive("reputation.initial_beta", r.initial_beta)?;
        check_positive("reputation.validated_increment", r.validated_increment)?;
        check_positive("reputation.rejected_increment", r.rejected_increment)?;
        if !(r.decay_factor > 0.0 && r.decay_factor <= 1.0) {
            return Err(ConfigError::OutOfRange {
                field: "reputation.decay_factor",
                value: r.decay_factor,
            });
        }
        if r.inactivity_window_days <= 0 {
            return Err(ConfigError::OutOfRange {
                field: "reputation.inactivity_window_days",
                value: r.inactivity_window_days as f64,
            });
        }
        if r.update_retries == 0 {
            return Err(ConfigError::OutOfRange {
                field: "reputation.update_retries",
                value: 0.0,
            });
        }

        if self.lifecycle.max_attempts == 0 {
            return Err(ConfigError::OutOfRange {
                field: "lifecycle.max_attempts",
                value: 0.0,
            });
        }
        if self.lifecycle.retention_days <= 0 {
            return Err(ConfigError::OutOfRange {
                field: "lifecycle.retention_days",
                value: self.lifecycle.retention_days as f64,
            });
        }

        if self.providers.pool_size == 0 {
            return Err(ConfigError::OutOfRange {
                field: "providers.pool_size",
                value: 0.0,
            });
        }
        if self.providers.timeout_ms == 0 {
            return Err(ConfigError::OutOfRange {
                field: "providers.timeout_ms",
                value: 0.0,
            });
        }

        if !self.study_bounds.is_well_formed() {
            return Err(ConfigError::OutOfRange {
                field: "study_bounds",
                value: self.study_bounds.min_lat,
            });
        }
        check_positive("max_depth_m", self.max_depth_m)?;
        Ok(())
    }
}

fn check_weight_group(group: &'static str, weights: &[f64]) -> Result<(), ConfigError> {
    let sum: f64 = weights.iter().sum();
    if weights.iter().any(|w| !w.is_finite() || *w < 0.0)
        || (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE
    {
        return Err(ConfigError::WeightsDoNotSumToOne { group, sum });
    }
    Ok(())
}

fn check_increasing(field: &'static str, values: &[f64]) -> Result<(), ConfigError> {
    let ok = values.iter().all(|v| v.is_finite()) && values.windows(2).all(|w| w[0] < w[1]);
    if ok {
        Ok(())
    } else {
        Err(ConfigError::NonMonotonic { field })
    }
}

fn check_unit(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange { field, value })
    }
}

fn check_positive(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange { field, value })
    }
}

fn check_non_negative(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange { field, value })
    }
}
