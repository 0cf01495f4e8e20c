//! Rainfall provider.
//!
//! The temporal check only needs the 24 h accumulation at the report's
//! location. [`RainfallTable`] answers from the nearest gauge within a search
//! radius; beyond that radius there is no reading and the layer goes neutral.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::ProviderError;
use crate::geo::Coordinate;

/// Default gauge search radius in meters.
pub const DEFAULT_GAUGE_RADIUS_M: f64 = 25_000.0;

/// External rainfall collaborator.
pub trait RainfallQuery: Send + Sync {
    /// Accumulated rainfall in mm over the last 24 h, `None` when unknown.
    fn rainfall_24h(&self, coord: Coordinate) -> Result<Option<f64>, ProviderError>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GaugeReading {
    pub station: String,
    pub location: Coordinate,
    pub rainfall_24h_mm: f64,
}

pub struct RainfallTable {
    radius_m: f64,
    gauges: RwLock<Vec<GaugeReading>>,
}

impl Default for RainfallTable {
    fn default() -> Self {
        Self::new(DEFAULT_GAUGE_RADIUS_M)
    }
}

impl RainfallTable {
    pub fn new(radius_m: f64) -> Self {
        Self {
            radius_m,
            gauges: RwLock::new(Vec::new()),
        }
    }

    pub fn with_readings(radius_m: f64, readings: Vec<GaugeReading>) -> Self {
        Self {
            radius_m,
            gauges: RwLock::new(readings),
        }
    }

    /// Insert or replace the reading of a station.
    pub fn record(&self, reading: GaugeReading) {
        let mut gauges = self.gauges.write();
        match gauges.iter_mut().find(|g| g.station == reading.station) {
            Some(existing) => *existing = reading,
            None => gauges.push(reading),
        }
    }

    pub fn len(&self) -> usize {
        self.gauges.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl RainfallQuery for RainfallTable {
    fn rainfall_24h(&self, coord: Coordinate) -> Result<Option<f64>, ProviderError> {
        let gauges = self.gauges.read();
        let nearest = gauges
            .iter()
            .map(|g| (coord.distance_m(&g.location), g))
            .filter(|(d, _)| *d <= self.radius_m)
            .min_by(|a, b| a.0.total_cmp(&b.0));
        match nearest {
            None => Ok(None),
            Some((_, g)) if !g.rainfall_24h_mm.is_finite() || g.rainfall_24h_mm < 0.0 => {
                Err(ProviderError::Malformed(format!(
                    "station {} reports {} mm",
                    g.station, g.rainfall_24h_mm
                )))
            }
            Some((_, g)) => Ok(Some(g.rainfall_24h_mm)),
        }
    }
}
