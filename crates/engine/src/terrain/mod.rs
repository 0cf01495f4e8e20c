//! Terrain feature lookup.
//!
//! The physical layer needs four numbers at the reported point: elevation,
//! height above nearest drainage (HAND), slope, and the elevation statistics of
//! the surrounding neighbourhood. They come from an external raster provider
//! through the [`TerrainLookup`] trait.
//!
//! [`RasterTerrain`] is the in-process provider: three co-registered
//! [`Raster`] grids (DEM, HAND, slope). [`hydrology`] derives HAND and slope
//! from a bare DEM (depression filling, D8 flow routing, flow accumulation,
//! stream extraction), and [`synthetic`] builds a noise DEM for experiments.

pub mod hydrology;
pub mod provider;
pub mod raster;
pub mod synthetic;

#[cfg(test)]
mod tests_hydrology;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::geo::Coordinate;

pub use provider::RasterTerrain;
pub use raster::{GeoTransform, Raster, WindowStats};

/// Point lookup result. Read-only; the engine never mutates terrain data.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TerrainSample {
    /// Elevation in meters.
    pub elevation: f64,
    /// Height above nearest drainage in meters.
    pub hand: f64,
    /// Slope in degrees.
    pub slope_deg: f64,
    /// Mean elevation of the surrounding window in meters.
    pub neighborhood_mean: f64,
    /// Standard deviation of the surrounding window in meters.
    pub neighborhood_std: f64,
}

impl TerrainSample {
    /// Positive when the point sits above its surroundings.
    pub fn elevation_diff(&self) -> f64 {
        self.elevation - self.neighborhood_mean
    }

    /// False when any field is NaN or infinite (a nodata gap some providers
    /// encode in-band).
    pub fn is_finite(&self) -> bool {
        self.elevation.is_finite()
            && self.hand.is_finite()
            && self.slope_deg.is_finite()
            && self.neighborhood_mean.is_finite()
            && self.neighborhood_std.is_finite()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerrainError {
    /// The point is outside the raster extent or falls on a nodata gap.
    NotCovered,
    /// The provider failed (I/O, connection). Worth retrying.
    Unavailable(String),
    /// Rasters handed to a provider do not share the same grid.
    GridMismatch,
}

impl fmt::Display for TerrainError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TerrainError::NotCovered => write!(f, "point is not covered by terrain data"),
            TerrainError::Unavailable(msg) => write!(f, "terrain provider unavailable: {msg}"),
            TerrainError::GridMismatch => write!(f, "terrain rasters do not share a grid"),
        }
    }
}

impl std::error::Error for TerrainError {}

/// External raster collaborator.
pub trait TerrainLookup: Send + Sync {
    fn sample(&self, coord: Coordinate) -> Result<TerrainSample, TerrainError>;
}
