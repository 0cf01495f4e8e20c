//! In-process terrain provider backed by co-registered rasters.

use crate::geo::Coordinate;

use super::hydrology::derive_hand_and_slope;
use super::raster::Raster;
use super::{TerrainError, TerrainLookup, TerrainSample};

/// Window half-size for neighbourhood statistics: 3 → 7×7 cells (~100 m at 30 m cells).
pub const DEFAULT_WINDOW_HALF: usize = 3;

/// Accumulation (cells) at which a cell counts as drainage.
pub const DEFAULT_STREAM_THRESHOLD: u32 = 100;

#[derive(Debug, Clone)]
pub struct RasterTerrain {
    dem: Raster,
    hand: Raster,
    slope: Raster,
    window_half: usize,
}

impl RasterTerrain {
    /// Wrap precomputed rasters. All three must share the same grid.
    pub fn new(dem: Raster, hand: Raster, slope: Raster) -> Result<Self, TerrainError> {
        if !dem.same_grid(&hand) || !dem.same_grid(&slope) {
            return Err(TerrainError::GridMismatch);
        }
        Ok(Self {
            dem,
            hand,
            slope,
            window_half: DEFAULT_WINDOW_HALF,
        })
    }

    /// Derive HAND and slope from a bare DEM.
    pub fn from_dem(dem: Raster, stream_threshold: u32) -> Self {
        let derived = derive_hand_and_slope(&dem, stream_threshold);
        Self {
            dem,
            hand: derived.hand,
            slope: derived.slope,
            window_half: DEFAULT_WINDOW_HALF,
        }
    }

    pub fn with_window_half(mut self, half: usize) -> Self {
        self.window_half = half;
        self
    }

    pub fn dem(&self) -> &Raster {
        &self.dem
    }

    pub fn hand(&self) -> &Raster {
        &self.hand
    }

    pub fn slope(&self) -> &Raster {
        &self.slope
    }
}

impl TerrainLookup for RasterTerrain {
    fn sample(&self, coord: Coordinate) -> Result<TerrainSample, TerrainError> {
        let (col, row) = self.dem.cell_of(&coord).ok_or(TerrainError::NotCovered)?;
        let elevation = self
            .dem
            .sample_bilinear(&coord)
            .ok_or(TerrainError::NotCovered)?;
        let hand = self
            .hand
            .sample_bilinear(&coord)
            .ok_or(TerrainError::NotCovered)?;
        let slope_deg = self
            .slope
            .sample_nearest(&coord)
            .ok_or(TerrainError::NotCovered)?;
        let window = self
            .dem
            .window_stats(col, row, self.window_half)
            .ok_or(TerrainError::NotCovered)?;

        Ok(TerrainSample {
            elevation,
            hand,
            slope_deg,
            neighborhood_mean: window.mean,
            neighborhood_std: window.std,
        })
    }
}
