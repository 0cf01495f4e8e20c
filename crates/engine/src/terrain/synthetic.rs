//! Procedural DEM for experiments and tests.
//!
//! fBm noise gives gentle relief on top of a regional gradient falling toward
//! the south-east (the delta drains to the sea), and a meandering river valley
//! is carved through the center so the flood zone sits on low, drained ground.

use fastnoise_lite::{FastNoiseLite, FractalType, NoiseType};
use serde::{Deserialize, Serialize};

use crate::geo::{meters_to_lat_degrees, Coordinate};

use super::provider::RasterTerrain;
use super::raster::{GeoTransform, Raster};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyntheticDemParams {
    pub center: Coordinate,
    /// Half the side of the square extent, in degrees.
    pub half_extent_deg: f64,
    pub cell_deg: f64,
    pub base_elevation_m: f32,
    /// Amplitude of the noise relief.
    pub relief_m: f32,
    /// Total fall of the regional gradient across the extent.
    pub regional_fall_m: f32,
    pub valley_depth_m: f32,
    pub valley_half_width_m: f64,
    pub noise_frequency: f32,
    pub stream_threshold: u32,
    pub seed: i32,
}

impl Default for SyntheticDemParams {
    fn default() -> Self {
        Self {
            // Cuttack, at the head of the Mahanadi delta.
            center: Coordinate::new(20.4625, 85.8830),
            half_extent_deg: 0.06,
            cell_deg: 0.0005,
            base_elevation_m: 20.0,
            relief_m: 14.0,
            regional_fall_m: 8.0,
            valley_depth_m: 12.0,
            valley_half_width_m: 900.0,
            noise_frequency: 0.02,
            stream_threshold: 150,
            seed: 42,
        }
    }
}

/// Generate the DEM raster.
pub fn generate_dem(params: &SyntheticDemParams) -> Raster {
    let cells = ((2.0 * params.half_extent_deg) / params.cell_deg).round().max(1.0) as usize;
    let transform = GeoTransform {
        north: params.center.lat + params.half_extent_deg,
        west: params.center.lon - params.half_extent_deg,
        cell_deg: params.cell_deg,
    };
    let mut dem = Raster::filled(cells, cells, transform, 0.0);

    let mut noise = FastNoiseLite::with_seed(params.seed);
    noise.set_noise_type(Some(NoiseType::OpenSimplex2));
    noise.set_frequency(Some(params.noise_frequency));
    noise.set_fractal_type(Some(FractalType::FBm));
    noise.set_fractal_octaves(Some(4));

    let half_width_deg = meters_to_lat_degrees(params.valley_half_width_m);
    let extent = 2.0 * params.half_extent_deg;

    for row in 0..cells {
        for col in 0..cells {
            let p = dem.cell_center(col, row);
            let raw = noise.get_noise_2d(col as f32, row as f32);
            let relief = (raw + 1.0) * 0.5 * params.relief_m;

            // 0 at the north-west corner, 1 at the south-east corner.
            let along = ((p.lon - transform.west) + (transform.north - p.lat)) / (2.0 * extent);
            let regional = params.regional_fall_m * (1.0 - along as f32);

            // River runs west→east through the center with a gentle meander.
            let phase = (p.lon - params.center.lon) / params.half_extent_deg * std::f64::consts::PI;
            let river_lat = params.center.lat + 0.25 * half_width_deg * phase.sin();
            let d = (p.lat - river_lat) / half_width_deg;
            let carve = params.valley_depth_m * (-d * d).exp() as f32;

            dem.set(col, row, params.base_elevation_m + relief + regional - carve);
        }
    }
    dem
}

/// DEM plus derived HAND and slope, ready to sample.
pub fn generate_terrain(params: &SyntheticDemParams) -> RasterTerrain {
    RasterTerrain::from_dem(generate_dem(params), params.stream_threshold)
}
