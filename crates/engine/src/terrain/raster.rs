//! Georeferenced single-band raster.
//!
//! Cells are stored row-major with row 0 at the northern edge. A cell holding
//! a non-finite value is nodata.

use serde::{Deserialize, Serialize};

use crate::geo::{Coordinate, METERS_PER_DEGREE_LAT};

/// Maps grid cells to geographic coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoTransform {
    /// Latitude of the northern edge of row 0.
    pub north: f64,
    /// Longitude of the western edge of column 0.
    pub west: f64,
    /// Cell edge length in degrees (square cells).
    pub cell_deg: f64,
}

impl GeoTransform {
    /// Approximate cell dimensions in meters at `lat`: (east-west, north-south).
    pub fn cell_size_m(&self, lat: f64) -> (f64, f64) {
        let dy = self.cell_deg * METERS_PER_DEGREE_LAT;
        let dx = dy * lat.to_radians().cos().abs();
        (dx, dy)
    }
}

/// Mean/std/min/max over the valid cells of a window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowStats {
    pub mean: f64,
    pub std: f64,
    pub min: f64,
    pub max: f64,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Raster {
    pub width: usize,
    pub height: usize,
    pub transform: GeoTransform,
    pub data: Vec<f32>,
}

impl Raster {
    pub const NODATA: f32 = f32::NAN;

    pub fn filled(width: usize, height: usize, transform: GeoTransform, value: f32) -> Self {
        Self {
            width,
            height,
            transform,
            data: vec![value; width * height],
        }
    }

    /// Wrap existing row-major data. Returns `None` if the length does not match.
    pub fn from_vec(
        width: usize,
        height: usize,
        transform: GeoTransform,
        data: Vec<f32>,
    ) -> Option<Self> {
        if data.len() != width * height {
            return None;
        }
        Some(Self {
            width,
            height,
            transform,
            data,
        })
    }

    #[inline]
    pub fn index(&self, col: usize, row: usize) -> usize {
        row * self.width + col
    }

    #[inline]
    pub fn in_bounds(&self, col: i64, row: i64) -> bool {
        col >= 0 && row >= 0 && (col as usize) < self.width && (row as usize) < self.height
    }

    /// Value at a cell, `None` when out of bounds or nodata.
    pub fn get(&self, col: usize, row: usize) -> Option<f32> {
        if col >= self.width || row >= self.height {
            return None;
        }
        let v = self.data[self.index(col, row)];
        v.is_finite().then_some(v)
    }

    pub fn set(&mut self, col: usize, row: usize, value: f32) {
        let idx = self.index(col, row);
        self.data[idx] = value;
    }

    /// Whether two rasters describe the same grid.
    pub fn same_grid(&self, other: &Raster) -> bool {
        self.width == other.width && self.height == other.height && self.transform == other.transform
    }

    /// Continuous (fractional) column/row of a coordinate.
    fn fractional_cell(&self, coord: &Coordinate) -> (f64, f64) {
        let t = &self.transform;
        ((coord.lon - t.west) / t.cell_deg, (t.north - coord.lat) / t.cell_deg)
    }

    /// Cell containing `coord`, or `None` outside the extent.
    pub fn cell_of(&self, coord: &Coordinate) -> Option<(usize, usize)> {
        if !coord.is_finite() {
            return None;
        }
        let (fx, fy) = self.fractional_cell(coord);
        let col = fx.floor() as i64;
        let row = fy.floor() as i64;
        self.in_bounds(col, row)
            .then_some((col as usize, row as usize))
    }

    /// Geographic center of a cell.
    pub fn cell_center(&self, col: usize, row: usize) -> Coordinate {
        let t = &self.transform;
        Coordinate::new(
            t.north - (row as f64 + 0.5) * t.cell_deg,
            t.west + (col as f64 + 0.5) * t.cell_deg,
        )
    }

    pub fn sample_nearest(&self, coord: &Coordinate) -> Option<f64> {
        let (col, row) = self.cell_of(coord)?;
        self.get(col, row).map(f64::from)
    }

    /// Bilinear interpolation between the four surrounding cell centers.
    ///
    /// Falls back to the nearest cell when any of the four corners is nodata;
    /// points near the outer edge interpolate against the clamped edge cells.
    pub fn sample_bilinear(&self, coord: &Coordinate) -> Option<f64> {
        let (col, row) = self.cell_of(coord)?;
        let nearest = self.get(col, row).map(f64::from)?;

        let (fx, fy) = self.fractional_cell(coord);
        let gx = (fx - 0.5).clamp(0.0, (self.width - 1) as f64);
        let gy = (fy - 0.5).clamp(0.0, (self.height - 1) as f64);
        let x0 = gx.floor() as usize;
        let y0 = gy.floor() as usize;
        let x1 = (x0 + 1).min(self.width - 1);
        let y1 = (y0 + 1).min(self.height - 1);
        let tx = gx - x0 as f64;
        let ty = gy - y0 as f64;

        let corners = (
            self.get(x0, y0),
            self.get(x1, y0),
            self.get(x0, y1),
            self.get(x1, y1),
        );
        match corners {
            (Some(a), Some(b), Some(c), Some(d)) => {
                let top = f64::from(a) * (1.0 - tx) + f64::from(b) * tx;
                let bottom = f64::from(c) * (1.0 - tx) + f64::from(d) * tx;
                Some(top * (1.0 - ty) + bottom * ty)
            }
            _ => Some(nearest),
        }
    }

    /// Population statistics of valid cells in a `(2*half+1)^2` window.
    pub fn window_stats(&self, col: usize, row: usize, half: usize) -> Option<WindowStats> {
        let c0 = col.saturating_sub(half);
        let r0 = row.saturating_sub(half);
        let c1 = (col + half).min(self.width - 1);
        let r1 = (row + half).min(self.height - 1);

        let mut count = 0usize;
        let mut sum = 0.0f64;
        let mut sum_sq = 0.0f64;
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        for r in r0..=r1 {
            for c in c0..=c1 {
                if let Some(v) = self.get(c, r) {
                    let v = f64::from(v);
                    count += 1;
                    sum += v;
                    sum_sq += v * v;
                    min = min.min(v);
                    max = max.max(v);
                }
            }
        }
        if count == 0 {
            return None;
        }
        let mean = sum / count as f64;
        let var = (sum_sq / count as f64 - mean * mean).max(0.0);
        Some(WindowStats {
            mean,
            std: var.sqrt(),
            min,
            max,
            count,
        })
    }
}
