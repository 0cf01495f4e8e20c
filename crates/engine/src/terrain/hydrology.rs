//! DEM preprocessing: depression filling, D8 flow routing, flow accumulation,
//! stream extraction, HAND and slope.
//!
//! The pipeline mirrors the classic GIS chain:
//!   1. Fill depressions (priority-flood with a small gradient so flats drain)
//!   2. D8 pointer: each cell drains to its steepest lower neighbour
//!   3. Flow accumulation: number of cells draining through each cell
//!   4. Streams: cells whose accumulation reaches a threshold
//!   5. HAND: elevation above the stream cell a cell's flow path reaches
//!
//! All functions are pure and operate on whole rasters.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, VecDeque};

use super::raster::Raster;

/// Minimum rise imposed on filled cells so flats keep a drainage gradient.
pub const FILL_EPSILON: f32 = 1e-3;

/// Neighbour offsets (dx, dy) in D8 order, starting east, counter-clockwise.
const D8_OFFSETS: [(i64, i64); 8] = [
    (1, 0),
    (1, -1),
    (0, -1),
    (-1, -1),
    (-1, 0),
    (-1, 1),
    (0, 1),
    (1, 1),
];

// =============================================================================
// Depression filling
// =============================================================================

#[derive(Debug, Clone, Copy)]
struct QueuedCell {
    elevation: f32,
    index: usize,
}

impl PartialEq for QueuedCell {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for QueuedCell {}

impl PartialOrd for QueuedCell {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedCell {
    // Reversed so `BinaryHeap` pops the lowest cell first.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .elevation
            .total_cmp(&self.elevation)
            .then_with(|| other.index.cmp(&self.index))
    }
}

fn neighbors(raster: &Raster, index: usize) -> impl Iterator<Item = (usize, bool)> + '_ {
    let col = (index % raster.width) as i64;
    let row = (index / raster.width) as i64;
    D8_OFFSETS.iter().filter_map(move |&(dx, dy)| {
        let (c, r) = (col + dx, row + dy);
        raster
            .in_bounds(c, r)
            .then(|| (raster.index(c as usize, r as usize), dx != 0 && dy != 0))
    })
}

fn is_boundary(raster: &Raster, index: usize) -> bool {
    let col = index % raster.width;
    let row = index / raster.width;
    if col == 0 || row == 0 || col + 1 == raster.width || row + 1 == raster.height {
        return true;
    }
    neighbors(raster, index).any(|(n, _)| !raster.data[n].is_finite())
}

/// Priority-flood depression filling.
///
/// Every valid cell ends at least `FILL_EPSILON` above the cell it was reached
/// from, so the result has no pits or perfectly flat areas. Boundary cells
/// (raster edge or next to nodata) are outlets and keep their elevation.
pub fn fill_depressions(dem: &Raster) -> Raster {
    let mut filled = dem.clone();
    let mut closed = vec![false; dem.data.len()];
    let mut open = BinaryHeap::new();

    for index in 0..dem.data.len() {
        if dem.data[index].is_finite() && is_boundary(dem, index) {
            closed[index] = true;
            open.push(QueuedCell {
                elevation: dem.data[index],
                index,
            });
        }
    }

    while let Some(cell) = open.pop() {
        for (n, _) in neighbors(dem, cell.index) {
            if closed[n] || !dem.data[n].is_finite() {
                continue;
            }
            closed[n] = true;
            let raised = dem.data[n].max(cell.elevation + FILL_EPSILON);
            filled.data[n] = raised;
            open.push(QueuedCell {
                elevation: raised,
                index: n,
            });
        }
    }
    filled
}

// =============================================================================
// D8 flow routing
// =============================================================================

/// Downstream cell index per cell; `None` for outlets and nodata.
#[derive(Debug, Clone, PartialEq)]
pub struct FlowDirections {
    pub width: usize,
    pub height: usize,
    pub downstream: Vec<Option<usize>>,
}

/// Steepest-descent D8 pointer. Diagonal drops are divided by sqrt(2).
pub fn d8_flow_directions(filled: &Raster) -> FlowDirections {
    let mut downstream = vec![None; filled.data.len()];
    for (index, slot) in downstream.iter_mut().enumerate() {
        let z = filled.data[index];
        if !z.is_finite() {
            continue;
        }
        let mut best: Option<(usize, f32)> = None;
        for (n, diagonal) in neighbors(filled, index) {
            let zn = filled.data[n];
            if !zn.is_finite() {
                continue;
            }
            let distance = if diagonal { std::f32::consts::SQRT_2 } else { 1.0 };
            let drop = (z - zn) / distance;
            if drop > 0.0 && best.map_or(true, |(_, d)| drop > d) {
                best = Some((n, drop));
            }
        }
        *slot = best.map(|(n, _)| n);
    }
    FlowDirections {
        width: filled.width,
        height: filled.height,
        downstream,
    }
}

/// Number of cells (including itself) whose flow passes through each cell.
/// Nodata cells accumulate zero.
pub fn flow_accumulation(dirs: &FlowDirections, valid: &[bool]) -> Vec<u32> {
    let n = dirs.downstream.len();
    let mut inflow = vec![0u32; n];
    for d in dirs.downstream.iter().flatten() {
        inflow[*d] += 1;
    }

    let mut accum: Vec<u32> = valid.iter().map(|&v| u32::from(v)).collect();
    let mut queue: VecDeque<usize> = (0..n).filter(|&i| valid[i] && inflow[i] == 0).collect();
    while let Some(i) = queue.pop_front() {
        if let Some(d) = dirs.downstream[i] {
            accum[d] += accum[i];
            inflow[d] -= 1;
            if inflow[d] == 0 {
                queue.push_back(d);
            }
        }
    }
    accum
}

/// Drainage mask: cells with accumulation at or above `threshold`.
pub fn extract_streams(accum: &[u32], threshold: u32) -> Vec<bool> {
    accum.iter().map(|&a| a >= threshold.max(1)).collect()
}

/// Height above nearest drainage.
///
/// Each cell follows its D8 flow path until it reaches a stream cell; HAND is
/// the elevation difference to that cell. A path that leaves the grid through
/// an outlet without meeting a stream uses the outlet as its drainage. Values
/// are clamped at zero.
pub fn height_above_drainage(filled: &Raster, dirs: &FlowDirections, streams: &[bool]) -> Raster {
    let n = filled.data.len();
    let mut drainage: Vec<Option<usize>> = vec![None; n];
    let mut hand = Raster::filled(filled.width, filled.height, filled.transform, Raster::NODATA);
    let mut path = Vec::new();

    for start in 0..n {
        if !filled.data[start].is_finite() || drainage[start].is_some() {
            continue;
        }
        path.clear();
        let mut current = start;
        let target = loop {
            if let Some(t) = drainage[current] {
                break t;
            }
            path.push(current);
            if streams[current] {
                break current;
            }
            match dirs.downstream[current] {
                Some(next) => current = next,
                None => break current,
            }
        };
        for &cell in &path {
            drainage[cell] = Some(target);
        }
    }

    for (index, target) in drainage.iter().enumerate() {
        if let Some(t) = target {
            hand.data[index] = (filled.data[index] - filled.data[*t]).max(0.0);
        }
    }
    hand
}

// =============================================================================
// Slope
// =============================================================================

/// Slope in degrees from central differences (one-sided at edges and next to
/// nodata). `dx_m` / `dy_m` are the cell dimensions in meters.
pub fn slope_degrees(dem: &Raster, dx_m: f64, dy_m: f64) -> Raster {
    let mut slope = Raster::filled(dem.width, dem.height, dem.transform, Raster::NODATA);
    for row in 0..dem.height {
        for col in 0..dem.width {
            let Some(z) = dem.get(col, row) else {
                continue;
            };
            let z = f64::from(z);
            let gx = gradient_1d(
                col.checked_sub(1).and_then(|c| dem.get(c, row)),
                z,
                dem.get(col + 1, row),
                dx_m,
            );
            let gy = gradient_1d(
                row.checked_sub(1).and_then(|r| dem.get(col, r)),
                z,
                dem.get(col, row + 1),
                dy_m,
            );
            let rise = (gx * gx + gy * gy).sqrt();
            slope.set(col, row, rise.atan().to_degrees() as f32);
        }
    }
    slope
}

fn gradient_1d(before: Option<f32>, center: f64, after: Option<f32>, spacing: f64) -> f64 {
    match (before, after) {
        (Some(b), Some(a)) => (f64::from(a) - f64::from(b)) / (2.0 * spacing),
        (None, Some(a)) => (f64::from(a) - center) / spacing,
        (Some(b), None) => (center - f64::from(b)) / spacing,
        (None, None) => 0.0,
    }
}

/// Valid-cell mask of a raster.
pub fn valid_mask(raster: &Raster) -> Vec<bool> {
    raster.data.iter().map(|v| v.is_finite()).collect()
}

/// Rasters produced by [`derive_hand_and_slope`].
#[derive(Debug, Clone)]
pub struct DerivedTerrain {
    pub filled: Raster,
    pub hand: Raster,
    pub slope: Raster,
    pub streams: Vec<bool>,
}

/// Full DEM → (HAND, slope) chain.
pub fn derive_hand_and_slope(dem: &Raster, stream_threshold: u32) -> DerivedTerrain {
    let filled = fill_depressions(dem);
    let dirs = d8_flow_directions(&filled);
    let valid = valid_mask(dem);
    let accum = flow_accumulation(&dirs, &valid);
    let streams = extract_streams(&accum, stream_threshold);
    let hand = height_above_drainage(&filled, &dirs, &streams);

    let mid_lat = dem.transform.north - dem.height as f64 * dem.transform.cell_deg / 2.0;
    let (dx, dy) = dem.transform.cell_size_m(mid_lat);
    let slope = slope_degrees(dem, dx, dy);

    DerivedTerrain {
        filled,
        hand,
        slope,
        streams,
    }
}
