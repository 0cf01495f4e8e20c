use super::hydrology::*;
use super::raster::{GeoTransform, Raster};

fn transform() -> GeoTransform {
    GeoTransform {
        north: 20.5,
        west: 85.8,
        cell_deg: 0.0003,
    }
}

fn grid(width: usize, height: usize, f: impl Fn(usize, usize) -> f32) -> Raster {
    let mut r = Raster::filled(width, height, transform(), 0.0);
    for row in 0..height {
        for col in 0..width {
            r.set(col, row, f(col, row));
        }
    }
    r
}

/// V-shaped valley along column 4, draining south (row 8 lowest).
fn valley() -> Raster {
    grid(9, 9, |col, row| {
        (col as f32 - 4.0).abs() * 2.0 + (8 - row) as f32 * 0.5
    })
}

// ====================================================================
// Depression filling
// ====================================================================

#[test]
fn test_fill_raises_single_pit() {
    let mut dem = grid(5, 5, |_, _| 10.0);
    dem.set(2, 2, 2.0);
    let filled = fill_depressions(&dem);
    let center = filled.get(2, 2).unwrap();
    assert!(center >= 10.0, "pit should be raised to its spill level, got {center}");
    assert_eq!(filled.get(0, 0), Some(10.0), "edge cells are outlets and unchanged");
}

#[test]
fn test_fill_leaves_no_interior_sinks() {
    let mut dem = grid(7, 7, |col, row| ((col * 3 + row * 5) % 7) as f32);
    dem.set(3, 3, -5.0);
    let filled = fill_depressions(&dem);
    for row in 1..6 {
        for col in 1..6 {
            let z = filled.get(col, row).unwrap();
            let has_lower = (-1i64..=1).any(|dy| {
                (-1i64..=1).any(|dx| {
                    let (c, r) = (col as i64 + dx, row as i64 + dy);
                    (dx, dy) != (0, 0)
                        && filled.get(c as usize, r as usize).is_some_and(|n| n < z)
                })
            });
            assert!(has_lower, "cell ({col},{row}) at {z} has no lower neighbour");
        }
    }
}

#[test]
fn test_fill_does_not_change_draining_surface() {
    let dem = valley();
    let filled = fill_depressions(&dem);
    assert_eq!(filled.data, dem.data);
}

#[test]
fn test_fill_treats_cells_next_to_nodata_as_outlets() {
    let mut dem = grid(5, 5, |_, _| 10.0);
    dem.set(2, 2, Raster::NODATA);
    dem.set(2, 1, 3.0);
    let filled = fill_depressions(&dem);
    assert_eq!(filled.get(2, 1), Some(3.0));
    assert!(filled.get(2, 2).is_none());
}

// ====================================================================
// Flow routing and accumulation
// ====================================================================

#[test]
fn test_d8_prefers_steepest_cardinal_neighbour() {
    let plane = grid(5, 5, |col, _| col as f32);
    let dirs = d8_flow_directions(&plane);
    let idx = plane.index(2, 2);
    assert_eq!(dirs.downstream[idx], Some(plane.index(1, 2)));
}

#[test]
fn test_d8_minimum_has_no_downstream() {
    let plane = grid(5, 5, |col, _| col as f32);
    let dirs = d8_flow_directions(&plane);
    assert_eq!(dirs.downstream[plane.index(0, 2)], None);
}

#[test]
fn test_accumulation_along_single_row_channel() {
    let channel = grid(5, 1, |col, _| col as f32);
    let dirs = d8_flow_directions(&channel);
    let accum = flow_accumulation(&dirs, &valid_mask(&channel));
    assert_eq!(accum, vec![5, 4, 3, 2, 1]);
}

#[test]
fn test_accumulation_in_valley_collects_whole_rows() {
    let dem = valley();
    let dirs = d8_flow_directions(&dem);
    let accum = flow_accumulation(&dirs, &valid_mask(&dem));
    assert_eq!(accum[dem.index(4, 0)], 9);
    assert_eq!(accum[dem.index(4, 4)], 45);
    assert_eq!(accum[dem.index(4, 8)], 81, "outlet drains the whole grid");
    assert_eq!(accum[dem.index(5, 4)], 4);
}

#[test]
fn test_nodata_accumulates_nothing() {
    let mut dem = valley();
    dem.set(0, 0, Raster::NODATA);
    let dirs = d8_flow_directions(&dem);
    let accum = flow_accumulation(&dirs, &valid_mask(&dem));
    assert_eq!(accum[dem.index(0, 0)], 0);
    assert_eq!(accum[dem.index(4, 8)], 80);
}

#[test]
fn test_extract_streams_threshold() {
    let streams = extract_streams(&[1, 4, 5, 80], 5);
    assert_eq!(streams, vec![false, false, true, true]);
}

// ====================================================================
// HAND
// ====================================================================

#[test]
fn test_hand_is_zero_on_streams_and_positive_on_slopes() {
    let dem = valley();
    let dirs = d8_flow_directions(&dem);
    let accum = flow_accumulation(&dirs, &valid_mask(&dem));
    let streams = extract_streams(&accum, 5);
    let hand = height_above_drainage(&dem, &dirs, &streams);

    assert_eq!(hand.get(4, 4), Some(0.0));
    let side = hand.get(6, 4).unwrap();
    assert!((side - 4.0).abs() < 1e-4, "expected 4 m above valley floor, got {side}");
    let edge = hand.get(8, 4).unwrap();
    assert!((edge - 8.0).abs() < 1e-4, "got {edge}");
}

#[test]
fn test_hand_never_negative() {
    let dem = grid(8, 8, |col, row| ((col * 7 + row * 3) % 5) as f32);
    let derived = derive_hand_and_slope(&dem, 3);
    assert!(derived.hand.data.iter().all(|h| !h.is_finite() || *h >= 0.0));
}

#[test]
fn test_hand_is_nodata_where_dem_is_nodata() {
    let mut dem = valley();
    dem.set(1, 1, Raster::NODATA);
    let derived = derive_hand_and_slope(&dem, 5);
    assert!(derived.hand.get(1, 1).is_none());
    assert!(derived.slope.get(1, 1).is_none());
}

// ====================================================================
// Slope
// ====================================================================

#[test]
fn test_slope_of_flat_surface_is_zero() {
    let flat = grid(4, 4, |_, _| 7.0);
    let slope = slope_degrees(&flat, 30.0, 30.0);
    assert!(slope.data.iter().all(|s| s.abs() < 1e-6));
}

#[test]
fn test_slope_of_unit_ramp_is_45_degrees() {
    let ramp = grid(5, 5, |col, _| col as f32 * 10.0);
    let slope = slope_degrees(&ramp, 10.0, 10.0);
    for (col, row) in [(2, 2), (0, 2), (4, 4)] {
        let s = slope.get(col, row).unwrap();
        assert!((s - 45.0).abs() < 1e-3, "({col},{row}) got {s}");
    }
}

#[test]
fn test_derived_rasters_share_grid() {
    let dem = valley();
    let derived = derive_hand_and_slope(&dem, 5);
    assert!(derived.hand.same_grid(&dem));
    assert!(derived.slope.same_grid(&dem));
    assert!(derived.filled.same_grid(&dem));
    assert_eq!(derived.streams.len(), dem.data.len());
}
