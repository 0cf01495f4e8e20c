//! Scoring throughput benchmarks.
//!
//! Measures the pure scoring path (`score_report`) against neighbour sets of
//! growing size, DBSCAN on its own, and the terrain lookup on a synthetic DEM.
//!
//! Run with: `cargo bench -p engine --bench scoring_bench`

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use chrono::{TimeZone, Utc};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use engine::geo::{meters_to_lat_degrees, meters_to_lon_degrees};
use engine::statistical::dbscan;
use engine::terrain::synthetic::{generate_terrain, SyntheticDemParams};
use engine::{
    score_report, Coordinate, EngineConfig, Neighbor, Report, ReportId, ReportStatus,
    TerrainLookup, TerrainSample, TrustSnapshot, UserId,
};

const CENTER: Coordinate = Coordinate {
    lat: 20.4625,
    lon: 85.8830,
};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// `n` points scattered uniformly within `radius_m` of the center.
fn scatter(n: usize, radius_m: f64, seed: u64) -> Vec<Coordinate> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    (0..n)
        .map(|_| {
            let r = radius_m * rng.gen::<f64>().sqrt();
            let theta = rng.gen_range(0.0..std::f64::consts::TAU);
            Coordinate::new(
                CENTER.lat + meters_to_lat_degrees(r * theta.sin()),
                CENTER.lon + meters_to_lon_degrees(r * theta.cos(), CENTER.lat),
            )
        })
        .collect()
}

fn neighbors(n: usize) -> Vec<Neighbor> {
    let at = Utc.with_ymd_and_hms(2019, 5, 3, 10, 0, 0).unwrap();
    scatter(n, 5_000.0, 7)
        .into_iter()
        .enumerate()
        .map(|(i, location)| Neighbor {
            id: ReportId(i as u64 + 10),
            user: UserId(i as u64 % 50),
            location,
            depth_m: 0.5 + (i % 7) as f64 * 0.3,
            status: ReportStatus::Pending,
            timestamp: at,
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Benchmarks
// ---------------------------------------------------------------------------

fn bench_score_report(c: &mut Criterion) {
    let config = EngineConfig::default();
    let report = Report::new(
        ReportId(1),
        UserId(1),
        CENTER,
        1.2,
        Utc.with_ymd_and_hms(2019, 5, 3, 12, 0, 0).unwrap(),
    );
    let terrain = TerrainSample {
        elevation: 7.0,
        hand: 0.8,
        slope_deg: 1.5,
        neighborhood_mean: 9.0,
        neighborhood_std: 1.2,
    };
    let trust = TrustSnapshot::new_submitter(UserId(1), &config.reputation);

    let mut group = c.benchmark_group("score_report");
    for n in [0usize, 10, 100, 1_000] {
        let set = neighbors(n);
        group.bench_with_input(BenchmarkId::from_parameter(n), &set, |b, set| {
            b.iter(|| {
                score_report(
                    black_box(&report),
                    Some(&terrain),
                    black_box(set),
                    Some(120.0),
                    &trust,
                    &config,
                )
            })
        });
    }
    group.finish();
}

fn bench_dbscan(c: &mut Criterion) {
    let mut group = c.benchmark_group("dbscan");
    for n in [50usize, 500, 2_000] {
        let points = scatter(n, 5_000.0, 11);
        group.bench_with_input(BenchmarkId::from_parameter(n), &points, |b, points| {
            b.iter(|| dbscan(black_box(points), 1_000.0, 3))
        });
    }
    group.finish();
}

fn bench_terrain_sample(c: &mut Criterion) {
    let terrain = generate_terrain(&SyntheticDemParams::default());
    let points = scatter(256, 5_000.0, 3);
    c.bench_function("terrain_sample_256", |b| {
        b.iter(|| {
            points
                .iter()
                .filter_map(|p| terrain.sample(*p).ok())
                .count()
        })
    });
}

criterion_group!(benches, bench_score_report, bench_dbscan, bench_terrain_sample);
criterion_main!(benches);
