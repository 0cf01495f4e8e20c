//! Synthetic crowd report streams with a controlled noise level.
//!
//! A circular flood zone is laid around the zone center. Clean reports are
//! half true positives (inside the zone, claiming water) and half true
//! negatives (outside, claiming none). Noisy reports are half false positives
//! (outside, claiming water, always from unreliable users) and half false
//! negatives (inside, claiming none).

use chrono::{DateTime, Duration, TimeZone, Utc};
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::geo::{meters_to_lat_degrees, meters_to_lon_degrees, Coordinate};
use crate::report::{Report, ReportId, UserId};

/// Ground-truth category of a generated report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ReportKind {
    /// Inside the flood zone, claims water.
    Tp,
    /// Outside the flood zone, claims none.
    Tn,
    /// Outside the flood zone, claims water.
    Fp,
    /// Inside the flood zone, claims none.
    Fn,
}

impl ReportKind {
    /// Whether the location really was flooded.
    pub fn truly_flooded(self) -> bool {
        matches!(self, ReportKind::Tp | ReportKind::Fn)
    }

    pub fn claims_flood(self) -> bool {
        matches!(self, ReportKind::Tp | ReportKind::Fp)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserCategory {
    Reliable,
    Average,
    Unreliable,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SyntheticUser {
    pub id: UserId,
    pub category: UserCategory,
    /// Probability that the user reports correctly.
    pub accuracy: f64,
}

/// A generated report together with what really happened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabeledReport {
    pub report: Report,
    pub kind: ReportKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratorParams {
    pub seed: u64,
    pub users: usize,
    pub zone_center: Coordinate,
    pub zone_radius_m: f64,
    /// Half side of the square area non-flooded reports are drawn from.
    pub area_half_extent_deg: f64,
    pub event_start: DateTime<Utc>,
    /// Report times are drawn from `event_start + [min, max)` hours.
    pub hours_before: i64,
    pub hours_after: i64,
}

impl Default for GeneratorParams {
    fn default() -> Self {
        Self {
            seed: 42,
            users: 100,
            // Cuttack
            zone_center: Coordinate::new(20.4625, 85.8830),
            zone_radius_m: 4_000.0,
            area_half_extent_deg: 0.1,
            // Landfall of cyclone Fani.
            event_start: Utc.with_ymd_and_hms(2019, 5, 3, 0, 0, 0).single().unwrap_or_default(),
            hours_before: 12,
            hours_after: 48,
        }
    }
}

pub struct SyntheticGenerator {
    params: GeneratorParams,
    users: Vec<SyntheticUser>,
    rng: ChaCha8Rng,
}

impl SyntheticGenerator {
    pub fn new(params: GeneratorParams) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(params.seed);
        let users = generate_users(params.users, &mut rng);
        Self { params, users, rng }
    }

    pub fn params(&self) -> &GeneratorParams {
        &self.params
    }

    pub fn users(&self) -> &[SyntheticUser] {
        &self.users
    }

    /// Whether `coord` lies in the flood zone.
    pub fn in_zone(&self, coord: &Coordinate) -> bool {
        self.params.zone_center.distance_m(coord) <= self.params.zone_radius_m
    }

    /// Generate `total` shuffled reports, `noise_pct` percent of them wrong.
    ///
    /// Report ids run from `first_id` upward in the shuffled order.
    pub fn generate(&mut self, total: usize, noise_pct: f64, first_id: u64) -> Vec<LabeledReport> {
        let noise = ((total as f64) * noise_pct.clamp(0.0, 100.0) / 100.0) as usize;
        let clean = total - noise;
        let tp = clean / 2;
        let tn = clean - tp;
        let fp = noise / 2;
        let fn_ = noise - fp;

        let mut out = Vec::with_capacity(total);
        for (kind, count) in [
            (ReportKind::Tp, tp),
            (ReportKind::Tn, tn),
            (ReportKind::Fp, fp),
            (ReportKind::Fn, fn_),
        ] {
            for _ in 0..count {
                out.push(self.one(kind));
            }
        }
        out.shuffle(&mut self.rng);
        for (i, labeled) in out.iter_mut().enumerate() {
            labeled.report.id = ReportId(first_id + i as u64);
        }
        out
    }

    fn one(&mut self, kind: ReportKind) -> LabeledReport {
        let location = if kind.truly_flooded() {
            self.point_in_zone()
        } else {
            self.point_outside_zone()
        };
        let user = match kind {
            ReportKind::Fp => self.pick_user(Some(UserCategory::Unreliable)),
            _ => self.pick_user(None),
        };
        let depth_m = match kind {
            ReportKind::Tp => self.rng.gen_range(0.3..3.0),
            ReportKind::Fp => self.rng.gen_range(0.5..2.5),
            ReportKind::Tn | ReportKind::Fn => 0.0,
        };
        let hours = self
            .rng
            .gen_range(-self.params.hours_before..self.params.hours_after);
        let timestamp = self.params.event_start + Duration::hours(hours);
        LabeledReport {
            report: Report::new(ReportId(0), user, location, depth_m, timestamp),
            kind,
        }
    }

    fn point_in_zone(&mut self) -> Coordinate {
        let c = self.params.zone_center;
        // Uniform over the disk.
        let r = self.params.zone_radius_m * self.rng.gen::<f64>().sqrt();
        let theta = self.rng.gen_range(0.0..std::f64::consts::TAU);
        Coordinate::new(
            c.lat + meters_to_lat_degrees(r * theta.sin()),
            c.lon + meters_to_lon_degrees(r * theta.cos(), c.lat),
        )
    }

    fn point_outside_zone(&mut self) -> Coordinate {
        let c = self.params.zone_center;
        let h = self.params.area_half_extent_deg;
        loop {
            let p = Coordinate::new(
                c.lat + self.rng.gen_range(-h..h),
                c.lon + self.rng.gen_range(-h..h),
            );
            if !self.in_zone(&p) {
                return p;
            }
        }
    }

    fn pick_user(&mut self, category: Option<UserCategory>) -> UserId {
        let pool: Vec<&SyntheticUser> = self
            .users
            .iter()
            .filter(|u| category.map_or(true, |c| u.category == c))
            .collect();
        match pool.choose(&mut self.rng) {
            Some(u) => u.id,
            None => UserId(1),
        }
    }
}

/// 70% reliable, 20% average, 10% unreliable. Ids start at 1.
fn generate_users(n: usize, rng: &mut ChaCha8Rng) -> Vec<SyntheticUser> {
    let reliable = n * 7 / 10;
    let average = n * 9 / 10;
    (0..n)
        .map(|i| {
            let (category, accuracy) = if i < reliable {
                (UserCategory::Reliable, rng.gen_range(0.8..0.95))
            } else if i < average {
                (UserCategory::Average, rng.gen_range(0.5..0.8))
            } else {
                (UserCategory::Unreliable, rng.gen_range(0.1..0.5))
            };
            SyntheticUser {
                id: UserId(i as u64 + 1),
                category,
                accuracy,
            }
        })
        .collect()
}
