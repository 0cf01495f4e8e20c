//! Reference validators the three-layer engine is compared against.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::config::PhysicalParams;
use crate::physical::score_physical;
use crate::report::Report;
use crate::terrain::{TerrainLookup, TerrainSample};

/// One verdict per report.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub valid: bool,
    pub score: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum Baseline {
    /// Every report is accepted.
    AcceptAll,
    /// Uniform random score, accepted when it clears `1 - accept_rate`.
    Random { accept_rate: f64, seed: u64 },
    /// Physical layer alone, accepted at `threshold`.
    TerrainOnly { threshold: f64 },
}

impl Baseline {
    /// The three baselines with their usual settings.
    pub fn standard(seed: u64) -> [Baseline; 3] {
        [
            Baseline::AcceptAll,
            Baseline::Random {
                accept_rate: 0.7,
                seed,
            },
            Baseline::TerrainOnly { threshold: 0.7 },
        ]
    }

    pub fn name(&self) -> &'static str {
        match self {
            Baseline::AcceptAll => "accept_all",
            Baseline::Random { .. } => "random",
            Baseline::TerrainOnly { .. } => "terrain_only",
        }
    }

    pub fn predict(
        &self,
        reports: &[Report],
        terrain: &dyn TerrainLookup,
        physical: &PhysicalParams,
    ) -> Vec<Prediction> {
        match *self {
            Baseline::AcceptAll => reports
                .iter()
                .map(|_| Prediction {
                    valid: true,
                    score: 1.0,
                })
                .collect(),
            Baseline::Random { accept_rate, seed } => {
                let mut rng = ChaCha8Rng::seed_from_u64(seed);
                reports
                    .iter()
                    .map(|_| {
                        let score: f64 = rng.gen();
                        Prediction {
                            valid: score >= 1.0 - accept_rate,
                            score,
                        }
                    })
                    .collect()
            }
            Baseline::TerrainOnly { threshold } => reports
                .iter()
                .map(|r| {
                    let sample: Option<TerrainSample> = terrain.sample(r.location).ok();
                    let score = score_physical(sample.as_ref(), physical).score;
                    Prediction {
                        valid: score >= threshold,
                        score,
                    }
                })
                .collect(),
        }
    }
}
