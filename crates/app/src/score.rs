//! `floodtrust score`: one-shot scoring of a report against caller-supplied
//! evidence. Nothing is stored and no trust is updated.

use anyhow::Context;
use serde::Deserialize;

use engine::report::check_input;
use engine::{
    score_report, EngineConfig, EngineError, Neighbor, ScoreOutcome, TerrainSample,
    TrustSnapshot, TrustState,
};

use crate::protocol::Submission;

#[derive(Debug, Deserialize)]
pub struct ScoreRequest {
    pub report: Submission,
    /// Missing terrain scores the neutral value and forces review.
    #[serde(default)]
    pub terrain: Option<TerrainSample>,
    #[serde(default)]
    pub neighbors: Vec<Neighbor>,
    #[serde(default)]
    pub rainfall_24h_mm: Option<f64>,
    /// Submitter trust; a new submitter when omitted.
    #[serde(default)]
    pub trust: Option<TrustState>,
}

pub fn score_json(json: &str, config: &EngineConfig) -> anyhow::Result<ScoreOutcome> {
    let request: ScoreRequest =
        serde_json::from_str(json).context("failed parsing score request")?;
    let report = request.report.into_report();
    check_input(&report, config).map_err(EngineError::from)?;

    let mut trust = TrustSnapshot::new_submitter(report.user, &config.reputation);
    if let Some(state) = request.trust {
        trust.state = state;
    }
    Ok(score_report(
        &report,
        request.terrain.as_ref(),
        &request.neighbors,
        request.rainfall_24h_mm,
        &trust,
        config,
    ))
}
