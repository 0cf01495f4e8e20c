//! `floodtrust`: trust scoring for crowdsourced flood reports.

mod experiment;
mod protocol;
mod score;
mod serve;

use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use engine::evaluation::{Experiment, ExperimentParams};
use engine::terrain::synthetic::generate_terrain;
use engine::EngineConfig;

use crate::experiment::OutputFormat;

#[derive(Debug, Parser)]
#[command(name = "floodtrust", version, about, long_about = None, propagate_version = true)]
struct Cli {
    /// Engine configuration (JSON). Defaults are used when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Serve the newline-delimited JSON protocol on stdin/stdout.
    Serve(ServeArgs),
    /// Score one report from a JSON request without storing anything.
    Score(ScoreArgs),
    /// Compare the engine against baselines on synthetic report streams.
    Experiment(ExperimentArgs),
}

#[derive(Debug, Args)]
struct ServeArgs {
    /// Snapshot file loaded at start (when present) and used by `save`/`load`.
    #[arg(long)]
    snapshot: Option<PathBuf>,

    /// Write snapshots without lz4 compression.
    #[arg(long)]
    no_compress: bool,

    /// Seed of the synthetic terrain served to the physical layer.
    #[arg(long, default_value_t = 42)]
    terrain_seed: u64,
}

#[derive(Debug, Args)]
struct ScoreArgs {
    /// Request file; stdin when omitted.
    #[arg(long)]
    input: Option<PathBuf>,
}

#[derive(Debug, Args)]
struct ExperimentArgs {
    /// Noise levels in percent.
    #[arg(long, value_delimiter = ',', default_values_t = [5.0, 15.0, 30.0])]
    noise: Vec<f64>,

    /// Reports per generated stream.
    #[arg(long, default_value_t = 400)]
    reports: usize,

    #[arg(long, default_value_t = 42)]
    seed: u64,

    #[arg(long, value_enum, default_value_t = OutputFormat::Csv)]
    format: OutputFormat,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(path: Option<&PathBuf>) -> Result<EngineConfig> {
    match path {
        Some(path) => EngineConfig::from_path(path)
            .with_context(|| format!("failed loading config {}", path.display())),
        None => Ok(EngineConfig::default()),
    }
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let config = load_config(cli.config.as_ref())?;

    match cli.command {
        Command::Serve(args) => {
            let terrain_params = ExperimentParams::default().with_seed(args.terrain_seed).terrain;
            info!(seed = args.terrain_seed, "generating synthetic terrain");
            let terrain = Arc::new(generate_terrain(&terrain_params));

            let session =
                serve::Session::new(Arc::new(config), terrain, args.snapshot, !args.no_compress)?;
            session.resume()?;
            let stdin = std::io::stdin();
            let stdout = std::io::stdout();
            serve::run(&session, stdin.lock(), stdout.lock())?;
        }

        Command::Score(args) => {
            let json = match &args.input {
                Some(path) => std::fs::read_to_string(path)
                    .with_context(|| format!("failed reading {}", path.display()))?,
                None => {
                    let mut buf = String::new();
                    std::io::stdin().read_to_string(&mut buf)?;
                    buf
                }
            };
            let outcome = score::score_json(&json, &config)?;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
        }

        Command::Experiment(args) => {
            let params = ExperimentParams {
                reports: args.reports,
                ..ExperimentParams::default()
            }
            .with_seed(args.seed);
            let experiment = Experiment::new(config, params)?;
            let rows = experiment.run_all(&args.noise)?;
            experiment::write_rows(&rows, args.format, std::io::stdout().lock())?;
        }
    }

    Ok(())
}
