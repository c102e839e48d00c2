//! GNSS Station Selection CLI
//!
//! Two stages, each a subcommand:
//!   evaluate — score stations from daily quality-metric tables
//!   select   — pick a spatially distributed subset of scored stations
//!
//! Usage:
//!   station-select evaluate --metrics metrics_2025001.csv --output scores.csv
//!   station-select select --scores scores.csv --coords coords.csv \
//!                         --clusters 40 --out-dir selection/

use anyhow::Result;
use clap::{Parser, Subcommand};
use station_selector::{
    loader, report, scorer, selector, ScorerConfig, SelectorConfig, DEFAULT_ALPHA,
    DEFAULT_MIN_SCORE, EPS,
};
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(
    name = "station-select",
    about = "Evaluate GNSS station quality and select a distributed network"
)]
struct Args {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Score stations from one or more daily metric tables
    Evaluate {
        /// Metric-table CSV files, one per day
        #[arg(short, long, required = true, num_args = 1..)]
        metrics: Vec<PathBuf>,

        /// Output score-table CSV
        #[arg(short, long, default_value = "station_scores.csv")]
        output: PathBuf,

        /// Blend factor between expert and data-driven weights
        #[arg(long, default_value_t = DEFAULT_ALPHA)]
        alpha: f64,

        /// Relative satellite-system importance in G R E C order
        #[arg(long, num_args = 4, value_names = ["G", "R", "E", "C"])]
        system_weights: Option<Vec<f64>>,
    },

    /// Select spatially distributed stations from a score table
    Select {
        /// Score-table CSV from the evaluate stage
        #[arg(short, long)]
        scores: PathBuf,

        /// Station coordinate CSV (ECEF meters)
        #[arg(short, long)]
        coords: PathBuf,

        /// Target number of clusters
        #[arg(short = 'k', long)]
        clusters: usize,

        /// Number of independent clustering runs
        #[arg(long, default_value_t = 30)]
        runs: usize,

        /// Iteration cap per run
        #[arg(long, default_value_t = 300)]
        max_iter: usize,

        /// Base random seed (run i uses seed + i)
        #[arg(long, default_value_t = 42)]
        seed: u64,

        /// Minimum score for a station to be a candidate
        #[arg(long, default_value_t = DEFAULT_MIN_SCORE)]
        min_score: f64,

        /// Output directory
        #[arg(short, long, default_value = "selection")]
        out_dir: PathBuf,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match args.command {
        Command::Evaluate {
            metrics,
            output,
            alpha,
            system_weights,
        } => evaluate(&metrics, &output, alpha, system_weights),
        Command::Select {
            scores,
            coords,
            clusters,
            runs,
            max_iter,
            seed,
            min_score,
            out_dir,
        } => select(
            &scores, &coords, clusters, runs, max_iter, seed, min_score, &out_dir,
        ),
    }
}

fn evaluate(
    metrics: &[PathBuf],
    output: &PathBuf,
    alpha: f64,
    system_weights: Option<Vec<f64>>,
) -> Result<()> {
    info!("{}", "=".repeat(60));
    info!("GNSS Station Quality Evaluation");
    info!("{}", "=".repeat(60));

    let table = loader::load_metric_table(metrics)?;

    let mut config = ScorerConfig {
        alpha,
        ..ScorerConfig::default()
    };
    if let Some(w) = system_weights {
        // clap guarantees exactly four values
        config.system_weights.copy_from_slice(&w);
    }
    let scores = scorer::evaluate(&table, &config)?;

    info!("Scored {} stations", scores.len());
    info!("Top 10 stations by score:");
    for s in scores.iter().take(10) {
        info!("  {:.4} | {} | {}", s.score, s.station, s.level);
    }

    report::write_score_table(output, &scores)?;
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn select(
    scores: &PathBuf,
    coords: &PathBuf,
    clusters: usize,
    runs: usize,
    max_iter: usize,
    seed: u64,
    min_score: f64,
    out_dir: &PathBuf,
) -> Result<()> {
    info!("{}", "=".repeat(60));
    info!("GNSS Station Network Selection");
    info!("{}", "=".repeat(60));

    let scores = loader::load_score_table(scores)?;
    let coords = loader::load_coordinates(coords)?;

    // Scores at numerical zero mean the station produced no usable
    // data at all; drop those before the quality threshold applies.
    let usable: Vec<_> = scores.iter().filter(|s| s.score > EPS).cloned().collect();
    let eligible: Vec<_> = usable
        .iter()
        .filter(|s| s.score >= min_score)
        .cloned()
        .collect();
    info!(
        "{} scored, {} usable, {} above score threshold {:.2}",
        scores.len(),
        usable.len(),
        eligible.len(),
        min_score
    );

    let candidates = loader::join_candidates(&eligible, &coords);

    let config = SelectorConfig {
        n_clusters: clusters,
        n_runs: runs,
        max_iter,
        base_seed: seed,
    };
    let result = selector::select_stations(&candidates, &config)?;

    std::fs::create_dir_all(out_dir)?;
    let names: Vec<String> = result.selected.iter().map(|a| a.station.clone()).collect();
    report::write_site_list(out_dir.join("selected_stations.txt"), &names)?;
    report::write_selected_coords(
        out_dir.join("selected_stations_coord.txt"),
        &result.selected,
    )?;
    report::write_cluster_table(
        out_dir.join("all_stations_with_clusters.csv"),
        &result.assignments,
    )?;
    report::write_selection_json(out_dir.join("selection.json"), &result, clusters)?;

    info!("\n{}", report::stability_report(&result, clusters));
    Ok(())
}
