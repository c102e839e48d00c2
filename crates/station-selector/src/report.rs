//! Output writers for downstream consumers.
//!
//! The site-list and coordinate text formats are fixed legacy formats
//! read by other processing stages; keep the site-list leading space
//! and the four-decimal coordinate precision exactly as they are.

use crate::selector::{SelectionResult, StationAssignment};
use crate::{Result, StationScore};
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::info;

/// Write the score table CSV, highest score first
pub fn write_score_table(path: impl AsRef<Path>, scores: &[StationScore]) -> Result<()> {
    let path = path.as_ref();
    let mut sorted: Vec<&StationScore> = scores.iter().collect();
    sorted.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));

    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(["site_name", "topsis_score", "quality_level"])?;
    for s in sorted {
        writer.write_record([
            s.station.as_str(),
            &format!("{:.6}", s.score),
            s.level.as_str(),
        ])?;
    }
    writer.flush()?;
    info!("wrote {} scores to {:?}", scores.len(), path);
    Ok(())
}

/// Write a site list: one name per line with a leading space
pub fn write_site_list(path: impl AsRef<Path>, names: &[String]) -> Result<()> {
    let path = path.as_ref();
    let mut writer = BufWriter::new(File::create(path)?);
    for name in names {
        writeln!(writer, " {name}")?;
    }
    writer.flush()?;
    info!("wrote {} sites to {:?}", names.len(), path);
    Ok(())
}

/// Write selected-station coordinates: `lat lon` per line, degrees
pub fn write_selected_coords(
    path: impl AsRef<Path>,
    selected: &[StationAssignment],
) -> Result<()> {
    let path = path.as_ref();
    let mut writer = BufWriter::new(File::create(path)?);
    for s in selected {
        writeln!(writer, "{:.4} {:.4}", s.latitude, s.longitude)?;
    }
    writer.flush()?;
    info!("wrote {} coordinates to {:?}", selected.len(), path);
    Ok(())
}

/// Write the all-stations cluster table
pub fn write_cluster_table(
    path: impl AsRef<Path>,
    assignments: &[StationAssignment],
) -> Result<()> {
    let path = path.as_ref();
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record([
        "site_name",
        "latitude",
        "longitude",
        "cluster_id",
        "topsis_score",
    ])?;
    for a in assignments {
        writer.write_record([
            a.station.as_str(),
            &format!("{:.4}", a.latitude),
            &format!("{:.4}", a.longitude),
            &a.cluster.to_string(),
            &format!("{:.6}", a.score),
        ])?;
    }
    writer.flush()?;
    info!("wrote {} assignments to {:?}", assignments.len(), path);
    Ok(())
}

#[derive(Debug, Serialize)]
struct SelectionDocument<'a> {
    generated_at: String,
    n_clusters: usize,
    #[serde(flatten)]
    result: &'a SelectionResult,
}

/// Write the full selection result as pretty-printed JSON
pub fn write_selection_json(
    path: impl AsRef<Path>,
    result: &SelectionResult,
    n_clusters: usize,
) -> Result<()> {
    let path = path.as_ref();
    let doc = SelectionDocument {
        generated_at: chrono::Utc::now().to_rfc3339(),
        n_clusters,
        result,
    };
    let writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(writer, &doc)
        .map_err(|e| crate::SelectorError::Input(format!("cannot serialize selection: {e}")))?;
    info!("wrote selection result to {:?}", path);
    Ok(())
}

fn verdict(cv: f64) -> &'static str {
    if cv < 0.05 {
        "excellent"
    } else if cv < 0.1 {
        "good"
    } else if cv < 0.2 {
        "fair"
    } else {
        "poor"
    }
}

/// Render the multi-run stability summary as a human-readable block
pub fn stability_report(result: &SelectionResult, n_clusters: usize) -> String {
    let s = &result.stability;
    let mut out = String::new();

    out.push_str("=== Selection stability ===\n");
    out.push_str(&format!(
        "runs:              {} successful, {} failed\n",
        s.n_successful_runs, s.n_failed_runs
    ));
    out.push_str(&format!("target clusters:   {n_clusters}\n"));
    out.push_str(&format!(
        "selected stations: {} (mean over runs {:.2})\n",
        result.selected.len(),
        s.mean_n_selected
    ));
    out.push_str(&format!(
        "inertia:           min {:.6}  max {:.6}  mean {:.6}  std {:.6}\n",
        s.min_inertia, s.max_inertia, s.mean_inertia, s.std_inertia
    ));
    out.push_str(&format!(
        "variation:         CV {:.4} ({})\n",
        s.coefficient_of_variation,
        verdict(s.coefficient_of_variation)
    ));

    if !result.selected.is_empty() {
        let scores: Vec<f64> = result.selected.iter().map(|a| a.score).collect();
        let mean = scores.iter().sum::<f64>() / scores.len() as f64;
        let min = scores.iter().copied().fold(f64::INFINITY, f64::min);
        let max = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        out.push_str(&format!(
            "selected scores:   min {min:.4}  max {max:.4}  mean {mean:.4}\n"
        ));
    }
    out
}
