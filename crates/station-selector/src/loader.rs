//! Boundary I/O: metric tables, score tables, coordinates, site lists
//!
//! The metric table arrives as CSV keyed by station with one column per
//! `{system}_{indicator}_{yyyydoy}` triple, produced by an external
//! report-parsing collaborator. Column presence is validated against
//! the fixed indicator schema before anything is scored; a missing
//! indicator column is a schema error, never a zero.

use crate::{
    ColumnKey, Indicator, IndicatorValue, MetricTable, QualityLevel, Result, SatSystem,
    SelectorError, StationPoint, StationScore, COLUMNS_PER_DAY,
};
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tracing::{info, warn};

/// Read a plain site-list file: one site per line, `#` comments skipped
pub fn read_site_list(path: impl AsRef<Path>) -> Result<Vec<String>> {
    let content = fs::read_to_string(path.as_ref())?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(|l| l.to_uppercase())
        .collect())
}

/// Parse one metric-table header cell into its column identity
fn parse_column_key(name: &str) -> Result<ColumnKey> {
    let bad = || SelectorError::Schema(format!("unrecognized metric column {name:?}"));

    let mut parts = name.split('_');
    let sys_part = parts.next().ok_or_else(bad)?;
    let ind_part = parts.next().ok_or_else(bad)?;
    let day_part = parts.next().ok_or_else(bad)?;
    if parts.next().is_some() || sys_part.len() != 1 {
        return Err(bad());
    }

    let system = sys_part
        .chars()
        .next()
        .and_then(SatSystem::from_code)
        .ok_or_else(bad)?;
    let indicator = Indicator::from_name(ind_part).ok_or_else(bad)?;
    if day_part.len() != 7 || !day_part.chars().all(|c| c.is_ascii_digit()) {
        return Err(bad());
    }
    let day: u32 = day_part
        .parse()
        .map_err(|_| bad())?;

    Ok(ColumnKey {
        day,
        system,
        indicator,
    })
}

/// Load one metric-table CSV into canonical column order
fn load_metric_csv(path: &Path) -> Result<MetricTable> {
    info!("loading metric table from {:?}", path);
    let mut reader = csv::Reader::from_path(path)?;

    let headers = reader.headers()?.clone();
    let mut iter = headers.iter();
    match iter.next() {
        Some(first) if first.eq_ignore_ascii_case("site_name") => {}
        other => {
            return Err(SelectorError::Schema(format!(
                "first column must be site_name, got {other:?}"
            )))
        }
    }

    let keys: Vec<ColumnKey> = iter.map(parse_column_key).collect::<Result<_>>()?;

    let mut days: Vec<u32> = keys.iter().map(|k| k.day).collect();
    days.sort_unstable();
    days.dedup();

    // Every (system, indicator) pair must be present exactly once per day
    if keys.len() != days.len() * COLUMNS_PER_DAY {
        return Err(SelectorError::Schema(format!(
            "expected {} indicator columns for {} day(s), found {}",
            days.len() * COLUMNS_PER_DAY,
            days.len(),
            keys.len()
        )));
    }
    let mut seen: Vec<ColumnKey> = Vec::with_capacity(keys.len());
    for key in &keys {
        if seen.contains(key) {
            return Err(SelectorError::Schema(format!("duplicate column {key}")));
        }
        seen.push(*key);
    }

    // CSV position -> canonical (day, system, indicator) position
    let canonical_index = |key: &ColumnKey| -> usize {
        let day_pos = days.iter().position(|&d| d == key.day).unwrap_or_default();
        day_pos * COLUMNS_PER_DAY
            + key.system.index() * Indicator::ALL.len()
            + key.indicator.index()
    };

    let n_cols = days.len() * COLUMNS_PER_DAY;
    let mut rows: Vec<(String, Vec<IndicatorValue>)> = Vec::new();
    for record in reader.records() {
        let record = record?;
        if record.len() != keys.len() + 1 {
            return Err(SelectorError::Schema(format!(
                "row {:?} has {} fields, header has {}",
                record.get(0),
                record.len(),
                keys.len() + 1
            )));
        }

        let station = record
            .get(0)
            .unwrap_or_default()
            .trim()
            .to_uppercase();
        if station.is_empty() {
            return Err(SelectorError::Input("row with empty station name".into()));
        }

        let mut row = vec![IndicatorValue::Unavailable; n_cols];
        for (j, key) in keys.iter().enumerate() {
            let field = record.get(j + 1).unwrap_or_default().trim();
            if field.is_empty() {
                continue;
            }
            let value: f64 = field.parse().map_err(|_| {
                SelectorError::Input(format!(
                    "station {station}, column {key}: cannot parse {field:?}"
                ))
            })?;
            row[canonical_index(key)] = IndicatorValue::from_raw(key.indicator, value);
        }
        rows.push((station, row));
    }

    if rows.is_empty() {
        return Err(SelectorError::Input(format!(
            "metric table {path:?} has no data rows"
        )));
    }

    let table = MetricTable::from_rows(days, rows)?;
    info!(
        "loaded {} stations x {} columns ({} day(s))",
        table.n_stations(),
        table.n_columns(),
        table.days().len()
    );
    Ok(table)
}

/// Load one or more metric-table CSVs and outer-join them on station.
/// Stations missing from some days keep unavailable markers.
pub fn load_metric_table(paths: &[impl AsRef<Path>]) -> Result<MetricTable> {
    if paths.is_empty() {
        return Err(SelectorError::Input("no metric table paths given".into()));
    }
    let tables: Vec<MetricTable> = paths
        .iter()
        .map(|p| load_metric_csv(p.as_ref()))
        .collect::<Result<_>>()?;
    MetricTable::outer_join(&tables)
}

/// Raw score-table record
#[derive(Debug, Deserialize)]
struct ScoreRecord {
    site_name: String,
    topsis_score: f64,
    quality_level: Option<String>,
}

/// Read a score table previously written by the evaluation stage
pub fn load_score_table(path: impl AsRef<Path>) -> Result<Vec<StationScore>> {
    let path = path.as_ref();
    info!("loading score table from {:?}", path);

    let mut reader = csv::Reader::from_path(path)?;
    let mut scores = Vec::new();
    for record in reader.deserialize() {
        let record: ScoreRecord = record?;
        let level = record
            .quality_level
            .as_deref()
            .and_then(QualityLevel::from_str_loose)
            .unwrap_or_else(|| QualityLevel::from_score(record.topsis_score));
        scores.push(StationScore {
            station: record.site_name.trim().to_uppercase(),
            score: record.topsis_score,
            level,
        });
    }

    if scores.is_empty() {
        return Err(SelectorError::Input(format!(
            "score table {path:?} has no rows"
        )));
    }
    Ok(scores)
}

/// Raw coordinate record: ECEF meters
#[derive(Debug, Deserialize)]
struct CoordRecord {
    site_name: String,
    x: f64,
    y: f64,
    z: f64,
}

/// Read the station coordinate table. Records with non-finite or
/// zero-norm positions are skipped with a warning.
pub fn load_coordinates(path: impl AsRef<Path>) -> Result<HashMap<String, [f64; 3]>> {
    let path = path.as_ref();
    info!("loading coordinates from {:?}", path);

    let mut reader = csv::Reader::from_path(path)?;
    let mut coords = HashMap::new();
    let mut skipped = 0usize;
    for record in reader.deserialize() {
        let record: CoordRecord = record?;
        let ecef = [record.x, record.y, record.z];
        if ecef.iter().any(|v| !v.is_finite()) || geodesy::norm(ecef) <= f64::EPSILON {
            warn!("skipping {} with degenerate position", record.site_name);
            skipped += 1;
            continue;
        }
        coords.insert(record.site_name.trim().to_uppercase(), ecef);
    }

    info!("loaded {} coordinates, skipped {}", coords.len(), skipped);
    Ok(coords)
}

/// Join scores with coordinates into spatial-selector candidates
/// (inner join on station; unmatched stations are dropped with a log).
pub fn join_candidates(
    scores: &[StationScore],
    coords: &HashMap<String, [f64; 3]>,
) -> Vec<StationPoint> {
    let mut candidates = Vec::with_capacity(scores.len());
    let mut missing = 0usize;
    for s in scores {
        match coords.get(&s.station) {
            Some(&ecef) => candidates.push(StationPoint {
                station: s.station.clone(),
                ecef,
                score: s.score,
            }),
            None => {
                missing += 1;
            }
        }
    }
    if missing > 0 {
        info!("{missing} scored stations have no coordinates and were dropped");
    }
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn metric_header(day: &str) -> String {
        let mut cols = vec!["site_name".to_string()];
        for sys in SatSystem::ALL {
            for ind in Indicator::ALL {
                cols.push(format!("{}_{}_{}", sys.code(), ind.name(), day));
            }
        }
        cols.join(",")
    }

    fn metric_row(name: &str, vals: [f64; 10]) -> String {
        let mut fields = vec![name.to_string()];
        for _ in SatSystem::ALL {
            for v in vals {
                fields.push(v.to_string());
            }
        }
        fields.join(",")
    }

    fn write_temp(content: &str) -> NamedTempFile {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(content.as_bytes()).unwrap();
        f.flush().unwrap();
        f
    }

    #[test]
    fn test_read_site_list_skips_comments() {
        let f = write_temp("# network A\n abmf\nbadg\n\n# done\nzimm\n");
        let sites = read_site_list(f.path()).unwrap();
        assert_eq!(sites, vec!["ABMF", "BADG", "ZIMM"]);
    }

    #[test]
    fn test_parse_column_key() {
        let key = parse_column_key("G_nobs_2025001").unwrap();
        assert_eq!(key.system, SatSystem::Gps);
        assert_eq!(key.indicator, Indicator::Nobs);
        assert_eq!(key.day, 2025001);

        assert!(parse_column_key("X_nobs_2025001").is_err());
        assert!(parse_column_key("G_bogus_2025001").is_err());
        assert!(parse_column_key("G_nobs_25001").is_err());
        assert!(parse_column_key("G_nobs").is_err());
    }

    #[test]
    fn test_load_metric_table() {
        let content = format!(
            "{}\n{}\n{}\n",
            metric_header("2025001"),
            metric_row("abmf", [1000.0, 5.0, 2.0, 0.0, 1.0, 2.0, 0.4, 0.5, 45.0, 44.0]),
            metric_row("badg", [0.0, 999999.0, 999999.0, 999999.0, 999999.0, 999999.0, 999999.0, 999999.0, 0.0, 0.0]),
        );
        let f = write_temp(&content);
        let table = load_metric_table(&[f.path()]).unwrap();

        assert_eq!(table.n_stations(), 2);
        assert_eq!(table.days(), &[2025001]);
        assert_eq!(table.stations(), &["ABMF".to_string(), "BADG".to_string()]);
        // Sentinels decode to the tagged unavailable marker
        assert_eq!(table.value(1, 0), IndicatorValue::Unavailable);
        assert_eq!(table.value(1, 1), IndicatorValue::Unavailable);
        assert_eq!(table.value(0, 0), IndicatorValue::Observed(1000.0));
    }

    #[test]
    fn test_missing_indicator_column_is_schema_error() {
        // Drop the last header column and field of every row
        let header = metric_header("2025001");
        let header = &header[..header.rfind(',').unwrap()];
        let row = metric_row("abmf", [1.0; 10]);
        let row = &row[..row.rfind(',').unwrap()];
        let f = write_temp(&format!("{header}\n{row}\n"));

        assert!(matches!(
            load_metric_table(&[f.path()]),
            Err(SelectorError::Schema(_))
        ));
    }

    #[test]
    fn test_unknown_column_is_schema_error() {
        let content = format!(
            "{},G_extra_2025001\n{},1.0\n",
            metric_header("2025001"),
            metric_row("abmf", [1.0; 10]),
        );
        let f = write_temp(&content);
        assert!(matches!(
            load_metric_table(&[f.path()]),
            Err(SelectorError::Schema(_))
        ));
    }

    #[test]
    fn test_empty_metric_table_is_input_error() {
        let f = write_temp(&format!("{}\n", metric_header("2025001")));
        assert!(matches!(
            load_metric_table(&[f.path()]),
            Err(SelectorError::Input(_))
        ));
    }

    #[test]
    fn test_multi_file_outer_join() {
        let f1 = write_temp(&format!(
            "{}\n{}\n",
            metric_header("2025001"),
            metric_row("abmf", [1.0; 10]),
        ));
        let f2 = write_temp(&format!(
            "{}\n{}\n{}\n",
            metric_header("2025002"),
            metric_row("abmf", [2.0; 10]),
            metric_row("badg", [3.0; 10]),
        ));
        let table = load_metric_table(&[f1.path(), f2.path()]).unwrap();

        assert_eq!(table.n_stations(), 2);
        assert_eq!(table.days(), &[2025001, 2025002]);
        // BADG has no day-1 data
        assert_eq!(table.value(1, 0), IndicatorValue::Unavailable);
    }

    #[test]
    fn test_load_score_table_and_join() {
        let f = write_temp(
            "site_name,topsis_score,quality_level\nabmf,0.91,Excellent\nbadg,0.55,Fair\n",
        );
        let scores = load_score_table(f.path()).unwrap();
        assert_eq!(scores.len(), 2);
        assert_eq!(scores[0].station, "ABMF");
        assert_eq!(scores[0].level, QualityLevel::Excellent);

        let coords = HashMap::from([("ABMF".to_string(), [6378137.0, 0.0, 0.0])]);
        let candidates = join_candidates(&scores, &coords);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].station, "ABMF");
        assert!((candidates[0].score - 0.91).abs() < 1e-12);
    }

    #[test]
    fn test_load_coordinates_skips_degenerate() {
        let f = write_temp(
            "site_name,x,y,z\nabmf,2919785.0,-5383745.0,1774604.0\nbad1,0.0,0.0,0.0\n",
        );
        let coords = load_coordinates(f.path()).unwrap();
        assert_eq!(coords.len(), 1);
        assert!(coords.contains_key("ABMF"));
    }
}
