//! GNSS Station Quality Evaluation and Network Selection
//!
//! Ranks GNSS ground stations by data quality and picks a geographically
//! well-distributed subset of a candidate network.
//!
//! # Pipeline
//!
//! ```text
//! MetricTable ──► Scoring Engine ──► StationScore
//!                  (AHP ⊕ entropy       │
//!                   weights, TOPSIS)    ▼
//! Coordinates ───────────────► Spatial Selector ──► SelectionResult
//!                               (spherical k-means,
//!                                best score per cluster)
//! ```
//!
//! Per satellite system (G/R/E/C) each station carries ten quality
//! indicators per analyzed day. The scoring engine normalizes them,
//! blends a fixed pairwise-comparison weighting with a data-driven
//! entropy weighting, and ranks stations by TOPSIS distance to the
//! ideal best/worst profiles. The spatial selector then clusters the
//! candidate positions on the unit sphere and keeps the best-scoring
//! station of each cluster, repeating the clustering across seeded runs
//! and reporting how stable the result is.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

pub mod loader;
pub mod report;
pub mod scorer;
pub mod selector;

pub use scorer::ScorerConfig;
pub use selector::{SelectionResult, SelectorConfig, StationPoint};

/// Boundary value meaning "unavailable" for benefit indicators
pub const BENEFIT_SENTINEL: f64 = 0.0;
/// Boundary value meaning "unavailable" for cost indicators.
/// Intentionally larger than any real indicator value so it dominates
/// cost normalization; do not re-derive from observed data.
pub const COST_SENTINEL: f64 = 999_999.0;

/// Numerical guard for divide-by-zero in normalization and weighting
pub const EPS: f64 = 1e-10;

/// Default blend factor: share of the subjective (AHP) weights
pub const DEFAULT_ALPHA: f64 = 0.7;

/// Default score threshold for stations entering the spatial selection
pub const DEFAULT_MIN_SCORE: f64 = 0.8;

#[derive(Error, Debug)]
pub enum SelectorError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("invalid input: {0}")]
    Input(String),
    #[error("schema mismatch: {0}")]
    Schema(String),
    #[error("numeric degeneracy: {0}")]
    NumericDegeneracy(String),
    #[error("all {attempted} clustering runs failed")]
    AllRunsFailed { attempted: usize },
}

pub type Result<T> = std::result::Result<T, SelectorError>;

/// Tracked satellite systems, in fixed evaluation order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SatSystem {
    Gps,
    Glonass,
    Galileo,
    Beidou,
}

impl SatSystem {
    pub const ALL: [SatSystem; 4] = [
        SatSystem::Gps,
        SatSystem::Glonass,
        SatSystem::Galileo,
        SatSystem::Beidou,
    ];

    /// One-letter RINEX system code
    pub fn code(&self) -> char {
        match self {
            SatSystem::Gps => 'G',
            SatSystem::Glonass => 'R',
            SatSystem::Galileo => 'E',
            SatSystem::Beidou => 'C',
        }
    }

    pub fn from_code(c: char) -> Option<Self> {
        match c {
            'G' => Some(SatSystem::Gps),
            'R' => Some(SatSystem::Glonass),
            'E' => Some(SatSystem::Galileo),
            'C' => Some(SatSystem::Beidou),
            _ => None,
        }
    }

    pub fn index(&self) -> usize {
        *self as usize
    }

    /// Default relative importance (G=0.40, R=E=C=0.20)
    pub fn default_weight(&self) -> f64 {
        match self {
            SatSystem::Gps => 0.40,
            _ => 0.20,
        }
    }
}

/// Whether a larger indicator value means better or worse quality
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Benefit,
    Cost,
}

/// The ten per-system quality indicators, in fixed column order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Indicator {
    /// Usable observation count
    Nobs,
    /// Total cycle slips
    CsAll,
    /// Slip count
    NSlp,
    /// Clock jump count
    NJmp,
    /// Data gap count
    NGap,
    /// Data piece count
    NPcs,
    /// Multipath RMS, first frequency
    Mp1,
    /// Multipath RMS, second frequency
    Mp2,
    /// Carrier-to-noise density, first frequency
    Cnr1,
    /// Carrier-to-noise density, second frequency
    Cnr2,
}

impl Indicator {
    pub const ALL: [Indicator; 10] = [
        Indicator::Nobs,
        Indicator::CsAll,
        Indicator::NSlp,
        Indicator::NJmp,
        Indicator::NGap,
        Indicator::NPcs,
        Indicator::Mp1,
        Indicator::Mp2,
        Indicator::Cnr1,
        Indicator::Cnr2,
    ];

    /// Column-name fragment used in the external table format
    pub fn name(&self) -> &'static str {
        match self {
            Indicator::Nobs => "nobs",
            Indicator::CsAll => "csAll",
            Indicator::NSlp => "nSlp",
            Indicator::NJmp => "nJmp",
            Indicator::NGap => "nGap",
            Indicator::NPcs => "nPcs",
            Indicator::Mp1 => "mp1",
            Indicator::Mp2 => "mp2",
            Indicator::Cnr1 => "cnr1",
            Indicator::Cnr2 => "cnr2",
        }
    }

    pub fn from_name(s: &str) -> Option<Self> {
        Indicator::ALL.iter().copied().find(|i| i.name() == s)
    }

    pub fn index(&self) -> usize {
        *self as usize
    }

    pub fn direction(&self) -> Direction {
        match self {
            Indicator::Nobs | Indicator::Cnr1 | Indicator::Cnr2 => Direction::Benefit,
            _ => Direction::Cost,
        }
    }

    /// Legacy sentinel encoding "unavailable" for this indicator
    pub fn sentinel(&self) -> f64 {
        match self.direction() {
            Direction::Benefit => BENEFIT_SENTINEL,
            Direction::Cost => COST_SENTINEL,
        }
    }
}

/// A single indicator reading. "Unavailable" marks a system that cannot
/// be used at a station (e.g. single-frequency-only observations); it
/// converts to the legacy sentinel values at the table boundary.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum IndicatorValue {
    Observed(f64),
    Unavailable,
}

impl IndicatorValue {
    /// External numeric form: sentinels stand in for unavailable readings
    pub fn to_raw(self, indicator: Indicator) -> f64 {
        match self {
            IndicatorValue::Observed(v) => v,
            IndicatorValue::Unavailable => indicator.sentinel(),
        }
    }

    /// Parse the external numeric form, mapping sentinels back to the
    /// tagged marker
    pub fn from_raw(indicator: Indicator, v: f64) -> Self {
        if (v - indicator.sentinel()).abs() < EPS {
            IndicatorValue::Unavailable
        } else {
            IndicatorValue::Observed(v)
        }
    }
}

/// Identifies one metric-table column: system + indicator + observation day
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ColumnKey {
    /// Day key in yyyydoy form (e.g. 2025001)
    pub day: u32,
    pub system: SatSystem,
    pub indicator: Indicator,
}

impl fmt::Display for ColumnKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}_{}_{:07}",
            self.system.code(),
            self.indicator.name(),
            self.day
        )
    }
}

/// Number of indicator columns per analyzed day (4 systems × 10 indicators)
pub const COLUMNS_PER_DAY: usize = SatSystem::ALL.len() * Indicator::ALL.len();

/// Per-station quality indicators, one vector per system per day.
///
/// Rows are stations (case-insensitive site codes, stored upper-case),
/// columns run day-major in the fixed (day, system, indicator) order.
#[derive(Debug, Clone, Default)]
pub struct MetricTable {
    days: Vec<u32>,
    stations: Vec<String>,
    values: Vec<IndicatorValue>,
}

impl MetricTable {
    /// Build a table from per-station rows. Each row must carry
    /// `days.len() * COLUMNS_PER_DAY` values in canonical column order.
    pub fn from_rows(days: Vec<u32>, rows: Vec<(String, Vec<IndicatorValue>)>) -> Result<Self> {
        let mut days = days;
        days.sort_unstable();
        days.dedup();
        let n_cols = days.len() * COLUMNS_PER_DAY;

        let mut stations = Vec::with_capacity(rows.len());
        let mut values = Vec::with_capacity(rows.len() * n_cols);
        for (name, row) in rows {
            if row.len() != n_cols {
                return Err(SelectorError::Input(format!(
                    "station {}: expected {} indicator values, got {}",
                    name,
                    n_cols,
                    row.len()
                )));
            }
            let name = name.trim().to_uppercase();
            if stations.contains(&name) {
                return Err(SelectorError::Input(format!("duplicate station {name}")));
            }
            stations.push(name);
            values.extend(row);
        }

        Ok(Self {
            days,
            stations,
            values,
        })
    }

    pub fn n_stations(&self) -> usize {
        self.stations.len()
    }

    pub fn n_columns(&self) -> usize {
        self.days.len() * COLUMNS_PER_DAY
    }

    pub fn stations(&self) -> &[String] {
        &self.stations
    }

    pub fn days(&self) -> &[u32] {
        &self.days
    }

    pub fn value(&self, row: usize, col: usize) -> IndicatorValue {
        self.values[row * self.n_columns() + col]
    }

    /// Canonical position of a (day, system, indicator) column
    pub fn column_index(&self, key: ColumnKey) -> Option<usize> {
        let day_pos = self.days.iter().position(|&d| d == key.day)?;
        Some(
            day_pos * COLUMNS_PER_DAY
                + key.system.index() * Indicator::ALL.len()
                + key.indicator.index(),
        )
    }

    /// Column identities in canonical order
    pub fn column_keys(&self) -> Vec<ColumnKey> {
        let mut keys = Vec::with_capacity(self.n_columns());
        for &day in &self.days {
            for system in SatSystem::ALL {
                for indicator in Indicator::ALL {
                    keys.push(ColumnKey {
                        day,
                        system,
                        indicator,
                    });
                }
            }
        }
        keys
    }

    /// Outer join of single- or multi-day tables on the station name.
    /// Stations missing from some tables keep unavailable markers for
    /// those days; day sets must not overlap between tables.
    pub fn outer_join(tables: &[MetricTable]) -> Result<MetricTable> {
        if tables.is_empty() {
            return Err(SelectorError::Input("no metric tables to join".into()));
        }

        let mut all_days: Vec<u32> = Vec::new();
        for t in tables {
            for &d in &t.days {
                if all_days.contains(&d) {
                    return Err(SelectorError::Input(format!(
                        "day {d} appears in more than one metric table"
                    )));
                }
                all_days.push(d);
            }
        }
        all_days.sort_unstable();

        // Union of stations, first-seen order
        let mut stations: Vec<String> = Vec::new();
        for t in tables {
            for s in &t.stations {
                if !stations.contains(s) {
                    stations.push(s.clone());
                }
            }
        }

        let n_cols = all_days.len() * COLUMNS_PER_DAY;
        let mut values = vec![IndicatorValue::Unavailable; stations.len() * n_cols];
        for t in tables {
            for (t_row, s) in t.stations.iter().enumerate() {
                let row = stations.iter().position(|x| x == s).unwrap_or_default();
                for (day_pos, &day) in t.days.iter().enumerate() {
                    let out_day = all_days
                        .iter()
                        .position(|&d| d == day)
                        .unwrap_or_default();
                    for k in 0..COLUMNS_PER_DAY {
                        values[row * n_cols + out_day * COLUMNS_PER_DAY + k] =
                            t.value(t_row, day_pos * COLUMNS_PER_DAY + k);
                    }
                }
            }
        }

        Ok(MetricTable {
            days: all_days,
            stations,
            values,
        })
    }
}

/// Ordinal quality label derived from the TOPSIS score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QualityLevel {
    Excellent,
    Good,
    Fair,
    Poor,
}

impl QualityLevel {
    pub fn from_score(score: f64) -> Self {
        if score >= 0.8 {
            QualityLevel::Excellent
        } else if score >= 0.6 {
            QualityLevel::Good
        } else if score >= 0.4 {
            QualityLevel::Fair
        } else {
            QualityLevel::Poor
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            QualityLevel::Excellent => "Excellent",
            QualityLevel::Good => "Good",
            QualityLevel::Fair => "Fair",
            QualityLevel::Poor => "Poor",
        }
    }

    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s {
            "Excellent" => Some(QualityLevel::Excellent),
            "Good" => Some(QualityLevel::Good),
            "Fair" => Some(QualityLevel::Fair),
            "Poor" => Some(QualityLevel::Poor),
            _ => None,
        }
    }
}

impl fmt::Display for QualityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Evaluation output for one station
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StationScore {
    pub station: String,
    /// TOPSIS closeness to the ideal-best profile, in [0, 1]
    pub score: f64,
    pub level: QualityLevel,
}
