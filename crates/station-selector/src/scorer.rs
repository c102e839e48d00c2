//! Hybrid multi-criteria quality scoring
//!
//! Converts the heterogeneous per-station indicators into one comparable
//! score per station:
//!
//! 1. direction-aware min–max normalization (1.0 always means best),
//! 2. per-system indicator weights blended from a fixed AHP
//!    pairwise-comparison prior and data-driven entropy weights,
//! 3. TOPSIS ranking by relative distance to the ideal-best and
//!    ideal-worst weighted profiles.

use crate::{
    Direction, Indicator, MetricTable, QualityLevel, Result, SatSystem, SelectorError,
    StationScore, DEFAULT_ALPHA, EPS,
};
use tracing::debug;

/// Scoring engine configuration
#[derive(Debug, Clone)]
pub struct ScorerConfig {
    /// Share of the subjective (AHP) weights in the blend, in [0, 1]
    pub alpha: f64,
    /// Relative system importance in G/R/E/C order, non-negative
    pub system_weights: [f64; 4],
}

impl Default for ScorerConfig {
    fn default() -> Self {
        let mut system_weights = [0.0; 4];
        for sys in SatSystem::ALL {
            system_weights[sys.index()] = sys.default_weight();
        }
        Self {
            alpha: DEFAULT_ALPHA,
            system_weights,
        }
    }
}

/// Fixed pairwise-comparison matrix over the ten indicators.
///
/// Hand-authored domain prior: observation count and carrier-to-noise
/// are most important, gap/piece counts least. Values in {1/7 … 7};
/// the matrix is nearly consistent, so the column-normalize-and-average
/// approximation of the eigenvector method is acceptable.
pub fn ahp_judgment_matrix() -> Vec<Vec<f64>> {
    const R3: f64 = 1.0 / 3.0;
    const R5: f64 = 1.0 / 5.0;
    const R7: f64 = 1.0 / 7.0;
    vec![
        // nobs csAll nSlp nJmp nGap nPcs  mp1  mp2 cnr1 cnr2
        vec![1.0, 3.0, 3.0, 5.0, 7.0, 7.0, 3.0, 3.0, 1.0, 1.0], // nobs
        vec![R3, 1.0, 1.0, 3.0, 5.0, 5.0, R3, R3, R3, R3],      // csAll
        vec![R3, 1.0, 1.0, 3.0, 5.0, 5.0, R3, R3, R3, R3],      // nSlp
        vec![R5, R3, R3, 1.0, 3.0, 3.0, R5, R5, R5, R5],        // nJmp
        vec![R7, R5, R5, R3, 1.0, 1.0, R7, R7, R7, R7],         // nGap
        vec![R7, R5, R5, R3, 1.0, 1.0, R7, R7, R7, R7],         // nPcs
        vec![R3, 3.0, 3.0, 5.0, 7.0, 7.0, 1.0, 1.0, R3, R3],    // mp1
        vec![R3, 3.0, 3.0, 5.0, 7.0, 7.0, 1.0, 1.0, R3, R3],    // mp2
        vec![1.0, 3.0, 3.0, 5.0, 7.0, 7.0, 3.0, 3.0, 1.0, 1.0], // cnr1
        vec![1.0, 3.0, 3.0, 5.0, 7.0, 7.0, 3.0, 3.0, 1.0, 1.0], // cnr2
    ]
}

/// Direction-aware min–max normalization.
///
/// Benefit columns scale by the column maximum, cost columns invert the
/// observed range; either way 1.0 means best observed performance. A
/// column with no spread asserts no penalty and normalizes to all-1.0.
pub fn directional_normalize(rows: &[Vec<f64>], directions: &[Direction]) -> Vec<Vec<f64>> {
    let n_cols = directions.len();
    let mut out: Vec<Vec<f64>> = vec![vec![0.0; n_cols]; rows.len()];

    for j in 0..n_cols {
        let mut max = f64::NEG_INFINITY;
        let mut min = f64::INFINITY;
        for row in rows {
            max = max.max(row[j]);
            min = min.min(row[j]);
        }

        match directions[j] {
            Direction::Benefit => {
                for (i, row) in rows.iter().enumerate() {
                    out[i][j] = if max > EPS { row[j] / max } else { 1.0 };
                }
            }
            Direction::Cost => {
                for (i, row) in rows.iter().enumerate() {
                    out[i][j] = if max > min + EPS {
                        (max - row[j]) / (max - min)
                    } else {
                        1.0
                    };
                }
            }
        }
    }

    out
}

/// Objective (entropy) weights: one weight per column, summing to 1.
///
/// The less a column discriminates between stations, the closer its
/// Shannon entropy comes to 1 and the less it counts. Fewer than two
/// rows carry no discriminating information at all; the weights fall
/// back to uniform.
pub fn entropy_weight(rows: &[Vec<f64>]) -> Vec<f64> {
    let n_rows = rows.len();
    let n_cols = rows.first().map(|r| r.len()).unwrap_or(0);
    if n_cols == 0 {
        return Vec::new();
    }
    if n_rows < 2 {
        return vec![1.0 / n_cols as f64; n_cols];
    }

    let ln_n = (n_rows as f64).ln();
    let mut degree = vec![0.0; n_cols];
    for j in 0..n_cols {
        let col: Vec<f64> = rows.iter().map(|r| r[j].abs() + EPS).collect();
        let sum: f64 = col.iter().sum();
        let entropy: f64 = -col
            .iter()
            .map(|&v| {
                let p = v / sum;
                p * (p + EPS).ln()
            })
            .sum::<f64>()
            / ln_n;
        degree[j] = 1.0 - entropy;
    }

    let total: f64 = degree.iter().sum();
    degree.iter().map(|&d| d / (total + EPS)).collect()
}

/// Subjective (AHP) weights from a square positive pairwise matrix:
/// column-normalize, then average each row.
pub fn ahp_weight(judgment: &[Vec<f64>]) -> Result<Vec<f64>> {
    let n = judgment.len();
    if n == 0 || judgment.iter().any(|row| row.len() != n) {
        return Err(SelectorError::Input(
            "AHP judgment matrix must be square and non-empty".into(),
        ));
    }

    let mut col_sums = vec![0.0; n];
    for row in judgment {
        for (j, &v) in row.iter().enumerate() {
            col_sums[j] += v;
        }
    }

    let mut weights: Vec<f64> = judgment
        .iter()
        .map(|row| {
            row.iter()
                .enumerate()
                .map(|(j, &v)| v / col_sums[j])
                .sum::<f64>()
                / n as f64
        })
        .collect();

    let total: f64 = weights.iter().sum();
    for w in weights.iter_mut() {
        *w /= total;
    }
    Ok(weights)
}

/// Blend subjective and objective weights and renormalize to sum 1
pub fn combined_weight(subjective: &[f64], objective: &[f64], alpha: f64) -> Vec<f64> {
    let mut combined: Vec<f64> = subjective
        .iter()
        .zip(objective)
        .map(|(&s, &o)| alpha * s + (1.0 - alpha) * o)
        .collect();
    let total: f64 = combined.iter().sum();
    if total > EPS {
        for w in combined.iter_mut() {
            *w /= total;
        }
    } else {
        let uniform = 1.0 / combined.len().max(1) as f64;
        combined.iter_mut().for_each(|w| *w = uniform);
    }
    combined
}

/// Score every station in the table, sorted by descending score.
///
/// Indicator weights are computed independently per satellite system;
/// for multi-day tables the entropy weights of a system's day-columns
/// are averaged per indicator before blending with the AHP prior, and
/// each day-column carries its indicator's blended weight times the
/// system weight.
pub fn evaluate(table: &MetricTable, config: &ScorerConfig) -> Result<Vec<StationScore>> {
    if table.n_stations() == 0 {
        return Err(SelectorError::Input(
            "metric table contains no stations".into(),
        ));
    }
    if !(0.0..=1.0).contains(&config.alpha) {
        return Err(SelectorError::Input(format!(
            "alpha must be in [0, 1], got {}",
            config.alpha
        )));
    }
    if config.system_weights.iter().any(|&w| w < 0.0)
        || config.system_weights.iter().sum::<f64>() <= EPS
    {
        return Err(SelectorError::Input(
            "system weights must be non-negative and not all zero".into(),
        ));
    }

    let keys = table.column_keys();
    let n_rows = table.n_stations();
    let n_cols = keys.len();

    // Numeric matrix with legacy sentinels standing in for unavailable
    // readings; sentinels normalize to the worst value by construction.
    let raw: Vec<Vec<f64>> = (0..n_rows)
        .map(|i| {
            keys.iter()
                .enumerate()
                .map(|(j, key)| table.value(i, j).to_raw(key.indicator))
                .collect()
        })
        .collect();
    let directions: Vec<Direction> = keys.iter().map(|k| k.indicator.direction()).collect();
    let normalized = directional_normalize(&raw, &directions);

    let subjective = ahp_weight(&ahp_judgment_matrix())?;
    let n_days = table.days().len().max(1) as f64;

    let mut col_weight = vec![0.0; n_cols];
    for sys in SatSystem::ALL {
        let cols: Vec<usize> = (0..n_cols).filter(|&j| keys[j].system == sys).collect();
        let sub: Vec<Vec<f64>> = normalized
            .iter()
            .map(|row| cols.iter().map(|&j| row[j]).collect())
            .collect();
        let per_column = entropy_weight(&sub);

        // One objective weight per indicator, averaged over days
        let mut objective = vec![0.0; Indicator::ALL.len()];
        for (pos, &j) in cols.iter().enumerate() {
            objective[keys[j].indicator.index()] += per_column[pos];
        }
        for w in objective.iter_mut() {
            *w /= n_days;
        }
        let total: f64 = objective.iter().sum();
        if total > EPS {
            for w in objective.iter_mut() {
                *w /= total;
            }
        } else {
            objective.fill(1.0 / Indicator::ALL.len() as f64);
        }

        let combined = combined_weight(&subjective, &objective, config.alpha);
        debug!(
            system = %sys.code(),
            weights = ?combined
                .iter()
                .zip(Indicator::ALL)
                .map(|(w, i)| format!("{}={:.4}", i.name(), w))
                .collect::<Vec<_>>(),
            "indicator weights"
        );

        let sys_weight = config.system_weights[sys.index()];
        for &j in &cols {
            col_weight[j] = combined[keys[j].indicator.index()] * sys_weight;
        }
    }

    // Weighted matrix and ideal best/worst profiles
    let weighted: Vec<Vec<f64>> = normalized
        .iter()
        .map(|row| row.iter().zip(&col_weight).map(|(&v, &w)| v * w).collect())
        .collect();

    let mut ideal_best = vec![f64::NEG_INFINITY; n_cols];
    let mut ideal_worst = vec![f64::INFINITY; n_cols];
    for row in &weighted {
        for j in 0..n_cols {
            ideal_best[j] = ideal_best[j].max(row[j]);
            ideal_worst[j] = ideal_worst[j].min(row[j]);
        }
    }

    let mut scores: Vec<StationScore> = weighted
        .iter()
        .zip(table.stations())
        .map(|(row, station)| {
            let d_best = euclidean(row, &ideal_best);
            let d_worst = euclidean(row, &ideal_worst);
            let score = d_worst / (d_best + d_worst + 1e-12);
            StationScore {
                station: station.clone(),
                score,
                level: QualityLevel::from_score(score),
            }
        })
        .collect();

    scores.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    Ok(scores)
}

fn euclidean(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(&x, &y)| (x - y) * (x - y))
        .sum::<f64>()
        .sqrt()
}
