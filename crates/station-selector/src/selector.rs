//! Spherical k-means station selection
//!
//! Partitions candidate stations into k clusters by angular distance on
//! the unit sphere and keeps the best-scoring station of each non-empty
//! cluster. Geographic coverage comes from the clustering; station
//! quality, not geometric centrality, decides who represents a region.
//!
//! Clustering is repeated across independently seeded runs and the run
//! with the lowest angular inertia wins; the spread of inertia across
//! runs quantifies sensitivity to initialization.

use crate::{Result, SelectorError, EPS};
use geodesy::{angular_distance, ecef_to_geodetic, norm, unit};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Spatial selector input: one candidate station with its position and
/// quality score
#[derive(Debug, Clone)]
pub struct StationPoint {
    pub station: String,
    /// ECEF position in meters
    pub ecef: [f64; 3],
    /// TOPSIS quality score in [0, 1]
    pub score: f64,
}

/// Spatial selector configuration
#[derive(Debug, Clone)]
pub struct SelectorConfig {
    /// Target cluster count (stations to select)
    pub n_clusters: usize,
    /// Independent clustering runs
    pub n_runs: usize,
    /// Lloyd iteration cap per run
    pub max_iter: usize,
    /// Run r is seeded with `base_seed + r`
    pub base_seed: u64,
}

impl SelectorConfig {
    pub fn new(n_clusters: usize) -> Self {
        Self {
            n_clusters,
            n_runs: 30,
            max_iter: 300,
            base_seed: 42,
        }
    }
}

/// One station's cluster membership in the winning run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StationAssignment {
    pub station: String,
    pub cluster: usize,
    pub score: f64,
    /// Geodetic latitude in decimal degrees
    pub latitude: f64,
    /// Geodetic longitude in decimal degrees
    pub longitude: f64,
}

/// Across-run spread of the clustering outcome
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StabilityMetrics {
    pub n_successful_runs: usize,
    pub n_failed_runs: usize,
    pub min_inertia: f64,
    pub max_inertia: f64,
    pub mean_inertia: f64,
    pub std_inertia: f64,
    /// std / mean; 0 when the mean is not positive
    pub coefficient_of_variation: f64,
    pub mean_n_selected: f64,
}

/// Output of one full multi-run selection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectionResult {
    /// Cluster representatives, ordered by cluster id
    pub selected: Vec<StationAssignment>,
    /// Every candidate's assignment in the winning run
    pub assignments: Vec<StationAssignment>,
    /// Index of the winning run
    pub best_run: usize,
    /// Angular inertia of the winning run
    pub best_inertia: f64,
    /// Inertia of each successful run, in run order
    pub run_inertias: Vec<f64>,
    pub stability: StabilityMetrics,
}

/// Outcome of a single clustering run
struct RunRecord {
    run_id: usize,
    labels: Vec<usize>,
    selected_idx: Vec<usize>,
    inertia: f64,
}

/// Spherical k-means++ initialization: D²-sampling with squared angular
/// (not Euclidean) distances, which on a sphere avoids the bias toward
/// antipodal outliers.
fn kmeans_pp_init(points: &[[f64; 3]], k: usize, rng: &mut StdRng) -> Vec<[f64; 3]> {
    let n = points.len();
    let mut centers: Vec<[f64; 3]> = Vec::with_capacity(k);
    centers.push(points[rng.random_range(0..n)]);

    while centers.len() < k {
        let dist_sq: Vec<f64> = points
            .iter()
            .map(|p| {
                centers
                    .iter()
                    .map(|c| angular_distance(*p, *c))
                    .fold(f64::INFINITY, f64::min)
                    .powi(2)
            })
            .collect();
        let total: f64 = dist_sq.iter().sum();

        let next = if total <= 0.0 {
            // Every point coincides with a chosen center
            rng.random_range(0..n)
        } else {
            let mut r = rng.random::<f64>() * total;
            let mut idx = n - 1;
            for (i, &w) in dist_sq.iter().enumerate() {
                if r < w {
                    idx = i;
                    break;
                }
                r -= w;
            }
            idx
        };
        centers.push(points[next]);
    }

    centers
}

fn assign(points: &[[f64; 3]], centers: &[[f64; 3]]) -> Vec<usize> {
    points
        .iter()
        .map(|p| {
            let mut best = 0;
            let mut best_dist = f64::INFINITY;
            for (c, center) in centers.iter().enumerate() {
                let d = angular_distance(*p, *center);
                if d < best_dist {
                    best_dist = d;
                    best = c;
                }
            }
            best
        })
        .collect()
}

/// Lloyd refinement on the unit sphere. Centers are renormalized member
/// means; an empty cluster keeps its previous center. Fails the run if
/// a member mean collapses to zero norm (antipodal cancellation).
fn lloyd(
    points: &[[f64; 3]],
    centers: &mut Vec<[f64; 3]>,
    max_iter: usize,
) -> Result<Vec<usize>> {
    let k = centers.len();
    let mut labels = assign(points, centers);

    for _ in 0..max_iter {
        let mut sums = vec![[0.0; 3]; k];
        let mut counts = vec![0usize; k];
        for (p, &l) in points.iter().zip(&labels) {
            sums[l][0] += p[0];
            sums[l][1] += p[1];
            sums[l][2] += p[2];
            counts[l] += 1;
        }
        for c in 0..k {
            if counts[c] == 0 {
                continue;
            }
            let mean = [
                sums[c][0] / counts[c] as f64,
                sums[c][1] / counts[c] as f64,
                sums[c][2] / counts[c] as f64,
            ];
            if norm(mean) <= EPS {
                return Err(SelectorError::NumericDegeneracy(format!(
                    "cluster {c} center collapsed to zero norm"
                )));
            }
            centers[c] = unit(mean);
        }

        let new_labels = assign(points, centers);
        if new_labels == labels {
            break;
        }
        labels = new_labels;
    }

    Ok(labels)
}

/// One clustering run: seeded init, refinement, representative pick,
/// angular inertia.
fn run_once(
    points: &[[f64; 3]],
    scores: &[f64],
    config: &SelectorConfig,
    run_id: usize,
) -> Result<RunRecord> {
    let mut rng = StdRng::seed_from_u64(config.base_seed + run_id as u64);
    let mut centers = kmeans_pp_init(points, config.n_clusters, &mut rng);
    let labels = lloyd(points, &mut centers, config.max_iter)?;

    // Best-scoring member represents each non-empty cluster; empty
    // clusters contribute no selection. Ties go to table order.
    let mut selected_idx = Vec::new();
    for cluster in 0..config.n_clusters {
        let mut best: Option<usize> = None;
        for (i, &l) in labels.iter().enumerate() {
            if l == cluster && best.map_or(true, |b| scores[i] > scores[b]) {
                best = Some(i);
            }
        }
        if let Some(i) = best {
            selected_idx.push(i);
        }
    }

    let inertia: f64 = points
        .iter()
        .zip(&labels)
        .map(|(p, &l)| angular_distance(*p, centers[l]).powi(2))
        .sum();

    debug!(run_id, inertia, n_selected = selected_idx.len(), "run complete");

    Ok(RunRecord {
        run_id,
        labels,
        selected_idx,
        inertia,
    })
}

/// Multi-run spherical k-means selection.
///
/// Runs the clustering `n_runs` times with per-run seeds, keeps the run
/// with minimum inertia (ties to the earlier run) and reports stability
/// statistics over the successful runs. Individual run failures are
/// recorded and skipped; only a batch with zero successful runs fails.
pub fn select_stations(
    candidates: &[StationPoint],
    config: &SelectorConfig,
) -> Result<SelectionResult> {
    if config.n_clusters == 0 {
        return Err(SelectorError::Input("cluster count must be positive".into()));
    }
    if config.n_runs == 0 {
        return Err(SelectorError::Input("run count must be positive".into()));
    }
    if candidates.len() < config.n_clusters {
        return Err(SelectorError::Input(format!(
            "{} candidate stations cannot fill {} clusters",
            candidates.len(),
            config.n_clusters
        )));
    }
    for c in candidates {
        if norm(c.ecef) <= EPS || c.ecef.iter().any(|v| !v.is_finite()) {
            return Err(SelectorError::Input(format!(
                "station {} has a degenerate position",
                c.station
            )));
        }
    }

    info!(
        n_candidates = candidates.len(),
        n_clusters = config.n_clusters,
        n_runs = config.n_runs,
        "starting spherical k-means selection"
    );

    let points: Vec<[f64; 3]> = candidates.iter().map(|c| unit(c.ecef)).collect();
    let scores: Vec<f64> = candidates.iter().map(|c| c.score).collect();

    let mut records: Vec<RunRecord> = Vec::with_capacity(config.n_runs);
    let mut failed = 0usize;
    for run_id in 0..config.n_runs {
        match run_once(&points, &scores, config, run_id) {
            Ok(record) => records.push(record),
            Err(e) => {
                warn!(run_id, error = %e, "clustering run failed");
                failed += 1;
            }
        }
    }

    if records.is_empty() {
        return Err(SelectorError::AllRunsFailed {
            attempted: config.n_runs,
        });
    }

    // Deterministic reduction: min inertia, ties to the earlier run
    let best = records
        .iter()
        .enumerate()
        .min_by(|(_, a), (_, b)| {
            a.inertia
                .partial_cmp(&b.inertia)
                .unwrap_or(std::cmp::Ordering::Equal)
        })
        .map(|(i, _)| i)
        .unwrap_or_default();
    let best_record = &records[best];

    let run_inertias: Vec<f64> = records.iter().map(|r| r.inertia).collect();
    let n = run_inertias.len() as f64;
    let mean = run_inertias.iter().sum::<f64>() / n;
    let std = (run_inertias.iter().map(|&x| (x - mean) * (x - mean)).sum::<f64>() / n).sqrt();
    let stability = StabilityMetrics {
        n_successful_runs: records.len(),
        n_failed_runs: failed,
        min_inertia: run_inertias.iter().copied().fold(f64::INFINITY, f64::min),
        max_inertia: run_inertias.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        mean_inertia: mean,
        std_inertia: std,
        coefficient_of_variation: if mean > 0.0 { std / mean } else { 0.0 },
        mean_n_selected: records.iter().map(|r| r.selected_idx.len() as f64).sum::<f64>()
            / n,
    };

    let assignment_of = |i: usize| {
        let geo = ecef_to_geodetic(candidates[i].ecef);
        StationAssignment {
            station: candidates[i].station.clone(),
            cluster: best_record.labels[i],
            score: candidates[i].score,
            latitude: geo.lat_deg(),
            longitude: geo.lon_deg(),
        }
    };

    let selected: Vec<StationAssignment> =
        best_record.selected_idx.iter().map(|&i| assignment_of(i)).collect();
    let assignments: Vec<StationAssignment> =
        (0..candidates.len()).map(assignment_of).collect();

    info!(
        n_selected = selected.len(),
        best_run = best_record.run_id,
        best_inertia = best_record.inertia,
        cv = stability.coefficient_of_variation,
        "selection complete"
    );

    Ok(SelectionResult {
        selected,
        assignments,
        best_run: best_record.run_id,
        best_inertia: best_record.inertia,
        run_inertias,
        stability,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use geodesy::{geodetic_to_ecef, Geodetic};

    fn point(name: &str, lat: f64, lon: f64, score: f64) -> StationPoint {
        StationPoint {
            station: name.to_string(),
            ecef: geodetic_to_ecef(Geodetic::from_degrees(lat, lon, 0.0)),
            score,
        }
    }

    /// Three well-separated regions with four stations each
    fn three_regions() -> Vec<StationPoint> {
        vec![
            // Europe
            point("EUR1", 50.0, 10.0, 0.85),
            point("EUR2", 51.0, 11.0, 0.95),
            point("EUR3", 49.5, 9.0, 0.80),
            point("EUR4", 52.0, 8.5, 0.88),
            // East Asia
            point("ASI1", 35.0, 135.0, 0.92),
            point("ASI2", 36.0, 136.0, 0.83),
            point("ASI3", 34.0, 134.0, 0.81),
            point("ASI4", 37.0, 137.5, 0.90),
            // North America
            point("AME1", 40.0, -100.0, 0.89),
            point("AME2", 41.0, -101.0, 0.94),
            point("AME3", 39.0, -99.0, 0.82),
            point("AME4", 42.0, -102.0, 0.86),
        ]
    }

    #[test]
    fn test_too_few_candidates_is_input_error() {
        let candidates = vec![point("AAAA", 10.0, 10.0, 0.9)];
        let result = select_stations(&candidates, &SelectorConfig::new(3));
        assert!(matches!(result, Err(SelectorError::Input(_))));
    }

    #[test]
    fn test_degenerate_position_is_input_error() {
        let mut candidates = three_regions();
        candidates[0].ecef = [0.0, 0.0, 0.0];
        let result = select_stations(&candidates, &SelectorConfig::new(3));
        assert!(matches!(result, Err(SelectorError::Input(_))));
    }

    #[test]
    fn test_selects_one_representative_per_region() {
        let mut config = SelectorConfig::new(3);
        config.n_runs = 10;
        let result = select_stations(&three_regions(), &config).unwrap();

        assert_eq!(result.selected.len(), 3);
        // One station from each region
        let mut prefixes: Vec<&str> = result
            .selected
            .iter()
            .map(|s| &s.station[..3])
            .collect();
        prefixes.sort_unstable();
        assert_eq!(prefixes, vec!["AME", "ASI", "EUR"]);
    }

    #[test]
    fn test_representative_has_max_score_in_cluster() {
        let mut config = SelectorConfig::new(3);
        config.n_runs = 10;
        let result = select_stations(&three_regions(), &config).unwrap();

        for rep in &result.selected {
            for member in result
                .assignments
                .iter()
                .filter(|a| a.cluster == rep.cluster)
            {
                assert!(
                    rep.score >= member.score,
                    "representative {} ({}) outranked by {} ({})",
                    rep.station,
                    rep.score,
                    member.station,
                    member.score
                );
            }
        }
    }

    #[test]
    fn test_quality_beats_centrality() {
        // Scenario: three near-identical positions where the outlier of
        // the dense trio by score must win its cluster regardless of
        // distance to the centroid.
        let mut candidates = three_regions();
        candidates[0] = point("EUR1", 50.0, 10.0, 0.40);
        candidates[1] = point("EUR2", 50.01, 10.01, 0.50);
        candidates[2] = point("EUR3", 50.02, 10.02, 0.95);
        candidates[3] = point("EUR4", 50.01, 9.99, 0.45);

        let mut config = SelectorConfig::new(3);
        config.n_runs = 10;
        let result = select_stations(&candidates, &config).unwrap();

        let eur = result
            .selected
            .iter()
            .find(|s| s.station.starts_with("EUR"))
            .unwrap();
        assert_eq!(eur.station, "EUR3");
        assert!((eur.score - 0.95).abs() < 1e-12);
    }

    #[test]
    fn test_fewer_natural_groups_than_k() {
        // Scenario: k=5 over 8 candidates forming only 3 distinguishable
        // positions; surplus centers duplicate an existing one, own no
        // members, and fewer than k stations come back.
        let candidates = vec![
            point("EUR1", 50.0, 10.0, 0.85),
            point("EUR2", 50.0, 10.0, 0.86),
            point("EUR3", 50.0, 10.0, 0.84),
            point("ASI1", 35.0, 135.0, 0.90),
            point("ASI2", 35.0, 135.0, 0.91),
            point("ASI3", 35.0, 135.0, 0.89),
            point("AME1", 40.0, -100.0, 0.88),
            point("AME2", 40.0, -100.0, 0.87),
        ];
        let mut config = SelectorConfig::new(5);
        config.n_runs = 10;
        let result = select_stations(&candidates, &config).unwrap();

        assert!(result.selected.len() <= 5);
        assert_eq!(result.selected.len(), 3);
        assert!((result.stability.mean_n_selected - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_lloyd_antipodal_mean_is_numeric_degeneracy() {
        // Two exactly antipodal members in one cluster: their mean has
        // zero norm and cannot be renormalized into a center.
        let points = [[1.0, 0.0, 0.0], [-1.0, 0.0, 0.0]];
        let mut centers = vec![[0.0, 1.0, 0.0]];
        let result = lloyd(&points, &mut centers, 10);
        assert!(matches!(result, Err(SelectorError::NumericDegeneracy(_))));
    }

    #[test]
    fn test_all_runs_failed_on_antipodal_pair() {
        // k=1 over two antipodal stations collapses the center in every
        // run; the batch must fail with the attempted-run count rather
        // than return a partial result.
        let candidates = vec![
            point("EQ00", 0.0, 0.0, 0.9),
            point("EQ18", 0.0, 180.0, 0.8),
        ];
        let mut config = SelectorConfig::new(1);
        config.n_runs = 5;
        let result = select_stations(&candidates, &config);
        assert!(matches!(
            result,
            Err(SelectorError::AllRunsFailed { attempted: 5 })
        ));
    }

    #[test]
    fn test_stability_accounts_for_every_run() {
        let mut config = SelectorConfig::new(3);
        config.n_runs = 12;
        let result = select_stations(&three_regions(), &config).unwrap();

        let s = &result.stability;
        assert_eq!(s.n_successful_runs + s.n_failed_runs, config.n_runs);
        // No degenerate geometry here, so every run contributes
        assert_eq!(s.n_failed_runs, 0);
        assert_eq!(result.run_inertias.len(), s.n_successful_runs);
    }

    #[test]
    fn test_best_run_has_minimum_inertia() {
        let mut config = SelectorConfig::new(3);
        config.n_runs = 15;
        let result = select_stations(&three_regions(), &config).unwrap();

        for &inertia in &result.run_inertias {
            assert!(result.best_inertia <= inertia);
        }
        assert_eq!(
            result.stability.n_successful_runs,
            result.run_inertias.len()
        );
    }

    #[test]
    fn test_determinism_with_same_seed() {
        let config = SelectorConfig::new(3);
        let a = select_stations(&three_regions(), &config).unwrap();
        let b = select_stations(&three_regions(), &config).unwrap();

        assert_eq!(a.run_inertias, b.run_inertias);
        assert_eq!(a.best_run, b.best_run);
        let names_a: Vec<&str> = a.selected.iter().map(|s| s.station.as_str()).collect();
        let names_b: Vec<&str> = b.selected.iter().map(|s| s.station.as_str()).collect();
        assert_eq!(names_a, names_b);
        for (x, y) in a.assignments.iter().zip(&b.assignments) {
            assert_eq!(x.cluster, y.cluster);
        }
    }

    #[test]
    fn test_different_seed_is_independent() {
        let mut config = SelectorConfig::new(3);
        config.n_runs = 5;
        let a = select_stations(&three_regions(), &config).unwrap();
        config.base_seed = 1234;
        let b = select_stations(&three_regions(), &config).unwrap();

        // Both valid selections of 3; the per-run inertia sequences may
        // differ but the winning configuration on this easy layout should
        // agree in size.
        assert_eq!(a.selected.len(), 3);
        assert_eq!(b.selected.len(), 3);
    }

    #[test]
    fn test_k_equals_n_selects_everyone() {
        let candidates = three_regions();
        let mut config = SelectorConfig::new(candidates.len());
        config.n_runs = 5;
        let result = select_stations(&candidates, &config).unwrap();
        // Every point can sit in its own cluster; no cluster holds two
        // representatives, so at most n come back.
        assert!(result.selected.len() <= candidates.len());
        assert!(!result.selected.is_empty());
    }

    #[test]
    fn test_assignment_coordinates_are_geodetic_degrees() {
        let mut config = SelectorConfig::new(3);
        config.n_runs = 5;
        let result = select_stations(&three_regions(), &config).unwrap();
        let eur1 = result
            .assignments
            .iter()
            .find(|a| a.station == "EUR1")
            .unwrap();
        assert!((eur1.latitude - 50.0).abs() < 1e-6);
        assert!((eur1.longitude - 10.0).abs() < 1e-6);
    }
}
