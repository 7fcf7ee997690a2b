//! Measurement-to-track association.
//!
//! Two interchangeable solvers over the same inputs (track projections and
//! the group's Cartesian reports):
//!
//! - **JPDA**: per-cluster hypothesis enumeration with normalized
//!   probabilities and a deterministic arg-max selection.
//! - **Munkres**: global cost-minimising assignment over the full
//!   Mahalanobis cost matrix, via the Hungarian algorithm.
//!
//! Reports left unassigned by either solver become track births upstream.

use std::fmt;
use std::str::FromStr;

use nalgebra::Vector3;
use pathfinding::prelude::{kuhn_munkres_min, Matrix};
use serde::{Deserialize, Serialize};

use crate::config::ConfigError;
use crate::gating::{form_clusters, gate_edges, Cluster, TrackProjection};
use crate::geometry::mahalanobis;

/// Fixed-point scale for Hungarian costs; `kuhn_munkres` needs `Ord`
/// weights, so squared Mahalanobis distances are quantised to micro-units.
const COST_SCALE: f64 = 1_000_000.0;

/// Sentinel cost for padded columns and singular-gate rows. Large enough to
/// never be preferred, small enough that potentials cannot overflow.
const PAD_COST: i64 = 1 << 55;

/// Association algorithm selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AssociationMode {
    Jpda,
    Munkres,
}

impl FromStr for AssociationMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "jpda" => Ok(Self::Jpda),
            "munkres" => Ok(Self::Munkres),
            _ => Err(ConfigError::UnknownAssociationMode(s.to_string())),
        }
    }
}

impl fmt::Display for AssociationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Jpda => write!(f, "JPDA"),
            Self::Munkres => write!(f, "Munkres"),
        }
    }
}

/// One (track, report) pairing with its within-cluster probability.
#[derive(Debug, Clone, Serialize)]
pub struct Hypothesis {
    pub track: usize,
    pub report: usize,
    pub probability: f64,
}

/// Full JPDA output for one measurement group.
#[derive(Debug, Clone)]
pub struct JpdaOutcome {
    /// Clusters in discovery order
    pub clusters: Vec<Cluster>,
    /// Selected (track, report) pair per cluster, aligned with `clusters`
    pub best: Vec<(usize, usize)>,
    /// All hypotheses per cluster with normalized probabilities
    pub hypotheses: Vec<Vec<Hypothesis>>,
}

/// Joint Probabilistic Data Association over one group.
///
/// Every (track, report) pair inside a cluster is weighted by
/// `exp(-d²/2)`; weights are normalized within the cluster so each
/// cluster's probabilities sum to one. The arg-max pair is selected, ties
/// broken by lowest track index then lowest report index.
pub fn jpda(
    projections: &[TrackProjection],
    reports: &[Vector3<f64>],
    gate_threshold: f64,
) -> JpdaOutcome {
    let edges = gate_edges(projections, reports, gate_threshold);
    let clusters = form_clusters(&edges);

    let mut best = Vec::with_capacity(clusters.len());
    let mut hypotheses = Vec::with_capacity(clusters.len());

    for cluster in &clusters {
        let mut cluster_hypotheses = Vec::new();
        for &track in &cluster.tracks {
            let Some(gate_inv) = projections[track].gate_inv else {
                continue;
            };
            for &report in &cluster.reports {
                let d_squared =
                    mahalanobis(&projections[track].position, &reports[report], &gate_inv);
                cluster_hypotheses.push(Hypothesis {
                    track,
                    report,
                    probability: (-0.5 * d_squared).exp(),
                });
            }
        }

        let total: f64 = cluster_hypotheses.iter().map(|h| h.probability).sum();
        if total > 0.0 {
            for hypothesis in &mut cluster_hypotheses {
                hypothesis.probability /= total;
            }
        }

        // Hypotheses are enumerated in (track, report) index order, so a
        // strict comparison keeps the lowest-index pair on ties.
        let Some(first) = cluster_hypotheses.first() else {
            continue;
        };
        let mut best_pair = (first.track, first.report);
        let mut best_probability = first.probability;
        for hypothesis in &cluster_hypotheses[1..] {
            if hypothesis.probability > best_probability {
                best_probability = hypothesis.probability;
                best_pair = (hypothesis.track, hypothesis.report);
            }
        }

        best.push(best_pair);
        hypotheses.push(cluster_hypotheses);
    }

    JpdaOutcome {
        clusters,
        best,
        hypotheses,
    }
}

/// Munkres (Hungarian) assignment over all live tracks and all reports.
///
/// No gating beyond the cost itself. When there are more tracks than
/// reports the matrix is padded with sentinel columns; padded assignments
/// and singular-gate rows are filtered from the result, so every returned
/// pair is a genuine (track, report) match.
pub fn munkres(
    projections: &[TrackProjection],
    reports: &[Vector3<f64>],
) -> Vec<(usize, usize)> {
    let n_tracks = projections.len();
    let n_reports = reports.len();
    if n_tracks == 0 || n_reports == 0 {
        return Vec::new();
    }

    // kuhn_munkres requires rows <= columns.
    let width = n_reports.max(n_tracks);
    let costs = Matrix::from_fn(n_tracks, width, |(row, column)| {
        if column >= n_reports {
            return PAD_COST;
        }
        match projections[row].gate_inv {
            Some(gate_inv) => scale_cost(mahalanobis(
                &projections[row].position,
                &reports[column],
                &gate_inv,
            )),
            None => PAD_COST,
        }
    });

    let (_total, assignment) = kuhn_munkres_min(&costs);
    assignment
        .into_iter()
        .enumerate()
        .filter(|&(row, column)| column < n_reports && costs[(row, column)] < PAD_COST)
        .collect()
}

fn scale_cost(d_squared: f64) -> i64 {
    if !d_squared.is_finite() {
        return PAD_COST;
    }
    ((d_squared * COST_SCALE).round() as i64).clamp(0, PAD_COST - 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::Matrix3;

    fn projection(x: f64, y: f64) -> TrackProjection {
        TrackProjection {
            position: Vector3::new(x, y, 0.0),
            gate_inv: Some(Matrix3::identity()),
        }
    }

    #[test]
    fn test_mode_parsing() {
        assert_eq!("JPDA".parse::<AssociationMode>().unwrap(), AssociationMode::Jpda);
        assert_eq!("munkres".parse::<AssociationMode>().unwrap(), AssociationMode::Munkres);
        assert!("gnn".parse::<AssociationMode>().is_err());
    }

    #[test]
    fn test_jpda_two_by_two_cluster() {
        // Two tracks with overlapping gates and two reports: one (2, 2)
        // cluster, four hypotheses, probabilities summing to one.
        let projections = vec![projection(0.0, 0.0), projection(1.0, 0.0)];
        let reports = vec![Vector3::new(0.1, 0.0, 0.0), Vector3::new(0.9, 0.0, 0.0)];

        let outcome = jpda(&projections, &reports, 9.21);

        assert_eq!(outcome.clusters.len(), 1);
        assert_eq!(outcome.clusters[0].tracks.len(), 2);
        assert_eq!(outcome.clusters[0].reports.len(), 2);
        assert_eq!(outcome.hypotheses[0].len(), 4);

        let sum: f64 = outcome.hypotheses[0].iter().map(|h| h.probability).sum();
        assert_relative_eq!(sum, 1.0, epsilon = 1e-9);

        // (track 0, report 0) is the closest pair and must win.
        assert_eq!(outcome.best[0], (0, 0));
    }

    #[test]
    fn test_jpda_tie_breaks_by_lowest_indices() {
        // Perfectly symmetric geometry: every pair has the same weight.
        let projections = vec![projection(-1.0, 0.0), projection(1.0, 0.0)];
        let reports = vec![Vector3::new(-1.0, 1.0, 0.0), Vector3::new(1.0, 1.0, 0.0)];

        let outcome = jpda(&projections, &reports, 9.21);
        assert_eq!(outcome.clusters.len(), 1);
        assert_eq!(outcome.best[0], (0, 0));
    }

    #[test]
    fn test_jpda_separate_clusters_assign_independently() {
        let projections = vec![projection(0.0, 0.0), projection(500.0, 0.0)];
        let reports = vec![
            Vector3::new(0.2, 0.0, 0.0),
            Vector3::new(500.2, 0.0, 0.0),
        ];

        let outcome = jpda(&projections, &reports, 9.21);
        assert_eq!(outcome.clusters.len(), 2);
        assert_eq!(outcome.best, vec![(0, 0), (1, 1)]);

        for cluster_hypotheses in &outcome.hypotheses {
            let sum: f64 = cluster_hypotheses.iter().map(|h| h.probability).sum();
            assert_relative_eq!(sum, 1.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_munkres_diagonal_optimum() {
        // Three tracks sitting on three reports: the diagonal is optimal.
        let projections = vec![
            projection(0.0, 0.0),
            projection(10.0, 0.0),
            projection(20.0, 0.0),
        ];
        let reports = vec![
            Vector3::new(0.1, 0.0, 0.0),
            Vector3::new(10.1, 0.0, 0.0),
            Vector3::new(20.1, 0.0, 0.0),
        ];

        let pairs = munkres(&projections, &reports);
        assert_eq!(pairs, vec![(0, 0), (1, 1), (2, 2)]);
    }

    #[test]
    fn test_munkres_beats_brute_force_on_crossed_costs() {
        // Geometry where the greedy row-wise choice is suboptimal.
        let projections = vec![projection(0.0, 0.0), projection(2.0, 0.0)];
        let reports = vec![Vector3::new(1.2, 0.0, 0.0), Vector3::new(0.0, 0.0, 0.0)];

        let pairs = munkres(&projections, &reports);
        let cost = |t: usize, r: usize| {
            mahalanobis(
                &projections[t].position,
                &reports[r],
                &Matrix3::identity(),
            )
        };
        let total: f64 = pairs.iter().map(|&(t, r)| cost(t, r)).sum();

        // Brute force over both complete assignments.
        let alternatives = [cost(0, 0) + cost(1, 1), cost(0, 1) + cost(1, 0)];
        let optimum = alternatives.iter().cloned().fold(f64::INFINITY, f64::min);
        assert_relative_eq!(total, optimum, epsilon = 1e-6);
    }

    #[test]
    fn test_munkres_more_reports_than_tracks() {
        let projections = vec![projection(0.0, 0.0)];
        let reports = vec![
            Vector3::new(50.0, 0.0, 0.0),
            Vector3::new(0.5, 0.0, 0.0),
            Vector3::new(100.0, 0.0, 0.0),
        ];

        let pairs = munkres(&projections, &reports);
        assert_eq!(pairs, vec![(0, 1)]);
    }

    #[test]
    fn test_munkres_more_tracks_than_reports_filters_padding() {
        let projections = vec![
            projection(0.0, 0.0),
            projection(10.0, 0.0),
            projection(20.0, 0.0),
        ];
        let reports = vec![Vector3::new(10.1, 0.0, 0.0)];

        let pairs = munkres(&projections, &reports);
        assert_eq!(pairs, vec![(1, 0)]);
    }

    #[test]
    fn test_munkres_empty_inputs() {
        assert!(munkres(&[], &[Vector3::zeros()]).is_empty());
        assert!(munkres(&[projection(0.0, 0.0)], &[]).is_empty());
    }

    #[test]
    fn test_munkres_skips_singular_gate_rows() {
        let projections = vec![
            TrackProjection {
                position: Vector3::zeros(),
                gate_inv: None,
            },
            projection(5.0, 0.0),
        ];
        let reports = vec![Vector3::new(5.1, 0.0, 0.0)];

        let pairs = munkres(&projections, &reports);
        assert_eq!(pairs, vec![(1, 0)]);
    }
}
