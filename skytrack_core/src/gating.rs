//! Geometric gating and cluster formation.
//!
//! Builds the gated bipartite graph between predicted track positions and
//! the Cartesian reports of one measurement group, then splits it into
//! connected components. Each component (a *cluster*) is solved
//! independently by the association layer.

use std::collections::BTreeSet;

use nalgebra::{Matrix3, Vector3};

use crate::geometry::mahalanobis;

/// Predicted-position summary of one live track, in track-index order.
///
/// `gate_inv` is the inverse of the track's predicted position covariance.
/// `None` marks a track whose covariance block was singular this group; it
/// contributes no gate edges and receives no assignment.
#[derive(Debug, Clone)]
pub struct TrackProjection {
    pub position: Vector3<f64>,
    pub gate_inv: Option<Matrix3<f64>>,
}

/// A connected component of the gated graph: the tracks and reports that
/// compete for each other. Indices are sorted ascending.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cluster {
    pub tracks: Vec<usize>,
    pub reports: Vec<usize>,
}

/// Compute all gated (track, report) edges.
///
/// An edge exists iff the squared Mahalanobis distance between the track's
/// predicted position and the report is below `threshold`. Edges are
/// emitted in (track, report) index order.
pub fn gate_edges(
    projections: &[TrackProjection],
    reports: &[Vector3<f64>],
    threshold: f64,
) -> Vec<(usize, usize)> {
    let mut edges = Vec::new();
    for (track_index, projection) in projections.iter().enumerate() {
        let Some(gate_inv) = projection.gate_inv else {
            continue;
        };
        for (report_index, report) in reports.iter().enumerate() {
            if mahalanobis(&projection.position, report, &gate_inv) < threshold {
                edges.push((track_index, report_index));
            }
        }
    }
    edges
}

/// Find the connected components of the gated bipartite graph.
///
/// Two edges belong to the same cluster when they share a track or a
/// report, transitively. Clusters come out in ascending discovery order
/// (the order of their first edge), so the output is deterministic for a
/// given edge list. An empty edge list yields no clusters.
pub fn form_clusters(edges: &[(usize, usize)]) -> Vec<Cluster> {
    let mut clusters = Vec::new();
    let mut used = vec![false; edges.len()];

    for start in 0..edges.len() {
        if used[start] {
            continue;
        }
        let mut tracks = BTreeSet::new();
        let mut reports = BTreeSet::new();
        let mut stack = vec![start];
        used[start] = true;

        while let Some(edge_index) = stack.pop() {
            let (track, report) = edges[edge_index];
            tracks.insert(track);
            reports.insert(report);
            for (candidate, &(t, r)) in edges.iter().enumerate() {
                if !used[candidate] && (tracks.contains(&t) || reports.contains(&r)) {
                    used[candidate] = true;
                    stack.push(candidate);
                }
            }
        }

        clusters.push(Cluster {
            tracks: tracks.into_iter().collect(),
            reports: reports.into_iter().collect(),
        });
    }
    clusters
}

#[cfg(test)]
mod tests {
    use super::*;

    fn projection(x: f64, y: f64) -> TrackProjection {
        TrackProjection {
            position: Vector3::new(x, y, 0.0),
            gate_inv: Some(Matrix3::identity()),
        }
    }

    #[test]
    fn test_no_edges_yields_no_clusters() {
        let projections = vec![projection(0.0, 0.0)];
        let reports = vec![Vector3::new(100.0, 100.0, 0.0)];
        let edges = gate_edges(&projections, &reports, 9.21);
        assert!(edges.is_empty());
        assert!(form_clusters(&edges).is_empty());
    }

    #[test]
    fn test_overlapping_gates_form_one_cluster() {
        // Two tracks and two reports all within each other's gates.
        let projections = vec![projection(0.0, 0.0), projection(1.0, 0.0)];
        let reports = vec![Vector3::new(0.5, 0.0, 0.0), Vector3::new(0.6, 0.5, 0.0)];
        let edges = gate_edges(&projections, &reports, 9.21);
        assert_eq!(edges.len(), 4);

        let clusters = form_clusters(&edges);
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].tracks, vec![0, 1]);
        assert_eq!(clusters[0].reports, vec![0, 1]);
    }

    #[test]
    fn test_disjoint_pairs_form_separate_clusters() {
        let projections = vec![projection(0.0, 0.0), projection(1000.0, 0.0)];
        let reports = vec![
            Vector3::new(0.5, 0.0, 0.0),
            Vector3::new(1000.5, 0.0, 0.0),
        ];
        let edges = gate_edges(&projections, &reports, 9.21);
        let clusters = form_clusters(&edges);

        assert_eq!(clusters.len(), 2);
        assert_eq!(clusters[0], Cluster { tracks: vec![0], reports: vec![0] });
        assert_eq!(clusters[1], Cluster { tracks: vec![1], reports: vec![1] });
    }

    #[test]
    fn test_chained_sharing_merges_clusters() {
        // Track 0 gates report 0; track 1 gates reports 0 and 1: one cluster.
        let edges = vec![(0, 0), (1, 0), (1, 1)];
        let clusters = form_clusters(&edges);
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].tracks, vec![0, 1]);
        assert_eq!(clusters[0].reports, vec![0, 1]);
    }

    #[test]
    fn test_singular_gate_contributes_no_edges() {
        let projections = vec![TrackProjection {
            position: Vector3::zeros(),
            gate_inv: None,
        }];
        let reports = vec![Vector3::zeros()];
        assert!(gate_edges(&projections, &reports, 9.21).is_empty());
    }
}
