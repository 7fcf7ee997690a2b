//! Skytrack Core - Multi-Target Radar Tracking Engine
//!
//! An online pipeline that ingests time-stamped spherical radar detections
//! and maintains a population of kinematic tracks:
//!
//! 1. **Ingestion**: detections are bundled into measurement groups by
//!    arrival time (50 ms window).
//! 2. **Gating**: a chi-squared Mahalanobis gate builds the bipartite
//!    track/report graph; its connected components are the clusters.
//! 3. **Association**: JPDA hypothesis weighting per cluster, or a global
//!    Munkres (Hungarian) assignment.
//! 4. **Estimation**: per-track Kalman filters (CV or CA model) with a
//!    state-conditional initialization policy.
//! 5. **Lifecycle**: births, the Poss/Tentative/Firm promotion ladder,
//!    timeout deletion and track ID recycling.
//!
//! The engine is single-threaded and synchronous: each group is processed
//! to completion before the next begins, and external consumers only ever
//! see immutable snapshots taken at group boundaries.

pub mod association;
pub mod config;
pub mod filter;
pub mod gating;
pub mod geometry;
pub mod ingest;
pub mod lifecycle;
pub mod pipeline;

// Re-export key types for convenience
pub use association::{jpda, munkres, AssociationMode, Hypothesis, JpdaOutcome};
pub use config::{ConfigError, TrackerConfig};
pub use filter::{FilterError, FilterModel, FilterState, KalmanFilter};
pub use gating::{form_clusters, gate_edges, Cluster, TrackProjection};
pub use ingest::{check_monotonic, form_groups, IngestError, Measurement};
pub use lifecycle::{
    SlotStatus, Track, TrackManager, TrackMode, TrackSlot, TrackState, TrackSummary,
};
pub use pipeline::{EventKind, EventRecord, RunReport, Tracker, TrackerError};
