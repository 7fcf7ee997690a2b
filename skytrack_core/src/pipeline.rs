//! The per-group orchestrator.
//!
//! Drives the full pipeline for each measurement group: timeout sweep,
//! correlation or association, state-conditional filter updates, births for
//! unassigned reports, then the promotion sweep. Emits one [`EventRecord`]
//! per measurement-processing event.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use nalgebra::Vector3;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

use crate::association::{jpda, munkres, AssociationMode};
use crate::config::{ConfigError, TrackerConfig};
use crate::ingest::{check_monotonic, form_groups, IngestError, Measurement};
use crate::lifecycle::{TrackManager, TrackState, TrackSummary};

/// How a measurement-processing event was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EventKind {
    /// Single-measurement group bound by the correlation check
    Single,
    /// Report birthed a new track
    New,
    /// Multi-report group resolved by JPDA
    #[serde(rename = "JPDA")]
    Jpda,
    /// Multi-report group resolved by Munkres
    Munkres,
}

/// One row of the detailed log stream.
#[derive(Debug, Clone, Serialize)]
pub struct EventRecord {
    pub time: f64,
    /// Cartesian position of the processed measurement
    pub measurement: Vector3<f64>,
    /// Track state at ingest (Poss1 for births)
    pub state: TrackState,
    /// Whether the measurement was bound to an existing track
    pub correlated: bool,
    pub track_id: usize,
    /// Filtered track position after the update, absent for births
    pub associated_position: Option<Vector3<f64>>,
    pub kind: EventKind,
    /// JPDA only: clusters formed in this group
    pub clusters_formed: Option<usize>,
    /// JPDA only: hypotheses enumerated in the pair's cluster
    pub hypotheses_generated: Option<usize>,
    /// JPDA only: normalized probability of the selected pair
    pub hypothesis_probability: Option<f64>,
    /// Association modes only: the selected report
    pub best_report: Option<Vector3<f64>>,
}

/// Outcome of a full run over a measurement stream.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub groups_processed: usize,
    pub cancelled: bool,
    pub events: Vec<EventRecord>,
}

#[derive(Debug, Error)]
pub enum TrackerError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Ingest(#[from] IngestError),
}

/// The tracking engine: owns the configuration, the track manager and the
/// timeout clock. Single-threaded; each group is processed to completion
/// before the next begins.
pub struct Tracker {
    config: TrackerConfig,
    manager: TrackManager,
    last_check_time: f64,
    cancel: Arc<AtomicBool>,
}

impl Tracker {
    pub fn new(config: TrackerConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let manager = TrackManager::new(&config);
        Ok(Self {
            config,
            manager,
            last_check_time: 0.0,
            cancel: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    pub fn manager(&self) -> &TrackManager {
        &self.manager
    }

    /// Cooperative cancellation flag, consulted between groups. Setting it
    /// aborts the run cleanly with all state up to that group preserved.
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    /// Immutable snapshots of the live track population.
    pub fn snapshots(&self) -> Vec<TrackSummary> {
        self.manager.summaries()
    }

    /// Process an entire measurement stream.
    ///
    /// Validates time monotonicity, partitions the stream into groups and
    /// processes them in arrival order.
    pub fn run(&mut self, measurements: &[Measurement]) -> Result<RunReport, TrackerError> {
        check_monotonic(measurements)?;
        let groups = form_groups(measurements, self.config.max_time_diff);

        let mut events = Vec::new();
        let mut groups_processed = 0;
        let mut cancelled = false;

        for (group_index, group) in groups.iter().enumerate() {
            if self.cancel.load(Ordering::Relaxed) {
                info!(groups_processed, "run cancelled, partial state preserved");
                cancelled = true;
                break;
            }
            debug!(
                group = group_index + 1,
                size = group.len(),
                "processing measurement group"
            );
            events.extend(self.process_group(group));
            groups_processed += 1;
        }

        info!(
            groups_processed,
            tracks = self.manager.track_count(),
            "stream processed"
        );
        Ok(RunReport {
            groups_processed,
            cancelled,
            events,
        })
    }

    /// Process one measurement group through the full pipeline.
    pub fn process_group(&mut self, group: &[Measurement]) -> Vec<EventRecord> {
        let mut events = Vec::new();
        let Some(first) = group.first() else {
            return events;
        };
        let current_time = first.time;

        if current_time - self.last_check_time >= self.config.check_interval {
            self.manager.prune(current_time, self.config.track_timeout);
            self.last_check_time = current_time;
        }

        if group.len() == 1 {
            self.process_single(&group[0], &mut events);
        } else {
            self.process_reports(group, current_time, &mut events);
        }

        self.manager.promote_all(current_time);
        events
    }

    /// Single-measurement path: bind to the first track passing the
    /// range/doppler correlation check, or birth a new track.
    fn process_single(&mut self, measurement: &Measurement, events: &mut Vec<EventRecord>) {
        match self.manager.correlate_single(measurement) {
            Some(index) => {
                let track = &self.manager.tracks()[index];
                let state = track.current_state;
                let track_id = track.track_id;
                if self.manager.ingest(index, measurement.clone()) {
                    events.push(EventRecord {
                        time: measurement.time,
                        measurement: measurement.position,
                        state,
                        correlated: true,
                        track_id,
                        associated_position: Some(self.manager.tracks()[index].filter.position()),
                        kind: EventKind::Single,
                        clusters_formed: None,
                        hypotheses_generated: None,
                        hypothesis_probability: None,
                        best_report: None,
                    });
                }
            }
            None => {
                let track_id = self.manager.spawn(measurement.clone());
                events.push(birth_event(measurement.position, measurement.time, track_id));
            }
        }
    }

    /// Multi-measurement path: run the configured association algorithm,
    /// write the outcomes back into the selected tracks and birth the rest.
    fn process_reports(
        &mut self,
        group: &[Measurement],
        current_time: f64,
        events: &mut Vec<EventRecord>,
    ) {
        let reports: Vec<Vector3<f64>> = group.iter().map(|m| m.position).collect();
        let doppler = group[0].doppler;
        let projections = self.manager.projections(current_time);

        let mut assigned_tracks: HashSet<usize> = HashSet::new();
        let mut assigned_reports: HashSet<usize> = HashSet::new();

        match self.config.association {
            AssociationMode::Jpda => {
                let outcome = jpda(&projections, &reports, self.config.gate_threshold);
                let clusters_formed = outcome.clusters.len();

                for (cluster_index, &(track_index, report_index)) in
                    outcome.best.iter().enumerate()
                {
                    assigned_tracks.insert(track_index);
                    assigned_reports.insert(report_index);

                    let cluster_hypotheses = &outcome.hypotheses[cluster_index];
                    let probability = cluster_hypotheses
                        .iter()
                        .find(|h| h.track == track_index && h.report == report_index)
                        .map(|h| h.probability);

                    self.ingest_report(
                        track_index,
                        reports[report_index],
                        current_time,
                        doppler,
                        EventKind::Jpda,
                        Some(clusters_formed),
                        Some(cluster_hypotheses.len()),
                        probability,
                        events,
                    );
                }
            }
            AssociationMode::Munkres => {
                for (track_index, report_index) in munkres(&projections, &reports) {
                    assigned_tracks.insert(track_index);
                    assigned_reports.insert(report_index);
                    self.ingest_report(
                        track_index,
                        reports[report_index],
                        current_time,
                        doppler,
                        EventKind::Munkres,
                        None,
                        None,
                        None,
                        events,
                    );
                }
            }
        }

        self.manager.record_misses(&assigned_tracks);

        for (report_index, report) in reports.iter().enumerate() {
            if assigned_reports.contains(&report_index) {
                continue;
            }
            let measurement = Measurement::from_cartesian(*report, current_time, doppler);
            let track_id = self.manager.spawn(measurement);
            events.push(birth_event(*report, current_time, track_id));
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn ingest_report(
        &mut self,
        track_index: usize,
        report: Vector3<f64>,
        current_time: f64,
        doppler: f64,
        kind: EventKind,
        clusters_formed: Option<usize>,
        hypotheses_generated: Option<usize>,
        hypothesis_probability: Option<f64>,
        events: &mut Vec<EventRecord>,
    ) {
        let track = &self.manager.tracks()[track_index];
        let state = track.current_state;
        let track_id = track.track_id;

        let measurement = Measurement::from_cartesian(report, current_time, doppler);
        if self.manager.ingest(track_index, measurement) {
            events.push(EventRecord {
                time: current_time,
                measurement: report,
                state,
                correlated: true,
                track_id,
                associated_position: Some(self.manager.tracks()[track_index].filter.position()),
                kind,
                clusters_formed,
                hypotheses_generated,
                hypothesis_probability,
                best_report: Some(report),
            });
        }
    }
}

fn birth_event(position: Vector3<f64>, time: f64, track_id: usize) -> EventRecord {
    EventRecord {
        time,
        measurement: position,
        state: TrackState::Poss1,
        correlated: false,
        track_id,
        associated_position: None,
        kind: EventKind::New,
        clusters_formed: None,
        hypotheses_generated: None,
        hypothesis_probability: None,
        best_report: None,
    }
}
