//! Track lifecycle management.
//!
//! Owns the track population and the slot registry: births, the quality
//! progression ladder, hit/miss accounting, timeout pruning and ID
//! recycling. Each track carries its own Kalman filter; the association
//! layer only ever sees read-only projections.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::str::FromStr;

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::{ConfigError, TrackerConfig};
use crate::filter::{FilterModel, FilterState, KalmanFilter};
use crate::gating::TrackProjection;
use crate::ingest::Measurement;

/// Track quality tier along the promotion ladder.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum TrackState {
    Poss1,
    Poss2,
    Tentative1,
    Tentative2,
    Tentative3,
    Tentative4,
    Firm,
}

impl TrackState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Poss1 => "Poss1",
            Self::Poss2 => "Poss2",
            Self::Tentative1 => "Tentative1",
            Self::Tentative2 => "Tentative2",
            Self::Tentative3 => "Tentative3",
            Self::Tentative4 => "Tentative4",
            Self::Firm => "Firm",
        }
    }
}

impl fmt::Display for TrackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Progression ladder selector. The numeric value doubles as the hit count
/// that promotes a track straight to Firm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrackMode {
    Three,
    Five,
    Seven,
}

impl TrackMode {
    /// The quality ladder for this mode, in promotion order.
    pub fn ladder(&self) -> &'static [TrackState] {
        use TrackState::*;
        match self {
            Self::Three => &[Poss1, Tentative1, Firm],
            Self::Five => &[Poss1, Poss2, Tentative1, Tentative2, Firm],
            Self::Seven => &[
                Poss1, Poss2, Tentative1, Tentative2, Tentative3, Tentative4, Firm,
            ],
        }
    }

    /// Hit count that promotes a track directly to Firm.
    pub fn firm_threshold(&self) -> usize {
        match self {
            Self::Three => 3,
            Self::Five => 5,
            Self::Seven => 7,
        }
    }
}

impl FromStr for TrackMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "3" => Ok(Self::Three),
            "5" => Ok(Self::Five),
            "7" => Ok(Self::Seven),
            _ => Err(ConfigError::UnknownTrackMode(s.to_string())),
        }
    }
}

/// Occupancy of one entry in the track ID registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SlotStatus {
    Free,
    Occupied,
}

/// Registry entry enabling ID recycling: a freed slot's ID is handed to the
/// next birth before any new ID is minted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackSlot {
    pub id: usize,
    pub status: SlotStatus,
}

/// One tracked target.
#[derive(Debug, Clone)]
pub struct Track {
    /// Stable, recyclable identifier (slot index)
    pub track_id: usize,
    /// Current quality tier
    pub current_state: TrackState,
    /// Ordered (measurement, state-at-ingest) history
    pub measurements: Vec<(Measurement, TrackState)>,
    /// Filter snapshots, aligned 1-to-1 with `measurements`
    pub history: Vec<FilterState>,
    /// Per-track estimator
    pub filter: KalmanFilter,
    /// Number of measurements absorbed
    pub hit_count: usize,
    /// Groups in which association passed the track over
    pub miss_count: usize,
    /// First entry time per quality tier
    pub state_transition_times: BTreeMap<TrackState, f64>,
}

impl Track {
    fn new(track_id: usize, measurement: Measurement, filter_model: FilterModel, plant_noise: f64) -> Self {
        let mut filter = KalmanFilter::new(filter_model, plant_noise);
        filter.initialize(&measurement.position, &Vector3::zeros());

        let mut state_transition_times = BTreeMap::new();
        state_transition_times.insert(TrackState::Poss1, measurement.time);

        let history = vec![filter.snapshot()];
        Self {
            track_id,
            current_state: TrackState::Poss1,
            measurements: vec![(measurement, TrackState::Poss1)],
            history,
            filter,
            hit_count: 1,
            miss_count: 0,
            state_transition_times,
        }
    }

    /// The most recent measurement absorbed by this track.
    pub fn last_measurement(&self) -> &Measurement {
        let (measurement, _) = self
            .measurements
            .last()
            .expect("a track always holds its birth measurement");
        measurement
    }

    /// Non-mutating position extrapolation to `at_time`, used for gating.
    pub fn predicted_position(&self, at_time: f64) -> Vector3<f64> {
        let dt = (at_time - self.last_measurement().time).max(0.0);
        let mut position = self.filter.position() + self.filter.velocity() * dt;
        if let Some(acceleration) = self.filter.acceleration() {
            position += acceleration * (0.5 * dt * dt);
        }
        position
    }
}

/// Summary snapshot of one track, safe to hand to external consumers.
#[derive(Debug, Clone, Serialize)]
pub struct TrackSummary {
    pub track_id: usize,
    pub current_state: TrackState,
    /// First entry time per quality tier
    pub state_times: BTreeMap<TrackState, f64>,
    /// Up to the first three measurements ingested in each tier
    pub state_measurements: BTreeMap<TrackState, Vec<Measurement>>,
    pub slot_status: SlotStatus,
    /// Full filter snapshot history (Sf/Sp/Pf/Pp per ingest)
    pub history: Vec<FilterState>,
}

/// Owner of the track population and the slot registry.
#[derive(Debug)]
pub struct TrackManager {
    tracks: Vec<Track>,
    slots: Vec<TrackSlot>,
    mode: TrackMode,
    filter_model: FilterModel,
    plant_noise: f64,
    doppler_threshold: f64,
    range_threshold: f64,
}

impl TrackManager {
    pub fn new(config: &TrackerConfig) -> Self {
        Self {
            tracks: Vec::new(),
            slots: Vec::new(),
            mode: config.track_mode,
            filter_model: config.filter_model,
            plant_noise: config.plant_noise,
            doppler_threshold: config.doppler_threshold,
            range_threshold: config.range_threshold,
        }
    }

    /// Live tracks, in track-index order.
    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn track_count(&self) -> usize {
        self.tracks.len()
    }

    /// The slot registry (one entry per ID ever minted).
    pub fn slots(&self) -> &[TrackSlot] {
        &self.slots
    }

    /// Birth a new track from an unassociated report.
    ///
    /// Reuses the lowest-index free slot if any, otherwise appends one.
    /// Returns the new track's ID.
    pub fn spawn(&mut self, measurement: Measurement) -> usize {
        let track_id = match self.slots.iter().position(|s| s.status == SlotStatus::Free) {
            Some(index) => {
                self.slots[index].status = SlotStatus::Occupied;
                index
            }
            None => {
                let id = self.slots.len();
                self.slots.push(TrackSlot {
                    id,
                    status: SlotStatus::Occupied,
                });
                id
            }
        };

        debug!(track_id, time = measurement.time, "track born");
        self.tracks
            .push(Track::new(track_id, measurement, self.filter_model, self.plant_noise));
        track_id
    }

    /// Correlation check for single-measurement groups: the first track (in
    /// index order) whose last measurement is within both the range and the
    /// doppler thresholds wins.
    pub fn correlate_single(&self, measurement: &Measurement) -> Option<usize> {
        self.tracks.iter().position(|track| {
            let last = track.last_measurement();
            (measurement.range - last.range).abs() < self.range_threshold
                && (measurement.doppler - last.doppler).abs() < self.doppler_threshold
        })
    }

    /// Absorb a measurement into the track at `index` with the
    /// state-conditional filter policy:
    ///
    /// - `Poss*`: re-initialize at the reported position, zero velocity.
    /// - non-Firm `Tentative*`: position from the report, velocity from the
    ///   finite difference with the prior measurement.
    /// - `Firm`: predict over the elapsed time, then update.
    ///
    /// Returns `false` when a numerical fault forced the update to be
    /// skipped; the track keeps its previous state and hit count.
    pub fn ingest(&mut self, index: usize, measurement: Measurement) -> bool {
        let track = &mut self.tracks[index];
        let state = track.current_state;
        let position = measurement.position;

        match state {
            TrackState::Poss1 | TrackState::Poss2 => {
                track.filter.initialize(&position, &Vector3::zeros());
            }
            TrackState::Tentative1
            | TrackState::Tentative2
            | TrackState::Tentative3
            | TrackState::Tentative4 => {
                let last = track.last_measurement();
                let dt = measurement.time - last.time;
                let velocity = if dt > 0.0 {
                    (position - last.position) / dt
                } else {
                    debug!(
                        track_id = track.track_id,
                        "zero time step, falling back to zero velocity"
                    );
                    Vector3::zeros()
                };
                track.filter.initialize(&position, &velocity);
            }
            TrackState::Firm => {
                let dt = measurement.time - track.last_measurement().time;
                track.filter.predict(dt);
                if let Err(err) = track.filter.update(&position) {
                    warn!(
                        track_id = track.track_id,
                        error = %err,
                        "skipping measurement update"
                    );
                    return false;
                }
            }
        }

        track.measurements.push((measurement, state));
        track.history.push(track.filter.snapshot());
        track.hit_count += 1;
        true
    }

    /// Charge a miss to every live track not in `assigned` (called once per
    /// multi-report group).
    pub fn record_misses(&mut self, assigned: &HashSet<usize>) {
        for (index, track) in self.tracks.iter_mut().enumerate() {
            if !assigned.contains(&index) {
                track.miss_count += 1;
            }
        }
    }

    /// Promotion sweep, run after every group.
    ///
    /// A track whose hit count reaches the firm threshold jumps straight to
    /// Firm; otherwise it climbs at most one rung when its hit count covers
    /// the next index. States never regress; transition times record the
    /// first entry only.
    pub fn promote_all(&mut self, now: f64) {
        let ladder = self.mode.ladder();
        let firm_threshold = self.mode.firm_threshold();

        for track in &mut self.tracks {
            let Some(index) = ladder.iter().position(|s| *s == track.current_state) else {
                continue;
            };
            if track.hit_count >= firm_threshold && track.current_state != TrackState::Firm {
                track.current_state = TrackState::Firm;
                track
                    .state_transition_times
                    .entry(TrackState::Firm)
                    .or_insert(now);
            } else if index + 1 < ladder.len() && track.hit_count >= index + 1 {
                let next = ladder[index + 1];
                track.current_state = next;
                track.state_transition_times.entry(next).or_insert(now);
            }
        }
    }

    /// Remove every track whose last measurement is older than `timeout`,
    /// freeing its slot. Iterates in descending index order so surviving
    /// indices stay valid during the sweep. Returns the freed track IDs.
    pub fn prune(&mut self, now: f64, timeout: f64) -> Vec<usize> {
        let mut removed = Vec::new();
        for index in (0..self.tracks.len()).rev() {
            if now - self.tracks[index].last_measurement().time > timeout {
                let track = self.tracks.remove(index);
                if let Some(slot) = self.slots.get_mut(track.track_id) {
                    slot.status = SlotStatus::Free;
                }
                info!(track_id = track.track_id, "removing track due to timeout");
                removed.push(track.track_id);
            }
        }
        removed
    }

    /// Predicted-position summaries for the association layer, in
    /// track-index order. Tracks with a singular gate covariance are
    /// flagged and contribute no associations this group.
    pub fn projections(&self, at_time: f64) -> Vec<TrackProjection> {
        self.tracks
            .iter()
            .map(|track| {
                let gate_inv = track.filter.position_gate_inverse();
                if gate_inv.is_none() {
                    warn!(
                        track_id = track.track_id,
                        "singular gate covariance, track skipped for this group"
                    );
                }
                TrackProjection {
                    position: track.predicted_position(at_time),
                    gate_inv,
                }
            })
            .collect()
    }

    /// Immutable summary snapshots of the live population.
    pub fn summaries(&self) -> Vec<TrackSummary> {
        let ladder = self.mode.ladder();
        self.tracks
            .iter()
            .map(|track| {
                let mut state_measurements = BTreeMap::new();
                for &state in ladder {
                    let in_state: Vec<Measurement> = track
                        .measurements
                        .iter()
                        .filter(|(_, s)| *s == state)
                        .take(3)
                        .map(|(m, _)| m.clone())
                        .collect();
                    if !in_state.is_empty() {
                        state_measurements.insert(state, in_state);
                    }
                }
                let slot_status = self
                    .slots
                    .get(track.track_id)
                    .map(|slot| slot.status)
                    .unwrap_or(SlotStatus::Occupied);
                TrackSummary {
                    track_id: track.track_id,
                    current_state: track.current_state,
                    state_times: track.state_transition_times.clone(),
                    state_measurements,
                    slot_status,
                    history: track.history.clone(),
                }
            })
            .collect()
    }
}
