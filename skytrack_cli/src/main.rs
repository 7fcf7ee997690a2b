//! Skytrack CLI
//!
//! Reads a radar measurement CSV, drives the tracking engine over it and
//! writes the detailed event log plus the end-of-run track summary.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use serde::{Deserialize, Serialize};
use skytrack_core::{
    AssociationMode, EventKind, EventRecord, FilterModel, Measurement, SlotStatus, Tracker,
    TrackerConfig, TrackMode, TrackSummary,
};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

/// Multi-target radar tracking over a measurement CSV
#[derive(Parser, Debug)]
#[command(name = "skytrack")]
#[command(about = "Run the radar tracking engine over a measurement CSV", long_about = None)]
struct Args {
    /// Input CSV with a header row and columns MR, MA, ME, MT, MD
    input: PathBuf,

    /// Track initiation ladder: 3, 5 or 7
    #[arg(short = 'm', long, default_value = "3")]
    track_mode: String,

    /// Kalman filter model (CV or CA)
    #[arg(short, long, default_value = "CV")]
    filter: String,

    /// Association algorithm (JPDA or Munkres)
    #[arg(short, long, default_value = "JPDA")]
    association: String,

    /// Detailed per-event log output
    #[arg(long, default_value = "detailed_log.csv")]
    log: PathBuf,

    /// Track summary output
    #[arg(long, default_value = "track_summary.csv")]
    summary: PathBuf,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

/// One input row. Field names match the sensor's CSV header.
#[derive(Debug, Deserialize)]
struct InputRow {
    #[serde(rename = "MR")]
    range: f64,
    #[serde(rename = "MA")]
    azimuth_deg: f64,
    #[serde(rename = "ME")]
    elevation_deg: f64,
    #[serde(rename = "MT")]
    time: f64,
    #[serde(rename = "MD")]
    doppler: f64,
}

/// One row of `detailed_log.csv`.
#[derive(Debug, Serialize)]
struct LogRow {
    #[serde(rename = "Time")]
    time: f64,
    #[serde(rename = "Measurement X")]
    measurement_x: f64,
    #[serde(rename = "Measurement Y")]
    measurement_y: f64,
    #[serde(rename = "Measurement Z")]
    measurement_z: f64,
    #[serde(rename = "Current State")]
    current_state: String,
    #[serde(rename = "Correlation Output")]
    correlation_output: &'static str,
    #[serde(rename = "Associated Track ID")]
    track_id: usize,
    #[serde(rename = "Associated Position X")]
    associated_x: Option<f64>,
    #[serde(rename = "Associated Position Y")]
    associated_y: Option<f64>,
    #[serde(rename = "Associated Position Z")]
    associated_z: Option<f64>,
    #[serde(rename = "Association Type")]
    association_type: &'static str,
    #[serde(rename = "Clusters Formed")]
    clusters_formed: Option<usize>,
    #[serde(rename = "Hypotheses Generated")]
    hypotheses_generated: Option<usize>,
    #[serde(rename = "Probability of Hypothesis")]
    hypothesis_probability: Option<f64>,
    #[serde(rename = "Best Report Selected")]
    best_report: Option<String>,
}

impl From<&EventRecord> for LogRow {
    fn from(event: &EventRecord) -> Self {
        Self {
            time: event.time,
            measurement_x: event.measurement.x,
            measurement_y: event.measurement.y,
            measurement_z: event.measurement.z,
            current_state: event.state.to_string(),
            correlation_output: if event.correlated { "Yes" } else { "No" },
            track_id: event.track_id,
            associated_x: event.associated_position.map(|p| p.x),
            associated_y: event.associated_position.map(|p| p.y),
            associated_z: event.associated_position.map(|p| p.z),
            association_type: match event.kind {
                EventKind::Single => "Single",
                EventKind::New => "New",
                EventKind::Jpda => "JPDA",
                EventKind::Munkres => "Munkres",
            },
            clusters_formed: event.clusters_formed,
            hypotheses_generated: event.hypotheses_generated,
            hypothesis_probability: event.hypothesis_probability,
            best_report: event
                .best_report
                .map(|r| format!("({:.3}, {:.3}, {:.3})", r.x, r.y, r.z)),
        }
    }
}

/// One row of `track_summary.csv`. Nested histories are serialized as JSON
/// cells.
#[derive(Debug, Serialize)]
struct SummaryRow {
    #[serde(rename = "Track ID")]
    track_id: usize,
    #[serde(rename = "Current State")]
    current_state: String,
    #[serde(rename = "State Times")]
    state_times: String,
    #[serde(rename = "State Measurements")]
    state_measurements: String,
    #[serde(rename = "Track Status")]
    track_status: String,
    #[serde(rename = "SF")]
    sf: String,
    #[serde(rename = "SP")]
    sp: String,
    #[serde(rename = "PF")]
    pf: String,
    #[serde(rename = "PP")]
    pp: String,
}

impl SummaryRow {
    fn try_from_summary(summary: &TrackSummary) -> Result<Self> {
        Ok(Self {
            track_id: summary.track_id,
            current_state: summary.current_state.to_string(),
            state_times: serde_json::to_string(&summary.state_times)?,
            state_measurements: serde_json::to_string(&summary.state_measurements)?,
            track_status: match summary.slot_status {
                SlotStatus::Free => "free".to_string(),
                SlotStatus::Occupied => "occupied".to_string(),
            },
            sf: serde_json::to_string(
                &summary.history.iter().map(|h| &h.sf).collect::<Vec<_>>(),
            )?,
            sp: serde_json::to_string(
                &summary.history.iter().map(|h| &h.sp).collect::<Vec<_>>(),
            )?,
            pf: serde_json::to_string(
                &summary.history.iter().map(|h| &h.pf).collect::<Vec<_>>(),
            )?,
            pp: serde_json::to_string(
                &summary.history.iter().map(|h| &h.pp).collect::<Vec<_>>(),
            )?,
        })
    }
}

/// Read the measurement stream. Malformed rows fail fast with their record
/// index; monotonicity is enforced by the engine before processing.
fn read_measurements(path: &PathBuf) -> Result<Vec<Measurement>> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("cannot open input file {}", path.display()))?;

    let mut measurements = Vec::new();
    for (index, row) in reader.deserialize::<InputRow>().enumerate() {
        let row = row.with_context(|| format!("malformed measurement at record {}", index + 1))?;
        measurements.push(Measurement::from_spherical(
            row.range,
            row.azimuth_deg,
            row.elevation_deg,
            row.time,
            row.doppler,
        ));
    }
    Ok(measurements)
}

fn write_log(path: &PathBuf, events: &[EventRecord]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("cannot create log file {}", path.display()))?;
    for event in events {
        writer.serialize(LogRow::from(event))?;
    }
    writer.flush()?;
    Ok(())
}

fn write_summary(path: &PathBuf, summaries: &[TrackSummary]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("cannot create summary file {}", path.display()))?;
    for summary in summaries {
        writer.serialize(SummaryRow::try_from_summary(summary)?)?;
    }
    writer.flush()?;
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();

    let level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set tracing subscriber")?;

    let config = TrackerConfig {
        track_mode: args.track_mode.parse::<TrackMode>()?,
        filter_model: args.filter.parse::<FilterModel>()?,
        association: args.association.parse::<AssociationMode>()?,
        ..Default::default()
    };
    info!(
        input = %args.input.display(),
        track_mode = %args.track_mode,
        filter = %config.filter_model,
        association = %config.association,
        "starting run"
    );

    let measurements = read_measurements(&args.input)?;
    info!(measurements = measurements.len(), "measurement stream loaded");

    let mut tracker = Tracker::new(config)?;
    let report = tracker.run(&measurements)?;
    let summaries = tracker.snapshots();

    write_log(&args.log, &report.events)?;
    write_summary(&args.summary, &summaries)?;

    info!(
        groups = report.groups_processed,
        events = report.events.len(),
        tracks = summaries.len(),
        log = %args.log.display(),
        summary = %args.summary.display(),
        "run complete"
    );
    Ok(())
}
