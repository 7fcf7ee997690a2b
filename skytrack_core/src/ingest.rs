//! Measurement ingestion and grouping.
//!
//! Radar detections arrive as time-stamped spherical reports. This module
//! holds the immutable [`Measurement`] value and the single-pass partition
//! that bundles temporally adjacent detections into measurement groups.

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::geometry::{cart2sph, sph2cart};

/// Errors raised while validating the input stream.
///
/// Policy: the engine fails fast before processing rather than skipping bad
/// records, so a partial run never silently drops input.
#[derive(Debug, Clone, Error)]
pub enum IngestError {
    #[error("non-monotonic time at record {index}: {time} after {previous}")]
    NonMonotonicTime {
        index: usize,
        time: f64,
        previous: f64,
    },
}

/// A single radar detection with its derived Cartesian position.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Measurement {
    /// Range in meters
    pub range: f64,
    /// Azimuth in degrees
    pub azimuth_deg: f64,
    /// Elevation in degrees
    pub elevation_deg: f64,
    /// Detection time in seconds
    pub time: f64,
    /// Doppler reading
    pub doppler: f64,
    /// Cartesian position derived from the spherical components
    pub position: Vector3<f64>,
}

impl Measurement {
    /// Build a measurement from the sensor's spherical report.
    pub fn from_spherical(
        range: f64,
        azimuth_deg: f64,
        elevation_deg: f64,
        time: f64,
        doppler: f64,
    ) -> Self {
        Self {
            range,
            azimuth_deg,
            elevation_deg,
            time,
            doppler,
            position: sph2cart(azimuth_deg, elevation_deg, range),
        }
    }

    /// Build a measurement from a Cartesian report, recovering the spherical
    /// components. Used when an association outcome is written back into a
    /// track history.
    pub fn from_cartesian(position: Vector3<f64>, time: f64, doppler: f64) -> Self {
        let (azimuth_deg, elevation_deg, range) = cart2sph(&position);
        Self {
            range,
            azimuth_deg,
            elevation_deg,
            time,
            doppler,
            position,
        }
    }
}

/// Verify that measurement times never decrease. Returns the offending
/// record index on failure.
pub fn check_monotonic(measurements: &[Measurement]) -> Result<(), IngestError> {
    for (index, pair) in measurements.windows(2).enumerate() {
        if pair[1].time < pair[0].time {
            return Err(IngestError::NonMonotonicTime {
                index: index + 1,
                time: pair[1].time,
                previous: pair[0].time,
            });
        }
    }
    Ok(())
}

/// Partition arrival-ordered measurements into groups.
///
/// A measurement joins the open group iff its time is within
/// `max_time_diff` of the group's first timestamp; otherwise the group
/// closes and a new one opens at that measurement. The partition is
/// disjoint, order-preserving and covers the whole input.
pub fn form_groups(measurements: &[Measurement], max_time_diff: f64) -> Vec<Vec<Measurement>> {
    let mut groups = Vec::new();
    let mut current: Vec<Measurement> = Vec::new();
    let mut base_time = match measurements.first() {
        Some(first) => first.time,
        None => return groups,
    };

    for measurement in measurements {
        if measurement.time - base_time <= max_time_diff {
            current.push(measurement.clone());
        } else {
            groups.push(std::mem::take(&mut current));
            base_time = measurement.time;
            current.push(measurement.clone());
        }
    }

    if !current.is_empty() {
        groups.push(current);
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn at(time: f64) -> Measurement {
        Measurement::from_spherical(1000.0, 45.0, 10.0, time, 5.0)
    }

    #[test]
    fn test_cartesian_derivation_round_trips() {
        let m = at(0.0);
        let back = Measurement::from_cartesian(m.position, m.time, m.doppler);
        assert_relative_eq!(back.range, m.range, epsilon = 1e-9);
        assert_relative_eq!(back.azimuth_deg, m.azimuth_deg, epsilon = 1e-9);
        assert_relative_eq!(back.elevation_deg, m.elevation_deg, epsilon = 1e-9);
    }

    #[test]
    fn test_groups_split_on_window_boundary() {
        let measurements = vec![at(0.000), at(0.020), at(0.050), at(0.051), at(0.120)];
        let groups = form_groups(&measurements, 0.050);

        // 0.050 is within the window of 0.000 (inclusive); 0.051 opens a new
        // group whose window then excludes 0.120.
        assert_eq!(groups.len(), 3);
        assert_eq!(groups[0].len(), 3);
        assert_eq!(groups[1].len(), 1);
        assert_eq!(groups[2].len(), 1);
    }

    #[test]
    fn test_groups_cover_input_in_order() {
        let times = [0.0, 0.01, 0.2, 0.21, 0.22, 0.5];
        let measurements: Vec<Measurement> = times.iter().map(|&t| at(t)).collect();
        let groups = form_groups(&measurements, 0.050);

        let flattened: Vec<f64> = groups.iter().flatten().map(|m| m.time).collect();
        assert_eq!(flattened, times);

        for group in &groups {
            let span = group.last().unwrap().time - group[0].time;
            assert!(span <= 0.050);
        }
    }

    #[test]
    fn test_single_group_when_all_adjacent() {
        let measurements = vec![at(0.0), at(0.01), at(0.02)];
        let groups = form_groups(&measurements, 0.050);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].len(), 3);
    }

    #[test]
    fn test_empty_input_yields_no_groups() {
        assert!(form_groups(&[], 0.050).is_empty());
    }

    #[test]
    fn test_monotonic_check_reports_offending_index() {
        let measurements = vec![at(0.0), at(0.1), at(0.05)];
        let err = check_monotonic(&measurements).unwrap_err();
        match err {
            IngestError::NonMonotonicTime { index, .. } => assert_eq!(index, 2),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_monotonic_check_allows_equal_times() {
        let measurements = vec![at(0.0), at(0.0), at(0.1)];
        assert!(check_monotonic(&measurements).is_ok());
    }
}
