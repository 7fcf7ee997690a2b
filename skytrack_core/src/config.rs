//! Engine configuration.
//!
//! All tunables live in [`TrackerConfig`]; selector enums (`FilterModel`,
//! `TrackMode`, `AssociationMode`) parse from their CLI spellings and reject
//! unknown values before any measurement is read.

use thiserror::Error;

use crate::association::AssociationMode;
use crate::filter::FilterModel;
use crate::lifecycle::TrackMode;

/// Configuration errors. All of these are fatal before the stream opens.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    #[error("unknown filter model '{0}' (expected CV or CA)")]
    UnknownFilterModel(String),

    #[error("unknown association mode '{0}' (expected JPDA or Munkres)")]
    UnknownAssociationMode(String),

    #[error("unknown track mode '{0}' (expected 3, 5 or 7)")]
    UnknownTrackMode(String),

    #[error("configuration constant {name} must be positive and finite, got {value}")]
    InvalidConstant { name: &'static str, value: f64 },
}

/// Runtime configuration for the tracking engine.
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// Track quality ladder selector (3, 5 or 7 rungs to Firm)
    pub track_mode: TrackMode,

    /// Kalman motion model (constant velocity or constant acceleration)
    pub filter_model: FilterModel,

    /// Measurement-to-track association algorithm
    pub association: AssociationMode,

    /// Maximum time spread within one measurement group (seconds)
    pub max_time_diff: f64,

    /// Interval between track timeout sweeps (seconds of stream time)
    pub check_interval: f64,

    /// Doppler gap bound for the single-measurement correlation check
    pub doppler_threshold: f64,

    /// Range gap bound for the single-measurement correlation check
    pub range_threshold: f64,

    /// Chi-squared gate on squared Mahalanobis distance
    pub gate_threshold: f64,

    /// Plant-noise scalar driving the process noise covariance Q
    pub plant_noise: f64,

    /// Age past which a track with no updates is deleted (seconds)
    pub track_timeout: f64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            track_mode: TrackMode::Three,
            filter_model: FilterModel::ConstantVelocity,
            association: AssociationMode::Jpda,
            max_time_diff: 0.050,     // 50 ms group window
            check_interval: 0.0005,   // 0.5 ms timeout sweep cadence
            doppler_threshold: 100.0,
            range_threshold: 100.0,
            gate_threshold: 9.21,     // Chi² 99% for 3 DOF
            plant_noise: 20.0,
            track_timeout: 0.300,     // 6 group windows without an update
        }
    }
}

impl TrackerConfig {
    /// Validate numeric constants. Selector enums are already well-formed by
    /// construction; this guards the tunables a caller may have overridden.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let constants = [
            ("max_time_diff", self.max_time_diff),
            ("check_interval", self.check_interval),
            ("doppler_threshold", self.doppler_threshold),
            ("range_threshold", self.range_threshold),
            ("gate_threshold", self.gate_threshold),
            ("plant_noise", self.plant_noise),
            ("track_timeout", self.track_timeout),
        ];
        for (name, value) in constants {
            if !value.is_finite() || value <= 0.0 {
                return Err(ConfigError::InvalidConstant { name, value });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(TrackerConfig::default().validate().is_ok());
    }

    #[test]
    fn test_rejects_non_positive_constant() {
        let config = TrackerConfig {
            gate_threshold: 0.0,
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidConstant { name: "gate_threshold", .. }
        ));
    }

    #[test]
    fn test_rejects_nan_constant() {
        let config = TrackerConfig {
            plant_noise: f64::NAN,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
