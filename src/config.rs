use crate::error::StabilizerError;
use chrono::Offset;
use std::time::Duration;

/// How quality failures and low-confidence cycles interact while locked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailureCounting {
    /// A quality failure neither advances nor breaks a confidence streak.
    #[default]
    Independent,
    /// A quality failure counts as a low-confidence cycle for the locked label
    /// and breaks the candidate streak.
    Shared,
}

/// What to do when the region detector reports no object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MissingRegion {
    #[default]
    CenterCrop,
    WholeFrame,
    NoCandidate,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub labels: Vec<String>,

    pub window_size: usize,
    pub ema_alpha: f64,

    pub lock_min_conf: f64,
    pub lock_min_margin: f64,
    pub unknown_conf: f64,
    /// Window mean entropy above which a scanning cycle counts toward UNKNOWN.
    pub unknown_max_entropy: Option<f64>,
    pub persistence_frames: u32,
    pub quality_fail_persist: u32,
    pub failure_counting: FailureCounting,
    pub null_vote_counts_as_quality_failure: bool,

    pub sharpness_min: f64,
    pub brightness_min: f64,

    pub missing_region: MissingRegion,
    pub region_expand: f64,
    pub region_smoothing_alpha: f64,

    pub inference_every_nth: u32,
    pub min_inference_interval: Duration,
    pub classifier_timeout: Duration,
    pub publish_interval: Duration,
    pub slot_poll_interval: Duration,
    pub best_frame_capacity: usize,

    pub logger_timezone: chrono::FixedOffset,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            labels: ["HDPE", "PET", "PP", "PS"]
                .iter()
                .map(|label| label.to_string())
                .collect(),
            window_size: 20,
            ema_alpha: 0.5,
            lock_min_conf: 0.70,
            lock_min_margin: 0.15,
            unknown_conf: 0.65,
            unknown_max_entropy: None,
            persistence_frames: 5,
            quality_fail_persist: 10,
            failure_counting: FailureCounting::Independent,
            null_vote_counts_as_quality_failure: false,
            sharpness_min: 80.0,
            brightness_min: 40.0,
            missing_region: MissingRegion::CenterCrop,
            region_expand: 1.2,
            region_smoothing_alpha: 0.7,
            inference_every_nth: 3,
            min_inference_interval: Duration::ZERO,
            classifier_timeout: Duration::from_secs(2),
            publish_interval: Duration::from_millis(100),
            slot_poll_interval: Duration::from_millis(10),
            best_frame_capacity: 10,
            logger_timezone: utc(),
        }
    }
}

impl Config {
    pub fn label_index(&self, label: &str) -> Option<usize> {
        self.labels.iter().position(|l| l == label)
    }

    pub fn label_name(&self, index: usize) -> Option<&str> {
        self.labels.get(index).map(String::as_str)
    }

    pub fn validate(&self) -> Result<(), StabilizerError> {
        if self.labels.len() < 2 {
            return Err(StabilizerError::invalid_config(
                "label set needs at least two labels",
            ));
        }
        if self.window_size == 0 {
            return Err(StabilizerError::invalid_config("window_size must be positive"));
        }
        if !(self.ema_alpha > 0.0 && self.ema_alpha <= 1.0) {
            return Err(StabilizerError::invalid_config(format!(
                "ema_alpha must be in (0, 1], got {}",
                self.ema_alpha
            )));
        }
        for (name, value) in [
            ("lock_min_conf", self.lock_min_conf),
            ("lock_min_margin", self.lock_min_margin),
            ("unknown_conf", self.unknown_conf),
            ("region_smoothing_alpha", self.region_smoothing_alpha),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(StabilizerError::invalid_config(format!(
                    "{name} must be in [0, 1], got {value}"
                )));
            }
        }
        if self.persistence_frames == 0 {
            return Err(StabilizerError::invalid_config(
                "persistence_frames must be positive",
            ));
        }
        if self.quality_fail_persist == 0 {
            return Err(StabilizerError::invalid_config(
                "quality_fail_persist must be positive",
            ));
        }
        for (name, value) in [
            ("sharpness_min", self.sharpness_min),
            ("brightness_min", self.brightness_min),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(StabilizerError::invalid_config(format!(
                    "{name} must be a non-negative number, got {value}"
                )));
            }
        }
        if let Some(max) = self.unknown_max_entropy {
            if !max.is_finite() || max <= 0.0 {
                return Err(StabilizerError::invalid_config(format!(
                    "unknown_max_entropy must be positive, got {max}"
                )));
            }
        }
        if !self.region_expand.is_finite() || self.region_expand < 1.0 {
            return Err(StabilizerError::invalid_config(
                "region_expand must be at least 1.0",
            ));
        }
        if self.inference_every_nth == 0 {
            return Err(StabilizerError::invalid_config(
                "inference_every_nth must be positive",
            ));
        }
        if self.best_frame_capacity == 0 {
            return Err(StabilizerError::invalid_config(
                "best_frame_capacity must be positive",
            ));
        }
        Ok(())
    }
}

fn utc() -> chrono::FixedOffset {
    chrono::Utc.fix()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_label_lookup() {
        let config = Config::default();
        assert_eq!(config.label_index("PET"), Some(1));
        assert_eq!(config.label_name(3), Some("PS"));
        assert_eq!(config.label_index("glass"), None);
    }

    #[test]
    fn test_rejects_bad_alpha() {
        let config = Config {
            ema_alpha: 0.0,
            ..Config::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("ema_alpha"));
    }

    #[test]
    fn test_rejects_single_label() {
        let config = Config {
            labels: vec!["PET".to_string()],
            ..Config::default()
        };
        assert!(matches!(
            config.validate(),
            Err(StabilizerError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_rejects_nan_quality_thresholds() {
        let config = Config {
            sharpness_min: f64::NAN,
            ..Config::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("sharpness_min"));

        let config = Config {
            brightness_min: f64::NAN,
            ..Config::default()
        };
        assert!(config.validate().is_err());

        let config = Config {
            region_expand: f64::NAN,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_non_positive_entropy_limit() {
        let config = Config {
            unknown_max_entropy: Some(0.0),
            ..Config::default()
        };
        assert!(config.validate().is_err());

        let config = Config {
            unknown_max_entropy: Some(1.5),
            ..Config::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_zero_persistence() {
        let config = Config {
            persistence_frames: 0,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }
}
