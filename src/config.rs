// src/config.rs

use crate::error::{Result, WatchError};
use crate::types::Config;
use std::fs;
use std::path::Path;
use tracing::debug;

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|e| {
            WatchError::config(format!("cannot read {}: {}", path.display(), e))
        })?;
        let config = Self::from_yaml(&contents)?;
        debug!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    pub fn from_yaml(contents: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        if !(self.session.fps.is_finite() && self.session.fps > 0.0) {
            return Err(WatchError::config(format!(
                "session.fps must be positive, got {}",
                self.session.fps
            )));
        }
        if self.session.boundary_path.trim().is_empty() {
            return Err(WatchError::config("session.boundary_path is empty"));
        }
        if !(self.tracker.max_match_distance > 0.0) {
            return Err(WatchError::config("tracker.max_match_distance must be positive"));
        }
        if !(0.0..=1.0).contains(&self.tracker.iou_threshold) {
            return Err(WatchError::config("tracker.iou_threshold must be in [0, 1]"));
        }
        if self.tracker.history_len == 0 {
            return Err(WatchError::config("tracker.history_len must be at least 1"));
        }
        if !(self.tracker.process_noise > 0.0 && self.tracker.measurement_noise > 0.0) {
            return Err(WatchError::config("tracker motion noise values must be positive"));
        }
        if self.contact.smoothing_window == 0 {
            return Err(WatchError::config("contact.smoothing_window must be at least 1"));
        }
        if !(self.violation.cooldown_seconds >= 0.0) {
            return Err(WatchError::config("violation.cooldown_seconds must be >= 0"));
        }
        if self.violation.out_threshold == 0 {
            return Err(WatchError::config("violation.out_threshold must be at least 1"));
        }
        if self.evidence.queue_depth == 0 {
            return Err(WatchError::config("evidence.queue_depth must be at least 1"));
        }
        if self.evidence.max_capture_frames == 0 {
            return Err(WatchError::config("evidence.max_capture_frames must be at least 1"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ClockMode;

    #[test]
    fn test_empty_yaml_uses_defaults() {
        let config = Config::from_yaml("{}").unwrap();
        assert_eq!(config.tracker.max_frames_missing, 60);
        assert_eq!(config.tracker.max_match_distance, 150.0);
        assert_eq!(config.contact.smoothing_window, 5);
        assert_eq!(config.violation.out_threshold, 3);
        assert_eq!(config.session.clock, ClockMode::Frame);
    }

    #[test]
    fn test_partial_section_override() {
        let yaml = "session:\n  clock: wall\nviolation:\n  cooldown_seconds: 1.5\n";
        let config = Config::from_yaml(yaml).unwrap();
        assert_eq!(config.session.clock, ClockMode::Wall);
        assert_eq!(config.violation.cooldown_seconds, 1.5);
        assert_eq!(config.violation.out_threshold, 3);
    }

    #[test]
    fn test_invalid_values_fail_fast() {
        assert!(matches!(
            Config::from_yaml("session:\n  fps: 0\n"),
            Err(WatchError::ConfigInvalid(_))
        ));
        assert!(matches!(
            Config::from_yaml("contact:\n  smoothing_window: 0\n"),
            Err(WatchError::ConfigInvalid(_))
        ));
        assert!(Config::from_yaml("tracker: [1, 2]").is_err());
    }

    #[test]
    fn test_missing_file_is_config_error() {
        let err = Config::load("/nonexistent/boundary-watch.yaml").unwrap_err();
        assert!(matches!(err, WatchError::ConfigInvalid(_)));
    }
}
