// Configuration - Engine and performance settings loaded from RON or JSON

use crate::assistant::options::AssistantOptions;
use crate::error::{PerformerError, PerformerResult};
use crate::serialization;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const APP_DIR: &str = "assisted-performer";
const CONFIG_FILE: &str = "config.ron";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PerformerConfig {
    /// Moments due within this many ms are sent in the current tick
    pub lookahead_ms: f64,
    /// Longest sleep of the event loop when nothing is due
    pub idle_poll_ms: f64,
    /// Capacity of the input ring buffer between the driver thread and the loop
    pub input_queue_capacity: usize,
    /// Output port name; the first available port when unset
    pub output_port: Option<String>,
    /// Input port name; the first available port when unset
    pub input_port: Option<String>,
    pub assistant: AssistantOptions,
}

impl Default for PerformerConfig {
    fn default() -> Self {
        Self {
            lookahead_ms: 0.0,
            idle_poll_ms: 1.0,
            input_queue_capacity: 512,
            output_port: None,
            input_port: None,
            assistant: AssistantOptions::default(),
        }
    }
}

impl PerformerConfig {
    /// `<config dir>/assisted-performer/config.ron`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(APP_DIR).join(CONFIG_FILE))
    }

    /// Load from a `.ron` or `.json` file and validate
    pub fn load(path: &Path) -> PerformerResult<Self> {
        let config: Self = serialization::read_file(path)?;
        config.validate()?;
        log::debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// The file at the default path, or defaults when there is none
    pub fn load_or_default() -> PerformerResult<Self> {
        match Self::default_path() {
            Some(path) if path.exists() => Self::load(&path),
            _ => Ok(Self::default()),
        }
    }

    pub fn save(&self, path: &Path) -> PerformerResult<()> {
        self.validate()?;
        serialization::write_file(self, path)
    }

    pub fn validate(&self) -> PerformerResult<()> {
        if !(self.lookahead_ms.is_finite() && self.lookahead_ms >= 0.0) {
            return Err(PerformerError::Config(format!(
                "lookahead_ms must be a non-negative number, got {}",
                self.lookahead_ms
            )));
        }
        if !(self.idle_poll_ms.is_finite() && self.idle_poll_ms >= 0.0) {
            return Err(PerformerError::Config(format!(
                "idle_poll_ms must be a non-negative number, got {}",
                self.idle_poll_ms
            )));
        }
        if self.input_queue_capacity == 0 {
            return Err(PerformerError::Config(
                "input_queue_capacity must be at least 1".into(),
            ));
        }
        if let Some(speed) = self.assistant.performance.speed_factor {
            if !(speed.is_finite() && speed > 0.0) {
                return Err(PerformerError::Config(format!(
                    "speed_factor must be positive, got {}",
                    speed
                )));
            }
        }
        if let Some(velocity) = self.assistant.performance.velocity {
            if velocity.min_velocity > 127 {
                return Err(PerformerError::Config(format!(
                    "min_velocity must be at most 127, got {}",
                    velocity.min_velocity
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serialization::{Format, from_str};

    #[test]
    fn test_defaults_are_valid() {
        let config = PerformerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.input_queue_capacity, 512);
    }

    #[test]
    fn test_partial_ron_uses_defaults() {
        let config: PerformerConfig =
            from_str("(lookahead_ms: 5.0, output_port: Some(\"Synth\"))", Format::Ron).unwrap();
        assert_eq!(config.lookahead_ms, 5.0);
        assert_eq!(config.output_port.as_deref(), Some("Synth"));
        assert_eq!(config.idle_poll_ms, 1.0);
        assert!(!config.assistant.relative_durations);
    }

    #[test]
    fn test_validation_failures() {
        let config = PerformerConfig {
            lookahead_ms: -1.0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(PerformerError::Config(_))));

        let config = PerformerConfig {
            input_queue_capacity: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let mut config = PerformerConfig::default();
        config.assistant.performance.speed_factor = Some(0.0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_default_path_location() {
        if let Some(path) = PerformerConfig::default_path() {
            assert!(path.ends_with("assisted-performer/config.ron"));
        }
    }
}
