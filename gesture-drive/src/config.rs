//! Service configuration
//!
//! Loaded from an optional JSON file, then overridden from the environment.

use crate::classifier::{ClassifierConfig, ClassifierError, TurnSensitivity};
use crate::dispatcher::{DispatchError, DispatcherConfig};
use crate::mode::{ToggleConfig, ToggleConfigError};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info};

pub const ENV_TARGET: &str = "GESTURE_DRIVE_TARGET";
pub const ENV_SENSITIVITY: &str = "GESTURE_DRIVE_SENSITIVITY";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("Invalid config file {path}: {source}")]
    Parse {
        path: String,
        source: serde_json::Error,
    },

    #[error("Invalid value for {var}: {reason}")]
    Env { var: &'static str, reason: String },

    #[error("Toggle config error: {0}")]
    Toggle(#[from] ToggleConfigError),

    #[error("Classifier config error: {0}")]
    Classifier(#[from] ClassifierError),

    #[error("Dispatcher config error: {0}")]
    Dispatcher(#[from] DispatchError),
}

/// Complete service configuration
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DriveConfig {
    pub dispatcher: DispatcherConfig,
    pub toggle: ToggleConfig,
    pub classifier: ClassifierConfig,
}

impl DriveConfig {
    /// Load from a JSON file; missing sections fall back to defaults
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let shown = path.display().to_string();

        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: shown.clone(),
            source,
        })?;

        let config: DriveConfig =
            serde_json::from_str(&contents).map_err(|source| ConfigError::Parse {
                path: shown.clone(),
                source,
            })?;

        info!("Loaded configuration from {}", shown);
        Ok(config)
    }

    /// Apply `GESTURE_DRIVE_*` overrides from the process environment
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|var| std::env::var(var).ok())
    }

    fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(target) = lookup(ENV_TARGET) {
            self.dispatcher.target = target.parse::<SocketAddr>().map_err(|e| ConfigError::Env {
                var: ENV_TARGET,
                reason: e.to_string(),
            })?;
            debug!("Target overridden from environment: {}", self.dispatcher.target);
        }

        if let Some(sensitivity) = lookup(ENV_SENSITIVITY) {
            self.classifier.turn_sensitivity = sensitivity
                .parse::<TurnSensitivity>()
                .map_err(|reason| ConfigError::Env {
                    var: ENV_SENSITIVITY,
                    reason,
                })?;
        }

        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.dispatcher.validate()?;
        self.toggle.validate()?;
        self.classifier.validate()?;
        Ok(())
    }
}
