//! Reminder settings loaded from JSON and environment overrides.
//!
//! # Responsibility
//! - Parse host-provided settings into `EvaluatorConfig`.
//! - Apply `DONETOGETHER_*` environment overrides for local tooling.
//!
//! # Invariants
//! - Validated settings always have a positive cooldown window and a finite,
//!   positive default radius.

use crate::reminder::{EvaluatorConfig, DEFAULT_COOLDOWN_WINDOW_MS, DEFAULT_RADIUS_METERS};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

pub const ENV_COOLDOWN_MS: &str = "DONETOGETHER_COOLDOWN_MS";
pub const ENV_DEFAULT_RADIUS_M: &str = "DONETOGETHER_DEFAULT_RADIUS_M";
pub const ENV_DB_PATH: &str = "DONETOGETHER_DB_PATH";

/// Host-facing reminder settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReminderSettings {
    pub cooldown_window_ms: i64,
    pub default_radius_meters: f64,
    pub rearm_on_exit: bool,
    /// Durable cooldown database; volatile in-memory store when absent.
    pub cooldown_db_path: Option<PathBuf>,
    pub log_level: Option<String>,
    pub log_dir: Option<String>,
}

impl Default for ReminderSettings {
    fn default() -> Self {
        Self {
            cooldown_window_ms: DEFAULT_COOLDOWN_WINDOW_MS,
            default_radius_meters: DEFAULT_RADIUS_METERS,
            rearm_on_exit: false,
            cooldown_db_path: None,
            log_level: None,
            log_dir: None,
        }
    }
}

impl ReminderSettings {
    /// Parses and validates a JSON settings document.
    pub fn from_json_str(json: &str) -> Result<Self, SettingsError> {
        let settings: Self = serde_json::from_str(json).map_err(SettingsError::Parse)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Reads, parses and validates a JSON settings file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|err| SettingsError::Io {
            path: path.to_path_buf(),
            message: err.to_string(),
        })?;
        Self::from_json_str(&raw)
    }

    /// Applies `DONETOGETHER_*` overrides from the process environment.
    pub fn apply_env_overrides(&mut self) -> Result<(), SettingsError> {
        self.apply_overrides_from(|name| std::env::var(name).ok())
    }

    /// Applies overrides from an arbitrary lookup, then re-validates.
    pub fn apply_overrides_from(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), SettingsError> {
        if let Some(raw) = non_blank(lookup(ENV_COOLDOWN_MS)) {
            self.cooldown_window_ms =
                raw.parse::<i64>()
                    .map_err(|err| SettingsError::InvalidValue {
                        field: ENV_COOLDOWN_MS,
                        message: format!("`{raw}` is not an integer: {err}"),
                    })?;
        }
        if let Some(raw) = non_blank(lookup(ENV_DEFAULT_RADIUS_M)) {
            self.default_radius_meters =
                raw.parse::<f64>()
                    .map_err(|err| SettingsError::InvalidValue {
                        field: ENV_DEFAULT_RADIUS_M,
                        message: format!("`{raw}` is not a number: {err}"),
                    })?;
        }
        if let Some(raw) = non_blank(lookup(ENV_DB_PATH)) {
            self.cooldown_db_path = Some(PathBuf::from(raw));
        }
        self.validate()
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.cooldown_window_ms <= 0 {
            return Err(SettingsError::InvalidValue {
                field: "cooldownWindowMs",
                message: format!("must be positive, got {}", self.cooldown_window_ms),
            });
        }
        if !self.default_radius_meters.is_finite() || self.default_radius_meters <= 0.0 {
            return Err(SettingsError::InvalidValue {
                field: "defaultRadiusMeters",
                message: format!(
                    "must be a positive number, got {}",
                    self.default_radius_meters
                ),
            });
        }
        Ok(())
    }

    pub fn evaluator_config(&self) -> EvaluatorConfig {
        EvaluatorConfig {
            cooldown_window_ms: self.cooldown_window_ms,
            default_radius_meters: self.default_radius_meters,
            rearm_on_exit: self.rearm_on_exit,
        }
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|raw| raw.trim().to_string())
        .filter(|raw| !raw.is_empty())
}

#[derive(Debug)]
pub enum SettingsError {
    Io { path: PathBuf, message: String },
    Parse(serde_json::Error),
    InvalidValue { field: &'static str, message: String },
}

impl Display for SettingsError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, message } => {
                write!(f, "failed to read settings `{}`: {message}", path.display())
            }
            Self::Parse(err) => write!(f, "invalid settings JSON: {err}"),
            Self::InvalidValue { field, message } => write!(f, "invalid {field}: {message}"),
        }
    }
}

impl Error for SettingsError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Parse(err) => Some(err),
            Self::Io { .. } | Self::InvalidValue { .. } => None,
        }
    }
}
