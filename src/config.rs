//! User configuration.
//!
//! Settings live in `config.json` in the data directory, durations in
//! minutes. Environment variables override the file:
//!
//! | Variable | Example | Meaning |
//! |----------|---------|---------|
//! | `FOCUS_TIMER_WORK` | `25m`, `1h30m` | Focus phase length |
//! | `FOCUS_TIMER_BREAK` | `5m`, `90s` | Break phase length |
//! | `FOCUS_TIMER_NO_SOUND` | `1` | Disable alert sound |
//! | `FOCUS_TIMER_AUTO_START` | `true` | Start the next phase automatically |

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::machine::PhaseDurations;

pub const CONFIG_FILE: &str = "config.json";
pub const HISTORY_FILE: &str = "history.json";
pub const TIMER_STATE_FILE: &str = "timer_state.json";

const MAX_WORK_MINUTES: f64 = 240.0;
const MAX_BREAK_MINUTES: f64 = 60.0;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("failed to write config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to encode config: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Focus length in minutes.
    pub work_duration: f64,
    /// Break length in minutes.
    pub break_duration: f64,
    pub sound_enabled: bool,
    pub auto_start_next: bool,
    /// Label given to sessions when none was set.
    pub default_activity: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            work_duration: 25.0,
            break_duration: 5.0,
            sound_enabled: true,
            auto_start_next: false,
            default_activity: "Focus".into(),
        }
    }
}

impl Config {
    /// Reads `path`, falling back to defaults when missing or unreadable.
    pub fn load(path: &Path) -> Self {
        let Ok(text) = fs::read_to_string(path) else {
            return Self::default();
        };
        match serde_json::from_str::<Self>(&text) {
            Ok(config) => match config.validate() {
                Ok(()) => config,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "config out of range, using defaults");
                    Self::default()
                }
            },
            Err(e) => {
                warn!(path = %path.display(), error = %e, "config unreadable, using defaults");
                Self::default()
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Applies `FOCUS_TIMER_*` overrides from the process environment.
    pub fn with_env_overrides(self) -> Result<Self, ConfigError> {
        self.with_overrides(|key| env::var(key).ok())
    }

    /// Applies overrides read through `lookup`, then validates.
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("FOCUS_TIMER_WORK") {
            self.work_duration = parse_duration(&v).map_err(|m| invalid("FOCUS_TIMER_WORK", m))?;
        }
        if let Some(v) = lookup("FOCUS_TIMER_BREAK") {
            self.break_duration =
                parse_duration(&v).map_err(|m| invalid("FOCUS_TIMER_BREAK", m))?;
        }
        if let Some(v) = lookup("FOCUS_TIMER_NO_SOUND") {
            self.sound_enabled = !parse_flag(&v).map_err(|m| invalid("FOCUS_TIMER_NO_SOUND", m))?;
        }
        if let Some(v) = lookup("FOCUS_TIMER_AUTO_START") {
            self.auto_start_next =
                parse_flag(&v).map_err(|m| invalid("FOCUS_TIMER_AUTO_START", m))?;
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.work_duration > 0.0 && self.work_duration <= MAX_WORK_MINUTES) {
            return Err(invalid(
                "work_duration",
                format!("must be between 0 and {MAX_WORK_MINUTES} minutes"),
            ));
        }
        if !(self.break_duration > 0.0 && self.break_duration <= MAX_BREAK_MINUTES) {
            return Err(invalid(
                "break_duration",
                format!("must be between 0 and {MAX_BREAK_MINUTES} minutes"),
            ));
        }
        Ok(())
    }

    pub fn work_secs(&self) -> u64 {
        minutes_to_secs(self.work_duration)
    }

    pub fn break_secs(&self) -> u64 {
        minutes_to_secs(self.break_duration)
    }

    pub fn durations(&self) -> PhaseDurations {
        PhaseDurations::new(self.work_secs(), self.break_secs())
    }
}

/// Parses `25m`, `1h30m`, `90s` or a bare number of minutes into minutes.
pub fn parse_duration(s: &str) -> Result<f64, String> {
    let s = s.trim().to_lowercase();
    if let Ok(minutes) = s.parse::<f64>() {
        return if minutes > 0.0 { Ok(minutes) } else { Err("Duration must be > 0".into()) };
    }

    let mut total = 0.0;
    let mut num = String::new();
    for c in s.chars() {
        match c {
            '0'..='9' | '.' => num.push(c),
            'h' => { total += num.parse::<f64>().map_err(|_| "Invalid hours")? * 60.0; num.clear(); }
            'm' => { total += num.parse::<f64>().map_err(|_| "Invalid minutes")?; num.clear(); }
            's' => { total += num.parse::<f64>().map_err(|_| "Invalid seconds")? / 60.0; num.clear(); }
            _ => return Err("Invalid format".into()),
        }
    }
    if !num.is_empty() {
        return Err("Missing unit".into());
    }

    if total > 0.0 { Ok(total) } else { Err("Duration must be > 0".into()) }
}

fn parse_flag(s: &str) -> Result<bool, String> {
    match s.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => Err(format!("expected a boolean, got '{other}'")),
    }
}

fn minutes_to_secs(minutes: f64) -> u64 {
    ((minutes * 60.0).round() as u64).max(1)
}

fn invalid(key: &str, message: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.into(),
        message: message.into(),
    }
}

/// Per-user data directory, or `./focus-timer` when none can be resolved.
pub fn data_dir() -> PathBuf {
    ProjectDirs::from("", "", "focus-timer")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from(".").join("focus-timer"))
}

pub fn data_path(filename: &str) -> PathBuf {
    data_dir().join(filename)
}
