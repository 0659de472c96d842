//! # Fleet Configuration
//!
//! A single TOML file holds the settings value bag and the printer records.
//!
//! ```toml
//! [settings]
//! upload_timeout_secs = 120
//! plug_poll_interval_secs = 30
//! poll_interval_secs = 5
//!
//! [[printers]]
//! id = 1
//! name = "Voron"
//! backend = "moonraker"
//! host = "10.0.0.12"
//! port = 7125
//! plug_host = "10.0.0.40"
//! ```
//!
//! ```rust
//! use fleet_shared::config::FleetConfig;
//! let config: FleetConfig = toml::from_str("[[printers]]\nid = 1\nhost = 'h'\n").unwrap();
//! assert_eq!(config.printers.len(), 1);
//! assert!(config.validate().is_ok());
//! ```

use std::collections::HashSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::printer::PrinterRecord;

pub const DEFAULT_UPLOAD_TIMEOUT_SECS: f64 = 120.0;
pub const MIN_UPLOAD_TIMEOUT_SECS: f64 = 1.0;
pub const MAX_UPLOAD_TIMEOUT_SECS: f64 = 3600.0;
pub const MIN_POLL_INTERVAL_SECS: f64 = 0.1;
pub const MAX_POLL_INTERVAL_SECS: f64 = 86_400.0;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct FleetConfig {
    #[serde(default)]
    pub settings: Settings,
    #[serde(default)]
    pub printers: Vec<PrinterRecord>,
}

/// Settings value bag consumed by the core.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Settings {
    #[serde(default)]
    pub upload_timeout_secs: Option<f64>,
    #[serde(default)]
    pub plug_poll_interval_secs: Option<f64>,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: f64,
    #[serde(default = "default_status_timeout_ms")]
    pub status_timeout_ms: u64,
    #[serde(default = "default_scan_timeout_ms")]
    pub scan_timeout_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            upload_timeout_secs: None,
            plug_poll_interval_secs: None,
            poll_interval_secs: default_poll_interval(),
            status_timeout_ms: default_status_timeout_ms(),
            scan_timeout_ms: default_scan_timeout_ms(),
        }
    }
}

impl Settings {
    /// Upload timeout, falling back to 120 s when unset, non-finite or not positive, and kept
    /// within 1 s to one hour.
    pub fn upload_timeout(&self) -> Duration {
        resolve_upload_timeout(self.upload_timeout_secs)
    }

    /// Plug poll interval clamped to 1..=300 s; `None` when unset.
    pub fn plug_poll_interval(&self) -> Option<Duration> {
        self.plug_poll_interval_secs
            .filter(|v| v.is_finite())
            .map(|v| Duration::from_secs_f64(v.clamp(1.0, 300.0)))
    }

    pub fn poll_interval(&self) -> Duration {
        let secs = if self.poll_interval_secs.is_finite() && self.poll_interval_secs > 0.0 {
            self.poll_interval_secs.clamp(MIN_POLL_INTERVAL_SECS, MAX_POLL_INTERVAL_SECS)
        } else {
            default_poll_interval()
        };
        Duration::from_secs_f64(secs)
    }

    pub fn status_timeout(&self) -> Duration {
        Duration::from_millis(self.status_timeout_ms)
    }

    pub fn scan_timeout(&self) -> Duration {
        Duration::from_millis(self.scan_timeout_ms)
    }
}

pub fn resolve_upload_timeout(secs: Option<f64>) -> Duration {
    match secs {
        Some(v) if v.is_finite() && v > 0.0 => {
            Duration::from_secs_f64(v.clamp(MIN_UPLOAD_TIMEOUT_SECS, MAX_UPLOAD_TIMEOUT_SECS))
        }
        _ => Duration::from_secs_f64(DEFAULT_UPLOAD_TIMEOUT_SECS),
    }
}

impl FleetConfig {
    /// Reject duplicate printer ids and empty hosts.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();
        for printer in &self.printers {
            if !seen.insert(printer.id) {
                return Err(ConfigError::Invalid(format!("duplicate printer id {}", printer.id)));
            }
            if printer.host.trim().is_empty() {
                return Err(ConfigError::Invalid(format!("printer {} has an empty host", printer.id)));
            }
        }
        Ok(())
    }
}

fn default_poll_interval() -> f64 { 5.0 }
fn default_status_timeout_ms() -> u64 { 1200 }
fn default_scan_timeout_ms() -> u64 { 600 }

/// Load the fleet configuration from a TOML file at the given path.
pub fn load_config(path: &str) -> Result<FleetConfig, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|e| {
        tracing::error!("Failed to read config file '{}': {}", path, e);
        ConfigError::Io(e)
    })?;
    let config: FleetConfig = toml::from_str(&contents).map_err(|e| {
        tracing::error!("Failed to parse config TOML: {}", e);
        ConfigError::Toml(e)
    })?;
    config.validate()?;
    Ok(config)
}
