//! Canonical status snapshot and the backend state normalizer.

use serde::{Deserialize, Serialize};

/// Display severity of a status or plug label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Ok,
    Warn,
    Error,
    Muted,
    #[default]
    Unset,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Ok => "ok",
            Severity::Warn => "warn",
            Severity::Error => "error",
            Severity::Muted => "muted",
            Severity::Unset => "unset",
        }
    }
}

/// Hotend and bed readings in °C. Any field may be missing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize, Serialize)]
pub struct Temperatures {
    pub hotend: Option<f64>,
    pub hotend_target: Option<f64>,
    pub bed: Option<f64>,
    pub bed_target: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct PlugStatus {
    pub label: String,
    pub severity: Severity,
}

impl PlugStatus {
    pub fn new(label: impl Into<String>, severity: Severity) -> Self {
        Self { label: label.into(), severity }
    }
}

/// One point-in-time normalized status for a printer.
///
/// Built once per poll by an adapter; `plug` is only populated when a smart plug is attached
/// and plug status was requested.
#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
pub struct StatusSnapshot {
    pub label: String,
    pub severity: Severity,
    #[serde(default)]
    pub temperatures: Temperatures,
    #[serde(default)]
    pub job_name: Option<String>,
    /// 0-100
    #[serde(default)]
    pub progress: Option<f64>,
    #[serde(default)]
    pub elapsed: Option<f64>,
    #[serde(default)]
    pub remaining: Option<f64>,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub plug: Option<PlugStatus>,
}

impl StatusSnapshot {
    pub fn new(label: impl Into<String>, severity: Severity) -> Self {
        Self {
            label: label.into(),
            severity,
            ..Default::default()
        }
    }

    pub fn with_plug(mut self, plug: Option<PlugStatus>) -> Self {
        self.plug = plug;
        self
    }

    pub fn with_error(mut self, message: impl Into<String>) -> Self {
        self.error_message = Some(message.into());
        self
    }
}

/// Result of normalizing a raw backend state token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobState {
    pub label: String,
    /// `None` for tokens outside the known table; callers treat those as neutral.
    pub severity: Option<Severity>,
}

const JOB_STATES: &[(&str, &str, Severity)] = &[
    ("printing", "Printing", Severity::Ok),
    ("paused", "Paused", Severity::Warn),
    ("pausing", "Pausing", Severity::Warn),
    ("resuming", "Resuming", Severity::Ok),
    ("cancelled", "Cancelled", Severity::Warn),
    ("canceled", "Cancelled", Severity::Warn),
    ("complete", "Complete", Severity::Ok),
    ("completed", "Complete", Severity::Ok),
    ("error", "Error", Severity::Error),
    ("ready", "Ready", Severity::Ok),
    ("standby", "Standby", Severity::Ok),
    ("offline", "Offline", Severity::Error),
    ("operational", "Operational", Severity::Ok),
];

/// Map a raw backend state (`"printing"`, `"Paused"`, `"cancelled"`, ...) to a display label.
///
/// Matching is case-insensitive and treats `_` as a space. Unknown tokens are returned verbatim
/// with no severity. Empty or whitespace-only input yields `None`.
pub fn normalize_job_state(state: &str) -> Option<JobState> {
    if state.trim().is_empty() {
        return None;
    }
    let normalized = state.trim().to_lowercase().replace('_', " ");
    let known = JOB_STATES
        .iter()
        .find(|(token, _, _)| *token == normalized)
        .map(|(_, label, severity)| JobState {
            label: label.to_string(),
            severity: Some(*severity),
        });
    Some(known.unwrap_or_else(|| JobState {
        label: state.to_string(),
        severity: None,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_states_map_to_label_and_severity() {
        let state = normalize_job_state("printing").unwrap();
        assert_eq!(state.label, "Printing");
        assert_eq!(state.severity, Some(Severity::Ok));
        let state = normalize_job_state("  PAUSED ").unwrap();
        assert_eq!(state.label, "Paused");
        assert_eq!(state.severity, Some(Severity::Warn));
        assert_eq!(normalize_job_state("canceled").unwrap().label, "Cancelled");
        assert_eq!(normalize_job_state("Completed").unwrap().label, "Complete");
        assert_eq!(normalize_job_state("offline").unwrap().severity, Some(Severity::Error));
        assert_eq!(normalize_job_state("Operational").unwrap().severity, Some(Severity::Ok));
    }

    #[test]
    fn test_unknown_state_passes_through() {
        let state = normalize_job_state("Sending file to SD").unwrap();
        assert_eq!(state.label, "Sending file to SD");
        assert_eq!(state.severity, None);
    }

    #[test]
    fn test_underscore_is_normalized_before_lookup() {
        // no table entry contains a space, so underscored tokens pass through unchanged
        let state = normalize_job_state("cancel_pending").unwrap();
        assert_eq!(state.label, "cancel_pending");
        assert_eq!(state.severity, None);
    }

    #[test]
    fn test_empty_state_yields_nothing() {
        assert!(normalize_job_state("").is_none());
        assert!(normalize_job_state("   ").is_none());
    }

    #[test]
    fn test_snapshot_serializes_lowercase_severity() {
        let snapshot = StatusSnapshot::new("Scanning off", Severity::Muted);
        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["severity"], "muted");
        assert_eq!(json["label"], "Scanning off");
        assert!(json["plug"].is_null());
    }
}
