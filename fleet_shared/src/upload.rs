//! Upload bookkeeping records: provisional pending uploads and finalized print jobs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const PRINT_VIA_DEFAULT: &str = "unknown";

/// An upload whose print start has not been confirmed yet.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct PendingUpload {
    pub printer_id: i64,
    pub filename: String,
    pub printer_name: String,
    pub username: String,
    pub print_via: String,
    pub created_at: DateTime<Utc>,
}

/// A print job the fleet knows was started.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct PrintJobRecord {
    pub id: String,
    pub job_date: DateTime<Utc>,
    pub gcode_filename: String,
    pub printer_name: String,
    pub username: String,
    pub print_via: String,
}

impl From<&PendingUpload> for PrintJobRecord {
    fn from(pending: &PendingUpload) -> Self {
        Self {
            id: String::new(),
            job_date: pending.created_at,
            gcode_filename: pending.filename.clone(),
            printer_name: pending.printer_name.clone(),
            username: pending.username.clone(),
            print_via: normalize_print_via(Some(&pending.print_via)),
        }
    }
}

/// Canonical spelling of the "printed via" tag. Blank input becomes `"unknown"`; unrecognized
/// values are kept, trimmed.
pub fn normalize_print_via(value: Option<&str>) -> String {
    let cleaned = match value.map(str::trim) {
        Some(v) if !v.is_empty() => v,
        _ => return PRINT_VIA_DEFAULT.to_string(),
    };
    let simplified: String = cleaned
        .to_lowercase()
        .chars()
        .filter(|c| !matches!(c, ' ' | '-' | '_'))
        .collect();
    match simplified.as_str() {
        "justprinting" => "JustPrinting".to_string(),
        "justgroupprinting" => "JustGroupPrinting".to_string(),
        "webui" => "Web UI".to_string(),
        _ => cleaned.to_string(),
    }
}
