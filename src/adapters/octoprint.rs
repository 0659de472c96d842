// src/adapters/octoprint.rs - OctoPrint REST status adapter
use fleet_shared::{PrinterTarget, Severity, StatusSnapshot, Temperatures, normalize_job_state};
use reqwest::Client;
use reqwest::header::HeaderMap;
use serde_json::Value;

use super::{coerce_number, is_truthy, non_empty_str};
use crate::http::{self, FetchError};

pub fn api_key_headers(api_key: &str) -> HeaderMap {
    http::headers([("x-api-key", api_key)])
}

pub async fn fetch_status(client: &Client, target: &PrinterTarget) -> StatusSnapshot {
    let Some(api_key) = target.api_key() else {
        return StatusSnapshot::new("API key missing", Severity::Warn);
    };
    let headers = api_key_headers(api_key);
    let base = target.base_url();
    let printer = match http::fetch_json(client, &format!("{}/api/printer", base), headers.clone()).await {
        Ok(payload) => payload,
        Err(FetchError::Auth(_)) => return StatusSnapshot::new("API key invalid", Severity::Warn),
        Err(e) => {
            tracing::debug!("OctoPrint printer {} unreachable: {}", target.id, e);
            return StatusSnapshot::new("Offline", Severity::Error);
        }
    };
    if printer.as_object().is_none_or(|o| o.is_empty()) {
        return StatusSnapshot::new("Offline", Severity::Error);
    }
    let job = match http::fetch_json(client, &format!("{}/api/job", base), headers).await {
        Ok(job) => Some(job),
        Err(e) => {
            tracing::debug!("OctoPrint printer {} job query failed: {}", target.id, e);
            None
        }
    };
    build_snapshot(&printer, job.as_ref())
}

/// Translate `/api/printer` plus (optionally) `/api/job` payloads into a snapshot.
pub fn build_snapshot(printer: &Value, job: Option<&Value>) -> StatusSnapshot {
    let file = job.and_then(|j| j.pointer("/job/file"));
    let job_name = file
        .and_then(|f| non_empty_str(f.get("name")).or_else(|| non_empty_str(f.get("path"))))
        .map(str::to_string);

    let progress_info = job.and_then(|j| j.get("progress"));
    let progress = coerce_number(progress_info.and_then(|p| p.get("completion")));
    let elapsed = coerce_number(progress_info.and_then(|p| p.get("printTime")));
    let remaining = coerce_number(progress_info.and_then(|p| p.get("printTimeLeft"))).or(match (elapsed, progress) {
        (Some(elapsed), Some(percent)) if percent > 0.0 => Some(elapsed * (100.0 - percent) / percent),
        _ => None,
    });

    let state = printer.get("state").filter(|s| s.is_object());
    let state_text = state.and_then(|s| non_empty_str(s.get("text")));
    let flagged = is_truthy(state.and_then(|s| s.pointer("/flags/error")));
    let error_message = if flagged {
        Some(state_text.unwrap_or("Error").to_string())
    } else {
        state_text
            .filter(|text| text.to_lowercase().contains("error"))
            .map(str::to_string)
    };

    let normalized = job
        .and_then(|j| j.get("state"))
        .and_then(Value::as_str)
        .and_then(normalize_job_state);
    let label = normalized
        .as_ref()
        .map(|s| s.label.clone())
        .or_else(|| state_text.map(str::to_string))
        .unwrap_or_else(|| "Online".to_string());
    let severity = normalized.and_then(|s| s.severity).unwrap_or(Severity::Ok);

    StatusSnapshot {
        label,
        severity,
        temperatures: extract_temperatures(printer),
        job_name,
        progress,
        elapsed,
        remaining,
        error_message,
        plug: None,
    }
}

fn extract_temperatures(printer: &Value) -> Temperatures {
    let mut temps = Temperatures::default();
    let Some(temperature) = printer.get("temperature").and_then(Value::as_object) else {
        return temps;
    };
    if let Some(tool0) = temperature.get("tool0").filter(|t| t.is_object()) {
        temps.hotend = coerce_number(tool0.get("actual"));
        temps.hotend_target = coerce_number(tool0.get("target"));
    }
    if temps.hotend.is_none() {
        for (key, data) in temperature {
            if !key.starts_with("tool") || !data.is_object() {
                continue;
            }
            temps.hotend = coerce_number(data.get("actual"));
            temps.hotend_target = coerce_number(data.get("target"));
            if temps.hotend.is_some() || temps.hotend_target.is_some() {
                break;
            }
        }
    }
    if let Some(bed) = temperature.get("bed").filter(|b| b.is_object()) {
        temps.bed = coerce_number(bed.get("actual"));
        temps.bed_target = coerce_number(bed.get("target"));
    }
    temps
}
