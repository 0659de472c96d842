// src/adapters/moonraker.rs - Moonraker/Klipper status adapter
use fleet_shared::{PrinterTarget, Severity, StatusSnapshot, Temperatures, normalize_job_state};
use reqwest::Client;
use reqwest::header::HeaderMap;
use serde_json::{Map, Value};

use super::{coerce_number, non_empty_str, remaining_from_fraction};
use crate::http::{self, FetchError};

pub const OBJECTS_QUERY: &str = "print_stats=state,filename,print_duration,total_duration,message&\
virtual_sdcard=progress&display_status=progress&\
extruder=temperature,target&heater_bed=temperature,target";

/// `Authorization: Bearer` and `X-Api-Key` both carry the token when one is configured.
pub fn auth_headers(token: Option<&str>) -> HeaderMap {
    match token {
        Some(token) => {
            let bearer = format!("Bearer {}", token);
            http::headers([("authorization", bearer.as_str()), ("x-api-key", token)])
        }
        None => HeaderMap::new(),
    }
}

pub async fn fetch_status(client: &Client, target: &PrinterTarget) -> StatusSnapshot {
    let headers = auth_headers(target.token());
    let base = target.base_url();
    let info = match http::fetch_json(client, &format!("{}/printer/info", base), headers.clone()).await {
        Ok(info) => info,
        Err(FetchError::Auth(_)) => return StatusSnapshot::new("Auth required", Severity::Warn),
        Err(e) => {
            tracing::debug!("Moonraker printer {} unreachable: {}", target.id, e);
            return StatusSnapshot::new("Offline", Severity::Error);
        }
    };
    if info.as_object().is_none_or(Map::is_empty) {
        return StatusSnapshot::new("Offline", Severity::Error);
    }
    let objects_url = format!("{}/printer/objects/query?{}", base, OBJECTS_QUERY);
    let objects = match http::fetch_json(client, &objects_url, headers).await {
        Ok(objects) => Some(objects),
        Err(e) => {
            tracing::debug!("Moonraker printer {} object query failed: {}", target.id, e);
            None
        }
    };
    build_snapshot(&info, objects.as_ref())
}

/// Progress as a fraction. Values up to and including 1 are already fractions; larger values are
/// percentages. A raw 1 therefore means 100 %, never 1 %. The result is kept within `0..=1`.
pub fn progress_fraction(raw: f64) -> f64 {
    let fraction = if raw <= 1.0 { raw } else { raw / 100.0 };
    fraction.clamp(0.0, 1.0)
}

/// Translate `/printer/info` plus `/printer/objects/query` payloads into a snapshot.
pub fn build_snapshot(info: &Value, objects: Option<&Value>) -> StatusSnapshot {
    let empty = Map::new();
    let status = objects
        .and_then(|o| o.pointer("/result/status"))
        .and_then(Value::as_object)
        .unwrap_or(&empty);
    let print_stats = status.get("print_stats").and_then(Value::as_object);

    let job_name = print_stats
        .and_then(|ps| non_empty_str(ps.get("filename")))
        .map(str::to_string);
    let elapsed = print_stats.and_then(|ps| coerce_number(ps.get("print_duration")));
    let fraction = ["virtual_sdcard", "display_status"]
        .iter()
        .find_map(|key| coerce_number(status.get(*key).and_then(|s| s.get("progress"))))
        .map(progress_fraction);

    let job_state = print_stats.and_then(|ps| ps.get("state")).and_then(Value::as_str);
    let mut error_message = match job_state {
        Some(state) if state.trim().eq_ignore_ascii_case("error") => print_stats
            .and_then(|ps| ps.get("message"))
            .and_then(Value::as_str)
            .map(str::to_string),
        _ => None,
    };

    let result = info.get("result").and_then(Value::as_object);
    let state_message = result.and_then(|r| non_empty_str(r.get("state_message")));
    let printer_state = result.and_then(|r| non_empty_str(r.get("state")));
    if error_message.is_none() {
        if printer_state.is_some_and(|s| s.trim().eq_ignore_ascii_case("error")) {
            error_message = Some(state_message.unwrap_or("Error").to_string());
        } else if let Some(message) = state_message.filter(|m| m.to_lowercase().contains("error")) {
            error_message = Some(message.to_string());
        }
    }

    let normalized = job_state.and_then(normalize_job_state);
    let label = normalized
        .as_ref()
        .map(|s| s.label.clone())
        .or_else(|| state_message.or(printer_state).map(str::to_string))
        .unwrap_or_else(|| "Online".to_string());
    let severity = normalized.and_then(|s| s.severity).unwrap_or(Severity::Ok);

    StatusSnapshot {
        label,
        severity,
        temperatures: extract_temperatures(status),
        job_name,
        progress: fraction.map(|f| f * 100.0),
        elapsed,
        remaining: remaining_from_fraction(elapsed, fraction),
        error_message,
        plug: None,
    }
}

fn extract_temperatures(status: &Map<String, Value>) -> Temperatures {
    let mut temps = Temperatures::default();
    for (key, data) in status {
        if !key.starts_with("extruder") || !data.is_object() {
            continue;
        }
        temps.hotend = coerce_number(data.get("temperature"));
        temps.hotend_target = coerce_number(data.get("target"));
        if temps.hotend.is_some() || temps.hotend_target.is_some() {
            break;
        }
    }
    if let Some(bed) = status.get("heater_bed").filter(|b| b.is_object()) {
        temps.bed = coerce_number(bed.get("temperature"));
        temps.bed_target = coerce_number(bed.get("target"));
    }
    temps
}
