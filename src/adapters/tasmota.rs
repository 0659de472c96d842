// src/adapters/tasmota.rs - Tasmota-style smart plug adapter
use fleet_shared::{PlugStatus, Severity};
use reqwest::Client;
use reqwest::header::HeaderMap;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use super::coerce_number;
use crate::http::{self, FetchError};

const ENERGY_COMMANDS: [&str; 2] = ["Status%208", "Status%200"];
const ENERGY_SECTIONS: [&str; 4] = ["StatusSNS", "StatusSTS", "Status", "ENERGY"];

/// Categorized plug failure, surfaced as a short lowercase tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PlugError {
    #[error("missing")]
    Missing,
    #[error("invalid")]
    Invalid,
    #[error("auth")]
    Auth,
    #[error("offline")]
    Offline,
    #[error("error")]
    Error,
    #[error("unavailable")]
    Unavailable,
}

impl PlugError {
    pub fn tag(&self) -> &'static str {
        match self {
            PlugError::Missing => "missing",
            PlugError::Invalid => "invalid",
            PlugError::Auth => "auth",
            PlugError::Offline => "offline",
            PlugError::Error => "error",
            PlugError::Unavailable => "unavailable",
        }
    }
}

/// Normalize a configured plug host into a base URL.
///
/// Blank hosts and hosts containing whitespace are rejected; `http://` is prepended when no
/// scheme is given.
pub fn plug_base_url(host: &str) -> Option<String> {
    let host = host.trim();
    if host.is_empty() || host.chars().any(char::is_whitespace) {
        return None;
    }
    let url = if host.starts_with("http://") || host.starts_with("https://") {
        host.to_string()
    } else {
        format!("http://{}", host)
    };
    Some(url.trim_end_matches('/').to_string())
}

fn resolve_base(host: Option<&str>) -> Result<String, PlugError> {
    match host {
        None => Err(PlugError::Missing),
        Some("") => Err(PlugError::Missing),
        Some(h) => plug_base_url(h).ok_or(PlugError::Invalid),
    }
}

pub async fn fetch_plug_status(client: &Client, host: Option<&str>) -> PlugStatus {
    let base = match resolve_base(host) {
        Ok(base) => base,
        Err(PlugError::Missing) => return PlugStatus::new("Plug missing", Severity::Muted),
        Err(_) => return PlugStatus::new("Plug invalid", Severity::Muted),
    };
    match http::fetch_json(client, &format!("{}/cm?cmnd=Power", base), HeaderMap::new()).await {
        Ok(payload) => parse_power_state(&payload),
        Err(FetchError::Auth(_)) => PlugStatus::new("Plug auth", Severity::Warn),
        Err(e) => {
            tracing::debug!("Plug {} unreachable: {}", base, e);
            PlugStatus::new("Plug offline", Severity::Error)
        }
    }
}

/// Read the first `POWER*` key of a power command response.
pub fn parse_power_state(payload: &Value) -> PlugStatus {
    let power = payload
        .as_object()
        .and_then(|o| o.iter().find(|(key, _)| key.to_uppercase().starts_with("POWER")))
        .map(|(_, value)| match value {
            Value::String(s) => s.trim().to_uppercase(),
            other => other.to_string().to_uppercase(),
        });
    match power.as_deref() {
        Some("ON") => PlugStatus::new("Plug on", Severity::Ok),
        Some("OFF") => PlugStatus::new("Plug off", Severity::Muted),
        Some(other) => PlugStatus::new(format!("Plug {}", other.to_lowercase()), Severity::Warn),
        None => PlugStatus::new("Plug unknown", Severity::Muted),
    }
}

/// Instantaneous power and today's energy, already in W and Wh.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlugEnergy {
    pub power_w: Option<f64>,
    pub today_wh: Option<f64>,
}

/// Energy lookup result as reported to callers.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct PlugEnergyReport {
    pub power_w: Option<f64>,
    pub today_wh: Option<f64>,
    pub error: Option<String>,
}

impl From<Result<PlugEnergy, PlugError>> for PlugEnergyReport {
    fn from(result: Result<PlugEnergy, PlugError>) -> Self {
        match result {
            Ok(energy) => Self {
                power_w: energy.power_w,
                today_wh: energy.today_wh,
                error: None,
            },
            Err(e) => Self {
                error: Some(e.tag().to_string()),
                ..Default::default()
            },
        }
    }
}

/// Query energy with `Status 8`, falling back to `Status 0`.
pub async fn fetch_plug_energy(client: &Client, host: Option<&str>) -> Result<PlugEnergy, PlugError> {
    let base = resolve_base(host)?;
    let mut responded = false;
    for command in ENERGY_COMMANDS {
        let url = format!("{}/cm?cmnd={}", base, command);
        match http::fetch_json(client, &url, HeaderMap::new()).await {
            Ok(payload) => {
                responded = true;
                if let Some(energy) = extract_energy(&payload) {
                    return Ok(energy);
                }
            }
            Err(FetchError::Auth(_)) => return Err(PlugError::Auth),
            Err(FetchError::Status(_)) => responded = true,
            Err(FetchError::Request(e)) => {
                tracing::warn!("Plug energy request to {} failed: {}", base, e);
                return Err(PlugError::Error);
            }
            Err(e) => tracing::debug!("Plug energy {} via {}: {}", base, command, e),
        }
    }
    Err(if responded { PlugError::Unavailable } else { PlugError::Offline })
}

/// Find an `ENERGY` block and convert its kWh `Today` reading to Wh.
pub fn extract_energy(payload: &Value) -> Option<PlugEnergy> {
    ENERGY_SECTIONS.iter().find_map(|section| {
        let data = if *section == "ENERGY" { Some(payload) } else { payload.get(*section) };
        let energy = data?.get("ENERGY")?;
        if !energy.is_object() {
            return None;
        }
        let power_w = coerce_number(energy.get("Power"));
        let today_kwh = coerce_number(energy.get("Today"));
        if power_w.is_none() && today_kwh.is_none() {
            return None;
        }
        Some(PlugEnergy {
            power_w,
            today_wh: today_kwh.map(|kwh| kwh * 1000.0),
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_plug_base_url() {
        assert_eq!(plug_base_url("10.0.0.40"), Some("http://10.0.0.40".to_string()));
        assert_eq!(plug_base_url(" https://plug.lan/ "), Some("https://plug.lan".to_string()));
        assert_eq!(plug_base_url("bad host"), None);
        assert_eq!(plug_base_url("   "), None);
    }

    #[test]
    fn test_parse_power_state() {
        assert_eq!(parse_power_state(&json!({ "POWER": "ON" })).label, "Plug on");
        assert_eq!(parse_power_state(&json!({ "power1": "off" })).severity, Severity::Muted);
        let blinking = parse_power_state(&json!({ "POWER": "Blink" }));
        assert_eq!(blinking.label, "Plug blink");
        assert_eq!(blinking.severity, Severity::Warn);
        assert_eq!(parse_power_state(&json!({ "Status": {} })).label, "Plug unknown");
        assert_eq!(parse_power_state(&json!([1, 2])).label, "Plug unknown");
    }

    #[test]
    fn test_extract_energy_converts_kwh() {
        let payload = json!({ "StatusSNS": { "ENERGY": { "Power": 142, "Today": 0.75 } } });
        let energy = extract_energy(&payload).unwrap();
        assert_eq!(energy.power_w, Some(142.0));
        assert_eq!(energy.today_wh, Some(750.0));
    }

    #[test]
    fn test_extract_energy_section_order() {
        let top_level = json!({ "ENERGY": { "Today": "1.5" } });
        assert_eq!(extract_energy(&top_level).unwrap().today_wh, Some(1500.0));
        let no_data = json!({ "StatusSNS": { "Time": "2026-10-19T10:00:00" } });
        assert_eq!(extract_energy(&no_data), None);
    }

    #[tokio::test]
    async fn test_missing_and_invalid_hosts() {
        let client = Client::new();
        assert_eq!(fetch_plug_status(&client, None).await.label, "Plug missing");
        assert_eq!(fetch_plug_status(&client, Some("a b")).await.label, "Plug invalid");
        assert_eq!(fetch_plug_status(&client, Some("   ")).await.label, "Plug invalid");
        assert_eq!(fetch_plug_energy(&client, Some("")).await, Err(PlugError::Missing));
        let report = PlugEnergyReport::from(fetch_plug_energy(&client, Some("a\tb")).await);
        assert_eq!(report.error.as_deref(), Some("invalid"));
        assert_eq!(report.power_w, None);
    }
}
