// src/discovery/fingerprint.rs - classify a probed endpoint from its page content
use std::sync::OnceLock;

use fleet_shared::DeviceType;
use regex::Regex;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fingerprint {
    pub device_type: DeviceType,
    pub label: String,
}

impl Fingerprint {
    fn new(device_type: DeviceType, label: impl Into<String>) -> Self {
        Self {
            device_type,
            label: label.into(),
        }
    }
}

fn neptune_regex() -> &'static Regex {
    static NEPTUNE_REGEX: OnceLock<Regex> = OnceLock::new();
    NEPTUNE_REGEX.get_or_init(|| Regex::new(r"neptune[-_\s]*4[-_\s]*(plus|pro|max)?").unwrap())
}

fn title_regex() -> &'static Regex {
    static TITLE_REGEX: OnceLock<Regex> = OnceLock::new();
    TITLE_REGEX.get_or_init(|| Regex::new(r"(?is)<title>(.*?)</title>").unwrap())
}

/// Elegoo Neptune model detection from a hostname or page body.
pub fn detect_neptune(text: &str) -> Option<Fingerprint> {
    let lower = text.to_lowercase();
    if !lower.contains("neptune") {
        return None;
    }
    let label = match neptune_regex().captures(&lower) {
        Some(caps) => match caps.get(1) {
            Some(variant) => format!("Elegoo Neptune 4 {}", title_case(variant.as_str())),
            None => "Elegoo Neptune 4".to_string(),
        },
        None => "Elegoo Neptune".to_string(),
    };
    Some(Fingerprint::new(DeviceType::ElegooNeptune, label))
}

/// Fingerprint cascade for a fetched `/` page. First match wins.
pub fn detect_from_page(body: &str, server: Option<&str>) -> Option<Fingerprint> {
    let lower = body.to_lowercase();
    let server = server.unwrap_or_default().to_lowercase();
    if server.contains("tasmota") || lower.contains("tasmota") {
        return Some(Fingerprint::new(DeviceType::Tasmota, "Tasmota Plug"));
    }
    if lower.contains("octoprint") {
        return Some(Fingerprint::new(DeviceType::Octoprint, "OctoPrint"));
    }
    if let Some(neptune) = detect_neptune(body) {
        return Some(neptune);
    }
    let klipper_ui = ["mainsail", "fluidd", "klipper"].iter().any(|t| lower.contains(t));
    if lower.contains("elegoo") && klipper_ui {
        return Some(Fingerprint::new(DeviceType::ElegooNeptune, "Elegoo Neptune"));
    }
    if lower.contains("mainsail") {
        return Some(Fingerprint::new(DeviceType::Moonraker, "Mainsail (Moonraker)"));
    }
    if lower.contains("fluidd") {
        return Some(Fingerprint::new(DeviceType::Moonraker, "Fluidd (Moonraker)"));
    }
    if ["elegoo", "centauri", "centurio"].iter().any(|t| lower.contains(t)) {
        return Some(Fingerprint::new(DeviceType::ElegooCenturioCarbon, "Elegoo Centurio Carbon"));
    }
    None
}

/// Page `<title>` with runs of whitespace collapsed.
pub fn extract_title(body: &str) -> Option<String> {
    let raw = title_regex().captures(body)?.get(1)?.as_str();
    let title = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    (!title.is_empty()).then_some(title)
}

fn title_case(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
