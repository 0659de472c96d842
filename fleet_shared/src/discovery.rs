//! Devices found by the local-network scanner.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Scheme {
    Http,
    Https,
}

impl Scheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scheme::Http => "http",
            Scheme::Https => "https",
        }
    }

    pub fn default_port(&self) -> u16 {
        match self {
            Scheme::Http => 80,
            Scheme::Https => 443,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeviceType {
    Octoprint,
    Moonraker,
    Tasmota,
    ElegooNeptune,
    ElegooCenturioCarbon,
    #[serde(other)]
    Unknown,
}

impl DeviceType {
    /// Wire tag, also the primary sort key of scan results.
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceType::Octoprint => "octoprint",
            DeviceType::Moonraker => "moonraker",
            DeviceType::Tasmota => "tasmota",
            DeviceType::ElegooNeptune => "elegoo-neptune",
            DeviceType::ElegooCenturioCarbon => "elegoo-centurio-carbon",
            DeviceType::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct DiscoveredDevice {
    pub host: String,
    pub port: u16,
    pub scheme: Scheme,
    #[serde(rename = "type")]
    pub device_type: DeviceType,
    pub label: String,
    pub name: Option<String>,
    pub url: String,
}

impl DiscoveredDevice {
    pub fn new(
        host: &str,
        port: u16,
        scheme: Scheme,
        device_type: DeviceType,
        label: impl Into<String>,
        name: Option<String>,
    ) -> Self {
        Self {
            host: host.to_string(),
            port,
            scheme,
            device_type,
            label: label.into(),
            name,
            url: device_url(scheme, host, port),
        }
    }

    /// Identity used for de-duplication.
    pub fn key(&self) -> (String, u16, DeviceType) {
        (self.host.clone(), self.port, self.device_type)
    }
}

/// Base URL with the scheme's default port elided.
pub fn device_url(scheme: Scheme, host: &str, port: u16) -> String {
    if port == scheme.default_port() {
        format!("{}://{}", scheme.as_str(), host)
    } else {
        format!("{}://{}:{}", scheme.as_str(), host, port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_elides_default_port() {
        assert_eq!(device_url(Scheme::Http, "10.0.0.5", 80), "http://10.0.0.5");
        assert_eq!(device_url(Scheme::Https, "10.0.0.5", 443), "https://10.0.0.5");
        assert_eq!(device_url(Scheme::Http, "10.0.0.5", 7125), "http://10.0.0.5:7125");
    }

    #[test]
    fn test_type_tag_serialization() {
        let device = DiscoveredDevice::new(
            "10.0.0.9",
            80,
            Scheme::Http,
            DeviceType::ElegooCenturioCarbon,
            "Elegoo Centurio Carbon",
            None,
        );
        let json = serde_json::to_value(&device).unwrap();
        assert_eq!(json["type"], "elegoo-centurio-carbon");
        assert_eq!(json["scheme"], "http");
        let parsed: DeviceType = serde_json::from_str("\"mystery-box\"").unwrap();
        assert_eq!(parsed, DeviceType::Unknown);
    }
}
