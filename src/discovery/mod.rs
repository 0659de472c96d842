//! # Network Discovery
//!
//! Sweeps every owned /24 on a fixed port list and fingerprints whatever answers. Port 7125 is
//! asked for Moonraker's `/server/info`; every other port serves `/` to the
//! [`fingerprint`] cascade. Probe failures are dropped silently, so an empty network yields an
//! empty list.

pub mod fingerprint;
pub mod subnets;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use fleet_shared::{DeviceType, DiscoveredDevice, Scheme, Settings};
use reqwest::Client;
use reqwest::header::HeaderMap;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::http::{self, FetchError};
use crate::poller::fan_out;

pub const SCAN_PORTS: [u16; 6] = [80, 443, 5000, 7125, 8080, 3030];
pub const MAX_SCAN_WORKERS: usize = 64;
pub const DEFAULT_SCAN_TIMEOUT: Duration = Duration::from_millis(600);

#[derive(Debug, Clone)]
pub struct ScanConfig {
    pub ports: Vec<u16>,
    /// Port probed as a Moonraker API rather than a web page.
    pub moonraker_port: u16,
    /// Port probed over https.
    pub https_port: u16,
    pub timeout: Duration,
    pub max_workers: usize,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            ports: SCAN_PORTS.to_vec(),
            moonraker_port: 7125,
            https_port: 443,
            timeout: DEFAULT_SCAN_TIMEOUT,
            max_workers: MAX_SCAN_WORKERS,
        }
    }
}

impl ScanConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            timeout: settings.scan_timeout(),
            ..Self::default()
        }
    }
}

#[derive(Clone)]
pub struct Scanner {
    client: Client,
    config: Arc<ScanConfig>,
}

impl Scanner {
    pub fn new(config: ScanConfig) -> Result<Self, FetchError> {
        let client = http::build_client(http::SCAN_USER_AGENT, config.timeout)?;
        Ok(Self {
            client,
            config: Arc::new(config),
        })
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    /// Scan every local /24. Cancelling returns the devices found so far.
    pub async fn scan(&self, cancel: &CancellationToken) -> Vec<DiscoveredDevice> {
        let subnets = match tokio::task::spawn_blocking(subnets::local_subnets).await {
            Ok(subnets) => subnets,
            Err(e) => {
                tracing::warn!("Subnet enumeration failed: {}", e);
                return Vec::new();
            }
        };
        if subnets.is_empty() {
            tracing::info!("No local IPv4 subnets found, nothing to scan");
            return Vec::new();
        }
        for subnet in &subnets {
            tracing::info!("Scanning {}", subnet);
        }
        let hosts = subnets
            .iter()
            .flat_map(|s| s.hosts())
            .map(|ip| ip.to_string())
            .collect();
        self.scan_hosts(hosts, cancel).await
    }

    /// Probe every configured port on each of `hosts`.
    pub async fn scan_hosts(&self, hosts: Vec<String>, cancel: &CancellationToken) -> Vec<DiscoveredDevice> {
        let mut jobs = Vec::with_capacity(hosts.len() * self.config.ports.len());
        for host in hosts {
            for &port in &self.config.ports {
                let scanner = self.clone();
                let target = host.clone();
                jobs.push(((host.clone(), port), async move { scanner.probe(&target, port).await }));
            }
        }
        let probes = jobs.len();
        let found = fan_out(jobs, self.config.max_workers, cancel, |_| None).await;
        let devices = dedup_and_sort(found.into_values().flatten());
        tracing::info!("Scan finished: {} probes, {} devices", probes, devices.len());
        devices
    }

    /// Probe a single host and port.
    pub async fn probe(&self, host: &str, port: u16) -> Option<DiscoveredDevice> {
        let scheme = if port == self.config.https_port { Scheme::Https } else { Scheme::Http };
        let base = format!("{}://{}:{}", scheme.as_str(), host, port);
        if port == self.config.moonraker_port {
            let info = http::fetch_json(&self.client, &format!("{}/server/info", base), HeaderMap::new())
                .await
                .ok()?;
            return classify_moonraker(&info)
                .map(|(fp, name)| DiscoveredDevice::new(host, port, scheme, fp.device_type, fp.label, name));
        }
        let page = match http::fetch_page(&self.client, &format!("{}/", base)).await {
            Ok(page) => page,
            Err(e) => {
                tracing::trace!("Probe {} failed: {}", base, e);
                return None;
            }
        };
        if !(200..500).contains(&page.status) {
            return None;
        }
        let fp = fingerprint::detect_from_page(&page.body, page.server.as_deref())?;
        let name = fingerprint::extract_title(&page.body);
        Some(DiscoveredDevice::new(host, port, scheme, fp.device_type, fp.label, name))
    }
}

/// Classify a `/server/info` response. The device name is the host's reported hostname.
pub fn classify_moonraker(info: &Value) -> Option<(fingerprint::Fingerprint, Option<String>)> {
    let result = info.get("result")?.as_object()?;
    if !result.contains_key("moonraker_version") && !result.contains_key("klippy_connected") {
        return None;
    }
    let name = result
        .get("system_info")
        .and_then(|s| s.get("hostname"))
        .and_then(Value::as_str)
        .filter(|h| !h.is_empty())
        .map(str::to_string);
    let fp = name
        .as_deref()
        .and_then(fingerprint::detect_neptune)
        .unwrap_or(fingerprint::Fingerprint {
            device_type: DeviceType::Moonraker,
            label: "Moonraker".to_string(),
        });
    Some((fp, name))
}

/// Collapse devices sharing (host, port, type), then order by (type, host, port).
pub fn dedup_and_sort(devices: impl IntoIterator<Item = DiscoveredDevice>) -> Vec<DiscoveredDevice> {
    let mut seen = HashSet::new();
    let mut unique: Vec<DiscoveredDevice> = devices
        .into_iter()
        .filter(|device| seen.insert(device.key()))
        .collect();
    unique.sort_by(|a, b| {
        (a.device_type.as_str(), &a.host, a.port).cmp(&(b.device_type.as_str(), &b.host, b.port))
    });
    unique
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_dedup_collapses_same_key() {
        let devices = vec![
            DiscoveredDevice::new("10.0.0.9", 80, Scheme::Http, DeviceType::Moonraker, "Mainsail (Moonraker)", None),
            DiscoveredDevice::new("10.0.0.9", 80, Scheme::Http, DeviceType::Moonraker, "Fluidd (Moonraker)", None),
            DiscoveredDevice::new("10.0.0.2", 80, Scheme::Http, DeviceType::Tasmota, "Tasmota Plug", None),
            DiscoveredDevice::new("10.0.0.2", 5000, Scheme::Http, DeviceType::Octoprint, "OctoPrint", None),
        ];
        let unique = dedup_and_sort(devices);
        assert_eq!(unique.len(), 3);
        let order: Vec<_> = unique.iter().map(|d| d.device_type).collect();
        assert_eq!(order, vec![DeviceType::Moonraker, DeviceType::Octoprint, DeviceType::Tasmota]);
        assert_eq!(unique[0].label, "Mainsail (Moonraker)");
    }

    #[test]
    fn test_classify_moonraker() {
        let info = json!({ "result": {
            "klippy_connected": true,
            "moonraker_version": "v0.8.0",
            "system_info": { "hostname": "neptune4-plus" }
        }});
        let (fp, name) = classify_moonraker(&info).unwrap();
        assert_eq!(fp.device_type, DeviceType::ElegooNeptune);
        assert_eq!(fp.label, "Elegoo Neptune 4 Plus");
        assert_eq!(name.as_deref(), Some("neptune4-plus"));

        let plain = json!({ "result": { "klippy_connected": false } });
        let (fp, name) = classify_moonraker(&plain).unwrap();
        assert_eq!(fp.label, "Moonraker");
        assert_eq!(name, None);

        assert!(classify_moonraker(&json!({ "result": { "state": "ready" } })).is_none());
    }

    #[tokio::test]
    async fn test_unreachable_hosts_yield_nothing() {
        let scanner = Scanner::new(ScanConfig {
            ports: vec![9],
            timeout: Duration::from_millis(100),
            ..ScanConfig::default()
        })
        .unwrap();
        let devices = scanner
            .scan_hosts(vec!["127.0.0.1".to_string()], &CancellationToken::new())
            .await;
        assert!(devices.is_empty());
    }
}
