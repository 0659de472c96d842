//! Printer records as owned by the caller, plus the read-only connection snapshot handed to
//! polling workers.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Controller API dialect a printer speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Moonraker,
    Octoprint,
    #[default]
    #[serde(other)]
    Unsupported,
}

impl BackendKind {
    /// Lenient parse used for free-text input (CLI, imported records).
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "moonraker" => BackendKind::Moonraker,
            "octoprint" => BackendKind::Octoprint,
            _ => BackendKind::Unsupported,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Moonraker => "moonraker",
            BackendKind::Octoprint => "octoprint",
            BackendKind::Unsupported => "unsupported",
        }
    }
}

/// Print-time accounting fields. Only the accountant mutates these.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct PrintTime {
    #[serde(default)]
    pub total_seconds: f64,
    #[serde(default)]
    pub today_seconds: f64,
    #[serde(default)]
    pub today_date: Option<NaiveDate>,
    #[serde(default)]
    pub last_elapsed: Option<f64>,
    #[serde(default)]
    pub last_job_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct PrinterRecord {
    pub id: i64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub backend: BackendKind,
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub https: bool,
    #[serde(default = "default_scanning")]
    pub scanning: bool,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub plug_host: Option<String>,
    #[serde(default)]
    pub print_time: PrintTime,
}

fn default_port() -> u16 { 80 }
fn default_scanning() -> bool { true }

impl PrinterRecord {
    pub fn new(id: i64, name: &str, backend: BackendKind, host: &str, port: u16) -> Self {
        Self {
            id,
            name: name.to_string(),
            backend,
            host: host.to_string(),
            port,
            https: false,
            scanning: true,
            token: None,
            api_key: None,
            plug_host: None,
            print_time: PrintTime::default(),
        }
    }

    pub fn target(&self) -> PrinterTarget {
        PrinterTarget::from(self)
    }
}

/// Connection parameters copied out of a [`PrinterRecord`] so workers never hold the record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrinterTarget {
    pub id: i64,
    pub backend: BackendKind,
    pub host: String,
    pub port: u16,
    pub https: bool,
    pub scanning: bool,
    pub token: Option<String>,
    pub api_key: Option<String>,
    pub plug_host: Option<String>,
}

impl PrinterTarget {
    pub fn base_url(&self) -> String {
        let scheme = if self.https { "https" } else { "http" };
        format!("{}://{}:{}", scheme, self.host, self.port)
    }

    /// Token as set on the record, ignoring blank values.
    pub fn token(&self) -> Option<&str> {
        non_blank(self.token.as_deref())
    }

    pub fn api_key(&self) -> Option<&str> {
        non_blank(self.api_key.as_deref())
    }

    pub fn plug_host(&self) -> Option<&str> {
        non_blank(self.plug_host.as_deref())
    }
}

impl From<&PrinterRecord> for PrinterTarget {
    fn from(record: &PrinterRecord) -> Self {
        Self {
            id: record.id,
            backend: record.backend,
            host: record.host.clone(),
            port: record.port,
            https: record.https,
            scanning: record.scanning,
            token: record.token.clone(),
            api_key: record.api_key.clone(),
            plug_host: record.plug_host.clone(),
        }
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_parse_is_lenient() {
        assert_eq!(BackendKind::parse(" Moonraker "), BackendKind::Moonraker);
        assert_eq!(BackendKind::parse("OCTOPRINT"), BackendKind::Octoprint);
        assert_eq!(BackendKind::parse("prusalink"), BackendKind::Unsupported);
    }

    #[test]
    fn test_unknown_backend_deserializes_as_unsupported() {
        let record: PrinterRecord = toml::from_str(
            "id = 3\nhost = '10.0.0.3'\nbackend = 'duet'\n",
        )
        .unwrap();
        assert_eq!(record.backend, BackendKind::Unsupported);
        assert!(record.scanning);
        assert_eq!(record.port, 80);
        assert_eq!(record.print_time, PrintTime::default());
    }

    #[test]
    fn test_base_url_respects_scheme_flag() {
        let mut record = PrinterRecord::new(1, "a", BackendKind::Moonraker, "10.0.0.2", 7125);
        assert_eq!(record.target().base_url(), "http://10.0.0.2:7125");
        record.https = true;
        assert_eq!(record.target().base_url(), "https://10.0.0.2:7125");
    }

    #[test]
    fn test_blank_credentials_are_absent() {
        let mut record = PrinterRecord::new(1, "a", BackendKind::Octoprint, "h", 80);
        record.api_key = Some(String::new());
        assert_eq!(record.target().api_key(), None);
    }
}
