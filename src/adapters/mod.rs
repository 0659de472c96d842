//! Protocol adapters: backend JSON in, [`StatusSnapshot`] out.
//!
//! Adapters never fail. Every transport or payload problem is folded into a labelled snapshot
//! (`"Offline"`, `"Auth required"`, ...), and malformed fields are treated as missing data.

pub mod moonraker;
pub mod octoprint;
pub mod tasmota;

use fleet_shared::{BackendKind, PrinterTarget, Severity, StatusSnapshot};
use reqwest::Client;
use serde_json::Value;

/// Fetch a printer's status through the adapter for its backend.
///
/// With `include_plug`, the plug is queried first and merged into the result even when the
/// backend call fails. Printers with scanning disabled are not contacted at all.
pub async fn printer_status(client: &Client, target: &PrinterTarget, include_plug: bool) -> StatusSnapshot {
    if !target.scanning {
        return StatusSnapshot::new("Scanning off", Severity::Muted);
    }
    let plug = match target.plug_host() {
        Some(host) if include_plug => Some(tasmota::fetch_plug_status(client, Some(host)).await),
        _ => None,
    };
    let snapshot = match target.backend {
        BackendKind::Moonraker => moonraker::fetch_status(client, target).await,
        BackendKind::Octoprint => octoprint::fetch_status(client, target).await,
        BackendKind::Unsupported => StatusSnapshot::new("Unsupported", Severity::Muted),
    };
    snapshot.with_plug(plug)
}

/// Lenient numeric read: JSON numbers and numeric strings, anything else is `None`.
pub(crate) fn coerce_number(value: Option<&Value>) -> Option<f64> {
    let number = match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    number.is_finite().then_some(number)
}

/// Non-empty string field.
pub(crate) fn non_empty_str(value: Option<&Value>) -> Option<&str> {
    value.and_then(Value::as_str).filter(|s| !s.trim().is_empty())
}

pub(crate) fn is_truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|v| v != 0.0),
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(a)) => !a.is_empty(),
        Some(Value::Object(o)) => !o.is_empty(),
    }
}

/// Seconds left given elapsed time and a completion fraction in (0, 1].
pub fn remaining_from_fraction(elapsed: Option<f64>, fraction: Option<f64>) -> Option<f64> {
    match (elapsed, fraction) {
        (Some(elapsed), Some(fraction)) if fraction > 0.0 => Some(elapsed * (1.0 - fraction) / fraction),
        _ => None,
    }
}
