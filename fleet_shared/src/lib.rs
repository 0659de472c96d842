// fleet_shared: data model shared by the poller, accountant, scanner and upload path

pub mod config;
pub mod discovery;
pub mod printer;
pub mod status;
pub mod upload;

pub use config::{ConfigError, FleetConfig, Settings, load_config};
pub use discovery::{DeviceType, DiscoveredDevice, Scheme};
pub use printer::{BackendKind, PrintTime, PrinterRecord, PrinterTarget};
pub use status::{JobState, PlugStatus, Severity, StatusSnapshot, Temperatures, normalize_job_state};
pub use upload::{PendingUpload, PrintJobRecord, normalize_print_via};
