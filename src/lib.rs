// printfleet_rs: fleet telemetry core for networked 3D printers and their smart plugs
pub mod accounting;
pub mod adapters;
pub mod discovery;
pub mod http;
pub mod poller;
pub mod print_job;
pub mod upload;

pub use fleet_shared;
