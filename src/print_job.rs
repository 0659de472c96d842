// src/print_job.rs - print job bookkeeping sink
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fleet_shared::{PrintJobRecord, PrinterRecord, normalize_print_via};
use thiserror::Error;
use tokio::sync::Mutex;

#[derive(Debug, Error)]
pub enum PrintJobError {
    #[error("print job store unavailable: {0}")]
    Unavailable(String),
    #[error("rejected print job: {0}")]
    Rejected(String),
}

/// Where finalized print jobs go. Persisting them is the caller's business.
#[async_trait]
pub trait PrintJobSink: Send + Sync + 'static {
    async fn record(&self, job: PrintJobRecord) -> Result<PrintJobRecord, PrintJobError>;
}

/// Build a job record for a print that just started on `printer`.
pub fn new_job(
    printer: &PrinterRecord,
    filename: &str,
    username: &str,
    print_via: Option<&str>,
    job_date: DateTime<Utc>,
) -> PrintJobRecord {
    PrintJobRecord {
        id: String::new(),
        job_date,
        gcode_filename: filename.to_string(),
        printer_name: printer.name.clone(),
        username: username.to_string(),
        print_via: normalize_print_via(print_via),
    }
}

/// In-memory job log for the CLI and tests.
#[derive(Clone, Default)]
pub struct InMemoryPrintJobLog {
    jobs: Arc<Mutex<Vec<PrintJobRecord>>>,
}

impl InMemoryPrintJobLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn jobs(&self) -> Vec<PrintJobRecord> {
        self.jobs.lock().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.jobs.lock().await.len()
    }
}

#[async_trait]
impl PrintJobSink for InMemoryPrintJobLog {
    async fn record(&self, mut job: PrintJobRecord) -> Result<PrintJobRecord, PrintJobError> {
        if job.gcode_filename.trim().is_empty() {
            return Err(PrintJobError::Rejected("empty filename".to_string()));
        }
        if job.id.is_empty() {
            job.id = uuid::Uuid::new_v4().to_string();
        }
        tracing::info!("Recorded print job {} ({} on {})", job.id, job.gcode_filename, job.printer_name);
        self.jobs.lock().await.push(job.clone());
        Ok(job)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleet_shared::BackendKind;

    #[tokio::test]
    async fn test_in_memory_log_assigns_ids() {
        let log = InMemoryPrintJobLog::new();
        let printer = PrinterRecord::new(3, "Prusa", BackendKind::Octoprint, "10.0.0.3", 80);
        let job = new_job(&printer, "bracket.gcode", "ada", Some("web-ui"), Utc::now());
        let stored = log.record(job).await.unwrap();
        assert!(!stored.id.is_empty());
        assert_eq!(stored.print_via, "Web UI");
        assert_eq!(stored.printer_name, "Prusa");
        assert_eq!(log.len().await, 1);
    }

    #[tokio::test]
    async fn test_empty_filename_rejected() {
        let log = InMemoryPrintJobLog::new();
        let printer = PrinterRecord::new(3, "Prusa", BackendKind::Octoprint, "10.0.0.3", 80);
        let job = new_job(&printer, " ", "ada", None, Utc::now());
        assert!(matches!(log.record(job).await, Err(PrintJobError::Rejected(_))));
        assert!(log.jobs().await.is_empty());
    }
}
