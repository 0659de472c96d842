//! Upload-and-print, with after-the-fact confirmation.
//!
//! A backend can accept a file yet answer the upload with an error or time out before replying.
//! [`PrintSubmitter`] polls the printer briefly to see whether the job started anyway and, if it
//! cannot tell, leaves a [`PendingUpload`] for a later poll cycle to settle.

pub mod matching;
pub mod pending;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use fleet_shared::{BackendKind, PendingUpload, PrinterRecord, PrinterTarget, Settings, normalize_print_via};
use reqwest::Client;
use reqwest::header::HeaderMap;
use reqwest::multipart::{Form, Part};
use serde_json::Value;
use thiserror::Error;

use crate::adapters::{moonraker, octoprint};
use crate::http::{self, FetchError};
use crate::poller::StatusSource;
use crate::print_job::{PrintJobSink, new_job};
use pending::PendingUploads;

pub const UPLOAD_FAILED: &str = "upload_failed";
pub const CONFIRM_ATTEMPTS: usize = 5;
pub const CONFIRM_DELAY: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UploadError {
    #[error("api_key_missing")]
    ApiKeyMissing,
    #[error("api_key_invalid")]
    ApiKeyInvalid,
    #[error("auth_required")]
    AuthRequired,
    #[error("unsupported_backend")]
    UnsupportedBackend,
    #[error("{message}")]
    Failed { message: String },
}

impl UploadError {
    fn failed(message: Option<String>) -> Self {
        UploadError::Failed {
            message: message.unwrap_or_else(|| UPLOAD_FAILED.to_string()),
        }
    }

    /// Reason string reported to callers.
    pub fn reason(&self) -> &str {
        match self {
            UploadError::ApiKeyMissing => "api_key_missing",
            UploadError::ApiKeyInvalid => "api_key_invalid",
            UploadError::AuthRequired => "auth_required",
            UploadError::UnsupportedBackend => "unsupported_backend",
            UploadError::Failed { message } => message,
        }
    }

    /// Failures only the user can fix. The print certainly did not start.
    pub fn is_actionable(&self) -> bool {
        !matches!(self, UploadError::Failed { .. })
    }
}

pub struct UploadDispatcher {
    client: Client,
}

impl UploadDispatcher {
    pub fn new(settings: &Settings) -> Result<Self, FetchError> {
        Self::with_timeout(settings.upload_timeout())
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self, FetchError> {
        let client = http::build_client(http::UPLOAD_USER_AGENT, timeout)?;
        Ok(Self { client })
    }

    /// Upload `content` as `filename` and ask the backend to print it right away.
    pub async fn upload_and_print(
        &self,
        target: &PrinterTarget,
        filename: &str,
        content: Vec<u8>,
    ) -> Result<(), UploadError> {
        let base = target.base_url();
        let (url, headers, form, auth_error) = match target.backend {
            BackendKind::Octoprint => {
                let api_key = target.api_key().ok_or(UploadError::ApiKeyMissing)?;
                let form = Form::new().text("select", "true").text("print", "true");
                (
                    format!("{}/api/files/local", base),
                    octoprint::api_key_headers(api_key),
                    form,
                    UploadError::ApiKeyInvalid,
                )
            }
            BackendKind::Moonraker => (
                format!("{}/server/files/upload", base),
                moonraker::auth_headers(target.token()),
                Form::new().text("print", "true"),
                UploadError::AuthRequired,
            ),
            BackendKind::Unsupported => return Err(UploadError::UnsupportedBackend),
        };
        let form = form.part("file", file_part(filename, content)?);
        self.post(&url, headers, form, auth_error).await
    }

    async fn post(&self, url: &str, headers: HeaderMap, form: Form, auth_error: UploadError) -> Result<(), UploadError> {
        tracing::info!("POST {}", url);
        let response = match self.client.post(url).headers(headers).multipart(form).send().await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!("Upload to {} failed: {}", url, FetchError::from(e));
                return Err(UploadError::failed(None));
            }
        };
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        if matches!(status.as_u16(), 401 | 403) {
            return Err(auth_error);
        }
        let body = response.bytes().await.unwrap_or_default();
        let message = serde_json::from_slice::<Value>(&body).ok().and_then(|v| extract_error(&v));
        tracing::warn!("Upload to {} rejected with HTTP {}", url, status);
        Err(UploadError::failed(message))
    }
}

fn file_part(filename: &str, content: Vec<u8>) -> Result<Part, UploadError> {
    let safe_name = filename.replace(['/', '\\'], "_");
    Part::bytes(content)
        .file_name(safe_name)
        .mime_str(guess_mime(filename))
        .map_err(|e| UploadError::failed(Some(e.to_string())))
}

pub fn guess_mime(filename: &str) -> &'static str {
    let extension = filename.rsplit_once('.').map(|(_, ext)| ext.to_lowercase());
    match extension.as_deref() {
        Some("gcode" | "gco" | "g") => "text/x.gcode",
        Some("txt") => "text/plain",
        Some("json") => "application/json",
        _ => "application/octet-stream",
    }
}

/// Human message from a backend error envelope:
/// `error.message`, `error.error`, a string `error`, or a non-blank `message`.
pub fn extract_error(payload: &Value) -> Option<String> {
    let object = payload.as_object()?;
    match object.get("error") {
        Some(Value::Object(error)) => {
            let nested = ["message", "error"]
                .iter()
                .filter_map(|key| error.get(*key))
                .find(|v| !v.is_null() && v.as_str() != Some(""));
            if let Some(message) = nested {
                return Some(match message {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                });
            }
        }
        Some(Value::String(error)) => return Some(error.clone()),
        _ => {}
    }
    object
        .get("message")
        .and_then(Value::as_str)
        .filter(|m| !m.trim().is_empty())
        .map(str::to_string)
}

/// Poll the printer until it reports `filename` as its active job.
///
/// Sequential by intent: at most `attempts` status calls with `delay` in between.
pub async fn confirm_print_started(
    source: &dyn StatusSource,
    target: &PrinterTarget,
    filename: &str,
    attempts: usize,
    delay: Duration,
) -> bool {
    for attempt in 0..attempts {
        let snapshot = source.printer_status(target, false).await;
        if matching::snapshot_confirms(&snapshot, filename) {
            tracing::info!("Print of {} confirmed on attempt {}", filename, attempt + 1);
            return true;
        }
        if attempt + 1 < attempts {
            tokio::time::sleep(delay).await;
        }
    }
    false
}

/// Result of [`PrintSubmitter::submit`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    Started,
    /// The upload reported a failure, but the printer picked the job up anyway.
    ConfirmedLate,
    /// Unknown yet; a pending entry will be settled by a later poll.
    Pending(UploadError),
    Rejected(UploadError),
}

impl SubmitOutcome {
    pub fn success(&self) -> bool {
        matches!(self, SubmitOutcome::Started | SubmitOutcome::ConfirmedLate)
    }

    pub fn reason(&self) -> &str {
        match self {
            SubmitOutcome::Started | SubmitOutcome::ConfirmedLate => "ok",
            SubmitOutcome::Pending(e) | SubmitOutcome::Rejected(e) => e.reason(),
        }
    }
}

/// Upload, confirm, and book-keep one print submission.
pub struct PrintSubmitter {
    dispatcher: UploadDispatcher,
    source: Arc<dyn StatusSource>,
    pending: PendingUploads,
    sink: Arc<dyn PrintJobSink>,
    confirm_attempts: usize,
    confirm_delay: Duration,
}

impl PrintSubmitter {
    pub fn new(
        dispatcher: UploadDispatcher,
        source: Arc<dyn StatusSource>,
        pending: PendingUploads,
        sink: Arc<dyn PrintJobSink>,
    ) -> Self {
        Self {
            dispatcher,
            source,
            pending,
            sink,
            confirm_attempts: CONFIRM_ATTEMPTS,
            confirm_delay: CONFIRM_DELAY,
        }
    }

    pub fn with_confirmation(mut self, attempts: usize, delay: Duration) -> Self {
        self.confirm_attempts = attempts;
        self.confirm_delay = delay;
        self
    }

    pub fn pending(&self) -> &PendingUploads {
        &self.pending
    }

    pub async fn submit(
        &self,
        printer: &PrinterRecord,
        filename: &str,
        content: Vec<u8>,
        username: &str,
        print_via: Option<&str>,
    ) -> SubmitOutcome {
        let target = printer.target();
        let error = match self.dispatcher.upload_and_print(&target, filename, content).await {
            Ok(()) => {
                self.record_job(printer, filename, username, print_via).await;
                return SubmitOutcome::Started;
            }
            Err(e) if e.is_actionable() => return SubmitOutcome::Rejected(e),
            Err(e) => e,
        };

        let confirmed = confirm_print_started(
            self.source.as_ref(),
            &target,
            filename,
            self.confirm_attempts,
            self.confirm_delay,
        )
        .await;
        if confirmed {
            self.record_job(printer, filename, username, print_via).await;
            return SubmitOutcome::ConfirmedLate;
        }

        self.pending
            .record(PendingUpload {
                printer_id: printer.id,
                filename: filename.to_string(),
                printer_name: printer.name.clone(),
                username: username.to_string(),
                print_via: normalize_print_via(print_via),
                created_at: Utc::now(),
            })
            .await;
        SubmitOutcome::Pending(error)
    }

    async fn record_job(&self, printer: &PrinterRecord, filename: &str, username: &str, print_via: Option<&str>) {
        let job = new_job(printer, filename, username, print_via, Utc::now());
        if let Err(e) = self.sink.record(job).await {
            tracing::error!("Print of {} started but could not be recorded: {}", filename, e);
        }
    }
}
