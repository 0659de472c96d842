//! Bounded-concurrency status polling.
//!
//! One task per printer, at most [`MAX_STATUS_WORKERS`] running at once. A worker that panics is
//! reported as a `"Status error"` snapshot for its printer; the batch itself never fails.

use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use fleet_shared::{PlugStatus, PrinterRecord, PrinterTarget, Settings, Severity, StatusSnapshot};
use futures::FutureExt;
use reqwest::Client;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::adapters::{self, tasmota};
use crate::adapters::tasmota::{PlugEnergyReport, PlugError};
use crate::http::{self, FetchError};

pub const MAX_STATUS_WORKERS: usize = 16;

/// Anything that can answer status questions about a printer.
#[async_trait]
pub trait StatusSource: Send + Sync + 'static {
    async fn printer_status(&self, target: &PrinterTarget, include_plug: bool) -> StatusSnapshot;
    async fn plug_status(&self, target: &PrinterTarget) -> PlugStatus;
    async fn plug_energy(&self, target: &PrinterTarget) -> PlugEnergyReport;
}

/// The real thing: HTTP adapters over one shared client.
pub struct HttpStatusSource {
    client: Client,
}

impl HttpStatusSource {
    pub fn new(settings: &Settings) -> Result<Self, FetchError> {
        let client = http::build_client(http::STATUS_USER_AGENT, settings.status_timeout())?;
        Ok(Self { client })
    }
}

#[async_trait]
impl StatusSource for HttpStatusSource {
    async fn printer_status(&self, target: &PrinterTarget, include_plug: bool) -> StatusSnapshot {
        adapters::printer_status(&self.client, target, include_plug).await
    }

    async fn plug_status(&self, target: &PrinterTarget) -> PlugStatus {
        tasmota::fetch_plug_status(&self.client, target.plug_host()).await
    }

    async fn plug_energy(&self, target: &PrinterTarget) -> PlugEnergyReport {
        tasmota::fetch_plug_energy(&self.client, target.plug_host()).await.into()
    }
}

pub struct StatusPoller {
    source: Arc<dyn StatusSource>,
    max_workers: usize,
}

impl StatusPoller {
    pub fn new(source: Arc<dyn StatusSource>) -> Self {
        Self {
            source,
            max_workers: MAX_STATUS_WORKERS,
        }
    }

    pub fn http(settings: &Settings) -> Result<Self, FetchError> {
        Ok(Self::new(Arc::new(HttpStatusSource::new(settings)?)))
    }

    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers.max(1);
        self
    }

    pub fn source(&self) -> Arc<dyn StatusSource> {
        Arc::clone(&self.source)
    }

    /// Poll every printer once. Returns a snapshot per printer id; after cancellation only the
    /// snapshots that already finished are returned.
    pub async fn collect(
        &self,
        printers: &[PrinterRecord],
        include_plug: bool,
        cancel: &CancellationToken,
    ) -> HashMap<i64, StatusSnapshot> {
        let jobs = printers.iter().map(|printer| {
            let source = self.source();
            let target = printer.target();
            (printer.id, async move { source.printer_status(&target, include_plug).await })
        });
        let statuses = fan_out(jobs, self.max_workers, cancel, |message| {
            StatusSnapshot::new("Status error", Severity::Error).with_error(message)
        })
        .await;
        tracing::debug!("Collected {} of {} printer statuses", statuses.len(), printers.len());
        statuses
    }

    /// Plug power state for every printer with a plug attached.
    pub async fn collect_plug_statuses(
        &self,
        printers: &[PrinterRecord],
        cancel: &CancellationToken,
    ) -> HashMap<i64, PlugStatus> {
        let jobs = with_plug(printers).map(|target| {
            let source = self.source();
            (target.id, async move { source.plug_status(&target).await })
        });
        fan_out(jobs, self.max_workers, cancel, |_| PlugStatus::new("Plug error", Severity::Muted)).await
    }

    /// Plug energy readings for every printer with a plug attached.
    pub async fn collect_plug_energy(
        &self,
        printers: &[PrinterRecord],
        cancel: &CancellationToken,
    ) -> HashMap<i64, PlugEnergyReport> {
        let jobs = with_plug(printers).map(|target| {
            let source = self.source();
            (target.id, async move { source.plug_energy(&target).await })
        });
        fan_out(jobs, self.max_workers, cancel, |_| {
            PlugEnergyReport::from(Err::<tasmota::PlugEnergy, _>(PlugError::Error))
        })
        .await
    }
}

fn with_plug(printers: &[PrinterRecord]) -> impl Iterator<Item = PrinterTarget> + '_ {
    printers
        .iter()
        .map(PrinterRecord::target)
        .filter(|target| target.plug_host().is_some())
}

/// Run keyed futures with at most `max_workers` in flight and collect their outputs.
///
/// A panicking future is turned into `on_fault(message)` under its own key. Once `cancel` fires,
/// queued futures never start and unfinished ones are aborted.
pub(crate) async fn fan_out<K, R, Fut>(
    jobs: impl IntoIterator<Item = (K, Fut)>,
    max_workers: usize,
    cancel: &CancellationToken,
    on_fault: impl Fn(String) -> R,
) -> HashMap<K, R>
where
    K: std::hash::Hash + Eq + Send + 'static,
    R: Send + 'static,
    Fut: Future<Output = R> + Send + 'static,
{
    let jobs: Vec<(K, Fut)> = jobs.into_iter().collect();
    let mut results = HashMap::with_capacity(jobs.len());
    if jobs.is_empty() {
        return results;
    }
    let semaphore = Arc::new(Semaphore::new(max_workers.clamp(1, jobs.len())));
    let mut set = JoinSet::new();
    for (key, job) in jobs {
        let semaphore = Arc::clone(&semaphore);
        let cancel = cancel.clone();
        set.spawn(async move {
            let _permit = tokio::select! {
                permit = semaphore.acquire_owned() => permit.ok()?,
                _ = cancel.cancelled() => return None,
            };
            let outcome = AssertUnwindSafe(job).catch_unwind().await;
            Some((key, outcome.map_err(panic_message)))
        });
    }

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::info!("Fan-out cancelled with {} tasks outstanding", set.len());
                break;
            }
            joined = set.join_next() => match joined {
                None => break,
                Some(Ok(Some((key, Ok(result))))) => {
                    results.insert(key, result);
                }
                Some(Ok(Some((key, Err(message))))) => {
                    tracing::warn!("Worker fault: {}", message);
                    results.insert(key, on_fault(message));
                }
                Some(Ok(None)) => {}
                Some(Err(e)) => tracing::warn!("Worker task failed: {}", e),
            }
        }
    }
    results
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "worker panicked".to_string()
    }
}
