// src/upload/pending.rs - uploads awaiting confirmation from a later poll
use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use fleet_shared::{PendingUpload, PrintJobRecord, StatusSnapshot};
use tokio::sync::Mutex;

use super::matching::{pending_key, snapshot_confirms};
use crate::print_job::PrintJobSink;

pub const PENDING_UPLOAD_TTL_MINUTES: i64 = 30;

/// Shared table of unconfirmed uploads, keyed by printer and normalized filename.
///
/// Clones share the same table. Expired entries are dropped on every access.
#[derive(Clone)]
pub struct PendingUploads {
    entries: Arc<Mutex<HashMap<(i64, String), PendingUpload>>>,
    ttl: TimeDelta,
}

impl Default for PendingUploads {
    fn default() -> Self {
        Self::new()
    }
}

impl PendingUploads {
    pub fn new() -> Self {
        Self::with_ttl(TimeDelta::minutes(PENDING_UPLOAD_TTL_MINUTES))
    }

    pub fn with_ttl(ttl: TimeDelta) -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
            ttl,
        }
    }

    /// Insert or replace the entry for this printer and filename.
    pub async fn record(&self, pending: PendingUpload) {
        let mut entries = self.entries.lock().await;
        purge(&mut entries, self.ttl, Utc::now());
        let key = (pending.printer_id, pending_key(&pending.filename));
        tracing::info!("Pending upload {} on printer {}", pending.filename, pending.printer_id);
        entries.insert(key, pending);
    }

    pub async fn purge_expired(&self) -> usize {
        self.purge_expired_at(Utc::now()).await
    }

    /// Drop entries older than the TTL as of `now`; returns how many were removed.
    pub async fn purge_expired_at(&self, now: DateTime<Utc>) -> usize {
        let mut entries = self.entries.lock().await;
        purge(&mut entries, self.ttl, now)
    }

    pub async fn pending_for(&self, printer_id: i64) -> Vec<PendingUpload> {
        let mut entries = self.entries.lock().await;
        purge(&mut entries, self.ttl, Utc::now());
        entries
            .values()
            .filter(|p| p.printer_id == printer_id)
            .cloned()
            .collect()
    }

    pub async fn len(&self) -> usize {
        let mut entries = self.entries.lock().await;
        purge(&mut entries, self.ttl, Utc::now());
        entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Finalize every pending upload whose printer now reports it as the active job.
    ///
    /// Matched entries are removed under the lock before the sink is called, so concurrent
    /// reconciliations cannot record the same upload twice. Entries the sink rejects are put back.
    pub async fn reconcile(
        &self,
        statuses: &HashMap<i64, StatusSnapshot>,
        sink: &dyn PrintJobSink,
    ) -> Vec<PrintJobRecord> {
        let matched: Vec<((i64, String), PendingUpload)> = {
            let mut entries = self.entries.lock().await;
            purge(&mut entries, self.ttl, Utc::now());
            let keys: Vec<(i64, String)> = entries
                .iter()
                .filter(|(_, pending)| {
                    statuses
                        .get(&pending.printer_id)
                        .is_some_and(|snapshot| snapshot_confirms(snapshot, &pending.filename))
                })
                .map(|(key, _)| key.clone())
                .collect();
            keys.into_iter()
                .filter_map(|key| entries.remove(&key).map(|pending| (key, pending)))
                .collect()
        };

        let mut recorded = Vec::with_capacity(matched.len());
        for (key, pending) in matched {
            match sink.record(PrintJobRecord::from(&pending)).await {
                Ok(job) => {
                    tracing::info!("Confirmed pending upload {} on printer {}", pending.filename, pending.printer_id);
                    recorded.push(job);
                }
                Err(e) => {
                    tracing::warn!("Could not record print job for {}: {}", pending.filename, e);
                    self.entries.lock().await.entry(key).or_insert(pending);
                }
            }
        }
        recorded
    }
}

fn purge(entries: &mut HashMap<(i64, String), PendingUpload>, ttl: TimeDelta, now: DateTime<Utc>) -> usize {
    let before = entries.len();
    entries.retain(|_, pending| now - pending.created_at <= ttl);
    before - entries.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::print_job::{InMemoryPrintJobLog, PrintJobError};
    use fleet_shared::Severity;

    fn pending(printer_id: i64, filename: &str, created_at: DateTime<Utc>) -> PendingUpload {
        PendingUpload {
            printer_id,
            filename: filename.to_string(),
            printer_name: format!("printer-{}", printer_id),
            username: "ada".to_string(),
            print_via: "webui".to_string(),
            created_at,
        }
    }

    fn printing(job: &str) -> StatusSnapshot {
        let mut snapshot = StatusSnapshot::new("Printing", Severity::Ok);
        snapshot.job_name = Some(job.to_string());
        snapshot
    }

    #[tokio::test]
    async fn test_same_name_replaces_entry() {
        let table = PendingUploads::new();
        table.record(pending(1, "Benchy.gcode", Utc::now())).await;
        table.record(pending(1, "uploads/benchy.GCODE", Utc::now())).await;
        table.record(pending(2, "benchy.gcode", Utc::now())).await;
        assert_eq!(table.len().await, 2);
        let for_one = table.pending_for(1).await;
        assert_eq!(for_one.len(), 1);
        assert_eq!(for_one[0].filename, "uploads/benchy.GCODE");
    }

    #[tokio::test]
    async fn test_expired_entries_are_purged() {
        let table = PendingUploads::new();
        let now = Utc::now();
        table.record(pending(1, "old.gcode", now - TimeDelta::minutes(31))).await;
        table.record(pending(1, "new.gcode", now)).await;
        // the stale entry is dropped lazily on the next access
        assert_eq!(table.pending_for(1).await.len(), 1);
        assert_eq!(table.purge_expired_at(now + TimeDelta::minutes(45)).await, 1);
        assert!(table.is_empty().await);
    }

    #[tokio::test]
    async fn test_reconcile_finalizes_once() {
        let table = PendingUploads::new();
        let log = InMemoryPrintJobLog::new();
        table.record(pending(1, "Benchy.gcode", Utc::now())).await;

        let statuses = HashMap::from([(1, printing("gcodes/benchy.gcode"))]);
        let first = table.reconcile(&statuses, &log).await;
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].print_via, "Web UI");
        let second = table.reconcile(&statuses, &log).await;
        assert!(second.is_empty());
        assert_eq!(log.len().await, 1);
        assert!(table.is_empty().await);
    }

    #[tokio::test]
    async fn test_reconcile_ignores_other_printers_and_jobs() {
        let table = PendingUploads::new();
        let log = InMemoryPrintJobLog::new();
        table.record(pending(1, "benchy.gcode", Utc::now())).await;
        let statuses = HashMap::from([(2, printing("benchy.gcode")), (1, printing("cube.gcode"))]);
        assert!(table.reconcile(&statuses, &log).await.is_empty());
        assert_eq!(table.len().await, 1);
    }

    struct RejectingSink;

    #[async_trait::async_trait]
    impl PrintJobSink for RejectingSink {
        async fn record(&self, _job: PrintJobRecord) -> Result<PrintJobRecord, PrintJobError> {
            Err(PrintJobError::Unavailable("store offline".to_string()))
        }
    }

    #[tokio::test]
    async fn test_rejected_jobs_stay_pending() {
        let table = PendingUploads::new();
        table.record(pending(1, "benchy.gcode", Utc::now())).await;
        let statuses = HashMap::from([(1, printing("benchy.gcode"))]);
        assert!(table.reconcile(&statuses, &RejectingSink).await.is_empty());
        assert_eq!(table.len().await, 1);

        let log = InMemoryPrintJobLog::new();
        assert_eq!(table.reconcile(&statuses, &log).await.len(), 1);
    }
}
