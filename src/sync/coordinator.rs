//! Debounced write propagation.
//!
//! The coordinator turns discrete content edits into snapshot writes:
//! 1. `queue_update` replaces any pending update of the same type and re-arms one shared timer
//! 2. When the timer fires, the whole pending map is swapped out and written type by type
//! 3. Each successful write invalidates the type's cache prefixes
//! 4. A batch with at least one write triggers page revalidation
//!
//! The worker publishes its state on a watch channel after every change, so
//! `status` reads it without waiting for a flush in progress.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use metrics::{counter, histogram};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{Instant, sleep_until};
use tracing::{debug, info, instrument, warn};

use crate::application::repos::SnapshotsRepo;
use crate::application::revalidate::PageRevalidator;
use crate::cache::ReadThroughCache;
use crate::domain::content::ContentUpdate;
use crate::domain::error::DomainError;
use crate::domain::types::ContentType;

use super::state::{PendingUpdate, SyncPhase, SyncState};

const METRIC_SYNC_FLUSH_MS: &str = "showcase_sync_flush_ms";
const METRIC_SYNC_COALESCED: &str = "showcase_sync_coalesced_total";
const DEFAULT_DEBOUNCE_MS: u64 = 1000;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("sync coordinator has stopped")]
    Stopped,
    #[error("payload rejected: {0}")]
    Shape(#[from] DomainError),
}

#[derive(Debug, Clone, Copy)]
pub struct SyncConfig {
    pub debounce: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(DEFAULT_DEBOUNCE_MS),
        }
    }
}

impl From<&crate::config::SyncSettings> for SyncConfig {
    fn from(settings: &crate::config::SyncSettings) -> Self {
        Self {
            debounce: settings.debounce,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum FlushStatus {
    /// Snapshot written; `invalidated` cache entries removed.
    Written { invalidated: u64 },
    /// The snapshot store reported failure; the previous document is kept.
    WriteFailed,
    /// The payload could not be shaped into a document.
    Rejected { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlushOutcome {
    #[serde(rename = "type")]
    pub content_type: ContentType,
    #[serde(flatten)]
    pub status: FlushStatus,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlushReport {
    pub outcomes: Vec<FlushOutcome>,
    pub revalidated: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revalidation_error: Option<String>,
    pub elapsed_ms: u64,
}

impl FlushReport {
    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    pub fn written(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|outcome| matches!(outcome.status, FlushStatus::Written { .. }))
            .count()
    }

    pub fn outcome(&self, content_type: ContentType) -> Option<&FlushStatus> {
        self.outcomes
            .iter()
            .find(|outcome| outcome.content_type == content_type)
            .map(|outcome| &outcome.status)
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    pub phases: BTreeMap<ContentType, SyncPhase>,
    pub pending: usize,
    pub debounce_ms: u64,
}

enum Command {
    Queue(ContentUpdate),
    SyncNow(oneshot::Sender<FlushReport>),
    Shutdown(oneshot::Sender<FlushReport>),
}

/// Handle to the coordinator worker. Cheap to clone; every clone feeds the same worker.
#[derive(Clone)]
pub struct SyncCoordinator {
    tx: mpsc::UnboundedSender<Command>,
    status: watch::Receiver<SyncStatus>,
}

impl SyncCoordinator {
    /// Start the worker task on the current runtime.
    pub fn spawn(
        config: SyncConfig,
        snapshots: Arc<dyn SnapshotsRepo>,
        cache: Arc<ReadThroughCache>,
        revalidator: Arc<dyn PageRevalidator>,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let state = SyncState::new();
        let (status_tx, status) = watch::channel(snapshot_status(&state, config.debounce));
        let worker = Worker {
            state,
            debounce: config.debounce,
            status: status_tx,
            writer: BatchWriter {
                snapshots,
                cache,
                revalidator,
            },
        };
        tokio::spawn(worker.run(rx));

        info!(debounce_ms = duration_ms(config.debounce), "Sync coordinator started");
        Self { tx, status }
    }

    /// Queue `update` for the next flush. Only the latest update per content type survives.
    ///
    /// Payloads that cannot be shaped into a document are refused here.
    pub fn queue_update(&self, update: ContentUpdate) -> Result<(), SyncError> {
        update.shape()?;
        self.tx
            .send(Command::Queue(update))
            .map_err(|_| SyncError::Stopped)
    }

    /// Cancel the timer and flush everything pending now.
    pub async fn sync_now(&self) -> Result<FlushReport, SyncError> {
        self.request(Command::SyncNow).await
    }

    /// Latest state published by the worker. Never waits on a flush.
    pub fn status(&self) -> Result<SyncStatus, SyncError> {
        if self.tx.is_closed() {
            return Err(SyncError::Stopped);
        }
        Ok(self.status.borrow().clone())
    }

    /// Flush whatever is pending and stop the worker.
    pub async fn shutdown(&self) -> Result<FlushReport, SyncError> {
        self.request(Command::Shutdown).await
    }

    async fn request<T>(&self, command: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T, SyncError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(command(reply))
            .map_err(|_| SyncError::Stopped)?;
        rx.await.map_err(|_| SyncError::Stopped)
    }
}

/// Commands the worker reads while a batch is being written.
struct Inbox<'a> {
    rx: &'a mut mpsc::UnboundedReceiver<Command>,
    deferred: &'a mut VecDeque<Command>,
}

struct Worker {
    state: SyncState,
    debounce: Duration,
    status: watch::Sender<SyncStatus>,
    writer: BatchWriter,
}

impl Worker {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Command>) {
        let mut deferred = VecDeque::new();
        loop {
            let command = match deferred.pop_front() {
                Some(command) => Some(command),
                None => {
                    let deadline = self.state.deadline();
                    tokio::select! {
                        command = rx.recv() => command,
                        _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                            self.flush(Some(Inbox { rx: &mut rx, deferred: &mut deferred })).await;
                            continue;
                        }
                    }
                }
            };

            match command {
                Some(Command::Queue(update)) => self.queue(update),
                Some(Command::SyncNow(reply)) => {
                    self.state.cancel_timer();
                    let report = self
                        .flush(Some(Inbox { rx: &mut rx, deferred: &mut deferred }))
                        .await;
                    let _ = reply.send(report);
                }
                Some(Command::Shutdown(reply)) => {
                    rx.close();
                    let report = self.flush(None).await;
                    let _ = reply.send(report);
                    break;
                }
                None => {
                    self.flush(None).await;
                    break;
                }
            }
        }

        info!("Sync coordinator stopped");
    }

    fn queue(&mut self, update: ContentUpdate) {
        let content_type = update.content_type();
        let coalesced = self.state.queue(update, Instant::now(), self.debounce);
        if coalesced {
            counter!(METRIC_SYNC_COALESCED, "type" => content_type.as_str()).increment(1);
        }
        self.publish();

        info!(
            content_type = %content_type,
            coalesced,
            pending = self.state.pending_len(),
            debounce_ms = duration_ms(self.debounce),
            "Content update queued"
        );
    }

    fn publish(&self) {
        self.status.send_replace(snapshot_status(&self.state, self.debounce));
    }

    /// Write the current batch. With an inbox, updates that arrive meanwhile
    /// are queued for the next batch and other commands wait their turn.
    #[instrument(skip_all)]
    async fn flush(&mut self, inbox: Option<Inbox<'_>>) -> FlushReport {
        let batch = self.state.take_batch();
        if batch.is_empty() {
            debug!("Nothing pending to flush");
            return FlushReport::default();
        }
        self.publish();

        let start = std::time::Instant::now();
        info!(count = batch.len(), "Flushing pending content updates");

        let job = self.writer.clone().write_batch(batch);
        let mut report = match inbox {
            None => job.await,
            Some(Inbox { rx, deferred }) => {
                tokio::pin!(job);
                let mut listening = true;
                loop {
                    tokio::select! {
                        biased;
                        report = &mut job => break report,
                        command = rx.recv(), if listening => match command {
                            Some(Command::Queue(update)) => self.queue(update),
                            Some(command) => deferred.push_back(command),
                            None => listening = false,
                        },
                    }
                }
            }
        };

        for outcome in &report.outcomes {
            let ok = matches!(outcome.status, FlushStatus::Written { .. });
            self.state.complete(outcome.content_type, ok);
        }
        self.publish();

        report.elapsed_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
        histogram!(METRIC_SYNC_FLUSH_MS).record(start.elapsed().as_secs_f64() * 1000.0);
        info!(
            written = report.written(),
            failed = report.outcomes.len() - report.written(),
            elapsed_ms = report.elapsed_ms,
            "Flush finished"
        );
        report
    }
}

/// Everything a batch write touches, detached from the worker's state.
#[derive(Clone)]
struct BatchWriter {
    snapshots: Arc<dyn SnapshotsRepo>,
    cache: Arc<ReadThroughCache>,
    revalidator: Arc<dyn PageRevalidator>,
}

impl BatchWriter {
    async fn write_batch(self, batch: Vec<PendingUpdate>) -> FlushReport {
        let mut report = FlushReport::default();
        let mut paths = BTreeSet::new();
        for pending in batch {
            let content_type = pending.content_type();
            let status = self.write(content_type, &pending.update).await;
            if matches!(status, FlushStatus::Written { .. }) {
                paths.extend(content_type.revalidation_paths().iter().map(|path| path.to_string()));
            }
            report.outcomes.push(FlushOutcome {
                content_type,
                status,
            });
        }

        if !paths.is_empty() {
            let paths: Vec<String> = paths.into_iter().collect();
            match self.revalidator.revalidate(&paths).await {
                Ok(()) => info!(?paths, "Revalidation requested"),
                Err(err) => {
                    warn!(?paths, error = %err, "Revalidation failed");
                    report.revalidation_error = Some(err.to_string());
                }
            }
            report.revalidated = paths;
        }
        report
    }

    async fn write(&self, content_type: ContentType, update: &ContentUpdate) -> FlushStatus {
        let payload = match update.shape().map_err(SyncError::from) {
            Ok(payload) => payload,
            Err(err) => {
                warn!(content_type = %content_type, error = %err, "Skipping update");
                return FlushStatus::Rejected {
                    reason: err.to_string(),
                };
            }
        };

        if !self.snapshots.update(content_type, payload).await {
            return FlushStatus::WriteFailed;
        }

        let mut invalidated = 0;
        for prefix in content_type.invalidation_prefixes() {
            invalidated += self.cache.delete(&prefix).await;
        }
        info!(content_type = %content_type, invalidated, "Cache invalidated after snapshot write");
        FlushStatus::Written { invalidated }
    }
}

fn snapshot_status(state: &SyncState, debounce: Duration) -> SyncStatus {
    SyncStatus {
        phases: state.phases(),
        pending: state.pending_len(),
        debounce_ms: duration_ms(debounce),
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
