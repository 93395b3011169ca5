//! Job executor: consumer-group intake, crash recovery and shutdown.
//!
//! Entries are processed one at a time. An entry is acknowledged only after
//! its result has been published (or it was found unanswerable), so a crash
//! mid-job leaves it pending for [`JobExecutor::recover`] to pick up.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use replay_queue::{JobQueue, StreamEntry, CURSOR_START};

use crate::config::WorkerConfig;
use crate::error::WorkerResult;
use crate::metrics;
use crate::processor::{process_request, ProcessingContext};
use crate::reporter::JobReporter;

/// Job executor that reads export requests and runs them.
pub struct JobExecutor {
    config: WorkerConfig,
    queue: JobQueue,
    ctx: ProcessingContext,
    reporter: Arc<dyn JobReporter>,
    shutdown: watch::Sender<bool>,
}

impl JobExecutor {
    /// Create a new job executor.
    pub fn new(
        config: WorkerConfig,
        queue: JobQueue,
        ctx: ProcessingContext,
        reporter: Arc<dyn JobReporter>,
    ) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            config,
            queue,
            ctx,
            reporter,
            shutdown,
        }
    }

    /// Start the executor. Returns once shutdown has been requested.
    pub async fn run(&self) -> WorkerResult<()> {
        info!(
            "Starting job executor '{}' on stream '{}'",
            self.queue.config().consumer_name,
            self.queue.config().request_stream
        );

        self.queue.init().await?;
        let mut shutdown_rx = self.shutdown.subscribe();

        self.recover().await;

        loop {
            if *shutdown_rx.borrow() {
                break;
            }

            let read = tokio::select! {
                _ = shutdown_rx.changed() => {
                    info!("Shutdown signal received, stopping executor");
                    break;
                }
                read = self.queue.consume(1) => read,
            };

            match read {
                Ok(entries) if entries.is_empty() => self.recover().await,
                Ok(entries) => {
                    for entry in entries {
                        self.handle_entry(entry).await;
                    }
                }
                Err(e) => {
                    error!("Failed to read from request stream: {}", e);
                    tokio::select! {
                        _ = shutdown_rx.changed() => {}
                        _ = tokio::time::sleep(self.config.read_error_backoff) => {}
                    }
                }
            }
        }

        info!("Job executor stopped");
        Ok(())
    }

    /// Signal shutdown. The job in progress, if any, finishes first.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }

    /// Re-process entries that were delivered but never acknowledged.
    pub async fn recover(&self) {
        let mut cursor = CURSOR_START.to_string();
        loop {
            let batch = match self.queue.claim_pending(&cursor).await {
                Ok(batch) => batch,
                Err(e) if e.is_server_reply() => {
                    warn!("XAUTOCLAIM rejected ({}), reading own pending entries instead", e);
                    self.recover_own_pending().await;
                    return;
                }
                Err(e) => {
                    warn!("Failed to claim pending entries: {}", e);
                    return;
                }
            };

            for id in &batch.deleted_ids {
                debug!(message_id = %id, "Pending entry no longer in stream");
                metrics::record_dropped("deleted");
                self.ack(id).await;
            }

            if !batch.entries.is_empty() {
                info!("Recovering {} pending entries", batch.entries.len());
                metrics::record_recovered(batch.entries.len());
            }
            let last_page = batch.is_last_page();
            cursor = batch.next_cursor;

            for entry in batch.entries {
                if *self.shutdown.borrow() {
                    return;
                }
                self.handle_entry(entry).await;
            }

            if last_page {
                return;
            }
        }
    }

    async fn recover_own_pending(&self) {
        match self.queue.own_pending().await {
            Ok(entries) if entries.is_empty() => {}
            Ok(entries) => {
                info!("Recovering {} own pending entries", entries.len());
                metrics::record_recovered(entries.len());
                for entry in entries {
                    if *self.shutdown.borrow() {
                        return;
                    }
                    self.handle_entry(entry).await;
                }
            }
            Err(e) => warn!("Failed to read own pending entries: {}", e),
        }
    }

    /// Process one entry, acknowledge it, then pause.
    async fn handle_entry(&self, entry: StreamEntry) {
        if entry.fields.is_empty() {
            warn!(message_id = %entry.id, "Acknowledging entry without fields");
            metrics::record_dropped("deleted");
            self.ack(&entry.id).await;
            return;
        }

        debug!(message_id = %entry.id, "Processing entry");
        let result = process_request(&self.ctx, self.reporter.as_ref(), entry.fields).await;
        if let Some(result) = result {
            debug!(message_id = %entry.id, status = %result.status, "Entry processed");
        }
        self.ack(&entry.id).await;

        if !self.config.job_pause.is_zero() {
            tokio::time::sleep(self.config.job_pause).await;
        }
    }

    async fn ack(&self, message_id: &str) {
        if let Err(e) = self.queue.ack(message_id).await {
            error!(message_id = %message_id, "Failed to acknowledge entry: {}", e);
        }
    }
}
