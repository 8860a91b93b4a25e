//! Background worker: drains the work queue on a dedicated thread.
//!
//! The handle owns the thread; dropping it signals shutdown and joins, so a
//! worker can never outlive the service that spawned it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use chrono::Utc;

use super::queue::WorkQueue;
use super::runner::{PipelineOutcome, PipelineRunner};
use super::PipelineError;

const SCANNER_RETRY_DELAY_SECS: i64 = 30;
const BUSY_REQUEUE_DELAY_SECS: i64 = 5;

pub struct PipelineWorkerHandle {
    shutdown: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl PipelineWorkerHandle {
    pub fn spawn(
        runner: Arc<PipelineRunner>,
        queue: Arc<WorkQueue>,
        poll_interval: Duration,
    ) -> Self {
        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_flag = Arc::clone(&shutdown);

        let handle = std::thread::Builder::new()
            .name("aidvault-pipeline".into())
            .spawn(move || {
                tracing::debug!("Pipeline worker started");
                while !shutdown_flag.load(Ordering::Relaxed) {
                    let Some(item) = queue.pop_due(Utc::now()) else {
                        std::thread::sleep(poll_interval);
                        continue;
                    };
                    let document_id = item.document_id;

                    match runner.process_document(document_id) {
                        Ok(PipelineOutcome::RetryScheduled { next_attempt_at, .. }) => {
                            queue.push_at(document_id, next_attempt_at);
                        }
                        Ok(PipelineOutcome::ScanUnavailable) => {
                            queue.push_at(
                                document_id,
                                Utc::now() + chrono::Duration::seconds(SCANNER_RETRY_DELAY_SECS),
                            );
                        }
                        Ok(PipelineOutcome::Cancelled) => {
                            tracing::debug!(document_id = %document_id, "Run cancelled");
                        }
                        Ok(outcome) => {
                            tracing::debug!(document_id = %document_id, ?outcome, "Run finished");
                        }
                        Err(PipelineError::AlreadyProcessing(_)) => {
                            queue.push_at(
                                document_id,
                                Utc::now() + chrono::Duration::seconds(BUSY_REQUEUE_DELAY_SECS),
                            );
                        }
                        Err(e) => {
                            tracing::warn!(document_id = %document_id, error = %e, "Run failed");
                        }
                    }
                }
                tracing::debug!("Pipeline worker stopped");
            })
            .expect("Failed to spawn pipeline worker thread");

        Self {
            shutdown,
            handle: Some(handle),
        }
    }

    pub fn stop(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }
}

impl Drop for PipelineWorkerHandle {
    fn drop(&mut self) {
        self.stop();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
