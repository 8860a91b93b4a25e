//! Stage runner: drives one document through scan, extraction,
//! classification, validation, and verification.
//!
//! Stage results land in the stores as they are produced; a failure in any
//! stage affects only the document being processed. The runner takes the
//! in-flight claim for the document id before touching anything and honors
//! the cancellation token at every external call boundary.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use rusqlite::Connection;
use uuid::Uuid;

use super::queue::InFlight;
use super::PipelineError;
use crate::classify::{ClassificationResult, ClassificationStore, DocumentClassifier};
use crate::config::{ConfigError, PipelineConfig};
use crate::db::{DatabaseError, DocumentRepository};
use crate::extraction::provider::ExtractionProvider;
use crate::extraction::store::ExtractionStore;
use crate::extraction::types::{ExtractionResult, ProcessingStatus};
use crate::extraction::ExtractionService;
use crate::models::{DocumentRecord, DocumentStatus, DocumentType, ScanVerdict};
use crate::notify::NotificationSink;
use crate::scan::MalwareScanner;
use crate::storage::StorageGateway;
use crate::validate::FieldValidator;
use crate::verification::{EvaluationInput, VerificationStore, VerificationStatus, VerificationWorkflow};

/// How a pipeline run ended for one document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineOutcome {
    /// Malware found; the document is quarantined for good.
    Quarantined,
    /// Verified automatically; no human involvement needed.
    Approved,
    /// Waiting on a reviewer.
    ManualReviewRequired,
    /// Transient extraction failure; re-run no earlier than the given time.
    RetryScheduled { attempt: u32, next_attempt_at: DateTime<Utc> },
    /// Scanner unavailable or errored; document reverted for a later run.
    ScanUnavailable,
    /// Cancellation token fired; document reverted to its last stable stage.
    Cancelled,
}

pub struct PipelineRunner {
    conn: Arc<Mutex<Connection>>,
    storage: Arc<dyn StorageGateway>,
    scanner: Box<dyn MalwareScanner>,
    extraction: ExtractionService,
    classifier: DocumentClassifier,
    workflow: VerificationWorkflow,
    notifier: Arc<dyn NotificationSink>,
    in_flight: Arc<InFlight>,
    cancel: Arc<AtomicBool>,
    max_retries: u32,
    retry_backoff_secs: u64,
}

impl PipelineRunner {
    pub fn new(
        conn: Arc<Mutex<Connection>>,
        storage: Arc<dyn StorageGateway>,
        scanner: Box<dyn MalwareScanner>,
        provider: Box<dyn ExtractionProvider>,
        notifier: Arc<dyn NotificationSink>,
        config: &PipelineConfig,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            conn,
            storage,
            scanner,
            extraction: ExtractionService::new(provider, config),
            classifier: DocumentClassifier::with_default_rules(config)?,
            workflow: VerificationWorkflow::new(config),
            notifier,
            in_flight: Arc::new(InFlight::new()),
            cancel: Arc::new(AtomicBool::new(false)),
            max_retries: config.max_extraction_retries,
            retry_backoff_secs: config.retry_backoff_secs,
        })
    }

    pub fn in_flight(&self) -> &Arc<InFlight> {
        &self.in_flight
    }

    /// Token flipped to request cancellation of in-flight external calls.
    pub fn cancel_token(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    fn cancelled(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }

    /// Run the pipeline for one document. At most one run per document may
    /// execute at a time; a second trigger gets `AlreadyProcessing`.
    pub fn process_document(&self, document_id: Uuid) -> Result<PipelineOutcome, PipelineError> {
        let _guard = self
            .in_flight
            .try_begin(document_id)
            .ok_or(PipelineError::AlreadyProcessing(document_id))?;

        let record = self.load(document_id)?;
        match record.status {
            DocumentStatus::Quarantined => return Err(PipelineError::Quarantined(document_id)),
            DocumentStatus::Expired => return Err(PipelineError::DocumentExpired(document_id)),
            _ => {}
        }
        if let Some(expires_at) = record.expires_at {
            if Utc::now() > expires_at {
                self.set_status(document_id, DocumentStatus::Expired)?;
                return Err(PipelineError::DocumentExpired(document_id));
            }
        }

        let needs_scan = matches!(
            record.status,
            DocumentStatus::Uploaded
                | DocumentStatus::Scanning
                | DocumentStatus::Verified
                | DocumentStatus::Rejected
        );
        if needs_scan {
            match self.run_scan(&record)? {
                ScanOutcome::Clean => {}
                ScanOutcome::Quarantined => return Ok(PipelineOutcome::Quarantined),
                ScanOutcome::Unavailable => return Ok(PipelineOutcome::ScanUnavailable),
                ScanOutcome::Cancelled => return Ok(PipelineOutcome::Cancelled),
            }
        }

        let record = self.load(document_id)?;
        self.run_processing(&record)
    }

    fn run_scan(&self, record: &DocumentRecord) -> Result<ScanOutcome, PipelineError> {
        if record.status != DocumentStatus::Scanning {
            self.set_status(record.id, DocumentStatus::Scanning)?;
        }

        if !self.scanner.is_available() {
            tracing::warn!(document_id = %record.id, "Malware scanner unavailable");
            self.set_status(record.id, DocumentStatus::Uploaded)?;
            return Ok(ScanOutcome::Unavailable);
        }
        if self.cancelled() {
            self.set_status(record.id, DocumentStatus::Uploaded)?;
            return Ok(ScanOutcome::Cancelled);
        }

        let bytes = self.storage.download(&record.storage_path)?;
        let result = self.scanner.scan(&bytes, &record.file_name);
        let verdict = result.verdict();
        {
            let conn = self.conn.lock().expect("connection lock poisoned");
            DocumentRepository::set_scan_result(&conn, record.id, verdict)?;
        }

        match verdict {
            ScanVerdict::Clean => {
                self.set_status(record.id, DocumentStatus::Clean)?;
                Ok(ScanOutcome::Clean)
            }
            ScanVerdict::Infected => {
                tracing::warn!(
                    document_id = %record.id,
                    threats = ?result.threats,
                    "Malware detected, quarantining document"
                );
                self.set_status(record.id, DocumentStatus::Quarantined)?;
                Ok(ScanOutcome::Quarantined)
            }
            ScanVerdict::Error => {
                tracing::warn!(
                    document_id = %record.id,
                    error = ?result.error,
                    "Scan errored, reverting for retry"
                );
                self.set_status(record.id, DocumentStatus::Uploaded)?;
                Ok(ScanOutcome::Unavailable)
            }
        }
    }

    fn run_processing(&self, record: &DocumentRecord) -> Result<PipelineOutcome, PipelineError> {
        if record.status != DocumentStatus::Processing {
            self.set_status(record.id, DocumentStatus::Processing)?;
        }
        if self.cancelled() {
            self.set_status(record.id, DocumentStatus::Clean)?;
            return Ok(PipelineOutcome::Cancelled);
        }

        let bytes = self.storage.download(&record.storage_path)?;
        if self.cancelled() {
            self.set_status(record.id, DocumentStatus::Clean)?;
            return Ok(PipelineOutcome::Cancelled);
        }

        let mut extraction = self.extraction.extract(record.id, &bytes, record.expected_type);

        if extraction.status == ProcessingStatus::Failed {
            let attempt = record.retry_count + 1;
            if attempt < self.max_retries {
                return self.schedule_retry(record, attempt, &extraction);
            }
            // Retries exhausted: hand the document to a reviewer rather
            // than dropping it.
            let failure = extraction
                .validation_errors
                .first()
                .cloned()
                .unwrap_or_else(|| "extraction failed".to_string());
            {
                let mut conn = self.conn.lock().expect("connection lock poisoned");
                ExtractionStore::save(&mut conn, &extraction)?;
                ClassificationStore::save(
                    &mut conn,
                    &ClassificationResult::failed(record.id, &failure),
                )?;
                DocumentRepository::set_retry_state(&conn, record.id, record.retry_count, None)?;
            }
            return self.run_verification(
                record,
                EvaluationInput {
                    classification_confidence: 0.0,
                    extraction_confidence: 0.0,
                    validation_pass_fraction: 0.0,
                    issues: Vec::new(),
                    upstream_failure: Some(failure),
                },
            );
        }

        let report = FieldValidator::validate(&mut extraction.fields);
        let classification =
            self.classifier
                .classify(record.id, &extraction.raw_text, &record.file_name);
        {
            let mut conn = self.conn.lock().expect("connection lock poisoned");
            ExtractionStore::save(&mut conn, &extraction)?;
            ClassificationStore::save(&mut conn, &classification)?;
            DocumentRepository::set_retry_state(&conn, record.id, record.retry_count, None)?;
        }

        let mut issues: Vec<String> = report
            .field_errors
            .iter()
            .map(|e| format!("{}: {}", e.field_name, e.message))
            .collect();
        if extraction.status == ProcessingStatus::RequiresReview {
            issues.push("No fields could be extracted from the document".to_string());
        }
        if let Some(expected) = record.expected_type {
            if classification.document_type != expected
                && classification.document_type != DocumentType::Other
            {
                issues.push(format!(
                    "Declared type {expected} but classified as {}",
                    classification.document_type
                ));
            }
        }

        self.run_verification(
            record,
            EvaluationInput {
                classification_confidence: classification.confidence,
                extraction_confidence: extraction.overall_confidence,
                validation_pass_fraction: report.pass_fraction(),
                issues,
                upstream_failure: None,
            },
        )
    }

    fn schedule_retry(
        &self,
        record: &DocumentRecord,
        attempt: u32,
        extraction: &ExtractionResult,
    ) -> Result<PipelineOutcome, PipelineError> {
        use rand::Rng;

        // Exponential backoff with jitter so re-driven batches don't
        // thunder against the provider at once.
        let backoff = self
            .retry_backoff_secs
            .saturating_mul(1u64 << (attempt - 1).min(16));
        let jitter = rand::thread_rng().gen_range(0..=backoff.max(4) / 4);
        let next_attempt_at = Utc::now() + Duration::seconds((backoff + jitter) as i64);

        {
            let mut conn = self.conn.lock().expect("connection lock poisoned");
            ExtractionStore::save(&mut conn, extraction)?;
            DocumentRepository::set_retry_state(&conn, record.id, attempt, Some(next_attempt_at))?;
        }
        self.set_status(record.id, DocumentStatus::Clean)?;

        tracing::info!(
            document_id = %record.id,
            attempt,
            next_attempt_at = %next_attempt_at,
            "Extraction failed, retry scheduled"
        );
        Ok(PipelineOutcome::RetryScheduled {
            attempt,
            next_attempt_at,
        })
    }

    fn run_verification(
        &self,
        record: &DocumentRecord,
        input: EvaluationInput,
    ) -> Result<PipelineOutcome, PipelineError> {
        let mut verification = self.workflow.start(record.id, &record.user_id);
        let status = self.workflow.evaluate(&mut verification, &input)?;
        {
            let mut conn = self.conn.lock().expect("connection lock poisoned");
            VerificationStore::save(&mut conn, &verification)?;
        }

        match status {
            VerificationStatus::Approved => {
                self.set_status(record.id, DocumentStatus::Verified)?;
                self.notifier.notify(
                    &record.user_id,
                    "Document approved",
                    &format!("Your document {} was verified automatically.", record.file_name),
                );
                Ok(PipelineOutcome::Approved)
            }
            VerificationStatus::ManualReviewRequired => {
                self.notifier.notify(
                    &record.user_id,
                    "Document under review",
                    &format!("Your document {} needs a manual review.", record.file_name),
                );
                Ok(PipelineOutcome::ManualReviewRequired)
            }
            other => {
                // evaluate() only returns Approved or ManualReviewRequired.
                Err(PipelineError::Database(DatabaseError::ConstraintViolation(
                    format!("Unexpected verification status {other} after evaluation"),
                )))
            }
        }
    }

    fn load(&self, document_id: Uuid) -> Result<DocumentRecord, PipelineError> {
        let conn = self.conn.lock().expect("connection lock poisoned");
        Ok(DocumentRepository::get(&conn, document_id)?)
    }

    fn set_status(&self, document_id: Uuid, status: DocumentStatus) -> Result<(), PipelineError> {
        let conn = self.conn.lock().expect("connection lock poisoned");
        Ok(DocumentRepository::set_status(&conn, document_id, status)?)
    }
}

enum ScanOutcome {
    Clean,
    Quarantined,
    Unavailable,
    Cancelled,
}
