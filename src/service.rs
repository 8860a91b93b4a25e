//! `DocumentService` — the facade the rest of the system talks to.
//!
//! Owns the database connection, the work queue, and the pipeline runner;
//! optionally runs a background worker thread that drains the queue.
//! Submission returns as soon as the upload is durable.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use rusqlite::Connection;
use uuid::Uuid;

use crate::classify::DocumentClassifier;
use crate::config::PipelineConfig;
use crate::db::{DatabaseError, DocumentRepository};
use crate::extraction::provider::ExtractionProvider;
use crate::extraction::store::ExtractionStore;
use crate::extraction::types::ExtractionResult;
use crate::models::{DocumentRecord, DocumentStatus, DocumentType};
use crate::notify::NotificationSink;
use crate::pipeline::{
    Intake, PipelineError, PipelineOutcome, PipelineRunner, PipelineWorkerHandle, SubmitRequest,
    WorkQueue,
};
use crate::scan::MalwareScanner;
use crate::storage::StorageGateway;
use crate::verification::{
    VerificationStatus, VerificationStore, VerificationWorkflow, WorkflowError,
};

pub struct DocumentService {
    conn: Arc<Mutex<Connection>>,
    storage: Arc<dyn StorageGateway>,
    notifier: Arc<dyn NotificationSink>,
    runner: Arc<PipelineRunner>,
    queue: Arc<WorkQueue>,
    workflow: VerificationWorkflow,
    classifier: DocumentClassifier,
    worker: Option<PipelineWorkerHandle>,
}

impl DocumentService {
    pub fn new(
        conn: Connection,
        storage: Arc<dyn StorageGateway>,
        scanner: Box<dyn MalwareScanner>,
        provider: Box<dyn ExtractionProvider>,
        notifier: Arc<dyn NotificationSink>,
        config: &PipelineConfig,
    ) -> Result<Self, PipelineError> {
        let conn = Arc::new(Mutex::new(conn));
        let runner = Arc::new(PipelineRunner::new(
            Arc::clone(&conn),
            Arc::clone(&storage),
            scanner,
            provider,
            Arc::clone(&notifier),
            config,
        )?);
        Ok(Self {
            conn,
            storage,
            notifier,
            runner,
            queue: Arc::new(WorkQueue::new()),
            workflow: VerificationWorkflow::new(config),
            classifier: DocumentClassifier::with_default_rules(config)?,
            worker: None,
        })
    }

    /// Start the background worker draining the queue. Idempotent.
    pub fn start_worker(&mut self, poll_interval: Duration) {
        if self.worker.is_none() {
            self.worker = Some(PipelineWorkerHandle::spawn(
                Arc::clone(&self.runner),
                Arc::clone(&self.queue),
                poll_interval,
            ));
        }
    }

    pub fn stop_worker(&mut self) {
        self.worker = None;
    }

    pub fn queue(&self) -> &Arc<WorkQueue> {
        &self.queue
    }

    /// Accept an upload and queue it for processing.
    pub fn submit_document(
        &self,
        request: &SubmitRequest,
        bytes: &[u8],
    ) -> Result<DocumentRecord, PipelineError> {
        let record = {
            let conn = self.conn.lock().expect("connection lock poisoned");
            Intake::submit(&conn, self.storage.as_ref(), request, bytes)?
        };
        self.queue.push(record.id);
        Ok(record)
    }

    /// Workflow status for a document, with expiration derived at read time.
    /// `None` when the document has not reached verification yet.
    pub fn get_verification_status(
        &self,
        document_id: Uuid,
    ) -> Result<Option<VerificationStatus>, PipelineError> {
        let conn = self.conn.lock().expect("connection lock poisoned");
        let record = VerificationStore::get_by_document(&conn, document_id)?;
        Ok(record.map(|r| r.status))
    }

    /// Reviewer approval of a document awaiting manual review.
    pub fn approve_document(
        &self,
        document_id: Uuid,
        reviewer_id: &str,
        notes: Option<&str>,
    ) -> Result<bool, PipelineError> {
        let mut conn = self.conn.lock().expect("connection lock poisoned");
        let mut verification = VerificationStore::get_by_document(&conn, document_id)?
            .ok_or(PipelineError::NotReviewable(document_id))?;
        if verification.status != VerificationStatus::ManualReviewRequired {
            if verification.status == VerificationStatus::Expired {
                return Err(PipelineError::Workflow(WorkflowError::Expired(document_id)));
            }
            return Err(PipelineError::NotReviewable(document_id));
        }

        self.workflow.approve(&mut verification, reviewer_id, notes)?;
        VerificationStore::save(&mut conn, &verification)?;
        DocumentRepository::set_status(&conn, document_id, DocumentStatus::Verified)?;

        let document = DocumentRepository::get(&conn, document_id)?;
        drop(conn);
        self.notifier.notify(
            &verification.user_id,
            "Document approved",
            &format!("Your document {} was approved by a reviewer.", document.file_name),
        );
        Ok(true)
    }

    /// Reviewer rejection with a reason and the corrections the uploader
    /// must make.
    pub fn reject_document(
        &self,
        document_id: Uuid,
        reason: &str,
        required_corrections: &[String],
    ) -> Result<bool, PipelineError> {
        let mut conn = self.conn.lock().expect("connection lock poisoned");
        let mut verification = VerificationStore::get_by_document(&conn, document_id)?
            .ok_or(PipelineError::NotReviewable(document_id))?;
        if verification.status != VerificationStatus::ManualReviewRequired {
            if verification.status == VerificationStatus::Expired {
                return Err(PipelineError::Workflow(WorkflowError::Expired(document_id)));
            }
            return Err(PipelineError::NotReviewable(document_id));
        }

        self.workflow.reject(&mut verification, reason, required_corrections)?;
        VerificationStore::save(&mut conn, &verification)?;
        DocumentRepository::set_status(&conn, document_id, DocumentStatus::Rejected)?;

        let document = DocumentRepository::get(&conn, document_id)?;
        drop(conn);
        let mut message = format!(
            "Your document {} was rejected: {reason}.",
            document.file_name
        );
        if !required_corrections.is_empty() {
            message.push_str(" Required corrections: ");
            message.push_str(&required_corrections.join("; "));
        }
        self.notifier
            .notify(&verification.user_id, "Document rejected", &message);
        Ok(true)
    }

    /// Documents whose verification is waiting on a reviewer, oldest first.
    pub fn list_documents_requiring_review(&self) -> Result<Vec<DocumentRecord>, PipelineError> {
        let conn = self.conn.lock().expect("connection lock poisoned");
        let pending = VerificationStore::list_requiring_review(&conn)?;
        let mut documents = Vec::with_capacity(pending.len());
        for verification in pending {
            documents.push(DocumentRepository::get(&conn, verification.document_id)?);
        }
        Ok(documents)
    }

    /// Top-N candidate types for a processed document, for disambiguation
    /// prompts when the classifier and the uploader disagree.
    pub fn get_suggested_types(
        &self,
        document_id: Uuid,
        max_suggestions: usize,
    ) -> Result<Vec<(DocumentType, f32)>, PipelineError> {
        let conn = self.conn.lock().expect("connection lock poisoned");
        let document = DocumentRepository::get(&conn, document_id)?;
        let extraction = ExtractionStore::get(&conn, document_id)?.ok_or_else(|| {
            PipelineError::Database(DatabaseError::NotFound {
                entity_type: "extraction_result".into(),
                id: document_id.to_string(),
            })
        })?;
        Ok(self.classifier.suggested_types(
            &extraction.raw_text,
            &document.file_name,
            max_suggestions,
        ))
    }

    /// Re-run extraction and classification from scratch, synchronously.
    /// The prior results are replaced; no duplicate records are created.
    pub fn retry_processing(&self, document_id: Uuid) -> Result<ExtractionResult, PipelineError> {
        let outcome = self.runner.process_document(document_id)?;
        if outcome == PipelineOutcome::Quarantined {
            return Err(PipelineError::Quarantined(document_id));
        }

        let conn = self.conn.lock().expect("connection lock poisoned");
        ExtractionStore::get(&conn, document_id)?.ok_or_else(|| {
            PipelineError::Database(DatabaseError::NotFound {
                entity_type: "extraction_result".into(),
                id: document_id.to_string(),
            })
        })
    }
}
