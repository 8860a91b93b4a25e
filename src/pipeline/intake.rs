//! Intake: accept an upload, persist bytes through the storage gateway,
//! and register the document record. Returns as soon as the storage write
//! lands; all processing happens on the background worker.

use rusqlite::Connection;
use uuid::Uuid;

use super::PipelineError;
use crate::db::DocumentRepository;
use crate::models::{DocumentRecord, DocumentStatus, DocumentType};
use crate::storage::{StorageGateway, UploadMetadata};

/// An upload as the caller hands it over.
#[derive(Debug, Clone)]
pub struct SubmitRequest {
    pub user_id: String,
    pub file_name: String,
    /// MIME type if the caller knows it; guessed from the file name otherwise.
    pub content_type: Option<String>,
    /// Uploader's declared document type, cross-checked by the classifier.
    pub expected_type: Option<DocumentType>,
}

pub struct Intake;

impl Intake {
    pub fn submit(
        conn: &Connection,
        storage: &dyn StorageGateway,
        request: &SubmitRequest,
        bytes: &[u8],
    ) -> Result<DocumentRecord, PipelineError> {
        if bytes.is_empty() {
            return Err(PipelineError::EmptyUpload);
        }

        let content_type = match &request.content_type {
            Some(t) => t.clone(),
            None => mime_guess::from_path(&request.file_name)
                .first_or_octet_stream()
                .essence_str()
                .to_string(),
        };

        let stored = storage.upload(
            bytes,
            &UploadMetadata {
                file_name: request.file_name.clone(),
                content_type: content_type.clone(),
            },
        )?;

        let record = DocumentRecord {
            id: Uuid::new_v4(),
            user_id: request.user_id.clone(),
            file_name: request.file_name.clone(),
            content_type,
            size_bytes: bytes.len() as u64,
            content_hash: stored.hash,
            storage_path: stored.id,
            expected_type: request.expected_type,
            status: DocumentStatus::Uploaded,
            uploaded_at: chrono::Utc::now(),
            expires_at: None,
            is_encrypted: false,
            scan_result: None,
            retry_count: 0,
            next_retry_at: None,
        };
        DocumentRepository::insert(conn, &record)?;

        tracing::info!(
            document_id = %record.id,
            user_id = %record.user_id,
            file_name = %record.file_name,
            size_bytes = record.size_bytes,
            "Document accepted for processing"
        );
        Ok(record)
    }
}
