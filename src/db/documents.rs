//! Document repository — identifier-based access to document records.
//!
//! Size and hash columns are written once at insert and never updated;
//! status changes go through `set_status`, which enforces the lifecycle
//! transition table.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use super::DatabaseError;
use crate::models::{DocumentRecord, DocumentStatus, DocumentType, ScanVerdict};

pub struct DocumentRepository;

impl DocumentRepository {
    pub fn insert(conn: &Connection, record: &DocumentRecord) -> Result<(), DatabaseError> {
        conn.execute(
            "INSERT INTO documents
             (id, user_id, file_name, content_type, size_bytes, content_hash, storage_path,
              expected_type, status, uploaded_at, expires_at, is_encrypted, scan_result,
              retry_count, next_retry_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
            params![
                record.id.to_string(),
                record.user_id,
                record.file_name,
                record.content_type,
                record.size_bytes as i64,
                record.content_hash,
                record.storage_path,
                record.expected_type.map(|t| t.as_str()),
                record.status.as_str(),
                record.uploaded_at,
                record.expires_at,
                record.is_encrypted,
                record.scan_result.map(|v| v.as_str()),
                record.retry_count,
                record.next_retry_at,
            ],
        )?;
        Ok(())
    }

    pub fn get(conn: &Connection, id: Uuid) -> Result<DocumentRecord, DatabaseError> {
        let row = conn
            .query_row(
                "SELECT id, user_id, file_name, content_type, size_bytes, content_hash,
                        storage_path, expected_type, status, uploaded_at, expires_at,
                        is_encrypted, scan_result, retry_count, next_retry_at
                 FROM documents WHERE id = ?1",
                params![id.to_string()],
                map_row,
            )
            .optional()?;

        row.ok_or_else(|| DatabaseError::NotFound {
            entity_type: "document".into(),
            id: id.to_string(),
        })?
    }

    /// Change lifecycle status, enforcing the transition table.
    pub fn set_status(
        conn: &Connection,
        id: Uuid,
        next: DocumentStatus,
    ) -> Result<(), DatabaseError> {
        let current = Self::get(conn, id)?.status;
        if current == next {
            return Ok(());
        }
        if !current.can_transition_to(next) {
            return Err(DatabaseError::ConstraintViolation(format!(
                "Illegal document transition {current} -> {next} for {id}"
            )));
        }
        conn.execute(
            "UPDATE documents SET status = ?1 WHERE id = ?2",
            params![next.as_str(), id.to_string()],
        )?;
        Ok(())
    }

    pub fn set_scan_result(
        conn: &Connection,
        id: Uuid,
        verdict: ScanVerdict,
    ) -> Result<(), DatabaseError> {
        conn.execute(
            "UPDATE documents SET scan_result = ?1 WHERE id = ?2",
            params![verdict.as_str(), id.to_string()],
        )?;
        Ok(())
    }

    pub fn set_retry_state(
        conn: &Connection,
        id: Uuid,
        retry_count: u32,
        next_retry_at: Option<DateTime<Utc>>,
    ) -> Result<(), DatabaseError> {
        conn.execute(
            "UPDATE documents SET retry_count = ?1, next_retry_at = ?2 WHERE id = ?3",
            params![retry_count, next_retry_at, id.to_string()],
        )?;
        Ok(())
    }

    pub fn list_by_status(
        conn: &Connection,
        status: DocumentStatus,
    ) -> Result<Vec<DocumentRecord>, DatabaseError> {
        let mut stmt = conn.prepare(
            "SELECT id, user_id, file_name, content_type, size_bytes, content_hash,
                    storage_path, expected_type, status, uploaded_at, expires_at,
                    is_encrypted, scan_result, retry_count, next_retry_at
             FROM documents WHERE status = ?1 ORDER BY uploaded_at ASC",
        )?;
        let rows = stmt.query_map(params![status.as_str()], map_row)?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row??);
        }
        Ok(records)
    }
}

type RowResult = Result<DocumentRecord, DatabaseError>;

fn map_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RowResult> {
    let id: String = row.get(0)?;
    let expected_type: Option<String> = row.get(7)?;
    let status: String = row.get(8)?;
    let scan_result: Option<String> = row.get(12)?;
    let size_bytes: i64 = row.get(4)?;

    Ok((|| {
        Ok(DocumentRecord {
            id: Uuid::parse_str(&id).map_err(|_| DatabaseError::InvalidEnum {
                field: "document.id".into(),
                value: id.clone(),
            })?,
            user_id: row.get(1)?,
            file_name: row.get(2)?,
            content_type: row.get(3)?,
            size_bytes: size_bytes as u64,
            content_hash: row.get(5)?,
            storage_path: row.get(6)?,
            expected_type: expected_type
                .as_deref()
                .map(DocumentType::from_str)
                .transpose()?,
            status: DocumentStatus::from_str(&status)?,
            uploaded_at: row.get(9)?,
            expires_at: row.get(10)?,
            is_encrypted: row.get(11)?,
            scan_result: scan_result.as_deref().map(ScanVerdict::from_str).transpose()?,
            retry_count: row.get(13)?,
            next_retry_at: row.get(14)?,
        })
    })())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::sqlite::open_memory_database;

    pub fn make_record(status: DocumentStatus) -> DocumentRecord {
        DocumentRecord {
            id: Uuid::new_v4(),
            user_id: "user-1".into(),
            file_name: "w2_2024.pdf".into(),
            content_type: "application/pdf".into(),
            size_bytes: 1024,
            content_hash: "abc123".into(),
            storage_path: "obj-1".into(),
            expected_type: Some(DocumentType::W2Form),
            status,
            uploaded_at: Utc::now(),
            expires_at: None,
            is_encrypted: false,
            scan_result: None,
            retry_count: 0,
            next_retry_at: None,
        }
    }

    #[test]
    fn insert_and_get_roundtrip() {
        let conn = open_memory_database().unwrap();
        let record = make_record(DocumentStatus::Uploaded);
        DocumentRepository::insert(&conn, &record).unwrap();

        let loaded = DocumentRepository::get(&conn, record.id).unwrap();
        assert_eq!(loaded.id, record.id);
        assert_eq!(loaded.file_name, "w2_2024.pdf");
        assert_eq!(loaded.expected_type, Some(DocumentType::W2Form));
        assert_eq!(loaded.status, DocumentStatus::Uploaded);
        assert_eq!(loaded.size_bytes, 1024);
        assert_eq!(loaded.content_hash, "abc123");
    }

    #[test]
    fn get_missing_is_not_found() {
        let conn = open_memory_database().unwrap();
        let result = DocumentRepository::get(&conn, Uuid::new_v4());
        assert!(matches!(result, Err(DatabaseError::NotFound { .. })));
    }

    #[test]
    fn legal_status_transition_applies() {
        let conn = open_memory_database().unwrap();
        let record = make_record(DocumentStatus::Uploaded);
        DocumentRepository::insert(&conn, &record).unwrap();

        DocumentRepository::set_status(&conn, record.id, DocumentStatus::Scanning).unwrap();
        let loaded = DocumentRepository::get(&conn, record.id).unwrap();
        assert_eq!(loaded.status, DocumentStatus::Scanning);
    }

    #[test]
    fn illegal_status_transition_rejected() {
        let conn = open_memory_database().unwrap();
        let record = make_record(DocumentStatus::Uploaded);
        DocumentRepository::insert(&conn, &record).unwrap();

        let result = DocumentRepository::set_status(&conn, record.id, DocumentStatus::Verified);
        assert!(matches!(result, Err(DatabaseError::ConstraintViolation(_))));
    }

    #[test]
    fn expired_document_cannot_change_status() {
        let conn = open_memory_database().unwrap();
        let record = make_record(DocumentStatus::Expired);
        DocumentRepository::insert(&conn, &record).unwrap();

        let result = DocumentRepository::set_status(&conn, record.id, DocumentStatus::Processing);
        assert!(matches!(result, Err(DatabaseError::ConstraintViolation(_))));
    }

    #[test]
    fn scan_result_and_retry_state_update() {
        let conn = open_memory_database().unwrap();
        let record = make_record(DocumentStatus::Scanning);
        DocumentRepository::insert(&conn, &record).unwrap();

        DocumentRepository::set_scan_result(&conn, record.id, ScanVerdict::Clean).unwrap();
        let next = Utc::now() + chrono::Duration::seconds(60);
        DocumentRepository::set_retry_state(&conn, record.id, 2, Some(next)).unwrap();

        let loaded = DocumentRepository::get(&conn, record.id).unwrap();
        assert_eq!(loaded.scan_result, Some(ScanVerdict::Clean));
        assert_eq!(loaded.retry_count, 2);
        assert!(loaded.next_retry_at.is_some());
    }

    #[test]
    fn list_by_status_filters() {
        let conn = open_memory_database().unwrap();
        DocumentRepository::insert(&conn, &make_record(DocumentStatus::Uploaded)).unwrap();
        DocumentRepository::insert(&conn, &make_record(DocumentStatus::Uploaded)).unwrap();
        DocumentRepository::insert(&conn, &make_record(DocumentStatus::Quarantined)).unwrap();

        let uploaded = DocumentRepository::list_by_status(&conn, DocumentStatus::Uploaded).unwrap();
        assert_eq!(uploaded.len(), 2);
        let quarantined =
            DocumentRepository::list_by_status(&conn, DocumentStatus::Quarantined).unwrap();
        assert_eq!(quarantined.len(), 1);
    }
}
