//! Persistence for extraction results.
//!
//! At most one result per document. `save` replaces everything from the
//! previous attempt inside one transaction, so a retry never mixes fields
//! or errors from two runs.

use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use super::types::{ExtractedField, ExtractionResult, FieldDataType, ProcessingStatus};
use crate::db::DatabaseError;

pub struct ExtractionStore;

impl ExtractionStore {
    /// Replace the stored result for the document with `result`.
    pub fn save(conn: &mut Connection, result: &ExtractionResult) -> Result<(), DatabaseError> {
        let doc_id = result.document_id.to_string();
        let tx = conn.transaction()?;

        tx.execute(
            "DELETE FROM extraction_errors WHERE document_id = ?1",
            params![doc_id],
        )?;
        tx.execute(
            "DELETE FROM extracted_fields WHERE document_id = ?1",
            params![doc_id],
        )?;
        tx.execute(
            "DELETE FROM extraction_results WHERE document_id = ?1",
            params![doc_id],
        )?;

        tx.execute(
            "INSERT INTO extraction_results
             (document_id, overall_confidence, raw_text, status, provider_job_id, extracted_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                doc_id,
                result.overall_confidence,
                result.raw_text,
                result.status.as_str(),
                result.provider_job_id,
                result.extracted_at,
            ],
        )?;

        for (ord, field) in result.fields.iter().enumerate() {
            let value = serde_json::to_string(&field.value)
                .map_err(|e| DatabaseError::Json(e.to_string()))?;
            tx.execute(
                "INSERT INTO extracted_fields
                 (document_id, ord, name, value, confidence, data_type,
                  requires_validation, validation_error)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    doc_id,
                    ord as i64,
                    field.name,
                    value,
                    field.confidence,
                    field.data_type.as_str(),
                    field.requires_validation,
                    field.validation_error,
                ],
            )?;
        }

        for (ord, message) in result.validation_errors.iter().enumerate() {
            tx.execute(
                "INSERT INTO extraction_errors (document_id, ord, message) VALUES (?1, ?2, ?3)",
                params![doc_id, ord as i64, message],
            )?;
        }

        tx.commit()?;
        Ok(())
    }

    pub fn get(
        conn: &Connection,
        document_id: Uuid,
    ) -> Result<Option<ExtractionResult>, DatabaseError> {
        let doc_id = document_id.to_string();

        let head = conn
            .query_row(
                "SELECT overall_confidence, raw_text, status, provider_job_id, extracted_at
                 FROM extraction_results WHERE document_id = ?1",
                params![doc_id],
                |row| {
                    Ok((
                        row.get::<_, f32>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, Option<String>>(3)?,
                        row.get::<_, chrono::DateTime<chrono::Utc>>(4)?,
                    ))
                },
            )
            .optional()?;

        let Some((overall_confidence, raw_text, status, provider_job_id, extracted_at)) = head
        else {
            return Ok(None);
        };

        let status = ProcessingStatus::from_str(&status).ok_or_else(|| {
            DatabaseError::InvalidEnum {
                field: "extraction_results.status".into(),
                value: status.clone(),
            }
        })?;

        let mut stmt = conn.prepare(
            "SELECT name, value, confidence, data_type, requires_validation, validation_error
             FROM extracted_fields WHERE document_id = ?1 ORDER BY ord ASC",
        )?;
        let rows = stmt.query_map(params![doc_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, f32>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, bool>(4)?,
                row.get::<_, Option<String>>(5)?,
            ))
        })?;

        let mut fields = Vec::new();
        for row in rows {
            let (name, value, confidence, data_type, requires_validation, validation_error) = row?;
            let value = serde_json::from_str(&value)
                .map_err(|e| DatabaseError::Json(e.to_string()))?;
            let data_type =
                FieldDataType::from_str(&data_type).ok_or_else(|| DatabaseError::InvalidEnum {
                    field: "extracted_fields.data_type".into(),
                    value: data_type.clone(),
                })?;
            fields.push(ExtractedField {
                name,
                value,
                confidence,
                data_type,
                requires_validation,
                validation_error,
            });
        }

        let mut stmt = conn.prepare(
            "SELECT message FROM extraction_errors WHERE document_id = ?1 ORDER BY ord ASC",
        )?;
        let rows = stmt.query_map(params![doc_id], |row| row.get::<_, String>(0))?;
        let mut validation_errors = Vec::new();
        for row in rows {
            validation_errors.push(row?);
        }

        Ok(Some(ExtractionResult {
            document_id,
            overall_confidence,
            raw_text,
            fields,
            validation_errors,
            status,
            provider_job_id,
            extracted_at,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::sqlite::open_memory_database;
    use crate::db::DocumentRepository;
    use crate::models::{DocumentRecord, DocumentStatus, DocumentType};
    use chrono::Utc;
    use serde_json::json;

    fn insert_document(conn: &Connection) -> Uuid {
        let record = DocumentRecord {
            id: Uuid::new_v4(),
            user_id: "user-1".into(),
            file_name: "w2_2024.pdf".into(),
            content_type: "application/pdf".into(),
            size_bytes: 1024,
            content_hash: "abc123".into(),
            storage_path: "obj-1".into(),
            expected_type: Some(DocumentType::W2Form),
            status: DocumentStatus::Processing,
            uploaded_at: Utc::now(),
            expires_at: None,
            is_encrypted: false,
            scan_result: None,
            retry_count: 0,
            next_retry_at: None,
        };
        DocumentRepository::insert(conn, &record).unwrap();
        record.id
    }

    fn sample_result(document_id: Uuid) -> ExtractionResult {
        ExtractionResult {
            document_id,
            overall_confidence: 0.88,
            raw_text: "Form W-2 Wage and Tax Statement".into(),
            fields: vec![
                ExtractedField {
                    name: "wages".into(),
                    value: json!("52000.00"),
                    confidence: 0.93,
                    data_type: FieldDataType::Currency,
                    requires_validation: false,
                    validation_error: None,
                },
                ExtractedField {
                    name: "employee_ssn".into(),
                    value: json!("123-45-6789"),
                    confidence: 0.61,
                    data_type: FieldDataType::Ssn,
                    requires_validation: true,
                    validation_error: None,
                },
            ],
            validation_errors: vec![],
            status: ProcessingStatus::Completed,
            provider_job_id: Some("job-9".into()),
            extracted_at: Utc::now(),
        }
    }

    #[test]
    fn save_and_get_roundtrip() {
        let mut conn = open_memory_database().unwrap();
        let doc_id = insert_document(&conn);
        let result = sample_result(doc_id);
        ExtractionStore::save(&mut conn, &result).unwrap();

        let loaded = ExtractionStore::get(&conn, doc_id).unwrap().unwrap();
        assert_eq!(loaded.fields.len(), 2);
        assert_eq!(loaded.fields[0].name, "wages");
        assert_eq!(loaded.fields[1].data_type, FieldDataType::Ssn);
        assert!(loaded.fields[1].requires_validation);
        assert_eq!(loaded.status, ProcessingStatus::Completed);
        assert_eq!(loaded.provider_job_id.as_deref(), Some("job-9"));
    }

    #[test]
    fn get_missing_is_none() {
        let conn = open_memory_database().unwrap();
        assert!(ExtractionStore::get(&conn, Uuid::new_v4()).unwrap().is_none());
    }

    #[test]
    fn save_replaces_previous_attempt() {
        let mut conn = open_memory_database().unwrap();
        let doc_id = insert_document(&conn);

        let mut first = sample_result(doc_id);
        first.status = ProcessingStatus::Failed;
        first.validation_errors = vec!["Provider request timed out after 120s".into()];
        first.fields.clear();
        ExtractionStore::save(&mut conn, &first).unwrap();

        let second = sample_result(doc_id);
        ExtractionStore::save(&mut conn, &second).unwrap();

        let loaded = ExtractionStore::get(&conn, doc_id).unwrap().unwrap();
        assert_eq!(loaded.status, ProcessingStatus::Completed);
        assert_eq!(loaded.fields.len(), 2);
        assert!(loaded.validation_errors.is_empty());
    }

    #[test]
    fn field_order_preserved() {
        let mut conn = open_memory_database().unwrap();
        let doc_id = insert_document(&conn);
        let mut result = sample_result(doc_id);
        result.fields.reverse();
        ExtractionStore::save(&mut conn, &result).unwrap();

        let loaded = ExtractionStore::get(&conn, doc_id).unwrap().unwrap();
        assert_eq!(loaded.fields[0].name, "employee_ssn");
        assert_eq!(loaded.fields[1].name, "wages");
    }
}
