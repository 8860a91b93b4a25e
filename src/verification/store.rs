//! Persistence for verification records.
//!
//! Checks, issues, and corrections live in typed child tables keyed by
//! verification id and ordinal; only check messages collapse to a JSON
//! column at the storage edge. Every read path reports derived expiration.

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use super::types::{VerificationCheck, VerificationRecord, VerificationStatus, VerificationType};
use crate::db::DatabaseError;

pub struct VerificationStore;

impl VerificationStore {
    /// Persist the record, replacing any prior state for the same document.
    pub fn save(conn: &mut Connection, record: &VerificationRecord) -> Result<(), DatabaseError> {
        let tx = conn.transaction()?;

        // A document has at most one verification; replace it wholesale.
        let prior: Option<String> = tx
            .query_row(
                "SELECT id FROM verifications WHERE document_id = ?1",
                params![record.document_id.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        if let Some(prior_id) = prior {
            for table in ["verification_checks", "verification_issues", "verification_corrections"] {
                tx.execute(
                    &format!("DELETE FROM {table} WHERE verification_id = ?1"),
                    params![prior_id],
                )?;
            }
            tx.execute("DELETE FROM verifications WHERE id = ?1", params![prior_id])?;
        }

        tx.execute(
            "INSERT INTO verifications
             (id, document_id, user_id, status, verification_type, overall_score,
              reviewer_id, reviewer_notes, rejection_reason, created_at, verified_at, expires_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                record.id.to_string(),
                record.document_id.to_string(),
                record.user_id,
                record.status.as_str(),
                record.verification_type.as_str(),
                record.overall_score,
                record.reviewer_id,
                record.reviewer_notes,
                record.rejection_reason,
                record.created_at,
                record.verified_at,
                record.expires_at,
            ],
        )?;

        for (ord, check) in record.checks.iter().enumerate() {
            let messages = serde_json::to_string(&check.messages)
                .map_err(|e| DatabaseError::Json(e.to_string()))?;
            tx.execute(
                "INSERT INTO verification_checks
                 (verification_id, ord, name, passed, confidence, check_type, checked_at, messages)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    record.id.to_string(),
                    ord as i64,
                    check.name,
                    check.passed,
                    check.confidence,
                    check.check_type,
                    check.checked_at,
                    messages,
                ],
            )?;
        }
        for (ord, message) in record.issues.iter().enumerate() {
            tx.execute(
                "INSERT INTO verification_issues (verification_id, ord, message)
                 VALUES (?1, ?2, ?3)",
                params![record.id.to_string(), ord as i64, message],
            )?;
        }
        for (ord, message) in record.required_corrections.iter().enumerate() {
            tx.execute(
                "INSERT INTO verification_corrections (verification_id, ord, message)
                 VALUES (?1, ?2, ?3)",
                params![record.id.to_string(), ord as i64, message],
            )?;
        }

        tx.commit()?;
        Ok(())
    }

    pub fn get_by_document(
        conn: &Connection,
        document_id: Uuid,
    ) -> Result<Option<VerificationRecord>, DatabaseError> {
        let head = conn
            .query_row(
                "SELECT id, document_id, user_id, status, verification_type, overall_score,
                        reviewer_id, reviewer_notes, rejection_reason, created_at, verified_at,
                        expires_at
                 FROM verifications WHERE document_id = ?1",
                params![document_id.to_string()],
                map_head,
            )
            .optional()?;

        match head {
            Some(head) => Ok(Some(Self::hydrate(conn, head?)?)),
            None => Ok(None),
        }
    }

    /// Records awaiting a reviewer, oldest first. Expired ones are excluded;
    /// they are no longer actionable.
    pub fn list_requiring_review(
        conn: &Connection,
    ) -> Result<Vec<VerificationRecord>, DatabaseError> {
        let mut stmt = conn.prepare(
            "SELECT id, document_id, user_id, status, verification_type, overall_score,
                    reviewer_id, reviewer_notes, rejection_reason, created_at, verified_at,
                    expires_at
             FROM verifications WHERE status = ?1 ORDER BY created_at ASC",
        )?;
        let rows = stmt.query_map(
            params![VerificationStatus::ManualReviewRequired.as_str()],
            map_head,
        )?;

        let mut records = Vec::new();
        for row in rows {
            let record = Self::hydrate(conn, row??)?;
            if record.status == VerificationStatus::ManualReviewRequired {
                records.push(record);
            }
        }
        Ok(records)
    }

    /// Attach child rows and apply read-time expiration.
    fn hydrate(
        conn: &Connection,
        mut record: VerificationRecord,
    ) -> Result<VerificationRecord, DatabaseError> {
        let ver_id = record.id.to_string();

        let mut stmt = conn.prepare(
            "SELECT name, passed, confidence, check_type, checked_at, messages
             FROM verification_checks WHERE verification_id = ?1 ORDER BY ord ASC",
        )?;
        let rows = stmt.query_map(params![ver_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, bool>(1)?,
                row.get::<_, f32>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, chrono::DateTime<Utc>>(4)?,
                row.get::<_, String>(5)?,
            ))
        })?;
        for row in rows {
            let (name, passed, confidence, check_type, checked_at, messages) = row?;
            let messages: Vec<String> = serde_json::from_str(&messages)
                .map_err(|e| DatabaseError::Json(e.to_string()))?;
            record.checks.push(VerificationCheck {
                name,
                passed,
                confidence,
                check_type,
                checked_at,
                messages,
            });
        }

        record.issues = Self::child_messages(conn, "verification_issues", &ver_id)?;
        record.required_corrections =
            Self::child_messages(conn, "verification_corrections", &ver_id)?;

        record.status = record.effective_status(Utc::now());
        Ok(record)
    }

    fn child_messages(
        conn: &Connection,
        table: &str,
        verification_id: &str,
    ) -> Result<Vec<String>, DatabaseError> {
        let mut stmt = conn.prepare(&format!(
            "SELECT message FROM {table} WHERE verification_id = ?1 ORDER BY ord ASC"
        ))?;
        let rows = stmt.query_map(params![verification_id], |row| row.get::<_, String>(0))?;
        let mut messages = Vec::new();
        for row in rows {
            messages.push(row?);
        }
        Ok(messages)
    }
}

type HeadResult = Result<VerificationRecord, DatabaseError>;

fn map_head(row: &Row<'_>) -> rusqlite::Result<HeadResult> {
    let id: String = row.get(0)?;
    let document_id: String = row.get(1)?;
    let status: String = row.get(3)?;
    let verification_type: String = row.get(4)?;

    Ok((|| {
        Ok(VerificationRecord {
            id: Uuid::parse_str(&id).map_err(|_| DatabaseError::InvalidEnum {
                field: "verification.id".into(),
                value: id.clone(),
            })?,
            document_id: Uuid::parse_str(&document_id).map_err(|_| {
                DatabaseError::InvalidEnum {
                    field: "verification.document_id".into(),
                    value: document_id.clone(),
                }
            })?,
            user_id: row.get(2)?,
            status: VerificationStatus::from_str(&status).ok_or_else(|| {
                DatabaseError::InvalidEnum {
                    field: "verification.status".into(),
                    value: status.clone(),
                }
            })?,
            verification_type: VerificationType::from_str(&verification_type).ok_or_else(
                || DatabaseError::InvalidEnum {
                    field: "verification.verification_type".into(),
                    value: verification_type.clone(),
                },
            )?,
            overall_score: row.get(5)?,
            reviewer_id: row.get(6)?,
            reviewer_notes: row.get(7)?,
            rejection_reason: row.get(8)?,
            required_corrections: Vec::new(),
            issues: Vec::new(),
            checks: Vec::new(),
            created_at: row.get(9)?,
            verified_at: row.get(10)?,
            expires_at: row.get(11)?,
        })
    })())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineConfig;
    use crate::db::sqlite::open_memory_database;
    use crate::db::DocumentRepository;
    use crate::models::{DocumentRecord, DocumentStatus, DocumentType};
    use crate::verification::workflow::{EvaluationInput, VerificationWorkflow};
    use chrono::Duration;

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

    fn evaluated_record(document_id: Uuid, level: f32) -> VerificationRecord {
        let wf = VerificationWorkflow::new(&PipelineConfig::default());
        let mut record = wf.start(document_id, "user-1");
        wf.evaluate(
            &mut record,
            &EvaluationInput {
                classification_confidence: level,
                extraction_confidence: level,
                validation_pass_fraction: level,
                issues: vec![],
                upstream_failure: None,
            },
        )
        .unwrap();
        record
    }

    #[test]
    fn save_and_get_roundtrip_with_children() {
        let mut conn = open_memory_database().unwrap();
        let doc_id = insert_document(&conn);
        let mut record = evaluated_record(doc_id, 0.40);
        record.issues.push("Low extraction confidence".into());
        VerificationStore::save(&mut conn, &record).unwrap();

        let loaded = VerificationStore::get_by_document(&conn, doc_id).unwrap().unwrap();
        assert_eq!(loaded.status, VerificationStatus::ManualReviewRequired);
        assert_eq!(loaded.checks.len(), 3);
        assert_eq!(loaded.checks[0].check_type, "classification");
        assert_eq!(loaded.issues, vec!["Low extraction confidence".to_string()]);
        assert!((loaded.overall_score - 0.40).abs() < 1e-5);
    }

    #[test]
    fn save_replaces_prior_record_for_document() {
        let mut conn = open_memory_database().unwrap();
        let doc_id = insert_document(&conn);
        VerificationStore::save(&mut conn, &evaluated_record(doc_id, 0.40)).unwrap();

        let second = evaluated_record(doc_id, 0.95);
        VerificationStore::save(&mut conn, &second).unwrap();

        let loaded = VerificationStore::get_by_document(&conn, doc_id).unwrap().unwrap();
        assert_eq!(loaded.id, second.id);
        assert_eq!(loaded.status, VerificationStatus::Approved);
        assert_eq!(loaded.checks.len(), 3);
    }

    #[test]
    fn expired_record_reads_as_expired() {
        let mut conn = open_memory_database().unwrap();
        let doc_id = insert_document(&conn);
        let mut record = evaluated_record(doc_id, 0.40);
        record.expires_at = Utc::now() - Duration::days(1);
        VerificationStore::save(&mut conn, &record).unwrap();

        let loaded = VerificationStore::get_by_document(&conn, doc_id).unwrap().unwrap();
        assert_eq!(loaded.status, VerificationStatus::Expired);
    }

    #[test]
    fn review_queue_lists_only_actionable_records() {
        let mut conn = open_memory_database().unwrap();

        let reviewable = insert_document(&conn);
        VerificationStore::save(&mut conn, &evaluated_record(reviewable, 0.40)).unwrap();

        let approved = insert_document(&conn);
        VerificationStore::save(&mut conn, &evaluated_record(approved, 0.95)).unwrap();

        let lapsed = insert_document(&conn);
        let mut expired = evaluated_record(lapsed, 0.40);
        expired.expires_at = Utc::now() - Duration::days(1);
        VerificationStore::save(&mut conn, &expired).unwrap();

        let queue = VerificationStore::list_requiring_review(&conn).unwrap();
        assert_eq!(queue.len(), 1);
        assert_eq!(queue[0].document_id, reviewable);
    }

    #[test]
    fn rejection_corrections_keep_order() {
        let mut conn = open_memory_database().unwrap();
        let doc_id = insert_document(&conn);
        let wf = VerificationWorkflow::new(&PipelineConfig::default());
        let mut record = evaluated_record(doc_id, 0.40);
        wf.reject(
            &mut record,
            "Unreadable scan",
            &[
                "Rescan at 300 dpi or higher".to_string(),
                "Include all four pages".to_string(),
            ],
        )
        .unwrap();
        VerificationStore::save(&mut conn, &record).unwrap();

        let loaded = VerificationStore::get_by_document(&conn, doc_id).unwrap().unwrap();
        assert_eq!(loaded.status, VerificationStatus::Rejected);
        assert_eq!(loaded.required_corrections[0], "Rescan at 300 dpi or higher");
        assert_eq!(loaded.required_corrections[1], "Include all four pages");
        assert!(loaded.verified_at.is_some());
    }
}
