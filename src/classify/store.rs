//! Persistence for classification results. One row per document, replaced
//! wholesale on retry.

use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use super::ClassificationResult;
use crate::db::DatabaseError;
use crate::models::DocumentType;

pub struct ClassificationStore;

impl ClassificationStore {
    pub fn save(conn: &mut Connection, result: &ClassificationResult) -> Result<(), DatabaseError> {
        let doc_id = result.document_id.to_string();
        let tx = conn.transaction()?;

        tx.execute(
            "DELETE FROM classification_scores WHERE document_id = ?1",
            params![doc_id],
        )?;
        tx.execute(
            "DELETE FROM classification_results WHERE document_id = ?1",
            params![doc_id],
        )?;

        tx.execute(
            "INSERT INTO classification_results
             (document_id, document_type, confidence, classified_at, error)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                doc_id,
                result.document_type.as_str(),
                result.confidence,
                result.classified_at,
                result.error,
            ],
        )?;

        for (doc_type, score) in &result.scores {
            tx.execute(
                "INSERT INTO classification_scores (document_id, document_type, score)
                 VALUES (?1, ?2, ?3)",
                params![doc_id, doc_type.as_str(), score],
            )?;
        }

        tx.commit()?;
        Ok(())
    }

    pub fn get(
        conn: &Connection,
        document_id: Uuid,
    ) -> Result<Option<ClassificationResult>, DatabaseError> {
        use std::str::FromStr;

        let doc_id = document_id.to_string();

        let head = conn
            .query_row(
                "SELECT document_type, confidence, classified_at, error
                 FROM classification_results WHERE document_id = ?1",
                params![doc_id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, f32>(1)?,
                        row.get::<_, chrono::DateTime<chrono::Utc>>(2)?,
                        row.get::<_, Option<String>>(3)?,
                    ))
                },
            )
            .optional()?;

        let Some((document_type, confidence, classified_at, error)) = head else {
            return Ok(None);
        };
        let document_type = DocumentType::from_str(&document_type)?;

        let mut stmt = conn.prepare(
            "SELECT document_type, score FROM classification_scores WHERE document_id = ?1",
        )?;
        let rows = stmt.query_map(params![doc_id], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, f32>(1)?))
        })?;

        let mut scores = Vec::new();
        for row in rows {
            let (doc_type, score) = row?;
            scores.push((DocumentType::from_str(&doc_type)?, score));
        }
        // Restore the fixed candidate order lost to the composite key.
        scores.sort_by_key(|(t, _)| {
            DocumentType::all().iter().position(|&x| x == *t).unwrap_or(usize::MAX)
        });

        Ok(Some(ClassificationResult {
            document_id,
            document_type,
            confidence,
            scores,
            classified_at,
            error,
        }))
    }
}
