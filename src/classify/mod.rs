//! Weighted rule-based document type classification.
//!
//! Scores every candidate type against keyword and pattern rules over the
//! extracted text, independent of any type hint the extraction provider
//! returns. Each score is traceable to specific keyword hits.

pub mod rules;
pub mod store;

pub use rules::{default_rules, ClassificationRule, DocumentClassifier};
pub use store::ClassificationStore;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::DocumentType;

/// Classifier output for one document. Replaced, not appended, on retry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub document_id: Uuid,
    pub document_type: DocumentType,
    pub confidence: f32,
    /// Score for every candidate type considered, in the fixed type order.
    pub scores: Vec<(DocumentType, f32)>,
    pub classified_at: DateTime<Utc>,
    pub error: Option<String>,
}

impl ClassificationResult {
    /// Degraded result for a classification that could not run: sentinel
    /// `Other` at zero confidence with the cause recorded.
    pub fn failed(document_id: Uuid, error: &str) -> Self {
        Self {
            document_id,
            document_type: DocumentType::Other,
            confidence: 0.0,
            scores: Vec::new(),
            classified_at: Utc::now(),
            error: Some(error.to_string()),
        }
    }
}
