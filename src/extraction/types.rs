//! Core types for the extraction stage.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Clamp a confidence into [0.0, 1.0]; NaN collapses to 0.0.
pub fn clamp_confidence(value: f32) -> f32 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Declared data type of an extracted field, driving structural validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldDataType {
    Currency,
    Date,
    Text,
    Number,
    Boolean,
    Address,
    Phone,
    Email,
    Ssn,
}

impl FieldDataType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Currency => "currency",
            Self::Date => "date",
            Self::Text => "text",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Address => "address",
            Self::Phone => "phone",
            Self::Email => "email",
            Self::Ssn => "ssn",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "currency" => Some(Self::Currency),
            "date" => Some(Self::Date),
            "text" => Some(Self::Text),
            "number" => Some(Self::Number),
            "boolean" => Some(Self::Boolean),
            "address" => Some(Self::Address),
            "phone" => Some(Self::Phone),
            "email" => Some(Self::Email),
            "ssn" => Some(Self::Ssn),
            _ => None,
        }
    }

    /// Map a provider-declared field type to ours. Unknown tags default to text.
    pub fn from_provider_tag(tag: Option<&str>) -> Self {
        match tag.map(|t| t.to_ascii_lowercase()).as_deref() {
            Some("currency") | Some("money") | Some("amount") => Self::Currency,
            Some("date") | Some("datetime") => Self::Date,
            Some("number") | Some("integer") | Some("float") => Self::Number,
            Some("boolean") | Some("bool") | Some("selectionmark") => Self::Boolean,
            Some("address") => Self::Address,
            Some("phone") | Some("phonenumber") => Self::Phone,
            Some("email") => Self::Email,
            Some("ssn") | Some("socialsecuritynumber") => Self::Ssn,
            _ => Self::Text,
        }
    }
}

impl std::fmt::Display for FieldDataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Processing status of an extraction run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    RequiresReview,
}

impl ProcessingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::RequiresReview => "requires_review",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "processing" => Some(Self::Processing),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "requires_review" => Some(Self::RequiresReview),
            _ => None,
        }
    }
}

impl std::fmt::Display for ProcessingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One extracted field candidate with its confidence and validation state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedField {
    pub name: String,
    pub value: serde_json::Value,
    pub confidence: f32,
    pub data_type: FieldDataType,
    /// Set when confidence fell below the configured threshold.
    pub requires_validation: bool,
    pub validation_error: Option<String>,
}

impl ExtractedField {
    pub fn new(
        name: &str,
        value: serde_json::Value,
        confidence: f32,
        data_type: FieldDataType,
        confidence_threshold: f32,
    ) -> Self {
        let confidence = clamp_confidence(confidence);
        Self {
            name: name.to_string(),
            value,
            confidence,
            data_type,
            requires_validation: confidence < confidence_threshold,
            validation_error: None,
        }
    }

    /// Field value rendered as text for validation. Scalars render bare
    /// (no JSON quoting); structured values fall back to compact JSON.
    pub fn value_text(&self) -> String {
        match &self.value {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

/// Output of the extraction service for one document. Scoped to exactly one
/// `DocumentRecord` and replaced, not appended, on retry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub document_id: Uuid,
    pub overall_confidence: f32,
    pub raw_text: String,
    pub fields: Vec<ExtractedField>,
    pub validation_errors: Vec<String>,
    pub status: ProcessingStatus,
    pub provider_job_id: Option<String>,
    pub extracted_at: DateTime<Utc>,
}

impl ExtractionResult {
    /// Result for a provider failure: the error is captured, never raised.
    pub fn failed(document_id: Uuid, error: &str) -> Self {
        Self {
            document_id,
            overall_confidence: 0.0,
            raw_text: String::new(),
            fields: Vec::new(),
            validation_errors: vec![error.to_string()],
            status: ProcessingStatus::Failed,
            provider_job_id: None,
            extracted_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn clamp_bounds_and_nan() {
        assert_eq!(clamp_confidence(1.7), 1.0);
        assert_eq!(clamp_confidence(-0.3), 0.0);
        assert_eq!(clamp_confidence(0.42), 0.42);
        assert_eq!(clamp_confidence(f32::NAN), 0.0);
    }

    #[test]
    fn field_below_threshold_requires_validation() {
        let field = ExtractedField::new("wages", json!("52000"), 0.5, FieldDataType::Currency, 0.7);
        assert!(field.requires_validation);

        let field = ExtractedField::new("wages", json!("52000"), 0.9, FieldDataType::Currency, 0.7);
        assert!(!field.requires_validation);
    }

    #[test]
    fn field_confidence_is_clamped_before_threshold_check() {
        let field = ExtractedField::new("x", json!(1), 3.0, FieldDataType::Number, 0.7);
        assert_eq!(field.confidence, 1.0);
        assert!(!field.requires_validation);
    }

    #[test]
    fn value_text_renders_scalars_bare() {
        let field = ExtractedField::new("ssn", json!("123-45-6789"), 0.9, FieldDataType::Ssn, 0.7);
        assert_eq!(field.value_text(), "123-45-6789");

        let field = ExtractedField::new("amount", json!(1234.5), 0.9, FieldDataType::Number, 0.7);
        assert_eq!(field.value_text(), "1234.5");
    }

    #[test]
    fn provider_tag_mapping_defaults_to_text() {
        assert_eq!(FieldDataType::from_provider_tag(Some("money")), FieldDataType::Currency);
        assert_eq!(FieldDataType::from_provider_tag(Some("DATE")), FieldDataType::Date);
        assert_eq!(FieldDataType::from_provider_tag(Some("blob")), FieldDataType::Text);
        assert_eq!(FieldDataType::from_provider_tag(None), FieldDataType::Text);
    }

    #[test]
    fn failed_result_captures_error() {
        let id = Uuid::new_v4();
        let result = ExtractionResult::failed(id, "provider timeout");
        assert_eq!(result.status, ProcessingStatus::Failed);
        assert_eq!(result.overall_confidence, 0.0);
        assert_eq!(result.validation_errors, vec!["provider timeout".to_string()]);
    }

    #[test]
    fn processing_status_roundtrip() {
        for status in [
            ProcessingStatus::Pending,
            ProcessingStatus::Processing,
            ProcessingStatus::Completed,
            ProcessingStatus::Failed,
            ProcessingStatus::RequiresReview,
        ] {
            assert_eq!(ProcessingStatus::from_str(status.as_str()), Some(status));
        }
    }

    #[test]
    fn field_data_type_serde_roundtrip() {
        let json = serde_json::to_string(&FieldDataType::Ssn).unwrap();
        assert_eq!(json, "\"ssn\"");
        let parsed: FieldDataType = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, FieldDataType::Ssn);
    }
}
