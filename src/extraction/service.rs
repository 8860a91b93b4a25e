//! Extraction service — wraps the provider and shapes its output.
//!
//! Provider failures are captured in the result (status `Failed`, error in
//! the validation-errors list) and never raised past the caller; one bad
//! document must not halt the batch.

use uuid::Uuid;

use super::provider::ExtractionProvider;
use super::types::{
    clamp_confidence, ExtractedField, ExtractionResult, FieldDataType, ProcessingStatus,
};
use crate::config::PipelineConfig;
use crate::models::DocumentType;

/// Extraction profile/model key for a declared document type. Unmapped and
/// `Other` fall back to the generic profile.
pub fn profile_for(doc_type: Option<DocumentType>) -> &'static str {
    match doc_type {
        Some(DocumentType::TaxReturn) => "tax-form-1040",
        Some(DocumentType::W2Form) => "wage-statement-w2",
        Some(DocumentType::BankStatement) => "bank-statement",
        Some(DocumentType::Identification) => "identity-document",
        Some(DocumentType::Transcript) => "academic-transcript",
        Some(DocumentType::Other) | None => "generic-document",
    }
}

pub struct ExtractionService {
    provider: Box<dyn ExtractionProvider>,
    field_confidence_threshold: f32,
}

impl ExtractionService {
    pub fn new(provider: Box<dyn ExtractionProvider>, config: &PipelineConfig) -> Self {
        Self {
            provider,
            field_confidence_threshold: config.field_confidence_threshold,
        }
    }

    /// Run extraction for one document. Never errors: failures come back as
    /// a `Failed` result with confidence 0.
    pub fn extract(
        &self,
        document_id: Uuid,
        bytes: &[u8],
        expected_type: Option<DocumentType>,
    ) -> ExtractionResult {
        let profile = profile_for(expected_type);

        let analysis = match self.provider.analyze_document(bytes, profile) {
            Ok(analysis) => analysis,
            Err(e) => {
                tracing::warn!(
                    document_id = %document_id,
                    profile,
                    error = %e,
                    "Extraction provider call failed"
                );
                return ExtractionResult::failed(document_id, &e.to_string());
            }
        };

        let fields: Vec<ExtractedField> = analysis
            .fields
            .iter()
            .map(|f| {
                ExtractedField::new(
                    &f.name,
                    f.value.clone(),
                    f.confidence,
                    FieldDataType::from_provider_tag(f.field_type.as_deref()),
                    self.field_confidence_threshold,
                )
            })
            .collect();

        // No fields extracted: nothing to trust, send to review.
        if fields.is_empty() {
            return ExtractionResult {
                document_id,
                overall_confidence: 0.0,
                raw_text: analysis.raw_text,
                fields,
                validation_errors: Vec::new(),
                status: ProcessingStatus::RequiresReview,
                provider_job_id: analysis.job_id,
                extracted_at: chrono::Utc::now(),
            };
        }

        let field_mean =
            fields.iter().map(|f| f.confidence).sum::<f32>() / fields.len() as f32;
        let overall = match analysis.document_confidence {
            Some(doc_conf) => (field_mean + clamp_confidence(doc_conf)) / 2.0,
            None => field_mean,
        };

        ExtractionResult {
            document_id,
            overall_confidence: clamp_confidence(overall),
            raw_text: analysis.raw_text,
            fields,
            validation_errors: Vec::new(),
            status: ProcessingStatus::Completed,
            provider_job_id: analysis.job_id,
            extracted_at: chrono::Utc::now(),
        }
    }
}

/// Cheap keyword-only classification over raw extracted text. Fallback path
/// only — the weighted rule-based classifier is authoritative.
pub fn classify_from_text(text: &str) -> DocumentType {
    let lower = text.to_lowercase();

    if has_wage_statement_pattern(&lower) {
        return DocumentType::W2Form;
    }
    if has_tax_return_pattern(&lower) {
        return DocumentType::TaxReturn;
    }
    if has_bank_statement_pattern(&lower) {
        return DocumentType::BankStatement;
    }
    if has_transcript_pattern(&lower) {
        return DocumentType::Transcript;
    }
    if has_identification_pattern(&lower) {
        return DocumentType::Identification;
    }

    DocumentType::Other
}

fn has_wage_statement_pattern(text: &str) -> bool {
    let patterns = ["form w-2", "wage and tax statement", "wages, tips"];
    patterns.iter().any(|p| text.contains(p))
}

fn has_tax_return_pattern(text: &str) -> bool {
    let patterns = ["form 1040", "adjusted gross income", "u.s. individual income tax return"];
    patterns.iter().any(|p| text.contains(p))
}

fn has_bank_statement_pattern(text: &str) -> bool {
    let patterns = ["beginning balance", "ending balance", "statement period"];
    patterns.iter().any(|p| text.contains(p))
}

fn has_transcript_pattern(text: &str) -> bool {
    let patterns = ["transcript", "cumulative gpa", "credit hours"];
    patterns.iter().any(|p| text.contains(p))
}

fn has_identification_pattern(text: &str) -> bool {
    let patterns = ["passport", "driver license", "driver's license", "date of birth"];
    patterns.iter().any(|p| text.contains(p))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extraction::provider::{ProviderAnalysis, ProviderError, ProviderField};
    use serde_json::json;

    struct MockProvider {
        response: Result<ProviderAnalysis, ProviderError>,
    }

    impl MockProvider {
        fn ok(analysis: ProviderAnalysis) -> Box<Self> {
            Box::new(Self { response: Ok(analysis) })
        }

        fn failing(error: ProviderError) -> Box<Self> {
            Box::new(Self { response: Err(error) })
        }
    }

    impl ExtractionProvider for MockProvider {
        fn analyze_document(
            &self,
            _bytes: &[u8],
            _profile: &str,
        ) -> Result<ProviderAnalysis, ProviderError> {
            match &self.response {
                Ok(a) => Ok(a.clone()),
                Err(e) => Err(ProviderError::ResponseParsing(e.to_string())),
            }
        }
    }

    fn field(name: &str, confidence: f32, field_type: Option<&str>) -> ProviderField {
        ProviderField {
            name: name.to_string(),
            value: json!("42"),
            confidence,
            field_type: field_type.map(String::from),
        }
    }

    fn service(provider: Box<dyn ExtractionProvider>) -> ExtractionService {
        ExtractionService::new(provider, &PipelineConfig::default())
    }

    #[test]
    fn overall_confidence_is_mean_of_fields() {
        let svc = service(MockProvider::ok(ProviderAnalysis {
            raw_text: "text".into(),
            fields: vec![field("a", 0.8, None), field("b", 0.6, None)],
            document_confidence: None,
            job_id: None,
        }));
        let result = svc.extract(Uuid::new_v4(), b"bytes", None);
        assert_eq!(result.status, ProcessingStatus::Completed);
        assert!((result.overall_confidence - 0.7).abs() < 1e-6);
    }

    #[test]
    fn document_confidence_blended_when_present() {
        let svc = service(MockProvider::ok(ProviderAnalysis {
            raw_text: "text".into(),
            fields: vec![field("a", 0.6, None)],
            document_confidence: Some(1.0),
            job_id: None,
        }));
        let result = svc.extract(Uuid::new_v4(), b"bytes", None);
        assert!((result.overall_confidence - 0.8).abs() < 1e-6);
    }

    #[test]
    fn zero_fields_requires_review_with_zero_confidence() {
        let svc = service(MockProvider::ok(ProviderAnalysis {
            raw_text: "unreadable scan".into(),
            fields: vec![],
            document_confidence: Some(0.9),
            job_id: Some("job-1".into()),
        }));
        let result = svc.extract(Uuid::new_v4(), b"bytes", None);
        assert_eq!(result.status, ProcessingStatus::RequiresReview);
        assert_eq!(result.overall_confidence, 0.0);
        assert_eq!(result.provider_job_id.as_deref(), Some("job-1"));
    }

    #[test]
    fn provider_failure_becomes_failed_result() {
        let svc = service(MockProvider::failing(ProviderError::Timeout(120)));
        let result = svc.extract(Uuid::new_v4(), b"bytes", Some(DocumentType::W2Form));
        assert_eq!(result.status, ProcessingStatus::Failed);
        assert_eq!(result.overall_confidence, 0.0);
        assert_eq!(result.validation_errors.len(), 1);
        assert!(result.validation_errors[0].contains("timed out"));
    }

    #[test]
    fn low_confidence_fields_flagged_for_validation() {
        let svc = service(MockProvider::ok(ProviderAnalysis {
            raw_text: "text".into(),
            fields: vec![field("low", 0.4, None), field("high", 0.95, None)],
            document_confidence: None,
            job_id: None,
        }));
        let result = svc.extract(Uuid::new_v4(), b"bytes", None);
        assert!(result.fields[0].requires_validation);
        assert!(!result.fields[1].requires_validation);
    }

    #[test]
    fn field_confidences_clamped() {
        let svc = service(MockProvider::ok(ProviderAnalysis {
            raw_text: "text".into(),
            fields: vec![field("hot", 1.8, None)],
            document_confidence: None,
            job_id: None,
        }));
        let result = svc.extract(Uuid::new_v4(), b"bytes", None);
        assert_eq!(result.fields[0].confidence, 1.0);
        assert!(result.overall_confidence <= 1.0);
    }

    #[test]
    fn provider_field_types_mapped() {
        let svc = service(MockProvider::ok(ProviderAnalysis {
            raw_text: "text".into(),
            fields: vec![field("wages", 0.9, Some("currency")), field("note", 0.9, Some("mystery"))],
            document_confidence: None,
            job_id: None,
        }));
        let result = svc.extract(Uuid::new_v4(), b"bytes", None);
        assert_eq!(result.fields[0].data_type, FieldDataType::Currency);
        assert_eq!(result.fields[1].data_type, FieldDataType::Text);
    }

    #[test]
    fn profile_selection_falls_back_to_generic() {
        assert_eq!(profile_for(Some(DocumentType::W2Form)), "wage-statement-w2");
        assert_eq!(profile_for(Some(DocumentType::Other)), "generic-document");
        assert_eq!(profile_for(None), "generic-document");
    }

    #[test]
    fn keyword_fallback_classification() {
        assert_eq!(
            classify_from_text("Form W-2 Wage and Tax Statement 2024"),
            DocumentType::W2Form
        );
        assert_eq!(
            classify_from_text("Form 1040 U.S. Individual Income Tax Return"),
            DocumentType::TaxReturn
        );
        assert_eq!(
            classify_from_text("Statement period 01/01-01/31 ending balance $512.33"),
            DocumentType::BankStatement
        );
        assert_eq!(classify_from_text("Official transcript, cumulative GPA 3.4"), DocumentType::Transcript);
        assert_eq!(classify_from_text("Passport No. X1234567"), DocumentType::Identification);
        assert_eq!(classify_from_text("grocery list: milk, eggs"), DocumentType::Other);
    }
}
