//! Verification decision logic.
//!
//! Pure state-machine code: evaluation and reviewer actions mutate a
//! `VerificationRecord` in memory and the caller persists the result. Every
//! transition goes through the status transition table; expired records
//! short-circuit all writes.

use chrono::{Duration, Utc};
use thiserror::Error;
use uuid::Uuid;

use super::types::{
    VerificationCheck, VerificationRecord, VerificationStatus, VerificationType,
};
use crate::config::PipelineConfig;
use crate::extraction::types::clamp_confidence;

#[derive(Error, Debug)]
pub enum WorkflowError {
    #[error("Illegal verification transition {from} -> {to}")]
    InvalidTransition {
        from: VerificationStatus,
        to: VerificationStatus,
    },

    #[error("Verification record for document {0} has expired")]
    Expired(Uuid),
}

/// Accumulated pipeline signals feeding the verification decision.
#[derive(Debug, Clone)]
pub struct EvaluationInput {
    pub classification_confidence: f32,
    pub extraction_confidence: f32,
    /// Fraction of field validations that passed, in [0, 1].
    pub validation_pass_fraction: f32,
    /// Blocking issues collected upstream (failed validations, mismatched
    /// type declarations). Any issue forces manual review.
    pub issues: Vec<String>,
    /// Set when extraction or classification failed outright. Routes to
    /// manual review, never to automatic rejection.
    pub upstream_failure: Option<String>,
}

pub struct VerificationWorkflow {
    auto_approval_threshold: f32,
    classification_weight: f32,
    extraction_weight: f32,
    validation_weight: f32,
    grace_days: i64,
}

impl VerificationWorkflow {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            auto_approval_threshold: config.auto_approval_threshold,
            classification_weight: config.classification_weight,
            extraction_weight: config.extraction_weight,
            validation_weight: config.validation_weight,
            grace_days: config.verification_grace_days as i64,
        }
    }

    /// Open a fresh Pending record for a document that completed extraction,
    /// classification, and field validation.
    pub fn start(&self, document_id: Uuid, user_id: &str) -> VerificationRecord {
        let now = Utc::now();
        VerificationRecord {
            id: Uuid::new_v4(),
            document_id,
            user_id: user_id.to_string(),
            status: VerificationStatus::Pending,
            verification_type: VerificationType::Automatic,
            overall_score: 0.0,
            reviewer_id: None,
            reviewer_notes: None,
            rejection_reason: None,
            required_corrections: Vec::new(),
            issues: Vec::new(),
            checks: Vec::new(),
            created_at: now,
            verified_at: None,
            expires_at: now + Duration::days(self.grace_days),
        }
    }

    pub fn overall_score(&self, input: &EvaluationInput) -> f32 {
        let score = self.classification_weight * clamp_confidence(input.classification_confidence)
            + self.extraction_weight * clamp_confidence(input.extraction_confidence)
            + self.validation_weight * clamp_confidence(input.validation_pass_fraction);
        clamp_confidence(score)
    }

    /// Run the decision point for a Pending record. Returns the resulting
    /// status: Approved (automatic) or ManualReviewRequired.
    pub fn evaluate(
        &self,
        record: &mut VerificationRecord,
        input: &EvaluationInput,
    ) -> Result<VerificationStatus, WorkflowError> {
        let now = Utc::now();
        if record.effective_status(now) == VerificationStatus::Expired {
            return Err(WorkflowError::Expired(record.document_id));
        }

        transition(record, VerificationStatus::InProgress)?;

        record.checks.push(VerificationCheck {
            name: "classification_confidence".into(),
            passed: input.classification_confidence > 0.0,
            confidence: clamp_confidence(input.classification_confidence),
            check_type: "classification".into(),
            checked_at: now,
            messages: Vec::new(),
        });
        record.checks.push(VerificationCheck {
            name: "extraction_confidence".into(),
            passed: input.upstream_failure.is_none(),
            confidence: clamp_confidence(input.extraction_confidence),
            check_type: "extraction".into(),
            checked_at: now,
            messages: input.upstream_failure.iter().cloned().collect(),
        });
        record.checks.push(VerificationCheck {
            name: "field_validation".into(),
            passed: input.validation_pass_fraction >= 1.0,
            confidence: clamp_confidence(input.validation_pass_fraction),
            check_type: "validation".into(),
            checked_at: now,
            messages: input.issues.clone(),
        });

        record.issues.extend(input.issues.iter().cloned());
        record.overall_score = self.overall_score(input);

        if let Some(reason) = &input.upstream_failure {
            record.issues.push(format!("Processing failed: {reason}"));
            transition(record, VerificationStatus::ManualReviewRequired)?;
            return Ok(record.status);
        }

        if record.overall_score >= self.auto_approval_threshold && record.issues.is_empty() {
            transition(record, VerificationStatus::AutoApproved)?;
            transition(record, VerificationStatus::Approved)?;
            record.verification_type = VerificationType::Automatic;
            record.verified_at = Some(now);
        } else {
            transition(record, VerificationStatus::ManualReviewRequired)?;
        }

        tracing::info!(
            document_id = %record.document_id,
            status = %record.status,
            score = record.overall_score,
            "Verification decision"
        );
        Ok(record.status)
    }

    /// Reviewer approval from manual review.
    pub fn approve(
        &self,
        record: &mut VerificationRecord,
        reviewer_id: &str,
        notes: Option<&str>,
    ) -> Result<(), WorkflowError> {
        let now = Utc::now();
        if record.effective_status(now) == VerificationStatus::Expired {
            return Err(WorkflowError::Expired(record.document_id));
        }
        transition(record, VerificationStatus::Approved)?;
        record.verification_type = VerificationType::Manual;
        record.reviewer_id = Some(reviewer_id.to_string());
        record.reviewer_notes = notes.map(String::from);
        record.verified_at = Some(now);
        Ok(())
    }

    /// Reviewer rejection with a reason and the corrections the applicant
    /// must make before resubmitting.
    pub fn reject(
        &self,
        record: &mut VerificationRecord,
        reason: &str,
        required_corrections: &[String],
    ) -> Result<(), WorkflowError> {
        let now = Utc::now();
        if record.effective_status(now) == VerificationStatus::Expired {
            return Err(WorkflowError::Expired(record.document_id));
        }
        transition(record, VerificationStatus::Rejected)?;
        record.verification_type = VerificationType::Manual;
        record.rejection_reason = Some(reason.to_string());
        record.required_corrections = required_corrections.to_vec();
        record.verified_at = Some(now);
        Ok(())
    }
}

fn transition(
    record: &mut VerificationRecord,
    next: VerificationStatus,
) -> Result<(), WorkflowError> {
    if !record.status.can_transition_to(next) {
        return Err(WorkflowError::InvalidTransition {
            from: record.status,
            to: next,
        });
    }
    record.status = next;
    Ok(())
}
