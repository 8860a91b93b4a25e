//! Verification record types and status transitions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
    Pending,
    InProgress,
    AutoApproved,
    ManualReviewRequired,
    Approved,
    Rejected,
    Expired,
}

impl VerificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::AutoApproved => "auto_approved",
            Self::ManualReviewRequired => "manual_review_required",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Expired => "expired",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "in_progress" => Some(Self::InProgress),
            "auto_approved" => Some(Self::AutoApproved),
            "manual_review_required" => Some(Self::ManualReviewRequired),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            "expired" => Some(Self::Expired),
            _ => None,
        }
    }

    /// Approved, Rejected, and Expired admit no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Approved | Self::Rejected | Self::Expired)
    }

    pub fn can_transition_to(self, next: VerificationStatus) -> bool {
        use VerificationStatus::*;
        match self {
            Pending => matches!(next, InProgress | Expired),
            InProgress => matches!(next, AutoApproved | ManualReviewRequired | Expired),
            // AutoApproved is a momentary state; it resolves to Approved.
            AutoApproved => matches!(next, Approved | Expired),
            ManualReviewRequired => matches!(next, Approved | Rejected | Expired),
            Approved | Rejected | Expired => false,
        }
    }
}

impl std::fmt::Display for VerificationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationType {
    Automatic,
    Manual,
    Compliance,
    Identity,
    Financial,
}

impl VerificationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Automatic => "automatic",
            Self::Manual => "manual",
            Self::Compliance => "compliance",
            Self::Identity => "identity",
            Self::Financial => "financial",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "automatic" => Some(Self::Automatic),
            "manual" => Some(Self::Manual),
            "compliance" => Some(Self::Compliance),
            "identity" => Some(Self::Identity),
            "financial" => Some(Self::Financial),
            _ => None,
        }
    }
}

impl std::fmt::Display for VerificationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One evaluated check contributing to the verification decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationCheck {
    pub name: String,
    pub passed: bool,
    pub confidence: f32,
    pub check_type: String,
    pub checked_at: DateTime<Utc>,
    pub messages: Vec<String>,
}

/// Durable workflow outcome for one document. Single source of truth for
/// verification state; queryable independently of the document record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationRecord {
    pub id: Uuid,
    pub document_id: Uuid,
    pub user_id: String,
    pub status: VerificationStatus,
    pub verification_type: VerificationType,
    pub overall_score: f32,
    pub reviewer_id: Option<String>,
    pub reviewer_notes: Option<String>,
    pub rejection_reason: Option<String>,
    pub required_corrections: Vec<String>,
    pub issues: Vec<String>,
    pub checks: Vec<VerificationCheck>,
    pub created_at: DateTime<Utc>,
    /// Set exactly when status reaches Approved or Rejected.
    pub verified_at: Option<DateTime<Utc>>,
    pub expires_at: DateTime<Utc>,
}

impl VerificationRecord {
    /// Status as every reader must report it: a non-terminal record past its
    /// expiration is Expired, no matter what is stored.
    pub fn effective_status(&self, now: DateTime<Utc>) -> VerificationStatus {
        if !self.status.is_terminal() && now > self.expires_at {
            VerificationStatus::Expired
        } else {
            self.status
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn record(status: VerificationStatus) -> VerificationRecord {
        VerificationRecord {
            id: Uuid::new_v4(),
            document_id: Uuid::new_v4(),
            user_id: "user-1".into(),
            status,
            verification_type: VerificationType::Automatic,
            overall_score: 0.5,
            reviewer_id: None,
            reviewer_notes: None,
            rejection_reason: None,
            required_corrections: vec![],
            issues: vec![],
            checks: vec![],
            created_at: Utc::now(),
            verified_at: None,
            expires_at: Utc::now() + Duration::days(30),
        }
    }

    #[test]
    fn terminal_states_admit_no_transitions() {
        use VerificationStatus::*;
        for terminal in [Approved, Rejected, Expired] {
            for next in [Pending, InProgress, AutoApproved, ManualReviewRequired, Approved, Rejected, Expired] {
                assert!(!terminal.can_transition_to(next));
            }
        }
    }

    #[test]
    fn decision_transitions() {
        use VerificationStatus::*;
        assert!(Pending.can_transition_to(InProgress));
        assert!(InProgress.can_transition_to(AutoApproved));
        assert!(InProgress.can_transition_to(ManualReviewRequired));
        assert!(AutoApproved.can_transition_to(Approved));
        assert!(ManualReviewRequired.can_transition_to(Approved));
        assert!(ManualReviewRequired.can_transition_to(Rejected));
        assert!(!Pending.can_transition_to(Approved));
        assert!(!AutoApproved.can_transition_to(Rejected));
    }

    #[test]
    fn every_state_can_expire_except_terminal() {
        use VerificationStatus::*;
        for state in [Pending, InProgress, AutoApproved, ManualReviewRequired] {
            assert!(state.can_transition_to(Expired));
        }
        assert!(!Approved.can_transition_to(Expired));
    }

    #[test]
    fn effective_status_derives_expiry() {
        let mut r = record(VerificationStatus::ManualReviewRequired);
        let now = Utc::now();
        assert_eq!(r.effective_status(now), VerificationStatus::ManualReviewRequired);

        r.expires_at = now - Duration::days(1);
        assert_eq!(r.effective_status(now), VerificationStatus::Expired);
    }

    #[test]
    fn expired_never_overrides_terminal() {
        let mut r = record(VerificationStatus::Approved);
        r.expires_at = Utc::now() - Duration::days(1);
        assert_eq!(r.effective_status(Utc::now()), VerificationStatus::Approved);
    }

    #[test]
    fn status_roundtrip() {
        use VerificationStatus::*;
        for s in [Pending, InProgress, AutoApproved, ManualReviewRequired, Approved, Rejected, Expired] {
            assert_eq!(VerificationStatus::from_str(s.as_str()), Some(s));
        }
    }
}
