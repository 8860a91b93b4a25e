//! Core document model: type/status enums and the uploaded-document record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::DatabaseError;

/// Macro to generate enum with as_str + std::str::FromStr pattern
macro_rules! str_enum {
    ($name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }
        }

        impl std::str::FromStr for $name {
            type Err = DatabaseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant)),+,
                    _ => Err(DatabaseError::InvalidEnum {
                        field: stringify!($name).into(),
                        value: s.into(),
                    }),
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.as_str())
            }
        }
    };
}

str_enum!(DocumentType {
    TaxReturn => "tax_return",
    W2Form => "w2_form",
    BankStatement => "bank_statement",
    Identification => "identification",
    Transcript => "transcript",
    Other => "other",
});

impl DocumentType {
    pub fn all() -> &'static [DocumentType] {
        &[
            Self::TaxReturn,
            Self::W2Form,
            Self::BankStatement,
            Self::Identification,
            Self::Transcript,
            Self::Other,
        ]
    }
}

str_enum!(DocumentStatus {
    Uploaded => "uploaded",
    Scanning => "scanning",
    Clean => "clean",
    Quarantined => "quarantined",
    Processing => "processing",
    Verified => "verified",
    Rejected => "rejected",
    Expired => "expired",
});

impl DocumentStatus {
    /// Exhaustive lifecycle transition check. Quarantined and Expired are
    /// terminal; Verified/Rejected documents may be reprocessed, Expired
    /// documents are never resurrected.
    pub fn can_transition_to(self, next: DocumentStatus) -> bool {
        use DocumentStatus::*;
        match self {
            Uploaded => matches!(next, Scanning | Expired),
            // Scanning may revert to Uploaded on cancellation or scanner error.
            Scanning => matches!(next, Clean | Quarantined | Uploaded | Expired),
            Clean => matches!(next, Processing | Scanning | Expired),
            Quarantined => false,
            // Processing may revert to Clean on cancellation or scheduled retry.
            Processing => matches!(next, Verified | Rejected | Clean | Expired),
            Verified => matches!(next, Scanning | Processing | Expired),
            Rejected => matches!(next, Scanning | Processing | Expired),
            Expired => false,
        }
    }
}

str_enum!(ScanVerdict {
    Clean => "clean",
    Infected => "infected",
    Error => "error",
});

/// One uploaded file. Identifier, size, and hash are fixed at upload time;
/// a re-upload creates a new record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub id: Uuid,
    pub user_id: String,
    pub file_name: String,
    pub content_type: String,
    pub size_bytes: u64,
    pub content_hash: String,
    /// Opaque identifier issued by the storage gateway.
    pub storage_path: String,
    /// Declared/expected type hint from the uploader, if any.
    pub expected_type: Option<DocumentType>,
    pub status: DocumentStatus,
    pub uploaded_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub is_encrypted: bool,
    pub scan_result: Option<ScanVerdict>,
    pub retry_count: u32,
    pub next_retry_at: Option<DateTime<Utc>>,
}
