//! Strongly-typed pipeline configuration with explicit defaults.
//!
//! Every threshold, weight, and retry knob lives here as a named field and is
//! validated once at service construction, not per document.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing_subscriber::EnvFilter;

/// Application-level constants
pub const APP_NAME: &str = "Aidvault";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default tracing filter when RUST_LOG is unset.
pub fn default_log_filter() -> String {
    format!("{}=info", env!("CARGO_PKG_NAME"))
}

/// Initialize tracing for binaries and integration harnesses.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(default_log_filter())),
        )
        .init();
}

/// Get the application data directory (~/Aidvault/)
pub fn app_data_dir() -> PathBuf {
    let home = dirs::home_dir().expect("Cannot determine home directory");
    home.join(APP_NAME)
}

/// Default root for the local storage gateway.
pub fn documents_dir() -> PathBuf {
    app_data_dir().join("documents")
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration value out of range: {field} = {value}")]
    OutOfRange { field: &'static str, value: f32 },

    #[error("Score weights must sum to 1.0, got {0}")]
    WeightSum(f32),

    #[error("Classification rule set is empty")]
    EmptyRuleSet,

    #[error("max_extraction_retries must be at least 1")]
    ZeroRetries,

    #[error("Invalid classification pattern {pattern}: {reason}")]
    InvalidPattern { pattern: String, reason: String },
}

/// Configuration for the document verification pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Extracted fields below this confidence are flagged for validation (0.0-1.0).
    pub field_confidence_threshold: f32,
    /// Overall verification score at or above which a document auto-approves.
    pub auto_approval_threshold: f32,
    /// Weight of classification confidence in the overall verification score.
    pub classification_weight: f32,
    /// Weight of extraction confidence in the overall verification score.
    pub extraction_weight: f32,
    /// Weight of the field-validation pass fraction in the overall score.
    pub validation_weight: f32,
    /// Confidence boost applied when the file name carries a type keyword.
    pub filename_boost: f32,
    /// Days before a non-terminal verification record expires.
    pub verification_grace_days: i64,
    /// Bounded attempts for the extraction-provider call.
    pub max_extraction_retries: u32,
    /// Base backoff between extraction retries, in seconds (doubles per attempt).
    pub retry_backoff_secs: u64,
    /// Request timeout for the extraction provider.
    pub provider_timeout_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            field_confidence_threshold: 0.7,
            auto_approval_threshold: 0.85,
            classification_weight: 0.35,
            extraction_weight: 0.35,
            validation_weight: 0.30,
            filename_boost: 0.1,
            verification_grace_days: 30,
            max_extraction_retries: 3,
            retry_backoff_secs: 60,
            provider_timeout_secs: 120,
        }
    }
}

impl PipelineConfig {
    /// Fail-fast validation, run once at service start.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let unit_fields = [
            ("field_confidence_threshold", self.field_confidence_threshold),
            ("auto_approval_threshold", self.auto_approval_threshold),
            ("classification_weight", self.classification_weight),
            ("extraction_weight", self.extraction_weight),
            ("validation_weight", self.validation_weight),
            ("filename_boost", self.filename_boost),
        ];
        for (field, value) in unit_fields {
            if !(0.0..=1.0).contains(&value) || value.is_nan() {
                return Err(ConfigError::OutOfRange { field, value });
            }
        }

        let weight_sum =
            self.classification_weight + self.extraction_weight + self.validation_weight;
        if (weight_sum - 1.0).abs() > 0.001 {
            return Err(ConfigError::WeightSum(weight_sum));
        }

        if self.verification_grace_days <= 0 {
            return Err(ConfigError::OutOfRange {
                field: "verification_grace_days",
                value: self.verification_grace_days as f32,
            });
        }

        if self.max_extraction_retries == 0 {
            return Err(ConfigError::ZeroRetries);
        }

        Ok(())
    }
}
