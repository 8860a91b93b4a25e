//! Extraction stage: adapter over the external text/field-extraction
//! provider, result shaping, and replace-not-append persistence.

pub mod provider;
pub mod service;
pub mod store;
pub mod types;

pub use provider::{ExtractionProvider, HttpExtractionProvider, ProviderAnalysis, ProviderError, ProviderField};
pub use service::ExtractionService;
pub use store::ExtractionStore;
pub use types::{ExtractedField, ExtractionResult, FieldDataType, ProcessingStatus};
