//! Verification workflow: the durable outcome of the pipeline for each
//! document, from pending evaluation through automatic approval, manual
//! review, or rejection, with read-derived expiration.

pub mod store;
pub mod types;
pub mod workflow;

pub use store::VerificationStore;
pub use types::{
    VerificationCheck, VerificationRecord, VerificationStatus, VerificationType,
};
pub use workflow::{EvaluationInput, VerificationWorkflow, WorkflowError};
