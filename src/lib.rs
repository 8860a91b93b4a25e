//! aidvault — financial-aid document verification pipeline.
//!
//! Ingests user-submitted supporting documents (tax forms, wage statements,
//! identification, transcripts), scans them for malware, extracts structured
//! fields through an external provider, classifies the document type with
//! weighted keyword rules, validates the extracted fields, and drives each
//! document through a verification workflow ending in automatic approval,
//! manual review, or rejection.
//!
//! [`DocumentService`] is the entry point; everything external (blob
//! storage, malware engine, extraction provider, notifications) sits behind
//! a trait.

pub mod classify;
pub mod config;
pub mod db;
pub mod extraction;
pub mod models;
pub mod notify;
pub mod pipeline;
pub mod scan;
pub mod service;
pub mod storage;
pub mod validate;
pub mod verification;

pub use config::PipelineConfig;
pub use models::{DocumentRecord, DocumentStatus, DocumentType, ScanVerdict};
pub use pipeline::{PipelineError, PipelineOutcome, SubmitRequest};
pub use service::DocumentService;
pub use verification::{VerificationRecord, VerificationStatus};
