//! Pipeline orchestration: intake, the per-document work queue, the stage
//! runner, and the background worker thread.

pub mod background;
pub mod intake;
pub mod queue;
pub mod runner;

pub use background::PipelineWorkerHandle;
pub use intake::{Intake, SubmitRequest};
pub use queue::{InFlight, InFlightGuard, WorkQueue};
pub use runner::{PipelineOutcome, PipelineRunner};

use thiserror::Error;
use uuid::Uuid;

use crate::config::ConfigError;
use crate::db::DatabaseError;
use crate::storage::StorageError;
use crate::verification::WorkflowError;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Database(#[from] DatabaseError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Workflow(#[from] WorkflowError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Document {0} already has a pipeline run in flight")]
    AlreadyProcessing(Uuid),

    #[error("Uploaded file is empty")]
    EmptyUpload,

    #[error("Document {0} has expired")]
    DocumentExpired(Uuid),

    #[error("Document {0} is quarantined and cannot be processed")]
    Quarantined(Uuid),

    #[error("Document {0} is not awaiting review")]
    NotReviewable(Uuid),
}
