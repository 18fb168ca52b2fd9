//! Error taxonomy for criteria resolution, editing sessions and audits.
//!
//! "Nothing saved" is never an error here; it drives the cascade forward.

use gradcheck_state::{SemesterKey, StorageError};

use crate::cascade::CascadeStep;

/// Errors produced while resolving the criteria to display for a key.
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("no program selected")]
    MissingProgram,

    /// The store failed at one cascade step; later steps were not attempted.
    #[error("loading {key} ({step}) failed: {source}")]
    Store {
        step: CascadeStep,
        key: SemesterKey,
        #[source]
        source: StorageError,
    },
}

impl ResolveError {
    /// User-facing advisory for this failure.
    pub fn advisory(&self) -> String {
        match self {
            ResolveError::MissingProgram => "Select a Program to load.".to_string(),
            ResolveError::Store { source, .. } => {
                format!("Failed to load semester data: {}", source)
            }
        }
    }
}

/// Errors produced by a `CriteriaSession`.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("load failed: {0}")]
    Load(#[from] ResolveError),

    /// The buffer is kept as it was; nothing was lost.
    #[error("save of {key} failed: {source}")]
    Save {
        key: SemesterKey,
        #[source]
        source: StorageError,
    },

    #[error("nothing loaded to save for {0}")]
    NothingLoaded(SemesterKey),
}

/// Errors produced when submitting transcripts to the audit service.
#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    #[error("no student rows to audit")]
    NoStudents,

    #[error("audit service failed: {0}")]
    Service(#[from] StorageError),
}

/// Result type for criteria core operations.
pub type Result<T> = std::result::Result<T, SessionError>;
