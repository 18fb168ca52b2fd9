//! Storage trait definitions for GradCheck
//!
//! These traits define the external collaborators of the criteria core:
//! - `CriteriaStore`: read/replace one semester key's criteria
//! - `ReferenceStore`: year-group and program listings
//! - `AuditService`: the external transcript audit engine
//!
//! All traits are async and backend-agnostic. `HttpClient` implements all
//! three against the criteria API; in-memory fakes are provided for testing
//! via the `fakes` module.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StorageError;
use crate::schema::{
    AuditOutcome, AuditRequest, CriteriaDigest, ProgramMeta, SemesterData, SemesterKey,
    YearGroupSummary,
};

/// Result type for storage operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;

// ---------------------------------------------------------------------------
// CriteriaStore
// ---------------------------------------------------------------------------

/// Acknowledgement of a successful save.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveReceipt {
    pub key: SemesterKey,
    /// Digest of the data as submitted
    pub digest: CriteriaDigest,
    pub saved_at: DateTime<Utc>,
}

impl SaveReceipt {
    pub fn new(key: &SemesterKey, data: &SemesterData) -> Self {
        Self {
            key: key.clone(),
            digest: data.digest(),
            saved_at: Utc::now(),
        }
    }
}

/// Criteria persistence for one semester key at a time.
///
/// Guarantees:
/// - `fetch` on a key with nothing saved returns empty data, not an error.
/// - `fetch` returns normalized data (see `normalize`), never partial shapes.
/// - `save` fully replaces the value stored under exactly that key.
/// - Transport and authorization failures are errors, never "empty".
#[async_trait]
pub trait CriteriaStore: Send + Sync {
    /// Load the criteria stored under `key`.
    async fn fetch(&self, key: &SemesterKey) -> StorageResult<SemesterData>;

    /// Replace the criteria stored under `key`.
    async fn save(&self, key: &SemesterKey, data: &SemesterData) -> StorageResult<SaveReceipt>;
}

// ---------------------------------------------------------------------------
// ReferenceStore
// ---------------------------------------------------------------------------

/// Year-group and program reference data.
#[async_trait]
pub trait ReferenceStore: Send + Sync {
    /// All known year-groups with their program names.
    async fn list_year_groups(&self) -> StorageResult<Vec<YearGroupSummary>>;

    /// Create a year-group if it does not exist yet.
    async fn upsert_year_group(&self, year_group: i32) -> StorageResult<()>;

    /// Programs defined for a year-group.
    async fn list_programs(&self, year_group: i32) -> StorageResult<Vec<ProgramMeta>>;

    /// Create or replace a program (matched by display name).
    async fn upsert_program(&self, year_group: i32, meta: &ProgramMeta) -> StorageResult<()>;
}

// ---------------------------------------------------------------------------
// AuditService
// ---------------------------------------------------------------------------

/// The external degree-audit engine.
///
/// Returns one outcome per submitted student, in any order.
#[async_trait]
pub trait AuditService: Send + Sync {
    async fn run_audit(&self, request: &AuditRequest) -> StorageResult<Vec<AuditOutcome>>;
}
