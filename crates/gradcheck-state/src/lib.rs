//! GradCheck-State: criteria schema and store access
//!
//! This crate provides the data layer for GradCheck. It defines the typed
//! shape of a semester's degree-completion criteria, tolerant decoding of
//! whatever the remote store returns, and the traits through which the rest
//! of the workspace talks to the criteria API and the audit engine.
//!
//! ## Layer 0 - Data/Persistence
//!
//! Focus: Data integrity and a faithful view of the external API.
//!
//! ## Key Components
//!
//! - `SemesterData`: slots + rules stored under one `SemesterKey`
//! - `normalize`: never-failing decoding of partial payloads
//! - `CriteriaStore` / `ReferenceStore` / `AuditService`: backend-agnostic traits
//! - `HttpClient`: reqwest implementation of all three
//! - `fakes`: in-memory implementations for tests

mod client;
mod error;
pub mod fakes;
pub mod normalize;
mod schema;
pub mod storage_traits;

pub use client::{
    error_for_status, interpret_response, ClientConfig, HttpClient, DEFAULT_API_BASE,
    DEFAULT_TIMEOUT_SECS,
};
pub use error::StorageError;
pub use normalize::{normalize_audit_outcomes, normalize_semester_data};
pub use schema::{
    is_known_grade, new_id, AuditOutcome, AuditRequest, CourseEntry, CriteriaDefaults, CriteriaDigest,
    ParseSemesterError, ProgramMeta, Rule, RuleCondition, RuleEffect, Semester, SemesterData,
    SemesterKey, Slot, SlotKind, StudentRecord, TranscriptRow, YearGroupSummary,
    DEFAULT_ELECTIVE_TAG, DEFAULT_PASS_GRADE, ELECTIVE_PRIORITY, KNOWN_GRADES, REQUIRED_PRIORITY,
};
pub use storage_traits::{
    AuditService, CriteriaStore, ReferenceStore, SaveReceipt, StorageResult,
};
