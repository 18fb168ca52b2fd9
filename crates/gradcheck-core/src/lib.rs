//! GradCheck Core Library
//!
//! Cascading criteria resolution, edit buffers and editing sessions on top
//! of the stores defined in `gradcheck-state`.

pub mod audit;
pub mod cascade;
pub mod edit_buffer;
pub mod error;
pub mod obs;
pub mod session;
pub mod telemetry;

pub use audit::{group_transcript_rows, render_audit_summary_md, run_audit, AuditReport, AuditSummary};

pub use cascade::{
    CascadeConfig, CascadeContext, CascadeResolver, CascadeStep, Resolution, ResolutionSource,
    DEFAULT_CASCADE, DEFAULT_MIN_YEAR_GROUP,
};

pub use edit_buffer::{EditBuffer, RulePatch, SlotDefaults, SlotPatch};

pub use error::{AuditError, ResolveError, Result, SessionError};

pub use session::{
    Applied, CriteriaSession, PendingResolution, ResolveTicket, SaveQueue, Selection,
    SAVED_ADVISORY,
};

pub use telemetry::init_tracing;

pub use gradcheck_state::{
    CriteriaDefaults, CriteriaStore, Rule, Semester, SemesterData, SemesterKey, Slot, SlotKind,
    StorageError,
};
