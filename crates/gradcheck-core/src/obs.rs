//! Structured observability hooks for criteria resolution and saving.
//!
//! This module provides:
//! - A selection-scoped tracing span (`selection_span`)
//! - Emission functions for key events: cascade steps, resolution, stale
//!   discards, saves
//!
//! Events are emitted at `debug!`/`info!` level (configurable via `RUST_LOG`).
//! For JSON output, pass `--json` to the CLI.

use gradcheck_state::{CriteriaDigest, SemesterKey};
use tracing::{debug, info, warn};

use crate::cascade::{CascadeStep, Resolution};

/// Span tagged with the selection being resolved.
pub fn selection_span(key: &SemesterKey) -> tracing::Span {
    tracing::info_span!(
        "gradcheck.selection",
        year_group = key.year_group,
        program = %key.program,
        semester = %key.semester,
    )
}

/// Emit event: a cascade step does not apply to this selection.
pub fn emit_step_skipped(step: CascadeStep) {
    debug!(event = "cascade.step_skipped", step = %step);
}

/// Emit event: a cascade step fetched `key`.
pub fn emit_step_checked(step: CascadeStep, key: &SemesterKey, has_content: bool) {
    debug!(
        event = "cascade.step",
        step = %step,
        key = %key,
        has_content = has_content,
    );
}

/// Emit event: the cascade settled on a result.
pub fn emit_resolved(resolution: &Resolution) {
    info!(
        event = "cascade.resolved",
        key = %resolution.key,
        source = resolution.source.label(),
        slots = resolution.data.slots.len(),
        rules = resolution.data.rules.len(),
    );
}

/// Emit event: the store failed mid-cascade (warning level).
pub fn emit_cascade_failed(target: &SemesterKey, step: CascadeStep, error: &dyn std::fmt::Display) {
    warn!(event = "cascade.failed", key = %target, step = %step, error = %error);
}

/// Emit event: a resolution finished after the selection moved on.
pub fn emit_stale_discarded(key: &SemesterKey, generation: u64, current: u64) {
    debug!(
        event = "session.stale_discarded",
        key = %key,
        generation = generation,
        current = current,
    );
}

/// Emit event: criteria saved under `key`.
pub fn emit_saved(key: &SemesterKey, digest: &CriteriaDigest) {
    info!(event = "criteria.saved", key = %key, digest = %digest.short());
}

/// Emit event: save failed (warning level).
pub fn emit_save_failed(key: &SemesterKey, error: &dyn std::fmt::Display) {
    warn!(event = "criteria.save_failed", key = %key, error = %error);
}

/// Emit event: audit completed.
pub fn emit_audit_completed(year_group: i32, semester: &str, total: usize, passed: usize) {
    info!(
        event = "audit.completed",
        year_group = year_group,
        semester = %semester,
        total = total,
        passed = passed,
    );
}
