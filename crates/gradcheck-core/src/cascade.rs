//! Cascading-default resolution of semester criteria.
//!
//! When a (year-group, program, semester) key is selected, the resolver
//! decides what to show by trying an ordered list of lookups and keeping the
//! first one with content:
//!
//! 1. the target key itself (already authored, shown as-is);
//! 2. the program the user was viewing just before, same year-group and semester;
//! 3. the previous semester of the same program;
//! 4. the previous year-group's same program and semester.
//!
//! If none has content the result is an empty sheet. Every fallback result
//! is an owned copy of what the store returned and is only ever written back
//! under the target key.

use std::fmt;
use std::sync::Arc;

use gradcheck_state::{CriteriaStore, Semester, SemesterData, SemesterKey};
use serde::{Deserialize, Serialize};
use tracing::Instrument;

use crate::error::ResolveError;
use crate::obs;

/// Default lowest year-group the cascade will fall back to.
pub const DEFAULT_MIN_YEAR_GROUP: i32 = 2025;

/// Resolver configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CascadeConfig {
    /// Year-group fallback never looks below this value
    pub min_year_group: i32,
}

impl Default for CascadeConfig {
    fn default() -> Self {
        CascadeConfig {
            min_year_group: std::env::var("GRADCHECK_MIN_YEAR_GROUP")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_MIN_YEAR_GROUP),
        }
    }
}

impl CascadeConfig {
    /// Create a new config from environment variables
    pub fn from_env() -> Self {
        Self::default()
    }

    pub fn with_min_year_group(min_year_group: i32) -> Self {
        CascadeConfig { min_year_group }
    }
}

/// Everything a cascade step may look at.
#[derive(Debug, Clone, Copy)]
pub struct CascadeContext<'a> {
    pub target: &'a SemesterKey,
    pub previous_program: Option<&'a str>,
    pub min_year_group: i32,
}

/// One lookup in the cascade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CascadeStep {
    Target,
    PreviousProgram,
    PreviousSemester,
    PreviousYearGroup,
}

/// Lookup order: same-key truth, then lateral, then temporal within the
/// program, then temporal across cohorts.
pub const DEFAULT_CASCADE: [CascadeStep; 4] = [
    CascadeStep::Target,
    CascadeStep::PreviousProgram,
    CascadeStep::PreviousSemester,
    CascadeStep::PreviousYearGroup,
];

impl CascadeStep {
    /// The key this step would fetch, or `None` when the step does not apply.
    pub fn lookup_key(self, ctx: &CascadeContext<'_>) -> Option<SemesterKey> {
        let target = ctx.target;
        match self {
            CascadeStep::Target => Some(target.clone()),
            CascadeStep::PreviousProgram => ctx
                .previous_program
                .map(str::trim)
                .filter(|p| !p.is_empty() && *p != target.program)
                .map(|p| target.with_program(p)),
            CascadeStep::PreviousSemester => target
                .semester
                .previous()
                .map(|sem| target.with_semester(sem)),
            CascadeStep::PreviousYearGroup => target
                .year_group
                .checked_sub(1)
                .filter(|yg| *yg >= ctx.min_year_group)
                .map(|yg| target.with_year_group(yg)),
        }
    }

    /// Where data found by this step at `key` came from.
    pub fn source(self, key: &SemesterKey) -> ResolutionSource {
        match self {
            CascadeStep::Target => ResolutionSource::Authored,
            CascadeStep::PreviousProgram => ResolutionSource::PreviousProgram {
                program: key.program.clone(),
                semester: key.semester,
            },
            CascadeStep::PreviousSemester => ResolutionSource::PreviousSemester {
                semester: key.semester,
            },
            CascadeStep::PreviousYearGroup => ResolutionSource::PreviousYearGroup {
                year_group: key.year_group,
                semester: key.semester,
            },
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CascadeStep::Target => "target",
            CascadeStep::PreviousProgram => "previous program",
            CascadeStep::PreviousSemester => "previous semester",
            CascadeStep::PreviousYearGroup => "previous year-group",
        }
    }
}

impl fmt::Display for CascadeStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where resolved data came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResolutionSource {
    /// Saved under the target key itself
    Authored,
    /// Copied from a sibling program
    PreviousProgram { program: String, semester: Semester },
    /// Copied from the preceding semester of the same program
    PreviousSemester { semester: Semester },
    /// Copied from the previous year-group
    PreviousYearGroup { year_group: i32, semester: Semester },
    /// Nothing found anywhere
    Empty,
}

impl ResolutionSource {
    pub fn is_prefill(&self) -> bool {
        !matches!(self, ResolutionSource::Authored | ResolutionSource::Empty)
    }

    /// Advisory text shown alongside data from this source.
    pub fn advisory(&self) -> Option<String> {
        match self {
            ResolutionSource::Authored => None,
            ResolutionSource::PreviousProgram { program, semester } => Some(format!(
                "Prefilled from program \"{}\" ({}). Review and click Save to persist.",
                program, semester
            )),
            ResolutionSource::PreviousSemester { semester } => Some(format!(
                "Prefilled from {}. Review and click Save to persist.",
                semester
            )),
            ResolutionSource::PreviousYearGroup {
                year_group,
                semester,
            } => Some(format!(
                "Prefilled from YearGroup {}, {}. Review and click Save to persist.",
                year_group, semester
            )),
            ResolutionSource::Empty => Some(
                "No criteria yet for this selection. Start adding slots and rules.".to_string(),
            ),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ResolutionSource::Authored => "authored",
            ResolutionSource::PreviousProgram { .. } => "previous_program",
            ResolutionSource::PreviousSemester { .. } => "previous_semester",
            ResolutionSource::PreviousYearGroup { .. } => "previous_year_group",
            ResolutionSource::Empty => "empty",
        }
    }
}

/// Outcome of resolving one target key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resolution {
    /// The key being edited; saves go here and nowhere else
    pub key: SemesterKey,
    pub data: SemesterData,
    pub source: ResolutionSource,
    pub advisory: Option<String>,
}

impl Resolution {
    fn new(key: SemesterKey, data: SemesterData, source: ResolutionSource) -> Self {
        let advisory = source.advisory();
        Resolution {
            key,
            data,
            source,
            advisory,
        }
    }

    /// True when the data was copied from another key and is not saved yet.
    pub fn is_prefill(&self) -> bool {
        self.source.is_prefill()
    }
}

/// Runs the cascade against a criteria store.
#[derive(Clone)]
pub struct CascadeResolver {
    store: Arc<dyn CriteriaStore>,
    config: CascadeConfig,
    steps: Vec<CascadeStep>,
}

impl fmt::Debug for CascadeResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CascadeResolver")
            .field("config", &self.config)
            .field("steps", &self.steps)
            .finish_non_exhaustive()
    }
}

impl CascadeResolver {
    pub fn new(store: Arc<dyn CriteriaStore>, config: CascadeConfig) -> Self {
        Self {
            store,
            config,
            steps: DEFAULT_CASCADE.to_vec(),
        }
    }

    /// Replace the lookup order.
    pub fn with_steps(mut self, steps: Vec<CascadeStep>) -> Self {
        self.steps = steps;
        self
    }

    pub fn store(&self) -> &Arc<dyn CriteriaStore> {
        &self.store
    }

    pub fn config(&self) -> &CascadeConfig {
        &self.config
    }

    pub fn steps(&self) -> &[CascadeStep] {
        &self.steps
    }

    /// Resolve what to display for `target`.
    ///
    /// `previous_program` is the program selected just before the current
    /// one, if the selection change was a program switch.
    pub async fn resolve(
        &self,
        target: &SemesterKey,
        previous_program: Option<&str>,
    ) -> Result<Resolution, ResolveError> {
        let program = target.program.trim();
        if program.is_empty() {
            return Err(ResolveError::MissingProgram);
        }
        let target = target.with_program(program);

        self.run_steps(&target, previous_program)
            .instrument(obs::selection_span(&target))
            .await
    }

    async fn run_steps(
        &self,
        target: &SemesterKey,
        previous_program: Option<&str>,
    ) -> Result<Resolution, ResolveError> {
        let ctx = CascadeContext {
            target,
            previous_program,
            min_year_group: self.config.min_year_group,
        };

        for &step in &self.steps {
            let Some(key) = step.lookup_key(&ctx) else {
                obs::emit_step_skipped(step);
                continue;
            };

            let data = match self.store.fetch(&key).await {
                Ok(data) => data,
                Err(source) => {
                    obs::emit_cascade_failed(target, step, &source);
                    return Err(ResolveError::Store { step, key, source });
                }
            };
            obs::emit_step_checked(step, &key, data.has_content());

            if data.has_content() {
                let resolution = Resolution::new(target.clone(), data, step.source(&key));
                obs::emit_resolved(&resolution);
                return Ok(resolution);
            }
        }

        let resolution = Resolution::new(
            target.clone(),
            SemesterData::default(),
            ResolutionSource::Empty,
        );
        obs::emit_resolved(&resolution);
        Ok(resolution)
    }
}
