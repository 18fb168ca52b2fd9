//! Schema definitions for GradCheck criteria and audit payloads
//!
//! Types:
//! - `Semester` / `SemesterKey`: the composite key criteria are stored under
//! - `Slot`, `Rule`, `SemesterData`: one semester's requirement set
//! - `ProgramMeta`, `YearGroupSummary`: reference data
//! - `TranscriptRow`, `StudentRecord`, `AuditOutcome`: audit service contract
//!
//! Field names follow the external API's camelCase JSON.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};
use sha2::{Digest, Sha256};

/// Grade ladder known to the audit service, best first.
///
/// Grades outside this list are kept verbatim; the audit service treats them
/// as failing.
pub const KNOWN_GRADES: [&str; 10] = ["A+", "A", "B+", "B", "C+", "C", "D+", "D", "E", "P"];

/// True when `grade` is on the known ladder (case-insensitive, trimmed).
pub fn is_known_grade(grade: &str) -> bool {
    let grade = grade.trim();
    KNOWN_GRADES.iter().any(|g| g.eq_ignore_ascii_case(grade))
}

/// Minimum passing grade used when neither the slot nor the program sets one.
pub const DEFAULT_PASS_GRADE: &str = "D";

/// Default display priority for required slots.
pub const REQUIRED_PRIORITY: i64 = 0;

/// Default display priority for elective slots.
pub const ELECTIVE_PRIORITY: i64 = 50;

/// Default tag given to new elective slots.
pub const DEFAULT_ELECTIVE_TAG: &str = "Elective";

/// Generate a fresh opaque identifier for a slot or rule.
pub fn new_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

// ---------------------------------------------------------------------------
// Semester keys
// ---------------------------------------------------------------------------

/// One of the eight semesters of a four-year program, in study order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Semester {
    Y1S1,
    Y1S2,
    Y2S1,
    Y2S2,
    Y3S1,
    Y3S2,
    Y4S1,
    Y4S2,
}

static STUDY_ORDER: [Semester; 8] = Semester::ALL;

impl Semester {
    /// All semesters in study order.
    pub const ALL: [Semester; 8] = [
        Semester::Y1S1,
        Semester::Y1S2,
        Semester::Y2S1,
        Semester::Y2S2,
        Semester::Y3S1,
        Semester::Y3S2,
        Semester::Y4S1,
        Semester::Y4S2,
    ];

    fn index(self) -> usize {
        self as usize
    }

    /// The semester immediately before this one, or `None` for `Y1S1`.
    pub fn previous(self) -> Option<Semester> {
        self.index().checked_sub(1).map(|i| Semester::ALL[i])
    }

    /// The semester immediately after this one, or `None` for `Y4S2`.
    pub fn next(self) -> Option<Semester> {
        Semester::ALL.get(self.index() + 1).copied()
    }

    /// Study year (1-4).
    pub fn year(self) -> u8 {
        (self.index() / 2 + 1) as u8
    }

    /// The two semesters of a study year, or an empty slice for years outside 1-4.
    pub fn for_year(year: u8) -> &'static [Semester] {
        match year {
            1..=4 => {
                let start = (year as usize - 1) * 2;
                &STUDY_ORDER[start..start + 2]
            }
            _ => &[],
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Semester::Y1S1 => "Y1S1",
            Semester::Y1S2 => "Y1S2",
            Semester::Y2S1 => "Y2S1",
            Semester::Y2S2 => "Y2S2",
            Semester::Y3S1 => "Y3S1",
            Semester::Y3S2 => "Y3S2",
            Semester::Y4S1 => "Y4S1",
            Semester::Y4S2 => "Y4S2",
        }
    }
}

impl fmt::Display for Semester {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a string is not one of the eight semester codes.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown semester code: {0} (expected Y1S1..Y4S2)")]
pub struct ParseSemesterError(pub String);

impl FromStr for Semester {
    type Err = ParseSemesterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_uppercase();
        Semester::ALL
            .into_iter()
            .find(|sem| sem.as_str() == wanted)
            .ok_or_else(|| ParseSemesterError(s.to_string()))
    }
}

/// Composite key identifying one stored criteria set.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SemesterKey {
    pub year_group: i32,
    pub program: String,
    pub semester: Semester,
}

impl SemesterKey {
    pub fn new(year_group: i32, program: impl Into<String>, semester: Semester) -> Self {
        Self {
            year_group,
            program: program.into(),
            semester,
        }
    }

    /// Same year-group and program, different semester.
    pub fn with_semester(&self, semester: Semester) -> Self {
        Self {
            semester,
            ..self.clone()
        }
    }

    /// Same year-group and semester, different program.
    pub fn with_program(&self, program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..self.clone()
        }
    }

    /// Same program and semester, different year-group.
    pub fn with_year_group(&self, year_group: i32) -> Self {
        Self {
            year_group,
            ..self.clone()
        }
    }
}

impl fmt::Display for SemesterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.year_group, self.program, self.semester)
    }
}

// ---------------------------------------------------------------------------
// Slots and rules
// ---------------------------------------------------------------------------

/// Whether a slot names one course or a set of acceptable courses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SlotKind {
    Required,
    Elective,
}

impl SlotKind {
    /// Priority a new slot of this kind gets when none is given.
    pub fn default_priority(self) -> i64 {
        match self {
            SlotKind::Required => REQUIRED_PRIORITY,
            SlotKind::Elective => ELECTIVE_PRIORITY,
        }
    }
}

/// One graduation requirement unit.
///
/// `kind` decides which field group the audit service reads; fields of the
/// other group are carried along untouched so switching kind back and forth
/// while editing loses nothing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Slot {
    pub id: String,
    #[serde(default)]
    pub title: String,
    pub kind: SlotKind,

    // required
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub course_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_grade: Option<String>,

    // elective
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_courses: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,

    pub priority: i64,
}

impl Slot {
    /// A required slot for a single course.
    pub fn required(course_name: impl Into<String>, min_grade: impl Into<String>) -> Self {
        Self {
            id: new_id(),
            title: String::new(),
            kind: SlotKind::Required,
            course_name: Some(course_name.into()),
            min_grade: Some(min_grade.into()),
            allowed_courses: None,
            tag: None,
            priority: REQUIRED_PRIORITY,
        }
    }

    /// An elective slot satisfied by any one of `allowed_courses`.
    pub fn elective<I, S>(tag: impl Into<String>, allowed_courses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            id: new_id(),
            title: String::new(),
            kind: SlotKind::Elective,
            course_name: None,
            min_grade: None,
            allowed_courses: Some(allowed_courses.into_iter().map(Into::into).collect()),
            tag: Some(tag.into()),
            priority: ELECTIVE_PRIORITY,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }
}

/// Condition half of a rule. Absent lists are vacuously true.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleCondition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub any_passed: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub all_passed: Option<Vec<String>>,
}

/// Effect half of a rule, applied by the audit service when `when` matches.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleEffect {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub add_slots: Option<Vec<Slot>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub waive_slots_by_title: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub waive_courses: Option<Vec<String>>,
}

/// A conditional adjustment to the slot list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub when: RuleCondition,
    #[serde(default)]
    pub then: RuleEffect,
}

impl Rule {
    /// A rule with a fresh id and empty condition and effect.
    pub fn empty() -> Self {
        Self {
            id: new_id(),
            name: String::new(),
            when: RuleCondition::default(),
            then: RuleEffect::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// SemesterData
// ---------------------------------------------------------------------------

/// The unit stored under a `SemesterKey`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SemesterData {
    #[serde(default)]
    pub slots: Vec<Slot>,
    #[serde(default)]
    pub rules: Vec<Rule>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checkpoint_label: Option<String>,
}

impl SemesterData {
    pub fn new() -> Self {
        Self::default()
    }

    /// True when at least one slot or one rule is present.
    pub fn has_content(&self) -> bool {
        !self.slots.is_empty() || !self.rules.is_empty()
    }

    /// SHA-256 over the canonical JSON encoding.
    pub fn digest(&self) -> CriteriaDigest {
        let bytes = serde_json::to_vec(self).unwrap_or_default();
        CriteriaDigest::from_bytes(&bytes)
    }
}

/// Content digest of a `SemesterData` (SHA-256 hex string).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CriteriaDigest(String);

impl CriteriaDigest {
    pub fn from_bytes(data: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(data);
        CriteriaDigest(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short form (first 12 hex chars).
    pub fn short(&self) -> &str {
        &self.0[..12.min(self.0.len())]
    }
}

impl fmt::Display for CriteriaDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Defaults applied to newly created slots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CriteriaDefaults {
    pub pass_grade: String,
    pub required_priority: i64,
    pub elective_priority: i64,
    pub elective_tag: String,
}

impl Default for CriteriaDefaults {
    fn default() -> Self {
        Self {
            pass_grade: std::env::var("GRADCHECK_PASS_GRADE")
                .ok()
                .filter(|g| !g.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_PASS_GRADE.to_string()),
            required_priority: REQUIRED_PRIORITY,
            elective_priority: ELECTIVE_PRIORITY,
            elective_tag: DEFAULT_ELECTIVE_TAG.to_string(),
        }
    }
}

impl CriteriaDefaults {
    /// Create defaults from environment variables
    pub fn from_env() -> Self {
        Self::default()
    }

    /// Apply a program's own pass grade, if it sets one.
    pub fn for_program(&self, meta: &ProgramMeta) -> Self {
        let mut out = self.clone();
        if let Some(grade) = meta.default_pass_grade.as_deref() {
            if !grade.trim().is_empty() {
                out.pass_grade = grade.trim().to_string();
            }
        }
        out
    }
}

// ---------------------------------------------------------------------------
// Reference data
// ---------------------------------------------------------------------------

/// A program offered within a year-group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgramMeta {
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_pass_grade: Option<String>,
}

impl ProgramMeta {
    pub fn new(display_name: impl Into<String>) -> Self {
        Self {
            display_name: display_name.into(),
            default_pass_grade: None,
        }
    }

    pub fn with_pass_grade(mut self, grade: impl Into<String>) -> Self {
        self.default_pass_grade = Some(grade.into());
        self
    }
}

/// A year-group and the programs defined for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct YearGroupSummary {
    pub year_group: i32,
    #[serde(default)]
    pub programs: Vec<String>,
}

// ---------------------------------------------------------------------------
// Audit contract
// ---------------------------------------------------------------------------

/// One flat row of an uploaded transcript sheet.
///
/// Accepts both the API's camelCase names and the sheet's column headers.
/// Cells may hold numbers or text; text that does not parse as a number is
/// treated as missing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptRow {
    #[serde(default, alias = "Application No", deserialize_with = "lenient_string")]
    pub application_no: Option<String>,
    #[serde(default, alias = "Name", deserialize_with = "lenient_string")]
    pub name: Option<String>,
    #[serde(default, alias = "Program", deserialize_with = "lenient_string")]
    pub program: Option<String>,
    #[serde(default, alias = "Course", deserialize_with = "lenient_string")]
    pub course: Option<String>,
    #[serde(default, alias = "Category", deserialize_with = "lenient_string")]
    pub category: Option<String>,
    #[serde(default, alias = "Sub-Category", deserialize_with = "lenient_string")]
    pub sub_category: Option<String>,
    #[serde(default, alias = "Course Credits", deserialize_with = "lenient_number")]
    pub credits: Option<f64>,
    #[serde(
        default,
        alias = "Student Earned Credits",
        deserialize_with = "lenient_number"
    )]
    pub earned_credits: Option<f64>,
    #[serde(default, alias = "Grade", deserialize_with = "lenient_string")]
    pub grade: Option<String>,
}

fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) => Some(s),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        Some(serde_json::Value::Bool(b)) => Some(b.to_string()),
        _ => None,
    })
}

fn lenient_number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::Number(n)) => n.as_f64(),
        Some(serde_json::Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|n| n.is_finite()))
}

/// One course on a student's transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseEntry {
    pub course: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub sub_category: String,
    #[serde(default)]
    pub credits: f64,
    #[serde(default)]
    pub earned_credits: f64,
    #[serde(default)]
    pub grade: String,
}

/// All transcript rows of one student, grouped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentRecord {
    pub application_no: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub program: String,
    #[serde(default)]
    pub courses: Vec<CourseEntry>,
}

/// Request body for the external audit service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditRequest {
    pub year_group: i32,
    pub semester: Semester,
    pub students: Vec<StudentRecord>,
}

/// The audit service's verdict for one student.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditOutcome {
    pub application_no: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub program: String,
    pub passed: bool,
    #[serde(default)]
    pub missing: Vec<String>,
}
