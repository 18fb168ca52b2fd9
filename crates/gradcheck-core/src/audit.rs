//! Shaping transcript rows into audit requests, and summarising verdicts.

use gradcheck_state::{
    AuditOutcome, AuditRequest, AuditService, CourseEntry, Semester, StudentRecord, TranscriptRow,
};
use serde::{Deserialize, Serialize};

use crate::error::AuditError;
use crate::obs;

fn trimmed(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Group flat transcript rows by application number.
///
/// Rows without an application number or a course are skipped. Students
/// appear in the order they are first seen; name and program come from the
/// first row that has them.
pub fn group_transcript_rows(rows: &[TranscriptRow]) -> Vec<StudentRecord> {
    let mut students: Vec<StudentRecord> = Vec::new();

    for row in rows {
        let (Some(application_no), Some(course)) = (trimmed(&row.application_no), trimmed(&row.course))
        else {
            continue;
        };

        let index = match students
            .iter()
            .position(|s| s.application_no == application_no)
        {
            Some(i) => i,
            None => {
                students.push(StudentRecord {
                    application_no,
                    name: String::new(),
                    program: String::new(),
                    courses: Vec::new(),
                });
                students.len() - 1
            }
        };
        let student = &mut students[index];

        if student.name.is_empty() {
            student.name = trimmed(&row.name).unwrap_or_default();
        }
        if student.program.is_empty() {
            student.program = trimmed(&row.program).unwrap_or_default();
        }
        student.courses.push(CourseEntry {
            course,
            category: trimmed(&row.category).unwrap_or_default(),
            sub_category: trimmed(&row.sub_category).unwrap_or_default(),
            credits: row.credits.unwrap_or(0.0),
            earned_credits: row.earned_credits.unwrap_or(0.0),
            grade: trimmed(&row.grade).unwrap_or_default(),
        });
    }

    students
}

/// Pass/fail totals over a set of verdicts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditSummary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
}

impl AuditSummary {
    pub fn from_outcomes(outcomes: &[AuditOutcome]) -> Self {
        let passed = outcomes.iter().filter(|o| o.passed).count();
        Self {
            total: outcomes.len(),
            passed,
            failed: outcomes.len() - passed,
        }
    }
}

/// Verdicts for one audit run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditReport {
    pub year_group: i32,
    pub semester: Semester,
    pub outcomes: Vec<AuditOutcome>,
    pub summary: AuditSummary,
}

/// Group `rows` and submit them to the audit engine.
pub async fn run_audit(
    service: &dyn AuditService,
    year_group: i32,
    semester: Semester,
    rows: &[TranscriptRow],
) -> Result<AuditReport, AuditError> {
    let students = group_transcript_rows(rows);
    if students.is_empty() {
        return Err(AuditError::NoStudents);
    }

    let request = AuditRequest {
        year_group,
        semester,
        students,
    };
    let outcomes = service.run_audit(&request).await?;
    let summary = AuditSummary::from_outcomes(&outcomes);
    obs::emit_audit_completed(year_group, semester.as_str(), summary.total, summary.passed);

    Ok(AuditReport {
        year_group,
        semester,
        outcomes,
        summary,
    })
}

/// Render a markdown table of the failing students.
pub fn render_audit_summary_md(report: &AuditReport) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "# Audit {} {}\n\n- students: {}\n- passed: {}\n- failed: {}\n",
        report.year_group,
        report.semester,
        report.summary.total,
        report.summary.passed,
        report.summary.failed
    ));

    let failing: Vec<&AuditOutcome> = report.outcomes.iter().filter(|o| !o.passed).collect();
    if !failing.is_empty() {
        out.push_str("\n| Application No | Name | Program | Missing |\n|---|---|---|---|\n");
        for o in failing {
            out.push_str(&format!(
                "| {} | {} | {} | {} |\n",
                o.application_no,
                o.name,
                o.program,
                o.missing.join(", ")
            ));
        }
    }
    out
}
