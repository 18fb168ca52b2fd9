//! GradCheck - degree-completion criteria CLI
//!
//! The `gradcheck` command authors and inspects semester criteria against
//! the criteria API.
//!
//! ## Commands
//!
//! - `resolve`: show what the editor would display for a selection
//! - `save`: replace the criteria stored under one key from a JSON file
//! - `year-groups`: list or add year-groups
//! - `programs`: list or add programs of a year-group
//! - `audit`: submit a transcript sheet to the audit engine

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use gradcheck_core::{
    render_audit_summary_md, run_audit, AuditReport, CascadeConfig, CascadeResolver, Resolution,
    SaveQueue,
};
use gradcheck_state::{
    is_known_grade, normalize_semester_data, AuditService, ClientConfig, CriteriaStore,
    HttpClient, ProgramMeta, ReferenceStore, SaveReceipt, Semester, SemesterKey, TranscriptRow,
    DEFAULT_API_BASE,
};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn, Level};

#[derive(Parser)]
#[command(name = "gradcheck")]
#[command(author = "GradCheck Maintainers")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Degree-completion criteria authoring", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Criteria API base URL
    #[arg(long, global = true, env = "GRADCHECK_API_BASE", default_value = DEFAULT_API_BASE)]
    api_base: String,

    /// Bearer token for the criteria API
    #[arg(long, global = true, env = "GRADCHECK_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Lowest year-group the cascade falls back to
    #[arg(long, global = true, env = "GRADCHECK_MIN_YEAR_GROUP", default_value_t = gradcheck_core::DEFAULT_MIN_YEAR_GROUP)]
    min_year_group: i32,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve the criteria shown for a selection (nothing is saved)
    Resolve {
        #[arg(long)]
        year_group: i32,

        #[arg(long)]
        program: String,

        /// Semester code, Y1S1..Y4S2
        #[arg(long)]
        semester: Semester,

        /// Program selected just before, used as the lateral fallback
        #[arg(long)]
        from_program: Option<String>,
    },

    /// Replace the criteria stored under one key
    Save {
        #[arg(long)]
        year_group: i32,

        #[arg(long)]
        program: String,

        #[arg(long)]
        semester: Semester,

        /// JSON file with `slots` and `rules`
        #[arg(short, long)]
        file: PathBuf,

        /// Allow saving a file with no slots and no rules
        #[arg(long)]
        allow_empty: bool,
    },

    /// Manage year-groups
    YearGroups {
        #[command(subcommand)]
        action: YearGroupAction,
    },

    /// Manage programs of a year-group
    Programs {
        #[command(subcommand)]
        action: ProgramAction,
    },

    /// Run the audit engine over a transcript sheet
    Audit {
        #[arg(long)]
        year_group: i32,

        #[arg(long)]
        semester: Semester,

        /// JSON file holding an array of transcript rows
        #[arg(long)]
        rows: PathBuf,

        /// Print a markdown summary instead of JSON
        #[arg(long)]
        markdown: bool,
    },
}

#[derive(Subcommand)]
enum YearGroupAction {
    /// List year-groups and their programs
    List,
    /// Add a year-group (no-op if it exists)
    Add { year_group: i32 },
}

#[derive(Subcommand)]
enum ProgramAction {
    /// List programs of a year-group
    List { year_group: i32 },
    /// Add or update a program
    Add {
        year_group: i32,
        name: String,
        /// Default minimum pass grade for new slots
        #[arg(long)]
        pass_grade: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    gradcheck_core::init_tracing(cli.json, level);

    let mut config = ClientConfig::from_env();
    config.base_url = cli.api_base.clone();
    config.token = cli.token.clone().filter(|t| !t.is_empty());
    let client =
        Arc::new(HttpClient::new(config).context("Failed to configure criteria API client")?);

    match cli.command {
        Commands::Resolve {
            year_group,
            program,
            semester,
            from_program,
        } => {
            let key = SemesterKey::new(year_group, program, semester);
            let resolver = CascadeResolver::new(
                client,
                CascadeConfig::with_min_year_group(cli.min_year_group),
            );
            cmd_resolve(&resolver, &key, from_program.as_deref())
                .await
                .map(|_| ())
        }
        Commands::Save {
            year_group,
            program,
            semester,
            file,
            allow_empty,
        } => {
            let key = SemesterKey::new(year_group, program, semester);
            cmd_save(client.as_ref(), &key, &file, allow_empty)
                .await
                .map(|_| ())
        }
        Commands::YearGroups { action } => match action {
            YearGroupAction::List => cmd_year_groups_list(client.as_ref()).await,
            YearGroupAction::Add { year_group } => {
                cmd_year_groups_add(client.as_ref(), year_group).await
            }
        },
        Commands::Programs { action } => match action {
            ProgramAction::List { year_group } => {
                cmd_programs_list(client.as_ref(), year_group).await
            }
            ProgramAction::Add {
                year_group,
                name,
                pass_grade,
            } => cmd_programs_add(client.as_ref(), year_group, &name, pass_grade.as_deref()).await,
        },
        Commands::Audit {
            year_group,
            semester,
            rows,
            markdown,
        } => cmd_audit(client.as_ref(), year_group, semester, &rows, markdown)
            .await
            .map(|_| ()),
    }
}

/// Resolve a selection and print its data; the advisory goes to stderr.
async fn cmd_resolve(
    resolver: &CascadeResolver,
    key: &SemesterKey,
    from_program: Option<&str>,
) -> Result<Resolution> {
    let resolution = resolver
        .resolve(key, from_program)
        .await
        .map_err(|e| {
            let advisory = e.advisory();
            anyhow::Error::new(e).context(advisory)
        })
        .with_context(|| format!("Failed to resolve {}", key))?;

    if let Some(advisory) = &resolution.advisory {
        eprintln!("{}", advisory);
    }
    println!("{}", serde_json::to_string_pretty(&resolution.data)?);
    Ok(resolution)
}

/// Normalize a criteria file and store it under `key`.
async fn cmd_save(
    store: &dyn CriteriaStore,
    key: &SemesterKey,
    file: &Path,
    allow_empty: bool,
) -> Result<SaveReceipt> {
    let raw: Value = read_json_file(file)?;
    let data = normalize_semester_data(&raw);
    if !data.has_content() && !allow_empty {
        bail!(
            "{:?} has no slots or rules; pass --allow-empty to clear {}",
            file,
            key
        );
    }

    info!(key = %key, slots = data.slots.len(), rules = data.rules.len(), "saving criteria");
    let receipt = SaveQueue::new()
        .save(store, key, &data)
        .await
        .with_context(|| format!("Failed to save {}", key))?;

    println!("Saved {} ({} slots, {} rules)", key, data.slots.len(), data.rules.len());
    println!("Digest: {}", receipt.digest.short());
    Ok(receipt)
}

async fn cmd_year_groups_list(store: &dyn ReferenceStore) -> Result<()> {
    let groups = store
        .list_year_groups()
        .await
        .context("Failed to list year-groups")?;

    if groups.is_empty() {
        println!("No year-groups yet.");
        return Ok(());
    }
    for group in groups {
        if group.programs.is_empty() {
            println!("{}", group.year_group);
        } else {
            println!("{}: {}", group.year_group, group.programs.join(", "));
        }
    }
    Ok(())
}

async fn cmd_year_groups_add(store: &dyn ReferenceStore, year_group: i32) -> Result<()> {
    store
        .upsert_year_group(year_group)
        .await
        .with_context(|| format!("Failed to add year-group {}", year_group))?;
    println!("Year-group {} ready", year_group);
    Ok(())
}

async fn cmd_programs_list(store: &dyn ReferenceStore, year_group: i32) -> Result<()> {
    let programs = store
        .list_programs(year_group)
        .await
        .with_context(|| format!("Failed to list programs for {}", year_group))?;

    if programs.is_empty() {
        println!("No programs for year-group {}.", year_group);
        return Ok(());
    }
    for program in programs {
        match program.default_pass_grade {
            Some(grade) => println!("{}  (pass grade {})", program.display_name, grade),
            None => println!("{}", program.display_name),
        }
    }
    Ok(())
}

async fn cmd_programs_add(
    store: &dyn ReferenceStore,
    year_group: i32,
    name: &str,
    pass_grade: Option<&str>,
) -> Result<()> {
    let name = name.trim();
    if name.is_empty() {
        bail!("Program name must not be empty");
    }
    let mut meta = ProgramMeta::new(name);
    if let Some(grade) = pass_grade.map(str::trim).filter(|g| !g.is_empty()) {
        if !is_known_grade(grade) {
            warn!(grade = %grade, "pass grade is not on the known grade ladder");
        }
        meta = meta.with_pass_grade(grade);
    }

    store
        .upsert_program(year_group, &meta)
        .await
        .with_context(|| format!("Failed to add program {} to {}", name, year_group))?;
    println!("Program {} ready in year-group {}", name, year_group);
    Ok(())
}

/// Group a transcript sheet by student and submit it for auditing.
async fn cmd_audit(
    service: &dyn AuditService,
    year_group: i32,
    semester: Semester,
    rows_file: &Path,
    markdown: bool,
) -> Result<AuditReport> {
    let rows: Vec<TranscriptRow> = read_json_file(rows_file)?;
    let report = run_audit(service, year_group, semester, &rows)
        .await
        .with_context(|| format!("Audit of {:?} failed", rows_file))?;

    if markdown {
        println!("{}", render_audit_summary_md(&report));
    } else {
        println!("{}", serde_json::to_string_pretty(&report)?);
    }
    Ok(report)
}

fn read_json_file<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read JSON file: {:?}", path))?;
    serde_json::from_str(&content).with_context(|| format!("Invalid JSON in {:?}", path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use gradcheck_state::fakes::{MemoryAuditService, MemoryCriteriaStore, MemoryReferenceStore};
    use gradcheck_state::{SemesterData, Slot};
    use serde_json::json;

    fn write_json(dir: &tempfile::TempDir, name: &str, value: &Value) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, serde_json::to_string(value).unwrap()).unwrap();
        path
    }

    #[test]
    fn test_cli_parses_semester_case_insensitively() {
        let cli = Cli::try_parse_from([
            "gradcheck",
            "resolve",
            "--year-group",
            "2026",
            "--program",
            "CS",
            "--semester",
            "y2s1",
            "--from-program",
            "EE",
        ])
        .unwrap();
        match cli.command {
            Commands::Resolve {
                semester,
                from_program,
                ..
            } => {
                assert_eq!(semester, Semester::Y2S1);
                assert_eq!(from_program.as_deref(), Some("EE"));
            }
            _ => panic!("expected resolve"),
        }
    }

    #[test]
    fn test_cli_rejects_unknown_semester() {
        let result = Cli::try_parse_from([
            "gradcheck",
            "resolve",
            "--year-group",
            "2026",
            "--program",
            "CS",
            "--semester",
            "Y5S1",
        ]);
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_save_normalizes_file_before_storing() {
        let dir = tempfile::tempdir().unwrap();
        let file = write_json(
            &dir,
            "criteria.json",
            &json!({
                "slots": [
                    {"title": "Calculus", "courseName": "MA101"},
                    {"allowedCourses": ["CS301", "CS302"], "tag": "Major Elective"},
                    "garbage"
                ],
                "rules": [{"name": "waive"}]
            }),
        );
        let store = MemoryCriteriaStore::new();
        let key = SemesterKey::new(2026, "CS", Semester::Y3S1);

        let receipt = cmd_save(&store, &key, &file, false).await.unwrap();
        assert_eq!(receipt.key, key);

        let stored = store.stored(&key).unwrap();
        assert_eq!(stored.slots.len(), 2);
        assert_eq!(stored.rules.len(), 1);
        assert!(stored.slots.iter().all(|s| !s.id.is_empty()));
        assert_eq!(receipt.digest, stored.digest());
    }

    #[tokio::test]
    async fn test_save_refuses_empty_file_without_flag() {
        let dir = tempfile::tempdir().unwrap();
        let file = write_json(&dir, "empty.json", &json!({}));
        let key = SemesterKey::new(2026, "CS", Semester::Y1S1);
        let mut existing = SemesterData::new();
        existing.slots.push(Slot::required("CS101", "D"));
        let store = MemoryCriteriaStore::new().with(key.clone(), existing);

        let err = cmd_save(&store, &key, &file, false).await.unwrap_err();
        assert!(format!("{err:#}").contains("--allow-empty"));
        assert_eq!(store.stored(&key).unwrap().slots.len(), 1);

        cmd_save(&store, &key, &file, true).await.unwrap();
        assert!(!store.stored(&key).unwrap().has_content());
    }

    #[tokio::test]
    async fn test_save_rejects_invalid_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{not json").unwrap();
        let store = MemoryCriteriaStore::new();

        let err = cmd_save(&store, &SemesterKey::new(2026, "CS", Semester::Y1S1), &path, true)
            .await
            .unwrap_err();
        assert!(format!("{err:#}").contains("Invalid JSON"));
        assert!(store.save_log().is_empty());
    }

    #[tokio::test]
    async fn test_resolve_prefills_without_saving() {
        let mut data = SemesterData::new();
        data.slots.push(Slot::required("EE201", "C"));
        let store = Arc::new(
            MemoryCriteriaStore::new().with(SemesterKey::new(2026, "EE", Semester::Y2S1), data),
        );
        let dyn_store: Arc<dyn CriteriaStore> = store.clone();
        let resolver = CascadeResolver::new(dyn_store, CascadeConfig::with_min_year_group(2025));

        let key = SemesterKey::new(2026, "CS", Semester::Y2S1);
        let resolution = cmd_resolve(&resolver, &key, Some("EE")).await.unwrap();
        assert!(resolution.is_prefill());
        assert_eq!(resolution.data.slots.len(), 1);
        assert!(store.save_log().is_empty());
    }

    #[tokio::test]
    async fn test_resolve_reports_missing_program() {
        let store: Arc<dyn CriteriaStore> = Arc::new(MemoryCriteriaStore::new());
        let resolver = CascadeResolver::new(store, CascadeConfig::with_min_year_group(2025));
        let err = cmd_resolve(&resolver, &SemesterKey::new(2026, "", Semester::Y1S1), None)
            .await
            .unwrap_err();
        assert!(format!("{err:#}").contains("Select a Program"));
    }

    #[tokio::test]
    async fn test_programs_add_and_list() {
        let store = MemoryReferenceStore::new();
        cmd_year_groups_add(&store, 2026).await.unwrap();
        cmd_programs_add(&store, 2026, " CS ", Some("C")).await.unwrap();
        cmd_programs_add(&store, 2026, "CS", Some("B")).await.unwrap();

        let programs = store.list_programs(2026).await.unwrap();
        assert_eq!(programs, vec![ProgramMeta::new("CS").with_pass_grade("B")]);
        cmd_programs_list(&store, 2026).await.unwrap();
        cmd_year_groups_list(&store).await.unwrap();

        assert!(cmd_programs_add(&store, 2026, "  ", None).await.is_err());
    }

    #[tokio::test]
    async fn test_programs_add_keeps_off_ladder_grade_and_ignores_blank() {
        let store = MemoryReferenceStore::new();
        cmd_year_groups_add(&store, 2026).await.unwrap();
        cmd_programs_add(&store, 2026, "EE", Some(" Z ")).await.unwrap();
        cmd_programs_add(&store, 2026, "ME", Some("  ")).await.unwrap();

        let programs = store.list_programs(2026).await.unwrap();
        assert!(programs.contains(&ProgramMeta::new("EE").with_pass_grade("Z")));
        assert!(programs.contains(&ProgramMeta::new("ME")));
    }

    #[tokio::test]
    async fn test_audit_reads_sheet_rows() {
        let dir = tempfile::tempdir().unwrap();
        let rows = write_json(
            &dir,
            "rows.json",
            &json!([
                {"Application No": "A1", "Name": "Esi", "Course": "CS101", "Grade": "B"},
                {"Application No": "A1", "Course": "CS102", "Grade": "F"},
                {"Application No": "A2", "Course": "CS101", "Grade": "A"},
                {"Name": "no application number", "Course": "CS101"}
            ]),
        );
        let service = MemoryAuditService::new();
        service.fail_student("A1", vec!["CS102".to_string()]);

        let report = cmd_audit(&service, 2026, Semester::Y1S1, &rows, true)
            .await
            .unwrap();
        assert_eq!(report.summary.total, 2);
        assert_eq!(report.summary.failed, 1);
        assert_eq!(service.requests()[0].students[0].courses.len(), 2);
    }
}
