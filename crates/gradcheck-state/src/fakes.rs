//! In-memory fakes for storage traits (testing only)
//!
//! Provides `MemoryCriteriaStore`, `MemoryReferenceStore`, and
//! `MemoryAuditService` that satisfy the trait contracts without any
//! external dependencies. The criteria store keeps a log of every fetched
//! key so tests can assert exactly which lookups happened.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::StorageError;
use crate::schema::*;
use crate::storage_traits::*;

// ---------------------------------------------------------------------------
// MemoryCriteriaStore
// ---------------------------------------------------------------------------

/// In-memory criteria store backed by a `HashMap<SemesterKey, SemesterData>`.
#[derive(Debug, Default)]
pub struct MemoryCriteriaStore {
    criteria: Mutex<HashMap<SemesterKey, SemesterData>>,
    fetch_log: Mutex<Vec<SemesterKey>>,
    save_log: Mutex<Vec<SemesterKey>>,
    failing: Mutex<HashSet<SemesterKey>>,
    save_delay: Mutex<Option<Duration>>,
    saves_in_flight: AtomicUsize,
    max_saves_in_flight: AtomicUsize,
}

impl MemoryCriteriaStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of `seed`.
    pub fn with(self, key: SemesterKey, data: SemesterData) -> Self {
        self.seed(key, data);
        self
    }

    /// Store `data` under `key` without touching the logs.
    pub fn seed(&self, key: SemesterKey, data: SemesterData) {
        self.criteria.lock().unwrap().insert(key, data);
    }

    /// Make every subsequent fetch or save of `key` fail with a transport error.
    pub fn fail_on(&self, key: SemesterKey) {
        self.failing.lock().unwrap().insert(key);
    }

    /// Hold each save for `delay` before committing it.
    pub fn set_save_delay(&self, delay: Duration) {
        *self.save_delay.lock().unwrap() = Some(delay);
    }

    /// Direct read of the stored value, bypassing the fetch log.
    pub fn stored(&self, key: &SemesterKey) -> Option<SemesterData> {
        self.criteria.lock().unwrap().get(key).cloned()
    }

    /// Keys passed to `fetch`, in call order.
    pub fn fetch_log(&self) -> Vec<SemesterKey> {
        self.fetch_log.lock().unwrap().clone()
    }

    pub fn fetch_count(&self) -> usize {
        self.fetch_log.lock().unwrap().len()
    }

    /// Keys passed to `save`, in commit order.
    pub fn save_log(&self) -> Vec<SemesterKey> {
        self.save_log.lock().unwrap().clone()
    }

    /// Highest number of saves that were ever in flight at the same time.
    pub fn max_saves_in_flight(&self) -> usize {
        self.max_saves_in_flight.load(Ordering::SeqCst)
    }

    pub fn clear_logs(&self) {
        self.fetch_log.lock().unwrap().clear();
        self.save_log.lock().unwrap().clear();
    }

    fn check_failing(&self, key: &SemesterKey) -> StorageResult<()> {
        if self.failing.lock().unwrap().contains(key) {
            return Err(StorageError::Injected(format!("store unavailable for {}", key)));
        }
        Ok(())
    }
}

#[async_trait]
impl CriteriaStore for MemoryCriteriaStore {
    async fn fetch(&self, key: &SemesterKey) -> StorageResult<SemesterData> {
        self.fetch_log.lock().unwrap().push(key.clone());
        self.check_failing(key)?;
        let criteria = self.criteria.lock().unwrap();
        Ok(criteria.get(key).cloned().unwrap_or_default())
    }

    async fn save(&self, key: &SemesterKey, data: &SemesterData) -> StorageResult<SaveReceipt> {
        self.check_failing(key)?;

        let now = self.saves_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_saves_in_flight.fetch_max(now, Ordering::SeqCst);

        let delay = *self.save_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        self.criteria
            .lock()
            .unwrap()
            .insert(key.clone(), data.clone());
        self.save_log.lock().unwrap().push(key.clone());
        self.saves_in_flight.fetch_sub(1, Ordering::SeqCst);

        Ok(SaveReceipt::new(key, data))
    }
}

// ---------------------------------------------------------------------------
// MemoryReferenceStore
// ---------------------------------------------------------------------------

/// In-memory reference data backed by a `BTreeMap<year_group, programs>`.
#[derive(Debug, Default)]
pub struct MemoryReferenceStore {
    year_groups: Mutex<BTreeMap<i32, Vec<ProgramMeta>>>,
}

impl MemoryReferenceStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ReferenceStore for MemoryReferenceStore {
    async fn list_year_groups(&self) -> StorageResult<Vec<YearGroupSummary>> {
        let year_groups = self.year_groups.lock().unwrap();
        Ok(year_groups
            .iter()
            .map(|(year_group, programs)| YearGroupSummary {
                year_group: *year_group,
                programs: programs.iter().map(|p| p.display_name.clone()).collect(),
            })
            .collect())
    }

    async fn upsert_year_group(&self, year_group: i32) -> StorageResult<()> {
        self.year_groups
            .lock()
            .unwrap()
            .entry(year_group)
            .or_default();
        Ok(())
    }

    async fn list_programs(&self, year_group: i32) -> StorageResult<Vec<ProgramMeta>> {
        let year_groups = self.year_groups.lock().unwrap();
        Ok(year_groups.get(&year_group).cloned().unwrap_or_default())
    }

    async fn upsert_program(&self, year_group: i32, meta: &ProgramMeta) -> StorageResult<()> {
        let mut year_groups = self.year_groups.lock().unwrap();
        let programs = year_groups.entry(year_group).or_default();
        match programs
            .iter_mut()
            .find(|p| p.display_name == meta.display_name)
        {
            Some(existing) => *existing = meta.clone(),
            None => programs.push(meta.clone()),
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MemoryAuditService
// ---------------------------------------------------------------------------

/// Canned audit engine: every student passes unless a verdict was scripted
/// for their application number.
#[derive(Debug, Default)]
pub struct MemoryAuditService {
    verdicts: Mutex<HashMap<String, Vec<String>>>,
    requests: Mutex<Vec<AuditRequest>>,
}

impl MemoryAuditService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script a failing verdict with the given missing requirements.
    pub fn fail_student(&self, application_no: &str, missing: Vec<String>) {
        self.verdicts
            .lock()
            .unwrap()
            .insert(application_no.to_string(), missing);
    }

    /// Requests received so far.
    pub fn requests(&self) -> Vec<AuditRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl AuditService for MemoryAuditService {
    async fn run_audit(&self, request: &AuditRequest) -> StorageResult<Vec<AuditOutcome>> {
        self.requests.lock().unwrap().push(request.clone());
        let verdicts = self.verdicts.lock().unwrap();
        Ok(request
            .students
            .iter()
            .map(|student| {
                let missing = verdicts
                    .get(&student.application_no)
                    .cloned()
                    .unwrap_or_default();
                AuditOutcome {
                    application_no: student.application_no.clone(),
                    name: student.name.clone(),
                    program: student.program.clone(),
                    passed: missing.is_empty(),
                    missing,
                }
            })
            .collect())
    }
}
