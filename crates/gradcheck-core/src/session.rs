//! Editing session: selection, in-flight resolutions and saves.
//!
//! Every selection change bumps a generation counter and hands back a
//! [`ResolveTicket`]. Running a ticket yields a [`PendingResolution`] that
//! the session only applies if no newer selection happened in the meantime,
//! so a slow lookup can never overwrite the sheet for a newer selection.
//!
//! Saves go through a [`SaveQueue`], which serializes saves per key in
//! arrival order. The queue is cheap to clone and may be shared by several
//! sessions talking to the same store.

use std::collections::HashMap;
use std::sync::Arc;

use gradcheck_state::{
    CriteriaDefaults, CriteriaStore, SaveReceipt, Semester, SemesterData, SemesterKey,
    StorageResult,
};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::cascade::{CascadeResolver, Resolution, ResolutionSource};
use crate::edit_buffer::EditBuffer;
use crate::error::{ResolveError, Result, SessionError};
use crate::obs;

/// Advisory shown after a successful save.
pub const SAVED_ADVISORY: &str = "Saved.";

// ---------------------------------------------------------------------------
// Selection & tickets
// ---------------------------------------------------------------------------

/// The (year-group, program, semester) tuple the user is looking at.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Selection {
    pub year_group: i32,
    pub program: String,
    pub semester: Semester,
}

impl Selection {
    pub fn new(year_group: i32, program: impl Into<String>, semester: Semester) -> Self {
        Self {
            year_group,
            program: program.into(),
            semester,
        }
    }

    pub fn key(&self) -> SemesterKey {
        SemesterKey::new(self.year_group, self.program.clone(), self.semester)
    }
}

/// A resolution request issued for one selection generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolveTicket {
    selection: Selection,
    previous_program: Option<String>,
    generation: u64,
}

impl ResolveTicket {
    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn previous_program(&self) -> Option<&str> {
        self.previous_program.as_deref()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Run the cascade for this ticket. Does not touch any session.
    pub async fn resolve(self, resolver: &CascadeResolver) -> PendingResolution {
        let result = resolver
            .resolve(&self.selection.key(), self.previous_program.as_deref())
            .await;
        PendingResolution {
            ticket: self,
            result,
        }
    }
}

/// A finished cascade waiting to be applied to its session.
#[derive(Debug)]
pub struct PendingResolution {
    ticket: ResolveTicket,
    result: std::result::Result<Resolution, ResolveError>,
}

impl PendingResolution {
    pub fn ticket(&self) -> &ResolveTicket {
        &self.ticket
    }

    pub fn result(&self) -> &std::result::Result<Resolution, ResolveError> {
        &self.result
    }
}

/// What `CriteriaSession::apply` did with a pending resolution.
#[derive(Debug, Clone, PartialEq)]
pub enum Applied {
    /// The resolution became the session's buffer.
    Current(Resolution),
    /// The selection changed since the ticket was issued; nothing changed.
    Stale,
}

impl Applied {
    pub fn is_stale(&self) -> bool {
        matches!(self, Applied::Stale)
    }
}

// ---------------------------------------------------------------------------
// SaveQueue
// ---------------------------------------------------------------------------

/// Per-key FIFO serialization of saves.
///
/// A second save for a key waits until the first has completed. Saves for
/// different keys proceed independently. A key's entry is dropped once no
/// save for it is running or queued.
#[derive(Debug, Clone, Default)]
pub struct SaveQueue {
    locks: Arc<Mutex<HashMap<SemesterKey, Arc<Mutex<()>>>>>,
}

impl SaveQueue {
    pub fn new() -> Self {
        Self::default()
    }

    async fn lock_for(&self, key: &SemesterKey) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks.entry(key.clone()).or_default().clone()
    }

    /// Drop the entry for `key` unless another save holds a handle to it.
    /// Handles are only cloned under the map lock, so the count is exact here.
    async fn release(&self, key: &SemesterKey, lock: Arc<Mutex<()>>) {
        let mut locks = self.locks.lock().await;
        // the map's handle plus ours
        if Arc::strong_count(&lock) == 2 {
            locks.remove(key);
        }
    }

    /// Number of keys with a save running or queued.
    pub async fn active_keys(&self) -> usize {
        self.locks.lock().await.len()
    }

    /// Save `data` under `key` once every earlier save for `key` is done.
    pub async fn save(
        &self,
        store: &dyn CriteriaStore,
        key: &SemesterKey,
        data: &SemesterData,
    ) -> StorageResult<SaveReceipt> {
        let lock = self.lock_for(key).await;
        let result = {
            let _turn = lock.lock().await;
            store.save(key, data).await
        };
        self.release(key, lock).await;

        match result {
            Ok(receipt) => {
                obs::emit_saved(key, &receipt.digest);
                Ok(receipt)
            }
            Err(e) => {
                obs::emit_save_failed(key, &e);
                Err(e)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// CriteriaSession
// ---------------------------------------------------------------------------

/// One user's view of the criteria editor.
#[derive(Debug)]
pub struct CriteriaSession {
    resolver: CascadeResolver,
    saves: SaveQueue,
    defaults: CriteriaDefaults,
    selection: Selection,
    generation: u64,
    loaded: Option<Loaded>,
    advisory: Option<String>,
}

#[derive(Debug, Clone)]
struct Loaded {
    key: SemesterKey,
    source: ResolutionSource,
    buffer: EditBuffer,
}

impl CriteriaSession {
    pub fn new(resolver: CascadeResolver, defaults: CriteriaDefaults, selection: Selection) -> Self {
        Self {
            resolver,
            saves: SaveQueue::new(),
            defaults,
            selection,
            generation: 0,
            loaded: None,
            advisory: None,
        }
    }

    /// Share a save queue with other sessions on the same store.
    pub fn with_save_queue(mut self, saves: SaveQueue) -> Self {
        self.saves = saves;
        self
    }

    pub fn resolver(&self) -> &CascadeResolver {
        &self.resolver
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn advisory(&self) -> Option<&str> {
        self.advisory.as_deref()
    }

    /// The buffer under edit; `None` before the first load or after a
    /// failed one.
    pub fn buffer(&self) -> Option<&EditBuffer> {
        self.loaded.as_ref().map(|l| &l.buffer)
    }

    /// Key the current buffer will be saved under.
    pub fn loaded_key(&self) -> Option<&SemesterKey> {
        self.loaded.as_ref().map(|l| &l.key)
    }

    pub fn source(&self) -> Option<&ResolutionSource> {
        self.loaded.as_ref().map(|l| &l.source)
    }

    fn issue(&mut self, previous_program: Option<String>) -> ResolveTicket {
        self.generation += 1;
        ResolveTicket {
            selection: self.selection.clone(),
            previous_program,
            generation: self.generation,
        }
    }

    /// Ticket for the current selection, with no previous-program hint.
    pub fn initial_ticket(&mut self) -> ResolveTicket {
        self.issue(None)
    }

    /// Re-resolve the current selection, discarding unsaved edits once applied.
    pub fn refresh(&mut self) -> ResolveTicket {
        self.issue(None)
    }

    pub fn select_year_group(&mut self, year_group: i32) -> ResolveTicket {
        self.selection.year_group = year_group;
        self.issue(None)
    }

    pub fn select_semester(&mut self, semester: Semester) -> ResolveTicket {
        self.selection.semester = semester;
        self.issue(None)
    }

    /// Switch program; the program being left becomes the lateral hint.
    pub fn select_program(&mut self, program: impl Into<String>) -> ResolveTicket {
        let previous = std::mem::replace(&mut self.selection.program, program.into());
        let hint = Some(previous).filter(|p| !p.trim().is_empty());
        self.issue(hint)
    }

    /// Apply a finished resolution if its ticket is still current.
    ///
    /// A current failure clears the buffer so nothing stale can be saved
    /// over the stored value.
    pub fn apply(&mut self, pending: PendingResolution) -> Result<Applied> {
        let PendingResolution { ticket, result } = pending;
        if ticket.generation != self.generation {
            obs::emit_stale_discarded(&ticket.selection.key(), ticket.generation, self.generation);
            return Ok(Applied::Stale);
        }

        match result {
            Ok(resolution) => {
                self.advisory = resolution.advisory.clone();
                self.loaded = Some(Loaded {
                    key: resolution.key.clone(),
                    source: resolution.source.clone(),
                    buffer: EditBuffer::from_resolution(&resolution, self.defaults.clone()),
                });
                Ok(Applied::Current(resolution))
            }
            Err(e) => {
                self.advisory = Some(e.advisory());
                self.loaded = None;
                Err(SessionError::Load(e))
            }
        }
    }

    /// Resolve `ticket` and apply the result in one step.
    pub async fn load(&mut self, ticket: ResolveTicket) -> Result<Applied> {
        let pending = ticket.resolve(&self.resolver).await;
        self.apply(pending)
    }

    /// Apply `f` to the buffer. Returns `false` when nothing is loaded.
    pub fn edit<F>(&mut self, f: F) -> bool
    where
        F: FnOnce(&EditBuffer) -> EditBuffer,
    {
        match self.loaded.as_mut() {
            Some(loaded) => {
                loaded.buffer = f(&loaded.buffer);
                true
            }
            None => false,
        }
    }

    /// Persist the buffer under the key it was loaded for.
    ///
    /// On failure the buffer is kept unchanged.
    pub async fn save(&mut self) -> Result<SaveReceipt> {
        let Some(loaded) = self.loaded.as_ref() else {
            return Err(SessionError::NothingLoaded(self.selection.key()));
        };
        let key = loaded.key.clone();
        let data = loaded.buffer.data().clone();

        let store = self.resolver.store().clone();
        match self.saves.save(store.as_ref(), &key, &data).await {
            Ok(receipt) => {
                if let Some(loaded) = self.loaded.as_mut() {
                    loaded.buffer = loaded.buffer.mark_saved(&receipt.digest);
                    loaded.source = ResolutionSource::Authored;
                }
                self.advisory = Some(SAVED_ADVISORY.to_string());
                Ok(receipt)
            }
            Err(source) => {
                self.advisory = Some(format!("Save failed: {}", source));
                Err(SessionError::Save { key, source })
            }
        }
    }
}
