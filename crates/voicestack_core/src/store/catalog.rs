//! Catalog document and transactional persistence.

use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{StoreError, StoreResult};
use crate::lease::{holder_id, FileLeaseStore, LeaseStore, LockOptions, ResourceLock};
use crate::models::{Asset, Embedding, Job, Speaker, Transcript};

const CATALOG_VERSION: u32 = 1;
const CATALOG_LOCK: &str = "catalog";

/// Persistent catalog state (saved to the catalog file).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogState {
    pub version: u32,
    #[serde(default)]
    pub jobs: BTreeMap<Uuid, Job>,
    #[serde(default)]
    pub assets: BTreeMap<Uuid, Asset>,
    #[serde(default)]
    pub transcripts: BTreeMap<Uuid, Transcript>,
    #[serde(default)]
    pub speakers: BTreeMap<Uuid, Speaker>,
    /// Append-only; position breaks creation-time ties.
    #[serde(default)]
    pub embeddings: Vec<Embedding>,
}

impl Default for CatalogState {
    fn default() -> Self {
        Self {
            version: CATALOG_VERSION,
            jobs: BTreeMap::new(),
            assets: BTreeMap::new(),
            transcripts: BTreeMap::new(),
            speakers: BTreeMap::new(),
            embeddings: Vec::new(),
        }
    }
}

impl CatalogState {
    pub fn job(&self, id: Uuid) -> StoreResult<&Job> {
        self.jobs.get(&id).ok_or_else(|| StoreError::not_found("Job", id))
    }

    pub fn job_mut(&mut self, id: Uuid) -> StoreResult<&mut Job> {
        self.jobs.get_mut(&id).ok_or_else(|| StoreError::not_found("Job", id))
    }

    pub fn speaker(&self, id: Uuid) -> StoreResult<&Speaker> {
        self.speakers
            .get(&id)
            .ok_or_else(|| StoreError::not_found("Speaker", id))
    }

    /// Most recent embedding of a speaker (later entries win timestamp ties).
    pub fn latest_embedding(&self, speaker_id: Uuid) -> Option<&Embedding> {
        self.embeddings
            .iter()
            .enumerate()
            .filter(|(_, e)| e.speaker_id == speaker_id)
            .max_by_key(|(index, e)| (e.created_at, *index))
            .map(|(_, e)| e)
    }
}

/// Serializes writers that share the catalog file.
struct CatalogLock {
    lock: ResourceLock,
    holder: String,
}

/// Transactional catalog store.
pub struct Catalog {
    /// Empty for in-memory catalogs.
    path: PathBuf,
    state: Mutex<CatalogState>,
    file_lock: Option<CatalogLock>,
}

impl Catalog {
    /// Open (or create) a file-backed catalog, coordinating writers through
    /// leases in `leases_dir`.
    pub fn open(path: impl Into<PathBuf>, leases_dir: &Path) -> StoreResult<Self> {
        let store: Arc<dyn LeaseStore> = Arc::new(FileLeaseStore::new(leases_dir)?);
        Self::open_with_leases(path, store)
    }

    /// Open a file-backed catalog with an explicit lease store.
    pub fn open_with_leases(
        path: impl Into<PathBuf>,
        leases: Arc<dyn LeaseStore>,
    ) -> StoreResult<Self> {
        let path = path.into();
        let state = load_state(&path)?;
        tracing::info!(
            path = %path.display(),
            jobs = state.jobs.len(),
            speakers = state.speakers.len(),
            "Opened catalog"
        );

        let options = LockOptions {
            acquire_timeout: Duration::from_secs(30),
            lease_duration: Duration::from_secs(30),
            poll_interval: Duration::from_millis(10),
        };
        Ok(Self {
            path,
            state: Mutex::new(state),
            file_lock: Some(CatalogLock {
                lock: ResourceLock::new(leases, CATALOG_LOCK, options),
                holder: holder_id(&format!("catalog-{}", Uuid::new_v4().simple())),
            }),
        })
    }

    /// Create a catalog without persistence (for testing).
    pub fn in_memory() -> Self {
        Self {
            path: PathBuf::new(),
            state: Mutex::new(CatalogState::default()),
            file_lock: None,
        }
    }

    pub fn path(&self) -> Option<&Path> {
        (!self.is_in_memory()).then_some(self.path.as_path())
    }

    fn is_in_memory(&self) -> bool {
        self.path.as_os_str().is_empty()
    }

    /// Run `f` against a fresh view of the catalog.
    pub fn read<R>(&self, f: impl FnOnce(&CatalogState) -> R) -> StoreResult<R> {
        let mut state = self.state.lock();
        if !self.is_in_memory() {
            *state = load_state(&self.path)?;
        }
        Ok(f(&state))
    }

    /// Apply `f` atomically.
    ///
    /// `f` works on a copy of the current document; the copy replaces the
    /// document only if `f` succeeds and the copy is persisted.
    pub fn transaction<R>(
        &self,
        f: impl FnOnce(&mut CatalogState) -> StoreResult<R>,
    ) -> StoreResult<R> {
        self.try_transaction(f)
    }

    /// [`Catalog::transaction`] for callers with their own error type.
    pub fn try_transaction<R, E>(
        &self,
        f: impl FnOnce(&mut CatalogState) -> Result<R, E>,
    ) -> Result<R, E>
    where
        E: From<StoreError>,
    {
        let mut state = self.state.lock();
        let _guard = match self.file_lock {
            Some(ref file_lock) => Some(
                file_lock
                    .lock
                    .acquire(&file_lock.holder)
                    .map_err(StoreError::from)?,
            ),
            None => None,
        };

        let mut draft = if self.is_in_memory() {
            state.clone()
        } else {
            load_state(&self.path)?
        };

        let result = f(&mut draft)?;

        if !self.is_in_memory() {
            save_state(&self.path, &draft)?;
        }
        *state = draft;
        Ok(result)
    }
}

fn load_state(path: &Path) -> StoreResult<CatalogState> {
    match fs::read_to_string(path) {
        Ok(content) => Ok(serde_json::from_str(&content)?),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(CatalogState::default()),
        Err(e) => Err(StoreError::io("read catalog", e)),
    }
}

fn save_state(path: &Path, state: &CatalogState) -> StoreResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| StoreError::io("create catalog dir", e))?;
    }

    let json = serde_json::to_string_pretty(state)?;

    // Write atomically via temp file
    let temp_file = path.with_extension(format!("json.{}.tmp", Uuid::new_v4().simple()));
    fs::write(&temp_file, &json).map_err(|e| StoreError::io("write catalog", e))?;
    fs::rename(&temp_file, path).map_err(|e| StoreError::io("replace catalog", e))?;

    tracing::debug!(
        jobs = state.jobs.len(),
        speakers = state.speakers.len(),
        "Saved catalog"
    );
    Ok(())
}
