//! File-based state persistence implementation.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};

use super::{EndpointRecord, EndpointRecords, EndpointStore, LoadResult, StateError};

/// Current state file format version.
///
/// Increment this when making breaking changes to the format.
const STATE_FILE_VERSION: u32 = 1;

/// On-disk state file format.
///
/// Uses JSON for readability and debugging. Incompatible versions are
/// treated as corrupted (no backward compatibility).
#[derive(Debug, Serialize, Deserialize)]
struct StateFile {
    /// Format version for future compatibility.
    version: u32,

    /// Unix timestamp (seconds) when the state was saved.
    /// For debugging purposes only; not used in logic.
    #[serde(skip_serializing_if = "Option::is_none")]
    saved_at: Option<u64>,

    /// Persisted endpoints keyed by user id.
    endpoints: EndpointRecords,
}

impl StateFile {
    fn new(endpoints: EndpointRecords) -> Self {
        let saved_at = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .ok();

        Self {
            version: STATE_FILE_VERSION,
            saved_at,
            endpoints,
        }
    }
}

/// File-based implementation of [`EndpointStore`].
///
/// Keeps a copy of the persisted set in memory so single-entry saves can
/// rewrite the whole file without reading it back first.
///
/// # Atomic Writes
///
/// Uses write-to-temp-then-rename pattern to prevent corruption:
/// 1. Write to `{path}.tmp`
/// 2. Rename `{path}.tmp` to `{path}`
///
/// Every snapshot taken from the cache gets a generation number. The
/// blocking write holds a lock for its whole duration and drops any
/// snapshot older than the one already on disk, so a write whose caller
/// stopped waiting can neither overlap a later write nor overwrite it.
#[derive(Debug)]
pub struct FileEndpointStore {
    path: PathBuf,
    /// `None` until the file has been read or written once.
    cache: Mutex<Option<EndpointRecords>>,
    /// Generation of the last snapshot taken from the cache.
    generation: AtomicU64,
    /// Generation of the snapshot currently on disk.
    written: Arc<Mutex<u64>>,
}

impl FileEndpointStore {
    /// Creates a new file-based state store at the given path.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            cache: Mutex::new(None),
            generation: AtomicU64::new(0),
            written: Arc::new(Mutex::new(0)),
        }
    }

    /// Returns the path to the state file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_file(path: &Path) -> LoadResult {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == ErrorKind::NotFound => return LoadResult::NotFound,
            Err(e) => {
                return LoadResult::Corrupted {
                    reason: format!("Failed to read file: {e}"),
                };
            }
        };

        match serde_json::from_str::<StateFile>(&content) {
            Ok(state) if state.version == STATE_FILE_VERSION => LoadResult::Loaded(state.endpoints),
            Ok(state) => LoadResult::Corrupted {
                reason: format!(
                    "Incompatible version: expected {STATE_FILE_VERSION}, got {}",
                    state.version
                ),
            },
            Err(e) => LoadResult::Corrupted {
                reason: format!("Invalid JSON: {e}"),
            },
        }
    }

    fn lock_cache(&self) -> MutexGuard<'_, Option<EndpointRecords>> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Applies `update` to the cached set and returns the numbered snapshot
    /// to write.
    fn updated(&self, update: impl FnOnce(&mut EndpointRecords)) -> (u64, EndpointRecords) {
        let mut cache = self.lock_cache();
        let records = cache.get_or_insert_with(|| Self::read_file(&self.path).into_records());
        update(records);
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        (generation, records.clone())
    }

    /// Seeds the cache from disk. Never replaces a cache that saves have
    /// already started from.
    fn seed(&self, records: &EndpointRecords) {
        let mut cache = self.lock_cache();
        if cache.is_none() {
            *cache = Some(records.clone());
        }
    }

    async fn write(&self, generation: u64, records: EndpointRecords) -> Result<(), StateError> {
        let path = self.path.clone();
        let written = Arc::clone(&self.written);
        let state = StateFile::new(records);

        // Use spawn_blocking to avoid blocking the async runtime
        tokio::task::spawn_blocking(move || {
            Self::write_blocking(&path, &written, generation, &state)
        })
        .await
        .map_err(StateError::Task)?
    }

    fn write_blocking(
        path: &Path,
        written: &Mutex<u64>,
        generation: u64,
        state: &StateFile,
    ) -> Result<(), StateError> {
        let mut written = written.lock().unwrap_or_else(PoisonError::into_inner);
        if generation <= *written {
            tracing::debug!(
                "Dropping state snapshot {generation}, snapshot {} is already on disk",
                *written
            );
            return Ok(());
        }

        let content = serde_json::to_string_pretty(state).map_err(StateError::Serialize)?;

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(StateError::Write)?;
            }
        }

        // Append .tmp instead of replacing extension to avoid conflicts
        // (e.g., state.json -> state.json.tmp, not state.tmp)
        let temp_path = PathBuf::from(format!("{}.tmp", path.display()));

        std::fs::write(&temp_path, content).map_err(StateError::Write)?;
        std::fs::rename(&temp_path, path).map_err(StateError::Write)?;

        *written = generation;
        Ok(())
    }
}

impl EndpointStore for FileEndpointStore {
    fn load(&self) -> LoadResult {
        let result = Self::read_file(&self.path);
        if let LoadResult::Loaded(records) = &result {
            self.seed(records);
        }
        result
    }

    async fn load_endpoint(&self, user_id: &str) -> Option<EndpointRecord> {
        if let Some(records) = self.lock_cache().as_ref() {
            return records.get(user_id).cloned();
        }

        let path = self.path.clone();
        let result = match tokio::task::spawn_blocking(move || Self::read_file(&path)).await {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!("State read task failed: {e}");
                return None;
            }
        };

        let LoadResult::Loaded(records) = result else {
            return None;
        };
        self.seed(&records);
        records.get(user_id).cloned()
    }

    async fn save(&self, user_id: &str, record: &EndpointRecord) -> Result<(), StateError> {
        let (generation, records) = self.updated(|records| {
            records.insert(user_id.to_string(), record.clone());
        });
        self.write(generation, records).await
    }

    async fn remove(&self, user_id: &str) -> Result<(), StateError> {
        let (generation, records) = self.updated(|records| {
            records.remove(user_id);
        });
        self.write(generation, records).await
    }

    async fn save_all(&self, records: &EndpointRecords) -> Result<(), StateError> {
        let (generation, records) = self.updated(|cached| cached.clone_from(records));
        self.write(generation, records).await
    }
}
