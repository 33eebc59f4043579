//! Persisted pipeline state (offline, single JSON file).
//!
//! The [`StateStore`] keeps per-file status, the content-block hashes of the
//! last corpus, output checksums, and the last run record.
//!
//! **Access rules:**
//! - Pipeline: read-write via [`StateStore::open`]; every write is one
//!   read-modify-write critical section under an in-process mutex plus an
//!   exclusive advisory lock on `<state>.lock`.
//! - `status` command: read-only via [`StateStore::open_readonly`].
//!
//! The file is an envelope `{ "checksum": .., "payload": .. }`. The checksum
//! is the SHA-256 of the serialized payload and is recomputed on every write,
//! so a torn or hand-edited file is detected on the next load and replaced by
//! fresh state (with a warning) instead of being trusted.

use std::collections::{BTreeMap, BTreeSet};
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use notefold_shared::{
    IssueKind, NotefoldError, Processed, Report, Result, RetryConfig, sha256_hex, write_atomic,
};

/// Current on-disk schema version.
pub const STATE_VERSION: u32 = 1;

// ---------------------------------------------------------------------------
// State model
// ---------------------------------------------------------------------------

/// Consolidation outcome of one source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileStatus {
    Consolidated,
    Failed,
}

/// Per-file record, keyed by the file's path relative to the input root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    pub status: FileStatus,
    /// SHA-256 of the raw source bytes (empty when unreadable).
    pub source_hash: String,
    pub errors: usize,
    pub warnings: usize,
    pub updated_at: DateTime<Utc>,
}

/// Summary of the most recent pipeline run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub documents: usize,
    pub failed: usize,
    pub errors: usize,
    pub warnings: usize,
    /// Corpus blocks whose hash was not present in the previous run.
    pub new_blocks: usize,
    pub cancelled: bool,
}

/// Everything persisted between runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineState {
    pub version: u32,
    #[serde(default)]
    pub files: BTreeMap<String, FileRecord>,
    /// Normalized content hashes of the last corpus.
    #[serde(default)]
    pub content_hashes: BTreeSet<String>,
    /// Output file name → SHA-256.
    #[serde(default)]
    pub outputs: BTreeMap<String, String>,
    #[serde(default)]
    pub last_run: Option<RunRecord>,
}

impl Default for PipelineState {
    fn default() -> Self {
        Self {
            version: STATE_VERSION,
            files: BTreeMap::new(),
            content_hashes: BTreeSet::new(),
            outputs: BTreeMap::new(),
            last_run: None,
        }
    }
}

impl PipelineState {
    /// Replace the stored content hashes, returning how many of `hashes`
    /// were not present before.
    pub fn replace_content_hashes(&mut self, hashes: BTreeSet<String>) -> usize {
        let new = hashes.difference(&self.content_hashes).count();
        self.content_hashes = hashes;
        new
    }

    pub fn record_output(&mut self, name: impl Into<String>, sha256: impl Into<String>) {
        self.outputs.insert(name.into(), sha256.into());
    }

    pub fn failed_files(&self) -> impl Iterator<Item = (&String, &FileRecord)> {
        self.files
            .iter()
            .filter(|(_, record)| record.status == FileStatus::Failed)
    }
}

#[derive(Serialize, Deserialize)]
struct Envelope {
    checksum: String,
    payload: serde_json::Value,
}

enum Loaded {
    Missing,
    Valid(PipelineState),
    Corrupt(NotefoldError),
}

fn payload_checksum(payload: &serde_json::Value) -> Result<String> {
    let canonical = serde_json::to_string(payload)
        .map_err(|e| NotefoldError::Storage(format!("serialize state: {e}")))?;
    Ok(sha256_hex(canonical.as_bytes()))
}

fn integrity_error(path: &Path, expected: impl Into<String>, actual: impl Into<String>) -> NotefoldError {
    NotefoldError::StateIntegrity {
        path: path.to_path_buf(),
        expected: expected.into(),
        actual: actual.into(),
    }
}

fn load(path: &Path) -> Result<Loaded> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Loaded::Missing),
        Err(e) => return Err(NotefoldError::io(path, e)),
    };

    let envelope: Envelope = match serde_json::from_str(&content) {
        Ok(envelope) => envelope,
        Err(e) => {
            return Ok(Loaded::Corrupt(integrity_error(
                path,
                "checksummed state envelope",
                format!("unparseable file ({e})"),
            )));
        }
    };

    let actual = payload_checksum(&envelope.payload)?;
    if actual != envelope.checksum {
        return Ok(Loaded::Corrupt(integrity_error(path, envelope.checksum, actual)));
    }

    let state: PipelineState = match serde_json::from_value(envelope.payload) {
        Ok(state) => state,
        Err(e) => {
            return Ok(Loaded::Corrupt(integrity_error(
                path,
                format!("state schema v{STATE_VERSION}"),
                e.to_string(),
            )));
        }
    };

    if state.version > STATE_VERSION {
        return Ok(Loaded::Corrupt(integrity_error(
            path,
            format!("state schema v{STATE_VERSION}"),
            format!("v{}", state.version),
        )));
    }

    Ok(Loaded::Valid(state))
}

fn persist(path: &Path, state: &PipelineState, retry: &RetryConfig) -> Result<()> {
    let payload = serde_json::to_value(state)
        .map_err(|e| NotefoldError::Storage(format!("serialize state: {e}")))?;
    let envelope = Envelope {
        checksum: payload_checksum(&payload)?,
        payload,
    };
    let json = serde_json::to_string_pretty(&envelope)
        .map_err(|e| NotefoldError::Storage(format!("serialize state: {e}")))?;
    write_atomic(path, json.as_bytes(), retry)?;
    Ok(())
}

// ---------------------------------------------------------------------------
// StateStore
// ---------------------------------------------------------------------------

/// Handle to the persisted pipeline state.
pub struct StateStore {
    path: PathBuf,
    lock_path: PathBuf,
    retry: RetryConfig,
    state: Mutex<PipelineState>,
    readonly: bool,
}

impl StateStore {
    /// Open or create the state file at `path` in read-write mode.
    ///
    /// A file that fails its integrity check is moved aside to
    /// `<state>.corrupt` and replaced by fresh state; the returned report
    /// carries a [`IssueKind::StateIntegrity`] warning.
    pub fn open(path: &Path, retry: RetryConfig) -> Result<Processed<Self>> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| NotefoldError::io(parent, e))?;
        }

        let mut report = Report::default();
        let state = match load(path)? {
            Loaded::Missing => {
                debug!(path = %path.display(), "no state file, starting fresh");
                PipelineState::default()
            }
            Loaded::Valid(state) => state,
            Loaded::Corrupt(err) => {
                report.warning(IssueKind::StateIntegrity, path.display().to_string(), err.to_string());
                let aside = path.with_extension("corrupt");
                if let Err(e) = std::fs::rename(path, &aside) {
                    warn!(path = %path.display(), error = %e, "could not move corrupt state aside");
                }
                PipelineState::default()
            }
        };

        Ok(Processed::new(Self::build(path, retry, state, false), report))
    }

    /// Open the state file without write access. Corruption is reported the
    /// same way as [`Self::open`] but the file is left untouched.
    pub fn open_readonly(path: &Path) -> Result<Processed<Self>> {
        let mut report = Report::default();
        let state = match load(path)? {
            Loaded::Missing => PipelineState::default(),
            Loaded::Valid(state) => state,
            Loaded::Corrupt(err) => {
                report.warning(IssueKind::StateIntegrity, path.display().to_string(), err.to_string());
                PipelineState::default()
            }
        };
        Ok(Processed::new(
            Self::build(path, RetryConfig::default(), state, true),
            report,
        ))
    }

    fn build(path: &Path, retry: RetryConfig, state: PipelineState, readonly: bool) -> Self {
        let mut lock_name = path.file_name().unwrap_or_default().to_os_string();
        lock_name.push(".lock");
        Self {
            path: path.to_path_buf(),
            lock_path: path.with_file_name(lock_name),
            retry,
            state: Mutex::new(state),
            readonly,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A copy of the current in-memory state.
    pub fn snapshot(&self) -> Result<PipelineState> {
        let guard = self
            .state
            .lock()
            .map_err(|_| NotefoldError::Storage("state mutex poisoned".into()))?;
        Ok(guard.clone())
    }

    /// Apply `f` as one read-modify-write critical section and persist.
    ///
    /// The on-disk state is reloaded under the lock first so concurrent
    /// writers in other processes are not overwritten. A reload that fails
    /// its integrity check keeps the in-memory state and records a warning.
    pub fn update<T>(&self, f: impl FnOnce(&mut PipelineState) -> T) -> Result<Processed<T>> {
        if self.readonly {
            return Err(NotefoldError::Storage(
                "state store is opened in read-only mode".into(),
            ));
        }

        let mut guard = self
            .state
            .lock()
            .map_err(|_| NotefoldError::Storage("state mutex poisoned".into()))?;

        let lock_file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&self.lock_path)
            .map_err(|e| NotefoldError::io(&self.lock_path, e))?;
        lock_file
            .lock_exclusive()
            .map_err(|e| NotefoldError::io(&self.lock_path, e))?;

        let mut report = Report::default();
        match load(&self.path)? {
            Loaded::Valid(on_disk) => *guard = on_disk,
            Loaded::Missing => {}
            Loaded::Corrupt(err) => {
                report.warning(IssueKind::StateIntegrity, self.path.display().to_string(), err.to_string());
            }
        }

        let value = f(&mut guard);
        persist(&self.path, &guard, &self.retry)?;
        debug!(path = %self.path.display(), files = guard.files.len(), "state persisted");

        // Lock is released when the file is dropped
        drop(lock_file);
        Ok(Processed::new(value, report))
    }
}

impl std::fmt::Debug for StateStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateStore")
            .field("path", &self.path)
            .field("readonly", &self.readonly)
            .finish()
    }
}

/// Log a one-line summary of a loaded state.
pub fn log_summary(state: &PipelineState) {
    info!(
        files = state.files.len(),
        failed = state.failed_files().count(),
        content_hashes = state.content_hashes.len(),
        outputs = state.outputs.len(),
        "pipeline state"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn temp_state() -> (PathBuf, PathBuf) {
        let dir = std::env::temp_dir().join(format!("nf-state-{}", uuid::Uuid::now_v7()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(".notefold-state.json");
        (dir, path)
    }

    fn record(status: FileStatus) -> FileRecord {
        FileRecord {
            status,
            source_hash: "abc".into(),
            errors: 0,
            warnings: 1,
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn open_missing_starts_fresh() {
        let (dir, path) = temp_state();
        let store = StateStore::open(&path, RetryConfig::default()).unwrap();
        assert!(store.report.is_clean());
        assert_eq!(store.value.snapshot().unwrap(), PipelineState::default());
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn update_persists_across_reopen() {
        let (dir, path) = temp_state();
        let store = StateStore::open(&path, RetryConfig::default()).unwrap().value;
        store
            .update(|state| {
                state.files.insert("a.md".into(), record(FileStatus::Consolidated));
                state.record_output("summary.md", "deadbeef");
            })
            .unwrap();
        drop(store);

        let reopened = StateStore::open(&path, RetryConfig::default()).unwrap();
        assert!(reopened.report.is_clean());
        let state = reopened.value.snapshot().unwrap();
        assert_eq!(state.files.len(), 1);
        assert_eq!(state.outputs.get("summary.md").map(String::as_str), Some("deadbeef"));
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn tampered_state_falls_back_with_warning() {
        let (dir, path) = temp_state();
        let store = StateStore::open(&path, RetryConfig::default()).unwrap().value;
        store
            .update(|state| {
                state.files.insert("a.md".into(), record(FileStatus::Failed));
            })
            .unwrap();
        drop(store);

        let content = std::fs::read_to_string(&path).unwrap();
        std::fs::write(&path, content.replace("\"failed\"", "\"consolidated\"")).unwrap();

        let reopened = StateStore::open(&path, RetryConfig::default()).unwrap();
        assert_eq!(reopened.report.warnings.len(), 1);
        assert_eq!(reopened.report.warnings[0].kind, IssueKind::StateIntegrity);
        assert!(reopened.value.snapshot().unwrap().files.is_empty());
        assert!(path.with_extension("corrupt").exists());
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn truncated_state_is_detected() {
        let (dir, path) = temp_state();
        std::fs::write(&path, "{\"checksum\": \"abc\", \"payl").unwrap();
        let reopened = StateStore::open_readonly(&path).unwrap();
        assert_eq!(reopened.report.warnings.len(), 1);
        assert!(path.exists(), "read-only open leaves the file in place");
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn readonly_rejects_writes() {
        let (dir, path) = temp_state();
        let store = StateStore::open_readonly(&path).unwrap().value;
        let result = store.update(|_| ());
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("read-only"));
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn concurrent_updates_are_serialized() {
        let (dir, path) = temp_state();
        let store = Arc::new(StateStore::open(&path, RetryConfig::default()).unwrap().value);

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    store
                        .update(|state| {
                            state
                                .files
                                .insert(format!("doc-{i}.md"), record(FileStatus::Consolidated));
                        })
                        .unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let reopened = StateStore::open(&path, RetryConfig::default()).unwrap().value;
        assert_eq!(reopened.snapshot().unwrap().files.len(), 8);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn update_reloads_other_writers() {
        let (dir, path) = temp_state();
        let a = StateStore::open(&path, RetryConfig::default()).unwrap().value;
        let b = StateStore::open(&path, RetryConfig::default()).unwrap().value;

        a.update(|s| {
            s.files.insert("a.md".into(), record(FileStatus::Consolidated));
        })
        .unwrap();
        b.update(|s| {
            s.files.insert("b.md".into(), record(FileStatus::Consolidated));
        })
        .unwrap();

        let files = b.snapshot().unwrap().files;
        assert!(files.contains_key("a.md"));
        assert!(files.contains_key("b.md"));
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn content_hash_replacement_counts_new() {
        let mut state = PipelineState::default();
        let first: BTreeSet<String> = ["a", "b"].iter().map(|s| s.to_string()).collect();
        assert_eq!(state.replace_content_hashes(first), 2);
        let second: BTreeSet<String> = ["b", "c"].iter().map(|s| s.to_string()).collect();
        assert_eq!(state.replace_content_hashes(second), 1);
        assert_eq!(state.content_hashes.len(), 2);
    }
}
