//! Persisted corpus of test-case documents.
//!
//! The corpus is the only source of truth for identifier uniqueness. Stores
//! expose a listing primitive for the scanner and an atomic create-if-absent
//! primitive for the allocator's reserve step.

use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use fs2::FileExt;
use qa_core::CaseId;
use qa_scope_cases::layout::{app_dir, area_to_repo_dir, case_relative_path, split_case_path};
use serde::{Deserialize, Serialize};

/// Per-application lock file, hidden so it is never a corpus entry.
pub const LOCK_FILE_NAME: &str = ".corpus.lock";

const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(5);
const LOCK_POLL_LIMIT: u32 = 2_000;

/// Where identifiers must be unique.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IdScope {
    #[default]
    App,
    Area,
}

impl IdScope {
    pub fn as_str(self) -> &'static str {
        match self {
            IdScope::App => "app",
            IdScope::Area => "area",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CorpusError {
    #[error("corpus io at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("timed out waiting for corpus lock {0}")]
    LockTimeout(PathBuf),
    #[error("corpus state poisoned by a panicked writer")]
    Poisoned,
    #[error("path `{0}` is not a case document location")]
    NotACasePath(String),
}

impl CorpusError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        CorpusError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// One case document found in the corpus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorpusEntry {
    /// Corpus-relative path with `/` separators.
    pub rel_path: String,
    pub app_dir: String,
    pub area_dir: String,
    pub stem: String,
}

impl CorpusEntry {
    pub fn from_rel_path(rel_path: &str) -> Option<Self> {
        let parts = split_case_path(rel_path)?;
        Some(Self {
            rel_path: rel_path.to_string(),
            app_dir: parts.app_dir.to_string(),
            area_dir: parts.area_dir.to_string(),
            stem: parts.stem.to_string(),
        })
    }

    /// Identifier carried by the file name, if it looks like one.
    pub fn case_id(&self) -> Option<CaseId> {
        CaseId::parse_lenient(&self.stem)
    }
}

/// What to publish under a candidate identifier.
#[derive(Debug, Clone, Copy)]
pub struct Reservation<'a> {
    pub id: &'a CaseId,
    pub area: &'a str,
    pub scope: IdScope,
    pub content: &'a str,
}

impl Reservation<'_> {
    pub fn rel_path(&self) -> String {
        case_relative_path(self.area, self.id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreateOutcome {
    Created { rel_path: String },
    /// The identifier is already taken inside the uniqueness scope.
    Conflict { existing: String },
}

pub trait CorpusStore: Send + Sync {
    /// Case entries stored under `app`'s directory. Foreign files are omitted.
    fn list_entries(&self, app: &str) -> Result<Vec<CorpusEntry>, CorpusError>;

    /// Publish the reservation unless its identifier is already in use.
    ///
    /// Check and publish are one atomic step: of two concurrent calls for the
    /// same identifier exactly one returns `Created`.
    fn create_if_absent(&self, reservation: &Reservation<'_>)
        -> Result<CreateOutcome, CorpusError>;
}

/// First entry that already holds `reservation.id` inside its scope.
fn find_conflict<'e>(
    entries: &'e [CorpusEntry],
    reservation: &Reservation<'_>,
) -> Option<&'e CorpusEntry> {
    let area_dir = area_to_repo_dir(reservation.area);
    entries.iter().find(|entry| {
        let same_id = entry.case_id().is_some_and(|id| {
            id.belongs_to(reservation.id.app()) && id.sequence() == reservation.id.sequence()
        });
        match reservation.scope {
            IdScope::App => same_id,
            IdScope::Area => same_id && entry.area_dir == area_dir,
        }
    })
}

/// Corpus stored as a directory tree of Markdown files.
#[derive(Debug, Clone)]
pub struct FsCorpus {
    root: PathBuf,
}

impl FsCorpus {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn absolute(&self, rel_path: &str) -> PathBuf {
        self.root.join(rel_path)
    }

    /// Every case entry under the corpus root, sorted by path.
    pub fn list_all(&self) -> Result<Vec<CorpusEntry>, CorpusError> {
        let mut entries = Vec::new();
        let top = match fs::read_dir(&self.root) {
            Ok(top) => top,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(entries),
            Err(err) => return Err(CorpusError::io(&self.root, err)),
        };
        for dir in top {
            let dir = dir.map_err(|e| CorpusError::io(&self.root, e))?;
            let name = dir.file_name().to_string_lossy().to_string();
            if name.starts_with('.') || !dir.path().is_dir() {
                continue;
            }
            entries.extend(self.walk_app(&name)?);
        }
        entries.sort_by(|a, b| a.rel_path.cmp(&b.rel_path));
        Ok(entries)
    }

    pub fn read(&self, entry: &CorpusEntry) -> Result<String, CorpusError> {
        let path = self.absolute(&entry.rel_path);
        fs::read_to_string(&path).map_err(|e| CorpusError::io(&path, e))
    }

    fn walk_app(&self, dir_name: &str) -> Result<Vec<CorpusEntry>, CorpusError> {
        let app_root = self.root.join(dir_name);
        let mut out = Vec::new();
        let mut stack = vec![app_root.clone()];
        while let Some(dir) = stack.pop() {
            let listing = match fs::read_dir(&dir) {
                Ok(listing) => listing,
                Err(err) if dir == app_root => {
                    if err.kind() == std::io::ErrorKind::NotFound {
                        return Ok(out);
                    }
                    return Err(CorpusError::io(&dir, err));
                }
                Err(err) => {
                    tracing::warn!(
                        dir = %dir.display(),
                        error = %err,
                        "skipping unreadable corpus directory"
                    );
                    continue;
                }
            };
            for item in listing {
                let item = match item {
                    Ok(item) => item,
                    Err(err) => {
                        tracing::warn!(
                            dir = %dir.display(),
                            error = %err,
                            "skipping unreadable corpus entry"
                        );
                        continue;
                    }
                };
                let path = item.path();
                if item.file_name().to_string_lossy().starts_with('.') {
                    continue;
                }
                if path.is_dir() {
                    stack.push(path);
                    continue;
                }
                let Ok(rel) = path.strip_prefix(&self.root) else {
                    continue;
                };
                let rel = rel.to_string_lossy().replace('\\', "/");
                if let Some(entry) = CorpusEntry::from_rel_path(&rel) {
                    out.push(entry);
                }
            }
        }
        Ok(out)
    }

    fn lock_app(&self, app: &str) -> Result<fs::File, CorpusError> {
        let app_root = self.root.join(app_dir(app));
        fs::create_dir_all(&app_root).map_err(|e| CorpusError::io(&app_root, e))?;
        let lock_path = app_root.join(LOCK_FILE_NAME);
        let lock = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&lock_path)
            .map_err(|e| CorpusError::io(&lock_path, e))?;
        for _ in 0..LOCK_POLL_LIMIT {
            match lock.try_lock_exclusive() {
                Ok(()) => return Ok(lock),
                Err(err) if err.kind() == fs2::lock_contended_error().kind() => {
                    std::thread::sleep(LOCK_POLL_INTERVAL);
                }
                Err(err) => return Err(CorpusError::io(&lock_path, err)),
            }
        }
        Err(CorpusError::LockTimeout(lock_path))
    }

    fn publish_locked(&self, reservation: &Reservation<'_>) -> Result<CreateOutcome, CorpusError> {
        let entries = self.list_entries(reservation.id.app())?;
        if let Some(existing) = find_conflict(&entries, reservation) {
            return Ok(CreateOutcome::Conflict {
                existing: existing.rel_path.clone(),
            });
        }

        let rel_path = reservation.rel_path();
        let target = self.absolute(&rel_path);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|e| CorpusError::io(parent, e))?;
        }
        if target.exists() {
            return Ok(CreateOutcome::Conflict { existing: rel_path });
        }
        let tmp = write_temp_sibling(&target, reservation.content)?;
        if let Err(err) = fs::rename(&tmp, &target) {
            let _ = fs::remove_file(&tmp);
            return Err(CorpusError::io(&target, err));
        }
        Ok(CreateOutcome::Created { rel_path })
    }
}

impl CorpusStore for FsCorpus {
    fn list_entries(&self, app: &str) -> Result<Vec<CorpusEntry>, CorpusError> {
        self.walk_app(&app_dir(app))
    }

    fn create_if_absent(
        &self,
        reservation: &Reservation<'_>,
    ) -> Result<CreateOutcome, CorpusError> {
        let lock = self.lock_app(reservation.id.app())?;
        let outcome = self.publish_locked(reservation);
        // Closing the handle releases the lock even if unlock fails.
        let _ = FileExt::unlock(&lock);
        outcome
    }
}

/// Write `content` to a hidden, fsynced temporary next to `target`.
fn write_temp_sibling(target: &Path, content: &str) -> Result<PathBuf, CorpusError> {
    let parent = target.parent().unwrap_or_else(|| Path::new("."));
    let file_name = target
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let nonce = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);
    let tmp = parent.join(format!(".{file_name}.{}-{nonce}.tmp", std::process::id()));

    let written = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&tmp)
        .and_then(|mut file| {
            file.write_all(content.as_bytes())?;
            file.sync_all()
        });
    match written {
        Ok(()) => Ok(tmp),
        Err(err) => {
            let _ = fs::remove_file(&tmp);
            Err(CorpusError::io(&tmp, err))
        }
    }
}

/// In-memory corpus keyed by corpus-relative path.
#[derive(Debug, Default)]
pub struct MemoryCorpus {
    docs: Mutex<BTreeMap<String, String>>,
}

impl MemoryCorpus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a document without any uniqueness check.
    pub fn insert(&self, rel_path: &str, content: &str) -> Result<(), CorpusError> {
        if split_case_path(rel_path).is_none() {
            return Err(CorpusError::NotACasePath(rel_path.to_string()));
        }
        let mut docs = self.docs.lock().map_err(|_| CorpusError::Poisoned)?;
        docs.insert(rel_path.to_string(), content.to_string());
        Ok(())
    }

    pub fn get(&self, rel_path: &str) -> Option<String> {
        self.docs.lock().ok()?.get(rel_path).cloned()
    }

    pub fn paths(&self) -> Vec<String> {
        self.docs
            .lock()
            .map(|docs| docs.keys().cloned().collect())
            .unwrap_or_default()
    }
}

impl CorpusStore for MemoryCorpus {
    fn list_entries(&self, app: &str) -> Result<Vec<CorpusEntry>, CorpusError> {
        let docs = self.docs.lock().map_err(|_| CorpusError::Poisoned)?;
        let dir = app_dir(app);
        Ok(docs
            .keys()
            .filter_map(|rel| CorpusEntry::from_rel_path(rel))
            .filter(|entry| entry.app_dir == dir)
            .collect())
    }

    fn create_if_absent(
        &self,
        reservation: &Reservation<'_>,
    ) -> Result<CreateOutcome, CorpusError> {
        let mut docs = self.docs.lock().map_err(|_| CorpusError::Poisoned)?;
        let dir = app_dir(reservation.id.app());
        let entries: Vec<CorpusEntry> = docs
            .keys()
            .filter_map(|rel| CorpusEntry::from_rel_path(rel))
            .filter(|entry| entry.app_dir == dir)
            .collect();
        if let Some(existing) = find_conflict(&entries, reservation) {
            return Ok(CreateOutcome::Conflict {
                existing: existing.rel_path.clone(),
            });
        }
        let rel_path = reservation.rel_path();
        if docs.contains_key(&rel_path) {
            return Ok(CreateOutcome::Conflict { existing: rel_path });
        }
        docs.insert(rel_path.clone(), reservation.content.to_string());
        Ok(CreateOutcome::Created { rel_path })
    }
}
