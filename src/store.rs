//! Directory manager for the corpus root.
//!
//! [`CorpusStore`] is the only code that touches the corpus directory. It
//! hands out two kinds of access:
//!
//! - [`CorpusReader`] pins the current generation (shared lock) for as long
//!   as it is held. Listing and retrieval do all their filesystem work
//!   through one.
//! - [`Replacement`] holds the single-writer lock and owns a fresh workspace
//!   inside the root: the upload spool plus the tree being extracted.
//!   [`Replacement::commit`] moves the old children out and the new ones in
//!   under the exclusive lock, so readers see either the old or the new
//!   corpus and never an intermediate state. Dropping an uncommitted
//!   replacement removes the workspace.
//!
//! The root directory itself is never renamed or recreated, so it may be a
//! mount point or sit in a read-only parent. Names starting with
//! [`RESERVED_PREFIX`] belong to the store: they are hidden from listings and
//! refused as client paths.
//!
//! Paths supplied by clients (request filenames, archive entry names) go
//! through [`confine`] before they are joined onto any directory.

use chrono::{DateTime, Utc};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tempfile::TempDir;
use thiserror::Error;
use tokio::fs;
use tokio::sync::{Mutex, MutexGuard, RwLock, RwLockReadGuard};
use tracing::{debug, info, warn};

use crate::error::StorageError;

/// Prefix of every name the store creates inside the root.
pub const RESERVED_PREFIX: &str = ".docshelf-";
const STAGING_PREFIX: &str = ".docshelf-staging-";
const RETIRED_PREFIX: &str = ".docshelf-retired-";
const SPOOL_NAME: &str = "upload.zip";
const TREE_NAME: &str = "tree";

/// Raw directory entry, unfiltered.
#[derive(Debug, Clone)]
pub struct EntryInfo {
    pub name: String,
    pub size: u64,
    pub modified: DateTime<Utc>,
    pub is_file: bool,
}

/// Why a caller-supplied relative path was refused.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum PathViolation {
    #[error("empty path")]
    Empty,
    #[error("path contains control characters")]
    ControlCharacter,
    #[error("absolute paths are not allowed")]
    Absolute,
    #[error("parent directory references are not allowed")]
    ParentReference,
    #[error("path resolves outside the corpus root")]
    Escapes,
    #[error("path is reserved for internal use")]
    Reserved,
}

/// Joins `relative` onto `base`, refusing anything that could land outside it.
///
/// Backslashes count as separators and `.` segments are dropped. Any `..`
/// segment is refused outright rather than normalized.
pub fn confine(base: &Path, relative: &str) -> Result<PathBuf, PathViolation> {
    if relative.is_empty() {
        return Err(PathViolation::Empty);
    }
    if relative.chars().any(char::is_control) {
        return Err(PathViolation::ControlCharacter);
    }
    let normalized = relative.replace('\\', "/");
    if normalized.starts_with('/') {
        return Err(PathViolation::Absolute);
    }

    let mut out = base.to_path_buf();
    let mut depth = 0usize;
    for segment in normalized.split('/') {
        match segment {
            "" | "." => continue,
            ".." => return Err(PathViolation::ParentReference),
            name => {
                if depth == 0 && is_drive_prefix(name) {
                    return Err(PathViolation::Absolute);
                }
                out.push(name);
                depth += 1;
            }
        }
    }
    if depth == 0 {
        return Err(PathViolation::Empty);
    }
    Ok(out)
}

fn is_drive_prefix(segment: &str) -> bool {
    let bytes = segment.as_bytes();
    bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}

pub fn is_reserved(name: &str) -> bool {
    name.starts_with(RESERVED_PREFIX)
}

/// Whether the first real segment of `relative` is a reserved name.
pub fn is_reserved_path(relative: &str) -> bool {
    relative
        .split(['/', '\\'])
        .find(|segment| !segment.is_empty() && *segment != ".")
        .is_some_and(is_reserved)
}

/// Enumerates the direct children of `dir` with their size and mtime.
///
/// Entries that disappear between enumeration and stat (or dangling symlinks)
/// are skipped; every other failure fails the whole listing.
pub async fn list_dir(dir: &Path) -> Result<Vec<EntryInfo>, StorageError> {
    let mut reader = fs::read_dir(dir)
        .await
        .map_err(|e| StorageError::new("read directory", dir, e))?;

    let mut entries = Vec::new();
    while let Some(entry) = reader
        .next_entry()
        .await
        .map_err(|e| StorageError::new("read directory", dir, e))?
    {
        let path = entry.path();
        let metadata = match fs::metadata(&path).await {
            Ok(m) => m,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "skipping vanished entry");
                continue;
            }
            Err(e) => return Err(StorageError::new("stat", &path, e)),
        };
        let modified = metadata
            .modified()
            .map_err(|e| StorageError::new("read mtime of", &path, e))?;
        entries.push(EntryInfo {
            name: entry.file_name().to_string_lossy().into_owned(),
            size: metadata.len(),
            modified: DateTime::<Utc>::from(modified),
            is_file: metadata.is_file(),
        });
    }
    Ok(entries)
}

/// Deletes everything inside `dir`, descending into subdirectories.
/// `dir` itself is kept.
pub async fn remove_all(dir: &Path) -> Result<(), StorageError> {
    let mut reader = fs::read_dir(dir)
        .await
        .map_err(|e| StorageError::new("read directory", dir, e))?;
    while let Some(entry) = reader
        .next_entry()
        .await
        .map_err(|e| StorageError::new("read directory", dir, e))?
    {
        let path = entry.path();
        // file_type() does not follow symlinks, so a link to a directory is unlinked, not emptied.
        let file_type = entry
            .file_type()
            .await
            .map_err(|e| StorageError::new("stat", &path, e))?;
        let removed = if file_type.is_dir() {
            fs::remove_dir_all(&path).await
        } else {
            fs::remove_file(&path).await
        };
        removed.map_err(|e| StorageError::new("remove", &path, e))?;
    }
    Ok(())
}

/// Owner of the corpus root directory.
#[derive(Debug)]
pub struct CorpusStore {
    root: PathBuf,
    generation: RwLock<u64>,
    writer: Mutex<()>,
}

impl CorpusStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            generation: RwLock::new(0),
            writer: Mutex::new(()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Creates the root directory tree if it is missing.
    pub async fn ensure(&self) -> Result<(), StorageError> {
        fs::create_dir_all(&self.root)
            .await
            .map_err(|e| StorageError::new("create directory", &self.root, e))
    }

    /// Pins the current generation and makes sure the root exists.
    pub async fn reader(&self) -> Result<CorpusReader<'_>, StorageError> {
        let generation = self.generation.read().await;
        self.ensure().await?;
        Ok(CorpusReader {
            root: &self.root,
            generation,
        })
    }

    /// Takes the writer lock and creates an empty workspace inside the root.
    ///
    /// Concurrent replacements queue here; readers are not blocked until
    /// [`Replacement::commit`].
    pub async fn begin_replace(&self) -> Result<Replacement<'_>, StorageError> {
        let writer = self.writer.lock().await;
        {
            let _pinned = self.generation.read().await;
            self.ensure().await?;
        }

        let root = self.root.clone();
        let workspace = tokio::task::spawn_blocking(move || {
            tempfile::Builder::new()
                .prefix(STAGING_PREFIX)
                .tempdir_in(&root)
        })
        .await
        .map_err(std::io::Error::other)
        .and_then(|created| created)
        .map_err(|e| StorageError::new("create staging directory in", &self.root, e))?;

        let tree = workspace.path().join(TREE_NAME);
        fs::create_dir(&tree)
            .await
            .map_err(|e| StorageError::new("create directory", &tree, e))?;
        debug!(workspace = %workspace.path().display(), "staging workspace created");

        Ok(Replacement {
            store: self,
            _writer: writer,
            spool: workspace.path().join(SPOOL_NAME),
            tree,
            workspace,
        })
    }

    /// Removes workspaces and retired generations left in the root by a
    /// process that stopped mid-replacement. Returns how many were removed.
    pub async fn sweep_leftovers(&self) -> Result<usize, StorageError> {
        let _writer = self.writer.lock().await;
        let _pinned = self.generation.read().await;
        self.ensure().await?;

        let mut removed = 0;
        for entry in list_dir(&self.root).await? {
            if !is_reserved(&entry.name) || entry.is_file {
                continue;
            }
            let path = self.root.join(&entry.name);
            fs::remove_dir_all(&path)
                .await
                .map_err(|e| StorageError::new("remove", &path, e))?;
            info!(path = %path.display(), "removed leftover replacement directory");
            removed += 1;
        }
        Ok(removed)
    }

    fn retired_path(&self, generation: u64) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();
        self.root.join(format!(
            "{}{}-{}-{}",
            RETIRED_PREFIX,
            std::process::id(),
            generation,
            nanos
        ))
    }
}

/// Shared access to one generation of the corpus.
pub struct CorpusReader<'a> {
    root: &'a Path,
    generation: RwLockReadGuard<'a, u64>,
}

impl CorpusReader<'_> {
    pub fn generation(&self) -> u64 {
        *self.generation
    }

    /// Direct children of the root, without the store's reserved entries.
    pub async fn list_entries(&self) -> Result<Vec<EntryInfo>, StorageError> {
        let mut entries = list_dir(self.root).await?;
        entries.retain(|entry| !is_reserved(&entry.name));
        Ok(entries)
    }

    pub fn resolve(&self, relative: &str) -> Result<PathBuf, PathViolation> {
        if is_reserved_path(relative) {
            return Err(PathViolation::Reserved);
        }
        confine(self.root, relative)
    }

    /// Whether the existing `path` still lies under the root once symlinks
    /// are resolved.
    pub async fn contains(&self, path: &Path) -> Result<bool, StorageError> {
        let root = fs::canonicalize(self.root)
            .await
            .map_err(|e| StorageError::new("canonicalize", self.root, e))?;
        let target = fs::canonicalize(path)
            .await
            .map_err(|e| StorageError::new("canonicalize", path, e))?;
        Ok(target.starts_with(&root))
    }
}

/// An in-progress bulk replacement. Holds the writer lock until dropped.
pub struct Replacement<'a> {
    store: &'a CorpusStore,
    _writer: MutexGuard<'a, ()>,
    spool: PathBuf,
    tree: PathBuf,
    workspace: TempDir,
}

impl Replacement<'_> {
    /// Where the uploaded archive is written before extraction.
    pub fn spool_path(&self) -> &Path {
        &self.spool
    }

    /// Directory that becomes the corpus contents on commit.
    pub fn staging_dir(&self) -> &Path {
        &self.tree
    }

    /// Publishes the staged tree as the corpus contents and returns the new
    /// generation number.
    pub async fn commit(self) -> Result<u64, StorageError> {
        let Replacement {
            store,
            _writer,
            tree,
            workspace,
            ..
        } = self;
        let workspace = workspace.keep();

        let published = publish(store, &tree).await;
        discard(&workspace).await;
        let (generation, retired) = published?;

        info!(generation, root = %store.root.display(), "corpus generation published");

        let cleanup = match remove_all(&retired).await {
            Ok(()) => fs::remove_dir(&retired)
                .await
                .map_err(|e| StorageError::new("remove", &retired, e)),
            Err(e) => Err(e),
        };
        if let Err(e) = cleanup {
            warn!(error = %e, "failed to remove retired corpus generation");
        }

        Ok(generation)
    }
}

/// Swaps the root's children for those of `tree` under the exclusive lock.
/// On failure every entry is moved back where it came from.
async fn publish(store: &CorpusStore, tree: &Path) -> Result<(u64, PathBuf), StorageError> {
    let mut generation = store.generation.write().await;
    let next = *generation + 1;
    let retired = store.retired_path(next);
    fs::create_dir(&retired)
        .await
        .map_err(|e| StorageError::new("create directory", &retired, e))?;

    let moved_out = match move_children(&store.root, &retired).await {
        Ok(names) => names,
        Err((names, e)) => {
            move_back(&retired, &store.root, &names).await;
            discard(&retired).await;
            return Err(e);
        }
    };
    if let Err((moved_in, e)) = move_children(tree, &store.root).await {
        move_back(&store.root, tree, &moved_in).await;
        move_back(&retired, &store.root, &moved_out).await;
        discard(&retired).await;
        return Err(e);
    }

    *generation = next;
    Ok((next, retired))
}

/// Renames every non-reserved child of `from` into `to`. On error, returns
/// the names already moved alongside the failure.
async fn move_children(
    from: &Path,
    to: &Path,
) -> Result<Vec<OsString>, (Vec<OsString>, StorageError)> {
    let mut moved = Vec::new();
    let mut reader = match fs::read_dir(from).await {
        Ok(reader) => reader,
        Err(e) => return Err((moved, StorageError::new("read directory", from, e))),
    };
    loop {
        let entry = match reader.next_entry().await {
            Ok(Some(entry)) => entry,
            Ok(None) => return Ok(moved),
            Err(e) => return Err((moved, StorageError::new("read directory", from, e))),
        };
        let name = entry.file_name();
        if is_reserved(&name.to_string_lossy()) {
            continue;
        }
        if let Err(e) = fs::rename(entry.path(), to.join(&name)).await {
            return Err((moved, StorageError::new("move", &entry.path(), e)));
        }
        moved.push(name);
    }
}

async fn move_back(from: &Path, to: &Path, names: &[OsString]) {
    for name in names {
        let source = from.join(name);
        if let Err(e) = fs::rename(&source, to.join(name)).await {
            warn!(error = %e, path = %source.display(), "failed to restore corpus entry");
        }
    }
}

async fn discard(dir: &Path) {
    if let Err(e) = fs::remove_dir_all(dir).await {
        warn!(error = %e, dir = %dir.display(), "failed to remove staging directory");
    }
}
