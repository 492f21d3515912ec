//! Filesystem snapshots used to roll back batch edits.
//!
//! A snapshot lives at `<vault>/<snapshot_dir>/<id>/` and mirrors the vault-relative layout of
//! the notes it captured, next to a `.manifest.json` recording each copy's size, SHA-256 and
//! original modification time. The id is the local creation time at second resolution
//! (`%Y%m%d_%H%M%S`). Two snapshots started within the same second share a directory: the
//! second one logs a warning and merges into the existing manifest. A path captured again
//! gets a fresh copy and manifest entry, so the snapshot always holds the latest pre-write
//! state of each note.
//!
//! Copies and restores fan out one task per note on the tokio runtime and always wait for every
//! task; failures are collected, never short-circuited.
use chrono::{Local, NaiveDateTime};
use filetime::FileTime;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::{
    collections::BTreeSet,
    fmt,
    fs::Permissions,
    path::{Path, PathBuf},
};
use tokio::task::JoinSet;
use walkdir::WalkDir;

use crate::{
    error::{PathFailure, VaultError},
    paths,
    store::NoteStore,
};

pub const SNAPSHOT_ID_FORMAT: &str = "%Y%m%d_%H%M%S";
pub const SNAPSHOT_CREATED_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
pub const MANIFEST_FILE: &str = ".manifest.json";

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SnapshotId(String);

impl SnapshotId {
    pub fn now() -> Self {
        SnapshotId(Local::now().format(SNAPSHOT_ID_FORMAT).to_string())
    }

    /// Accept an id coming from outside. Anything that could address a directory other than a
    /// direct child of the snapshot root is a [VaultError::SecurityViolation].
    pub fn parse(raw: &str) -> Result<Self, VaultError> {
        let raw = raw.trim();
        if raw.is_empty() || raw == "." || raw == ".." || raw.contains(['/', '\\', '\0']) {
            return Err(VaultError::SecurityViolation(format!(
                "invalid snapshot id: {raw:?}"
            )));
        }
        Ok(SnapshotId(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Creation time encoded in the id, if the id is a timestamp.
    pub fn created_at(&self) -> Option<NaiveDateTime> {
        NaiveDateTime::parse_from_str(&self.0, SNAPSHOT_ID_FORMAT).ok()
    }
}

impl fmt::Display for SnapshotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub path: String,
    pub size: u64,
    pub sha256: String,
    pub modified_secs: i64,
    pub modified_nanos: u32,
    pub readonly: bool,
}

impl ManifestEntry {
    fn modified(&self) -> FileTime {
        FileTime::from_unix_time(self.modified_secs, self.modified_nanos)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotManifest {
    pub id: SnapshotId,
    pub created: String,
    pub entries: Vec<ManifestEntry>,
}

impl SnapshotManifest {
    fn new(id: SnapshotId) -> Self {
        SnapshotManifest {
            id,
            created: Local::now().format(SNAPSHOT_CREATED_FORMAT).to_string(),
            entries: Vec::new(),
        }
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|entry| entry.path.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotInfo {
    pub id: String,
    pub created: String,
    pub note_count: usize,
    pub size_bytes: u64,
}

fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

fn make_writable(permissions: &mut Permissions) {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        permissions.set_mode(permissions.mode() | 0o200);
    }
    #[cfg(not(unix))]
    {
        #[allow(clippy::permissions_set_readonly_false)]
        permissions.set_readonly(false);
    }
}

fn merge_entry(entries: &mut Vec<ManifestEntry>, entry: ManifestEntry) {
    match entries.iter_mut().find(|existing| existing.path == entry.path) {
        Some(existing) => *existing = entry,
        None => entries.push(entry),
    }
}

async fn capture_one(
    rel: String,
    source: PathBuf,
    dest: PathBuf,
) -> Result<ManifestEntry, VaultError> {
    let metadata = tokio::fs::metadata(&source).await?;
    let bytes = tokio::fs::read(&source).await?;
    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(&dest, &bytes).await?;
    let modified = FileTime::from_last_modification_time(&metadata);
    filetime::set_file_mtime(&dest, modified)?;
    Ok(ManifestEntry {
        path: rel,
        size: bytes.len() as u64,
        sha256: sha256_hex(&bytes),
        modified_secs: modified.unix_seconds(),
        modified_nanos: modified.nanoseconds(),
        readonly: metadata.permissions().readonly(),
    })
}

/// Returns `false` when the target already matched the snapshot and nothing was written.
async fn restore_one(
    copy: PathBuf,
    target: PathBuf,
    expected: Option<ManifestEntry>,
) -> Result<bool, VaultError> {
    let bytes = tokio::fs::read(&copy).await?;
    let (modified, readonly) = match &expected {
        Some(entry) => {
            if sha256_hex(&bytes) != entry.sha256 {
                return Err(VaultError::Integrity(format!(
                    "snapshot copy of {} does not match its recorded checksum",
                    entry.path
                )));
            }
            (entry.modified(), entry.readonly)
        }
        None => {
            let metadata = tokio::fs::metadata(&copy).await?;
            (
                FileTime::from_last_modification_time(&metadata),
                metadata.permissions().readonly(),
            )
        }
    };

    if let Ok(current) = tokio::fs::metadata(&target).await {
        if current.is_file()
            && FileTime::from_last_modification_time(&current) == modified
            && current.permissions().readonly() == readonly
            && tokio::fs::read(&target)
                .await
                .map(|existing| existing == bytes)
                .unwrap_or(false)
        {
            return Ok(false);
        }
        if current.permissions().readonly() {
            let mut permissions = current.permissions();
            make_writable(&mut permissions);
            tokio::fs::set_permissions(&target, permissions).await?;
        }
    }

    if let Some(parent) = target.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(&target, &bytes).await?;
    filetime::set_file_mtime(&target, modified)?;
    if readonly {
        let mut permissions = tokio::fs::metadata(&target).await?.permissions();
        permissions.set_readonly(true);
        tokio::fs::set_permissions(&target, permissions).await?;
    }
    Ok(true)
}

pub struct SnapshotManager<'s, S: NoteStore + ?Sized> {
    store: &'s S,
}

impl<'s, S: NoteStore + ?Sized> SnapshotManager<'s, S> {
    pub fn new(store: &'s S) -> Self {
        SnapshotManager { store }
    }

    pub fn snapshot_root(&self) -> Result<PathBuf, VaultError> {
        self.store.resolve(&self.store.config().snapshot_dir)
    }

    pub fn snapshot_path(&self, id: &SnapshotId) -> Result<PathBuf, VaultError> {
        Ok(self.snapshot_root()?.join(id.as_str()))
    }

    /// Capture byte-exact copies of `notes` under a new timestamp id.
    pub async fn create_snapshot(&self, notes: &[String]) -> Result<SnapshotId, VaultError> {
        self.capture(SnapshotId::now(), notes).await
    }

    /// Capture `notes` under `id`. Every path is checked before anything is copied; a missing
    /// note fails the whole request with [VaultError::NotFound] and no side effects.
    #[tracing::instrument(skip(self, notes), fields(count = notes.len()))]
    pub async fn capture(
        &self,
        id: SnapshotId,
        notes: &[String],
    ) -> Result<SnapshotId, VaultError> {
        let mut seen = BTreeSet::new();
        let mut sources = Vec::new();
        for rel in notes {
            let rel = paths::normalize(rel)?;
            if !seen.insert(rel.clone()) {
                continue;
            }
            let source = self.store.resolve(&rel)?;
            if !source.is_file() {
                return Err(VaultError::NotFound(format!("Note not found: {rel}")));
            }
            sources.push((rel, source));
        }

        let snapshot_dir = self.snapshot_path(&id)?;
        let fresh = !snapshot_dir.exists();
        let mut manifest = if fresh {
            SnapshotManifest::new(id.clone())
        } else {
            tracing::warn!(
                "Snapshot {} already exists; adding to it instead of creating a new one",
                id
            );
            self.load_manifest(&id)?
                .unwrap_or_else(|| SnapshotManifest::new(id.clone()))
        };
        let already_captured = manifest
            .paths()
            .map(str::to_string)
            .collect::<BTreeSet<String>>();
        for (rel, _) in sources.iter().filter(|(rel, _)| already_captured.contains(rel)) {
            tracing::warn!("Replacing the copy of {} in snapshot {}", rel, id);
        }

        tokio::fs::create_dir_all(&snapshot_dir).await?;
        tracing::info!("Creating snapshot {}: {} notes", id, sources.len());

        let total = sources.len();
        let mut tasks = JoinSet::new();
        for (idx, (rel, source)) in sources.into_iter().enumerate() {
            let dest = snapshot_dir.join(paths::string_to_os_path(&rel));
            tasks.spawn(async move {
                let result = capture_one(rel.clone(), source, dest.clone()).await;
                (idx, rel, dest, result)
            });
        }

        let mut captured = Vec::new();
        let mut failed = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((idx, rel, dest, Ok(entry))) => {
                    tracing::debug!("Captured ({}/{}): {}", idx + 1, total, rel);
                    captured.push((idx, dest, entry));
                }
                Ok((_, rel, _, Err(e))) => failed.push(PathFailure::new(rel, e)),
                Err(e) => failed.push(PathFailure::new(id.to_string(), VaultError::from(e))),
            }
        }

        if !failed.is_empty() && fresh {
            if let Err(e) = tokio::fs::remove_dir_all(&snapshot_dir).await {
                tracing::warn!("Could not remove incomplete snapshot {}: {e}", id);
            }
            return Err(VaultError::SnapshotFailed {
                snapshot_id: id.to_string(),
                failed,
            });
        }

        captured.sort_by_key(|(idx, _, _)| *idx);
        let mut new_entries = Vec::new();
        for (_, dest, entry) in captured {
            if already_captured.contains(&entry.path) {
                // replaced copies stay, the manifest has to describe them
                merge_entry(&mut manifest.entries, entry);
            } else if failed.is_empty() {
                new_entries.push(entry);
            } else {
                tokio::fs::remove_file(dest).await.ok();
            }
        }
        manifest.entries.extend(new_entries);
        let manifest_json = serde_json::to_vec_pretty(&manifest)?;
        tokio::fs::write(snapshot_dir.join(MANIFEST_FILE), manifest_json).await?;
        if !failed.is_empty() {
            return Err(VaultError::SnapshotFailed {
                snapshot_id: id.to_string(),
                failed,
            });
        }
        tracing::info!("Completed snapshot {} ({} notes)", id, manifest.entries.len());
        Ok(id)
    }

    /// Read the manifest of an existing snapshot. `Ok(None)` means the directory has no
    /// manifest.
    pub fn load_manifest(&self, id: &SnapshotId) -> Result<Option<SnapshotManifest>, VaultError> {
        let manifest_path = self.snapshot_path(id)?.join(MANIFEST_FILE);
        if !manifest_path.is_file() {
            return Ok(None);
        }
        let raw = std::fs::read(manifest_path)?;
        Ok(Some(serde_json::from_slice(&raw)?))
    }

    pub fn manifest(&self, id: &str) -> Result<SnapshotManifest, VaultError> {
        let id = SnapshotId::parse(id)?;
        if !self.snapshot_path(&id)?.is_dir() {
            return Err(VaultError::NotFound(format!("Snapshot not found: {id}")));
        }
        self.load_manifest(&id)?
            .ok_or_else(|| VaultError::NotFound(format!("Snapshot {id} has no manifest")))
    }

    /// Note copies inside a snapshot directory, as vault-relative paths.
    fn walk_copies(&self, snapshot_dir: &Path) -> Result<Vec<String>, VaultError> {
        let extensions = &self.store.config().file_extensions;
        let mut copies = Vec::new();
        for entry in WalkDir::new(snapshot_dir).sort_by_file_name() {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            let rel = paths::os_path_to_string(entry.path().strip_prefix(snapshot_dir)?);
            if paths::has_extension(&rel, extensions) {
                copies.push(rel);
            }
        }
        Ok(copies)
    }

    /// Write every captured note back to its original path with its captured modification time
    /// and read-only flag. Paths created after the snapshot are not touched.
    #[tracing::instrument(skip(self))]
    pub async fn restore(&self, id: &str) -> Result<Vec<String>, VaultError> {
        let id = SnapshotId::parse(id)?;
        let snapshot_dir = self.snapshot_path(&id)?;
        if !snapshot_dir.is_dir() {
            return Err(VaultError::NotFound(format!("Snapshot not found: {id}")));
        }
        let items = match self.load_manifest(&id)? {
            Some(manifest) => manifest
                .entries
                .into_iter()
                .map(|entry| (entry.path.clone(), Some(entry)))
                .collect::<Vec<(String, Option<ManifestEntry>)>>(),
            None => self
                .walk_copies(&snapshot_dir)?
                .into_iter()
                .map(|rel| (rel, None))
                .collect(),
        };
        tracing::info!("Restoring snapshot {}: {} notes", id, items.len());

        let mut failed = Vec::new();
        let mut tasks = JoinSet::new();
        for (idx, (rel, expected)) in items.into_iter().enumerate() {
            let target = match paths::normalize(&rel).and_then(|r| self.store.resolve(&r)) {
                Ok(target) => target,
                Err(e) => {
                    failed.push(PathFailure::new(rel, e));
                    continue;
                }
            };
            let copy = snapshot_dir.join(paths::string_to_os_path(&rel));
            tasks.spawn(async move {
                let result = restore_one(copy, target, expected).await;
                (idx, rel, result)
            });
        }

        let mut restored = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((idx, rel, Ok(written))) => {
                    if written {
                        tracing::debug!("Restored {}", rel);
                    } else {
                        tracing::debug!("{} already matches snapshot {}", rel, id);
                    }
                    restored.push((idx, rel));
                }
                Ok((_, rel, Err(e))) => failed.push(PathFailure::new(rel, e)),
                Err(e) => failed.push(PathFailure::new(id.to_string(), VaultError::from(e))),
            }
        }
        restored.sort_by_key(|(idx, _)| *idx);
        let restored = restored
            .into_iter()
            .map(|(_, rel)| rel)
            .collect::<Vec<String>>();

        if !failed.is_empty() {
            tracing::warn!(
                "Snapshot {} restored {} notes, {} failed",
                id,
                restored.len(),
                failed.len()
            );
            return Err(VaultError::RestoreIncomplete {
                snapshot_id: id.to_string(),
                restored,
                failed,
            });
        }
        tracing::info!("Completed restore of snapshot {} ({} notes)", id, restored.len());
        Ok(restored)
    }

    fn info(&self, name: &str) -> Result<SnapshotInfo, VaultError> {
        let id = SnapshotId::parse(name)?;
        let snapshot_dir = self.snapshot_path(&id)?;
        let copies = self.walk_copies(&snapshot_dir)?;
        let size_bytes = copies
            .iter()
            .filter_map(|rel| {
                std::fs::metadata(snapshot_dir.join(paths::string_to_os_path(rel))).ok()
            })
            .map(|meta| meta.len())
            .sum();
        let note_count = match self.load_manifest(&id) {
            Ok(Some(manifest)) => manifest.entries.len(),
            Ok(None) => copies.len(),
            Err(e) => {
                tracing::debug!("Unreadable manifest in snapshot {}: {e}", id);
                copies.len()
            }
        };
        let created = id
            .created_at()
            .map(|ts| ts.format(SNAPSHOT_CREATED_FORMAT).to_string())
            .unwrap_or_else(|| name.to_string());
        Ok(SnapshotInfo {
            id: name.to_string(),
            created,
            note_count,
            size_bytes,
        })
    }

    fn snapshot_names(&self) -> Result<Vec<String>, VaultError> {
        let root = self.snapshot_root()?;
        if !root.is_dir() {
            return Ok(Vec::new());
        }
        let mut names = Vec::new();
        for entry in std::fs::read_dir(&root)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_string());
            }
        }
        names.sort_by(|a, b| b.cmp(a));
        Ok(names)
    }

    /// Snapshots on disk, newest first.
    pub fn list(&self, limit: usize) -> Result<Vec<SnapshotInfo>, VaultError> {
        self.snapshot_names()?
            .into_iter()
            .take(limit)
            .map(|name| self.info(&name))
            .collect()
    }

    /// Delete snapshots whose id timestamp is more than `max_age_days` old. Directories whose
    /// name is not a timestamp are never touched.
    #[tracing::instrument(skip(self))]
    pub fn cleanup(&self, max_age_days: u32) -> Result<usize, VaultError> {
        let root = self.snapshot_root()?;
        let cutoff = Local::now().naive_local() - chrono::Duration::days(i64::from(max_age_days));
        let mut removed = 0;
        for name in self.snapshot_names()? {
            let Some(created) = SnapshotId::parse(&name).ok().and_then(|id| id.created_at()) else {
                tracing::debug!("Leaving {} alone: not a timestamped snapshot", name);
                continue;
            };
            if created < cutoff {
                std::fs::remove_dir_all(root.join(&name))?;
                removed += 1;
                tracing::info!("Removed old snapshot: {}", name);
            }
        }
        Ok(removed)
    }
}
