//! Sandboxed single-note primitives over the vault directory.
//!
//! [NoteStore] is the seam between the graph/batch machinery and the filesystem. The required
//! methods are the raw primitives; everything else (frontmatter-aware create/update, append,
//! listings, stats) is provided on top of them, so a wrapper that intercepts `write_raw` sees
//! every write the crate performs on notes.
use serde::{Deserialize, Serialize};
use serde_yaml::Mapping;
use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    time::UNIX_EPOCH,
};
use walkdir::{DirEntry, WalkDir};

use crate::{config::VaultConfig, error::VaultError, frontmatter, paths};

/// Metadata about a single note, as produced by corpus enumeration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteMeta {
    pub path: String,
    pub name: String,
    pub extension: String,
    pub size: u64,
    /// Modification time in milliseconds since the Unix epoch.
    pub modified: i64,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    pub path: String,
    pub content: String,
    pub frontmatter: Option<Mapping>,
}

impl Note {
    pub fn body(&self) -> &str {
        frontmatter::body(&self.content)
    }

    pub fn tags(&self) -> Vec<String> {
        frontmatter::extract_tags(&self.content, self.frontmatter.as_ref())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagCount {
    pub tag: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultStats {
    pub total_notes: usize,
    pub total_tags: usize,
    pub total_size_bytes: u64,
    pub unique_tags: Vec<String>,
}

pub trait NoteStore: Send + Sync {
    fn config(&self) -> &VaultConfig;

    /// Map a vault-relative path onto the filesystem, refusing anything outside the vault.
    fn resolve(&self, rel: &str) -> Result<PathBuf, VaultError>;

    fn read_raw(&self, rel: &str) -> Result<String, VaultError>;

    /// Write the full text of a note, creating missing parent folders.
    fn write_raw(&self, rel: &str, content: &str) -> Result<(), VaultError>;

    /// Remove a note. With `use_trash` the file is moved into the trash directory and its new
    /// vault-relative path is returned.
    fn delete(&self, rel: &str, use_trash: bool) -> Result<Option<String>, VaultError>;

    /// Every note in the corpus, in corpus enumeration order. Tags are not populated.
    fn enumerate(&self) -> Result<Vec<NoteMeta>, VaultError>;

    fn root(&self) -> &Path {
        &self.config().vault_path
    }

    fn exists(&self, rel: &str) -> bool {
        self.resolve(rel).map(|p| p.is_file()).unwrap_or(false)
    }

    fn read(&self, rel: &str) -> Result<Note, VaultError> {
        let path = paths::normalize(rel)?;
        let content = self.read_raw(&path)?;
        let frontmatter = frontmatter::parse(&content);
        Ok(Note {
            path,
            content,
            frontmatter,
        })
    }

    fn create(
        &self,
        rel: &str,
        content: &str,
        frontmatter: Option<&Mapping>,
        overwrite: bool,
    ) -> Result<(), VaultError> {
        let path = paths::normalize(rel)?;
        if !overwrite && self.exists(&path) {
            return Err(VaultError::AlreadyExists(path));
        }
        let full = match frontmatter {
            Some(fm) => frontmatter::render(fm, content)?,
            None => content.to_string(),
        };
        self.write_raw(&path, &full)?;
        tracing::info!("Created note: {}", path);
        Ok(())
    }

    /// Replace the body of an existing note. Without new frontmatter the existing block is kept
    /// exactly as written.
    fn update(
        &self,
        rel: &str,
        content: &str,
        frontmatter: Option<&Mapping>,
    ) -> Result<(), VaultError> {
        let path = paths::normalize(rel)?;
        if !self.exists(&path) {
            return Err(VaultError::NotFound(format!("Note not found: {path}")));
        }
        let full = match frontmatter {
            Some(fm) => frontmatter::render(fm, content)?,
            None => {
                let existing = self.read_raw(&path)?;
                match frontmatter::split(&existing).0 {
                    Some(yaml) => format!("---\n{yaml}---\n{content}"),
                    None => content.to_string(),
                }
            }
        };
        self.write_raw(&path, &full)?;
        tracing::info!("Updated note: {}", path);
        Ok(())
    }

    /// Merge `updates` into the note's frontmatter, adding a block if there is none. The body is
    /// kept as written.
    fn update_frontmatter(&self, rel: &str, updates: &Mapping) -> Result<(), VaultError> {
        let note = self.read(rel)?;
        let mut merged = note.frontmatter.clone().unwrap_or_default();
        for (key, value) in updates {
            merged.insert(key.clone(), value.clone());
        }
        let full = frontmatter::render(&merged, note.body())?;
        self.write_raw(&note.path, &full)?;
        tracing::info!("Updated frontmatter of note: {}", note.path);
        Ok(())
    }

    fn append(&self, rel: &str, content: &str) -> Result<(), VaultError> {
        let path = paths::normalize(rel)?;
        if !self.exists(&path) {
            return Err(VaultError::NotFound(format!("Note not found: {path}")));
        }
        let mut existing = self.read_raw(&path)?;
        if !existing.ends_with('\n') {
            existing.push('\n');
        }
        existing.push_str(content);
        self.write_raw(&path, &existing)?;
        tracing::info!("Appended to note: {}", path);
        Ok(())
    }

    /// Notes under `folder`, newest first.
    fn list_notes(
        &self,
        folder: &str,
        recursive: bool,
        limit: Option<usize>,
        include_tags: bool,
    ) -> Result<Vec<NoteMeta>, VaultError> {
        let folder = paths::normalize(folder)?;
        let max_count = limit.unwrap_or(self.config().max_results);
        let mut notes = self
            .enumerate()?
            .into_iter()
            .filter(|meta| {
                let parent = paths::parent(&meta.path);
                if recursive {
                    folder.is_empty()
                        || parent == folder
                        || parent.starts_with(&format!("{folder}/"))
                } else {
                    parent == folder
                }
            })
            .take(max_count)
            .collect::<Vec<NoteMeta>>();
        if include_tags {
            for meta in notes.iter_mut() {
                match self.read(&meta.path) {
                    Ok(note) => meta.tags = note.tags(),
                    Err(e) => tracing::debug!("Failed to extract tags from {}: {e}", meta.path),
                }
            }
        }
        notes.sort_by(|a, b| b.modified.cmp(&a.modified));
        Ok(notes)
    }

    /// Tag usage counts across the corpus.
    fn tag_counts(&self) -> Result<BTreeMap<String, usize>, VaultError> {
        let mut counts = BTreeMap::new();
        for meta in self.enumerate()? {
            match self.read(&meta.path) {
                Ok(note) => {
                    for tag in note.tags() {
                        *counts.entry(tag).or_insert(0) += 1;
                    }
                }
                Err(e) => tracing::debug!("Skipping {} while counting tags: {e}", meta.path),
            }
        }
        Ok(counts)
    }

    /// Tags with their note counts, most used first. Equal counts are ordered by tag.
    fn tags_by_usage(&self, limit: usize) -> Result<Vec<TagCount>, VaultError> {
        let mut tags = self
            .tag_counts()?
            .into_iter()
            .map(|(tag, count)| TagCount { tag, count })
            .collect::<Vec<TagCount>>();
        tags.sort_by(|a, b| b.count.cmp(&a.count));
        tags.truncate(limit);
        Ok(tags)
    }

    fn stats(&self) -> Result<VaultStats, VaultError> {
        let notes = self.enumerate()?;
        let tags = self.tag_counts()?;
        Ok(VaultStats {
            total_notes: notes.len(),
            total_tags: tags.len(),
            total_size_bytes: notes.iter().map(|n| n.size).sum(),
            unique_tags: tags.into_keys().collect(),
        })
    }
}

/// [NoteStore] over a real directory.
#[derive(Debug, Clone)]
pub struct FsNoteStore {
    config: VaultConfig,
}

impl FsNoteStore {
    pub fn new(config: VaultConfig) -> Result<Self, VaultError> {
        Ok(FsNoteStore {
            config: config.prepare()?,
        })
    }

    fn is_excluded(&self, rel: &str) -> bool {
        if rel.is_empty() {
            return false;
        }
        let reserved = |dir: &str| rel == dir || rel.starts_with(&format!("{dir}/"));
        reserved(&self.config.snapshot_dir)
            || reserved(&self.config.trash_dir)
            || rel
                .split('/')
                .any(|part| self.config.exclude_folders.iter().any(|ex| ex == part))
    }

    fn relative(&self, path: &Path) -> Result<String, VaultError> {
        Ok(paths::os_path_to_string(path.strip_prefix(self.root())?))
    }

    /// Where `normalized` lives on disk. The NFC spelling is used unless only the decomposed
    /// spelling exists.
    fn on_disk(&self, normalized: &str) -> PathBuf {
        let composed = self.root().join(paths::string_to_os_path(normalized));
        if composed.exists() || normalized.is_ascii() {
            return composed;
        }
        let decomposed = self
            .root()
            .join(paths::string_to_os_path(&paths::decomposed(normalized)));
        if decomposed.exists() {
            decomposed
        } else {
            composed
        }
    }

    fn meta_for(&self, entry: &DirEntry) -> Result<NoteMeta, VaultError> {
        let path = paths::normalize(&self.relative(entry.path())?)?;
        let metadata = entry.metadata()?;
        let modified = metadata
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_millis() as i64)
            .unwrap_or_default();
        Ok(NoteMeta {
            name: paths::stem(&path).to_string(),
            extension: paths::extension(&path).unwrap_or_default().to_string(),
            size: metadata.len(),
            modified,
            tags: Vec::new(),
            path,
        })
    }
}

impl NoteStore for FsNoteStore {
    fn config(&self) -> &VaultConfig {
        &self.config
    }

    fn resolve(&self, rel: &str) -> Result<PathBuf, VaultError> {
        let normalized = paths::normalize(rel)?;
        let full = self.on_disk(&normalized);
        // The deepest existing ancestor must still live under the root once symlinks resolve.
        let mut probe = Some(full.as_path());
        while let Some(candidate) = probe {
            if let Ok(real) = std::fs::canonicalize(candidate) {
                if !real.starts_with(self.root()) {
                    return Err(VaultError::SecurityViolation(format!(
                        "{normalized} resolves outside the vault"
                    )));
                }
                break;
            }
            probe = candidate.parent();
        }
        Ok(full)
    }

    fn read_raw(&self, rel: &str) -> Result<String, VaultError> {
        let full = self.resolve(rel)?;
        if !full.is_file() {
            return Err(VaultError::NotFound(format!("Note not found: {rel}")));
        }
        Ok(std::fs::read_to_string(full)?)
    }

    fn write_raw(&self, rel: &str, content: &str) -> Result<(), VaultError> {
        let full = self.resolve(rel)?;
        if let Some(parent) = full.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(full, content)?;
        Ok(())
    }

    fn delete(&self, rel: &str, use_trash: bool) -> Result<Option<String>, VaultError> {
        let path = paths::normalize(rel)?;
        let full = self.resolve(&path)?;
        if !full.is_file() {
            return Err(VaultError::NotFound(format!("Note not found: {path}")));
        }
        if !use_trash {
            std::fs::remove_file(&full)?;
            tracing::info!("Deleted note: {}", path);
            return Ok(None);
        }
        let trash_dir = self.resolve(&self.config.trash_dir)?;
        std::fs::create_dir_all(&trash_dir)?;
        let name = paths::file_name(&path);
        let mut trash_name = name.to_string();
        let mut counter = 1;
        while trash_dir.join(&trash_name).exists() {
            trash_name = match paths::extension(name) {
                Some(ext) => format!("{}.{counter}.{ext}", paths::stem(name)),
                None => format!("{name}.{counter}"),
            };
            counter += 1;
        }
        std::fs::rename(&full, trash_dir.join(&trash_name))?;
        let trashed = paths::join(&paths::normalize(&self.config.trash_dir)?, &trash_name);
        tracing::info!("Moved to trash: {} -> {}", path, trashed);
        Ok(Some(trashed))
    }

    fn enumerate(&self) -> Result<Vec<NoteMeta>, VaultError> {
        let root = self.root().to_path_buf();
        let mut notes = Vec::new();
        let walker = WalkDir::new(&root)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| {
                e.depth() == 0
                    || self
                        .relative(e.path())
                        .map(|rel| !self.is_excluded(&rel))
                        .unwrap_or(false)
            });
        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::debug!("Skipping unreadable vault entry: {e}");
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let Some(name) = entry.file_name().to_str() else {
                continue;
            };
            if !paths::has_extension(name, &self.config.file_extensions) {
                continue;
            }
            match self.meta_for(&entry) {
                Ok(meta) => notes.push(meta),
                Err(e) => tracing::debug!("Skipping {:?}: {e}", entry.path()),
            }
            if notes.len() >= self.config.enumeration_limit {
                tracing::warn!(
                    "Corpus enumeration reached the configured limit of {} notes",
                    self.config.enumeration_limit
                );
                break;
            }
        }
        Ok(notes)
    }
}

