use chrono::{Local, NaiveDate};
use serde_yaml::Mapping;

use crate::{
    batch::{BatchEngine, BatchOutcome, Mutation, MutationPreview},
    config::{VaultConfig, VaultConfigProvider},
    daily,
    error::VaultError,
    graph::{GraphIndex, LinkGraph},
    related::{RelatedNote, SimilarityRanker},
    snapshot::{SnapshotId, SnapshotInfo, SnapshotManager},
    store::{FsNoteStore, Note, NoteMeta, NoteStore, TagCount, VaultStats},
    template,
};

/// A note store together with the graph, ranking, snapshot and batch machinery built on it.
///
/// The read queries are synchronous; snapshot capture/restore and batches are async because
/// they fan file copies out over the tokio runtime.
#[derive(Debug, Clone)]
pub struct Vault<S: NoteStore = FsNoteStore> {
    store: S,
}

impl Vault<FsNoteStore> {
    pub fn open(config: VaultConfig) -> Result<Self, VaultError> {
        Ok(Vault {
            store: FsNoteStore::new(config)?,
        })
    }

    pub fn from_provider(provider: &dyn VaultConfigProvider) -> Result<Self, VaultError> {
        Vault::open(provider.load()?)
    }
}

impl<S: NoteStore> Vault<S> {
    pub fn with_store(store: S) -> Self {
        Vault { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &VaultConfig {
        self.store.config()
    }

    pub fn graph_index(&self) -> GraphIndex<'_, S> {
        GraphIndex::new(&self.store)
    }

    pub fn ranker(&self) -> SimilarityRanker<'_, S> {
        SimilarityRanker::new(&self.store)
    }

    pub fn snapshots(&self) -> SnapshotManager<'_, S> {
        SnapshotManager::new(&self.store)
    }

    pub fn batches(&self) -> BatchEngine<'_, S> {
        BatchEngine::new(&self.store)
    }

    pub fn read_note(&self, path: &str) -> Result<Note, VaultError> {
        self.store.read(path)
    }

    pub fn list_notes(
        &self,
        folder: &str,
        recursive: bool,
        limit: Option<usize>,
        include_tags: bool,
    ) -> Result<Vec<NoteMeta>, VaultError> {
        self.store.list_notes(folder, recursive, limit, include_tags)
    }

    pub fn stats(&self) -> Result<VaultStats, VaultError> {
        self.store.stats()
    }

    /// Tags with their note counts, most used first.
    pub fn list_tags(&self, limit: usize) -> Result<Vec<TagCount>, VaultError> {
        self.store.tags_by_usage(limit)
    }

    pub fn update_frontmatter(&self, path: &str, updates: &Mapping) -> Result<(), VaultError> {
        self.store.update_frontmatter(path, updates)
    }

    /// The daily note for `date` (today when `None`), created on demand when `create` is set.
    pub fn daily_note(
        &self,
        date: Option<NaiveDate>,
        folder: &str,
        create: bool,
    ) -> Result<Note, VaultError> {
        daily::get_daily_note(&self.store, date.unwrap_or_else(daily::today), folder, create)
    }

    pub fn list_daily_notes(
        &self,
        folder: &str,
        limit: usize,
    ) -> Result<Vec<NoteMeta>, VaultError> {
        daily::list_daily_notes(&self.store, folder, limit, daily::today())
    }

    pub fn list_templates(&self, folder: &str) -> Result<Vec<NoteMeta>, VaultError> {
        template::list_templates(&self.store, folder)
    }

    /// Create `new_path` from a template, filling `{{date}}`, `{{time}}`, `{{datetime}}` and
    /// `{{title}}`.
    pub fn create_from_template(
        &self,
        template_path: &str,
        new_path: &str,
        title: Option<&str>,
    ) -> Result<(), VaultError> {
        let replacements = template::standard_replacements(Local::now(), title);
        template::create_from_template(&self.store, template_path, new_path, &replacements)
    }

    pub fn outgoing(&self, path: &str) -> Result<Vec<String>, VaultError> {
        self.graph_index().outgoing(path)
    }

    pub fn backlinks(
        &self,
        path: &str,
        scan_limit: Option<usize>,
    ) -> Result<Vec<String>, VaultError> {
        self.graph_index().backlinks(path, scan_limit)
    }

    pub fn orphans(&self) -> Result<Vec<String>, VaultError> {
        self.graph_index().orphans()
    }

    pub fn graph(&self, max_notes: usize) -> Result<LinkGraph, VaultError> {
        self.graph_index().graph(max_notes)
    }

    pub fn related(&self, path: &str, limit: usize) -> Result<Vec<RelatedNote>, VaultError> {
        self.ranker().related(path, limit)
    }

    pub async fn create_batch_backup(&self, paths: &[String]) -> Result<SnapshotId, VaultError> {
        self.snapshots().create_snapshot(paths).await
    }

    pub async fn restore_batch_backup(&self, snapshot_id: &str) -> Result<Vec<String>, VaultError> {
        self.snapshots().restore(snapshot_id).await
    }

    pub fn list_batch_backups(&self, limit: usize) -> Result<Vec<SnapshotInfo>, VaultError> {
        self.snapshots().list(limit)
    }

    /// Remove snapshots older than `max_age_days`, or the configured retention window.
    pub fn cleanup_batch_backups(&self, max_age_days: Option<u32>) -> Result<usize, VaultError> {
        self.snapshots()
            .cleanup(max_age_days.unwrap_or(self.config().snapshot_retention_days))
    }

    pub fn preview_batch(
        &self,
        mutations: &[Mutation],
    ) -> Result<Vec<MutationPreview>, VaultError> {
        self.batches().preview(mutations)
    }

    pub async fn execute_batch(&self, mutations: &[Mutation]) -> Result<BatchOutcome, VaultError> {
        self.batches().execute(mutations).await
    }
}
