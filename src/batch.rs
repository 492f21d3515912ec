//! Grouped note edits with snapshot rollback.
//!
//! A batch runs `Requested -> Snapshotting -> Applying -> {Committed | RolledBack}`. Every path a
//! mutation touches, except the targets of [Mutation::Create], is captured before the first write.
//! All mutations are attempted; if any of them fails, the snapshot is restored and the caller gets
//! a [VaultError::BatchPartialFailure] naming every failed path. Rollback restores captured paths
//! only, so a note created by the batch survives a rollback, and a note removed by
//! [Mutation::Delete] reappears while its trashed copy stays in the trash. The snapshot itself is
//! kept in either case.
use serde::{Deserialize, Serialize};
use serde_yaml::Mapping;
use std::{collections::BTreeSet, fmt};

use crate::{
    error::{PathFailure, VaultError},
    paths,
    snapshot::{SnapshotId, SnapshotManager},
    store::NoteStore,
};

pub const PREVIEW_CHARS: usize = 100;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Mutation {
    /// Replace the body. Existing frontmatter is kept unless `frontmatter` is given.
    Update {
        path: String,
        content: String,
        #[serde(default)]
        frontmatter: Option<Mapping>,
    },
    Append {
        path: String,
        content: String,
    },
    /// Merge fields into the frontmatter block; the body is untouched.
    UpdateFrontmatter {
        path: String,
        updates: Mapping,
    },
    /// Create a note that does not exist yet.
    Create {
        path: String,
        content: String,
        #[serde(default)]
        frontmatter: Option<Mapping>,
    },
    /// Move to the trash, or remove outright when `permanent`.
    Delete {
        path: String,
        #[serde(default)]
        permanent: bool,
    },
}

impl Mutation {
    pub fn path(&self) -> &str {
        match self {
            Mutation::Update { path, .. }
            | Mutation::Append { path, .. }
            | Mutation::UpdateFrontmatter { path, .. }
            | Mutation::Create { path, .. }
            | Mutation::Delete { path, .. } => path,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Mutation::Update { .. } => "update",
            Mutation::Append { .. } => "append",
            Mutation::UpdateFrontmatter { .. } => "update_frontmatter",
            Mutation::Create { .. } => "create",
            Mutation::Delete { .. } => "delete",
        }
    }

    /// Whether the target existed before the batch and therefore belongs in the snapshot.
    pub fn captures_original(&self) -> bool {
        !matches!(self, Mutation::Create { .. })
    }

    fn preview_text(&self) -> String {
        match self {
            Mutation::Update { content, .. }
            | Mutation::Append { content, .. }
            | Mutation::Create { content, .. } => content.chars().take(PREVIEW_CHARS).collect(),
            Mutation::UpdateFrontmatter { updates, .. } => updates
                .keys()
                .filter_map(|key| key.as_str())
                .collect::<Vec<&str>>()
                .join(", "),
            Mutation::Delete { .. } => String::new(),
        }
    }
}

impl fmt::Display for Mutation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.kind(), self.path())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchState {
    Requested,
    Snapshotting,
    Applying,
    Committed,
    RolledBack,
}

impl fmt::Display for BatchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BatchState::Requested => "REQUESTED",
            BatchState::Snapshotting => "SNAPSHOTTING",
            BatchState::Applying => "APPLYING",
            BatchState::Committed => "COMMITTED",
            BatchState::RolledBack => "ROLLED_BACK",
        };
        write!(f, "{name}")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplyReport {
    pub succeeded: Vec<String>,
    pub failed: Vec<PathFailure>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchOutcome {
    pub snapshot_id: SnapshotId,
    pub state: BatchState,
    pub applied: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutationPreview {
    pub path: String,
    pub kind: String,
    pub exists: bool,
    /// First characters of the new content.
    pub preview: String,
}

pub struct BatchEngine<'s, S: NoteStore + ?Sized> {
    store: &'s S,
}

impl<'s, S: NoteStore + ?Sized> BatchEngine<'s, S> {
    pub fn new(store: &'s S) -> Self {
        BatchEngine { store }
    }

    /// Reject empty and oversized requests and requests naming a path twice.
    pub fn validate(&self, mutations: &[Mutation]) -> Result<(), VaultError> {
        if mutations.is_empty() {
            return Err(VaultError::InvalidBatch(
                "a batch needs at least one mutation".to_string(),
            ));
        }
        let max = self.store.config().max_batch_size;
        if mutations.len() > max {
            return Err(VaultError::InvalidBatch(format!(
                "batch of {} mutations exceeds the limit of {max}",
                mutations.len()
            )));
        }
        let mut seen = BTreeSet::new();
        for mutation in mutations {
            let path = paths::normalize(mutation.path())?;
            if path.is_empty() {
                return Err(VaultError::InvalidBatch(
                    "mutation without a note path".to_string(),
                ));
            }
            if !seen.insert(path.clone()) {
                return Err(VaultError::InvalidBatch(format!(
                    "{path} appears more than once in the batch"
                )));
            }
        }
        Ok(())
    }

    /// What a batch would do, without touching the vault.
    pub fn preview(&self, mutations: &[Mutation]) -> Result<Vec<MutationPreview>, VaultError> {
        self.validate(mutations)?;
        mutations
            .iter()
            .map(|mutation| {
                let path = paths::normalize(mutation.path())?;
                Ok(MutationPreview {
                    exists: self.store.exists(&path),
                    kind: mutation.kind().to_string(),
                    preview: mutation.preview_text(),
                    path,
                })
            })
            .collect()
    }

    fn apply_one(&self, mutation: &Mutation) -> Result<(), VaultError> {
        match mutation {
            Mutation::Update {
                path,
                content,
                frontmatter,
            } => self.store.update(path, content, frontmatter.as_ref()),
            Mutation::Append { path, content } => self.store.append(path, content),
            Mutation::UpdateFrontmatter { path, updates } => {
                self.store.update_frontmatter(path, updates)
            }
            Mutation::Create {
                path,
                content,
                frontmatter,
            } => self.store.create(path, content, frontmatter.as_ref(), false),
            Mutation::Delete { path, permanent } => {
                self.store.delete(path, !permanent).map(|_| ())
            }
        }
    }

    /// Attempt every mutation in order, collecting failures instead of stopping at the first.
    /// The snapshot must already exist.
    pub fn apply(
        &self,
        snapshot_id: &SnapshotId,
        mutations: &[Mutation],
    ) -> Result<ApplyReport, VaultError> {
        let snapshot_dir = SnapshotManager::new(self.store).snapshot_path(snapshot_id)?;
        if !snapshot_dir.is_dir() {
            return Err(VaultError::NotFound(format!(
                "Snapshot not found: {snapshot_id}"
            )));
        }
        let mut report = ApplyReport::default();
        for mutation in mutations {
            match self.apply_one(mutation) {
                Ok(()) => {
                    tracing::debug!("Applied {}", mutation);
                    report.succeeded.push(mutation.path().to_string());
                }
                Err(e) => {
                    tracing::warn!("Failed to apply {}: {e}", mutation);
                    report
                        .failed
                        .push(PathFailure::new(mutation.path(), e));
                }
            }
        }
        Ok(report)
    }

    /// Snapshot, apply, and either commit or roll back.
    #[tracing::instrument(skip(self, mutations), fields(count = mutations.len()))]
    pub async fn execute(&self, mutations: &[Mutation]) -> Result<BatchOutcome, VaultError> {
        let mut state = BatchState::Requested;
        self.validate(mutations)?;

        let captured = mutations
            .iter()
            .filter(|mutation| mutation.captures_original())
            .map(|mutation| mutation.path().to_string())
            .collect::<Vec<String>>();
        transition(&mut state, BatchState::Snapshotting);
        let snapshots = SnapshotManager::new(self.store);
        let snapshot_id = snapshots.create_snapshot(&captured).await?;

        transition(&mut state, BatchState::Applying);
        let report = self.apply(&snapshot_id, mutations)?;

        if report.failed.is_empty() {
            transition(&mut state, BatchState::Committed);
            tracing::info!(
                "Batch committed: {} mutations, snapshot {}",
                report.succeeded.len(),
                snapshot_id
            );
            return Ok(BatchOutcome {
                snapshot_id,
                state,
                applied: report.succeeded,
            });
        }

        tracing::warn!(
            "{} of {} mutations failed; restoring snapshot {}",
            report.failed.len(),
            mutations.len(),
            snapshot_id
        );
        let (restored, rollback_failed) = match snapshots.restore(snapshot_id.as_str()).await {
            Ok(restored) => (restored, Vec::new()),
            Err(VaultError::RestoreIncomplete {
                restored, failed, ..
            }) => (restored, failed),
            Err(e) => (Vec::new(), vec![PathFailure::new(snapshot_id.to_string(), e)]),
        };
        transition(&mut state, BatchState::RolledBack);
        Err(VaultError::BatchPartialFailure {
            snapshot_id: snapshot_id.to_string(),
            failed: report.failed,
            restored,
            rollback_failed,
        })
    }
}

fn transition(state: &mut BatchState, next: BatchState) {
    tracing::debug!("batch {} -> {}", state, next);
    *state = next;
}
