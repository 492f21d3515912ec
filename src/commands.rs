use serde::{Deserialize, Serialize};
use serde_yaml::Mapping;
use std::fmt::{Display, Formatter};

use crate::{
    batch::{BatchOutcome, Mutation, MutationPreview},
    daily,
    error::VaultError,
    graph::LinkGraph,
    paths,
    related::RelatedNote,
    snapshot::{SnapshotId, SnapshotInfo},
    store::{Note, NoteMeta, NoteStore, TagCount, VaultStats},
    vault::Vault,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppendRequest {
    pub path: String,
    pub content: String,
}

/// Command interface between a tool-dispatch layer and a [Vault].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Op {
    /// Resolved forward links of a note
    Outgoing { path: String },
    /// Notes linking to a note, scanning at most `scan_limit` notes
    Backlinks {
        path: String,
        scan_limit: Option<usize>,
    },
    Orphans,
    Graph { max_notes: usize },
    Related { path: String, limit: usize },
    CreateBatchBackup { paths: Vec<String> },
    RestoreBatchBackup { snapshot_id: String },
    ListBatchBackups { limit: usize },
    /// Remove snapshots older than `max_age_days` (configured retention when absent)
    CleanupBatchBackups { max_age_days: Option<u32> },
    /// Apply a batch of mutations. `dry_run` previews; otherwise `confirm` must be set.
    BatchUpdate {
        mutations: Vec<Mutation>,
        dry_run: bool,
        confirm: bool,
    },
    BatchAppend {
        appends: Vec<AppendRequest>,
        confirm: bool,
    },
    ListNotes {
        folder: String,
        recursive: bool,
        limit: Option<usize>,
        include_tags: bool,
    },
    Stats,
    /// Tags with usage counts, most used first
    ListTags { limit: usize },
    /// Merge fields into a note's frontmatter
    UpdateFrontmatter { path: String, updates: Mapping },
    /// Daily note for `date` (`YYYY-MM-DD`, today when absent)
    DailyNote {
        date: Option<String>,
        folder: String,
        create: bool,
    },
    ListDailyNotes { folder: String, limit: usize },
    ListTemplates { folder: String },
    CreateFromTemplate {
        template_path: String,
        new_path: String,
        title: Option<String>,
    },
}

impl Display for Op {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            Op::Outgoing { path } => write!(f, "Outgoing({path})"),
            Op::Backlinks { path, scan_limit } => match scan_limit {
                Some(limit) => write!(f, "Backlinks({path}, scan_limit: {limit})"),
                None => write!(f, "Backlinks({path})"),
            },
            Op::Orphans => write!(f, "Orphans"),
            Op::Graph { max_notes } => write!(f, "Graph(max_notes: {max_notes})"),
            Op::Related { path, limit } => write!(f, "Related({path}, limit: {limit})"),
            Op::CreateBatchBackup { paths } => {
                write!(f, "CreateBatchBackup({})", paths.join(", "))
            }
            Op::RestoreBatchBackup { snapshot_id } => {
                write!(f, "RestoreBatchBackup({snapshot_id})")
            }
            Op::ListBatchBackups { limit } => write!(f, "ListBatchBackups(limit: {limit})"),
            Op::CleanupBatchBackups { max_age_days } => match max_age_days {
                Some(days) => write!(f, "CleanupBatchBackups({days} days)"),
                None => write!(f, "CleanupBatchBackups"),
            },
            Op::BatchUpdate {
                mutations,
                dry_run,
                confirm,
            } => write!(
                f,
                "BatchUpdate([{}], dry_run: {dry_run}, confirm: {confirm})",
                mutations
                    .iter()
                    .map(|m| m.to_string())
                    .collect::<Vec<String>>()
                    .join(", ")
            ),
            Op::BatchAppend { appends, confirm } => write!(
                f,
                "BatchAppend([{}], confirm: {confirm})",
                appends
                    .iter()
                    .map(|a| a.path.clone())
                    .collect::<Vec<String>>()
                    .join(", ")
            ),
            Op::ListNotes { folder, .. } => write!(f, "ListNotes({folder})"),
            Op::Stats => write!(f, "Stats"),
            Op::ListTags { limit } => write!(f, "ListTags(limit: {limit})"),
            Op::UpdateFrontmatter { path, .. } => write!(f, "UpdateFrontmatter({path})"),
            Op::DailyNote { date, folder, .. } => match date {
                Some(date) => write!(f, "DailyNote({folder}, {date})"),
                None => write!(f, "DailyNote({folder})"),
            },
            Op::ListDailyNotes { folder, limit } => {
                write!(f, "ListDailyNotes({folder}, limit: {limit})")
            }
            Op::ListTemplates { folder } => write!(f, "ListTemplates({folder})"),
            Op::CreateFromTemplate {
                template_path,
                new_path,
                ..
            } => write!(f, "CreateFromTemplate({template_path} -> {new_path})"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum OpResult {
    Paths(Vec<String>),
    Graph(LinkGraph),
    Related(Vec<RelatedNote>),
    SnapshotCreated(SnapshotId),
    Restored(Vec<String>),
    Snapshots(Vec<SnapshotInfo>),
    Removed(usize),
    Preview(Vec<MutationPreview>),
    Batch(BatchOutcome),
    Notes(Vec<NoteMeta>),
    Stats(VaultStats),
    Tags(Vec<TagCount>),
    Note(Note),
    /// Path of a note that was written
    Written(String),
}

impl Display for OpResult {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            OpResult::Paths(v) => write!(f, "Paths({})", v.join(", ")),
            OpResult::Graph(g) => write!(
                f,
                "Graph({} nodes, {} edges)",
                g.total_nodes, g.total_edges
            ),
            OpResult::Related(v) => write!(
                f,
                "Related({})",
                v.iter()
                    .map(|r| format!("{} ({:.1})", r.path, r.score))
                    .collect::<Vec<String>>()
                    .join(", ")
            ),
            OpResult::SnapshotCreated(id) => write!(f, "SnapshotCreated({id})"),
            OpResult::Restored(v) => write!(f, "Restored({} notes)", v.len()),
            OpResult::Snapshots(v) => write!(
                f,
                "Snapshots({})",
                v.iter()
                    .map(|s| s.id.clone())
                    .collect::<Vec<String>>()
                    .join(", ")
            ),
            OpResult::Removed(n) => write!(f, "Removed({n})"),
            OpResult::Preview(v) => write!(f, "Preview({} mutations)", v.len()),
            OpResult::Batch(outcome) => write!(
                f,
                "Batch({}, {} applied, snapshot {})",
                outcome.state,
                outcome.applied.len(),
                outcome.snapshot_id
            ),
            OpResult::Notes(v) => write!(f, "Notes({})", v.len()),
            OpResult::Stats(s) => write!(
                f,
                "Stats({} notes, {} tags, {} bytes)",
                s.total_notes, s.total_tags, s.total_size_bytes
            ),
            OpResult::Tags(v) => write!(f, "Tags({})", v.len()),
            OpResult::Note(note) => write!(f, "Note({})", note.path),
            OpResult::Written(path) => write!(f, "Written({path})"),
        }
    }
}

/// Run a single [Op] against `vault`.
pub async fn dispatch<S: NoteStore>(vault: &Vault<S>, op: Op) -> Result<OpResult, VaultError> {
    tracing::debug!("dispatch {}", op);
    let result = match op {
        Op::Outgoing { path } => OpResult::Paths(vault.outgoing(&path)?),
        Op::Backlinks { path, scan_limit } => OpResult::Paths(vault.backlinks(&path, scan_limit)?),
        Op::Orphans => OpResult::Paths(vault.orphans()?),
        Op::Graph { max_notes } => OpResult::Graph(vault.graph(max_notes)?),
        Op::Related { path, limit } => OpResult::Related(vault.related(&path, limit)?),
        Op::CreateBatchBackup { paths } => {
            OpResult::SnapshotCreated(vault.create_batch_backup(&paths).await?)
        }
        Op::RestoreBatchBackup { snapshot_id } => {
            OpResult::Restored(vault.restore_batch_backup(&snapshot_id).await?)
        }
        Op::ListBatchBackups { limit } => OpResult::Snapshots(vault.list_batch_backups(limit)?),
        Op::CleanupBatchBackups { max_age_days } => {
            OpResult::Removed(vault.cleanup_batch_backups(max_age_days)?)
        }
        Op::BatchUpdate {
            mutations,
            dry_run,
            confirm,
        } => {
            if dry_run {
                OpResult::Preview(vault.preview_batch(&mutations)?)
            } else {
                vault.batches().validate(&mutations)?;
                require_confirmation(confirm, mutations.len(), "update")?;
                OpResult::Batch(vault.execute_batch(&mutations).await?)
            }
        }
        Op::BatchAppend { appends, confirm } => {
            let mutations = appends
                .into_iter()
                .map(|a| Mutation::Append {
                    path: a.path,
                    content: a.content,
                })
                .collect::<Vec<Mutation>>();
            vault.batches().validate(&mutations)?;
            require_confirmation(confirm, mutations.len(), "append")?;
            OpResult::Batch(vault.execute_batch(&mutations).await?)
        }
        Op::ListNotes {
            folder,
            recursive,
            limit,
            include_tags,
        } => OpResult::Notes(vault.list_notes(&folder, recursive, limit, include_tags)?),
        Op::Stats => OpResult::Stats(vault.stats()?),
        Op::ListTags { limit } => OpResult::Tags(vault.list_tags(limit)?),
        Op::UpdateFrontmatter { path, updates } => {
            vault.update_frontmatter(&path, &updates)?;
            OpResult::Written(paths::normalize(&path)?)
        }
        Op::DailyNote {
            date,
            folder,
            create,
        } => {
            let date = date.as_deref().map(daily::parse_date).transpose()?;
            OpResult::Note(vault.daily_note(date, &folder, create)?)
        }
        Op::ListDailyNotes { folder, limit } => {
            OpResult::Notes(vault.list_daily_notes(&folder, limit)?)
        }
        Op::ListTemplates { folder } => OpResult::Notes(vault.list_templates(&folder)?),
        Op::CreateFromTemplate {
            template_path,
            new_path,
            title,
        } => {
            vault.create_from_template(&template_path, &new_path, title.as_deref())?;
            OpResult::Written(paths::normalize(&new_path)?)
        }
    };
    tracing::debug!("dispatch result {}", result);
    Ok(result)
}

fn require_confirmation(confirm: bool, count: usize, action: &str) -> Result<(), VaultError> {
    if confirm {
        Ok(())
    } else {
        Err(VaultError::InvalidBatch(format!(
            "batch {action} of {count} notes requires explicit confirmation; set confirm to proceed"
        )))
    }
}
