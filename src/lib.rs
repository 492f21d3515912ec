//! # notegraph
//!
//! Link-graph queries and snapshot-backed batch edits over a directory of interlinked markdown
//! notes (an Obsidian-style vault).
//!
//! ## Overview
//!
//! notegraph keeps no index. Every query walks the vault, reads the notes it needs, and derives
//! its answer from what is on disk at that moment:
//!
//! - **Links**: `[[Target#Heading|Alias]]` wikilinks are extracted from each note and resolved to
//!   a note path, first as a vault-relative path, then relative to the linking note's folder,
//!   then by name anywhere in the vault. Unresolvable links are not errors.
//! - **Graph**: outgoing links, backlinks, orphans and a whole-vault node/edge graph.
//! - **Related notes**: a score over shared links, shared tags and direct links in either
//!   direction.
//! - **Snapshots and batches**: before a group of edits runs, every note it touches is copied to
//!   `.batch_backups/<timestamp>/`. If any edit fails, the copies are written back.
//!
//! ## Architecture
//!
//! - **[`store`]**: the [`store::NoteStore`] trait and its filesystem implementation
//! - **[`links`]**: wikilink extraction and resolution
//! - **[`graph`]**: forward/backward adjacency, orphans, link graph
//! - **[`related`]**: similarity ranking
//! - **[`snapshot`]**: snapshot capture, restore, listing and retention
//! - **[`batch`]**: the batch mutation engine
//! - **[`daily`]**, **[`template`]**: date-named daily notes and `{{placeholder}}` templates
//! - **[`vault`]**: the [`Vault`] facade tying these together
//! - **[`commands`]**: the [`commands::Op`] / [`commands::OpResult`] command interface
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use notegraph::{batch::Mutation, Vault, VaultConfig};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let vault = Vault::open(VaultConfig::new("./notes"))?;
//!
//!     for path in vault.backlinks("Projects/Alpha.md", Some(500))? {
//!         println!("linked from {path}");
//!     }
//!
//!     let outcome = vault
//!         .execute_batch(&[
//!             Mutation::Append {
//!                 path: "Projects/Alpha.md".to_string(),
//!                 content: "- reviewed".to_string(),
//!             },
//!             Mutation::Append {
//!                 path: "Projects/Beta.md".to_string(),
//!                 content: "- reviewed".to_string(),
//!             },
//!         ])
//!         .await?;
//!     println!("committed under snapshot {}", outcome.snapshot_id);
//!     Ok(())
//! }
//! ```
//!
//! ## Consistency
//!
//! Read queries take no locks. A query that runs while a batch is writing can see some notes
//! before the batch and some after it. Two batches touching the same notes at the same time race,
//! and the later write wins. Rollback only restores notes that existed when the snapshot was
//! taken: notes created by a failed batch are left in place.
pub mod batch;
pub mod commands;
pub mod config;
pub mod daily;
pub mod error;
pub mod frontmatter;
pub mod graph;
pub mod links;
pub mod paths;
pub mod related;
pub mod snapshot;
pub mod store;
pub mod template;
#[cfg(test)]
mod tests;
pub mod vault;

pub use config::VaultConfig;
pub use error::*;
pub use store::{FsNoteStore, NoteStore};
pub use vault::Vault;
