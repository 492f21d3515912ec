//! Batch mutations with snapshot rollback

mod common;

use common::*;
use notegraph::{
    batch::{BatchState, Mutation, PREVIEW_CHARS},
    commands::{dispatch, AppendRequest, Op, OpResult},
    config::VaultConfig,
    Vault, VaultError,
};
use tempfile::TempDir;
use test_log::test;

fn update(path: &str, content: &str) -> Mutation {
    Mutation::Update {
        path: path.to_string(),
        content: content.to_string(),
        frontmatter: None,
    }
}

fn read(vault_path: &std::path::Path, rel: &str) -> String {
    std::fs::read_to_string(vault_path.join(rel)).unwrap()
}

#[test(tokio::test)]
async fn test_failed_write_rolls_back_batch() {
    init_logging();
    let temp_dir = TempDir::new().unwrap();
    let vault_path = create_test_vault(
        &temp_dir,
        &[("A.md", "original A\n"), ("B.md", "original B\n")],
    );
    let original_mtime = std::fs::metadata(vault_path.join("A.md"))
        .unwrap()
        .modified()
        .unwrap();
    let vault = Vault::with_store(FailingStore::new(&vault_path, &["B.md"]));

    let err = vault
        .execute_batch(&[update("A.md", "new A\n"), update("B.md", "new B\n")])
        .await
        .unwrap_err();

    match err {
        VaultError::BatchPartialFailure {
            snapshot_id,
            failed,
            restored,
            rollback_failed,
        } => {
            assert_eq!(failed.len(), 1);
            assert_eq!(failed[0].path, "B.md");
            assert!(failed[0].cause.contains("Permission denied"), "{}", failed[0].cause);
            assert_eq!(restored, strings(&["A.md", "B.md"]));
            assert!(rollback_failed.is_empty());
            // the snapshot stays on disk
            assert!(vault_path.join(".batch_backups").join(&snapshot_id).is_dir());
            let listed = vault.list_batch_backups(10).unwrap();
            assert_eq!(listed.len(), 1);
            assert_eq!(listed[0].id, snapshot_id);
            assert_eq!(listed[0].note_count, 2);
        }
        other => panic!("expected BatchPartialFailure, got {other:?}"),
    }

    assert_eq!(read(&vault_path, "A.md"), "original A\n");
    assert_eq!(read(&vault_path, "B.md"), "original B\n");
    assert_eq!(
        std::fs::metadata(vault_path.join("A.md"))
            .unwrap()
            .modified()
            .unwrap(),
        original_mtime
    );
}

#[test(tokio::test)]
async fn test_successful_batch_commits_every_mutation() {
    let temp_dir = TempDir::new().unwrap();
    let vault_path = create_test_vault(
        &temp_dir,
        &[
            ("A.md", "---\ntitle: A\n---\nold A"),
            ("B.md", "B"),
            ("D.md", "doomed"),
            ("Untouched.md", "same"),
        ],
    );
    let vault = open_vault(&vault_path);

    let outcome = vault
        .execute_batch(&[
            update("A.md", "new A"),
            Mutation::Append {
                path: "B.md".to_string(),
                content: "more B".to_string(),
            },
            Mutation::Create {
                path: "new/C.md".to_string(),
                content: "fresh".to_string(),
                frontmatter: None,
            },
            Mutation::Delete {
                path: "D.md".to_string(),
                permanent: false,
            },
        ])
        .await
        .unwrap();

    assert_eq!(outcome.state, BatchState::Committed);
    assert_eq!(outcome.applied, strings(&["A.md", "B.md", "new/C.md", "D.md"]));
    assert_eq!(read(&vault_path, "A.md"), "---\ntitle: A\n---\nnew A");
    assert_eq!(read(&vault_path, "B.md"), "B\nmore B");
    assert_eq!(read(&vault_path, "new/C.md"), "fresh");
    assert!(!vault_path.join("D.md").exists());
    assert_eq!(read(&vault_path, ".trash/D.md"), "doomed");
    assert_eq!(read(&vault_path, "Untouched.md"), "same");

    // created notes are not part of the snapshot
    let manifest = vault
        .snapshots()
        .manifest(outcome.snapshot_id.as_str())
        .unwrap();
    assert_eq!(
        manifest.paths().collect::<Vec<&str>>(),
        vec!["A.md", "B.md", "D.md"]
    );
}

#[test(tokio::test)]
async fn test_rollback_leaves_created_notes_behind() {
    let temp_dir = TempDir::new().unwrap();
    let vault_path = create_test_vault(
        &temp_dir,
        &[("Keep.md", "keep"), ("Locked.md", "locked")],
    );
    let vault = Vault::with_store(FailingStore::new(&vault_path, &["Locked.md"]));

    let err = vault
        .execute_batch(&[
            Mutation::Create {
                path: "Brand New.md".to_string(),
                content: "created during the batch".to_string(),
                frontmatter: None,
            },
            Mutation::Delete {
                path: "Keep.md".to_string(),
                permanent: false,
            },
            update("Locked.md", "changed"),
        ])
        .await
        .unwrap_err();
    assert!(matches!(err, VaultError::BatchPartialFailure { .. }));

    // write-rollback only: the new note survives, the deleted note is back
    assert_eq!(read(&vault_path, "Brand New.md"), "created during the batch");
    assert_eq!(read(&vault_path, "Keep.md"), "keep");
    assert_eq!(read(&vault_path, ".trash/Keep.md"), "keep");
    assert_eq!(read(&vault_path, "Locked.md"), "locked");
}

#[test(tokio::test)]
async fn test_every_failure_is_reported() {
    let temp_dir = TempDir::new().unwrap();
    let vault_path = create_test_vault(
        &temp_dir,
        &[("A.md", "a"), ("B.md", "b"), ("C.md", "c")],
    );
    let vault = Vault::with_store(FailingStore::new(&vault_path, &["A.md", "C.md"]));

    match vault
        .execute_batch(&[update("A.md", "1"), update("B.md", "2"), update("C.md", "3")])
        .await
    {
        Err(VaultError::BatchPartialFailure { failed, .. }) => {
            let failed_paths = failed.iter().map(|f| f.path.as_str()).collect::<Vec<&str>>();
            assert_eq!(failed_paths, vec!["A.md", "C.md"]);
        }
        other => panic!("expected BatchPartialFailure, got {other:?}"),
    }
    assert_eq!(read(&vault_path, "B.md"), "b");
}

#[test(tokio::test)]
async fn test_batch_on_missing_note_touches_nothing() {
    let temp_dir = TempDir::new().unwrap();
    let vault_path = create_test_vault(&temp_dir, &[("A.md", "a")]);
    let vault = open_vault(&vault_path);

    let err = vault
        .execute_batch(&[update("A.md", "changed"), update("Missing.md", "x")])
        .await
        .unwrap_err();
    assert!(matches!(err, VaultError::NotFound(_)));
    assert_eq!(read(&vault_path, "A.md"), "a");
    assert!(!vault_path.join("Missing.md").exists());
    assert!(vault.list_batch_backups(10).unwrap().is_empty());
}

#[test(tokio::test)]
async fn test_invalid_batches_are_rejected() {
    let temp_dir = TempDir::new().unwrap();
    let vault_path = create_test_vault(&temp_dir, &[("A.md", "a"), ("B.md", "b"), ("C.md", "c")]);
    let mut config = VaultConfig::new(&vault_path);
    config.max_batch_size = 2;
    let vault = Vault::open(config).unwrap();

    for mutations in [
        vec![],
        vec![update("A.md", "1"), update("B.md", "2"), update("C.md", "3")],
        vec![update("A.md", "1"), update("./A.md", "2")],
        vec![update("", "1")],
    ] {
        let err = vault.execute_batch(&mutations).await.unwrap_err();
        assert!(matches!(err, VaultError::InvalidBatch(_)), "{err}");
        assert_eq!(err.status_code(), http::StatusCode::BAD_REQUEST);
    }
    assert_eq!(read(&vault_path, "A.md"), "a");
    assert!(!vault_path.join(".batch_backups").exists());
}

#[test(tokio::test)]
async fn test_dispatch_requires_confirmation() {
    let temp_dir = TempDir::new().unwrap();
    let vault_path = create_test_vault(&temp_dir, &[("A.md", "a")]);
    let vault = open_vault(&vault_path);
    let long_content = "x".repeat(PREVIEW_CHARS + 20);

    let preview = dispatch(
        &vault,
        Op::BatchUpdate {
            mutations: vec![update("A.md", &long_content), update("New.md", "n")],
            dry_run: true,
            confirm: false,
        },
    )
    .await
    .unwrap();
    match preview {
        OpResult::Preview(items) => {
            assert_eq!(items.len(), 2);
            assert!(items[0].exists);
            assert_eq!(items[0].kind, "update");
            assert_eq!(items[0].preview.chars().count(), PREVIEW_CHARS);
            assert!(!items[1].exists);
        }
        other => panic!("expected a preview, got {other}"),
    }

    let err = dispatch(
        &vault,
        Op::BatchUpdate {
            mutations: vec![update("A.md", "changed")],
            dry_run: false,
            confirm: false,
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, VaultError::InvalidBatch(_)));
    assert_eq!(read(&vault_path, "A.md"), "a");
    assert!(!vault_path.join(".batch_backups").exists());

    let oversized = (0..60)
        .map(|i| update(&format!("N{i}.md"), "x"))
        .collect::<Vec<Mutation>>();
    let err = dispatch(
        &vault,
        Op::BatchUpdate {
            mutations: oversized,
            dry_run: false,
            confirm: false,
        },
    )
    .await
    .unwrap_err();
    assert!(err.to_string().contains("exceeds the limit of 50"), "{err}");

    let result = dispatch(
        &vault,
        Op::BatchUpdate {
            mutations: vec![update("A.md", "changed")],
            dry_run: false,
            confirm: true,
        },
    )
    .await
    .unwrap();
    match result {
        OpResult::Batch(outcome) => assert_eq!(outcome.state, BatchState::Committed),
        other => panic!("expected a batch outcome, got {other}"),
    }
    assert_eq!(read(&vault_path, "A.md"), "changed");
}

#[test(tokio::test)]
async fn test_dispatch_batch_append_and_backups() {
    let temp_dir = TempDir::new().unwrap();
    let vault_path = create_test_vault(&temp_dir, &[("Log.md", "day one"), ("Other.md", "x\n")]);
    let vault = open_vault(&vault_path);

    let result = dispatch(
        &vault,
        Op::BatchAppend {
            appends: vec![
                AppendRequest {
                    path: "Log.md".to_string(),
                    content: "day two".to_string(),
                },
                AppendRequest {
                    path: "Other.md".to_string(),
                    content: "y".to_string(),
                },
            ],
            confirm: true,
        },
    )
    .await
    .unwrap();
    let snapshot_id = match result {
        OpResult::Batch(outcome) => {
            assert_eq!(outcome.applied, strings(&["Log.md", "Other.md"]));
            outcome.snapshot_id
        }
        other => panic!("expected a batch outcome, got {other}"),
    };
    assert_eq!(read(&vault_path, "Log.md"), "day one\nday two");
    assert_eq!(read(&vault_path, "Other.md"), "x\ny");

    // the retained snapshot can undo a committed batch by hand
    let restored = dispatch(
        &vault,
        Op::RestoreBatchBackup {
            snapshot_id: snapshot_id.to_string(),
        },
    )
    .await
    .unwrap();
    assert_eq!(restored, OpResult::Restored(strings(&["Log.md", "Other.md"])));
    assert_eq!(read(&vault_path, "Log.md"), "day one");

    match dispatch(&vault, Op::ListBatchBackups { limit: 5 }).await.unwrap() {
        OpResult::Snapshots(snapshots) => {
            assert_eq!(snapshots.len(), 1);
            assert_eq!(snapshots[0].id, snapshot_id.as_str());
        }
        other => panic!("expected snapshots, got {other}"),
    }

    let removed = dispatch(
        &vault,
        Op::CleanupBatchBackups {
            max_age_days: Some(7),
        },
    )
    .await
    .unwrap();
    assert_eq!(removed, OpResult::Removed(0));

    let err = dispatch(
        &vault,
        Op::RestoreBatchBackup {
            snapshot_id: "19990101_000000".to_string(),
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, VaultError::NotFound(_)));
}

#[test(tokio::test)]
async fn test_create_batch_backup_reports_missing_paths() {
    let temp_dir = TempDir::new().unwrap();
    let vault_path = create_test_vault(&temp_dir, &[("A.md", "a")]);
    let vault = open_vault(&vault_path);

    let err = dispatch(
        &vault,
        Op::CreateBatchBackup {
            paths: strings(&["A.md", "Ghost.md"]),
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, VaultError::NotFound(_)));
    assert!(!vault_path.join(".batch_backups").exists());

    match dispatch(
        &vault,
        Op::CreateBatchBackup {
            paths: strings(&["A.md"]),
        },
    )
    .await
    .unwrap()
    {
        OpResult::SnapshotCreated(id) => {
            assert!(vault_path.join(".batch_backups").join(id.as_str()).is_dir())
        }
        other => panic!("expected a snapshot id, got {other}"),
    }
}

#[test(tokio::test)]
async fn test_frontmatter_mutation_commits_and_rolls_back() {
    let temp_dir = TempDir::new().unwrap();
    let vault_path = create_test_vault(
        &temp_dir,
        &[
            ("Task.md", "---\nstatus: open\n---\nShip it.\n"),
            ("Locked.md", "locked\n"),
        ],
    );
    let updates: serde_yaml::Mapping = serde_yaml::from_str("status: done\nowner: sam\n").unwrap();
    let set_status = Mutation::UpdateFrontmatter {
        path: "Task.md".to_string(),
        updates,
    };

    let vault = Vault::with_store(FailingStore::new(&vault_path, &["Locked.md"]));
    let err = vault
        .execute_batch(&[set_status.clone(), update("Locked.md", "changed\n")])
        .await
        .unwrap_err();
    assert!(matches!(err, VaultError::BatchPartialFailure { .. }));
    assert_eq!(read(&vault_path, "Task.md"), "---\nstatus: open\n---\nShip it.\n");

    let outcome = vault.execute_batch(&[set_status]).await.unwrap();
    assert_eq!(outcome.state, BatchState::Committed);
    assert_eq!(
        read(&vault_path, "Task.md"),
        "---\nstatus: done\nowner: sam\n---\nShip it.\n"
    );
}
