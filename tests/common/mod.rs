//! Shared test utilities for integration tests.
//!
//! Import from integration test files as:
//! ```ignore
//! mod common;
//! ```

use notegraph::{
    config::VaultConfig, store::NoteMeta, FsNoteStore, NoteStore, Vault, VaultError,
};
use std::{collections::BTreeSet, path::PathBuf};
use tempfile::TempDir;

/// Initialize tracing for tests, respecting RUST_LOG env var.
///
/// Safe to call multiple times; subsequent calls are no-ops.
#[allow(dead_code)]
pub fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init()
        .ok();
}

/// Create a vault directory populated with `notes` (vault-relative path, content).
///
/// Returns the path to the vault directory (e.g. `<temp_dir>/vault/`).
#[allow(dead_code)]
pub fn create_test_vault(temp_dir: &TempDir, notes: &[(&str, &str)]) -> PathBuf {
    let vault_path = temp_dir.path().join("vault");
    std::fs::create_dir_all(&vault_path).unwrap();
    for (rel, content) in notes {
        let path = vault_path.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }
    vault_path
}

#[allow(dead_code)]
pub fn open_vault(vault_path: &PathBuf) -> Vault {
    Vault::open(VaultConfig::new(vault_path)).unwrap()
}

#[allow(dead_code)]
pub fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// A filesystem store whose writes to selected notes fail with a permission error.
#[derive(Debug)]
#[allow(dead_code)]
pub struct FailingStore {
    inner: FsNoteStore,
    deny: BTreeSet<String>,
}

#[allow(dead_code)]
impl FailingStore {
    pub fn new(vault_path: &PathBuf, deny: &[&str]) -> Self {
        FailingStore {
            inner: FsNoteStore::new(VaultConfig::new(vault_path)).unwrap(),
            deny: deny.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl NoteStore for FailingStore {
    fn config(&self) -> &VaultConfig {
        self.inner.config()
    }

    fn resolve(&self, rel: &str) -> Result<PathBuf, VaultError> {
        self.inner.resolve(rel)
    }

    fn read_raw(&self, rel: &str) -> Result<String, VaultError> {
        self.inner.read_raw(rel)
    }

    fn write_raw(&self, rel: &str, content: &str) -> Result<(), VaultError> {
        if self.deny.contains(rel) {
            return Err(VaultError::PermissionDenied(format!(
                "write to {rel} is not permitted"
            )));
        }
        self.inner.write_raw(rel, content)
    }

    fn delete(&self, rel: &str, use_trash: bool) -> Result<Option<String>, VaultError> {
        if self.deny.contains(rel) {
            return Err(VaultError::PermissionDenied(format!(
                "delete of {rel} is not permitted"
            )));
        }
        self.inner.delete(rel, use_trash)
    }

    fn enumerate(&self) -> Result<Vec<NoteMeta>, VaultError> {
        self.inner.enumerate()
    }
}
