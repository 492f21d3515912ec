//! Shared test utilities for vault-backed unit tests

use crate::{config::VaultConfig, vault::Vault};
use filetime::FileTime;
use std::path::PathBuf;
use tempfile::TempDir;

/// Initialize logging for tests
pub fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init()
        .ok();
}

/// A throwaway vault in a temporary directory. The directory lives as long as the value.
pub struct TestVault {
    _dir: TempDir,
    pub vault: Vault,
}

impl TestVault {
    pub fn new() -> Self {
        TestVault::with_config(|_| {})
    }

    pub fn with_config<F: FnOnce(&mut VaultConfig)>(adjust: F) -> Self {
        init_logging();
        let dir = TempDir::new().unwrap();
        let mut config = VaultConfig::new(dir.path());
        adjust(&mut config);
        let vault = Vault::open(config).unwrap();
        TestVault { _dir: dir, vault }
    }

    pub fn path(&self, rel: &str) -> PathBuf {
        self.vault.config().vault_path.join(rel)
    }

    pub fn write(&self, rel: &str, content: &str) -> &Self {
        let path = self.path(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
        self
    }

    pub fn write_bytes(&self, rel: &str, content: &[u8]) -> &Self {
        let path = self.path(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
        self
    }

    pub fn read(&self, rel: &str) -> String {
        std::fs::read_to_string(self.path(rel)).unwrap()
    }

    /// Pin a note's modification time to `secs` after the epoch.
    pub fn set_mtime(&self, rel: &str, secs: i64) {
        filetime::set_file_mtime(self.path(rel), FileTime::from_unix_time(secs, 0)).unwrap();
    }

    pub fn mtime(&self, rel: &str) -> FileTime {
        FileTime::from_last_modification_time(&std::fs::metadata(self.path(rel)).unwrap())
    }
}

pub fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}
