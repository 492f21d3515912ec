use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    fs::{read_to_string, write},
    path::{Path, PathBuf},
};

use crate::error::VaultError;

pub const ENV_VAULT_PATH: &str = "NOTEGRAPH_VAULT_PATH";
pub const ENV_MAX_RESULTS: &str = "NOTEGRAPH_MAX_RESULTS";
pub const ENV_MAX_BATCH_SIZE: &str = "NOTEGRAPH_MAX_BATCH_SIZE";
pub const ENV_BACKLINK_WARN_THRESHOLD: &str = "NOTEGRAPH_BACKLINK_WARN_THRESHOLD";

fn default_file_extensions() -> Vec<String> {
    vec!["md".to_string(), "canvas".to_string()]
}

fn default_extension() -> String {
    "md".to_string()
}

fn default_exclude_folders() -> Vec<String> {
    vec![
        ".obsidian".to_string(),
        ".trash".to_string(),
        "templates".to_string(),
    ]
}

fn default_max_results() -> usize {
    100
}

fn default_enumeration_limit() -> usize {
    10_000
}

fn default_backlink_warn_threshold() -> usize {
    1000
}

fn default_related_scan_limit() -> usize {
    1000
}

fn default_snapshot_dir() -> String {
    ".batch_backups".to_string()
}

fn default_trash_dir() -> String {
    ".trash".to_string()
}

fn default_max_batch_size() -> usize {
    50
}

fn default_snapshot_retention_days() -> u32 {
    7
}

/// Everything a [crate::Vault] needs to know about the directory it serves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultConfig {
    pub vault_path: PathBuf,
    /// Extensions (without the dot) counted as notes.
    #[serde(default = "default_file_extensions")]
    pub file_extensions: Vec<String>,
    /// Appended to link tokens that carry no note extension.
    #[serde(default = "default_extension")]
    pub default_extension: String,
    /// Any path component equal to one of these excludes the note from the corpus.
    #[serde(default = "default_exclude_folders")]
    pub exclude_folders: Vec<String>,
    #[serde(default = "default_max_results")]
    pub max_results: usize,
    /// Hard cap on the number of notes a corpus enumeration returns.
    #[serde(default = "default_enumeration_limit")]
    pub enumeration_limit: usize,
    /// Corpus size above which an unbounded backlink scan logs a warning.
    #[serde(default = "default_backlink_warn_threshold")]
    pub backlink_warn_threshold: usize,
    #[serde(default = "default_related_scan_limit")]
    pub related_scan_limit: usize,
    /// Vault-relative directory holding one subdirectory per snapshot.
    #[serde(default = "default_snapshot_dir")]
    pub snapshot_dir: String,
    #[serde(default = "default_trash_dir")]
    pub trash_dir: String,
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,
    #[serde(default = "default_snapshot_retention_days")]
    pub snapshot_retention_days: u32,
}

impl VaultConfig {
    pub fn new<P: Into<PathBuf>>(vault_path: P) -> Self {
        VaultConfig {
            vault_path: vault_path.into(),
            file_extensions: default_file_extensions(),
            default_extension: default_extension(),
            exclude_folders: default_exclude_folders(),
            max_results: default_max_results(),
            enumeration_limit: default_enumeration_limit(),
            backlink_warn_threshold: default_backlink_warn_threshold(),
            related_scan_limit: default_related_scan_limit(),
            snapshot_dir: default_snapshot_dir(),
            trash_dir: default_trash_dir(),
            max_batch_size: default_max_batch_size(),
            snapshot_retention_days: default_snapshot_retention_days(),
        }
    }

    /// Check the vault directory and the numeric limits.
    pub fn validate(&self) -> Result<(), VaultError> {
        let meta = std::fs::symlink_metadata(&self.vault_path).map_err(|e| {
            VaultError::Config(format!(
                "vault path {:?} is not accessible: {e}",
                self.vault_path
            ))
        })?;
        if meta.file_type().is_symlink() {
            return Err(VaultError::Config(format!(
                "vault path {:?} must not be a symlink",
                self.vault_path
            )));
        }
        if !meta.is_dir() {
            return Err(VaultError::Config(format!(
                "vault path {:?} is not a directory",
                self.vault_path
            )));
        }
        for (name, value) in [
            ("max_results", self.max_results),
            ("enumeration_limit", self.enumeration_limit),
            ("backlink_warn_threshold", self.backlink_warn_threshold),
            ("related_scan_limit", self.related_scan_limit),
            ("max_batch_size", self.max_batch_size),
        ] {
            if value == 0 {
                return Err(VaultError::Config(format!("{name} must be positive")));
            }
        }
        if self.file_extensions.is_empty() {
            return Err(VaultError::Config(
                "file_extensions must name at least one extension".to_string(),
            ));
        }
        if !self
            .file_extensions
            .iter()
            .any(|ext| ext.eq_ignore_ascii_case(&self.default_extension))
        {
            return Err(VaultError::Config(format!(
                "default_extension '{}' is not one of {:?}",
                self.default_extension, self.file_extensions
            )));
        }
        for reserved in [&self.snapshot_dir, &self.trash_dir] {
            let normalized = crate::paths::normalize(reserved)
                .map_err(|e| VaultError::Config(format!("reserved directory {reserved}: {e}")))?;
            if normalized.is_empty() {
                return Err(VaultError::Config(
                    "reserved directories must not be the vault root".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Validate, then replace `vault_path` with its canonical absolute form and the reserved
    /// directories with their note-identity form.
    pub fn prepare(mut self) -> Result<Self, VaultError> {
        self.file_extensions = self
            .file_extensions
            .iter()
            .map(|ext| ext.trim_start_matches('.').to_ascii_lowercase())
            .collect();
        self.default_extension = self
            .default_extension
            .trim_start_matches('.')
            .to_ascii_lowercase();
        self.validate()?;
        self.snapshot_dir = crate::paths::normalize(&self.snapshot_dir)?;
        self.trash_dir = crate::paths::normalize(&self.trash_dir)?;
        self.vault_path = std::fs::canonicalize(&self.vault_path)?;
        tracing::debug!("Vault root resolved to {:?}", self.vault_path);
        Ok(self)
    }
}

pub trait VaultConfigProvider: Send + Sync {
    /// Produce a validated configuration with a canonical vault path.
    fn load(&self) -> Result<VaultConfig, VaultError>;
}

/// Reads (and writes) a [VaultConfig] from a TOML file. A relative `vault_path` is taken
/// relative to the directory containing the file.
#[derive(Debug, Serialize, Deserialize)]
pub struct TomlConfigProvider {
    path: PathBuf,
}

impl TomlConfigProvider {
    pub fn new(path: PathBuf) -> Self {
        TomlConfigProvider { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn save(&self, config: &VaultConfig) -> Result<(), VaultError> {
        tracing::debug!("Writing vault config to: {:?}", &self.path);
        let toml_string = toml::to_string(config)?;
        write(&self.path, toml_string)?;
        Ok(())
    }
}

impl VaultConfigProvider for TomlConfigProvider {
    fn load(&self) -> Result<VaultConfig, VaultError> {
        tracing::debug!("Attempting to read vault config from: {:?}", &self.path);
        if !self.path.exists() {
            return Err(VaultError::Config(format!(
                "config file {:?} not found",
                self.path
            )));
        }
        let content = read_to_string(&self.path)?;
        let mut config: VaultConfig = toml::from_str(&content)?;
        if config.vault_path.is_relative() {
            if let Some(dir) = self.path.parent() {
                config.vault_path = dir.join(&config.vault_path);
            }
        }
        config.prepare()
    }
}

/// Builds a [VaultConfig] from `NOTEGRAPH_*` environment variables.
#[derive(Debug, Default, Clone)]
pub struct EnvConfigProvider {
    overrides: Option<BTreeMap<String, String>>,
}

impl EnvConfigProvider {
    pub fn new() -> Self {
        EnvConfigProvider::default()
    }

    /// Read variables from `vars` instead of the process environment.
    pub fn from_vars(vars: BTreeMap<String, String>) -> Self {
        EnvConfigProvider {
            overrides: Some(vars),
        }
    }

    fn var(&self, key: &str) -> Option<String> {
        match &self.overrides {
            Some(vars) => vars.get(key).cloned(),
            None => std::env::var(key).ok(),
        }
    }

    fn numeric(&self, key: &str) -> Result<Option<usize>, VaultError> {
        self.var(key)
            .map(|raw| {
                raw.trim().parse::<usize>().map_err(|e| {
                    VaultError::Config(format!("{key}={raw:?} is not a valid count: {e}"))
                })
            })
            .transpose()
    }
}

impl VaultConfigProvider for EnvConfigProvider {
    fn load(&self) -> Result<VaultConfig, VaultError> {
        let vault_path = self
            .var(ENV_VAULT_PATH)
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| VaultError::Config(format!("{ENV_VAULT_PATH} is not set")))?;
        let mut config = VaultConfig::new(vault_path.trim());
        if let Some(max_results) = self.numeric(ENV_MAX_RESULTS)? {
            config.max_results = max_results;
        }
        if let Some(max_batch_size) = self.numeric(ENV_MAX_BATCH_SIZE)? {
            config.max_batch_size = max_batch_size;
        }
        if let Some(threshold) = self.numeric(ENV_BACKLINK_WARN_THRESHOLD)? {
            config.backlink_warn_threshold = threshold;
        }
        config.prepare()
    }
}
