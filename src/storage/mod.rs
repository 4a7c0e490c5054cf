//! Vault storage
//!
//! The [`VaultStorage`] trait is the boundary to the physical store of entity
//! records. [`FsVault`] keeps entities as markdown files with YAML
//! frontmatter under a root directory.

pub mod frontmatter;
mod vault;

pub use vault::FsVault;

use async_trait::async_trait;

use crate::error::Result;
use crate::types::Entity;

/// One file that failed to load during a scan
#[derive(Debug, Clone, PartialEq)]
pub struct ScanError {
    pub path: String,
    pub error: String,
}

/// Result of scanning the whole vault
#[derive(Debug, Clone, Default)]
pub struct ScanResult {
    pub entities: Vec<Entity>,
    pub errors: Vec<ScanError>,
}

/// Physical storage of entity records
///
/// All paths are relative to the vault root and use `/` separators.
#[async_trait]
pub trait VaultStorage: Send + Sync {
    /// Read and parse one record. Missing files are `NotFound`, malformed
    /// metadata is `Parse`.
    async fn read_entity(&self, path: &str) -> Result<Entity>;

    /// Write the record at `entity.vault_path`, creating parent folders
    async fn write_entity(&self, entity: &Entity) -> Result<()>;

    /// Remove a record; false if nothing was there
    async fn delete_entity(&self, path: &str) -> Result<bool>;

    /// Relocate a record
    async fn move_entity(&self, from: &str, to: &str) -> Result<()>;

    /// Load every record. Per-file failures are reported, not fatal.
    async fn scan(&self) -> Result<ScanResult>;
}

/// Normalize a path to vault-relative form with `/` separators.
///
/// Absolute paths under `root` are made relative; leading `./` is dropped.
pub fn normalize_vault_path(path: &str, root: Option<&str>) -> String {
    let mut normalized = path.replace('\\', "/");

    if let Some(root) = root {
        let root = root.replace('\\', "/");
        let root = root.trim_end_matches('/');
        if !root.is_empty() {
            if let Some(rest) = normalized.strip_prefix(root) {
                if rest.starts_with('/') {
                    normalized = rest.to_string();
                }
            }
        }
    }

    let trimmed = normalized.trim_start_matches("./").trim_start_matches('/');
    trimmed.to_string()
}
