//! Filesystem vault: one markdown file per entity

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;

use super::frontmatter::{parse_document, render_document};
use super::{ScanError, ScanResult, VaultStorage};
use crate::error::{MemvaultError, Result};
use crate::types::{validate_vault_path, Entity};

const SKIPPED_DIRS: &[&str] = &["node_modules"];

/// Vault rooted at a directory on disk
#[derive(Debug, Clone)]
pub struct FsVault {
    root: PathBuf,
    root_str: String,
}

impl FsVault {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let root_str = root.to_string_lossy().replace('\\', "/");
        Self { root, root_str }
    }

    /// Root as a `/`-separated string, for normalizing absolute paths
    pub fn root_str(&self) -> &str {
        &self.root_str
    }

    fn resolve(&self, path: &str) -> Result<PathBuf> {
        validate_vault_path(path)?;
        Ok(self.root.join(path))
    }

    fn relative(&self, path: &Path) -> Option<String> {
        path.strip_prefix(&self.root)
            .ok()
            .map(|p| p.to_string_lossy().replace('\\', "/"))
    }

    /// Every markdown file under the root, sorted, skipping hidden folders
    async fn markdown_files(&self) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        let mut pending = vec![self.root.clone()];

        while let Some(dir) = pending.pop() {
            let mut entries = tokio::fs::read_dir(&dir).await.map_err(|e| {
                MemvaultError::Storage(format!("Cannot read {}: {}", dir.display(), e))
            })?;

            while let Some(entry) = entries.next_entry().await? {
                let name = entry.file_name();
                let name = name.to_string_lossy();
                let file_type = entry.file_type().await?;

                if file_type.is_dir() {
                    if !name.starts_with('.') && !SKIPPED_DIRS.contains(&name.as_ref()) {
                        pending.push(entry.path());
                    }
                } else if file_type.is_file() && name.ends_with(".md") {
                    files.push(entry.path());
                }
            }
        }

        files.sort();
        Ok(files)
    }
}

#[async_trait]
impl VaultStorage for FsVault {
    async fn read_entity(&self, path: &str) -> Result<Entity> {
        let full = self.resolve(path)?;
        let text = match tokio::fs::read_to_string(&full).await {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(MemvaultError::NotFound(path.to_string()))
            }
            Err(e) => return Err(e.into()),
        };
        parse_document(path, &text, Utc::now())
    }

    async fn write_entity(&self, entity: &Entity) -> Result<()> {
        let full = self.resolve(&entity.vault_path)?;
        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let document = render_document(entity)?;
        tokio::fs::write(&full, document).await?;
        tracing::debug!("Wrote {}", entity.vault_path);
        Ok(())
    }

    async fn delete_entity(&self, path: &str) -> Result<bool> {
        let full = self.resolve(path)?;
        match tokio::fs::remove_file(&full).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn move_entity(&self, from: &str, to: &str) -> Result<()> {
        let source = self.resolve(from)?;
        let target = self.resolve(to)?;

        if tokio::fs::try_exists(&target).await? {
            return Err(MemvaultError::Storage(format!(
                "Cannot move {} to {}: destination exists",
                from, to
            )));
        }
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::rename(&source, &target).await.map_err(|e| {
            if e.kind() == ErrorKind::NotFound {
                MemvaultError::NotFound(from.to_string())
            } else {
                MemvaultError::Storage(format!("Cannot move {} to {}: {}", from, to, e))
            }
        })?;
        tracing::info!("Moved {} -> {}", from, to);
        Ok(())
    }

    async fn scan(&self) -> Result<ScanResult> {
        let mut result = ScanResult::default();

        for file in self.markdown_files().await? {
            let Some(path) = self.relative(&file) else {
                continue;
            };
            match self.read_entity(&path).await {
                Ok(entity) => result.entities.push(entity),
                Err(e) => {
                    tracing::warn!("Skipping {}: {}", path, e);
                    result.errors.push(ScanError {
                        path,
                        error: e.to_string(),
                    });
                }
            }
        }

        tracing::info!(
            "Scanned vault {}: {} entities, {} errors",
            self.root_str,
            result.entities.len(),
            result.errors.len()
        );
        Ok(result)
    }
}
