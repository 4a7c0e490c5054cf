//! Collaborator doubles shared by the integration tests

#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tempfile::TempDir;

use memvault::ai::AiClient;
use memvault::error::{MemvaultError, Result};
use memvault::events::MemoryEvent;
use memvault::orchestrator::EntityHooks;
use memvault::storage::{FsVault, ScanResult, VaultStorage};
use memvault::types::{Entity, EntityPatch};
use memvault::vector::{VectorIndex, VectorRecord};

/// AI client that records prompts and answers from a script
pub struct ScriptedAi {
    pub local: bool,
    pub fail_embed: bool,
    pub completion: String,
    pub embedded: Mutex<Vec<String>>,
    pub prompts: Mutex<Vec<String>>,
}

impl ScriptedAi {
    pub fn cloud(completion: &str) -> Self {
        Self {
            local: false,
            fail_embed: false,
            completion: completion.to_string(),
            embedded: Mutex::new(Vec::new()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn local(completion: &str) -> Self {
        Self {
            local: true,
            ..Self::cloud(completion)
        }
    }

    pub fn embedded(&self) -> Vec<String> {
        self.embedded.lock().clone()
    }

    pub fn prompt_count(&self) -> usize {
        self.prompts.lock().len()
    }
}

#[async_trait]
impl AiClient for ScriptedAi {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if self.fail_embed {
            return Err(MemvaultError::Embedding("scripted failure".to_string()));
        }
        self.embedded.lock().push(text.to_string());
        Ok(vec![0.25; 4])
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        self.prompts.lock().push(prompt.to_string());
        Ok(self.completion.clone())
    }

    fn is_local(&self) -> bool {
        self.local
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}

/// Vector index that records calls and can be told to fail
#[derive(Default)]
pub struct RecordingVectors {
    pub fail: bool,
    pub upserts: Mutex<Vec<(String, VectorRecord)>>,
    pub deletes: Mutex<Vec<(String, Vec<String>)>>,
}

impl RecordingVectors {
    pub fn upserted_ids(&self) -> Vec<String> {
        self.upserts.lock().iter().map(|(_, r)| r.id.clone()).collect()
    }

    pub fn deleted_ids(&self) -> Vec<String> {
        self.deletes
            .lock()
            .iter()
            .flat_map(|(_, ids)| ids.clone())
            .collect()
    }
}

#[async_trait]
impl VectorIndex for RecordingVectors {
    async fn upsert(&self, tenant: &str, records: Vec<VectorRecord>) -> Result<()> {
        if self.fail {
            return Err(MemvaultError::VectorIndex("scripted failure".to_string()));
        }
        let mut upserts = self.upserts.lock();
        for record in records {
            upserts.push((tenant.to_string(), record));
        }
        Ok(())
    }

    async fn delete(&self, tenant: &str, ids: &[String]) -> Result<()> {
        self.deletes.lock().push((tenant.to_string(), ids.to_vec()));
        Ok(())
    }
}

/// Hooks that count calls and optionally veto deletes or fail after updates
#[derive(Default)]
pub struct CountingHooks {
    pub veto_delete: bool,
    pub fail_after_update: bool,
    pub calls: Mutex<Vec<&'static str>>,
}

impl CountingHooks {
    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl EntityHooks for CountingHooks {
    async fn after_create(&self, _entity: &Entity) -> Result<()> {
        self.calls.lock().push("after_create");
        Ok(())
    }

    async fn before_update(&self, _id: &str, patch: EntityPatch) -> Result<EntityPatch> {
        self.calls.lock().push("before_update");
        Ok(patch)
    }

    async fn after_update(&self, _entity: &Entity) -> Result<()> {
        self.calls.lock().push("after_update");
        if self.fail_after_update {
            return Err(MemvaultError::Validation("after hook failed".to_string()));
        }
        Ok(())
    }

    async fn before_delete(&self, _entity: &Entity) -> Result<bool> {
        self.calls.lock().push("before_delete");
        Ok(!self.veto_delete)
    }

    async fn after_delete(&self, _id: &str) -> Result<()> {
        self.calls.lock().push("after_delete");
        Ok(())
    }
}

/// Filesystem vault whose moves always fail
pub struct StuckVault(pub FsVault);

#[async_trait]
impl VaultStorage for StuckVault {
    async fn read_entity(&self, path: &str) -> Result<Entity> {
        self.0.read_entity(path).await
    }

    async fn write_entity(&self, entity: &Entity) -> Result<()> {
        self.0.write_entity(entity).await
    }

    async fn delete_entity(&self, path: &str) -> Result<bool> {
        self.0.delete_entity(path).await
    }

    async fn move_entity(&self, from: &str, _to: &str) -> Result<()> {
        Err(MemvaultError::Storage(format!("{} is locked", from)))
    }

    async fn scan(&self) -> Result<ScanResult> {
        self.0.scan().await
    }
}

/// Filesystem vault that refuses writes under one folder
pub struct LockedFolderVault {
    pub inner: FsVault,
    pub locked: &'static str,
}

#[async_trait]
impl VaultStorage for LockedFolderVault {
    async fn read_entity(&self, path: &str) -> Result<Entity> {
        self.inner.read_entity(path).await
    }

    async fn write_entity(&self, entity: &Entity) -> Result<()> {
        if entity.vault_path.starts_with(self.locked) {
            return Err(MemvaultError::Storage(format!(
                "{} is read-only",
                entity.vault_path
            )));
        }
        self.inner.write_entity(entity).await
    }

    async fn delete_entity(&self, path: &str) -> Result<bool> {
        self.inner.delete_entity(path).await
    }

    async fn move_entity(&self, from: &str, to: &str) -> Result<()> {
        self.inner.move_entity(from, to).await
    }

    async fn scan(&self) -> Result<ScanResult> {
        self.inner.scan().await
    }
}

pub fn temp_vault() -> (TempDir, Arc<FsVault>) {
    let dir = TempDir::new().unwrap();
    let vault = Arc::new(FsVault::new(dir.path()));
    (dir, vault)
}

pub fn write_note(root: &Path, path: &str, text: &str) {
    let full = root.join(path);
    if let Some(parent) = full.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(full, text).unwrap();
}

/// Everything currently queued on a bus receiver
pub fn drain(rx: &mut tokio::sync::broadcast::Receiver<MemoryEvent>) -> Vec<MemoryEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

/// Frontmatter for a note last active at `last_active`
pub fn aged_note(title: &str, level: &str, last_active: &str, extra: &str) -> String {
    format!(
        "---\ntitle: \"{title}\"\nmemory:\n  memory_level: {level}\n  stability_score: 0.9\n  \
         importance_score: 0.9\n  last_active_at: {last_active}\n  created_at: {last_active}\n  \
         updated_at: {last_active}\n{extra}---\nBody of {title}.\n"
    )
}
