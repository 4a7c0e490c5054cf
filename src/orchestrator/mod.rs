//! Orchestrator
//!
//! Sequences vault storage, access-code policy, embedding, extraction and
//! knowledge-graph updates for entities, keeps the in-process entity cache,
//! and turns lifecycle notifications into archive moves.
//!
//! All operations take `&mut self` and process entities one at a time in id
//! order. Enrichment collaborators (AI client, vector index, graph, extractor)
//! are optional; their failures are logged and the pipeline continues.

mod archive;
mod hooks;

pub use archive::{archive_path, is_periodic_note};
pub use hooks::EntityHooks;

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use tokio::sync::mpsc::UnboundedReceiver;

use crate::access::AiCode;
use crate::ai::AiClient;
use crate::config::OrchestratorConfig;
use crate::error::{MemvaultError, Result};
use crate::events::{EventBus, LifecycleEvent, MemoryEvent, TransitionNotice};
use crate::extraction::EntityExtractor;
use crate::graph::{GraphRelationship, KnowledgeGraph};
use crate::lifecycle::LifecycleEngine;
use crate::storage::{normalize_vault_path, ScanResult, VaultStorage};
use crate::types::{
    validate_entity_id, CreateEntityInput, Entity, EntityId, EntityPatch, MemoryLevel,
    MemoryMetadata, DEFAULT_SCORE,
};
use crate::vector::{VectorIndex, VectorRecord};

/// A file relocated after its entity was archived
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveMove {
    pub id: EntityId,
    pub from: String,
    pub to: String,
}

/// Outcome of one automatic sweep
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SweepReport {
    /// Entities considered
    pub evaluated: usize,
    /// Entities whose memory level changed and was persisted
    pub transitioned: Vec<EntityId>,
    pub archived: Vec<ArchiveMove>,
    /// Entities whose transition could not be persisted
    pub failed: Vec<(EntityId, String)>,
}

/// Id for a new entity: slugified title plus a base-36 millisecond stamp
pub fn generate_id(title: &str, now: DateTime<Utc>) -> EntityId {
    let mut slug = String::with_capacity(title.len());
    for c in title.to_lowercase().chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c);
        } else if !slug.ends_with('-') {
            slug.push('-');
        }
    }
    let slug = slug.trim_matches('-');
    let slug = if slug.is_empty() { "entity" } else { slug };

    format!("{}-{}", slug, to_base36(now.timestamp_millis().max(0) as u64))
}

fn to_base36(mut n: u64) -> String {
    const DIGITS: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    let mut out = Vec::new();
    loop {
        out.push(DIGITS[(n % 36) as usize]);
        n /= 36;
        if n == 0 {
            break;
        }
    }
    out.reverse();
    String::from_utf8_lossy(&out).into_owned()
}

/// Names of the fields that differ between two versions of an entity
fn changed_fields(before: &Entity, after: &Entity) -> Vec<String> {
    let checks = [
        ("vault_path", before.vault_path != after.vault_path),
        ("title", before.title != after.title),
        ("content", before.content != after.content),
        ("tags", before.tags != after.tags),
        ("memory_level", before.memory.memory_level != after.memory.memory_level),
        ("stability_score", before.memory.stability_score != after.memory.stability_score),
        ("importance_score", before.memory.importance_score != after.memory.importance_score),
        ("last_active_at", before.memory.last_active_at != after.memory.last_active_at),
        ("user_pinned", before.memory.user_pinned != after.memory.user_pinned),
        ("sensitivity", before.sensitivity != after.sensitivity),
        ("control", before.control != after.control),
        ("lifecycle_history", before.lifecycle_history != after.lifecycle_history),
        ("relationships", before.relationships != after.relationships),
    ];
    checks
        .into_iter()
        .filter(|(_, changed)| *changed)
        .map(|(name, _)| name.to_string())
        .collect()
}

/// Text sent for embedding under the entity's AI permission
fn embedding_text(entity: &Entity, ai: AiCode, limit: usize) -> String {
    if ai == AiCode::Meta {
        return entity.title.clone();
    }
    format!("{}\n\n{}", entity.title, entity.content)
        .chars()
        .take(limit)
        .collect()
}

/// Builder for [`Orchestrator`]
pub struct OrchestratorBuilder {
    storage: Arc<dyn VaultStorage>,
    vault_root: Option<String>,
    ai: Option<Arc<dyn AiClient>>,
    vector: Option<Arc<dyn VectorIndex>>,
    graph: Option<Arc<dyn KnowledgeGraph>>,
    extractor: Option<EntityExtractor>,
    hooks: Option<Arc<dyn EntityHooks>>,
    config: OrchestratorConfig,
    events: Option<EventBus>,
}

impl OrchestratorBuilder {
    /// Absolute root used to make incoming file paths vault-relative
    pub fn vault_root(mut self, root: impl Into<String>) -> Self {
        self.vault_root = Some(root.into());
        self
    }

    pub fn ai_client(mut self, client: Arc<dyn AiClient>) -> Self {
        self.ai = Some(client);
        self
    }

    pub fn vector_index(mut self, index: Arc<dyn VectorIndex>) -> Self {
        self.vector = Some(index);
        self
    }

    pub fn knowledge_graph(mut self, graph: Arc<dyn KnowledgeGraph>) -> Self {
        self.graph = Some(graph);
        self
    }

    pub fn extractor(mut self, extractor: EntityExtractor) -> Self {
        self.extractor = Some(extractor);
        self
    }

    pub fn hooks(mut self, hooks: Arc<dyn EntityHooks>) -> Self {
        self.hooks = Some(hooks);
        self
    }

    pub fn config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    /// Publish on an existing bus instead of a private one
    pub fn event_bus(mut self, bus: EventBus) -> Self {
        self.events = Some(bus);
        self
    }

    pub fn build(self) -> Orchestrator {
        let mut lifecycle = LifecycleEngine::new(self.config.lifecycle.clone());
        let lifecycle_rx = lifecycle.subscribe();

        Orchestrator {
            storage: self.storage,
            vault_root: self.vault_root,
            ai: self.ai,
            vector: self.vector,
            graph: self.graph,
            extractor: self.extractor,
            hooks: self.hooks,
            config: self.config,
            lifecycle,
            lifecycle_rx,
            pending_tick: false,
            stopped: false,
            cache: BTreeMap::new(),
            events: self.events.unwrap_or_default(),
        }
    }
}

/// Coordinates one vault
pub struct Orchestrator {
    storage: Arc<dyn VaultStorage>,
    vault_root: Option<String>,
    ai: Option<Arc<dyn AiClient>>,
    vector: Option<Arc<dyn VectorIndex>>,
    graph: Option<Arc<dyn KnowledgeGraph>>,
    extractor: Option<EntityExtractor>,
    hooks: Option<Arc<dyn EntityHooks>>,
    config: OrchestratorConfig,
    lifecycle: LifecycleEngine,
    lifecycle_rx: UnboundedReceiver<LifecycleEvent>,
    /// A tick arrived while draining transitions
    pending_tick: bool,
    /// Set by `shutdown`; the event loop reports the channel as closed
    stopped: bool,
    cache: BTreeMap<EntityId, Entity>,
    events: EventBus,
}

impl Orchestrator {
    pub fn builder(storage: Arc<dyn VaultStorage>) -> OrchestratorBuilder {
        OrchestratorBuilder {
            storage,
            vault_root: None,
            ai: None,
            vector: None,
            graph: None,
            extractor: None,
            hooks: None,
            config: OrchestratorConfig::default(),
            events: None,
        }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn lifecycle(&self) -> &LifecycleEngine {
        &self.lifecycle
    }

    pub fn lifecycle_mut(&mut self) -> &mut LifecycleEngine {
        &mut self.lifecycle
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MemoryEvent> {
        self.events.subscribe()
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.events
    }

    // ========================================================================
    // Cache
    // ========================================================================

    /// Cached entities in id order
    pub fn entities(&self) -> impl Iterator<Item = &Entity> {
        self.cache.values()
    }

    pub fn cached(&self, id: &str) -> Option<&Entity> {
        self.cache.get(id)
    }

    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }

    pub fn clear_cache(&mut self) {
        self.cache.clear();
    }

    /// Look up an entity, falling back to `{id}.md` in the vault
    pub async fn get_entity(&mut self, id: &str) -> Result<Entity> {
        if let Some(entity) = self.cache.get(id) {
            return Ok(entity.clone());
        }

        validate_entity_id(id)?;
        let entity = self.storage.read_entity(&format!("{id}.md")).await?;
        self.cache.insert(entity.id.clone(), entity.clone());
        Ok(entity)
    }

    /// Load the whole vault into the cache
    pub async fn scan(&mut self) -> Result<ScanResult> {
        let result = self.storage.scan().await?;
        for error in &result.errors {
            tracing::error!("Failed to load {}: {}", error.path, error.error);
        }
        for entity in &result.entities {
            self.cache.insert(entity.id.clone(), entity.clone());
        }
        tracing::info!("Loaded {} entities into cache", result.entities.len());
        Ok(result)
    }

    // ========================================================================
    // Ingestion
    // ========================================================================

    /// Run the ingestion pipeline for one changed file
    pub async fn ingest_file(&mut self, path: &str) -> Result<Entity> {
        let path = normalize_vault_path(path, self.vault_root.as_deref());

        let entity = match self.storage.read_entity(&path).await {
            Ok(entity) => entity,
            Err(e) => {
                tracing::error!("Ingestion of {} aborted: {}", path, e);
                return Err(e);
            }
        };

        let code = entity.access_code();
        tracing::debug!("Access code for {}: {}", entity.id, code);

        self.index_entity(&entity).await;

        if is_periodic_note(&path) {
            self.extract_relationships(&entity).await;
        }
        self.merge_declared_relationships(&entity).await;

        self.cache.insert(entity.id.clone(), entity.clone());
        self.events
            .publish(MemoryEvent::entity_updated(&entity.id, Vec::new()));
        tracing::info!("Ingested {} ({})", entity.id, code);
        Ok(entity)
    }

    /// Embed and upsert under the entity's AI permission. Returns true if a
    /// vector record was written.
    async fn index_entity(&self, entity: &Entity) -> bool {
        let (Some(ai), Some(vector)) = (&self.ai, &self.vector) else {
            tracing::debug!("No AI client or vector index, skipping embedding");
            return false;
        };

        let code = entity.access_code();
        if code.ai == AiCode::None {
            tracing::debug!("AI use forbidden for {}, skipping embedding", entity.id);
            return false;
        }

        let text = embedding_text(entity, code.ai, self.config.embed_content_limit);
        let values = match ai.embed(&text).await {
            Ok(values) => values,
            Err(e) => {
                tracing::warn!("Embedding failed for {}: {}", entity.id, e);
                return false;
            }
        };

        let record = VectorRecord::for_entity(entity, values);
        match vector.upsert(&self.config.tenant, vec![record]).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("Vector upsert failed for {}: {}", entity.id, e);
                false
            }
        }
    }

    async fn remove_from_index(&self, id: &str) {
        if let Some(ref vector) = self.vector {
            if let Err(e) = vector.delete(&self.config.tenant, &[id.to_string()]).await {
                tracing::warn!("Vector delete failed for {}: {}", id, e);
            }
        }
    }

    /// Ask the extractor for relationships and merge them into the graph.
    /// Returns the number of edges added.
    async fn extract_relationships(&self, entity: &Entity) -> usize {
        let (Some(extractor), Some(graph)) = (&self.extractor, &self.graph) else {
            return 0;
        };

        let code = entity.access_code();
        if !code.can_use_for_ai(!extractor.is_local()) {
            tracing::debug!("Extraction not permitted for {} ({})", entity.id, code);
            return 0;
        }

        let result = match extractor.extract(&entity.title, &entity.content).await {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!("Extraction failed for {}: {}", entity.id, e);
                return 0;
            }
        };

        let mentions = result.entities.into_iter().map(|e| {
            GraphRelationship::new(entity.id.as_str(), e.name, "mentions").with_notes(e.entity_type)
        });
        let relations = result.relations.into_iter().map(|r| {
            let edge = GraphRelationship::new(r.source, r.target, r.relation_type);
            match r.description {
                Some(description) => edge.with_notes(description),
                None => edge,
            }
        });

        let mut added = 0;
        for edge in mentions.chain(relations) {
            match graph.add_relationship(edge).await {
                Ok(()) => added += 1,
                Err(e) => tracing::warn!("Graph update failed for {}: {}", entity.id, e),
            }
        }
        tracing::info!("Merged {} extracted relationships from {}", added, entity.id);
        added
    }

    async fn merge_declared_relationships(&self, entity: &Entity) -> usize {
        let Some(ref graph) = self.graph else {
            return 0;
        };

        let mut added = 0;
        for declared in &entity.relationships {
            let mut edge = GraphRelationship::new(
                entity.id.as_str(),
                declared.target_id.as_str(),
                declared.relationship_type.as_str(),
            );
            edge.weight = declared.weight;
            match graph.add_relationship(edge).await {
                Ok(()) => added += 1,
                Err(e) => tracing::warn!(
                    "Graph update failed for {} -> {}: {}",
                    entity.id,
                    declared.target_id,
                    e
                ),
            }
        }
        added
    }

    // ========================================================================
    // CRUD
    // ========================================================================

    pub async fn create(&mut self, input: CreateEntityInput) -> Result<Entity> {
        let input = match self.hooks {
            Some(ref hooks) => hooks.before_create(input).await?,
            None => input,
        };

        let title = input
            .title
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| MemvaultError::Validation("Entity title is required".to_string()))?;

        let now = Utc::now();
        let id = input.id.unwrap_or_else(|| generate_id(&title, now));
        validate_entity_id(&id)?;
        if self.cache.contains_key(&id) {
            return Err(MemvaultError::Validation(format!(
                "Entity {} already exists",
                id
            )));
        }
        let vault_path = input.vault_path.unwrap_or_else(|| format!("{id}.md"));

        let mut memory =
            MemoryMetadata::new(input.memory_level.unwrap_or(MemoryLevel::Transitory), now);
        memory.stability_score = input.stability_score.unwrap_or(DEFAULT_SCORE);
        memory.importance_score = input.importance_score.unwrap_or(DEFAULT_SCORE);
        memory.user_pinned = input.user_pinned.unwrap_or(false);

        let entity = Entity {
            id,
            vault_path,
            title,
            content: input.content,
            tags: input.tags,
            memory,
            sensitivity: input.sensitivity.unwrap_or_default(),
            control: input.control,
            lifecycle_history: Vec::new(),
            relationships: input.relationships,
        };
        entity.validate()?;
        self.ensure_path_free(&entity.vault_path).await?;

        self.storage.write_entity(&entity).await?;
        self.cache.insert(entity.id.clone(), entity.clone());

        if let Some(ref hooks) = self.hooks {
            if let Err(e) = hooks.after_create(&entity).await {
                tracing::warn!("after_create hook failed for {}: {}", entity.id, e);
            }
        }

        self.events.publish(MemoryEvent::entity_created(&entity));
        tracing::info!("Created {} ({})", entity.id, entity.access_code());
        Ok(entity)
    }

    /// Refuse a path held by a cached entity or by any file in the vault
    async fn ensure_path_free(&self, path: &str) -> Result<()> {
        if let Some(owner) = self.cache.values().find(|e| e.vault_path == path) {
            return Err(MemvaultError::Validation(format!(
                "{} already belongs to entity {}",
                path, owner.id
            )));
        }
        match self.storage.read_entity(path).await {
            Err(MemvaultError::NotFound(_)) => Ok(()),
            Err(e @ MemvaultError::Validation(_)) => Err(e),
            _ => Err(MemvaultError::Validation(format!(
                "{} already exists in the vault",
                path
            ))),
        }
    }

    /// Apply a patch. A patch that changes nothing writes nothing and emits
    /// no event.
    pub async fn update(&mut self, id: &str, patch: EntityPatch) -> Result<Entity> {
        let existing = self.get_entity(id).await?;
        let patch = match self.hooks {
            Some(ref hooks) => hooks.before_update(id, patch).await?,
            None => patch,
        };

        let mut updated = patch.apply_to(&existing)?;
        let changes = changed_fields(&existing, &updated);
        if changes.is_empty() {
            tracing::debug!("Update of {} changed nothing", id);
            return Ok(existing);
        }
        updated.memory.updated_at = Utc::now();

        let moved = updated.vault_path != existing.vault_path;
        if moved {
            self.storage
                .move_entity(&existing.vault_path, &updated.vault_path)
                .await?;
        }
        if let Err(e) = self.storage.write_entity(&updated).await {
            if moved {
                if let Err(undo) = self
                    .storage
                    .move_entity(&updated.vault_path, &existing.vault_path)
                    .await
                {
                    tracing::error!(
                        "Could not move {} back to {}: {}",
                        updated.vault_path,
                        existing.vault_path,
                        undo
                    );
                }
            }
            return Err(e);
        }
        self.cache.insert(updated.id.clone(), updated.clone());

        if patch.affects_access_code() {
            let old_code = existing.access_code();
            let new_code = updated.access_code();
            if old_code != new_code {
                tracing::info!("Access code for {}: {} -> {}", id, old_code, new_code);
                if new_code.ai == AiCode::None {
                    self.remove_from_index(id).await;
                } else {
                    self.index_entity(&updated).await;
                }
            }
        }

        if let Some(ref hooks) = self.hooks {
            if let Err(e) = hooks.after_update(&updated).await {
                tracing::warn!("after_update hook failed for {}: {}", id, e);
            }
        }

        self.events.publish(MemoryEvent::entity_updated(id, changes));
        Ok(updated)
    }

    pub async fn delete(&mut self, id: &str) -> Result<()> {
        let existing = self.get_entity(id).await?;

        if let Some(ref hooks) = self.hooks {
            if !hooks.before_delete(&existing).await? {
                tracing::info!("Deletion of {} vetoed by hook", id);
                return Err(MemvaultError::Cancelled(format!(
                    "Deletion of {} cancelled by hook",
                    id
                )));
            }
        }

        if !self.storage.delete_entity(&existing.vault_path).await? {
            return Err(MemvaultError::Storage(format!(
                "Failed to delete {} from vault: {} not found",
                id, existing.vault_path
            )));
        }
        self.cache.remove(id);
        self.remove_from_index(id).await;

        if let Some(ref hooks) = self.hooks {
            if let Err(e) = hooks.after_delete(id).await {
                tracing::warn!("after_delete hook failed for {}: {}", id, e);
            }
        }

        self.events.publish(MemoryEvent::entity_deleted(id));
        tracing::info!("Deleted {}", id);
        Ok(())
    }

    /// Forget a file that disappeared from the vault
    ///
    /// Returns the id of the forgotten entity, or `None` when no cached
    /// entity lives at `path`. Graph edges are not removed.
    pub async fn delete_file(&mut self, path: &str) -> Result<Option<EntityId>> {
        let path = normalize_vault_path(path, self.vault_root.as_deref());
        let Some(id) = self
            .cache
            .values()
            .find(|e| e.vault_path == path)
            .map(|e| e.id.clone())
        else {
            tracing::debug!("No cached entity at {}", path);
            return Ok(None);
        };

        self.cache.remove(&id);
        self.remove_from_index(&id).await;
        if self.graph.is_some() {
            tracing::warn!(
                "Knowledge graph cleanup for deleted entity {} is not implemented",
                id
            );
        }

        self.events.publish(MemoryEvent::entity_deleted(&id));
        tracing::info!("Forgot {} after {} was removed", id, path);
        Ok(Some(id))
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Move an entity to `target`, persist it and run side effects
    pub async fn transition_entity(
        &mut self,
        id: &str,
        target: MemoryLevel,
        automatic: bool,
        reason: Option<String>,
    ) -> Result<Entity> {
        let entity = self.get_entity(id).await?;
        if entity.memory.memory_level == target {
            return Err(MemvaultError::Validation(format!(
                "Entity {} is already {}",
                id, target
            )));
        }

        let transitioned = self.lifecycle.transition(entity, target, automatic, reason);
        let updated = self
            .update(id, EntityPatch::from_entity(&transitioned))
            .await;
        self.drain_lifecycle_events().await;

        let updated = updated?;
        Ok(self.cache.get(id).cloned().unwrap_or(updated))
    }

    pub async fn pin_entity(&mut self, id: &str) -> Result<Entity> {
        let entity = self.get_entity(id).await?;
        let pinned = self.lifecycle.pin(entity);
        self.update(id, EntityPatch::from_entity(&pinned)).await
    }

    pub async fn unpin_entity(&mut self, id: &str) -> Result<Entity> {
        let entity = self.get_entity(id).await?;
        let unpinned = self.lifecycle.unpin(entity);
        self.update(id, EntityPatch::from_entity(&unpinned)).await
    }

    /// Record activity, restarting the inactivity window
    pub async fn touch_entity(&mut self, id: &str) -> Result<Entity> {
        let entity = self.get_entity(id).await?;
        let touched = self.lifecycle.touch(entity);
        self.update(id, EntityPatch::from_entity(&touched)).await
    }

    /// Evaluate every cached entity (scanning the vault first when the cache
    /// is empty) and persist the transitions that are due
    pub async fn run_automatic_transitions(&mut self) -> Result<SweepReport> {
        self.run_automatic_transitions_at(Utc::now()).await
    }

    pub async fn run_automatic_transitions_at(
        &mut self,
        now: DateTime<Utc>,
    ) -> Result<SweepReport> {
        if self.cache.is_empty() {
            self.scan().await?;
        }

        let entities: Vec<Entity> = self.cache.values().cloned().collect();
        let mut report = SweepReport {
            evaluated: entities.len(),
            ..Default::default()
        };

        let swept = self.lifecycle.apply_automatic_transitions_at(entities, now);
        for entity in swept {
            let level_changed = self
                .cache
                .get(&entity.id)
                .map_or(true, |cached| cached.memory.memory_level != entity.memory.memory_level);

            // unchanged entities go through update too; it writes nothing for them
            match self
                .update(&entity.id, EntityPatch::from_entity(&entity))
                .await
            {
                Ok(_) if level_changed => report.transitioned.push(entity.id),
                Ok(_) => {}
                Err(e) if level_changed => {
                    tracing::error!("Failed to persist transition of {}: {}", entity.id, e);
                    report.failed.push((entity.id, e.to_string()));
                }
                Err(e) => tracing::warn!("Sweep update of {} failed: {}", entity.id, e),
            }
        }

        report.archived = self.drain_lifecycle_events().await;
        tracing::info!(
            "Lifecycle sweep: {} evaluated, {} transitioned, {} archived, {} failed",
            report.evaluated,
            report.transitioned.len(),
            report.archived.len(),
            report.failed.len()
        );
        Ok(report)
    }

    /// Handle queued transition notifications. Ticks seen here are deferred
    /// to the next [`process_next_event`](Self::process_next_event).
    async fn drain_lifecycle_events(&mut self) -> Vec<ArchiveMove> {
        let mut moves = Vec::new();
        while let Ok(event) = self.lifecycle_rx.try_recv() {
            match event {
                LifecycleEvent::Transition(notice) => {
                    if let Some(archived) = self.handle_transition(*notice).await {
                        moves.push(archived);
                    }
                }
                LifecycleEvent::Tick { .. } => self.pending_tick = true,
            }
        }
        moves
    }

    async fn handle_transition(&mut self, notice: TransitionNotice) -> Option<ArchiveMove> {
        let id = notice.entity.id.clone();
        let committed = self
            .cache
            .get(&id)
            .is_some_and(|e| e.memory.memory_level == notice.to);
        if !committed {
            tracing::debug!("Transition of {} to {} was not persisted", id, notice.to);
            return None;
        }

        self.events
            .publish(MemoryEvent::lifecycle_transition(&notice));

        if notice.to != MemoryLevel::Archived {
            return None;
        }

        let from = self.cache.get(&id)?.vault_path.clone();
        let Some(to) = archive_path(&from, &self.config.archive_dir) else {
            tracing::debug!("{} is already in the archive", from);
            return None;
        };

        match self.storage.move_entity(&from, &to).await {
            Ok(()) => {
                if let Some(cached) = self.cache.get_mut(&id) {
                    cached.vault_path = to.clone();
                }
                tracing::info!("Archived {} to {}", id, to);
                Some(ArchiveMove { id, from, to })
            }
            Err(e) => {
                tracing::warn!(
                    "Archive move of {} failed, level change kept: {}",
                    id,
                    e
                );
                None
            }
        }
    }

    /// Wait for the next lifecycle notification and act on it
    ///
    /// Ticks run a sweep; transitions are re-published and archived entities
    /// moved. Returns false once the lifecycle channel is closed.
    pub async fn process_next_event(&mut self) -> Result<bool> {
        if self.stopped {
            return Ok(false);
        }
        if std::mem::take(&mut self.pending_tick) {
            self.on_tick(Utc::now()).await?;
            return Ok(true);
        }

        match self.lifecycle_rx.recv().await {
            Some(LifecycleEvent::Tick { at }) => {
                self.on_tick(at).await?;
                Ok(true)
            }
            Some(LifecycleEvent::Transition(notice)) => {
                self.handle_transition(*notice).await;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn on_tick(&mut self, at: DateTime<Utc>) -> Result<()> {
        self.events.publish(MemoryEvent::LifecycleTick { timestamp: at });
        self.run_automatic_transitions().await?;
        Ok(())
    }

    /// Start the periodic lifecycle ticker, if one is configured
    pub fn start(&mut self) -> Result<()> {
        self.stopped = false;
        self.lifecycle.start()
    }

    /// Stop the ticker, discard queued notifications and drop the cache.
    /// No sweep runs after this returns until [`start`](Self::start).
    pub fn shutdown(&mut self) {
        self.lifecycle.stop();
        self.stopped = true;
        self.pending_tick = false;

        let mut discarded = 0;
        while self.lifecycle_rx.try_recv().is_ok() {
            discarded += 1;
        }
        if discarded > 0 {
            tracing::debug!("Discarded {} queued lifecycle events", discarded);
        }

        self.cache.clear();
        tracing::info!("Orchestrator shut down");
    }
}
