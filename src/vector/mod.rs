//! Vector index boundary
//!
//! Records are namespaced per tenant and carry the entity's access code so
//! downstream retrieval can filter without re-reading the vault.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::ai::cosine_similarity;
use crate::error::Result;
use crate::types::{Entity, EntityId, MemoryLevel};

/// One embedded entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorRecord {
    pub id: EntityId,
    pub values: Vec<f32>,
    /// Serialized access code at the time of embedding
    pub access_code: String,
    pub memory_level: MemoryLevel,
    pub sensitivity_level: u8,
    pub vault_path: String,
}

impl VectorRecord {
    pub fn for_entity(entity: &Entity, values: Vec<f32>) -> Self {
        Self {
            id: entity.id.clone(),
            values,
            access_code: entity.access_code().to_string(),
            memory_level: entity.memory.memory_level,
            sensitivity_level: entity.sensitivity.level.value(),
            vault_path: entity.vault_path.clone(),
        }
    }
}

/// Search hit
#[derive(Debug, Clone, PartialEq)]
pub struct VectorMatch {
    pub id: EntityId,
    pub score: f32,
    pub access_code: String,
}

#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Insert or replace records by id
    async fn upsert(&self, tenant: &str, records: Vec<VectorRecord>) -> Result<()>;

    /// Remove records by id; unknown ids are ignored
    async fn delete(&self, tenant: &str, ids: &[EntityId]) -> Result<()>;
}

/// Process-local index, keyed by tenant then entity id
#[derive(Debug, Default)]
pub struct InMemoryVectorIndex {
    tenants: RwLock<HashMap<String, HashMap<EntityId, VectorRecord>>>,
}

impl InMemoryVectorIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, tenant: &str, id: &str) -> Option<VectorRecord> {
        self.tenants.read().get(tenant)?.get(id).cloned()
    }

    pub fn len(&self, tenant: &str) -> usize {
        self.tenants.read().get(tenant).map_or(0, HashMap::len)
    }

    pub fn is_empty(&self, tenant: &str) -> bool {
        self.len(tenant) == 0
    }

    /// Top `limit` records by cosine similarity, best first
    pub fn search(&self, tenant: &str, query: &[f32], limit: usize) -> Vec<VectorMatch> {
        let tenants = self.tenants.read();
        let Some(records) = tenants.get(tenant) else {
            return Vec::new();
        };

        let mut hits: Vec<VectorMatch> = records
            .values()
            .map(|r| VectorMatch {
                id: r.id.clone(),
                score: cosine_similarity(query, &r.values),
                access_code: r.access_code.clone(),
            })
            .collect();
        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        hits.truncate(limit);
        hits
    }
}

#[async_trait]
impl VectorIndex for InMemoryVectorIndex {
    async fn upsert(&self, tenant: &str, records: Vec<VectorRecord>) -> Result<()> {
        let mut tenants = self.tenants.write();
        let index = tenants.entry(tenant.to_string()).or_default();
        for record in records {
            index.insert(record.id.clone(), record);
        }
        Ok(())
    }

    async fn delete(&self, tenant: &str, ids: &[EntityId]) -> Result<()> {
        if let Some(index) = self.tenants.write().get_mut(tenant) {
            for id in ids {
                index.remove(id);
            }
        }
        Ok(())
    }
}
