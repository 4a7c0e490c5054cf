//! Extension points around entity mutations

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{CreateEntityInput, Entity, EntityPatch};

/// Callbacks run by the orchestrator around create, update and delete.
///
/// `before_*` hooks run before validation and may rewrite the request; an
/// error aborts the operation. `after_*` hooks run once the change is
/// committed, so their errors are logged and otherwise ignored.
#[async_trait]
pub trait EntityHooks: Send + Sync {
    async fn before_create(&self, input: CreateEntityInput) -> Result<CreateEntityInput> {
        Ok(input)
    }

    async fn after_create(&self, _entity: &Entity) -> Result<()> {
        Ok(())
    }

    async fn before_update(&self, _id: &str, patch: EntityPatch) -> Result<EntityPatch> {
        Ok(patch)
    }

    async fn after_update(&self, _entity: &Entity) -> Result<()> {
        Ok(())
    }

    /// Return false to veto the deletion
    async fn before_delete(&self, _entity: &Entity) -> Result<bool> {
        Ok(true)
    }

    async fn after_delete(&self, _id: &str) -> Result<()> {
        Ok(())
    }
}
