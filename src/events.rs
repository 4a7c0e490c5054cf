//! Typed notifications
//!
//! Two closed event sets: [`LifecycleEvent`] flows from the lifecycle engine to
//! its single owner (the orchestrator), and [`MemoryEvent`] is broadcast to any
//! number of observers through an [`EventBus`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::types::{Entity, EntityId, LifecycleRecord, MemoryLevel};

/// A completed lifecycle transition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionNotice {
    /// The entity after the transition
    pub entity: Entity,
    pub from: MemoryLevel,
    pub to: MemoryLevel,
    pub record: LifecycleRecord,
}

/// Notifications emitted by the lifecycle engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LifecycleEvent {
    Transition(Box<TransitionNotice>),
    /// Periodic ticker fired; owners respond with a fresh sweep
    Tick { at: DateTime<Utc> },
}

/// Notifications published by the orchestrator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MemoryEvent {
    EntityCreated {
        entity_id: EntityId,
        timestamp: DateTime<Utc>,
        preview: String,
    },
    EntityUpdated {
        entity_id: EntityId,
        timestamp: DateTime<Utc>,
        /// Names of the changed fields, empty for re-ingested files
        changes: Vec<String>,
    },
    EntityDeleted {
        entity_id: EntityId,
        timestamp: DateTime<Utc>,
    },
    LifecycleTransition {
        entity_id: EntityId,
        timestamp: DateTime<Utc>,
        from: MemoryLevel,
        to: MemoryLevel,
        automatic: bool,
    },
    LifecycleTick {
        timestamp: DateTime<Utc>,
    },
}

impl MemoryEvent {
    pub fn entity_created(entity: &Entity) -> Self {
        MemoryEvent::EntityCreated {
            entity_id: entity.id.clone(),
            timestamp: Utc::now(),
            preview: truncate(&entity.title, 100),
        }
    }

    pub fn entity_updated(id: &str, changes: Vec<String>) -> Self {
        MemoryEvent::EntityUpdated {
            entity_id: id.to_string(),
            timestamp: Utc::now(),
            changes,
        }
    }

    pub fn entity_deleted(id: &str) -> Self {
        MemoryEvent::EntityDeleted {
            entity_id: id.to_string(),
            timestamp: Utc::now(),
        }
    }

    pub fn lifecycle_transition(notice: &TransitionNotice) -> Self {
        MemoryEvent::LifecycleTransition {
            entity_id: notice.entity.id.clone(),
            timestamp: notice.record.timestamp,
            from: notice.from,
            to: notice.to,
            automatic: notice.record.automatic,
        }
    }

    /// Entity the event concerns, if any
    pub fn entity_id(&self) -> Option<&str> {
        match self {
            MemoryEvent::EntityCreated { entity_id, .. }
            | MemoryEvent::EntityUpdated { entity_id, .. }
            | MemoryEvent::EntityDeleted { entity_id, .. }
            | MemoryEvent::LifecycleTransition { entity_id, .. } => Some(entity_id),
            MemoryEvent::LifecycleTick { .. } => None,
        }
    }
}

/// Truncate string for preview (UTF-8 safe)
fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", truncated)
    }
}

/// Broadcast channel for [`MemoryEvent`]s
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<MemoryEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Publish to all current subscribers. Publishing with no subscribers is fine.
    pub fn publish(&self, event: MemoryEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MemoryEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1000)
    }
}
