//! memvault - memory lifecycle and access control for knowledge vaults
//!
//! Entities live as markdown files in a vault. Each carries a memory level
//! that ages automatically through the lifecycle rules, and a sensitivity
//! configuration that is folded into a fixed-format access code deciding
//! which AI operations and exports are allowed.

pub mod access;
pub mod ai;
pub mod config;
pub mod error;
pub mod events;
pub mod extraction;
pub mod graph;
pub mod lifecycle;
pub mod orchestrator;
pub mod storage;
pub mod types;
pub mod vector;

pub use access::AccessCode;
pub use config::{AiConfig, OrchestratorConfig};
pub use error::{MemvaultError, Result};
pub use events::{EventBus, LifecycleEvent, MemoryEvent};
pub use lifecycle::{LifecycleConfig, LifecycleEngine};
pub use orchestrator::{Orchestrator, SweepReport};
pub use types::*;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
