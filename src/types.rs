//! Core types for memvault

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::access::{self, AccessCode};
use crate::error::{MemvaultError, Result};

/// Unique identifier for an entity (frontmatter `uid`, or the vault path
/// without its `.md` extension)
pub type EntityId = String;

/// Memory level of an entity
///
/// Automatic promotion runs transitory → temporary → short_term → long_term →
/// canonical. `Archived` is reachable from any non-terminal level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryLevel {
    Transitory,
    Temporary,
    ShortTerm,
    LongTerm,
    Canonical,
    Archived,
}

impl MemoryLevel {
    pub const ALL: [MemoryLevel; 6] = [
        MemoryLevel::Transitory,
        MemoryLevel::Temporary,
        MemoryLevel::ShortTerm,
        MemoryLevel::LongTerm,
        MemoryLevel::Canonical,
        MemoryLevel::Archived,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryLevel::Transitory => "transitory",
            MemoryLevel::Temporary => "temporary",
            MemoryLevel::ShortTerm => "short_term",
            MemoryLevel::LongTerm => "long_term",
            MemoryLevel::Canonical => "canonical",
            MemoryLevel::Archived => "archived",
        }
    }

    /// Terminal levels are never evaluated for automatic transitions
    pub fn is_terminal(&self) -> bool {
        matches!(self, MemoryLevel::Canonical | MemoryLevel::Archived)
    }
}

impl std::fmt::Display for MemoryLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MemoryLevel {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "transitory" => Ok(MemoryLevel::Transitory),
            "temporary" => Ok(MemoryLevel::Temporary),
            "short_term" => Ok(MemoryLevel::ShortTerm),
            "long_term" => Ok(MemoryLevel::LongTerm),
            "canonical" => Ok(MemoryLevel::Canonical),
            "archived" => Ok(MemoryLevel::Archived),
            _ => Err(format!("Unknown memory level: {}", s)),
        }
    }
}

/// Sensitivity level, 0 (public) to 9 (top secret)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct SensitivityLevel(u8);

impl SensitivityLevel {
    pub const MAX: u8 = 9;

    pub fn new(level: u8) -> Option<Self> {
        (level <= Self::MAX).then_some(Self(level))
    }

    pub fn value(&self) -> u8 {
        self.0
    }
}

impl Default for SensitivityLevel {
    fn default() -> Self {
        Self(1)
    }
}

impl TryFrom<u8> for SensitivityLevel {
    type Error = String;

    fn try_from(level: u8) -> std::result::Result<Self, Self::Error> {
        Self::new(level).ok_or_else(|| {
            format!(
                "sensitivity level {} out of range 0-{}",
                level,
                SensitivityLevel::MAX
            )
        })
    }
}

impl From<SensitivityLevel> for u8 {
    fn from(level: SensitivityLevel) -> Self {
        level.0
    }
}

/// Sharing scope group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopeGroup {
    PublicGroup,
    ShareableGroup,
    InternalGroup,
    SecretGroup,
    CompartmentalizedGroup,
}

/// Who may read an entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    #[default]
    Public,
    Internal,
    User,
    Restricted,
}

fn default_true() -> bool {
    true
}

/// Privacy flags controlling AI processing and export
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrivacyFlags {
    #[serde(default = "default_true")]
    pub cloud_ai_allowed: bool,
    #[serde(default = "default_true")]
    pub local_ai_allowed: bool,
    #[serde(default = "default_true")]
    pub export_allowed: bool,
}

impl Default for PrivacyFlags {
    fn default() -> Self {
        Self {
            cloud_ai_allowed: true,
            local_ai_allowed: true,
            export_allowed: true,
        }
    }
}

/// Per-entity privacy and visibility configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Sensitivity {
    #[serde(default)]
    pub level: SensitivityLevel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<ScopeGroup>,
    #[serde(default)]
    pub privacy: PrivacyFlags,
    #[serde(default)]
    pub visibility: Visibility,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub group_access: Vec<String>,
}

/// AI restriction mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RestrictionMode {
    Permissive,
    Cautious,
    Hardened,
}

/// Restriction controls
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Control {
    #[serde(
        default,
        alias = "AEI_restriction_mode",
        skip_serializing_if = "Option::is_none"
    )]
    pub restriction_mode: Option<RestrictionMode>,
    #[serde(default)]
    pub requires_human_approval: bool,
    #[serde(default)]
    pub requires_audit_log: bool,
}

/// Memory and activity metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryMetadata {
    pub memory_level: MemoryLevel,
    /// How settled the information is (0.0 - 1.0)
    pub stability_score: f32,
    /// Importance to the user (0.0 - 1.0)
    pub importance_score: f32,
    pub last_active_at: DateTime<Utc>,
    /// Pinned entities never transition automatically
    pub user_pinned: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MemoryMetadata {
    pub fn new(memory_level: MemoryLevel, now: DateTime<Utc>) -> Self {
        Self {
            memory_level,
            stability_score: DEFAULT_SCORE,
            importance_score: DEFAULT_SCORE,
            last_active_at: now,
            user_pinned: false,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Default stability and importance for new entities
pub const DEFAULT_SCORE: f32 = 0.5;

/// One entry of an entity's lifecycle history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LifecycleRecord {
    pub from: MemoryLevel,
    pub to: MemoryLevel,
    pub timestamp: DateTime<Utc>,
    /// false for human overrides
    pub automatic: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Relationship declared in an entity's own metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityRelationship {
    #[serde(rename = "type")]
    pub relationship_type: String,
    pub target_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<f32>,
}

/// A knowledge record stored in the vault
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub id: EntityId,
    /// Path relative to the vault root
    pub vault_path: String,
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub memory: MemoryMetadata,
    #[serde(default)]
    pub sensitivity: Sensitivity,
    #[serde(default)]
    pub control: Option<Control>,
    #[serde(default)]
    pub lifecycle_history: Vec<LifecycleRecord>,
    #[serde(default)]
    pub relationships: Vec<EntityRelationship>,
}

impl Entity {
    /// New entity with default memory and sensitivity settings
    pub fn new(
        id: impl Into<EntityId>,
        vault_path: impl Into<String>,
        title: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            vault_path: vault_path.into(),
            title: title.into(),
            content: String::new(),
            tags: Vec::new(),
            memory: MemoryMetadata::new(MemoryLevel::Transitory, now),
            sensitivity: Sensitivity::default(),
            control: None,
            lifecycle_history: Vec::new(),
            relationships: Vec::new(),
        }
    }

    /// Access-control code derived from memory level, sensitivity and control.
    ///
    /// Computed on every call, so it can never be stale or set independently.
    pub fn access_code(&self) -> AccessCode {
        access::compute(
            self.memory.memory_level,
            &self.sensitivity,
            self.control.as_ref(),
        )
    }

    /// Timestamp of the most recent lifecycle transition
    pub fn last_transition_at(&self) -> Option<DateTime<Utc>> {
        self.lifecycle_history.last().map(|r| r.timestamp)
    }

    /// Check score ranges and id shape
    pub fn validate(&self) -> Result<()> {
        validate_entity_id(&self.id)?;
        validate_vault_path(&self.vault_path)?;
        if self.title.trim().is_empty() {
            return Err(MemvaultError::Validation(
                "Entity title is required".to_string(),
            ));
        }
        validate_score("stability_score", self.memory.stability_score)?;
        validate_score("importance_score", self.memory.importance_score)?;
        Ok(())
    }
}

/// Input for creating an entity
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateEntityInput {
    pub id: Option<EntityId>,
    pub vault_path: Option<String>,
    pub title: Option<String>,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub memory_level: Option<MemoryLevel>,
    pub stability_score: Option<f32>,
    pub importance_score: Option<f32>,
    pub user_pinned: Option<bool>,
    pub sensitivity: Option<Sensitivity>,
    pub control: Option<Control>,
    #[serde(default)]
    pub relationships: Vec<EntityRelationship>,
}

/// Partial update of an entity; `None` fields are left unchanged
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EntityPatch {
    pub vault_path: Option<String>,
    pub title: Option<String>,
    pub content: Option<String>,
    pub tags: Option<Vec<String>>,
    pub memory_level: Option<MemoryLevel>,
    pub stability_score: Option<f32>,
    pub importance_score: Option<f32>,
    pub last_active_at: Option<DateTime<Utc>>,
    pub user_pinned: Option<bool>,
    pub sensitivity: Option<Sensitivity>,
    pub control: Option<Control>,
    /// Must extend the stored history; rewriting or truncating is rejected
    pub lifecycle_history: Option<Vec<LifecycleRecord>>,
    pub relationships: Option<Vec<EntityRelationship>>,
}

impl EntityPatch {
    /// Patch carrying every mutable field of `entity`
    pub fn from_entity(entity: &Entity) -> Self {
        Self {
            vault_path: Some(entity.vault_path.clone()),
            title: Some(entity.title.clone()),
            content: Some(entity.content.clone()),
            tags: Some(entity.tags.clone()),
            memory_level: Some(entity.memory.memory_level),
            stability_score: Some(entity.memory.stability_score),
            importance_score: Some(entity.memory.importance_score),
            last_active_at: Some(entity.memory.last_active_at),
            user_pinned: Some(entity.memory.user_pinned),
            sensitivity: Some(entity.sensitivity.clone()),
            control: entity.control.clone(),
            lifecycle_history: Some(entity.lifecycle_history.clone()),
            relationships: Some(entity.relationships.clone()),
        }
    }

    /// Whether the patch touches an input of the access-control code
    pub fn affects_access_code(&self) -> bool {
        self.memory_level.is_some() || self.sensitivity.is_some() || self.control.is_some()
    }

    /// Apply onto a copy of `existing`. `updated_at` is left to the caller.
    pub fn apply_to(&self, existing: &Entity) -> Result<Entity> {
        let mut updated = existing.clone();

        if let Some(ref path) = self.vault_path {
            updated.vault_path = path.clone();
        }
        if let Some(ref title) = self.title {
            updated.title = title.clone();
        }
        if let Some(ref content) = self.content {
            updated.content = content.clone();
        }
        if let Some(ref tags) = self.tags {
            updated.tags = tags.clone();
        }
        if let Some(level) = self.memory_level {
            updated.memory.memory_level = level;
        }
        if let Some(score) = self.stability_score {
            updated.memory.stability_score = score;
        }
        if let Some(score) = self.importance_score {
            updated.memory.importance_score = score;
        }
        if let Some(at) = self.last_active_at {
            updated.memory.last_active_at = at;
        }
        if let Some(pinned) = self.user_pinned {
            updated.memory.user_pinned = pinned;
        }
        if let Some(ref sensitivity) = self.sensitivity {
            updated.sensitivity = sensitivity.clone();
        }
        if let Some(ref control) = self.control {
            updated.control = Some(control.clone());
        }
        if let Some(ref history) = self.lifecycle_history {
            if !history.starts_with(&existing.lifecycle_history) {
                return Err(MemvaultError::Validation(format!(
                    "lifecycle_history of {} is append-only",
                    existing.id
                )));
            }
            updated.lifecycle_history = history.clone();
        }
        if let Some(ref relationships) = self.relationships {
            updated.relationships = relationships.clone();
        }

        updated.validate()?;
        Ok(updated)
    }
}

/// Validate an entity id
///
/// Ids may contain `/` (path-derived ids) but must not be empty, contain
/// control characters or `..` segments.
pub fn validate_entity_id(id: &str) -> Result<()> {
    if id.trim().is_empty() {
        return Err(MemvaultError::Validation(
            "Entity id cannot be empty".to_string(),
        ));
    }
    if id.chars().any(|c| c.is_control()) {
        return Err(MemvaultError::Validation(format!(
            "Entity id contains control characters: {:?}",
            id
        )));
    }
    if id.split('/').any(|segment| segment == "..") {
        return Err(MemvaultError::Validation(format!(
            "Entity id cannot contain '..' segments: {}",
            id
        )));
    }
    Ok(())
}

/// Validate a vault-relative path
pub fn validate_vault_path(path: &str) -> Result<()> {
    if path.trim().is_empty() {
        return Err(MemvaultError::Validation(
            "Vault path cannot be empty".to_string(),
        ));
    }
    if path.starts_with('/') || path.split('/').any(|segment| segment == "..") {
        return Err(MemvaultError::Validation(format!(
            "Vault path must be relative and stay inside the vault: {}",
            path
        )));
    }
    Ok(())
}

/// Scores must lie in [0, 1]
pub fn validate_score(name: &str, value: f32) -> Result<()> {
    if !(0.0..=1.0).contains(&value) {
        return Err(MemvaultError::Validation(format!(
            "{} must be between 0 and 1, got {}",
            name, value
        )));
    }
    Ok(())
}
