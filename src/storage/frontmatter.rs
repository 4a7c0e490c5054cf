//! Markdown + YAML frontmatter documents
//!
//! Parsing is schema-validated: a document either yields a complete
//! [`Entity`] or a `Parse` error naming the file. Memory fields may appear at
//! the top level or inside a nested `memory:` block; nested values win.

use chrono::{DateTime, NaiveDate, Utc};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{MemvaultError, Result};
use crate::types::{
    validate_entity_id, validate_score, Control, Entity, EntityRelationship, LifecycleRecord,
    MemoryLevel, MemoryMetadata, Sensitivity, DEFAULT_SCORE,
};

const DELIMITER: &str = "---";

#[derive(Debug, Default, Deserialize)]
#[serde(untagged)]
enum TagList {
    #[default]
    Empty,
    One(String),
    Many(Vec<String>),
}

impl TagList {
    fn into_vec(self) -> Vec<String> {
        match self {
            TagList::Empty => Vec::new(),
            TagList::One(tag) => vec![tag],
            TagList::Many(tags) => tags,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct MemoryFields {
    memory_level: Option<MemoryLevel>,
    stability_score: Option<f32>,
    importance_score: Option<f32>,
    #[serde(default, deserialize_with = "opt_timestamp")]
    last_active_at: Option<DateTime<Utc>>,
    user_pinned: Option<bool>,
    #[serde(default, deserialize_with = "opt_timestamp")]
    created_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "opt_timestamp")]
    updated_at: Option<DateTime<Utc>>,
}

impl MemoryFields {
    /// Nested values take precedence over top-level ones
    fn overlay(self, nested: Option<MemoryFields>) -> MemoryFields {
        let Some(nested) = nested else {
            return self;
        };
        MemoryFields {
            memory_level: nested.memory_level.or(self.memory_level),
            stability_score: nested.stability_score.or(self.stability_score),
            importance_score: nested.importance_score.or(self.importance_score),
            last_active_at: nested.last_active_at.or(self.last_active_at),
            user_pinned: nested.user_pinned.or(self.user_pinned),
            created_at: nested.created_at.or(self.created_at),
            updated_at: nested.updated_at.or(self.updated_at),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct RawFrontmatter {
    uid: Option<String>,
    id: Option<String>,
    title: Option<String>,
    #[serde(default, alias = "tag")]
    tags: TagList,
    memory: Option<MemoryFields>,
    memory_level: Option<MemoryLevel>,
    stability_score: Option<f32>,
    importance_score: Option<f32>,
    #[serde(default, deserialize_with = "opt_timestamp")]
    last_active_at: Option<DateTime<Utc>>,
    user_pinned: Option<bool>,
    #[serde(default, deserialize_with = "opt_timestamp")]
    created_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "opt_timestamp")]
    updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    sensitivity: Sensitivity,
    control: Option<Control>,
    #[serde(default)]
    lifecycle_history: Vec<LifecycleRecord>,
    #[serde(default)]
    relationships: Vec<EntityRelationship>,
}

impl RawFrontmatter {
    fn memory_fields(&mut self) -> MemoryFields {
        MemoryFields {
            memory_level: self.memory_level.take(),
            stability_score: self.stability_score.take(),
            importance_score: self.importance_score.take(),
            last_active_at: self.last_active_at.take(),
            user_pinned: self.user_pinned.take(),
            created_at: self.created_at.take(),
            updated_at: self.updated_at.take(),
        }
        .overlay(self.memory.take())
    }
}

#[derive(Serialize)]
struct FrontmatterOut<'a> {
    uid: &'a str,
    title: &'a str,
    tags: &'a [String],
    memory_level: MemoryLevel,
    stability_score: f32,
    importance_score: f32,
    last_active_at: DateTime<Utc>,
    user_pinned: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    sensitivity: &'a Sensitivity,
    #[serde(skip_serializing_if = "Option::is_none")]
    control: Option<&'a Control>,
    #[serde(skip_serializing_if = "<[_]>::is_empty")]
    lifecycle_history: &'a [LifecycleRecord],
    #[serde(skip_serializing_if = "<[_]>::is_empty")]
    relationships: &'a [EntityRelationship],
}

fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .map(|dt| dt.and_utc())
        })
}

/// RFC 3339 timestamps or bare `YYYY-MM-DD` dates
fn opt_timestamp<'de, D>(deserializer: D) -> std::result::Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    raw.map(|s| {
        parse_timestamp(&s).ok_or_else(|| D::Error::custom(format!("invalid timestamp: {}", s)))
    })
    .transpose()
}

/// Split a document into (frontmatter, body). Documents without a leading
/// delimiter have no frontmatter.
pub fn split_document(text: &str) -> Option<(&str, &str)> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let rest = text
        .strip_prefix(DELIMITER)
        .filter(|r| r.starts_with('\n') || r.starts_with("\r\n"))?;

    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        let trimmed = line.trim_end();
        if offset > 0 && (trimmed == DELIMITER || trimmed == "...") {
            let yaml = &rest[..offset];
            let body = &rest[offset + line.len()..];
            return Some((yaml, body));
        }
        offset += line.len();
    }
    None
}

/// Entity id derived from a vault path
pub fn id_from_path(path: &str) -> String {
    let path = path.replace('\\', "/");
    match path.len().checked_sub(3) {
        Some(cut) if path[cut..].eq_ignore_ascii_case(".md") => path[..cut].to_string(),
        _ => path,
    }
}

/// "weekly-review_notes.md" -> "Weekly Review Notes"
pub fn title_from_path(path: &str) -> String {
    let file = path.rsplit(['/', '\\']).next().unwrap_or(path);
    let stem = file.rsplit_once('.').map(|(s, _)| s).unwrap_or(file);

    let mut title = String::with_capacity(stem.len());
    let mut at_word_start = true;
    for c in stem.chars() {
        let c = if c == '-' || c == '_' { ' ' } else { c };
        if at_word_start && c.is_alphanumeric() {
            title.extend(c.to_uppercase());
        } else {
            title.push(c);
        }
        at_word_start = !c.is_alphanumeric();
    }
    title
}

/// Parse a markdown document at vault-relative `path` into an entity
pub fn parse_document(path: &str, text: &str, now: DateTime<Utc>) -> Result<Entity> {
    let parse_err = |message: String| MemvaultError::Parse {
        path: path.to_string(),
        message,
    };

    let (yaml, body) = split_document(text).unwrap_or(("", text));

    let mut raw: RawFrontmatter = if yaml.trim().is_empty() {
        RawFrontmatter::default()
    } else {
        serde_yaml::from_str(yaml).map_err(|e| parse_err(e.to_string()))?
    };

    let memory = raw.memory_fields();
    let stability = memory.stability_score.unwrap_or(DEFAULT_SCORE);
    let importance = memory.importance_score.unwrap_or(DEFAULT_SCORE);
    validate_score("stability_score", stability).map_err(|e| parse_err(e.to_string()))?;
    validate_score("importance_score", importance).map_err(|e| parse_err(e.to_string()))?;

    let id = raw
        .uid
        .take()
        .or_else(|| raw.id.take())
        .unwrap_or_else(|| id_from_path(path));
    validate_entity_id(&id).map_err(|e| parse_err(e.to_string()))?;

    let title = raw
        .title
        .take()
        .filter(|t| !t.trim().is_empty())
        .unwrap_or_else(|| title_from_path(path));

    let mut metadata = MemoryMetadata::new(
        memory.memory_level.unwrap_or(MemoryLevel::Transitory),
        now,
    );
    metadata.stability_score = stability;
    metadata.importance_score = importance;
    metadata.user_pinned = memory.user_pinned.unwrap_or(false);
    if let Some(at) = memory.last_active_at {
        metadata.last_active_at = at;
    }
    if let Some(at) = memory.created_at {
        metadata.created_at = at;
    }
    if let Some(at) = memory.updated_at {
        metadata.updated_at = at;
    }

    Ok(Entity {
        id,
        vault_path: path.replace('\\', "/"),
        title,
        content: body.trim().to_string(),
        tags: std::mem::take(&mut raw.tags).into_vec(),
        memory: metadata,
        sensitivity: raw.sensitivity,
        control: raw.control,
        lifecycle_history: raw.lifecycle_history,
        relationships: raw.relationships,
    })
}

/// Render an entity as a markdown document with frontmatter
pub fn render_document(entity: &Entity) -> Result<String> {
    let out = FrontmatterOut {
        uid: &entity.id,
        title: &entity.title,
        tags: &entity.tags,
        memory_level: entity.memory.memory_level,
        stability_score: entity.memory.stability_score,
        importance_score: entity.memory.importance_score,
        last_active_at: entity.memory.last_active_at,
        user_pinned: entity.memory.user_pinned,
        created_at: entity.memory.created_at,
        updated_at: entity.memory.updated_at,
        sensitivity: &entity.sensitivity,
        control: entity.control.as_ref(),
        lifecycle_history: &entity.lifecycle_history,
        relationships: &entity.relationships,
    };

    let yaml = serde_yaml::to_string(&out)?;
    Ok(format!("{DELIMITER}\n{yaml}{DELIMITER}\n\n{}\n", entity.content))
}
