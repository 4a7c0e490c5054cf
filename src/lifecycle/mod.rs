//! Memory lifecycle state machine
//!
//! Entities age through memory levels according to a rule table:
//! - transitory → temporary after 48h inactive
//! - temporary → short_term after 48h inactive, stability ≥ 0.3
//! - short_term → long_term after 48h inactive, stability ≥ 0.5, importance ≥ 0.4
//! - long_term → canonical after 48h inactive, stability ≥ 0.8, importance ≥ 0.7
//!
//! The engine is pure with respect to I/O: transitions produce an updated
//! entity and a [`LifecycleEvent`] for the subscriber to act on.

mod ticker;

pub use ticker::Ticker;

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use crate::error::{MemvaultError, Result};
use crate::events::{LifecycleEvent, TransitionNotice};
use crate::types::{Entity, EntityId, LifecycleRecord, MemoryLevel};

/// Default inactivity window for every built-in rule
pub const DEFAULT_HOURS_INACTIVE: f64 = 48.0;

const MS_PER_HOUR: f64 = 3_600_000.0;

/// Conditions of a rule. Absent conditions count as satisfied.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RuleConditions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hours_inactive: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stability_threshold: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub importance_threshold: Option<f32>,
}

impl RuleConditions {
    fn satisfied_by(&self, entity: &Entity, now: DateTime<Utc>) -> bool {
        if let Some(hours) = self.hours_inactive {
            if hours_inactive(entity, now) < hours {
                return false;
            }
        }
        if let Some(threshold) = self.stability_threshold {
            if entity.memory.stability_score < threshold {
                return false;
            }
        }
        if let Some(threshold) = self.importance_threshold {
            if entity.memory.importance_score < threshold {
                return false;
            }
        }
        true
    }
}

/// Automatic transition rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LifecycleRule {
    pub from: MemoryLevel,
    pub to: MemoryLevel,
    #[serde(default)]
    pub conditions: RuleConditions,
}

impl LifecycleRule {
    pub fn new(from: MemoryLevel, to: MemoryLevel, conditions: RuleConditions) -> Self {
        Self {
            from,
            to,
            conditions,
        }
    }
}

/// The built-in 48-hour promotion rules
pub fn default_rules() -> Vec<LifecycleRule> {
    let after_48h = |stability: Option<f32>, importance: Option<f32>| RuleConditions {
        hours_inactive: Some(DEFAULT_HOURS_INACTIVE),
        stability_threshold: stability,
        importance_threshold: importance,
    };

    vec![
        LifecycleRule::new(
            MemoryLevel::Transitory,
            MemoryLevel::Temporary,
            after_48h(None, None),
        ),
        LifecycleRule::new(
            MemoryLevel::Temporary,
            MemoryLevel::ShortTerm,
            after_48h(Some(0.3), None),
        ),
        LifecycleRule::new(
            MemoryLevel::ShortTerm,
            MemoryLevel::LongTerm,
            after_48h(Some(0.5), Some(0.4)),
        ),
        LifecycleRule::new(
            MemoryLevel::LongTerm,
            MemoryLevel::Canonical,
            after_48h(Some(0.8), Some(0.7)),
        ),
    ]
}

/// Lifecycle engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleConfig {
    #[serde(default = "default_rules")]
    pub rules: Vec<LifecycleRule>,
    #[serde(default = "default_enabled")]
    pub enable_auto_transitions: bool,
    /// Ticker period in seconds; 0 disables the ticker
    #[serde(default = "default_tick_interval_secs")]
    pub tick_interval_secs: u64,
}

fn default_enabled() -> bool {
    true
}

fn default_tick_interval_secs() -> u64 {
    3600
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            rules: default_rules(),
            enable_auto_transitions: default_enabled(),
            tick_interval_secs: default_tick_interval_secs(),
        }
    }
}

impl LifecycleConfig {
    pub fn tick_interval(&self) -> Option<Duration> {
        (self.tick_interval_secs > 0).then(|| Duration::from_secs(self.tick_interval_secs))
    }
}

/// Hours since the entity was last active.
///
/// A lifecycle transition counts as activity, so a freshly transitioned
/// entity has to sit out a full window before its next automatic step.
pub fn hours_inactive(entity: &Entity, now: DateTime<Utc>) -> f64 {
    let reference = match entity.last_transition_at() {
        Some(at) if at > entity.memory.last_active_at => at,
        _ => entity.memory.last_active_at,
    };
    (now - reference).num_milliseconds() as f64 / MS_PER_HOUR
}

/// Memory lifecycle state machine
pub struct LifecycleEngine {
    rules: Vec<LifecycleRule>,
    enable_auto_transitions: bool,
    tick_interval: Option<Duration>,
    events: Option<UnboundedSender<LifecycleEvent>>,
    ticker: Ticker,
}

impl LifecycleEngine {
    pub fn new(config: LifecycleConfig) -> Self {
        let tick_interval = config.tick_interval();
        Self {
            rules: config.rules,
            enable_auto_transitions: config.enable_auto_transitions,
            tick_interval,
            events: None,
            ticker: Ticker::new(),
        }
    }

    /// Receive this engine's notifications.
    ///
    /// There is a single subscriber; subscribing again closes the previous
    /// receiver. Without a subscriber notifications are dropped.
    pub fn subscribe(&mut self) -> UnboundedReceiver<LifecycleEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.events = Some(tx);
        rx
    }

    fn emit(&self, event: LifecycleEvent) {
        if let Some(ref tx) = self.events {
            let _ = tx.send(event);
        }
    }

    // ========================================================================
    // Rules
    // ========================================================================

    pub fn rules(&self) -> &[LifecycleRule] {
        &self.rules
    }

    pub fn set_rules(&mut self, rules: Vec<LifecycleRule>) {
        self.rules = rules;
    }

    pub fn add_rule(&mut self, rule: LifecycleRule) {
        self.rules.push(rule);
    }

    /// Remove the first rule for `from → to`; false if there was none
    pub fn remove_rule(&mut self, from: MemoryLevel, to: MemoryLevel) -> bool {
        match self.rules.iter().position(|r| r.from == from && r.to == to) {
            Some(idx) => {
                self.rules.remove(idx);
                true
            }
            None => false,
        }
    }

    pub fn auto_transitions_enabled(&self) -> bool {
        self.enable_auto_transitions
    }

    // ========================================================================
    // Evaluation
    // ========================================================================

    /// Target level if the entity qualifies for an automatic transition now
    pub fn evaluate_transition(&self, entity: &Entity) -> Option<MemoryLevel> {
        self.evaluate_transition_at(entity, Utc::now())
    }

    /// Target level if the entity qualifies for an automatic transition at `now`
    pub fn evaluate_transition_at(
        &self,
        entity: &Entity,
        now: DateTime<Utc>,
    ) -> Option<MemoryLevel> {
        if entity.memory.user_pinned {
            return None;
        }

        let current = entity.memory.memory_level;
        if current.is_terminal() {
            return None;
        }

        let rule = self.rules.iter().find(|r| r.from == current)?;
        rule.conditions
            .satisfied_by(entity, now)
            .then_some(rule.to)
    }

    /// Entities that would transition at `now`, without applying anything
    pub fn due_transitions(
        &self,
        entities: &[Entity],
        now: DateTime<Utc>,
    ) -> Vec<(EntityId, MemoryLevel)> {
        entities
            .iter()
            .filter_map(|e| {
                self.evaluate_transition_at(e, now)
                    .map(|target| (e.id.clone(), target))
            })
            .collect()
    }

    // ========================================================================
    // Transitions
    // ========================================================================

    /// Move an entity to `target`, recording the change
    pub fn transition(
        &self,
        entity: Entity,
        target: MemoryLevel,
        automatic: bool,
        reason: Option<String>,
    ) -> Entity {
        self.transition_at(entity, target, automatic, reason, Utc::now())
    }

    pub fn transition_at(
        &self,
        mut entity: Entity,
        target: MemoryLevel,
        automatic: bool,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> Entity {
        let from = entity.memory.memory_level;
        let record = LifecycleRecord {
            from,
            to: target,
            timestamp: now,
            automatic,
            reason,
        };

        entity.memory.memory_level = target;
        entity.memory.updated_at = now;
        entity.lifecycle_history.push(record.clone());

        tracing::info!(
            "Lifecycle transition {}: {} -> {} ({})",
            entity.id,
            from,
            target,
            if automatic { "automatic" } else { "manual" }
        );

        self.emit(LifecycleEvent::Transition(Box::new(TransitionNotice {
            entity: entity.clone(),
            from,
            to: target,
            record,
        })));

        entity
    }

    /// Human override
    pub fn manual_transition(
        &self,
        entity: Entity,
        target: MemoryLevel,
        reason: impl Into<String>,
    ) -> Entity {
        self.transition(entity, target, false, Some(reason.into()))
    }

    pub fn archive(&self, entity: Entity, reason: impl Into<String>) -> Entity {
        self.manual_transition(entity, MemoryLevel::Archived, reason)
    }

    /// Mark the entity active now, restarting its inactivity window
    pub fn touch(&self, mut entity: Entity) -> Entity {
        let now = Utc::now();
        entity.memory.last_active_at = now;
        entity.memory.updated_at = now;
        entity
    }

    /// Freeze the memory level against automatic transitions
    pub fn pin(&self, mut entity: Entity) -> Entity {
        entity.memory.user_pinned = true;
        entity.memory.updated_at = Utc::now();
        entity
    }

    pub fn unpin(&self, mut entity: Entity) -> Entity {
        entity.memory.user_pinned = false;
        entity.memory.updated_at = Utc::now();
        entity
    }

    /// Evaluate and transition each entity; ineligible entities pass through
    pub fn apply_automatic_transitions(&self, entities: Vec<Entity>) -> Vec<Entity> {
        self.apply_automatic_transitions_at(entities, Utc::now())
    }

    pub fn apply_automatic_transitions_at(
        &self,
        entities: Vec<Entity>,
        now: DateTime<Utc>,
    ) -> Vec<Entity> {
        if !self.enable_auto_transitions {
            return entities;
        }

        entities
            .into_iter()
            .map(|entity| match self.evaluate_transition_at(&entity, now) {
                Some(target) => {
                    let reason = format!(
                        "Automatic transition after {} hours inactive",
                        hours_inactive(&entity, now).round() as i64
                    );
                    self.transition_at(entity, target, true, Some(reason), now)
                }
                None => entity,
            })
            .collect()
    }

    // ========================================================================
    // Ticker
    // ========================================================================

    /// Start the configured periodic ticker. No-op if already running or the
    /// configured interval is zero.
    pub fn start(&mut self) -> Result<()> {
        match self.tick_interval {
            Some(period) => self.start_ticker(period),
            None => Ok(()),
        }
    }

    /// Start a ticker with an explicit period
    pub fn start_ticker(&mut self, period: Duration) -> Result<()> {
        if period.is_zero() {
            return Err(MemvaultError::Config(
                "ticker period must be positive".to_string(),
            ));
        }
        let tx = self.events.clone().ok_or_else(|| {
            MemvaultError::Config(
                "subscribe to the lifecycle engine before starting the ticker".to_string(),
            )
        })?;
        self.ticker.start(period, tx);
        Ok(())
    }

    /// Cancel the ticker; idempotent
    pub fn stop(&mut self) {
        self.ticker.stop();
    }

    pub fn is_ticking(&self) -> bool {
        self.ticker.is_running()
    }
}

impl Default for LifecycleEngine {
    fn default() -> Self {
        Self::new(LifecycleConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    fn entity_at(
        level: MemoryLevel,
        stability: f32,
        importance: f32,
        inactive: ChronoDuration,
        now: DateTime<Utc>,
    ) -> Entity {
        let mut entity = Entity::new("note", "note.md", "Note", now - ChronoDuration::days(30));
        entity.memory.memory_level = level;
        entity.memory.stability_score = stability;
        entity.memory.importance_score = importance;
        entity.memory.last_active_at = now - inactive;
        entity
    }

    #[test]
    fn test_short_term_promotes_to_long_term() {
        let engine = LifecycleEngine::default();
        let now = Utc::now();
        let entity = entity_at(MemoryLevel::ShortTerm, 0.9, 0.9, ChronoDuration::hours(49), now);
        assert_eq!(
            engine.evaluate_transition_at(&entity, now),
            Some(MemoryLevel::LongTerm)
        );
    }

    #[test]
    fn test_pinned_never_transitions() {
        let engine = LifecycleEngine::default();
        let now = Utc::now();
        let mut entity = entity_at(
            MemoryLevel::Transitory,
            1.0,
            1.0,
            ChronoDuration::days(365),
            now,
        );
        entity.memory.user_pinned = true;
        assert_eq!(engine.evaluate_transition_at(&entity, now), None);
    }

    #[test]
    fn test_terminal_levels_never_transition() {
        let mut engine = LifecycleEngine::default();
        engine.add_rule(LifecycleRule::new(
            MemoryLevel::Canonical,
            MemoryLevel::Archived,
            RuleConditions::default(),
        ));
        let now = Utc::now();
        for level in [MemoryLevel::Canonical, MemoryLevel::Archived] {
            let entity = entity_at(level, 1.0, 1.0, ChronoDuration::days(365), now);
            assert_eq!(engine.evaluate_transition_at(&entity, now), None);
        }
    }

    #[test]
    fn test_inactivity_boundary() {
        let engine = LifecycleEngine::default();
        let now = Utc::now();

        // 47.99h
        let almost = entity_at(
            MemoryLevel::Transitory,
            0.5,
            0.5,
            ChronoDuration::milliseconds(172_764_000),
            now,
        );
        assert_eq!(engine.evaluate_transition_at(&almost, now), None);

        let exact = entity_at(MemoryLevel::Transitory, 0.5, 0.5, ChronoDuration::hours(48), now);
        assert_eq!(
            engine.evaluate_transition_at(&exact, now),
            Some(MemoryLevel::Temporary)
        );
    }

    #[test]
    fn test_thresholds_must_all_hold() {
        let engine = LifecycleEngine::default();
        let now = Utc::now();
        let low_importance =
            entity_at(MemoryLevel::ShortTerm, 0.9, 0.39, ChronoDuration::hours(72), now);
        assert_eq!(engine.evaluate_transition_at(&low_importance, now), None);

        let at_threshold =
            entity_at(MemoryLevel::ShortTerm, 0.5, 0.4, ChronoDuration::hours(72), now);
        assert_eq!(
            engine.evaluate_transition_at(&at_threshold, now),
            Some(MemoryLevel::LongTerm)
        );
    }

    #[test]
    fn test_level_without_rule() {
        let mut engine = LifecycleEngine::default();
        assert!(engine.remove_rule(MemoryLevel::Transitory, MemoryLevel::Temporary));
        assert!(!engine.remove_rule(MemoryLevel::Transitory, MemoryLevel::Temporary));

        let now = Utc::now();
        let entity = entity_at(MemoryLevel::Transitory, 1.0, 1.0, ChronoDuration::days(10), now);
        assert_eq!(engine.evaluate_transition_at(&entity, now), None);
    }

    #[test]
    fn test_transition_appends_one_record() {
        let mut engine = LifecycleEngine::default();
        let mut rx = engine.subscribe();
        let now = Utc::now();
        let entity = entity_at(MemoryLevel::Temporary, 0.5, 0.5, ChronoDuration::hours(1), now);
        let before_updated = entity.memory.updated_at;

        let updated = engine.manual_transition(entity, MemoryLevel::Archived, "cleanup");
        assert_eq!(updated.memory.memory_level, MemoryLevel::Archived);
        assert_eq!(updated.lifecycle_history.len(), 1);
        assert!(updated.memory.updated_at > before_updated);

        let record = &updated.lifecycle_history[0];
        assert_eq!(record.from, MemoryLevel::Temporary);
        assert_eq!(record.to, MemoryLevel::Archived);
        assert!(!record.automatic);
        assert_eq!(record.reason.as_deref(), Some("cleanup"));

        match rx.try_recv().unwrap() {
            LifecycleEvent::Transition(notice) => {
                assert_eq!(notice.from, MemoryLevel::Temporary);
                assert_eq!(notice.to, MemoryLevel::Archived);
                assert_eq!(notice.entity, updated);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_archive_from_any_level() {
        let mut engine = LifecycleEngine::default();
        let mut rx = engine.subscribe();
        let mut entity = Entity::new("a", "a.md", "A", Utc::now());
        entity.memory.memory_level = MemoryLevel::Canonical;

        let archived = engine.archive(entity, "superseded");
        assert_eq!(archived.memory.memory_level, MemoryLevel::Archived);
        assert_eq!(archived.access_code().to_string().get(..6), Some("MEM:AR"));

        let record = &archived.lifecycle_history[0];
        assert_eq!(record.from, MemoryLevel::Canonical);
        assert!(!record.automatic);
        assert_eq!(record.reason.as_deref(), Some("superseded"));
        assert!(matches!(
            rx.try_recv(),
            Ok(LifecycleEvent::Transition(notice)) if notice.to == MemoryLevel::Archived
        ));
    }

    #[test]
    fn test_pin_does_not_record_history() {
        let engine = LifecycleEngine::default();
        let entity = Entity::new("a", "a.md", "A", Utc::now());
        let pinned = engine.pin(entity);
        assert!(pinned.memory.user_pinned);
        assert!(pinned.lifecycle_history.is_empty());
        let unpinned = engine.unpin(pinned);
        assert!(!unpinned.memory.user_pinned);
        assert!(unpinned.lifecycle_history.is_empty());
    }

    #[test]
    fn test_apply_is_idempotent() {
        let engine = LifecycleEngine::default();
        let now = Utc::now();
        let entities = vec![
            entity_at(MemoryLevel::Transitory, 0.9, 0.9, ChronoDuration::hours(100), now),
            entity_at(MemoryLevel::ShortTerm, 0.1, 0.1, ChronoDuration::hours(100), now),
        ];

        let first = engine.apply_automatic_transitions_at(entities, now);
        assert_eq!(first[0].memory.memory_level, MemoryLevel::Temporary);
        assert_eq!(
            first[0].lifecycle_history[0].reason.as_deref(),
            Some("Automatic transition after 100 hours inactive")
        );
        assert_eq!(first[1].memory.memory_level, MemoryLevel::ShortTerm);

        let second = engine.apply_automatic_transitions_at(first.clone(), now);
        assert_eq!(second, first);
    }

    #[test]
    fn test_apply_disabled_passes_through() {
        let engine = LifecycleEngine::new(LifecycleConfig {
            enable_auto_transitions: false,
            ..Default::default()
        });
        let now = Utc::now();
        let entities = vec![entity_at(
            MemoryLevel::Transitory,
            1.0,
            1.0,
            ChronoDuration::days(9),
            now,
        )];
        let result = engine.apply_automatic_transitions_at(entities.clone(), now);
        assert_eq!(result, entities);
    }

    #[test]
    fn test_due_transitions() {
        let engine = LifecycleEngine::default();
        let now = Utc::now();
        let mut fresh = entity_at(MemoryLevel::Transitory, 0.5, 0.5, ChronoDuration::hours(1), now);
        fresh.id = "fresh".into();
        let stale = entity_at(MemoryLevel::Transitory, 0.5, 0.5, ChronoDuration::hours(50), now);

        let due = engine.due_transitions(&[fresh, stale], now);
        assert_eq!(due, vec![("note".to_string(), MemoryLevel::Temporary)]);
    }

    #[test]
    fn test_ticker_requires_subscriber() {
        let mut engine = LifecycleEngine::default();
        assert!(matches!(
            engine.start_ticker(Duration::from_secs(1)),
            Err(MemvaultError::Config(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_engine_ticks() {
        let mut engine = LifecycleEngine::new(LifecycleConfig {
            tick_interval_secs: 10,
            ..Default::default()
        });
        let mut rx = engine.subscribe();
        engine.start().unwrap();
        assert!(engine.is_ticking());

        tokio::time::sleep(Duration::from_secs(11)).await;
        assert!(matches!(rx.recv().await, Some(LifecycleEvent::Tick { .. })));

        engine.stop();
        engine.stop();
        assert!(!engine.is_ticking());
    }
}
