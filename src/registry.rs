//! Entity registry
//!
//! Holds the tracked celebrities and keywords. `add` and `remove` are the only
//! writers; readers take an immutable [`RegistrySnapshot`] so a post is matched
//! against one consistent view even while the registry changes underneath.
//! Changes apply to posts processed after them, never retroactively.

use chrono::Utc;
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, PoisonError, RwLock};
use thiserror::Error;

use crate::models::{EntityId, EntityKind, TrackedEntity};

/// Registry errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Unknown entity: {0}")]
    UnknownEntity(String),
}

/// Immutable view of the active entities, as read by the matcher
#[derive(Debug, Clone, Default)]
pub struct RegistrySnapshot {
    celebrities: BTreeSet<String>,
    keywords: BTreeSet<String>,
}

impl RegistrySnapshot {
    /// Active celebrity usernames (lowercase, no `@`)
    pub fn celebrities(&self) -> impl Iterator<Item = &str> {
        self.celebrities.iter().map(String::as_str)
    }

    /// Active keywords (lowercase, trimmed)
    pub fn keywords(&self) -> impl Iterator<Item = &str> {
        self.keywords.iter().map(String::as_str)
    }

    #[must_use]
    pub fn has_celebrity(&self, username: &str) -> bool {
        self.celebrities.contains(username)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.celebrities.is_empty() && self.keywords.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.celebrities.len() + self.keywords.len()
    }
}

struct RegistryState {
    entities: HashMap<EntityId, TrackedEntity>,
    snapshot: Arc<RegistrySnapshot>,
}

impl RegistryState {
    fn rebuild_snapshot(&mut self) {
        let mut snapshot = RegistrySnapshot::default();
        for entity in self.entities.values().filter(|e| e.active) {
            match entity.kind() {
                EntityKind::Celebrity => snapshot.celebrities.insert(entity.id.name().to_string()),
                EntityKind::Keyword => snapshot.keywords.insert(entity.id.name().to_string()),
            };
        }
        self.snapshot = Arc::new(snapshot);
    }
}

/// Registry of tracked entities
pub struct EntityRegistry {
    state: RwLock<RegistryState>,
}

impl EntityRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            state: RwLock::new(RegistryState {
                entities: HashMap::new(),
                snapshot: Arc::new(RegistrySnapshot::default()),
            }),
        }
    }

    /// Build a registry from previously persisted entities
    pub fn from_entities(entities: impl IntoIterator<Item = TrackedEntity>) -> Self {
        let registry = Self::new();
        {
            let mut state = registry.state.write().unwrap_or_else(PoisonError::into_inner);
            for entity in entities {
                state.entities.insert(entity.id.clone(), entity);
            }
            state.rebuild_snapshot();
        }
        registry
    }

    /// Track an entity, reactivating it if it was removed earlier
    ///
    /// Adding an already-active entity is a no-op that returns the current record.
    pub fn add(&self, id: EntityId) -> TrackedEntity {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);

        let entity = state
            .entities
            .entry(id.clone())
            .and_modify(|e| {
                if !e.active {
                    e.active = true;
                    e.removed_at = None;
                }
            })
            .or_insert_with(|| TrackedEntity::new(id))
            .clone();

        state.rebuild_snapshot();
        tracing::info!(entity = %entity.id, kind = %entity.kind(), "Entity tracked");
        entity
    }

    /// Deactivate an entity
    ///
    /// The record is kept so historical aggregates referencing it stay valid.
    pub fn remove(&self, id: &EntityId) -> Result<TrackedEntity, RegistryError> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);

        let entity = state
            .entities
            .get_mut(id)
            .ok_or_else(|| RegistryError::UnknownEntity(id.to_string()))?;

        if entity.active {
            entity.active = false;
            entity.removed_at = Some(Utc::now());
        }
        let entity = entity.clone();

        state.rebuild_snapshot();
        tracing::info!(entity = %entity.id, "Entity deactivated");
        Ok(entity)
    }

    /// Look up an entity, active or not
    pub fn get(&self, id: &EntityId) -> Option<TrackedEntity> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        state.entities.get(id).cloned()
    }

    /// Active entities ordered by identifier
    pub fn list_active(&self) -> Vec<TrackedEntity> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        let mut active: Vec<_> = state.entities.values().filter(|e| e.active).cloned().collect();
        active.sort_by(|a, b| a.id.cmp(&b.id));
        active
    }

    /// All known entities, including deactivated ones
    pub fn list_all(&self) -> Vec<TrackedEntity> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        let mut all: Vec<_> = state.entities.values().cloned().collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        all
    }

    /// Current view of the active entities
    pub fn snapshot(&self) -> Arc<RegistrySnapshot> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&state.snapshot)
    }
}

impl Default for EntityRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Thread-safe shared registry
pub type SharedRegistry = Arc<EntityRegistry>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_and_list_active() {
        let registry = EntityRegistry::new();
        registry.add(EntityId::keyword("doge"));
        registry.add(EntityId::celebrity("elonmusk"));

        let active = registry.list_active();
        assert_eq!(active.len(), 2);
        assert!(active.iter().all(|e| e.active));

        let snapshot = registry.snapshot();
        assert!(snapshot.has_celebrity("elonmusk"));
        assert_eq!(snapshot.keywords().collect::<Vec<_>>(), vec!["doge"]);
    }

    #[test]
    fn test_add_is_idempotent() {
        let registry = EntityRegistry::new();
        let first = registry.add(EntityId::keyword("doge"));
        let second = registry.add(EntityId::keyword("DOGE "));
        assert_eq!(first.added_at, second.added_at);
        assert_eq!(registry.list_all().len(), 1);
    }

    #[test]
    fn test_remove_deactivates_without_deleting() {
        let registry = EntityRegistry::new();
        let id = EntityId::celebrity("elonmusk");
        registry.add(id.clone());

        let removed = registry.remove(&id).unwrap();
        assert!(!removed.active);
        assert!(removed.removed_at.is_some());

        assert!(registry.list_active().is_empty());
        assert_eq!(registry.list_all().len(), 1);
        assert!(!registry.snapshot().has_celebrity("elonmusk"));
    }

    #[test]
    fn test_remove_unknown_entity() {
        let registry = EntityRegistry::new();
        let err = registry.remove(&EntityId::keyword("shib")).unwrap_err();
        assert_eq!(err, RegistryError::UnknownEntity("shib".to_string()));
    }

    #[test]
    fn test_readd_reactivates() {
        let registry = EntityRegistry::new();
        let id = EntityId::keyword("pepe");
        registry.add(id.clone());
        registry.remove(&id).unwrap();

        let readded = registry.add(id.clone());
        assert!(readded.active);
        assert!(readded.removed_at.is_none());
        assert!(registry.snapshot().keywords().any(|k| k == "pepe"));
    }

    #[test]
    fn test_snapshot_is_not_affected_by_later_changes() {
        let registry = EntityRegistry::new();
        registry.add(EntityId::keyword("doge"));
        let before = registry.snapshot();

        registry.add(EntityId::keyword("bonk"));
        assert_eq!(before.len(), 1);
        assert_eq!(registry.snapshot().len(), 2);
    }

    #[test]
    fn test_from_entities_skips_inactive_in_snapshot() {
        let mut inactive = TrackedEntity::new(EntityId::keyword("floki"));
        inactive.active = false;
        let registry = EntityRegistry::from_entities(vec![
            TrackedEntity::new(EntityId::keyword("doge")),
            inactive,
        ]);

        assert_eq!(registry.snapshot().len(), 1);
        assert_eq!(registry.list_all().len(), 2);
    }
}
