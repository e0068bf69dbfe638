//! Rendered entity states
//!
//! Holds the latest [`State`] of every entity, indexed by domain. Writes that
//! repeat the current value keep `last_changed`.

use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, instrument, trace};
use viper_core::{Context, EntityId, State};

use crate::entity::Attributes;

pub struct EntityStateStore {
    states: DashMap<String, State>,
    domain_index: DashMap<String, Vec<String>>,
}

impl EntityStateStore {
    pub fn new() -> Self {
        Self {
            states: DashMap::new(),
            domain_index: DashMap::new(),
        }
    }

    /// Write an entity's state, returning the stored value
    #[instrument(skip(self, state, attributes, context), fields(entity_id = %entity_id))]
    pub fn set(
        &self,
        entity_id: EntityId,
        state: impl Into<String>,
        attributes: Attributes,
        context: Context,
    ) -> State {
        let key = entity_id.to_string();
        let old_state = self.states.get(&key).map(|s| s.clone());

        let new_state = match &old_state {
            Some(existing) => existing.with_update(state, attributes, context),
            None => State::new(entity_id.clone(), state, attributes, context),
        };

        let changed = old_state
            .as_ref()
            .map(|s| s.state != new_state.state)
            .unwrap_or(true);
        if changed {
            debug!(state = %new_state.state, "Entity state changed");
        } else {
            trace!(state = %new_state.state, "Entity state refreshed");
        }

        self.states.insert(key.clone(), new_state.clone());
        if old_state.is_none() {
            self.domain_index
                .entry(entity_id.domain().to_string())
                .or_default()
                .push(key);
        }

        new_state
    }

    pub fn get(&self, entity_id: &str) -> Option<State> {
        self.states.get(entity_id).map(|s| s.clone())
    }

    pub fn get_state(&self, entity_id: &str) -> Option<String> {
        self.states.get(entity_id).map(|s| s.state.clone())
    }

    pub fn is_state(&self, entity_id: &str, state: &str) -> bool {
        self.get_state(entity_id).as_deref() == Some(state)
    }

    pub fn entity_ids(&self, domain: &str) -> Vec<String> {
        self.domain_index
            .get(domain)
            .map(|v| v.clone())
            .unwrap_or_default()
    }

    pub fn domain_states(&self, domain: &str) -> Vec<State> {
        self.entity_ids(domain)
            .iter()
            .filter_map(|id| self.get(id))
            .collect()
    }

    pub fn all(&self) -> Vec<State> {
        self.states.iter().map(|r| r.value().clone()).collect()
    }

    #[instrument(skip(self), fields(entity_id = %entity_id))]
    pub fn remove(&self, entity_id: &EntityId) -> Option<State> {
        let key = entity_id.to_string();
        let old_state = self.states.remove(&key).map(|(_, s)| s);
        if old_state.is_some() {
            if let Some(mut ids) = self.domain_index.get_mut(entity_id.domain()) {
                ids.retain(|id| id != &key);
            }
            trace!("Removed entity state");
        }
        old_state
    }

    pub fn entity_count(&self) -> usize {
        self.states.len()
    }
}

impl Default for EntityStateStore {
    fn default() -> Self {
        Self::new()
    }
}

pub type SharedEntityStateStore = Arc<EntityStateStore>;
