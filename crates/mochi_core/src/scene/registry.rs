//! Entity registry
//!
//! Owns every entity and the script bindings attached to them. Destroying an
//! entity always stops and detaches its script first, so no binding can
//! outlive the entity it refers to.

use crate::math::Transform;
use crate::scene::entity::EntityTableHandle;
use crate::scene::{
    Entity, EntityId, EntityTableRef, ManagedInstance, ScriptDelegates, ScriptLifecycleManager,
};
use std::cell::{Ref, RefMut};

pub struct EntityRegistry {
    next_entity_id: u64,
    table: EntityTableHandle,
    scripts: ScriptLifecycleManager,
}

impl EntityRegistry {
    pub fn new() -> Self {
        Self {
            next_entity_id: 1,
            table: EntityTableHandle::default(),
            scripts: ScriptLifecycleManager::new(),
        }
    }

    /// Create an entity with an identity transform.
    pub fn create_entity(&mut self, name: impl Into<String>) -> EntityId {
        let id = EntityId::from_raw(self.next_entity_id);
        self.next_entity_id += 1;

        let entity = Entity::new(id, name);
        tracing::info!("Created entity '{}' (id {})", entity.name(), id);
        self.table.borrow_mut().insert(id, entity);
        id
    }

    /// Stop and detach the entity's script, then remove the entity.
    ///
    /// Unknown ids are ignored. Returns whether an entity was removed.
    pub fn destroy_entity(&mut self, id: EntityId) -> bool {
        if !self.contains(id) {
            return false;
        }

        self.scripts.stop_entity(id);
        self.scripts.detach_script(id);

        let removed = self.table.borrow_mut().remove(&id);
        if let Some(entity) = &removed {
            tracing::info!("Destroyed entity '{}' (id {})", entity.name(), id);
        }
        removed.is_some()
    }

    pub fn entity(&self, id: EntityId) -> Option<Ref<'_, Entity>> {
        Ref::filter_map(self.table.borrow(), |table| table.get(&id)).ok()
    }

    pub fn entity_mut(&self, id: EntityId) -> Option<RefMut<'_, Entity>> {
        RefMut::filter_map(self.table.borrow_mut(), |table| table.get_mut(&id)).ok()
    }

    pub fn transform(&self, id: EntityId) -> Option<Transform> {
        self.entity(id).map(|entity| entity.transform)
    }

    pub fn set_transform(&self, id: EntityId, transform: Transform) -> bool {
        match self.entity_mut(id) {
            Some(mut entity) => {
                entity.transform = transform;
                true
            }
            None => false,
        }
    }

    /// First entity with the given name, if any.
    pub fn find_by_name(&self, name: &str) -> Option<EntityId> {
        self.table
            .borrow()
            .values()
            .filter(|entity| entity.name() == name)
            .map(Entity::id)
            .min()
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.table.borrow().contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.table.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Live entity ids in ascending order.
    pub fn ids(&self) -> Vec<EntityId> {
        let mut ids: Vec<EntityId> = self.table.borrow().keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Weak view of the entity table for native callbacks.
    pub fn table(&self) -> EntityTableRef {
        self.table.downgrade()
    }

    pub fn scripts(&self) -> &ScriptLifecycleManager {
        &self.scripts
    }

    /// Attach a script to a live entity. Unknown ids are refused.
    pub fn attach_script(
        &mut self,
        id: EntityId,
        script_type: impl Into<String>,
        instance: ManagedInstance,
    ) -> bool {
        if !self.contains(id) {
            tracing::warn!("Cannot attach script: entity {} does not exist", id);
            return false;
        }
        self.scripts.attach_script(id, script_type, instance);
        true
    }

    pub fn set_script_delegates(&mut self, id: EntityId, delegates: ScriptDelegates) -> bool {
        self.scripts.set_script_delegates(id, delegates)
    }

    pub fn detach_script(&mut self, id: EntityId) -> bool {
        self.scripts.detach_script(id).is_some()
    }

    pub fn start_entity(&mut self, id: EntityId) -> bool {
        self.scripts.start_entity(id)
    }

    pub fn update_entity(&self, id: EntityId, delta_time: f32) -> bool {
        self.scripts.update_entity(id, delta_time)
    }

    pub fn stop_entity(&mut self, id: EntityId) -> bool {
        self.scripts.stop_entity(id)
    }

    pub fn start_all(&mut self) -> usize {
        self.scripts.start_all()
    }

    pub fn update_all(&self, delta_time: f32) -> usize {
        self.scripts.update_all(delta_time)
    }

    pub fn stop_all(&mut self) -> usize {
        self.scripts.stop_all()
    }

    /// Remove every script binding and entity.
    ///
    /// With `invoke_stop` false no managed code runs, which is what a
    /// teardown after the runtime has shut down needs.
    pub fn shutdown(&mut self, invoke_stop: bool) {
        if invoke_stop {
            self.scripts.stop_all();
        }
        self.scripts.clear();
        self.table.borrow_mut().clear();
        tracing::info!("Entity registry shut down");
    }
}

impl Default for EntityRegistry {
    fn default() -> Self {
        Self::new()
    }
}
