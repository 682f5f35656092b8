//! Script lifecycle management
//!
//! Each entity can carry one managed script instance plus start/update/stop
//! delegates. The manager only holds non-owning references: the entity id,
//! the delegate pointers, and the opaque managed instance.
//!
//! State per entity id:
//!
//! ```text
//! Detached -> Attached(not started) <-> Attached(started)
//!                 \______ detach / entity destroyed ______/
//! ```

use crate::scene::EntityId;
use std::collections::HashMap;
use std::ffi::c_void;
use std::ptr;

/// Managed `Start(ulong entityId)`
pub type EntityStartFn = extern "system" fn(entity_id: u64);
/// Managed `Update(ulong entityId, float deltaTime)`
pub type EntityUpdateFn = extern "system" fn(entity_id: u64, delta_time: f32);
/// Managed `Stop(ulong entityId)`
pub type EntityStopFn = extern "system" fn(entity_id: u64);

/// Opaque reference to a managed object (GC handle or pinned pointer).
///
/// Never dereferenced on the native side.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ManagedInstance(*mut c_void);

impl ManagedInstance {
    pub const fn null() -> Self {
        Self(ptr::null_mut())
    }

    pub fn from_raw(ptr: *mut c_void) -> Self {
        Self(ptr)
    }

    pub fn as_ptr(self) -> *mut c_void {
        self.0
    }

    pub fn is_null(self) -> bool {
        self.0.is_null()
    }
}

impl Default for ManagedInstance {
    fn default() -> Self {
        Self::null()
    }
}

/// The three lifecycle entry points of a script.
#[derive(Debug, Copy, Clone, Default)]
pub struct ScriptDelegates {
    pub start: Option<EntityStartFn>,
    pub update: Option<EntityUpdateFn>,
    pub stop: Option<EntityStopFn>,
}

impl ScriptDelegates {
    pub fn new(start: EntityStartFn, update: EntityUpdateFn, stop: EntityStopFn) -> Self {
        Self {
            start: Some(start),
            update: Some(update),
            stop: Some(stop),
        }
    }
}

/// Association between an entity and its managed script.
#[derive(Debug, Clone)]
pub struct ScriptBinding {
    script_type: String,
    instance: ManagedInstance,
    delegates: ScriptDelegates,
    started: bool,
}

impl ScriptBinding {
    fn new(script_type: String, instance: ManagedInstance) -> Self {
        Self {
            script_type,
            instance,
            delegates: ScriptDelegates::default(),
            started: false,
        }
    }

    pub fn script_type(&self) -> &str {
        &self.script_type
    }

    pub fn instance(&self) -> ManagedInstance {
        self.instance
    }

    pub fn delegates(&self) -> &ScriptDelegates {
        &self.delegates
    }

    pub fn is_started(&self) -> bool {
        self.started
    }
}

/// Drives start/update/stop for every entity with an attached script.
///
/// All operations are synchronous; a delegate runs to completion on the
/// calling thread before the call returns.
#[derive(Debug, Default)]
pub struct ScriptLifecycleManager {
    bindings: HashMap<EntityId, ScriptBinding>,
}

impl ScriptLifecycleManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a script in the "not started" state.
    ///
    /// An existing binding for the same id is replaced without invoking its
    /// stop delegate; callers should detach first.
    pub fn attach_script(
        &mut self,
        entity: EntityId,
        script_type: impl Into<String>,
        instance: ManagedInstance,
    ) {
        let script_type = script_type.into();
        let binding = ScriptBinding::new(script_type.clone(), instance);
        if let Some(previous) = self.bindings.insert(entity, binding) {
            tracing::warn!(
                "Entity {} already had script '{}' attached; replaced by '{}'",
                entity,
                previous.script_type,
                script_type
            );
        } else {
            tracing::debug!("Attached script '{}' to entity {}", script_type, entity);
        }
    }

    /// Store lifecycle delegates on an existing binding. The started flag is
    /// left untouched.
    pub fn set_script_delegates(&mut self, entity: EntityId, delegates: ScriptDelegates) -> bool {
        match self.bindings.get_mut(&entity) {
            Some(binding) => {
                binding.delegates = delegates;
                tracing::debug!("Set delegates for entity {}", entity);
                true
            }
            None => {
                tracing::warn!(
                    "Cannot set delegates: entity {} has no script attached",
                    entity
                );
                false
            }
        }
    }

    /// Invoke the start delegate once. Returns whether it fired.
    pub fn start_entity(&mut self, entity: EntityId) -> bool {
        let Some(binding) = self.bindings.get_mut(&entity) else {
            return false;
        };
        if binding.started {
            return false;
        }
        let Some(start) = binding.delegates.start else {
            return false;
        };

        start(entity.get());
        binding.started = true;
        tracing::debug!("Started entity {}", entity);
        true
    }

    /// Invoke the update delegate if the script is running.
    pub fn update_entity(&self, entity: EntityId, delta_time: f32) -> bool {
        match self.bindings.get(&entity) {
            Some(ScriptBinding {
                started: true,
                delegates: ScriptDelegates {
                    update: Some(update),
                    ..
                },
                ..
            }) => {
                update(entity.get(), delta_time);
                true
            }
            _ => false,
        }
    }

    /// Invoke the stop delegate if the script is running. Returns whether it
    /// fired.
    pub fn stop_entity(&mut self, entity: EntityId) -> bool {
        let Some(binding) = self.bindings.get_mut(&entity) else {
            return false;
        };
        if !binding.started {
            return false;
        }
        let Some(stop) = binding.delegates.stop else {
            return false;
        };

        stop(entity.get());
        binding.started = false;
        tracing::debug!("Stopped entity {}", entity);
        true
    }

    /// Remove the binding. Never invokes the stop delegate: during teardown
    /// the managed side may already be gone.
    pub fn detach_script(&mut self, entity: EntityId) -> Option<ScriptBinding> {
        let removed = self.bindings.remove(&entity);
        if let Some(binding) = &removed {
            if binding.started {
                tracing::debug!(
                    "Detached running script from entity {} without stopping it",
                    entity
                );
            } else {
                tracing::debug!("Detached script from entity {}", entity);
            }
        }
        removed
    }

    /// Start every bound script. Returns how many start delegates fired.
    pub fn start_all(&mut self) -> usize {
        self.bound_ids()
            .into_iter()
            .filter(|&id| self.start_entity(id))
            .count()
    }

    /// Update every running script. Returns how many update delegates fired.
    pub fn update_all(&self, delta_time: f32) -> usize {
        self.bound_ids()
            .into_iter()
            .filter(|&id| self.update_entity(id, delta_time))
            .count()
    }

    /// Stop every running script. Returns how many stop delegates fired.
    pub fn stop_all(&mut self) -> usize {
        self.bound_ids()
            .into_iter()
            .filter(|&id| self.stop_entity(id))
            .count()
    }

    /// Drop every binding without invoking any delegate.
    pub fn clear(&mut self) {
        self.bindings.clear();
    }

    pub fn binding(&self, entity: EntityId) -> Option<&ScriptBinding> {
        self.bindings.get(&entity)
    }

    pub fn is_attached(&self, entity: EntityId) -> bool {
        self.bindings.contains_key(&entity)
    }

    pub fn is_started(&self, entity: EntityId) -> bool {
        self.bindings.get(&entity).is_some_and(|b| b.started)
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Snapshot of bound ids in ascending order, so batch operations never
    /// iterate the live map.
    fn bound_ids(&self) -> Vec<EntityId> {
        let mut ids: Vec<EntityId> = self.bindings.keys().copied().collect();
        ids.sort_unstable();
        ids
    }
}
