//! Entity identity and storage
//!
//! Entities live in a shared table so native callbacks invoked from managed
//! code can reach them while the registry is mid-iteration.

use crate::math::Transform;
use std::cell::{Ref, RefCell, RefMut};
use std::collections::HashMap;
use std::fmt;
use std::rc::{Rc, Weak};

/// Entity id (opaque, assigned by the registry, never reused)
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntityId(u64);

impl EntityId {
    pub const fn from_raw(id: u64) -> Self {
        Self(id)
    }

    /// The raw value passed to managed delegates.
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A named object with transform state.
#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    id: EntityId,
    name: String,
    pub transform: Transform,
}

impl Entity {
    pub(crate) fn new(id: EntityId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            transform: Transform::default(),
        }
    }

    pub fn id(&self) -> EntityId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }
}

pub(crate) type EntityTable = HashMap<EntityId, Entity>;

/// Strong handle to the entity table, held by the registry only.
#[derive(Default)]
pub(crate) struct EntityTableHandle(Rc<RefCell<EntityTable>>);

impl EntityTableHandle {
    pub fn borrow(&self) -> Ref<'_, EntityTable> {
        self.0.borrow()
    }

    pub fn borrow_mut(&self) -> RefMut<'_, EntityTable> {
        self.0.borrow_mut()
    }

    pub fn downgrade(&self) -> EntityTableRef {
        EntityTableRef(Rc::downgrade(&self.0))
    }
}

/// Non-owning view of a registry's entities.
///
/// Upgrades to nothing once the registry is dropped, so callbacks holding
/// one can never touch freed entities.
#[derive(Clone, Default)]
pub struct EntityTableRef(Weak<RefCell<EntityTable>>);

impl EntityTableRef {
    /// Whether the owning registry is still alive.
    pub fn is_alive(&self) -> bool {
        self.0.strong_count() > 0
    }

    /// Copy of an entity's transform.
    ///
    /// `None` if the registry is gone, the entity is unknown, or the table is
    /// currently borrowed mutably.
    pub fn transform(&self, id: EntityId) -> Option<Transform> {
        let table = self.0.upgrade()?;
        let table = table.try_borrow().ok()?;
        table.get(&id).map(|entity| entity.transform)
    }

    /// Overwrite an entity's transform. Returns false when the write could
    /// not happen for the same reasons [`Self::transform`] returns `None`.
    pub fn set_transform(&self, id: EntityId, transform: Transform) -> bool {
        let Some(table) = self.0.upgrade() else {
            return false;
        };
        let Ok(mut table) = table.try_borrow_mut() else {
            return false;
        };
        match table.get_mut(&id) {
            Some(entity) => {
                entity.transform = transform;
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, id: EntityId) -> bool {
        let Some(table) = self.0.upgrade() else {
            return false;
        };
        let found = match table.try_borrow() {
            Ok(table) => table.contains_key(&id),
            Err(_) => false,
        };
        found
    }
}

impl fmt::Debug for EntityTableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityTableRef")
            .field("alive", &self.is_alive())
            .finish()
    }
}
