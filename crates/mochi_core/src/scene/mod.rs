//! Scene layer
//!
//! Native entities plus the managed scripts that drive them.

mod entity;
mod registry;
mod script;

pub use entity::{Entity, EntityId, EntityTableRef};
pub use registry::EntityRegistry;
pub use script::{
    EntityStartFn, EntityStopFn, EntityUpdateFn, ManagedInstance, ScriptBinding, ScriptDelegates,
    ScriptLifecycleManager,
};
