//! Mochi Scripting Host
//!
//! Embeds a managed (.NET CoreCLR) runtime and connects it to the entity
//! scene in `mochi_core`:
//! - Runtime loading, trusted assembly discovery and lifecycle
//! - Typed delegates into managed static methods
//! - Native callbacks that managed scripts use to reach entities
//! - A versioned C function table for native callers
//!
//! Everything here is single-threaded. Hosts and registries stay on the
//! thread that created them.

pub mod bindings;
pub mod delegate;
mod error;
pub mod exports;
pub mod ffi;
pub mod module;
mod options;
pub mod runtime;
pub mod tpa;

#[cfg(test)]
pub(crate) mod testing;

pub use bindings::{NativeCallbackTable, ScriptBindings};
pub use delegate::{DelegateBridge, DelegateDescriptor, LifecycleDelegates, ManagedFn, Signature};
pub use error::HostError;
pub use exports::{mochi_host_api, HostLibrary, MochiHostApi, MOCHI_HOST_API_VERSION};
pub use options::HostOptions;
pub use runtime::RuntimeHost;
