//! Mochi Core
//!
//! Native-side state that managed scripts operate on:
//! - Entities with transform state
//! - Script bindings and their start/update/stop lifecycle
//! - Fixed-step frame time
//!
//! Nothing here knows about the managed runtime itself; lifecycle delegates
//! are plain `extern "system"` function pointers.

pub mod math;
pub mod scene;
pub mod time;

pub use glam;

/// Engine version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
