//! Runtime module loading
//!
//! Symbol lookup is a capability: a [`RuntimeModule`] either resolves a name
//! to an address or reports that it cannot. The production loader wraps
//! `libloading`; tests substitute an in-process module.

use crate::HostError;
use libloading::Library;
use std::ffi::c_void;
use std::path::{Path, PathBuf};

/// A loaded shared module that can resolve exported symbols by name.
pub trait RuntimeModule {
    /// Path the module was loaded from.
    fn path(&self) -> &Path;

    /// Address of an exported symbol, or `None` if it is not exported.
    fn resolve(&self, symbol: &str) -> Option<*mut c_void>;
}

/// Loads runtime modules from disk.
pub trait ModuleLoader {
    fn load(&self, path: &Path) -> Result<Box<dyn RuntimeModule>, HostError>;
}

/// Loader backed by the platform dynamic linker.
#[derive(Debug, Default, Clone, Copy)]
pub struct LibraryLoader;

impl ModuleLoader for LibraryLoader {
    fn load(&self, path: &Path) -> Result<Box<dyn RuntimeModule>, HostError> {
        // Loading runs the module's initializers; the runtime module is
        // trusted input supplied by the embedding application.
        let library = unsafe { Library::new(path) }.map_err(|err| HostError::ModuleLoad {
            path: path.to_path_buf(),
            source: Box::new(err),
        })?;
        tracing::debug!("Loaded runtime module {}", path.display());
        Ok(Box::new(LibraryModule {
            path: path.to_path_buf(),
            library,
        }))
    }
}

struct LibraryModule {
    path: PathBuf,
    library: Library,
}

impl RuntimeModule for LibraryModule {
    fn path(&self) -> &Path {
        &self.path
    }

    fn resolve(&self, symbol: &str) -> Option<*mut c_void> {
        let address = unsafe { self.library.get::<*mut c_void>(symbol.as_bytes()) }
            .ok()
            .map(|sym| *sym)?;
        (!address.is_null()).then_some(address)
    }
}
