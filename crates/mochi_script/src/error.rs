use crate::delegate::Signature;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while hosting the managed runtime.
#[derive(Debug, Error)]
pub enum HostError {
    #[error("runtime host is already initialized")]
    AlreadyInitialized,

    #[error("runtime host is not initialized")]
    NotInitialized,

    #[error("failed to load runtime module '{}'", .path.display())]
    ModuleLoad {
        path: PathBuf,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("runtime module '{}' does not export '{symbol}'", .module.display())]
    MissingSymbol {
        module: PathBuf,
        symbol: &'static str,
    },

    #[error("runtime initialization failed with status {status:#010x}")]
    InitializeFailed { status: i32 },

    #[error("runtime reported status {status:#010x} but returned no host handle")]
    NullHostHandle { status: i32 },

    #[error("executing assembly '{}' failed with status {status:#010x}", .path.display())]
    ExecuteFailed { path: PathBuf, status: i32 },

    #[error("cannot bind {type_name}.{method} from assembly '{assembly}' (status {status:#010x})")]
    DelegateUnavailable {
        assembly: String,
        type_name: String,
        method: String,
        status: i32,
    },

    #[error("runtime returned a null delegate for {type_name}.{method}")]
    NullDelegate { type_name: String, method: String },

    #[error("{type_name}.{method} is declared as {declared} but was requested as {requested}")]
    SignatureMismatch {
        type_name: String,
        method: String,
        declared: Signature,
        requested: Signature,
    },

    #[error("{what} contains an interior nul byte")]
    InvalidString { what: &'static str },

    #[error("host library '{}' exports API v{found}, expected v{expected}", .path.display())]
    ApiVersionMismatch {
        path: PathBuf,
        found: u32,
        expected: u32,
    },
}
