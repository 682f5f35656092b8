//! FFI layer between the host and the runtime module
//!
//! The four hosting entry points are resolved once, right after the module
//! is loaded, into a [`CoreClrApi`] table.

use crate::module::RuntimeModule;
use crate::HostError;
use std::ffi::{c_char, c_int, c_uint, c_void};

pub type InitializeFn = unsafe extern "system" fn(
    exe_path: *const c_char,
    app_domain_friendly_name: *const c_char,
    property_count: c_int,
    property_keys: *const *const c_char,
    property_values: *const *const c_char,
    host_handle: *mut *mut c_void,
    domain_id: *mut c_uint,
) -> c_int;

pub type ShutdownFn =
    unsafe extern "system" fn(host_handle: *mut c_void, domain_id: c_uint) -> c_int;

pub type CreateDelegateFn = unsafe extern "system" fn(
    host_handle: *mut c_void,
    domain_id: c_uint,
    entry_point_assembly_name: *const c_char,
    entry_point_type_name: *const c_char,
    entry_point_method_name: *const c_char,
    delegate: *mut *mut c_void,
) -> c_int;

pub type ExecuteAssemblyFn = unsafe extern "system" fn(
    host_handle: *mut c_void,
    domain_id: c_uint,
    argc: c_int,
    argv: *const *const c_char,
    managed_assembly_path: *const c_char,
    exit_code: *mut c_uint,
) -> c_int;

pub const INITIALIZE_SYMBOL: &str = "coreclr_initialize";
pub const SHUTDOWN_SYMBOL: &str = "coreclr_shutdown";
pub const CREATE_DELEGATE_SYMBOL: &str = "coreclr_create_delegate";
pub const EXECUTE_ASSEMBLY_SYMBOL: &str = "coreclr_execute_assembly";

/// Hosting entry points of a loaded runtime module.
#[derive(Clone, Copy)]
pub struct CoreClrApi {
    pub initialize: InitializeFn,
    pub shutdown: ShutdownFn,
    pub create_delegate: CreateDelegateFn,
    pub execute_assembly: ExecuteAssemblyFn,
}

impl CoreClrApi {
    /// Resolve all four entry points, failing on the first missing one.
    ///
    /// # Safety
    /// The module must export these symbols with the hosting signatures above.
    pub unsafe fn resolve(module: &dyn RuntimeModule) -> Result<Self, HostError> {
        Ok(Self {
            initialize: std::mem::transmute::<*mut c_void, InitializeFn>(lookup(
                module,
                INITIALIZE_SYMBOL,
            )?),
            shutdown: std::mem::transmute::<*mut c_void, ShutdownFn>(lookup(
                module,
                SHUTDOWN_SYMBOL,
            )?),
            create_delegate: std::mem::transmute::<*mut c_void, CreateDelegateFn>(lookup(
                module,
                CREATE_DELEGATE_SYMBOL,
            )?),
            execute_assembly: std::mem::transmute::<*mut c_void, ExecuteAssemblyFn>(lookup(
                module,
                EXECUTE_ASSEMBLY_SYMBOL,
            )?),
        })
    }
}

fn lookup(module: &dyn RuntimeModule, symbol: &'static str) -> Result<*mut c_void, HostError> {
    module.resolve(symbol).ok_or_else(|| HostError::MissingSymbol {
        module: module.path().to_path_buf(),
        symbol,
    })
}
