//! C-callable host API
//!
//! Native callers that link this crate as a shared library get one
//! versioned function table from [`mochi_host_api`]. Hosts are opaque
//! pointers created and destroyed through the table; every entry checks its
//! pointers, turns errors into `false` and never lets a panic cross the
//! boundary.

use crate::delegate::DelegateBridge;
use crate::module::{LibraryLoader, ModuleLoader, RuntimeModule};
use crate::{HostError, HostOptions, RuntimeHost};
use std::ffi::{c_char, c_void, CStr};
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::ptr;

pub const MOCHI_HOST_API_VERSION: u32 = 1;
pub const HOST_API_SYMBOL: &str = "mochi_host_api";

pub type HostApiEntryFn = unsafe extern "C" fn() -> *const MochiHostApi;

#[repr(C)]
pub struct MochiHostApi {
    pub version: u32,
    pub create_host: unsafe extern "C" fn() -> *mut RuntimeHost,
    pub destroy_host: unsafe extern "C" fn(host: *mut RuntimeHost),
    pub initialize: unsafe extern "C" fn(
        host: *mut RuntimeHost,
        runtime_dir: *const c_char,
        entry_assembly: *const c_char,
    ) -> bool,
    pub shutdown: unsafe extern "C" fn(host: *mut RuntimeHost),
    pub execute_assembly: unsafe extern "C" fn(
        host: *mut RuntimeHost,
        assembly_path: *const c_char,
        exit_code: *mut u32,
    ) -> bool,
    pub create_delegate: unsafe extern "C" fn(
        host: *mut RuntimeHost,
        assembly: *const c_char,
        type_name: *const c_char,
        method: *const c_char,
        delegate: *mut *mut c_void,
    ) -> bool,
    pub is_initialized: unsafe extern "C" fn(host: *const RuntimeHost) -> bool,
}

static HOST_API: MochiHostApi = MochiHostApi {
    version: MOCHI_HOST_API_VERSION,
    create_host: api_create_host,
    destroy_host: api_destroy_host,
    initialize: api_initialize,
    shutdown: api_shutdown,
    execute_assembly: api_execute_assembly,
    create_delegate: api_create_delegate,
    is_initialized: api_is_initialized,
};

/// Entry point of the shared library.
#[no_mangle]
pub extern "C" fn mochi_host_api() -> *const MochiHostApi {
    &HOST_API
}

/// Run `f`, mapping a panic to `fallback`.
fn guarded<R>(entry: &str, fallback: R, f: impl FnOnce() -> R) -> R {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(_) => {
            tracing::error!("Panic in host API entry '{}'", entry);
            fallback
        }
    }
}

/// Log a failed call and report `false`.
fn report(entry: &str, result: Result<(), HostError>) -> bool {
    match result {
        Ok(()) => true,
        Err(err) => {
            tracing::error!("{} failed: {}", entry, err);
            false
        }
    }
}

/// # Safety
/// `ptr` is null or a NUL-terminated string that outlives `'a`.
unsafe fn utf8<'a>(ptr: *const c_char, entry: &str) -> Option<&'a str> {
    if ptr.is_null() {
        tracing::error!("{}: null string argument", entry);
        return None;
    }
    match CStr::from_ptr(ptr).to_str() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::error!("{}: string argument is not valid UTF-8", entry);
            None
        }
    }
}

unsafe extern "C" fn api_create_host() -> *mut RuntimeHost {
    guarded("create_host", ptr::null_mut(), || {
        Box::into_raw(Box::new(RuntimeHost::new(HostOptions::default())))
    })
}

unsafe extern "C" fn api_destroy_host(host: *mut RuntimeHost) {
    if host.is_null() {
        return;
    }
    guarded("destroy_host", (), || drop(Box::from_raw(host)))
}

unsafe extern "C" fn api_initialize(
    host: *mut RuntimeHost,
    runtime_dir: *const c_char,
    entry_assembly: *const c_char,
) -> bool {
    guarded("initialize", false, || {
        let Some(host) = host.as_mut() else {
            tracing::error!("initialize: null host");
            return false;
        };
        let (Some(runtime_dir), Some(entry_assembly)) = (
            utf8(runtime_dir, "initialize"),
            utf8(entry_assembly, "initialize"),
        ) else {
            return false;
        };
        report("initialize", host.initialize(runtime_dir, entry_assembly))
    })
}

unsafe extern "C" fn api_shutdown(host: *mut RuntimeHost) {
    guarded("shutdown", (), || {
        if let Some(host) = host.as_mut() {
            host.shutdown();
        }
    })
}

unsafe extern "C" fn api_execute_assembly(
    host: *mut RuntimeHost,
    assembly_path: *const c_char,
    exit_code: *mut u32,
) -> bool {
    guarded("execute_assembly", false, || {
        let Some(host) = host.as_ref() else {
            tracing::error!("execute_assembly: null host");
            return false;
        };
        let Some(path) = utf8(assembly_path, "execute_assembly") else {
            return false;
        };
        let result = host.execute_assembly(path, &[]).map(|code| {
            if !exit_code.is_null() {
                *exit_code = code;
            }
        });
        report("execute_assembly", result)
    })
}

unsafe extern "C" fn api_create_delegate(
    host: *mut RuntimeHost,
    assembly: *const c_char,
    type_name: *const c_char,
    method: *const c_char,
    delegate: *mut *mut c_void,
) -> bool {
    guarded("create_delegate", false, || {
        let Some(host) = host.as_ref() else {
            tracing::error!("create_delegate: null host");
            return false;
        };
        if delegate.is_null() {
            tracing::error!("create_delegate: null output pointer");
            return false;
        }
        *delegate = ptr::null_mut();
        let (Some(assembly), Some(type_name), Some(method)) = (
            utf8(assembly, "create_delegate"),
            utf8(type_name, "create_delegate"),
            utf8(method, "create_delegate"),
        ) else {
            return false;
        };
        let result = host
            .create_delegate(assembly, type_name, method)
            .map(|ptr| *delegate = ptr.as_ptr());
        report("create_delegate", result)
    })
}

unsafe extern "C" fn api_is_initialized(host: *const RuntimeHost) -> bool {
    guarded("is_initialized", false, || {
        host.as_ref().is_some_and(RuntimeHost::is_initialized)
    })
}

/// A shared library exporting [`mochi_host_api`], loaded at run time.
pub struct HostLibrary {
    api: *const MochiHostApi,
    // Keeps the code behind `api` mapped.
    module: Box<dyn RuntimeModule>,
}

impl HostLibrary {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, HostError> {
        Self::load_with(&LibraryLoader, path.as_ref())
    }

    /// Load through `loader` and check the exported table's version.
    pub fn load_with(loader: &dyn ModuleLoader, path: &Path) -> Result<Self, HostError> {
        let module = loader.load(path)?;
        let entry = module
            .resolve(HOST_API_SYMBOL)
            .ok_or_else(|| HostError::MissingSymbol {
                module: path.to_path_buf(),
                symbol: HOST_API_SYMBOL,
            })?;

        let entry = unsafe { std::mem::transmute::<*mut c_void, HostApiEntryFn>(entry) };
        let api = unsafe { entry() };
        let found = match unsafe { api.as_ref() } {
            Some(table) => table.version,
            None => 0,
        };
        if found != MOCHI_HOST_API_VERSION {
            return Err(HostError::ApiVersionMismatch {
                path: path.to_path_buf(),
                found,
                expected: MOCHI_HOST_API_VERSION,
            });
        }

        tracing::info!("Loaded host API v{} from {}", found, path.display());
        Ok(Self { api, module })
    }

    pub fn api(&self) -> &MochiHostApi {
        // Non-null and version-checked in `load_with`, valid while the module is.
        unsafe { &*self.api }
    }

    pub fn path(&self) -> &Path {
        self.module.path()
    }
}
