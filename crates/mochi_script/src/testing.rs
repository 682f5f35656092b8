//! In-process stand-in for the runtime module, used by unit tests.
//!
//! State is thread-local, and every test runs on its own thread, so tests
//! never observe each other's calls.

use crate::bindings::NativeCallbackTable;
use crate::ffi::{
    CreateDelegateFn, ExecuteAssemblyFn, InitializeFn, ShutdownFn, CREATE_DELEGATE_SYMBOL,
    EXECUTE_ASSEMBLY_SYMBOL, INITIALIZE_SYMBOL, SHUTDOWN_SYMBOL,
};
use crate::module::{ModuleLoader, RuntimeModule};
use crate::HostError;
use mochi_core::math::Transform;
use std::cell::RefCell;
use std::ffi::{c_char, c_int, c_uint, c_void, CStr};
use std::io;
use std::path::{Path, PathBuf};

pub const FAKE_DOMAIN_ID: u32 = 7;
pub const BRIDGE_ASSEMBLY: &str = "Mochi.Tests";
pub const BRIDGE_TYPE: &str = "Mochi.Tests.Bridge";
/// Method the fake resolves to a null delegate with a success status.
pub const NULL_METHOD: &str = "ReturnsNull";

pub const E_FAIL: i32 = 0x8000_4005_u32 as i32;
pub const COR_E_TYPELOAD: i32 = 0x8013_1522_u32 as i32;
pub const COR_E_MISSINGMETHOD: i32 = 0x8013_1513_u32 as i32;

const FAKE_HANDLE: usize = 0x4d4f_4348;

/// Everything the fake runtime was asked to do, plus its canned answers.
#[derive(Default)]
pub struct FakeRuntime {
    pub init_status: i32,
    pub exec_status: i32,
    pub exit_code: u32,
    /// Report success from initialize without handing out a handle.
    pub null_handle: bool,

    pub loaded: Vec<PathBuf>,
    pub modules_released: u32,
    pub initialize_calls: u32,
    pub shutdown_calls: u32,
    pub exe_path: String,
    pub app_domain: String,
    pub properties: Vec<(String, String)>,
    pub executed: Vec<(String, Vec<String>)>,
    pub delegate_requests: Vec<(String, String, String)>,

    pub starts: Vec<u64>,
    pub updates: Vec<(u64, f32)>,
    pub stops: Vec<u64>,
    pub callback_table: Option<NativeCallbackTable>,
}

thread_local! {
    static RUNTIME: RefCell<FakeRuntime> = RefCell::new(FakeRuntime::default());
}

pub fn with_runtime<R>(f: impl FnOnce(&mut FakeRuntime) -> R) -> R {
    RUNTIME.with(|rt| f(&mut rt.borrow_mut()))
}

/// Loader handing out [`FakeModule`]s.
#[derive(Default)]
pub struct FakeLoader {
    pub fail_load: bool,
    pub missing: Vec<&'static str>,
}

impl ModuleLoader for FakeLoader {
    fn load(&self, path: &Path) -> Result<Box<dyn RuntimeModule>, HostError> {
        if self.fail_load {
            return Err(HostError::ModuleLoad {
                path: path.to_path_buf(),
                source: Box::new(io::Error::new(io::ErrorKind::NotFound, "no such module")),
            });
        }
        with_runtime(|rt| rt.loaded.push(path.to_path_buf()));
        Ok(Box::new(FakeModule {
            path: path.to_path_buf(),
            missing: self.missing.clone(),
        }))
    }
}

pub struct FakeModule {
    path: PathBuf,
    missing: Vec<&'static str>,
}

impl RuntimeModule for FakeModule {
    fn path(&self) -> &Path {
        &self.path
    }

    fn resolve(&self, symbol: &str) -> Option<*mut c_void> {
        if self.missing.iter().any(|missing| *missing == symbol) {
            return None;
        }
        let address = match symbol {
            INITIALIZE_SYMBOL => fake_initialize as InitializeFn as *mut c_void,
            SHUTDOWN_SYMBOL => fake_shutdown as ShutdownFn as *mut c_void,
            CREATE_DELEGATE_SYMBOL => fake_create_delegate as CreateDelegateFn as *mut c_void,
            EXECUTE_ASSEMBLY_SYMBOL => fake_execute_assembly as ExecuteAssemblyFn as *mut c_void,
            _ => return None,
        };
        Some(address)
    }
}

impl Drop for FakeModule {
    fn drop(&mut self) {
        with_runtime(|rt| rt.modules_released += 1);
    }
}

unsafe fn string(ptr: *const c_char) -> String {
    if ptr.is_null() {
        return String::new();
    }
    CStr::from_ptr(ptr).to_string_lossy().into_owned()
}

unsafe fn strings(ptrs: *const *const c_char, count: c_int) -> Vec<String> {
    if ptrs.is_null() || count <= 0 {
        return Vec::new();
    }
    std::slice::from_raw_parts(ptrs, count as usize)
        .iter()
        .map(|ptr| string(*ptr))
        .collect()
}

unsafe extern "system" fn fake_initialize(
    exe_path: *const c_char,
    app_domain_friendly_name: *const c_char,
    property_count: c_int,
    property_keys: *const *const c_char,
    property_values: *const *const c_char,
    host_handle: *mut *mut c_void,
    domain_id: *mut c_uint,
) -> c_int {
    let keys = strings(property_keys, property_count);
    let values = strings(property_values, property_count);
    let (status, null_handle) = with_runtime(|rt| {
        rt.initialize_calls += 1;
        rt.exe_path = string(exe_path);
        rt.app_domain = string(app_domain_friendly_name);
        rt.properties = keys.into_iter().zip(values).collect();
        (rt.init_status, rt.null_handle)
    });
    if status >= 0 && !null_handle {
        *host_handle = FAKE_HANDLE as *mut c_void;
        *domain_id = FAKE_DOMAIN_ID;
    }
    status
}

unsafe extern "system" fn fake_shutdown(_host_handle: *mut c_void, _domain_id: c_uint) -> c_int {
    with_runtime(|rt| rt.shutdown_calls += 1);
    0
}

unsafe extern "system" fn fake_execute_assembly(
    _host_handle: *mut c_void,
    _domain_id: c_uint,
    argc: c_int,
    argv: *const *const c_char,
    managed_assembly_path: *const c_char,
    exit_code: *mut c_uint,
) -> c_int {
    let args = strings(argv, argc);
    let path = string(managed_assembly_path);
    let (status, code) = with_runtime(|rt| {
        rt.executed.push((path, args));
        (rt.exec_status, rt.exit_code)
    });
    if status >= 0 {
        *exit_code = code;
    }
    status
}

unsafe extern "system" fn fake_create_delegate(
    _host_handle: *mut c_void,
    _domain_id: c_uint,
    assembly: *const c_char,
    type_name: *const c_char,
    method: *const c_char,
    delegate: *mut *mut c_void,
) -> c_int {
    let assembly = string(assembly);
    let type_name = string(type_name);
    let method = string(method);
    with_runtime(|rt| {
        rt.delegate_requests
            .push((assembly.clone(), type_name.clone(), method.clone()))
    });

    if assembly != BRIDGE_ASSEMBLY || type_name != BRIDGE_TYPE {
        return COR_E_TYPELOAD;
    }
    let address = match method.as_str() {
        "Start" => (managed_start as extern "system" fn(u64)) as *mut c_void,
        "Update" => (managed_update as extern "system" fn(u64, f32)) as *mut c_void,
        "Stop" => (managed_stop as extern "system" fn(u64)) as *mut c_void,
        "Add" => (managed_add as extern "system" fn(i32, i32) -> i32) as *mut c_void,
        "RegisterNativeCallbacks" => {
            (managed_register as extern "system" fn(*const NativeCallbackTable)) as *mut c_void
        }
        NULL_METHOD => std::ptr::null_mut(),
        _ => return COR_E_MISSINGMETHOD,
    };
    *delegate = address;
    0
}

extern "system" fn managed_start(entity: u64) {
    with_runtime(|rt| rt.starts.push(entity));
}

/// Records the tick and, once callbacks are registered, moves the entity
/// along x by `delta_time` through the callback table.
extern "system" fn managed_update(entity: u64, delta_time: f32) {
    let table = with_runtime(|rt| {
        rt.updates.push((entity, delta_time));
        rt.callback_table
    });
    let Some(table) = table else {
        return;
    };
    let mut transform = Transform::default();
    unsafe {
        if (table.get_transform)(table.context, entity, &mut transform) {
            transform.position.x += delta_time;
            (table.set_transform)(table.context, entity, &transform);
        }
    }
}

extern "system" fn managed_stop(entity: u64) {
    with_runtime(|rt| rt.stops.push(entity));
}

extern "system" fn managed_add(a: i32, b: i32) -> i32 {
    a.wrapping_add(b)
}

extern "system" fn managed_register(table: *const NativeCallbackTable) {
    let table = unsafe { table.as_ref() }.copied();
    with_runtime(|rt| rt.callback_table = table);
}
