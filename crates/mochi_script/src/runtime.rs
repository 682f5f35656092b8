//! Managed runtime host
//!
//! Loads the runtime module, resolves its hosting entry points, builds the
//! trusted assembly list and owns exactly one runtime instance at a time.

use crate::delegate::DelegateBridge;
use crate::ffi::CoreClrApi;
use crate::module::{LibraryLoader, ModuleLoader, RuntimeModule};
use crate::tpa::{self, TrustedAssemblyList};
use crate::{HostError, HostOptions};
use std::ffi::{c_char, c_int, c_uint, c_void, CString};
use std::path::{Path, PathBuf};
use std::ptr::{self, NonNull};

pub const PROP_TRUSTED_PLATFORM_ASSEMBLIES: &str = "TRUSTED_PLATFORM_ASSEMBLIES";
pub const PROP_APP_PATHS: &str = "APP_PATHS";
pub const PROP_APP_NI_PATHS: &str = "APP_NI_PATHS";
pub const PROP_NATIVE_DLL_SEARCH_DIRECTORIES: &str = "NATIVE_DLL_SEARCH_DIRECTORIES";
pub const PROP_PLATFORM_RESOURCE_ROOTS: &str = "PLATFORM_RESOURCE_ROOTS";

/// Everything that exists only while the runtime is up.
struct HostState {
    module: Box<dyn RuntimeModule>,
    api: CoreClrApi,
    handle: *mut c_void,
    domain_id: c_uint,
    runtime_dir: PathBuf,
    entry_assembly: PathBuf,
}

/// Host for one embedded managed runtime instance.
///
/// Holds raw runtime handles, so it is neither `Send` nor `Sync`: every call
/// stays on the thread that created the host.
pub struct RuntimeHost {
    options: HostOptions,
    loader: Box<dyn ModuleLoader>,
    state: Option<HostState>,
}

impl RuntimeHost {
    pub fn new(options: HostOptions) -> Self {
        Self::with_loader(options, Box::new(LibraryLoader))
    }

    pub fn with_loader(options: HostOptions, loader: Box<dyn ModuleLoader>) -> Self {
        Self {
            options,
            loader,
            state: None,
        }
    }

    /// Load the runtime from `runtime_dir` and start it for `entry_assembly`.
    ///
    /// Fails without touching existing state when already initialized. Any
    /// other failure releases the module before returning.
    pub fn initialize(
        &mut self,
        runtime_dir: impl AsRef<Path>,
        entry_assembly: impl AsRef<Path>,
    ) -> Result<(), HostError> {
        if self.state.is_some() {
            return Err(HostError::AlreadyInitialized);
        }

        let runtime_dir = runtime_dir.as_ref();
        let entry_assembly = entry_assembly.as_ref();
        let module_path = runtime_dir.join(self.options.runtime_module_name());

        tracing::info!("Loading runtime module {}", module_path.display());
        let module = self.loader.load(&module_path)?;
        let api = unsafe { CoreClrApi::resolve(module.as_ref()) }?;

        let app_dir = tpa::app_directory(entry_assembly);
        let tpa = TrustedAssemblyList::discover(
            runtime_dir,
            &app_dir,
            &self.options.assembly_extensions,
        );
        tracing::info!("Trusted assembly list: {} entries", tpa.len());

        let properties = self.runtime_properties(runtime_dir, &app_dir, &tpa);
        let mut keys = Vec::with_capacity(properties.len());
        let mut values = Vec::with_capacity(properties.len());
        for (key, value) in properties {
            keys.push(c_string(key, "runtime property key")?);
            values.push(c_string(value, "runtime property value")?);
        }
        let key_ptrs: Vec<*const c_char> = keys.iter().map(|k| k.as_ptr()).collect();
        let value_ptrs: Vec<*const c_char> = values.iter().map(|v| v.as_ptr()).collect();

        let exe_path = std::env::current_exe().unwrap_or_else(|_| entry_assembly.to_path_buf());
        let exe_path = c_string(exe_path.to_string_lossy().into_owned(), "executable path")?;
        let domain_name = c_string(self.options.app_domain_name.clone(), "app domain name")?;

        let mut handle: *mut c_void = ptr::null_mut();
        let mut domain_id: c_uint = 0;
        let status = unsafe {
            (api.initialize)(
                exe_path.as_ptr(),
                domain_name.as_ptr(),
                key_ptrs.len() as c_int,
                key_ptrs.as_ptr(),
                value_ptrs.as_ptr(),
                &mut handle,
                &mut domain_id,
            )
        };
        if status < 0 {
            tracing::error!("Runtime initialization failed with status {:#010x}", status);
            return Err(HostError::InitializeFailed { status });
        }
        if handle.is_null() {
            tracing::error!("Runtime started without a host handle (status {:#010x})", status);
            unsafe { (api.shutdown)(handle, domain_id) };
            // The runtime may have run code from the module.
            std::mem::forget(module);
            return Err(HostError::NullHostHandle { status });
        }

        tracing::info!(
            "Runtime initialized (domain {}, app '{}')",
            domain_id,
            self.options.app_domain_name
        );
        self.state = Some(HostState {
            module,
            api,
            handle,
            domain_id,
            runtime_dir: runtime_dir.to_path_buf(),
            entry_assembly: entry_assembly.to_path_buf(),
        });
        Ok(())
    }

    /// Shut the runtime down. Safe to call at any time, any number of times.
    ///
    /// The module stays mapped: the runtime may still run finalizer code from
    /// it after shutdown returns, and process exit reclaims it.
    pub fn shutdown(&mut self) {
        let Some(state) = self.state.take() else {
            return;
        };

        let status = unsafe { (state.api.shutdown)(state.handle, state.domain_id) };
        if status < 0 {
            tracing::warn!("Runtime shutdown reported status {:#010x}", status);
        } else {
            tracing::info!("Runtime shut down (domain {})", state.domain_id);
        }
        std::mem::forget(state.module);
    }

    /// Run an assembly's entry point and return its exit code.
    pub fn execute_assembly(
        &self,
        assembly_path: impl AsRef<Path>,
        args: &[&str],
    ) -> Result<u32, HostError> {
        let state = self.state()?;
        let assembly_path = assembly_path.as_ref();

        let path = c_string(assembly_path.to_string_lossy().into_owned(), "assembly path")?;
        let args = args
            .iter()
            .map(|arg| c_string(*arg, "assembly argument"))
            .collect::<Result<Vec<_>, _>>()?;
        let argv: Vec<*const c_char> = args.iter().map(|arg| arg.as_ptr()).collect();

        let mut exit_code: c_uint = 0;
        let status = unsafe {
            (state.api.execute_assembly)(
                state.handle,
                state.domain_id,
                argv.len() as c_int,
                argv.as_ptr(),
                path.as_ptr(),
                &mut exit_code,
            )
        };
        if status < 0 {
            return Err(HostError::ExecuteFailed {
                path: assembly_path.to_path_buf(),
                status,
            });
        }

        tracing::info!("{} exited with code {}", assembly_path.display(), exit_code);
        Ok(exit_code)
    }

    pub fn is_initialized(&self) -> bool {
        self.state.is_some()
    }

    pub fn domain_id(&self) -> Option<u32> {
        self.state.as_ref().map(|state| state.domain_id)
    }

    pub fn runtime_dir(&self) -> Option<&Path> {
        self.state.as_ref().map(|state| state.runtime_dir.as_path())
    }

    pub fn entry_assembly(&self) -> Option<&Path> {
        self.state.as_ref().map(|state| state.entry_assembly.as_path())
    }

    pub fn options(&self) -> &HostOptions {
        &self.options
    }

    /// Properties handed to the runtime at initialization, in order.
    fn runtime_properties(
        &self,
        runtime_dir: &Path,
        app_dir: &Path,
        tpa: &TrustedAssemblyList,
    ) -> Vec<(String, String)> {
        let app_dir = app_dir.to_string_lossy().into_owned();
        let mut properties = vec![
            (
                PROP_TRUSTED_PLATFORM_ASSEMBLIES.to_string(),
                tpa.join(self.options.list_separator),
            ),
            (PROP_APP_PATHS.to_string(), app_dir.clone()),
            (PROP_APP_NI_PATHS.to_string(), app_dir.clone()),
            (
                PROP_NATIVE_DLL_SEARCH_DIRECTORIES.to_string(),
                runtime_dir.to_string_lossy().into_owned(),
            ),
            (PROP_PLATFORM_RESOURCE_ROOTS.to_string(), app_dir),
        ];
        properties.extend(
            self.options
                .properties
                .iter()
                .map(|(key, value)| (key.clone(), value.clone())),
        );
        properties
    }

    fn state(&self) -> Result<&HostState, HostError> {
        self.state.as_ref().ok_or(HostError::NotInitialized)
    }
}

impl DelegateBridge for RuntimeHost {
    fn create_delegate(
        &self,
        assembly: &str,
        type_name: &str,
        method: &str,
    ) -> Result<NonNull<c_void>, HostError> {
        let state = self.state()?;
        let assembly_c = c_string(assembly, "assembly name")?;
        let type_c = c_string(type_name, "type name")?;
        let method_c = c_string(method, "method name")?;

        let mut delegate: *mut c_void = ptr::null_mut();
        let status = unsafe {
            (state.api.create_delegate)(
                state.handle,
                state.domain_id,
                assembly_c.as_ptr(),
                type_c.as_ptr(),
                method_c.as_ptr(),
                &mut delegate,
            )
        };
        if status < 0 {
            tracing::warn!(
                "create_delegate failed for [{}] {}.{}: {:#010x}",
                assembly,
                type_name,
                method,
                status
            );
            return Err(HostError::DelegateUnavailable {
                assembly: assembly.to_string(),
                type_name: type_name.to_string(),
                method: method.to_string(),
                status,
            });
        }

        NonNull::new(delegate).ok_or_else(|| HostError::NullDelegate {
            type_name: type_name.to_string(),
            method: method.to_string(),
        })
    }
}

impl Drop for RuntimeHost {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn c_string(value: impl Into<Vec<u8>>, what: &'static str) -> Result<CString, HostError> {
    CString::new(value).map_err(|_| HostError::InvalidString { what })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delegate::{DelegateDescriptor, LifecycleDelegates};
    use crate::testing::{self, with_runtime, FakeLoader, BRIDGE_ASSEMBLY, BRIDGE_TYPE};
    use std::fs;
    use tempfile::{tempdir, TempDir};

    struct Dirs {
        runtime: TempDir,
        app: TempDir,
    }

    impl Dirs {
        fn new() -> Self {
            let dirs = Self {
                runtime: tempdir().expect("tempdir"),
                app: tempdir().expect("tempdir"),
            };
            fs::write(dirs.runtime.path().join("System.Private.CoreLib.dll"), b"").unwrap();
            fs::write(dirs.runtime.path().join("readme.txt"), b"").unwrap();
            fs::write(dirs.app.path().join("Game.dll"), b"").unwrap();
            dirs
        }

        fn entry(&self) -> PathBuf {
            self.app.path().join("Game.dll")
        }
    }

    fn host() -> RuntimeHost {
        RuntimeHost::with_loader(HostOptions::default(), Box::new(FakeLoader::default()))
    }

    fn initialized(dirs: &Dirs) -> RuntimeHost {
        let mut host = host();
        host.initialize(dirs.runtime.path(), dirs.entry())
            .expect("initialize");
        host
    }

    #[test]
    fn initialize_passes_properties_in_order() {
        let dirs = Dirs::new();
        let host = initialized(&dirs);

        assert!(host.is_initialized());
        assert_eq!(host.domain_id(), Some(testing::FAKE_DOMAIN_ID));
        assert_eq!(host.runtime_dir(), Some(dirs.runtime.path()));

        with_runtime(|rt| {
            assert_eq!(rt.app_domain, "MochiHost");
            let keys: Vec<&str> = rt.properties.iter().map(|(k, _)| k.as_str()).collect();
            assert_eq!(
                keys,
                vec![
                    PROP_TRUSTED_PLATFORM_ASSEMBLIES,
                    PROP_APP_PATHS,
                    PROP_APP_NI_PATHS,
                    PROP_NATIVE_DLL_SEARCH_DIRECTORIES,
                    PROP_PLATFORM_RESOURCE_ROOTS,
                ]
            );

            let tpa = &rt.properties[0].1;
            let entries: Vec<&str> = tpa.split(';').collect();
            assert_eq!(entries.len(), 2, "{tpa}");
            assert!(entries[0].ends_with("System.Private.CoreLib.dll"));
            assert!(entries[1].ends_with("Game.dll"));

            assert_eq!(rt.properties[1].1, dirs.app.path().to_string_lossy());
            assert_eq!(rt.properties[3].1, dirs.runtime.path().to_string_lossy());
            assert_eq!(
                rt.loaded,
                vec![dirs
                    .runtime
                    .path()
                    .join(HostOptions::default().runtime_module_name())]
            );
        });
    }

    #[test]
    fn extra_properties_follow_standard_ones() {
        let dirs = Dirs::new();
        let mut options = HostOptions::default();
        options
            .properties
            .insert("System.GC.Server".to_string(), "false".to_string());
        let mut host = RuntimeHost::with_loader(options, Box::new(FakeLoader::default()));
        host.initialize(dirs.runtime.path(), dirs.entry()).unwrap();

        with_runtime(|rt| {
            let last = rt.properties.last().unwrap();
            assert_eq!(last, &("System.GC.Server".to_string(), "false".to_string()));
        });
    }

    #[test]
    fn second_initialize_changes_nothing() {
        let dirs = Dirs::new();
        let other = Dirs::new();
        let mut host = initialized(&dirs);
        let before = (host.domain_id(), host.runtime_dir().map(Path::to_path_buf));

        let err = host
            .initialize(other.runtime.path(), other.entry())
            .unwrap_err();
        assert!(matches!(err, HostError::AlreadyInitialized));
        assert_eq!(
            (host.domain_id(), host.runtime_dir().map(Path::to_path_buf)),
            before
        );
        assert_eq!(host.entry_assembly(), Some(dirs.entry().as_path()));
        with_runtime(|rt| {
            assert_eq!(rt.initialize_calls, 1);
            assert_eq!(rt.loaded.len(), 1);
        });
    }

    #[test]
    fn shutdown_is_idempotent() {
        let mut never = host();
        never.shutdown();
        never.shutdown();
        assert!(!never.is_initialized());

        let dirs = Dirs::new();
        let mut host = initialized(&dirs);
        host.shutdown();
        host.shutdown();

        assert!(!host.is_initialized());
        assert_eq!(host.domain_id(), None);
        assert_eq!(host.runtime_dir(), None);
        with_runtime(|rt| {
            assert_eq!(rt.shutdown_calls, 1);
            // Shutdown keeps the module mapped.
            assert_eq!(rt.modules_released, 0);
        });
    }

    #[test]
    fn reinitialize_after_shutdown() {
        let dirs = Dirs::new();
        let mut host = initialized(&dirs);
        host.shutdown();

        host.initialize(dirs.runtime.path(), dirs.entry())
            .expect("second initialize");
        assert!(host.is_initialized());
        with_runtime(|rt| assert_eq!(rt.initialize_calls, 2));
    }

    #[test]
    fn drop_shuts_down() {
        let dirs = Dirs::new();
        drop(initialized(&dirs));
        with_runtime(|rt| assert_eq!(rt.shutdown_calls, 1));
    }

    #[test]
    fn module_load_failure() {
        let dirs = Dirs::new();
        let loader = FakeLoader {
            fail_load: true,
            ..FakeLoader::default()
        };
        let mut host = RuntimeHost::with_loader(HostOptions::default(), Box::new(loader));

        let err = host
            .initialize(dirs.runtime.path(), dirs.entry())
            .unwrap_err();
        assert!(matches!(err, HostError::ModuleLoad { .. }));
        assert!(!host.is_initialized());
    }

    #[test]
    fn missing_entry_point_releases_module() {
        let dirs = Dirs::new();
        let loader = FakeLoader {
            missing: vec![crate::ffi::EXECUTE_ASSEMBLY_SYMBOL],
            ..FakeLoader::default()
        };
        let mut host = RuntimeHost::with_loader(HostOptions::default(), Box::new(loader));

        match host.initialize(dirs.runtime.path(), dirs.entry()) {
            Err(HostError::MissingSymbol { symbol, .. }) => {
                assert_eq!(symbol, "coreclr_execute_assembly")
            }
            other => panic!("unexpected result: {other:?}"),
        }
        assert!(!host.is_initialized());
        with_runtime(|rt| {
            assert_eq!(rt.initialize_calls, 0);
            assert_eq!(rt.modules_released, 1);
        });
    }

    #[test]
    fn negative_init_status_releases_module() {
        let dirs = Dirs::new();
        with_runtime(|rt| rt.init_status = testing::E_FAIL);
        let mut host = host();

        match host.initialize(dirs.runtime.path(), dirs.entry()) {
            Err(HostError::InitializeFailed { status }) => assert_eq!(status, testing::E_FAIL),
            other => panic!("unexpected result: {other:?}"),
        }
        assert!(!host.is_initialized());
        with_runtime(|rt| assert_eq!(rt.modules_released, 1));
    }

    #[test]
    fn missing_handle_shuts_runtime_down() {
        let dirs = Dirs::new();
        with_runtime(|rt| rt.null_handle = true);
        let mut host = host();

        match host.initialize(dirs.runtime.path(), dirs.entry()) {
            Err(HostError::NullHostHandle { status }) => assert_eq!(status, 0),
            other => panic!("unexpected result: {other:?}"),
        }
        assert!(!host.is_initialized());
        drop(host);
        with_runtime(|rt| {
            assert_eq!(rt.initialize_calls, 1);
            assert_eq!(rt.shutdown_calls, 1);
            assert_eq!(rt.modules_released, 0);
        });
    }

    #[test]
    fn interior_nul_is_rejected() {
        let dirs = Dirs::new();
        let options = HostOptions {
            app_domain_name: "bad\0name".to_string(),
            ..HostOptions::default()
        };
        let mut host = RuntimeHost::with_loader(options, Box::new(FakeLoader::default()));

        let err = host
            .initialize(dirs.runtime.path(), dirs.entry())
            .unwrap_err();
        assert!(matches!(err, HostError::InvalidString { what: "app domain name" }));
    }

    #[test]
    fn execute_requires_initialization() {
        let host = host();
        assert!(matches!(
            host.execute_assembly("Game.dll", &[]),
            Err(HostError::NotInitialized)
        ));
    }

    #[test]
    fn execute_returns_exit_code() {
        let dirs = Dirs::new();
        let host = initialized(&dirs);
        with_runtime(|rt| rt.exit_code = 3);

        let code = host
            .execute_assembly(dirs.entry(), &["--level", "2"])
            .expect("execute");
        assert_eq!(code, 3);
        with_runtime(|rt| {
            let (path, args) = rt.executed.last().unwrap();
            assert!(path.ends_with("Game.dll"));
            assert_eq!(args, &vec!["--level".to_string(), "2".to_string()]);
        });
    }

    #[test]
    fn execute_negative_status_fails() {
        let dirs = Dirs::new();
        let host = initialized(&dirs);
        with_runtime(|rt| rt.exec_status = testing::E_FAIL);

        assert!(matches!(
            host.execute_assembly(dirs.entry(), &[]),
            Err(HostError::ExecuteFailed { status, .. }) if status == testing::E_FAIL
        ));
    }

    #[test]
    fn create_delegate_requires_initialization() {
        let host = host();
        assert!(matches!(
            host.create_delegate(BRIDGE_ASSEMBLY, BRIDGE_TYPE, "Start"),
            Err(HostError::NotInitialized)
        ));
    }

    #[test]
    fn unknown_type_or_null_delegate_fails() {
        let dirs = Dirs::new();
        let host = initialized(&dirs);

        assert!(matches!(
            host.create_delegate(BRIDGE_ASSEMBLY, "Missing.Type", "Start"),
            Err(HostError::DelegateUnavailable { status, .. }) if status == testing::COR_E_TYPELOAD
        ));
        assert!(matches!(
            host.create_delegate(BRIDGE_ASSEMBLY, BRIDGE_TYPE, "NoSuchMethod"),
            Err(HostError::DelegateUnavailable { .. })
        ));
        assert!(matches!(
            host.create_delegate(BRIDGE_ASSEMBLY, BRIDGE_TYPE, testing::NULL_METHOD),
            Err(HostError::NullDelegate { .. })
        ));
    }

    #[test]
    fn bound_delegates_reach_managed_code() {
        let dirs = Dirs::new();
        let host = initialized(&dirs);

        let add: extern "system" fn(i32, i32) -> i32 = unsafe {
            host.bind(&DelegateDescriptor::new(BRIDGE_ASSEMBLY, BRIDGE_TYPE, "Add"))
        }
        .expect("bind Add");
        assert_eq!(add(10, 32), 42);

        let lifecycle =
            unsafe { LifecycleDelegates::bind(&host, BRIDGE_ASSEMBLY, BRIDGE_TYPE) }.expect("bind");
        (lifecycle.start)(5);
        (lifecycle.update)(5, 0.016);
        (lifecycle.stop)(5);
        with_runtime(|rt| {
            assert_eq!(rt.starts, vec![5]);
            assert_eq!(rt.updates, vec![(5, 0.016)]);
            assert_eq!(rt.stops, vec![5]);
            assert_eq!(rt.delegate_requests.len(), 4);
        });
    }
}
