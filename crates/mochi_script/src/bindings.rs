//! Native callbacks exposed to managed scripts
//!
//! Managed code receives a [`NativeCallbackTable`] once, through a setter
//! delegate, and calls back into the entity registry through it. The table
//! only holds a weak view of the entities: after the registry or the
//! bindings are gone every callback returns `false`.

use crate::delegate::{AbiType, AbiValue, DelegateBridge, DelegateDescriptor, Signature};
use crate::HostError;
use mochi_core::math::Transform;
use mochi_core::scene::{EntityId, EntityRegistry, EntityTableRef};
use std::cell::{Cell, Ref, RefCell};
use std::ffi::{c_char, c_void, CStr};
use std::ptr;

pub const CALLBACK_TABLE_VERSION: u32 = 1;

pub const REGISTER_METHOD: &str = "RegisterNativeCallbacks";
pub const REGISTER_SIGNATURE: Signature =
    Signature::new(&[AbiType::CallbackTablePtr], AbiType::Void);

/// Component names answered by `has_component`.
const KNOWN_COMPONENTS: &[&str] = &["Transform", "TransformComponent"];

pub type GetTransformFn =
    unsafe extern "system" fn(context: *mut c_void, entity: u64, out: *mut Transform) -> bool;
pub type SetTransformFn =
    unsafe extern "system" fn(context: *mut c_void, entity: u64, value: *const Transform) -> bool;
pub type HasComponentFn =
    unsafe extern "system" fn(context: *mut c_void, entity: u64, component: *const c_char) -> bool;
pub type LogFn = unsafe extern "system" fn(message: *const c_char);

/// Managed setter that receives the callback table.
pub type RegisterCallbacksFn = extern "system" fn(*const NativeCallbackTable);

/// Function table handed to managed code. Layout is part of the ABI.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct NativeCallbackTable {
    pub version: u32,
    pub context: *mut c_void,
    pub get_transform: GetTransformFn,
    pub set_transform: SetTransformFn,
    pub has_component: HasComponentFn,
    pub log: LogFn,
}

impl AbiValue for *const NativeCallbackTable {
    const ABI: AbiType = AbiType::CallbackTablePtr;
}

/// Table plus the entity view its callbacks read through.
///
/// Never freed: managed code may keep the table pointer past the lifetime
/// of the [`ScriptBindings`] that handed it out, so it must stay readable.
struct CallbackState {
    table: NativeCallbackTable,
    view: RefCell<EntityTableRef>,
}

/// Hands one registry's callback table to managed code.
///
/// Dropping the bindings detaches the table from the registry: a table the
/// managed side retained stays valid memory, and every callback through it
/// returns `false`.
pub struct ScriptBindings {
    state: &'static CallbackState,
    setter: Cell<Option<RegisterCallbacksFn>>,
}

impl ScriptBindings {
    pub fn new(registry: &EntityRegistry) -> Self {
        let state = Box::into_raw(Box::new(CallbackState {
            table: NativeCallbackTable {
                version: CALLBACK_TABLE_VERSION,
                context: ptr::null_mut(),
                get_transform: get_transform_callback,
                set_transform: set_transform_callback,
                has_component: has_component_callback,
                log: log_callback,
            },
            view: RefCell::new(registry.table()),
        }));
        let state = unsafe {
            (*state).table.context = state.cast();
            &*state
        };

        Self {
            state,
            setter: Cell::new(None),
        }
    }

    pub fn table(&self) -> *const NativeCallbackTable {
        &self.state.table
    }

    /// Whether the table still reaches a live registry.
    pub fn is_connected(&self) -> bool {
        self.state
            .view
            .try_borrow()
            .is_ok_and(|view| view.is_alive())
    }

    pub fn is_registered(&self) -> bool {
        self.setter.get().is_some()
    }

    /// Descriptor of the managed setter on `type_name`.
    pub fn register_descriptor(assembly: &str, type_name: &str) -> DelegateDescriptor {
        DelegateDescriptor::new(assembly, type_name, REGISTER_METHOD)
            .with_signature(REGISTER_SIGNATURE)
    }

    /// Bind the managed setter and pass it the table.
    ///
    /// # Safety
    /// The managed method must take a single table pointer.
    pub unsafe fn register<B: DelegateBridge>(
        &self,
        bridge: &B,
        descriptor: &DelegateDescriptor,
    ) -> Result<(), HostError> {
        let register: RegisterCallbacksFn = bridge.bind(descriptor)?;
        register(self.table());
        self.setter.set(Some(register));
        tracing::info!("Registered native callbacks with {}", descriptor);
        Ok(())
    }

    /// Hand the managed setter a null table. No-op when never registered.
    ///
    /// # Safety
    /// The runtime the setter was bound from must still be running.
    pub unsafe fn unregister(&self) {
        if let Some(register) = self.setter.take() {
            register(ptr::null());
            tracing::info!("Unregistered native callbacks");
        }
    }
}

impl Drop for ScriptBindings {
    fn drop(&mut self) {
        // The runtime may already be gone, so the setter is not called here.
        match self.state.view.try_borrow_mut() {
            Ok(mut view) => *view = EntityTableRef::default(),
            Err(_) => tracing::warn!("Callback table dropped while a callback was running"),
        }
    }
}

/// Entity view behind a callback context pointer.
///
/// # Safety
/// `context` is null or the context of a table built by [`ScriptBindings`].
unsafe fn table_ref<'a>(context: *mut c_void) -> Option<Ref<'a, EntityTableRef>> {
    let state = (context as *const CallbackState).as_ref()?;
    state.view.try_borrow().ok()
}

unsafe extern "system" fn get_transform_callback(
    context: *mut c_void,
    entity: u64,
    out: *mut Transform,
) -> bool {
    if out.is_null() {
        return false;
    }
    let Some(table) = table_ref(context) else {
        return false;
    };
    match table.transform(EntityId::from_raw(entity)) {
        Some(transform) => {
            out.write(transform);
            true
        }
        None => false,
    }
}

unsafe extern "system" fn set_transform_callback(
    context: *mut c_void,
    entity: u64,
    value: *const Transform,
) -> bool {
    let (Some(table), Some(value)) = (table_ref(context), value.as_ref()) else {
        return false;
    };
    table.set_transform(EntityId::from_raw(entity), *value)
}

unsafe extern "system" fn has_component_callback(
    context: *mut c_void,
    entity: u64,
    component: *const c_char,
) -> bool {
    if component.is_null() {
        return false;
    }
    let Some(table) = table_ref(context) else {
        return false;
    };
    let Ok(name) = CStr::from_ptr(component).to_str() else {
        return false;
    };
    table.contains(EntityId::from_raw(entity)) && is_known_component(name)
}

unsafe extern "system" fn log_callback(message: *const c_char) {
    if message.is_null() {
        return;
    }
    let message = CStr::from_ptr(message).to_string_lossy();
    tracing::info!(target: "managed", "{}", message);
}

/// `Transform`, `TransformComponent`, or either with a namespace prefix.
fn is_known_component(name: &str) -> bool {
    let short = name.rsplit(|c: char| c == '.' || c == ':').next().unwrap_or(name);
    KNOWN_COMPONENTS.contains(&short)
}
