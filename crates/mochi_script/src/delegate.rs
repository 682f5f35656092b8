//! Typed delegates into managed code
//!
//! A delegate is resolved by assembly, type and method name and comes back
//! as an untyped address. [`ManagedFn`] turns that address into a typed
//! `extern "system"` function pointer and carries a [`Signature`] tag so a
//! [`DelegateDescriptor`] that declares its signature can be checked at bind
//! time. The runtime exposes no metadata for the real managed signature, so
//! the final match remains the caller's promise.

use crate::HostError;
use mochi_core::math::Transform;
use mochi_core::scene::{EntityStartFn, EntityStopFn, EntityUpdateFn, ScriptDelegates};
use std::ffi::{c_char, c_void};
use std::fmt;
use std::ptr::NonNull;

/// ABI-level type of a delegate parameter or return value.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum AbiType {
    Void,
    Bool,
    I32,
    U32,
    U64,
    F32,
    /// NUL-terminated UTF-8 string
    CStr,
    /// Opaque pointer (managed instance, context)
    Ptr,
    /// Pointer to a [`Transform`]
    TransformPtr,
    /// Pointer to a [`crate::bindings::NativeCallbackTable`]
    CallbackTablePtr,
}

impl AbiType {
    pub fn name(self) -> &'static str {
        match self {
            AbiType::Void => "void",
            AbiType::Bool => "bool",
            AbiType::I32 => "i32",
            AbiType::U32 => "u32",
            AbiType::U64 => "u64",
            AbiType::F32 => "f32",
            AbiType::CStr => "cstr",
            AbiType::Ptr => "ptr",
            AbiType::TransformPtr => "*Transform",
            AbiType::CallbackTablePtr => "*NativeCallbackTable",
        }
    }
}

/// Parameter and return types of a delegate.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct Signature {
    pub params: &'static [AbiType],
    pub ret: AbiType,
}

impl Signature {
    pub const fn new(params: &'static [AbiType], ret: AbiType) -> Self {
        Self { params, ret }
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(")?;
        for (i, param) in self.params.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            f.write_str(param.name())?;
        }
        write!(f, ") -> {}", self.ret.name())
    }
}

/// A Rust type with a fixed ABI tag.
pub trait AbiValue {
    const ABI: AbiType;
}

macro_rules! abi_value {
    ($($ty:ty => $abi:ident),* $(,)?) => {
        $(
            impl AbiValue for $ty {
                const ABI: AbiType = AbiType::$abi;
            }
        )*
    };
}

abi_value! {
    () => Void,
    bool => Bool,
    i32 => I32,
    u32 => U32,
    u64 => U64,
    f32 => F32,
    *const c_char => CStr,
    *mut c_void => Ptr,
    *mut Transform => TransformPtr,
    *const Transform => TransformPtr,
}

/// A function pointer type that a delegate address can be turned into.
///
/// # Safety
/// Implementors must be pointer-sized function pointers whose `SIGNATURE`
/// describes their parameters and return type.
pub unsafe trait ManagedFn: Copy {
    const SIGNATURE: Signature;

    /// # Safety
    /// `ptr` must point to code callable with this type's signature for as
    /// long as the returned value is used.
    unsafe fn from_ptr(ptr: NonNull<c_void>) -> Self;
}

macro_rules! managed_fn {
    ($($arg:ident),*) => {
        unsafe impl<R, $($arg),*> ManagedFn for extern "system" fn($($arg),*) -> R
        where
            R: AbiValue,
            $($arg: AbiValue),*
        {
            const SIGNATURE: Signature = Signature {
                params: &[$($arg::ABI),*],
                ret: R::ABI,
            };

            unsafe fn from_ptr(ptr: NonNull<c_void>) -> Self {
                debug_assert_eq!(std::mem::size_of::<Self>(), std::mem::size_of::<*mut c_void>());
                std::mem::transmute_copy::<*mut c_void, Self>(&ptr.as_ptr())
            }
        }
    };
}

managed_fn!();
managed_fn!(A);
managed_fn!(A, B);
managed_fn!(A, B, C);

/// Names a managed static method, optionally with its declared signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DelegateDescriptor {
    pub assembly: String,
    pub type_name: String,
    pub method: String,
    pub signature: Option<Signature>,
}

impl DelegateDescriptor {
    pub fn new(
        assembly: impl Into<String>,
        type_name: impl Into<String>,
        method: impl Into<String>,
    ) -> Self {
        Self {
            assembly: assembly.into(),
            type_name: type_name.into(),
            method: method.into(),
            signature: None,
        }
    }

    pub fn with_signature(mut self, signature: Signature) -> Self {
        self.signature = Some(signature);
        self
    }

    /// Reject a requested function type that contradicts the declared
    /// signature. Undeclared signatures always pass.
    pub fn check<F: ManagedFn>(&self) -> Result<(), HostError> {
        match self.signature {
            Some(declared) if declared != F::SIGNATURE => Err(HostError::SignatureMismatch {
                type_name: self.type_name.clone(),
                method: self.method.clone(),
                declared,
                requested: F::SIGNATURE,
            }),
            _ => Ok(()),
        }
    }
}

impl fmt::Display for DelegateDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}.{}", self.assembly, self.type_name, self.method)
    }
}

/// Creates callable references into managed code.
pub trait DelegateBridge {
    /// Resolve a managed static method to a native-callable address.
    fn create_delegate(
        &self,
        assembly: &str,
        type_name: &str,
        method: &str,
    ) -> Result<NonNull<c_void>, HostError>;

    /// Resolve a descriptor into a typed function pointer.
    ///
    /// A declared signature that differs from `F` is rejected before the
    /// runtime is consulted.
    ///
    /// # Safety
    /// The managed method must have exactly the parameters and return type of
    /// `F`, and the pointer must not be called after the runtime shuts down.
    unsafe fn bind<F: ManagedFn>(&self, descriptor: &DelegateDescriptor) -> Result<F, HostError>
    where
        Self: Sized,
    {
        descriptor.check::<F>()?;
        let ptr = self.create_delegate(
            &descriptor.assembly,
            &descriptor.type_name,
            &descriptor.method,
        )?;
        tracing::debug!("Bound {} as {}", descriptor, F::SIGNATURE);
        Ok(F::from_ptr(ptr))
    }
}

pub const START_METHOD: &str = "Start";
pub const UPDATE_METHOD: &str = "Update";
pub const STOP_METHOD: &str = "Stop";

/// Declared signatures of the lifecycle entry points.
pub const START_SIGNATURE: Signature = Signature::new(&[AbiType::U64], AbiType::Void);
pub const UPDATE_SIGNATURE: Signature =
    Signature::new(&[AbiType::U64, AbiType::F32], AbiType::Void);
pub const STOP_SIGNATURE: Signature = Signature::new(&[AbiType::U64], AbiType::Void);

/// Descriptors for `Start(ulong)`, `Update(ulong, float)` and `Stop(ulong)`
/// on a managed bridge type.
pub fn lifecycle_descriptors(assembly: &str, type_name: &str) -> [DelegateDescriptor; 3] {
    [
        DelegateDescriptor::new(assembly, type_name, START_METHOD).with_signature(START_SIGNATURE),
        DelegateDescriptor::new(assembly, type_name, UPDATE_METHOD)
            .with_signature(UPDATE_SIGNATURE),
        DelegateDescriptor::new(assembly, type_name, STOP_METHOD).with_signature(STOP_SIGNATURE),
    ]
}

/// The three lifecycle delegates of a managed bridge type.
#[derive(Debug, Copy, Clone)]
pub struct LifecycleDelegates {
    pub start: EntityStartFn,
    pub update: EntityUpdateFn,
    pub stop: EntityStopFn,
}

impl LifecycleDelegates {
    /// Bind `Start`, `Update` and `Stop` on `type_name`.
    ///
    /// # Safety
    /// See [`DelegateBridge::bind`].
    pub unsafe fn bind<B: DelegateBridge>(
        bridge: &B,
        assembly: &str,
        type_name: &str,
    ) -> Result<Self, HostError> {
        let [start, update, stop] = lifecycle_descriptors(assembly, type_name);
        Ok(Self {
            start: bridge.bind::<EntityStartFn>(&start)?,
            update: bridge.bind::<EntityUpdateFn>(&update)?,
            stop: bridge.bind::<EntityStopFn>(&stop)?,
        })
    }
}

impl From<LifecycleDelegates> for ScriptDelegates {
    fn from(delegates: LifecycleDelegates) -> Self {
        ScriptDelegates::new(delegates.start, delegates.update, delegates.stop)
    }
}
