//! C ABI shared with native modules.
//!
//! A native module exports two functions named after its identifier (the
//! library's file stem):
//!
//! ```c
//! RawModule* wrenModule_foo_create(WrenVM* vm);
//! void       wrenModule_foo_exit(WrenVM* vm, RawModule* module);
//! ```
//!
//! `classes` is terminated by an entry whose `name` is `NULL`, and each
//! class's `methods` by an entry whose `signature` is `NULL`. Every pointer
//! in the tables points into the module's own memory and is only valid until
//! the exit function returns.

use std::ffi::{CString, c_char, c_void};
use std::path::Path;
use std::ptr;

/// Implementation of a foreign method.
pub type ForeignMethodFn = unsafe extern "C" fn(vm: *mut c_void);
/// Allocator run when the VM instantiates a foreign class.
pub type AllocateFn = unsafe extern "C" fn(vm: *mut c_void);
/// Finalizer run with the instance data of a collected foreign object.
pub type FinalizeFn = unsafe extern "C" fn(data: *mut c_void);
pub type ModuleCreateFn = unsafe extern "C" fn(vm: *mut c_void) -> *mut RawModule;
pub type ModuleExitFn = unsafe extern "C" fn(vm: *mut c_void, module: *mut RawModule);

#[repr(C)]
#[derive(Debug)]
pub struct RawMethod {
    pub is_static: bool,
    pub signature: *const c_char,
    pub method: Option<ForeignMethodFn>,
}

#[repr(C)]
#[derive(Debug)]
pub struct RawClass {
    pub name: *const c_char,
    pub allocate: Option<AllocateFn>,
    pub finalize: Option<FinalizeFn>,
    pub methods: *const RawMethod,
}

#[repr(C)]
#[derive(Debug)]
pub struct RawModule {
    pub name: *const c_char,
    pub copyright: *const c_char,
    pub version: *const c_char,
    pub classes: *const RawClass,
    /// Script source evaluated in the name of the module.
    pub source: *const c_char,
    pub user_data: *mut c_void,
}

impl RawMethod {
    pub const END: Self = Self {
        is_static: false,
        signature: ptr::null(),
        method: None,
    };
}

impl RawClass {
    pub const END: Self = Self {
        name: ptr::null(),
        allocate: None,
        finalize: None,
        methods: ptr::null(),
    };
}

impl RawModule {
    /// Frees a descriptor produced by
    /// [`ModuleDescriptor::into_raw`](crate::ModuleDescriptor::into_raw).
    /// The user data pointer is left alone.
    ///
    /// # Safety
    /// `module` must be null or come from `ModuleDescriptor::into_raw` and
    /// must not be used afterwards.
    pub unsafe fn free(module: *mut Self) {
        if module.is_null() {
            return;
        }

        unsafe {
            let module = Box::from_raw(module);
            free_string(module.name);
            free_string(module.copyright);
            free_string(module.version);
            free_string(module.source);

            if module.classes.is_null() {
                return;
            }
            let class_count = table_len(module.classes, |class| class.name.is_null());
            for index in 0..class_count {
                let class = &*module.classes.add(index);
                free_string(class.name);
                if !class.methods.is_null() {
                    let method_count = table_len(class.methods, |method| method.signature.is_null());
                    for method_index in 0..method_count {
                        free_string((*class.methods.add(method_index)).signature);
                    }
                    free_table(class.methods, method_count);
                }
            }
            free_table(module.classes, class_count);
        }
    }
}

/// Handle of the VM that owns a registry, passed to every native callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VmHandle(*mut c_void);

impl VmHandle {
    pub fn new(vm: *mut c_void) -> Self {
        Self(vm)
    }

    /// A handle that refers to no VM.
    pub fn detached() -> Self {
        Self(ptr::null_mut())
    }

    pub fn as_ptr(self) -> *mut c_void {
        self.0
    }

    pub fn is_detached(self) -> bool {
        self.0.is_null()
    }
}

impl Default for VmHandle {
    fn default() -> Self {
        Self::detached()
    }
}

/// Identifier of the native module stored at `path`: its file stem with
/// anything outside `[A-Za-z0-9_]` replaced by `_`.
pub fn module_identifier(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy())
        .unwrap_or_default()
        .chars()
        .map(|ch| if ch.is_ascii_alphanumeric() || ch == '_' { ch } else { '_' })
        .collect()
}

pub fn create_symbol(identifier: &str) -> String {
    format!("wrenModule_{identifier}_create")
}

pub fn exit_symbol(identifier: &str) -> String {
    format!("wrenModule_{identifier}_exit")
}

/// Number of entries before the terminator.
///
/// # Safety
/// `table` must point to an array terminated by an entry for which
/// `is_end` returns true.
pub(crate) unsafe fn table_len<T>(table: *const T, is_end: impl Fn(&T) -> bool) -> usize {
    let mut len = 0;
    unsafe {
        while !is_end(&*table.add(len)) {
            len += 1;
        }
    }
    len
}

pub(crate) fn leak_string(value: &str) -> *const c_char {
    // Callers validate for interior NUL bytes first.
    CString::new(value)
        .unwrap_or_default()
        .into_raw()
        .cast_const()
}

pub(crate) fn leak_table<T>(entries: Vec<T>) -> *const T {
    Box::into_raw(entries.into_boxed_slice()).cast::<T>().cast_const()
}

unsafe fn free_string(value: *const c_char) {
    if !value.is_null() {
        drop(unsafe { CString::from_raw(value.cast_mut()) });
    }
}

/// Frees a table of `len` entries plus its terminator.
unsafe fn free_table<T>(table: *const T, len: usize) {
    let slice = ptr::slice_from_raw_parts_mut(table.cast_mut(), len + 1);
    drop(unsafe { Box::from_raw(slice) });
}
