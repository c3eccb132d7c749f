//! Foreign binding lookup.
//!
//! Called by the VM whenever it instantiates a foreign class or binds a
//! foreign method, so lookups only scan the tables copied at load time.
//! Every binding remembers the entry it came from: once that entry has been
//! unloaded the binding refuses to hand out its function pointer.

use std::ffi::c_void;
use std::rc::Weak;

use crate::abi::{AllocateFn, FinalizeFn, ForeignMethodFn, VmHandle};
use crate::entry::NativeModuleEntry;
use crate::error::NativeError;
use crate::registry::NativeModuleRegistry;

/// Allocation and finalization hooks of a foreign class.
#[derive(Debug, Clone)]
pub struct ForeignClass {
    module: String,
    class: String,
    generation: u64,
    allocate: Option<AllocateFn>,
    finalize: Option<FinalizeFn>,
    alive: Weak<()>,
}

impl ForeignClass {
    pub fn module(&self) -> &str {
        &self.module
    }

    pub fn class(&self) -> &str {
        &self.class
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_live(&self) -> bool {
        self.alive.upgrade().is_some()
    }

    pub fn allocate(&self) -> Result<Option<AllocateFn>, NativeError> {
        self.check()?;
        Ok(self.allocate)
    }

    pub fn finalize(&self) -> Result<Option<FinalizeFn>, NativeError> {
        self.check()?;
        Ok(self.finalize)
    }

    /// Runs the allocator, if the class has one.
    ///
    /// # Safety
    /// Calls into native code; `vm` must be the handle the module expects.
    pub unsafe fn call_allocate(&self, vm: VmHandle) -> Result<bool, NativeError> {
        let Some(allocate) = self.allocate()? else {
            return Ok(false);
        };
        unsafe { allocate(vm.as_ptr()) };
        Ok(true)
    }

    /// Runs the finalizer on an instance's data, if the class has one.
    ///
    /// # Safety
    /// Calls into native code; `data` must belong to an instance of this class.
    pub unsafe fn call_finalize(&self, data: *mut c_void) -> Result<bool, NativeError> {
        let Some(finalize) = self.finalize()? else {
            return Ok(false);
        };
        unsafe { finalize(data) };
        Ok(true)
    }

    fn check(&self) -> Result<(), NativeError> {
        if self.is_live() {
            Ok(())
        } else {
            Err(stale(&self.module, self.generation))
        }
    }
}

/// A foreign method implementation.
#[derive(Debug, Clone)]
pub struct ForeignMethod {
    module: String,
    class: String,
    signature: String,
    is_static: bool,
    generation: u64,
    method: ForeignMethodFn,
    alive: Weak<()>,
}

impl ForeignMethod {
    pub fn module(&self) -> &str {
        &self.module
    }

    pub fn class(&self) -> &str {
        &self.class
    }

    pub fn signature(&self) -> &str {
        &self.signature
    }

    pub fn is_static(&self) -> bool {
        self.is_static
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_live(&self) -> bool {
        self.alive.upgrade().is_some()
    }

    /// The function pointer, while its module is still loaded.
    pub fn get(&self) -> Result<ForeignMethodFn, NativeError> {
        if self.is_live() {
            Ok(self.method)
        } else {
            Err(stale(&self.module, self.generation))
        }
    }

    /// Invokes the method.
    ///
    /// # Safety
    /// Calls into native code; `vm` must be the handle the module expects.
    pub unsafe fn call(&self, vm: VmHandle) -> Result<(), NativeError> {
        let method = self.get()?;
        unsafe { method(vm.as_ptr()) };
        Ok(())
    }
}

impl NativeModuleEntry {
    pub fn has_class(&self, class: &str) -> bool {
        self.descriptor().class(class).is_some()
    }

    pub fn find_class(&self, class: &str) -> Option<ForeignClass> {
        let descriptor = self.descriptor().class(class)?;
        Some(ForeignClass {
            module: self.id().to_owned(),
            class: descriptor.name.clone(),
            generation: self.generation(),
            allocate: descriptor.allocate,
            finalize: descriptor.finalize,
            alive: self.liveness(),
        })
    }

    /// Static and instance methods never stand in for each other.
    pub fn find_method(&self, class: &str, is_static: bool, signature: &str) -> Option<ForeignMethod> {
        let method = self.descriptor().class(class)?.method(is_static, signature)?;
        Some(ForeignMethod {
            module: self.id().to_owned(),
            class: class.to_owned(),
            signature: method.signature.clone(),
            is_static,
            generation: self.generation(),
            method: method.method,
            alive: self.liveness(),
        })
    }
}

impl NativeModuleRegistry {
    pub fn find_class(&self, module: &str, class: &str) -> Option<ForeignClass> {
        self.get_module(module)?.find_class(class)
    }

    pub fn find_method(
        &self,
        module: &str,
        class: &str,
        is_static: bool,
        signature: &str,
    ) -> Option<ForeignMethod> {
        self.get_module(module)?
            .find_method(class, is_static, signature)
    }
}

fn stale(module: &str, generation: u64) -> NativeError {
    NativeError::StaleBinding {
        module: module.to_owned(),
        generation,
    }
}
