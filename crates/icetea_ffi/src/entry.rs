use std::fmt;
use std::rc::{Rc, Weak};

use tracing::{debug, warn};

use crate::abi::{ModuleExitFn, RawModule, VmHandle};
use crate::descriptor::ModuleDescriptor;
use crate::error::NativeError;
use crate::library::ModuleLibrary;

type BuiltinExit = Box<dyn FnOnce(&mut ModuleDescriptor)>;

/// How an entry is torn down.
enum Teardown {
    /// Loaded from a shared library: run the exit entry point with the
    /// descriptor the library created, then unload the library.
    Library {
        library: Box<dyn ModuleLibrary>,
        exit: ModuleExitFn,
        raw: *mut RawModule,
        vm: VmHandle,
    },
    /// Compiled into the host.
    Builtin { exit: Option<BuiltinExit> },
}

/// A native module known to the registry.
///
/// The entry owns the library its function pointers live in. Dropping the
/// entry runs the module's exit callback, revokes every binding handed out
/// for it and only then closes the library.
pub struct NativeModuleEntry {
    id: String,
    identifier: String,
    descriptor: ModuleDescriptor,
    generation: u64,
    alive: Option<Rc<()>>,
    teardown: Option<Teardown>,
}

impl NativeModuleEntry {
    /// Entry for a module compiled directly into the host binary.
    ///
    /// `id` is the name the module is registered under.
    pub fn builtin(id: impl Into<String>, descriptor: ModuleDescriptor) -> Self {
        let id = id.into();
        Self {
            identifier: id.clone(),
            id,
            descriptor,
            generation: 0,
            alive: Some(Rc::new(())),
            teardown: Some(Teardown::Builtin { exit: None }),
        }
    }

    /// Runs `exit` with the descriptor when the entry is torn down, to
    /// release whatever the module keeps in its user data.
    pub fn on_exit(mut self, exit: impl FnOnce(&mut ModuleDescriptor) + 'static) -> Self {
        if let Some(Teardown::Builtin { exit: slot }) = &mut self.teardown {
            *slot = Some(Box::new(exit));
        }
        self
    }

    pub(crate) fn from_library(
        id: String,
        identifier: String,
        descriptor: ModuleDescriptor,
        library: Box<dyn ModuleLibrary>,
        exit: ModuleExitFn,
        raw: *mut RawModule,
        vm: VmHandle,
    ) -> Self {
        Self {
            id,
            identifier,
            descriptor,
            generation: 0,
            alive: Some(Rc::new(())),
            teardown: Some(Teardown::Library {
                library,
                exit,
                raw,
                vm,
            }),
        }
    }
}

impl NativeModuleEntry {
    /// Canonical path (or registered name) of the module.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Stem the entry point symbols were derived from.
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn descriptor(&self) -> &ModuleDescriptor {
        &self.descriptor
    }

    /// Inline source the VM evaluates in the name of the module.
    pub fn source(&self) -> Option<&str> {
        self.descriptor.source.as_deref()
    }

    /// Registry-assigned sequence number; every load gets a new one.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_builtin(&self) -> bool {
        matches!(self.teardown, Some(Teardown::Builtin { .. }))
    }

    pub(crate) fn set_generation(&mut self, generation: u64) {
        self.generation = generation;
    }

    pub(crate) fn liveness(&self) -> Weak<()> {
        self.alive.as_ref().map_or_else(Weak::new, Rc::downgrade)
    }

    /// Tears the entry down, reporting a library that fails to close.
    pub fn shutdown(mut self) -> Result<(), NativeError> {
        self.release()
    }

    fn release(&mut self) -> Result<(), NativeError> {
        let Some(teardown) = self.teardown.take() else {
            return Ok(());
        };

        debug!("releasing native module `{}`", self.id);
        match teardown {
            Teardown::Library {
                library,
                exit,
                raw,
                vm,
            } => {
                // SAFETY: `raw` is the descriptor this library's create
                // function returned; it is handed back exactly once.
                unsafe { exit(vm.as_ptr(), raw) };
                self.alive = None;
                library.close()
            }
            Teardown::Builtin { exit } => {
                if let Some(exit) = exit {
                    exit(&mut self.descriptor);
                }
                self.alive = None;
                Ok(())
            }
        }
    }
}

impl Drop for NativeModuleEntry {
    fn drop(&mut self) {
        if let Err(err) = self.release() {
            warn!("{err}");
        }
    }
}

impl fmt::Debug for NativeModuleEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeModuleEntry")
            .field("id", &self.id)
            .field("identifier", &self.identifier)
            .field("name", &self.descriptor.name)
            .field("generation", &self.generation)
            .field("builtin", &self.is_builtin())
            .finish_non_exhaustive()
    }
}
