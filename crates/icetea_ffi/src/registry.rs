use std::fmt;
use std::path::{Path, PathBuf};

use ahash::AHashMap;
use tracing::{debug, info, warn};

use crate::abi::{RawModule, VmHandle, create_symbol, exit_symbol, module_identifier};
use crate::descriptor::ModuleDescriptor;
use crate::entry::NativeModuleEntry;
use crate::error::NativeError;
use crate::library::{DylibOpener, LibraryOpener, ModuleLibrary};

/// Reports how many foreign objects of a module the VM still holds.
pub trait InstanceTracker {
    fn live_instances(&self, module: &str) -> usize;
}

/// Tracker for hosts that never keep foreign instances around.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoInstances;

impl InstanceTracker for NoInstances {
    fn live_instances(&self, _module: &str) -> usize {
        0
    }
}

/// Native modules loaded by one VM.
///
/// Entries are keyed by canonical library path (or, for builtin modules, by
/// the name they were registered under) and released in reverse creation
/// order when the registry is dropped.
pub struct NativeModuleRegistry {
    vm: VmHandle,
    opener: Box<dyn LibraryOpener>,
    entries: AHashMap<String, NativeModuleEntry>,
    order: Vec<String>,
    failures: AHashMap<String, NativeError>,
    next_generation: u64,
}

impl NativeModuleRegistry {
    pub fn new(vm: VmHandle) -> Self {
        Self::with_opener(vm, Box::new(DylibOpener))
    }

    pub fn with_opener(vm: VmHandle, opener: Box<dyn LibraryOpener>) -> Self {
        Self {
            vm,
            opener,
            entries: AHashMap::new(),
            order: Vec::new(),
            failures: AHashMap::new(),
            next_generation: 1,
        }
    }

    pub fn vm(&self) -> VmHandle {
        self.vm
    }

    /// Loads the native module at `path` unless it already is, returning
    /// its entry. The entry is keyed by the canonical path.
    ///
    /// A failed load is remembered and reported again on later calls until
    /// [`forget_failure`](Self::forget_failure) is called.
    pub fn load_module(&mut self, path: &Path) -> Result<&NativeModuleEntry, NativeError> {
        let path = canonical(path);
        let id = path.to_string_lossy().into_owned();

        if self.entries.contains_key(&id) {
            debug!("native module `{id}` already loaded");
        } else {
            if let Some(err) = self.failures.get(&id) {
                debug!("native module `{id}` failed before: {err}");
                return Err(err.clone());
            }

            match self.open_entry(&path, id.clone()) {
                Ok(entry) => {
                    info!(
                        "loaded native module `{}` from {}",
                        entry.descriptor().name,
                        path.display()
                    );
                    self.insert(entry);
                }
                Err(err) => {
                    warn!("{err}");
                    self.failures.insert(id, err.clone());
                    return Err(err);
                }
            }
        }

        self.entries
            .get(&id)
            .ok_or_else(|| NativeError::NotLoaded(id.clone()))
    }

    fn open_entry(&self, path: &Path, id: String) -> Result<NativeModuleEntry, NativeError> {
        let library = self.opener.open(path)?;
        let identifier = module_identifier(path);

        let create_name = create_symbol(&identifier);
        let exit_name = exit_symbol(&identifier);
        let Some(create) = library.create_fn(&create_name) else {
            return Err(close_after(library, missing(path, create_name)));
        };
        let Some(exit) = library.exit_fn(&exit_name) else {
            return Err(close_after(library, missing(path, exit_name)));
        };

        debug!("calling {create_name}");
        // SAFETY: the symbol was exported under the create entry point name
        // and the library stays open for as long as the entry exists.
        let raw = unsafe { create(self.vm.as_ptr()) };
        if raw.is_null() {
            let err = NativeError::NullDescriptor {
                path: path.to_path_buf(),
                symbol: create_name,
            };
            return Err(close_after(library, err));
        }

        // SAFETY: `raw` is non-null and was just produced by the module.
        let descriptor = match unsafe { ModuleDescriptor::from_raw(&*raw, &identifier) } {
            Ok(descriptor) => descriptor,
            Err(source) => {
                // The module still owns `raw`; let it clean up.
                unsafe { exit(self.vm.as_ptr(), raw) };
                let err = NativeError::InvalidDescriptor {
                    path: path.to_path_buf(),
                    source,
                };
                return Err(close_after(library, err));
            }
        };

        Ok(NativeModuleEntry::from_library(
            id, identifier, descriptor, library, exit, raw, self.vm,
        ))
    }

    fn insert(&mut self, mut entry: NativeModuleEntry) {
        entry.set_generation(self.next_generation);
        self.next_generation += 1;

        let id = entry.id().to_owned();
        self.failures.remove(&id);
        self.order.push(id.clone());
        self.entries.insert(id, entry);
    }

    /// Clears a remembered load failure so the next load retries.
    pub fn forget_failure(&mut self, path: &Path) -> bool {
        let id = canonical(path).to_string_lossy().into_owned();
        self.failures.remove(&id).is_some()
    }

    pub fn has_module(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    pub fn get_module(&self, id: &str) -> Option<&NativeModuleEntry> {
        self.entries.get(id)
    }

    /// Loaded modules in the order they were created.
    pub fn modules(&self) -> impl Iterator<Item = &NativeModuleEntry> {
        self.order.iter().filter_map(|id| self.entries.get(id))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Unloads a module nobody holds foreign instances of anymore.
    ///
    /// Bindings handed out for the module report
    /// [`NativeError::StaleBinding`] afterwards.
    pub fn drop_module(&mut self, id: &str, tracker: &dyn InstanceTracker) -> Result<(), NativeError> {
        if !self.entries.contains_key(id) {
            return Err(NativeError::NotLoaded(id.to_owned()));
        }

        let live = tracker.live_instances(id);
        if live > 0 {
            return Err(NativeError::UnloadRefused {
                module: id.to_owned(),
                live,
            });
        }

        let entry = self.remove(id).ok_or_else(|| NativeError::NotLoaded(id.to_owned()))?;
        info!("unloading native module `{id}`");
        entry.shutdown()
    }

    /// Registers a prebuilt entry, typically a module compiled into the host.
    pub fn add_manually(&mut self, entry: NativeModuleEntry, overwrite: bool) -> Result<(), NativeError> {
        let id = entry.id().to_owned();
        if let Some(previous) = self.remove_existing(&id, overwrite)? {
            debug!("replacing native module `{id}`");
            if let Err(err) = previous.shutdown() {
                warn!("{err}");
            }
        }

        info!("registered native module `{id}`");
        self.insert(entry);
        Ok(())
    }

    fn remove_existing(
        &mut self,
        id: &str,
        overwrite: bool,
    ) -> Result<Option<NativeModuleEntry>, NativeError> {
        if !self.entries.contains_key(id) {
            return Ok(None);
        }
        if !overwrite {
            return Err(NativeError::AlreadyRegistered(id.to_owned()));
        }
        Ok(self.remove(id))
    }

    fn remove(&mut self, id: &str) -> Option<NativeModuleEntry> {
        self.order.retain(|other| other != id);
        self.entries.remove(id)
    }
}

impl Drop for NativeModuleRegistry {
    fn drop(&mut self) {
        while let Some(id) = self.order.pop() {
            if let Some(entry) = self.entries.remove(&id)
                && let Err(err) = entry.shutdown()
            {
                warn!("{err}");
            }
        }
    }
}

impl fmt::Debug for NativeModuleRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeModuleRegistry")
            .field("vm", &self.vm)
            .field("modules", &self.order)
            .field("failures", &self.failures.len())
            .finish_non_exhaustive()
    }
}

fn canonical(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}

fn missing(path: &Path, symbol: String) -> NativeError {
    NativeError::MissingSymbol {
        path: path.to_path_buf(),
        symbol,
    }
}

/// Closes a library that did not become an entry, keeping `err` as the
/// reported failure.
fn close_after(library: Box<dyn ModuleLibrary>, err: NativeError) -> NativeError {
    if let Err(close_err) = library.close() {
        warn!("{close_err}");
    }
    err
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::ClassDescriptor;
    use std::ffi::c_void;

    unsafe extern "C" fn noop(_vm: *mut c_void) {}

    struct Fixed(usize);

    impl InstanceTracker for Fixed {
        fn live_instances(&self, _module: &str) -> usize {
            self.0
        }
    }

    fn builtin(id: &str) -> NativeModuleEntry {
        NativeModuleEntry::builtin(
            id,
            ModuleDescriptor::new(id).with_class(ClassDescriptor::new("Meta").with_method("eval(_)", noop)),
        )
    }

    #[test]
    fn builtin_modules_get_increasing_generations() {
        let mut registry = NativeModuleRegistry::new(VmHandle::detached());
        registry.add_manually(builtin("meta"), false).unwrap();
        registry.add_manually(builtin("random"), false).unwrap();

        let generations: Vec<u64> = registry.modules().map(NativeModuleEntry::generation).collect();
        assert_eq!(generations, vec![1, 2]);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn unknown_modules_cannot_be_dropped() {
        let mut registry = NativeModuleRegistry::new(VmHandle::detached());
        assert_eq!(
            registry.drop_module("nope", &NoInstances),
            Err(NativeError::NotLoaded("nope".to_owned()))
        );
    }

    #[test]
    fn live_instances_block_unloading() {
        let mut registry = NativeModuleRegistry::new(VmHandle::detached());
        registry.add_manually(builtin("meta"), false).unwrap();

        assert_eq!(
            registry.drop_module("meta", &Fixed(3)),
            Err(NativeError::UnloadRefused {
                module: "meta".to_owned(),
                live: 3
            })
        );
        assert!(registry.has_module("meta"));

        registry.drop_module("meta", &NoInstances).unwrap();
        assert!(registry.is_empty());
    }

    #[test]
    fn failures_are_cached_until_forgotten() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join("absent.nit");
        let mut registry = NativeModuleRegistry::new(VmHandle::detached());

        let first = registry.load_module(&path).unwrap_err();
        assert!(first.is_load_failure());
        assert_eq!(registry.load_module(&path).unwrap_err(), first);

        assert!(registry.forget_failure(&path));
        assert!(!registry.forget_failure(&path));
        assert!(!registry.has_module(&path.to_string_lossy()));
    }
}
