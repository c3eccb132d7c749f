//! Per-VM module host.
//!
//! The VM integration owns one [`ModuleHost`] and forwards its resolve, load
//! and foreign binding callbacks to it. Script modules come back as source
//! text; native modules are loaded into the registry on first use and the
//! VM gets the inline source from their descriptor.

use ahash::AHashMap;
use icetea_ffi::{
    ForeignClass, ForeignMethod, InstanceTracker, NativeError, NativeModuleEntry,
    NativeModuleRegistry, VmHandle,
};
use icetea_module::{
    Importer, InternalModules, LoadError, ModuleConfig, ModuleId, ModuleSource, ResolveError,
    SourceLoader,
};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum HostError {
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    #[error(transparent)]
    Load(#[from] LoadError),
    #[error(transparent)]
    Native(#[from] NativeError),
}

/// Live foreign instances per native module.
#[derive(Debug, Default)]
struct InstanceCounts(AHashMap<String, usize>);

impl InstanceTracker for InstanceCounts {
    fn live_instances(&self, module: &str) -> usize {
        self.0.get(module).copied().unwrap_or(0)
    }
}

#[derive(Debug)]
pub struct ModuleHost {
    loader: SourceLoader,
    registry: NativeModuleRegistry,
    instances: InstanceCounts,
}

impl ModuleHost {
    pub fn new(config: ModuleConfig, vm: VmHandle) -> Self {
        Self::with_parts(SourceLoader::from_config(config), NativeModuleRegistry::new(vm))
    }

    pub fn with_parts(loader: SourceLoader, registry: NativeModuleRegistry) -> Self {
        Self {
            loader,
            registry,
            instances: InstanceCounts::default(),
        }
    }

    pub fn loader(&self) -> &SourceLoader {
        &self.loader
    }

    pub fn registry(&self) -> &NativeModuleRegistry {
        &self.registry
    }

    pub fn internals(&self) -> &InternalModules {
        self.loader.internals()
    }

    /// Resolves `name` as imported by the module the VM calls `importer`.
    pub fn resolve(&self, importer: &str, name: &str) -> Result<ModuleId, HostError> {
        Ok(self.loader.resolve(&Importer::parse(importer), name)?)
    }

    /// Source the VM should evaluate for `id`.
    ///
    /// Native modules are loaded here; their source is whatever their
    /// descriptor carries, possibly nothing.
    pub fn load(&mut self, id: &ModuleId) -> Result<String, HostError> {
        if let Some(entry) = self.registry.get_module(id.as_str()) {
            return Ok(entry.source().unwrap_or_default().to_owned());
        }

        match self.loader.load(id)? {
            ModuleSource::Script(source) => Ok(source),
            ModuleSource::Native(path) => {
                let entry = self.registry.load_module(&path)?;
                Ok(entry.source().unwrap_or_default().to_owned())
            }
        }
    }

    /// Resolves and loads in one go, the way an `import` statement does.
    pub fn import(&mut self, importer: &str, name: &str) -> Result<(ModuleId, String), HostError> {
        let id = self.resolve(importer, name)?;
        let source = self.load(&id)?;
        Ok((id, source))
    }

    pub fn find_class(&self, module: &str, class: &str) -> Option<ForeignClass> {
        self.registry.find_class(module, class)
    }

    pub fn find_method(
        &self,
        module: &str,
        class: &str,
        is_static: bool,
        signature: &str,
    ) -> Option<ForeignMethod> {
        self.registry.find_method(module, class, is_static, signature)
    }

    /// Records a new foreign object created from one of `module`'s classes.
    pub fn instance_allocated(&mut self, module: &str) {
        *self.instances.0.entry(module.to_owned()).or_insert(0) += 1;
    }

    /// Records that the VM finalized a foreign object of `module`.
    pub fn instance_finalized(&mut self, module: &str) {
        if let Some(count) = self.instances.0.get_mut(module) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                self.instances.0.remove(module);
            }
        }
    }

    pub fn live_instances(&self, module: &str) -> usize {
        self.instances.live_instances(module)
    }

    /// Unloads a native module, unless the VM still holds instances of it.
    pub fn unload(&mut self, module: &str) -> Result<(), HostError> {
        debug!("unload requested for `{module}`");
        self.registry.drop_module(module, &self.instances)?;
        Ok(())
    }

    /// Makes a module compiled into the host importable under its id.
    pub fn register_builtin(&mut self, entry: NativeModuleEntry, overwrite: bool) -> Result<(), HostError> {
        self.registry.add_manually(entry, overwrite)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use icetea_ffi::{ClassDescriptor, ModuleDescriptor};
    use std::ffi::c_void;
    use tempfile::TempDir;

    unsafe extern "C" fn noop(_vm: *mut c_void) {}

    fn host(dir: &TempDir) -> ModuleHost {
        ModuleHost::new(
            ModuleConfig::new().with_working_dir(dir.path()),
            VmHandle::detached(),
        )
    }

    #[test]
    fn builtin_modules_load_their_inline_source() {
        let temp_dir = TempDir::new().unwrap();
        let mut host = host(&temp_dir);
        let id = "/builtin/meta";
        host.register_builtin(
            NativeModuleEntry::builtin(
                id,
                ModuleDescriptor::new("meta")
                    .with_class(ClassDescriptor::new("Meta").with_static_method("eval(_)", noop))
                    .with_source("class Meta {\n  foreign static eval(_)\n}\n"),
            ),
            false,
        )
        .unwrap();

        let source = host.load(&ModuleId::from_raw(id)).unwrap();
        assert!(source.contains("foreign static eval(_)"));
        assert!(host.find_method(id, "Meta", true, "eval(_)").is_some());
        assert!(host.find_class(id, "Meta").is_some());
    }

    #[test]
    fn instance_counts_guard_unloading() {
        let temp_dir = TempDir::new().unwrap();
        let mut host = host(&temp_dir);
        host.register_builtin(NativeModuleEntry::builtin("/builtin/meta", ModuleDescriptor::new("meta")), false)
            .unwrap();

        host.instance_allocated("/builtin/meta");
        host.instance_allocated("/builtin/meta");
        host.instance_finalized("/builtin/meta");
        assert_eq!(host.live_instances("/builtin/meta"), 1);
        assert!(matches!(
            host.unload("/builtin/meta"),
            Err(HostError::Native(NativeError::UnloadRefused { live: 1, .. }))
        ));

        host.instance_finalized("/builtin/meta");
        host.instance_finalized("/builtin/meta");
        assert_eq!(host.live_instances("/builtin/meta"), 0);
        host.unload("/builtin/meta").unwrap();
        assert!(host.registry().is_empty());
    }
}
