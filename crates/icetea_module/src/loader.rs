use std::fs;
use std::path::PathBuf;

use tracing::debug;

use crate::config::ModuleConfig;
use crate::error::{LoadError, ResolveError};
use crate::id::{Importer, ModuleId, ModuleKind};
use crate::internal::InternalModules;
use crate::resolver::ModuleResolver;

/// What a resolved module id is backed by.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModuleSource {
    /// Script text, from the internal store or from disk.
    Script(String),
    /// A native library; its source comes from the library's descriptor.
    Native(PathBuf),
}

/// Reads the source of resolved modules.
///
/// The VM keeps its own cache of scripted modules, so nothing is cached here.
#[derive(Debug, Clone, Default)]
pub struct SourceLoader {
    resolver: ModuleResolver,
}

impl SourceLoader {
    pub fn new(resolver: ModuleResolver) -> Self {
        Self { resolver }
    }

    pub fn from_config(config: ModuleConfig) -> Self {
        Self::new(ModuleResolver::from_config(config))
    }

    /// Resolve an import; see [`ModuleResolver::resolve`].
    pub fn resolve(&self, importer: &Importer, name: &str) -> Result<ModuleId, ResolveError> {
        self.resolver.resolve(importer, name)
    }

    /// Load the source behind a resolved id.
    pub fn load(&self, id: &ModuleId) -> Result<ModuleSource, LoadError> {
        match id.kind() {
            ModuleKind::Internal => {
                let name = id.internal_name().unwrap_or_default();
                let bytes = self.internals().source(name)?;
                debug!("loaded internal module `{name}`");
                decode(id, bytes.to_vec()).map(ModuleSource::Script)
            }
            ModuleKind::Native => Ok(ModuleSource::Native(PathBuf::from(id.as_str()))),
            ModuleKind::Script => {
                let path = PathBuf::from(id.as_str());
                let bytes = fs::read(&path).map_err(|source| LoadError::Io {
                    path: path.clone(),
                    source,
                })?;
                debug!("loaded module file {}", path.display());
                decode(id, bytes).map(ModuleSource::Script)
            }
        }
    }

    /// Get the module resolver
    pub fn resolver(&self) -> &ModuleResolver {
        &self.resolver
    }

    pub fn internals(&self) -> &InternalModules {
        self.resolver.internals()
    }
}

fn decode(id: &ModuleId, bytes: Vec<u8>) -> Result<String, LoadError> {
    String::from_utf8(bytes).map_err(|_| LoadError::InvalidUtf8(id.to_string()))
}
