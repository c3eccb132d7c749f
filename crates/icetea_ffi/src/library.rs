use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::abi::{ModuleCreateFn, ModuleExitFn};
use crate::error::NativeError;

/// An opened native module library.
pub trait ModuleLibrary {
    fn path(&self) -> &Path;

    /// Looks up the module's create entry point.
    fn create_fn(&self, symbol: &str) -> Option<ModuleCreateFn>;

    /// Looks up the module's exit entry point.
    fn exit_fn(&self, symbol: &str) -> Option<ModuleExitFn>;

    /// Unloads the library. Every function pointer obtained from it becomes
    /// invalid.
    fn close(self: Box<Self>) -> Result<(), NativeError>;
}

/// Opens libraries for the registry.
pub trait LibraryOpener {
    fn open(&self, path: &Path) -> Result<Box<dyn ModuleLibrary>, NativeError>;
}

/// A shared library opened through the platform loader.
///
/// The handle is closed exactly once: explicitly via
/// [`ModuleLibrary::close`], or when the wrapper is dropped.
#[derive(Debug)]
pub struct NativeLibrary {
    path: PathBuf,
    library: Option<libloading::Library>,
}

impl NativeLibrary {
    pub fn open(path: &Path) -> Result<Self, NativeError> {
        // SAFETY: loading a library runs its initializers. Native modules
        // are trusted code, the same as the host binary.
        let library = unsafe { libloading::Library::new(path) }.map_err(|err| {
            NativeError::LoadFailed {
                path: path.to_path_buf(),
                reason: err.to_string(),
            }
        })?;

        debug!("opened native library {}", path.display());
        Ok(Self {
            path: path.to_path_buf(),
            library: Some(library),
        })
    }

    fn symbol<T: Copy>(&self, name: &str) -> Option<T> {
        let library = self.library.as_ref()?;
        // SAFETY: `T` is one of the entry point types mandated by the
        // module ABI; the symbol names encode which one is expected.
        unsafe { library.get::<T>(name.as_bytes()) }
            .ok()
            .map(|symbol| *symbol)
    }
}

impl ModuleLibrary for NativeLibrary {
    fn path(&self) -> &Path {
        &self.path
    }

    fn create_fn(&self, symbol: &str) -> Option<ModuleCreateFn> {
        self.symbol(symbol)
    }

    fn exit_fn(&self, symbol: &str) -> Option<ModuleExitFn> {
        self.symbol(symbol)
    }

    fn close(mut self: Box<Self>) -> Result<(), NativeError> {
        let Some(library) = self.library.take() else {
            return Ok(());
        };
        library.close().map_err(|err| NativeError::CloseFailed {
            path: self.path.clone(),
            reason: err.to_string(),
        })?;
        debug!("closed native library {}", self.path.display());
        Ok(())
    }
}

impl Drop for NativeLibrary {
    fn drop(&mut self) {
        if let Some(library) = self.library.take()
            && let Err(err) = library.close()
        {
            warn!("failed to close {}: {err}", self.path.display());
        }
    }
}

/// Opens libraries with the platform's dynamic loader.
#[derive(Debug, Clone, Copy, Default)]
pub struct DylibOpener;

impl LibraryOpener for DylibOpener {
    fn open(&self, path: &Path) -> Result<Box<dyn ModuleLibrary>, NativeError> {
        Ok(Box::new(NativeLibrary::open(path)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_file_fails_to_open() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("absent.nit");

        let err = NativeLibrary::open(&path).unwrap_err();
        assert!(matches!(err, NativeError::LoadFailed { path: failed, .. } if failed == path));
    }

    #[test]
    fn garbage_file_fails_to_open() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("garbage.nit");
        std::fs::write(&path, b"this is not a shared object").unwrap();

        assert!(DylibOpener.open(&path).is_err());
    }
}
