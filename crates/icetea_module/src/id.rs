use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::conventions::{EMBEDDED_IMPORTER, INTERNAL_PREFIX, is_native_extension};

/// Canonical identifier of a resolved module.
///
/// Either an absolute, canonicalized file path or `internal:` followed by a
/// logical name inside the internal store. Two imports that resolve to the
/// same id are the same module.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModuleId(String);

impl ModuleId {
    /// Id of a module served by the internal store.
    pub fn internal(name: &str) -> Self {
        Self(format!("{INTERNAL_PREFIX}{name}"))
    }

    /// Id of a module on disk. The path should already be canonical.
    pub fn from_path(path: &Path) -> Self {
        Self(path.to_string_lossy().into_owned())
    }

    /// Wraps an id received back from the VM without re-validating it.
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_internal(&self) -> bool {
        self.0.starts_with(INTERNAL_PREFIX)
    }

    /// Logical store name for internal ids.
    pub fn internal_name(&self) -> Option<&str> {
        self.0.strip_prefix(INTERNAL_PREFIX)
    }

    /// File system path for on-disk ids.
    pub fn path(&self) -> Option<&Path> {
        (!self.is_internal()).then(|| Path::new(&self.0))
    }

    pub fn kind(&self) -> ModuleKind {
        ModuleKind::of(self)
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ModuleId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<PathBuf> for ModuleId {
    fn from(path: PathBuf) -> Self {
        Self::from_path(&path)
    }
}

/// How a resolved module is backed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleKind {
    Internal,
    Script,
    Native,
}

impl ModuleKind {
    pub fn of(id: &ModuleId) -> Self {
        if id.is_internal() {
            return Self::Internal;
        }
        let ext = id
            .path()
            .and_then(Path::extension)
            .and_then(|ext| ext.to_str())
            .unwrap_or_default();
        // Anything that is not a native library is handed to the VM as
        // script text, including files found by the literal lookup.
        if is_native_extension(ext) {
            Self::Native
        } else {
            Self::Script
        }
    }
}

/// The module requesting an import.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Importer {
    /// The host binary itself; searches start at the working directory.
    Embedded,
    Module(ModuleId),
}

impl Importer {
    /// Parses the importer name handed over by the VM.
    pub fn parse(raw: &str) -> Self {
        if raw == EMBEDDED_IMPORTER {
            Self::Embedded
        } else {
            Self::Module(ModuleId::from_raw(raw))
        }
    }
}

impl fmt::Display for Importer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Embedded => f.write_str(EMBEDDED_IMPORTER),
            Self::Module(id) => id.fmt(f),
        }
    }
}

impl From<ModuleId> for Importer {
    fn from(id: ModuleId) -> Self {
        Self::Module(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn internal_ids_round_trip_their_name() {
        let id = ModuleId::internal("fs/path");
        assert_eq!(id.as_str(), "internal:fs/path");
        assert!(id.is_internal());
        assert_eq!(id.internal_name(), Some("fs/path"));
        assert!(id.path().is_none());
        assert_eq!(id.kind(), ModuleKind::Internal);
    }

    #[test]
    fn kinds_follow_extensions() {
        assert_eq!(
            ModuleId::from_raw("/proj/lib/zlib.nit").kind(),
            ModuleKind::Native
        );
        assert_eq!(
            ModuleId::from_raw("/proj/lib/zlib.nwren").kind(),
            ModuleKind::Native
        );
        assert_eq!(
            ModuleId::from_raw("/proj/main.wren").kind(),
            ModuleKind::Script
        );
        assert_eq!(ModuleId::from_raw("/proj/Makefile").kind(), ModuleKind::Script);
    }

    #[test]
    fn importer_sentinel() {
        assert_eq!(Importer::parse("@"), Importer::Embedded);
        assert_eq!(
            Importer::parse("/a/b.it"),
            Importer::Module(ModuleId::from_raw("/a/b.it"))
        );
        assert_eq!(Importer::Embedded.to_string(), "@");
    }
}
