//! Module system configuration

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::conventions::LIBRARY_PATH_ENV;

/// Runtime configuration of the resolver and the internal store.
///
/// The search conventions themselves are fixed (see
/// [`conventions`](crate::conventions)); only the environment-dependent
/// inputs live here.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleConfig {
    /// Zip archive of internal modules, usually embedded into the host
    /// binary with `include_bytes!`. Takes precedence over `library_path`.
    #[serde(skip)]
    pub archive: Option<Vec<u8>>,
    /// Folder holding internal modules when no archive is embedded.
    pub library_path: Option<PathBuf>,
    /// Start of the search for imports made by the host binary itself.
    /// Falls back to the process working directory when unset.
    pub working_dir: Option<PathBuf>,
}

impl ModuleConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`from_env`](Self::from_env), reading variables through `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(path) = lookup(LIBRARY_PATH_ENV)
            && !path.trim().is_empty()
        {
            config.library_path = Some(PathBuf::from(path));
        }

        config
    }

    pub fn with_archive(mut self, bytes: impl Into<Vec<u8>>) -> Self {
        self.archive = Some(bytes.into());
        self
    }

    pub fn with_library_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.library_path = Some(path.into());
        self
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// The directory embedded imports are resolved against.
    pub fn working_dir(&self) -> PathBuf {
        self.working_dir
            .clone()
            .or_else(|| std::env::current_dir().ok())
            .unwrap_or_else(|| PathBuf::from("."))
    }
}
