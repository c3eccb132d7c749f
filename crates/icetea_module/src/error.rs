use std::path::PathBuf;

use thiserror::Error;

/// Resolution exhausted every candidate without a match.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ResolveError {
    #[error("module `{name}` not found (imported from `{importer}`)")]
    ModuleNotFound { name: String, importer: String },
}

/// Failures of the internal module store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to read internal module archive: {0}")]
    Archive(#[from] zip::result::ZipError),
    #[error("failed to read internal library at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid internal library path {path}: {reason}")]
    Pattern { path: PathBuf, reason: String },
    #[error("internal module `{0}` not found")]
    NotFound(String),
}

/// Failures while reading a resolved module's source.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read module file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("module `{0}` is not valid UTF-8")]
    InvalidUtf8(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}
