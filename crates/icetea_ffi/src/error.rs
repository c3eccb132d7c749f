use std::path::PathBuf;

use thiserror::Error;

/// A module descriptor returned by a native module could not be used.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DescriptorError {
    #[error("field `{field}` is not valid UTF-8")]
    InvalidUtf8 { field: String },
    #[error("field `{field}` contains an interior NUL byte")]
    InteriorNul { field: String },
    #[error("method `{signature}` of class `{class}` has no implementation")]
    MissingMethod { class: String, signature: String },
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NativeError {
    #[error("failed to load native module {path}: {reason}")]
    LoadFailed { path: PathBuf, reason: String },
    #[error("native module {path} does not export `{symbol}`")]
    MissingSymbol { path: PathBuf, symbol: String },
    #[error("`{symbol}` of native module {path} returned no module descriptor")]
    NullDescriptor { path: PathBuf, symbol: String },
    #[error("native module {path} returned an invalid descriptor: {source}")]
    InvalidDescriptor {
        path: PathBuf,
        #[source]
        source: DescriptorError,
    },
    #[error("refusing to unload `{module}`: {live} foreign instances are still alive")]
    UnloadRefused { module: String, live: usize },
    #[error("native module `{0}` is not loaded")]
    NotLoaded(String),
    #[error("native module `{0}` is already registered")]
    AlreadyRegistered(String),
    #[error("binding into `{module}` (generation {generation}) outlived its module")]
    StaleBinding { module: String, generation: u64 },
    #[error("failed to close native module {path}: {reason}")]
    CloseFailed { path: PathBuf, reason: String },
}

impl NativeError {
    /// Whether this error came out of loading a library, as opposed to
    /// unloading or using one.
    pub fn is_load_failure(&self) -> bool {
        matches!(
            self,
            Self::LoadFailed { .. }
                | Self::MissingSymbol { .. }
                | Self::NullDescriptor { .. }
                | Self::InvalidDescriptor { .. }
        )
    }
}
