//! Module system for IceTea
//!
//! Resolves import names to canonical module ids, serves bundled internal
//! modules and reads module sources off the file system.

pub mod config;
pub mod conventions;
pub mod error;
pub mod id;
pub mod internal;
pub mod loader;
pub mod manifest;
pub mod resolver;

pub use config::ModuleConfig;
pub use error::{LoadError, ResolveError, StoreError};
pub use id::{Importer, ModuleId, ModuleKind};
pub use internal::{InternalModules, StoreMode};
pub use loader::{ModuleSource, SourceLoader};
pub use manifest::PackageManifest;
pub use resolver::ModuleResolver;
