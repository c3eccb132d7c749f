//! Modules bundled with the runtime itself.
//!
//! The store is asked before anything else during resolution so that
//! imports such as `"fs"` never touch the user's file system. It is backed
//! either by a zip archive embedded into the host binary or, for development
//! builds, by a plain folder (usually `$ICETEA_LIB`). Both are read once at
//! construction and are immutable afterwards.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::config::ModuleConfig;
use crate::conventions::{INDEX_STEM, SCRIPT_EXTENSIONS, is_script_extension};
use crate::error::StoreError;

/// Where the internal modules were read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreMode {
    /// Zip archive held in memory.
    Archive,
    /// Folder scanned at start-up.
    Directory(PathBuf),
    /// No internal modules; resolution is file system only.
    Empty,
}

#[derive(Debug, Clone)]
pub struct InternalModules {
    mode: StoreMode,
    records: BTreeMap<String, Vec<u8>>,
    dirs: BTreeSet<String>,
    roots: BTreeSet<String>,
}

impl InternalModules {
    pub fn empty() -> Self {
        Self::from_records(StoreMode::Empty, BTreeMap::new(), BTreeSet::new())
    }

    /// Reads every entry of an in-memory zip archive.
    pub fn from_archive(bytes: &[u8]) -> Result<Self, StoreError> {
        let mut archive = zip::ZipArchive::new(Cursor::new(bytes))?;
        let mut records = BTreeMap::new();
        let mut dirs = BTreeSet::new();

        for index in 0..archive.len() {
            let mut file = archive.by_index(index)?;
            let raw_name = file.name().to_owned();
            let Some(name) = normalize(&raw_name) else {
                warn!("skipping archive entry with unusable path `{raw_name}`");
                continue;
            };
            if file.is_dir() {
                dirs.insert(name);
                continue;
            }

            let mut contents = Vec::new();
            file.read_to_end(&mut contents)
                .map_err(|source| StoreError::Io {
                    path: PathBuf::from(&raw_name),
                    source,
                })?;
            records.insert(name, contents);
        }

        debug!("loaded {} internal modules from archive", records.len());
        Ok(Self::from_records(StoreMode::Archive, records, dirs))
    }

    /// Scans `root` recursively.
    pub fn from_directory(root: &Path) -> Result<Self, StoreError> {
        if !root.is_dir() {
            return Err(StoreError::Io {
                path: root.to_path_buf(),
                source: std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "library folder does not exist",
                ),
            });
        }

        let pattern = format!("{}/**/*", glob::Pattern::escape(&root.to_string_lossy()));
        let entries = glob::glob(&pattern).map_err(|err| StoreError::Pattern {
            path: root.to_path_buf(),
            reason: err.to_string(),
        })?;

        let mut records = BTreeMap::new();
        let mut dirs = BTreeSet::new();
        for entry in entries {
            let path = entry.map_err(|err| StoreError::Io {
                path: err.path().to_path_buf(),
                source: err.into_error(),
            })?;
            let Some(name) = logical_name(root, &path) else {
                continue;
            };

            if path.is_dir() {
                dirs.insert(name);
            } else if path.is_file() {
                let contents = fs::read(&path).map_err(|source| StoreError::Io {
                    path: path.clone(),
                    source,
                })?;
                records.insert(name, contents);
            }
        }

        debug!(
            "loaded {} internal modules from {}",
            records.len(),
            root.display()
        );
        Ok(Self::from_records(
            StoreMode::Directory(root.to_path_buf()),
            records,
            dirs,
        ))
    }

    /// Builds the store described by `config`: the archive if one is set,
    /// else the library folder.
    ///
    /// A store that cannot be read is reported and comes up empty, leaving
    /// the resolver in file-system-only mode.
    pub fn from_config(config: &ModuleConfig) -> Self {
        let store = if let Some(bytes) = config.archive.as_deref() {
            Self::from_archive(bytes)
        } else if let Some(path) = config.library_path.as_deref() {
            Self::from_directory(path)
        } else {
            return Self::empty();
        };

        store.unwrap_or_else(|err| {
            warn!("internal modules unavailable: {err}");
            Self::empty()
        })
    }

    fn from_records(
        mode: StoreMode,
        records: BTreeMap<String, Vec<u8>>,
        mut dirs: BTreeSet<String>,
    ) -> Self {
        // Archives do not always carry explicit folder entries.
        for name in records.keys() {
            let mut parent = name.as_str();
            while let Some((dir, _)) = parent.rsplit_once('/') {
                dirs.insert(dir.to_owned());
                parent = dir;
            }
        }

        let mut roots = BTreeSet::new();
        for dir in &dirs {
            roots.insert(first_segment(dir).to_owned());
        }
        for name in records.keys() {
            if name.contains('/') {
                continue;
            }
            roots.insert(name.clone());
            if let Some((stem, ext)) = name.rsplit_once('.')
                && is_script_extension(ext)
            {
                roots.insert(stem.to_owned());
            }
        }

        Self {
            mode,
            records,
            dirs,
            roots,
        }
    }
}

impl InternalModules {
    pub fn mode(&self) -> &StoreMode {
        &self.mode
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Logical paths of every bundled file, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.records.keys().map(String::as_str)
    }

    /// Whether `path` is exactly a bundled file.
    pub fn contains(&self, path: &str) -> bool {
        self.records.contains_key(path)
    }

    /// Whether `path` is a folder inside the store.
    pub fn contains_dir(&self, path: &str) -> bool {
        self.dirs.contains(path)
    }

    /// Checks whether an import name belongs to the store.
    ///
    /// - `"fs"` is internal when `fs.it`, `fs.wren` or a folder `fs` exists.
    /// - `"foo/bar"` is internal when a top-level `foo` exists.
    /// - `"./fs"` and absolute names are never internal.
    pub fn is_internal(&self, name: &str) -> bool {
        if name.is_empty() || name.starts_with('.') || Path::new(name).is_absolute() {
            return false;
        }
        self.roots.contains(first_segment(name))
    }

    /// Logical path of the file serving `name`, if any.
    pub fn lookup(&self, name: &str) -> Option<&str> {
        let name = name.trim_end_matches('/');
        let candidates = std::iter::once(name.to_owned())
            .chain(SCRIPT_EXTENSIONS.iter().map(|ext| format!("{name}.{ext}")))
            .chain(
                SCRIPT_EXTENSIONS
                    .iter()
                    .map(|ext| format!("{name}/{INDEX_STEM}.{ext}")),
            );

        for candidate in candidates {
            if let Some((key, _)) = self.records.get_key_value(&candidate) {
                return Some(key.as_str());
            }
        }
        None
    }

    /// Source bytes of an internal module.
    pub fn source(&self, name: &str) -> Result<&[u8], StoreError> {
        self.lookup(name)
            .and_then(|key| self.records.get(key))
            .map(Vec::as_slice)
            .ok_or_else(|| StoreError::NotFound(name.to_owned()))
    }

    /// Resolves `name` relative to the internal module `importer`.
    ///
    /// Returns the normalized logical name when the store can serve it.
    pub fn resolve_relative(&self, importer: &str, name: &str) -> Option<String> {
        let dir = importer.rsplit_once('/').map_or("", |(dir, _)| dir);
        let joined = if dir.is_empty() {
            name.to_owned()
        } else {
            format!("{dir}/{name}")
        };
        let normalized = normalize(&joined)?;
        self.lookup(&normalized).map(|_| normalized)
    }
}

impl Default for InternalModules {
    fn default() -> Self {
        Self::empty()
    }
}

fn first_segment(name: &str) -> &str {
    name.split('/').next().unwrap_or(name)
}

/// Collapses `.`/`..` segments and separators of a logical path.
fn normalize(path: &str) -> Option<String> {
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split(['/', '\\']) {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop()?;
            }
            other => segments.push(other),
        }
    }
    (!segments.is_empty()).then(|| segments.join("/"))
}

fn logical_name(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let joined = relative
        .components()
        .map(|component| component.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/");
    normalize(&joined)
}
