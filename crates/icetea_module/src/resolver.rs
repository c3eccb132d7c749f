//! Import name resolution.
//!
//! Imagine `/foo/bar/baz/module.wren` importing `"utils"`. Internal modules
//! are asked first. After that every module folder of the importer's
//! directory is tried, in order:
//!
//! - `/foo/bar/baz/deps/utils/package.toml` → its `main` entry
//! - `/foo/bar/baz/deps/utils/index` (+ extensions)
//! - `/foo/bar/baz/deps/utils` (+ extensions)
//! - `/foo/bar/baz/wren_modules/utils/...` likewise
//!
//! and then the same again one directory up, until the file system root has
//! been searched. Names starting with `./` or `../` and absolute names skip
//! the module folders and are looked up directly.

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::ModuleConfig;
use crate::conventions::{
    INDEX_STEM, MODULE_DIRS, PACKAGE_FILE, is_relative_name, search_extensions,
};
use crate::error::ResolveError;
use crate::id::{Importer, ModuleId};
use crate::internal::InternalModules;
use crate::manifest::PackageManifest;

/// Maps `(importer, name)` pairs to canonical module ids.
///
/// Resolution keeps no state between calls; the same inputs against the same
/// file system always produce the same id.
#[derive(Debug, Clone)]
pub struct ModuleResolver {
    internals: InternalModules,
    config: ModuleConfig,
}

impl ModuleResolver {
    pub fn new(internals: InternalModules, config: ModuleConfig) -> Self {
        Self { internals, config }
    }

    /// Resolver with the internal store described by `config`.
    pub fn from_config(config: ModuleConfig) -> Self {
        let internals = InternalModules::from_config(&config);
        Self::new(internals, config)
    }

    pub fn internals(&self) -> &InternalModules {
        &self.internals
    }

    pub fn config(&self) -> &ModuleConfig {
        &self.config
    }

    /// Resolve with the importer in the VM's wire format (`@` or a module id).
    pub fn resolve_raw(&self, importer: &str, name: &str) -> Result<ModuleId, ResolveError> {
        self.resolve(&Importer::parse(importer), name)
    }

    /// Resolve the module `name` imported by `importer`.
    pub fn resolve(&self, importer: &Importer, name: &str) -> Result<ModuleId, ResolveError> {
        if self.internals.is_internal(name) {
            debug!("`{name}` is an internal module");
            return Ok(ModuleId::internal(name));
        }

        // Relative imports made by internal modules stay inside the store.
        if let Importer::Module(id) = importer
            && let Some(internal) = id.internal_name()
            && is_relative_name(name)
        {
            return self
                .internals
                .resolve_relative(internal, name)
                .map(|logical| ModuleId::internal(&logical))
                .ok_or_else(|| not_found(importer, name));
        }

        let found = if Path::new(name).is_absolute() {
            resolve_direct(Path::new(name))
        } else if is_relative_name(name) {
            resolve_direct(&self.importer_dir(importer).join(name))
        } else {
            self.search_ancestors(&self.importer_dir(importer), name)
        };

        found
            .map(|path| ModuleId::from_path(&canonical(path)))
            .ok_or_else(|| not_found(importer, name))
    }

    /// Directory the importer lives in; the working directory for the host
    /// binary and for internal modules.
    fn importer_dir(&self, importer: &Importer) -> PathBuf {
        let working_dir = self.config.working_dir();
        match importer {
            Importer::Module(id) => match id.path().and_then(Path::parent) {
                Some(dir) if !dir.as_os_str().is_empty() => working_dir.join(dir),
                _ => working_dir,
            },
            Importer::Embedded => working_dir,
        }
    }

    /// Walks from `start` up to the file system root.
    fn search_ancestors(&self, start: &Path, name: &str) -> Option<PathBuf> {
        let mut current = start.to_path_buf();

        loop {
            for module_dir in MODULE_DIRS {
                let candidate = current.join(module_dir).join(name);
                debug!("searching {}", candidate.display());

                if candidate.is_dir() {
                    if let Some(found) = resolve_package(&candidate) {
                        return Some(found);
                    }
                    // A package that names a missing main is broken; a
                    // sibling file must not stand in for it.
                    if declares_main(&candidate) {
                        continue;
                    }
                }
                if let Some(found) = lookup_file(&candidate) {
                    return Some(found);
                }
            }

            match current.parent() {
                Some(parent) if parent != current => current = parent.to_path_buf(),
                _ => return None,
            }
        }
    }
}

impl Default for ModuleResolver {
    fn default() -> Self {
        Self::new(InternalModules::empty(), ModuleConfig::default())
    }
}

/// Extension search for `base`: the literal path, then every script
/// extension, then every native extension. Extensions are appended, so
/// `lib.v2` is tried as `lib.v2.it`.
pub fn lookup_file(base: &Path) -> Option<PathBuf> {
    if base.is_file() {
        return Some(base.to_path_buf());
    }

    search_extensions()
        .map(|ext| with_appended_extension(base, ext))
        .find(|candidate| candidate.is_file())
}

/// Entry file of a package folder: the descriptor's `main`, else `index`.
pub fn resolve_package(dir: &Path) -> Option<PathBuf> {
    if let Some(manifest) = PackageManifest::read(&dir.join(PACKAGE_FILE))
        && let Some(main) = manifest.entry()
    {
        return lookup_file(&dir.join(main));
    }

    lookup_file(&dir.join(INDEX_STEM))
}

fn declares_main(dir: &Path) -> bool {
    PackageManifest::read(&dir.join(PACKAGE_FILE)).is_some_and(|manifest| manifest.entry().is_some())
}

fn resolve_direct(path: &Path) -> Option<PathBuf> {
    lookup_file(path).or_else(|| {
        if path.is_dir() {
            resolve_package(path)
        } else {
            None
        }
    })
}

fn with_appended_extension(base: &Path, ext: &str) -> PathBuf {
    let mut raw = OsString::from(base.as_os_str());
    raw.push(".");
    raw.push(ext);
    PathBuf::from(raw)
}

fn canonical(path: PathBuf) -> PathBuf {
    fs::canonicalize(&path).unwrap_or(path)
}

fn not_found(importer: &Importer, name: &str) -> ResolveError {
    ResolveError::ModuleNotFound {
        name: name.to_owned(),
        importer: importer.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch(path: &Path, contents: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    fn importer(path: &Path) -> Importer {
        Importer::Module(ModuleId::from_path(path))
    }

    fn id_of(path: &Path) -> ModuleId {
        ModuleId::from_path(&path.canonicalize().unwrap())
    }

    #[test]
    fn extension_search_order() {
        let temp_dir = TempDir::new().unwrap();
        let base = temp_dir.path().join("mod");

        touch(&with_appended_extension(&base, "nwren"), "");
        assert_eq!(lookup_file(&base), Some(temp_dir.path().join("mod.nwren")));

        touch(&with_appended_extension(&base, "nit"), "");
        assert_eq!(lookup_file(&base), Some(temp_dir.path().join("mod.nit")));

        touch(&with_appended_extension(&base, "wren"), "");
        assert_eq!(lookup_file(&base), Some(temp_dir.path().join("mod.wren")));

        touch(&with_appended_extension(&base, "it"), "");
        assert_eq!(lookup_file(&base), Some(temp_dir.path().join("mod.it")));

        touch(&base, "");
        assert_eq!(lookup_file(&base), Some(base.clone()));
    }

    #[test]
    fn extensions_are_appended() {
        let temp_dir = TempDir::new().unwrap();
        touch(&temp_dir.path().join("lib.v2.it"), "");
        assert_eq!(
            lookup_file(&temp_dir.path().join("lib.v2")),
            Some(temp_dir.path().join("lib.v2.it"))
        );
    }

    #[test]
    fn manifest_main_takes_precedence_over_index() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        let pkg = root.join("deps/utils");
        touch(&pkg.join("package.toml"), "main = \"src/entry\"\n");
        touch(&pkg.join("src/entry.wren"), "");
        touch(&pkg.join("index.it"), "");

        let resolver = ModuleResolver::default();
        let id = resolver
            .resolve(&importer(&root.join("main.it")), "utils")
            .unwrap();
        assert_eq!(id, id_of(&pkg.join("src/entry.wren")));
    }

    #[test]
    fn manifest_without_main_uses_index() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        let pkg = root.join("wren_modules/utils");
        touch(&pkg.join("package.toml"), "name = \"utils\"\n");
        touch(&pkg.join("index.nit"), "");

        let resolver = ModuleResolver::default();
        let id = resolver
            .resolve(&importer(&root.join("main.it")), "utils")
            .unwrap();
        assert_eq!(id, id_of(&pkg.join("index.nit")));
    }

    #[test]
    fn broken_main_does_not_fall_back_to_index() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        let broken = root.join("deps/utils");
        touch(&broken.join("package.toml"), "main = \"gone\"\n");
        touch(&broken.join("index.it"), "");
        touch(&root.join("wren_modules/utils/index.wren"), "");

        let resolver = ModuleResolver::default();
        let id = resolver
            .resolve(&importer(&root.join("main.it")), "utils")
            .unwrap();
        assert_eq!(id, id_of(&root.join("wren_modules/utils/index.wren")));
    }

    #[test]
    fn broken_main_does_not_fall_back_to_a_sibling_file() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        touch(&root.join("deps/utils/package.toml"), "main = \"gone\"\n");
        touch(&root.join("deps/utils.it"), "");

        let resolver = ModuleResolver::default();
        let err = resolver
            .resolve(&importer(&root.join("main.it")), "utils")
            .unwrap_err();
        assert!(matches!(err, ResolveError::ModuleNotFound { name, .. } if name == "utils"));
    }

    #[test]
    fn primary_module_dir_wins_at_the_same_level() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        touch(&root.join("deps/utils/index.it"), "");
        touch(&root.join("wren_modules/utils/index.it"), "");

        let resolver = ModuleResolver::default();
        let id = resolver
            .resolve(&importer(&root.join("main.it")), "utils")
            .unwrap();
        assert_eq!(id, id_of(&root.join("deps/utils/index.it")));
    }

    #[test]
    fn nearest_ancestor_wins() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        touch(&root.join("deps/utils/index.it"), "");
        touch(&root.join("a/b/wren_modules/utils/index.it"), "");

        let resolver = ModuleResolver::default();
        let id = resolver
            .resolve(&importer(&root.join("a/b/c/main.it")), "utils")
            .unwrap();
        assert_eq!(id, id_of(&root.join("a/b/wren_modules/utils/index.it")));
    }

    #[test]
    fn sub_path_names_resolve_inside_packages() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        touch(&root.join("deps/utils/strings.wren"), "");

        let resolver = ModuleResolver::default();
        let id = resolver
            .resolve(&importer(&root.join("main.it")), "utils/strings")
            .unwrap();
        assert_eq!(id, id_of(&root.join("deps/utils/strings.wren")));
    }

    #[test]
    fn relative_directory_import_uses_package_rules() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        touch(&root.join("lib/index.it"), "");

        let resolver = ModuleResolver::default();
        let id = resolver
            .resolve(&importer(&root.join("main.it")), "./lib")
            .unwrap();
        assert_eq!(id, id_of(&root.join("lib/index.it")));
    }

    #[test]
    fn absolute_names_are_looked_up_directly() {
        let temp_dir = TempDir::new().unwrap();
        let target = temp_dir.path().join("elsewhere/tool.wren");
        touch(&target, "");

        let resolver = ModuleResolver::default();
        let name = temp_dir.path().join("elsewhere/tool");
        let id = resolver
            .resolve(&Importer::Embedded, name.to_str().unwrap())
            .unwrap();
        assert_eq!(id, id_of(&target));
    }

    #[test]
    fn embedded_importer_starts_at_working_dir() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        touch(&root.join("app/helper.it"), "");
        touch(&root.join("app/deps/json/index.wren"), "");

        let config = ModuleConfig::new().with_working_dir(root.join("app"));
        let resolver = ModuleResolver::new(InternalModules::empty(), config);

        assert_eq!(
            resolver.resolve_raw("@", "./helper").unwrap(),
            id_of(&root.join("app/helper.it"))
        );
        assert_eq!(
            resolver.resolve_raw("@", "json").unwrap(),
            id_of(&root.join("app/deps/json/index.wren"))
        );
    }

    #[test]
    fn missing_relative_module_is_not_found() {
        let temp_dir = TempDir::new().unwrap();
        let resolver = ModuleResolver::default();
        let err = resolver
            .resolve(&importer(&temp_dir.path().join("main.it")), "../nope")
            .unwrap_err();
        assert!(matches!(err, ResolveError::ModuleNotFound { name, .. } if name == "../nope"));
    }

    #[test]
    fn resolution_is_repeatable() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        touch(&root.join("deps/utils/index.it"), "");

        let resolver = ModuleResolver::default();
        let from = importer(&root.join("src/main.it"));
        let first = resolver.resolve(&from, "utils").unwrap();
        let second = resolver.resolve(&from, "utils").unwrap();
        assert_eq!(first, second);
    }
}
