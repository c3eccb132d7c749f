//! Fixed search-path conventions shared with every IceTea toolchain.
//!
//! These values are part of the on-disk contract: changing the order of any
//! list changes which file an import resolves to.

/// Script source extensions, in lookup order.
pub const SCRIPT_EXTENSIONS: &[&str] = &["it", "wren"];

/// Native module extensions, in lookup order.
pub const NATIVE_EXTENSIONS: &[&str] = &["nit", "nwren"];

/// Folders consulted at every ancestor level, in lookup order.
pub const MODULE_DIRS: &[&str] = &["deps", "wren_modules"];

/// Package descriptor looked up inside a module folder. Its `main` field
/// names the package entry.
pub const PACKAGE_FILE: &str = "package.toml";

/// Entry file stem used when a module folder has no descriptor.
pub const INDEX_STEM: &str = "index";

/// Prefix of module ids served by the internal store.
pub const INTERNAL_PREFIX: &str = "internal:";

/// Importer name used when the host binary itself requests a module.
pub const EMBEDDED_IMPORTER: &str = "@";

/// Environment variable pointing at the internal library folder.
pub const LIBRARY_PATH_ENV: &str = "ICETEA_LIB";

/// Every recognised extension: scripts first, then natives.
pub fn search_extensions() -> impl Iterator<Item = &'static str> {
    SCRIPT_EXTENSIONS
        .iter()
        .chain(NATIVE_EXTENSIONS.iter())
        .copied()
}

pub fn is_script_extension(ext: &str) -> bool {
    SCRIPT_EXTENSIONS.contains(&ext)
}

pub fn is_native_extension(ext: &str) -> bool {
    NATIVE_EXTENSIONS.contains(&ext)
}

/// Whether an import name is addressed relative to its importer.
pub fn is_relative_name(name: &str) -> bool {
    name == "."
        || name == ".."
        || name.starts_with("./")
        || name.starts_with("../")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scripts_are_searched_before_natives() {
        let order: Vec<_> = search_extensions().collect();
        assert_eq!(order, vec!["it", "wren", "nit", "nwren"]);
    }

    #[test]
    fn relative_names() {
        assert!(is_relative_name("./helper"));
        assert!(is_relative_name("../lib/x"));
        assert!(is_relative_name(".."));
        assert!(!is_relative_name(".hidden"));
        assert!(!is_relative_name("utils"));
    }
}
