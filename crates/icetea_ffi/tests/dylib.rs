use icetea_ffi::{NativeError, NativeModuleRegistry, VmHandle};
use tempfile::TempDir;

#[test]
fn nonexistent_library_is_a_load_failure() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("ghost.nit");
    let mut registry = NativeModuleRegistry::new(VmHandle::detached());

    let err = registry.load_module(&path).unwrap_err();
    assert!(matches!(err, NativeError::LoadFailed { .. }));
    assert!(registry.is_empty());
}

#[test]
fn non_library_file_is_a_load_failure() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("text.nit");
    std::fs::write(&path, "class Text {}\n").unwrap();
    let mut registry = NativeModuleRegistry::new(VmHandle::detached());

    let err = registry.load_module(&path).unwrap_err();
    assert!(err.is_load_failure());
    assert!(!registry.has_module(&path.canonicalize().unwrap().to_string_lossy()));
}

#[cfg(all(target_os = "linux", target_env = "gnu"))]
#[test]
fn library_without_entry_points_is_rejected() {
    let mut registry = NativeModuleRegistry::new(VmHandle::detached());

    let err = registry.load_module(std::path::Path::new("libc.so.6")).unwrap_err();
    assert_eq!(
        err,
        NativeError::MissingSymbol {
            path: "libc.so.6".into(),
            symbol: "wrenModule_libc_so_create".to_owned(),
        }
    );
    assert!(registry.is_empty());
}
