//! Type library discovery from well-known paths.
//!
//! Type libraries are discovered from the following locations (in order):
//!
//! 1. `$XDG_DATA_HOME/oxcom/typelibs/` (user libraries)
//! 2. `$XDG_DATA_DIRS/oxcom/typelibs/` (system libraries)
//!
//! Each library is a `*.toml` manifest. When the same identity, version and
//! locale is found twice, the first location wins.

use crate::error::ComResult;
use crate::guid::Guid;
use crate::manifest::TypeLibManifest;
use crate::registry::TypeLibRegistry;
use crate::typelib::{LibAttr, TypeLib};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Identity, major, minor and locale of a library.
pub type LibraryKey = (Guid, u16, u16, u32);

/// A discovered type library manifest.
#[derive(Debug, Clone)]
pub struct TypeLibPath {
    /// Path to the manifest.
    pub path: PathBuf,

    /// Identity and version it declares.
    pub attr: LibAttr,
}

/// Get the user type library directory.
pub fn user_typelib_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("org", "oxcom", "oxcom")
        .map(|dirs| dirs.data_dir().join("typelibs"))
}

/// Get the system type library directories.
pub fn system_typelib_dirs() -> Vec<PathBuf> {
    let mut dirs = Vec::new();

    if let Ok(data_dirs) = std::env::var("XDG_DATA_DIRS") {
        for dir in data_dirs.split(':').filter(|d| !d.is_empty()) {
            let typelib_dir = PathBuf::from(dir).join("oxcom/typelibs");
            if typelib_dir.exists() {
                dirs.push(typelib_dir);
            }
        }
    }

    let default_dirs = ["/usr/local/share/oxcom/typelibs", "/usr/share/oxcom/typelibs"];
    for dir in default_dirs {
        let path = PathBuf::from(dir);
        if path.exists() && !dirs.contains(&path) {
            dirs.push(path);
        }
    }

    dirs
}

/// Discover type libraries in the well-known locations.
pub fn discover_typelibs() -> ComResult<Vec<TypeLibPath>> {
    let mut dirs = Vec::new();
    dirs.extend(user_typelib_dir());
    dirs.extend(system_typelib_dirs());
    discover_in_directories(&dirs)
}

/// Discover type libraries in `dirs`, earlier directories first.
pub fn discover_in_directories(dirs: &[PathBuf]) -> ComResult<Vec<TypeLibPath>> {
    let mut found = Vec::new();
    let mut seen = HashSet::new();
    for dir in dirs {
        debug!("Scanning type library directory: {:?}", dir);
        discover_in_directory(dir, &mut found, &mut seen)?;
    }
    info!("Discovered {} type libraries", found.len());
    Ok(found)
}

/// Discover type libraries in a specific directory.
pub fn discover_in_directory(
    dir: &Path,
    found: &mut Vec<TypeLibPath>,
    seen: &mut HashSet<LibraryKey>,
) -> ComResult<()> {
    if !dir.exists() {
        return Ok(());
    }

    let entries = match std::fs::read_dir(dir) {
        Ok(e) => e,
        Err(e) => {
            warn!("Failed to read type library directory {:?}: {}", dir, e);
            return Ok(());
        }
    };

    let mut paths: Vec<PathBuf> = entries
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && path.extension().is_some_and(|ext| ext == "toml"))
        .collect();
    paths.sort();

    for path in paths {
        let attr = match TypeLibManifest::from_file(&path).and_then(|m| TypeLib::compile(&m)) {
            Ok(lib) => lib.attr().clone(),
            Err(e) => {
                warn!("Failed to load type library from {:?}: {}", path, e);
                continue;
            }
        };

        let key = (attr.guid, attr.major, attr.minor, attr.lcid);
        if !seen.insert(key) {
            debug!("Skipping duplicate type library: {} {}", attr.name, attr.version());
            continue;
        }

        info!("Discovered type library: {} v{} at {:?}", attr.name, attr.version(), path);
        found.push(TypeLibPath { path, attr });
    }

    Ok(())
}

/// Register every discovered library with `registry`. Returns how many
/// were registered.
pub fn register_discovered(registry: &TypeLibRegistry, libraries: &[TypeLibPath]) -> usize {
    libraries
        .iter()
        .filter(|lib| match registry.register_file(&lib.path) {
            Ok(_) => true,
            Err(e) => {
                warn!("Failed to register type library {:?}: {}", lib.path, e);
                false
            }
        })
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn create_test_typelib(dir: &Path, file: &str, name: &str, version: &str) {
        std::fs::create_dir_all(dir).unwrap();
        let manifest = format!(
            r#"
[library]
name = "{name}"
guid = "{{0D4B8A61-3C2E-4F1A-9B7D-5E6F7A8B9C0D}}"
version = "{version}"
"#
        );

        let mut file = std::fs::File::create(dir.join(file)).unwrap();
        file.write_all(manifest.as_bytes()).unwrap();
    }

    #[test]
    fn test_discover_in_directory() {
        let temp_dir = TempDir::new().unwrap();
        create_test_typelib(temp_dir.path(), "a.toml", "LibA", "1.0");
        create_test_typelib(temp_dir.path(), "b.toml", "LibB", "1.1");
        std::fs::write(temp_dir.path().join("notes.txt"), "ignored").unwrap();
        std::fs::write(temp_dir.path().join("broken.toml"), "[library").unwrap();

        let mut found = Vec::new();
        let mut seen = HashSet::new();
        discover_in_directory(temp_dir.path(), &mut found, &mut seen).unwrap();

        assert_eq!(found.len(), 2);
        assert_eq!(found[0].attr.name, "LibA");
    }

    #[test]
    fn test_user_directory_wins() {
        let temp_dir = TempDir::new().unwrap();
        let user = temp_dir.path().join("user");
        let system = temp_dir.path().join("system");
        create_test_typelib(&user, "lib.toml", "UserLib", "1.0");
        create_test_typelib(&system, "lib.toml", "SystemLib", "1.0");

        let found = discover_in_directories(&[user.clone(), system]).unwrap();
        assert_eq!(found.len(), 1);
        assert!(found[0].path.starts_with(&user));
        assert_eq!(found[0].attr.name, "UserLib");
    }

    #[test]
    fn test_register_discovered() {
        let temp_dir = TempDir::new().unwrap();
        create_test_typelib(temp_dir.path(), "a.toml", "LibA", "1.0");
        let found = discover_in_directories(&[temp_dir.path().to_path_buf()]).unwrap();

        let registry = TypeLibRegistry::new();
        assert_eq!(register_discovered(&registry, &found), 1);
        assert!(registry.contains(&found[0].attr));
    }

    #[test]
    fn test_missing_directory_is_empty() {
        let found = discover_in_directories(&[PathBuf::from("/nonexistent/oxcom")]).unwrap();
        assert!(found.is_empty());
    }
}
