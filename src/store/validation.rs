//! Path validation for the filesystem object store.
//!
//! Maps `(container, key)` onto a path below the store root while refusing
//! anything that could escape it.

use anyhow::{Result, bail};
use std::path::{Component, Path, PathBuf};

use crate::object::ObjectRef;

/// Validates and normalizes a relative path to prevent directory traversal.
///
/// Rejects paths that are absolute, contain `..`, root or prefix components,
/// or normalize to nothing. `.` components are dropped.
pub(crate) fn validate_path(path: &str) -> Result<PathBuf> {
    if path.is_empty() {
        bail!("Object path cannot be empty");
    }

    let path = Path::new(path);

    if path.is_absolute() {
        bail!("Object path cannot be absolute: {}", path.display());
    }

    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(name) => normalized.push(name),
            Component::CurDir => {},
            Component::ParentDir => {
                bail!("Object path cannot contain '..': {}", path.display())
            },
            Component::RootDir | Component::Prefix(_) => {
                bail!(
                    "Object path cannot contain root or prefix: {}",
                    path.display()
                )
            },
        }
    }

    if normalized.as_os_str().is_empty() {
        bail!("Object path normalized to empty path");
    }

    Ok(normalized)
}

/// Returns the filesystem path of an object below `root`.
pub(crate) fn object_path(root: &Path, object: &ObjectRef) -> Result<PathBuf> {
    let container = validate_path(object.container())?;
    if container.components().count() != 1 {
        bail!("Container must be a single path component: {}", object.container());
    }
    let key = validate_path(object.key())?;
    Ok(root.join(container).join(key))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_path_normalizes() {
        assert_eq!(
            validate_path("./scans/page.tif").unwrap(),
            PathBuf::from("scans/page.tif")
        );
        assert!(validate_path("").is_err());
        assert!(validate_path("../etc/passwd").is_err());
        assert!(validate_path("/etc/passwd").is_err());
        assert!(validate_path(".").is_err());
    }

    #[test]
    fn test_object_path_rejects_traversal() {
        let root = Path::new("/srv/objects");

        let ok = ObjectRef::new("archive", "a/b.txt").unwrap();
        assert_eq!(
            object_path(root, &ok).unwrap(),
            PathBuf::from("/srv/objects/archive/a/b.txt")
        );

        let dotdot_container = ObjectRef::new("..", "etc/passwd").unwrap();
        assert!(object_path(root, &dotdot_container).is_err());

        let dotdot_key = ObjectRef::new("archive", "../../etc/passwd").unwrap();
        assert!(object_path(root, &dotdot_key).is_err());
    }
}
