//! Cross-platform path utilities
//!
//! Windows paths use backslashes (`\`) while asset paths on the wire always use
//! forward slashes (`/`) and are relative to a project's asset root.

use std::path::{Component, Path, PathBuf};

/// Normalize path to forward slashes
#[inline]
pub fn normalize_path(path: &str) -> String {
    path.replace('\\', "/")
}

/// Convert a Path to a normalized string
#[inline]
pub fn path_to_string(path: &Path) -> String {
    normalize_path(&path.to_string_lossy())
}

/// Path of `path` relative to `root`, forward-slash separated.
///
/// Returns `None` when `path` is not inside `root`.
pub fn relative_path(root: &Path, path: &Path) -> Option<String> {
    path.strip_prefix(root).ok().map(path_to_string)
}

/// Resolve an asset path against its root, refusing anything that would
/// escape the root (`..`, absolute paths, drive prefixes).
pub fn join_asset_path(root: &Path, asset_path: &str) -> Option<PathBuf> {
    let normalized = normalize_path(asset_path);
    let mut resolved = root.to_path_buf();
    for component in Path::new(&normalized).components() {
        match component {
            Component::Normal(part) => resolved.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    Some(resolved)
}

/// Join two asset paths; an empty base means the asset root.
pub fn join_asset(base: &str, name: &str) -> String {
    let base = normalize_path(base);
    let base = base.trim_matches('/');
    if base.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", base, name)
    }
}

/// Containing folder of an asset path (`""` for top-level entries)
pub fn parent_asset_path(asset_path: &str) -> String {
    let normalized = normalize_path(asset_path);
    match normalized.trim_end_matches('/').rsplit_once('/') {
        Some((parent, _)) => parent.to_string(),
        None => String::new(),
    }
}

/// Extension of a file name without the leading dot
pub fn file_extension(name: &str) -> Option<String> {
    Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_string())
}

/// True when `path` is `ancestor` itself or lies somewhere beneath it
pub fn is_same_or_descendant(path: &str, ancestor: &str) -> bool {
    let path = normalize_path(path);
    let ancestor = normalize_path(ancestor);
    let path = path.trim_matches('/');
    let ancestor = ancestor.trim_matches('/');
    path == ancestor
        || path
            .strip_prefix(ancestor)
            .map(|rest| rest.starts_with('/'))
            .unwrap_or(false)
}

/// A name is usable for a project or folder when it is exactly one path segment
pub fn is_single_segment(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains('/')
        && !name.contains('\\')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path("foo\\bar\\baz"), "foo/bar/baz");
        assert_eq!(normalize_path("foo/bar/baz"), "foo/bar/baz");
        assert_eq!(normalize_path(""), "");
    }

    #[test]
    fn test_relative_path() {
        let root = PathBuf::from("/projects/Demo/public");
        let path = root.join("art").join("x.png");
        assert_eq!(relative_path(&root, &path).as_deref(), Some("art/x.png"));
        assert_eq!(relative_path(&root, &root).as_deref(), Some(""));
        assert_eq!(relative_path(&root, Path::new("/elsewhere")), None);
    }

    #[test]
    fn test_join_asset_path_rejects_escape() {
        let root = PathBuf::from("/projects/Demo/public");
        assert_eq!(join_asset_path(&root, ""), Some(root.clone()));
        assert_eq!(join_asset_path(&root, "art/x.png"), Some(root.join("art").join("x.png")));
        assert_eq!(join_asset_path(&root, "./art"), Some(root.join("art")));
        assert_eq!(join_asset_path(&root, "../metadata.json"), None);
        assert_eq!(join_asset_path(&root, "art/../../secret"), None);
        assert_eq!(join_asset_path(&root, "/etc/passwd"), None);
    }

    #[test]
    fn test_join_and_parent() {
        assert_eq!(join_asset("", "art"), "art");
        assert_eq!(join_asset("art", "x.png"), "art/x.png");
        assert_eq!(join_asset("art/", "x.png"), "art/x.png");
        assert_eq!(parent_asset_path("art/sprites/x.png"), "art/sprites");
        assert_eq!(parent_asset_path("x.png"), "");
        assert_eq!(parent_asset_path(""), "");
    }

    #[test]
    fn test_file_extension() {
        assert_eq!(file_extension("x.png").as_deref(), Some("png"));
        assert_eq!(file_extension("archive.tar.gz").as_deref(), Some("gz"));
        assert_eq!(file_extension("Makefile"), None);
    }

    #[test]
    fn test_is_same_or_descendant() {
        assert!(is_same_or_descendant("art", "art"));
        assert!(is_same_or_descendant("art/sprites", "art"));
        assert!(!is_same_or_descendant("artwork", "art"));
        assert!(!is_same_or_descendant("models", "art"));
    }

    #[test]
    fn test_is_single_segment() {
        assert!(is_single_segment("Demo"));
        assert!(is_single_segment("my scene.scn"));
        assert!(!is_single_segment(""));
        assert!(!is_single_segment(".."));
        assert!(!is_single_segment("a/b"));
        assert!(!is_single_segment("a\\b"));
    }
}
