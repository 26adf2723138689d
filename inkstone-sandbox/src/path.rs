//! Lexical path normalization and containment.
//!
//! Nothing here touches the filesystem: paths are made absolute against the
//! current directory and cleaned component by component, so checks behave the
//! same for files that do not exist yet.

use std::path::{Component, Path, PathBuf};

/// Makes `path` absolute and removes `.` and `..` components.
///
/// `..` at the root stays at the root, so `/../etc` cleans to `/etc`.
pub fn normalize_path(path: impl AsRef<Path>) -> PathBuf {
    let path = path.as_ref();
    if path.is_absolute() {
        return clean(path);
    }
    match std::env::current_dir() {
        Ok(cwd) => clean(&cwd.join(path)),
        Err(_) => clean(path),
    }
}

fn clean(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Prefix(_) | Component::RootDir => out.push(component.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => match out.components().next_back() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => out.push(".."),
            },
            Component::Normal(part) => out.push(part),
        }
    }
    if out.as_os_str().is_empty() {
        out.push(".");
    }
    out
}

/// Path of `target` relative to `base`, if `target` is `base` or lies below it.
///
/// Both arguments must already be normalized. Comparison is per component,
/// so `/tmp/blocked` is not a base of `/tmp/blockedfiles`.
pub fn relative_to<'a>(base: &Path, target: &'a Path) -> Option<&'a Path> {
    target.strip_prefix(base).ok()
}

/// True if normalized `target` equals or is nested under normalized `base`.
pub fn is_within(base: &Path, target: &Path) -> bool {
    relative_to(base, target).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_removes_dot_segments() {
        assert_eq!(normalize_path("/a/./b/../c"), PathBuf::from("/a/c"));
        assert_eq!(normalize_path("/a/b/c/../../d"), PathBuf::from("/a/d"));
    }

    #[test]
    fn parent_of_root_is_root() {
        assert_eq!(normalize_path("/../../etc"), PathBuf::from("/etc"));
        assert_eq!(normalize_path("/.."), PathBuf::from("/"));
    }

    #[test]
    fn trailing_separator_is_dropped() {
        assert_eq!(normalize_path("/tmp/dir/"), PathBuf::from("/tmp/dir"));
    }

    #[test]
    fn relative_paths_become_absolute() {
        let normalized = normalize_path("some/file.txt");
        assert!(normalized.is_absolute());
        assert!(normalized.ends_with("some/file.txt"));
    }

    #[test]
    fn within_is_component_wise() {
        let base = Path::new("/tmp/blocked");
        assert!(is_within(base, Path::new("/tmp/blocked")));
        assert!(is_within(base, Path::new("/tmp/blocked/x")));
        assert!(!is_within(base, Path::new("/tmp/blockedfiles/x")));
        assert!(!is_within(base, Path::new("/tmp")));
    }

    #[test]
    fn root_contains_everything() {
        assert!(is_within(Path::new("/"), Path::new("/any/where")));
    }

    #[test]
    fn relative_to_returns_remainder() {
        let rel = relative_to(Path::new("/work"), Path::new("/work/src/main.rs")).unwrap();
        assert_eq!(rel, Path::new("src/main.rs"));
        assert_eq!(relative_to(Path::new("/work"), Path::new("/work")).unwrap(), Path::new(""));
    }
}
