use std::env;
use std::io;
use std::path::{Path, PathBuf};

/// Resolve a path to absolute form without consulting the filesystem.
///
/// The low-level reparse APIs are picky about paths, so callers resolve
/// before opening handles. Relative paths are anchored at the current
/// working directory; existing components are not canonicalized.
pub fn to_absolute(path: &Path) -> io::Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(env::current_dir()?.join(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absolute_path_is_unchanged() {
        let path = env::current_dir().unwrap();
        assert_eq!(to_absolute(&path).unwrap(), path);
    }

    #[test]
    fn test_relative_path_is_anchored_at_cwd() {
        let resolved = to_absolute(Path::new("some/dir")).unwrap();
        assert!(resolved.is_absolute());
        assert_eq!(resolved, env::current_dir().unwrap().join("some/dir"));
    }
}
