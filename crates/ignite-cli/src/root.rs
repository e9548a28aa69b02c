use std::path::{Path, PathBuf};

use ignite_core::paths::IGNITE_DIR;

/// Resolve the Ignite root directory.
///
/// Priority:
/// 1. `--root` flag / `IGNITE_ROOT` env var (passed in as `explicit`)
/// 2. Walk upward from `cwd` looking for `.ignite/`
/// 3. Fall back to `cwd`
pub fn resolve_root(explicit: Option<&Path>) -> PathBuf {
    if let Some(p) = explicit {
        return p.to_path_buf();
    }
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    find_root(&cwd).unwrap_or(cwd)
}

fn find_root(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .find(|dir| dir.join(IGNITE_DIR).is_dir())
        .map(Path::to_path_buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn explicit_root_wins() {
        let dir = TempDir::new().unwrap();
        let result = resolve_root(Some(dir.path()));
        assert_eq!(result, dir.path());
    }

    #[test]
    fn finds_ignite_dir_from_subdirectory() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join(".ignite")).unwrap();
        let subdir = dir.path().join("lessons/deep");
        std::fs::create_dir_all(&subdir).unwrap();
        assert_eq!(find_root(&subdir).as_deref(), Some(dir.path()));
    }

    #[test]
    fn no_ignite_dir_finds_nothing() {
        let dir = TempDir::new().unwrap();
        assert_eq!(find_root(dir.path()), None);
    }
}
