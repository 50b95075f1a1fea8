//! Centralized path functions for all app storage locations.
//!
//! Single source of truth so the server, the CLI and tests agree on where the
//! status record, the lock file and staged artifacts live.

use std::path::{Path, PathBuf};

/// App data root: `~/Library/Application Support/batchwright/` (macOS) or
/// `~/.local/share/batchwright/` (Linux).
pub fn app_data_dir() -> Option<PathBuf> {
    dirs::data_local_dir().map(|d| d.join("batchwright"))
}

/// Persisted job status record inside a data dir.
pub fn status_file(data_dir: &Path) -> PathBuf {
    data_dir.join("status.json")
}

/// Advisory lock file guarding the status record. Never deleted.
pub fn lock_file(data_dir: &Path) -> PathBuf {
    data_dir.join("status.lock")
}

/// Directory holding staged artifacts (uploads and backup manifests).
pub fn staging_dir(data_dir: &Path) -> PathBuf {
    data_dir.join("staging")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_data_dir() {
        let dir = app_data_dir();
        assert!(dir.is_some());
        assert!(dir.unwrap().to_string_lossy().contains("batchwright"));
    }

    #[test]
    fn test_layout_inside_data_dir() {
        let root = Path::new("/srv/batchwright");
        assert_eq!(status_file(root), root.join("status.json"));
        assert_eq!(lock_file(root), root.join("status.lock"));
        assert_eq!(staging_dir(root), root.join("staging"));
    }
}
