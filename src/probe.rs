//! Filesystem access used by every scanner.
//!
//! None of these calls fail: a missing or unreadable path reads as "absent".

use std::path::{Path, PathBuf};
use tracing::debug;

pub trait FsProbe: Send + Sync {
    /// Whether `root/relative` exists
    fn exists(&self, root: &Path, relative: &str) -> bool;

    /// Names of the immediate child directories of `root`
    fn list_child_directories(&self, root: &Path) -> Vec<String>;

    /// Full text of a small file
    fn read_text(&self, path: &Path) -> Option<String>;

    /// Resolve symlinks in `path`
    fn canonicalize(&self, path: &Path) -> Option<PathBuf>;

    /// Whether `path` itself is a symbolic link
    fn is_symlink(&self, path: &Path) -> bool;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct DiskProbe;

impl FsProbe for DiskProbe {
    fn exists(&self, root: &Path, relative: &str) -> bool {
        if relative.is_empty() || relative == "." {
            return root.exists();
        }
        root.join(relative).exists()
    }

    fn list_child_directories(&self, root: &Path) -> Vec<String> {
        let entries = match std::fs::read_dir(root) {
            Ok(entries) => entries,
            Err(e) => {
                debug!("Skipping {}: {}", root.display(), e);
                return Vec::new();
            }
        };

        let mut names: Vec<String> = entries
            .flatten()
            .filter(|entry| entry.path().is_dir())
            .filter_map(|entry| entry.file_name().to_str().map(ToString::to_string))
            .collect();

        // read_dir order is platform dependent
        names.sort();
        names
    }

    fn read_text(&self, path: &Path) -> Option<String> {
        std::fs::read_to_string(path).ok()
    }

    fn canonicalize(&self, path: &Path) -> Option<PathBuf> {
        std::fs::canonicalize(path).ok()
    }

    fn is_symlink(&self, path: &Path) -> bool {
        std::fs::symlink_metadata(path)
            .map(|meta| meta.file_type().is_symlink())
            .unwrap_or(false)
    }
}

/// Whether a directory entry name is hidden
pub fn is_hidden(name: &str) -> bool {
    name.starts_with('.')
}
