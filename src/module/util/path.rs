//! Path Operations Module
//!
//! This module handles path operations for directories and files.

use std::path::{Path, PathBuf};

use crate::module::define;

/// Join Paths
///
/// This function takes a slice of strings as input and joins them into a
/// single path string. It uses the PathBuf type to handle platform-specific
/// separators and conversions.
pub fn join(paths: &[&str]) -> String {
    let mut path: PathBuf = PathBuf::new();
    for p in paths {
        path.push(p);
    }
    path.to_string_lossy().into_owned()
}

/// The `Config.toml` inside `dir`, if one exists.
pub fn config_file(dir: &Path) -> Option<PathBuf> {
    let path = dir.join(define::path::CONF_FILE);
    path.is_file().then_some(path)
}

/// The immediate subdirectories of `dir` in sorted order, so batch
/// discovery is deterministic. An unreadable directory yields none.
pub fn subdirectories(dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut dirs: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_dir())
        .collect();
    dirs.sort();
    dirs
}

/// The final component of a directory path as a string.
pub fn dir_name(dir: &Path) -> String {
    dir.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}
