// SPDX-License-Identifier: MIT OR Apache-2.0

//! Index location helpers

use std::path::{Path, PathBuf};

/// The name of the index directory
pub const INDEX_DIR: &str = ".faqrag";

/// Result of finding an index root
#[derive(Debug)]
pub struct IndexRoot {
    /// The directory containing the .faqrag folder
    pub root: PathBuf,
    /// The full path to the .faqrag folder
    pub index_path: PathBuf,
    /// Whether this is the current directory or a parent
    pub is_parent: bool,
}

/// Find the nearest .faqrag directory by walking up from the given path.
pub fn find_index_root(start: impl AsRef<Path>) -> Option<IndexRoot> {
    let mut current = start.as_ref().to_path_buf();
    if let Ok(canonical) = current.canonicalize() {
        current = canonical;
    }
    let original = current.clone();

    loop {
        let index_path = current.join(INDEX_DIR);
        if index_path.is_dir() {
            return Some(IndexRoot {
                is_parent: current != original,
                root: current,
                index_path,
            });
        }
        if !current.pop() {
            return None;
        }
    }
}

/// Index directory for `path`, reusing a parent's index when one exists.
/// Falls back to `path/.faqrag`.
pub fn get_index_path(path: impl AsRef<Path>) -> PathBuf {
    match find_index_root(&path) {
        Some(root) => root.index_path,
        None => path.as_ref().join(INDEX_DIR),
    }
}
