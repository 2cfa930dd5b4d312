// ABOUTME: Utility functions for slugging, filenames, and path checks
// ABOUTME: Provides consistent filename generation shared by push and reconciliation

use std::path::{Component, Path, PathBuf};

/// Extension used for every file-backed post.
pub const MARKDOWN_EXTENSION: &str = "md";

pub fn slugify(text: &str) -> String {
    slug::slugify(text)
}

/// `<slug>.md` for a post title. Push and reconciliation must agree on this.
pub fn markdown_filename(title: &str) -> String {
    format!("{}.{}", slugify(title), MARKDOWN_EXTENSION)
}

/// Lexically normalise `.` and `..` without touching the filesystem.
pub fn clean_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// True when `child` is `parent` or lies somewhere below it.
pub fn is_subdirectory(parent: &Path, child: &Path) -> bool {
    clean_path(child).starts_with(clean_path(parent))
}
