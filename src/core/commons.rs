use std::path::{Path, PathBuf};

// Wraps a command-line argument in double quotes, escaping the quotes it contains.
pub fn wrap_value(value: &str) -> String {
    format!("\"{}\"", value.replace('"', "\\\""))
}

/// Rebuilds a path with the platform's own separators, dropping inner `.` components and
/// duplicate separators. `..` is kept; this never touches the filesystem.
pub fn native_path(value: &str) -> PathBuf {
    Path::new(value).components().collect()
}

/// The final component of a path as an owned string, or an empty string.
pub fn base_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_default()
}
