// src/core/paths.rs

use crate::constants::{DEFAULT_SETTINGS_FILENAME, PACKAGE_DIR_ENV, PACKAGE_DIR_NAME};
use lazy_static::lazy_static;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use thiserror::Error;

lazy_static! {
    static ref PACKAGE_DIR: Mutex<Option<PathBuf>> = Mutex::new(None);
}

#[derive(Error, Debug)]
pub enum PathError {
    #[error("Could not find system config directory.")]
    ConfigDirNotFound,
    #[error("Could not create package directory at '{path}': {source}")]
    PackageDirCreation {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Returns the package directory (`$OPENSEES_RUN_HOME`, or `~/.config/opensees-run`),
/// creating it if it doesn't exist.
///
/// This function is memoized: the first call computes and caches the path,
/// subsequent calls return the cached value instantly.
pub fn get_package_dir() -> Result<PathBuf, PathError> {
    let mut cached_path_guard = PACKAGE_DIR.lock().unwrap_or_else(PoisonError::into_inner);

    if let Some(path) = &*cached_path_guard {
        return Ok(path.clone());
    }

    // --- Cache miss: compute the path for the first time ---
    let package_path = match env::var_os(PACKAGE_DIR_ENV) {
        Some(dir) if !dir.is_empty() => PathBuf::from(dir),
        _ => dirs::config_dir()
            .ok_or(PathError::ConfigDirNotFound)?
            .join(PACKAGE_DIR_NAME),
    };

    ensure_dir(&package_path)?;
    log::debug!("Package directory: {}", package_path.display());

    *cached_path_guard = Some(package_path.clone());
    Ok(package_path)
}

/// Returns the path to the global default settings file.
pub fn get_default_settings_path() -> Result<PathBuf, PathError> {
    get_package_dir().map(|dir| dir.join(DEFAULT_SETTINGS_FILENAME))
}

fn ensure_dir(path: &Path) -> Result<(), PathError> {
    if !path.exists() {
        fs::create_dir_all(path).map_err(|e| PathError::PackageDirCreation {
            path: path.display().to_string(),
            source: e,
        })?;
    }
    Ok(())
}
