// src/core/process_utils.rs

use crate::core::workspace::Workspace;
use std::env;
use std::path::{Path, PathBuf};

/// Outcome of [`save_dirty_files_under`].
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SaveReport {
    pub saved: Vec<PathBuf>,
    pub failed: Vec<PathBuf>,
}

/// Case-folds a path, unifies separators to `/` and collapses `.`/`..` lexically.
///
/// Only meant for comparing paths with each other: on case-sensitive filesystems two
/// different files can normalize to the same value.
pub fn normalize_path(path: &Path) -> PathBuf {
    let lowered = path.to_string_lossy().to_lowercase().replace('\\', "/");
    let absolute = lowered.starts_with('/');

    let mut parts: Vec<&str> = Vec::new();
    for part in lowered.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                if parts.last().is_some_and(|last| *last != "..") {
                    parts.pop();
                } else if !absolute {
                    parts.push("..");
                }
            }
            other => parts.push(other),
        }
    }

    let joined = parts.join("/");
    PathBuf::from(if absolute { format!("/{joined}") } else { joined })
}

/// Whether `file` lies under `root`, either as written or once symlinks are resolved.
fn is_under(file: &Path, root: &Path) -> bool {
    if normalize_path(file).starts_with(normalize_path(root)) {
        return true;
    }
    match (dunce::canonicalize(file), dunce::canonicalize(root)) {
        (Ok(file), Ok(root)) => normalize_path(&file).starts_with(normalize_path(&root)),
        _ => false,
    }
}

/// Saves every modified buffer whose file exists on disk and lies under `root`.
///
/// Best-effort: a buffer that fails to save is logged and reported, the others are
/// still saved and nothing is rolled back.
pub fn save_dirty_files_under(workspace: &mut dyn Workspace, root: &Path) -> SaveReport {
    let mut report = SaveReport::default();

    for buffer in workspace.buffers_mut() {
        let Some(file) = buffer.file_name().map(Path::to_path_buf) else {
            continue;
        };
        if !buffer.is_dirty() || !file.exists() {
            continue;
        }
        if !is_under(&file, root) {
            continue;
        }

        match buffer.save() {
            Ok(()) => {
                log::debug!("Saved '{}' before running.", file.display());
                report.saved.push(file);
            }
            Err(e) => {
                log::warn!("Could not save '{}': {}", file.display(), e);
                report.failed.push(file);
            }
        }
    }
    report
}

/// Looks `name` up on `PATH` (honouring `PATHEXT` on Windows). Paths to an executable
/// file are returned as they are.
pub fn find_executable(name: impl AsRef<std::ffi::OsStr>) -> Option<PathBuf> {
    let name = name.as_ref();
    match which::which(name) {
        Ok(path) => Some(path),
        Err(e) => {
            log::debug!("Executable '{}' not found: {}", name.to_string_lossy(), e);
            None
        }
    }
}

/// The number of processors available to MPI. Never fails and never returns 0.
pub fn detect_processor_count() -> usize {
    let from_env = env::var("NUMBER_OF_PROCESSORS").ok();
    processor_count_from(cfg!(target_os = "windows"), from_env.as_deref(), num_cpus::get())
}

/// Windows reports the count in `NUMBER_OF_PROCESSORS`; elsewhere the online processor
/// count is used. Each signal falls back to the other, and both to 1.
fn processor_count_from(is_windows: bool, env_value: Option<&str>, online: usize) -> usize {
    let from_env = env_value
        .and_then(|value| value.trim().parse::<usize>().ok())
        .filter(|count| *count > 0);
    let online = Some(online).filter(|count| *count > 0);

    let preferred = if is_windows {
        from_env.or(online)
    } else {
        online.or(from_env)
    };
    preferred.unwrap_or(1)
}
