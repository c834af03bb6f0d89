// src/cli/handlers/commons.rs

// Shared helpers for the handlers.

use anyhow::{Context, Result};
use std::env;
use std::path::{Path, PathBuf};

use crate::core::{
    config_loader::{self, SettingsSources},
    config_resolver::Settings,
};

/// The directory project settings are searched from: the input file's directory, or
/// the current directory when no file was given.
pub fn search_dir(path: Option<&Path>) -> Result<PathBuf> {
    let cwd = env::current_dir().context(t!("common.error.current_dir"))?;
    let dir = match path {
        Some(file) => cwd
            .join(file)
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| cwd.clone()),
        None => cwd,
    };
    Ok(dir)
}

/// Loads the settings layers for a command run on `path`.
pub fn load_settings(
    path: Option<&Path>,
    settings: Option<PathBuf>,
    project: Option<PathBuf>,
) -> Result<Settings> {
    let search_from = search_dir(path)?;
    let sources = SettingsSources {
        defaults: settings,
        project,
    };
    config_loader::load_settings(&sources, Some(&search_from)).context(t!("settings.error.loading"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_dir_uses_the_file_directory() {
        let cwd = env::current_dir().expect("cwd");
        assert_eq!(
            search_dir(Some(Path::new("models/frame.tcl"))).expect("dir"),
            cwd.join("models")
        );
        assert_eq!(search_dir(None).expect("dir"), cwd);
    }
}
