//! # Config Loader
//!
//! Finds and parses the two settings layers consumed by [`Settings`]:
//!
//! 1. **Defaults**: `settings.toml` in the package directory. When the file does not
//!    exist yet, the bundled defaults are written there first so users have something
//!    to edit.
//! 2. **Project overrides**: `opensees-project.toml` (or `.json`), discovered by walking
//!    up from the input file's directory, or given explicitly.
//!
//! Files ending in `.json` are parsed as JSON, everything else as TOML.
use crate::{
    constants::{DEFAULT_SETTINGS_FILENAME, PROJECT_SETTINGS_FILENAMES},
    core::{
        config_resolver::{ResolveContext, Settings, SettingsError, SettingsResult},
        paths,
        platform::Platform,
    },
};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};

/// The settings bundled with the binary.
pub const DEFAULT_SETTINGS: &str = include_str!("../../resources/default_settings.toml");

/// Where the settings layers come from. `None` means "use the usual location".
#[derive(Debug, Clone, Default)]
pub struct SettingsSources {
    pub defaults: Option<PathBuf>,
    pub project: Option<PathBuf>,
}

/// Loads both layers and builds a resolver for the current platform.
///
/// # Arguments
/// * `sources` - Explicit file locations, if any.
/// * `search_from` - Directory where the project file discovery starts (usually the
///   input file's directory). Ignored when `sources.project` is set.
pub fn load_settings(sources: &SettingsSources, search_from: Option<&Path>) -> SettingsResult<Settings> {
    load_settings_in(&paths::get_package_dir()?, sources, search_from)
}

/// Same as [`load_settings`], with the package directory given explicitly.
pub fn load_settings_in(
    package_dir: &Path,
    sources: &SettingsSources,
    search_from: Option<&Path>,
) -> SettingsResult<Settings> {
    let defaults_path = match &sources.defaults {
        Some(path) => path.clone(),
        None => ensure_default_settings(&package_dir.join(DEFAULT_SETTINGS_FILENAME))?,
    };
    let defaults = load_layer(&defaults_path)?;

    let project_path = sources
        .project
        .clone()
        .or_else(|| search_from.and_then(find_project_settings));
    let project = match &project_path {
        Some(path) => {
            log::debug!("Using project settings from '{}'.", path.display());
            Some(load_layer(path)?)
        }
        None => None,
    };

    Settings::new(
        defaults,
        project,
        ResolveContext::new(Platform::current(), package_dir),
    )
}

/// Parses one settings file into a value tree.
pub fn load_layer(path: &Path) -> SettingsResult<Value> {
    let content = fs::read_to_string(path).map_err(|e| SettingsError::Io {
        path: path.display().to_string(),
        source: e,
    })?;
    parse_layer(&content, path)
}

/// Parses settings text, choosing the format from the file extension.
pub fn parse_layer(content: &str, path: &Path) -> SettingsResult<Value> {
    let is_json = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    if is_json {
        serde_json::from_str(content).map_err(|e| SettingsError::JsonParse {
            path: path.display().to_string(),
            source: e,
        })
    } else {
        toml::from_str(content).map_err(|e| SettingsError::TomlParse {
            path: path.display().to_string(),
            source: e,
        })
    }
}

/// Walks from `start_dir` up to the filesystem root looking for a project settings file.
pub fn find_project_settings(start_dir: &Path) -> Option<PathBuf> {
    start_dir.ancestors().find_map(|dir| {
        PROJECT_SETTINGS_FILENAMES
            .iter()
            .map(|name| dir.join(name))
            .find(|candidate| candidate.is_file())
    })
}

/// Writes the bundled defaults to `path` unless a file already exists there.
pub fn ensure_default_settings(path: &Path) -> SettingsResult<PathBuf> {
    if !path.exists() {
        write_default_settings(path)?;
    }
    Ok(path.to_path_buf())
}

/// Writes (or overwrites) the bundled defaults to `path`.
pub fn write_default_settings(path: &Path) -> SettingsResult<()> {
    log::info!("Writing default settings to '{}'.", path.display());
    fs::write(path, DEFAULT_SETTINGS).map_err(|e| SettingsError::Io {
        path: path.display().to_string(),
        source: e,
    })
}
