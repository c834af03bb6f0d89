use anyhow::{Context, Result};
use clap::Parser;

use super::commons;
use crate::cli::args::SettingsArgs;

/// `opensees-run settings <KEY>`: prints the resolved value of a setting as JSON.
pub fn handle(args: Vec<String>) -> Result<()> {
    let settings_args = SettingsArgs::try_parse_from(&args)?;
    let settings = commons::load_settings(
        settings_args.path.as_deref(),
        settings_args.settings,
        settings_args.project,
    )?;

    let value = settings
        .get(&settings_args.key)
        .with_context(|| format!(t!("settings.error.key"), key = settings_args.key))?;
    log::debug!("'{}' resolved for {}.", settings_args.key, settings.platform());

    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}
