// src/cli/handlers/init.rs

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use dialoguer::{Confirm, theme::ColorfulTheme};

use crate::{
    cli::args::InitArgs,
    core::{config_loader, paths},
};

/// The handler for the `init` command: writes the bundled default settings to the
/// package directory, asking before an existing file is replaced.
pub fn handle(args: Vec<String>) -> Result<()> {
    let init_args = InitArgs::try_parse_from(&args)?;
    let settings_path = paths::get_default_settings_path()?;

    if settings_path.exists() && !init_args.force {
        let overwrite = Confirm::with_theme(&ColorfulTheme::default())
            .with_prompt(format!(
                t!("init.prompt.overwrite"),
                path = settings_path.display()
            ))
            .default(false)
            .interact()?;
        if !overwrite {
            println!("{}", t!("init.info.kept").dimmed());
            return Ok(());
        }
    }

    config_loader::write_default_settings(&settings_path)
        .with_context(|| t!("init.error.write"))?;

    println!("\n{}", t!("common.success").green());
    println!(
        "{}",
        format!(t!("init.info.written"), path = settings_path.display())
    );
    Ok(())
}
