use anyhow::{Result, anyhow};
use clap::Parser;
use colored::Colorize;
use std::path::PathBuf;

use crate::{
    cli::args::CheckArgs,
    core::{
        orchestrator::{self, RunVariant},
        workspace::TerminalWorkspace,
    },
};

/// `opensees-run check <variant> [PATH]`: tells whether the variant can run on the path.
/// Touches nothing; exits with an error when the command is disabled.
pub fn handle(args: Vec<String>) -> Result<()> {
    let check_args = CheckArgs::try_parse_from(&args)?;
    let variant = orchestrator::find_variant(&check_args.variant).ok_or_else(|| {
        anyhow!(format!(
            t!("check.error.unknown_variant"),
            variant = check_args.variant
        ))
    })?;

    let paths: Vec<PathBuf> = check_args.path.iter().cloned().collect();
    let shown = check_args
        .path
        .as_ref()
        .map_or_else(|| "None".to_string(), |p| p.display().to_string());

    match orchestrator::resolve_target(&TerminalWorkspace::new(), &paths) {
        Some(target) => {
            println!(
                "{}",
                format!(
                    t!("check.info.enabled"),
                    name = variant.name().cyan(),
                    path = target.display().to_string().yellow()
                )
            );
            Ok(())
        }
        None => Err(anyhow!(format!(
            t!("check.error.disabled"),
            name = variant.name(),
            path = shown
        ))),
    }
}
