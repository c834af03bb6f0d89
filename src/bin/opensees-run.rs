// src/bin/opensees-run.rs

use anyhow::{Result, anyhow};
use clap::{CommandFactory, Parser};
use colored::*;
use opensees_run::{
    cli::{Cli, handlers},
    system::executor::ExecutionError,
    t,
};

// --- Command Definition and Registry ---

/// A command, its aliases and its handler. Every handler takes the arguments that
/// follow the command name.
struct CommandDefinition {
    name: &'static str,
    aliases: &'static [&'static str],
    handler: fn(Vec<String>) -> Result<()>,
}

static COMMAND_REGISTRY: &[CommandDefinition] = &[
    CommandDefinition {
        name: "run",
        aliases: &["sequential"],
        handler: handlers::run::handle_sequential,
    },
    CommandDefinition {
        name: "sp",
        aliases: &[],
        handler: handlers::run::handle_sp,
    },
    CommandDefinition {
        name: "mp",
        aliases: &[],
        handler: handlers::run::handle_mp,
    },
    CommandDefinition {
        name: "check",
        aliases: &[],
        handler: handlers::check::handle,
    },
    CommandDefinition {
        name: "settings",
        aliases: &["get"],
        handler: handlers::settings::handle,
    },
    CommandDefinition {
        name: "init",
        aliases: &[],
        handler: handlers::init::handle,
    },
];

/// Finds a command definition in the registry by its name or alias.
fn find_command(name: &str) -> Option<&'static CommandDefinition> {
    COMMAND_REGISTRY
        .iter()
        .find(|cmd| cmd.name == name || cmd.aliases.contains(&name))
}

fn main() {
    env_logger::init();

    if let Err(e) = run_cli(Cli::parse()) {
        // A failed analysis already printed its output; only its exit code is passed on.
        if let Some(ExecutionError::NonZeroExitStatus { code, .. }) = e.downcast_ref::<ExecutionError>() {
            std::process::exit(code.unwrap_or(1));
        }

        eprintln!("\n{}: {}", "Error".red().bold(), e);
        std::process::exit(1);
    }
}

fn run_cli(cli: Cli) -> Result<()> {
    log::debug!("CLI args parsed: {:?}", cli);

    let Some(action) = cli.command else {
        Cli::command().print_help()?;
        return Ok(());
    };

    match find_command(&action) {
        Some(command) => (command.handler)(cli.args),
        None => Err(anyhow!(format!(t!("common.error.unknown_command"), name = action))),
    }
}
