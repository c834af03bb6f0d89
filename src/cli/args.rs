// src/cli/args.rs
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug, Default)]
#[command(no_binary_name = true)] // The command name is already consumed by the dispatcher.
pub struct RunArgs {
    /// The input file to analyse.
    pub path: Option<PathBuf>,

    /// Use this file instead of the global default settings.
    #[arg(long)]
    pub settings: Option<PathBuf>,

    /// Use this project settings file instead of searching for one.
    #[arg(long)]
    pub project: Option<PathBuf>,

    /// Print the command that would run, as JSON, without running it.
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Parser, Debug, Default)]
#[command(no_binary_name = true)]
pub struct CheckArgs {
    /// The variant to check (`run`, `sp`, `mp`).
    pub variant: String,

    /// The input file the variant would run on.
    pub path: Option<PathBuf>,
}

#[derive(Parser, Debug, Default)]
#[command(no_binary_name = true)]
pub struct SettingsArgs {
    /// Dotted key path, e.g. `executable.opensees`.
    pub key: String,

    /// Resolve as if running this file (its directory is searched for project settings).
    #[arg(long)]
    pub path: Option<PathBuf>,

    /// Use this file instead of the global default settings.
    #[arg(long)]
    pub settings: Option<PathBuf>,

    /// Use this project settings file instead of searching for one.
    #[arg(long)]
    pub project: Option<PathBuf>,
}

#[derive(Parser, Debug, Default)]
#[command(no_binary_name = true)]
pub struct InitArgs {
    /// Overwrite an existing settings file without asking.
    #[arg(long, short)]
    pub force: bool,
}
