use anyhow::{Result, anyhow};
use clap::Parser;
use std::path::PathBuf;

use super::commons;
use crate::{
    cli::args::RunArgs,
    core::{
        orchestrator::{AnalysisVariant, MP, RunCommand, RunVariant, SEQUENTIAL, SP},
        workspace::TerminalWorkspace,
    },
    system::{
        executor::ExecutionError,
        panel::{OutputPanel, TerminalPanel},
    },
};

/// `opensees-run run [PATH]`: a sequential analysis.
pub fn handle_sequential(args: Vec<String>) -> Result<()> {
    run_variant(&SEQUENTIAL, args)
}

/// `opensees-run sp [PATH]`: OpenSeesSP under MPI.
pub fn handle_sp(args: Vec<String>) -> Result<()> {
    run_variant(&SP, args)
}

/// `opensees-run mp [PATH]`: OpenSeesMP under MPI.
pub fn handle_mp(args: Vec<String>) -> Result<()> {
    run_variant(&MP, args)
}

fn run_variant(variant: &AnalysisVariant, args: Vec<String>) -> Result<()> {
    // 1. Parse arguments
    let run_args = RunArgs::try_parse_from(&args)?;
    let paths: Vec<PathBuf> = run_args.path.iter().cloned().collect();

    // 2. Load the settings that apply to the input file
    let settings = commons::load_settings(
        run_args.path.as_deref(),
        run_args.settings.clone(),
        run_args.project.clone(),
    )?;

    // 3. Start the run; problems the user can fix are already shown in the output
    let mut workspace = TerminalWorkspace::new();
    let mut command = RunCommand::new(
        variant,
        &settings,
        &mut workspace,
        Box::new(|| Box::new(TerminalPanel::new()) as Box<dyn OutputPanel>),
    );
    let job_name = command.job_name();
    if run_args.dry_run {
        let request = command.plan(&paths)?;
        println!("{}", serde_json::to_string_pretty(&request)?);
        return Ok(());
    }
    let Some(mut handle) = command.run(&paths)? else {
        return Err(anyhow!(format!(t!("run.error.aborted"), name = variant.name())));
    };

    // 4. Stream output until the analysis exits
    let outcome = handle.wait()?;
    if !outcome.success() {
        return Err(ExecutionError::NonZeroExitStatus {
            command: job_name,
            code: outcome.code,
        }
        .into());
    }
    Ok(())
}
