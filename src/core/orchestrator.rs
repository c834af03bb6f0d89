//! # Run Orchestrator
//!
//! Turns "run this file with variant X" into a started [`ExecutionHandle`]:
//!
//! 1. resolve the target file (explicit path or the active file),
//! 2. save modified buffers under the target's directory,
//! 3. resolve the executable (and, for parallel variants, the MPI launcher and the
//!    process count) from the settings,
//! 4. on Windows, make sure MPICH2 is ready to launch jobs (only when actually running),
//! 5. start the command in the target's directory.
//!
//! Problems the user can fix (missing file, missing executable, MPI not ready) are
//! shown in the output panel as an injected message. Broken settings are returned
//! as errors.
use crate::{
    constants::{
        DEFAULT_MPI_REGISTER_TIMEOUT_SECS, FILE_REGEX, MPIEXEC_SETTING, MPI_REGISTER_TIMEOUT_SETTING,
        PROCESSOR_COUNT_SETTING, TOOL_NAME,
    },
    core::{
        commons::{base_name, native_path, wrap_value},
        config_resolver::{Settings, SettingsError},
        execution::{ExecutionHandle, FinishHook, OutputCapture},
        mpi::{self, Mpich2Service, MpiService, PreflightError},
        process_utils,
        workspace::Workspace,
    },
    system::{executor::ExecRequest, executor::ExecutionError, panel::OutputPanel},
};
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// What distinguishes one run command from another.
pub trait RunVariant {
    fn name(&self) -> &str;
    fn is_parallel(&self) -> bool;
    fn exe_setting_name(&self) -> &str;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Serial,
    Parallel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnalysisVariant {
    /// The CLI command that selects this variant.
    pub command: &'static str,
    pub name: &'static str,
    pub mode: RunMode,
    pub exe_setting: &'static str,
}

impl RunVariant for AnalysisVariant {
    fn name(&self) -> &str {
        self.name
    }

    fn is_parallel(&self) -> bool {
        self.mode == RunMode::Parallel
    }

    fn exe_setting_name(&self) -> &str {
        self.exe_setting
    }
}

pub const SEQUENTIAL: AnalysisVariant = AnalysisVariant {
    command: "run",
    name: "Sequential",
    mode: RunMode::Serial,
    exe_setting: "executable.opensees",
};

pub const SP: AnalysisVariant = AnalysisVariant {
    command: "sp",
    name: "SP",
    mode: RunMode::Parallel,
    exe_setting: "executable.opensees_sp",
};

pub const MP: AnalysisVariant = AnalysisVariant {
    command: "mp",
    name: "MP",
    mode: RunMode::Parallel,
    exe_setting: "executable.opensees_mp",
};

pub const VARIANTS: &[AnalysisVariant] = &[SEQUENTIAL, SP, MP];

/// Looks a variant up by its command (`run`, `sp`, `mp`) or its name, ignoring case.
pub fn find_variant(key: &str) -> Option<&'static AnalysisVariant> {
    VARIANTS
        .iter()
        .find(|v| v.command.eq_ignore_ascii_case(key) || v.name.eq_ignore_ascii_case(key))
}

/// A fully prepared run, ready to be started.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunRequest {
    pub target: PathBuf,
    pub working_dir: PathBuf,
    pub job_name: String,
    pub display_name: String,
    pub parallel: bool,
    /// The MPI launcher, for parallel runs.
    pub launcher: Option<PathBuf>,
    pub command_line: String,
}

impl RunRequest {
    pub fn exec_request(&self) -> ExecRequest {
        ExecRequest::new(self.command_line.clone())
            .with_file_regex(FILE_REGEX)
            .with_working_dir(self.working_dir.clone())
    }
}

#[derive(Debug)]
pub enum RunError {
    InvalidInput { path: String, name: String },
    ExecutableNotFound { name: String, exe: String },
    MpiNotFound { name: String, mpiexec: String },
    Preflight(PreflightError),
    Settings(SettingsError),
    Execution(ExecutionError),
}

impl RunError {
    /// Whether the error is shown to the user in the output panel rather than returned.
    pub fn is_reported_in_panel(&self) -> bool {
        matches!(
            self,
            Self::InvalidInput { .. } | Self::ExecutableNotFound { .. } | Self::MpiNotFound { .. } | Self::Preflight(_)
        )
    }
}

impl fmt::Display for RunError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidInput { path, name } => write!(f, t!("run.error.invalid_input"), path = path, name = name),
            Self::ExecutableNotFound { name, exe } => {
                write!(f, t!("run.error.executable_not_found"), name = name, exe = exe)
            }
            Self::MpiNotFound { name, mpiexec } => {
                write!(f, t!("run.error.mpi_not_found"), name = name, mpiexec = mpiexec)
            }
            Self::Preflight(e) => write!(f, "{e}"),
            Self::Settings(e) => write!(f, "{e}"),
            Self::Execution(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for RunError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Preflight(e) => Some(e),
            Self::Settings(e) => Some(e),
            Self::Execution(e) => Some(e),
            _ => None,
        }
    }
}

impl From<SettingsError> for RunError {
    fn from(e: SettingsError) -> Self {
        Self::Settings(e)
    }
}

impl From<ExecutionError> for RunError {
    fn from(e: ExecutionError) -> Self {
        Self::Execution(e)
    }
}

impl From<PreflightError> for RunError {
    fn from(e: PreflightError) -> Self {
        Self::Preflight(e)
    }
}

pub type PanelFactory<'a> = Box<dyn Fn() -> Box<dyn OutputPanel> + 'a>;
pub type MpiFactory = fn(&Path, Duration) -> Box<dyn MpiService>;

fn mpich2_service(mpiexec: &Path, register_timeout: Duration) -> Box<dyn MpiService> {
    Box::new(Mpich2Service::new(mpiexec, register_timeout))
}

/// The process count for a parallel run: the configured value when it is an integer
/// in `1..=max`, `max` otherwise (`"auto"`, out of range, not a number, missing).
pub fn resolve_process_count(configured: Option<&Value>, max: usize) -> usize {
    let parsed = match configured {
        Some(Value::Number(n)) => n.as_u64().and_then(|v| usize::try_from(v).ok()),
        Some(Value::String(s)) => s.trim().parse::<usize>().ok(),
        _ => None,
    };
    match parsed {
        Some(count) if count > 0 && count <= max => count,
        _ => max,
    }
}

/// The path a run command would use: the active file with no paths, the path itself
/// with exactly one. It must exist. Has no side effects.
pub fn resolve_target(workspace: &dyn Workspace, candidate_paths: &[PathBuf]) -> Option<PathBuf> {
    candidate_path(workspace, candidate_paths).filter(|path| path.exists())
}

fn candidate_path(workspace: &dyn Workspace, candidate_paths: &[PathBuf]) -> Option<PathBuf> {
    match candidate_paths {
        [] => workspace.active_file(),
        [path] => Some(path.clone()),
        _ => None,
    }
}

/// One run command bound to a variant, the settings and the editor window.
pub struct RunCommand<'a> {
    variant: &'a dyn RunVariant,
    settings: &'a Settings,
    workspace: &'a mut dyn Workspace,
    panel_factory: PanelFactory<'a>,
    mpi_factory: MpiFactory,
    cpu_count: fn() -> usize,
    finish_hooks: Vec<Option<FinishHook>>,
    capture: Option<OutputCapture>,
}

impl fmt::Debug for RunCommand<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunCommand")
            .field("variant", &self.variant.name())
            .field("finish_hooks", &self.finish_hooks.len())
            .field("capture", &self.capture.is_some())
            .finish_non_exhaustive()
    }
}

impl<'a> RunCommand<'a> {
    pub fn new(
        variant: &'a dyn RunVariant,
        settings: &'a Settings,
        workspace: &'a mut dyn Workspace,
        panel_factory: PanelFactory<'a>,
    ) -> Self {
        Self {
            variant,
            settings,
            workspace,
            panel_factory,
            mpi_factory: mpich2_service,
            cpu_count: process_utils::detect_processor_count,
            finish_hooks: Vec::new(),
            capture: None,
        }
    }

    pub fn with_mpi_factory(mut self, factory: MpiFactory) -> Self {
        self.mpi_factory = factory;
        self
    }

    pub fn with_cpu_count(mut self, cpu_count: fn() -> usize) -> Self {
        self.cpu_count = cpu_count;
        self
    }

    pub fn with_finish_hooks(mut self, hooks: Vec<Option<FinishHook>>) -> Self {
        self.finish_hooks = hooks;
        self
    }

    pub fn with_capture(mut self, capture: OutputCapture) -> Self {
        self.capture = Some(capture);
        self
    }

    pub fn job_name(&self) -> String {
        format!("{} {}", TOOL_NAME, self.variant.name())
    }

    pub fn is_enabled(&self, candidate_paths: &[PathBuf]) -> bool {
        self.resolve_target(candidate_paths).is_some()
    }

    pub fn is_visible(&self, candidate_paths: &[PathBuf]) -> bool {
        self.is_enabled(candidate_paths)
    }

    pub fn resolve_target(&self, candidate_paths: &[PathBuf]) -> Option<PathBuf> {
        resolve_target(&*self.workspace, candidate_paths)
    }

    fn candidate(&self, candidate_paths: &[PathBuf]) -> Option<PathBuf> {
        candidate_path(&*self.workspace, candidate_paths)
    }

    /// Starts the run. Returns `None` when it was aborted with a message in the panel.
    pub fn run(&mut self, candidate_paths: &[PathBuf]) -> Result<Option<ExecutionHandle>, RunError> {
        let basename = self
            .candidate(candidate_paths)
            .map(|path| base_name(&path))
            .unwrap_or_default();
        let display_name = format!("RUN {} for \"{}\"", self.job_name(), basename);

        let planned = self
            .plan(candidate_paths)
            .and_then(|request| self.ensure_mpi_ready(&request).map(|()| request));
        match planned {
            Ok(request) => {
                log::info!("Starting '{}' in '{}'.", request.command_line, request.working_dir.display());
                let mut handle = self.new_handle(display_name);
                handle.start(&request.exec_request())?;
                Ok(Some(handle))
            }
            Err(e) if e.is_reported_in_panel() => {
                log::debug!("Run aborted: {}", e);
                let mut handle = self.new_handle(display_name);
                handle.inject_message(&e.to_string())?;
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Resolves the target, saves modified buffers and builds the command line.
    /// Starts nothing and does not talk to MPI.
    pub fn plan(&mut self, candidate_paths: &[PathBuf]) -> Result<RunRequest, RunError> {
        let job_name = self.job_name();
        let target = self
            .resolve_target(candidate_paths)
            .and_then(|path| dunce::canonicalize(path).ok())
            .ok_or_else(|| RunError::InvalidInput {
                path: self
                    .candidate(candidate_paths)
                    .map_or_else(|| "None".to_string(), |p| p.display().to_string()),
                name: job_name.clone(),
            })?;
        let working_dir = target.parent().map(Path::to_path_buf).unwrap_or_default();
        let basename = base_name(&target);

        let report = process_utils::save_dirty_files_under(&mut *self.workspace, &working_dir);
        if !report.failed.is_empty() {
            log::warn!("{} modified file(s) could not be saved before running.", report.failed.len());
        }

        let (command_line, launcher) = self.build_command_line(&job_name, &basename)?;
        Ok(RunRequest {
            display_name: format!("RUN {job_name} for \"{basename}\""),
            target,
            working_dir,
            job_name,
            parallel: self.variant.is_parallel(),
            launcher,
            command_line,
        })
    }

    /// On Windows, checks that MPICH2 can launch `request`, walking the user through
    /// credential registration when needed.
    fn ensure_mpi_ready(&self, request: &RunRequest) -> Result<(), RunError> {
        let Some(launcher) = &request.launcher else {
            return Ok(());
        };
        if !self.settings.platform().is_windows() {
            return Ok(());
        }
        let service = (self.mpi_factory)(launcher, self.register_timeout());
        let environment = mpi::preflight(service.as_ref())?;
        log::debug!("MPI ready: {:?}", environment);
        Ok(())
    }

    fn build_command_line(&self, job_name: &str, basename: &str) -> Result<(String, Option<PathBuf>), RunError> {
        let exe = self.settings.get_string(self.variant.exe_setting_name())?;
        if process_utils::find_executable(&exe).is_none() {
            return Err(RunError::ExecutableNotFound {
                name: job_name.to_string(),
                exe,
            });
        }
        let command = format!("{} {}", wrap_value(&exe), wrap_value(basename));
        if !self.variant.is_parallel() {
            return Ok((command, None));
        }

        let mpiexec = native_path(&self.settings.get_string(MPIEXEC_SETTING)?);
        let mpiexec_shown = mpiexec.display().to_string();
        if process_utils::find_executable(&mpiexec).is_none() {
            return Err(RunError::MpiNotFound {
                name: job_name.to_string(),
                mpiexec: mpiexec_shown,
            });
        }

        let max = (self.cpu_count)();
        let configured = self.optional_setting(PROCESSOR_COUNT_SETTING);
        let count = resolve_process_count(configured.as_ref(), max);
        log::debug!("Using {} of {} processors.", count, max);

        let mut parts = vec![wrap_value(&mpiexec_shown)];
        if self.settings.platform().is_windows() {
            parts.push("-noprompt".to_string());
        }
        parts.push("-np".to_string());
        parts.push(count.to_string());
        parts.push(command);
        Ok((parts.join(" "), Some(mpiexec)))
    }

    /// A setting whose absence or breakage falls back to a default instead of failing.
    fn optional_setting(&self, key: &str) -> Option<Value> {
        match self.settings.get(key) {
            Ok(value) => Some(value),
            Err(SettingsError::KeyNotFound { .. }) => None,
            Err(e) => {
                log::warn!("Ignoring setting '{}': {}", key, e);
                None
            }
        }
    }

    fn register_timeout(&self) -> Duration {
        let seconds = match self.optional_setting(MPI_REGISTER_TIMEOUT_SETTING) {
            Some(Value::Number(n)) => n.as_u64(),
            Some(Value::String(s)) => s.trim().parse().ok(),
            _ => None,
        };
        Duration::from_secs(seconds.unwrap_or(DEFAULT_MPI_REGISTER_TIMEOUT_SECS))
    }

    fn new_handle(&mut self, display_name: String) -> ExecutionHandle {
        ExecutionHandle::new(
            (self.panel_factory)(),
            Some(display_name),
            std::mem::take(&mut self.finish_hooks),
            self.capture.clone(),
        )
        .with_platform(self.settings.platform())
    }
}
