// src/system/executor.rs

use crate::system::panel::{OutputPanel, PanelSetup};
use crate::system::shell;
use std::collections::HashMap;
use std::io::{ErrorKind, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;

const POLL_INTERVAL: Duration = Duration::from_millis(100);
const READ_BUFFER_SIZE: usize = 4096;

#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error("No command specified to run.")]
    EmptyCommand,
    #[error("Command '{0}' could not be executed: {1}")]
    CommandFailed(String, std::io::Error),
    #[error("Command '{command}' exited with a non-zero error code ({}).", display_code(.code))]
    NonZeroExitStatus { command: String, code: Option<i32> },
    #[error("Command '{command}' produced output that was not valid UTF-8")]
    InvalidUtf8Output {
        command: String,
        #[source]
        source: std::string::FromUtf8Error,
    },
    #[error("Command '{command}' did not finish within {seconds} seconds and was stopped.")]
    TimedOut { command: String, seconds: u64 },
    #[error("A command is already running in this panel: '{0}'")]
    AlreadyStarted(String),
    #[error("No command has been started yet.")]
    NotStarted,
}

/// A shell command to run, plus how its output should be presented.
#[derive(Debug, Clone, Default)]
pub struct ExecRequest {
    pub shell_cmd: String,
    pub working_dir: Option<PathBuf>,
    pub file_regex: Option<String>,
    pub env: HashMap<String, String>,
}

impl ExecRequest {
    pub fn new(shell_cmd: impl Into<String>) -> Self {
        Self {
            shell_cmd: shell_cmd.into(),
            ..Self::default()
        }
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn with_file_regex(mut self, regex: impl Into<String>) -> Self {
        self.file_regex = Some(regex.into());
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }
}

/// How a process ended. `code` is `None` when it was killed by a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitOutcome {
    pub code: Option<i32>,
    pub elapsed: Duration,
}

impl ExitOutcome {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// What the control thread sees of a running process, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessEvent {
    Output(String),
    Exited(ExitOutcome),
}

#[derive(Debug)]
enum PipeMessage {
    Chunk(String),
    Closed,
}

/// A spawned shell command whose stdout and stderr are read on background threads.
///
/// The reader threads only forward text over a channel. The exit is reported once
/// both pipes are closed, so every chunk arrives before [`ProcessEvent::Exited`].
#[derive(Debug)]
pub struct AsyncProcess {
    command: String,
    child: Child,
    started: Instant,
    receiver: Receiver<PipeMessage>,
    open_pipes: usize,
    exited: Option<ExitOutcome>,
}

impl AsyncProcess {
    pub fn spawn(request: &ExecRequest) -> Result<Self, ExecutionError> {
        let command_line = request.shell_cmd.trim();
        if command_line.is_empty() {
            return Err(ExecutionError::EmptyCommand);
        }

        let mut command = shell::shell_command(command_line);
        if let Some(dir) = &request.working_dir {
            command.current_dir(dunce::simplified(dir));
        }
        command
            .envs(&request.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let started = Instant::now();
        let mut child = command
            .spawn()
            .map_err(|e| ExecutionError::CommandFailed(command_line.to_string(), e))?;
        log::debug!("Spawned '{}' (PID: {}).", command_line, child.id());

        let (sender, receiver) = mpsc::channel();
        let mut open_pipes = 0;
        if let Some(stdout) = child.stdout.take() {
            spawn_reader(stdout, sender.clone());
            open_pipes += 1;
        }
        if let Some(stderr) = child.stderr.take() {
            spawn_reader(stderr, sender);
            open_pipes += 1;
        }

        Ok(Self {
            command: command_line.to_string(),
            child,
            started,
            receiver,
            open_pipes,
            exited: None,
        })
    }

    /// Blocks until the next chunk of output or the exit.
    pub fn next_event(&mut self) -> Result<ProcessEvent, ExecutionError> {
        if let Some(outcome) = self.exited {
            return Ok(ProcessEvent::Exited(outcome));
        }

        while self.open_pipes > 0 {
            match self.receiver.recv() {
                Ok(PipeMessage::Chunk(text)) => return Ok(ProcessEvent::Output(text)),
                Ok(PipeMessage::Closed) => self.open_pipes -= 1,
                Err(_) => self.open_pipes = 0,
            }
        }

        let status = self
            .child
            .wait()
            .map_err(|e| ExecutionError::CommandFailed(self.command.clone(), e))?;
        let outcome = ExitOutcome {
            code: status.code(),
            elapsed: self.started.elapsed(),
        };
        log::debug!("'{}' exited with {:?}.", self.command, outcome.code);
        self.exited = Some(outcome);
        Ok(ProcessEvent::Exited(outcome))
    }

    pub fn child_mut(&mut self) -> &mut Child {
        &mut self.child
    }
}

fn spawn_reader<R: Read + Send + 'static>(mut pipe: R, sender: Sender<PipeMessage>) {
    thread::spawn(move || {
        let mut buffer = [0u8; READ_BUFFER_SIZE];
        let mut pending = Vec::new();
        loop {
            match pipe.read(&mut buffer) {
                Ok(0) => break,
                Ok(n) => {
                    let text = decode_chunk(&mut pending, buffer.get(..n).unwrap_or_default());
                    if !text.is_empty() && sender.send(PipeMessage::Chunk(text)).is_err() {
                        return;
                    }
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    log::debug!("Stopped reading process output: {}", e);
                    break;
                }
            }
        }
        if !pending.is_empty() {
            let rest = String::from_utf8_lossy(&pending).into_owned();
            sender.send(PipeMessage::Chunk(rest)).ok();
        }
        sender.send(PipeMessage::Closed).ok();
    });
}

/// Appends `bytes` to `pending` and returns the text that can be decoded so far.
///
/// An incomplete UTF-8 sequence at the end stays in `pending` for the next read;
/// invalid bytes are replaced. Line endings are normalized to `\n`.
fn decode_chunk(pending: &mut Vec<u8>, bytes: &[u8]) -> String {
    pending.extend_from_slice(bytes);
    let text = match std::str::from_utf8(pending) {
        Ok(valid) => {
            let text = valid.to_string();
            pending.clear();
            text
        }
        Err(e) if e.error_len().is_none() => {
            let tail = pending.split_off(e.valid_up_to());
            let text = String::from_utf8_lossy(pending).into_owned();
            *pending = tail;
            text
        }
        Err(_) => {
            let text = String::from_utf8_lossy(pending).into_owned();
            pending.clear();
            text
        }
    };
    text.replace("\r\n", "\n")
}

/// The process behind an [`ExecCommand`]: a real child, or a no-op that has already
/// exited successfully without spawning anything.
#[derive(Debug)]
pub enum Process {
    Spawned(AsyncProcess),
    Noop(ExitOutcome),
}

/// Runs a shell command and streams its output to a panel.
///
/// This is the plain primitive: it opens the panel, hands out events and formats the
/// finish line. Callers decide what to append and when to close.
#[derive(Debug)]
pub struct ExecCommand {
    panel: Box<dyn OutputPanel>,
    process: Option<Process>,
    exit: Option<ExitOutcome>,
}

impl ExecCommand {
    pub fn new(panel: Box<dyn OutputPanel>) -> Self {
        Self {
            panel,
            process: None,
            exit: None,
        }
    }

    pub fn run(&mut self, request: &ExecRequest) -> Result<(), ExecutionError> {
        if self.process.is_some() {
            return Err(ExecutionError::AlreadyStarted(request.shell_cmd.clone()));
        }
        let process = AsyncProcess::spawn(request)?;
        self.panel.open(&PanelSetup {
            file_regex: request.file_regex.clone(),
            working_dir: request.working_dir.clone(),
        });
        self.process = Some(Process::Spawned(process));
        Ok(())
    }

    /// "Runs" a command that does nothing: the panel opens and the command has exited
    /// with code 0 by the time this returns.
    pub fn run_noop(&mut self, comment: &str) -> Result<(), ExecutionError> {
        if self.process.is_some() {
            return Err(ExecutionError::AlreadyStarted(comment.to_string()));
        }
        log::debug!("No-op command: {}", comment);
        self.panel.open(&PanelSetup::default());
        self.process = Some(Process::Noop(ExitOutcome {
            code: Some(0),
            elapsed: Duration::ZERO,
        }));
        Ok(())
    }

    pub fn append_string(&mut self, text: &str) {
        self.panel.append(text);
    }

    /// The next event of the running process, or `None` once the exit was delivered.
    pub fn next_event(&mut self) -> Result<Option<ProcessEvent>, ExecutionError> {
        if self.exit.is_some() {
            return Ok(None);
        }
        let event = match self.process.as_mut() {
            None => return Err(ExecutionError::NotStarted),
            Some(Process::Noop(outcome)) => ProcessEvent::Exited(*outcome),
            Some(Process::Spawned(process)) => process.next_event()?,
        };
        if let ProcessEvent::Exited(outcome) = &event {
            self.exit = Some(*outcome);
        }
        Ok(Some(event))
    }

    pub fn is_started(&self) -> bool {
        self.process.is_some()
    }

    pub fn has_exited(&self) -> bool {
        self.exit.is_some()
    }

    pub fn exit_outcome(&self) -> Option<ExitOutcome> {
        self.exit
    }

    /// `[Finished in 1.2s]`, or `[Finished in 1.2s with exit code 3]` plus a newline.
    pub fn finish_message(outcome: &ExitOutcome) -> String {
        let seconds = outcome.elapsed.as_secs_f64();
        match outcome.code {
            Some(code) if code != 0 => format!("[Finished in {seconds:.1}s with exit code {code}]\n"),
            _ => format!("[Finished in {seconds:.1}s]"),
        }
    }

    pub fn close(&mut self, outcome: &ExitOutcome) {
        self.panel.close(outcome);
    }

    /// The OS process, when one was spawned.
    pub fn child_mut(&mut self) -> Option<&mut Child> {
        match self.process.as_mut() {
            Some(Process::Spawned(process)) => Some(process.child_mut()),
            _ => None,
        }
    }
}

/// Runs a short probe command and returns its standard output.
/// Stderr is discarded; a non-zero exit is an error.
pub fn capture_output(program: &Path, args: &[&str], cwd: Option<&Path>) -> Result<String, ExecutionError> {
    let label = describe(program, args);
    let mut command = Command::new(program);
    command
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null());
    if let Some(dir) = cwd {
        command.current_dir(dunce::simplified(dir));
    }

    let output = command
        .output()
        .map_err(|e| ExecutionError::CommandFailed(label.clone(), e))?;
    if !output.status.success() {
        return Err(ExecutionError::NonZeroExitStatus {
            command: label,
            code: output.status.code(),
        });
    }
    String::from_utf8(output.stdout).map_err(|e| ExecutionError::InvalidUtf8Output {
        command: label,
        source: e,
    })
}

/// Spawns `command` with inherited stdio and waits at most `timeout` for it.
/// On timeout the process is killed and reaped.
pub fn run_with_timeout(mut command: Command, label: &str, timeout: Duration) -> Result<ExitOutcome, ExecutionError> {
    let started = Instant::now();
    let mut child = command
        .spawn()
        .map_err(|e| ExecutionError::CommandFailed(label.to_string(), e))?;

    loop {
        match child.try_wait() {
            Ok(Some(status)) => {
                return Ok(ExitOutcome {
                    code: status.code(),
                    elapsed: started.elapsed(),
                });
            }
            Ok(None) => {
                if started.elapsed() >= timeout {
                    log::warn!("'{}' timed out, killing it (PID: {}).", label, child.id());
                    if let Err(e) = kill_tree(&mut child) {
                        log::warn!("Failed to kill child process {}: {}", child.id(), e);
                    }
                    child.wait().ok();
                    return Err(ExecutionError::TimedOut {
                        command: label.to_string(),
                        seconds: timeout.as_secs(),
                    });
                }
                thread::sleep(POLL_INTERVAL);
            }
            Err(e) => return Err(ExecutionError::CommandFailed(label.to_string(), e)),
        }
    }
}

/// Kills `child` and, on Windows, every process it started (such as a window opened
/// with `start`).
fn kill_tree(child: &mut Child) -> std::io::Result<()> {
    #[cfg(windows)]
    {
        let pid = child.id().to_string();
        match Command::new("taskkill")
            .args(["/T", "/F", "/PID", pid.as_str()])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
        {
            Ok(status) if status.success() => return Ok(()),
            Ok(status) => log::debug!("taskkill for {} exited with {:?}.", pid, status.code()),
            Err(e) => log::debug!("taskkill for {} failed: {}", pid, e),
        }
    }
    child.kill()
}

fn display_code(code: &Option<i32>) -> String {
    code.map_or_else(|| "none".to_string(), |c| c.to_string())
}

fn describe(program: &Path, args: &[&str]) -> String {
    let mut parts = vec![program.display().to_string()];
    parts.extend(args.iter().map(|a| a.to_string()));
    parts.join(" ")
}
