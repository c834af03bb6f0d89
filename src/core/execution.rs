//! # Execution Wrapper
//!
//! [`ExecutionHandle`] layers a named run on top of the plain [`ExecCommand`]:
//!
//! - a `[<name> Started]` banner once the command is running,
//! - the finish line renamed to `[<name> Finished in ...]`,
//! - finish hooks that run exactly once, in order, before the panel is closed,
//! - an optional capture of everything written to the panel,
//! - synthetic messages shown through a command that does nothing.
//!
//! The handle is driven from a single control thread: [`ExecutionHandle::pump`] handles
//! one event, [`ExecutionHandle::wait`] drives the run to the end.
use crate::core::platform::Platform;
use crate::system::executor::{ExecCommand, ExecRequest, ExecutionError, ExitOutcome, ProcessEvent};
use crate::system::panel::OutputPanel;
use std::cell::RefCell;
use std::fmt;
use std::process::Child;
use std::rc::Rc;

/// A callback run once the process has exited.
pub type FinishHook = Box<dyn FnOnce()>;

/// Collects every chunk a handle writes to its panel. Clones share the same buffer.
#[derive(Debug, Clone, Default)]
pub struct OutputCapture {
    chunks: Rc<RefCell<Vec<String>>>,
}

impl OutputCapture {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, chunk: &str) {
        self.chunks.borrow_mut().push(chunk.to_string());
    }

    pub fn chunks(&self) -> Vec<String> {
        self.chunks.borrow().clone()
    }

    pub fn text(&self) -> String {
        self.chunks.borrow().concat()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecState {
    Idle,
    Running,
    Finished,
}

pub struct ExecutionHandle {
    base: ExecCommand,
    display_name: Option<String>,
    finish_hooks: Vec<Option<FinishHook>>,
    capture: Option<OutputCapture>,
    platform: Platform,
    state: ExecState,
}

impl fmt::Debug for ExecutionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionHandle")
            .field("display_name", &self.display_name)
            .field("finish_hooks", &self.finish_hooks.len())
            .field("capture", &self.capture.is_some())
            .field("state", &self.state)
            .finish()
    }
}

impl ExecutionHandle {
    pub fn new(
        panel: Box<dyn OutputPanel>,
        display_name: Option<String>,
        finish_hooks: Vec<Option<FinishHook>>,
        capture: Option<OutputCapture>,
    ) -> Self {
        Self {
            base: ExecCommand::new(panel),
            display_name,
            finish_hooks,
            capture,
            platform: Platform::current(),
            state: ExecState::Idle,
        }
    }

    /// Overrides the platform used for the comment prefix of injected messages.
    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = platform;
        self
    }

    pub fn state(&self) -> ExecState {
        self.state
    }

    /// Starts the command and writes the `Started` banner.
    pub fn start(&mut self, request: &ExecRequest) -> Result<(), ExecutionError> {
        if self.state != ExecState::Idle {
            return Err(ExecutionError::AlreadyStarted(request.shell_cmd.clone()));
        }
        self.base.run(request)?;
        self.announce_start();
        Ok(())
    }

    fn announce_start(&mut self) {
        self.state = ExecState::Running;
        if let Some(name) = &self.display_name {
            let banner = format!("[{name} Started]\n\n");
            self.emit(&banner);
        }
    }

    /// Writes a chunk of output to the panel (and the capture, if any).
    ///
    /// With a display name, the first `Finished` in the chunk becomes
    /// `<name> Finished`, and chunks arriving after the exit are preceded by a blank line.
    pub fn append_string(&mut self, chunk: &str) {
        let text = match &self.display_name {
            Some(name) => {
                let renamed = chunk.replacen("Finished", &format!("{name} Finished"), 1);
                if self.base.has_exited() {
                    format!("\n\n{renamed}")
                } else {
                    renamed
                }
            }
            None => chunk.to_string(),
        };
        self.emit(&text);
    }

    fn emit(&mut self, text: &str) {
        self.base.append_string(text);
        if let Some(capture) = &self.capture {
            capture.push(text);
        }
    }

    /// Runs the finish hooks, writes the finish line and closes the panel.
    /// Calling it again after the run finished does nothing.
    pub fn on_finished(&mut self, outcome: &ExitOutcome) {
        if self.state == ExecState::Finished {
            return;
        }
        for hook in self.finish_hooks.drain(..).flatten() {
            hook();
        }
        let message = ExecCommand::finish_message(outcome);
        self.append_string(&message);
        self.base.close(outcome);
        self.state = ExecState::Finished;
    }

    /// Shows `text` in the panel through a command that spawns nothing, then finishes.
    pub fn inject_message(&mut self, text: &str) -> Result<(), ExecutionError> {
        if self.state != ExecState::Idle {
            return Err(ExecutionError::AlreadyStarted(text.to_string()));
        }
        let comment = format!(
            "{} [{}] {}",
            self.platform.comment_prefix(),
            self.display_name.as_deref().unwrap_or_default(),
            text
        );
        self.base.run_noop(&comment)?;
        self.announce_start();
        self.append_string(text);
        self.wait().map(|_| ())
    }

    /// The OS process, for waiting on or killing it. `None` for injected messages.
    pub fn raw_handle(&mut self) -> Option<&mut Child> {
        self.base.child_mut()
    }

    /// Handles the next event. Returns `true` once the run has finished.
    pub fn pump(&mut self) -> Result<bool, ExecutionError> {
        match self.base.next_event()? {
            Some(ProcessEvent::Output(text)) => {
                self.append_string(&text);
                Ok(false)
            }
            Some(ProcessEvent::Exited(outcome)) => {
                self.on_finished(&outcome);
                Ok(true)
            }
            None => Ok(true),
        }
    }

    /// Drives the run to the end and returns how the process exited.
    pub fn wait(&mut self) -> Result<ExitOutcome, ExecutionError> {
        while !self.pump()? {}
        self.base.exit_outcome().ok_or(ExecutionError::NotStarted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::system::panel::MemoryPanel;

    fn named_handle(panel: &MemoryPanel, hooks: Vec<Option<FinishHook>>, capture: Option<OutputCapture>) -> ExecutionHandle {
        ExecutionHandle::new(Box::new(panel.clone()), Some("RUN job".to_string()), hooks, capture)
    }

    #[test]
    fn test_hooks_run_in_order_skipping_none() {
        // --- Setup ---
        let panel = MemoryPanel::new();
        let calls: Rc<RefCell<Vec<&str>>> = Rc::default();
        let hook = |name: &'static str| -> Option<FinishHook> {
            let calls = Rc::clone(&calls);
            Some(Box::new(move || calls.borrow_mut().push(name)))
        };
        let mut handle = named_handle(&panel, vec![hook("h1"), hook("h2"), None, hook("h3")], None);

        // --- Execute ---
        handle.inject_message("nothing to do").expect("message shown");
        handle.on_finished(&ExitOutcome {
            code: Some(0),
            elapsed: std::time::Duration::ZERO,
        });

        // --- Assert ---
        assert_eq!(*calls.borrow(), vec!["h1", "h2", "h3"]);
        assert_eq!(handle.state(), ExecState::Finished);
    }

    #[test]
    fn test_hooks_run_before_panel_closes() {
        let panel = MemoryPanel::new();
        let seen_open = Rc::new(RefCell::new(None));
        let hook: FinishHook = {
            let panel = panel.clone();
            let seen_open = Rc::clone(&seen_open);
            Box::new(move || *seen_open.borrow_mut() = Some(panel.is_open()))
        };
        let mut handle = named_handle(&panel, vec![Some(hook)], None);

        handle.inject_message("x").expect("message shown");

        assert_eq!(*seen_open.borrow(), Some(true));
        assert!(!panel.is_open());
    }

    #[test]
    fn test_injected_message_output() {
        let panel = MemoryPanel::new();
        let capture = OutputCapture::new();
        let mut handle = named_handle(&panel, Vec::new(), Some(capture.clone()));

        handle.inject_message("Input file \"None\" is not valid.").expect("message shown");

        assert!(handle.raw_handle().is_none());
        assert_eq!(
            panel.text(),
            "[RUN job Started]\n\nInput file \"None\" is not valid.\n\n[RUN job Finished in 0.0s]"
        );
        assert_eq!(capture.text(), panel.text());
        assert_eq!(capture.chunks().len(), 3);
        assert!(matches!(
            handle.inject_message("again"),
            Err(ExecutionError::AlreadyStarted(_))
        ));
    }

    #[test]
    fn test_unnamed_handle_leaves_output_alone() {
        let panel = MemoryPanel::new();
        let mut handle = ExecutionHandle::new(Box::new(panel.clone()), None, Vec::new(), None);

        handle.inject_message("Finished").expect("message shown");

        assert_eq!(panel.text(), "Finished[Finished in 0.0s]");
    }

    #[test]
    fn test_pump_before_start_fails() {
        let mut handle = named_handle(&MemoryPanel::new(), Vec::new(), None);
        assert!(matches!(handle.pump(), Err(ExecutionError::NotStarted)));
        assert_eq!(handle.state(), ExecState::Idle);
    }

    #[cfg(unix)]
    #[test]
    fn test_real_run_banners_and_rename() {
        // --- Setup ---
        let panel = MemoryPanel::new();
        let capture = OutputCapture::new();
        let mut handle = named_handle(&panel, Vec::new(), Some(capture.clone()));

        // --- Execute ---
        handle
            .start(&ExecRequest::new("printf 'Finished Finished\\n'; exit 3"))
            .expect("spawns");
        assert!(handle.raw_handle().is_some());
        assert!(matches!(
            handle.start(&ExecRequest::new("true")),
            Err(ExecutionError::AlreadyStarted(_))
        ));
        let outcome = handle.wait().expect("finishes");

        // --- Assert ---
        assert_eq!(outcome.code, Some(3));
        let text = panel.text();
        assert!(text.starts_with("[RUN job Started]\n\nRUN job Finished Finished\n"), "{text}");
        assert!(text.contains("\n\n[RUN job Finished in "), "{text}");
        assert!(text.ends_with(" with exit code 3]\n"), "{text}");
        assert_eq!(capture.text(), text);
        assert_eq!(panel.closed_with().and_then(|o| o.code), Some(3));
    }
}
