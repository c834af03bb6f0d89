// src/system/panel.rs

use crate::system::executor::ExitOutcome;
use colored::Colorize;
use regex::Regex;
use std::cell::RefCell;
use std::fmt;
use std::io::{self, Write};
use std::path::PathBuf;
use std::rc::Rc;

/// What the panel needs to know when a command starts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PanelSetup {
    pub file_regex: Option<String>,
    pub working_dir: Option<PathBuf>,
}

/// The sink a run's output goes to.
pub trait OutputPanel: fmt::Debug {
    fn open(&mut self, setup: &PanelSetup);
    fn append(&mut self, text: &str);
    fn close(&mut self, outcome: &ExitOutcome);
}

/// A `file:line` reference extracted from an output line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorLocation {
    pub path: PathBuf,
    pub line: usize,
}

impl fmt::Display for ErrorLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.path.display(), self.line)
    }
}

/// Extracts error locations from output lines. The first capture group is the file,
/// the second the line number; relative files are joined to the working directory.
#[derive(Debug, Clone)]
pub struct ErrorMatcher {
    regex: Regex,
    working_dir: Option<PathBuf>,
}

impl ErrorMatcher {
    pub fn new(pattern: &str, working_dir: Option<PathBuf>) -> Result<Self, regex::Error> {
        Ok(Self {
            regex: Regex::new(pattern)?,
            working_dir,
        })
    }

    pub fn parse_line(&self, line: &str) -> Option<ErrorLocation> {
        let line = line.trim_end_matches(['\r', '\n']);
        let captures = self.regex.captures(line)?;
        let file = PathBuf::from(captures.get(1)?.as_str());
        let number = captures
            .get(2)
            .and_then(|m| m.as_str().parse::<usize>().ok())
            .unwrap_or(0);

        let path = match &self.working_dir {
            Some(dir) if file.is_relative() => dir.join(file),
            _ => file,
        };
        Some(ErrorLocation { path, line: number })
    }
}

fn build_matcher(setup: &PanelSetup) -> Option<ErrorMatcher> {
    let pattern = setup.file_regex.as_deref()?;
    match ErrorMatcher::new(pattern, setup.working_dir.clone()) {
        Ok(matcher) => Some(matcher),
        Err(e) => {
            log::warn!("Ignoring invalid file regex '{}': {}", pattern, e);
            None
        }
    }
}

/// Splits streamed output into complete lines; a line may arrive over several chunks.
#[derive(Debug, Clone, Default)]
struct LineBuffer {
    pending: String,
}

impl LineBuffer {
    fn push(&mut self, text: &str) -> Vec<String> {
        self.pending.push_str(text);
        let mut lines = Vec::new();
        while let Some(end) = self.pending.find('\n') {
            lines.push(self.pending.drain(..=end).collect());
        }
        lines
    }

    /// The unterminated tail, if any.
    fn finish(&mut self) -> Option<String> {
        Some(std::mem::take(&mut self.pending)).filter(|line| !line.is_empty())
    }

    fn clear(&mut self) {
        self.pending.clear();
    }
}

/// Prints output to the terminal as it arrives. Every complete line that matches the
/// file regex is followed by a highlighted `--> path:line` reference.
#[derive(Debug, Default)]
pub struct TerminalPanel {
    matcher: Option<ErrorMatcher>,
    lines: LineBuffer,
}

impl TerminalPanel {
    pub fn new() -> Self {
        Self::default()
    }

    fn report_location(&self, line: &str) {
        if let Some(location) = self.matcher.as_ref().and_then(|m| m.parse_line(line)) {
            println!("  {} {}", "-->".cyan().bold(), location.to_string().cyan());
        }
    }
}

impl OutputPanel for TerminalPanel {
    fn open(&mut self, setup: &PanelSetup) {
        self.matcher = build_matcher(setup);
        self.lines.clear();
    }

    fn append(&mut self, text: &str) {
        print!("{text}");
        io::stdout().flush().ok();

        for line in self.lines.push(text) {
            self.report_location(&line);
        }
    }

    fn close(&mut self, _outcome: &ExitOutcome) {
        if let Some(line) = self.lines.finish() {
            println!();
            self.report_location(&line);
        }
    }
}

/// Everything a [`MemoryPanel`] has seen.
#[derive(Debug, Default)]
pub struct PanelRecord {
    pub setup: Option<PanelSetup>,
    pub text: String,
    pub locations: Vec<ErrorLocation>,
    pub closed: Option<ExitOutcome>,
}

/// Keeps output in memory. Clones share the same record, so a caller can hand one
/// clone to a run and inspect the other.
#[derive(Debug, Clone, Default)]
pub struct MemoryPanel {
    record: Rc<RefCell<PanelRecord>>,
    matcher: Option<ErrorMatcher>,
    lines: LineBuffer,
}

impl MemoryPanel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(&self) -> String {
        self.record.borrow().text.clone()
    }

    pub fn locations(&self) -> Vec<ErrorLocation> {
        self.record.borrow().locations.clone()
    }

    pub fn is_open(&self) -> bool {
        let record = self.record.borrow();
        record.setup.is_some() && record.closed.is_none()
    }

    pub fn closed_with(&self) -> Option<ExitOutcome> {
        self.record.borrow().closed
    }

    pub fn setup(&self) -> Option<PanelSetup> {
        self.record.borrow().setup.clone()
    }
}

impl OutputPanel for MemoryPanel {
    fn open(&mut self, setup: &PanelSetup) {
        self.matcher = build_matcher(setup);
        self.lines.clear();
        self.record.borrow_mut().setup = Some(setup.clone());
    }

    fn append(&mut self, text: &str) {
        let lines = self.lines.push(text);
        let mut record = self.record.borrow_mut();
        record.text.push_str(text);
        if let Some(matcher) = &self.matcher {
            record.locations.extend(lines.iter().filter_map(|l| matcher.parse_line(l)));
        }
    }

    fn close(&mut self, outcome: &ExitOutcome) {
        let tail = self.lines.finish();
        let mut record = self.record.borrow_mut();
        if let (Some(matcher), Some(line)) = (&self.matcher, tail) {
            record.locations.extend(matcher.parse_line(&line));
        }
        record.closed = Some(*outcome);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::FILE_REGEX;
    use std::path::Path;
    use std::time::Duration;

    #[test]
    fn test_error_matcher_parses_tcl_trace() {
        let matcher = ErrorMatcher::new(FILE_REGEX, Some(PathBuf::from("/models"))).expect("valid regex");

        let relative = matcher
            .parse_line("    (file \"frame.tcl\" line 12)\r\n")
            .expect("matches");
        assert_eq!(relative.path, Path::new("/models").join("frame.tcl"));
        assert_eq!(relative.line, 12);

        assert!(matcher.parse_line("WARNING: analysis failed").is_none());
        assert!(matcher.parse_line("(file \"frame.tcl\" line 12) trailing").is_none());
    }

    #[test]
    fn test_memory_panel_records_everything() {
        // --- Setup ---
        let panel = MemoryPanel::new();
        let mut sink: Box<dyn OutputPanel> = Box::new(panel.clone());

        // --- Execute ---
        sink.open(&PanelSetup {
            file_regex: Some(FILE_REGEX.to_string()),
            working_dir: None,
        });
        sink.append("error\n    (file \"a.tcl\" line 3)\n");
        assert!(panel.is_open());
        sink.close(&ExitOutcome {
            code: Some(1),
            elapsed: Duration::from_millis(10),
        });

        // --- Assert ---
        assert_eq!(panel.text(), "error\n    (file \"a.tcl\" line 3)\n");
        assert_eq!(
            panel.locations(),
            vec![ErrorLocation {
                path: PathBuf::from("a.tcl"),
                line: 3
            }]
        );
        assert!(!panel.is_open());
        assert_eq!(panel.closed_with().and_then(|o| o.code), Some(1));
    }

    #[test]
    fn test_memory_panel_joins_lines_split_across_chunks() {
        let mut panel = MemoryPanel::new();
        panel.open(&PanelSetup {
            file_regex: Some(FILE_REGEX.to_string()),
            working_dir: Some(PathBuf::from("/models")),
        });

        panel.append("    (file \"fra");
        panel.append("me.tcl\" line 4");
        assert!(panel.locations().is_empty());
        panel.append(")\n    (file \"b.tcl\" line 9)");
        panel.close(&ExitOutcome {
            code: Some(1),
            elapsed: Duration::ZERO,
        });

        let lines: Vec<usize> = panel.locations().iter().map(|l| l.line).collect();
        assert_eq!(lines, vec![4, 9]);
        assert_eq!(
            panel.locations().first().map(|l| l.path.clone()),
            Some(Path::new("/models").join("frame.tcl"))
        );
    }

    #[test]
    fn test_invalid_regex_is_ignored() {
        let mut panel = MemoryPanel::new();
        panel.open(&PanelSetup {
            file_regex: Some("(unclosed".to_string()),
            working_dir: None,
        });
        panel.append("(file \"a.tcl\" line 3)\n");
        assert!(panel.locations().is_empty());
    }
}
