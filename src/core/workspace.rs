// src/core/workspace.rs

//! The slice of the host editor the orchestrator talks to: the file in the active view
//! and the open buffers that may need saving before a run.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// An open editor buffer.
pub trait EditorBuffer {
    /// The file backing this buffer, if it has one.
    fn file_name(&self) -> Option<&Path>;
    /// Whether the buffer has unsaved modifications.
    fn is_dirty(&self) -> bool;
    /// Writes the buffer to its file.
    fn save(&mut self) -> io::Result<()>;
}

/// The editor window a run is started from.
pub trait Workspace {
    /// The file shown in the active view, if any.
    fn active_file(&self) -> Option<PathBuf>;
    /// Every open buffer.
    fn buffers_mut(&mut self) -> Vec<&mut dyn EditorBuffer>;
}

/// A buffer holding (possibly unsaved) text for a file on disk.
#[derive(Debug, Clone)]
pub struct FileBuffer {
    path: PathBuf,
    unsaved: Option<String>,
}

impl FileBuffer {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            unsaved: None,
        }
    }

    /// Replaces the buffer content without writing it.
    pub fn edit(&mut self, content: impl Into<String>) {
        self.unsaved = Some(content.into());
    }
}

impl EditorBuffer for FileBuffer {
    fn file_name(&self) -> Option<&Path> {
        Some(&self.path)
    }

    fn is_dirty(&self) -> bool {
        self.unsaved.is_some()
    }

    fn save(&mut self) -> io::Result<()> {
        if let Some(content) = &self.unsaved {
            fs::write(&self.path, content)?;
            self.unsaved = None;
        }
        Ok(())
    }
}

/// The workspace used from the terminal: no active view unless one is given, and
/// whatever buffers the caller opened.
#[derive(Debug, Clone, Default)]
pub struct TerminalWorkspace {
    active_file: Option<PathBuf>,
    buffers: Vec<FileBuffer>,
}

impl TerminalWorkspace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_active_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.active_file = Some(path.into());
        self
    }

    pub fn open(&mut self, buffer: FileBuffer) {
        self.buffers.push(buffer);
    }
}

impl Workspace for TerminalWorkspace {
    fn active_file(&self) -> Option<PathBuf> {
        self.active_file.clone()
    }

    fn buffers_mut(&mut self) -> Vec<&mut dyn EditorBuffer> {
        self.buffers
            .iter_mut()
            .map(|buffer| buffer as &mut dyn EditorBuffer)
            .collect()
    }
}
