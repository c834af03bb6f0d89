// src/core/platform.rs

use std::fmt;

/// The platforms a settings file can branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Platform {
    Windows,
    Osx,
    Linux,
}

impl Platform {
    /// The platform this binary was compiled for. Anything that is neither Windows
    /// nor macOS is treated as Linux.
    pub fn current() -> Self {
        if cfg!(target_os = "windows") {
            Self::Windows
        } else if cfg!(target_os = "macos") {
            Self::Osx
        } else {
            Self::Linux
        }
    }

    /// The canonical key of this platform in a settings branch.
    pub fn identifier(self) -> &'static str {
        match self {
            Self::Windows => "windows",
            Self::Osx => "osx",
            Self::Linux => "linux",
        }
    }

    /// Every key accepted as a branch for this platform, canonical key first.
    pub fn branch_keys(self) -> &'static [&'static str] {
        match self {
            Self::Windows => &["windows", "win32"],
            Self::Osx => &["osx", "macos"],
            Self::Linux => &["linux"],
        }
    }

    /// Prefix that turns a line into a comment for the platform's shell.
    pub fn comment_prefix(self) -> &'static str {
        match self {
            Self::Windows => "::",
            Self::Osx | Self::Linux => "#",
        }
    }

    pub fn is_windows(self) -> bool {
        self == Self::Windows
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.identifier())
    }
}
