//! # System Interaction Layer
//!
//! The boundary between the run logic and the operating system.
//!
//! ## Modules
//!
//! - **`executor`**: spawns shell commands with piped output and hands their output
//!   and exit to the control thread in arrival order. Also runs short probe commands
//!   and bounded interactive commands.
//! - **`panel`**: the output sink of a run. The terminal panel prints output as it
//!   arrives and points at `file:line` error locations.
//! - **`shell`**: platform shell invocation and the temporary scripts used by the MPI
//!   credential registration.

pub mod executor;
pub mod panel;
pub mod shell;
