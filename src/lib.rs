//! Runs OpenSees analyses from an editor or the terminal: layered, platform-aware
//! settings, serial or MPI-parallel command lines, and an execution wrapper that
//! streams output with named banners and finish hooks.

include!(concat!(env!("OUT_DIR"), "/translations.rs"));

pub mod cli;
pub mod constants;
pub mod core;
pub mod system;
