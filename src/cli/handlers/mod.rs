// src/cli/handlers/mod.rs

// One module per CLI command.

pub mod check;
pub mod commons;
pub mod init;
pub mod run;
pub mod settings;
