// src/core/mod.rs

pub mod commons;
pub mod config_loader;
pub mod config_resolver;
pub mod execution;
pub mod mpi;
pub mod orchestrator;
pub mod paths;
pub mod platform;
pub mod process_utils;
pub mod workspace;
