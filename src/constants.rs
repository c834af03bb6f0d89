// src/constants.rs

/// The name of the analysis tool, used as the prefix of every job name.
pub const TOOL_NAME: &str = "OpenSees";

/// The name of the directory holding the global settings (inside the system config dir).
pub const PACKAGE_DIR_NAME: &str = "opensees-run";

/// Environment variable that overrides the location of the package directory.
pub const PACKAGE_DIR_ENV: &str = "OPENSEES_RUN_HOME";

/// The name of the global default settings file (inside the package directory).
pub const DEFAULT_SETTINGS_FILENAME: &str = "settings.toml";

/// The names of the project override files, looked up from the input file's directory upwards.
pub const PROJECT_SETTINGS_FILENAMES: &[&str] = &["opensees-project.toml", "opensees-project.json"];

/// The substitution variable that always points to the package directory.
pub const PACKAGE_DIR_VAR: &str = "PackageDir";

/// Maximum nesting of `${...}` references followed while resolving one setting.
pub const MAX_RECURSION_DEPTH: u32 = 32;

/// Matches OpenSees/Tcl error traces such as `(file "model.tcl" line 12)`.
pub const FILE_REGEX: &str = r#"^\s*\(file "([^"]+)" line (\d+)\)$"#;

/// Setting keys read by the run orchestrator.
pub const MPIEXEC_SETTING: &str = "mpiexec";
pub const PROCESSOR_COUNT_SETTING: &str = "processor_count";
pub const MPI_REGISTER_TIMEOUT_SETTING: &str = "mpi_register_timeout";

/// How long the interactive MPICH2 registration terminal may stay open, in seconds.
pub const DEFAULT_MPI_REGISTER_TIMEOUT_SECS: u64 = 300;
