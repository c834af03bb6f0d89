// src/core/mpi.rs

use crate::system::{executor, executor::ExecutionError, shell};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// What the pre-flight found out about the MPI installation. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MpiEnvironment {
    pub launcher: PathBuf,
    pub daemon_running: bool,
    pub credentials_valid: bool,
}

/// The MPI process manager as seen by the pre-flight.
pub trait MpiService {
    /// The launcher (`mpiexec`).
    fn launcher(&self) -> &Path;
    /// The process manager daemon (`smpd`).
    fn daemon(&self) -> &Path;
    /// Whether the daemon is running. A failing probe counts as not running.
    fn daemon_status(&self) -> bool;
    /// Whether the launcher has valid stored credentials.
    fn validate_credentials(&self) -> bool;
    /// Opens an interactive terminal where the user registers their credentials.
    fn register_credentials(&self, instructions: &[String]) -> Result<(), ExecutionError>;
}

/// MPICH2 on Windows: `smpd` lives next to `mpiexec`.
#[derive(Debug, Clone)]
pub struct Mpich2Service {
    mpiexec: PathBuf,
    smpd: PathBuf,
    register_timeout: Duration,
}

impl Mpich2Service {
    pub fn new(mpiexec: &Path, register_timeout: Duration) -> Self {
        Self {
            mpiexec: mpiexec.to_path_buf(),
            smpd: mpiexec.with_file_name("smpd"),
            register_timeout,
        }
    }
}

impl MpiService for Mpich2Service {
    fn launcher(&self) -> &Path {
        &self.mpiexec
    }

    fn daemon(&self) -> &Path {
        &self.smpd
    }

    fn daemon_status(&self) -> bool {
        match executor::capture_output(&self.smpd, &["-status"], None) {
            Ok(output) => output.starts_with("smpd running"),
            Err(e) => {
                log::debug!("smpd status probe failed: {}", e);
                false
            }
        }
    }

    fn validate_credentials(&self) -> bool {
        match executor::capture_output(&self.mpiexec, &["-validate"], None) {
            Ok(output) => output.starts_with("SUCCESS"),
            Err(e) => {
                log::debug!("mpiexec -validate failed: {}", e);
                false
            }
        }
    }

    fn register_credentials(&self, instructions: &[String]) -> Result<(), ExecutionError> {
        let label = format!("{} -register", self.mpiexec.display());
        let is_windows = cfg!(windows);
        let script = shell::build_registration_script(
            &self.mpiexec.display().to_string(),
            instructions,
            is_windows,
        );
        let script_path = shell::write_temp_script(&script, is_windows)
            .map_err(|e| ExecutionError::CommandFailed(label.clone(), e))?;

        let command = shell::interactive_script_command(&script_path, t!("mpi.register.title"));
        let outcome = executor::run_with_timeout(command, &label, self.register_timeout)?;
        log::debug!("Registration terminal closed with {:?}.", outcome.code);
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PreflightError {
    DaemonNotRunning { smpd: String },
    RegistrationFailed { mpiexec: String },
}

impl fmt::Display for PreflightError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DaemonNotRunning { smpd } => write!(f, t!("mpi.error.daemon_not_running"), smpd = smpd),
            Self::RegistrationFailed { mpiexec } => {
                write!(f, t!("mpi.error.registration_failed"), mpiexec = mpiexec)
            }
        }
    }
}

impl std::error::Error for PreflightError {}

/// The lines shown above the `-register` prompt.
pub fn registration_instructions(mpiexec: &Path) -> Vec<String> {
    vec![
        t!("mpi.register.needs_account").to_string(),
        t!("mpi.register.running_command").to_string(),
        format!("    \"{}\" -register", mpiexec.display()),
    ]
}

/// Makes sure MPICH2 can launch jobs: the daemon must be running, and the user gets
/// one chance to register credentials when the stored ones are not valid.
pub fn preflight(service: &dyn MpiService) -> Result<MpiEnvironment, PreflightError> {
    let launcher = service.launcher().to_path_buf();

    if !service.daemon_status() {
        return Err(PreflightError::DaemonNotRunning {
            smpd: service.daemon().display().to_string(),
        });
    }

    if !service.validate_credentials() {
        log::info!("MPICH2 credentials are not valid, starting registration.");
        if let Err(e) = service.register_credentials(&registration_instructions(&launcher)) {
            log::warn!("Credential registration did not complete: {}", e);
        }
        if !service.validate_credentials() {
            return Err(PreflightError::RegistrationFailed {
                mpiexec: launcher.display().to_string(),
            });
        }
    }

    Ok(MpiEnvironment {
        launcher,
        daemon_running: true,
        credentials_valid: true,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};
    use std::collections::VecDeque;

    #[derive(Debug)]
    struct FakeService {
        launcher: PathBuf,
        daemon: PathBuf,
        running: bool,
        validations: RefCell<VecDeque<bool>>,
        validate_calls: Cell<usize>,
        registrations: RefCell<Vec<Vec<String>>>,
    }

    impl FakeService {
        fn new(running: bool, validations: &[bool]) -> Self {
            Self {
                launcher: PathBuf::from("C:/MPICH2/bin/mpiexec.exe"),
                daemon: PathBuf::from("C:/MPICH2/bin/smpd"),
                running,
                validations: RefCell::new(validations.iter().copied().collect()),
                validate_calls: Cell::new(0),
                registrations: RefCell::default(),
            }
        }
    }

    impl MpiService for FakeService {
        fn launcher(&self) -> &Path {
            &self.launcher
        }

        fn daemon(&self) -> &Path {
            &self.daemon
        }

        fn daemon_status(&self) -> bool {
            self.running
        }

        fn validate_credentials(&self) -> bool {
            self.validate_calls.set(self.validate_calls.get() + 1);
            self.validations.borrow_mut().pop_front().unwrap_or(false)
        }

        fn register_credentials(&self, instructions: &[String]) -> Result<(), ExecutionError> {
            self.registrations.borrow_mut().push(instructions.to_vec());
            Ok(())
        }
    }

    #[test]
    fn test_daemon_down_stops_before_validation() {
        let service = FakeService::new(false, &[true]);

        let err = preflight(&service).expect_err("daemon is down");

        assert_eq!(
            err,
            PreflightError::DaemonNotRunning {
                smpd: "C:/MPICH2/bin/smpd".to_string()
            }
        );
        assert_eq!(
            err.to_string(),
            "MPICH2 service \"smpd\" is not running, need to run the following from an administrator command prompt:\n\t\"C:/MPICH2/bin/smpd\" -start"
        );
        assert_eq!(service.validate_calls.get(), 0);
        assert!(service.registrations.borrow().is_empty());
    }

    #[test]
    fn test_valid_credentials_skip_registration() {
        let service = FakeService::new(true, &[true]);

        let env = preflight(&service).expect("ready");

        assert!(env.daemon_running && env.credentials_valid);
        assert!(service.registrations.borrow().is_empty());
    }

    #[test]
    fn test_registration_fixes_credentials() {
        let service = FakeService::new(true, &[false, true]);

        let env = preflight(&service).expect("registered");

        assert_eq!(env.launcher, PathBuf::from("C:/MPICH2/bin/mpiexec.exe"));
        assert_eq!(service.registrations.borrow().len(), 1);
        assert_eq!(
            service.registrations.borrow().first().and_then(|lines| lines.last()).cloned(),
            Some("    \"C:/MPICH2/bin/mpiexec.exe\" -register".to_string())
        );
    }

    #[test]
    fn test_registration_runs_once_then_fails() {
        let service = FakeService::new(true, &[false, false]);

        let err = preflight(&service).expect_err("still invalid");

        assert_eq!(service.registrations.borrow().len(), 1);
        assert_eq!(service.validate_calls.get(), 2);
        assert_eq!(
            err.to_string(),
            "MPICH2 account registration unsuccessful, need to run script again or the following from a command prompt:\n\t\"C:/MPICH2/bin/mpiexec.exe\" -register"
        );
    }

    #[test]
    fn test_smpd_is_next_to_mpiexec() {
        let service = Mpich2Service::new(Path::new("/opt/mpich2/bin/mpiexec"), Duration::from_secs(1));
        assert_eq!(service.daemon(), Path::new("/opt/mpich2/bin/smpd"));
    }

    #[cfg(unix)]
    #[test]
    fn test_missing_binaries_probe_as_not_ready() {
        let service = Mpich2Service::new(Path::new("/surely/not/here/mpiexec"), Duration::from_secs(1));
        assert!(!service.daemon_status());
        assert!(!service.validate_credentials());
    }
}
