// src/system/shell.rs

use crate::core::commons::wrap_value;
use std::io::{self, Write};
use std::path::Path;
use std::process::Command;
use tempfile::{Builder, TempPath};

/// A command that runs `command_line` through the platform shell (`cmd /C` on Windows,
/// `sh -c` elsewhere), so quoting and builtins behave as they do when typed.
#[cfg(windows)]
pub fn shell_command(command_line: &str) -> Command {
    use std::os::windows::process::CommandExt;

    let mut command = Command::new("cmd");
    command.arg("/S").arg("/C").raw_arg(format!("\"{command_line}\""));
    command
}

/// A command that runs `command_line` through the platform shell (`cmd /C` on Windows,
/// `sh -c` elsewhere), so quoting and builtins behave as they do when typed.
#[cfg(not(windows))]
pub fn shell_command(command_line: &str) -> Command {
    let mut command = Command::new("sh");
    command.arg("-c").arg(command_line);
    command
}

/// Escapes text for a `cmd.exe` `echo` line.
pub fn escape_for_cmd(value: &str) -> String {
    value
        .replace('^', "^^")
        .replace('%', "%%")
        .replace('&', "^&")
        .replace('<', "^<")
        .replace('>', "^>")
        .replace('|', "^|")
}

fn escape_for_posix(value: &str) -> String {
    value.replace('\'', "'\\''")
}

/// Builds the script shown in the credential registration terminal: the instructions,
/// a blank line, then `"<mpiexec>" -register`.
pub fn build_registration_script(mpiexec: &str, instructions: &[String], is_windows: bool) -> String {
    let mut script = String::new();
    if is_windows {
        script.push_str("@echo off\n");
    }

    for line in instructions {
        if is_windows {
            script.push_str(&format!("echo {}\n", escape_for_cmd(line)));
        } else {
            script.push_str(&format!("echo '{}'\n", escape_for_posix(line)));
        }
    }
    script.push_str(if is_windows { "echo.\n" } else { "echo ''\n" });
    script.push_str(&format!("{} -register\n", wrap_value(mpiexec)));
    script
}

/// Writes `content` to a temporary script (`.bat` on Windows, `.sh` elsewhere).
/// The file is removed when the returned path is dropped.
pub fn write_temp_script(content: &str, is_windows: bool) -> io::Result<TempPath> {
    let suffix = if is_windows { ".bat" } else { ".sh" };
    let mut file = Builder::new()
        .prefix("opensees-register-")
        .suffix(suffix)
        .tempfile()?;
    file.write_all(content.as_bytes())?;
    file.flush()?;
    let path = file.into_temp_path();
    log::debug!("Temporary script created at: {}", path.display());
    Ok(path)
}

/// Runs a script in its own terminal window and waits for the window to close.
#[cfg(windows)]
pub fn interactive_script_command(script: &Path, title: &str) -> Command {
    use std::os::windows::process::CommandExt;

    let mut command = Command::new("cmd");
    command.arg("/C").raw_arg(format!(
        "start {} /wait cmd /c {}",
        wrap_value(title),
        wrap_value(&script.display().to_string())
    ));
    command
}

/// Runs a script in the current terminal and waits for it.
#[cfg(not(windows))]
pub fn interactive_script_command(script: &Path, _title: &str) -> Command {
    let mut command = Command::new("sh");
    command.arg(script);
    command
}
