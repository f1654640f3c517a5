// pgdump-provision/src/elevation/platform.rs
use std::process::Command;
use tracing::debug;

use super::MachinePlatform;
use crate::errors::{AppError, Result};

#[cfg(windows)]
pub type SystemPlatform = WindowsPlatform;
#[cfg(not(windows))]
pub type SystemPlatform = UnixPlatform;

#[cfg(windows)]
pub fn system_platform() -> SystemPlatform {
    WindowsPlatform
}

#[cfg(not(windows))]
pub fn system_platform() -> SystemPlatform {
    UnixPlatform::new(DEFAULT_ENVIRONMENT_FILE)
}

fn current_executable() -> Result<std::path::PathBuf> {
    std::env::current_exe()
        .map_err(|e| AppError::Elevation(format!("cannot locate own executable: {}", e)))
}

/// UAC elevation through PowerShell and the `Machine` environment scope.
#[cfg(windows)]
pub struct WindowsPlatform;

#[cfg(windows)]
impl WindowsPlatform {
    const CREATE_NO_WINDOW: u32 = 0x0800_0000;

    fn powershell(script: &str) -> std::io::Result<std::process::Output> {
        use std::os::windows::process::CommandExt;

        Command::new("powershell")
            .arg("-NoProfile")
            .arg("-NonInteractive")
            .arg("-Command")
            .arg(script)
            .creation_flags(Self::CREATE_NO_WINDOW)
            .output()
    }
}

// Quotes one argument for the Windows command line: backslashes are doubled
// only where they precede a quote, including the closing one.
#[cfg_attr(not(windows), allow(dead_code))]
fn windows_arg_quote(value: &str) -> String {
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('"');
    let mut backslashes = 0usize;
    for c in value.chars() {
        match c {
            '\\' => backslashes += 1,
            '"' => {
                quoted.push_str(&"\\".repeat(backslashes * 2 + 1));
                quoted.push('"');
                backslashes = 0;
            }
            _ => {
                quoted.push_str(&"\\".repeat(backslashes));
                quoted.push(c);
                backslashes = 0;
            }
        }
    }
    quoted.push_str(&"\\".repeat(backslashes * 2));
    quoted.push('"');
    quoted
}

// Single-quoted PowerShell literal.
#[cfg_attr(not(windows), allow(dead_code))]
fn ps_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

#[cfg(windows)]
impl MachinePlatform for WindowsPlatform {
    fn is_elevated(&self) -> bool {
        std::fs::File::open(r"\\.\PHYSICALDRIVE0").is_ok()
    }

    fn relaunch_elevated(&self, args: &[String]) -> Result<()> {
        let exe = current_executable()?;
        let mut script = format!(
            "Start-Process -FilePath {} -Verb RunAs",
            ps_quote(&exe.to_string_lossy())
        );
        if !args.is_empty() {
            let quoted: Vec<String> = args
                .iter()
                .map(|a| ps_quote(&windows_arg_quote(a)))
                .collect();
            script.push_str(" -ArgumentList ");
            script.push_str(&quoted.join(","));
        }
        debug!(%script, "starting elevated copy");

        let output = Self::powershell(&script)
            .map_err(|e| AppError::Elevation(format!("failed to run powershell: {}", e)))?;
        if !output.status.success() {
            return Err(AppError::Elevation(format!(
                "Start-Process -Verb RunAs failed with status: {}\nStderr: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr)
            )));
        }
        Ok(())
    }

    fn read_machine_path(&self) -> Result<String> {
        let output = Self::powershell("[Environment]::GetEnvironmentVariable('Path', 'Machine')")
            .map_err(|e| AppError::PathUpdate(format!("failed to run powershell: {}", e)))?;
        if !output.status.success() {
            return Err(AppError::PathUpdate(format!(
                "reading machine PATH failed with status: {}\nStderr: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr)
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    fn write_machine_path(&self, value: &str) -> Result<()> {
        let script = format!(
            "[Environment]::SetEnvironmentVariable('Path', {}, 'Machine')",
            ps_quote(value)
        );
        let output = Self::powershell(&script)
            .map_err(|e| AppError::PathUpdate(format!("failed to run powershell: {}", e)))?;
        if !output.status.success() {
            return Err(AppError::PathUpdate(format!(
                "writing machine PATH failed with status: {}\nStderr: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr)
            )));
        }
        Ok(())
    }

    fn path_separator(&self) -> char {
        ';'
    }

    fn case_insensitive_paths(&self) -> bool {
        true
    }
}

#[cfg(not(windows))]
pub const DEFAULT_ENVIRONMENT_FILE: &str = "/etc/environment";

// Used when the environment file has no PATH line of its own.
#[cfg(not(windows))]
const FALLBACK_SYSTEM_PATH: &str = "/usr/local/sbin:/usr/local/bin:/usr/sbin:/usr/bin:/sbin:/bin";

/// `sudo` relaunch; the machine `PATH` is the `PATH=` line of a
/// pam_env-style environment file.
#[cfg(not(windows))]
pub struct UnixPlatform {
    environment_file: std::path::PathBuf,
    sudo_program: std::path::PathBuf,
}

#[cfg(not(windows))]
impl UnixPlatform {
    pub fn new(environment_file: impl Into<std::path::PathBuf>) -> Self {
        UnixPlatform {
            environment_file: environment_file.into(),
            sudo_program: "sudo".into(),
        }
    }

    pub fn with_sudo_program(mut self, program: impl Into<std::path::PathBuf>) -> Self {
        self.sudo_program = program.into();
        self
    }

    fn read_environment_file(&self) -> Result<String> {
        match std::fs::read_to_string(&self.environment_file) {
            Ok(content) => Ok(content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(String::new()),
            Err(e) => Err(AppError::PathUpdate(format!(
                "failed to read {}: {}",
                self.environment_file.display(),
                e
            ))),
        }
    }
}

#[cfg(not(windows))]
fn path_line_value(line: &str) -> Option<&str> {
    let value = line.trim().strip_prefix("PATH=")?;
    Some(value.trim_matches('"'))
}

#[cfg(not(windows))]
impl MachinePlatform for UnixPlatform {
    fn is_elevated(&self) -> bool {
        std::fs::File::open("/etc/shadow").is_ok()
    }

    fn relaunch_elevated(&self, args: &[String]) -> Result<()> {
        let exe = current_executable()?;
        debug!(exe = %exe.display(), ?args, "starting elevated copy through sudo");

        // sudo waits for the elevated copy, so its status is the outcome of
        // the whole remaining run.
        let status = Command::new(&self.sudo_program)
            .arg("--")
            .arg(&exe)
            .args(args)
            .status()
            .map_err(|e| {
                AppError::Elevation(format!(
                    "failed to run {}: {}",
                    self.sudo_program.display(),
                    e
                ))
            })?;
        if !status.success() {
            return Err(AppError::Elevation(format!(
                "elevated copy exited with status: {}",
                status
            )));
        }
        Ok(())
    }

    fn read_machine_path(&self) -> Result<String> {
        let content = self.read_environment_file()?;
        Ok(content
            .lines()
            .find_map(path_line_value)
            .unwrap_or(FALLBACK_SYSTEM_PATH)
            .to_string())
    }

    fn write_machine_path(&self, value: &str) -> Result<()> {
        let content = self.read_environment_file()?;
        let new_line = format!("PATH=\"{}\"", value);
        let mut replaced = false;
        let mut lines: Vec<String> = content
            .lines()
            .map(|line| {
                if !replaced && path_line_value(line).is_some() {
                    replaced = true;
                    new_line.clone()
                } else {
                    line.to_string()
                }
            })
            .collect();
        if !replaced {
            lines.push(new_line);
        }

        let mut updated = lines.join("\n");
        updated.push('\n');
        std::fs::write(&self.environment_file, updated).map_err(|e| {
            AppError::PathUpdate(format!(
                "failed to write {}: {}",
                self.environment_file.display(),
                e
            ))
        })
    }

    fn path_separator(&self) -> char {
        ':'
    }

    fn case_insensitive_paths(&self) -> bool {
        false
    }
}
