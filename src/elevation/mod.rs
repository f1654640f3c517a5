//! Machine-wide `PATH` registration behind an elevate-or-relaunch gate.
//!
//! A process that is not elevated never touches the machine `PATH`: it asks
//! the platform to start an elevated copy of itself carrying
//! [`ELEVATED_MARKER`] and then stops. The elevated copy performs the update.
pub(crate) mod platform;

use std::path::Path;
use tracing::info;

use crate::errors::{AppError, Result};

/// Command-line flag identifying a process started by an elevation request.
pub const ELEVATED_MARKER: &str = "--elevated";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElevationState {
    NotElevated,
    Elevated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElevationOutcome {
    /// An elevated copy was started. The current process must do no further
    /// work and exit.
    RelaunchInitiated,
    PathUpdated,
    PathAlreadyPresent,
}

/// The OS-facing operations the manager needs. Kept narrow so the machine
/// `PATH` is only ever reached through a read-modify-write here.
pub trait MachinePlatform: Send + Sync {
    /// Non-destructive probe of a resource only an administrator can open.
    fn is_elevated(&self) -> bool;

    fn relaunch_elevated(&self, args: &[String]) -> Result<()>;

    fn read_machine_path(&self) -> Result<String>;

    fn write_machine_path(&self, value: &str) -> Result<()>;

    fn path_separator(&self) -> char;

    fn case_insensitive_paths(&self) -> bool;
}

pub struct PathElevationManager<P: MachinePlatform> {
    platform: P,
    relaunched: bool,
}

impl<P: MachinePlatform> PathElevationManager<P> {
    /// `relaunched` is whether this process was started with [`ELEVATED_MARKER`].
    pub fn new(platform: P, relaunched: bool) -> Self {
        PathElevationManager {
            platform,
            relaunched,
        }
    }

    pub fn detect_elevation(&self) -> ElevationState {
        if self.platform.is_elevated() {
            ElevationState::Elevated
        } else {
            ElevationState::NotElevated
        }
    }

    /// Ensures `bin_dir` is on the machine `PATH`, relaunching elevated with
    /// `relaunch_args` (plus the marker) when this process lacks the rights.
    pub fn ensure_on_path(&self, bin_dir: &Path, relaunch_args: &[String]) -> Result<ElevationOutcome> {
        match (self.detect_elevation(), self.relaunched) {
            (ElevationState::NotElevated, false) => {
                let mut args = relaunch_args.to_vec();
                if !args.iter().any(|a| a == ELEVATED_MARKER) {
                    args.push(ELEVATED_MARKER.to_string());
                }
                info!(bin_dir = %bin_dir.display(), "requesting administrator rights to update system PATH");
                self.platform.relaunch_elevated(&args)?;
                Ok(ElevationOutcome::RelaunchInitiated)
            }
            (ElevationState::NotElevated, true) => Err(AppError::Elevation(
                "relaunched with elevation marker but still lacking administrator rights".into(),
            )),
            (ElevationState::Elevated, _) => self.register_bin_dir(bin_dir),
        }
    }

    fn register_bin_dir(&self, bin_dir: &Path) -> Result<ElevationOutcome> {
        let entry = bin_dir.to_string_lossy();
        let current = self.platform.read_machine_path()?;
        let separator = self.platform.path_separator();
        let case_insensitive = self.platform.case_insensitive_paths();

        if path_contains_entry(&current, &entry, separator, case_insensitive) {
            info!(bin_dir = %entry, "system PATH already contains PostgreSQL bin directory");
            return Ok(ElevationOutcome::PathAlreadyPresent);
        }

        let updated = append_path_entry(&current, &entry, separator);
        self.platform.write_machine_path(&updated)?;
        info!(bin_dir = %entry, "added PostgreSQL bin directory to system PATH");
        Ok(ElevationOutcome::PathUpdated)
    }
}

fn normalize_entry(entry: &str, case_insensitive: bool) -> String {
    let trimmed = entry.trim().trim_matches('"').trim_end_matches(['\\', '/']);
    if case_insensitive {
        trimmed.to_lowercase()
    } else {
        trimmed.to_string()
    }
}

/// Whole-entry match; ignores surrounding quotes, trailing separators and,
/// where the platform says so, case.
pub fn path_contains_entry(path: &str, entry: &str, separator: char, case_insensitive: bool) -> bool {
    let wanted = normalize_entry(entry, case_insensitive);
    path.split(separator)
        .any(|existing| normalize_entry(existing, case_insensitive) == wanted)
}

/// Appends `entry`, leaving every existing entry untouched and in order.
pub fn append_path_entry(path: &str, entry: &str, separator: char) -> String {
    if path.trim().is_empty() {
        return entry.to_string();
    }
    if path.ends_with(separator) {
        format!("{}{}", path, entry)
    } else {
        format!("{}{}{}", path, separator, entry)
    }
}
