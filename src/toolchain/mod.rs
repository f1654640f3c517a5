// pgdump-provision/src/toolchain/mod.rs
pub(crate) mod download;
pub(crate) mod installer;
pub(crate) mod probe;
pub(crate) mod reconcile;
pub(crate) mod remote;

use regex::Regex;
use std::cmp::Ordering;
use std::path::PathBuf;
use std::sync::OnceLock;

use crate::errors::{AppError, Result};

/// A PostgreSQL `major.minor` pair as reported by a server, the local client
/// tools, or the published release feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostgresqlVersionInfo {
    major_minor: String,
    major: String,
    minor_or_patch: String,
    download_url: Option<String>,
}

impl PostgresqlVersionInfo {
    pub fn new(major: impl Into<String>, minor_or_patch: impl Into<String>) -> Self {
        let major = major.into();
        let minor_or_patch = minor_or_patch.into();
        PostgresqlVersionInfo {
            major_minor: format!("{}.{}", major, minor_or_patch),
            major,
            minor_or_patch,
            download_url: None,
        }
    }

    pub fn with_download_url(mut self, url: impl Into<String>) -> Self {
        self.download_url = Some(url.into());
        self
    }

    /// Builds a version from the first `<int>.<int>` found anywhere in `text`.
    pub fn parse_first(text: &str) -> Option<Self> {
        let caps = version_pattern().captures(text)?;
        Some(PostgresqlVersionInfo::new(&caps[1], &caps[2]))
    }

    pub fn major_minor(&self) -> &str {
        &self.major_minor
    }

    pub fn major(&self) -> &str {
        &self.major
    }

    pub fn minor_or_patch(&self) -> &str {
        &self.minor_or_patch
    }

    pub fn download_url(&self) -> Option<&str> {
        self.download_url.as_deref()
    }
}

fn version_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(\d+)\.(\d+)").expect("static version regex"))
}

/// Compares two `major.minor` strings numerically, major first.
pub fn compare_versions(v1: &str, v2: &str) -> Result<Ordering> {
    let left = split_major_minor(v1)?;
    let right = split_major_minor(v2)?;
    Ok(left.cmp(&right))
}

fn split_major_minor(version: &str) -> Result<(u64, u64)> {
    let parts: Vec<&str> = version.split('.').collect();
    if parts.len() != 2 {
        return Err(AppError::InvalidFormat(format!(
            "expected <major>.<minor>, got '{}'",
            version
        )));
    }
    let parse = |part: &str| {
        part.parse::<u64>().map_err(|e| {
            AppError::InvalidFormat(format!("'{}' in '{}': {}", part, version, e))
        })
    };
    Ok((parse(parts[0])?, parse(parts[1])?))
}

/// Where versioned client toolchains live on this machine.
#[derive(Debug, Clone)]
pub struct ToolchainLayout {
    install_root: PathBuf,
}

impl ToolchainLayout {
    pub fn new(install_root: impl Into<PathBuf>) -> Self {
        ToolchainLayout {
            install_root: install_root.into(),
        }
    }

    pub fn install_dir(&self, major: &str) -> PathBuf {
        self.install_root.join(major)
    }

    pub fn bin_dir(&self, major: &str) -> PathBuf {
        self.install_dir(major).join("bin")
    }
}

#[cfg(windows)]
pub const DEFAULT_INSTALL_ROOT: &str = "C:\\Program Files\\PostgreSQL";
#[cfg(not(windows))]
pub const DEFAULT_INSTALL_ROOT: &str = "/opt/postgresql";
