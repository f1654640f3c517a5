// pgdump-provision/src/toolchain/probe.rs
use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info};
use which::which;

use super::PostgresqlVersionInfo;
use crate::errors::{AppError, Result};

/// Reports which client toolchain version, if any, is reachable locally.
#[async_trait]
pub trait ToolchainProbe: Send + Sync {
    async fn probe_installed(&self) -> Result<PostgresqlVersionInfo>;
}

/// Extracts the first `<int>.<int>` from `psql --version` style output.
pub fn parse_client_version(output: &str) -> Result<PostgresqlVersionInfo> {
    PostgresqlVersionInfo::parse_first(output)
        .ok_or_else(|| AppError::UnparseableOutput(output.trim().to_string()))
}

/// Probes the `psql` found on `PATH`.
pub struct PsqlProbe {
    program: String,
}

impl PsqlProbe {
    pub fn new() -> Self {
        PsqlProbe::with_program("psql")
    }

    pub fn with_program(program: impl Into<String>) -> Self {
        PsqlProbe {
            program: program.into(),
        }
    }
}

#[async_trait]
impl ToolchainProbe for PsqlProbe {
    async fn probe_installed(&self) -> Result<PostgresqlVersionInfo> {
        let psql_path = which(&self.program).map_err(|e| {
            AppError::NotInstalled(format!("{} not found in PATH: {}", self.program, e))
        })?;
        debug!(path = %psql_path.display(), "found local psql");

        let output = Command::new(&psql_path)
            .arg("--version")
            .output()
            .await
            .map_err(|e| {
                AppError::NotInstalled(format!(
                    "failed to execute {}: {}",
                    psql_path.display(),
                    e
                ))
            })?;

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));

        let version = parse_client_version(&combined)?;
        info!(
            major = %version.major(),
            minor = %version.minor_or_patch(),
            path = %psql_path.display(),
            "local PostgreSQL client detected"
        );
        Ok(version)
    }
}
