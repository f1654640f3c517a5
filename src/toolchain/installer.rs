// pgdump-provision/src/toolchain/installer.rs
use async_trait::async_trait;
use std::path::Path;
use tokio::process::Command;
use tracing::{info, warn};

use crate::errors::{AppError, Result};

/// Runs a downloaded installer without user interaction.
///
/// Single attempt only: a failed run leaves installer-defined partial state in
/// `target_dir` and the installer file in place for inspection.
#[async_trait]
pub trait UnattendedInstaller: Send + Sync {
    async fn install_unattended(&self, installer_path: &Path, target_dir: &Path) -> Result<()>;
}

/// Drives EDB-style installers (`--mode unattended --prefix <dir>`).
pub struct EdbInstaller;

#[async_trait]
impl UnattendedInstaller for EdbInstaller {
    async fn install_unattended(&self, installer_path: &Path, target_dir: &Path) -> Result<()> {
        info!(
            installer = %installer_path.display(),
            target = %target_dir.display(),
            "running unattended PostgreSQL install"
        );

        let mut command = Command::new(installer_path);
        command
            .arg("--mode")
            .arg("unattended")
            .arg("--prefix")
            .arg(target_dir);
        #[cfg(windows)]
        {
            const CREATE_NO_WINDOW: u32 = 0x0800_0000;
            command.creation_flags(CREATE_NO_WINDOW);
        }

        let output = command.output().await.map_err(|e| {
            AppError::Install(format!(
                "failed to launch {}: {}",
                installer_path.display(),
                e
            ))
        })?;

        if !output.status.success() {
            warn!(installer = %installer_path.display(), "installer left in place for inspection");
            return Err(AppError::Install(format!(
                "{} exited with status: {}\nStdout: {}\nStderr: {}",
                installer_path.display(),
                output.status,
                String::from_utf8_lossy(&output.stdout),
                String::from_utf8_lossy(&output.stderr)
            )));
        }

        tokio::fs::remove_file(installer_path).await.map_err(|e| {
            AppError::Install(format!(
                "installed, but could not remove {}: {}",
                installer_path.display(),
                e
            ))
        })?;
        info!(target = %target_dir.display(), "PostgreSQL installed, installer removed");
        Ok(())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    // Links to system binaries rather than freshly written scripts, so no
    // test ever executes a file another thread may still hold open for writing.
    fn fake_installer(dir: &Path, succeeds: bool) -> anyhow::Result<std::path::PathBuf> {
        let path = dir.join("psql_installer.run");
        let target = which::which(if succeeds { "true" } else { "false" })?;
        std::os::unix::fs::symlink(target, &path)?;
        Ok(path)
    }

    #[tokio::test]
    async fn test_successful_install_removes_installer() -> anyhow::Result<()> {
        let scratch = tempfile::tempdir()?;
        let installer = fake_installer(scratch.path(), true)?;

        EdbInstaller
            .install_unattended(&installer, &scratch.path().join("17"))
            .await?;

        assert!(installer.symlink_metadata().is_err());
        Ok(())
    }

    #[tokio::test]
    async fn test_failed_install_keeps_installer() -> anyhow::Result<()> {
        let scratch = tempfile::tempdir()?;
        let installer = fake_installer(scratch.path(), false)?;

        let result = EdbInstaller
            .install_unattended(&installer, &scratch.path().join("17"))
            .await;

        assert!(matches!(result, Err(AppError::Install(_))));
        assert!(installer.symlink_metadata().is_ok());
        Ok(())
    }

    #[tokio::test]
    async fn test_missing_installer_cannot_launch() -> anyhow::Result<()> {
        let scratch = tempfile::tempdir()?;
        let result = EdbInstaller
            .install_unattended(&scratch.path().join("absent.run"), scratch.path())
            .await;
        assert!(matches!(result, Err(AppError::Install(_))));
        Ok(())
    }
}
