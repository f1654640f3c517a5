// pgdump-provision/src/toolchain/reconcile.rs
use std::cmp::Ordering;
use std::path::PathBuf;
use tracing::{info, warn};

use super::download::InstallerFetcher;
use super::installer::UnattendedInstaller;
use super::probe::ToolchainProbe;
use super::remote::ReleaseSource;
use super::{ToolchainLayout, compare_versions};
use crate::errors::{AppError, Result};

/// How the client toolchain for this run was obtained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// The locally installed toolchain is new enough.
    ReuseLocal(String),
    /// The current published release was installed.
    Installed(String),
}

impl ReconcileOutcome {
    pub fn major(&self) -> &str {
        match self {
            ReconcileOutcome::ReuseLocal(major) | ReconcileOutcome::Installed(major) => major,
        }
    }
}

pub struct InstallationReconciler {
    probe: Box<dyn ToolchainProbe>,
    releases: Box<dyn ReleaseSource>,
    fetcher: Box<dyn InstallerFetcher>,
    installer: Box<dyn UnattendedInstaller>,
    layout: ToolchainLayout,
    installers_dir: PathBuf,
}

impl InstallationReconciler {
    pub fn new(
        probe: Box<dyn ToolchainProbe>,
        releases: Box<dyn ReleaseSource>,
        fetcher: Box<dyn InstallerFetcher>,
        installer: Box<dyn UnattendedInstaller>,
        layout: ToolchainLayout,
        installers_dir: impl Into<PathBuf>,
    ) -> Self {
        InstallationReconciler {
            probe,
            releases,
            fetcher,
            installer,
            layout,
            installers_dir: installers_dir.into(),
        }
    }

    /// Makes sure a client toolchain at least as new as `required_major_minor`
    /// is available and returns which major version to use.
    pub async fn reconcile(&self, required_major_minor: &str) -> Result<ReconcileOutcome> {
        let local = match self.probe.probe_installed().await {
            Ok(version) => version,
            Err(AppError::NotInstalled(reason)) => {
                info!(%reason, "no local PostgreSQL client, installing current release");
                return self.install_current_release().await;
            }
            Err(AppError::UnparseableOutput(output)) => {
                warn!(%output, "local PostgreSQL client reports no usable version, installing current release");
                return self.install_current_release().await;
            }
            Err(other) => return Err(other),
        };

        match compare_versions(local.major_minor(), required_major_minor)? {
            Ordering::Less => {
                info!(
                    local = %local.major_minor(),
                    required = %required_major_minor,
                    "local PostgreSQL client is older than the server, installing current release"
                );
                self.install_current_release().await
            }
            Ordering::Equal | Ordering::Greater => {
                info!(
                    local = %local.major_minor(),
                    required = %required_major_minor,
                    "reusing local PostgreSQL client"
                );
                Ok(ReconcileOutcome::ReuseLocal(local.major().to_string()))
            }
        }
    }

    async fn install_current_release(&self) -> Result<ReconcileOutcome> {
        let release = self.releases.fetch_current_release().await?;
        let url = release
            .download_url()
            .ok_or_else(|| AppError::LinkNotFound(release.major_minor().to_string()))?;

        let installer_path = self.fetcher.download(url, &self.installers_dir).await?;
        let target_dir = self.layout.install_dir(release.major());
        self.installer
            .install_unattended(&installer_path, &target_dir)
            .await?;

        info!(version = %release.major_minor(), target = %target_dir.display(), "PostgreSQL installed");
        Ok(ReconcileOutcome::Installed(release.major().to_string()))
    }
}
