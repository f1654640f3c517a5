mod logic;
pub(crate) mod db_dump;

use std::path::PathBuf;
use std::sync::Arc;

use crate::config::AppConfig;
use crate::config::credentials::DatabaseCredentials;
use crate::errors::Result;
use crate::toolchain::ToolchainLayout;

pub use logic::BackupOrchestrator;

/// Public entry point for the backup process: one `pg_dump` per configured
/// schema, using the client toolchain of `toolchain_major`.
pub async fn run_backup_flow(
    app_config: &AppConfig,
    creds: Arc<DatabaseCredentials>,
    toolchain_major: &str,
) -> Result<Vec<PathBuf>> {
    let orchestrator = BackupOrchestrator::new(
        &app_config.backup_dir,
        ToolchainLayout::new(&app_config.install_root),
        Arc::new(db_dump::PgDumpRunner),
    );
    orchestrator
        .run_all(creds, toolchain_major, &app_config.schemas)
        .await
}
