//! PostgreSQL client provisioning and schema backup tool
//!
//! Matches the local `psql`/`pg_dump` toolchain to the server version,
//! installs the current release when needed, registers it on the system PATH
//! (elevating if required) and dumps each configured schema concurrently.

// pgdump-provision/src/main.rs
mod backup;
mod config;
mod elevation;
mod errors;
mod toolchain;
mod utils;

use anyhow::{Context, Result};
use clap::Parser;
use std::env;
use std::io::{stdin, stdout};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use config::credentials::DatabaseCredentials;
use config::{AppConfig, DEFAULT_CONFIG_FILE};
use elevation::platform::system_platform;
use elevation::{ElevationOutcome, PathElevationManager};
use toolchain::ToolchainLayout;
use toolchain::download::HttpInstallerFetcher;
use toolchain::installer::EdbInstaller;
use toolchain::probe::PsqlProbe;
use toolchain::reconcile::InstallationReconciler;
use toolchain::remote::HttpReleaseSource;
use utils::setting::{check_db_connection, fetch_server_version};

#[derive(Parser, Debug, Clone)]
#[command(
    name = "pgdump-provision",
    version,
    about = "Provision matching PostgreSQL client tools and back up schemas with pg_dump"
)]
struct Cli {
    /// Path to the JSON configuration file.
    #[arg(long, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Schema to back up; repeat for several. Overrides `schemas` in the config file.
    #[arg(long = "schema", value_name = "SCHEMA")]
    schemas: Vec<String>,

    /// Set on the copy started by an elevation request.
    #[arg(long, hide = true)]
    elevated: bool,

    /// Toolchain major version already resolved by the process that requested elevation.
    #[arg(long, hide = true, value_name = "MAJOR")]
    resume_toolchain: Option<String>,

    /// Working directory to restore in the elevated copy.
    #[arg(long, hide = true, value_name = "DIR")]
    workdir: Option<PathBuf>,
}

enum RunOutcome {
    Completed(usize),
    HandedOff,
}

/// Main entry point for the provisioning/backup tool
#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run_app(cli).await {
        Ok(RunOutcome::Completed(files)) => {
            println!("✅ Backup completed successfully ({} schema dump(s) written).", files);
            ExitCode::SUCCESS
        }
        Ok(RunOutcome::HandedOff) => {
            println!("↗ Work handed off to the elevated process.");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %format!("{:#}", e), "run failed");
            eprintln!("❌ Error: {:?}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run_app(cli: Cli) -> Result<RunOutcome> {
    if let Some(dir) = &cli.workdir {
        env::set_current_dir(dir)
            .with_context(|| format!("Failed to switch to working directory {}", dir.display()))?;
    }
    dotenv::dotenv().ok();

    let mut app_config = AppConfig::load(&cli.config).with_context(|| {
        format!(
            "Failed to load application configuration from {}",
            cli.config.display()
        )
    })?;
    app_config
        .override_schemas(cli.schemas.clone())
        .context("Invalid --schema argument")?;
    init_tracing(&app_config.log_level);

    let creds = acquire_credentials().context("Failed to read database credentials")?;

    let mut conn = check_db_connection(&creds)
        .await
        .context("Database connection failed")?;
    let server_version = fetch_server_version(&mut conn)
        .await
        .context("Failed to determine server version")?;
    if let Err(e) = sqlx::Connection::close(conn).await {
        tracing::debug!(error = %e, "closing version-probe connection failed");
    }

    let layout = ToolchainLayout::new(&app_config.install_root);
    let major = match (&cli.resume_toolchain, cli.elevated) {
        (Some(major), true) => {
            info!(major = %major, "resuming with toolchain resolved before elevation");
            major.clone()
        }
        _ => {
            let reconciler = build_reconciler(&app_config, layout.clone())?;
            let outcome = reconciler
                .reconcile(server_version.major_minor())
                .await
                .context("Failed to provision PostgreSQL client tools")?;
            outcome.major().to_string()
        }
    };

    let bin_dir = layout.bin_dir(&major);
    let manager = PathElevationManager::new(system_platform(), cli.elevated);
    let relaunch_args = relaunch_args(&cli, &major)?;
    // Relaunching may wait on the elevated copy (sudo), so keep it off the
    // async worker.
    let outcome = tokio::task::block_in_place(|| manager.ensure_on_path(&bin_dir, &relaunch_args))
        .context("Failed to add PostgreSQL to the system PATH")?;
    if outcome == ElevationOutcome::RelaunchInitiated {
        info!("elevated process started, stopping here");
        return Ok(RunOutcome::HandedOff);
    }

    println!("🚀 Starting Backup Process...");
    let written = backup::run_backup_flow(&app_config, Arc::new(creds), &major)
        .await
        .context("Backup process failed")?;
    Ok(RunOutcome::Completed(written.len()))
}

fn init_tracing(default_level: &str) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_level(true)
                .with_target(false),
        )
        .try_init();
}

/// Environment first (after `.env`), then an interactive prompt for whatever
/// is still missing.
fn acquire_credentials() -> Result<DatabaseCredentials> {
    let mut creds = DatabaseCredentials::from_env();
    if !creds.is_complete() {
        println!("Database credentials incomplete in environment, please enter them:");
        creds.prompt_missing(&mut stdin().lock(), &mut stdout())?;
    }
    Ok(creds.resolved()?)
}

fn build_reconciler(app_config: &AppConfig, layout: ToolchainLayout) -> Result<InstallationReconciler> {
    let client = reqwest::Client::builder()
        .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("Failed to build HTTP client")?;

    Ok(InstallationReconciler::new(
        Box::new(PsqlProbe::new()),
        Box::new(HttpReleaseSource::new(
            client.clone(),
            &app_config.versions_feed_url,
            &app_config.downloads_page_url,
        )),
        Box::new(HttpInstallerFetcher::new(client)),
        Box::new(EdbInstaller),
        layout,
        &app_config.installers_dir,
    ))
}

/// Arguments for the elevated copy: same config and schemas, the resolved
/// toolchain, and this working directory.
fn relaunch_args(cli: &Cli, major: &str) -> Result<Vec<String>> {
    let cwd = env::current_dir().context("Failed to read current directory")?;
    let mut args = vec![
        "--config".to_string(),
        cli.config.to_string_lossy().into_owned(),
        "--workdir".to_string(),
        cwd.to_string_lossy().into_owned(),
        "--resume-toolchain".to_string(),
        major.to_string(),
    ];
    for schema in &cli.schemas {
        args.push("--schema".to_string());
        args.push(schema.clone());
    }
    Ok(args)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_recognises_relaunch_marker() {
        let cli = Cli::parse_from([
            "pgdump-provision",
            "--elevated",
            "--resume-toolchain",
            "17",
            "--schema",
            "public",
            "--schema",
            "dblog",
        ]);
        assert!(cli.elevated);
        assert_eq!(cli.resume_toolchain.as_deref(), Some("17"));
        assert_eq!(cli.schemas, vec!["public".to_string(), "dblog".to_string()]);
    }

    #[test]
    fn test_relaunch_args_round_trip_through_cli() -> anyhow::Result<()> {
        let cli = Cli::parse_from(["pgdump-provision", "--schema", "audit"]);
        let mut args = vec!["pgdump-provision".to_string()];
        args.extend(relaunch_args(&cli, "16")?);
        args.push(elevation::ELEVATED_MARKER.to_string());

        let relaunched = Cli::parse_from(args);
        assert!(relaunched.elevated);
        assert_eq!(relaunched.resume_toolchain.as_deref(), Some("16"));
        assert_eq!(relaunched.schemas, vec!["audit".to_string()]);
        assert_eq!(relaunched.config, PathBuf::from(DEFAULT_CONFIG_FILE));
        assert!(relaunched.workdir.is_some());
        Ok(())
    }
}
