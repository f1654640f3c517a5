// Server connection and version query
use secrecy::ExposeSecret;
use sqlx::postgres::PgConnectOptions;
use sqlx::{Connection, PgConnection};
use std::str::FromStr;
use tracing::info;

use crate::config::credentials::DatabaseCredentials;
use crate::errors::{AppError, Result};
use crate::toolchain::PostgresqlVersionInfo;

/// A connection URL is handed to the driver as-is so its parameters
/// (`sslmode`, `options`, ...) apply; otherwise the discrete fields are used.
pub fn connect_options(creds: &DatabaseCredentials) -> Result<PgConnectOptions> {
    if let Some(url) = creds.url.as_ref() {
        let options = PgConnectOptions::from_str(url.expose_secret())
            .map_err(|e| AppError::Credentials(format!("invalid connection URL: {}", e)))?;
        let password = creds.password.expose_secret();
        if password.is_empty() {
            return Ok(options);
        }
        return Ok(options.password(password));
    }

    Ok(PgConnectOptions::new()
        .host(&creds.host)
        .port(creds.port_number()?)
        .username(&creds.username)
        .password(creds.password.expose_secret())
        .database(&creds.database))
}

/// Opens a single connection using already-resolved credentials.
pub async fn check_db_connection(creds: &DatabaseCredentials) -> Result<PgConnection> {
    let options = connect_options(creds)?;
    let conn = PgConnection::connect_with(&options).await.map_err(|e| {
        AppError::Connection(format!(
            "failed to connect to {}:{}/{}: {}",
            creds.host, creds.port, creds.database, e
        ))
    })?;
    info!(host = %creds.host, port = %creds.port, database = %creds.database, "database connection successful");
    Ok(conn)
}

/// Runs `SHOW server_version` and keeps its leading `major.minor`.
pub async fn fetch_server_version(conn: &mut PgConnection) -> Result<PostgresqlVersionInfo> {
    let raw: String = sqlx::query_scalar("SHOW server_version")
        .fetch_one(conn)
        .await
        .map_err(|e| AppError::Connection(format!("error querying server version: {}", e)))?;
    let version = parse_server_version(&raw)?;
    info!(server_version = %raw, required = %version.major_minor(), "server version detected");
    Ok(version)
}

pub fn parse_server_version(raw: &str) -> Result<PostgresqlVersionInfo> {
    PostgresqlVersionInfo::parse_first(raw)
        .ok_or_else(|| AppError::UnparseableOutput(format!("server_version '{}'", raw)))
}
