use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Invalid version format: {0}")]
    InvalidFormat(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("No current release found in feed: {0}")]
    NoCurrentRelease(String),

    #[error("Installer link not found for version {0}")]
    LinkNotFound(String),

    #[error("PostgreSQL client tools are not installed: {0}")]
    NotInstalled(String),

    #[error("Could not parse a version from output: {0}")]
    UnparseableOutput(String),

    #[error("Installer download failed: {0}")]
    Download(String),

    #[error("Unattended install failed: {0}")]
    Install(String),

    #[error("Privilege elevation failed: {0}")]
    Elevation(String),

    #[error("System PATH update failed: {0}")]
    PathUpdate(String),

    #[error("Database connection error: {0}")]
    Connection(String),

    #[error("Backup of schema '{schema}' failed: {reason}")]
    Backup { schema: String, reason: String },

    #[error("Credential input error: {0}")]
    Credentials(String),
}

impl AppError {
    pub fn backup(schema: impl Into<String>, reason: impl Into<String>) -> Self {
        AppError::Backup {
            schema: schema.into(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
