pub mod setting;

use std::path::{Path, PathBuf};
use tracing::warn;
use which::which;

use crate::errors::{AppError, Result};

/// Finds `pg_dump` in the toolchain's `bin` directory, falling back to `PATH`
/// for client tools installed outside the managed install root.
pub fn find_pg_dump_executable(bin_dir: &Path) -> Result<PathBuf> {
    let candidate = bin_dir.join(format!("pg_dump{}", std::env::consts::EXE_SUFFIX));
    if candidate.is_file() {
        return Ok(candidate);
    }
    let on_path = which("pg_dump").map_err(|e| {
        AppError::NotInstalled(format!(
            "pg_dump not found in {} or PATH: {}",
            bin_dir.display(),
            e
        ))
    })?;
    warn!(
        expected = %candidate.display(),
        using = %on_path.display(),
        "pg_dump not in toolchain bin directory, using the one on PATH"
    );
    Ok(on_path)
}
