// pgdump-provision/src/backup/logic.rs
use chrono::Local;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{error, info};

use super::db_dump::{DumpJob, DumpRunner, backup_file_name, schema_dir};
use crate::config::credentials::DatabaseCredentials;
use crate::errors::{AppError, Result};
use crate::toolchain::ToolchainLayout;

/// Outcome of one schema's dump.
#[derive(Debug)]
pub struct BackupJobResult {
    pub schema: String,
    pub outcome: Result<PathBuf>,
}

pub struct BackupOrchestrator {
    backup_root: PathBuf,
    layout: ToolchainLayout,
    runner: Arc<dyn DumpRunner>,
}

impl BackupOrchestrator {
    pub fn new(backup_root: impl Into<PathBuf>, layout: ToolchainLayout, runner: Arc<dyn DumpRunner>) -> Self {
        BackupOrchestrator {
            backup_root: backup_root.into(),
            layout,
            runner,
        }
    }

    /// Dumps every schema concurrently and waits for all of them. Jobs never
    /// cancel each other; if any failed, the first failure to arrive is
    /// returned once the rest have finished.
    pub async fn run_all(
        &self,
        creds: Arc<DatabaseCredentials>,
        toolchain_major: &str,
        schemas: &[String],
    ) -> Result<Vec<PathBuf>> {
        if schemas.is_empty() {
            info!("no schemas configured, nothing to back up");
            return Ok(Vec::new());
        }

        let timestamp = Local::now().naive_local();
        let bin_dir = self.layout.bin_dir(toolchain_major);
        let (tx, mut rx) = mpsc::channel::<BackupJobResult>(schemas.len());
        let mut jobs = JoinSet::new();

        for schema in schemas {
            let job = DumpJob {
                schema: schema.clone(),
                bin_dir: bin_dir.clone(),
                output_file: schema_dir(&self.backup_root, schema).join(backup_file_name(
                    &creds.database,
                    &creds.host,
                    timestamp,
                )),
            };
            let runner = Arc::clone(&self.runner);
            let creds = Arc::clone(&creds);
            let tx = tx.clone();

            jobs.spawn(async move {
                let schema = job.schema.clone();
                let outcome = AssertUnwindSafe(run_job(runner.as_ref(), &creds, job))
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|_| Err(AppError::backup(&schema, "dump task panicked")));
                // Capacity equals the job count, so this never waits.
                let _ = tx.send(BackupJobResult { schema, outcome }).await;
            });
        }
        drop(tx);

        let mut lost_tasks = Vec::new();
        while let Some(joined) = jobs.join_next().await {
            if let Err(join_error) = joined {
                lost_tasks.push(AppError::backup("<unknown>", join_error.to_string()));
            }
        }

        let mut written = Vec::new();
        let mut first_failure: Option<AppError> = None;
        let mut failures = 0usize;
        while let Some(result) = rx.recv().await {
            match result.outcome {
                Ok(path) => {
                    info!(schema = %result.schema, file = %path.display(), "schema backup complete");
                    written.push(path);
                }
                Err(e) => {
                    error!(schema = %result.schema, error = %e, "schema backup failed");
                    failures += 1;
                    if first_failure.is_none() {
                        first_failure = Some(e);
                    }
                }
            }
        }
        for e in lost_tasks {
            error!(error = %e, "backup task did not report a result");
            failures += 1;
            if first_failure.is_none() {
                first_failure = Some(e);
            }
        }

        match first_failure {
            Some(e) => {
                error!(failed = failures, total = schemas.len(), "backup finished with failures");
                Err(e)
            }
            None => {
                info!(total = schemas.len(), "all schema backups complete");
                Ok(written)
            }
        }
    }
}

async fn run_job(runner: &dyn DumpRunner, creds: &DatabaseCredentials, job: DumpJob) -> Result<PathBuf> {
    if let Some(dir) = job.output_file.parent() {
        tokio::fs::create_dir_all(dir).await.map_err(|e| {
            AppError::backup(
                &job.schema,
                format!("failed to create backup directory {}: {}", dir.display(), e),
            )
        })?;
    }
    info!(schema = %job.schema, file = %job.output_file.display(), "starting schema backup");
    runner.dump(&job, creds).await?;
    Ok(job.output_file)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use secrecy::SecretString;
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::sync::Barrier;

    fn creds() -> Arc<DatabaseCredentials> {
        Arc::new(DatabaseCredentials {
            host: "db.example.com".into(),
            port: "5432".into(),
            username: "backup".into(),
            password: SecretString::from("s3cret"),
            database: "app".into(),
            url: None,
        })
    }

    /// Writes the output file for every job and fails the listed schemas. With
    /// a barrier set, no job gets past it until all of them are running.
    struct FakeRunner {
        failing: Vec<&'static str>,
        barrier: Option<Barrier>,
        slow: Option<&'static str>,
        attempts: Mutex<Vec<String>>,
    }

    impl FakeRunner {
        fn new(failing: Vec<&'static str>) -> Self {
            FakeRunner {
                failing,
                barrier: None,
                slow: None,
                attempts: Mutex::new(Vec::new()),
            }
        }

        fn attempts(&self) -> Vec<String> {
            let mut attempts = self.attempts.lock().unwrap().clone();
            attempts.sort();
            attempts
        }
    }

    #[async_trait]
    impl DumpRunner for FakeRunner {
        async fn dump(&self, job: &DumpJob, _creds: &DatabaseCredentials) -> Result<()> {
            if let Some(barrier) = &self.barrier {
                barrier.wait().await;
            }
            if self.slow.is_some_and(|s| s == job.schema) {
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
            std::fs::write(&job.output_file, b"-- dump").unwrap();
            self.attempts.lock().unwrap().push(job.schema.clone());
            if self.failing.iter().any(|f| *f == job.schema) {
                return Err(AppError::backup(&job.schema, "pg_dump exited with status 1"));
            }
            Ok(())
        }
    }

    fn orchestrator(root: &std::path::Path, runner: Arc<FakeRunner>) -> BackupOrchestrator {
        BackupOrchestrator::new(root, ToolchainLayout::new("/opt/pg"), runner)
    }

    fn schemas(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn files_under(dir: &std::path::Path) -> usize {
        std::fs::read_dir(dir).map(|entries| entries.count()).unwrap_or(0)
    }

    #[tokio::test]
    async fn test_one_failure_reported_after_all_jobs_ran() -> anyhow::Result<()> {
        let scratch = tempfile::tempdir()?;
        let mut runner = FakeRunner::new(vec!["public"]);
        runner.slow = Some("dblog");
        let runner = Arc::new(runner);

        let result = orchestrator(scratch.path(), runner.clone())
            .run_all(creds(), "17", &schemas(&["public", "dblog"]))
            .await;

        match result {
            Err(AppError::Backup { schema, .. }) => assert_eq!(schema, "public"),
            other => panic!("expected public failure, got {:?}", other),
        }
        assert_eq!(runner.attempts(), vec!["dblog".to_string(), "public".to_string()]);
        assert_eq!(files_under(&scratch.path().join("public")), 1);
        assert_eq!(files_under(&scratch.path().join("dblog")), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_all_jobs_succeed() -> anyhow::Result<()> {
        let scratch = tempfile::tempdir()?;
        let runner = Arc::new(FakeRunner::new(Vec::new()));

        let written = orchestrator(scratch.path(), runner.clone())
            .run_all(creds(), "17", &schemas(&["public", "dblog"]))
            .await?;

        assert_eq!(written.len(), 2);
        for path in &written {
            let name = path.file_name().unwrap().to_string_lossy();
            assert!(name.starts_with("app_db_example_com-"));
            assert!(name.ends_with("-dump.sql"));
        }
        Ok(())
    }

    #[tokio::test]
    async fn test_no_schemas_is_immediate_success() -> anyhow::Result<()> {
        let scratch = tempfile::tempdir()?;
        let runner = Arc::new(FakeRunner::new(Vec::new()));

        let written = orchestrator(scratch.path(), runner.clone())
            .run_all(creds(), "17", &[])
            .await?;

        assert!(written.is_empty());
        assert!(runner.attempts().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_jobs_run_concurrently() -> anyhow::Result<()> {
        let scratch = tempfile::tempdir()?;
        let mut runner = FakeRunner::new(Vec::new());
        runner.barrier = Some(Barrier::new(3));
        let runner = Arc::new(runner);

        let orchestrator = orchestrator(scratch.path(), runner.clone());
        let names = schemas(&["public", "dblog", "audit"]);
        let run = orchestrator.run_all(creds(), "17", &names);
        let written = tokio::time::timeout(Duration::from_secs(5), run).await??;

        assert_eq!(written.len(), 3);
        Ok(())
    }

    #[tokio::test]
    async fn test_every_failure_still_yields_one_error() -> anyhow::Result<()> {
        let scratch = tempfile::tempdir()?;
        let runner = Arc::new(FakeRunner::new(vec!["public", "dblog"]));

        let result = orchestrator(scratch.path(), runner.clone())
            .run_all(creds(), "17", &schemas(&["public", "dblog"]))
            .await;

        assert!(matches!(result, Err(AppError::Backup { .. })));
        assert_eq!(runner.attempts().len(), 2);
        Ok(())
    }
}
