use crate::credentials::DbCredentials;
use crate::error::AppError;
use crate::services::process::{CommandRunner, Invocation, ProcessError};
use crate::services::scratch::ScratchFile;
use crate::services::BackupSettings;

const LABEL: &str = "Database dump";

/// Dump the mail and dashboard databases into a private scratch file in the
/// backup root. The file is removed when the returned guard drops; on failure
/// it is already gone.
pub async fn dump_databases(
    settings: &BackupSettings,
    credentials: &DbCredentials,
    runner: &dyn CommandRunner,
) -> Result<ScratchFile, AppError> {
    let scratch = ScratchFile::in_dir(&settings.root, "dump", ".sql");

    // Private before the first byte is written.
    let mut options = tokio::fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    options.mode(0o600);
    options
        .open(scratch.path())
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create dump file: {e}"))?;

    let invocation = Invocation::new(LABEL, &settings.commands.mysqldump)
        .arg("--host")
        .arg(credentials.host.as_str())
        .arg("--user")
        .arg(credentials.user.as_str())
        .args([
            "--single-transaction",
            "--routines",
            "--triggers",
            "--databases",
        ])
        .arg(settings.mail_database.as_str())
        .arg(settings.dashboard_database.as_str())
        .arg(format!("--result-file={}", scratch.path().display()))
        .env("MYSQL_PWD", credentials.password.as_str())
        .env("PATH", settings.commands.search_path.as_str())
        .env("HOME", settings.home.to_string_lossy())
        .env("APP_ENV", settings.runtime_mode.as_str())
        .timeout(settings.commands.dump_timeout());

    let started = std::time::Instant::now();
    let result = runner
        .run(invocation)
        .await
        .and_then(|out| out.ensure_success(LABEL));

    match result {
        Ok(_) => {
            tracing::info!(
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Database dump complete"
            );
            Ok(scratch)
        }
        Err(e) => {
            match &e {
                ProcessError::Failed { code, stderr, .. } => {
                    tracing::error!(?code, %stderr, "Database dump failed")
                }
                other => tracing::error!(error = %other, "Database dump failed"),
            }
            Err(AppError::DependencyFailed(e.to_string()))
        }
    }
}
