use crate::error::AppError;
use crate::models::BackupName;
use crate::services::content_selector::ArchivePlan;
use crate::services::process::{CommandRunner, Invocation, ProcessError};
use crate::services::scratch::ScratchFile;
use crate::services::BackupSettings;
use chrono::{DateTime, Utc};
use std::path::Path;

const LABEL: &str = "Archive creation";

#[derive(Debug)]
pub struct BuiltArchive {
    pub name: BackupName,
    pub size: u64,
}

/// Run the restricted archive helper over the plan's sources (plus the dump,
/// if any) and publish the result under its canonical name.
///
/// The helper writes to a hidden staging file which is renamed into place only
/// after it exits successfully, so readers never see a partial archive under a
/// canonical name.
pub async fn build_archive(
    settings: &BackupSettings,
    runner: &dyn CommandRunner,
    plan: &ArchivePlan,
    dump: Option<&Path>,
    timestamp: DateTime<Utc>,
) -> Result<BuiltArchive, AppError> {
    let name = BackupName::new(timestamp, plan.contents);
    let final_path = settings.root.join(name.filename());

    if tokio::fs::try_exists(&final_path).await.unwrap_or(false) {
        return Err(AppError::Conflict(format!(
            "A backup named {} already exists",
            name.id()
        )));
    }

    let staging = ScratchFile::in_dir(&settings.root, "staging", ".tar.gz");

    let invocation = Invocation::new(LABEL, &settings.commands.archive_helper)
        .arg(staging.path())
        .args(plan.sources.iter())
        .args(dump)
        .env("PATH", settings.commands.search_path.as_str())
        .timeout(settings.commands.archive_timeout())
        .elevated();

    let started = std::time::Instant::now();
    let result = runner
        .run(invocation)
        .await
        .and_then(|out| out.ensure_success(LABEL));

    if let Err(e) = result {
        match &e {
            ProcessError::Failed { code, stderr, .. } => {
                tracing::error!(?code, %stderr, "Archive helper failed")
            }
            other => tracing::error!(error = %other, "Archive helper failed"),
        }
        return Err(AppError::DependencyFailed(e.to_string()));
    }

    tokio::fs::rename(staging.path(), &final_path)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to move archive into place");
            AppError::DependencyFailed("Archive was created but could not be finalized".into())
        })?;
    staging.keep();

    // The archive exists at this point; an unreadable size is not a failure.
    let size = match tokio::fs::metadata(&final_path).await {
        Ok(meta) => meta.len(),
        Err(e) => {
            tracing::warn!(error = %e, "Could not stat new archive, recording size 0");
            0
        }
    };

    tracing::info!(
        id = %name.id(),
        size,
        sources = plan.sources.len(),
        with_dump = dump.is_some(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Archive created"
    );

    Ok(BuiltArchive { name, size })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::BackupContents;
    use crate::services::process::ProcessOutput;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use std::path::PathBuf;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Writes the staging file (first argument) unless told to fail.
    struct HelperRunner {
        fail: bool,
        seen: Mutex<Vec<Invocation>>,
    }

    #[async_trait]
    impl CommandRunner for HelperRunner {
        async fn run(&self, invocation: Invocation) -> Result<ProcessOutput, ProcessError> {
            self.seen.lock().unwrap().push(invocation.clone());
            if self.fail {
                return Ok(ProcessOutput {
                    code: Some(1),
                    stdout: Vec::new(),
                    stderr: "tar: /etc/postfix: Cannot open: Permission denied".into(),
                });
            }
            std::fs::write(&invocation.args[0], b"gzip bytes").unwrap();
            Ok(ProcessOutput {
                code: Some(0),
                stdout: Vec::new(),
                stderr: String::new(),
            })
        }
    }

    fn settings(root: &Path) -> BackupSettings {
        let mut config = crate::config::AppConfig::default();
        config.backup.dir = root.to_path_buf();
        config.backup.owner = Some("ceymail".into());
        config.backup.group = Some("ceymail".into());
        BackupSettings::from_config(&config).unwrap()
    }

    fn plan(sources: Vec<PathBuf>) -> ArchivePlan {
        ArchivePlan {
            contents: BackupContents {
                config: true,
                database: true,
                dkim: false,
                mailboxes: false,
            },
            sources,
        }
    }

    fn ts() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn test_builds_and_publishes() {
        let dir = TempDir::new().unwrap();
        let runner = HelperRunner {
            fail: false,
            seen: Mutex::new(Vec::new()),
        };
        let dump = dir.path().join(".dump-x.sql");

        let built = build_archive(
            &settings(dir.path()),
            &runner,
            &plan(vec![PathBuf::from("/etc/postfix")]),
            Some(dump.as_path()),
            ts(),
        )
        .await
        .unwrap();

        assert_eq!(built.name.id(), "ceymail-backup-20240601-120000-config-db");
        assert_eq!(built.size, 10);
        assert!(dir
            .path()
            .join("ceymail-backup-20240601-120000-config-db.tar.gz")
            .is_file());

        let seen = runner.seen.lock().unwrap();
        assert!(seen[0].elevated);
        assert_eq!(seen[0].args.len(), 3);
        assert_eq!(seen[0].args[1], "/etc/postfix");
        assert_eq!(seen[0].args[2], dump.as_os_str().to_os_string());

        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with(".staging-"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[tokio::test]
    async fn test_failure_surfaces_stderr_only() {
        let dir = TempDir::new().unwrap();
        let runner = HelperRunner {
            fail: true,
            seen: Mutex::new(Vec::new()),
        };

        let err = build_archive(&settings(dir.path()), &runner, &plan(vec![]), None, ts())
            .await
            .unwrap_err();
        match err {
            AppError::DependencyFailed(msg) => {
                assert_eq!(
                    msg,
                    "Archive creation exited with code 1: tar: /etc/postfix: Cannot open: Permission denied"
                );
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_existing_name_is_conflict() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("ceymail-backup-20240601-120000-config-db.tar.gz"),
            b"old",
        )
        .unwrap();
        let runner = HelperRunner {
            fail: false,
            seen: Mutex::new(Vec::new()),
        };

        let err = build_archive(&settings(dir.path()), &runner, &plan(vec![]), None, ts())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
        assert!(runner.seen.lock().unwrap().is_empty());
    }
}
