use crate::credentials::CredentialProvider;
use crate::error::AppError;
use crate::models::BackupRecord;
use crate::services::archive::build_archive;
use crate::services::catalog::scan_backup_root;
use crate::services::content_selector::{plan_archive, validate_selection, ContentSelection};
use crate::services::creation_lock::{CreationGuard, CreationLock};
use crate::services::db_dump::dump_databases;
use crate::services::path_guard::locate_backup;
use crate::services::process::CommandRunner;
use crate::services::provisioner::ensure_backup_root;
use crate::services::BackupSettings;
use std::sync::Arc;

/// An opened archive ready to be streamed.
#[derive(Debug)]
pub struct ArchiveDownload {
    pub file: tokio::fs::File,
    pub size: u64,
    pub filename: String,
}

pub struct BackupService {
    settings: BackupSettings,
    runner: Arc<dyn CommandRunner>,
    credentials: Arc<dyn CredentialProvider>,
    lock: CreationLock,
}

impl BackupService {
    pub fn new(
        settings: BackupSettings,
        runner: Arc<dyn CommandRunner>,
        credentials: Arc<dyn CredentialProvider>,
    ) -> Self {
        Self {
            settings,
            runner,
            credentials,
            lock: CreationLock::new(),
        }
    }

    pub fn settings(&self) -> &BackupSettings {
        &self.settings
    }

    pub fn lock(&self) -> &CreationLock {
        &self.lock
    }

    pub async fn list(&self) -> Result<Vec<BackupRecord>, AppError> {
        let root = self.settings.root.clone();
        let records = tokio::task::spawn_blocking(move || scan_backup_root(&root))
            .await
            .map_err(|e| anyhow::anyhow!(e))?
            .map_err(|e| anyhow::anyhow!("Failed to read backup directory: {e}"))?;
        Ok(records)
    }

    /// Create a backup. Fails fast with a conflict if one is already running.
    ///
    /// The work runs on its own task: a caller that goes away does not
    /// interrupt a dump or archive build that has already started, and the
    /// lock and scratch files are still released when it finishes.
    pub async fn create(
        self: &Arc<Self>,
        selection: ContentSelection,
    ) -> Result<BackupRecord, AppError> {
        let guard = self.lock.try_acquire().ok_or_else(|| {
            tracing::warn!("Rejected backup request: creation already in progress");
            AppError::Conflict("A backup is already being created".into())
        })?;

        let this = Arc::clone(self);
        tokio::spawn(async move { this.run_creation(guard, selection).await })
            .await
            .map_err(|e| anyhow::anyhow!("Backup task failed: {e}"))?
    }

    async fn run_creation(
        &self,
        _guard: CreationGuard,
        selection: ContentSelection,
    ) -> Result<BackupRecord, AppError> {
        validate_selection(selection)?;
        ensure_backup_root(&self.settings, self.runner.as_ref()).await?;
        let plan = plan_archive(selection, &self.settings.sources).await?;

        tracing::info!(
            tags = %plan.contents.tagset(),
            sources = plan.sources.len(),
            "Starting backup"
        );

        let dump = if plan.contents.database {
            let credentials = self.credentials.database_credentials()?;
            Some(dump_databases(&self.settings, &credentials, self.runner.as_ref()).await?)
        } else {
            None
        };

        let built = build_archive(
            &self.settings,
            self.runner.as_ref(),
            &plan,
            dump.as_ref().map(|d| d.path()),
            chrono::Utc::now(),
        )
        .await;

        // Temp dump goes away whatever the archive step did.
        drop(dump);

        let built = built?;
        Ok(BackupRecord::new(&built.name, built.size))
    }

    pub async fn delete(&self, id: &str) -> Result<(), AppError> {
        let root = self.settings.root.clone();
        let owned_id = id.to_string();
        let (path, _) = tokio::task::spawn_blocking(move || locate_backup(&root, &owned_id))
            .await
            .map_err(|e| anyhow::anyhow!(e))??;

        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                tracing::info!(id, "Backup deleted");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(AppError::NotFound("Backup not found".into()))
            }
            Err(e) => Err(anyhow::anyhow!("Failed to delete backup {id}: {e}").into()),
        }
    }

    pub async fn open_download(&self, id: &str) -> Result<ArchiveDownload, AppError> {
        let root = self.settings.root.clone();
        let owned_id = id.to_string();
        let (path, name) = tokio::task::spawn_blocking(move || locate_backup(&root, &owned_id))
            .await
            .map_err(|e| anyhow::anyhow!(e))??;

        let file = match tokio::fs::File::open(&path).await {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(AppError::NotFound("Backup not found".into()))
            }
            Err(e) => return Err(anyhow::anyhow!("Failed to open backup {id}: {e}").into()),
        };
        let size = file
            .metadata()
            .await
            .map_err(|e| anyhow::anyhow!("Failed to stat backup {id}: {e}"))?
            .len();

        tracing::info!(id, size, "Serving backup download");

        Ok(ArchiveDownload {
            file,
            size,
            filename: name.filename(),
        })
    }
}
