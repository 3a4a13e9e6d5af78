//! Makes sure the backup root exists, belongs to the service user and is
//! writable before any expensive work starts.

use crate::error::AppError;
use crate::services::process::{CommandRunner, Invocation};
use crate::services::BackupSettings;
use nix::unistd::{access, getgid, getuid, AccessFlags, Group, User};
use std::path::Path;

/// `owner:group` for chown. Falls back to the identity the daemon runs as.
pub fn resolve_owner(owner: Option<&str>, group: Option<&str>) -> anyhow::Result<String> {
    let owner = match owner {
        Some(o) => o.to_string(),
        None => User::from_uid(getuid())?
            .map(|u| u.name)
            .unwrap_or_else(|| getuid().to_string()),
    };
    let group = match group {
        Some(g) => g.to_string(),
        None => Group::from_gid(getgid())?
            .map(|g| g.name)
            .unwrap_or_else(|| getgid().to_string()),
    };
    Ok(format!("{owner}:{group}"))
}

pub async fn ensure_backup_root(
    settings: &BackupSettings,
    runner: &dyn CommandRunner,
) -> Result<(), AppError> {
    let root = &settings.root;

    let exists = tokio::fs::try_exists(root)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to stat backup directory: {e}"))?;

    if !exists {
        tracing::info!(path = %root.display(), "Creating backup directory");

        runner
            .run(
                Invocation::new("Backup directory creation", &settings.commands.mkdir)
                    .args(["-p", "-m", "0700"])
                    .arg(root)
                    .env("PATH", settings.commands.search_path.as_str())
                    .timeout(settings.commands.dir_timeout())
                    .elevated(),
            )
            .await
            .and_then(|out| out.ensure_success("Backup directory creation"))
            .map_err(|e| AppError::DependencyFailed(e.to_string()))?;

        runner
            .run(
                Invocation::new("Backup directory ownership", &settings.commands.chown)
                    .arg(settings.owner.as_str())
                    .arg(root)
                    .env("PATH", settings.commands.search_path.as_str())
                    .timeout(settings.commands.dir_timeout())
                    .elevated(),
            )
            .await
            .and_then(|out| out.ensure_success("Backup directory ownership"))
            .map_err(|e| AppError::DependencyFailed(e.to_string()))?;
    }

    let probe_root = root.clone();
    tokio::task::spawn_blocking(move || probe_writable(&probe_root))
        .await
        .map_err(|e| anyhow::anyhow!(e))?
}

/// Existence is not enough: a directory left by an earlier partial setup may
/// belong to someone else.
fn probe_writable(root: &Path) -> Result<(), AppError> {
    access(root, AccessFlags::W_OK | AccessFlags::X_OK).map_err(|errno| {
        tracing::error!(path = %root.display(), %errno, "Backup directory is not writable");
        AppError::DependencyFailed("Backup directory is not writable by the service user".into())
    })
}
