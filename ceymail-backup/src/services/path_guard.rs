//! Turns caller-supplied backup identifiers into paths confined to the backup root.

use crate::error::AppError;
use crate::models::backup_record::{BackupName, ARCHIVE_EXTENSION};
use std::path::{Path, PathBuf, MAIN_SEPARATOR};

const MAX_ID_LEN: usize = 128;

/// Letters, digits, hyphen and underscore only. Runs before any filesystem access.
pub fn validate_backup_id(id: &str) -> Result<(), AppError> {
    let valid = !id.is_empty()
        && id.len() <= MAX_ID_LEN
        && id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_');
    if valid {
        Ok(())
    } else {
        Err(AppError::BadRequest("Invalid backup ID".into()))
    }
}

/// Join `id` + extension onto the canonical root and require the result to stay
/// strictly inside it. Existing entries are canonicalized, so a symlink that
/// points out of the root is rejected.
pub fn resolve_archive_path(root: &Path, id: &str) -> Result<PathBuf, AppError> {
    let root = root
        .canonicalize()
        .map_err(|_| AppError::NotFound("Backup not found".into()))?;
    let candidate = root.join(format!("{id}{ARCHIVE_EXTENSION}"));

    let resolved = if candidate.symlink_metadata().is_ok() {
        candidate
            .canonicalize()
            .map_err(|_| AppError::BadRequest("Invalid backup ID".into()))?
    } else {
        candidate
    };

    let prefix = format!("{}{}", root.to_string_lossy(), MAIN_SEPARATOR);
    if !resolved.to_string_lossy().starts_with(&prefix) {
        tracing::warn!(id, "Backup ID resolved outside the backup root");
        return Err(AppError::BadRequest("Invalid backup ID".into()));
    }
    Ok(resolved)
}

/// Full validation chain for delete and download: charset and canonical name
/// (no filesystem access), then containment, then existence.
pub fn locate_backup(root: &Path, id: &str) -> Result<(PathBuf, BackupName), AppError> {
    validate_backup_id(id)?;
    let name = BackupName::parse_id(id)
        .ok_or_else(|| AppError::BadRequest("Invalid backup ID".into()))?;
    let path = resolve_archive_path(root, id)?;
    if !path.is_file() {
        return Err(AppError::NotFound("Backup not found".into()));
    }
    Ok((path, name))
}
