//! Maps a requested component selection onto the fixed source paths that exist.

use crate::error::AppError;
use crate::models::BackupContents;
use serde::Deserialize;
use std::path::PathBuf;

fn default_true() -> bool {
    true
}

/// Request body for backup creation. Every component defaults to included.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ContentSelection {
    #[serde(default = "default_true")]
    pub config: bool,
    #[serde(default = "default_true")]
    pub database: bool,
    #[serde(default = "default_true")]
    pub dkim: bool,
    #[serde(default = "default_true")]
    pub mailboxes: bool,
}

impl Default for ContentSelection {
    fn default() -> Self {
        Self {
            config: true,
            database: true,
            dkim: true,
            mailboxes: true,
        }
    }
}

impl From<ContentSelection> for BackupContents {
    fn from(s: ContentSelection) -> Self {
        BackupContents {
            config: s.config,
            database: s.database,
            dkim: s.dkim,
            mailboxes: s.mailboxes,
        }
    }
}

/// Operator-configured source paths per component.
#[derive(Debug, Clone, Default)]
pub struct SourcePaths {
    pub config: Vec<PathBuf>,
    pub dkim: Vec<PathBuf>,
    pub mailboxes: Vec<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct ArchivePlan {
    pub contents: BackupContents,
    /// Existing filesystem paths to hand to the archive helper.
    pub sources: Vec<PathBuf>,
}

/// Pure check, no filesystem access.
pub fn validate_selection(selection: ContentSelection) -> Result<BackupContents, AppError> {
    let contents = BackupContents::from(selection);
    if contents.is_empty() {
        return Err(AppError::BadRequest(
            "Select at least one component to back up".into(),
        ));
    }
    Ok(contents)
}

pub async fn plan_archive(
    selection: ContentSelection,
    paths: &SourcePaths,
) -> Result<ArchivePlan, AppError> {
    let contents = validate_selection(selection)?;

    let mut candidates: Vec<&PathBuf> = Vec::new();
    if contents.config {
        candidates.extend(&paths.config);
    }
    if contents.dkim {
        candidates.extend(&paths.dkim);
    }
    if contents.mailboxes {
        candidates.extend(&paths.mailboxes);
    }

    let mut sources = Vec::with_capacity(candidates.len());
    for path in candidates {
        if tokio::fs::try_exists(path).await.unwrap_or(false) {
            sources.push(path.clone());
        } else {
            tracing::debug!(path = %path.display(), "Skipping missing backup source");
        }
    }

    // A database-only selection is valid even with no filesystem sources.
    if sources.is_empty() && !contents.database {
        return Err(AppError::BadRequest(
            "Nothing to archive: none of the selected components exist on this system".into(),
        ));
    }

    Ok(ArchivePlan { contents, sources })
}
