pub mod archive;
pub mod backup_service;
pub mod catalog;
pub mod content_selector;
pub mod creation_lock;
pub mod db_dump;
pub mod path_guard;
pub mod process;
pub mod provisioner;
pub mod scratch;

pub use backup_service::{ArchiveDownload, BackupService};

use crate::config::{AppConfig, CommandsConfig};
use content_selector::SourcePaths;
use std::path::PathBuf;

/// Everything the backup pipeline needs from configuration, resolved once.
#[derive(Debug, Clone)]
pub struct BackupSettings {
    pub root: PathBuf,
    /// `user:group` assigned to a freshly created root.
    pub owner: String,
    pub sources: SourcePaths,
    pub commands: CommandsConfig,
    pub mail_database: String,
    pub dashboard_database: String,
    pub runtime_mode: String,
    /// `HOME` for the dump process.
    pub home: PathBuf,
}

impl BackupSettings {
    pub fn from_config(config: &AppConfig) -> anyhow::Result<Self> {
        let backup = &config.backup;
        Ok(Self {
            root: backup.dir.clone(),
            owner: provisioner::resolve_owner(backup.owner.as_deref(), backup.group.as_deref())?,
            sources: SourcePaths {
                config: backup.config_paths.clone(),
                dkim: backup.dkim_paths.clone(),
                mailboxes: backup.mailbox_paths.clone(),
            },
            commands: config.commands.clone(),
            mail_database: config.database.mail_database.clone(),
            dashboard_database: config.database.dashboard_database.clone(),
            runtime_mode: backup.runtime_mode.clone(),
            home: std::env::var_os("HOME")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("/")),
        })
    }
}
