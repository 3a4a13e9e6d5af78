#![allow(dead_code)]

use async_trait::async_trait;
use ceymail_backup::auth::TokenGate;
use ceymail_backup::config::AppConfig;
use ceymail_backup::credentials::{CredentialProvider, DbCredentials};
use ceymail_backup::services::process::{CommandRunner, Invocation, ProcessError, ProcessOutput};
use ceymail_backup::services::{BackupService, BackupSettings};
use ceymail_backup::state::AppState;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tokio::sync::Notify;

pub const ADMIN_TOKEN: &str = "test-admin-token";

/// Stands in for mkdir, chown, mysqldump and the archive helper by doing the
/// equivalent filesystem work itself.
#[derive(Default)]
pub struct ScriptedRunner {
    calls: Mutex<Vec<Invocation>>,
    fail_label: Mutex<Option<&'static str>>,
    archive_gate: Mutex<Option<(Arc<Notify>, Arc<Notify>)>>,
}

impl ScriptedRunner {
    pub fn fail_on(&self, label: &'static str) {
        *self.fail_label.lock().unwrap() = Some(label);
    }

    /// Make the archive step signal `entered` and then wait for `release`.
    pub fn pause_archive(&self) -> (Arc<Notify>, Arc<Notify>) {
        let entered = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        *self.archive_gate.lock().unwrap() = Some((entered.clone(), release.clone()));
        (entered, release)
    }

    pub fn calls(&self) -> Vec<Invocation> {
        self.calls.lock().unwrap().clone()
    }

    pub fn labels(&self) -> Vec<&'static str> {
        self.calls().iter().map(|i| i.label).collect()
    }
}

fn ok() -> ProcessOutput {
    ProcessOutput {
        code: Some(0),
        stdout: Vec::new(),
        stderr: String::new(),
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(&self, invocation: Invocation) -> Result<ProcessOutput, ProcessError> {
        self.calls.lock().unwrap().push(invocation.clone());

        if *self.fail_label.lock().unwrap() == Some(invocation.label) {
            return Ok(ProcessOutput {
                code: Some(2),
                stdout: Vec::new(),
                stderr: format!("{} refused", invocation.label),
            });
        }

        match invocation.label {
            "Backup directory creation" => {
                let dir = invocation.args.last().unwrap();
                std::fs::create_dir_all(dir).unwrap();
            }
            "Database dump" => {
                let target = invocation
                    .args
                    .iter()
                    .find_map(|a| a.to_str()?.strip_prefix("--result-file=").map(PathBuf::from))
                    .unwrap();
                std::fs::write(target, b"-- MySQL dump\n").unwrap();
            }
            "Archive creation" => {
                let gate = self.archive_gate.lock().unwrap().clone();
                if let Some((entered, release)) = gate {
                    entered.notify_one();
                    release.notified().await;
                }
                let mut data = Vec::new();
                for source in &invocation.args[1..] {
                    data.extend_from_slice(source.to_string_lossy().as_bytes());
                    data.push(b'\n');
                }
                std::fs::write(&invocation.args[0], data).unwrap();
            }
            _ => {}
        }
        Ok(ok())
    }
}

pub struct StaticCredentials;

impl CredentialProvider for StaticCredentials {
    fn database_credentials(&self) -> anyhow::Result<DbCredentials> {
        Ok(DbCredentials {
            host: "localhost".into(),
            user: "ceymail".into(),
            password: "db-password".into(),
        })
    }
}

pub struct Fixture {
    pub dir: TempDir,
    pub config: AppConfig,
    pub runner: Arc<ScriptedRunner>,
    pub service: Arc<BackupService>,
}

impl Fixture {
    /// Backup root under a temp dir (not yet created) with every component's
    /// sources present.
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let etc = dir.path().join("etc");
        for sub in ["postfix", "dovecot", "opendkim/keys", "vhosts"] {
            std::fs::create_dir_all(etc.join(sub)).unwrap();
        }

        let mut config = AppConfig::default();
        config.backup.dir = dir.path().join("backups");
        config.backup.owner = Some("ceymail".into());
        config.backup.group = Some("ceymail".into());
        config.backup.config_paths = vec![etc.join("postfix"), etc.join("dovecot")];
        config.backup.dkim_paths = vec![etc.join("opendkim/keys")];
        config.backup.mailbox_paths = vec![etc.join("vhosts")];
        config.auth.admin_token = Some(ADMIN_TOKEN.into());

        let runner = Arc::new(ScriptedRunner::default());
        let settings = BackupSettings::from_config(&config).unwrap();
        let service = Arc::new(BackupService::new(
            settings,
            runner.clone(),
            Arc::new(StaticCredentials),
        ));

        Self {
            dir,
            config,
            runner,
            service,
        }
    }

    pub fn root(&self) -> &Path {
        &self.config.backup.dir
    }

    /// Put an archive straight into the backup root.
    pub fn seed_archive(&self, filename: &str, data: &[u8]) -> PathBuf {
        std::fs::create_dir_all(self.root()).unwrap();
        let path = self.root().join(filename);
        std::fs::write(&path, data).unwrap();
        path
    }

    pub fn root_entries(&self) -> Vec<String> {
        let mut names: Vec<String> = match std::fs::read_dir(self.root()) {
            Ok(entries) => entries
                .filter_map(|e| e.ok())
                .map(|e| e.file_name().to_string_lossy().into_owned())
                .collect(),
            Err(_) => Vec::new(),
        };
        names.sort();
        names
    }
}

pub fn app_state(fixture: &Fixture) -> Arc<AppState> {
    Arc::new(AppState {
        gate: Arc::new(TokenGate::new(fixture.config.auth.admin_token.clone())),
        backups: fixture.service.clone(),
    })
}
