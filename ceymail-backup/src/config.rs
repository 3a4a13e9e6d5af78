//! Service configuration.
//!
//! Built-in defaults, then an optional TOML file, then environment
//! variables (a `.env` file is honoured).

use anyhow::{bail, Context};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;

static DB_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]{1,64}$").expect("valid regex"));

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub backup: BackupConfig,
    pub commands: CommandsConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackupConfig {
    /// Directory holding every archive. All identifier resolution is anchored here.
    pub dir: PathBuf,

    /// Owner assigned to the directory when it is provisioned. Defaults to the
    /// user the daemon runs as.
    pub owner: Option<String>,
    pub group: Option<String>,

    pub config_paths: Vec<PathBuf>,
    pub dkim_paths: Vec<PathBuf>,
    pub mailbox_paths: Vec<PathBuf>,

    /// Value of `APP_ENV` handed to the dump process.
    pub runtime_mode: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandsConfig {
    pub sudo: PathBuf,
    pub mkdir: PathBuf,
    pub chown: PathBuf,
    pub archive_helper: PathBuf,
    pub mysqldump: PathBuf,

    /// `PATH` given to child processes.
    pub search_path: String,

    pub dir_timeout_secs: u64,
    pub dump_timeout_secs: u64,
    pub archive_timeout_secs: u64,
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub host: String,
    pub user: String,
    pub password: String,
    pub mail_database: String,
    pub dashboard_database: String,
}

#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub admin_token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1".into(),
            port: 3100,
        }
    }
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("/var/lib/ceymail-mc/backups"),
            owner: None,
            group: None,
            config_paths: [
                "/etc/postfix",
                "/etc/dovecot",
                "/etc/opendkim",
                "/etc/opendkim.conf",
                "/etc/spamassassin",
            ]
            .into_iter()
            .map(PathBuf::from)
            .collect(),
            dkim_paths: vec![
                PathBuf::from("/etc/opendkim/keys"),
                PathBuf::from("/etc/mail/dkim-keys"),
            ],
            mailbox_paths: vec![PathBuf::from("/var/mail/vhosts")],
            runtime_mode: "production".into(),
        }
    }
}

impl Default for CommandsConfig {
    fn default() -> Self {
        Self {
            sudo: PathBuf::from("/usr/bin/sudo"),
            mkdir: PathBuf::from("/usr/bin/mkdir"),
            chown: PathBuf::from("/usr/bin/chown"),
            archive_helper: PathBuf::from("/usr/local/bin/ceymail-backup-helper"),
            mysqldump: PathBuf::from("/usr/bin/mysqldump"),
            search_path: "/usr/local/bin:/usr/bin:/bin".into(),
            dir_timeout_secs: 10,
            dump_timeout_secs: 120,
            archive_timeout_secs: 300,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: "localhost".into(),
            user: "ceymail".into(),
            password: String::new(),
            mail_database: "ceymail".into(),
            dashboard_database: "ceymail_dashboard".into(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self { level: "info".into() }
    }
}

impl std::fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("host", &self.host)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("mail_database", &self.mail_database)
            .field("dashboard_database", &self.dashboard_database)
            .finish()
    }
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("admin_token", &self.admin_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl CommandsConfig {
    pub fn dir_timeout(&self) -> Duration {
        Duration::from_secs(self.dir_timeout_secs)
    }

    pub fn dump_timeout(&self) -> Duration {
        Duration::from_secs(self.dump_timeout_secs)
    }

    pub fn archive_timeout(&self) -> Duration {
        Duration::from_secs(self.archive_timeout_secs)
    }

    /// Programs the elevation wrapper may run.
    pub fn elevated_allow_list(&self) -> Vec<PathBuf> {
        vec![
            self.mkdir.clone(),
            self.chown.clone(),
            self.archive_helper.clone(),
        ]
    }
}

impl AppConfig {
    /// Load configuration: defaults, then `path` if given, then environment.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let _ = dotenvy::dotenv();

        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: AppConfig = toml::from_str(&content)
            .with_context(|| format!("Invalid config file {}", path.display()))?;
        Ok(config)
    }

    /// Apply environment overrides through `lookup`, so tests can supply their own.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(port) = lookup("PORT").and_then(|v| v.parse().ok()) {
            self.server.port = port;
        }
        if let Some(addr) = lookup("BIND_ADDRESS") {
            self.server.bind_address = addr;
        }
        if let Some(dir) = lookup("BACKUP_DIR") {
            self.backup.dir = PathBuf::from(dir);
        }
        if let Some(host) = lookup("DB_HOST") {
            self.database.host = host;
        }
        if let Some(user) = lookup("DB_USER") {
            self.database.user = user;
        }
        if let Some(password) = lookup("DB_PASSWORD") {
            self.database.password = password;
        }
        if let Some(name) = lookup("MAIL_DB_NAME") {
            self.database.mail_database = name;
        }
        if let Some(name) = lookup("DASHBOARD_DB_NAME") {
            self.database.dashboard_database = name;
        }
        if let Some(token) = lookup("ADMIN_TOKEN").filter(|t| !t.is_empty()) {
            self.auth.admin_token = Some(token);
        }
        if let Some(level) = lookup("LOG_LEVEL") {
            self.log.level = level;
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if !self.backup.dir.is_absolute() {
            bail!("backup.dir must be an absolute path");
        }
        for name in [&self.database.mail_database, &self.database.dashboard_database] {
            if !DB_NAME_RE.is_match(name) {
                bail!("Invalid database name: {name}");
            }
        }
        let commands = &self.commands;
        for program in [
            &commands.sudo,
            &commands.mkdir,
            &commands.chown,
            &commands.archive_helper,
            &commands.mysqldump,
        ] {
            if !program.is_absolute() {
                bail!("Command path must be absolute: {}", program.display());
            }
        }
        Ok(())
    }
}
