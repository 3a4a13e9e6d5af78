//! Backup metadata lives only in archive filenames:
//! `ceymail-backup-YYYYMMDD-HHMMSS[-tagset].tar.gz`.

use chrono::{DateTime, NaiveDateTime, Timelike, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

pub const BACKUP_PREFIX: &str = "ceymail-backup-";
pub const ARCHIVE_EXTENSION: &str = ".tar.gz";

static FILENAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^ceymail-backup-(\d{8})-(\d{6})(?:-((?:config|db|dkim|mail)(?:-(?:config|db|dkim|mail))*))?\.tar\.gz$",
    )
    .expect("valid regex")
});

/// Which components an archive holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupContents {
    pub config: bool,
    pub database: bool,
    pub dkim: bool,
    pub mailboxes: bool,
}

impl BackupContents {
    pub const ALL: Self = Self {
        config: true,
        database: true,
        dkim: true,
        mailboxes: true,
    };

    /// Hyphen-joined tags in fixed order, e.g. `config-db-mail`.
    pub fn tagset(&self) -> String {
        let mut tags = Vec::with_capacity(4);
        if self.config {
            tags.push("config");
        }
        if self.database {
            tags.push("db");
        }
        if self.dkim {
            tags.push("dkim");
        }
        if self.mailboxes {
            tags.push("mail");
        }
        tags.join("-")
    }

    /// Archives written before tagging existed carry no tagset and hold everything.
    pub fn from_tagset(tagset: Option<&str>) -> Self {
        match tagset {
            None => Self::ALL,
            Some(tags) => Self {
                config: tags.contains("config"),
                database: tags.contains("db"),
                dkim: tags.contains("dkim"),
                mailboxes: tags.contains("mail"),
            },
        }
    }

    pub fn is_empty(&self) -> bool {
        !(self.config || self.database || self.dkim || self.mailboxes)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackupStatus {
    Complete,
    Failed,
}

impl BackupStatus {
    pub fn from_size(size: u64) -> Self {
        if size > 0 {
            BackupStatus::Complete
        } else {
            BackupStatus::Failed
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupRecord {
    pub id: String,
    pub date: String,
    pub time: String,
    pub size: u64,
    pub contents: BackupContents,
    pub status: BackupStatus,
}

impl BackupRecord {
    pub fn new(name: &BackupName, size: u64) -> Self {
        Self {
            id: name.id(),
            date: name.timestamp.format("%Y-%m-%d").to_string(),
            time: name.timestamp.format("%H:%M:%S").to_string(),
            size,
            contents: name.contents,
            status: BackupStatus::from_size(size),
        }
    }
}

/// A parsed canonical archive name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupName {
    pub timestamp: DateTime<Utc>,
    pub contents: BackupContents,
    tagset: Option<String>,
}

impl BackupName {
    /// Name for a new archive. The tagset is always written out.
    pub fn new(timestamp: DateTime<Utc>, contents: BackupContents) -> Self {
        let tagset = contents.tagset();
        Self {
            // Sub-second precision is not representable in the name.
            timestamp: timestamp.with_nanosecond(0).unwrap_or(timestamp),
            contents,
            tagset: (!tagset.is_empty()).then_some(tagset),
        }
    }

    /// Parse a full filename (with extension). `None` for anything non-canonical.
    pub fn parse(filename: &str) -> Option<Self> {
        let caps = FILENAME_RE.captures(filename)?;
        let stamp = format!("{}{}", &caps[1], &caps[2]);
        let timestamp = NaiveDateTime::parse_from_str(&stamp, "%Y%m%d%H%M%S")
            .ok()?
            .and_utc();
        let tagset = caps.get(3).map(|m| m.as_str().to_string());
        Some(Self {
            timestamp,
            contents: BackupContents::from_tagset(tagset.as_deref()),
            tagset,
        })
    }

    /// Parse a bare identifier (filename without extension).
    pub fn parse_id(id: &str) -> Option<Self> {
        Self::parse(&format!("{id}{ARCHIVE_EXTENSION}"))
    }

    pub fn id(&self) -> String {
        let stamp = self.timestamp.format("%Y%m%d-%H%M%S");
        match &self.tagset {
            Some(tags) => format!("{BACKUP_PREFIX}{stamp}-{tags}"),
            None => format!("{BACKUP_PREFIX}{stamp}"),
        }
    }

    pub fn filename(&self) -> String {
        format!("{}{ARCHIVE_EXTENSION}", self.id())
    }
}
