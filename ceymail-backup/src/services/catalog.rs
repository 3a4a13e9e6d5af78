use crate::models::backup_record::{BackupName, BackupRecord, ARCHIVE_EXTENSION};
use std::path::Path;

/// Scan the backup root and rebuild records from filenames, newest first.
///
/// A missing root is the normal state before the first backup and yields an
/// empty list. Files that do not parse as canonical archive names are ignored.
pub fn scan_backup_root(root: &Path) -> std::io::Result<Vec<BackupRecord>> {
    let entries = match std::fs::read_dir(root) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };

    let mut names: Vec<String> = entries
        .filter_map(|e| e.ok())
        .filter_map(|e| e.file_name().into_string().ok())
        .filter(|name| name.ends_with(ARCHIVE_EXTENSION))
        .collect();

    // Zero-padded timestamps make reverse lexicographic order newest-first.
    names.sort_unstable_by(|a, b| b.cmp(a));

    let mut records = Vec::with_capacity(names.len());
    for filename in names {
        let Some(name) = BackupName::parse(&filename) else {
            tracing::debug!(%filename, "Ignoring non-backup file in backup root");
            continue;
        };

        let size = match std::fs::metadata(root.join(&filename)) {
            Ok(meta) if meta.is_dir() => continue,
            Ok(meta) => meta.len(),
            Err(e) => {
                tracing::warn!(%filename, error = %e, "Could not stat backup, reporting size 0");
                0
            }
        };

        records.push(BackupRecord::new(&name, size));
    }

    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::BackupStatus;
    use tempfile::TempDir;

    #[test]
    fn test_missing_root_is_empty() {
        let dir = TempDir::new().unwrap();
        let records = scan_backup_root(&dir.path().join("never-created")).unwrap();
        assert!(records.is_empty());
    }

    #[test]
    fn test_lists_newest_first_and_skips_strays() {
        let dir = TempDir::new().unwrap();
        let files: [(&str, &[u8]); 7] = [
            ("ceymail-backup-20240101-080000-config.tar.gz", b"aaaa"),
            ("ceymail-backup-20240301-080000.tar.gz", b"bbbbbbbb"),
            ("ceymail-backup-20240201-080000-db-mail.tar.gz", b""),
            ("notes.txt", b"x"),
            ("random.tar.gz", b"x"),
            (".staging-abc.tar.gz", b"x"),
            (".dump-abc.sql", b"x"),
        ];
        for (name, data) in files {
            std::fs::write(dir.path().join(name), data).unwrap();
        }

        let records = scan_backup_root(dir.path()).unwrap();
        let ids: Vec<&str> = records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(
            ids,
            [
                "ceymail-backup-20240301-080000",
                "ceymail-backup-20240201-080000-db-mail",
                "ceymail-backup-20240101-080000-config",
            ]
        );

        assert_eq!(records[0].size, 8);
        assert_eq!(records[0].status, BackupStatus::Complete);
        assert!(records[0].contents.mailboxes);

        assert_eq!(records[1].size, 0);
        assert_eq!(records[1].status, BackupStatus::Failed);
        assert!(records[1].contents.database);
        assert!(!records[1].contents.config);
    }

    #[test]
    fn test_impossible_timestamp_is_skipped() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("ceymail-backup-20240230-080000-db.tar.gz"), b"x").unwrap();
        std::fs::write(dir.path().join("ceymail-backup-20240228-250000-db.tar.gz"), b"x").unwrap();
        std::fs::write(dir.path().join("ceymail-backup-20240228-080000-db.tar.gz"), b"x").unwrap();

        let records = scan_backup_root(dir.path()).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, "ceymail-backup-20240228-080000-db");
    }

    #[test]
    fn test_listing_is_idempotent() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("ceymail-backup-20240101-080000-dkim.tar.gz"),
            b"data",
        )
        .unwrap();

        let first = scan_backup_root(dir.path()).unwrap();
        let second = scan_backup_root(dir.path()).unwrap();
        assert_eq!(first, second);
    }
}
