pub mod backup_record;

pub use backup_record::{BackupContents, BackupName, BackupRecord, BackupStatus};
