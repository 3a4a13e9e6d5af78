//! Temporary files inside the backup root that must not outlive a request.

use std::path::{Path, PathBuf};

/// Removes its file on drop unless [`ScratchFile::keep`] was called.
/// Removal errors are logged and swallowed.
#[derive(Debug)]
pub struct ScratchFile {
    path: PathBuf,
    armed: bool,
}

impl ScratchFile {
    /// Hidden, random name in `dir`. Never matches the canonical archive pattern.
    pub fn in_dir(dir: &Path, prefix: &str, extension: &str) -> Self {
        let name = format!(".{prefix}-{}{extension}", uuid::Uuid::new_v4().simple());
        Self {
            path: dir.join(name),
            armed: true,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Disarm after the file has been moved away.
    pub fn keep(mut self) {
        self.armed = false;
    }
}

impl Drop for ScratchFile {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => tracing::debug!(path = %self.path.display(), "Removed scratch file"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "Failed to remove scratch file")
            }
        }
    }
}
