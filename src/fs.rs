//! Filesystem collaborator used for document reads and modification times

use chrono::{DateTime, Utc};
use std::path::Path;

/// Read access to the documents of a project
pub trait FileSystem: Send + Sync {
    /// Read a file as UTF-8, or `None` if it is missing or unreadable
    fn read_file(&self, path: &Path) -> Option<String>;

    /// Last modification time, or `None` if the file does not exist
    fn mtime(&self, path: &Path) -> Option<DateTime<Utc>>;
}

/// [`FileSystem`] backed by `std::fs`
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFs;

impl FileSystem for LocalFs {
    fn read_file(&self, path: &Path) -> Option<String> {
        match std::fs::read_to_string(path) {
            Ok(content) => Some(content),
            Err(e) => {
                tracing::debug!("Cannot read {}: {}", path.display(), e);
                None
            }
        }
    }

    fn mtime(&self, path: &Path) -> Option<DateTime<Utc>> {
        let modified = std::fs::metadata(path).ok()?.modified().ok()?;
        Some(DateTime::<Utc>::from(modified))
    }
}
