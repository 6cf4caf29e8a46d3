use log::{debug, trace};
use std::fs;
use std::path::Path;

use crate::core::storage::{Result, StorageError};

/// The storage is responsible for removing torrent data from the file system.
#[derive(Debug, Clone)]
pub struct Storage;

impl Storage {
    /// Delete the given path from the filesystem.
    /// Directories are removed recursively.
    ///
    /// Deleting a path which doesn't exist is a no-op.
    pub fn delete(path: &Path) -> Result<()> {
        if !path.exists() {
            trace!("Path {:?} doesn't exist, nothing to delete", path);
            return Ok(());
        }

        debug!("Deleting path {:?}", path);
        let result = if path.is_dir() {
            fs::remove_dir_all(path)
        } else {
            fs::remove_file(path)
        };

        result.map_err(|e| {
            StorageError::DeletionFailed(path.to_string_lossy().to_string(), e.to_string())
        })
    }
}
