use derive_more::Display;
use directories::UserDirs;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

const DEFAULT_HOME_DIRECTORY: &str = ".streamfx";
const DEFAULT_DOWNLOADS_DIRECTORY_NAME: &str = "downloads";
const DEFAULT_DIRECTORY: fn() -> PathBuf = || {
    UserDirs::new()
        .map(|e| {
            PathBuf::from(e.home_dir())
                .join(DEFAULT_HOME_DIRECTORY)
                .join(DEFAULT_DOWNLOADS_DIRECTORY_NAME)
        })
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DOWNLOADS_DIRECTORY_NAME))
};
const DEFAULT_CLEANUP_AFTER_HOURS: fn() -> u64 = || 72;

/// The torrent settings of the application.
#[derive(Debug, Display, Clone, Serialize, Deserialize, PartialEq)]
#[display("directory: {:?}, cleanup after: {}h", directory, cleanup_after_hours)]
pub struct TorrentSettings {
    /// The root directory in which torrents are stored.
    /// Each torrent receives its own subdirectory named after its info hash.
    #[serde(default = "DEFAULT_DIRECTORY")]
    pub directory: PathBuf,
    /// The age in hours after which an untouched torrent is evicted.
    #[serde(default = "DEFAULT_CLEANUP_AFTER_HOURS")]
    pub cleanup_after_hours: u64,
}

impl Default for TorrentSettings {
    fn default() -> Self {
        Self {
            directory: DEFAULT_DIRECTORY(),
            cleanup_after_hours: DEFAULT_CLEANUP_AFTER_HOURS(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default() {
        let result = TorrentSettings::default();

        assert_eq!(72, result.cleanup_after_hours);
        assert!(result
            .directory
            .ends_with(DEFAULT_DOWNLOADS_DIRECTORY_NAME));
    }
}
