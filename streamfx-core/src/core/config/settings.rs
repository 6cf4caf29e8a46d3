use derive_more::Display;
use log::{debug, trace};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::core::config::{ConfigError, Result, ServerSettings, TorrentSettings};

/// The user settings of the application.
#[derive(Debug, Display, Clone, Default, Serialize, Deserialize, PartialEq)]
#[display("server: {{{}}}, torrent: {{{}}}", server, torrent)]
pub struct StreamFxSettings {
    /// The control api server settings.
    #[serde(default)]
    pub server: ServerSettings,
    /// The torrent settings.
    #[serde(default)]
    pub torrent: TorrentSettings,
}

impl StreamFxSettings {
    /// Load the settings from the given yaml document.
    ///
    /// It returns the parsed settings on success, else the [ConfigError] that occurred.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        trace!("Loading settings from {:?}", path);
        let contents = fs::read_to_string(path)
            .map_err(|_| ConfigError::NotFound(path.to_string_lossy().to_string()))?;

        serde_yaml::from_str::<Self>(&contents)
            .map(|settings| {
                debug!("Settings loaded from {:?}", path);
                settings
            })
            .map_err(|e| {
                ConfigError::InvalidValue(path.to_string_lossy().to_string(), e.to_string())
            })
    }
}
