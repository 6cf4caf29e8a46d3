use thiserror::Error;

/// The config package specific results.
pub type Result<T> = std::result::Result<T, ConfigError>;

/// The errors which can occur while loading the application settings.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("settings file {0} cannot be found")]
    NotFound(String),
    #[error("settings file {0} is invalid, {1}")]
    InvalidValue(String, String),
}
