use derive_more::Display;
use serde::{Deserialize, Serialize};

const DEFAULT_PORT: fn() -> u16 = || 8888;

/// The control api server settings.
#[derive(Debug, Display, Clone, Serialize, Deserialize, PartialEq)]
#[display("port: {}", port)]
pub struct ServerSettings {
    /// The loopback port on which the control api is served.
    #[serde(default = "DEFAULT_PORT")]
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT(),
        }
    }
}
