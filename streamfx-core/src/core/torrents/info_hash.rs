use std::fmt::{Display, Formatter};
use std::str::FromStr;

use crate::core::torrents::{Error, Result};

/// The length, in bytes, of a v1 info hash.
const INFO_HASH_LEN: usize = 20;
/// The length of a hex encoded v1 info hash.
const INFO_HASH_HEX_LEN: usize = INFO_HASH_LEN * 2;
/// The number of hex chars used for the per-torrent storage directory name.
const SHORT_HASH_LEN: usize = 20;

/// The 20-byte identifier of a torrent.
/// It's rendered as lowercase hex on all external surfaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InfoHash([u8; INFO_HASH_LEN]);

impl InfoHash {
    /// Get the shortened hex rendering of the info hash.
    /// This is used as the name of the torrent storage directory.
    pub fn short(&self) -> String {
        let mut value = self.to_string();
        value.truncate(SHORT_HASH_LEN);
        value
    }
}

impl FromStr for InfoHash {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if s.len() != INFO_HASH_HEX_LEN {
            return Err(Error::InvalidInfoHash(s.to_string()));
        }

        let bytes = hex::decode(s).map_err(|_| Error::InvalidInfoHash(s.to_string()))?;
        let mut hash = [0u8; INFO_HASH_LEN];
        hash.copy_from_slice(&bytes);
        Ok(Self(hash))
    }
}

impl Display for InfoHash {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}
