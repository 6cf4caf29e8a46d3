use thiserror::Error;

use crate::core::torrents::InfoHash;

/// The torrent package specific results.
pub type Result<T> = std::result::Result<T, Error>;

/// The torrent error describes exceptions which have occurred when handling
/// torrent actions.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    #[error("the torrent session has not been started")]
    SessionNotStarted,
    #[error("info hash {0} is invalid")]
    InvalidInfoHash(String),
    #[error("no torrent has been started for {0}")]
    UnknownTorrent(InfoHash),
    #[error("torrent {0} is not ready for streaming")]
    NotReady(InfoHash),
    #[error("torrent handle {0} is no longer valid")]
    InvalidHandle(String),
    #[error("{0}")]
    TorrentError(String),
    #[error("an io error occurred, {0}")]
    Io(String),
}
