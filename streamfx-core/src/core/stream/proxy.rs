use log::{debug, trace};

use crate::core::stream::{Error, Range, Result, TorrentStreamReader};
use crate::core::torrents::{InfoHash, TorrentEngine, WeakTorrentEngine};

/// The stream proxy builds piece aware byte readers over the selected file of
/// a torrent.
///
/// It holds a weak reference to the engine so open streams don't keep the
/// engine alive.
#[derive(Debug, Clone)]
pub struct StreamProxy {
    engine: WeakTorrentEngine,
}

impl StreamProxy {
    /// Create a new stream proxy on top of the given engine.
    pub fn new(engine: &TorrentEngine) -> Self {
        Self {
            engine: engine.downgrade(),
        }
    }

    /// Try to open a byte stream over the selected file of the torrent,
    /// yielding the inclusive byte range `[start, end]`.
    ///
    /// # Returns
    ///
    /// Returns the stream reader, or an error when the torrent is unknown,
    /// its metadata hasn't been resolved or the selected file is not yet
    /// present on disk.
    pub async fn open_stream(
        &self,
        info_hash: InfoHash,
        start: u64,
        end: u64,
    ) -> Result<TorrentStreamReader> {
        let engine = self.engine.upgrade().ok_or(Error::InvalidState)?;
        let torrent = engine
            .state(&info_hash)
            .await
            .ok_or_else(|| Error::NotFound(info_hash.to_string()))?;

        if !torrent.metadata_ready {
            return Err(Error::NotReady);
        }
        let file = torrent.selected_file.ok_or(Error::NotReady)?;
        if !file.path.exists() {
            trace!(
                "Selected file {:?} of {} is not yet on disk",
                file.path,
                info_hash
            );
            return Err(Error::NotReady);
        }
        if start > end || end >= file.size {
            return Err(Error::InvalidRange);
        }

        debug!(
            "Opening stream {}-{} over {:?} of {}",
            start, end, file.path, info_hash
        );
        TorrentStreamReader::new(
            engine.downgrade(),
            info_hash,
            file.path,
            file.piece_length,
            file.offset,
            file.last_piece,
            file.size,
            Range { start, end },
        )
    }
}
