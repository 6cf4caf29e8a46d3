use async_trait::async_trait;
use fx_callback::Callback;
use fx_handle::Handle;
use std::fmt::Debug;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::core::torrents::{InfoHash, Result};

#[cfg(any(test, feature = "testing"))]
pub use mock::*;

/// A unique handle identifier of a torrent within the session.
pub type TorrentHandle = Handle;

/// The unique index of a file within the torrent.
pub type FileIndex = usize;

/// The alias type used to identify piece indexes.
pub type PieceIndex = usize;

/// The download priority of a file within a torrent.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum FilePriority {
    /// The file is not wanted and its bytes will not be written to storage.
    Ignore,
    /// The file is downloaded with the default priority.
    Normal,
}

/// The information about a single file within a torrent.
#[derive(Debug, Clone, PartialEq)]
pub struct FileEntry {
    /// The index of the file within the torrent.
    pub index: FileIndex,
    /// The path of the file relative to the torrent root.
    pub relative_path: PathBuf,
    /// The absolute path of the file on the storage device.
    pub path: PathBuf,
    /// The total size of the file in bytes.
    pub size: u64,
    /// The byte offset of the file within the torrent.
    pub offset: u64,
}

impl FileEntry {
    /// Get the filename of the file.
    pub fn filename(&self) -> String {
        self.relative_path
            .file_name()
            .map(|e| e.to_string_lossy().to_string())
            .unwrap_or_default()
    }
}

/// The file layout of a torrent once its metadata is known.
#[derive(Debug, Clone, PartialEq)]
pub struct FileStorage {
    /// The length of a single piece in bytes.
    pub piece_length: u64,
    /// The total number of pieces within the torrent.
    pub total_pieces: usize,
    /// The files of the torrent in index order.
    pub files: Vec<FileEntry>,
}

impl FileStorage {
    /// Get the piece range `(first, last)` covering the given file.
    /// Both bounds are inclusive.
    pub fn piece_range(&self, file: &FileEntry) -> (PieceIndex, PieceIndex) {
        if self.piece_length == 0 {
            return (0, 0);
        }

        let first = (file.offset / self.piece_length) as PieceIndex;
        if file.size == 0 {
            return (first, first);
        }

        let last = ((file.offset + file.size - 1) / self.piece_length) as PieceIndex;
        (first, last)
    }
}

/// The live swarm status of a torrent.
#[derive(Debug, Clone, PartialEq)]
pub struct LiveStatus {
    /// The number of connected peers.
    pub peers: usize,
    /// The number of seeders, when known.
    pub seeds: Option<u64>,
    /// The payload download rate in bytes per second.
    pub download_rate_bps: u64,
    /// The download progress of the wanted files, between 0 and 1.
    pub progress: f32,
    /// The indication whether the torrent metadata has been resolved.
    pub has_metadata: bool,
}

/// The events emitted by a [TorrentSession].
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// Invoked when the metadata of a torrent has been resolved.
    /// This event might be redelivered and consumers should handle it idempotently.
    MetadataReceived(InfoHash),
    /// Invoked when a torrent has completed its download.
    Finished(InfoHash),
    /// Invoked when a torrent encountered an unrecoverable error.
    Error(InfoHash, String),
}

/// The session encapsulates the underlying BitTorrent library behind a
/// library-agnostic surface. It manages the global session lifecycle and
/// exposes the per-torrent operations the engine and stream reader need.
#[async_trait]
pub trait TorrentSession: Debug + Callback<SessionEvent> + Send + Sync {
    /// Start the underlying session.
    /// This operation is idempotent, starting an already running session is a no-op.
    async fn start(&self) -> Result<()>;

    /// Stop the session and release all torrent handles.
    async fn stop(&self);

    /// Add a new torrent to the session from the given info hash.
    /// The magnet uri is composed from the info hash and the given tracker list,
    /// preserving the tracker order.
    ///
    /// # Arguments
    ///
    /// * `info_hash` - The info hash of the torrent to add.
    /// * `trackers` - The tracker uris to announce to.
    /// * `save_dir` - The directory to store the torrent files in.
    ///
    /// # Returns
    ///
    /// Returns the handle of the created torrent, or [crate::core::torrents::Error::SessionNotStarted]
    /// when the session hasn't been started.
    async fn add_magnet(
        &self,
        info_hash: &InfoHash,
        trackers: Vec<String>,
        save_dir: &Path,
    ) -> Result<TorrentHandle>;

    /// Find the torrent handle for the given info hash.
    /// It returns [None] when the info hash is unknown to the session.
    async fn find(&self, info_hash: &InfoHash) -> Option<TorrentHandle>;

    /// Get the file layout of the torrent.
    /// It returns [None] as long as the metadata hasn't been resolved.
    async fn file_storage(&self, handle: &TorrentHandle) -> Option<FileStorage>;

    /// Update the download priorities of the torrent files.
    async fn prioritize_files(
        &self,
        handle: &TorrentHandle,
        priorities: Vec<(FileIndex, FilePriority)>,
    );

    /// Enable or disable the sequential download mode of the torrent.
    async fn set_sequential_flag(&self, handle: &TorrentHandle, enabled: bool);

    /// Restrict the sequential download window to the given piece range.
    /// Both bounds are inclusive.
    async fn set_sequential_range(&self, handle: &TorrentHandle, first: PieceIndex, last: PieceIndex);

    /// Request the given piece to be completed within the deadline.
    /// A tighter deadline preempts the normal piece selection.
    async fn set_piece_deadline(&self, handle: &TorrentHandle, piece: PieceIndex, deadline: Duration);

    /// Check if the given piece is downloaded, validated and written to storage.
    async fn have_piece(&self, handle: &TorrentHandle, piece: PieceIndex) -> bool;

    /// Pause the torrent, stopping all transfers.
    async fn pause(&self, handle: &TorrentHandle);

    /// Resume a paused torrent.
    async fn resume(&self, handle: &TorrentHandle);

    /// Remove the torrent from the session.
    /// The handle is ignored when it's unknown to the session.
    async fn remove(&self, handle: &TorrentHandle);

    /// Re-announce the torrent to its trackers.
    async fn force_reannounce(&self, handle: &TorrentHandle);

    /// Get the live status of the torrent.
    /// It returns [None] when the handle is unknown to the session.
    async fn status(&self, handle: &TorrentHandle) -> Option<LiveStatus>;
}

#[cfg(any(test, feature = "testing"))]
mod mock {
    use super::*;
    use fx_callback::{Subscriber, Subscription};
    use mockall::mock;
    use std::fmt::{Display, Formatter};

    mock! {
        #[derive(Debug)]
        pub TorrentSession {}

        #[async_trait]
        impl TorrentSession for TorrentSession {
            async fn start(&self) -> Result<()>;
            async fn stop(&self);
            async fn add_magnet(
                &self,
                info_hash: &InfoHash,
                trackers: Vec<String>,
                save_dir: &Path,
            ) -> Result<TorrentHandle>;
            async fn find(&self, info_hash: &InfoHash) -> Option<TorrentHandle>;
            async fn file_storage(&self, handle: &TorrentHandle) -> Option<FileStorage>;
            async fn prioritize_files(
                &self,
                handle: &TorrentHandle,
                priorities: Vec<(FileIndex, FilePriority)>,
            );
            async fn set_sequential_flag(&self, handle: &TorrentHandle, enabled: bool);
            async fn set_sequential_range(&self, handle: &TorrentHandle, first: PieceIndex, last: PieceIndex);
            async fn set_piece_deadline(&self, handle: &TorrentHandle, piece: PieceIndex, deadline: Duration);
            async fn have_piece(&self, handle: &TorrentHandle, piece: PieceIndex) -> bool;
            async fn pause(&self, handle: &TorrentHandle);
            async fn resume(&self, handle: &TorrentHandle);
            async fn remove(&self, handle: &TorrentHandle);
            async fn force_reannounce(&self, handle: &TorrentHandle);
            async fn status(&self, handle: &TorrentHandle) -> Option<LiveStatus>;
        }

        impl Callback<SessionEvent> for TorrentSession {
            fn subscribe(&self) -> Subscription<SessionEvent>;
            fn subscribe_with(&self, subscriber: Subscriber<SessionEvent>);
        }
    }

    impl Display for MockTorrentSession {
        fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
            write!(f, "MockTorrentSession")
        }
    }
}
