use derive_more::Display;
use std::path::PathBuf;

use crate::core::torrents::{InfoHash, PieceIndex, TorrentHandle};

/// The lifecycle status of a managed torrent.
#[derive(Debug, Display, Copy, Clone, PartialEq)]
pub enum TorrentStatus {
    /// The torrent has been added and is waiting for its metadata.
    #[display("loading")]
    Loading,
    /// The metadata has been resolved and a file has been selected for streaming.
    #[display("ready")]
    Ready,
    /// The torrent has been paused, either directly or through metered mode.
    #[display("paused")]
    Paused,
    /// The torrent encountered an unrecoverable error.
    #[display("error")]
    Error,
}

/// The file which has been selected for streaming within a torrent.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectedFile {
    /// The index of the file within the torrent.
    pub index: usize,
    /// The filename of the selected file.
    pub name: String,
    /// The total size of the file in bytes.
    pub size: u64,
    /// The absolute path of the file on the storage device.
    pub path: PathBuf,
    /// The byte offset of the file within the torrent.
    pub offset: u64,
    /// The length of a single piece in bytes.
    pub piece_length: u64,
    /// The first piece containing file data.
    pub first_piece: PieceIndex,
    /// The last piece containing file data.
    pub last_piece: PieceIndex,
}

/// A point-in-time snapshot of a managed torrent.
#[derive(Debug, Clone, PartialEq)]
pub struct Torrent {
    /// The info hash identifying the torrent.
    pub info_hash: InfoHash,
    /// The session handle of the torrent.
    pub handle: TorrentHandle,
    /// The lifecycle status of the torrent.
    pub status: TorrentStatus,
    /// The indication whether the metadata has been resolved and a file selected.
    pub metadata_ready: bool,
    /// The file selected for streaming, when resolved.
    pub selected_file: Option<SelectedFile>,
    /// The total number of files within the torrent, when known.
    pub total_files: Option<usize>,
    /// The file index requested by the caller.
    pub requested_file_index: Option<usize>,
    /// The season requested by the caller.
    pub requested_season: Option<u32>,
    /// The episode requested by the caller.
    pub requested_episode: Option<u32>,
}
