use derive_more::Display;
use futures::future::BoxFuture;
use futures::{ready, FutureExt};
use log::{trace, warn};
use std::cmp::min;
use std::fmt::{Debug, Formatter};
use std::fs::{File, OpenOptions};
use std::io;
use std::io::{Read, Seek, SeekFrom};
use std::path::PathBuf;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::time::{sleep, Instant};

use crate::core::stream::{Error, Range, Result};
use crate::core::torrents::{InfoHash, PieceIndex, WeakTorrentEngine};

/// The default buffer size, in bytes, used while streaming the file contents.
const DEFAULT_BUFFER_SIZE: usize = 256 * 1000; // 256KB
/// The maximum time to wait for a single piece to become available.
const PIECE_WAIT_TIMEOUT: Duration = Duration::from_secs(60);
/// The interval between piece availability polls.
const PIECE_POLL_INTERVAL: Duration = Duration::from_millis(500);
/// The interval between tracker re-announces while waiting on a piece.
const REANNOUNCE_INTERVAL: Duration = Duration::from_secs(5);
/// The number of upcoming pieces which receive a deadline while waiting.
const READ_AHEAD_PIECES: usize = 12;
/// The deadline of the awaited piece itself.
const READ_AHEAD_BASE: Duration = Duration::from_millis(1000);
/// The deadline increment for each subsequent read-ahead piece.
const READ_AHEAD_STEP: Duration = Duration::from_millis(250);

/// The stream bytes yielded by the [TorrentStreamReader].
pub type StreamBytes = Vec<u8>;

/// The streaming result of a single read operation.
pub type StreamBytesResult = Result<StreamBytes>;

/// A byte stream over the selected file of a torrent which waits for missing
/// pieces on demand.
///
/// The reader doesn't own the torrent, it looks it up through a weak engine
/// reference per operation and fails the read when the torrent has
/// disappeared. Reads never cross a piece boundary, which guarantees that
/// only verified bytes are returned.
#[derive(Display)]
#[display("torrent: {}, file: {:?}, cursor: {}", info_hash, filepath, cursor)]
pub struct TorrentStreamReader {
    engine: WeakTorrentEngine,
    info_hash: InfoHash,
    /// The open reader handle to the torrent file
    file: File,
    /// The absolute path to the torrent file
    filepath: PathBuf,
    /// The length of a single piece in bytes
    piece_length: u64,
    /// The byte offset of the file within the torrent
    torrent_offset: u64,
    /// The last piece containing file data
    last_piece: PieceIndex,
    /// The total length of the file resource
    resource_length: u64,
    /// The current reading cursor within the file
    cursor: u64,
    /// The inclusive byte range that will be streamed
    range: Range,
    pending_wait: Option<BoxFuture<'static, Result<()>>>,
}

impl TorrentStreamReader {
    pub(crate) fn new(
        engine: WeakTorrentEngine,
        info_hash: InfoHash,
        filepath: PathBuf,
        piece_length: u64,
        torrent_offset: u64,
        last_piece: PieceIndex,
        resource_length: u64,
        range: Range,
    ) -> Result<Self> {
        trace!(
            "Torrent stream reader is opening file {:?} for {}",
            filepath,
            info_hash
        );
        let file = OpenOptions::new()
            .read(true)
            .open(&filepath)
            .map_err(|e| {
                warn!(
                    "Torrent stream reader failed to open file {:?}, {}",
                    filepath, e
                );
                Error::NotFound(filepath.to_string_lossy().to_string())
            })?;

        Ok(Self {
            engine,
            info_hash,
            file,
            filepath,
            piece_length,
            torrent_offset,
            last_piece,
            resource_length,
            cursor: range.start,
            range,
            pending_wait: None,
        })
    }

    /// The inclusive byte range streamed by this reader.
    pub fn range(&self) -> &Range {
        &self.range
    }

    /// The number of bytes this reader will yield.
    pub fn content_length(&self) -> u64 {
        self.range.len()
    }

    /// The HTTP content range covered by this reader.
    pub fn content_range(&self) -> String {
        self.range.content_range(self.resource_length)
    }

    /// The piece which contains the current cursor position.
    fn current_piece(&self) -> PieceIndex {
        ((self.torrent_offset + self.cursor) / self.piece_length) as PieceIndex
    }

    /// Read the data of the stream at the current cursor.
    /// The read is capped at the end of the stream range and at the piece
    /// boundary of the current piece.
    fn read_data(&mut self) -> StreamBytesResult {
        let absolute = self.torrent_offset + self.cursor;
        let piece_end = (absolute / self.piece_length + 1) * self.piece_length;
        let remaining = self.range.end + 1 - self.cursor;
        let buffer_size = min(
            DEFAULT_BUFFER_SIZE as u64,
            min(remaining, piece_end - absolute),
        ) as usize;
        let mut buffer = vec![0u8; buffer_size];

        self.file.seek(SeekFrom::Start(self.cursor))?;
        let size = self.file.read(&mut buffer)?;
        if size == 0 {
            trace!(
                "Torrent stream reader {} reached EOF for {:?}",
                self,
                self.filepath
            );
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "stream reached unexpected EOF",
            )));
        }

        self.cursor += size as u64;
        buffer.truncate(size);
        Ok(buffer)
    }

    /// Wait for the given piece to become available within the piece deadline.
    ///
    /// While waiting, the availability is polled on a fixed interval, the near
    /// horizon of upcoming pieces receives deadlines and the torrent is
    /// re-announced to its trackers periodically.
    async fn ensure_piece(
        engine: WeakTorrentEngine,
        info_hash: InfoHash,
        piece: PieceIndex,
        last_piece: PieceIndex,
    ) -> Result<()> {
        let engine = engine.upgrade().ok_or(Error::InvalidState)?;
        if engine
            .have_piece(&info_hash, piece)
            .await
            .map_err(|_| Error::InvalidState)?
        {
            return Ok(());
        }

        trace!(
            "Torrent stream reader is waiting for piece {} of {}",
            piece,
            info_hash
        );
        // pre-warm the near horizon for sequential playback
        for i in 0..=READ_AHEAD_PIECES {
            let read_ahead = piece + i;
            if read_ahead > last_piece {
                break;
            }

            let _ = engine
                .set_piece_deadline(
                    &info_hash,
                    read_ahead,
                    READ_AHEAD_BASE + READ_AHEAD_STEP * i as u32,
                )
                .await;
        }

        let started = Instant::now();
        let mut last_announce = started;
        loop {
            if started.elapsed() >= PIECE_WAIT_TIMEOUT {
                return Err(Error::PieceTimeout(piece));
            }
            if last_announce.elapsed() >= REANNOUNCE_INTERVAL {
                engine.force_reannounce(&info_hash).await;
                last_announce = Instant::now();
            }

            sleep(PIECE_POLL_INTERVAL).await;

            if engine
                .have_piece(&info_hash, piece)
                .await
                .map_err(|_| Error::InvalidState)?
            {
                return Ok(());
            }
        }
    }
}

impl futures::Stream for TorrentStreamReader {
    type Item = StreamBytesResult;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.cursor > self.range.end {
            return Poll::Ready(None);
        }

        if self.pending_wait.is_none() {
            let engine = self.engine.clone();
            let info_hash = self.info_hash;
            let piece = self.current_piece();
            let last_piece = self.last_piece;

            self.pending_wait =
                Some(async move { Self::ensure_piece(engine, info_hash, piece, last_piece).await }.boxed());
        }

        let wait_result = match self.pending_wait.as_mut() {
            None => return Poll::Ready(None),
            Some(future) => ready!(future.as_mut().poll(cx)),
        };
        self.pending_wait = None;

        if let Err(e) = wait_result {
            // the stream is terminated on the next poll
            self.cursor = self.range.end + 1;
            return Poll::Ready(Some(Err(e)));
        }

        let data = self.read_data();
        if data.is_err() {
            self.cursor = self.range.end + 1;
        }

        Poll::Ready(Some(data))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let length = self.range.len() as f64;
        let total_buffers = length / DEFAULT_BUFFER_SIZE as f64;

        (0, Some(total_buffers.ceil() as usize))
    }
}

impl Debug for TorrentStreamReader {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TorrentStreamReader")
            .field("info_hash", &self.info_hash)
            .field("filepath", &self.filepath)
            .field("piece_length", &self.piece_length)
            .field("torrent_offset", &self.torrent_offset)
            .field("last_piece", &self.last_piece)
            .field("resource_length", &self.resource_length)
            .field("cursor", &self.cursor)
            .field("range", &self.range)
            .finish()
    }
}
