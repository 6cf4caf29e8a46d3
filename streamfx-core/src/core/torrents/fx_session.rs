use async_trait::async_trait;
use fx_callback::{Callback, MultiThreadedCallback, Subscriber, Subscription};
use fx_torrent::{
    FxTorrentSession, PiecePriority, Session, SessionConfig, Torrent as FxTorrent, TorrentEvent,
    TorrentFlags, TorrentState,
};
use log::{debug, trace, warn};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::select;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use crate::core::torrents::{
    Error, FileEntry, FilePriority, FileStorage, InfoHash, LiveStatus, PieceIndex, Result,
    SessionEvent, TorrentHandle, TorrentSession,
};

/// The client name reported to the swarm.
const CLIENT_NAME: &str = "StreamFX";

/// The session adapter implementation backed by the fx-torrent library.
///
/// All fx-torrent specifics are confined to this type, the engine and stream
/// reader only know the [TorrentSession] trait. The library exposes piece
/// priority tiers rather than timed deadlines, so deadline requests are mapped
/// onto the priority tier matching their tightness.
#[derive(Debug)]
pub struct FxSessionAdapter {
    inner: Arc<InnerSessionAdapter>,
}

impl FxSessionAdapter {
    /// Create a new session adapter storing its torrents below the given base path.
    /// The underlying session is created lazily on [TorrentSession::start].
    pub fn new<P: AsRef<Path>>(base_path: P) -> Self {
        Self {
            inner: Arc::new(InnerSessionAdapter {
                base_path: base_path.as_ref().to_path_buf(),
                session: RwLock::new(None),
                torrents: RwLock::new(HashMap::new()),
                callbacks: MultiThreadedCallback::new(),
                cancellation_token: Default::default(),
            }),
        }
    }
}

#[async_trait]
impl TorrentSession for FxSessionAdapter {
    async fn start(&self) -> Result<()> {
        self.inner.start().await
    }

    async fn stop(&self) {
        self.inner.stop().await
    }

    async fn add_magnet(
        &self,
        info_hash: &InfoHash,
        trackers: Vec<String>,
        save_dir: &Path,
    ) -> Result<TorrentHandle> {
        self.inner.add_magnet(info_hash, trackers, save_dir).await
    }

    async fn find(&self, info_hash: &InfoHash) -> Option<TorrentHandle> {
        let torrents = self.inner.torrents.read().await;
        torrents
            .iter()
            .find(|(_, entry)| &entry.info_hash == info_hash)
            .map(|(handle, _)| *handle)
    }

    async fn file_storage(&self, handle: &TorrentHandle) -> Option<FileStorage> {
        self.inner.file_storage(handle).await
    }

    async fn prioritize_files(
        &self,
        handle: &TorrentHandle,
        priorities: Vec<(usize, FilePriority)>,
    ) {
        let torrents = self.inner.torrents.read().await;
        if let Some(entry) = torrents.get(handle) {
            let priorities = priorities
                .into_iter()
                .map(|(index, priority)| (index, as_piece_priority(priority)))
                .collect();
            entry.torrent.prioritize_files(priorities).await;
        }
    }

    async fn set_sequential_flag(&self, handle: &TorrentHandle, enabled: bool) {
        let torrents = self.inner.torrents.read().await;
        if let Some(entry) = torrents.get(handle) {
            if enabled {
                entry.torrent.add_options(TorrentFlags::SequentialDownload).await;
            } else {
                entry
                    .torrent
                    .remove_options(TorrentFlags::SequentialDownload)
                    .await;
            }
        }
    }

    async fn set_sequential_range(&self, handle: &TorrentHandle, first: PieceIndex, last: PieceIndex) {
        let torrents = self.inner.torrents.read().await;
        if let Some(entry) = torrents.get(handle) {
            let priorities = (first..=last)
                .map(|piece| (piece, PiecePriority::Normal))
                .collect();
            entry.torrent.prioritize_pieces(priorities).await;
        }
    }

    async fn set_piece_deadline(&self, handle: &TorrentHandle, piece: PieceIndex, deadline: Duration) {
        let torrents = self.inner.torrents.read().await;
        if let Some(entry) = torrents.get(handle) {
            let priority = deadline_priority(deadline);
            trace!(
                "Prioritizing piece {} of {} as {:?}",
                piece,
                entry.info_hash,
                priority
            );
            entry.torrent.prioritize_pieces(vec![(piece, priority)]).await;
        }
    }

    async fn have_piece(&self, handle: &TorrentHandle, piece: PieceIndex) -> bool {
        let torrents = self.inner.torrents.read().await;
        match torrents.get(handle) {
            None => false,
            Some(entry) => entry.torrent.has_piece(&piece).await,
        }
    }

    async fn pause(&self, handle: &TorrentHandle) {
        let torrents = self.inner.torrents.read().await;
        if let Some(entry) = torrents.get(handle) {
            entry.torrent.pause().await;
        }
    }

    async fn resume(&self, handle: &TorrentHandle) {
        let torrents = self.inner.torrents.read().await;
        if let Some(entry) = torrents.get(handle) {
            entry.torrent.resume().await;
        }
    }

    async fn remove(&self, handle: &TorrentHandle) {
        let entry = self.inner.torrents.write().await.remove(handle);
        if let Some(entry) = entry {
            debug!("Removing torrent {} from the session", entry.info_hash);
            entry.event_token.cancel();

            let session = self.inner.session.read().await;
            if let Some(session) = session.as_ref() {
                session.remove_torrent(handle).await;
            }
        }
    }

    async fn force_reannounce(&self, handle: &TorrentHandle) {
        let torrents = self.inner.torrents.read().await;
        if let Some(entry) = torrents.get(handle) {
            if let Err(e) = entry.torrent.announce().await {
                debug!("Torrent {} re-announce failed, {}", entry.info_hash, e);
            }
        }
    }

    async fn status(&self, handle: &TorrentHandle) -> Option<LiveStatus> {
        let torrents = self.inner.torrents.read().await;
        let entry = torrents.get(handle)?;
        let metrics = entry.torrent.metrics();

        Some(LiveStatus {
            peers: metrics.peers.get() as usize,
            // connected seed counts are not surfaced by the library
            seeds: None,
            download_rate_bps: metrics.download_useful.rate() as u64,
            progress: metrics.progress(),
            has_metadata: entry.torrent.is_metadata_known().await,
        })
    }
}

impl Callback<SessionEvent> for FxSessionAdapter {
    fn subscribe(&self) -> Subscription<SessionEvent> {
        self.inner.callbacks.subscribe()
    }

    fn subscribe_with(&self, subscriber: Subscriber<SessionEvent>) {
        self.inner.callbacks.subscribe_with(subscriber);
    }
}

impl Drop for FxSessionAdapter {
    fn drop(&mut self) {
        if Arc::strong_count(&self.inner) == 1 {
            self.inner.cancellation_token.cancel();
        }
    }
}

/// A torrent tracked by the adapter.
#[derive(Debug)]
struct AdapterTorrent {
    info_hash: InfoHash,
    torrent: FxTorrent,
    /// Cancels the event forwarder of this torrent.
    event_token: CancellationToken,
}

#[derive(Debug)]
struct InnerSessionAdapter {
    base_path: PathBuf,
    session: RwLock<Option<Box<dyn Session>>>,
    torrents: RwLock<HashMap<TorrentHandle, AdapterTorrent>>,
    callbacks: MultiThreadedCallback<SessionEvent>,
    cancellation_token: CancellationToken,
}

impl InnerSessionAdapter {
    async fn start(&self) -> Result<()> {
        let mut session = self.session.write().await;
        if session.is_some() {
            trace!("Torrent session has already been started");
            return Ok(());
        }

        debug!("Starting torrent session within {:?}", self.base_path);
        let config = SessionConfig::builder()
            .path(&self.base_path)
            .client_name(CLIENT_NAME)
            .build();
        let created = FxTorrentSession::builder()
            .config(config)
            .build()
            .map_err(|e| Error::TorrentError(e.to_string()))?;

        *session = Some(Box::new(created));
        Ok(())
    }

    async fn stop(&self) {
        debug!("Stopping torrent session");
        let mut torrents = self.torrents.write().await;
        for (_, entry) in torrents.drain() {
            entry.event_token.cancel();
        }

        let mut session = self.session.write().await;
        let _ = session.take();
    }

    async fn add_magnet(
        &self,
        info_hash: &InfoHash,
        trackers: Vec<String>,
        save_dir: &Path,
    ) -> Result<TorrentHandle> {
        let session = self.session.read().await;
        let session = session.as_ref().ok_or(Error::SessionNotStarted)?;

        let uri = magnet_uri(info_hash, &trackers);
        trace!("Adding torrent {} from {}", info_hash, uri);
        session.set_base_path(save_dir.to_path_buf()).await;
        let torrent = session
            .add_torrent_from_uri(&uri, TorrentFlags::default())
            .await
            .map_err(|e| Error::TorrentError(e.to_string()))?;
        let handle = torrent.handle();

        // forward the torrent events onto the typed session event stream
        let receiver = torrent.subscribe();
        let event_token = self.cancellation_token.child_token();
        let forward_token = event_token.clone();
        let callbacks = self.callbacks.clone();
        let event_hash = *info_hash;
        tokio::spawn(async move {
            Self::forward_torrent_events(event_hash, receiver, callbacks, forward_token).await;
        });

        debug!("Added torrent {} as {}", info_hash, handle);
        let mut torrents = self.torrents.write().await;
        torrents.insert(
            handle,
            AdapterTorrent {
                info_hash: *info_hash,
                torrent,
                event_token,
            },
        );

        Ok(handle)
    }

    async fn file_storage(&self, handle: &TorrentHandle) -> Option<FileStorage> {
        let torrents = self.torrents.read().await;
        let entry = torrents.get(handle)?;

        let metadata = match entry.torrent.metadata().await {
            Ok(e) => e,
            Err(e) => {
                warn!("Failed to retrieve metadata of {}, {}", entry.info_hash, e);
                return None;
            }
        };
        let info = metadata.info?;
        let total_pieces = entry.torrent.total_pieces().await;
        let files = entry.torrent.files().await;
        if files.is_empty() {
            return None;
        }

        let mut entries = Vec::with_capacity(files.len());
        for file in files {
            let path = entry.torrent.absolute_file_path(&file).await.ok()?;
            entries.push(FileEntry {
                index: file.index,
                relative_path: file.torrent_path.clone(),
                path,
                size: file.len() as u64,
                offset: file.torrent_offset as u64,
            });
        }

        Some(FileStorage {
            piece_length: info.piece_length,
            total_pieces,
            files: entries,
        })
    }

    async fn forward_torrent_events(
        info_hash: InfoHash,
        mut receiver: Subscription<TorrentEvent>,
        callbacks: MultiThreadedCallback<SessionEvent>,
        cancellation_token: CancellationToken,
    ) {
        loop {
            select! {
                _ = cancellation_token.cancelled() => break,
                event = receiver.recv() => {
                    if let Ok(event) = event {
                        match &*event {
                            TorrentEvent::MetadataChanged(_) | TorrentEvent::FilesChanged => {
                                callbacks.invoke(SessionEvent::MetadataReceived(info_hash));
                            }
                            TorrentEvent::StateChanged(state) => match state {
                                TorrentState::Finished | TorrentState::Seeding => {
                                    callbacks.invoke(SessionEvent::Finished(info_hash));
                                }
                                TorrentState::Error => {
                                    callbacks.invoke(SessionEvent::Error(
                                        info_hash,
                                        "the torrent entered an error state".to_string(),
                                    ));
                                }
                                _ => {}
                            },
                            // all other torrent events are of no interest here
                            _ => {}
                        }
                    } else {
                        break;
                    }
                }
            }
        }

        trace!("Torrent {} event forwarder ended", info_hash);
    }
}

/// Compose the magnet uri for the given info hash and trackers.
/// The tracker order is preserved.
fn magnet_uri(info_hash: &InfoHash, trackers: &[String]) -> String {
    let mut uri = format!("magnet:?xt=urn:btih:{}", info_hash);
    for tracker in trackers {
        uri.push_str("&tr=");
        uri.push_str(tracker);
    }
    uri
}

/// Map a piece deadline onto the priority tier matching its tightness.
fn deadline_priority(deadline: Duration) -> PiecePriority {
    let millis = deadline.as_millis();
    if millis <= 600 {
        PiecePriority::Now
    } else if millis <= 1500 {
        PiecePriority::Next
    } else if millis <= 3000 {
        PiecePriority::Readahead
    } else {
        PiecePriority::High
    }
}

fn as_piece_priority(priority: FilePriority) -> PiecePriority {
    match priority {
        FilePriority::Ignore => PiecePriority::None,
        FilePriority::Normal => PiecePriority::Normal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::init_logger;
    use std::str::FromStr;

    fn test_hash() -> InfoHash {
        InfoHash::from_str("aabbccddeeff00112233445566778899aabbccdd").unwrap()
    }

    #[test]
    fn test_magnet_uri() {
        let info_hash = test_hash();
        let trackers = vec![
            "udp://opentor.net:6969".to_string(),
            "udp://tracker.opentrackr.org:1337/announce".to_string(),
        ];

        let result = magnet_uri(&info_hash, &trackers);

        assert_eq!(
            "magnet:?xt=urn:btih:aabbccddeeff00112233445566778899aabbccdd\
             &tr=udp://opentor.net:6969\
             &tr=udp://tracker.opentrackr.org:1337/announce",
            result
        );
    }

    #[test]
    fn test_deadline_priority() {
        assert_eq!(PiecePriority::Now, deadline_priority(Duration::from_millis(300)));
        assert_eq!(PiecePriority::Next, deadline_priority(Duration::from_millis(1000)));
        assert_eq!(
            PiecePriority::Readahead,
            deadline_priority(Duration::from_millis(2500))
        );
        assert_eq!(PiecePriority::High, deadline_priority(Duration::from_secs(5)));
    }

    #[tokio::test]
    async fn test_add_magnet_session_not_started() {
        init_logger!();
        let temp_dir = tempfile::tempdir().unwrap();
        let adapter = FxSessionAdapter::new(temp_dir.path());

        let result = adapter
            .add_magnet(&test_hash(), Vec::new(), temp_dir.path())
            .await;

        assert_eq!(Some(Error::SessionNotStarted), result.err());
    }
}
