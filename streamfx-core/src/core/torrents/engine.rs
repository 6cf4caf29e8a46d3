use derive_more::Display;
use fx_callback::{Callback, MultiThreadedCallback, Subscriber, Subscription};
use log::{debug, error, info, trace, warn};
use std::cmp::min;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tokio::select;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use crate::core::config::TorrentSettings;
use crate::core::storage::Storage;
use crate::core::torrents::{
    selection, Error, FilePriority, InfoHash, LiveStatus, PieceIndex, Result, SelectedFile,
    SessionEvent, Torrent, TorrentSession, TorrentStatus,
};

/// The number of pieces which receive a deadline boost after file selection.
const DEADLINE_BOOST_PIECES: usize = 40;
/// The deadline of the first boosted piece.
const DEADLINE_BASE: Duration = Duration::from_millis(300);
/// The deadline increment for each subsequent boosted piece.
const DEADLINE_STEP: Duration = Duration::from_millis(120);

/// The trackers which are appended to every magnet uri, in order.
pub const TRACKERS: [&str; 21] = [
    "udp://opentor.net:6969",
    "udp://tracker.opentrackr.org:1337/announce",
    "udp://open.stealth.si:80/announce",
    "http://open.tracker.cl:1337/announce",
    "udp://tracker.torrent.eu.org:451/announce",
    "udp://zer0day.ch:1337/announce",
    "udp://wepzone.net:6969/announce",
    "udp://tracker.srv00.com:6969/announce",
    "udp://tracker.filemail.com:6969/announce",
    "udp://tracker.dler.org:6969/announce",
    "udp://tracker.bittor.pw:1337/announce",
    "udp://tracker-udp.gbitt.info:80/announce",
    "udp://run.publictracker.xyz:6969/announce",
    "udp://opentracker.io:6969/announce",
    "udp://open.dstud.io:6969/announce",
    "udp://explodie.org:6969/announce",
    "https://tracker.iperson.xyz:443/announce",
    "https://torrent.tracker.durukanbal.com:443/announce",
    "https://cny.fan:443/announce",
    "http://tracker2.dler.org:80/announce",
    "http://tracker.wepzone.net:6969/announce",
];

/// The events emitted by the torrent engine.
#[derive(Debug, Display, Clone, PartialEq)]
pub enum TorrentEngineEvent {
    /// Invoked when the lifecycle status of a torrent has changed.
    #[display("torrent {} state changed to {}", _0, _1)]
    StateChanged(InfoHash, TorrentStatus),
    /// Invoked when a torrent has been removed and its files deleted.
    #[display("torrent {} has been removed", _0)]
    TorrentRemoved(InfoHash),
}

/// The torrent engine drives torrents through their lifecycle and translates
/// caller intent into piece level strategy on the session.
///
/// It owns the table of active torrents, consumes the session events on a
/// single pump task and applies the streaming prioritization whenever a file
/// has been selected.
#[derive(Debug, Clone)]
pub struct TorrentEngine {
    inner: Arc<InnerTorrentEngine>,
}

impl TorrentEngine {
    /// Create a new torrent engine on top of the given session.
    /// This starts the underlying session and the engine event pump.
    pub async fn new(session: Arc<dyn TorrentSession>, settings: TorrentSettings) -> Result<Self> {
        session.start().await?;

        let inner = Arc::new(InnerTorrentEngine {
            session,
            settings,
            torrents: RwLock::new(HashMap::new()),
            metered: AtomicBool::new(false),
            callbacks: MultiThreadedCallback::new(),
            cancellation_token: Default::default(),
        });

        let receiver = inner.session.subscribe();
        let main_loop = inner.clone();
        tokio::spawn(async move {
            main_loop.run(receiver).await;
        });

        Ok(Self { inner })
    }

    /// Ensure a torrent exists for the given info hash.
    ///
    /// When the torrent already exists and its handle is still valid, the call
    /// only refreshes the access time, except when a new season/episode pair is
    /// supplied, in which case the file selection is re-run.
    ///
    /// # Returns
    ///
    /// Returns a snapshot of the (possibly pre-existing) torrent.
    pub async fn start_torrent(
        &self,
        info_hash: InfoHash,
        file_idx: Option<usize>,
        season: Option<u32>,
        episode: Option<u32>,
    ) -> Result<Torrent> {
        self.inner
            .start_torrent(info_hash, file_idx, season, episode)
            .await
    }

    /// Get a snapshot of the torrent for the given info hash.
    pub async fn state(&self, info_hash: &InfoHash) -> Option<Torrent> {
        self.inner.state(info_hash).await
    }

    /// Get the live swarm status of the torrent for the given info hash.
    pub async fn status(&self, info_hash: &InfoHash) -> Option<LiveStatus> {
        self.inner.status(info_hash).await
    }

    /// Pause the torrent for the given info hash.
    /// Unknown info hashes are ignored.
    pub async fn pause_torrent(&self, info_hash: &InfoHash) {
        self.inner.pause_torrent(info_hash).await
    }

    /// Resume the torrent for the given info hash.
    /// The call is ignored while metered mode is active.
    pub async fn resume_torrent(&self, info_hash: &InfoHash) {
        self.inner.resume_torrent(info_hash).await
    }

    /// Remove the torrent for the given info hash and delete its files.
    /// Unknown info hashes are ignored.
    pub async fn remove_torrent(&self, info_hash: &InfoHash) {
        self.inner.remove_torrent(info_hash).await
    }

    /// Update the global metered mode.
    /// Enabling it pauses every torrent, disabling it resumes the torrents
    /// which were not paused by direct user action.
    pub async fn set_metered_mode(&self, enabled: bool) {
        self.inner.set_metered_mode(enabled).await
    }

    /// Evict all torrents which haven't been accessed within the given age.
    pub async fn cleanup_idle(&self, max_age: Duration) {
        self.inner.cleanup_idle(max_age).await
    }

    /// Check if the given piece of the torrent is locally available.
    pub async fn have_piece(&self, info_hash: &InfoHash, piece: PieceIndex) -> Result<bool> {
        self.inner.have_piece(info_hash, piece).await
    }

    /// Request the given piece of the torrent to be completed within the deadline.
    pub async fn set_piece_deadline(
        &self,
        info_hash: &InfoHash,
        piece: PieceIndex,
        deadline: Duration,
    ) -> Result<()> {
        self.inner.set_piece_deadline(info_hash, piece, deadline).await
    }

    /// Re-announce the torrent to its trackers.
    /// Unknown info hashes are ignored.
    pub async fn force_reannounce(&self, info_hash: &InfoHash) {
        self.inner.force_reannounce(info_hash).await
    }

    /// Create a weak reference to this engine.
    pub fn downgrade(&self) -> WeakTorrentEngine {
        WeakTorrentEngine(Arc::downgrade(&self.inner))
    }

    /// Shutdown the engine and stop the underlying session.
    pub async fn shutdown(&self) {
        info!("Torrent engine is shutting down");
        self.inner.cancellation_token.cancel();
        self.inner.session.stop().await;
    }
}

impl Callback<TorrentEngineEvent> for TorrentEngine {
    fn subscribe(&self) -> Subscription<TorrentEngineEvent> {
        self.inner.callbacks.subscribe()
    }

    fn subscribe_with(&self, subscriber: Subscriber<TorrentEngineEvent>) {
        self.inner.callbacks.subscribe_with(subscriber);
    }
}

impl Drop for TorrentEngine {
    fn drop(&mut self) {
        if Arc::strong_count(&self.inner) == 1 {
            self.inner.cancellation_token.cancel();
        }
    }
}

/// A weak reference to a [TorrentEngine].
/// This allows long-lived stream readers to reference the engine without
/// keeping it alive.
#[derive(Debug, Clone)]
pub struct WeakTorrentEngine(Weak<InnerTorrentEngine>);

impl WeakTorrentEngine {
    /// Try to upgrade the reference to the engine.
    /// It returns [None] when the engine has been dropped.
    pub fn upgrade(&self) -> Option<TorrentEngine> {
        self.0.upgrade().map(|inner| TorrentEngine { inner })
    }
}

/// A managed torrent entry within the engine table.
#[derive(Debug)]
struct TorrentEntry {
    info_hash: InfoHash,
    handle: crate::core::torrents::TorrentHandle,
    status: TorrentStatus,
    metadata_ready: bool,
    selected_file: Option<SelectedFile>,
    total_files: Option<usize>,
    requested_file_index: Option<usize>,
    requested_season: Option<u32>,
    requested_episode: Option<u32>,
    last_accessed: Instant,
    user_paused: bool,
    status_before_metered: Option<TorrentStatus>,
    save_dir: std::path::PathBuf,
}

impl TorrentEntry {
    fn touch(&mut self) {
        self.last_accessed = Instant::now();
    }

    fn snapshot(&self) -> Torrent {
        Torrent {
            info_hash: self.info_hash,
            handle: self.handle,
            status: self.status,
            metadata_ready: self.metadata_ready,
            selected_file: self.selected_file.clone(),
            total_files: self.total_files,
            requested_file_index: self.requested_file_index,
            requested_season: self.requested_season,
            requested_episode: self.requested_episode,
        }
    }
}

#[derive(Debug)]
struct InnerTorrentEngine {
    session: Arc<dyn TorrentSession>,
    settings: TorrentSettings,
    torrents: RwLock<HashMap<InfoHash, TorrentEntry>>,
    metered: AtomicBool,
    callbacks: MultiThreadedCallback<TorrentEngineEvent>,
    cancellation_token: CancellationToken,
}

impl InnerTorrentEngine {
    async fn run(&self, mut receiver: Subscription<SessionEvent>) {
        loop {
            select! {
                _ = self.cancellation_token.cancelled() => break,
                Ok(event) = receiver.recv() => self.on_session_event(&event).await,
            }
        }

        debug!("Torrent engine main loop ended");
    }

    async fn on_session_event(&self, event: &SessionEvent) {
        trace!("Torrent engine received session event {:?}", event);
        match event {
            SessionEvent::MetadataReceived(info_hash) => self.on_metadata_received(*info_hash).await,
            SessionEvent::Finished(info_hash) => {
                debug!("Torrent {} has finished downloading", info_hash)
            }
            SessionEvent::Error(info_hash, message) => {
                self.on_torrent_error(*info_hash, message).await
            }
        }
    }

    async fn on_metadata_received(&self, info_hash: InfoHash) {
        {
            let torrents = self.torrents.read().await;
            match torrents.get(&info_hash) {
                None => return,
                // metadata events might be redelivered by the session
                Some(entry) if entry.metadata_ready => return,
                Some(_) => {}
            }
        }

        self.select_and_prioritize(info_hash).await;
    }

    async fn on_torrent_error(&self, info_hash: InfoHash, message: &str) {
        let mut torrents = self.torrents.write().await;
        if let Some(entry) = torrents.get_mut(&info_hash) {
            error!("Torrent {} encountered an error, {}", info_hash, message);
            entry.status = TorrentStatus::Error;
            drop(torrents);
            self.callbacks.invoke(TorrentEngineEvent::StateChanged(
                info_hash,
                TorrentStatus::Error,
            ));
        }
    }

    /// Run the file selection for the torrent and apply the streaming
    /// prioritization for the selected file.
    async fn select_and_prioritize(&self, info_hash: InfoHash) {
        let (handle, file_idx, season, episode) = {
            let torrents = self.torrents.read().await;
            match torrents.get(&info_hash) {
                None => return,
                Some(entry) => (
                    entry.handle,
                    entry.requested_file_index,
                    entry.requested_season,
                    entry.requested_episode,
                ),
            }
        };

        let storage = match self.session.file_storage(&handle).await {
            // the metadata hasn't been resolved yet
            None => return,
            Some(e) => e,
        };

        match selection::select_file(&storage.files, file_idx, season, episode) {
            None => {
                warn!(
                    "Torrent {} has no selectable file for the requested criteria",
                    info_hash
                );
                let mut torrents = self.torrents.write().await;
                if let Some(entry) = torrents.get_mut(&info_hash) {
                    entry.status = TorrentStatus::Error;
                }
                drop(torrents);
                self.callbacks.invoke(TorrentEngineEvent::StateChanged(
                    info_hash,
                    TorrentStatus::Error,
                ));
            }
            Some(file) => {
                debug!(
                    "Torrent {} selected file {} ({} bytes)",
                    info_hash,
                    file.filename(),
                    file.size
                );
                let priorities = storage
                    .files
                    .iter()
                    .map(|e| {
                        let priority = if e.index == file.index {
                            FilePriority::Normal
                        } else {
                            FilePriority::Ignore
                        };
                        (e.index, priority)
                    })
                    .collect();
                self.session.prioritize_files(&handle, priorities).await;

                let (first_piece, last_piece) = storage.piece_range(file);
                self.session.set_sequential_flag(&handle, true).await;
                self.session
                    .set_sequential_range(&handle, first_piece, last_piece)
                    .await;

                // boost the playback start window with tight deadlines
                let boost = min(DEADLINE_BOOST_PIECES, last_piece - first_piece + 1);
                for i in 0..boost {
                    self.session
                        .set_piece_deadline(
                            &handle,
                            first_piece + i,
                            DEADLINE_BASE + DEADLINE_STEP * i as u32,
                        )
                        .await;
                }

                let selected_file = SelectedFile {
                    index: file.index,
                    name: file.filename(),
                    size: file.size,
                    path: file.path.clone(),
                    offset: file.offset,
                    piece_length: storage.piece_length,
                    first_piece,
                    last_piece,
                };

                let status = {
                    let mut torrents = self.torrents.write().await;
                    match torrents.get_mut(&info_hash) {
                        None => return,
                        Some(entry) => {
                            entry.selected_file = Some(selected_file);
                            entry.total_files = Some(storage.files.len());
                            entry.metadata_ready = true;
                            if entry.status == TorrentStatus::Loading {
                                entry.status = TorrentStatus::Ready;
                            }
                            entry.status
                        }
                    }
                };

                debug!("Torrent {} is {} for streaming", info_hash, status);
                self.callbacks
                    .invoke(TorrentEngineEvent::StateChanged(info_hash, status));
            }
        }
    }

    async fn start_torrent(
        &self,
        info_hash: InfoHash,
        file_idx: Option<usize>,
        season: Option<u32>,
        episode: Option<u32>,
    ) -> Result<Torrent> {
        {
            let mut torrents = self.torrents.write().await;
            if let Some(entry) = torrents.get_mut(&info_hash) {
                if self.session.find(&info_hash).await.is_some() {
                    entry.touch();

                    let episode_changed = season.is_some()
                        && episode.is_some()
                        && (entry.requested_season != season
                            || entry.requested_episode != episode);
                    if file_idx.is_some() {
                        entry.requested_file_index = file_idx;
                    }
                    if season.is_some() {
                        entry.requested_season = season;
                    }
                    if episode.is_some() {
                        entry.requested_episode = episode;
                    }

                    let reselect = episode_changed && entry.metadata_ready;
                    let snapshot = entry.snapshot();
                    drop(torrents);

                    if reselect {
                        debug!(
                            "Torrent {} episode changed to s{:?}e{:?}, re-running file selection",
                            info_hash, season, episode
                        );
                        self.select_and_prioritize(info_hash).await;
                        return Ok(self.state(&info_hash).await.unwrap_or(snapshot));
                    }

                    return Ok(snapshot);
                }

                debug!("Torrent {} handle is no longer valid, rebuilding", info_hash);
                torrents.remove(&info_hash);
            }
        }

        let save_dir = self.settings.directory.join(info_hash.short());
        let trackers = TRACKERS.iter().map(|e| e.to_string()).collect();
        debug!("Adding torrent {} with save dir {:?}", info_hash, save_dir);
        let handle = self
            .session
            .add_magnet(&info_hash, trackers, &save_dir)
            .await?;

        // a torrent added during metered mode starts out paused and is resumed
        // together with the others once metered mode is disabled
        let metered = self.metered.load(Ordering::Relaxed);
        {
            let mut torrents = self.torrents.write().await;
            torrents.insert(
                info_hash,
                TorrentEntry {
                    info_hash,
                    handle,
                    status: if metered {
                        TorrentStatus::Paused
                    } else {
                        TorrentStatus::Loading
                    },
                    metadata_ready: false,
                    selected_file: None,
                    total_files: None,
                    requested_file_index: file_idx,
                    requested_season: season,
                    requested_episode: episode,
                    last_accessed: Instant::now(),
                    user_paused: false,
                    status_before_metered: metered.then_some(TorrentStatus::Loading),
                    save_dir,
                },
            );
        }

        if metered {
            debug!("Metered mode is active, pausing new torrent {}", info_hash);
            self.session.pause(&handle).await;
        }

        // the session might have the metadata cached
        if self.session.file_storage(&handle).await.is_some() {
            self.select_and_prioritize(info_hash).await;
        }

        self.state(&info_hash)
            .await
            .ok_or(Error::UnknownTorrent(info_hash))
    }

    async fn state(&self, info_hash: &InfoHash) -> Option<Torrent> {
        let mut torrents = self.torrents.write().await;
        torrents.get_mut(info_hash).map(|entry| {
            entry.touch();
            entry.snapshot()
        })
    }

    async fn status(&self, info_hash: &InfoHash) -> Option<LiveStatus> {
        let handle = {
            let mut torrents = self.torrents.write().await;
            match torrents.get_mut(info_hash) {
                None => return None,
                Some(entry) => {
                    entry.touch();
                    entry.handle
                }
            }
        };

        self.session.status(&handle).await
    }

    async fn pause_torrent(&self, info_hash: &InfoHash) {
        let handle = {
            let mut torrents = self.torrents.write().await;
            match torrents.get_mut(info_hash) {
                None => return,
                Some(entry) => {
                    entry.touch();
                    entry.user_paused = true;
                    entry.status = TorrentStatus::Paused;
                    entry.status_before_metered = None;
                    entry.handle
                }
            }
        };

        debug!("Pausing torrent {}", info_hash);
        self.session.pause(&handle).await;
        self.callbacks.invoke(TorrentEngineEvent::StateChanged(
            *info_hash,
            TorrentStatus::Paused,
        ));
    }

    async fn resume_torrent(&self, info_hash: &InfoHash) {
        if self.metered.load(Ordering::Relaxed) {
            debug!(
                "Metered mode is active, ignoring resume of torrent {}",
                info_hash
            );
            return;
        }

        let (handle, status) = {
            let mut torrents = self.torrents.write().await;
            match torrents.get_mut(info_hash) {
                None => return,
                Some(entry) => {
                    if entry.status == TorrentStatus::Error {
                        return;
                    }

                    entry.touch();
                    entry.user_paused = false;
                    entry.status = if entry.metadata_ready {
                        TorrentStatus::Ready
                    } else {
                        TorrentStatus::Loading
                    };
                    (entry.handle, entry.status)
                }
            }
        };

        debug!("Resuming torrent {}", info_hash);
        self.session.resume(&handle).await;
        self.callbacks
            .invoke(TorrentEngineEvent::StateChanged(*info_hash, status));
    }

    async fn remove_torrent(&self, info_hash: &InfoHash) {
        let entry = {
            let mut torrents = self.torrents.write().await;
            match torrents.remove(info_hash) {
                None => return,
                Some(entry) => entry,
            }
        };

        debug!("Removing torrent {}", info_hash);
        self.session.remove(&entry.handle).await;

        if let Err(e) = Storage::delete(&entry.save_dir) {
            error!(
                "Failed to delete torrent files of {} at {:?}, {}",
                info_hash, entry.save_dir, e
            );
        }

        self.callbacks
            .invoke(TorrentEngineEvent::TorrentRemoved(*info_hash));
    }

    async fn set_metered_mode(&self, enabled: bool) {
        let previous = self.metered.swap(enabled, Ordering::Relaxed);
        if previous == enabled {
            return;
        }

        let mut events = Vec::new();
        {
            let mut torrents = self.torrents.write().await;
            if enabled {
                info!("Metered mode enabled, pausing all torrents");
                for entry in torrents.values_mut() {
                    if entry.status != TorrentStatus::Paused {
                        entry.status_before_metered = Some(entry.status);
                        entry.status = TorrentStatus::Paused;
                        self.session.pause(&entry.handle).await;
                        events.push(TorrentEngineEvent::StateChanged(
                            entry.info_hash,
                            TorrentStatus::Paused,
                        ));
                    }
                }
            } else {
                info!("Metered mode disabled, resuming torrents");
                for entry in torrents.values_mut() {
                    if let Some(prior) = entry.status_before_metered.take() {
                        // the torrent might have become ready while it was paused
                        entry.status = if prior == TorrentStatus::Error {
                            TorrentStatus::Error
                        } else if entry.metadata_ready {
                            TorrentStatus::Ready
                        } else {
                            TorrentStatus::Loading
                        };
                        if entry.status != TorrentStatus::Error {
                            self.session.resume(&entry.handle).await;
                        }
                        events.push(TorrentEngineEvent::StateChanged(
                            entry.info_hash,
                            entry.status,
                        ));
                    }
                }
            }
        }

        for event in events {
            self.callbacks.invoke(event);
        }
    }

    async fn cleanup_idle(&self, max_age: Duration) {
        let expired: Vec<InfoHash> = {
            let torrents = self.torrents.read().await;
            let now = Instant::now();
            torrents
                .values()
                .filter(|entry| now.duration_since(entry.last_accessed) > max_age)
                .map(|entry| entry.info_hash)
                .collect()
        };

        for info_hash in expired {
            info!("Evicting idle torrent {}", info_hash);
            self.remove_torrent(&info_hash).await;
        }
    }

    async fn have_piece(&self, info_hash: &InfoHash, piece: PieceIndex) -> Result<bool> {
        let handle = self
            .touch_handle(info_hash)
            .await
            .ok_or(Error::UnknownTorrent(*info_hash))?;
        Ok(self.session.have_piece(&handle, piece).await)
    }

    async fn set_piece_deadline(
        &self,
        info_hash: &InfoHash,
        piece: PieceIndex,
        deadline: Duration,
    ) -> Result<()> {
        let handle = self
            .touch_handle(info_hash)
            .await
            .ok_or(Error::UnknownTorrent(*info_hash))?;
        self.session.set_piece_deadline(&handle, piece, deadline).await;
        Ok(())
    }

    async fn force_reannounce(&self, info_hash: &InfoHash) {
        if let Some(handle) = self.touch_handle(info_hash).await {
            trace!("Re-announcing torrent {}", info_hash);
            self.session.force_reannounce(&handle).await;
        }
    }

    async fn touch_handle(
        &self,
        info_hash: &InfoHash,
    ) -> Option<crate::core::torrents::TorrentHandle> {
        let mut torrents = self.torrents.write().await;
        torrents.get_mut(info_hash).map(|entry| {
            entry.touch();
            entry.handle
        })
    }
}
