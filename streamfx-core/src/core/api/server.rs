use axum::body::Body;
use axum::extract::{Path, Query, Request, State};
use axum::http::header::{
    ACCEPT_RANGES, ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS,
    ACCESS_CONTROL_ALLOW_ORIGIN, CONTENT_LENGTH, CONTENT_RANGE, CONTENT_TYPE, RANGE,
};
use axum::http::{HeaderMap, HeaderValue, Method, Response, StatusCode, Uri};
use axum::middleware::{self, Next};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{http, Router};
use log::{debug, error, info, trace, warn};
use serde::Serialize;
use std::io;
use std::net::{Ipv4Addr, SocketAddr};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;

use crate::core::api::{
    ActionResponse, ErrorResponse, HealthResponse, MeteredQuery, MeteredResponse, StartQuery,
    StartResponse, TorrentStatusResponse,
};
use crate::core::stream::{self, MediaTypeFactory, Range, StreamProxy};
use crate::core::torrents::{InfoHash, Torrent, TorrentEngine, TorrentStatus};
use crate::VERSION;

const APPLICATION_JSON: &str = "application/json";
const ACCEPT_RANGES_TYPE: &str = "bytes";
/// The maximum time the proxy route waits for the torrent metadata.
const METADATA_WAIT_TIMEOUT: Duration = Duration::from_secs(60);
/// The interval between torrent state polls while waiting for metadata.
const METADATA_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// The loopback control api server of the application.
///
/// It exposes the torrent lifecycle operations and the range aware video
/// proxy over HTTP for a local player.
#[derive(Debug, Clone)]
pub struct ApiServer {
    inner: Arc<InnerApiServer>,
}

impl ApiServer {
    /// Try to create a new api server on the given loopback port.
    /// Port 0 lets the OS assign a free port.
    pub async fn new(engine: TorrentEngine, port: u16) -> io::Result<Self> {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, port)).await?;
        let addr = listener.local_addr()?;
        let inner = Arc::new(InnerApiServer {
            addr,
            proxy: StreamProxy::new(&engine),
            engine,
            media_type_factory: Default::default(),
            cancellation_token: Default::default(),
        });

        let state = inner.clone();
        tokio::spawn(async move {
            let cancellation_token = state.cancellation_token.clone();
            let router = Router::new()
                .route("/status/check", get(Self::do_get_health))
                .route("/status/{hash}", get(Self::do_get_status))
                .route("/start/{hash}", get(Self::do_get_start))
                .route("/pause/{hash}", get(Self::do_get_pause))
                .route("/stop/{hash}", get(Self::do_get_stop))
                .route("/network/metered", get(Self::do_get_metered))
                .route(
                    "/proxy/{hash}",
                    get(Self::do_get_proxy).head(Self::do_head_proxy),
                )
                .fallback(Self::do_fallback)
                .layer(middleware::from_fn(handle_cors))
                .with_state(state);

            if let Err(e) = axum::serve(listener, router)
                .with_graceful_shutdown(cancellation_token.cancelled_owned())
                .await
            {
                error!("Failed to start the api server, {}", e);
            }
        });

        info!("Api server is listening on {}", addr);
        Ok(Self { inner })
    }

    /// The address on which the server is listening.
    pub fn addr(&self) -> SocketAddr {
        self.inner.addr
    }

    /// The port on which the server is listening.
    pub fn port(&self) -> u16 {
        self.inner.addr.port()
    }

    async fn do_get_health() -> Response<Body> {
        InnerApiServer::json_response(
            StatusCode::OK,
            &HealthResponse {
                status: "ok".to_string(),
                platform: std::env::consts::OS.to_string(),
                version: VERSION.to_string(),
            },
        )
    }

    async fn do_get_start(
        State(state): State<Arc<InnerApiServer>>,
        Path(hash): Path<String>,
        Query(query): Query<StartQuery>,
    ) -> Response<Body> {
        state.handle_start_request(&hash, query).await
    }

    async fn do_get_status(
        State(state): State<Arc<InnerApiServer>>,
        Path(hash): Path<String>,
    ) -> Response<Body> {
        state.handle_status_request(&hash).await
    }

    async fn do_get_pause(
        State(state): State<Arc<InnerApiServer>>,
        Path(hash): Path<String>,
    ) -> Response<Body> {
        state.handle_pause_request(&hash).await
    }

    async fn do_get_stop(
        State(state): State<Arc<InnerApiServer>>,
        Path(hash): Path<String>,
    ) -> Response<Body> {
        state.handle_stop_request(&hash).await
    }

    async fn do_get_metered(
        State(state): State<Arc<InnerApiServer>>,
        Query(query): Query<MeteredQuery>,
    ) -> Response<Body> {
        state.handle_metered_request(query).await
    }

    async fn do_get_proxy(
        State(state): State<Arc<InnerApiServer>>,
        Path(hash): Path<String>,
        headers: HeaderMap,
    ) -> Response<Body> {
        state.handle_proxy_request(&hash, &headers, true).await
    }

    async fn do_head_proxy(
        State(state): State<Arc<InnerApiServer>>,
        Path(hash): Path<String>,
        headers: HeaderMap,
    ) -> Response<Body> {
        state.handle_proxy_request(&hash, &headers, false).await
    }

    async fn do_fallback(uri: Uri) -> Response<Body> {
        debug!("Received request for unknown route {}", uri);
        InnerApiServer::json_response(
            StatusCode::NOT_FOUND,
            &ErrorResponse {
                error: "Not found".to_string(),
                uri: Some(uri.to_string()),
            },
        )
    }
}

impl Drop for ApiServer {
    fn drop(&mut self) {
        if Arc::strong_count(&self.inner) == 1 {
            self.inner.cancellation_token.cancel();
        }
    }
}

/// Add the permissive CORS headers to every response.
/// Preflight requests are answered directly with an empty 200.
async fn handle_cors(request: Request, next: Next) -> Response<Body> {
    let mut response = if request.method() == Method::OPTIONS {
        Response::builder()
            .status(StatusCode::OK)
            .body(Body::empty())
            .unwrap_or_else(InnerApiServer::handle_internal_error)
    } else {
        next.run(request).await
    };

    let headers = response.headers_mut();
    headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    headers.insert(
        ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, OPTIONS"),
    );
    headers.insert(
        ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Range, Content-Type"),
    );
    response
}

/// The result of waiting for the torrent metadata on the proxy route.
enum MetadataWait {
    Ready(Torrent),
    NotFound,
    Failed,
    TimedOut,
}

#[derive(Debug)]
struct InnerApiServer {
    addr: SocketAddr,
    engine: TorrentEngine,
    proxy: StreamProxy,
    media_type_factory: MediaTypeFactory,
    cancellation_token: CancellationToken,
}

impl InnerApiServer {
    async fn handle_start_request(&self, hash: &str, query: StartQuery) -> Response<Body> {
        let info_hash = match InfoHash::from_str(hash) {
            Ok(e) => e,
            Err(e) => return Self::bad_request(e.to_string()),
        };

        trace!("Handling start request for {} with {:?}", info_hash, query);
        match self
            .engine
            .start_torrent(info_hash, query.file_idx, query.season, query.episode)
            .await
        {
            Ok(_) => Self::json_response(
                StatusCode::OK,
                &StartResponse {
                    status: "started".to_string(),
                    hash: info_hash.to_string(),
                    file_idx: query.file_idx,
                    season: query.season,
                    episode: query.episode,
                },
            ),
            Err(e) => {
                error!("Failed to start torrent {}, {}", info_hash, e);
                Self::json_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    &ErrorResponse::new(e.to_string()),
                )
            }
        }
    }

    async fn handle_status_request(&self, hash: &str) -> Response<Body> {
        let info_hash = match InfoHash::from_str(hash) {
            Ok(e) => e,
            Err(e) => return Self::bad_request(e.to_string()),
        };

        let torrent = match self.engine.state(&info_hash).await {
            None => {
                return Self::json_response(StatusCode::OK, &TorrentStatusResponse::not_started())
            }
            Some(e) => e,
        };
        let live = self.engine.status(&info_hash).await;

        let (peers, seeds, speed, progress) = live
            .map(|e| {
                (
                    Some(e.peers),
                    e.seeds,
                    Some(format!("{:.2}", e.download_rate_bps as f64 / 1024.0)),
                    Some(format!("{:.1}", e.progress * 100.0)),
                )
            })
            .unwrap_or((None, None, None, None));

        Self::json_response(
            StatusCode::OK,
            &TorrentStatusResponse {
                status: torrent.status.to_string(),
                metadata_ready: Some(torrent.metadata_ready),
                file_name: torrent.selected_file.as_ref().map(|e| e.name.clone()),
                file_size: torrent.selected_file.as_ref().map(|e| e.size),
                file_idx: torrent.selected_file.as_ref().map(|e| e.index),
                total_files: torrent.total_files,
                duration: None,
                peers,
                seeds,
                speed,
                progress,
            },
        )
    }

    async fn handle_pause_request(&self, hash: &str) -> Response<Body> {
        let info_hash = match InfoHash::from_str(hash) {
            Ok(e) => e,
            Err(e) => return Self::bad_request(e.to_string()),
        };

        self.engine.pause_torrent(&info_hash).await;
        Self::json_response(
            StatusCode::OK,
            &ActionResponse {
                status: "paused".to_string(),
                hash: info_hash.to_string(),
            },
        )
    }

    async fn handle_stop_request(&self, hash: &str) -> Response<Body> {
        let info_hash = match InfoHash::from_str(hash) {
            Ok(e) => e,
            Err(e) => return Self::bad_request(e.to_string()),
        };

        self.engine.remove_torrent(&info_hash).await;
        Self::json_response(
            StatusCode::OK,
            &ActionResponse {
                status: "removed".to_string(),
                hash: info_hash.to_string(),
            },
        )
    }

    async fn handle_metered_request(&self, query: MeteredQuery) -> Response<Body> {
        let enabled = match query.value.as_deref() {
            Some("true") => true,
            Some("false") => false,
            _ => return Self::bad_request("metered value must be true or false".to_string()),
        };

        self.engine.set_metered_mode(enabled).await;
        Self::json_response(
            StatusCode::OK,
            &MeteredResponse {
                status: "ok".to_string(),
                metered: enabled,
            },
        )
    }

    async fn handle_proxy_request(
        &self,
        hash: &str,
        headers: &HeaderMap,
        include_body: bool,
    ) -> Response<Body> {
        let info_hash = match InfoHash::from_str(hash) {
            Ok(e) => e,
            Err(e) => return Self::bad_request(e.to_string()),
        };

        let torrent = match self.await_metadata(&info_hash).await {
            MetadataWait::Ready(torrent) => torrent,
            MetadataWait::NotFound => {
                warn!("Torrent {} has not been started", info_hash);
                return Self::json_response(
                    StatusCode::NOT_FOUND,
                    &ErrorResponse::new(format!("no torrent has been started for {}", info_hash)),
                );
            }
            MetadataWait::Failed => {
                return Self::json_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    &ErrorResponse::new(format!("torrent {} is in an error state", info_hash)),
                );
            }
            MetadataWait::TimedOut => {
                return Self::json_response(
                    StatusCode::SERVICE_UNAVAILABLE,
                    &ErrorResponse::new(format!("torrent {} metadata is not yet known", info_hash)),
                );
            }
        };

        let file = match torrent.selected_file {
            Some(file) if file.size > 0 => file,
            _ => {
                return Self::json_response(
                    StatusCode::SERVICE_UNAVAILABLE,
                    &ErrorResponse::new(format!("torrent {} has no streamable file", info_hash)),
                )
            }
        };

        let range = match headers.get(RANGE) {
            None => None,
            Some(value) => {
                let value = match value.to_str() {
                    Ok(e) => e,
                    Err(_) => return Self::bad_request("range header is invalid".to_string()),
                };

                match Range::parse(value, file.size) {
                    Ok(range) => Some(range),
                    Err(e) => {
                        debug!("Range header \"{}\" is invalid, {}", value, e);
                        return Self::bad_request(format!("range header is invalid, {}", e));
                    }
                }
            }
        };

        trace!(
            "Handling video stream request for {} with range {}",
            info_hash,
            range
                .as_ref()
                .map(|e| e.to_string())
                .unwrap_or_else(|| "unknown".to_string())
        );
        let (start, end) = range
            .as_ref()
            .map(|e| (e.start, e.end))
            .unwrap_or((0, file.size - 1));

        let reader = match self.proxy.open_stream(info_hash, start, end).await {
            Ok(e) => e,
            Err(e) => {
                debug!("Failed to open stream for {}, {}", info_hash, e);
                return Self::stream_error_response(e);
            }
        };

        let media_type = self.media_type_factory.media_type(&file.name);
        let mut response = Response::builder()
            .header(ACCEPT_RANGES, ACCEPT_RANGES_TYPE)
            .header(CONTENT_TYPE, media_type.to_string())
            .header(CONTENT_LENGTH, reader.content_length());

        response = match range {
            None => response.status(StatusCode::OK),
            Some(_) => response
                .status(StatusCode::PARTIAL_CONTENT)
                .header(CONTENT_RANGE, reader.content_range()),
        };

        let body = if include_body {
            Body::from_stream(reader)
        } else {
            Body::empty()
        };

        response
            .body(body)
            .unwrap_or_else(Self::handle_internal_error)
    }

    /// Wait for the torrent metadata to become available.
    /// This polls the torrent state in small increments up to the metadata timeout.
    async fn await_metadata(&self, info_hash: &InfoHash) -> MetadataWait {
        let started = Instant::now();

        loop {
            match self.engine.state(info_hash).await {
                None => return MetadataWait::NotFound,
                Some(torrent) => {
                    if torrent.status == TorrentStatus::Error {
                        return MetadataWait::Failed;
                    }
                    if torrent.metadata_ready {
                        return MetadataWait::Ready(torrent);
                    }
                }
            }

            if started.elapsed() >= METADATA_WAIT_TIMEOUT {
                debug!("Timed out while waiting for metadata of {}", info_hash);
                return MetadataWait::TimedOut;
            }

            sleep(METADATA_POLL_INTERVAL).await;
        }
    }

    fn stream_error_response(error: stream::Error) -> Response<Body> {
        let status = match error {
            stream::Error::NotFound(_) => StatusCode::NOT_FOUND,
            stream::Error::NotReady => StatusCode::SERVICE_UNAVAILABLE,
            stream::Error::InvalidRange => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        Self::json_response(status, &ErrorResponse::new(error.to_string()))
    }

    fn bad_request(message: String) -> Response<Body> {
        Self::json_response(StatusCode::BAD_REQUEST, &ErrorResponse::new(message))
    }

    fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<Body> {
        let payload = serde_json::to_string(body).unwrap_or_else(|e| {
            error!("Failed to serialize response payload, {}", e);
            "{}".to_string()
        });

        Response::builder()
            .status(status)
            .header(CONTENT_TYPE, APPLICATION_JSON)
            .body(Body::from(payload))
            .unwrap_or_else(Self::handle_internal_error)
    }

    /// Handle an internal error that occurred while building a response.
    fn handle_internal_error(err: http::Error) -> Response<Body> {
        error!("Api server request failed, {}", err);
        (StatusCode::INTERNAL_SERVER_ERROR, Body::empty()).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::TorrentSettings;
    use crate::core::torrents::{
        FileEntry, FilePriority, FileStorage, MockTorrentSession, SessionEvent, TorrentHandle,
    };
    use crate::init_logger;
    use crate::testing::write_test_file;
    use fx_callback::MultiThreadedCallback;
    use reqwest::Client;
    use std::path::PathBuf;

    const TEST_HASH: &str = "aabbccddeeff00112233445566778899aabbccdd";

    async fn test_engine(session: MockTorrentSession, directory: PathBuf) -> TorrentEngine {
        TorrentEngine::new(
            Arc::new(session),
            TorrentSettings {
                directory,
                cleanup_after_hours: 72,
            },
        )
        .await
        .unwrap()
    }

    fn base_session(callbacks: &MultiThreadedCallback<SessionEvent>) -> MockTorrentSession {
        let mut session = MockTorrentSession::new();
        session.expect_start().returning(|| Ok(()));
        session.expect_stop().return_const(());
        let subscribe_callbacks = callbacks.clone();
        session
            .expect_subscribe()
            .returning(move || subscribe_callbacks.subscribe());
        session
    }

    fn loading_session(callbacks: &MultiThreadedCallback<SessionEvent>) -> MockTorrentSession {
        let mut session = base_session(callbacks);
        session
            .expect_add_magnet()
            .returning(|_, _, _| Ok(TorrentHandle::new()));
        session.expect_file_storage().returning(|_| None);
        session.expect_find().returning(|_| Some(TorrentHandle::new()));
        session.expect_pause().return_const(());
        session.expect_resume().return_const(());
        session.expect_remove().return_const(());
        session
    }

    fn ready_session(
        callbacks: &MultiThreadedCallback<SessionEvent>,
        filepath: PathBuf,
        size: u64,
    ) -> MockTorrentSession {
        let mut session = base_session(callbacks);
        session
            .expect_add_magnet()
            .returning(|_, _, _| Ok(TorrentHandle::new()));
        session.expect_file_storage().returning(move |_| {
            Some(FileStorage {
                piece_length: 1024,
                total_pieces: 10,
                files: vec![FileEntry {
                    index: 0,
                    relative_path: PathBuf::from("movie.mkv"),
                    path: filepath.clone(),
                    size,
                    offset: 0,
                }],
            })
        });
        session
            .expect_prioritize_files()
            .withf(|_, priorities| {
                priorities
                    .iter()
                    .filter(|(_, e)| *e == FilePriority::Normal)
                    .count()
                    == 1
            })
            .return_const(());
        session.expect_set_sequential_flag().return_const(());
        session.expect_set_sequential_range().return_const(());
        session.expect_set_piece_deadline().return_const(());
        session.expect_have_piece().returning(|_, _| true);
        session
    }

    async fn start_server(session: MockTorrentSession, directory: PathBuf) -> (ApiServer, TorrentEngine) {
        let engine = test_engine(session, directory).await;
        let server = ApiServer::new(engine.clone(), 0).await.unwrap();
        (server, engine)
    }

    fn server_url(server: &ApiServer, path: &str) -> String {
        format!("http://{}{}", server.addr(), path)
    }

    mod health {
        use super::*;

        #[tokio::test]
        async fn test_health_check() {
            init_logger!();
            let temp_dir = tempfile::tempdir().unwrap();
            let callbacks = MultiThreadedCallback::new();
            let (server, _engine) =
                start_server(base_session(&callbacks), temp_dir.path().to_path_buf()).await;
            let client = Client::new();

            let response = client
                .get(server_url(&server, "/status/check"))
                .send()
                .await
                .unwrap();

            assert_eq!(reqwest::StatusCode::OK, response.status());
            assert_eq!(
                "*",
                response
                    .headers()
                    .get("access-control-allow-origin")
                    .unwrap()
            );
            let body: serde_json::Value = response.json().await.unwrap();
            assert_eq!("ok", body["status"]);
            assert_eq!("1.0.0", body["version"]);
            assert!(body["platform"].is_string());
        }

        #[tokio::test]
        async fn test_unknown_route() {
            init_logger!();
            let temp_dir = tempfile::tempdir().unwrap();
            let callbacks = MultiThreadedCallback::new();
            let (server, _engine) =
                start_server(base_session(&callbacks), temp_dir.path().to_path_buf()).await;
            let client = Client::new();

            let response = client
                .get(server_url(&server, "/lorem/ipsum"))
                .send()
                .await
                .unwrap();

            assert_eq!(reqwest::StatusCode::NOT_FOUND, response.status());
            let body: serde_json::Value = response.json().await.unwrap();
            assert_eq!("Not found", body["error"]);
            assert_eq!("/lorem/ipsum", body["uri"]);
        }

        #[tokio::test]
        async fn test_options_preflight() {
            init_logger!();
            let temp_dir = tempfile::tempdir().unwrap();
            let callbacks = MultiThreadedCallback::new();
            let (server, _engine) =
                start_server(base_session(&callbacks), temp_dir.path().to_path_buf()).await;
            let client = Client::new();

            let response = client
                .request(
                    reqwest::Method::OPTIONS,
                    server_url(&server, &format!("/proxy/{}", TEST_HASH)),
                )
                .send()
                .await
                .unwrap();

            assert_eq!(reqwest::StatusCode::OK, response.status());
            assert_eq!(
                "GET, OPTIONS",
                response
                    .headers()
                    .get("access-control-allow-methods")
                    .unwrap()
            );
            assert_eq!(
                "Range, Content-Type",
                response
                    .headers()
                    .get("access-control-allow-headers")
                    .unwrap()
            );
            assert_eq!("", response.text().await.unwrap());
        }
    }

    mod lifecycle_routes {
        use super::*;

        #[tokio::test]
        async fn test_start_torrent() {
            init_logger!();
            let temp_dir = tempfile::tempdir().unwrap();
            let callbacks = MultiThreadedCallback::new();
            let (server, _engine) =
                start_server(loading_session(&callbacks), temp_dir.path().to_path_buf()).await;
            let client = Client::new();

            let response = client
                .get(server_url(
                    &server,
                    &format!("/start/{}?season=1&episode=2", TEST_HASH),
                ))
                .send()
                .await
                .unwrap();

            assert_eq!(reqwest::StatusCode::OK, response.status());
            let body: serde_json::Value = response.json().await.unwrap();
            assert_eq!("started", body["status"]);
            assert_eq!(TEST_HASH, body["hash"]);
            assert_eq!(1, body["season"]);
            assert_eq!(2, body["episode"]);

            let response = client
                .get(server_url(&server, &format!("/status/{}", TEST_HASH)))
                .send()
                .await
                .unwrap();
            let body: serde_json::Value = response.json().await.unwrap();
            assert_eq!("loading", body["status"]);
            assert_eq!(false, body["metadataReady"]);
        }

        #[tokio::test]
        async fn test_start_invalid_hash() {
            init_logger!();
            let temp_dir = tempfile::tempdir().unwrap();
            let callbacks = MultiThreadedCallback::new();
            let (server, _engine) =
                start_server(base_session(&callbacks), temp_dir.path().to_path_buf()).await;
            let client = Client::new();

            let response = client
                .get(server_url(&server, "/start/abc123"))
                .send()
                .await
                .unwrap();

            assert_eq!(reqwest::StatusCode::BAD_REQUEST, response.status());
        }

        #[tokio::test]
        async fn test_status_not_started() {
            init_logger!();
            let temp_dir = tempfile::tempdir().unwrap();
            let callbacks = MultiThreadedCallback::new();
            let (server, _engine) =
                start_server(base_session(&callbacks), temp_dir.path().to_path_buf()).await;
            let client = Client::new();

            let response = client
                .get(server_url(&server, &format!("/status/{}", TEST_HASH)))
                .send()
                .await
                .unwrap();

            assert_eq!(reqwest::StatusCode::OK, response.status());
            let body: serde_json::Value = response.json().await.unwrap();
            assert_eq!("not_started", body["status"]);
            assert!(body["fileName"].is_null());
            assert!(body["peers"].is_null());
        }

        #[tokio::test]
        async fn test_pause_and_stop() {
            init_logger!();
            let temp_dir = tempfile::tempdir().unwrap();
            let callbacks = MultiThreadedCallback::new();
            let (server, _engine) =
                start_server(loading_session(&callbacks), temp_dir.path().to_path_buf()).await;
            let client = Client::new();

            client
                .get(server_url(&server, &format!("/start/{}", TEST_HASH)))
                .send()
                .await
                .unwrap();

            let response = client
                .get(server_url(&server, &format!("/pause/{}", TEST_HASH)))
                .send()
                .await
                .unwrap();
            assert_eq!(reqwest::StatusCode::OK, response.status());
            let body: serde_json::Value = response.json().await.unwrap();
            assert_eq!("paused", body["status"]);

            let response = client
                .get(server_url(&server, &format!("/stop/{}", TEST_HASH)))
                .send()
                .await
                .unwrap();
            assert_eq!(reqwest::StatusCode::OK, response.status());
            let body: serde_json::Value = response.json().await.unwrap();
            assert_eq!("removed", body["status"]);

            let response = client
                .get(server_url(&server, &format!("/status/{}", TEST_HASH)))
                .send()
                .await
                .unwrap();
            let body: serde_json::Value = response.json().await.unwrap();
            assert_eq!("not_started", body["status"]);
        }

        #[tokio::test]
        async fn test_metered_mode() {
            init_logger!();
            let temp_dir = tempfile::tempdir().unwrap();
            let callbacks = MultiThreadedCallback::new();
            let (server, _engine) =
                start_server(loading_session(&callbacks), temp_dir.path().to_path_buf()).await;
            let client = Client::new();

            client
                .get(server_url(&server, &format!("/start/{}", TEST_HASH)))
                .send()
                .await
                .unwrap();

            let response = client
                .get(server_url(&server, "/network/metered?value=true"))
                .send()
                .await
                .unwrap();
            assert_eq!(reqwest::StatusCode::OK, response.status());
            let body: serde_json::Value = response.json().await.unwrap();
            assert_eq!("ok", body["status"]);
            assert_eq!(true, body["metered"]);

            let response = client
                .get(server_url(&server, &format!("/status/{}", TEST_HASH)))
                .send()
                .await
                .unwrap();
            let body: serde_json::Value = response.json().await.unwrap();
            assert_eq!("paused", body["status"]);

            let response = client
                .get(server_url(&server, "/network/metered?value=lorem"))
                .send()
                .await
                .unwrap();
            assert_eq!(reqwest::StatusCode::BAD_REQUEST, response.status());
        }
    }

    mod proxy_routes {
        use super::*;

        #[tokio::test]
        async fn test_proxy_unknown_torrent() {
            init_logger!();
            let temp_dir = tempfile::tempdir().unwrap();
            let callbacks = MultiThreadedCallback::new();
            let (server, _engine) =
                start_server(base_session(&callbacks), temp_dir.path().to_path_buf()).await;
            let client = Client::new();

            let response = client
                .get(server_url(&server, &format!("/proxy/{}", TEST_HASH)))
                .send()
                .await
                .unwrap();

            assert_eq!(reqwest::StatusCode::NOT_FOUND, response.status());
        }

        #[tokio::test]
        async fn test_proxy_full_file() {
            init_logger!();
            let temp_dir = tempfile::tempdir().unwrap();
            let contents = b"Lorem ipsum dolor sit amet, consectetur adipiscing elit";
            let filepath = write_test_file(temp_dir.path(), "movie.mkv", contents);
            let callbacks = MultiThreadedCallback::new();
            let session = ready_session(&callbacks, filepath, contents.len() as u64);
            let (server, _engine) = start_server(session, temp_dir.path().to_path_buf()).await;
            let client = Client::new();

            client
                .get(server_url(&server, &format!("/start/{}", TEST_HASH)))
                .send()
                .await
                .unwrap();

            let response = client
                .get(server_url(&server, &format!("/proxy/{}", TEST_HASH)))
                .send()
                .await
                .unwrap();

            assert_eq!(reqwest::StatusCode::OK, response.status());
            assert_eq!(
                "video/x-matroska",
                response.headers().get("content-type").unwrap()
            );
            assert_eq!(
                contents.len().to_string(),
                response.headers().get("content-length").unwrap().to_str().unwrap()
            );
            assert_eq!(
                "bytes",
                response.headers().get("accept-ranges").unwrap()
            );
            let body = response.bytes().await.unwrap();
            assert_eq!(contents.to_vec(), body.to_vec());
        }

        #[tokio::test]
        async fn test_proxy_range_request() {
            init_logger!();
            let temp_dir = tempfile::tempdir().unwrap();
            let contents = b"Lorem ipsum dolor sit amet, consectetur adipiscing elit";
            let filepath = write_test_file(temp_dir.path(), "movie.mkv", contents);
            let callbacks = MultiThreadedCallback::new();
            let session = ready_session(&callbacks, filepath, contents.len() as u64);
            let (server, _engine) = start_server(session, temp_dir.path().to_path_buf()).await;
            let client = Client::new();

            client
                .get(server_url(&server, &format!("/start/{}", TEST_HASH)))
                .send()
                .await
                .unwrap();

            let response = client
                .get(server_url(&server, &format!("/proxy/{}", TEST_HASH)))
                .header("range", "bytes=0-4")
                .send()
                .await
                .unwrap();

            assert_eq!(reqwest::StatusCode::PARTIAL_CONTENT, response.status());
            assert_eq!(
                format!("bytes 0-4/{}", contents.len()),
                response.headers().get("content-range").unwrap().to_str().unwrap()
            );
            assert_eq!(
                "5",
                response.headers().get("content-length").unwrap().to_str().unwrap()
            );
            let body = response.bytes().await.unwrap();
            assert_eq!(b"Lorem".to_vec(), body.to_vec());
        }

        #[tokio::test]
        async fn test_proxy_invalid_ranges() {
            init_logger!();
            let temp_dir = tempfile::tempdir().unwrap();
            let contents = b"Lorem ipsum dolor sit amet";
            let filepath = write_test_file(temp_dir.path(), "movie.mkv", contents);
            let callbacks = MultiThreadedCallback::new();
            let session = ready_session(&callbacks, filepath, contents.len() as u64);
            let (server, _engine) = start_server(session, temp_dir.path().to_path_buf()).await;
            let client = Client::new();

            client
                .get(server_url(&server, &format!("/start/{}", TEST_HASH)))
                .send()
                .await
                .unwrap();

            for range in [
                format!("bytes={}-", contents.len()),
                "bytes=0-10,20-30".to_string(),
                "bytes=10-5".to_string(),
                "lorem=0-10".to_string(),
            ] {
                let response = client
                    .get(server_url(&server, &format!("/proxy/{}", TEST_HASH)))
                    .header("range", &range)
                    .send()
                    .await
                    .unwrap();

                assert_eq!(
                    reqwest::StatusCode::BAD_REQUEST,
                    response.status(),
                    "expected range \"{}\" to be rejected",
                    range
                );
            }
        }

        #[tokio::test]
        async fn test_proxy_suffix_range() {
            init_logger!();
            let temp_dir = tempfile::tempdir().unwrap();
            let contents = b"Lorem ipsum dolor sit amet";
            let filepath = write_test_file(temp_dir.path(), "movie.mkv", contents);
            let callbacks = MultiThreadedCallback::new();
            let session = ready_session(&callbacks, filepath, contents.len() as u64);
            let (server, _engine) = start_server(session, temp_dir.path().to_path_buf()).await;
            let client = Client::new();

            client
                .get(server_url(&server, &format!("/start/{}", TEST_HASH)))
                .send()
                .await
                .unwrap();

            let response = client
                .get(server_url(&server, &format!("/proxy/{}", TEST_HASH)))
                .header("range", "bytes=-1")
                .send()
                .await
                .unwrap();

            assert_eq!(reqwest::StatusCode::PARTIAL_CONTENT, response.status());
            assert_eq!(
                "1",
                response.headers().get("content-length").unwrap().to_str().unwrap()
            );
            let body = response.bytes().await.unwrap();
            assert_eq!(b"t".to_vec(), body.to_vec());
        }

        #[tokio::test]
        async fn test_proxy_file_not_on_disk() {
            init_logger!();
            let temp_dir = tempfile::tempdir().unwrap();
            let callbacks = MultiThreadedCallback::new();
            let session = ready_session(
                &callbacks,
                temp_dir.path().join("missing.mkv"),
                5000,
            );
            let (server, _engine) = start_server(session, temp_dir.path().to_path_buf()).await;
            let client = Client::new();

            client
                .get(server_url(&server, &format!("/start/{}", TEST_HASH)))
                .send()
                .await
                .unwrap();

            let response = client
                .get(server_url(&server, &format!("/proxy/{}", TEST_HASH)))
                .send()
                .await
                .unwrap();

            assert_eq!(reqwest::StatusCode::SERVICE_UNAVAILABLE, response.status());
        }

        #[tokio::test]
        async fn test_proxy_head_request() {
            init_logger!();
            let temp_dir = tempfile::tempdir().unwrap();
            let contents = b"Lorem ipsum dolor sit amet";
            let filepath = write_test_file(temp_dir.path(), "movie.mkv", contents);
            let callbacks = MultiThreadedCallback::new();
            let session = ready_session(&callbacks, filepath, contents.len() as u64);
            let (server, _engine) = start_server(session, temp_dir.path().to_path_buf()).await;
            let client = Client::new();

            client
                .get(server_url(&server, &format!("/start/{}", TEST_HASH)))
                .send()
                .await
                .unwrap();

            let response = client
                .head(server_url(&server, &format!("/proxy/{}", TEST_HASH)))
                .send()
                .await
                .unwrap();

            assert_eq!(reqwest::StatusCode::OK, response.status());
            assert_eq!(
                "video/x-matroska",
                response.headers().get("content-type").unwrap()
            );
            assert_eq!("", response.text().await.unwrap());
        }
    }
}
