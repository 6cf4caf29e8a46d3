use serde::{Deserialize, Serialize};

/// The health check response payload.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub platform: String,
    pub version: String,
}

/// The query parameters accepted by the start route.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartQuery {
    pub file_idx: Option<usize>,
    pub season: Option<u32>,
    pub episode: Option<u32>,
}

/// The response payload of the start route.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartResponse {
    pub status: String,
    pub hash: String,
    pub file_idx: Option<usize>,
    pub season: Option<u32>,
    pub episode: Option<u32>,
}

/// The live status payload of a torrent.
/// All fields are always present and null when unknown.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TorrentStatusResponse {
    pub status: String,
    pub metadata_ready: Option<bool>,
    pub file_name: Option<String>,
    pub file_size: Option<u64>,
    pub file_idx: Option<usize>,
    pub total_files: Option<usize>,
    pub duration: Option<u64>,
    pub peers: Option<usize>,
    pub seeds: Option<u64>,
    /// The download speed in KiB/s, formatted with two decimals.
    pub speed: Option<String>,
    /// The download progress in percent, formatted with one decimal.
    pub progress: Option<String>,
}

impl TorrentStatusResponse {
    /// The status payload of a torrent which hasn't been started.
    pub fn not_started() -> Self {
        Self {
            status: "not_started".to_string(),
            metadata_ready: None,
            file_name: None,
            file_size: None,
            file_idx: None,
            total_files: None,
            duration: None,
            peers: None,
            seeds: None,
            speed: None,
            progress: None,
        }
    }
}

/// The response payload of the pause and stop routes.
#[derive(Debug, Clone, Serialize)]
pub struct ActionResponse {
    pub status: String,
    pub hash: String,
}

/// The query parameters accepted by the metered route.
#[derive(Debug, Clone, Deserialize)]
pub struct MeteredQuery {
    pub value: Option<String>,
}

/// The response payload of the metered route.
#[derive(Debug, Clone, Serialize)]
pub struct MeteredResponse {
    pub status: String,
    pub metered: bool,
}

/// The generic error payload.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
}

impl ErrorResponse {
    pub fn new<S: Into<String>>(error: S) -> Self {
        Self {
            error: error.into(),
            uri: None,
        }
    }
}
