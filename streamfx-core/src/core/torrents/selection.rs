use log::{debug, trace};
use regex::Regex;

use crate::core::torrents::FileEntry;

/// The file extensions which are recognized as playable video files.
const VIDEO_EXTENSIONS: [&str; 13] = [
    "mkv", "mp4", "avi", "webm", "ts", "mov", "wmv", "flv", "m4v", "3gp", "mpg", "mpeg", "ogv",
];

/// Check if the given filename has a known video file extension.
pub fn is_video_file(filename: &str) -> bool {
    filename
        .rsplit_once('.')
        .map(|(_, extension)| {
            let extension = extension.to_lowercase();
            VIDEO_EXTENSIONS.contains(&extension.as_str())
        })
        .unwrap_or(false)
}

/// Compile the episode pattern for the given season and episode.
///
/// The pattern matches the common episode renderings such as `S01E02`, `s1e2`,
/// `1x02`, `S01.E02` and `S01_E02`, with leading zeros being optional.
/// Word boundaries prevent a partial match against other season/episode pairs.
pub fn episode_pattern(season: u32, episode: u32) -> Regex {
    Regex::new(&format!(
        r"(?i)(s0?{season}[.\s_-]?e0?{episode}\b)|(\b0?{season}x0?{episode}\b)"
    ))
    .expect("expected a valid episode pattern")
}

/// Select the file to stream from the given torrent files.
///
/// The selection priority is:
/// 1. The first video file matching the episode pattern when a season/episode pair is given.
/// 2. The file at `file_idx` when given and in range.
/// 3. The largest video file, falling back to the first file when the torrent
///    contains no video files at all.
///
/// It returns [None] when nothing can be selected.
pub fn select_file<'a>(
    files: &'a [FileEntry],
    file_idx: Option<usize>,
    season: Option<u32>,
    episode: Option<u32>,
) -> Option<&'a FileEntry> {
    if files.is_empty() {
        return None;
    }

    if let (Some(season), Some(episode)) = (season, episode) {
        let pattern = episode_pattern(season, episode);
        trace!(
            "Searching for episode s{:02}e{:02} within {} files",
            season,
            episode,
            files.len()
        );
        return files.iter().find(|file| {
            let filename = file.filename();
            is_video_file(&filename) && pattern.is_match(&filename)
        });
    }

    if let Some(index) = file_idx {
        if let Some(file) = files.get(index) {
            debug!("Selecting requested file index {} ({})", index, file.filename());
            return Some(file);
        }
    }

    files
        .iter()
        .filter(|file| is_video_file(&file.filename()))
        .max_by_key(|file| file.size)
        .or_else(|| {
            debug!("No video files found, falling back to the first file");
            files.first()
        })
}
