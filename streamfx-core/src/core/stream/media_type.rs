use derive_more::Display;

/// The fallback content type for unknown video containers.
const DEFAULT_VIDEO_TYPE: &str = "video/mp4";

/// The content type of a media resource.
#[derive(Debug, Display, Clone, PartialEq)]
#[display("{}", value)]
pub struct MediaType {
    value: String,
}

impl MediaType {
    fn new(value: &str) -> Self {
        Self {
            value: value.to_string(),
        }
    }
}

/// The factory resolving content types from media filenames.
#[derive(Debug, Default, Clone)]
pub struct MediaTypeFactory;

impl MediaTypeFactory {
    /// Get the content type for the given filename.
    /// Unknown extensions fall back to the default video content type.
    pub fn media_type(&self, filename: &str) -> MediaType {
        let extension = filename
            .rsplit_once('.')
            .map(|(_, extension)| extension.to_lowercase())
            .unwrap_or_default();

        let value = match extension.as_str() {
            "mkv" => "video/x-matroska",
            "mp4" | "m4v" => "video/mp4",
            "avi" => "video/x-msvideo",
            "webm" => "video/webm",
            "ts" => "video/mp2t",
            "mov" => "video/quicktime",
            "wmv" => "video/x-ms-wmv",
            "flv" => "video/x-flv",
            "3gp" => "video/3gpp",
            "mpg" | "mpeg" => "video/mpeg",
            "ogv" => "video/ogg",
            _ => DEFAULT_VIDEO_TYPE,
        };

        MediaType::new(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_media_type_matroska() {
        let factory = MediaTypeFactory::default();

        let result = factory.media_type("Show.S01E02.720p.mkv");

        assert_eq!("video/x-matroska", result.to_string());
    }

    #[test]
    fn test_media_type_mp4() {
        let factory = MediaTypeFactory::default();

        assert_eq!("video/mp4", factory.media_type("movie.mp4").to_string());
        assert_eq!("video/mp4", factory.media_type("movie.M4V").to_string());
    }

    #[test]
    fn test_media_type_unknown_extension() {
        let factory = MediaTypeFactory::default();

        let result = factory.media_type("movie.unknown");

        assert_eq!("video/mp4", result.to_string());
    }

    #[test]
    fn test_media_type_without_extension() {
        let factory = MediaTypeFactory::default();

        let result = factory.media_type("movie");

        assert_eq!("video/mp4", result.to_string());
    }
}
