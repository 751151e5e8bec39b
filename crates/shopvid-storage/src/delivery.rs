//! Video delivery URLs.
//!
//! Records store either absolute URLs or paths relative to the object-storage
//! bucket. Relative paths are made absolute by plain concatenation with the
//! storage base prefix; no slash normalization is applied, so links built from
//! already-stored paths stay byte-identical.

use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use shopvid_models::{VideoRecord, VideoVariant};

use crate::error::{StorageError, StorageResult};

// ============================================================================
// Configuration
// ============================================================================

/// Public prefix of the video bucket.
pub const DEFAULT_STORAGE_BASE_URL: &str =
    "https://storage.googleapis.com/shopvid-diagnostic-videos/";

/// Storage configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageConfig {
    /// Prefix prepended to relative storage paths.
    pub base_url: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_STORAGE_BASE_URL.to_string(),
        }
    }
}

impl StorageConfig {
    /// Create config from environment variables.
    pub fn from_env() -> StorageResult<Self> {
        match std::env::var("SHOPVID_STORAGE_BASE_URL") {
            Ok(base_url) => Self::with_base_url(base_url),
            Err(_) => Ok(Self::default()),
        }
    }

    /// Use a custom prefix. It must itself be absolute.
    pub fn with_base_url(base_url: impl Into<String>) -> StorageResult<Self> {
        let base_url = base_url.into();
        if !is_absolute_url(&base_url) {
            return Err(StorageError::config_error(format!(
                "storage base URL must be absolute: {}",
                base_url
            )));
        }
        Ok(Self { base_url })
    }
}

// ============================================================================
// Delivery URL Types
// ============================================================================

/// Playable URL for a record, with the variant it came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryUrl {
    pub url: String,
    pub variant: VideoVariant,
}

/// What a download needs: where to fetch and what to call the saved file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadTarget {
    pub url: String,
    pub filename: String,
}

/// True for `http://` and `https://` URLs.
pub fn is_absolute_url(value: &str) -> bool {
    match Url::parse(value) {
        Ok(url) => matches!(url.scheme(), "http" | "https"),
        Err(_) => false,
    }
}

// ============================================================================
// Resolver
// ============================================================================

/// Resolves stored paths into absolute delivery URLs.
#[derive(Debug, Clone, Default)]
pub struct DeliveryUrlResolver {
    config: StorageConfig,
}

impl DeliveryUrlResolver {
    pub fn new(config: StorageConfig) -> Self {
        Self { config }
    }

    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    /// Make a stored path absolute.
    ///
    /// Relative paths are appended to the base URL as stored, with no
    /// trimming or slash normalization.
    pub fn absolutize(&self, path: &str) -> String {
        if is_absolute_url(path) {
            path.to_string()
        } else {
            debug!(path, "Resolving relative storage path");
            format!("{}{}", self.config.base_url, path)
        }
    }

    /// First non-empty of stitched, processed, raw, made absolute.
    /// `None` when the record has no video at all.
    pub fn playback_url(&self, record: &VideoRecord) -> Option<DeliveryUrl> {
        record
            .effective_video_path()
            .map(|(variant, path)| DeliveryUrl {
                url: self.absolutize(path),
                variant,
            })
    }

    /// Thumbnail URL, resolved independently of the video URL.
    pub fn thumbnail_url(&self, record: &VideoRecord) -> Option<String> {
        record.thumbnail_path().map(|path| self.absolutize(path))
    }

    /// Fetch URL and local filename for saving a record's video.
    pub fn download_target(&self, record: &VideoRecord) -> Option<DownloadTarget> {
        let (_, path) = record.effective_video_path()?;
        Some(DownloadTarget {
            url: self.absolutize(path),
            filename: download_filename(path, record.id.as_str()),
        })
    }
}

/// Resolve the playback URL of a record against a storage config.
pub fn resolve_playback_url(record: &VideoRecord, config: &StorageConfig) -> Option<String> {
    DeliveryUrlResolver::new(config.clone())
        .playback_url(record)
        .map(|d| d.url)
}

/// Resolve the thumbnail URL of a record against a storage config.
pub fn resolve_thumbnail_url(record: &VideoRecord, config: &StorageConfig) -> Option<String> {
    DeliveryUrlResolver::new(config.clone()).thumbnail_url(record)
}

/// Local filename for a stored video: the last path segment, or
/// `video-{id}.mp4` when the path has none.
pub fn download_filename(storage_path: &str, video_id: &str) -> String {
    let without_query = storage_path
        .split(['?', '#'])
        .next()
        .unwrap_or_default();
    let segment = without_query
        .rsplit('/')
        .next()
        .unwrap_or_default();
    let decoded = urlencoding::decode(segment)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| segment.to_string());
    let name = decoded.trim();

    if name.is_empty() || name.contains(['/', '\\']) || name == "." || name == ".." {
        format!("video-{}.mp4", video_id)
    } else {
        name.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> VideoRecord {
        VideoRecord::new("42", "order-7")
    }

    #[test]
    fn test_absolute_detection() {
        assert!(is_absolute_url("https://cdn.example.com/a.mp4"));
        assert!(is_absolute_url("http://localhost:9000/a.mp4"));
        assert!(!is_absolute_url("videos/a.mp4"));
        assert!(!is_absolute_url("/videos/a.mp4"));
        assert!(!is_absolute_url("c:/videos/a.mp4"));
    }

    #[test]
    fn test_playback_none_when_all_empty() {
        let resolver = DeliveryUrlResolver::default();
        let mut r = record();
        assert_eq!(resolver.playback_url(&r), None);

        r.raw_video_url = Some(String::new());
        r.processed_video_url = Some("  ".into());
        assert_eq!(resolver.playback_url(&r), None);
    }

    #[test]
    fn test_playback_prefixes_relative_path_verbatim() {
        let resolver = DeliveryUrlResolver::default();
        let mut r = record();
        r.raw_video_url = Some("orders/7/raw.mp4".into());
        r.processed_video_url = Some("orders/7/processed.mp4".into());

        let url = resolver.playback_url(&r).unwrap();
        assert_eq!(url.variant, VideoVariant::Processed);
        assert_eq!(
            url.url,
            format!("{}orders/7/processed.mp4", DEFAULT_STORAGE_BASE_URL)
        );
    }

    #[test]
    fn test_relative_path_is_concatenated_byte_for_byte() {
        let resolver = DeliveryUrlResolver::default();
        assert_eq!(
            resolver.absolutize("/orders/7/raw.mp4 "),
            format!("{}/orders/7/raw.mp4 ", DEFAULT_STORAGE_BASE_URL)
        );

        let mut r = record();
        r.raw_video_url = Some(" orders/7/raw.mp4".into());
        assert_eq!(
            resolver.playback_url(&r).unwrap().url,
            format!("{} orders/7/raw.mp4", DEFAULT_STORAGE_BASE_URL)
        );
    }

    #[test]
    fn test_playback_keeps_absolute_url() {
        let mut r = record();
        r.stitched_video_url = Some("https://cdn.example.com/s.mp4".into());
        r.raw_video_url = Some("raw.mp4".into());
        assert_eq!(
            resolve_playback_url(&r, &StorageConfig::default()).as_deref(),
            Some("https://cdn.example.com/s.mp4")
        );
    }

    #[test]
    fn test_thumbnail_is_independent_of_video() {
        let config = StorageConfig::default();
        let mut r = record();
        r.thumbnail_url = Some("thumbs/42.jpg".into());
        assert_eq!(resolve_playback_url(&r, &config), None);
        assert_eq!(
            resolve_thumbnail_url(&r, &config),
            Some(format!("{}thumbs/42.jpg", DEFAULT_STORAGE_BASE_URL))
        );

        r.thumbnail_url = None;
        r.raw_video_url = Some("raw.mp4".into());
        assert_eq!(resolve_thumbnail_url(&r, &config), None);
        assert!(resolve_playback_url(&r, &config).is_some());
    }

    #[test]
    fn test_download_filename() {
        assert_eq!(download_filename("orders/7/final.mp4", "42"), "final.mp4");
        assert_eq!(
            download_filename("https://cdn.example.com/v/clip%20one.mp4?sig=abc", "42"),
            "clip one.mp4"
        );
        assert_eq!(download_filename("", "42"), "video-42.mp4");
        assert_eq!(download_filename("orders/7/", "42"), "video-42.mp4");
        assert_eq!(download_filename("a/%2E%2E", "42"), "video-42.mp4");
    }

    #[test]
    fn test_download_target() {
        let resolver = DeliveryUrlResolver::default();
        let mut r = record();
        r.raw_video_url = Some("orders/7/raw.mp4".into());
        let target = resolver.download_target(&r).unwrap();
        assert_eq!(target.filename, "raw.mp4");
        assert!(target.url.starts_with(DEFAULT_STORAGE_BASE_URL));
    }

    #[test]
    fn test_config_rejects_relative_base() {
        assert!(StorageConfig::with_base_url("bucket/").is_err());
        assert!(StorageConfig::with_base_url("https://cdn.example.com/").is_ok());
    }
}
