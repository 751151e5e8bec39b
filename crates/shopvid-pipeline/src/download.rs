//! Download and playback of stored videos.
//!
//! A download streams the effective video into a temporary file in the
//! download directory and then moves it to its final name. The temporary file
//! is removed on every failure path, and the busy flag is cleared however the
//! download ends.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::io::AsyncWriteExt;
use tracing::{debug, Instrument};

use shopvid_client::VideoApiClient;
use shopvid_models::VideoRecord;
use shopvid_storage::DeliveryUrlResolver;

use crate::config::DEFAULT_STEP_TIMEOUT;
use crate::error::{DownloadError, DownloadResult};
use crate::logging::OperationLogger;
use crate::metrics::record_download;

/// Shared "download in progress" flag.
#[derive(Debug, Clone, Default)]
pub struct DownloadTracker {
    busy: Arc<AtomicBool>,
}

impl DownloadTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }

    fn try_begin(&self) -> bool {
        self.busy
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }
}

/// A video saved to disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedVideo {
    pub path: PathBuf,
    pub filename: String,
    pub bytes: u64,
}

/// Fetches stored videos for local save.
#[derive(Debug, Clone)]
pub struct Downloader {
    client: VideoApiClient,
    resolver: DeliveryUrlResolver,
    download_dir: PathBuf,
    timeout: Duration,
    tracker: DownloadTracker,
}

impl Downloader {
    pub fn new(
        client: VideoApiClient,
        resolver: DeliveryUrlResolver,
        download_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            client,
            resolver,
            download_dir: download_dir.into(),
            timeout: DEFAULT_STEP_TIMEOUT,
            tracker: DownloadTracker::new(),
        }
    }

    /// Deadline for a whole download, from request to saved file.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Share the busy flag with other views.
    pub fn with_tracker(mut self, tracker: DownloadTracker) -> Self {
        self.tracker = tracker;
        self
    }

    pub fn tracker(&self) -> &DownloadTracker {
        &self.tracker
    }

    pub fn is_busy(&self) -> bool {
        self.tracker.is_busy()
    }

    /// Absolute URL to stream the record from, if it has any video.
    pub fn playback_url(&self, record: &VideoRecord) -> Option<String> {
        self.resolver.playback_url(record).map(|d| d.url)
    }

    /// Save a record's effective video into the download directory.
    pub async fn download_video(&self, record: &VideoRecord) -> DownloadResult<SavedVideo> {
        if !self.tracker.try_begin() {
            return Err(DownloadError::Busy);
        }
        let _busy = scopeguard::guard(Arc::clone(&self.tracker.busy), |flag| {
            flag.store(false, Ordering::SeqCst);
        });

        let logger = OperationLogger::for_video("download", record);
        logger.log_start("fetching video");

        let result = tokio::time::timeout(self.timeout, self.fetch_and_save(record))
            .instrument(logger.span())
            .await
            .unwrap_or(Err(DownloadError::TimedOut(self.timeout)));
        match &result {
            Ok(saved) => {
                record_download("succeeded");
                logger.log_completion(&format!(
                    "saved {} ({} bytes)",
                    saved.path.display(),
                    saved.bytes
                ));
            }
            Err(e) => {
                record_download("failed");
                logger.log_failure(e);
            }
        }
        result
    }

    async fn fetch_and_save(&self, record: &VideoRecord) -> DownloadResult<SavedVideo> {
        let target = self
            .resolver
            .download_target(record)
            .ok_or(DownloadError::NoVideo)?;

        let response = self.client.open_download(&target.url).await?;

        tokio::fs::create_dir_all(&self.download_dir).await?;
        let blob = tempfile::Builder::new()
            .prefix(".shopvid-")
            .suffix(".part")
            .tempfile_in(&self.download_dir)?;
        let mut file = tokio::fs::File::from_std(blob.reopen()?);

        let mut stream = response.bytes_stream();
        let mut bytes = 0u64;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| DownloadError::Fetch(e.to_string()))?;
            file.write_all(&chunk).await?;
            bytes += chunk.len() as u64;
        }
        file.flush().await?;
        drop(file);

        let path = available_path(&self.download_dir, &target.filename);
        debug!(path = %path.display(), bytes, "Persisting download");
        blob.persist_noclobber(&path)
            .map_err(|e| DownloadError::Io(e.error))?;

        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or(target.filename);
        Ok(SavedVideo {
            path,
            filename,
            bytes,
        })
    }
}

/// `dir/name`, or `dir/stem (n).ext` when that name is taken.
fn available_path(dir: &Path, filename: &str) -> PathBuf {
    let candidate = dir.join(filename);
    if !candidate.exists() {
        return candidate;
    }

    let name = Path::new(filename);
    let stem = name
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| filename.to_string());
    let ext = name.extension().map(|e| e.to_string_lossy().into_owned());

    (1..)
        .map(|n| match &ext {
            Some(ext) => dir.join(format!("{} ({}).{}", stem, n, ext)),
            None => dir.join(format!("{} ({})", stem, n)),
        })
        .find(|p| !p.exists())
        .unwrap_or(candidate)
}
