//! Pipeline configuration.

use std::path::PathBuf;
use std::time::Duration;

use shopvid_client::ApiClientConfig;
use shopvid_models::MAX_UPLOAD_BYTES;
use shopvid_storage::{StorageConfig, StorageResult};

/// Default deadline of each upload step and of a download (5 minutes).
pub const DEFAULT_STEP_TIMEOUT: Duration = Duration::from_secs(300);

/// Pipeline configuration.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Largest file accepted for upload
    pub max_upload_bytes: u64,
    /// Deadline for each network step of an upload, and for a download
    pub step_timeout: Duration,
    /// Directory downloaded videos are saved to
    pub download_dir: PathBuf,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_upload_bytes: MAX_UPLOAD_BYTES,
            step_timeout: DEFAULT_STEP_TIMEOUT,
            download_dir: default_download_dir(),
        }
    }
}

impl PipelineConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            max_upload_bytes: std::env::var("SHOPVID_MAX_UPLOAD_BYTES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(MAX_UPLOAD_BYTES),
            step_timeout: Duration::from_secs(
                std::env::var("SHOPVID_STEP_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_STEP_TIMEOUT.as_secs()),
            ),
            download_dir: std::env::var("SHOPVID_DOWNLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| default_download_dir()),
        }
    }
}

fn default_download_dir() -> PathBuf {
    std::env::temp_dir().join("shopvid-downloads")
}

/// Everything an embedding application needs to wire the pipeline.
#[derive(Debug, Clone)]
pub struct ShopVidConfig {
    pub api: ApiClientConfig,
    pub storage: StorageConfig,
    pub pipeline: PipelineConfig,
}

impl ShopVidConfig {
    /// Load `.env` if present, then read every section from the environment.
    pub fn load() -> StorageResult<Self> {
        dotenvy::dotenv().ok();
        Ok(Self {
            api: ApiClientConfig::from_env(),
            storage: StorageConfig::from_env()?,
            pipeline: PipelineConfig::from_env(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.max_upload_bytes, 104_857_600);
        assert_eq!(config.step_timeout, Duration::from_secs(300));
        assert!(config.download_dir.ends_with("shopvid-downloads"));
    }

    #[test]
    #[serial]
    fn test_from_env_overrides() {
        std::env::set_var("SHOPVID_MAX_UPLOAD_BYTES", "2048");
        std::env::set_var("SHOPVID_STEP_TIMEOUT_SECS", "7");
        std::env::set_var("SHOPVID_DOWNLOAD_DIR", "/data/videos");

        let config = PipelineConfig::from_env();
        assert_eq!(config.max_upload_bytes, 2048);
        assert_eq!(config.step_timeout, Duration::from_secs(7));
        assert_eq!(config.download_dir, PathBuf::from("/data/videos"));

        std::env::remove_var("SHOPVID_MAX_UPLOAD_BYTES");
        std::env::remove_var("SHOPVID_STEP_TIMEOUT_SECS");
        std::env::remove_var("SHOPVID_DOWNLOAD_DIR");
    }

    #[test]
    #[serial]
    fn test_unparseable_values_fall_back() {
        std::env::set_var("SHOPVID_STEP_TIMEOUT_SECS", "soon");
        let config = PipelineConfig::from_env();
        assert_eq!(config.step_timeout, Duration::from_secs(300));
        std::env::remove_var("SHOPVID_STEP_TIMEOUT_SECS");
    }
}
