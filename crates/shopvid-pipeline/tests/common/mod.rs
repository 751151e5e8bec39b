//! Shared fixtures for pipeline integration tests.

#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use shopvid_client::{ApiClientConfig, VideoApiClient};
use shopvid_models::SelectedFile;
use shopvid_pipeline::{
    InMemoryVideoRepository, PipelineConfig, PreviewRegistry, UploadCoordinator,
};
use wiremock::MockServer;

pub fn client_for(server: &MockServer) -> VideoApiClient {
    VideoApiClient::new(ApiClientConfig {
        base_url: server.uri(),
        timeout: Duration::from_secs(10),
        auth_token: Some("operator-token".into()),
    })
    .unwrap()
}

pub struct Harness {
    pub coordinator: UploadCoordinator,
    pub repo: Arc<InMemoryVideoRepository>,
    pub previews: Arc<PreviewRegistry>,
}

pub fn harness(server: &MockServer, config: PipelineConfig) -> Harness {
    let repo = Arc::new(InMemoryVideoRepository::new());
    let previews = Arc::new(PreviewRegistry::new());
    let coordinator = UploadCoordinator::new(
        client_for(server),
        repo.clone(),
        previews.clone(),
        config,
    );
    Harness {
        coordinator,
        repo,
        previews,
    }
}

/// Write a file of `size` bytes and describe it as an mp4 selection.
pub fn mp4_on_disk(dir: &Path, name: &str, size: usize) -> SelectedFile {
    let path = dir.join(name);
    std::fs::write(&path, vec![0x42u8; size]).unwrap();
    SelectedFile::new(path, "video/mp4", size as u64)
}
