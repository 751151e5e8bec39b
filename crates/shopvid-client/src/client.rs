//! Video API HTTP client.

use std::time::{Duration, Instant};

use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE};
use reqwest::{Body, Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use tokio_util::io::ReaderStream;
use tracing::{debug, info_span, Instrument};

use shopvid_models::{CorrectionRequest, SelectedFile, VideoId, VideoRecord};

use crate::error::{ApiError, ApiResult};
use crate::metrics::record_request;
use crate::types::{
    ConfirmRequest, ConfirmResponse, UploadAllocation, UploadUrlRequest, UploadUrlResponse,
    VideoListResponse, VideoResponse,
};

/// Configuration for the video API client.
#[derive(Debug, Clone)]
pub struct ApiClientConfig {
    /// Base URL of the backend API
    pub base_url: String,
    /// Timeout of each API call, and of connecting to storage
    pub timeout: Duration,
    /// Bearer token of the signed-in operator
    pub auth_token: Option<String>,
}

impl Default for ApiClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000/api".to_string(),
            timeout: Duration::from_secs(60),
            auth_token: None,
        }
    }
}

impl ApiClientConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            base_url: std::env::var("SHOPVID_API_URL")
                .unwrap_or_else(|_| "http://localhost:3000/api".to_string()),
            timeout: Duration::from_secs(
                std::env::var("SHOPVID_API_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(60),
            ),
            auth_token: std::env::var("SHOPVID_API_TOKEN")
                .ok()
                .filter(|t| !t.trim().is_empty()),
        }
    }

    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }
}

/// Client for the backend video endpoints.
///
/// Calls to the API carry the operator's bearer token and the configured
/// timeout. Calls to storage write URLs and download URLs carry neither:
/// those URLs are pre-authorized, and their transfers are bounded by the
/// caller.
#[derive(Debug, Clone)]
pub struct VideoApiClient {
    http: Client,
    config: ApiClientConfig,
}

impl VideoApiClient {
    /// Create a new API client.
    pub fn new(config: ApiClientConfig) -> ApiResult<Self> {
        if config.base_url.trim().is_empty() {
            return Err(ApiError::Config("API base URL is empty".to_string()));
        }
        let http = Client::builder()
            .connect_timeout(config.timeout)
            .build()
            .map_err(ApiError::Network)?;

        Ok(Self { http, config })
    }

    /// Create from environment variables.
    pub fn from_env() -> ApiResult<Self> {
        Self::new(ApiClientConfig::from_env())
    }

    pub fn config(&self) -> &ApiClientConfig {
        &self.config
    }

    /// Replace the bearer token, e.g. after a session refresh.
    pub fn set_auth_token(&mut self, token: Option<String>) {
        self.config.auth_token = token;
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    /// Bearer token and timeout for a call to the API.
    fn api_call(&self, request: RequestBuilder) -> RequestBuilder {
        let request = request.timeout(self.config.timeout);
        match &self.config.auth_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    // =========================================================================
    // Upload
    // =========================================================================

    /// Allocate a write URL and a new video record for an order.
    pub async fn request_upload_url(&self, order_id: &str) -> ApiResult<UploadAllocation> {
        let url = self.endpoint("/videos/upload-url");

        self.execute_request("request_upload_url", async {
            let response = self
                .api_call(self.http.post(&url))
                .json(&UploadUrlRequest { order_id })
                .send()
                .await?;
            let body: UploadUrlResponse = Self::parse_json(response).await?;
            body.into_allocation()
        })
        .await
    }

    /// Stream a file's bytes straight to a storage write URL.
    ///
    /// `Content-Length` is the length of the file as opened, whatever size
    /// the selection declares.
    pub async fn put_file(&self, upload_url: &str, file: &SelectedFile) -> ApiResult<()> {
        self.execute_request("put_file", async {
            let handle = tokio::fs::File::open(&file.path).await?;
            let length = handle.metadata().await?.len();
            let body = Body::wrap_stream(ReaderStream::new(handle));

            debug!(
                file = %file.name,
                bytes = length,
                content_type = file.content_type(),
                "Transferring file to storage"
            );

            let response = self
                .http
                .put(upload_url)
                .header(CONTENT_TYPE, file.content_type())
                .header(CONTENT_LENGTH, length)
                .body(body)
                .send()
                .await?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(ApiError::from_http_status(status.as_u16(), &body));
            }
            Ok(())
        })
        .await
    }

    /// Mark an allocated video as uploaded.
    ///
    /// The id goes back with the JSON type the allocation returned it in.
    pub async fn confirm_upload(&self, allocation: &UploadAllocation) -> ApiResult<()> {
        let url = self.endpoint("/videos/confirm");

        self.execute_request("confirm_upload", async {
            let response = self
                .api_call(self.http.post(&url))
                .json(&ConfirmRequest {
                    video_id: &allocation.wire_id,
                })
                .send()
                .await?;
            let body: ConfirmResponse = Self::parse_json(response).await?;
            if body.success {
                Ok(())
            } else {
                Err(ApiError::request_failed(
                    body.message
                        .unwrap_or_else(|| "Upload confirmation was rejected".to_string()),
                ))
            }
        })
        .await
    }

    // =========================================================================
    // Records
    // =========================================================================

    /// List the videos attached to a repair order.
    pub async fn list_by_order(&self, order_id: &str) -> ApiResult<Vec<VideoRecord>> {
        let url = self.endpoint(&format!(
            "/videos/by-order/{}",
            urlencoding::encode(order_id)
        ));

        self.execute_request("list_by_order", async {
            let response = self.api_call(self.http.get(&url)).send().await?;
            let body: VideoListResponse = Self::parse_json(response).await?;
            Ok(body.into_records())
        })
        .await
    }

    /// Write an operator correction onto a video.
    pub async fn update_review(
        &self,
        video_id: &VideoId,
        correction: &CorrectionRequest,
    ) -> ApiResult<VideoRecord> {
        let url = self.endpoint(&format!(
            "/videos/{}",
            urlencoding::encode(video_id.as_str())
        ));

        self.execute_request("update_review", async {
            let response = self
                .api_call(self.http.patch(&url))
                .json(correction)
                .send()
                .await?;
            let body: VideoResponse = Self::parse_json(response).await?;
            Ok(body.into_record())
        })
        .await
    }

    // =========================================================================
    // Delivery
    // =========================================================================

    /// Start fetching a stored video. The caller consumes the body stream.
    pub async fn open_download(&self, url: &str) -> ApiResult<Response> {
        self.execute_request("open_download", async {
            let response = self.http.get(url).send().await?;
            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(ApiError::from_http_status(status.as_u16(), &body));
            }
            Ok(response)
        })
        .await
    }

    // =========================================================================
    // Internals
    // =========================================================================

    async fn parse_json<T: DeserializeOwned>(response: Response) -> ApiResult<T> {
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(ApiError::from_http_status(status.as_u16(), &body));
        }
        serde_json::from_str(&body).map_err(ApiError::from)
    }

    async fn execute_request<T, F>(&self, operation: &str, fut: F) -> ApiResult<T>
    where
        F: std::future::Future<Output = ApiResult<T>>,
    {
        let span = info_span!("video_api_request", operation = %operation);

        let start = Instant::now();
        let result = fut.instrument(span).await;
        let latency_ms = start.elapsed().as_millis() as f64;

        let status = match &result {
            Ok(_) => 200,
            Err(e) => e.http_status().unwrap_or(0),
        };
        record_request(operation, status, latency_ms);

        result
    }
}
