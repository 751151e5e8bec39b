//! Video API request/response types.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use shopvid_models::{VideoId, VideoRecord};

use crate::error::{ApiError, ApiResult};

/// Body of `POST /videos/upload-url`.
#[derive(Debug, Clone, Serialize)]
pub struct UploadUrlRequest<'a> {
    pub order_id: &'a str,
}

/// Allocated video inside an upload-url response.
#[derive(Debug, Clone, Deserialize)]
pub struct AllocatedVideo {
    #[serde(default)]
    pub id: Option<Value>,
}

/// Response of `POST /videos/upload-url`.
///
/// The backend returns the new id either nested (`video.id`) or flat
/// (`videoId`); both are accepted.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadUrlResponse {
    #[serde(default)]
    pub upload_url: Option<String>,
    #[serde(default)]
    pub video: Option<AllocatedVideo>,
    #[serde(default)]
    pub video_id: Option<Value>,
}

/// A write URL plus the id of the record it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadAllocation {
    pub upload_url: String,
    pub video_id: VideoId,
    /// The id exactly as the backend sent it, string or number.
    pub wire_id: Value,
}

impl UploadUrlResponse {
    /// Both the write URL and the video id are required.
    pub fn into_allocation(self) -> ApiResult<UploadAllocation> {
        let upload_url = self
            .upload_url
            .filter(|u| !u.trim().is_empty())
            .ok_or_else(|| ApiError::invalid_response("upload URL missing from allocation"))?;
        let (video_id, wire_id) = self
            .video
            .and_then(|v| v.id)
            .and_then(id_of)
            .or_else(|| self.video_id.and_then(id_of))
            .ok_or_else(|| ApiError::invalid_response("video id missing from allocation"))?;
        Ok(UploadAllocation {
            upload_url,
            video_id,
            wire_id,
        })
    }
}

/// A usable id value and its string form. Blank strings and non-scalar
/// values are not ids.
fn id_of(value: Value) -> Option<(VideoId, Value)> {
    let id = match &value {
        Value::String(s) if !s.trim().is_empty() => s.clone(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    Some((VideoId::from_string(id), value))
}

/// Body of `POST /videos/confirm`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmRequest<'a> {
    pub video_id: &'a Value,
}

/// Response of `POST /videos/confirm`.
#[derive(Debug, Clone, Deserialize)]
pub struct ConfirmResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
}

/// `GET /videos/by-order/{id}` returns a bare array; some deployments wrap it.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum VideoListResponse {
    List(Vec<VideoRecord>),
    Wrapped { videos: Vec<VideoRecord> },
}

impl VideoListResponse {
    pub fn into_records(self) -> Vec<VideoRecord> {
        match self {
            VideoListResponse::List(records) => records,
            VideoListResponse::Wrapped { videos } => videos,
        }
    }
}

/// `PATCH /videos/{id}` returns the updated record, bare or wrapped.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum VideoResponse {
    Wrapped { video: VideoRecord },
    Bare(VideoRecord),
}

impl VideoResponse {
    pub fn into_record(self) -> VideoRecord {
        match self {
            VideoResponse::Wrapped { video } => video,
            VideoResponse::Bare(record) => record,
        }
    }
}
