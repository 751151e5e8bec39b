//! Video record models and lifecycle status.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

use crate::utils::{non_empty, opt_string_or_number, string_or_number};

/// Identifier of a video record, as allocated by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VideoId(#[serde(deserialize_with = "string_or_number")] pub String);

impl VideoId {
    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VideoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for VideoId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for VideoId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Lifecycle status of a video record.
///
/// The backend only ever writes the first four values. Anything else,
/// including a missing or null field, classifies as `Unknown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum VideoStatus {
    /// Bytes confirmed, waiting for the AI pipeline
    Uploaded,
    /// AI pipeline is working on the video
    Processing,
    /// AI pipeline finished successfully
    Completed,
    /// AI pipeline gave up
    Failed,
    /// Unrecognized or missing status
    #[default]
    Unknown,
}

impl VideoStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VideoStatus::Uploaded => "uploaded",
            VideoStatus::Processing => "processing",
            VideoStatus::Completed => "completed",
            VideoStatus::Failed => "failed",
            VideoStatus::Unknown => "unknown",
        }
    }

    /// Parse a raw status string. Never fails.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "uploaded" => VideoStatus::Uploaded,
            "processing" => VideoStatus::Processing,
            "completed" => VideoStatus::Completed,
            "failed" => VideoStatus::Failed,
            _ => VideoStatus::Unknown,
        }
    }

    /// Check if this is a terminal state (no more updates expected).
    pub fn is_terminal(&self) -> bool {
        matches!(self, VideoStatus::Completed | VideoStatus::Failed)
    }

    fn rank(&self) -> u8 {
        match self {
            VideoStatus::Unknown => 0,
            VideoStatus::Uploaded => 1,
            VideoStatus::Processing => 2,
            VideoStatus::Completed | VideoStatus::Failed => 3,
        }
    }

    /// Whether moving from `self` to `next` respects the forward-only lifecycle
    /// `uploaded -> processing -> completed | failed`.
    pub fn can_transition_to(&self, next: VideoStatus) -> bool {
        if *self == next {
            return true;
        }
        if self.is_terminal() {
            return false;
        }
        next.rank() > self.rank()
    }
}

impl fmt::Display for VideoStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl<'de> Deserialize<'de> for VideoStatus {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Option::<serde_json::Value>::deserialize(deserializer)?;
        Ok(match raw {
            Some(serde_json::Value::String(s)) => VideoStatus::parse(&s),
            _ => VideoStatus::Unknown,
        })
    }
}

/// Which stored variant of a video a URL refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VideoVariant {
    Stitched,
    Processed,
    Raw,
}

impl VideoVariant {
    /// Playback priority, highest first.
    pub const PRIORITY: [VideoVariant; 3] =
        [VideoVariant::Stitched, VideoVariant::Processed, VideoVariant::Raw];

    pub fn as_str(&self) -> &'static str {
        match self {
            VideoVariant::Stitched => "stitched",
            VideoVariant::Processed => "processed",
            VideoVariant::Raw => "raw",
        }
    }
}

/// A diagnostic video tied to a repair order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoRecord {
    pub id: VideoId,

    #[serde(deserialize_with = "string_or_number")]
    pub order_id: String,

    #[serde(default, deserialize_with = "opt_string_or_number")]
    pub shop_id: Option<String>,

    #[serde(default, deserialize_with = "opt_string_or_number")]
    pub brand_id: Option<String>,

    #[serde(default)]
    pub status: VideoStatus,

    #[serde(default)]
    pub raw_video_url: Option<String>,

    #[serde(default)]
    pub processed_video_url: Option<String>,

    #[serde(default)]
    pub stitched_video_url: Option<String>,

    #[serde(default)]
    pub thumbnail_url: Option<String>,

    /// Either a JSON-encoded string or already-structured data.
    /// See [`crate::keywords::parse_detected_keywords`].
    #[serde(default)]
    pub detected_keywords: Option<serde_json::Value>,

    /// Duration in seconds
    #[serde(default)]
    pub duration: Option<f64>,

    #[serde(default)]
    pub transcription_text: Option<String>,

    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,

    /// Set once an operator has reviewed the AI classification.
    #[serde(default)]
    pub user_selected_vid: Option<bool>,

    #[serde(default)]
    pub problem_label: Option<String>,

    #[serde(default)]
    pub feedback_reason: Option<String>,
}

impl VideoRecord {
    /// Create a bare record for an order. Mostly useful for fixtures.
    pub fn new(id: impl Into<VideoId>, order_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            order_id: order_id.into(),
            shop_id: None,
            brand_id: None,
            status: VideoStatus::Unknown,
            raw_video_url: None,
            processed_video_url: None,
            stitched_video_url: None,
            thumbnail_url: None,
            detected_keywords: None,
            duration: None,
            transcription_text: None,
            created_at: None,
            user_selected_vid: None,
            problem_label: None,
            feedback_reason: None,
        }
    }

    /// Lifecycle classification of this record.
    pub fn classify(&self) -> VideoStatus {
        self.status
    }

    /// Stored path for one variant, if non-empty.
    pub fn variant_path(&self, variant: VideoVariant) -> Option<&str> {
        let field = match variant {
            VideoVariant::Stitched => &self.stitched_video_url,
            VideoVariant::Processed => &self.processed_video_url,
            VideoVariant::Raw => &self.raw_video_url,
        };
        non_empty(field.as_deref())
    }

    /// The stored path used for playback: stitched, then processed, then raw.
    pub fn effective_video_path(&self) -> Option<(VideoVariant, &str)> {
        VideoVariant::PRIORITY
            .iter()
            .find_map(|v| self.variant_path(*v).map(|path| (*v, path)))
    }

    /// A record is playable when any video URL field is set.
    pub fn is_playable(&self) -> bool {
        self.effective_video_path().is_some()
    }

    pub fn thumbnail_path(&self) -> Option<&str> {
        non_empty(self.thumbnail_url.as_deref())
    }

    /// Whether an operator has already corrected this record.
    pub fn is_reviewed(&self) -> bool {
        self.user_selected_vid.unwrap_or(false)
    }

    /// Merge a newer copy of the same record into this one.
    ///
    /// Fields the incoming copy leaves out keep their stored value, so a
    /// partial response never erases what is already known. The status only
    /// moves forward, and an unknown incoming status leaves it untouched.
    /// Returns `false` when the incoming status was dropped because it would
    /// regress the lifecycle.
    pub fn absorb(&mut self, incoming: VideoRecord) -> bool {
        let accepted = match incoming.status {
            VideoStatus::Unknown => true,
            next if self.status.can_transition_to(next) => {
                self.status = next;
                true
            }
            _ => false,
        };

        if !incoming.order_id.is_empty() {
            self.order_id = incoming.order_id;
        }
        keep_known(&mut self.shop_id, incoming.shop_id);
        keep_known(&mut self.brand_id, incoming.brand_id);
        keep_known(&mut self.raw_video_url, incoming.raw_video_url);
        keep_known(&mut self.processed_video_url, incoming.processed_video_url);
        keep_known(&mut self.stitched_video_url, incoming.stitched_video_url);
        keep_known(&mut self.thumbnail_url, incoming.thumbnail_url);
        keep_known(&mut self.detected_keywords, incoming.detected_keywords);
        keep_known(&mut self.duration, incoming.duration);
        keep_known(&mut self.transcription_text, incoming.transcription_text);
        keep_known(&mut self.created_at, incoming.created_at);
        keep_known(&mut self.user_selected_vid, incoming.user_selected_vid);
        keep_known(&mut self.problem_label, incoming.problem_label);
        keep_known(&mut self.feedback_reason, incoming.feedback_reason);
        accepted
    }
}

fn keep_known<T>(slot: &mut Option<T>, incoming: Option<T>) {
    if incoming.is_some() {
        *slot = incoming;
    }
}

/// Classify a record's lifecycle state. Never fails.
pub fn classify(record: &VideoRecord) -> VideoStatus {
    record.classify()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_parse_is_lenient() {
        assert_eq!(VideoStatus::parse("completed"), VideoStatus::Completed);
        assert_eq!(VideoStatus::parse(" PROCESSING "), VideoStatus::Processing);
        assert_eq!(VideoStatus::parse("queued"), VideoStatus::Unknown);
        assert_eq!(VideoStatus::parse(""), VideoStatus::Unknown);
    }

    #[test]
    fn test_status_deserialize_unknown_and_missing() {
        let record: VideoRecord =
            serde_json::from_str(r#"{"id": 1, "order_id": 9, "status": "weird"}"#).unwrap();
        assert_eq!(classify(&record), VideoStatus::Unknown);

        let record: VideoRecord =
            serde_json::from_str(r#"{"id": 1, "order_id": 9, "status": null}"#).unwrap();
        assert_eq!(classify(&record), VideoStatus::Unknown);

        let record: VideoRecord = serde_json::from_str(r#"{"id": 1, "order_id": 9}"#).unwrap();
        assert_eq!(classify(&record), VideoStatus::Unknown);
    }

    #[test]
    fn test_status_transitions_are_monotonic() {
        use VideoStatus::*;
        assert!(Uploaded.can_transition_to(Processing));
        assert!(Processing.can_transition_to(Completed));
        assert!(Processing.can_transition_to(Failed));
        assert!(Uploaded.can_transition_to(Failed));
        assert!(Unknown.can_transition_to(Uploaded));

        assert!(!Processing.can_transition_to(Uploaded));
        assert!(!Completed.can_transition_to(Processing));
        assert!(!Completed.can_transition_to(Failed));
        assert!(!Failed.can_transition_to(Completed));
        assert!(!Uploaded.can_transition_to(Unknown));
    }

    #[test]
    fn test_effective_path_priority() {
        let mut record = VideoRecord::new("v1", "o1");
        assert_eq!(record.effective_video_path(), None);
        assert!(!record.is_playable());

        record.raw_video_url = Some("raw/a.mp4".into());
        assert_eq!(
            record.effective_video_path(),
            Some((VideoVariant::Raw, "raw/a.mp4"))
        );

        record.processed_video_url = Some("processed/a.mp4".into());
        assert_eq!(
            record.effective_video_path(),
            Some((VideoVariant::Processed, "processed/a.mp4"))
        );

        record.stitched_video_url = Some("   ".into());
        assert_eq!(
            record.effective_video_path().map(|(v, _)| v),
            Some(VideoVariant::Processed)
        );

        record.stitched_video_url = Some("stitched/a.mp4".into());
        assert_eq!(
            record.effective_video_path(),
            Some((VideoVariant::Stitched, "stitched/a.mp4"))
        );
    }

    #[test]
    fn test_absorb_never_regresses_status() {
        let mut record = VideoRecord::new("v1", "o1");
        record.status = VideoStatus::Completed;

        let mut stale = VideoRecord::new("v1", "o1");
        stale.status = VideoStatus::Processing;
        stale.problem_label = Some("Brake noise".into());

        assert!(!record.absorb(stale));
        assert_eq!(record.status, VideoStatus::Completed);
        assert_eq!(record.problem_label.as_deref(), Some("Brake noise"));
    }

    #[test]
    fn test_absorb_keeps_fields_missing_from_incoming() {
        let mut record = VideoRecord::new("v1", "o1");
        record.status = VideoStatus::Uploaded;
        record.shop_id = Some("4".into());
        record.raw_video_url = Some("raw/1.mp4".into());

        let mut partial: VideoRecord =
            serde_json::from_str(r#"{"id": "v1", "order_id": "o1", "status": "pending"}"#)
                .unwrap();
        partial.user_selected_vid = Some(true);

        assert!(record.absorb(partial));
        assert_eq!(record.status, VideoStatus::Uploaded);
        assert_eq!(record.shop_id.as_deref(), Some("4"));
        assert_eq!(record.raw_video_url.as_deref(), Some("raw/1.mp4"));
        assert_eq!(record.user_selected_vid, Some(true));
    }

    #[test]
    fn test_deserialize_backend_record() {
        let json = r#"{
            "id": 17,
            "order_id": "RO-2231",
            "shop_id": 4,
            "brand_id": null,
            "status": "completed",
            "raw_video_url": "videos/raw/17.mp4",
            "processed_video_url": "",
            "stitched_video_url": null,
            "thumbnail_url": "thumbs/17.jpg",
            "detected_keywords": "[]",
            "duration": 42.5,
            "created_at": "2024-05-01T10:00:00Z",
            "user_selected_vid": false
        }"#;
        let record: VideoRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.id.as_str(), "17");
        assert_eq!(record.shop_id.as_deref(), Some("4"));
        assert_eq!(record.brand_id, None);
        assert_eq!(record.status, VideoStatus::Completed);
        assert_eq!(
            record.effective_video_path(),
            Some((VideoVariant::Raw, "videos/raw/17.mp4"))
        );
        assert!(!record.is_reviewed());
    }
}
