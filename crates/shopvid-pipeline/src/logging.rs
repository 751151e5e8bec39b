//! Structured logging for video operations.
//!
//! One logger follows one upload, review or download. Its events and span
//! carry the order id, and the video id as soon as one is known, so an upload
//! can be traced from file selection through confirmation.

use std::fmt::Display;

use tracing::{error, info, warn, Span};

use shopvid_models::{UploadStep, VideoId, VideoRecord};

/// Placeholder logged before the backend has allocated a video id.
const NO_VIDEO: &str = "-";

#[derive(Debug, Clone)]
pub struct OperationLogger {
    operation: &'static str,
    order_id: String,
    video_id: Option<VideoId>,
}

impl OperationLogger {
    /// Logger for an operation on an order whose video does not exist yet.
    pub fn new(operation: &'static str, order_id: impl Into<String>) -> Self {
        Self {
            operation,
            order_id: order_id.into(),
            video_id: None,
        }
    }

    /// Logger for an operation on an existing record.
    pub fn for_video(operation: &'static str, record: &VideoRecord) -> Self {
        Self {
            operation,
            order_id: record.order_id.clone(),
            video_id: Some(record.id.clone()),
        }
    }

    /// Attach the allocated video id to every later event.
    pub fn set_video(&mut self, video_id: VideoId) {
        self.video_id = Some(video_id);
    }

    pub fn operation(&self) -> &'static str {
        self.operation
    }

    pub fn order_id(&self) -> &str {
        &self.order_id
    }

    pub fn video_id(&self) -> Option<&VideoId> {
        self.video_id.as_ref()
    }

    fn video(&self) -> &str {
        self.video_id.as_ref().map_or(NO_VIDEO, VideoId::as_str)
    }

    pub fn log_start(&self, message: &str) {
        info!(
            operation = self.operation,
            order_id = %self.order_id,
            video_id = self.video(),
            "Started: {}", message
        );
    }

    /// A network step of an upload is about to run.
    pub fn log_step(&self, step: UploadStep) {
        info!(
            operation = self.operation,
            order_id = %self.order_id,
            video_id = self.video(),
            step = %step,
            "Running {} step", step
        );
    }

    pub fn log_step_failed(&self, step: UploadStep, err: &dyn Display) {
        error!(
            operation = self.operation,
            order_id = %self.order_id,
            video_id = self.video(),
            step = %step,
            "{} step failed: {}", step, err
        );
    }

    pub fn log_warning(&self, message: &str) {
        warn!(
            operation = self.operation,
            order_id = %self.order_id,
            video_id = self.video(),
            "{}", message
        );
    }

    pub fn log_failure(&self, err: &dyn Display) {
        error!(
            operation = self.operation,
            order_id = %self.order_id,
            video_id = self.video(),
            "Failed: {}", err
        );
    }

    pub fn log_completion(&self, message: &str) {
        info!(
            operation = self.operation,
            order_id = %self.order_id,
            video_id = self.video(),
            "Completed: {}", message
        );
    }

    /// Span wrapping the operation's network calls.
    pub fn span(&self) -> Span {
        tracing::info_span!(
            "video_operation",
            operation = self.operation,
            order_id = %self.order_id,
            video_id = self.video()
        )
    }
}
