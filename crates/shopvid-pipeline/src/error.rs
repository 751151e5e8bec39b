//! Pipeline error types.

use std::time::Duration;

use thiserror::Error;

use shopvid_client::ApiError;
use shopvid_models::{FailureKind, UploadFailure, UploadStep, ValidationError, VideoId};

pub type UploadResult<T> = Result<T, UploadError>;
pub type FeedbackResult<T> = Result<T, FeedbackError>;
pub type DownloadResult<T> = Result<T, DownloadError>;

/// Operator-facing text for a failed download.
pub const DOWNLOAD_FAILED_NOTICE: &str = "Failed to download video. Please try again.";

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("{0}")]
    Validation(#[from] ValidationError),

    #[error("Could not prepare the upload: {0}")]
    Allocation(String),

    #[error("Video transfer failed: {0}")]
    Transport(String),

    #[error("Could not confirm the upload: {0}")]
    Confirm(String),

    #[error("Upload cancelled")]
    Cancelled,

    #[error("{step} step timed out after {}s", .timeout.as_secs())]
    Timeout { step: UploadStep, timeout: Duration },

    #[error("Another upload is already running for order {0}")]
    OrderBusy(String),

    #[error("Invalid upload state: {0}")]
    InvalidState(String),
}

impl UploadError {
    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }

    /// Wrap a client error as the failure of one upload step.
    pub fn from_api(step: UploadStep, err: ApiError) -> Self {
        let message = err.server_message();
        match step {
            UploadStep::Allocate => Self::Allocation(message),
            UploadStep::Transfer => Self::Transport(message),
            UploadStep::Confirm => Self::Confirm(message),
        }
    }

    /// Failure category recorded in the upload state. `None` for outcomes
    /// that do not end in `Failed`.
    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            Self::Validation(_) => Some(FailureKind::Validation),
            Self::Allocation(_) => Some(FailureKind::Allocation),
            Self::Transport(_) => Some(FailureKind::Transport),
            Self::Confirm(_) => Some(FailureKind::Confirm),
            Self::Timeout { step, .. } => Some(match step {
                UploadStep::Confirm => FailureKind::Confirm,
                _ => FailureKind::Timeout,
            }),
            Self::OrderBusy(_) => Some(FailureKind::OrderBusy),
            Self::Cancelled | Self::InvalidState(_) => None,
        }
    }

    pub fn to_failure(&self, video_id: Option<VideoId>) -> Option<UploadFailure> {
        self.failure_kind()
            .map(|kind| UploadFailure::new(kind, self.user_message()).with_video(video_id))
    }

    /// Readable message for the upload widget.
    pub fn user_message(&self) -> String {
        self.to_string()
    }
}

#[derive(Debug, Error)]
pub enum FeedbackError {
    #[error("Problem label is required")]
    MissingLabel,

    /// The server's message, verbatim.
    #[error("{0}")]
    Rejected(String),
}

impl From<ApiError> for FeedbackError {
    fn from(err: ApiError) -> Self {
        Self::Rejected(err.server_message())
    }
}

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("Video has no downloadable file")]
    NoVideo,

    #[error("A download is already in progress")]
    Busy,

    #[error("Fetch failed: {0}")]
    Fetch(String),

    #[error("Download timed out after {}s", .0.as_secs())]
    TimedOut(Duration),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<ApiError> for DownloadError {
    fn from(err: ApiError) -> Self {
        Self::Fetch(err.to_string())
    }
}

impl DownloadError {
    /// Download failures are reported to operators with one generic notice.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::Busy => "A download is already in progress",
            _ => DOWNLOAD_FAILED_NOTICE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_error_maps_to_step() {
        let err = UploadError::from_api(
            UploadStep::Allocate,
            ApiError::from_http_status(500, r#"{"message":"Order not found"}"#),
        );
        assert!(matches!(err, UploadError::Allocation(ref m) if m == "Order not found"));
        assert_eq!(err.failure_kind(), Some(FailureKind::Allocation));

        let err = UploadError::from_api(UploadStep::Transfer, ApiError::from_http_status(403, ""));
        assert_eq!(err.failure_kind(), Some(FailureKind::Transport));
    }

    #[test]
    fn test_confirm_timeout_stays_retryable() {
        let err = UploadError::Timeout {
            step: UploadStep::Confirm,
            timeout: Duration::from_secs(5),
        };
        let failure = err.to_failure(Some("9".into())).unwrap();
        assert!(failure.can_retry_confirm());
        assert_eq!(failure.message, "confirm step timed out after 5s");
    }

    #[test]
    fn test_cancel_is_not_a_failure() {
        assert!(UploadError::Cancelled.to_failure(None).is_none());
    }

    #[test]
    fn test_feedback_error_keeps_server_text() {
        let err: FeedbackError =
            ApiError::from_http_status(400, r#"{"error":"Video is locked"}"#).into();
        assert_eq!(err.to_string(), "Video is locked");
    }

    #[test]
    fn test_download_notice_is_generic() {
        let err = DownloadError::Fetch("HTTP 404".into());
        assert_eq!(err.user_message(), DOWNLOAD_FAILED_NOTICE);
    }
}
