//! Upload session state and local file validation.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::utils::format_bytes;
use crate::video::VideoId;

/// Largest file accepted for upload (100 MB).
pub const MAX_UPLOAD_BYTES: u64 = 100 * 1024 * 1024;

/// Content type sent with the transfer when the file has none.
pub const DEFAULT_VIDEO_CONTENT_TYPE: &str = "video/mp4";

/// A local file the operator picked for upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedFile {
    pub path: PathBuf,
    pub name: String,
    /// MIME type as reported by the picker; may be empty.
    pub mime_type: String,
    pub size_bytes: u64,
}

impl SelectedFile {
    pub fn new(path: impl Into<PathBuf>, mime_type: impl Into<String>, size_bytes: u64) -> Self {
        let path = path.into();
        let name = file_name_of(&path);
        Self {
            path,
            name,
            mime_type: mime_type.into(),
            size_bytes,
        }
    }

    /// Describe a file on disk. The size is read from its metadata and the
    /// MIME type is guessed from the extension.
    pub fn from_path(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();
        let meta = std::fs::metadata(&path)?;
        if !meta.is_file() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} is not a regular file", path.display()),
            ));
        }
        Ok(Self::with_guessed_mime(path, meta.len()))
    }

    /// Build a selection whose MIME type is guessed from the file extension.
    pub fn with_guessed_mime(path: impl Into<PathBuf>, size_bytes: u64) -> Self {
        let path = path.into();
        let mime = mime_guess::from_path(&path)
            .first_raw()
            .unwrap_or_default()
            .to_string();
        Self::new(path, mime, size_bytes)
    }

    /// Content type for the storage PUT.
    pub fn content_type(&self) -> &str {
        let mime = self.mime_type.trim();
        if mime.is_empty() {
            DEFAULT_VIDEO_CONTENT_TYPE
        } else {
            mime
        }
    }
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Why a file was rejected before any network call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("File is too large ({}). Maximum size is {}.", fmt_size(.size), fmt_size(.max))]
    TooLarge { size: u64, max: u64 },

    #[error("Unsupported file type '{0}'. Please select a video file.")]
    NotVideo(String),

    #[error("Could not read '{name}': {reason}")]
    Unreadable { name: String, reason: String },
}

fn fmt_size(bytes: &u64) -> String {
    format_bytes(*bytes)
}

/// Check a selected file against the upload limits.
pub fn validate_file(file: &SelectedFile, max_bytes: u64) -> Result<(), ValidationError> {
    if file.size_bytes > max_bytes {
        return Err(ValidationError::TooLarge {
            size: file.size_bytes,
            max: max_bytes,
        });
    }
    if !file.mime_type.trim().starts_with("video/") {
        return Err(ValidationError::NotVideo(file.mime_type.clone()));
    }
    Ok(())
}

/// Network step of an upload sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadStep {
    Allocate,
    Transfer,
    Confirm,
}

impl UploadStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            UploadStep::Allocate => "allocate",
            UploadStep::Transfer => "transfer",
            UploadStep::Confirm => "confirm",
        }
    }
}

impl fmt::Display for UploadStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Category of a failed upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Validation,
    Allocation,
    Transport,
    Confirm,
    Timeout,
    OrderBusy,
}

/// Operator-facing failure carried by [`UploadState::Failed`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadFailure {
    pub kind: FailureKind,
    pub message: String,
    /// Video allocated before the failure, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_id: Option<VideoId>,
}

impl UploadFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            video_id: None,
        }
    }

    pub fn with_video(mut self, video_id: Option<VideoId>) -> Self {
        self.video_id = video_id;
        self
    }

    /// Confirmation can be re-invoked by hand after a confirm failure.
    pub fn can_retry_confirm(&self) -> bool {
        matches!(self.kind, FailureKind::Confirm) && self.video_id.is_some()
    }
}

/// State of the upload for one in-flight file.
///
/// `Idle -> FileSelected -> RequestingUrl -> TransferringBytes -> Confirming
/// -> Succeeded | Failed`. Rendering is derived from this value alone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum UploadState {
    #[default]
    Idle,
    FileSelected,
    RequestingUrl,
    TransferringBytes,
    Confirming,
    Succeeded { video_id: VideoId },
    Failed(UploadFailure),
}

impl UploadState {
    /// A network step is in flight.
    pub fn is_busy(&self) -> bool {
        matches!(
            self,
            UploadState::RequestingUrl | UploadState::TransferringBytes | UploadState::Confirming
        )
    }

    pub fn is_success(&self) -> bool {
        matches!(self, UploadState::Succeeded { .. })
    }

    pub fn failure(&self) -> Option<&UploadFailure> {
        match self {
            UploadState::Failed(f) => Some(f),
            _ => None,
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        self.failure().map(|f| f.message.as_str())
    }

    /// Short status line for the upload widget.
    pub fn label(&self) -> &'static str {
        match self {
            UploadState::Idle => "Select a video to upload",
            UploadState::FileSelected => "Ready to upload",
            UploadState::RequestingUrl => "Preparing upload...",
            UploadState::TransferringBytes => "Uploading video...",
            UploadState::Confirming => "Finalizing upload...",
            UploadState::Succeeded { .. } => "Video uploaded successfully",
            UploadState::Failed(_) => "Upload failed",
        }
    }
}
