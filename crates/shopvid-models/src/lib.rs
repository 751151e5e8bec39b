//! Shared data models for the ShopVid video pipeline.
//!
//! This crate provides Serde-serializable types for:
//! - Video records and their lifecycle status
//! - AI-detected problem keywords
//! - Upload selection, validation and session state
//! - Operator corrections
//! - Derived dashboard statistics

pub mod feedback;
pub mod keywords;
pub mod stats;
pub mod upload;
pub mod utils;
pub mod video;

// Re-export common types
pub use feedback::{CorrectionRequest, FeedbackChoice, PresetReason, NO_FEEDBACK_SENTINEL};
pub use keywords::{parse_detected_keywords, primary_problem, DetectedProblem};
pub use stats::{format_rate, AggregateStat, ScopeLevel, StatusCounts};
pub use upload::{
    validate_file, FailureKind, SelectedFile, UploadFailure, UploadState, UploadStep,
    ValidationError, DEFAULT_VIDEO_CONTENT_TYPE, MAX_UPLOAD_BYTES,
};
pub use utils::format_bytes;
pub use video::{classify, VideoId, VideoRecord, VideoStatus, VideoVariant};
