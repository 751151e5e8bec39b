//! Video lifecycle pipeline for the shop dashboard.
//!
//! This crate provides:
//! - The upload coordinator (allocate, transfer, confirm) with preview handles
//!   and per-order claims
//! - The operator correction workflow
//! - Video downloads and playback URLs
//! - Per-scope statistics with shop, district and brand rollups
//! - The record repository these components share

pub mod aggregation;
pub mod config;
pub mod download;
pub mod error;
pub mod feedback;
pub mod logging;
pub mod metrics;
pub mod preview;
pub mod repository;
pub mod telemetry;
pub mod upload;

pub use aggregation::{
    awaiting_review, compute_stats, count_by_scope, overall_stats, recent_videos, rollup,
    DashboardStats, ScopeHierarchy,
};
pub use config::{PipelineConfig, ShopVidConfig, DEFAULT_STEP_TIMEOUT};
pub use download::{DownloadTracker, Downloader, SavedVideo};
pub use error::{
    DownloadError, DownloadResult, FeedbackError, FeedbackResult, UploadError, UploadResult,
};
pub use feedback::{submit_correction, CorrectionView, FeedbackForm};
pub use logging::OperationLogger;
pub use preview::{PreviewHandle, PreviewId, PreviewProvider, PreviewRegistry};
pub use repository::{InMemoryVideoRepository, VideoRepository};
pub use upload::{CancelHandle, OrderGuard, OrderLocks, UploadCoordinator, UploadSession};
