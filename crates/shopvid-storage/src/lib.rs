//! Object-storage delivery layer.
//!
//! This crate provides:
//! - The storage base prefix and its configuration
//! - Playback and thumbnail URL resolution for video records
//! - Download target and filename derivation

pub mod delivery;
pub mod error;

pub use delivery::{
    download_filename, is_absolute_url, resolve_playback_url, resolve_thumbnail_url,
    DeliveryUrl, DeliveryUrlResolver, DownloadTarget, StorageConfig, DEFAULT_STORAGE_BASE_URL,
};
pub use error::{StorageError, StorageResult};
