//! REST client for the ShopVid video API.
//!
//! Covers upload allocation and confirmation, the raw byte transfer to a
//! pre-authorized storage URL, per-order listing, operator corrections and
//! streaming downloads.

pub mod client;
pub mod error;
pub mod metrics;
pub mod types;

pub use client::{ApiClientConfig, VideoApiClient};
pub use error::{ApiError, ApiResult};
pub use types::UploadAllocation;
