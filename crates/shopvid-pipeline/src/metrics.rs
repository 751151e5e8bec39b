//! Pipeline metrics.

use metrics::{counter, histogram};

/// Metric name constants for consistency.
pub mod names {
    /// Upload sequences by outcome and the step they ended at.
    pub const UPLOADS_TOTAL: &str = "shopvid_uploads_total";

    /// Size of transferred files.
    pub const UPLOAD_BYTES: &str = "shopvid_upload_bytes";

    /// Downloads by outcome.
    pub const DOWNLOADS_TOTAL: &str = "shopvid_downloads_total";

    /// Operator corrections by outcome.
    pub const CORRECTIONS_TOTAL: &str = "shopvid_corrections_total";
}

pub fn record_upload_outcome(outcome: &str, step: &str) {
    counter!(
        names::UPLOADS_TOTAL,
        "outcome" => outcome.to_string(),
        "step" => step.to_string()
    )
    .increment(1);
}

pub fn record_upload_bytes(bytes: u64) {
    histogram!(names::UPLOAD_BYTES).record(bytes as f64);
}

pub fn record_download(outcome: &str) {
    counter!(names::DOWNLOADS_TOTAL, "outcome" => outcome.to_string()).increment(1);
}

pub fn record_correction(outcome: &str) {
    counter!(names::CORRECTIONS_TOTAL, "outcome" => outcome.to_string()).increment(1);
}
