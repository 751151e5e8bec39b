//! Derived video statistics for dashboards.
//!
//! Nothing here is persisted. Stats are rebuilt from the current record
//! collection on every read.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::video::VideoStatus;

/// Level of the shop -> district -> brand hierarchy a stat belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ScopeLevel {
    Overall,
    Shop,
    District,
    Brand,
}

impl ScopeLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScopeLevel::Overall => "overall",
            ScopeLevel::Shop => "shop",
            ScopeLevel::District => "district",
            ScopeLevel::Brand => "brand",
        }
    }
}

/// Raw per-status counts. Rates are derived from these, so rollups sum counts
/// and never average rates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
pub struct StatusCounts {
    pub total: u64,
    pub uploaded: u64,
    pub processing: u64,
    pub completed: u64,
    pub failed: u64,
}

impl StatusCounts {
    /// Count one record. Unknown statuses only count toward the total.
    pub fn record(&mut self, status: VideoStatus) {
        self.total += 1;
        match status {
            VideoStatus::Uploaded => self.uploaded += 1,
            VideoStatus::Processing => self.processing += 1,
            VideoStatus::Completed => self.completed += 1,
            VideoStatus::Failed => self.failed += 1,
            VideoStatus::Unknown => {}
        }
    }

    pub fn merge(&mut self, other: &StatusCounts) {
        self.total += other.total;
        self.uploaded += other.uploaded;
        self.processing += other.processing;
        self.completed += other.completed;
        self.failed += other.failed;
    }

    pub fn from_statuses<I: IntoIterator<Item = VideoStatus>>(statuses: I) -> Self {
        let mut counts = Self::default();
        for status in statuses {
            counts.record(status);
        }
        counts
    }
}

/// Percentage of `part` in `total`, one decimal, halves rounded up.
/// An empty total yields `"0.0"`.
pub fn format_rate(part: u64, total: u64) -> String {
    if total == 0 {
        return "0.0".to_string();
    }
    let pct = part as f64 / total as f64 * 100.0;
    format!("{:.1}", (pct * 10.0).round() / 10.0)
}

/// Video statistics for one scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AggregateStat {
    pub scope: String,
    pub total_videos: u64,
    pub uploaded_videos: u64,
    pub processing_videos: u64,
    pub completed_videos: u64,
    pub failed_videos: u64,
    pub completion_rate: String,
    pub error_rate: String,
}

impl AggregateStat {
    pub fn from_counts(scope: impl Into<String>, counts: StatusCounts) -> Self {
        Self {
            scope: scope.into(),
            total_videos: counts.total,
            uploaded_videos: counts.uploaded,
            processing_videos: counts.processing,
            completed_videos: counts.completed,
            failed_videos: counts.failed,
            completion_rate: format_rate(counts.completed, counts.total),
            error_rate: format_rate(counts.failed, counts.total),
        }
    }

    pub fn counts(&self) -> StatusCounts {
        StatusCounts {
            total: self.total_videos,
            uploaded: self.uploaded_videos,
            processing: self.processing_videos,
            completed: self.completed_videos,
            failed: self.failed_videos,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_rate_zero_total() {
        assert_eq!(format_rate(0, 0), "0.0");
    }

    #[test]
    fn test_format_rate_rounding() {
        assert_eq!(format_rate(1, 3), "33.3");
        assert_eq!(format_rate(2, 3), "66.7");
        assert_eq!(format_rate(1, 16), "6.3");
        assert_eq!(format_rate(5, 5), "100.0");
    }

    #[test]
    fn test_counts_and_stat() {
        use VideoStatus::*;
        let counts = StatusCounts::from_statuses([
            Completed, Completed, Completed, Completed, Completed, Failed, Failed, Processing,
            Processing, Uploaded,
        ]);
        let stat = AggregateStat::from_counts("shop-1", counts);
        assert_eq!(stat.total_videos, 10);
        assert_eq!(stat.completion_rate, "50.0");
        assert_eq!(stat.error_rate, "20.0");
        assert_eq!(stat.counts(), counts);
    }

    #[test]
    fn test_unknown_counts_toward_total_only() {
        let counts = StatusCounts::from_statuses([VideoStatus::Unknown, VideoStatus::Completed]);
        assert_eq!(counts.total, 2);
        assert_eq!(counts.completed, 1);
        assert_eq!(
            counts.uploaded + counts.processing + counts.completed + counts.failed,
            1
        );
    }

    #[test]
    fn test_stat_serializes_camel_case() {
        let stat = AggregateStat::from_counts("b1", StatusCounts::default());
        let json = serde_json::to_value(&stat).unwrap();
        assert_eq!(json["totalVideos"], 0);
        assert_eq!(json["completionRate"], "0.0");
        assert_eq!(json["errorRate"], "0.0");
    }
}
