//! Operator corrections of AI classifications.

use serde::Serialize;
use tracing::{info, warn};

use shopvid_client::VideoApiClient;
use shopvid_models::{
    parse_detected_keywords, primary_problem, CorrectionRequest, DetectedProblem, FeedbackChoice,
    PresetReason, VideoId, VideoRecord, VideoStatus,
};
use shopvid_storage::DeliveryUrlResolver;

use crate::error::{FeedbackError, FeedbackResult};
use crate::metrics::record_correction;
use crate::repository::VideoRepository;

/// Correction form for one video.
///
/// A preset reason and free text are mutually exclusive: choosing one
/// replaces the other.
#[derive(Debug, Clone)]
pub struct FeedbackForm {
    video_id: VideoId,
    problem_label: String,
    choice: Option<FeedbackChoice>,
    error: Option<String>,
    open: bool,
}

impl FeedbackForm {
    pub fn new(video_id: VideoId) -> Self {
        Self {
            video_id,
            problem_label: String::new(),
            choice: None,
            error: None,
            open: true,
        }
    }

    /// Open the form prefilled from a record's current classification.
    pub fn for_record(record: &VideoRecord) -> Self {
        let mut form = Self::new(record.id.clone());
        form.problem_label = match record.problem_label.as_deref() {
            Some(label) if !label.trim().is_empty() => label.to_string(),
            _ => primary_problem(record.detected_keywords.as_ref()).problem,
        };
        form
    }

    pub fn video_id(&self) -> &VideoId {
        &self.video_id
    }

    pub fn problem_label(&self) -> &str {
        &self.problem_label
    }

    pub fn set_problem_label(&mut self, label: impl Into<String>) {
        self.problem_label = label.into();
    }

    pub fn choice(&self) -> Option<&FeedbackChoice> {
        self.choice.as_ref()
    }

    pub fn select_preset(&mut self, reason: PresetReason) {
        self.choice = Some(FeedbackChoice::Preset(reason));
    }

    /// Typing free text drops any preset.
    pub fn set_custom_text(&mut self, text: impl Into<String>) {
        self.choice = Some(FeedbackChoice::Custom(text.into()));
    }

    pub fn clear_reason(&mut self) {
        self.choice = None;
    }

    /// Server message from the last failed submit.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    /// The PATCH body this form would send.
    pub fn request(&self) -> CorrectionRequest {
        CorrectionRequest::new(self.problem_label.trim(), self.choice.as_ref())
    }

    /// Send the correction.
    ///
    /// On success the form closes and the stored record carries the new
    /// review fields. On failure the form stays open with the server's
    /// message; resubmitting is up to the operator.
    pub async fn submit(
        &mut self,
        client: &VideoApiClient,
        repo: &dyn VideoRepository,
    ) -> FeedbackResult<VideoRecord> {
        match submit_correction(client, repo, &self.video_id, self.request()).await {
            Ok(record) => {
                self.error = None;
                self.open = false;
                Ok(record)
            }
            Err(err) => {
                self.error = Some(err.to_string());
                Err(err)
            }
        }
    }
}

/// PATCH a correction and store the updated record.
pub async fn submit_correction(
    client: &VideoApiClient,
    repo: &dyn VideoRepository,
    video_id: &VideoId,
    request: CorrectionRequest,
) -> FeedbackResult<VideoRecord> {
    if request.problem_label.trim().is_empty() {
        return Err(FeedbackError::MissingLabel);
    }

    let mut record = match client.update_review(video_id, &request).await {
        Ok(record) => record,
        Err(e) => {
            warn!(video_id = %video_id, error = %e, "Correction rejected");
            record_correction("failed");
            return Err(e.into());
        }
    };

    // Some deployments answer with a partial record.
    record.user_selected_vid.get_or_insert(request.user_selected_vid);
    record
        .problem_label
        .get_or_insert_with(|| request.problem_label.clone());
    record
        .feedback_reason
        .get_or_insert_with(|| request.feedback_reason.clone());

    repo.upsert(record.clone());
    record_correction("succeeded");
    info!(
        video_id = %video_id,
        problem_label = %request.problem_label,
        "Correction saved"
    );
    Ok(record)
}

/// What the review panel shows for a video.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CorrectionView {
    pub video_id: VideoId,
    pub status: VideoStatus,
    pub problems: Vec<DetectedProblem>,
    pub playback_url: Option<String>,
    pub thumbnail_url: Option<String>,
    pub duration: Option<f64>,
    pub transcription_text: Option<String>,
    pub reviewed: bool,
    pub problem_label: Option<String>,
    pub feedback_reason: Option<String>,
}

impl CorrectionView {
    pub fn from_record(record: &VideoRecord, resolver: &DeliveryUrlResolver) -> Self {
        Self {
            video_id: record.id.clone(),
            status: record.classify(),
            problems: parse_detected_keywords(record.detected_keywords.as_ref()),
            playback_url: resolver.playback_url(record).map(|d| d.url),
            thumbnail_url: resolver.thumbnail_url(record),
            duration: record.duration,
            transcription_text: record.transcription_text.clone(),
            reviewed: record.is_reviewed(),
            problem_label: record.problem_label.clone(),
            feedback_reason: record.feedback_reason.clone(),
        }
    }
}
