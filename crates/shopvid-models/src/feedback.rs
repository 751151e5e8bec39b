//! Operator corrections of AI classifications.

use serde::{Deserialize, Serialize};

/// Stored as `feedback_reason` when the operator gives no reason.
pub const NO_FEEDBACK_SENTINEL: &str = "No feedback provided";

/// Fixed list of reasons offered next to the free-text box.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresetReason {
    WrongProblemDetected,
    ProblemMissed,
    WrongCategory,
    PoorVideoQuality,
    NotADiagnosticVideo,
}

impl PresetReason {
    pub const ALL: [PresetReason; 5] = [
        PresetReason::WrongProblemDetected,
        PresetReason::ProblemMissed,
        PresetReason::WrongCategory,
        PresetReason::PoorVideoQuality,
        PresetReason::NotADiagnosticVideo,
    ];

    pub fn id(&self) -> &'static str {
        match self {
            PresetReason::WrongProblemDetected => "wrong_problem_detected",
            PresetReason::ProblemMissed => "problem_missed",
            PresetReason::WrongCategory => "wrong_category",
            PresetReason::PoorVideoQuality => "poor_video_quality",
            PresetReason::NotADiagnosticVideo => "not_a_diagnostic_video",
        }
    }

    /// Text written to `feedback_reason`.
    pub fn label(&self) -> &'static str {
        match self {
            PresetReason::WrongProblemDetected => "AI detected the wrong problem",
            PresetReason::ProblemMissed => "AI missed a problem shown in the video",
            PresetReason::WrongCategory => "Problem is in the wrong category",
            PresetReason::PoorVideoQuality => "Video quality too poor to diagnose",
            PresetReason::NotADiagnosticVideo => "Video does not show a diagnosis",
        }
    }

    pub fn from_id(id: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|r| r.id() == id)
    }
}

/// The reason half of a correction: a preset or free text, never both.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", content = "value", rename_all = "snake_case")]
pub enum FeedbackChoice {
    Preset(PresetReason),
    Custom(String),
}

impl FeedbackChoice {
    /// The reason text to store, falling back to the sentinel when blank.
    pub fn reason_text(choice: Option<&FeedbackChoice>) -> String {
        let text = match choice {
            Some(FeedbackChoice::Preset(reason)) => reason.label(),
            Some(FeedbackChoice::Custom(text)) => text.trim(),
            None => "",
        };
        if text.is_empty() {
            NO_FEEDBACK_SENTINEL.to_string()
        } else {
            text.to_string()
        }
    }
}

/// Body of `PATCH /videos/{id}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorrectionRequest {
    pub user_selected_vid: bool,
    pub problem_label: String,
    pub feedback_reason: String,
}

impl CorrectionRequest {
    pub fn new(problem_label: impl Into<String>, choice: Option<&FeedbackChoice>) -> Self {
        Self {
            user_selected_vid: true,
            problem_label: problem_label.into(),
            feedback_reason: FeedbackChoice::reason_text(choice),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_reason_uses_sentinel() {
        assert_eq!(FeedbackChoice::reason_text(None), NO_FEEDBACK_SENTINEL);
        assert_eq!(
            FeedbackChoice::reason_text(Some(&FeedbackChoice::Custom("   ".into()))),
            NO_FEEDBACK_SENTINEL
        );
    }

    #[test]
    fn test_preset_reason_text() {
        let choice = FeedbackChoice::Preset(PresetReason::WrongCategory);
        assert_eq!(
            FeedbackChoice::reason_text(Some(&choice)),
            "Problem is in the wrong category"
        );
    }

    #[test]
    fn test_preset_ids_round_trip() {
        for reason in PresetReason::ALL {
            assert_eq!(PresetReason::from_id(reason.id()), Some(reason));
        }
        assert_eq!(PresetReason::from_id("other"), None);
    }

    #[test]
    fn test_correction_request_body() {
        let body = CorrectionRequest::new(
            "Brake rotor warped",
            Some(&FeedbackChoice::Custom(" rotor, not pads ".into())),
        );
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["user_selected_vid"], true);
        assert_eq!(json["problem_label"], "Brake rotor warped");
        assert_eq!(json["feedback_reason"], "rotor, not pads");
    }
}
