//! AI-detected problem keywords.
//!
//! `detected_keywords` is written by the AI pipeline, and older rows store it
//! as a JSON-encoded string rather than structured JSON. Parsing is total:
//! anything unreadable collapses to [`DetectedProblem::default`].

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const DEFAULT_PROBLEM: &str = "No problem detected";
pub const DEFAULT_CATEGORY: &str = "Uncategorized";

/// One problem the AI pipeline detected in a video.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct DetectedProblem {
    pub problem: String,
    pub category: String,
    #[serde(default)]
    pub keywords: Vec<String>,
}

impl Default for DetectedProblem {
    fn default() -> Self {
        Self {
            problem: DEFAULT_PROBLEM.to_string(),
            category: DEFAULT_CATEGORY.to_string(),
            keywords: Vec::new(),
        }
    }
}

/// Parse the raw `detected_keywords` field.
///
/// Accepts an array of problems, a single problem object, or either of those
/// encoded as a JSON string. Missing, empty or malformed input yields a single
/// default problem.
pub fn parse_detected_keywords(raw: Option<&Value>) -> Vec<DetectedProblem> {
    match raw.and_then(decode) {
        Some(problems) if !problems.is_empty() => problems,
        _ => vec![DetectedProblem::default()],
    }
}

/// The first detected problem, used for list rows and labels.
pub fn primary_problem(raw: Option<&Value>) -> DetectedProblem {
    parse_detected_keywords(raw)
        .into_iter()
        .next()
        .unwrap_or_default()
}

fn decode(value: &Value) -> Option<Vec<DetectedProblem>> {
    match value {
        Value::String(encoded) => {
            let inner: Value = serde_json::from_str(encoded).ok()?;
            // A string that decodes to another string is not a problem list.
            if inner.is_string() {
                return None;
            }
            decode(&inner)
        }
        Value::Array(_) => serde_json::from_value(value.clone()).ok(),
        Value::Object(_) => serde_json::from_value::<DetectedProblem>(value.clone())
            .ok()
            .map(|p| vec![p]),
        _ => None,
    }
}
