//! Shared helpers for lenient deserialization and display formatting.
//!
//! The backend is not consistent about identifier types: some endpoints return
//! numeric ids, others return strings. Every id field in this crate goes
//! through these helpers so both shapes land as `String`.

use serde::{Deserialize, Deserializer};

#[derive(Deserialize)]
#[serde(untagged)]
enum StringOrNumber {
    String(String),
    Int(i64),
    Float(f64),
}

impl StringOrNumber {
    fn into_string(self) -> String {
        match self {
            StringOrNumber::String(s) => s,
            StringOrNumber::Int(n) => n.to_string(),
            StringOrNumber::Float(n) => n.to_string(),
        }
    }
}

/// Deserialize a required id that may arrive as a string or a number.
pub fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    StringOrNumber::deserialize(deserializer).map(StringOrNumber::into_string)
}

/// Deserialize an optional id that may arrive as a string, a number or null.
///
/// Empty strings are treated as absent.
pub fn opt_string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<StringOrNumber>::deserialize(deserializer)?;
    Ok(value
        .map(StringOrNumber::into_string)
        .filter(|s| !s.trim().is_empty()))
}

/// Returns the value, untouched, when it carries anything but whitespace.
pub fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|s| !s.trim().is_empty())
}

/// Format bytes as human-readable string.
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Deserialize)]
    struct IdFields {
        #[serde(deserialize_with = "string_or_number")]
        id: String,
        #[serde(default, deserialize_with = "opt_string_or_number")]
        parent: Option<String>,
    }

    #[test]
    fn test_numeric_and_string_ids() {
        let p: IdFields = serde_json::from_str(r#"{"id": 42, "parent": "7"}"#).unwrap();
        assert_eq!(p.id, "42");
        assert_eq!(p.parent.as_deref(), Some("7"));

        let p: IdFields = serde_json::from_str(r#"{"id": "abc"}"#).unwrap();
        assert_eq!(p.id, "abc");
        assert_eq!(p.parent, None);
    }

    #[test]
    fn test_null_and_empty_optional_ids() {
        let p: IdFields = serde_json::from_str(r#"{"id": 1, "parent": null}"#).unwrap();
        assert_eq!(p.parent, None);

        let p: IdFields = serde_json::from_str(r#"{"id": 1, "parent": "  "}"#).unwrap();
        assert_eq!(p.parent, None);
    }

    #[test]
    fn test_non_empty() {
        assert_eq!(non_empty(Some("  a.mp4 ")), Some("  a.mp4 "));
        assert_eq!(non_empty(Some("   ")), None);
        assert_eq!(non_empty(None), None);
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.00 KB");
        assert_eq!(format_bytes(100 * 1024 * 1024), "100.00 MB");
    }
}
