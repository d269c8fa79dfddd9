// Parsing of vision model replies into a SceneAnalysis
//
// Vision models wrap JSON in code fences, add commentary around it, or skip
// JSON entirely. Each fallback below is tried in order.

use regex::Regex;
use serde_json::Value;
use crate::constants::{CAMERA_MOVEMENTS, MAX_DESCRIPTION_CHARS, RAW_DESCRIPTION_CHARS, TIMES_OF_DAY};
use crate::db::models::{SceneAnalysis, TagSet};
use crate::error::{BrollError, Result};

pub fn parse_analysis(content: &str) -> Result<SceneAnalysis> {
    let mut content = content.trim();
    if content.is_empty() {
        return Err(BrollError::model("vision", "model returned an empty response"));
    }

    // Strip markdown code fences
    if content.contains("```") {
        if let Some(inner) = Regex::new(r"(?s)```(?:json)?\s*\n?(.*?)```")
            .ok()
            .and_then(|re| re.captures(content))
            .and_then(|cap| cap.get(1))
        {
            content = inner.as_str().trim();
        }
    }

    if let Some(obj) = parse_object(content) {
        return Ok(validate_analysis(&obj));
    }

    // First flat (or singly nested) object, then the widest brace span
    for pattern in [r"(?s)\{[^{}]*(?:\{[^{}]*\}[^{}]*)*\}", r"(?s)\{.*\}"] {
        let found = Regex::new(pattern)
            .ok()
            .and_then(|re| re.find(content))
            .and_then(|m| parse_object(m.as_str()));
        if let Some(obj) = found {
            return Ok(validate_analysis(&obj));
        }
    }

    log::warn!("Vision reply was not JSON, keeping raw text as the description");
    Ok(SceneAnalysis {
        scene_description: truncate_chars(content, RAW_DESCRIPTION_CHARS),
        ..Default::default()
    })
}

fn parse_object(text: &str) -> Option<Value> {
    serde_json::from_str::<Value>(text).ok().filter(Value::is_object)
}

fn validate_analysis(parsed: &Value) -> SceneAnalysis {
    let scene_description = parsed
        .get("scene_description")
        .map(value_text)
        .unwrap_or_default();

    let tags = match parsed.get("tags") {
        Some(Value::Array(items)) => TagSet::new(items.iter().map(value_text)),
        Some(Value::String(s)) => TagSet::new(s.split(',')),
        _ => TagSet::default(),
    };

    SceneAnalysis {
        scene_description: truncate_chars(scene_description.trim(), MAX_DESCRIPTION_CHARS),
        tags,
        mood: parsed
            .get("mood")
            .map(value_text)
            .map(|m| m.trim().to_string())
            .filter(|m| !m.is_empty() && !m.eq_ignore_ascii_case("unknown")),
        camera_movement: vocabulary(parsed.get("camera_movement"), &CAMERA_MOVEMENTS),
        time_of_day: vocabulary(parsed.get("time_of_day"), &TIMES_OF_DAY),
    }
}

/// Keep a value only when it is one of the known words
fn vocabulary(value: Option<&Value>, allowed: &[&str]) -> Option<String> {
    let word = value_text(value?).trim().to_lowercase();
    allowed.contains(&word.as_str()).then_some(word)
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_json() {
        let a = parse_analysis(
            r#"{"scene_description": "A waterfall at sunset", "tags": ["waterfall", "sunset"],
                "mood": "serene", "camera_movement": "Static", "time_of_day": "golden_hour"}"#,
        )
        .unwrap();
        assert_eq!(a.scene_description, "A waterfall at sunset");
        assert_eq!(a.tags.len(), 2);
        assert_eq!(a.mood.as_deref(), Some("serene"));
        assert_eq!(a.camera_movement.as_deref(), Some("static"));
        assert_eq!(a.time_of_day.as_deref(), Some("golden_hour"));
    }

    #[test]
    fn test_code_fence_and_comma_tags() {
        let a = parse_analysis("Sure!\n```json\n{\"scene_description\": \"Desk\", \"tags\": \"office, laptop ,\"}\n```").unwrap();
        assert_eq!(a.scene_description, "Desk");
        assert_eq!(a.tags.iter().collect::<Vec<_>>(), vec!["office", "laptop"]);
    }

    #[test]
    fn test_object_embedded_in_prose() {
        let a = parse_analysis("Here you go: {\"scene_description\": \"Market\", \"camera_movement\": \"spinning\"} hope it helps").unwrap();
        assert_eq!(a.scene_description, "Market");
        assert_eq!(a.camera_movement, None);
    }

    #[test]
    fn test_raw_text_fallback() {
        let long = "x".repeat(800);
        let a = parse_analysis(&long).unwrap();
        assert_eq!(a.scene_description.len(), RAW_DESCRIPTION_CHARS);
        assert!(a.tags.is_empty());
    }

    #[test]
    fn test_empty_reply_is_model_error() {
        assert!(matches!(parse_analysis("   "), Err(BrollError::Model { .. })));
    }

    #[test]
    fn test_description_truncated() {
        let body = format!("{{\"scene_description\": \"{}\"}}", "y".repeat(1500));
        assert_eq!(parse_analysis(&body).unwrap().scene_description.chars().count(), MAX_DESCRIPTION_CHARS);
    }
}
