// FFprobe wrapper for technical metadata

use std::collections::HashMap;
use std::path::Path;
use std::process::Command;
use std::time::Duration;
use chrono::{DateTime, NaiveDateTime};
use serde::Deserialize;
use crate::constants::FFPROBE_TIMEOUT_SECS;
use crate::error::{BrollError, Result};
use crate::metadata::MediaMetadata;

#[derive(Debug, Deserialize)]
struct FFprobeOutput {
    streams: Option<Vec<FFprobeStream>>,
    format: Option<FFprobeFormat>,
}

#[derive(Debug, Deserialize)]
struct FFprobeStream {
    codec_type: Option<String>,
    codec_name: Option<String>,
    width: Option<i32>,
    height: Option<i32>,
    r_frame_rate: Option<String>,
    duration: Option<String>,
    tags: Option<HashMap<String, String>>,
}

#[derive(Debug, Deserialize)]
struct FFprobeFormat {
    duration: Option<String>,
    tags: Option<HashMap<String, String>>,
}

/// Tag names that carry a recording date, checked in order
const CREATION_TAGS: [&str; 3] = ["creation_time", "date", "com.apple.quicktime.creationdate"];

/// Run ffprobe on a file and extract metadata
pub fn probe(path: &Path) -> Result<MediaMetadata> {
    let display = path.display().to_string();
    let mut cmd = Command::new(crate::tools::ffprobe_path());
    cmd.args([
        "-v", "quiet",
        "-print_format", "json",
        "-show_format",
        "-show_streams",
    ])
    .arg(path);

    let output = crate::tools::output_with_timeout(cmd, Duration::from_secs(FFPROBE_TIMEOUT_SECS))
        .map_err(|e| BrollError::extraction(&display, "probe", format!("Failed to run ffprobe: {}", e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(BrollError::extraction(
            &display,
            "probe",
            format!("ffprobe could not parse the container: {}", stderr.trim()),
        ));
    }

    parse_probe_output(&output.stdout)
        .map_err(|e| BrollError::extraction(&display, "probe", e.to_string()))
}

/// Parse ffprobe's JSON output
pub fn parse_probe_output(stdout: &[u8]) -> Result<MediaMetadata> {
    let probe_output: FFprobeOutput = serde_json::from_slice(stdout)?;

    let mut meta = MediaMetadata::default();
    let mut stream_duration = None;
    let mut stream_tags = None;

    // First video stream wins; audio and data streams are ignored
    if let Some(ref streams) = probe_output.streams {
        if let Some(video) = streams.iter().find(|s| s.codec_type.as_deref() == Some("video")) {
            meta.codec = video.codec_name.clone();
            meta.width = video.width;
            meta.height = video.height;
            meta.fps = parse_frame_rate(video.r_frame_rate.as_deref());
            stream_duration = parse_duration(video.duration.as_deref());
            stream_tags = video.tags.as_ref();
        }
    }

    let format_tags = probe_output.format.as_ref().and_then(|f| f.tags.as_ref());

    // Container duration is more reliable; unfinalized recordings sometimes
    // only carry it on the stream
    meta.duration_seconds = probe_output
        .format
        .as_ref()
        .and_then(|f| parse_duration(f.duration.as_deref()))
        .or(stream_duration);

    if meta.codec.is_none() && meta.duration_seconds.is_none() {
        return Err(BrollError::Other("no video stream or duration found".to_string()));
    }

    meta.creation_date = [format_tags, stream_tags]
        .into_iter()
        .flatten()
        .find_map(find_creation_date);

    Ok(meta)
}

fn find_creation_date(tags: &HashMap<String, String>) -> Option<String> {
    let lower: HashMap<String, &String> = tags
        .iter()
        .map(|(k, v)| (k.to_lowercase(), v))
        .collect();

    CREATION_TAGS
        .iter()
        .find_map(|key| lower.get(*key))
        .map(|v| normalize_datetime(v))
}

/// Normalize the datetime formats cameras write into ISO 8601.
/// Unparseable values are returned trimmed but otherwise unchanged.
pub fn normalize_datetime(value: &str) -> String {
    let value = value.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return dt.naive_local().format("%Y-%m-%dT%H:%M:%S").to_string();
    }

    const FORMATS: [&str; 5] = [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S%z",
        "%Y-%m-%d %H:%M:%S",
        "%Y:%m:%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S",
    ];

    for fmt in FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, fmt) {
            return dt.format("%Y-%m-%dT%H:%M:%S").to_string();
        }
        if let Ok(dt) = DateTime::parse_from_str(value, fmt) {
            return dt.naive_local().format("%Y-%m-%dT%H:%M:%S").to_string();
        }
    }

    value.to_string()
}

/// Parse frame rate string like "30000/1001" to f64 (two decimals)
fn parse_frame_rate(rate_str: Option<&str>) -> Option<f64> {
    let rate_str = rate_str?;
    let fps = if let Some((num, den)) = rate_str.split_once('/') {
        let num: f64 = num.parse().ok()?;
        let den: f64 = den.parse().ok()?;
        if den <= 0.0 {
            return None;
        }
        num / den
    } else {
        rate_str.parse().ok()?
    };
    Some((fps * 100.0).round() / 100.0)
}

/// Parse duration string to seconds (two decimals)
fn parse_duration(duration_str: Option<&str>) -> Option<f64> {
    let seconds: f64 = duration_str?.parse().ok()?;
    (seconds.is_finite() && seconds >= 0.0).then(|| (seconds * 100.0).round() / 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_probe_output() {
        let json = br#"{
            "streams": [
                {"codec_type": "audio", "codec_name": "aac"},
                {"codec_type": "video", "codec_name": "hevc", "width": 3840, "height": 2160,
                 "r_frame_rate": "30000/1001", "duration": "12.5"}
            ],
            "format": {"duration": "12.512", "tags": {"creation_time": "2024-01-15T14:30:22.000000Z"}}
        }"#;

        let meta = parse_probe_output(json).unwrap();
        assert_eq!(meta.codec.as_deref(), Some("hevc"));
        assert_eq!(meta.resolution().as_deref(), Some("3840x2160"));
        assert_eq!(meta.fps, Some(29.97));
        assert_eq!(meta.duration_seconds, Some(12.51));
        assert_eq!(meta.creation_date.as_deref(), Some("2024-01-15T14:30:22"));
    }

    #[test]
    fn test_stream_duration_fallback() {
        let json = br#"{
            "streams": [{"codec_type": "video", "codec_name": "h264", "duration": "4.0",
                         "tags": {"CREATION_TIME": "2023:06:01 09:15:00"}}],
            "format": {}
        }"#;

        let meta = parse_probe_output(json).unwrap();
        assert_eq!(meta.duration_seconds, Some(4.0));
        assert_eq!(meta.creation_date.as_deref(), Some("2023-06-01T09:15:00"));
    }

    #[test]
    fn test_empty_probe_is_error() {
        assert!(parse_probe_output(br#"{"streams": [], "format": {}}"#).is_err());
        assert!(parse_probe_output(b"not json").is_err());
    }

    #[test]
    fn test_normalize_datetime() {
        assert_eq!(normalize_datetime("2024-01-15 14:30:22"), "2024-01-15T14:30:22");
        assert_eq!(normalize_datetime("2024-01-15T14:30:22Z"), "2024-01-15T14:30:22");
        assert_eq!(normalize_datetime("  yesterday "), "yesterday");
    }

    #[test]
    fn test_parse_frame_rate() {
        assert_eq!(parse_frame_rate(Some("25/1")), Some(25.0));
        assert_eq!(parse_frame_rate(Some("0/0")), None);
        assert_eq!(parse_frame_rate(Some("59.94")), Some(59.94));
        assert_eq!(parse_frame_rate(None), None);
    }
}
