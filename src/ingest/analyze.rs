// Per-video analysis: keyframes -> vision -> embedding

use std::path::Path;
use crate::constants::{DEVICE_DJI_POCKET3, DEVICE_IPHONE};
use crate::db::models::{SceneAnalysis, Video};
use crate::error::{BrollError, Result};
use crate::inference::{validate_embedding, Embedder, VisionAnalyzer};
use crate::metadata::MediaProbe;

/// Everything the analysis stages need besides the video itself
pub struct Stages<'a> {
    pub drive_root: &'a Path,
    pub probe: &'a dyn MediaProbe,
    pub vision: &'a dyn VisionAnalyzer,
    pub embedder: &'a dyn Embedder,
    pub num_keyframes: usize,
    pub embedding_dimensions: usize,
}

/// Run every stage for one video and return it as analyzed.
/// The video must not already be analyzed.
pub fn analyze_video(stages: &Stages<'_>, video: Video) -> Result<Video> {
    let source = stages.drive_root.join(&video.file_path);
    if !source.is_file() {
        return Err(BrollError::scan(&video.file_path, "file no longer exists on the drive"));
    }

    let frames = extract_frames(stages, &video, &source)?;
    log::debug!("{}: {} keyframes", video.file_path, frames.len());

    let analysis = stages.vision.analyze(&frames)?;
    if analysis.scene_description.trim().is_empty() && analysis.tags.is_empty() {
        return Err(BrollError::model("vision", "model returned no description or tags"));
    }

    let text = searchable_text(&video, &analysis);
    let embedding = stages.embedder.embed(&text)?;
    let embedding = validate_embedding(embedding, stages.embedding_dimensions, "embed")?;

    video.into_analyzed(analysis, embedding)
}

/// Prefer the low-resolution preview, falling back to the full file
fn extract_frames(stages: &Stages<'_>, video: &Video, source: &Path) -> Result<Vec<Vec<u8>>> {
    if let Some(lrf) = &video.lrf_path {
        let preview = stages.drive_root.join(lrf);
        if preview.is_file() {
            match stages.probe.extract_keyframes(&preview, video.duration_seconds, stages.num_keyframes) {
                Ok(frames) => return Ok(frames),
                Err(e) => log::debug!("Preview {} unusable, using full file: {}", lrf, e),
            }
        }
    }
    stages.probe.extract_keyframes(source, video.duration_seconds, stages.num_keyframes)
}

/// Text sent to the embedder: every descriptive field plus a device hint
pub fn searchable_text(video: &Video, analysis: &SceneAnalysis) -> String {
    let mut parts: Vec<String> = Vec::new();

    let description = analysis.scene_description.trim();
    if !description.is_empty() {
        parts.push(description.to_string());
    }
    if !analysis.tags.is_empty() {
        parts.push(analysis.tags.join(" "));
    }
    if let Some(mood) = &analysis.mood {
        parts.push(format!("mood: {}", mood));
    }
    if let Some(movement) = &analysis.camera_movement {
        parts.push(format!("camera: {}", movement));
    }
    if let Some(time) = &analysis.time_of_day {
        parts.push(format!("time: {}", time));
    }
    if let Some(place) = video.place_name() {
        parts.push(format!("location: {}", place));
    }
    match video.source_device.as_str() {
        DEVICE_DJI_POCKET3 => parts.push("gimbal camera".to_string()),
        DEVICE_IPHONE => parts.push("smartphone camera".to_string()),
        _ => {}
    }

    parts.join(" | ")
}

/// The last_error text: stage, catalog path, message
pub fn describe_failure(file_path: &str, err: &BrollError) -> String {
    match err {
        BrollError::Scan { message, .. } => format!("[scan] {}: {}", file_path, message),
        BrollError::Extraction { stage, message, .. } => format!("[{}] {}: {}", stage, file_path, message),
        BrollError::Model { stage, message } => format!("[{}] {}: {}", stage, file_path, message),
        BrollError::ModelTimeout { stage } => format!("[{}] {}: model request timed out", stage, file_path),
        other => format!("[process] {}: {}", file_path, other),
    }
}
