// Keyframe extraction via ffmpeg

use std::path::Path;
use std::process::Command;
use std::time::Duration;
use crate::constants::{
    FALLBACK_KEYFRAME_TIMESTAMPS, FFMPEG_FRAME_TIMEOUT_SECS, KEYFRAME_JPEG_QUALITY,
    KEYFRAME_WIDTH, MIN_USABLE_DURATION_SECS,
};
use crate::error::{BrollError, Result};

/// Timestamps to sample, evenly spaced inside the clip.
/// Returns None when the duration is unknown or too short to seek into.
pub fn keyframe_timestamps(duration_seconds: Option<f64>, count: usize) -> Option<Vec<f64>> {
    let duration = duration_seconds.filter(|d| d.is_finite() && *d >= MIN_USABLE_DURATION_SECS)?;
    Some(
        (0..count)
            .map(|i| duration * (i + 1) as f64 / (count + 1) as f64)
            .collect(),
    )
}

/// Extract JPEG keyframes scaled to KEYFRAME_WIDTH.
///
/// With a known duration, frames are spread evenly and individual failures are
/// skipped. Without one (unfinalized recordings), fixed timestamps are tried
/// until one seeks past the end.
pub fn extract_keyframes(path: &Path, duration_seconds: Option<f64>, count: usize) -> Result<Vec<Vec<u8>>> {
    let mut frames = Vec::new();

    match keyframe_timestamps(duration_seconds, count) {
        Some(timestamps) => {
            for ts in timestamps {
                match extract_frame(path, ts) {
                    Ok(Some(jpeg)) => frames.push(jpeg),
                    Ok(None) => {}
                    Err(e) => log::debug!("Frame at {:.2}s failed for {}: {}", ts, path.display(), e),
                }
            }
        }
        None => {
            log::debug!("Duration unknown for {}, trying fixed timestamps", path.display());
            for ts in FALLBACK_KEYFRAME_TIMESTAMPS {
                match extract_frame(path, ts) {
                    Ok(Some(jpeg)) => {
                        frames.push(jpeg);
                        if frames.len() >= count {
                            break;
                        }
                    }
                    // Past the end of the file
                    Ok(None) | Err(_) => break,
                }
            }
        }
    }

    if frames.is_empty() {
        return Err(BrollError::extraction(
            path.display().to_string(),
            "frames",
            "could not extract any frames",
        ));
    }

    Ok(frames)
}

/// Grab one frame at `timestamp`. Ok(None) means ffmpeg produced no output.
fn extract_frame(path: &Path, timestamp: f64) -> Result<Option<Vec<u8>>> {
    let display = path.display().to_string();
    let mut cmd = Command::new(crate::tools::ffmpeg_path());
    cmd.arg("-ss")
        .arg(format!("{:.3}", timestamp))
        .arg("-i")
        .arg(path)
        .args(["-vframes", "1"])
        .arg("-vf")
        .arg(format!("scale={}:-2", KEYFRAME_WIDTH))
        .arg("-q:v")
        .arg(KEYFRAME_JPEG_QUALITY.to_string())
        .args(["-f", "image2", "-vcodec", "mjpeg", "-loglevel", "error", "pipe:1"]);

    let output = crate::tools::output_with_timeout(cmd, Duration::from_secs(FFMPEG_FRAME_TIMEOUT_SECS))
        .map_err(|e| BrollError::extraction(&display, "frames", format!("Failed to run ffmpeg: {}", e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let stderr: String = stderr.trim().chars().take(200).collect();
        return Err(BrollError::extraction(&display, "frames", format!("ffmpeg error: {}", stderr)));
    }

    Ok((!output.stdout.is_empty()).then_some(output.stdout))
}
