// Metadata extraction module

pub mod ffprobe;
pub mod exiftool;
pub mod frames;

use std::path::Path;
use serde::{Deserialize, Serialize};
use crate::error::Result;

/// GPS fix embedded in the container. `place_name` is filled by an external
/// geocoder when one is available.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GpsLocation {
    pub latitude: f64,
    pub longitude: f64,
    pub place_name: Option<String>,
}

impl GpsLocation {
    /// Build a location, rejecting coordinates outside the valid ranges.
    pub fn new(latitude: f64, longitude: f64) -> Option<Self> {
        let valid = latitude.is_finite()
            && longitude.is_finite()
            && (-90.0..=90.0).contains(&latitude)
            && (-180.0..=180.0).contains(&longitude);
        valid.then_some(Self {
            latitude,
            longitude,
            place_name: None,
        })
    }
}

/// Cheap technical metadata gathered at scan time
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MediaMetadata {
    pub duration_seconds: Option<f64>,
    pub width: Option<i32>,
    pub height: Option<i32>,
    pub fps: Option<f64>,
    pub codec: Option<String>,
    pub creation_date: Option<String>,
    pub gps: Option<GpsLocation>,
}

impl MediaMetadata {
    /// "1920x1080" when both dimensions are known
    pub fn resolution(&self) -> Option<String> {
        match (self.width, self.height) {
            (Some(w), Some(h)) if w > 0 && h > 0 => Some(format!("{}x{}", w, h)),
            _ => None,
        }
    }
}

/// Access to container metadata and frame grabs.
///
/// The pipeline only talks to media through this trait so it can run against
/// a substitute when ffprobe/ffmpeg are not installed.
pub trait MediaProbe: Send + Sync {
    /// Read duration, resolution and the embedded GPS tag.
    fn probe(&self, path: &Path) -> Result<MediaMetadata>;

    /// Grab up to `count` JPEG keyframes spread across the clip.
    fn extract_keyframes(&self, path: &Path, duration_seconds: Option<f64>, count: usize) -> Result<Vec<Vec<u8>>>;
}

/// MediaProbe backed by the ffprobe, exiftool and ffmpeg binaries
#[derive(Debug, Clone, Copy, Default)]
pub struct ToolProbe;

impl MediaProbe for ToolProbe {
    fn probe(&self, path: &Path) -> Result<MediaMetadata> {
        extract_metadata(path)
    }

    fn extract_keyframes(&self, path: &Path, duration_seconds: Option<f64>, count: usize) -> Result<Vec<Vec<u8>>> {
        frames::extract_keyframes(path, duration_seconds, count)
    }
}

/// Extract metadata from a video file
pub fn extract_metadata(path: &Path) -> Result<MediaMetadata> {
    // ffprobe failing means the container is unreadable
    let mut meta = ffprobe::probe(path)?;

    // exiftool is optional; a missing GPS tag is not an error
    match exiftool::extract_gps(path) {
        Ok(gps) => meta.gps = gps,
        Err(e) => log::debug!("exiftool skipped for {}: {}", path.display(), e),
    }

    Ok(meta)
}
