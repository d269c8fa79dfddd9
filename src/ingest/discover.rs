// File discovery for a drive scan

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use walkdir::{DirEntry, WalkDir};
use crate::constants::{
    DEVICE_DJI_POCKET3, DEVICE_IPHONE, DEVICE_UNKNOWN, LRF_EXTENSION, PATH_DB_SEPARATOR,
    SKIP_DIRS, VIDEO_EXTENSIONS,
};

/// A video file found on the drive
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub path: PathBuf,
    /// Drive-relative, '/'-separated
    pub relative: String,
    /// Drive-relative LRF preview next to the video, if any
    pub lrf: Option<String>,
}

#[derive(Debug, Default)]
pub struct Discovered {
    pub videos: Vec<Candidate>,
    /// Entries the walk could not read or represent
    pub errors: Vec<(String, String)>,
}

/// Walk a drive, returning video files in path order
pub fn discover_videos(root: &Path) -> Discovered {
    let mut found = Discovered::default();
    let mut files = Vec::new();
    let mut previews: HashMap<PathBuf, PathBuf> = HashMap::new();

    let walker = WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_skipped_dir(e));

    for entry in walker {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                let path = e.path().map(|p| p.display().to_string()).unwrap_or_default();
                log::warn!("Cannot read {}: {}", path, e);
                found.errors.push((path, e.to_string()));
                continue;
            }
        };

        let path = entry.path();
        if !entry.file_type().is_file() || is_resource_fork(path) {
            continue;
        }

        if is_lrf_file(path) {
            previews.insert(path.with_extension(""), path.to_path_buf());
        } else if is_video_file(path) {
            files.push(path.to_path_buf());
        }
    }

    for path in files {
        let relative = match relative_path(root, &path) {
            Some(r) => r,
            None => {
                let display = path.display().to_string();
                log::warn!("Skipping {}: path is not valid UTF-8", display);
                found.errors.push((display, "path is not valid UTF-8".to_string()));
                continue;
            }
        };
        let lrf = previews
            .get(&path.with_extension(""))
            .and_then(|p| relative_path(root, p));
        found.videos.push(Candidate { path, relative, lrf });
    }

    found
}

fn is_skipped_dir(entry: &DirEntry) -> bool {
    if !entry.file_type().is_dir() {
        return false;
    }
    let name = entry.file_name().to_string_lossy();
    SKIP_DIRS.contains(&name.as_ref()) || name.starts_with('.')
}

/// macOS AppleDouble files ("._clip.mp4")
fn is_resource_fork(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.starts_with("._"))
        .unwrap_or(false)
}

fn extension_lower(path: &Path) -> Option<String> {
    path.extension().and_then(|e| e.to_str()).map(|e| e.to_lowercase())
}

pub fn is_video_file(path: &Path) -> bool {
    extension_lower(path)
        .map(|ext| VIDEO_EXTENSIONS.contains(&ext.as_str()))
        .unwrap_or(false)
}

pub fn is_lrf_file(path: &Path) -> bool {
    extension_lower(path).as_deref() == Some(LRF_EXTENSION)
}

/// Path relative to the drive root with '/' separators on every platform
pub fn relative_path(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    let mut parts = Vec::new();
    for component in rel.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_str()?),
            _ => return None,
        }
    }
    if parts.is_empty() {
        return None;
    }
    Some(parts.join(&PATH_DB_SEPARATOR.to_string()))
}

/// Guess the recording device from the file name, then the folder names.
///
/// DJI Osmo Pocket 3: DJI_20240115143022_0001_D.MP4
/// iPhone: IMG_1234.MOV, RPReplay_Final1234.MP4
pub fn detect_source_device(relative: &str) -> &'static str {
    let mut segments: Vec<String> = relative
        .split(PATH_DB_SEPARATOR)
        .map(|s| s.to_uppercase())
        .collect();
    let name = segments.pop().unwrap_or_default();

    if name.starts_with("DJI_") {
        return DEVICE_DJI_POCKET3;
    }
    if name.starts_with("IMG_") || name.starts_with("RPREPLAY") {
        return DEVICE_IPHONE;
    }
    if segments.iter().any(|s| s.contains("DJI")) {
        return DEVICE_DJI_POCKET3;
    }
    if segments.iter().any(|s| s.contains("DCIM")) {
        return DEVICE_IPHONE;
    }
    DEVICE_UNKNOWN
}
