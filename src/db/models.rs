// Catalog record types
//
// A Video is only ever built through the transitions below, so the
// status-dependent fields (analysis, embedding, last_error) cannot drift
// out of sync with processing_status.

use std::fmt;
use std::str::FromStr;
use chrono::{SecondsFormat, Utc};
use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};
use crate::constants::PATH_DB_SEPARATOR;
use crate::error::{BrollError, Result};
use crate::metadata::{GpsLocation, MediaMetadata};

pub fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

// ----- ProcessingStatus -----

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingStatus {
    Scanned,
    Analyzed,
    Failed,
}

impl ProcessingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessingStatus::Scanned => "scanned",
            ProcessingStatus::Analyzed => "analyzed",
            ProcessingStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for ProcessingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProcessingStatus {
    type Err = BrollError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "scanned" => Ok(ProcessingStatus::Scanned),
            "analyzed" => Ok(ProcessingStatus::Analyzed),
            "failed" => Ok(ProcessingStatus::Failed),
            other => Err(BrollError::Store(format!("Unknown processing status: {}", other))),
        }
    }
}

// ----- TagSet -----

/// Ordered tag list. Tags are trimmed, empty tags dropped, and later
/// case-insensitive duplicates discarded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagSet(Vec<String>);

impl TagSet {
    pub fn new<I, S>(tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut out: Vec<String> = Vec::new();
        for tag in tags {
            let tag = tag.as_ref().trim();
            if tag.is_empty() || out.iter().any(|t| t.eq_ignore_ascii_case(tag)) {
                continue;
            }
            out.push(tag.to_string());
        }
        TagSet(out)
    }

    /// Decode the stored JSON array. Anything malformed yields an empty set.
    pub fn from_json(raw: &str) -> Self {
        match serde_json::from_str::<Vec<String>>(raw) {
            Ok(tags) => TagSet::new(tags),
            Err(e) => {
                log::warn!("Discarding malformed tags {:?}: {}", raw, e);
                TagSet::default()
            }
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(&self.0).unwrap_or_else(|_| "[]".to_string())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn join(&self, sep: &str) -> String {
        self.0.join(sep)
    }
}

impl Serialize for TagSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.0.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for TagSet {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        Vec::<String>::deserialize(deserializer).map(TagSet::new)
    }
}

// ----- SceneAnalysis -----

/// Descriptive fields produced by the vision model
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SceneAnalysis {
    pub scene_description: String,
    pub tags: TagSet,
    pub mood: Option<String>,
    pub camera_movement: Option<String>,
    pub time_of_day: Option<String>,
}

// ----- Processing -----

#[derive(Debug, Clone, PartialEq)]
pub enum Processing {
    Scanned,
    Analyzed {
        analysis: SceneAnalysis,
        embedding: Vec<f32>,
    },
    Failed {
        error: String,
    },
}

impl Processing {
    pub fn status(&self) -> ProcessingStatus {
        match self {
            Processing::Scanned => ProcessingStatus::Scanned,
            Processing::Analyzed { .. } => ProcessingStatus::Analyzed,
            Processing::Failed { .. } => ProcessingStatus::Failed,
        }
    }
}

// ----- Video -----

#[derive(Debug, Clone, PartialEq)]
pub struct Video {
    pub file_hash: String,
    pub file_path: String,
    pub file_name: String,
    pub file_size: i64,
    pub source_device: String,
    pub lrf_path: Option<String>,
    pub duration_seconds: Option<f64>,
    pub resolution: Option<String>,
    pub width: Option<i32>,
    pub height: Option<i32>,
    pub fps: Option<f64>,
    pub codec: Option<String>,
    pub creation_date: Option<String>,
    pub gps: Option<GpsLocation>,
    pub processing: Processing,
    pub created_at: String,
    pub updated_at: String,
}

/// Last path segment of a catalog-relative path
pub fn file_name_of(file_path: &str) -> String {
    file_path
        .rsplit(PATH_DB_SEPARATOR)
        .next()
        .unwrap_or(file_path)
        .to_string()
}

impl Video {
    /// A freshly discovered file
    pub fn scanned(
        file_hash: impl Into<String>,
        file_path: impl Into<String>,
        file_size: i64,
        source_device: impl Into<String>,
        lrf_path: Option<String>,
        meta: MediaMetadata,
    ) -> Self {
        let file_path = file_path.into();
        let now = now_rfc3339();
        Video {
            file_hash: file_hash.into(),
            file_name: file_name_of(&file_path),
            file_path,
            file_size,
            source_device: source_device.into(),
            lrf_path,
            resolution: meta.resolution(),
            duration_seconds: meta.duration_seconds,
            width: meta.width,
            height: meta.height,
            fps: meta.fps,
            codec: meta.codec,
            creation_date: meta.creation_date,
            gps: meta.gps,
            processing: Processing::Scanned,
            created_at: now.clone(),
            updated_at: now,
        }
    }

    pub fn status(&self) -> ProcessingStatus {
        self.processing.status()
    }

    pub fn analysis(&self) -> Option<&SceneAnalysis> {
        match &self.processing {
            Processing::Analyzed { analysis, .. } => Some(analysis),
            _ => None,
        }
    }

    pub fn embedding(&self) -> Option<&[f32]> {
        match &self.processing {
            Processing::Analyzed { embedding, .. } => Some(embedding),
            _ => None,
        }
    }

    pub fn last_error(&self) -> Option<&str> {
        match &self.processing {
            Processing::Failed { error } => Some(error),
            _ => None,
        }
    }

    pub fn place_name(&self) -> Option<&str> {
        self.gps.as_ref().and_then(|g| g.place_name.as_deref())
    }

    /// Record analysis results. Analyzed rows must be reset before they can
    /// be analyzed again.
    pub fn into_analyzed(self, analysis: SceneAnalysis, embedding: Vec<f32>) -> Result<Self> {
        if self.status() == ProcessingStatus::Analyzed {
            return Err(BrollError::Store(format!(
                "{} is already analyzed; reset it before re-analysis",
                self.file_path
            )));
        }
        if embedding.is_empty() {
            return Err(BrollError::Store(format!("Empty embedding for {}", self.file_path)));
        }
        Ok(Video {
            processing: Processing::Analyzed { analysis, embedding },
            updated_at: now_rfc3339(),
            ..self
        })
    }

    pub fn into_failed(self, error: impl Into<String>) -> Result<Self> {
        if self.status() == ProcessingStatus::Analyzed {
            return Err(BrollError::Store(format!(
                "{} is analyzed; reset it before recording a failure",
                self.file_path
            )));
        }
        let error = error.into();
        let error = if error.trim().is_empty() { "unknown error".to_string() } else { error };
        Ok(Video {
            processing: Processing::Failed { error },
            updated_at: now_rfc3339(),
            ..self
        })
    }

    /// Forced reprocessing drops all derived fields
    pub fn reset_to_scanned(self) -> Self {
        Video {
            processing: Processing::Scanned,
            updated_at: now_rfc3339(),
            ..self
        }
    }

    /// Same content found at a new path. Status and derived fields carry over.
    pub fn relocated(self, file_path: impl Into<String>) -> Self {
        let file_path = file_path.into();
        Video {
            file_name: file_name_of(&file_path),
            file_path,
            updated_at: now_rfc3339(),
            ..self
        }
    }

    /// Checked before every write
    pub fn validate(&self, embedding_dimensions: usize) -> Result<()> {
        if self.file_hash.trim().is_empty() {
            return Err(BrollError::Store("Video has an empty file_hash".to_string()));
        }
        // A backslash is a legal character in a unix file name
        if self.file_path.is_empty() || self.file_path.starts_with(PATH_DB_SEPARATOR) {
            return Err(BrollError::Store(format!(
                "file_path must be drive-relative: {:?}",
                self.file_path
            )));
        }
        if self.file_name != file_name_of(&self.file_path) {
            return Err(BrollError::Store(format!(
                "file_name {:?} does not match file_path {:?}",
                self.file_name, self.file_path
            )));
        }
        match &self.processing {
            Processing::Analyzed { embedding, .. } => {
                if embedding.len() != embedding_dimensions {
                    return Err(BrollError::Store(format!(
                        "Embedding for {} has {} dimensions, catalog expects {}",
                        self.file_path,
                        embedding.len(),
                        embedding_dimensions
                    )));
                }
                if embedding.iter().any(|v| !v.is_finite()) || embedding.iter().all(|v| *v == 0.0) {
                    return Err(BrollError::Store(format!(
                        "Embedding for {} is zero or contains non-finite values",
                        self.file_path
                    )));
                }
            }
            Processing::Failed { error } if error.trim().is_empty() => {
                return Err(BrollError::Store(format!(
                    "Failed video {} has no error recorded",
                    self.file_path
                )));
            }
            _ => {}
        }
        Ok(())
    }
}

impl Serialize for Video {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let analysis = self.analysis();
        let mut s = serializer.serialize_struct("Video", 22)?;
        s.serialize_field("file_hash", &self.file_hash)?;
        s.serialize_field("file_path", &self.file_path)?;
        s.serialize_field("file_name", &self.file_name)?;
        s.serialize_field("file_size", &self.file_size)?;
        s.serialize_field("source_device", &self.source_device)?;
        s.serialize_field("lrf_path", &self.lrf_path)?;
        s.serialize_field("duration_seconds", &self.duration_seconds)?;
        s.serialize_field("resolution", &self.resolution)?;
        s.serialize_field("width", &self.width)?;
        s.serialize_field("height", &self.height)?;
        s.serialize_field("fps", &self.fps)?;
        s.serialize_field("codec", &self.codec)?;
        s.serialize_field("creation_date", &self.creation_date)?;
        s.serialize_field("gps_location", &self.gps)?;
        s.serialize_field("scene_description", &analysis.map(|a| &a.scene_description))?;
        s.serialize_field("tags", &analysis.map(|a| &a.tags))?;
        s.serialize_field("mood", &analysis.and_then(|a| a.mood.as_ref()))?;
        s.serialize_field("camera_movement", &analysis.and_then(|a| a.camera_movement.as_ref()))?;
        s.serialize_field("time_of_day", &analysis.and_then(|a| a.time_of_day.as_ref()))?;
        s.serialize_field("processing_status", &self.status())?;
        s.serialize_field("last_error", &self.last_error())?;
        s.serialize_field("created_at", &self.created_at)?;
        s.serialize_field("updated_at", &self.updated_at)?;
        s.end()
    }
}
