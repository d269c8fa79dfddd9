// Shared fakes for the integration tests
//
// A "video" here is a text file whose contents stand in for the picture:
// the fake prober returns its text as the only keyframe and the fake vision
// model describes the clip with that text.

#![allow(dead_code)]

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use broll_lib::db::models::{SceneAnalysis, TagSet, Video};
use broll_lib::error::{BrollError, Result};
use broll_lib::inference::{ChatMessage, Embedder, Generator, VisionAnalyzer};
use broll_lib::metadata::{MediaMetadata, MediaProbe};
use broll_lib::ingest::{IngestOptions, IngestResult, Pipeline};
use broll_lib::Catalog;
use tempfile::TempDir;

pub const DIMS: usize = 64;

/// Words that land on the same axis, so related phrasing scores as similar
const CONCEPTS: [&[&str]; 8] = [
    &["water", "waterfall", "river", "ocean", "lake", "falls"],
    &["sunset", "dusk", "golden", "evening", "sundown"],
    &["office", "meeting", "desk", "conference", "laptop"],
    &["city", "street", "traffic", "downtown", "buildings"],
    &["forest", "trees", "woods", "pine"],
    &["beach", "sand", "waves", "shore"],
    &["night", "dark", "neon", "lights"],
    &["people", "crowd", "team", "coworkers"],
];

pub struct FakeProbe;

impl MediaProbe for FakeProbe {
    fn probe(&self, path: &Path) -> Result<MediaMetadata> {
        let text = std::fs::read_to_string(path)?;
        if text.starts_with("CORRUPT") {
            return Err(BrollError::extraction(path.display().to_string(), "probe", "invalid data found"));
        }
        Ok(MediaMetadata {
            duration_seconds: Some(10.0 + text.len() as f64),
            width: Some(3840),
            height: Some(2160),
            fps: Some(29.97),
            codec: Some("hevc".to_string()),
            ..Default::default()
        })
    }

    fn extract_keyframes(&self, path: &Path, _duration: Option<f64>, _count: usize) -> Result<Vec<Vec<u8>>> {
        let bytes = std::fs::read(path)?;
        if bytes.starts_with(b"CORRUPT") || bytes.starts_with(b"BROKEN") {
            return Err(BrollError::extraction(path.display().to_string(), "frames", "could not extract any frames"));
        }
        Ok(vec![bytes])
    }
}

#[derive(Default)]
pub struct FakeVision {
    pub calls: AtomicUsize,
}

impl VisionAnalyzer for FakeVision {
    fn analyze(&self, keyframes: &[Vec<u8>]) -> Result<SceneAnalysis> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let text = String::from_utf8_lossy(&keyframes[0]).trim().to_string();
        let tags: Vec<String> = words(&text).into_iter().filter(|w| w.len() > 3).take(6).collect();
        Ok(SceneAnalysis {
            scene_description: text,
            tags: TagSet::new(tags),
            mood: Some("calm".to_string()),
            ..Default::default()
        })
    }
}

/// Bag-of-concepts embedder. Known words share an axis; anything else is
/// hashed onto the remaining axes.
#[derive(Default)]
pub struct ConceptEmbedder {
    pub calls: AtomicUsize,
    pub fail: AtomicBool,
}

impl Embedder for ConceptEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(BrollError::model("embed", "connection refused"));
        }
        Ok(concept_vector(text))
    }
}

pub fn concept_vector(text: &str) -> Vec<f32> {
    let mut v = vec![0.0f32; DIMS];
    for word in words(text) {
        match CONCEPTS.iter().position(|group| group.contains(&word.as_str())) {
            Some(axis) => v[axis] += 1.0,
            None => {
                let slot = word.bytes().fold(7usize, |acc, b| acc.wrapping_mul(31).wrapping_add(b as usize));
                v[CONCEPTS.len() + slot % (DIMS - CONCEPTS.len())] += 0.25;
            }
        }
    }
    // Keep every vector non-zero
    v[DIMS - 1] += 0.01;
    v
}

fn words(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Records the prompt it was given and answers with a canned reply
pub struct FakeGenerator {
    /// None makes every call time out
    pub reply: Option<String>,
    pub calls: AtomicUsize,
    pub last_prompt: Mutex<Vec<ChatMessage>>,
}

impl FakeGenerator {
    pub fn answering(reply: &str) -> Self {
        Self {
            reply: Some(reply.to_string()),
            calls: AtomicUsize::new(0),
            last_prompt: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            reply: None,
            calls: AtomicUsize::new(0),
            last_prompt: Mutex::new(Vec::new()),
        }
    }
}

impl Generator for FakeGenerator {
    fn generate(&self, messages: &[ChatMessage]) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_prompt.lock().unwrap() = messages.to_vec();
        self.reply
            .clone()
            .ok_or_else(|| BrollError::ModelTimeout { stage: "chat".to_string() })
    }
}

/// A temporary drive with a catalog and fake models
pub struct Drive {
    pub catalog: Catalog,
    pub probe: FakeProbe,
    pub vision: FakeVision,
    pub embedder: ConceptEmbedder,
    pub dir: TempDir,
}

impl Drive {
    pub fn new(files: &[(&str, &str)]) -> Self {
        let dir = TempDir::new().unwrap();
        for (rel, content) in files {
            write_file(dir.path(), rel, content);
        }
        let catalog = Catalog::init(dir.path(), DIMS).unwrap();
        Drive {
            catalog,
            probe: FakeProbe,
            vision: FakeVision::default(),
            embedder: ConceptEmbedder::default(),
            dir,
        }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn process(&self, options: &IngestOptions) -> IngestResult {
        Pipeline::new(&self.catalog, &self.probe, &self.vision, &self.embedder)
            .run(options)
            .unwrap()
    }

    pub fn scan_only(&self) -> IngestResult {
        self.process(&IngestOptions { scan_only: true, ..Default::default() })
    }

    pub fn video_at(&self, rel: &str) -> Video {
        self.catalog
            .pending(true)
            .unwrap()
            .into_iter()
            .find(|v| v.file_path == rel)
            .unwrap_or_else(|| panic!("no catalog row for {}", rel))
    }
}

pub fn write_file(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, content).unwrap();
}
