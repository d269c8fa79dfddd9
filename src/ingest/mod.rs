// Ingest pipeline module
//
// A pass is: take the run lock, scan the drive into the catalog, then
// (unless scan-only) analyze every row that still needs it. Per-file
// problems are recorded on the row; only store errors abort the pass.

pub mod analyze;
pub mod discover;
pub mod lock;

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use serde::Serialize;

use crate::constants::DEFAULT_NUM_KEYFRAMES;
use crate::db::models::{ProcessingStatus, Video};
use crate::db::Catalog;
use crate::error::Result;
use crate::hash::compute_content_hash;
use crate::inference::{Embedder, VisionAnalyzer};
use crate::metadata::{MediaMetadata, MediaProbe};
use analyze::{analyze_video, describe_failure, Stages};
use discover::{detect_source_device, discover_videos, Candidate};
use lock::RunLock;

#[derive(Debug, Clone)]
pub struct IngestOptions {
    pub scan_only: bool,
    pub force: bool,
    pub num_keyframes: usize,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            scan_only: false,
            force: false,
            num_keyframes: DEFAULT_NUM_KEYFRAMES,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestResult {
    pub discovered: usize,
    pub new_files: usize,
    pub moved: usize,
    pub duplicates: usize,
    pub unchanged: usize,
    pub scan_errors: usize,
    pub analyzed: usize,
    pub failed: usize,
    pub cancelled: bool,
    pub device_breakdown: BTreeMap<String, usize>,
}

/// What the scan did with one candidate file
enum ScanOutcome {
    New,
    Moved,
    Duplicate,
    Unchanged,
}

pub struct Pipeline<'a> {
    catalog: &'a Catalog,
    probe: &'a dyn MediaProbe,
    vision: &'a dyn VisionAnalyzer,
    embedder: &'a dyn Embedder,
    cancel: Option<&'a AtomicBool>,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        catalog: &'a Catalog,
        probe: &'a dyn MediaProbe,
        vision: &'a dyn VisionAnalyzer,
        embedder: &'a dyn Embedder,
    ) -> Self {
        Self {
            catalog,
            probe,
            vision,
            embedder,
            cancel: None,
        }
    }

    /// Checked between files; a set flag ends the pass early.
    pub fn with_cancel_flag(mut self, flag: &'a AtomicBool) -> Self {
        self.cancel = Some(flag);
        self
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.map(|f| f.load(Ordering::Relaxed)).unwrap_or(false)
    }

    /// Run one ingestion pass
    pub fn run(&self, options: &IngestOptions) -> Result<IngestResult> {
        let _lock = RunLock::acquire(self.catalog.drive_root())?;
        let mut result = IngestResult::default();

        self.scan(&mut result)?;

        if !options.scan_only && !result.cancelled {
            self.process_pending(options, &mut result)?;
        }

        log::info!(
            "Pass complete: {} discovered, {} new, {} moved, {} analyzed, {} failed",
            result.discovered,
            result.new_files,
            result.moved,
            result.analyzed,
            result.failed
        );
        Ok(result)
    }

    /// Walk the drive and record new or moved files. Never calls a model.
    pub fn scan(&self, result: &mut IngestResult) -> Result<()> {
        let root = self.catalog.drive_root();
        let mut index = self.catalog.hash_index()?;

        let found = discover_videos(root);
        result.scan_errors += found.errors.len();
        log::info!("Found {} video files under {}", found.videos.len(), root.display());

        for candidate in &found.videos {
            if self.is_cancelled() {
                log::warn!("Scan cancelled");
                result.cancelled = true;
                break;
            }

            result.discovered += 1;
            *result
                .device_breakdown
                .entry(detect_source_device(&candidate.relative).to_string())
                .or_insert(0) += 1;

            let file_hash = match compute_content_hash(&candidate.path) {
                Ok(h) => h,
                Err(e) => {
                    log::error!("Failed to hash {}: {}", candidate.relative, e);
                    result.scan_errors += 1;
                    continue;
                }
            };

            let outcome = self.scan_candidate(candidate, &file_hash, index.get(&file_hash).map(String::as_str))?;
            match outcome {
                ScanOutcome::New => {
                    result.new_files += 1;
                    index.insert(file_hash, candidate.relative.clone());
                }
                ScanOutcome::Moved => {
                    result.moved += 1;
                    index.insert(file_hash, candidate.relative.clone());
                }
                ScanOutcome::Duplicate => result.duplicates += 1,
                ScanOutcome::Unchanged => result.unchanged += 1,
            }
        }

        Ok(())
    }

    fn scan_candidate(&self, candidate: &Candidate, file_hash: &str, known_path: Option<&str>) -> Result<ScanOutcome> {
        match known_path {
            Some(path) if path == candidate.relative => Ok(ScanOutcome::Unchanged),
            Some(path) => {
                // Same content at two live paths: keep the row where it is
                if self.catalog.drive_root().join(path).is_file() {
                    log::info!("{} duplicates {}, skipping", candidate.relative, path);
                    return Ok(ScanOutcome::Duplicate);
                }
                match self.catalog.get_by_hash(file_hash)? {
                    Some(existing) => {
                        log::info!("Moved: {} -> {}", path, candidate.relative);
                        let mut moved = existing.relocated(candidate.relative.clone());
                        moved.lrf_path = candidate.lrf.clone();
                        self.catalog.upsert(&moved)?;
                        Ok(ScanOutcome::Moved)
                    }
                    None => self.record_new(candidate, file_hash),
                }
            }
            None => self.record_new(candidate, file_hash),
        }
    }

    fn record_new(&self, candidate: &Candidate, file_hash: &str) -> Result<ScanOutcome> {
        let file_size = std::fs::metadata(&candidate.path)
            .map(|m| m.len() as i64)
            .unwrap_or(0);
        let device = detect_source_device(&candidate.relative);

        let video = match self.probe.probe(&candidate.path) {
            Ok(meta) => Video::scanned(file_hash, candidate.relative.clone(), file_size, device, candidate.lrf.clone(), meta),
            Err(e) if e.is_per_item() => {
                log::error!("Metadata unreadable for {}: {}", candidate.relative, e);
                Video::scanned(file_hash, candidate.relative.clone(), file_size, device, candidate.lrf.clone(), MediaMetadata::default())
                    .into_failed(describe_failure(&candidate.relative, &e))?
            }
            Err(e) => return Err(e),
        };

        self.catalog.upsert(&video)?;
        log::debug!("New: {} ({})", candidate.relative, video.status());
        Ok(ScanOutcome::New)
    }

    /// Analyze every row that is scanned or failed (all rows with force)
    pub fn process_pending(&self, options: &IngestOptions, result: &mut IngestResult) -> Result<()> {
        let pending = self.catalog.pending(options.force)?;
        log::info!("{} videos to analyze", pending.len());

        let stages = Stages {
            drive_root: self.catalog.drive_root(),
            probe: self.probe,
            vision: self.vision,
            embedder: self.embedder,
            num_keyframes: options.num_keyframes.max(1),
            embedding_dimensions: self.catalog.embedding_dimensions(),
        };

        for (i, mut video) in pending.into_iter().enumerate() {
            if self.is_cancelled() {
                log::warn!("Processing cancelled after {} videos", i);
                result.cancelled = true;
                break;
            }

            // Forced reprocessing clears the old results first
            if video.status() == ProcessingStatus::Analyzed {
                video = video.reset_to_scanned();
                self.catalog.upsert(&video)?;
            }

            log::info!("[{}] Analyzing {}", i + 1, video.file_path);
            match analyze_video(&stages, video.clone()) {
                Ok(analyzed) => {
                    self.catalog.upsert(&analyzed)?;
                    result.analyzed += 1;
                }
                Err(e) if e.is_per_item() => {
                    let message = describe_failure(&video.file_path, &e);
                    log::error!("{}", message);
                    self.catalog.upsert(&video.into_failed(message)?)?;
                    result.failed += 1;
                }
                Err(e) => return Err(e),
            }
        }

        Ok(())
    }
}
